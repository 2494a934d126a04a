//! CUDA C source for the four numeric kernels, compiled at device-creation
//! time via NVRTC. Must stay numerically in step with `crate::math` — the
//! CPU backend and this source are tested against each other in
//! `tests/cpu_backend_tests.rs` (skipped when the `cuda` feature is off).

pub const NUMERIC_KERNELS: &str = r#"
__device__ float activation_fwd(int act, float x) {
    switch (act) {
        case 0: return 1.0f / (1.0f + expf(-x));                 // Sigmoid
        case 1: return fmaxf(0.0f, x);                            // ReLU
        case 2: { float s = 1.0f / (1.0f + expf(-2.0f * x)); return 2.0f * s - 1.0f; } // Tanh
        case 3: return x < 0.0f ? 0.01f * x : x;                  // LeakyReLU
        case 4: return x;                                         // Identity
        case 5: return x < 0.0f ? 0.0f : 1.0f;                    // Threshold
        case 6: return logf(1.0f + expf(x));                      // SoftPlus
        case 7: return atanf(x);                                  // ArcTan
        default: return x;
    }
}

__device__ float activation_prime(int act, float x) {
    switch (act) {
        case 0: { float s = 1.0f / (1.0f + expf(-x)); return s * (1.0f - s); }
        case 1: return x < 0.0f ? 0.0f : 1.0f;
        case 2: { float t = activation_fwd(2, x); return 1.0f - t * t; }
        case 3: return x < 0.0f ? 0.01f : 1.0f;
        case 4: return 1.0f;
        case 5: return 0.0f;
        case 6: { return 1.0f / (1.0f + expf(-x)); }
        case 7: return 1.0f / (x * x + 1.0f);
        default: return 1.0f;
    }
}

extern "C" __global__ void evaluate_layer_kernel(
    const float* tensor, const float* input, float* output,
    unsigned long long weights_offset, unsigned int weights_per_neuron,
    unsigned int neuron_count, int activation, unsigned int batch_count
) {
    unsigned int idx = blockIdx.x * blockDim.x + threadIdx.x;
    unsigned int total = batch_count * neuron_count;
    if (idx >= total) return;

    unsigned int b = idx / neuron_count;
    unsigned int neuron = idx % neuron_count;
    unsigned long long base = weights_offset + (unsigned long long)neuron * (weights_per_neuron + 1);

    float z = tensor[base + weights_per_neuron];
    const float* sample_in = input + (unsigned long long)b * weights_per_neuron;
    for (unsigned int k = 0; k < weights_per_neuron; ++k) {
        z += tensor[base + k] * sample_in[k];
    }
    output[idx] = activation_fwd(activation, z);
}

extern "C" __global__ void train_forward_pass_kernel(
    const float* tensor, const float* prev_activations, float* activations, float* zvalues,
    unsigned long long weights_offset, unsigned int weights_per_neuron,
    unsigned int neuron_count, int activation, unsigned int sample_count,
    unsigned long long prev_row_offset, unsigned long long prev_row_stride,
    unsigned long long out_row_offset, unsigned long long out_row_stride
) {
    unsigned int idx = blockIdx.x * blockDim.x + threadIdx.x;
    unsigned int total = sample_count * neuron_count;
    if (idx >= total) return;

    unsigned int b = idx / neuron_count;
    unsigned int neuron = idx % neuron_count;
    unsigned long long base = weights_offset + (unsigned long long)neuron * (weights_per_neuron + 1);

    float z = tensor[base + weights_per_neuron];
    const float* sample_in = prev_activations + (unsigned long long)b * prev_row_stride + prev_row_offset;
    for (unsigned int k = 0; k < weights_per_neuron; ++k) {
        z += tensor[base + k] * sample_in[k];
    }
    unsigned long long out_idx = (unsigned long long)b * out_row_stride + out_row_offset + neuron;
    zvalues[out_idx] = z;
    activations[out_idx] = activation_fwd(activation, z);
}

extern "C" __global__ void train_backward_pass_kernel(
    const float* tensor, const float* prev_activations, const float* layer_activations,
    const float* layer_zvalues, float* delta_write, const float* delta_read,
    float* gradient, const float* desired_output,
    unsigned long long weights_offset, unsigned long long next_layer_weights_offset,
    unsigned int weights_per_neuron, unsigned int neuron_count, unsigned int next_layer_neuron_count,
    int activation, unsigned int sample_count, int cost_function, int is_output,
    unsigned long long prev_row_offset, unsigned long long prev_row_stride,
    unsigned long long layer_row_offset, unsigned long long layer_row_stride,
    unsigned long long delta_stride
) {
    unsigned int idx = blockIdx.x * blockDim.x + threadIdx.x;
    unsigned int total = sample_count * neuron_count;
    if (idx >= total) return;

    unsigned int b = idx / neuron_count;
    unsigned int neuron = idx % neuron_count;
    unsigned long long row = (unsigned long long)b * layer_row_stride + layer_row_offset;
    float z = layer_zvalues[row + neuron];
    float a = layer_activations[row + neuron];

    float delta;
    if (is_output) {
        float target = desired_output[(unsigned long long)b * neuron_count + neuron];
        if (cost_function == 1) {
            // CrossEntropySigmoid
            delta = a - target;
        } else {
            delta = (a - target) * activation_prime(activation, z);
        }
    } else {
        float sum = 0.0f;
        for (unsigned int next_neuron = 0; next_neuron < next_layer_neuron_count; ++next_neuron) {
            unsigned long long w = next_layer_weights_offset + (unsigned long long)next_neuron * (neuron_count + 1) + neuron;
            sum += tensor[w] * delta_read[(unsigned long long)b * delta_stride + next_neuron];
        }
        delta = sum * activation_prime(activation, z);
    }
    delta_write[(unsigned long long)b * delta_stride + neuron] = delta;

    const float* sample_in = prev_activations + (unsigned long long)b * prev_row_stride + prev_row_offset;
    unsigned long long base = weights_offset + (unsigned long long)neuron * (weights_per_neuron + 1);
    for (unsigned int k = 0; k < weights_per_neuron; ++k) {
        atomicAdd(&gradient[base + k], delta * sample_in[k]);
    }
    atomicAdd(&gradient[base + weights_per_neuron], delta);
}

extern "C" __global__ void apply_gradients_kernel(
    float* tensor, const float* gradient,
    unsigned long long weights_offset, unsigned int weights_per_neuron,
    unsigned int neuron_count, float r1, float r2, float learning_rate
) {
    unsigned int idx = blockIdx.x * blockDim.x + threadIdx.x;
    unsigned int total = neuron_count * (weights_per_neuron + 1);
    if (idx >= total) return;

    unsigned int within_neuron = idx % (weights_per_neuron + 1);
    unsigned long long i = weights_offset + idx;
    if (within_neuron == weights_per_neuron) {
        // bias: plain SGD, no regularization shrinkage
        tensor[i] = tensor[i] - learning_rate * gradient[i];
    } else {
        float updated = r1 * tensor[i] - learning_rate * gradient[i];
        if (r2 != 0.0f) {
            float sign = updated > 0.0f ? 1.0f : (updated < 0.0f ? -1.0f : 0.0f);
            updated -= r2 * sign;
        }
        tensor[i] = updated;
    }
}
"#;
