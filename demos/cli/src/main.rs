//! Interactive REPL demo: trains a small network against a sine-regression
//! toy dataset and exposes the command surface of SPEC_FULL.md §6. Not part
//! of the engine itself — a client of it, same as any other caller of
//! `macadamy::tasks::ComputeTasks`.

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use rand::seq::SliceRandom;

use macadamy::device::factory::{ComputeDeviceFactory, ComputeDeviceInfo};
use macadamy::device::ComputeDevice;
use macadamy::network::init::XavierInitializer;
use macadamy::network::io::{export_binary, export_json, import_binary};
use macadamy::network::{Activation, LayerConfig, Network, NetworkFactory};
use macadamy::tasks::ComputeTasks;
use macadamy::training::orchestrator::{TrainingOrchestrator, TrainingOutcome};
use macadamy::training::{CostFunction, Regularization, TrainingData, TrainingSuite};
use macadamy::NetworkResourceHandle;

const SINE_SAMPLE_COUNT: usize = 200;
const DEFAULT_EXPORT_PATH: &str = "network.bin";

fn main() -> Result<()> {
    tracing_subscriber::fmt::try_init().ok();
    let mut session = Session::new()?;

    println!("macadamy sine-regression demo. Type 'help' for commands, 'quit' to exit.\n");
    let mut line = String::new();
    loop {
        print!("macadamy> ");
        io::stdout().flush()?;

        line.clear();
        let bytes_read = io::stdin().read_line(&mut line)?;
        if bytes_read == 0 {
            bail!("stdin closed before 'quit'");
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut parts = line.split_whitespace();
        let command = parts.next().unwrap_or("");
        let arg = parts.next();

        match command {
            "quit" => {
                println!("bye");
                return Ok(());
            }
            "help" => print_help(),
            "list_devices" => session.list_devices(),
            "select_device" => session.select_device(parse_arg(arg, "select_device")?)?,
            "device_info" => session.device_info(),
            "benchmark_device" => session.benchmark_device()?,
            "train" => session.train(arg.map(|a| a.parse()).transpose().context("epochs must be an integer")?)?,
            "eval" => session.eval(arg)?,
            "test" => session.test()?,
            "export" => session.export(&mut parts, arg)?,
            "import" => session.import(arg)?,
            "print_network" => session.print_network(),
            other => println!("unknown command: {other} (try 'help')"),
        }
    }
}

fn parse_arg<T: std::str::FromStr>(arg: Option<&str>, command: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    let raw = arg.with_context(|| format!("{command} requires an argument"))?;
    raw.parse::<T>().map_err(|e| anyhow::anyhow!("invalid argument for {command}: {e}"))
}

fn print_help() {
    println!("Commands:");
    println!("  quit                         exit (code 0)");
    println!("  help                         show this text");
    println!("  list_devices                 enumerate compute devices");
    println!("  select_device N              switch to device N and re-register the network");
    println!("  device_info                  show the selected device's info");
    println!("  benchmark_device             time a batch of evaluations on the selected device");
    println!("  train [epochs]               run epochs (default 50) of minibatch SGD");
    println!("  eval [index|value]           evaluate the network at a dataset index or an x value");
    println!("  test                         report mean squared error on the held-out set");
    println!("  export [--json] [path]       write the network (default: network.bin / binary)");
    println!("  import [path]                read a network back (default: network.bin)");
    println!("  print_network                print topology and weight count");
}

/// Sine regression: one input (x in [-pi, pi]), one hidden layer, one
/// output approximating sin(x). Holds the live network, the resource handle
/// bound to the currently selected device, and the toy dataset split.
struct Session {
    network: Network,
    devices: Vec<ComputeDeviceInfo>,
    selected: usize,
    // `Option` so `train` can move the handle into the orchestrator's
    // worker thread and put a freshly-registered one back afterward.
    handle: Option<NetworkResourceHandle>,
    train_data: Vec<TrainingData>,
    test_data: Vec<TrainingData>,
}

impl Session {
    fn new() -> Result<Self> {
        let layers = vec![
            LayerConfig { activation: Activation::Tanh, neuron_count: 16 },
            LayerConfig { activation: Activation::Identity, neuron_count: 1 },
        ];
        let mut network = NetworkFactory::build("sine", 1, layers, None)?;
        let mut init = XavierInitializer::new();
        network.generate_random_weights(&mut init);

        let devices = ComputeDeviceFactory::enumerate_compute_devices();
        let device = make_device(&devices, 0)?;
        let handle = NetworkResourceHandle::register(device, &network)?;

        let (train_data, test_data) = sine_dataset();

        Ok(Self { network, devices, selected: 0, handle: Some(handle), train_data, test_data })
    }

    /// The handle is only absent mid-`train`, while it has been moved into
    /// the orchestrator's worker thread.
    fn handle(&mut self) -> &mut NetworkResourceHandle {
        self.handle.as_mut().expect("handle missing outside train()")
    }

    fn list_devices(&self) {
        for (i, info) in self.devices.iter().enumerate() {
            let marker = if i == self.selected { "*" } else { " " };
            println!("{marker} [{i}] {} device_index={} name={}", info.backend.as_str(), info.device_index, info.device_name);
        }
    }

    fn select_device(&mut self, index: usize) -> Result<()> {
        let device = make_device(&self.devices, index)?;
        self.handle = Some(NetworkResourceHandle::register(device, &self.network)?);
        self.selected = index;
        println!("selected device {index}");
        Ok(())
    }

    fn device_info(&self) {
        let info = &self.devices[self.selected];
        println!("backend={} device_index={} name={} total_memory={}", info.backend.as_str(), info.device_index, info.device_name, info.total_memory);
        println!("compute_units={}", self.handle.as_ref().expect("handle missing outside train()").device().compute_units());
    }

    fn benchmark_device(&mut self) -> Result<()> {
        let batch = 256u32;
        let input: Vec<f32> = (0..batch).map(|i| (i as f32 / batch as f32) * std::f32::consts::TAU - std::f32::consts::PI).collect();
        let iterations = 50;

        let network = self.network.clone();
        let start = Instant::now();
        for _ in 0..iterations {
            ComputeTasks::evaluate_batch(self.handle(), &network, &input, batch)?;
        }
        let elapsed = start.elapsed();
        let samples = iterations as f64 * batch as f64;
        println!("{iterations} batches x {batch} samples in {elapsed:?} ({:.0} samples/sec)", samples / elapsed.as_secs_f64());
        Ok(())
    }

    fn train(&mut self, epochs: Option<u32>) -> Result<()> {
        let suite = TrainingSuite {
            training_data: self.train_data.clone(),
            mini_batch_size: Some(16),
            learning_rate: 0.5,
            epochs: epochs.unwrap_or(50),
            shuffle_training_data: true,
            cost_function: CostFunction::MeanSquared,
            regularization: Regularization::None,
            regularization_lambda: 0.0,
        };

        let device = self.handle().device().clone();
        let handle = self.handle.take().expect("handle missing outside train()");

        let orchestrator = TrainingOrchestrator::spawn(handle, self.network.clone(), suite, Some(42))?;
        let TrainingOutcome { epochs_run, network } = orchestrator.join()?;
        self.network = network;
        self.handle = Some(NetworkResourceHandle::register(device, &self.network)?);

        println!("ran {epochs_run} epoch(s)");
        self.test()
    }

    fn eval(&mut self, arg: Option<&str>) -> Result<()> {
        let x = match arg {
            None => self.test_data[0].input[0],
            Some(raw) => match raw.parse::<usize>() {
                Ok(index) if index < self.train_data.len() => self.train_data[index].input[0],
                _ => raw.parse::<f32>().context("eval argument must be a dataset index or a float value")?,
            },
        };
        let network = self.network.clone();
        let output = ComputeTasks::evaluate(self.handle(), &network, &[x])?;
        println!("sin({x:.4}) ~ {:.6} (true {:.6})", output[0], x.sin());
        Ok(())
    }

    fn test(&mut self) -> Result<()> {
        let network = self.network.clone();
        let mut squared_error = 0.0f64;
        for i in 0..self.test_data.len() {
            let (input, desired_output) = (self.test_data[i].input.clone(), self.test_data[i].desired_output.clone());
            let output = ComputeTasks::evaluate(self.handle(), &network, &input)?;
            let diff = output[0] as f64 - desired_output[0] as f64;
            squared_error += diff * diff;
        }
        let mse = squared_error / self.test_data.len() as f64;
        println!("mean squared error over {} held-out samples: {mse:.6}", self.test_data.len());
        Ok(())
    }

    fn export(&self, parts: &mut std::str::SplitWhitespace<'_>, first_arg: Option<&str>) -> Result<()> {
        let (as_json, path) = match first_arg {
            Some("--json") => (true, parts.next()),
            other => (false, other),
        };
        let path = path.unwrap_or(DEFAULT_EXPORT_PATH);

        if as_json {
            let value = export_json(&self.network);
            std::fs::write(path, serde_json::to_vec_pretty(&value)?)?;
        } else {
            let mut file = std::fs::File::create(path)?;
            export_binary(&self.network, &mut file)?;
        }
        println!("exported to {path}");
        Ok(())
    }

    fn import(&mut self, arg: Option<&str>) -> Result<()> {
        let path = arg.unwrap_or(DEFAULT_EXPORT_PATH);
        let mut file = std::fs::File::open(path)?;
        match import_binary(&mut file)? {
            Some(network) => {
                self.network = network;
                let device = self.handle().device().clone();
                self.handle = Some(NetworkResourceHandle::register(device, &self.network)?);
                println!("imported {path}");
            }
            None => println!("import failed: not a valid network file"),
        }
        Ok(())
    }

    fn print_network(&self) {
        println!("name: {}", self.network.name);
        println!("input_count: {}", self.network.input_count);
        for (i, layer) in self.network.layers.iter().enumerate() {
            println!("  layer {i}: {} neurons, {:?}", layer.neuron_count, layer.activation);
        }
        println!("total weights: {}", self.network.data.len());
    }
}

fn make_device(devices: &[ComputeDeviceInfo], index: usize) -> Result<Arc<dyn ComputeDevice>> {
    let info = devices.get(index).with_context(|| format!("no device at index {index}"))?;
    let boxed = ComputeDeviceFactory::create_compute_device(info.backend.clone(), info.device_index, &Default::default())?;
    Ok(Arc::from(boxed))
}

fn sine_dataset() -> (Vec<TrainingData>, Vec<TrainingData>) {
    let mut rng = rand::thread_rng();
    let mut all: Vec<TrainingData> = (0..SINE_SAMPLE_COUNT)
        .map(|i| {
            let x = (i as f32 / SINE_SAMPLE_COUNT as f32) * std::f32::consts::TAU - std::f32::consts::PI;
            TrainingData { input: vec![x], desired_output: vec![x.sin()] }
        })
        .collect();
    all.shuffle(&mut rng);
    let split = all.len() * 4 / 5;
    let test = all.split_off(split);
    (all, test)
}
