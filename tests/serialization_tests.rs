//! Export/import at the file-system boundary: a trained network written to
//! disk and read back must evaluate identically to the network that wrote
//! it. Byte-level round-trip correctness is covered at the unit level in
//! `network::io`; this file exercises the same path `demos/cli` takes.

use std::sync::Arc;

use macadamy::device::cpu::CpuDevice;
use macadamy::network::init::XavierInitializer;
use macadamy::network::io::{export_binary, import_binary};
use macadamy::network::{Activation, LayerConfig, NetworkFactory};
use macadamy::tasks::ComputeTasks;
use macadamy::NetworkResourceHandle;

#[test]
fn network_written_to_a_file_and_read_back_evaluates_identically() {
    let layers = vec![
        LayerConfig { activation: Activation::Tanh, neuron_count: 6 },
        LayerConfig { activation: Activation::Sigmoid, neuron_count: 2 },
    ];
    let mut net = NetworkFactory::build("file_roundtrip", 4, layers, None).unwrap();
    let mut init = XavierInitializer::with_seed(99);
    net.generate_random_weights(&mut init);

    let path = std::env::temp_dir().join(format!("macadamy_test_{}.bin", std::process::id()));
    {
        let mut file = std::fs::File::create(&path).unwrap();
        export_binary(&net, &mut file).unwrap();
    }
    let restored = {
        let mut file = std::fs::File::open(&path).unwrap();
        import_binary(&mut file).unwrap().expect("exported file must import back")
    };
    std::fs::remove_file(&path).ok();

    let device = Arc::new(CpuDevice::new());
    let mut original_handle = NetworkResourceHandle::register(device.clone(), &net).unwrap();
    let mut restored_handle = NetworkResourceHandle::register(device, &restored).unwrap();

    let input = [0.3, -0.1, 0.9, -0.4];
    let original_output = ComputeTasks::evaluate(&mut original_handle, &net, &input).unwrap();
    let restored_output = ComputeTasks::evaluate(&mut restored_handle, &restored, &input).unwrap();
    assert_eq!(original_output, restored_output);
}

#[test]
fn importing_a_truncated_file_yields_no_network() {
    let layers = vec![LayerConfig { activation: Activation::Identity, neuron_count: 3 }];
    let net = NetworkFactory::build("truncated", 2, layers, None).unwrap();

    let path = std::env::temp_dir().join(format!("macadamy_test_trunc_{}.bin", std::process::id()));
    {
        let mut file = std::fs::File::create(&path).unwrap();
        export_binary(&net, &mut file).unwrap();
    }
    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() - 8]).unwrap();

    let mut file = std::fs::File::open(&path).unwrap();
    assert!(import_binary(&mut file).unwrap().is_none());
    std::fs::remove_file(&path).ok();
}
