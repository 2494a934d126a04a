//! Binary and JSON (de)serialization of a [`Network`], per SPEC_FULL.md §6.
//! The binary layout is little-endian and mirrors the reference
//! implementation's `ExportNetworkAsBinary`/`ImportNetworkFromBinary` byte
//! for byte.

use std::io::{self, Read, Write};

use serde_json::json;

use super::{Activation, LayerConfig, Network, NetworkFactory, BINARY_VERSION};

/// Writes `network` to `writer` in the binary format of SPEC_FULL.md §6.
pub fn export_binary<W: Write>(network: &Network, writer: &mut W) -> io::Result<()> {
    writer.write_all(&BINARY_VERSION.to_le_bytes())?;

    let name_bytes = network.name.as_bytes();
    writer.write_all(&(name_bytes.len() as u32).to_le_bytes())?;
    writer.write_all(name_bytes)?;

    writer.write_all(&network.input_count.to_le_bytes())?;
    writer.write_all(&(network.layers.len() as u32).to_le_bytes())?;
    for layer in &network.layers {
        writer.write_all(&layer.activation.id().to_le_bytes())?;
        writer.write_all(&layer.neuron_count.to_le_bytes())?;
    }

    writer.write_all(&(network.data.len() as u64).to_le_bytes())?;
    for value in &network.data {
        writer.write_all(&value.to_le_bytes())?;
    }

    Ok(())
}

pub fn export_binary_to_vec(network: &Network) -> Vec<u8> {
    let mut buf = Vec::new();
    export_binary(network, &mut buf).expect("writing to a Vec<u8> cannot fail");
    buf
}

/// Reads a [`Network`] from `reader`. Returns `Ok(None)` on a version
/// mismatch, truncated stream, or count mismatch — per spec, read failures
/// are not fatal, they simply yield an absent network. Genuine I/O errors
/// (not EOF related to the data itself) still propagate.
pub fn import_binary<R: Read>(reader: &mut R) -> io::Result<Option<Network>> {
    let mut u32_buf = [0u8; 4];
    let mut u64_buf = [0u8; 8];

    macro_rules! read_u32_or_absent {
        () => {
            match reader.read_exact(&mut u32_buf) {
                Ok(()) => u32::from_le_bytes(u32_buf),
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
                Err(e) => return Err(e),
            }
        };
    }

    let version = read_u32_or_absent!();
    if version != BINARY_VERSION {
        return Ok(None);
    }

    let name_length = read_u32_or_absent!() as usize;
    let mut name_bytes = vec![0u8; name_length];
    if reader.read_exact(&mut name_bytes).is_err() {
        return Ok(None);
    }
    let name = match String::from_utf8(name_bytes) {
        Ok(s) => s,
        Err(_) => return Ok(None),
    };

    let input_count = read_u32_or_absent!();
    let layer_count = read_u32_or_absent!();

    let mut layers = Vec::with_capacity(layer_count as usize);
    for _ in 0..layer_count {
        let activation_id = read_u32_or_absent!();
        let neuron_count = read_u32_or_absent!();
        let activation = match Activation::from_id(activation_id) {
            Ok(a) => a,
            Err(_) => return Ok(None),
        };
        layers.push(LayerConfig { activation, neuron_count });
    }

    match reader.read_exact(&mut u64_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let total_weight_count = u64::from_le_bytes(u64_buf);

    let expected = Network::expected_data_len(input_count, &layers);
    if total_weight_count != expected {
        return Ok(None);
    }

    let mut data = Vec::with_capacity(total_weight_count as usize);
    let mut f32_buf = [0u8; 4];
    for _ in 0..total_weight_count {
        if reader.read_exact(&mut f32_buf).is_err() {
            return Ok(None);
        }
        data.push(f32::from_le_bytes(f32_buf));
    }

    match NetworkFactory::build(name, input_count, layers, Some(data)) {
        Ok(network) => Ok(Some(network)),
        Err(_) => Ok(None),
    }
}

/// Partial JSON export: `name` and `description` only. Full round-trip
/// through JSON (weights included) is explicitly out of scope — see
/// SPEC_FULL.md §11 / spec.md's Open Questions.
pub fn export_json(network: &Network) -> serde_json::Value {
    json!({
        "name": network.name,
        "description": network.description.clone().unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::init::XavierInitializer;
    use crate::network::{Activation, LayerConfig};

    fn sample_network() -> Network {
        let layers = vec![
            LayerConfig { activation: Activation::Sigmoid, neuron_count: 4 },
            LayerConfig { activation: Activation::Tanh, neuron_count: 3 },
        ];
        let mut net = NetworkFactory::build("roundtrip", 5, layers, None).unwrap();
        net.description = Some("a test network".into());
        let mut init = XavierInitializer::with_seed(7);
        net.generate_random_weights(&mut init);
        net
    }

    #[test]
    fn binary_round_trip_is_bitwise_exact() {
        let net = sample_network();
        let bytes = export_binary_to_vec(&net);
        let mut cursor = io::Cursor::new(bytes);
        let imported = import_binary(&mut cursor).unwrap().expect("valid network");

        assert_eq!(imported.name, net.name);
        assert_eq!(imported.input_count, net.input_count);
        assert_eq!(imported.data, net.data);
        assert_eq!(imported.layers.len(), net.layers.len());
        for (a, b) in imported.layers.iter().zip(net.layers.iter()) {
            assert_eq!(a.neuron_count, b.neuron_count);
            assert_eq!(a.activation.id(), b.activation.id());
        }
    }

    #[test]
    fn wrong_version_yields_absent_network() {
        let net = sample_network();
        let mut bytes = export_binary_to_vec(&net);
        bytes[0] = bytes[0].wrapping_add(1);
        let mut cursor = io::Cursor::new(bytes);
        assert!(import_binary(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn truncated_stream_yields_absent_network() {
        let net = sample_network();
        let mut bytes = export_binary_to_vec(&net);
        bytes.truncate(bytes.len() - 4);
        let mut cursor = io::Cursor::new(bytes);
        assert!(import_binary(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn json_export_has_name_and_description() {
        let net = sample_network();
        let value = export_json(&net);
        assert_eq!(value["name"], "roundtrip");
        assert_eq!(value["description"], "a test network");
    }
}
