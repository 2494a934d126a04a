//! Device configuration maps (SPEC_FULL.md §6 / §10.3). Backends receive an
//! opaque `HashMap<String, ConfigValue>` from the factory and pull out the
//! keys they recognize, ignoring the rest — unknown keys are not an error,
//! they may simply belong to a different backend.

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    U32(u32),
    Bool(bool),
}

impl ConfigValue {
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            ConfigValue::U32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

/// Recognized keys, per SPEC_FULL.md §6's device configuration map. Every
/// field has a sensible default so an empty map is always a valid config.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub eval_threadgroup_size: u32,
    pub training_threadgroup_size_x: u32,
    pub training_threadgroup_size_y: u32,
    pub gradient_apply_threadgroup_size: u32,
    pub cl_fast_relaxed_math: bool,
    pub cl_mad_enable: bool,
    pub cl_no_signed_zeros: bool,
    pub cl_unsafe_math_operations: bool,
    pub validation_layer_enabled: bool,
    pub debug_labels_enabled: bool,
    pub disable_hw_atomic_add: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            eval_threadgroup_size: 64,
            training_threadgroup_size_x: 16,
            training_threadgroup_size_y: 16,
            gradient_apply_threadgroup_size: 64,
            cl_fast_relaxed_math: false,
            cl_mad_enable: false,
            cl_no_signed_zeros: false,
            cl_unsafe_math_operations: false,
            validation_layer_enabled: false,
            debug_labels_enabled: false,
            disable_hw_atomic_add: false,
        }
    }
}

impl DeviceConfig {
    pub fn from_map(map: &HashMap<String, ConfigValue>) -> Self {
        let mut config = Self::default();
        if let Some(v) = map.get("eval_threadgroup_size").and_then(ConfigValue::as_u32) {
            config.eval_threadgroup_size = v;
        }
        if let Some(v) = map.get("training_threadgroup_size_x").and_then(ConfigValue::as_u32) {
            config.training_threadgroup_size_x = v;
        }
        if let Some(v) = map.get("training_threadgroup_size_y").and_then(ConfigValue::as_u32) {
            config.training_threadgroup_size_y = v;
        }
        if let Some(v) = map
            .get("gradient_apply_threadgroup_size")
            .and_then(ConfigValue::as_u32)
        {
            config.gradient_apply_threadgroup_size = v;
        }
        if let Some(v) = map.get("cl_fast_relaxed_math").and_then(ConfigValue::as_bool) {
            config.cl_fast_relaxed_math = v;
        }
        if let Some(v) = map.get("cl_mad_enable").and_then(ConfigValue::as_bool) {
            config.cl_mad_enable = v;
        }
        if let Some(v) = map.get("cl_no_signed_zeros").and_then(ConfigValue::as_bool) {
            config.cl_no_signed_zeros = v;
        }
        if let Some(v) = map
            .get("cl_unsafe_math_operations")
            .and_then(ConfigValue::as_bool)
        {
            config.cl_unsafe_math_operations = v;
        }
        if let Some(v) = map.get("validation_layer_enabled").and_then(ConfigValue::as_bool) {
            config.validation_layer_enabled = v;
        }
        if let Some(v) = map.get("debug_labels_enabled").and_then(ConfigValue::as_bool) {
            config.debug_labels_enabled = v;
        }
        if let Some(v) = map.get("disable_hw_atomic_add").and_then(ConfigValue::as_bool) {
            config.disable_hw_atomic_add = v;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_map_yields_defaults() {
        let config = DeviceConfig::from_map(&HashMap::new());
        assert_eq!(config.eval_threadgroup_size, 64);
        assert!(!config.validation_layer_enabled);
    }

    #[test]
    fn recognized_keys_override_defaults() {
        let mut map = HashMap::new();
        map.insert("eval_threadgroup_size".to_string(), ConfigValue::U32(128));
        map.insert("validation_layer_enabled".to_string(), ConfigValue::Bool(true));
        let config = DeviceConfig::from_map(&map);
        assert_eq!(config.eval_threadgroup_size, 128);
        assert!(config.validation_layer_enabled);
    }
}
