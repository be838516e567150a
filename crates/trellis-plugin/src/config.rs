//! Plugin option declaration and validation

use crate::{PluginError, PluginResult};
use std::collections::BTreeMap;
use std::path::PathBuf;
use trellis_model::{Coordinate, OptionKind, OptionValue};

/// A declared configuration option: name, type, required/optional status
/// and an optional default.
#[derive(Debug, Clone)]
pub struct OptionSpec {
    pub name: String,
    pub kind: OptionKind,
    pub required: bool,
    pub default: Option<OptionValue>,
}

impl OptionSpec {
    /// Declare an optional option
    pub fn new(name: impl Into<String>, kind: OptionKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            default: None,
        }
    }

    /// Mark the option required
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Supply a default applied when the binding omits the option
    pub fn with_default(mut self, value: impl Into<OptionValue>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// Validated, immutable configuration handed to a plugin
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PluginConfig {
    values: BTreeMap<String, OptionValue>,
}

impl PluginConfig {
    /// Validate raw binding options against the plugin's declared specs:
    /// defaults are applied, required options must be present, kinds must
    /// match (strings coerce to declared paths), unknown options are
    /// rejected.
    pub fn validate(
        plugin: &Coordinate,
        specs: &[OptionSpec],
        raw: &BTreeMap<String, OptionValue>,
    ) -> PluginResult<Self> {
        for name in raw.keys() {
            if !specs.iter().any(|spec| &spec.name == name) {
                return Err(PluginError::configuration(
                    plugin,
                    name.clone(),
                    "unknown option",
                ));
            }
        }

        let mut values = BTreeMap::new();
        for spec in specs {
            let value = raw.get(&spec.name).cloned().or_else(|| spec.default.clone());
            match value {
                Some(value) => {
                    let value = coerce(plugin, spec, value)?;
                    values.insert(spec.name.clone(), value);
                }
                None if spec.required => {
                    return Err(PluginError::configuration(
                        plugin,
                        spec.name.clone(),
                        "required option is missing",
                    ));
                }
                None => {}
            }
        }

        Ok(Self { values })
    }

    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.values.get(name)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(OptionValue::as_str)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.values.get(name).and_then(OptionValue::as_bool)
    }

    pub fn number(&self, name: &str) -> Option<i64> {
        self.values.get(name).and_then(OptionValue::as_number)
    }

    pub fn path(&self, name: &str) -> Option<PathBuf> {
        self.values.get(name).and_then(OptionValue::as_path)
    }

    pub fn list(&self, name: &str) -> Option<&[String]> {
        self.values.get(name).and_then(OptionValue::as_list)
    }
}

/// Check a value against its declared kind, coercing strings into declared
/// paths.
fn coerce(
    plugin: &Coordinate,
    spec: &OptionSpec,
    value: OptionValue,
) -> PluginResult<OptionValue> {
    if value.kind() == spec.kind {
        return Ok(value);
    }
    if spec.kind == OptionKind::Path {
        if let OptionValue::Str(text) = &value {
            return Ok(OptionValue::Path(PathBuf::from(text)));
        }
    }
    Err(PluginError::configuration(
        plugin,
        spec.name.clone(),
        format!("expected {}, got {}", spec.kind, value.kind()),
    ))
}
