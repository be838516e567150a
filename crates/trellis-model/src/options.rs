//! Plugin configuration option values

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Declared type of a plugin configuration option
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OptionKind {
    Str,
    Number,
    Bool,
    Path,
    ListOfStr,
}

impl fmt::Display for OptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Str => "string",
            Self::Number => "number",
            Self::Bool => "boolean",
            Self::Path => "path",
            Self::ListOfStr => "list-of-string",
        };
        f.write_str(name)
    }
}

/// A configuration option value as enumerated in a plugin binding.
///
/// Paths arrive from definition files as strings; they become `Path` values
/// when coerced against a declared `OptionKind::Path` during validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Number(i64),
    List(Vec<String>),
    Str(String),
    Path(PathBuf),
}

impl OptionValue {
    /// The kind this value currently has
    pub fn kind(&self) -> OptionKind {
        match self {
            Self::Str(_) => OptionKind::Str,
            Self::Number(_) => OptionKind::Number,
            Self::Bool(_) => OptionKind::Bool,
            Self::Path(_) => OptionKind::Path,
            Self::List(_) => OptionKind::ListOfStr,
        }
    }

    /// String content, if this is a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(value) => Some(value),
            _ => None,
        }
    }

    /// Boolean content, if this is a boolean value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Numeric content, if this is a number value
    pub fn as_number(&self) -> Option<i64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    /// Path content: a path value, or a string value read as a path
    pub fn as_path(&self) -> Option<PathBuf> {
        match self {
            Self::Path(value) => Some(value.clone()),
            Self::Str(value) => Some(PathBuf::from(value)),
            _ => None,
        }
    }

    /// List content, if this is a list value
    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(values) => Some(values),
            _ => None,
        }
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}
