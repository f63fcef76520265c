///
/// # Host Configuration
///
/// Describes the host runtime a module is linked against: its version and
/// the constant space object-kind symbols resolve from. Loaded from a
/// `modlink.toml` file.
///
/// ## Example modlink.toml
///
/// ```toml
/// [runtime]
/// version = 21
///
/// [constants]
/// pi = 3.141592653589793
/// huge = inf
/// nan = nan
/// answer = 42
/// ```
///
/// Both sections are optional. A missing `[runtime]` section means the
/// crate's own `RUNTIME_VERSION`; a missing `[constants]` section means an
/// empty constant space.
///

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;
use thiserror::Error;

use crate::linker::ConstantSpace;
use crate::value::Value;
use crate::RUNTIME_VERSION;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Constant '{name}' has unsupported {kind} value")]
    UnsupportedConstant { name: String, kind: &'static str },
}

#[derive(Debug, Clone, Deserialize)]
struct RawConfig {
    #[serde(default)]
    runtime: RuntimeSection,
    #[serde(default)]
    constants: IndexMap<String, toml::Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct RuntimeSection {
    #[serde(default = "default_version")]
    version: u32,
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            version: default_version(),
        }
    }
}

fn default_version() -> u32 {
    RUNTIME_VERSION
}

#[derive(Debug, Clone)]
pub struct HostConfig {
    pub runtime_version: u32,
    pub constants: IndexMap<String, Value>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            runtime_version: RUNTIME_VERSION,
            constants: IndexMap::new(),
        }
    }
}

impl HostConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(content)?;

        let mut constants = IndexMap::with_capacity(raw.constants.len());
        for (name, value) in raw.constants {
            let value = convert_constant(&name, value)?;
            constants.insert(name, value);
        }

        Ok(Self {
            runtime_version: raw.runtime.version,
            constants,
        })
    }
}

impl ConstantSpace for HostConfig {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.constants.get(name).cloned()
    }
}

fn convert_constant(name: &str, value: toml::Value) -> Result<Value, ConfigError> {
    match value {
        toml::Value::Integer(i) => Ok(Value::Integer(i)),
        toml::Value::Float(f) => Ok(Value::Double(f)),
        toml::Value::Boolean(b) => Ok(Value::Boolean(b)),
        toml::Value::String(s) => Ok(Value::String(s)),
        toml::Value::Array(items) => items
            .into_iter()
            .map(|item| convert_constant(name, item))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        toml::Value::Datetime(_) => Err(ConfigError::UnsupportedConstant {
            name: name.to_string(),
            kind: "datetime",
        }),
        toml::Value::Table(_) => Err(ConfigError::UnsupportedConstant {
            name: name.to_string(),
            kind: "table",
        }),
    }
}
