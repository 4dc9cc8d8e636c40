use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use serde_yaml_bw as serde_yaml;
use tempfile::NamedTempFile;

use super::Runtime;

/// Runtime option recording the python environment directory.
pub const VIRTUALENV_OPTION: &str = "virtualenv";

/// On-disk descriptor of a policy pack.
///
/// Keys this type does not model are kept in `extra` so a rewrite never drops
/// them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub runtime: RuntimeInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Manifest {
    pub fn new(runtime: impl Into<String>) -> Self {
        Self {
            name: None,
            runtime: RuntimeInfo::new(runtime),
            version: None,
            description: None,
            main: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("failed to parse manifest {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let manifest: Self = serde_yaml::from_str(content)?;
        if manifest.runtime.name.trim().is_empty() {
            bail!("runtime name is empty");
        }
        Ok(manifest)
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("failed to serialize manifest")
    }

    /// Rewrite the manifest through a sibling temp file so readers never see
    /// a half-written file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = self.to_yaml()?;
        let dir = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)
            .with_context(|| format!("failed to create temp manifest in {}", dir.display()))?;
        tmp.write_all(content.as_bytes())
            .context("failed to write manifest contents")?;
        tmp.persist(path)
            .map_err(|err| err.error)
            .with_context(|| format!("failed to replace manifest {}", path.display()))?;
        Ok(())
    }

    pub fn runtime(&self) -> Runtime {
        Runtime::from_name(&self.runtime.name)
    }
}

/// Runtime name plus free-form options.
///
/// Serialized as a bare string when there are no options, and as
/// `{name, options}` otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeInfo {
    pub name: String,
    pub options: BTreeMap<String, Value>,
}

impl RuntimeInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: BTreeMap::new(),
        }
    }

    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.option(key).and_then(Value::as_str)
    }

    pub fn set_option(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.options.insert(key.into(), value.into());
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawRuntime {
    Name(String),
    Detailed {
        name: String,
        #[serde(default)]
        options: BTreeMap<String, Value>,
    },
}

#[derive(Serialize)]
struct DetailedRuntime<'a> {
    name: &'a str,
    options: &'a BTreeMap<String, Value>,
}

impl Serialize for RuntimeInfo {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if self.options.is_empty() {
            serializer.serialize_str(&self.name)
        } else {
            DetailedRuntime {
                name: &self.name,
                options: &self.options,
            }
            .serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for RuntimeInfo {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Ok(match RawRuntime::deserialize(deserializer)? {
            RawRuntime::Name(name) => Self::new(name),
            RawRuntime::Detailed { name, options } => Self { name, options },
        })
    }
}
