//! `app.yaml` application descriptor.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Deserializer};

use super::ConfigError;

/// Descriptor file name inside the application directory.
pub const DESCRIPTOR_FILE_NAME: &str = "app.yaml";

/// The parts of `app.yaml` this tool reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AppDescriptor {
    /// Application identifier (`<id>.appspot.com`).
    #[serde(default, deserialize_with = "scalar_string")]
    pub application: String,
    /// Deployed version label.
    #[serde(default, deserialize_with = "scalar_string")]
    pub version: String,
    /// Runtime name.
    #[serde(default, deserialize_with = "scalar_string")]
    pub runtime: String,
    /// Runtime API version.
    #[serde(default, deserialize_with = "scalar_string")]
    pub api_version: String,
    /// URL handlers.
    #[serde(default)]
    pub handlers: Vec<UrlHandler>,
}

/// One `handlers:` entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UrlHandler {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub static_dir: String,
    #[serde(default)]
    pub static_files: String,
    #[serde(default)]
    pub upload: String,
    #[serde(default)]
    pub script: String,
}

impl AppDescriptor {
    /// Reads `<app_dir>/app.yaml`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] when the file is missing or unreadable and
    /// [`ConfigError::Descriptor`] when it does not parse.
    pub fn load(app_dir: &Path) -> Result<Self, ConfigError> {
        let path = app_dir.join(DESCRIPTOR_FILE_NAME);
        let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        Self::parse(&raw).map_err(|source| ConfigError::Descriptor { path, source })
    }

    /// Parses descriptor YAML.
    ///
    /// # Errors
    ///
    /// Returns the YAML error when the document does not match the expected shape.
    pub fn parse(raw: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(raw)
    }
}

// app.yaml routinely writes `version: 1` or `api_version: go1`; accept any scalar.
fn scalar_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    use serde_yaml::Value;

    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(value)) => Ok(value),
        Some(Value::Number(value)) => Ok(value.to_string()),
        Some(Value::Bool(value)) => Ok(value.to_string()),
        Some(_) => Err(D::Error::custom("expected a scalar value")),
    }
}
