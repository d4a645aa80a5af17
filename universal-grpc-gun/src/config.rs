use std::{fs::read_to_string, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_USER_AGENT: &str = env!("CARGO_PKG_NAME");

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct GunConfig {
    /// `host:port` or full uri of the target server
    pub target: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub reflection: ReflectionVersion,
}
fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

/// Version of the server reflection protocol used for discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReflectionVersion {
    /// `v1`, falling back to `v1alpha` if the target does not implement it
    #[default]
    Auto,
    V1,
    V1alpha,
}

impl GunConfig {
    pub fn new<S: Into<String>>(target: S) -> Self {
        Self { target: target.into(), user_agent: default_user_agent(), reflection: ReflectionVersion::default() }
    }

    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.target.trim().is_empty() {
            Err(ConfigError::EmptyTarget)
        } else {
            Ok(self)
        }
    }

    pub fn read<A: AsRef<Path>>(path: A) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            read_to_string(path).map_err(|source| ConfigError::Read { path: path.display().to_string(), source })?;
        Self::read_str(&content, Format::from_path(path)?)
    }
    pub fn read_str(s: &str, format: Format) -> Result<Self, ConfigError> {
        format.deserialize_config(s)?.validate()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Json,
    #[cfg(feature = "yaml")]
    Yaml,
    #[cfg(feature = "toml")]
    Toml,
}
impl Format {
    pub fn from_path<A: AsRef<Path>>(path: A) -> Result<Self, ConfigError> {
        let basename = path.as_ref().extension().and_then(|ext| ext.to_str());
        match basename {
            Some("json") => Ok(Format::Json),
            #[cfg(feature = "yaml")]
            Some("yaml" | "yml") => Ok(Format::Yaml),
            #[cfg(feature = "toml")]
            Some("toml") => Ok(Format::Toml),
            Some(ext) => Err(ConfigError::UnknownFormatExtension(ext.to_string())),
            None => Err(ConfigError::CannotSpecifyFormat(path.as_ref().display().to_string())),
        }
    }

    pub fn deserialize_config(&self, content: &str) -> Result<GunConfig, ConfigError> {
        match self {
            Format::Json => Ok(serde_json::from_str(content)?),
            #[cfg(feature = "yaml")]
            Format::Yaml => Ok(serde_yaml::from_str(content)?),
            #[cfg(feature = "toml")]
            Format::Toml => Ok(toml::from_str(content)?),
        }
    }
}
