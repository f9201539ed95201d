//! Application configuration.
//!
//! Loaded once at startup from a TOML file and handed to each component by
//! reference. Any key present in the file can be overridden from the
//! environment: `kafka.security-protocol` is overridden by
//! `KAFKA_SECURITY_PROTOCOL`, `app.mapper.profiles.MII` by
//! `APP_MAPPER_PROFILES_MII`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use toml::{Table, Value};
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {key}: {value:?}")]
    Override { key: String, value: String },
    #[error("invalid configuration: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AppConfig {
    pub app: App,
    pub kafka: KafkaConfig,
    pub gics: GicsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct App {
    pub name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub mapper: MapperConfig,
}

/// Identifier systems used when addressing the output resources.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MapperConfig {
    #[serde(default)]
    pub consent_system: String,
    #[serde(default)]
    pub patient_system: String,
    #[serde(default)]
    pub domain_system: String,
    /// gICS domain name → consent profile URL.
    #[serde(default)]
    pub profiles: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct KafkaConfig {
    pub bootstrap_servers: String,
    pub input_topic: String,
    pub output_topic: String,
    #[serde(default = "default_security_protocol")]
    pub security_protocol: String,
    #[serde(default)]
    pub ssl: SslConfig,
    #[serde(default = "default_num_consumers")]
    pub num_consumers: usize,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_queue_full_backoff_ms")]
    pub queue_full_backoff_ms: u64,
    #[serde(default = "default_flush_timeout_ms")]
    pub flush_timeout_ms: u64,
    #[serde(default = "default_flush_rounds")]
    pub flush_rounds: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SslConfig {
    #[serde(default)]
    pub ca_location: String,
    #[serde(default)]
    pub certificate_location: String,
    #[serde(default)]
    pub key_location: String,
    #[serde(default)]
    pub key_password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GicsConfig {
    pub fhir: FhirConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FhirConfig {
    pub base: String,
    #[serde(default)]
    pub auth: Option<BasicAuth>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicAuth {
    pub user: String,
    pub password: String,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_security_protocol() -> String {
    "plaintext".to_string()
}
fn default_num_consumers() -> usize {
    1
}
fn default_poll_interval_ms() -> u64 {
    1000
}
fn default_queue_full_backoff_ms() -> u64 {
    1000
}
fn default_flush_timeout_ms() -> u64 {
    10_000
}
fn default_flush_rounds() -> u32 {
    6
}

impl KafkaConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn queue_full_backoff(&self) -> Duration {
        Duration::from_millis(self.queue_full_backoff_ms)
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }
}

impl BasicAuth {
    /// Credentials are only used when both parts are set.
    pub fn is_complete(&self) -> bool {
        !self.user.is_empty() && !self.password.is_empty()
    }
}

impl AppConfig {
    /// Load from a TOML file, applying overrides from the process environment.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content, |name| std::env::var(name).ok())
    }

    /// Parse from a TOML string. `lookup` resolves environment variable names.
    pub fn from_toml(
        content: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut table: Table = content.parse()?;
        apply_overrides(&mut table, "", &lookup)?;
        let config: AppConfig = Value::Table(table).try_into()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("app.name", &self.app.name),
            ("kafka.bootstrap-servers", &self.kafka.bootstrap_servers),
            ("kafka.input-topic", &self.kafka.input_topic),
            ("kafka.output-topic", &self.kafka.output_topic),
            ("gics.fhir.base", &self.gics.fhir.base),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Validation(format!("{key} must not be empty")));
            }
        }
        if self.kafka.num_consumers == 0 {
            return Err(ConfigError::Validation(
                "kafka.num-consumers must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Environment variable name for a dotted key path.
pub fn env_name(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            '.' | '-' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect()
}

fn apply_overrides(
    table: &mut Table,
    prefix: &str,
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    for (name, value) in table.iter_mut() {
        let key = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}.{name}")
        };

        if let Value::Table(nested) = value {
            apply_overrides(nested, &key, lookup)?;
            continue;
        }

        let Some(raw) = lookup(&env_name(&key)) else {
            continue;
        };
        debug!(key = %key, "configuration value overridden from environment");
        *value = coerce(value, &raw).ok_or_else(|| ConfigError::Override {
            key: key.clone(),
            value: raw.clone(),
        })?;
    }
    Ok(())
}

/// Parse `raw` into the type of the value it replaces.
fn coerce(current: &Value, raw: &str) -> Option<Value> {
    match current {
        Value::Integer(_) => raw.trim().parse().ok().map(Value::Integer),
        Value::Float(_) => raw.trim().parse().ok().map(Value::Float),
        Value::Boolean(_) => raw.trim().parse().ok().map(Value::Boolean),
        _ => Some(Value::String(raw.to_string())),
    }
}
