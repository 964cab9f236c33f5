//! Configuration types.

use std::collections::HashMap;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};

use crate::error::{ConfigError, FieldError};

/// Mapping key used when no domain-specific configuration matches.
pub const DEFAULT_KEY: &str = "default";

/// Domain (or [`DEFAULT_KEY`]) to transport configuration.
pub type ConfigMapping = HashMap<String, TransportConfig>;

/// Parameters needed to open and authenticate one outbound SMTP connection.
#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    /// Wrap the connection in TLS before any SMTP exchange.
    #[serde(default)]
    pub use_secure_channel: bool,
    pub host: String,
    /// Held wider than `u16` so out-of-range values reach validation.
    pub port: u32,
    /// Login name; also used as the sender address.
    pub username: String,
    #[serde(deserialize_with = "deserialize_secret")]
    pub password: SecretString,
    #[serde(default)]
    pub skip_certificate_verification: bool,
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

impl TransportConfig {
    pub fn new(
        host: impl Into<String>,
        port: u32,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            use_secure_channel: false,
            host: host.into(),
            port,
            username: username.into(),
            password: SecretString::from(password.into()),
            skip_certificate_verification: false,
        }
    }

    /// Use implicit TLS for this configuration.
    pub fn secure(mut self, skip_certificate_verification: bool) -> Self {
        self.use_secure_channel = true;
        self.skip_certificate_verification = skip_certificate_verification;
        self
    }

    /// Check the fields required to open an authenticated connection.
    pub fn validate(&self) -> Result<(), FieldError> {
        if self.host.is_empty() {
            return Err(FieldError::EmptyHost);
        }
        if !(1..=u32::from(u16::MAX)).contains(&self.port) {
            return Err(FieldError::InvalidPort(self.port));
        }
        if self.username.is_empty() {
            return Err(FieldError::EmptyUsername);
        }
        if self.password.expose_secret().is_empty() {
            return Err(FieldError::EmptyPassword);
        }
        Ok(())
    }
}

/// Check a whole mapping and report the first weakness found.
///
/// - An empty mapping is weak.
/// - Without a `default` entry, every entry must validate.
/// - With a `default` entry, only the default must validate; other entries
///   may be broken because lookups still fall back.
pub fn validate_mapping(mapping: &ConfigMapping) -> Result<(), ConfigError> {
    if mapping.is_empty() {
        return Err(ConfigError::EmptyMapping);
    }

    match mapping.get(DEFAULT_KEY) {
        Some(default) => default.validate().map_err(ConfigError::InvalidDefault),
        None => {
            let mut domains: Vec<&String> = mapping.keys().collect();
            domains.sort();
            for domain in domains {
                mapping[domain]
                    .validate()
                    .map_err(|source| ConfigError::InvalidEntry {
                        domain: domain.clone(),
                        source,
                    })?;
            }
            Ok(())
        }
    }
}

/// Dispatch tuning. The defaults keep one unbounded unit per recipient and
/// drop recipients that resolve to no configuration.
#[derive(Debug, Clone, Default)]
pub struct DispatchOptions {
    /// Maximum number of recipients in flight at once.
    pub max_concurrency: Option<usize>,
    /// Report unresolvable recipients as errors instead of dropping them.
    pub report_unresolved: bool,
}
