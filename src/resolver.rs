//! Recipient address to transport configuration.

use std::collections::HashMap;
use std::sync::Arc;

use lettre::message::Mailbox;

use crate::config::{ConfigMapping, DEFAULT_KEY, TransportConfig, validate_mapping};

/// Selects a [`TransportConfig`] per recipient by email domain, falling back
/// to the `default` entry.
///
/// The mapping is immutable for the resolver's lifetime.
#[derive(Debug)]
pub struct ConfigResolver {
    configs: HashMap<String, Arc<TransportConfig>>,
}

impl ConfigResolver {
    /// Build a resolver. Weak configurations are logged, never rejected.
    pub fn new(mapping: ConfigMapping) -> Self {
        if let Err(e) = validate_mapping(&mapping) {
            tracing::warn!("Weak mail configuration: {e}");
        }

        if mapping.contains_key(DEFAULT_KEY) {
            for (domain, config) in &mapping {
                if domain != DEFAULT_KEY
                    && let Err(e) = config.validate()
                {
                    tracing::debug!("Config for {domain} is invalid ({e}), default remains usable");
                }
            }
        }

        let configs = mapping
            .into_iter()
            .map(|(domain, config)| (domain, Arc::new(config)))
            .collect();

        Self { configs }
    }

    /// Find the configuration for `address`: exact domain first, then
    /// `default`. Returns `None` when neither exists.
    pub fn resolve(&self, address: &str) -> Option<Arc<TransportConfig>> {
        let domain = domain_of(address);
        self.configs
            .get(domain.as_str())
            .or_else(|| self.configs.get(DEFAULT_KEY))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}

/// Lookup key for an address.
///
/// A parseable address (`user@host` or `Name <user@host>`) yields its
/// domain. Anything else is split on `@` and the last segment is used; with no
/// `@` at all the key is [`DEFAULT_KEY`].
pub fn domain_of(address: &str) -> String {
    if let Ok(mailbox) = address.parse::<Mailbox>() {
        return mailbox.email.domain().to_string();
    }

    match address.rsplit_once('@') {
        Some((_, domain)) => domain.to_string(),
        None => DEFAULT_KEY.to_string(),
    }
}
