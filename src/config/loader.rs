// Configuration loader with environment variable substitution

use super::types::*;
use anyhow::{bail, Context, Result};
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file with environment variable substitution
    pub fn load<P: AsRef<Path>>(path: P) -> Result<CollectorConfig> {
        let content = std::fs::read_to_string(path.as_ref())
            .context("Failed to read config file")?;

        Self::parse(&content)
    }

    /// Parse and validate configuration text
    pub fn parse(content: &str) -> Result<CollectorConfig> {
        let content = Self::substitute_env_vars(content);

        let config: CollectorConfig = serde_yaml::from_str(&content)
            .context("Failed to parse YAML configuration")?;

        Self::validate(&config)?;

        Ok(config)
    }

    /// Substitute ${VAR} and ${VAR:-default} patterns with environment variables
    ///
    /// Examples:
    /// - ${HOME} -> /home/user
    /// - ${SENSOR_HOST:-127.0.0.1} -> 127.0.0.1 (if SENSOR_HOST not set)
    fn substitute_env_vars(content: &str) -> String {
        let re = Regex::new(r"\$\{([^}:]+)(?::-([^}]+))?\}").expect("valid env var pattern");

        re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default_value = caps.get(2).map(|m| m.as_str());

            match std::env::var(var_name) {
                Ok(value) => value,
                Err(_) => {
                    if let Some(default) = default_value {
                        default.to_string()
                    } else {
                        // Keep original if no default and var not found
                        format!("${{{}}}", var_name)
                    }
                }
            }
        }).to_string()
    }

    /// Validate configuration
    pub fn validate(config: &CollectorConfig) -> Result<()> {
        if config.endpoints.is_empty() {
            bail!("endpoints must list at least one sensor source");
        }

        let mut names = HashSet::new();
        for endpoint in &config.endpoints {
            if endpoint.name.is_empty() || endpoint.name.contains(char::is_whitespace) {
                bail!(
                    "endpoint name '{}' must be non-empty and contain no whitespace",
                    endpoint.name
                );
            }
            if !names.insert(endpoint.name.as_str()) {
                bail!("duplicate endpoint name '{}'", endpoint.name);
            }
            if endpoint.host.is_empty() {
                bail!("endpoint '{}' has an empty host", endpoint.name);
            }
            if endpoint.port == 0 {
                bail!("endpoint '{}' port must be > 0", endpoint.name);
            }
        }

        if config.storage.path.as_os_str().is_empty() {
            bail!("storage.path cannot be empty");
        }

        // Validate link timeouts
        if config.link.connect_timeout_ms == 0 {
            bail!("link.connect_timeout_ms must be > 0");
        }

        if config.link.handshake_timeout_ms == 0 {
            bail!("link.handshake_timeout_ms must be > 0");
        }

        if config.link.handshake_token.is_empty() || config.link.ack_token.is_empty() {
            bail!("link.handshake_token and link.ack_token cannot be empty");
        }

        // Reconnect delay must stay bounded on both sides
        if config.backoff.initial_ms == 0 {
            bail!("backoff.initial_ms must be > 0");
        }

        if config.backoff.max_ms < config.backoff.initial_ms {
            bail!("backoff.max_ms must be >= backoff.initial_ms");
        }

        if !config.backoff.multiplier.is_finite() || config.backoff.multiplier < 1.0 {
            bail!("backoff.multiplier must be >= 1.0");
        }

        match config.logging.format.as_str() {
            "text" | "json" => {}
            unknown => bail!("Unknown logging.format: '{}'. Supported: text, json", unknown),
        }

        Ok(())
    }
}
