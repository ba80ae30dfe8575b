// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Configuration types for sensor-collector

use crate::protocol::{Handshake, SourceKind, ACK_TOKEN, HANDSHAKE_TOKEN, POLL_REQUEST};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CollectorConfig {
    pub endpoints: Vec<Endpoint>,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub link: LinkSettings,
    #[serde(default)]
    pub backoff: BackoffConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_seconds: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            endpoints: vec![
                Endpoint::new("server1", "127.0.0.1", 5123, SourceKind::TemperaturePressure),
                Endpoint::new("server2", "127.0.0.1", 5124, SourceKind::Triaxial),
            ],
            storage: StorageConfig::default(),
            link: LinkSettings::default(),
            backoff: BackoffConfig::default(),
            logging: LoggingConfig::default(),
            shutdown_timeout_seconds: default_shutdown_timeout(),
        }
    }
}

impl CollectorConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }
}

/// One remote sensor server. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Endpoint {
    /// Label written next to every record from this source
    pub name: String,
    pub host: String,
    pub port: u16,
    pub kind: SourceKind,
}

impl Endpoint {
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16, kind: SourceKind) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            kind,
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:{}, {})", self.name, self.host, self.port, self.kind)
    }
}

/// Durable log settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data.txt"),
            format: LogFormat::default(),
        }
    }
}

/// Persisted line representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Per-connection timeouts and protocol tokens
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LinkSettings {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_ms: u64,

    /// Idle watchdog for the read loop; unset or 0 disables it
    #[serde(default)]
    pub idle_timeout_seconds: Option<u64>,

    #[serde(default = "default_handshake_token")]
    pub handshake_token: String,

    #[serde(default = "default_ack_token")]
    pub ack_token: String,

    /// Sent before every frame read; unset or empty means the peer streams on its own
    #[serde(default = "default_poll_request")]
    pub poll_request: Option<String>,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout(),
            handshake_timeout_ms: default_handshake_timeout(),
            idle_timeout_seconds: None,
            handshake_token: default_handshake_token(),
            ack_token: default_ack_token(),
            poll_request: default_poll_request(),
        }
    }
}

impl LinkSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_seconds
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn handshake(&self) -> Handshake {
        Handshake::new(
            self.handshake_token.clone().into_bytes(),
            self.ack_token.clone().into_bytes(),
        )
    }

    pub fn poll_request(&self) -> Option<Bytes> {
        self.poll_request
            .as_ref()
            .filter(|request| !request.is_empty())
            .map(|request| Bytes::from(request.clone().into_bytes()))
    }
}

/// Reconnect delay policy
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackoffConfig {
    #[serde(default = "default_backoff_initial")]
    pub initial_ms: u64,

    #[serde(default = "default_backoff_max")]
    pub max_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_ms: default_backoff_initial(),
            max_ms: default_backoff_max(),
            multiplier: default_backoff_multiplier(),
        }
    }
}

impl BackoffConfig {
    pub fn initial(&self) -> Duration {
        Duration::from_millis(self.initial_ms)
    }

    pub fn max(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,  // "trace", "debug", "info", "warn", "error"

    #[serde(default = "default_log_format")]
    pub format: String,  // "text", "json"
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_shutdown_timeout() -> u64 { 5 }
fn default_connect_timeout() -> u64 { 5000 }
fn default_handshake_timeout() -> u64 { 5000 }
fn default_handshake_token() -> String { String::from_utf8_lossy(HANDSHAKE_TOKEN).into_owned() }
fn default_ack_token() -> String { String::from_utf8_lossy(ACK_TOKEN).into_owned() }
fn default_poll_request() -> Option<String> { Some(String::from_utf8_lossy(POLL_REQUEST).into_owned()) }
fn default_backoff_initial() -> u64 { 2000 }
fn default_backoff_max() -> u64 { 10000 }
fn default_backoff_multiplier() -> f64 { 2.0 }
fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "text".to_string() }
