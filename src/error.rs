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

// Error types for the collector
//
// Link faults never show up here: they are absorbed into a LinkOutcome and
// retried by the supervisor. What remains is what must stop the process.

use std::path::PathBuf;
use thiserror::Error;

/// Failure to make a record durable
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("Failed to open log {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to append to log {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Log {path} is unusable after an earlier write failure")]
    Poisoned { path: PathBuf },
}

/// Fatal collector errors returned by the supervisor
#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("Storage failure: {0}")]
    Storage(#[from] WriteError),

    #[error("Endpoint slot task failed: {0}")]
    SlotFailed(String),
}

pub type Result<T, E = CollectorError> = std::result::Result<T, E>;
