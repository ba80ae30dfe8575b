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

// Crash-consistent telemetry collector
//
// Keeps a TCP link open to every configured sensor source and:
// - Performs the token handshake and polls one frame at a time
// - Verifies each frame's checksum, dropping corrupt frames without reconnecting
// - Appends every valid record to a single fsync'd, line-granular log
// - Reconnects with capped exponential backoff, indefinitely
// - Stops the whole process if a record can no longer be made durable

pub mod backoff;
pub mod config;
pub mod error;
pub mod link;
pub mod mock;
pub mod protocol;
pub mod storage;
pub mod supervisor;

// Re-export main types
pub use backoff::Backoff;
pub use config::{load_config, load_config_with_env, CollectorConfig, Endpoint};
pub use error::{CollectorError, WriteError};
pub use link::{Link, LinkOutcome, LinkState, LinkStats, LinkStatsSnapshot};
pub use protocol::{
    decode_ack, decode_frame, encode_frame, encode_handshake, FrameError, Measurement, Record,
    SourceKind,
};
pub use storage::{DurableLog, MemorySink, RecordSink};
pub use supervisor::{SlotStatus, Supervisor, SupervisorHandle};
