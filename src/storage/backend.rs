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

// Record sink trait for append-only capture

use crate::error::WriteError;
use crate::protocol::Record;
use async_trait::async_trait;

/// Destination for validated records
///
/// Every link hands its records to one shared sink. Implementations must
/// serialize concurrent appends and return only once the record is durable:
/// the link treats a frame as processed as soon as `append` returns `Ok`.
///
/// Query operations are NOT part of this trait - logged data is read
/// with ordinary file tools.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Append a single record on behalf of the named source
    ///
    /// # Arguments
    /// * `source` - Endpoint name the record came from
    /// * `record` - Decoded, checksum-verified record
    async fn append(&self, source: &str, record: &Record) -> Result<(), WriteError>;

    /// Get sink type identifier
    fn sink_type(&self) -> &str;
}
