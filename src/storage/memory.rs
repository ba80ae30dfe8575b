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

// In-memory sink used by tests

use super::backend::RecordSink;
use crate::error::WriteError;
use crate::protocol::Record;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;

/// Keeps every appended record in memory, in append order
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<(String, Record)>>,
    failing: AtomicBool,
    appended: Notify,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later append fail as if the disk were full
    pub fn fail_writes(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<(String, Record)> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records that came from one source
    pub fn records_from(&self, source: &str) -> Vec<Record> {
        self.records()
            .into_iter()
            .filter(|(name, _)| name == source)
            .map(|(_, record)| record)
            .collect()
    }

    /// Wait until at least `count` records have been appended
    pub async fn wait_for(&self, count: usize) {
        loop {
            let notified = self.appended.notified();
            if self.len() >= count {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn append(&self, source: &str, record: &Record) -> Result<(), WriteError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(WriteError::Io {
                path: PathBuf::from("memory"),
                source: std::io::Error::new(std::io::ErrorKind::Other, "simulated disk full"),
            });
        }

        if let Ok(mut records) = self.records.lock() {
            records.push((source.to_string(), *record));
        }
        self.appended.notify_waiters();
        Ok(())
    }

    fn sink_type(&self) -> &str {
        "memory"
    }
}
