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

// Crash-consistent append-only log
//
// Each record is one line. A line is written with a single write_all and
// forced to media with fdatasync before append() returns, and only one
// append runs at a time. A crash can therefore leave at most one torn line
// at the very end of the file, and `open` cuts that line off again.

use super::backend::RecordSink;
use crate::config::{LogFormat, StorageConfig};
use crate::error::WriteError;
use crate::protocol::Record;
use async_trait::async_trait;
use std::fs::OpenOptions;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

const TAIL_SCAN_CHUNK: usize = 4096;

struct LogFile {
    file: File,
    /// Length of the file up to the last committed record
    len: u64,
    poisoned: bool,
}

/// Durable, line-granular record log shared by every link
pub struct DurableLog {
    path: PathBuf,
    format: LogFormat,
    inner: Mutex<LogFile>,
    committed: AtomicU64,
}

impl DurableLog {
    /// Open (or create) the log, dropping any torn tail from a previous crash
    pub fn open(config: &StorageConfig) -> Result<Self, WriteError> {
        let path = config.path.clone();
        let open_err = |source| WriteError::Open {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.exists() {
                info!("Creating log directory: {}", parent.display());
                std::fs::create_dir_all(parent).map_err(open_err)?;
            }
        }

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .map_err(open_err)?;

        let (len, dropped) = repair_tail(&mut file).map_err(open_err)?;
        if dropped > 0 {
            warn!(
                "Dropped {} bytes of incomplete record at the end of {}",
                dropped,
                path.display()
            );
        }
        file.sync_all().map_err(open_err)?;
        sync_parent_dir(&path);

        info!(
            "Durable log opened at {} ({} bytes, format {:?})",
            path.display(),
            len,
            config.format
        );

        Ok(Self {
            path,
            format: config.format,
            inner: Mutex::new(LogFile {
                file: File::from_std(file),
                len,
                poisoned: false,
            }),
            committed: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records appended by this process
    pub fn committed(&self) -> u64 {
        self.committed.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl RecordSink for DurableLog {
    async fn append(&self, source: &str, record: &Record) -> Result<(), WriteError> {
        let mut line = self.format.render(source, record)?;
        line.push('\n');

        let mut inner = self.inner.lock().await;
        if inner.poisoned {
            return Err(WriteError::Poisoned {
                path: self.path.clone(),
            });
        }

        match write_durably(&mut inner.file, line.as_bytes()).await {
            Ok(()) => {
                inner.len += line.len() as u64;
                self.committed.fetch_add(1, Ordering::Relaxed);
                debug!(source, "{}", line.trim_end());
                Ok(())
            }
            Err(source) => {
                inner.poisoned = true;
                let committed_len = inner.len;
                if let Err(e) = inner.file.set_len(committed_len).await {
                    warn!(
                        "Could not roll {} back to {} bytes: {}",
                        self.path.display(),
                        committed_len,
                        e
                    );
                }
                error!("Durable append to {} failed: {}", self.path.display(), source);
                Err(WriteError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        }
    }

    fn sink_type(&self) -> &str {
        "durable_log"
    }
}

async fn write_durably(file: &mut File, bytes: &[u8]) -> io::Result<()> {
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_data().await
}

/// Truncate the file back to its last newline.
///
/// Returns the resulting length and the number of bytes removed.
fn repair_tail(file: &mut std::fs::File) -> io::Result<(u64, u64)> {
    let len = file.metadata()?.len();
    let mut end = len;
    let mut chunk = vec![0u8; TAIL_SCAN_CHUNK];

    while end > 0 {
        let start = end.saturating_sub(TAIL_SCAN_CHUNK as u64);
        let n = (end - start) as usize;
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(&mut chunk[..n])?;

        if let Some(idx) = chunk[..n].iter().rposition(|b| *b == b'\n') {
            let keep = start + idx as u64 + 1;
            if keep < len {
                file.set_len(keep)?;
            }
            return Ok((keep, len - keep));
        }
        end = start;
    }

    if len > 0 {
        file.set_len(0)?;
    }
    Ok((0, len))
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    if let Err(e) = std::fs::File::open(parent).and_then(|dir| dir.sync_all()) {
        warn!("Could not sync directory {}: {}", parent.display(), e);
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) {}
