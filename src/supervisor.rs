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

//! Reconnect supervisor.
//!
//! Owns one slot per configured endpoint and keeps a link running in each
//! of them until shutdown:
//!
//! ```text
//! Idle -> Connecting -> Handshaking -> Streaming
//!   ^                                     |
//!   +------ Backoff <------ Faulted <-----+   (any outcome but Cancelled)
//! ```
//!
//! Link faults never escape a slot. The one thing that stops the
//! supervisor early is a storage failure: once a record cannot be made
//! durable every slot is cancelled and the error is returned.

use crate::backoff::Backoff;
use crate::config::{BackoffConfig, CollectorConfig, Endpoint, LinkSettings};
use crate::error::{CollectorError, Result, WriteError};
use crate::link::{Link, LinkOutcome, LinkState, LinkStats, LinkStatsSnapshot};
use crate::storage::RecordSink;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

struct Slot {
    endpoint: Endpoint,
    state: watch::Sender<LinkState>,
    stats: Arc<LinkStats>,
}

#[derive(Clone)]
struct SlotView {
    name: String,
    state: watch::Receiver<LinkState>,
    stats: Arc<LinkStats>,
}

/// Point-in-time view of one endpoint slot
#[derive(Debug, Clone, Serialize)]
pub struct SlotStatus {
    pub endpoint: String,
    pub state: LinkState,
    pub stats: LinkStatsSnapshot,
}

/// Keeps one live link per endpoint until shutdown
pub struct Supervisor {
    slots: Vec<Slot>,
    views: Vec<SlotView>,
    settings: LinkSettings,
    backoff: BackoffConfig,
    sink: Arc<dyn RecordSink>,
    cancel: CancellationToken,
}

impl Supervisor {
    pub fn new(
        endpoints: Vec<Endpoint>,
        settings: LinkSettings,
        backoff: BackoffConfig,
        sink: Arc<dyn RecordSink>,
    ) -> Self {
        let mut slots = Vec::with_capacity(endpoints.len());
        let mut views = Vec::with_capacity(endpoints.len());

        for endpoint in endpoints {
            let (state, state_rx) = watch::channel(LinkState::Idle);
            let stats = Arc::new(LinkStats::default());
            views.push(SlotView {
                name: endpoint.name.clone(),
                state: state_rx,
                stats: stats.clone(),
            });
            slots.push(Slot {
                endpoint,
                state,
                stats,
            });
        }

        Self {
            slots,
            views,
            settings,
            backoff,
            sink,
            cancel: CancellationToken::new(),
        }
    }

    pub fn from_config(config: &CollectorConfig, sink: Arc<dyn RecordSink>) -> Self {
        Self::new(
            config.endpoints.clone(),
            config.link.clone(),
            config.backoff.clone(),
            sink,
        )
    }

    /// Observe and stop the supervisor from elsewhere
    pub fn handle(&self) -> SupervisorHandle {
        SupervisorHandle {
            cancel: self.cancel.clone(),
            slots: Arc::new(self.views.clone()),
        }
    }

    /// Run every slot until shutdown or a storage failure
    pub async fn run(self) -> Result<()> {
        let Supervisor {
            slots,
            settings,
            backoff,
            sink,
            cancel,
            ..
        } = self;

        info!(
            "Supervising {} endpoint(s), writing to {} sink",
            slots.len(),
            sink.sink_type()
        );

        let mut tasks = JoinSet::new();
        for slot in slots {
            tasks.spawn(run_slot(
                slot,
                settings.clone(),
                backoff.clone(),
                sink.clone(),
                cancel.clone(),
            ));
        }

        let mut failure = None;
        while let Some(joined) = tasks.join_next().await {
            let err = match joined {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => CollectorError::Storage(e),
                Err(e) => CollectorError::SlotFailed(e.to_string()),
            };
            if failure.is_none() {
                error!("Stopping collector: {}", err);
                cancel.cancel();
                failure = Some(err);
            }
        }

        match failure {
            Some(err) => Err(err),
            None => {
                info!("All endpoint slots stopped");
                Ok(())
            }
        }
    }
}

async fn run_slot(
    slot: Slot,
    settings: LinkSettings,
    backoff: BackoffConfig,
    sink: Arc<dyn RecordSink>,
    cancel: CancellationToken,
) -> std::result::Result<(), WriteError> {
    let name = slot.endpoint.name.clone();
    let mut backoff = Backoff::new(&backoff);
    info!(endpoint = %name, "Starting slot for {}", slot.endpoint);

    let result = loop {
        if cancel.is_cancelled() {
            break Ok(());
        }

        let link = Link::new(
            slot.endpoint.clone(),
            settings.clone(),
            sink.clone(),
            slot.stats.clone(),
        );
        let outcome = match link.run(&slot.state, &cancel).await {
            Ok(outcome) => outcome,
            Err(e) => {
                slot.state.send_replace(LinkState::Faulted);
                error!(endpoint = %name, "Durable append failed: {}", e);
                break Err(e);
            }
        };
        if outcome == LinkOutcome::Cancelled {
            break Ok(());
        }

        let streamed = *slot.state.borrow() == LinkState::Streaming;
        slot.state.send_replace(LinkState::Faulted);
        slot.stats.record_fault();
        if streamed {
            backoff.reset();
        }

        let delay = backoff.next_delay();
        warn!(endpoint = %name, "Link ended ({}), reconnecting in {:?}", outcome, delay);
        slot.state.send_replace(LinkState::Backoff);

        tokio::select! {
            _ = cancel.cancelled() => break Ok(()),
            _ = tokio::time::sleep(delay) => {}
        }
        slot.state.send_replace(LinkState::Idle);
    };

    if result.is_ok() {
        slot.state.send_replace(LinkState::Stopped);
        info!(endpoint = %name, "Slot stopped");
    }
    result
}

/// Cloneable control and status handle for a [`Supervisor`]
#[derive(Clone)]
pub struct SupervisorHandle {
    cancel: CancellationToken,
    slots: Arc<Vec<SlotView>>,
}

impl SupervisorHandle {
    /// Ask every slot to stop; in-flight appends still complete
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn state(&self, endpoint: &str) -> Option<LinkState> {
        self.view(endpoint).map(|view| *view.state.borrow())
    }

    pub fn stats(&self, endpoint: &str) -> Option<LinkStatsSnapshot> {
        self.view(endpoint).map(|view| view.stats.snapshot())
    }

    pub fn status(&self) -> Vec<SlotStatus> {
        self.slots
            .iter()
            .map(|view| SlotStatus {
                endpoint: view.name.clone(),
                state: *view.state.borrow(),
                stats: view.stats.snapshot(),
            })
            .collect()
    }

    /// Wait until the slot for `endpoint` reports `target`
    ///
    /// Returns false on timeout or for an unknown endpoint. Short-lived
    /// phases can be missed; this is meant for steady states.
    pub async fn wait_for_state(&self, endpoint: &str, target: LinkState, within: Duration) -> bool {
        let Some(view) = self.view(endpoint) else {
            return false;
        };
        let mut state = view.state.clone();

        let reached = async move {
            loop {
                if *state.borrow_and_update() == target {
                    return true;
                }
                if state.changed().await.is_err() {
                    return *state.borrow() == target;
                }
            }
        };
        tokio::time::timeout(within, reached).await.unwrap_or(false)
    }

    fn view(&self, endpoint: &str) -> Option<&SlotView> {
        self.slots.iter().find(|view| view.name == endpoint)
    }
}
