//! Minute-granularity polling loop driving the update pipeline.

use crate::config::EngineConfig;
use crate::engine::LiveOverlayEngine;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::cursor::ChangeCursor;

/// Drives periodic changeset polls and base dataset rebuilds.
///
/// The agent ticks once a minute. Every `polling_interval_mins` ticks
/// it runs a changeset check, every `rebuild_interval_mins` ticks a
/// full rebuild. A cycle runs to completion before the next tick is
/// honored, so polling, reconciliation and apply never overlap.
pub struct PollingAgent {
    polling_interval: u64,
    rebuild_interval: u64,
    shutdown: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PollingAgent {
    pub fn new(config: &EngineConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            polling_interval: config.polling_interval_mins.max(1),
            rebuild_interval: config.rebuild_interval_mins.max(1),
            shutdown,
            handle: Mutex::new(None),
        }
    }

    pub fn start(&self, engine: Arc<LiveOverlayEngine>) {
        let mut shutdown = self.shutdown.subscribe();
        let polling_interval = self.polling_interval;
        let rebuild_interval = self.rebuild_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(60));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick of a tokio interval fires immediately
            ticker.tick().await;

            let mut poll_counter = 0u64;
            let mut rebuild_counter = 0u64;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                        continue;
                    }
                }
                poll_counter += 1;
                rebuild_counter += 1;

                if rebuild_counter >= rebuild_interval {
                    rebuild_counter = 0;
                    if let Err(e) = engine.rebuild_base().await {
                        tracing::warn!("rebuild failed, keeping current base: {}", e);
                    }
                    continue;
                }
                if poll_counter >= polling_interval {
                    poll_counter = 0;
                    let from = engine.last_cursor().unwrap_or_else(ChangeCursor::now);
                    let to = ChangeCursor::now();
                    tracing::info!("polling changesets {} .. {}", from, to);
                    if let Err(e) = engine.check_for_changesets(&from, &to).await {
                        tracing::warn!("changeset poll failed: {}", e);
                    }
                }
            }
        });
        *self.handle.lock().expect("polling agent lock poisoned") = Some(handle);
    }

    /// Signal the polling task to stop after its current cycle.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Stop and wait for the polling task to wind down.
    pub async fn shutdown(&self) {
        self.stop();
        let handle = self.handle.lock().expect("polling agent lock poisoned").take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}
