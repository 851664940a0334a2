//! Typed coordination messages between sibling processes.
//!
//! In a multi-process deployment one process owns the polling pipeline
//! and the others adopt the stores it publishes. The messages here are
//! advisory cache-invalidation signals, not a replication protocol: a
//! lost message only costs a sibling a redundant rebuild.

use std::path::PathBuf;
use tokio::sync::broadcast;

/// Messages exchanged between the polling owner and its siblings.
#[derive(Clone, Debug)]
pub enum ClusterMessage {
    /// Fresh overlay stores were swapped in at these locations.
    StoresUpdated { added: PathBuf, removed: PathBuf },
    /// A new base dataset file was swapped in.
    Rebuilt { base: PathBuf },
    /// A sibling finished adopting the last published state.
    AckAdopted { member: String },
}

/// Transport for cluster messages.
pub trait ClusterNotifier: Send + Sync {
    fn publish(&self, message: ClusterMessage);

    fn subscribe(&self) -> broadcast::Receiver<ClusterMessage>;
}

/// Single-process notifier backed by a broadcast channel. Sibling
/// transports (sockets, process messaging) implement the same trait.
pub struct LocalNotifier {
    sender: broadcast::Sender<ClusterMessage>,
}

impl LocalNotifier {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(16);
        Self { sender }
    }
}

impl Default for LocalNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterNotifier for LocalNotifier {
    fn publish(&self, message: ClusterMessage) {
        // No subscribers is fine; the message is advisory
        let _ = self.sender.send(message);
    }

    fn subscribe(&self) -> broadcast::Receiver<ClusterMessage> {
        self.sender.subscribe()
    }
}
