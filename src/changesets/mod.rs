//! Changelog tracking: cursors into the upstream feed, fetching and
//! parsing of changeset files, reconciliation into net operation lists,
//! and the polling loop driving it all.

pub mod cursor;
pub mod fetcher;
pub mod manager;
pub mod poller;
pub mod reconciler;

pub use cursor::ChangeCursor;
pub use fetcher::{ChangeBatch, ChangelogFetcher, OperationKind};
pub use manager::{ChangesetManager, FetchOutcome};
pub use poller::PollingAgent;
pub use reconciler::{ReconciledOperationList, Reconciler};
