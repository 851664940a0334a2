//! Folding changeset batches into a minimal net operation list.

use crate::core::Triple;
use std::collections::HashMap;

use super::cursor::ChangeCursor;
use super::fetcher::{ChangeBatch, OperationKind};

/// The net effect of a run of changesets.
///
/// No triple appears in both lists: an add followed later by a remove
/// of the same triple cancels out, and vice versa. Within each list a
/// triple appears at most once, in batch-arrival order.
#[derive(Clone, Debug, Default)]
pub struct ReconciledOperationList {
    pub added: Vec<Triple>,
    pub removed: Vec<Triple>,
    /// Cursor of the last changeset folded in, if any.
    pub consumed_up_to: Option<ChangeCursor>,
    /// False when the triple or changeset cap stopped the fold early;
    /// the caller resumes from `consumed_up_to` without reprocessing.
    pub exhausted: bool,
}

impl ReconciledOperationList {
    pub fn new(added: Vec<Triple>, removed: Vec<Triple>) -> Self {
        Self { added, removed, consumed_up_to: None, exhausted: true }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// One side of the fold: insertion-ordered net operations with O(1)
/// membership and cancellation.
#[derive(Default)]
struct NetSide {
    order: Vec<Option<Triple>>,
    index: HashMap<Triple, usize>,
}

impl NetSide {
    fn insert(&mut self, triple: &Triple) {
        if self.index.contains_key(triple) {
            return;
        }
        self.index.insert(triple.clone(), self.order.len());
        self.order.push(Some(triple.clone()));
    }

    /// Retract a previously recorded operation. Returns false when the
    /// triple was never recorded on this side.
    fn cancel(&mut self, triple: &Triple) -> bool {
        match self.index.remove(triple) {
            Some(position) => {
                self.order[position] = None;
                true
            }
            None => false,
        }
    }

    fn finalize(self) -> Vec<Triple> {
        self.order.into_iter().flatten().collect()
    }
}

/// Folds changeset batches, oldest first, into a
/// [`ReconciledOperationList`].
///
/// The fold is bounded: after `max_triples` triples or `max_changesets`
/// changesets it stops and reports where it got to, so a catch-up after
/// a long outage is chunked into several polling cycles instead of one
/// unbounded pass. Between changesets the async wrapper yields so
/// concurrent queries keep running.
pub struct Reconciler {
    max_triples: usize,
    max_changesets: usize,
}

impl Reconciler {
    pub fn new(max_triples: usize, max_changesets: usize) -> Self {
        Self { max_triples, max_changesets }
    }

    /// Fold `batches` (already in cursor order) into a net operation
    /// list.
    pub async fn reconcile(&self, batches: &[ChangeBatch]) -> ReconciledOperationList {
        let mut added = NetSide::default();
        let mut removed = NetSide::default();
        let mut triples = 0usize;
        let mut changesets = 0usize;
        let mut consumed_up_to = None;
        let mut exhausted = true;

        for (position, batch) in batches.iter().enumerate() {
            let (same, opposite) = match batch.kind {
                OperationKind::Added => (&mut added, &mut removed),
                OperationKind::Removed => (&mut removed, &mut added),
            };
            for triple in &batch.triples {
                if !opposite.cancel(triple) {
                    same.insert(triple);
                }
            }
            triples += batch.triples.len();
            changesets += 1;
            consumed_up_to = Some(batch.source);

            if triples >= self.max_triples || changesets >= self.max_changesets {
                if position + 1 < batches.len() {
                    exhausted = false;
                }
                tracing::debug!(
                    "reconciliation stopped at {} triples / {} changesets",
                    triples,
                    changesets
                );
                break;
            }
            tokio::task::yield_now().await;
        }

        ReconciledOperationList {
            added: added.finalize(),
            removed: removed.finalize(),
            consumed_up_to,
            exhausted,
        }
    }
}
