//! Windowed walking of the changelog feed.

use crate::config::EngineConfig;
use futures_util::future::join_all;

use super::cursor::ChangeCursor;
use super::fetcher::{ChangeBatch, ChangelogFetcher};
use super::reconciler::{ReconciledOperationList, Reconciler};

/// Result of one changelog window: the net operations to apply, the
/// cursor to resume from, and whether the walk reached the upper bound.
#[derive(Debug)]
pub struct FetchOutcome {
    pub ops: ReconciledOperationList,
    pub resume: ChangeCursor,
    pub finished: bool,
}

/// Walks the changelog feed between two cursors in bounded windows.
///
/// Each window lists up to `hour_step` hours in parallel, downloads the
/// accepted changesets of those hours in parallel, and folds everything
/// through the reconciler. The window only moves past the fan-out once
/// every listing and download has resolved, successfully or not.
pub struct ChangesetManager {
    fetcher: ChangelogFetcher,
    hour_step: usize,
    max_triples: usize,
    max_changesets: usize,
}

impl ChangesetManager {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            fetcher: ChangelogFetcher::new(
                &config.changeset_base_url,
                config.accepted_kinds.clone(),
            ),
            hour_step: config.hour_step.max(1),
            max_triples: config.max_triples,
            max_changesets: config.max_changesets,
        }
    }

    /// Fetch and reconcile one window of the feed starting at `from`.
    ///
    /// Fetch failures degrade to zero files for the affected hour, so
    /// the window always completes; resumption is driven purely by the
    /// cursors of the changesets actually folded in.
    pub async fn collect_window(&self, from: &ChangeCursor, to: &ChangeCursor) -> FetchOutcome {
        // Sequences already consumed in the starting hour are skipped
        let first_min_seq = if from.sequence == 0 { 0 } else { from.sequence + 1 };

        let mut hours = Vec::new();
        let mut hour = *from;
        hour.zero_sequence();
        while hours.len() < self.hour_step && hour.is_smaller_or_equal(to) {
            hours.push(hour);
            hour.advance_hour();
        }
        if hours.is_empty() {
            return FetchOutcome {
                ops: ReconciledOperationList::default(),
                resume: *from,
                finished: true,
            };
        }
        let covered_all = !hour.is_smaller_or_equal(to);

        let fetches = hours.iter().enumerate().map(|(position, hour)| {
            let min_seq = if position == 0 { first_min_seq } else { 0 };
            let max_seq = if hour.is_same_hour(to) { to.sequence } else { 0 };
            self.fetcher.fetch_hour(hour, min_seq, max_seq)
        });
        let batches: Vec<ChangeBatch> =
            join_all(fetches).await.into_iter().flatten().collect();
        tracing::debug!(
            "changelog window {} .. {}: {} changesets",
            hours[0].hour_path(),
            hours[hours.len() - 1].hour_path(),
            batches.len()
        );

        let ops = Reconciler::new(self.max_triples, self.max_changesets)
            .reconcile(&batches)
            .await;
        let capped = !ops.exhausted;

        let resume = if capped {
            ops.consumed_up_to
                .expect("a capped fold consumed at least one changeset")
        } else if !covered_all {
            hours[hours.len() - 1].next_hour()
        } else {
            // The whole range was folded. Resume inside the upper
            // bound's hour when we consumed changesets there, else at
            // the start of that hour so newly published files are
            // picked up next time.
            match ops.consumed_up_to {
                Some(cursor) if cursor.is_same_hour(to) => cursor,
                _ => {
                    let mut resume = *to;
                    resume.zero_sequence();
                    resume
                }
            }
        };

        FetchOutcome { ops, resume, finished: covered_all && !capped }
    }
}
