//! Execution of one paginated query against the logical dataset.
//!
//! A query runs as a small state machine: fetch an over-sized batch
//! from the base reader at a translated real offset, filter out removed
//! rows, decide whether another base round trip is needed, then merge
//! in rows from the added overlay and report the estimated total count.

use crate::cache::OffsetTranslationCache;
use crate::config::EngineConfig;
use crate::core::{Query, Triple, TriplePattern};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use super::{BaseSlot, OverlayPair};

/// Events delivered to a query consumer. At most one terminal event
/// (`End` or `Error`) is delivered, and nothing follows it.
#[derive(Clone, Debug)]
pub enum QueryEvent {
    /// Estimated number of triples matching the query pattern.
    Metadata { total_count: usize },
    Triple(Triple),
    End,
    Error(String),
}

/// Consumer side of a running query. Dropping the stream cancels the
/// query; stores are never locked per query, so no other cleanup is
/// needed.
pub struct QueryStream {
    receiver: mpsc::Receiver<QueryEvent>,
}

impl QueryStream {
    pub(crate) fn new(receiver: mpsc::Receiver<QueryEvent>) -> Self {
        Self { receiver }
    }

    pub async fn next_event(&mut self) -> Option<QueryEvent> {
        self.receiver.recv().await
    }

    /// Drain the stream into rows and the total count estimate.
    pub async fn collect(mut self) -> Result<(Vec<Triple>, usize), String> {
        let mut rows = Vec::new();
        let mut total_count = 0;
        while let Some(event) = self.next_event().await {
            match event {
                QueryEvent::Metadata { total_count: count } => total_count = count,
                QueryEvent::Triple(triple) => rows.push(triple),
                QueryEvent::End => return Ok((rows, total_count)),
                QueryEvent::Error(message) => return Err(message),
            }
        }
        Err("query stream closed without a terminal event".to_string())
    }
}

/// Over-fetch model for base reader requests.
///
/// Each base row is modeled as removed independently with probability
/// `p`. Requesting exactly `limit` rows would under-fetch whenever any
/// of them are removed, forcing another round trip; instead the fetch
/// size is raised until, by a Chernoff bound on the number of surviving
/// rows, the probability of under-fetching drops below the configured
/// failure probability.
#[derive(Clone, Copy, Debug)]
pub struct OverfetchModel {
    removal_probability: f64,
    failure_probability: f64,
}

impl OverfetchModel {
    pub fn from_config(config: &EngineConfig) -> Self {
        let base = config.expected_base_count.max(1.0);
        let removed = config.expected_removed_count.clamp(0.0, base);
        Self {
            removal_probability: removed / base,
            failure_probability: config.overfetch_failure_probability.clamp(1e-9, 0.5),
        }
    }

    /// The number of rows to request so that at least `limit` survive
    /// removal filtering with high probability. Unbounded queries stay
    /// unbounded.
    pub fn fetch_limit(&self, limit: Option<usize>) -> Option<usize> {
        let limit = limit?;
        let p = self.removal_probability;
        // E[exp(-t_i)] for the survival indicator t_i
        let moment = (1.0 - p) * (-1.0f64).exp() + p;
        let n = ((self.failure_probability.ln() - limit as f64) / moment.ln()).ceil();
        Some((n as usize).max(limit))
    }
}

/// Runs one query to completion, emitting events on its channel.
pub struct QueryExecutor {
    pub(crate) query: Query,
    pub(crate) base: Arc<BaseSlot>,
    pub(crate) overlays: Arc<OverlayPair>,
    pub(crate) offset_cache: Arc<Mutex<OffsetTranslationCache>>,
    pub(crate) overfetch: OverfetchModel,
    pub(crate) events: mpsc::Sender<QueryEvent>,
}

/// Offset cache entries are only recorded for limits at least this
/// large, to keep small page sizes from flooding the cache.
const CACHE_FEED_MIN_LIMIT: usize = 10;

impl QueryExecutor {
    pub async fn run(self) {
        if let Err(event) = self.execute().await {
            let _ = self.events.send(event).await;
        }
    }

    /// The happy path sends its own terminal event; errors come back as
    /// the returned event so `run` can deliver exactly one.
    async fn execute(&self) -> Result<(), QueryEvent> {
        let pattern = &self.query.pattern;
        let key = pattern.cache_key();
        let limit = self.query.limit;
        let offset = self.query.offset;

        let mut served = 0usize;
        let mut base_estimate = 0usize;
        let mut virtual_end = 0usize;

        // Base dataset rounds. Each round resumes at the closest known
        // real offset below the still-pending virtual offset; the walk
        // below refreshes the cache, so a retry round starts further in.
        loop {
            let anchor = self
                .offset_cache
                .lock()
                .expect("offset cache lock poisoned")
                .get_closest_lower(&key, offset + served);
            let fetch_limit = self.overfetch.fetch_limit(limit);
            let real_offset = anchor.real_offset;

            let (rows, estimate) = self
                .base
                .reader
                .search(pattern, fetch_limit, real_offset)
                .await
                .map_err(|e| QueryEvent::Error(e.to_string()))?;
            base_estimate = estimate;

            let removed_ids = self.confirm_removed(&rows).await?;

            // Walk the surviving rows, tracking the virtual position
            // and feeding fresh translations back into the cache.
            let mut counter = anchor.virtual_offset;
            let mut end_index = rows.len();
            for (index, row) in rows.iter().enumerate() {
                if removed_ids.contains(&row.id()) {
                    continue;
                }
                if let Some(page) = limit {
                    if page >= CACHE_FEED_MIN_LIMIT && counter % page == 0 {
                        self.cache_add(&key, counter, real_offset + index);
                    }
                }
                if counter >= offset + served && limit.map_or(true, |page| served < page) {
                    served += 1;
                    self.emit(QueryEvent::Triple(row.clone())).await?;
                }
                if limit.map_or(false, |page| served == page) {
                    end_index = index;
                    break;
                }
                counter += 1;
            }
            if !rows.is_empty() {
                self.cache_add(&key, counter, real_offset + end_index);
            }
            virtual_end = counter;

            let fetched_full = fetch_limit.map_or(false, |l| rows.len() == l);
            let need_more = limit.map_or(false, |page| served < page);
            if !(fetched_full && need_more) {
                break;
            }
        }

        // Added overlay continues the virtual sequence after the last
        // base row.
        if limit.map_or(true, |page| served < page) {
            let (added_limit, added_offset) = if served == 0 {
                (limit, offset.saturating_sub(virtual_end))
            } else {
                (limit.map(|page| page - served), 0)
            };
            let added_rows = self
                .overlays
                .added
                .get(pattern, added_limit, added_offset)
                .await
                .map_err(|e| QueryEvent::Error(e.to_string()))?;
            for row in added_rows {
                served += 1;
                self.emit(QueryEvent::Triple(row)).await?;
            }
        }

        let total_count = self.estimate_total(base_estimate, served).await?;
        self.emit(QueryEvent::Metadata { total_count }).await?;
        self.emit(QueryEvent::End).await?;
        Ok(())
    }

    /// Authoritative removal check for one base batch. The membership
    /// filter rules out the common case; only its positives are looked
    /// up in the removed store.
    async fn confirm_removed(&self, rows: &[Triple]) -> Result<HashSet<String>, QueryEvent> {
        let mut removed_ids = HashSet::new();
        for row in rows {
            let id = row.id();
            if !self.overlays.filter.may_contain(&id) {
                continue;
            }
            let found = self
                .overlays
                .removed
                .get(&TriplePattern::exact(row), Some(1), 0)
                .await
                .map_err(|e| QueryEvent::Error(e.to_string()))?;
            if !found.is_empty() {
                removed_ids.insert(id);
            }
        }
        Ok(removed_ids)
    }

    /// Rough estimate of how many triples match the query, never
    /// reporting fewer matches than already proven to exist.
    async fn estimate_total(
        &self,
        base_estimate: usize,
        served: usize,
    ) -> Result<usize, QueryEvent> {
        let pattern = &self.query.pattern;
        let added_size = self
            .overlays
            .added
            .approximate_size(pattern)
            .await
            .map_err(|e| QueryEvent::Error(e.to_string()))?;
        let removed_size = self
            .overlays
            .removed
            .approximate_size(pattern)
            .await
            .map_err(|e| QueryEvent::Error(e.to_string()))?;

        let mut estimate = (base_estimate + added_size).saturating_sub(removed_size);
        if estimate < self.query.offset + served {
            let reached_limit = self.query.limit.map_or(false, |page| served >= page);
            estimate = self.query.offset + if reached_limit { served * 2 } else { served };
        }
        Ok(estimate)
    }

    fn cache_add(&self, key: &str, virtual_offset: usize, real_offset: usize) {
        self.offset_cache
            .lock()
            .expect("offset cache lock poisoned")
            .add(key, virtual_offset, real_offset);
    }

    /// Forward an event, treating a dropped consumer as cancellation.
    async fn emit(&self, event: QueryEvent) -> Result<(), QueryEvent> {
        self.events
            .send(event)
            .await
            .map_err(|_| QueryEvent::End)
    }
}
