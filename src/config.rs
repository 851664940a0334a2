//! Engine configuration.

use crate::changesets::OperationKind;
use crate::error::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Configuration for a [`crate::LiveOverlayEngine`].
///
/// Every field has a default so a config file only needs to name the
/// values it overrides.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Working directory holding overlay stores, pointer files and
    /// rebuilt base dataset files.
    pub workspace: PathBuf,
    /// Base dataset file used when the workspace has no pointer file yet.
    pub base_file: PathBuf,
    /// Root URL of the changelog feed, e.g.
    /// `https://live.dbpedia.org/changesets/`.
    pub changeset_base_url: String,
    /// Changeset kinds folded into the overlays, in classification
    /// priority order.
    pub accepted_kinds: Vec<OperationKind>,
    /// Minutes between changeset polls.
    pub polling_interval_mins: u64,
    /// Minutes between full base dataset rebuilds.
    pub rebuild_interval_mins: u64,
    /// How many changelog hours are listed in parallel per window.
    pub hour_step: usize,
    /// Reconciliation stops once this many triples were folded.
    pub max_triples: usize,
    /// Reconciliation stops once this many changesets were folded.
    pub max_changesets: usize,
    /// Maximum number of query patterns tracked by the offset cache.
    pub query_limit: usize,
    /// Maximum number of offset entries per cached query pattern.
    pub offset_limit: usize,
    /// Expected number of rows in the base dataset, used by the
    /// probabilistic over-fetch model.
    pub expected_base_count: f64,
    /// Expected number of removed rows, used by the probabilistic
    /// over-fetch model.
    pub expected_removed_count: f64,
    /// Target probability of an under-fetch from the base reader.
    pub overfetch_failure_probability: f64,
    /// Expected number of removed triples the membership filter is
    /// sized for.
    pub filter_expected_items: usize,
    /// Target false positive rate of the membership filter.
    pub filter_error_rate: f64,
    /// External command folding the overlays into a new base dataset
    /// file. Invoked as `cmd <added> <removed> <base> <new-base>`.
    pub compaction_command: String,
    /// Number of sibling processes expected to acknowledge a rebuild
    /// before old storage is deleted. Zero for single-process setups.
    pub expected_cluster_members: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from("workspace"),
            base_file: PathBuf::from("base.nt"),
            changeset_base_url: "https://live.dbpedia.org/changesets/".to_string(),
            accepted_kinds: vec![OperationKind::Added, OperationKind::Removed],
            polling_interval_mins: 60,
            rebuild_interval_mins: 2880,
            hour_step: 10,
            max_triples: 350_000,
            max_changesets: 500,
            query_limit: 150,
            offset_limit: 500,
            expected_base_count: 300_000_000.0,
            expected_removed_count: 300_000.0,
            overfetch_failure_probability: 0.001,
            filter_expected_items: 500_000,
            filter_error_rate: 0.02,
            compaction_command: "./consolidate.sh".to_string(),
            expected_cluster_members: 0,
        }
    }
}

impl EngineConfig {
    /// Load a configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&contents)?;
        Ok(config)
    }
}
