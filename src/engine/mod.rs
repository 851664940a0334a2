//! The live overlay engine: owns the base reader handle and the overlay
//! store pair, answers queries against the logical union, applies
//! reconciled operation lists, and coordinates rebuilds.

pub mod coordination;
pub mod executor;

pub use coordination::{ClusterMessage, ClusterNotifier, LocalNotifier};
pub use executor::{OverfetchModel, QueryEvent, QueryExecutor, QueryStream};

use crate::cache::OffsetTranslationCache;
use crate::changesets::{ChangeCursor, ChangesetManager, FetchOutcome, ReconciledOperationList};
use crate::config::EngineConfig;
use crate::core::{Query, Triple, TriplePattern};
use crate::error::{Error, Result};
use crate::filters::RemovalMembershipFilter;
use crate::store::{
    read_pointer, write_pointer, BaseReader, FileBaseReader, FileStoreFactory, OverlayStoreFactory,
    TripleStore,
};
use arc_swap::ArcSwap;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

const BASE_POINTER: &str = "base_location.txt";
const ADDED_POINTER: &str = "added_location.txt";
const REMOVED_POINTER: &str = "removed_location.txt";
const CURSOR_FILE: &str = "last_cursor.txt";

/// The active base dataset handle. Swapped wholesale on rebuild;
/// queries hold the slot they loaded at start.
pub struct BaseSlot {
    pub reader: Box<dyn BaseReader>,
    pub path: PathBuf,
}

/// The active overlay stores and the membership filter built over the
/// removed one. Built together and swapped as one unit, so a query
/// never observes a half-swapped pair.
pub struct OverlayPair {
    pub added: Box<dyn TripleStore>,
    pub removed: Box<dyn TripleStore>,
    pub filter: RemovalMembershipFilter,
}

/// Live-updatable overlay engine over a base dataset.
///
/// Queries run fully concurrently with each other and with the polling
/// pipeline; the pipeline itself (fetch, reconcile, apply, rebuild) is
/// strictly sequential under an internal lock.
pub struct LiveOverlayEngine {
    config: EngineConfig,
    base: ArcSwap<BaseSlot>,
    overlays: ArcSwap<OverlayPair>,
    offset_cache: Arc<Mutex<OffsetTranslationCache>>,
    factory: Box<dyn OverlayStoreFactory>,
    notifier: Arc<dyn ClusterNotifier>,
    apply_lock: tokio::sync::Mutex<()>,
    stamp: AtomicU64,
}

impl LiveOverlayEngine {
    /// Open an engine from its workspace, resuming from the pointer
    /// files of the last successful swap when present.
    pub async fn open(config: EngineConfig) -> Result<Self> {
        Self::open_with(config, Box::new(FileStoreFactory), Arc::new(LocalNotifier::new())).await
    }

    /// Open with custom store and notification collaborators.
    pub async fn open_with(
        config: EngineConfig,
        factory: Box<dyn OverlayStoreFactory>,
        notifier: Arc<dyn ClusterNotifier>,
    ) -> Result<Self> {
        std::fs::create_dir_all(&config.workspace)?;

        let base_path = read_pointer(&config.workspace.join(BASE_POINTER))
            .unwrap_or_else(|| config.base_file.clone());
        let reader = FileBaseReader::open(&base_path);

        let added_path = read_pointer(&config.workspace.join(ADDED_POINTER))
            .unwrap_or_else(|| config.workspace.join("added.db"));
        let removed_path = read_pointer(&config.workspace.join(REMOVED_POINTER))
            .unwrap_or_else(|| config.workspace.join("removed.db"));
        let added = factory.open_or_create(&added_path).await?;
        let removed = factory.open_or_create(&removed_path).await?;

        let mut filter =
            RemovalMembershipFilter::new(config.filter_expected_items, config.filter_error_rate);
        for row in removed.stream().await? {
            filter.add(&row.id());
        }

        write_pointer(&config.workspace.join(BASE_POINTER), &base_path)?;
        write_pointer(&config.workspace.join(ADDED_POINTER), &added_path)?;
        write_pointer(&config.workspace.join(REMOVED_POINTER), &removed_path)?;

        let offset_cache = Arc::new(Mutex::new(OffsetTranslationCache::new(
            config.query_limit,
            config.offset_limit,
        )));

        Ok(Self {
            config,
            base: ArcSwap::from_pointee(BaseSlot { reader: Box::new(reader), path: base_path }),
            overlays: ArcSwap::from_pointee(OverlayPair { added, removed, filter }),
            offset_cache,
            factory,
            notifier,
            apply_lock: tokio::sync::Mutex::new(()),
            stamp: AtomicU64::new(0),
        })
    }

    /// Run a paginated query. The returned stream yields triples, one
    /// metadata event with the total count estimate, and a terminal
    /// end or error event.
    pub fn select(&self, query: Query) -> QueryStream {
        let mut query = query;
        if query.limit == Some(0) {
            query.limit = None;
        }

        let (sender, receiver) = mpsc::channel(64);
        let executor = QueryExecutor {
            query,
            base: self.base.load_full(),
            overlays: self.overlays.load_full(),
            offset_cache: Arc::clone(&self.offset_cache),
            overfetch: OverfetchModel::from_config(&self.config),
            events: sender,
        };
        tokio::spawn(executor.run());
        QueryStream::new(receiver)
    }

    /// Apply a reconciled operation list to the overlays.
    ///
    /// The live stores are never touched: replacements are built at
    /// fresh locations, triples staged against the opposite live
    /// overlay are cancelled instead of written, and the pair is
    /// swapped in atomically once complete.
    pub async fn apply_operation_list(&self, ops: ReconciledOperationList) -> Result<()> {
        let _guard = self.apply_lock.lock().await;
        if ops.is_empty() {
            return Ok(());
        }
        let current = self.overlays.load_full();
        tracing::info!(
            "applying operation list: {} added, {} removed",
            ops.added.len(),
            ops.removed.len()
        );

        // Intersection elimination. A remove of a live-added triple
        // retracts the add before it ever reaches the base dataset;
        // an add of a live-removed triple restores the base row.
        let mut cancelled_added = HashSet::new();
        let mut surviving_removed = Vec::new();
        for triple in &ops.removed {
            let hits = current.added.get(&TriplePattern::exact(triple), Some(1), 0).await?;
            if hits.is_empty() {
                surviving_removed.push(triple.clone());
            } else {
                cancelled_added.insert(triple.id());
            }
        }
        let mut cancelled_removed = HashSet::new();
        let mut surviving_added = Vec::new();
        for triple in &ops.added {
            let hits = current.removed.get(&TriplePattern::exact(triple), Some(1), 0).await?;
            if hits.is_empty() {
                surviving_added.push(triple.clone());
            } else {
                cancelled_removed.insert(triple.id());
            }
        }

        // Copy-then-append into fresh stores
        let stamp = self.next_stamp();
        let new_added_path = self.config.workspace.join(format!("added-{}", stamp));
        let new_removed_path = self.config.workspace.join(format!("removed-{}", stamp));

        let new_added = self.factory.create(&new_added_path).await?;
        let kept: Vec<Triple> = current
            .added
            .stream()
            .await?
            .into_iter()
            .filter(|t| !cancelled_added.contains(&t.id()))
            .collect();
        new_added.put(&kept).await?;
        new_added.put(&surviving_added).await?;

        let new_removed = self.factory.create(&new_removed_path).await?;
        let kept: Vec<Triple> = current
            .removed
            .stream()
            .await?
            .into_iter()
            .filter(|t| !cancelled_removed.contains(&t.id()))
            .collect();
        new_removed.put(&kept).await?;
        new_removed.put(&surviving_removed).await?;

        // The filter only grows; retracted removes leave stale
        // positives that the store lookup resolves
        let mut filter = current.filter.clone();
        for triple in &surviving_removed {
            filter.add(&triple.id());
        }

        self.offset_cache.lock().expect("offset cache lock poisoned").flush();

        let old_added_path = current.added.location().to_path_buf();
        let old_removed_path = current.removed.location().to_path_buf();
        self.overlays.store(Arc::new(OverlayPair {
            added: new_added,
            removed: new_removed,
            filter,
        }));
        write_pointer(&self.config.workspace.join(ADDED_POINTER), &new_added_path)?;
        write_pointer(&self.config.workspace.join(REMOVED_POINTER), &new_removed_path)?;

        tokio::spawn(async move {
            let _ = tokio::fs::remove_dir_all(old_added_path).await;
            let _ = tokio::fs::remove_dir_all(old_removed_path).await;
        });
        self.notifier.publish(ClusterMessage::StoresUpdated {
            added: new_added_path,
            removed: new_removed_path,
        });
        Ok(())
    }

    /// Fold the overlays into a new base dataset file via the external
    /// compaction command, then swap to the new file with fresh empty
    /// overlays.
    ///
    /// On failure the current base dataset and overlays stay
    /// authoritative; the caller logs and retries on the next cycle.
    pub async fn rebuild_base(&self) -> Result<()> {
        let _guard = self.apply_lock.lock().await;
        let base = self.base.load_full();
        let overlays = self.overlays.load_full();

        let stamp = self.next_stamp();
        let new_base_path = self.config.workspace.join(format!("base-{}.nt", stamp));
        tracing::info!(
            "rebuilding base dataset {} -> {}",
            base.path.display(),
            new_base_path.display()
        );

        let status = tokio::process::Command::new(&self.config.compaction_command)
            .arg(overlays.added.location())
            .arg(overlays.removed.location())
            .arg(&base.path)
            .arg(&new_base_path)
            .status()
            .await
            .map_err(|e| {
                Error::Rebuild(format!("{}: {}", self.config.compaction_command, e))
            })?;
        if !status.success() {
            return Err(Error::Rebuild(format!("compaction exited with {}", status)));
        }
        if !new_base_path.exists() {
            return Err(Error::Rebuild("compaction produced no output file".to_string()));
        }

        let new_reader = FileBaseReader::open(&new_base_path);
        let new_added_path = self.config.workspace.join(format!("added-{}", stamp));
        let new_removed_path = self.config.workspace.join(format!("removed-{}", stamp));
        let new_added = self.factory.create(&new_added_path).await?;
        let new_removed = self.factory.create(&new_removed_path).await?;
        let filter = RemovalMembershipFilter::new(
            self.config.filter_expected_items,
            self.config.filter_error_rate,
        );

        self.offset_cache.lock().expect("offset cache lock poisoned").flush();

        let old_base_path = base.path.clone();
        let old_added_path = overlays.added.location().to_path_buf();
        let old_removed_path = overlays.removed.location().to_path_buf();

        self.base.store(Arc::new(BaseSlot {
            reader: Box::new(new_reader),
            path: new_base_path.clone(),
        }));
        self.overlays.store(Arc::new(OverlayPair {
            added: new_added,
            removed: new_removed,
            filter,
        }));
        write_pointer(&self.config.workspace.join(BASE_POINTER), &new_base_path)?;
        write_pointer(&self.config.workspace.join(ADDED_POINTER), &new_added_path)?;
        write_pointer(&self.config.workspace.join(REMOVED_POINTER), &new_removed_path)?;

        // Old storage is only deleted once every sibling has adopted
        // the new base file
        let acks = self.notifier.subscribe();
        let expected = self.config.expected_cluster_members;
        self.notifier.publish(ClusterMessage::Rebuilt { base: new_base_path });
        tokio::spawn(async move {
            await_adoption(acks, expected).await;
            let _ = tokio::fs::remove_file(old_base_path).await;
            let _ = tokio::fs::remove_dir_all(old_added_path).await;
            let _ = tokio::fs::remove_dir_all(old_removed_path).await;
        });
        Ok(())
    }

    /// Fetch changesets between the two cursors, reconcile them and
    /// apply the result, in bounded windows, persisting the cursor
    /// after each applied window.
    pub async fn check_for_changesets(
        &self,
        from: &ChangeCursor,
        to: &ChangeCursor,
    ) -> Result<ChangeCursor> {
        let manager = ChangesetManager::new(&self.config);
        let mut cursor = *from;
        loop {
            let FetchOutcome { ops, resume, finished } =
                manager.collect_window(&cursor, to).await;
            if !ops.is_empty() {
                self.apply_operation_list(ops).await?;
            }
            self.persist_cursor(&resume)?;
            cursor = resume;
            if finished {
                break;
            }
        }
        Ok(cursor)
    }

    /// The cursor reached by the last applied changeset window.
    pub fn last_cursor(&self) -> Option<ChangeCursor> {
        let contents = std::fs::read_to_string(self.config.workspace.join(CURSOR_FILE)).ok()?;
        ChangeCursor::parse(contents.trim()).ok()
    }

    fn persist_cursor(&self, cursor: &ChangeCursor) -> Result<()> {
        std::fs::write(self.config.workspace.join(CURSOR_FILE), cursor.path())?;
        Ok(())
    }

    /// Snapshot of the active overlay pair.
    pub fn overlays(&self) -> Arc<OverlayPair> {
        self.overlays.load_full()
    }

    /// Snapshot of the active base slot.
    pub fn base(&self) -> Arc<BaseSlot> {
        self.base.load_full()
    }

    pub fn workspace(&self) -> &Path {
        &self.config.workspace
    }

    pub async fn close(&self) -> Result<()> {
        let base = self.base.load_full();
        let overlays = self.overlays.load_full();
        base.reader.close().await?;
        overlays.added.close().await?;
        overlays.removed.close().await?;
        Ok(())
    }

    /// Monotonic suffix for fresh storage locations; wall clock plus a
    /// counter so two swaps in the same millisecond cannot collide.
    fn next_stamp(&self) -> String {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let counter = self.stamp.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", millis, counter)
    }
}

/// Wait for the expected number of adoption acknowledgements, with a
/// deadline so a dead sibling cannot block cleanup forever.
async fn await_adoption(
    mut acks: tokio::sync::broadcast::Receiver<ClusterMessage>,
    expected: usize,
) {
    if expected == 0 {
        return;
    }
    let deadline = std::time::Duration::from_secs(120);
    let mut received = 0usize;
    let _ = tokio::time::timeout(deadline, async {
        while received < expected {
            match acks.recv().await {
                Ok(ClusterMessage::AckAdopted { member }) => {
                    tracing::debug!("sibling {} adopted the rebuilt base", member);
                    received += 1;
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
    })
    .await;
}
