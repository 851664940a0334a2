//! Overlay apply protocol tests: intersection elimination, store
//! swapping, pointer files and persistence across restarts.

use palimpsest::changesets::ReconciledOperationList;
use palimpsest::store::TripleStore;
use palimpsest::{EngineConfig, LiveOverlayEngine, Query, Triple, TriplePattern};
use std::fs;
use std::path::PathBuf;

fn setup_test_environment(test_name: &str) -> PathBuf {
    let test_dir = PathBuf::from(format!("test_data_apply_{}", test_name));
    let _ = fs::remove_dir_all(&test_dir);
    fs::create_dir_all(&test_dir).unwrap();
    test_dir
}

fn cleanup_test_environment(test_dir: &PathBuf) {
    let _ = fs::remove_dir_all(test_dir);
}

fn test_config(test_dir: &PathBuf) -> EngineConfig {
    EngineConfig {
        workspace: test_dir.join("workspace"),
        base_file: test_dir.join("base.nt"),
        filter_expected_items: 1_000,
        ..EngineConfig::default()
    }
}

/// An engine over an empty base dataset; everything it serves comes
/// from the overlays.
async fn open_empty_engine(test_name: &str) -> (PathBuf, LiveOverlayEngine) {
    let test_dir = setup_test_environment(test_name);
    fs::write(test_dir.join("base.nt"), "").unwrap();
    let engine = LiveOverlayEngine::open(test_config(&test_dir)).await.unwrap();
    (test_dir, engine)
}

fn sample_triples(count: usize) -> Vec<Triple> {
    (0..count)
        .map(|i| {
            Triple::new(
                &format!("http://example.org/s{}", i),
                "http://example.org/p",
                &format!("http://example.org/o{}", i),
            )
        })
        .collect()
}

#[tokio::test]
async fn test_added_triples_become_visible() {
    let (test_dir, engine) = open_empty_engine("add").await;
    let added = sample_triples(8);

    engine
        .apply_operation_list(ReconciledOperationList::new(added.clone(), Vec::new()))
        .await
        .unwrap();

    let (rows, total) = engine
        .select(Query::new(TriplePattern::any()))
        .collect()
        .await
        .unwrap();
    assert_eq!(rows, added);
    assert_eq!(total, 8);

    cleanup_test_environment(&test_dir);
}

#[tokio::test]
async fn test_remove_of_live_added_triple_short_circuits() {
    let (test_dir, engine) = open_empty_engine("cancel").await;
    let added = sample_triples(8);

    engine
        .apply_operation_list(ReconciledOperationList::new(added.clone(), Vec::new()))
        .await
        .unwrap();

    // Retract two of the eight before they ever reach a rebuild
    let retracted = vec![added[2].clone(), added[5].clone()];
    engine
        .apply_operation_list(ReconciledOperationList::new(Vec::new(), retracted.clone()))
        .await
        .unwrap();

    let overlays = engine.overlays();
    assert_eq!(overlays.added.approximate_size(&TriplePattern::any()).await.unwrap(), 6);
    // The retraction cancelled against the added store instead of
    // landing in the removed store
    assert_eq!(overlays.removed.approximate_size(&TriplePattern::any()).await.unwrap(), 0);

    let (rows, total) = engine
        .select(Query::new(TriplePattern::any()))
        .collect()
        .await
        .unwrap();
    assert_eq!(rows.len(), 6);
    assert_eq!(total, 6);
    assert!(!rows.contains(&added[2]));
    assert!(!rows.contains(&added[5]));

    cleanup_test_environment(&test_dir);
}

#[tokio::test]
async fn test_add_then_remove_returns_to_baseline() {
    let (test_dir, engine) = open_empty_engine("baseline").await;
    let t = Triple::new("http://example.org/s", "http://example.org/p", "o");

    engine
        .apply_operation_list(ReconciledOperationList::new(vec![t.clone()], Vec::new()))
        .await
        .unwrap();
    engine
        .apply_operation_list(ReconciledOperationList::new(Vec::new(), vec![t.clone()]))
        .await
        .unwrap();

    let overlays = engine.overlays();
    assert_eq!(overlays.added.approximate_size(&TriplePattern::any()).await.unwrap(), 0);
    assert_eq!(overlays.removed.approximate_size(&TriplePattern::any()).await.unwrap(), 0);

    cleanup_test_environment(&test_dir);
}

#[tokio::test]
async fn test_add_of_live_removed_triple_restores_base_row() {
    let test_dir = setup_test_environment("restore");
    let base = sample_triples(4);
    let contents: String = base.iter().map(|t| format!("{}\n", t.to_line())).collect();
    fs::write(test_dir.join("base.nt"), contents).unwrap();
    let engine = LiveOverlayEngine::open(test_config(&test_dir)).await.unwrap();

    engine
        .apply_operation_list(ReconciledOperationList::new(Vec::new(), vec![base[1].clone()]))
        .await
        .unwrap();
    let (rows, _) = engine
        .select(Query::new(TriplePattern::any()))
        .collect()
        .await
        .unwrap();
    assert_eq!(rows.len(), 3);

    // Re-adding the removed triple empties the removed store instead
    // of duplicating the base row through the added store
    engine
        .apply_operation_list(ReconciledOperationList::new(vec![base[1].clone()], Vec::new()))
        .await
        .unwrap();
    let overlays = engine.overlays();
    assert_eq!(overlays.removed.approximate_size(&TriplePattern::any()).await.unwrap(), 0);
    assert_eq!(overlays.added.approximate_size(&TriplePattern::any()).await.unwrap(), 0);

    let (rows, total) = engine
        .select(Query::new(TriplePattern::any()))
        .collect()
        .await
        .unwrap();
    assert_eq!(rows, base);
    assert_eq!(total, 4);

    cleanup_test_environment(&test_dir);
}

#[tokio::test]
async fn test_apply_swaps_to_fresh_store_locations() {
    let (test_dir, engine) = open_empty_engine("swap").await;

    let before = engine.overlays().added.location().to_path_buf();
    engine
        .apply_operation_list(ReconciledOperationList::new(sample_triples(2), Vec::new()))
        .await
        .unwrap();
    let after = engine.overlays().added.location().to_path_buf();
    assert_ne!(before, after);

    // Pointer files track the new locations
    let pointer =
        fs::read_to_string(engine.workspace().join("added_location.txt")).unwrap();
    assert_eq!(PathBuf::from(pointer.trim()), after);

    cleanup_test_environment(&test_dir);
}

#[tokio::test]
async fn test_overlays_survive_restart() {
    let test_dir = setup_test_environment("restart");
    fs::write(test_dir.join("base.nt"), "").unwrap();
    let added = sample_triples(5);

    {
        let engine = LiveOverlayEngine::open(test_config(&test_dir)).await.unwrap();
        engine
            .apply_operation_list(ReconciledOperationList::new(added.clone(), Vec::new()))
            .await
            .unwrap();
        engine.close().await.unwrap();
    }

    let engine = LiveOverlayEngine::open(test_config(&test_dir)).await.unwrap();
    let (rows, _) = engine
        .select(Query::new(TriplePattern::any()))
        .collect()
        .await
        .unwrap();
    assert_eq!(rows, added);

    cleanup_test_environment(&test_dir);
}

#[tokio::test]
async fn test_empty_operation_list_is_a_no_op() {
    let (test_dir, engine) = open_empty_engine("noop").await;
    let before = engine.overlays().added.location().to_path_buf();
    engine
        .apply_operation_list(ReconciledOperationList::default())
        .await
        .unwrap();
    assert_eq!(engine.overlays().added.location(), before.as_path());
    cleanup_test_environment(&test_dir);
}
