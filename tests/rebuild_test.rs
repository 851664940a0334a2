//! Rebuild protocol tests: folding the overlays into a new base
//! dataset through the external compaction command.

#![cfg(unix)]

use palimpsest::changesets::ReconciledOperationList;
use palimpsest::store::TripleStore;
use palimpsest::{EngineConfig, LiveOverlayEngine, Query, Triple, TriplePattern};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

fn setup_test_environment(test_name: &str) -> PathBuf {
    let test_dir = PathBuf::from(format!("test_data_rebuild_{}", test_name));
    let _ = fs::remove_dir_all(&test_dir);
    fs::create_dir_all(&test_dir).unwrap();
    test_dir
}

fn cleanup_test_environment(test_dir: &PathBuf) {
    let _ = fs::remove_dir_all(test_dir);
}

/// A consolidation script that appends the added overlay to the base
/// file. Good enough for rebuilds with an empty removed overlay.
fn write_consolidate_script(test_dir: &PathBuf) -> PathBuf {
    let path = test_dir.join("consolidate.sh");
    fs::write(
        &path,
        "#!/bin/sh\n# args: added_dir removed_dir base_file new_base_file\ncat \"$3\" \"$1/triples.nt\" > \"$4\"\n",
    )
    .unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn write_failing_script(test_dir: &PathBuf) -> PathBuf {
    let path = test_dir.join("consolidate_fail.sh");
    fs::write(&path, "#!/bin/sh\nexit 1\n").unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
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

fn write_base_file(test_dir: &PathBuf, triples: &[Triple]) {
    let contents: String = triples.iter().map(|t| format!("{}\n", t.to_line())).collect();
    fs::write(test_dir.join("base.nt"), contents).unwrap();
}

#[tokio::test]
async fn test_rebuild_folds_overlays_into_new_base() {
    let test_dir = setup_test_environment("fold");
    let base = sample_triples(5);
    write_base_file(&test_dir, &base);
    let script = write_consolidate_script(&test_dir);

    let config = EngineConfig {
        workspace: test_dir.join("workspace"),
        base_file: test_dir.join("base.nt"),
        compaction_command: script.display().to_string(),
        filter_expected_items: 1_000,
        ..EngineConfig::default()
    };
    let engine = LiveOverlayEngine::open(config).await.unwrap();

    let added = vec![
        Triple::new("http://example.org/extra1", "http://example.org/p", "o"),
        Triple::new("http://example.org/extra2", "http://example.org/p", "o"),
    ];
    engine
        .apply_operation_list(ReconciledOperationList::new(added.clone(), Vec::new()))
        .await
        .unwrap();

    let old_base = engine.base().path.clone();
    engine.rebuild_base().await.unwrap();
    let new_base = engine.base().path.clone();
    assert_ne!(old_base, new_base);
    assert!(new_base.starts_with(engine.workspace()));

    // The overlays were reset; everything now comes from the new base
    let overlays = engine.overlays();
    assert_eq!(overlays.added.approximate_size(&TriplePattern::any()).await.unwrap(), 0);
    assert_eq!(overlays.removed.approximate_size(&TriplePattern::any()).await.unwrap(), 0);

    let (rows, total) = engine
        .select(Query::new(TriplePattern::any()))
        .collect()
        .await
        .unwrap();
    assert_eq!(rows.len(), 7);
    assert_eq!(total, 7);
    assert!(rows.contains(&added[0]));

    // The pointer file records the new base for the next startup
    let pointer = fs::read_to_string(engine.workspace().join("base_location.txt")).unwrap();
    assert_eq!(PathBuf::from(pointer.trim()), new_base);

    cleanup_test_environment(&test_dir);
}

#[tokio::test]
async fn test_failed_rebuild_keeps_current_state() {
    let test_dir = setup_test_environment("fail");
    let base = sample_triples(5);
    write_base_file(&test_dir, &base);
    let script = write_failing_script(&test_dir);

    let config = EngineConfig {
        workspace: test_dir.join("workspace"),
        base_file: test_dir.join("base.nt"),
        compaction_command: script.display().to_string(),
        filter_expected_items: 1_000,
        ..EngineConfig::default()
    };
    let engine = LiveOverlayEngine::open(config).await.unwrap();

    let old_base = engine.base().path.clone();
    let result = engine.rebuild_base().await;
    assert!(result.is_err());

    // Still serving from the previous base dataset
    assert_eq!(engine.base().path, old_base);
    let (rows, total) = engine
        .select(Query::new(TriplePattern::any()))
        .collect()
        .await
        .unwrap();
    assert_eq!(rows.len(), 5);
    assert_eq!(total, 5);

    cleanup_test_environment(&test_dir);
}
