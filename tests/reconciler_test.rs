//! Reconciliation tests: net cancellation across changesets and the
//! incremental caps.

use palimpsest::changesets::{ChangeBatch, ChangeCursor, OperationKind, Reconciler};
use palimpsest::Triple;

fn batch(kind: OperationKind, sequence: u32, subjects: &[&str]) -> ChangeBatch {
    ChangeBatch {
        kind,
        triples: subjects
            .iter()
            .map(|s| {
                Triple::new(
                    &format!("http://example.org/{}", s),
                    "http://example.org/p",
                    "o",
                )
            })
            .collect(),
        source: ChangeCursor::new(2015, 6, 1, 12, sequence),
    }
}

#[tokio::test]
async fn test_add_then_remove_nets_to_nothing() {
    let batches = vec![
        batch(OperationKind::Added, 1, &["t"]),
        batch(OperationKind::Removed, 2, &["t"]),
    ];
    let ops = Reconciler::new(350_000, 500).reconcile(&batches).await;
    assert!(ops.added.is_empty());
    assert!(ops.removed.is_empty());
    assert!(ops.exhausted);
    assert_eq!(ops.consumed_up_to.unwrap().sequence, 2);
}

#[tokio::test]
async fn test_out_of_order_remove_then_add_nets_to_nothing() {
    // The remove of a never-seen triple is recorded as a remove, the
    // later add cancels it, leaving both sides empty
    let batches = vec![
        batch(OperationKind::Removed, 1, &["t"]),
        batch(OperationKind::Added, 2, &["t"]),
    ];
    let ops = Reconciler::new(350_000, 500).reconcile(&batches).await;
    assert!(ops.added.is_empty());
    assert!(ops.removed.is_empty());
}

#[tokio::test]
async fn test_independent_operations_pass_through() {
    let batches = vec![
        batch(OperationKind::Added, 1, &["a", "b"]),
        batch(OperationKind::Removed, 2, &["c"]),
        batch(OperationKind::Added, 3, &["d"]),
    ];
    let ops = Reconciler::new(350_000, 500).reconcile(&batches).await;
    let added: Vec<&str> = ops.added.iter().map(|t| t.subject.as_str()).collect();
    assert_eq!(
        added,
        vec!["http://example.org/a", "http://example.org/b", "http://example.org/d"]
    );
    assert_eq!(ops.removed.len(), 1);
}

#[tokio::test]
async fn test_partial_cancellation_within_batch() {
    let batches = vec![
        batch(OperationKind::Added, 1, &["a", "b", "c"]),
        batch(OperationKind::Removed, 2, &["b", "x"]),
    ];
    let ops = Reconciler::new(350_000, 500).reconcile(&batches).await;
    let added: Vec<&str> = ops.added.iter().map(|t| t.subject.as_str()).collect();
    assert_eq!(added, vec!["http://example.org/a", "http://example.org/c"]);
    let removed: Vec<&str> = ops.removed.iter().map(|t| t.subject.as_str()).collect();
    assert_eq!(removed, vec!["http://example.org/x"]);
}

#[tokio::test]
async fn test_changeset_cap_reports_resume_point() {
    let batches: Vec<ChangeBatch> = (1..=10)
        .map(|i| batch(OperationKind::Added, i, &[&format!("s{}", i)]))
        .collect();
    let ops = Reconciler::new(350_000, 4).reconcile(&batches).await;
    assert!(!ops.exhausted);
    assert_eq!(ops.consumed_up_to.unwrap().sequence, 4);
    assert_eq!(ops.added.len(), 4);
}

#[tokio::test]
async fn test_triple_cap_reports_resume_point() {
    let batches = vec![
        batch(OperationKind::Added, 1, &["a", "b", "c"]),
        batch(OperationKind::Added, 2, &["d"]),
        batch(OperationKind::Added, 3, &["e"]),
    ];
    let ops = Reconciler::new(3, 500).reconcile(&batches).await;
    assert!(!ops.exhausted);
    assert_eq!(ops.consumed_up_to.unwrap().sequence, 1);
    assert_eq!(ops.added.len(), 3);
}

#[tokio::test]
async fn test_caps_on_final_batch_still_count_as_exhausted() {
    let batches = vec![batch(OperationKind::Added, 1, &["a", "b", "c"])];
    let ops = Reconciler::new(3, 500).reconcile(&batches).await;
    assert!(ops.exhausted);
}
