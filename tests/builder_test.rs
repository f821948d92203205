//! Tests for TreeBuilder over in-memory and async record sources

use std::collections::HashSet;
use std::time::Duration;

use futures::stream::{self, BoxStream, StreamExt};
use rstest::rstest;
use serde_json::json;

use treenode::domain::{
    BuildOptions, ExpandFields, FlatRecord, IndexedSource, RecordSource, TreeBuild, TreeBuilder,
    TreeError, TreeNode, MAX_DEPTH_LIMIT,
};
use treenode::util::testing::init_test_setup;

fn example_records() -> Vec<FlatRecord> {
    vec![
        FlatRecord::new(1, "root").with_name("Root"),
        FlatRecord::new(2, "c1").with_name("Child1").with_superior(1),
        FlatRecord::new(3, "c2").with_name("Child2").with_superior(2),
    ]
}

/// Deterministic wide/deep hierarchy: record i (i >= 2) hangs below some j < i.
fn generated_records(n: i64) -> Vec<FlatRecord> {
    (1..=n)
        .map(|i| {
            let rec = FlatRecord::new(i, format!("n{}", i)).with_name(format!("Node {}", i));
            if i == 1 {
                rec
            } else {
                rec.with_superior(1 + (i * 7919) % (i - 1))
            }
        })
        .collect()
}

async fn build(
    records: &[FlatRecord],
    root: usize,
    indexed: bool,
    fields: Option<&ExpandFields>,
) -> TreeBuild {
    init_test_setup();
    let builder = TreeBuilder::default();
    if indexed {
        let source = IndexedSource::new(records.to_vec());
        builder.build_tree(&records[root], &source, fields).await
    } else {
        builder.build_tree(&records[root], records, fields).await
    }
}

/// Source that yields each record after a delay, re-scannable.
struct SlowSource {
    records: Vec<FlatRecord>,
    delay: Duration,
}

impl RecordSource<FlatRecord> for SlowSource {
    fn records(&self) -> BoxStream<'_, FlatRecord> {
        let delay = self.delay;
        stream::iter(self.records.iter().cloned())
            .then(move |record| async move {
                tokio::time::sleep(delay).await;
                record
            })
            .boxed()
    }
}

// ============================================================
// Structure
// ============================================================

#[rstest]
#[case::scan(false)]
#[case::indexed(true)]
#[tokio::test]
async fn given_three_level_chain_when_building_then_nests_with_superior_names(
    #[case] indexed: bool,
) {
    let build = build(&example_records(), 0, indexed, None).await;

    assert!(build.is_complete(), "failures: {:?}", build.failures);
    let root = build.root.unwrap();
    assert_eq!(root.code, "root");
    assert_eq!(root.superior, None);

    let c1 = &root.children[0];
    assert_eq!(root.children.len(), 1);
    assert_eq!(c1.code, "c1");
    assert_eq!(c1.superior.as_deref(), Some("Root"));

    let c2 = &c1.children[0];
    assert_eq!(c2.code, "c2");
    assert_eq!(c2.superior.as_deref(), Some("Child1"));
    assert!(c2.children.is_empty());
}

#[tokio::test]
async fn given_example_when_serializing_built_tree_then_matches_expected_json() {
    let build = build(&example_records(), 0, false, None).await;
    let value = serde_json::to_value(build.root.unwrap()).unwrap();
    assert_eq!(
        value,
        json!({
            "code": "root", "name": "Root", "superior": null,
            "children": [{
                "code": "c1", "name": "Child1", "superior": "Root",
                "children": [{
                    "code": "c2", "name": "Child2", "superior": "Child1", "children": []
                }]
            }]
        })
    );
}

#[rstest]
#[case::scan(false)]
#[case::indexed(true)]
#[tokio::test]
async fn given_generated_hierarchy_when_building_then_every_record_appears_once(
    #[case] indexed: bool,
) {
    let records = generated_records(60);
    let build = build(&records, 0, indexed, None).await;

    let root = build.root.unwrap();
    let codes = root.codes();
    let unique: HashSet<_> = codes.iter().collect();
    assert_eq!(codes.len(), 60);
    assert_eq!(unique.len(), 60);
    assert!(build.failures.is_empty());
}

#[tokio::test]
async fn given_record_with_unknown_superior_when_building_then_absent() {
    let mut records = example_records();
    records.push(FlatRecord::new(9, "orphan").with_superior(99));
    let build = build(&records, 0, false, None).await;
    assert!(build.root.unwrap().find("orphan").is_none());
    assert!(build.failures.is_empty());
}

#[tokio::test]
async fn given_intermediate_superior_when_building_then_only_its_subtree() {
    let build = build(&example_records(), 1, false, None).await;
    let root = build.root.unwrap();
    assert_eq!(root.codes(), vec!["c1", "c2"]);
}

#[tokio::test]
async fn given_siblings_when_building_then_keeps_source_order() {
    let records = vec![
        FlatRecord::new(1, "root"),
        FlatRecord::new(4, "z").with_superior(1),
        FlatRecord::new(2, "a").with_superior(1),
        FlatRecord::new(3, "m").with_superior(1),
    ];
    let build = build(&records, 0, false, None).await;
    let codes: Vec<_> = build
        .root
        .unwrap()
        .children
        .iter()
        .map(|c| c.code.clone())
        .collect();
    assert_eq!(codes, vec!["z", "a", "m"]);
}

#[rstest]
#[case::scan(false)]
#[case::indexed(true)]
#[tokio::test]
async fn given_same_input_when_rebuilding_then_identical(#[case] indexed: bool) {
    let records = generated_records(30);
    let fields: ExpandFields = ["name"].into_iter().collect();
    let first = build(&records, 0, indexed, Some(&fields)).await;
    let second = build(&records, 0, indexed, Some(&fields)).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn given_both_strategies_when_building_then_same_tree() {
    let records = generated_records(40);
    let scan = build(&records, 0, false, None).await;
    let indexed = build(&records, 0, true, None).await;
    assert_eq!(scan, indexed);
}

// ============================================================
// Streaming and ordering
// ============================================================

fn assert_fully_resolved(node: &TreeNode, records: &[FlatRecord]) {
    let expected = records
        .iter()
        .filter(|r| {
            r.superior_id.is_some()
                && records
                    .iter()
                    .find(|p| p.code.as_deref() == Some(node.code.as_str()))
                    .is_some_and(|p| p.id == r.superior_id)
        })
        .count();
    assert_eq!(node.children.len(), expected, "node {} incomplete", node.code);
    for child in &node.children {
        assert_fully_resolved(child, records);
    }
}

#[tokio::test]
async fn given_stream_consumer_when_receiving_node_then_descendants_already_attached() {
    init_test_setup();
    let records = generated_records(25);
    let builder = TreeBuilder::default();
    let mut stream = builder.build_children(&records[0], &records, None);

    let mut seen = 0;
    while let Some(item) = stream.next().await {
        let node = item.unwrap();
        assert_fully_resolved(&node, &records);
        seen += 1 + node.descendant_count();
    }
    assert_eq!(seen, 24);
}

#[tokio::test]
async fn given_slow_async_source_when_building_concurrently_then_order_and_content_hold() {
    init_test_setup();
    let records = generated_records(12);
    let source = SlowSource {
        records: records.clone(),
        delay: Duration::from_millis(1),
    };
    let builder = TreeBuilder::new(BuildOptions {
        max_depth: 16,
        concurrency: 4,
    });
    let slow = builder.build_tree(&records[0], &source, None).await;
    let fast = TreeBuilder::default()
        .build_tree(&records[0], &records, None)
        .await;
    assert_eq!(slow, fast);
}

fn chain(len: i64) -> Vec<FlatRecord> {
    (1..=len)
        .map(|i| {
            let rec = FlatRecord::new(i, format!("l{}", i));
            if i == 1 {
                rec
            } else {
                rec.with_superior(i - 1)
            }
        })
        .collect()
}

#[rstest]
#[case::scan(false)]
#[case::indexed(true)]
#[tokio::test]
async fn given_chain_at_depth_limit_when_building_then_fully_built(#[case] indexed: bool) {
    init_test_setup();
    let records = chain(MAX_DEPTH_LIMIT as i64 + 1);
    let builder = TreeBuilder::new(BuildOptions {
        max_depth: MAX_DEPTH_LIMIT,
        concurrency: 1,
    });

    let build = if indexed {
        let source = IndexedSource::new(records.clone());
        builder.build_tree(&records[0], &source, None).await
    } else {
        builder.build_tree(&records[0], &records, None).await
    };

    assert!(build.is_complete(), "failures: {:?}", build.failures);
    assert_eq!(build.root.unwrap().depth(), MAX_DEPTH_LIMIT + 1);
}

#[tokio::test]
async fn given_oversized_max_depth_when_building_long_chain_then_clamped_not_overflowed() {
    init_test_setup();
    let records = chain(200);
    let source = IndexedSource::new(records.clone());
    let builder = TreeBuilder::new(BuildOptions {
        max_depth: 5000,
        concurrency: 1,
    });

    let build = builder.build_tree(&records[0], &source, None).await;

    assert_eq!(build.root.unwrap().depth(), MAX_DEPTH_LIMIT + 1);
    assert_eq!(
        build.failures,
        vec![TreeError::DepthExceeded {
            code: format!("l{}", MAX_DEPTH_LIMIT + 2),
            max_depth: MAX_DEPTH_LIMIT,
        }]
    );
}

// ============================================================
// Expansion
// ============================================================

#[tokio::test]
async fn given_expand_fields_when_building_then_each_node_carries_them() {
    let records = vec![
        FlatRecord::new(1, "root").with_field("weight", json!(10)),
        FlatRecord::new(2, "leaf")
            .with_superior(1)
            .with_field("weight", json!(3))
            .with_field("color", json!("red")),
    ];
    let fields: ExpandFields = "color,weight".parse().unwrap();
    let build = build(&records, 0, false, Some(&fields)).await;
    let root = build.root.unwrap();

    assert_eq!(root.expanded.get("weight"), Some(&json!(10)));
    assert!(!root.expanded.contains_key("color"));
    let leaf = &root.children[0];
    let keys: Vec<_> = leaf.expanded.keys().cloned().collect();
    assert_eq!(keys, vec!["color", "weight"]);
}

#[tokio::test]
async fn given_unknown_expand_field_when_building_then_same_as_no_expansion() {
    let records = generated_records(15);
    let fields: ExpandFields = ["does_not_exist"].into_iter().collect();
    let plain = build(&records, 0, false, None).await;
    let expanded = build(&records, 0, false, Some(&fields)).await;
    assert_eq!(plain, expanded);
}

// ============================================================
// Failures
// ============================================================

#[rstest]
#[case::scan(false)]
#[case::indexed(true)]
#[tokio::test]
async fn given_two_record_cycle_when_building_then_terminates_with_structural_error(
    #[case] indexed: bool,
) {
    let records = vec![
        FlatRecord::new(1, "a").with_superior(2),
        FlatRecord::new(2, "b").with_superior(1),
    ];
    let build = tokio::time::timeout(Duration::from_secs(5), build(&records, 0, indexed, None))
        .await
        .expect("cycle must not hang");

    let root = build.root.unwrap();
    assert_eq!(root.codes(), vec!["a", "b"]);
    assert_eq!(
        build.failures,
        vec![TreeError::CycleDetected { code: "a".into() }]
    );
}

#[tokio::test]
async fn given_self_referencing_record_when_building_then_reports_cycle() {
    let records = vec![FlatRecord::new(1, "loop").with_superior(1)];
    let build = build(&records, 0, false, None).await;
    assert!(build.root.unwrap().is_leaf());
    assert!(build.failures[0].is_structural());
}

#[tokio::test]
async fn given_unreadable_records_when_building_then_siblings_survive() {
    let mut no_id = FlatRecord::new(0, "ghost").with_superior(1);
    no_id.id = None;
    let mut no_code = FlatRecord::new(3, "unused").with_name("Nameless").with_superior(1);
    no_code.code = None;
    let records = vec![
        FlatRecord::new(1, "root"),
        no_id,
        FlatRecord::new(2, "ok").with_superior(1),
        no_code,
        FlatRecord::new(4, "empty").with_superior(1),
    ];

    let build = build(&records, 0, false, None).await;
    let root = build.root.unwrap();
    let codes: Vec<_> = root.children.iter().map(|c| c.code.as_str()).collect();
    assert_eq!(codes, vec!["ok", "empty"]);
    assert_eq!(
        build.failures,
        vec![
            TreeError::MissingId {
                record: "ghost".into()
            },
            TreeError::MissingCode {
                record: "Nameless".into()
            },
        ]
    );
    assert!(build.failures.iter().all(TreeError::is_access));
}

#[tokio::test]
async fn given_empty_code_below_root_when_streaming_then_failure_precedes_parent() {
    init_test_setup();
    let records = vec![
        FlatRecord::new(1, "root"),
        FlatRecord::new(2, "mid").with_superior(1),
        FlatRecord::new(3, "").with_superior(2),
    ];
    let builder = TreeBuilder::default();
    let items: Vec<_> = builder
        .build_children(&records[0], &records, None)
        .collect()
        .await;

    assert_eq!(items.len(), 2);
    assert!(matches!(&items[0], Err(TreeError::MissingCode { .. })));
    let mid = items[1].as_ref().unwrap();
    assert_eq!(mid.code, "mid");
    assert!(mid.is_leaf());
}

// ============================================================
// Cancellation
// ============================================================

/// Source that yields its records and then waits forever for more.
struct StalledSource {
    records: Vec<FlatRecord>,
}

impl RecordSource<FlatRecord> for StalledSource {
    fn records(&self) -> BoxStream<'_, FlatRecord> {
        stream::iter(self.records.iter().cloned())
            .chain(stream::pending())
            .boxed()
    }
}

#[tokio::test]
async fn given_stalled_source_when_cancelled_then_stream_wakes_with_cancelled() {
    init_test_setup();
    let records = vec![
        FlatRecord::new(1, "root"),
        FlatRecord::new(2, "a").with_superior(1),
        FlatRecord::new(3, "b").with_superior(2),
    ];
    let source = StalledSource {
        records: records.clone(),
    };
    let builder = TreeBuilder::default();
    let token = builder.cancellation_token();
    let mut stream = builder.build_children(&records[0], &source, None);

    let pending = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
    assert!(pending.is_err(), "stalled source must not produce items");

    token.cancel();
    let item = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("cancel must wake the stalled build");
    assert_eq!(item, Some(Err(TreeError::Cancelled)));

    let end = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("stream must end after cancellation");
    assert_eq!(end, None);
}

#[tokio::test]
async fn given_stalled_source_when_cancelled_from_other_task_then_build_tree_returns() {
    init_test_setup();
    let records = vec![
        FlatRecord::new(1, "root"),
        FlatRecord::new(2, "a").with_superior(1),
    ];
    let source = StalledSource {
        records: records.clone(),
    };
    let builder = TreeBuilder::default();
    let token = builder.cancellation_token();
    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
    });

    let build = tokio::time::timeout(
        Duration::from_secs(2),
        builder.build_tree(&records[0], &source, None),
    )
    .await
    .expect("build must stop once cancelled");
    canceller.await.unwrap();

    assert!(build.root.is_none());
    assert_eq!(build.failures, vec![TreeError::Cancelled]);
}

#[tokio::test]
async fn given_cancel_mid_build_when_streaming_then_single_cancelled_and_no_more_nodes() {
    init_test_setup();
    let records = vec![
        FlatRecord::new(1, "root"),
        FlatRecord::new(2, "a").with_superior(1),
        FlatRecord::new(3, "b").with_superior(1),
        FlatRecord::new(4, "c").with_superior(1),
        FlatRecord::new(5, "d").with_superior(1),
    ];
    let source = SlowSource {
        records: records.clone(),
        delay: Duration::from_millis(2),
    };
    let builder = TreeBuilder::new(BuildOptions {
        max_depth: 8,
        concurrency: 1,
    });
    let token = builder.cancellation_token();
    let mut stream = builder.build_children(&records[0], &source, None);

    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first.code, "a");
    token.cancel();

    let rest: Vec<_> = stream.collect().await;
    assert_eq!(rest, vec![Err(TreeError::Cancelled)]);
}

#[tokio::test]
async fn given_cancelled_before_build_tree_then_no_root() {
    let builder = TreeBuilder::default();
    builder.cancellation_token().cancel();
    let records = example_records();
    let build = builder.build_tree(&records[0], &records, None).await;
    assert!(build.root.is_none());
    assert!(build.was_cancelled());
}

#[tokio::test]
async fn given_dropped_stream_when_mid_scan_then_build_stops_cleanly() {
    let records = generated_records(20);
    let source = SlowSource {
        records: records.clone(),
        delay: Duration::from_millis(1),
    };
    let builder = TreeBuilder::default();
    {
        let mut stream = builder.build_children(&records[0], &source, None);
        let _ = stream.next().await;
    }
    // Builder is reusable once the previous stream is gone.
    let build = builder.build_tree(&records[0], &records, None).await;
    assert_eq!(build.root.unwrap().descendant_count(), 19);
}
