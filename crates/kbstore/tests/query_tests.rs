//! Query engine tests over a small plant hierarchy.

mod common;

use serde_json::json;

use common::TestHarness;
use kbstore::{HierarchyBuilder, PathOperator};

fn build(harness: &TestHarness) -> HierarchyBuilder {
    let mut b = harness.pass();
    b.add_info_node("info1_link", "info1_name", json!({}), json!({"level": 1}), "the one")
        .unwrap();
    b.with_header_node("site", "s1", json!({"region": "north"}), json!({}), "site one", |b| {
        b.add_info_node("info1_link", "other", json!({}), json!({"level": 2}), "")?;
        b.with_header_node("node", "n1", json!({}), json!({}), "node one", |b| {
            b.add_info_node("info1_link", "info1_deep", json!({}), json!({"level": 3}), "")?;
            b.add_job_field("work", 2, "work queue")?;
            b.add_stream_field("temps", 3, "temperatures")?;
            Ok(())
        })
    })
    .unwrap();
    b.add_kb("kb2", "").unwrap();
    b.add_info_node("info1_link", "info1_name", json!({}), json!({"level": 1}), "")
        .unwrap();
    b
}

#[test]
fn test_kb_label_name_singleton() {
    let harness = TestHarness::new();
    let b = build(&harness);
    let mut q = b.query().unwrap();

    let paths = q
        .search_kb("kb1")
        .search_label("info1_link")
        .search_name("info1_name")
        .paths();
    assert_eq!(paths, ["kb1.info1_link.info1_name"]);
}

/// A chain of filters and the paths it should leave.
struct FilterCase {
    name: &'static str,
    kb: Option<&'static str>,
    label: Option<&'static str>,
    name_filter: Option<&'static str>,
    pattern: Option<&'static str>,
    expected: &'static [&'static str],
}

const FILTER_CASES: &[FilterCase] = &[
    FilterCase {
        name: "label_across_kbs",
        kb: None,
        label: Some("info1_link"),
        name_filter: Some("info1_name"),
        pattern: None,
        expected: &["kb1.info1_link.info1_name", "kb2.info1_link.info1_name"],
    },
    FilterCase {
        name: "fields_anywhere",
        kb: Some("kb1"),
        label: None,
        name_filter: None,
        pattern: Some("*.KB_JOB_QUEUE|KB_STREAM_FIELD.*{1}"),
        expected: &[
            "kb1.site.s1.node.n1.KB_JOB_QUEUE.work",
            "kb1.site.s1.node.n1.KB_STREAM_FIELD.temps",
        ],
    },
    FilterCase {
        name: "bounded_depth",
        kb: None,
        label: None,
        name_filter: None,
        pattern: Some("kb1.*{2,4}"),
        expected: &[
            "kb1.info1_link.info1_name",
            "kb1.site.s1",
            "kb1.site.s1.info1_link.other",
            "kb1.site.s1.node.n1",
        ],
    },
    FilterCase {
        name: "no_such_label",
        kb: Some("kb2"),
        label: Some("site"),
        name_filter: None,
        pattern: None,
        expected: &[],
    },
];

#[test]
fn test_filter_chains() {
    let harness = TestHarness::new();
    let b = build(&harness);
    let mut q = b.query().unwrap();

    for case in FILTER_CASES {
        q.clear_filters();
        if let Some(kb) = case.kb {
            q.search_kb(kb);
        }
        if let Some(label) = case.label {
            q.search_label(label);
        }
        if let Some(name) = case.name_filter {
            q.search_name(name);
        }
        if let Some(pattern) = case.pattern {
            q.search_path(PathOperator::Match, pattern).unwrap();
        }
        assert_eq!(q.paths(), case.expected, "{}", case.name);
    }
}

#[test]
fn test_filters_only_narrow() {
    let harness = TestHarness::new();
    let b = build(&harness);
    let mut q = b.query().unwrap();

    let total = q.len();
    let mut previous = total;
    q.search_kb("kb1");
    assert!(q.len() <= previous);
    previous = q.len();
    q.search_starting_path("kb1.site.s1").unwrap();
    assert!(q.len() <= previous);
    previous = q.len();
    q.search_property_value("level", &json!(3));
    assert!(q.len() <= previous);
    assert_eq!(q.paths(), ["kb1.site.s1.node.n1.info1_link.info1_deep"]);

    // A second kb filter cannot widen the set back out.
    q.search_kb("kb2");
    assert!(q.is_empty());
    assert_eq!(q.clear_filters().len(), total);
}

#[test]
fn test_starting_path_and_descriptions() {
    let harness = TestHarness::new();
    let b = build(&harness);
    let mut q = b.query().unwrap();

    let descriptions = q
        .search_starting_path("kb1.site.s1.node.n1")
        .unwrap()
        .search_property_key("length")
        .find_descriptions();
    let described: Vec<(&str, &str)> = descriptions
        .iter()
        .map(|(p, d)| (p.as_str(), d.as_str()))
        .collect();
    assert_eq!(
        described,
        [
            ("kb1.site.s1.node.n1.KB_JOB_QUEUE.work", "work queue"),
            ("kb1.site.s1.node.n1.KB_STREAM_FIELD.temps", "temperatures"),
        ]
    );
}

#[test]
fn test_ancestor_and_descendant_operators() {
    let harness = TestHarness::new();
    let b = build(&harness);
    let mut q = b.query().unwrap();

    let ancestors = q
        .search_path(PathOperator::Ancestor, "kb1.site.s1.node.n1.KB_JOB_QUEUE.work")
        .unwrap()
        .paths();
    assert_eq!(
        ancestors,
        [
            "kb1.site.s1",
            "kb1.site.s1.node.n1",
            "kb1.site.s1.node.n1.KB_JOB_QUEUE.work",
        ]
    );

    q.clear_filters();
    let below = q
        .search_path(PathOperator::Descendant, "kb1.site.s1.node.n1")
        .unwrap()
        .len();
    assert_eq!(below, 4);
}
