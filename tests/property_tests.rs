//! Property-based tests for search, pagination and validation

use keytree::pagination::{paginate, total_pages, Slot, SLOT_COUNT};
use keytree::search::{search, SearchOptions};
use keytree::tree::{FlatNode, Node, Tree};
use keytree::validate::{validate, MAX_ENTRIES};
use proptest::prelude::*;
use std::collections::HashSet;

fn flat_nodes(paths: &[Vec<String>]) -> Vec<FlatNode> {
    paths
        .iter()
        .filter(|segments| !segments.is_empty())
        .map(|segments| {
            let name = segments.last().cloned().unwrap_or_default();
            FlatNode::new(Node::noop(name), segments.clone())
        })
        .collect()
}

fn segment() -> impl Strategy<Value = String> {
    "[a-zA-Z][a-zA-Z0-9 _-]{0,10}"
}

fn numbered(count: usize) -> Tree {
    let mut tree = Tree::new();
    for i in 0..count {
        tree.insert(Node::noop(format!("entry {}", i)));
    }
    tree
}

proptest! {
    #[test]
    fn search_is_case_insensitive(
        paths in prop::collection::vec(prop::collection::vec(segment(), 1..4), 0..30),
        query in "[a-zA-Z]{1,6}",
    ) {
        let nodes = flat_nodes(&paths);
        let options = SearchOptions::default();
        let lower: Vec<_> = search(&nodes, &query.to_lowercase(), &options)
            .into_iter()
            .map(|r| r.node.full_path)
            .collect();
        let upper: Vec<_> = search(&nodes, &query.to_uppercase(), &options)
            .into_iter()
            .map(|r| r.node.full_path)
            .collect();
        prop_assert_eq!(lower, upper);
    }

    #[test]
    fn search_respects_limits_and_order(
        paths in prop::collection::vec(prop::collection::vec(segment(), 1..4), 0..60),
        query in "[a-z]{1,4}",
        max_results in 1usize..20,
    ) {
        let nodes = flat_nodes(&paths);
        let options = SearchOptions { max_results, ..SearchOptions::default() };
        let results = search(&nodes, &query, &options);
        prop_assert!(results.len() <= max_results);
        for result in &results {
            prop_assert!(result.score >= options.min_score);
        }
        for pair in results.windows(2) {
            prop_assert!(pair[0].score + 0.001 >= pair[1].score);
        }
    }

    #[test]
    fn empty_inputs_give_no_results(
        paths in prop::collection::vec(prop::collection::vec(segment(), 1..3), 0..10),
        query in ".{0,5}",
    ) {
        let nodes = flat_nodes(&paths);
        prop_assert!(search(&[], &query, &SearchOptions::default()).is_empty());
        prop_assert!(search(&nodes, "", &SearchOptions::default()).is_empty());
    }

    #[test]
    fn exact_name_outranks_substring_match(name in "[a-z]{3,8}", extra in "[a-z]{1,5}") {
        let nodes = flat_nodes(&[
            vec!["x".to_string(), format!("{}{}", name, extra)],
            vec!["y".to_string(), name.clone()],
        ]);
        let results = search(&nodes, &name, &SearchOptions::default());
        prop_assert!(!results.is_empty());
        prop_assert_eq!(results[0].node.name(), name.as_str());
        prop_assert!(results[0].score > 100.0);
    }

    #[test]
    fn every_entry_is_reachable_exactly_once(count in 0usize..=MAX_ENTRIES) {
        let tree = numbered(count);
        let pages = total_pages(count);
        let mut seen = HashSet::new();
        for page in 0..pages {
            let shown = paginate(tree.entries(), page);
            prop_assert!(shown.slots.len() <= SLOT_COUNT);
            for slot in &shown.slots {
                if let Slot::Item((key, _)) = slot {
                    prop_assert!(seen.insert(key.clone()), "{} shown twice", key);
                }
            }
        }
        prop_assert_eq!(seen.len(), count);
    }

    #[test]
    fn out_of_range_pages_are_clamped(count in 0usize..=MAX_ENTRIES, page in 0usize..100) {
        let shown = paginate(numbered(count).entries(), page);
        prop_assert!(shown.page < shown.total_pages);
    }

    #[test]
    fn small_directories_validate(count in 0usize..=MAX_ENTRIES, nested in 0usize..=MAX_ENTRIES) {
        let tree = numbered(count).with(Node::directory("nested", numbered(nested)));
        // The extra directory entry may push the root one over the limit
        let expected_errors = usize::from(count + 1 > MAX_ENTRIES);
        prop_assert_eq!(validate(&tree).errors.len(), expected_errors);
    }
}

#[test]
fn twenty_four_entries_give_exactly_one_error() {
    let report = validate(&numbered(MAX_ENTRIES + 1));
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].message.contains("24"));
}

#[test]
fn pagination_boundaries() {
    assert_eq!(total_pages(0), 1);
    assert_eq!(paginate(&[], 0).slots.len(), 0);
    assert_eq!(total_pages(9), 1);

    let ten = numbered(10);
    let first = paginate(ten.entries(), 0);
    assert_eq!(first.total_pages, 2);
    assert_eq!(first.item_count(), 8);
    assert!(matches!(first.slot(9), Some(Slot::NextPage)));

    assert_eq!(total_pages(23), 3);
}
