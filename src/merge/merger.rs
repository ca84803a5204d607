//! Multi-pass merge

use indexmap::IndexMap;
use std::sync::Arc;
use tracing::debug;

use crate::models::{ResultNode, TestNode};

/// Combines result trees produced by independent passes
#[derive(Debug, Default, Clone, Copy)]
pub struct ResultTreeMerger;

impl ResultTreeMerger {
    /// Merge `trees` into one tree rooted at `root`.
    ///
    /// A single tree is returned unchanged. Otherwise executed children are
    /// grouped by full name and merged recursively; children follow the
    /// definition order, then first-seen order for anything the definition
    /// does not know. Group durations are the sum of their merged children.
    pub fn merge(root: &Arc<TestNode>, mut trees: Vec<ResultNode>) -> ResultNode {
        if trees.len() == 1 {
            if let Some(tree) = trees.pop() {
                return tree;
            }
        }
        debug!("Merging {} result trees for {}", trees.len(), root.full_name);
        merge_into(ResultNode::for_definition(root), Some(root), trees)
    }
}

fn merge_into(
    mut node: ResultNode,
    definition: Option<&Arc<TestNode>>,
    trees: Vec<ResultNode>,
) -> ResultNode {
    let mut groups: IndexMap<String, Vec<ResultNode>> = IndexMap::new();
    for tree in trees {
        for child in tree.children.into_iter().filter(|c| c.executed) {
            groups.entry(child.full_name.clone()).or_default().push(child);
        }
    }

    if let Some(definition) = definition {
        for child in definition.children() {
            if let Some(group) = groups.shift_remove(&child.full_name) {
                for merged in merge_group(group, Some(child)) {
                    node.push_child(merged);
                }
            }
        }
    }
    for (_, group) in groups {
        let child_definition = group.first().and_then(ResultNode::definition);
        for merged in merge_group(group, child_definition.as_ref()) {
            node.push_child(merged);
        }
    }

    node.finish_group();
    node
}

/// Merge the nodes sharing one full name. Suites are merged recursively;
/// a leaf sharing the name of a suite is kept beside it.
fn merge_group(group: Vec<ResultNode>, definition: Option<&Arc<TestNode>>) -> Vec<ResultNode> {
    let (mut leaves, mut suites): (Vec<_>, Vec<_>) =
        group.into_iter().partition(ResultNode::is_leaf);
    let mut merged = Vec::with_capacity(2);

    if suites.len() == 1 {
        merged.append(&mut suites);
    } else if let Some(first) = suites.first() {
        let definition = definition
            .filter(|d| d.is_suite())
            .cloned()
            .or_else(|| first.definition());
        let shell = match &definition {
            Some(definition) => ResultNode::for_definition(definition),
            None => ResultNode::shell_of(first),
        };
        merged.push(merge_into(shell, definition.as_ref(), suites));
    }

    // Leaves are disjoint across passes; should one repeat, the last pass wins
    merged.extend(leaves.pop());
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::scripted::nested_suite;
    use crate::models::{ResultState, Unit};

    fn root() -> Arc<TestNode> {
        nested_suite(&[
            ("A", "a1", false),
            ("A", "a2", false),
            ("A", "a3", false),
            ("B", "b1", false),
            ("B", "b2", false),
            ("C", "c1", false),
        ])
    }

    /// Result tree for `root` with only the given leaves executed
    fn partial(root: &Arc<TestNode>, leaves: &[(&str, ResultState, u64)]) -> ResultNode {
        let mut tree = ResultNode::for_definition(root);
        for suite in root.children() {
            let mut group = ResultNode::for_definition(suite);
            for case in suite.children() {
                if let Some((_, state, ms)) = leaves.iter().find(|(n, _, _)| *n == case.full_name)
                {
                    group.push_child(ResultNode::outcome(case, *state, *ms, None));
                }
            }
            group.finish_group();
            if group.executed {
                tree.push_child(group);
            }
        }
        tree.finish_group();
        tree
    }

    fn leaf_names(tree: &ResultNode) -> Vec<&str> {
        tree.leaves().iter().map(|l| l.full_name.as_str()).collect()
    }

    #[test]
    fn test_single_tree_is_identity() {
        let root = root();
        let tree = partial(&root, &[("Root.B.b1", ResultState::Failure, 9)]);
        let mut marked = tree.clone();
        marked.message = Some("untouched".to_string());

        let merged = ResultTreeMerger::merge(&root, vec![marked]);
        assert_eq!(merged.message.as_deref(), Some("untouched"));
        assert_eq!(merged.duration_ms, tree.duration_ms);
        assert_eq!(leaf_names(&merged), leaf_names(&tree));
    }

    #[test]
    fn test_disjoint_trees_union_and_sum() {
        let root = root();
        let trees = vec![
            partial(
                &root,
                &[
                    ("Root.A.a1", ResultState::Success, 10),
                    ("Root.B.b2", ResultState::Success, 20),
                ],
            ),
            partial(
                &root,
                &[
                    ("Root.A.a2", ResultState::Failure, 5),
                    ("Root.C.c1", ResultState::Success, 7),
                ],
            ),
            partial(&root, &[("Root.A.a3", ResultState::Success, 3)]),
        ];

        let merged = ResultTreeMerger::merge(&root, trees);

        assert_eq!(merged.duration_ms, 45);
        assert_eq!(
            leaf_names(&merged),
            vec!["Root.A.a1", "Root.A.a2", "Root.A.a3", "Root.B.b2", "Root.C.c1"]
        );

        let suite_a = &merged.children[0];
        assert_eq!(suite_a.full_name, "Root.A");
        assert_eq!(suite_a.duration_ms, 18);
        assert_eq!(suite_a.state, ResultState::Failure);
        assert_eq!(merged.state, ResultState::Failure);
        assert!(merged.definition().is_some());
    }

    #[test]
    fn test_children_follow_definition_order() {
        let root = root();
        let trees = vec![
            partial(&root, &[("Root.C.c1", ResultState::Success, 1)]),
            partial(&root, &[("Root.A.a3", ResultState::Success, 1)]),
            partial(&root, &[("Root.A.a1", ResultState::Success, 1)]),
        ];

        let merged = ResultTreeMerger::merge(&root, trees);
        let suites: Vec<_> = merged.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(suites, vec!["A", "C"]);
        assert_eq!(leaf_names(&merged), vec!["Root.A.a1", "Root.A.a3", "Root.C.c1"]);
    }

    #[test]
    fn test_unexecuted_trees_are_ignored() {
        let root = root();
        let trees = vec![
            ResultNode::for_definition(&root),
            partial(&root, &[("Root.B.b1", ResultState::Success, 4)]),
            ResultNode::for_definition(&root),
        ];

        let merged = ResultTreeMerger::merge(&root, trees);
        assert!(merged.executed);
        assert_eq!(merged.children.len(), 1);
        assert_eq!(merged.duration_ms, 4);
    }

    #[test]
    fn test_empty_merge() {
        let root = root();
        let merged = ResultTreeMerger::merge(&root, Vec::new());
        assert!(!merged.executed);
        assert!(merged.children.is_empty());
        assert_eq!(merged.duration_ms, 0);
    }

    #[test]
    fn test_groups_without_definition_keep_first_seen_order() {
        let root = root();
        let other = nested_suite(&[("Z", "z1", false), ("Y", "y1", false)]);
        let trees = vec![
            partial(&other, &[("Root.Y.y1", ResultState::Success, 1)]),
            partial(&other, &[("Root.Z.z1", ResultState::Success, 2)]),
        ];

        let merged = ResultTreeMerger::merge(&root, trees);
        let suites: Vec<_> = merged.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(suites, vec!["Y", "Z"]);
        assert_eq!(merged.duration_ms, 3);
    }

    #[test]
    fn test_groups_whose_definition_was_dropped() {
        let root = root();
        let trees = {
            let other = nested_suite(&[("Y", "y1", false), ("Y", "y2", false)]);
            vec![
                partial(&other, &[("Root.Y.y1", ResultState::Success, 1)]),
                partial(&other, &[("Root.Y.y2", ResultState::Failure, 2)]),
            ]
        };

        let merged = ResultTreeMerger::merge(&root, trees);
        assert_eq!(merged.children.len(), 1);

        let suite_y = &merged.children[0];
        assert_eq!(suite_y.name, "Y");
        assert!(suite_y.is_suite);
        assert!(suite_y.definition().is_none());
        assert_eq!(suite_y.duration_ms, 3);
        assert_eq!(suite_y.state, ResultState::Failure);
        assert_eq!(leaf_names(&merged), vec!["Root.Y.y1", "Root.Y.y2"]);
    }

    #[test]
    fn test_case_sharing_a_suite_name_is_kept() {
        let x = Arc::new(TestNode::case("x", Unit::new("[t]Root.A.x", "Root.A.x")));
        let suite_a = Arc::new(TestNode::suite("A", "Root.A", vec![Arc::clone(&x)]));
        let case_a = Arc::new(TestNode::case("A", Unit::new("[t]Root.A", "Root.A")));
        let root = Arc::new(TestNode::suite(
            "Root",
            "Root",
            vec![Arc::clone(&suite_a), Arc::clone(&case_a)],
        ));

        let mut first = ResultNode::for_definition(&root);
        let mut group = ResultNode::for_definition(&suite_a);
        group.push_child(ResultNode::success(&x, 1));
        group.finish_group();
        first.push_child(group);
        first.finish_group();

        let mut second = ResultNode::for_definition(&root);
        second.push_child(ResultNode::failure(&case_a, 2, "exited with status 1"));
        second.finish_group();

        let merged = ResultTreeMerger::merge(&root, vec![first, second]);
        assert_eq!(leaf_names(&merged), vec!["Root.A.x", "Root.A"]);
        assert_eq!(merged.state, ResultState::Failure);
        assert_eq!(merged.duration_ms, 3);
    }
}
