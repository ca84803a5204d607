//! Retry splicing

use std::collections::HashMap;
use tracing::{debug, info};

use super::{MergeError, ResultTreeMerger};
use crate::models::ResultNode;

impl ResultTreeMerger {
    /// Splice the outcome of a retry pass into `tree`.
    ///
    /// Every name in `failed` must have an executed counterpart in
    /// `retry_tree`. Counterparts that succeeded replace the failing leaf in
    /// place; the rest leave the original untouched. Ancestors keep their
    /// durations and states unless `recompute` is set.
    ///
    /// Returns the names of the recovered leaves.
    pub fn splice_retry(
        tree: &mut ResultNode,
        failed: &[String],
        retry_tree: ResultNode,
        recompute: bool,
    ) -> Result<Vec<String>, MergeError> {
        let mut counterparts: HashMap<String, ResultNode> = retry_tree
            .into_leaves()
            .into_iter()
            .map(|leaf| (leaf.full_name.clone(), leaf))
            .collect();

        let mut recovered = Vec::new();
        for name in failed {
            let counterpart = counterparts
                .remove(name)
                .ok_or_else(|| MergeError::MissingCounterpart(name.clone()))?;

            if !counterpart.state.is_success() {
                debug!("{} still failing after retry ({})", name, counterpart.state);
                continue;
            }

            tree.replace_leaf(name, counterpart)
                .ok_or_else(|| MergeError::MissingLeaf(name.clone()))?;
            info!("{} passed on retry", name);
            recovered.push(name.clone());
        }

        if recompute && !recovered.is_empty() {
            tree.recompute();
        }
        Ok(recovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::scripted::flat_suite;
    use crate::models::{ResultState, TestNode};
    use std::sync::Arc;

    fn tree_of(root: &Arc<TestNode>, outcomes: &[(&str, ResultState, u64)]) -> ResultNode {
        let mut tree = ResultNode::for_definition(root);
        for (name, state, ms) in outcomes {
            let case = root.find(&format!("Root.{name}")).unwrap();
            tree.push_child(ResultNode::outcome(&case, *state, *ms, None));
        }
        tree.finish_group();
        tree
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|n| format!("Root.{n}")).collect()
    }

    #[test]
    fn test_replaces_only_successful_counterparts() {
        let root = flat_suite(&[("a", false), ("b", false), ("c", false)]);
        let mut tree = tree_of(
            &root,
            &[
                ("a", ResultState::Failure, 10),
                ("b", ResultState::Success, 20),
                ("c", ResultState::Error, 30),
            ],
        );
        let retry = tree_of(
            &root,
            &[("a", ResultState::Success, 4), ("c", ResultState::Failure, 6)],
        );

        let recovered =
            ResultTreeMerger::splice_retry(&mut tree, &names(&["a", "c"]), retry, false).unwrap();

        assert_eq!(recovered, vec!["Root.a"]);
        let order: Vec<_> = tree.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        assert_eq!(tree.children[0].state, ResultState::Success);
        assert_eq!(tree.children[0].duration_ms, 4);
        assert_eq!(tree.children[2].state, ResultState::Error);
        assert_eq!(tree.children[2].duration_ms, 30);

        // Ancestors keep their original figures
        assert_eq!(tree.duration_ms, 60);
        assert_eq!(tree.state, ResultState::Failure);
    }

    #[test]
    fn test_recompute_resums_ancestors() {
        let root = flat_suite(&[("a", false), ("b", false)]);
        let mut tree = tree_of(
            &root,
            &[("a", ResultState::Failure, 10), ("b", ResultState::Success, 20)],
        );
        let retry = tree_of(&root, &[("a", ResultState::Success, 4)]);

        ResultTreeMerger::splice_retry(&mut tree, &names(&["a"]), retry, true).unwrap();
        assert_eq!(tree.duration_ms, 24);
        assert_eq!(tree.state, ResultState::Success);
    }

    #[test]
    fn test_missing_counterpart_is_fatal() {
        let root = flat_suite(&[("a", false), ("b", false)]);
        let mut tree = tree_of(
            &root,
            &[("a", ResultState::Failure, 1), ("b", ResultState::Failure, 1)],
        );
        let retry = tree_of(&root, &[("a", ResultState::Success, 1)]);

        let err = ResultTreeMerger::splice_retry(&mut tree, &names(&["a", "b"]), retry, false)
            .unwrap_err();
        assert_eq!(err, MergeError::MissingCounterpart("Root.b".to_string()));
    }

    #[test]
    fn test_missing_leaf_is_fatal() {
        let root = flat_suite(&[("a", false), ("b", false)]);
        let mut tree = tree_of(&root, &[("b", ResultState::Success, 1)]);
        let retry = tree_of(&root, &[("a", ResultState::Success, 1)]);

        let err = ResultTreeMerger::splice_retry(&mut tree, &names(&["a"]), retry, false)
            .unwrap_err();
        assert_eq!(err, MergeError::MissingLeaf("Root.a".to_string()));
    }
}
