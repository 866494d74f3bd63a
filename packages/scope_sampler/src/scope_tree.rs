//! The tree of scopes observed on one thread.

use std::time::Duration;

use foldhash::{HashMap, HashMapExt};

use crate::{ScopeFingerprint, ScopeReport};

/// Position of a node in the [`ScopeTree`] arena.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct NodeIndex(usize);

#[derive(Debug)]
pub(crate) struct ScopeNode {
    name: Box<str>,

    // Written only by the sampler.
    own_samples: u64,

    // Own samples plus the cumulative samples of all children. Only valid after `aggregate()`.
    cumulative_samples: u64,

    // In order of first entry.
    children: Vec<NodeIndex>,
}

/// Every scope ever observed on a thread, keyed by the fingerprint of the scope stack that led
/// to it.
///
/// Nodes live in an arena and are never removed. A node is always created after its parent,
/// so every child has a higher index than its parent. `aggregate()` relies on this to process
/// children before parents without recursion.
#[derive(Debug)]
pub(crate) struct ScopeTree {
    nodes: Vec<ScopeNode>,

    // Top-level scopes, in order of first entry.
    roots: Vec<NodeIndex>,

    by_fingerprint: HashMap<ScopeFingerprint, NodeIndex>,
}

impl ScopeTree {
    pub(crate) fn new() -> Self {
        Self {
            nodes: Vec::new(),
            roots: Vec::new(),
            by_fingerprint: HashMap::new(),
        }
    }

    /// The node that was created for the given fingerprint, if any.
    #[must_use]
    pub(crate) fn find(&self, fingerprint: ScopeFingerprint) -> Option<NodeIndex> {
        self.by_fingerprint.get(&fingerprint).copied()
    }

    /// Returns the node for `fingerprint`, creating it as a child of the node for
    /// `parent_fingerprint` if this is the first time the fingerprint is observed.
    ///
    /// An existing node is returned as-is even if it was created under a different parent
    /// or with a different name. This happens when distinct scope stacks share a fingerprint.
    ///
    /// # Panics
    ///
    /// Panics if `fingerprint` is the empty fingerprint or if the parent fingerprint is not
    /// empty and has no node. Either indicates mismatched enter/exit calls.
    pub(crate) fn get_or_insert(
        &mut self,
        fingerprint: ScopeFingerprint,
        parent_fingerprint: ScopeFingerprint,
        name: &str,
    ) -> NodeIndex {
        assert!(
            !fingerprint.is_none(),
            "the empty fingerprint never has a node in the scope tree"
        );

        if let Some(existing) = self.find(fingerprint) {
            return existing;
        }

        let parent = if parent_fingerprint.is_none() {
            None
        } else {
            Some(self.find(parent_fingerprint).expect(
                "the enclosing scope must have a node - enter/exit calls are not correctly paired",
            ))
        };

        let index = NodeIndex(self.nodes.len());

        self.nodes.push(ScopeNode {
            name: name.into(),
            own_samples: 0,
            cumulative_samples: 0,
            children: Vec::new(),
        });

        match parent {
            Some(parent) => self.node_mut(parent).children.push(index),
            None => self.roots.push(index),
        }

        self.by_fingerprint.insert(fingerprint, index);

        index
    }

    /// Attributes one sample to the node.
    pub(crate) fn record_sample(&mut self, index: NodeIndex) {
        let node = self.node_mut(index);
        node.own_samples = node.own_samples.saturating_add(1);
    }

    /// Calculates cumulative sample counts and converts the tree into report form.
    ///
    /// Proportions are calculated against `total_samples`.
    pub(crate) fn aggregate(
        &mut self,
        total_samples: u64,
        thread_processor_time: Duration,
    ) -> Box<[ScopeReport]> {
        // Children always have higher indexes than their parents, so walking the arena
        // backwards visits every child before its parent (a post-order traversal).
        for position in (0..self.nodes.len()).rev() {
            let node = self
                .nodes
                .get(position)
                .expect("position is within bounds of the range we iterate over");

            let cumulative = node
                .children
                .iter()
                .map(|&child| self.node(child).cumulative_samples)
                .fold(node.own_samples, u64::saturating_add);

            self.node_mut(NodeIndex(position)).cumulative_samples = cumulative;
        }

        let mut finished: Vec<Option<ScopeReport>> = Vec::with_capacity(self.nodes.len());
        finished.resize_with(self.nodes.len(), || None);

        for position in (0..self.nodes.len()).rev() {
            let node = self.node(NodeIndex(position));

            let children = node
                .children
                .iter()
                .map(|child| {
                    finished
                        .get_mut(child.0)
                        .and_then(Option::take)
                        .expect("children are finished before their parent")
                })
                .collect::<Vec<_>>()
                .into_boxed_slice();

            let report = ScopeReport::new(
                node.name.to_string(),
                node.own_samples,
                node.cumulative_samples,
                total_samples,
                thread_processor_time,
                children,
            );

            *finished
                .get_mut(position)
                .expect("position is within bounds of the range we iterate over") = Some(report);
        }

        self.roots
            .iter()
            .map(|root| {
                finished
                    .get_mut(root.0)
                    .and_then(Option::take)
                    .expect("every root has been finished")
            })
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    #[cfg(test)]
    pub(crate) fn own_samples(&self, index: NodeIndex) -> u64 {
        self.node(index).own_samples
    }

    #[cfg(test)]
    pub(crate) fn cumulative_samples(&self, index: NodeIndex) -> u64 {
        self.node(index).cumulative_samples
    }

    fn node(&self, index: NodeIndex) -> &ScopeNode {
        self.nodes
            .get(index.0)
            .expect("node indexes are only handed out for nodes that exist")
    }

    fn node_mut(&mut self, index: NodeIndex) -> &mut ScopeNode {
        self.nodes
            .get_mut(index.0)
            .expect("node indexes are only handed out for nodes that exist")
    }
}
