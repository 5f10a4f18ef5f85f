//! State of one assertion-propagation run over one method.

use std::collections::HashMap;

use crate::{
    assertion::{AssertionIndex, AssertionStore, PropagationMode},
    ir::NodeId,
    vn::ValueNumOracle,
};

/// The assertion table plus the side tables the creator, generator, resolver
/// and consumers share while working on one method.
///
/// Creation lives in `creator.rs`, generation in `generator.rs`, implication
/// in `implied.rs` and the rewrite consumers in `propagate.rs`; all of them are
/// `impl` blocks on this type.
pub struct AssertionEngine<'v> {
    pub(crate) store: AssertionStore,
    pub(crate) vns: &'v dyn ValueNumOracle,
    node_assertions: HashMap<NodeId, AssertionIndex>,
    introducers: HashMap<AssertionIndex, NodeId>,
}

impl<'v> AssertionEngine<'v> {
    /// Creates an engine with an empty table of at most `capacity` entries.
    #[must_use]
    pub fn new(mode: PropagationMode, capacity: usize, vns: &'v dyn ValueNumOracle) -> Self {
        Self {
            store: AssertionStore::new(mode, capacity),
            vns,
            node_assertions: HashMap::new(),
            introducers: HashMap::new(),
        }
    }

    /// The comparison mode.
    #[must_use]
    pub fn mode(&self) -> PropagationMode {
        self.store.mode()
    }

    /// Returns `true` in global mode.
    #[must_use]
    pub fn is_global(&self) -> bool {
        self.store.mode() == PropagationMode::Global
    }

    /// The assertion table.
    #[must_use]
    pub fn store(&self) -> &AssertionStore {
        &self.store
    }

    /// The value-number oracle.
    #[must_use]
    pub fn vns(&self) -> &'v dyn ValueNumOracle {
        self.vns
    }

    /// The proven assertion attached to `node` by generation, if any.
    #[must_use]
    pub fn node_assertion(&self, node: NodeId) -> AssertionIndex {
        self.node_assertions
            .get(&node)
            .copied()
            .unwrap_or(AssertionIndex::NONE)
    }

    /// The first node the fact at `index` was attached to.
    ///
    /// Deduplication makes later nodes proving the same fact share its index;
    /// only the introducer may not consume its own fact.
    #[must_use]
    pub fn introducer(&self, index: AssertionIndex) -> Option<NodeId> {
        self.introducers.get(&index).copied()
    }

    pub(crate) fn set_node_assertion(&mut self, node: NodeId, index: AssertionIndex) {
        if index.is_some() {
            self.node_assertions.insert(node, index);
            self.introducers.entry(index).or_insert(node);
        }
    }

    pub(crate) fn clear_node_assertion(&mut self, node: NodeId) {
        self.node_assertions.remove(&node);
    }

    /// Forgets all facts and node attachments.
    pub fn reset(&mut self) {
        self.store.reset();
        self.node_assertions.clear();
        self.introducers.clear();
    }
}

impl std::fmt::Debug for AssertionEngine<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssertionEngine")
            .field("store", &self.store)
            .field("node_assertions", &self.node_assertions.len())
            .finish_non_exhaustive()
    }
}
