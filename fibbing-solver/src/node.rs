//
// Copyright (c) The Fibbing Controller Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::HashSet;

use fibbing_graph::NodeIndex;

/// Whether a fake node is visible to the whole AS or scoped to a private
/// broadcast domain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FakeKind {
    Global,
    Local,
}

/// Per-destination solver state attached to a router while solving one
/// requirement DAG. Dropped (and rebuilt) between destinations.
#[derive(Clone, Debug, Default)]
pub struct Node {
    pub lb: i64,
    pub ub: i64,
    pub fake: Option<FakeKind>,
    pub forced_nhs: HashSet<NodeIndex>,
    pub original_nhs: HashSet<NodeIndex>,
}

impl Node {
    pub fn new() -> Node {
        Node::default()
    }

    pub fn add_fake_node(&mut self, kind: FakeKind) {
        self.fake = Some(kind);
    }

    pub fn remove_fake_node(&mut self) {
        self.fake = None;
        self.forced_nhs.clear();
    }

    /// Whether this node currently carries a fake node, optionally of a
    /// specific kind. A node with an empty forced-next-hop set never counts,
    /// even if `fake` is still set from a prior stage.
    pub fn has_fake(&self, kind: Option<FakeKind>) -> bool {
        !self.forced_nhs.is_empty()
            && match kind {
                Some(kind) => self.fake == Some(kind),
                None => self.fake.is_some(),
            }
    }

    pub fn has_any_fake(&self) -> bool {
        self.has_fake(Some(FakeKind::Global)) || self.has_fake(Some(FakeKind::Local))
    }

    pub fn downgrade_to_local(&mut self) {
        self.fake = Some(FakeKind::Local);
    }
}
