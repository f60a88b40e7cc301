//
// Copyright (c) The Fibbing Controller Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::HashMap;

use fibbing_utils::RouterId;
use generational_arena::Index;
use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};

/// Stable index of a node in an [`IgpGraph`]. Indices stay valid across
/// insertions and removals of unrelated nodes, matching the generational
/// arena discipline used by the LSDB and neighbor tables.
pub type NodeIndex = Index;

/// An identity used to look nodes up by their natural key, independent of
/// their arena index.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeId {
    Router(RouterId),
    Prefix(Ipv4Network),
    Controller(String),
}

/// What a node represents in the IGP.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    Router {
        router_id: RouterId,
        private_addrs: Vec<std::net::Ipv4Addr>,
    },
    Prefix(Ipv4Network),
    Controller(String),
}

#[derive(Clone, Debug)]
pub struct NodeData {
    pub kind: NodeKind,
}

impl NodeData {
    pub fn id(&self) -> NodeId {
        match &self.kind {
            NodeKind::Router { router_id, .. } => NodeId::Router(*router_id),
            NodeKind::Prefix(net) => NodeId::Prefix(*net),
            NodeKind::Controller(name) => NodeId::Controller(name.clone()),
        }
    }
}

/// Whether a route edge reflects a real external route or one previously
/// injected by a Fibbing controller (recognized on ingest by the
/// originator's router-id falling inside the controller's reserved
/// base-network).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteKind {
    Real,
    Fake,
}

/// What an edge represents.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeKind {
    /// A router-to-router OSPF adjacency.
    RouterLink {
        src_address: Option<std::net::Ipv4Addr>,
        dst_address: Option<std::net::Ipv4Addr>,
    },
    /// A router-to-prefix route. `targets`, when present and non-empty,
    /// scopes a fake route to a *local lie*: it is only visible to the
    /// listed router-ids.
    Route {
        kind: RouteKind,
        targets: Option<Vec<RouterId>>,
    },
}

#[derive(Clone, Debug)]
pub struct EdgeData {
    pub kind: EdgeKind,
    pub metric: u32,
    /// Load-splitting-ratio annotation (see `set_edge_multiplicity`); unused
    /// by the shortest-path engine and the solver, kept for parity with the
    /// graph's original operation set.
    pub multiplicity: u32,
}

impl EdgeData {
    pub fn is_fake(&self) -> bool {
        matches!(
            self.kind,
            EdgeKind::Route {
                kind: RouteKind::Fake,
                ..
            }
        )
    }

    pub fn is_local(&self) -> bool {
        matches!(&self.kind, EdgeKind::Route { targets: Some(t), .. } if !t.is_empty())
    }

    pub fn targets(&self) -> Option<&[RouterId]> {
        match &self.kind {
            EdgeKind::Route {
                targets: Some(t), ..
            } => Some(t),
            _ => None,
        }
    }
}

/// A directed multidigraph of routers, prefixes, and contracted controller
/// instances, with router-link and route edges.
///
/// Invariant: if an edge is local (`targets.is_some()`), `targets` is
/// non-empty. The graph is kept free of self-loops after contraction —
/// callers must not call `contract` in a way that would create one without
/// going through [`IgpGraph::remove_self_loops`] afterwards.
#[derive(Clone, Debug, Default)]
pub struct IgpGraph {
    nodes: generational_arena::Arena<NodeData>,
    id_tree: HashMap<NodeId, NodeIndex>,
    edges: HashMap<(NodeIndex, NodeIndex), EdgeData>,
    out_adj: HashMap<NodeIndex, Vec<NodeIndex>>,
    in_adj: HashMap<NodeIndex, Vec<NodeIndex>>,
}

impl IgpGraph {
    pub fn new() -> IgpGraph {
        IgpGraph::default()
    }

    fn insert_node(&mut self, kind: NodeKind) -> NodeIndex {
        let id = NodeData { kind }.id();
        if let Some(idx) = self.id_tree.get(&id) {
            return *idx;
        }
        let idx = self.nodes.insert(NodeData { kind: id_kind(&id) });
        self.id_tree.insert(id, idx);
        idx
    }

    pub fn add_router(&mut self, router_id: RouterId) -> NodeIndex {
        self.insert_node(NodeKind::Router {
            router_id,
            private_addrs: Vec::new(),
        })
    }

    pub fn add_prefix(&mut self, prefix: Ipv4Network) -> NodeIndex {
        self.insert_node(NodeKind::Prefix(prefix))
    }

    pub fn add_controller(&mut self, name: impl Into<String>) -> NodeIndex {
        self.insert_node(NodeKind::Controller(name.into()))
    }

    pub fn set_private_addrs(&mut self, router: NodeIndex, addrs: Vec<std::net::Ipv4Addr>) {
        if let Some(node) = self.nodes.get_mut(router) {
            if let NodeKind::Router { private_addrs, .. } = &mut node.kind {
                *private_addrs = addrs;
            }
        }
    }

    pub fn node(&self, idx: NodeIndex) -> Option<&NodeData> {
        self.nodes.get(idx)
    }

    pub fn find(&self, id: &NodeId) -> Option<NodeIndex> {
        self.id_tree.get(id).copied()
    }

    pub fn node_id(&self, idx: NodeIndex) -> Option<NodeId> {
        self.nodes.get(idx).map(|n| n.id())
    }

    pub fn is_router(&self, idx: NodeIndex) -> bool {
        matches!(
            self.nodes.get(idx).map(|n| &n.kind),
            Some(NodeKind::Router { .. })
        )
    }

    pub fn is_prefix(&self, idx: NodeIndex) -> bool {
        matches!(
            self.nodes.get(idx).map(|n| &n.kind),
            Some(NodeKind::Prefix(_))
        )
    }

    pub fn router_id(&self, idx: NodeIndex) -> Option<RouterId> {
        match self.nodes.get(idx).map(|n| &n.kind) {
            Some(NodeKind::Router { router_id, .. }) => Some(*router_id),
            _ => None,
        }
    }

    pub fn routers(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.nodes
            .iter()
            .filter(|(_, n)| matches!(n.kind, NodeKind::Router { .. }))
            .map(|(idx, _)| idx)
    }

    pub fn prefixes(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.nodes
            .iter()
            .filter(|(_, n)| matches!(n.kind, NodeKind::Prefix(_)))
            .map(|(idx, _)| idx)
    }

    /// Adds a router-link edge, or overwrites its metric/addresses if one
    /// already exists between the same pair.
    pub fn add_router_link(
        &mut self,
        u: NodeIndex,
        v: NodeIndex,
        metric: u32,
        src_address: Option<std::net::Ipv4Addr>,
        dst_address: Option<std::net::Ipv4Addr>,
    ) {
        self.insert_edge(
            u,
            v,
            EdgeData {
                kind: EdgeKind::RouterLink {
                    src_address,
                    dst_address,
                },
                metric,
                multiplicity: 1,
            },
        );
    }

    /// Adds a route edge (router -> prefix). `targets`, when `Some`, marks
    /// the route as a local lie scoped to those router-ids; the set must be
    /// non-empty.
    pub fn add_route(
        &mut self,
        router: NodeIndex,
        prefix: NodeIndex,
        kind: RouteKind,
        metric: u32,
        targets: Option<Vec<RouterId>>,
    ) {
        debug_assert!(targets.as_ref().is_none_or(|t| !t.is_empty()));
        self.insert_edge(
            router,
            prefix,
            EdgeData {
                kind: EdgeKind::Route { kind, targets },
                metric,
                multiplicity: 1,
            },
        );
    }

    fn insert_edge(&mut self, u: NodeIndex, v: NodeIndex, data: EdgeData) {
        if u == v {
            return;
        }
        if self.edges.insert((u, v), data).is_none() {
            self.out_adj.entry(u).or_default().push(v);
            self.in_adj.entry(v).or_default().push(u);
        }
    }

    /// Removes a single directed edge, if present. Used by listeners that
    /// mirror incremental `remove_edge` notifications rather than rebuilding
    /// from a full snapshot each time.
    pub fn remove_edge(&mut self, u: NodeIndex, v: NodeIndex) -> bool {
        if self.edges.remove(&(u, v)).is_none() {
            return false;
        }
        if let Some(out) = self.out_adj.get_mut(&u) {
            out.retain(|&n| n != v);
        }
        if let Some(inn) = self.in_adj.get_mut(&v) {
            inn.retain(|&n| n != u);
        }
        true
    }

    pub fn set_metric(&mut self, u: NodeIndex, v: NodeIndex, metric: u32) {
        if let Some(edge) = self.edges.get_mut(&(u, v)) {
            edge.metric = metric;
        }
    }

    /// Annotates a router-link edge's `dst_address`, used by
    /// `forwarding_address_of` when a caller supplies an explicit source.
    pub fn set_router_link_dst_address(
        &mut self,
        u: NodeIndex,
        v: NodeIndex,
        dst_address: std::net::Ipv4Addr,
    ) {
        if let Some(edge) = self.edges.get_mut(&(u, v)) {
            if let EdgeKind::RouterLink {
                dst_address: slot, ..
            } = &mut edge.kind
            {
                *slot = Some(dst_address);
            }
        }
    }

    pub fn metric(&self, u: NodeIndex, v: NodeIndex) -> Option<u32> {
        self.edges.get(&(u, v)).map(|e| e.metric)
    }

    pub fn edge(&self, u: NodeIndex, v: NodeIndex) -> Option<&EdgeData> {
        self.edges.get(&(u, v))
    }

    pub fn set_edge_multiplicity(&mut self, u: NodeIndex, v: NodeIndex, multiplicity: u32) {
        if let Some(edge) = self.edges.get_mut(&(u, v)) {
            edge.multiplicity = multiplicity;
        }
    }

    pub fn get_edge_multiplicity(&self, u: NodeIndex, v: NodeIndex) -> Option<u32> {
        self.edges.get(&(u, v)).map(|e| e.multiplicity)
    }

    pub fn successors(&self, u: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.out_adj.get(&u).into_iter().flatten().copied()
    }

    pub fn predecessors(&self, v: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.in_adj.get(&v).into_iter().flatten().copied()
    }

    /// Neighbors that are themselves routers, skipping prefix nodes.
    pub fn real_neighbors(&self, u: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.successors(u).filter(|&v| self.is_router(v))
    }

    /// Rewrites every edge touching any node in `group` to instead touch
    /// `into`, then deletes the members of `group`. When two occurrences of
    /// the same `(u, v)` pair would collide after rewriting, the first one
    /// encountered keeps its edge data.
    pub fn contract(&mut self, into: NodeIndex, group: impl IntoIterator<Item = NodeIndex>) {
        let group: Vec<NodeIndex> = group.into_iter().filter(|&n| n != into).collect();
        if group.is_empty() {
            return;
        }
        let rewrite = |n: NodeIndex| -> NodeIndex {
            if group.contains(&n) { into } else { n }
        };

        let old_edges: Vec<((NodeIndex, NodeIndex), EdgeData)> = self.edges.drain().collect();
        self.out_adj.clear();
        self.in_adj.clear();
        for ((u, v), data) in old_edges {
            let (u, v) = (rewrite(u), rewrite(v));
            if u == v {
                continue;
            }
            if !self.edges.contains_key(&(u, v)) {
                self.out_adj.entry(u).or_default().push(v);
                self.in_adj.entry(v).or_default().push(u);
            }
            self.edges.entry((u, v)).or_insert(data);
        }

        for n in group {
            if let Some(node) = self.nodes.remove(n) {
                self.id_tree.remove(&node.id());
            }
        }
    }

    /// Drops any remaining `(n, n)` edge; a no-op unless a caller bypassed
    /// `insert_edge`/`contract`'s own self-loop filtering.
    pub fn remove_self_loops(&mut self) {
        let loops: Vec<NodeIndex> = self
            .edges
            .keys()
            .filter(|(u, v)| u == v)
            .map(|(u, _)| *u)
            .collect();
        for n in loops {
            self.edges.remove(&(n, n));
        }
    }

    /// Edges present in `self` but absent from `other`, keyed by endpoint
    /// indices resolved through each graph's own `NodeId`.
    pub fn difference<'a>(
        &'a self,
        other: &'a IgpGraph,
    ) -> impl Iterator<Item = (NodeIndex, NodeIndex, &'a EdgeData)> + 'a {
        self.edges.iter().filter_map(move |(&(u, v), data)| {
            let u_id = self.nodes.get(u)?.id();
            let v_id = self.nodes.get(v)?.id();
            let other_edge = other
                .find(&u_id)
                .zip(other.find(&v_id))
                .and_then(|(ou, ov)| other.edges.get(&(ou, ov)));
            match other_edge {
                Some(_) => None,
                None => Some((u, v, data)),
            }
        })
    }

    pub fn export_edges(&self) -> impl Iterator<Item = (NodeIndex, NodeIndex, &EdgeData)> + '_ {
        self.edges.iter().map(|(&(u, v), data)| (u, v, data))
    }
}

fn id_kind(id: &NodeId) -> NodeKind {
    match id {
        NodeId::Router(router_id) => NodeKind::Router {
            router_id: *router_id,
            private_addrs: Vec::new(),
        },
        NodeId::Prefix(net) => NodeKind::Prefix(*net),
        NodeId::Controller(name) => NodeKind::Controller(name.clone()),
    }
}

#[cfg(test)]
mod test {
    use std::net::Ipv4Addr;

    use super::*;

    fn rid(a: u8, b: u8, c: u8, d: u8) -> RouterId {
        RouterId(Ipv4Addr::new(a, b, c, d))
    }

    #[test]
    fn contract_merges_interface_ips_into_router_id() {
        let mut g = IgpGraph::new();
        let r1 = g.add_router(rid(1, 1, 1, 1));
        let iface = g.add_router(rid(10, 0, 0, 1));
        let r2 = g.add_router(rid(2, 2, 2, 2));
        g.add_router_link(r1, iface, 10, None, None);
        g.add_router_link(iface, r2, 10, None, None);

        g.contract(r1, [iface]);

        assert_eq!(g.metric(r1, r2), Some(10));
        assert!(g.find(&NodeId::Router(rid(10, 0, 0, 1))).is_none());
    }

    #[test]
    fn real_neighbors_skips_prefixes() {
        let mut g = IgpGraph::new();
        let r1 = g.add_router(rid(1, 1, 1, 1));
        let r2 = g.add_router(rid(2, 2, 2, 2));
        let p = g.add_prefix("10.0.0.0/24".parse().unwrap());
        g.add_router_link(r1, r2, 10, None, None);
        g.add_route(r1, p, RouteKind::Real, 1, None);

        let neighbors: Vec<_> = g.real_neighbors(r1).collect();
        assert_eq!(neighbors, vec![r2]);
    }

    #[test]
    fn difference_finds_edges_missing_from_other() {
        let mut a = IgpGraph::new();
        let r1 = a.add_router(rid(1, 1, 1, 1));
        let r2 = a.add_router(rid(2, 2, 2, 2));
        a.add_router_link(r1, r2, 10, None, None);

        let b = IgpGraph::new();

        let diff: Vec<_> = a.difference(&b).collect();
        assert_eq!(diff.len(), 1);
    }
}
