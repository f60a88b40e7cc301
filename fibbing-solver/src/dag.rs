//
// Copyright (c) The Fibbing Controller Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::HashMap;
use std::hash::Hash;

use fibbing_utils::RouterId;

/// A vertex of a forwarding requirement DAG: either a real router, or the
/// destination itself (kept distinct since the destination is a prefix, not
/// a router, in the IGP graph).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DagNode {
    Router(RouterId),
    Dest,
}

/// A directed acyclic graph over `T`. Used both for the caller-facing
/// requirement DAG (`T = DagNode`) and, once resolved against a working
/// graph, the solver's internal index-keyed view (`T = NodeIndex`).
/// Acyclicity is the caller's responsibility; the solver only ever walks it
/// forwards towards a sink or backwards towards a source.
#[derive(Clone, Debug)]
pub struct Dag<T> {
    successors: HashMap<T, Vec<T>>,
    predecessors: HashMap<T, Vec<T>>,
}

impl<T> Default for Dag<T> {
    fn default() -> Self {
        Dag {
            successors: HashMap::new(),
            predecessors: HashMap::new(),
        }
    }
}

impl<T: Copy + Eq + Hash> Dag<T> {
    pub fn new() -> Dag<T> {
        Dag::default()
    }

    pub fn add_edge(&mut self, u: T, v: T) {
        let succ = self.successors.entry(u).or_default();
        if !succ.contains(&v) {
            succ.push(v);
        }
        let pred = self.predecessors.entry(v).or_default();
        if !pred.contains(&u) {
            pred.push(u);
        }
        self.successors.entry(v).or_default();
        self.predecessors.entry(u).or_default();
    }

    pub fn contains(&self, n: T) -> bool {
        self.successors.contains_key(&n)
    }

    pub fn successors(&self, n: T) -> &[T] {
        self.successors.get(&n).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn predecessors(&self, n: T) -> &[T] {
        self.predecessors.get(&n).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn out_degree(&self, n: T) -> usize {
        self.successors(n).len()
    }

    pub fn has_edge(&self, u: T, v: T) -> bool {
        self.successors(u).contains(&v)
    }

    pub fn nodes(&self) -> impl Iterator<Item = T> + '_ {
        self.successors.keys().copied()
    }

    pub fn sinks(&self) -> impl Iterator<Item = T> + '_ {
        self.nodes().filter(|&n| self.out_degree(n) == 0)
    }

    pub fn sources(&self) -> impl Iterator<Item = T> + '_ {
        self.nodes().filter(move |&n| self.predecessors(n).is_empty())
    }

    /// Every simple path from an in-degree-0 node down to `dest`, built by
    /// depth-first walk. Used by the merge-adjacent-fake-nodes stage, which
    /// only cares about consecutive node pairs along a path.
    pub fn paths_from_sources_to(&self, dest: T) -> Vec<Vec<T>> {
        let mut out = Vec::new();
        for source in self.sources().collect::<Vec<_>>() {
            let mut path = vec![source];
            self.walk(source, dest, &mut path, &mut out);
        }
        out
    }

    fn walk(&self, at: T, dest: T, path: &mut Vec<T>, out: &mut Vec<Vec<T>>) {
        if at == dest {
            out.push(path.clone());
            return;
        }
        for &next in self.successors(at) {
            path.push(next);
            self.walk(next, dest, path, out);
            path.pop();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::net::Ipv4Addr;

    fn rid(n: u8) -> RouterId {
        RouterId(Ipv4Addr::new(10, 0, 0, n))
    }

    #[test]
    fn tracks_successors_and_predecessors() {
        let mut dag: Dag<DagNode> = Dag::new();
        dag.add_edge(DagNode::Router(rid(1)), DagNode::Router(rid(2)));
        dag.add_edge(DagNode::Router(rid(2)), DagNode::Dest);

        assert_eq!(dag.successors(DagNode::Router(rid(1))), &[DagNode::Router(rid(2))]);
        assert_eq!(dag.predecessors(DagNode::Dest), &[DagNode::Router(rid(2))]);
        assert_eq!(dag.out_degree(DagNode::Dest), 0);
    }

    #[test]
    fn finds_paths_from_sources_to_dest() {
        let mut dag: Dag<DagNode> = Dag::new();
        dag.add_edge(DagNode::Router(rid(1)), DagNode::Router(rid(2)));
        dag.add_edge(DagNode::Router(rid(2)), DagNode::Dest);
        dag.add_edge(DagNode::Router(rid(3)), DagNode::Dest);

        let paths = dag.paths_from_sources_to(DagNode::Dest);
        assert_eq!(paths.len(), 2);
    }
}
