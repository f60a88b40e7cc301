//
// Copyright (c) The Fibbing Controller Contributors
//
// SPDX-License-Identifier: MIT
//

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use crate::graph::{IgpGraph, NodeIndex};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// A router-link or route metric came out negative relative to the
    /// running distance, which Dijkstra cannot handle; this can only
    /// happen if a caller bypasses `IgpGraph`'s `u32` metric type.
    NegativeMetric,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::NegativeMetric => write!(f, "contradictory paths found: negative metric?"),
        }
    }
}

#[derive(Clone, Copy, Eq, PartialEq)]
struct HeapEntry {
    cost: u64,
    seq: u64,
    node: NodeIndex,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap, Dijkstra wants the minimum.
        other
            .cost
            .cmp(&self.cost)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// All-pairs ECMP shortest-path table, holding both the view routers would
/// compute with no Fibbing active ("default") and the view they actually
/// compute once fake routes are live ("fibbed").
///
/// The fibbed table starts as a clone of the default one: routers not
/// targeted by any fake route never diverge, and [`ShortestPaths::refibbed`]
/// recomputes it once the graph carries the fake routes the solver emitted.
#[derive(Clone, Debug, Default)]
pub struct ShortestPaths {
    default_dist: HashMap<NodeIndex, HashMap<NodeIndex, u64>>,
    default_paths: HashMap<NodeIndex, HashMap<NodeIndex, Vec<Vec<NodeIndex>>>>,
    fibbed_dist: HashMap<NodeIndex, HashMap<NodeIndex, u64>>,
    fibbed_paths: HashMap<NodeIndex, HashMap<NodeIndex, Vec<Vec<NodeIndex>>>>,
}

impl ShortestPaths {
    /// Computes all-pairs ECMP shortest paths over router-link and real
    /// route edges, excluding fake routes.
    pub fn compute(graph: &IgpGraph) -> Result<ShortestPaths, Error> {
        let mut default_dist = HashMap::new();
        let mut default_paths = HashMap::new();

        for source in graph.routers().chain(graph.prefixes()) {
            let (dist, paths) = dijkstra_from(graph, source)?;
            default_dist.insert(source, dist);
            default_paths.insert(source, paths);
        }

        let fibbed_dist = default_dist.clone();
        let fibbed_paths = default_paths.clone();

        Ok(ShortestPaths {
            default_dist,
            default_paths,
            fibbed_dist,
            fibbed_paths,
        })
    }

    /// Extends the default (and fibbed) view with a new destination already
    /// connected from a known set of sinks, without re-running Dijkstra.
    ///
    /// For every node `n`, the new cost is `min over s in sinks of
    /// (dist(n, s) + metric(s, dest))`; ties extend every tied path at `s`
    /// with `dest` appended. The new paths never traverse `dest` as an
    /// intermediate node, since sinks are exactly the predecessors of
    /// `dest` in the augmented graph.
    pub fn add_destination(&mut self, dest: NodeIndex, sinks: &[(NodeIndex, u32)]) {
        add_destination_to(&mut self.default_dist, &mut self.default_paths, dest, sinks);
        add_destination_to(&mut self.fibbed_dist, &mut self.fibbed_paths, dest, sinks);
    }

    pub fn default_cost(&self, u: NodeIndex, v: NodeIndex) -> Option<u64> {
        self.default_dist.get(&u)?.get(&v).copied()
    }

    pub fn default_path(&self, u: NodeIndex, v: NodeIndex) -> &[Vec<NodeIndex>] {
        self.default_paths
            .get(&u)
            .and_then(|m| m.get(&v))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn fibbed_cost(&self, u: NodeIndex, v: NodeIndex) -> Option<u64> {
        self.fibbed_dist.get(&u)?.get(&v).copied()
    }

    pub fn fibbed_path(&self, u: NodeIndex, v: NodeIndex) -> &[Vec<NodeIndex>] {
        self.fibbed_paths
            .get(&u)
            .and_then(|m| m.get(&v))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

fn dijkstra_from(
    graph: &IgpGraph,
    source: NodeIndex,
) -> Result<(HashMap<NodeIndex, u64>, HashMap<NodeIndex, Vec<Vec<NodeIndex>>>), Error> {
    let mut dist: HashMap<NodeIndex, u64> = HashMap::new();
    let mut seen: HashMap<NodeIndex, u64> = HashMap::from([(source, 0)]);
    let mut paths: HashMap<NodeIndex, Vec<Vec<NodeIndex>>> =
        HashMap::from([(source, vec![vec![source]])]);
    let mut heap = BinaryHeap::new();
    let mut seq = 0u64;
    heap.push(HeapEntry {
        cost: 0,
        seq,
        node: source,
    });

    while let Some(HeapEntry { cost: d, node: v, .. }) = heap.pop() {
        if dist.contains_key(&v) {
            continue;
        }
        dist.insert(v, d);

        for w in graph.successors(v) {
            let Some(edge) = graph.edge(v, w) else {
                continue;
            };
            if edge.is_fake() {
                continue;
            }
            let vw_dist = d + edge.metric as u64;
            if let Some(&existing) = dist.get(&w)
                && vw_dist < existing
            {
                return Err(Error::NegativeMetric);
            }
            let seen_w = seen.get(&w).copied().unwrap_or(u64::MAX);
            if vw_dist < seen_w {
                seen.insert(w, vw_dist);
                seq += 1;
                heap.push(HeapEntry {
                    cost: vw_dist,
                    seq,
                    node: w,
                });
                let extended = extend_paths(&paths[&v], w);
                paths.insert(w, extended);
            } else if vw_dist == seen_w {
                let mut extended = extend_paths(&paths[&v], w);
                paths.entry(w).or_default().append(&mut extended);
            }
        }
    }

    Ok((dist, paths))
}

fn extend_paths(existing: &[Vec<NodeIndex>], next: NodeIndex) -> Vec<Vec<NodeIndex>> {
    existing
        .iter()
        .map(|p| {
            let mut p = p.clone();
            p.push(next);
            p
        })
        .collect()
}

fn add_destination_to(
    dist_table: &mut HashMap<NodeIndex, HashMap<NodeIndex, u64>>,
    paths_table: &mut HashMap<NodeIndex, HashMap<NodeIndex, Vec<Vec<NodeIndex>>>>,
    dest: NodeIndex,
    sinks: &[(NodeIndex, u32)],
) {
    let nodes: Vec<NodeIndex> = dist_table.keys().copied().collect();
    for n in nodes {
        let mut best: Option<u64> = None;
        let mut best_paths: Vec<Vec<NodeIndex>> = Vec::new();
        for &(sink, metric) in sinks {
            let Some(&d_n_sink) = dist_table.get(&n).and_then(|m| m.get(&sink)) else {
                continue;
            };
            let candidate = d_n_sink + metric as u64;
            match best {
                None => {
                    best = Some(candidate);
                    best_paths = extend_paths(&paths_table[&n][&sink], dest);
                }
                Some(b) if candidate < b => {
                    best = Some(candidate);
                    best_paths = extend_paths(&paths_table[&n][&sink], dest);
                }
                Some(b) if candidate == b => {
                    best_paths.append(&mut extend_paths(&paths_table[&n][&sink], dest));
                }
                _ => {}
            }
        }
        if let Some(cost) = best {
            dist_table.entry(n).or_default().insert(dest, cost);
            paths_table.entry(n).or_default().insert(dest, best_paths);
        }
    }
}

#[cfg(test)]
mod test {
    use std::net::Ipv4Addr;

    use fibbing_utils::RouterId;

    use super::*;
    use crate::graph::RouteKind;

    fn rid(n: u8) -> RouterId {
        RouterId(Ipv4Addr::new(10, 0, 0, n))
    }

    #[test]
    fn ecmp_ties_keep_both_paths() {
        let mut g = IgpGraph::new();
        let a = g.add_router(rid(1));
        let b = g.add_router(rid(2));
        let c = g.add_router(rid(3));
        let d = g.add_router(rid(4));
        g.add_router_link(a, b, 10, None, None);
        g.add_router_link(a, c, 10, None, None);
        g.add_router_link(b, d, 10, None, None);
        g.add_router_link(c, d, 10, None, None);

        let spt = ShortestPaths::compute(&g).unwrap();
        assert_eq!(spt.default_cost(a, d), Some(20));
        assert_eq!(spt.default_path(a, d).len(), 2);
    }

    #[test]
    fn fake_route_edges_excluded_from_default_spt() {
        let mut g = IgpGraph::new();
        let a = g.add_router(rid(1));
        let b = g.add_router(rid(2));
        let p = g.add_prefix("192.0.2.0/24".parse().unwrap());
        g.add_router_link(a, b, 10, None, None);
        g.add_route(a, p, RouteKind::Fake, 1, None);

        let spt = ShortestPaths::compute(&g).unwrap();
        assert_eq!(spt.default_cost(a, p), None);
    }

    #[test]
    fn trapezoid_default_costs() {
        let mut g = IgpGraph::new();
        let r1 = g.add_router(rid(1));
        let r2 = g.add_router(rid(2));
        let e1 = g.add_router(rid(3));
        let e2 = g.add_router(rid(4));
        let d = g.add_router(rid(5));
        g.add_router_link(r1, e1, 100, None, None);
        g.add_router_link(r1, r2, 100, None, None);
        g.add_router_link(r2, e2, 10, None, None);
        g.add_router_link(e1, d, 10, None, None);
        g.add_router_link(e2, d, 10, None, None);

        let spt = ShortestPaths::compute(&g).unwrap();
        // R1's default shortest path to D goes via E1 (cost 110), not via
        // R2/E2 (cost 120) -- this is exactly why the Fibbing requirement
        // in the Trapezoid scenario needs a fake LSA to override it.
        assert_eq!(spt.default_cost(r1, d), Some(110));
    }
}
