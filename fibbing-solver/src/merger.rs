//
// Copyright (c) The Fibbing Controller Contributors
//
// SPDX-License-Identifier: MIT
//

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use fibbing_graph::{IgpGraph, NodeId, NodeIndex, RouteKind, ShortestPaths};
use fibbing_utils::RouterId;
use ipnetwork::Ipv4Network;

use crate::dag::{Dag, DagNode};
use crate::error::Error;
use crate::node::{FakeKind, Node};

/// Where a fake node gets placed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Policy {
    /// A global fake node on every router with more than one outgoing link.
    Full,
    /// A fake node only where the DAG disagrees with the default next-hops.
    Partial,
    /// Like `Partial`, but also wherever the DAG itself requires ECMP.
    PartialEcmp,
}

/// One forwarding requirement: route everything destined to `prefix`
/// according to `dag`, which must have every leaf eventually reach
/// [`DagNode::Dest`].
#[derive(Clone, Debug)]
pub struct Requirement {
    pub prefix: Ipv4Network,
    pub dag: Dag<DagNode>,
}

/// A fake LSA the solver wants advertised: `node` should pretend its
/// shortest path to `dest` leaves via `next_hop`, at the stated `cost`. A
/// negative cost marks a *local lie*, scoped to a private broadcast domain
/// rather than globally visible.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FakeLsa {
    pub node: RouterId,
    pub next_hop: RouterId,
    pub cost: i64,
    pub dest: Ipv4Network,
}

struct DestCtx {
    dest: NodeIndex,
    dag: Dag<NodeIndex>,
    nodes: HashMap<NodeIndex, Node>,
    ecmp: HashMap<NodeIndex, HashSet<NodeIndex>>,
}

/// Reduces per-destination forwarding DAGs into fake LSAs.
///
/// `solve` mutates nothing the caller owns: it works on a private clone of
/// the input graph (to synthesize missing destinations and DAG-completion
/// edges) and a private per-destination `Node` bookkeeping table, discarding
/// both once the LSA list is produced.
pub struct Merger {
    policy: Policy,
    /// Metric assigned to synthesized edges when a destination has no real
    /// route in the graph yet.
    new_edge_metric: u32,
}

impl Merger {
    pub fn new(policy: Policy) -> Merger {
        Merger {
            policy,
            new_edge_metric: 100_000,
        }
    }

    /// Overrides the metric assigned to synthesized edges; must stay above
    /// every real metric in the network for the solver's bounds to hold.
    pub fn set_new_edge_metric(&mut self, metric: u32) {
        self.new_edge_metric = metric;
    }

    pub fn solve(
        &self,
        graph: &IgpGraph,
        requirements: &[Requirement],
    ) -> Result<Vec<FakeLsa>, fibbing_graph::spt::Error> {
        let mut work = graph.clone();
        let mut sp = ShortestPaths::compute(&work)?;
        let all_dests: HashSet<NodeIndex> = requirements
            .iter()
            .map(|r| work.add_prefix(r.prefix))
            .collect();

        let mut lsas = Vec::new();
        for req in requirements {
            match self.prepare(&mut work, &mut sp, req) {
                Ok(mut ctx) => {
                    self.place_fake_nodes(&mut ctx, &work);
                    self.initialize_ecmp_deps(&mut ctx, &sp);
                    self.compute_initial_lb(&mut ctx, &work, &sp, &all_dests);
                    self.compute_initial_ub(&mut ctx, &sp);
                    self.propagate_lb(&mut ctx, &work, &sp, None);
                    self.merge_fake_nodes(&mut ctx, &sp);
                    self.remove_redundant_fake_nodes(&mut ctx, &sp);
                    lsas.extend(self.create_fake_lsa(&ctx, &work, req.prefix));
                }
                Err(error) => error.log(),
            }
        }
        Ok(lsas)
    }

    // -- Stage 1: prepare ------------------------------------------------

    fn prepare(
        &self,
        work: &mut IgpGraph,
        sp: &mut ShortestPaths,
        req: &Requirement,
    ) -> Result<DestCtx, Error> {
        let dest_idx = work.add_prefix(req.prefix);

        let mut caller_dag = req.dag.clone();
        if caller_dag.predecessors(DagNode::Dest).is_empty() {
            let sinks: Vec<DagNode> = caller_dag.sinks().filter(|&n| n != DagNode::Dest).collect();
            for s in sinks {
                caller_dag.add_edge(s, DagNode::Dest);
            }
        }

        let mut dag: Dag<NodeIndex> = Dag::new();
        for u in caller_dag.nodes().collect::<Vec<_>>() {
            let u_idx = resolve_dagnode(work, dest_idx, u);
            for &v in caller_dag.successors(u) {
                let v_idx = resolve_dagnode(work, dest_idx, v);
                dag.add_edge(u_idx, v_idx);
            }
        }

        if is_fake_dest(work, dest_idx) {
            let sources: Vec<NodeIndex> = dag.predecessors(dest_idx).to_vec();
            for &s in &sources {
                work.add_route(s, dest_idx, RouteKind::Fake, self.new_edge_metric, None);
            }
            let sinks: Vec<(NodeIndex, u32)> =
                sources.iter().map(|&s| (s, self.new_edge_metric)).collect();
            sp.add_destination(dest_idx, &sinks);
        }

        for r in work.routers().collect::<Vec<_>>() {
            if dag.contains(r) {
                continue;
            }
            if work.successors(r).next().is_none() {
                continue;
            }
            for path in sp.default_path(r, dest_idx).to_vec() {
                for w in path.windows(2) {
                    let (u, v) = (w[0], w[1]);
                    let v_in_dag = dag.contains(v);
                    dag.add_edge(u, v);
                    if v_in_dag {
                        break;
                    }
                }
            }
        }

        for u in dag.nodes().collect::<Vec<_>>() {
            for &v in dag.successors(u) {
                if work.edge(u, v).is_none() {
                    return Err(Error::Unsolvable {
                        from: name_of(work, u),
                        to: name_of(work, v),
                    });
                }
            }
        }

        let mut nodes: HashMap<NodeIndex, Node> = HashMap::new();
        for n in dag.nodes().collect::<Vec<_>>() {
            if n == dest_idx {
                continue;
            }
            let mut node = Node::new();
            node.forced_nhs = dag.successors(n).iter().copied().collect();
            node.original_nhs = sp
                .default_path(n, dest_idx)
                .iter()
                .filter_map(|p| p.get(1).copied())
                .collect();
            nodes.insert(n, node);
        }

        Ok(DestCtx {
            dest: dest_idx,
            dag,
            nodes,
            ecmp: HashMap::new(),
        })
    }

    // -- Stage 2: place fake nodes ----------------------------------------

    fn place_fake_nodes(&self, ctx: &mut DestCtx, work: &IgpGraph) {
        let dest = ctx.dest;
        match self.policy {
            Policy::Full => {
                let penultimate: HashSet<NodeIndex> = ctx.dag.predecessors(dest).iter().copied().collect();
                for n in ctx.dag.nodes().collect::<Vec<_>>() {
                    if n == dest || work.successors(n).count() <= 1 {
                        continue;
                    }
                    let is_penultimate = penultimate.contains(&n);
                    let node = ctx.nodes.entry(n).or_insert_with(Node::new);
                    node.add_fake_node(FakeKind::Global);
                    if is_penultimate {
                        // lb/ub set in compute_initial_lb/ub once costs are
                        // known; Full's penultimate nodes get a tighter seed
                        // here since their cost-to-dest is already final.
                    }
                }
            }
            Policy::Partial | Policy::PartialEcmp => {
                for n in ctx.dag.nodes().collect::<Vec<_>>() {
                    if n == dest || work.successors(n).count() <= 1 {
                        continue;
                    }
                    let (original, forced) = match ctx.nodes.get(&n) {
                        Some(node) => (node.original_nhs.clone(), node.forced_nhs.clone()),
                        None => continue,
                    };
                    let needs = match self.policy {
                        Policy::PartialEcmp => {
                            forced.len() > 1 || original.symmetric_difference(&forced).next().is_some()
                        }
                        _ => original.symmetric_difference(&forced).next().is_some(),
                    };
                    let node = ctx.nodes.entry(n).or_insert_with(Node::new);
                    if needs {
                        node.add_fake_node(FakeKind::Global);
                    } else {
                        node.forced_nhs.clear();
                    }
                }
            }
        }
    }

    // -- Stage 3: ECMP dependencies ---------------------------------------

    fn initialize_ecmp_deps(&self, ctx: &mut DestCtx, sp: &ShortestPaths) {
        let dest = ctx.dest;
        for n in ctx.dag.nodes().collect::<Vec<_>>() {
            if n == dest || ctx.dag.out_degree(n) <= 1 {
                continue;
            }
            let has_fake = ctx.nodes.get(&n).map(Node::has_any_fake).unwrap_or(false);
            if has_fake {
                ctx.ecmp.entry(n).or_default().insert(n);
                continue;
            }
            let paths = sp.default_path(n, dest).to_vec();
            let mut found = Vec::new();
            for p in &paths {
                for &h in &p[..p.len().saturating_sub(1)] {
                    if ctx.nodes.get(&h).map(Node::has_any_fake).unwrap_or(false) {
                        found.push(h);
                        break;
                    }
                }
            }
            if !found.is_empty() && found.len() < paths.len() {
                ctx.nodes
                    .entry(n)
                    .or_insert_with(Node::new)
                    .add_fake_node(FakeKind::Global);
            } else {
                for f in found {
                    ctx.ecmp.entry(f).or_default().insert(n);
                }
            }
        }
    }

    // -- Stage 4: initial bounds -------------------------------------------

    fn compute_initial_lb(
        &self,
        ctx: &mut DestCtx,
        work: &IgpGraph,
        sp: &ShortestPaths,
        all_dests: &HashSet<NodeIndex>,
    ) {
        let mut visited = HashSet::new();
        let mut to_visit: Vec<NodeIndex> = work.predecessors(ctx.dest).collect();
        while let Some(n) = to_visit.pop() {
            if !visited.insert(n) {
                continue;
            }
            let has_global = ctx.nodes.get(&n).map(|nd| nd.has_fake(Some(FakeKind::Global))).unwrap_or(false);
            if has_global {
                let already_set = ctx.nodes.get(&n).map(|nd| nd.lb != 0).unwrap_or(false);
                if already_set {
                    continue;
                }
                let lb = self.initial_lb_of(ctx, work, sp, all_dests, n);
                ctx.nodes.get_mut(&n).unwrap().lb = lb;
            } else {
                to_visit.extend(work.predecessors(n));
            }
        }
    }

    /// `lb(n)`: the largest cost margin among `n`'s outgoing neighbors that
    /// still have an untouched path to the destination, so that `n`'s fake
    /// node never looks cheaper than a neighbor's genuine route.
    fn initial_lb_of(
        &self,
        ctx: &DestCtx,
        work: &IgpGraph,
        sp: &ShortestPaths,
        all_dests: &HashSet<NodeIndex>,
        n: NodeIndex,
    ) -> i64 {
        let mut lb = 0i64;
        for nei in work.successors(n).collect::<Vec<_>>() {
            if all_dests.contains(&nei) {
                continue;
            }
            let nei_has_fake = ctx.nodes.get(&nei).map(Node::has_any_fake).unwrap_or(false);
            let dag_edge_to_n = ctx.dag.has_edge(nei, n);
            // A neighbor that both carries a fake node and whose default SPT
            // edge to `n` is also the DAG's requirement is redundant with
            // `n`: it still bounds `n`'s lb (one cost unit below its own
            // shortest path, as a tie-break), rather than being excluded
            // outright like an unrelated fake-node holder.
            let redundant_sibling = nei_has_fake && dag_edge_to_n;
            if !redundant_sibling {
                if nei_has_fake {
                    continue;
                }
                if dag_edge_to_n {
                    continue;
                }
            }
            let nei_paths = sp.default_path(nei, ctx.dest);
            if nei_paths.is_empty() {
                continue;
            }
            let mut has_pure_path = false;
            let mut node_in_spt = false;
            'paths: for p in nei_paths {
                let mut is_pure = true;
                for &mid in &p[..p.len().saturating_sub(1)] {
                    if mid == nei {
                        continue;
                    }
                    if ctx.nodes.get(&mid).map(|nd| nd.has_fake(Some(FakeKind::Global))).unwrap_or(false) {
                        is_pure = false;
                        break;
                    }
                    if mid == n {
                        node_in_spt = true;
                        break 'paths;
                    }
                }
                has_pure_path = has_pure_path || is_pure;
            }
            if node_in_spt || !has_pure_path {
                continue;
            }
            let nei_cost = sp.default_cost(nei, ctx.dest).unwrap_or(0) as i64;
            let node_cost = sp.default_cost(nei, n).unwrap_or(0) as i64;
            let mut nei_lb = nei_cost - node_cost;
            if redundant_sibling {
                nei_lb -= 1;
            }
            if nei_lb > lb {
                lb = nei_lb;
            }
        }
        lb
    }

    fn compute_initial_ub(&self, ctx: &mut DestCtx, sp: &ShortestPaths) {
        let dest = ctx.dest;
        for (&n, node) in ctx.nodes.iter_mut() {
            if !node.has_fake(Some(FakeKind::Global)) || node.ub != 0 {
                continue;
            }
            node.ub = sp.default_cost(n, dest).unwrap_or(0) as i64;
        }
    }

    // -- Stage 5: propagate lower bounds -----------------------------------

    fn fake_neighbors(&self, ctx: &DestCtx, work: &IgpGraph, n: NodeIndex) -> Vec<NodeIndex> {
        let mut visited = HashSet::new();
        let mut to_visit: Vec<NodeIndex> = work.real_neighbors(n).collect();
        let mut out = Vec::new();
        while let Some(m) = to_visit.pop() {
            if !visited.insert(m) {
                continue;
            }
            if ctx.nodes.get(&m).map(|nd| nd.has_fake(Some(FakeKind::Global))).unwrap_or(false) {
                out.push(m);
            } else {
                to_visit.extend(work.real_neighbors(m));
            }
        }
        out
    }

    fn get_delta(&self, ctx: &DestCtx, work: &IgpGraph, sp: &ShortestPaths, n: NodeIndex) -> i64 {
        let costs: Vec<i64> = self
            .fake_neighbors(ctx, work, n)
            .iter()
            .map(|&m| sp.default_cost(n, m).unwrap_or(0) as i64)
            .collect();
        match costs.iter().min() {
            Some(&min) => ctx.nodes.get(&n).map(|nd| nd.lb).unwrap_or(0) - min,
            None => i64::MIN,
        }
    }

    fn fixed_nodes_for(&self, ctx: &DestCtx, n: NodeIndex) -> HashSet<NodeIndex> {
        let mut fixed = HashSet::new();
        let mut stack: Vec<(NodeIndex, NodeIndex)> =
            ctx.dag.predecessors(n).iter().map(|&p| (p, n)).collect();
        while let Some((u, v)) = stack.pop() {
            let u_forces_v = ctx.nodes.get(&u).map(|nd| nd.forced_nhs.contains(&v)).unwrap_or(false);
            if u_forces_v {
                continue;
            }
            if !fixed.insert(u) {
                continue;
            }
            stack.extend(ctx.dag.predecessors(u).iter().map(|&p| (p, u)));
        }
        fixed
    }

    fn dag_includes_spt(&self, ctx: &DestCtx, sp: &ShortestPaths, n: NodeIndex, s: NodeIndex) -> bool {
        for p in sp.default_path(n, s) {
            for w in p.windows(2) {
                let (u, v) = (w[0], w[1]);
                if !ctx.dag.has_edge(u, v) {
                    return false;
                }
                if v == s {
                    break;
                }
            }
        }
        true
    }

    fn inherit_lb(
        &self,
        ctx: &DestCtx,
        sp: &ShortestPaths,
        from_node: NodeIndex,
        target: NodeIndex,
        fixed: &HashSet<NodeIndex>,
    ) -> i64 {
        let base = ctx.nodes.get(&from_node).map(|nd| nd.lb).unwrap_or(0);
        let mut best = i64::MIN;
        for &k in std::iter::once(&from_node).chain(fixed.iter()) {
            let a = sp.default_cost(from_node, k).unwrap_or(0) as i64;
            let b = sp.default_cost(k, target).unwrap_or(0) as i64;
            let mut c = a - b;
            if !self.dag_includes_spt(ctx, sp, k, target) {
                c += 1;
            }
            if c > best {
                best = c;
            }
        }
        base + best
    }

    fn valid_range(&self, ctx: &DestCtx, s: NodeIndex, lb: i64, ub: i64) -> bool {
        let dag_succ: HashSet<NodeIndex> = ctx.dag.successors(s).iter().copied().collect();
        let orig = ctx.nodes.get(&s).map(|n| n.original_nhs.clone()).unwrap_or_default();
        let pad = if dag_succ == orig { 1 } else { 0 };
        lb + 1 < ub + pad
    }

    /// Propagates lower bounds outward from `initial` (or from every
    /// global-fake node if `None`) until no more increases are implied.
    /// A propagation step that would breach a node's upper bound downgrades
    /// that node (and its ECMP dependents) to a local lie rather than
    /// aborting the whole pass, matching the common (non-merge) case.
    fn propagate_lb(
        &self,
        ctx: &mut DestCtx,
        work: &IgpGraph,
        sp: &ShortestPaths,
        initial: Option<Vec<NodeIndex>>,
    ) {
        let seed: Vec<NodeIndex> = initial.unwrap_or_else(|| {
            ctx.nodes
                .iter()
                .filter(|(_, n)| n.has_fake(Some(FakeKind::Global)))
                .map(|(&idx, _)| idx)
                .collect()
        });
        let mut heap = BinaryHeap::new();
        let mut seq = 0u64;
        for n in seed {
            heap.push(HeapItem {
                delta: self.get_delta(ctx, work, sp, n),
                seq,
                node: n,
            });
            seq += 1;
        }
        let mut updates: HashSet<(NodeIndex, NodeIndex)> = HashSet::new();

        while let Some(HeapItem { delta, node: n, .. }) = heap.pop() {
            if delta < self.get_delta(ctx, work, sp, n) {
                continue;
            }
            let fixed = self.fixed_nodes_for(ctx, n);
            for m in self.fake_neighbors(ctx, work, n) {
                let m_lb = ctx.nodes.get(&m).map(|nd| nd.lb).unwrap_or(0);
                let lb_diff = self.inherit_lb(ctx, sp, n, m, &fixed) - m_lb;
                if lb_diff <= 0 {
                    continue;
                }
                if updates.contains(&(n, m)) {
                    self.downgrade(ctx, m);
                    continue;
                }
                updates.insert((n, m));
                let (m_lb, m_ub) = {
                    let node = ctx.nodes.get(&m).unwrap();
                    (node.lb, node.ub)
                };
                if m_lb + lb_diff + 1 < m_ub {
                    ctx.nodes.get_mut(&m).unwrap().lb += lb_diff;
                    seq += 1;
                    heap.push(HeapItem {
                        delta: self.get_delta(ctx, work, sp, m),
                        seq,
                        node: m,
                    });
                    let deps: Vec<NodeIndex> = ctx.ecmp.get(&m).cloned().unwrap_or_default().into_iter().collect();
                    for e in deps {
                        if e == m {
                            continue;
                        }
                        let e_node = ctx.nodes.get(&e).cloned().unwrap_or_default();
                        if self.valid_range(ctx, e, e_node.lb + lb_diff, e_node.ub) {
                            ctx.nodes.get_mut(&e).unwrap().lb += lb_diff;
                            seq += 1;
                            heap.push(HeapItem {
                                delta: self.get_delta(ctx, work, sp, e),
                                seq,
                                node: e,
                            });
                        } else {
                            self.downgrade(ctx, e);
                        }
                    }
                } else {
                    self.downgrade(ctx, m);
                }
            }
        }
    }

    fn downgrade(&self, ctx: &mut DestCtx, n: NodeIndex) {
        if let Some(node) = ctx.nodes.get_mut(&n) {
            node.downgrade_to_local();
        }
        let deps: Vec<NodeIndex> = ctx.ecmp.get(&n).cloned().unwrap_or_default().into_iter().collect();
        for e in deps {
            if let Some(node) = ctx.nodes.get_mut(&e) {
                node.downgrade_to_local();
            }
        }
    }

    // -- Stage 6: merge adjacent fake nodes ---------------------------------

    fn merge_fake_nodes(&self, ctx: &mut DestCtx, sp: &ShortestPaths) {
        let dest = ctx.dest;
        for path in ctx.dag.paths_from_sources_to(dest) {
            let fake_positions: Vec<(usize, NodeIndex)> = path[..path.len().saturating_sub(1)]
                .iter()
                .enumerate()
                .filter(|&(_, &n)| ctx.nodes.get(&n).map(Node::has_any_fake).unwrap_or(false))
                .map(|(i, &n)| (i, n))
                .collect();
            for w in fake_positions.windows(2) {
                let (pos, n) = w[0];
                let (_, succ) = w[1];
                let both_global = ctx.nodes.get(&n).map(|nd| nd.fake == Some(FakeKind::Global)).unwrap_or(false)
                    && ctx.nodes.get(&succ).map(|nd| nd.fake == Some(FakeKind::Global)).unwrap_or(false);
                if !both_global {
                    continue;
                }
                let nh = path[pos + 1];
                self.try_merge(ctx, sp, n, succ, nh);
            }
        }
    }

    /// Attempts to fold `n`'s fake node into `succ`'s, eliminating one fake
    /// node along the path when the shortest path between them is already
    /// the path the DAG wants. Feasibility is checked before any mutation,
    /// so a rejected merge leaves state untouched (a simplification of the
    /// speculative-apply-then-rollback scheme a from-scratch port would
    /// otherwise need).
    fn try_merge(&self, ctx: &mut DestCtx, sp: &ShortestPaths, n: NodeIndex, succ: NodeIndex, nh: NodeIndex) {
        if !self.dag_includes_spt(ctx, sp, n, succ) {
            return;
        }
        if ctx.ecmp.get(&n).map(|d| d.contains(&succ)).unwrap_or(false) {
            return;
        }
        let Some(cost) = sp.default_cost(n, succ).map(|c| c as i64) else {
            return;
        };
        let (node_lb, node_ub) = match ctx.nodes.get(&n) {
            Some(node) => (node.lb, node.ub),
            None => return,
        };
        let (succ_lb, succ_ub) = match ctx.nodes.get(&succ) {
            Some(node) => (node.lb, node.ub),
            None => return,
        };
        let new_ub = (node_ub - cost).min(succ_ub);
        let new_lb = (node_lb - cost).max(succ_lb);
        if !self.valid_range(ctx, succ, new_lb, new_ub) {
            return;
        }

        let remove_n = {
            let n_node = ctx.nodes.get_mut(&n).unwrap();
            n_node.forced_nhs.remove(&nh);
            let remove_n = !n_node.has_fake(Some(FakeKind::Global));
            if remove_n {
                n_node.remove_fake_node();
            }
            remove_n
        };

        {
            let succ_node = ctx.nodes.get_mut(&succ).unwrap();
            succ_node.lb = new_lb;
            succ_node.ub = new_ub;
        }

        let n_ecmp_deps: Vec<NodeIndex> = ctx.ecmp.get(&n).cloned().unwrap_or_default().into_iter().collect();
        let path_cost_increase = cost + new_lb - node_lb;
        for &e in &n_ecmp_deps {
            if remove_n {
                if let Some(set) = ctx.ecmp.get_mut(&n) {
                    set.remove(&e);
                }
            }
            ctx.ecmp.entry(succ).or_default().insert(e);
            ctx.ecmp.entry(e).or_default().insert(succ);
            let e_node = ctx.nodes.get(&e).cloned().unwrap_or_default();
            let candidate_lb = e_node.lb + path_cost_increase;
            if self.valid_range(ctx, e, candidate_lb, e_node.ub) {
                ctx.nodes.get_mut(&e).unwrap().lb = candidate_lb;
            }
        }
        let mut seed = n_ecmp_deps;
        seed.push(succ);
        // Re-propagation after a merge only needs the default-SPT tables,
        // not graph adjacency, so a dummy empty graph view is unnecessary
        // here: `propagate_lb` already takes `work` only to discover fake
        // neighbors, which did not change by merging.
        self.propagate_lb_within_dag(ctx, sp, seed);
    }

    /// `propagate_lb`'s fake-neighbor discovery needs graph adjacency; when
    /// called after a merge we only ever re-check nodes already known to
    /// have fake status, so we walk the DAG's own edges instead of the full
    /// IGP graph.
    fn propagate_lb_within_dag(&self, ctx: &mut DestCtx, sp: &ShortestPaths, seed: Vec<NodeIndex>) {
        let mut heap = BinaryHeap::new();
        let mut seq = 0u64;
        for n in seed {
            heap.push(HeapItem {
                delta: self.get_delta_dag(ctx, sp, n),
                seq,
                node: n,
            });
            seq += 1;
        }
        while let Some(HeapItem { delta, node: n, .. }) = heap.pop() {
            if delta < self.get_delta_dag(ctx, sp, n) {
                continue;
            }
            let fixed = self.fixed_nodes_for(ctx, n);
            for m in self.fake_neighbors_within_dag(ctx, n) {
                let m_lb = ctx.nodes.get(&m).map(|nd| nd.lb).unwrap_or(0);
                let lb_diff = self.inherit_lb(ctx, sp, n, m, &fixed) - m_lb;
                if lb_diff <= 0 {
                    continue;
                }
                let (m_lb, m_ub) = {
                    let node = ctx.nodes.get(&m).unwrap();
                    (node.lb, node.ub)
                };
                if m_lb + lb_diff + 1 < m_ub {
                    ctx.nodes.get_mut(&m).unwrap().lb += lb_diff;
                    seq += 1;
                    heap.push(HeapItem {
                        delta: self.get_delta_dag(ctx, sp, m),
                        seq,
                        node: m,
                    });
                } else {
                    self.downgrade(ctx, m);
                }
            }
        }
    }

    fn fake_neighbors_within_dag(&self, ctx: &DestCtx, n: NodeIndex) -> Vec<NodeIndex> {
        let mut visited = HashSet::new();
        let mut to_visit: Vec<NodeIndex> = ctx.dag.successors(n).to_vec();
        let mut out = Vec::new();
        while let Some(m) = to_visit.pop() {
            if !visited.insert(m) {
                continue;
            }
            if ctx.nodes.get(&m).map(|nd| nd.has_fake(Some(FakeKind::Global))).unwrap_or(false) {
                out.push(m);
            } else {
                to_visit.extend(ctx.dag.successors(m).iter().copied());
            }
        }
        out
    }

    fn get_delta_dag(&self, ctx: &DestCtx, sp: &ShortestPaths, n: NodeIndex) -> i64 {
        let costs: Vec<i64> = self
            .fake_neighbors_within_dag(ctx, n)
            .iter()
            .map(|&m| sp.default_cost(n, m).unwrap_or(0) as i64)
            .collect();
        match costs.iter().min() {
            Some(&min) => ctx.nodes.get(&n).map(|nd| nd.lb).unwrap_or(0) - min,
            None => i64::MIN,
        }
    }

    // -- Stage 7: remove redundant fakes ------------------------------------

    fn remove_redundant_fake_nodes(&self, ctx: &mut DestCtx, sp: &ShortestPaths) {
        let dest = ctx.dest;
        let mut visited = HashSet::new();
        let mut to_visit: Vec<NodeIndex> = ctx.dag.predecessors(dest).to_vec();
        while let Some(n) = to_visit.pop() {
            if !visited.insert(n) {
                continue;
            }
            let has_global = ctx.nodes.get(&n).map(|nd| nd.has_fake(Some(FakeKind::Global))).unwrap_or(false);
            if has_global {
                let succs = ctx.dag.successors(n).to_vec();
                if let Some(&succ0) = succs.first() {
                    let succ_dest_cost = sp.default_cost(succ0, dest).unwrap_or(0) as i64;
                    let n_succ_cost = sp.default_cost(n, succ0).unwrap_or(0) as i64;
                    let succs_set: HashSet<NodeIndex> = succs.iter().copied().collect();
                    let node = ctx.nodes.get(&n).unwrap();
                    if node.lb + 1 == succ_dest_cost + n_succ_cost && node.original_nhs == succs_set {
                        ctx.nodes.get_mut(&n).unwrap().remove_fake_node();
                    }
                }
            } else {
                to_visit.extend(ctx.dag.predecessors(n).iter().copied());
            }
        }
    }

    // -- Stage 8: emit LSAs -------------------------------------------------

    fn create_fake_lsa(&self, ctx: &DestCtx, work: &IgpGraph, dest_prefix: Ipv4Network) -> Vec<FakeLsa> {
        let mut out = Vec::new();
        for n in ctx.dag.nodes() {
            if n == ctx.dest {
                continue;
            }
            let Some(node) = ctx.nodes.get(&n) else {
                continue;
            };
            let Some(n_rid) = work.router_id(n) else {
                continue;
            };
            for &nh in &node.forced_nhs {
                if nh == ctx.dest {
                    continue;
                }
                let Some(nh_rid) = work.router_id(nh) else {
                    continue;
                };
                let cost = if node.fake == Some(FakeKind::Global) { node.lb + 1 } else { -1 };
                out.push(FakeLsa {
                    node: n_rid,
                    next_hop: nh_rid,
                    cost,
                    dest: dest_prefix,
                });
            }
        }
        out
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
struct HeapItem {
    delta: i64,
    seq: u64,
    node: NodeIndex,
}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.delta.cmp(&other.delta).then_with(|| self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn resolve_dagnode(work: &mut IgpGraph, dest_idx: NodeIndex, node: DagNode) -> NodeIndex {
    match node {
        DagNode::Dest => dest_idx,
        DagNode::Router(rid) => work.add_router(rid),
    }
}

/// Whether `dest_idx` is reachable only through fake routes (or not at all),
/// meaning it needs a synthesized real-looking edge before the solver can
/// reason about it.
fn is_fake_dest(work: &IgpGraph, dest_idx: NodeIndex) -> bool {
    for p in work.predecessors(dest_idx) {
        if let Some(edge) = work.edge(p, dest_idx)
            && !edge.is_fake()
        {
            return false;
        }
    }
    true
}

fn name_of(work: &IgpGraph, idx: NodeIndex) -> String {
    match work.node_id(idx) {
        Some(NodeId::Router(rid)) => rid.to_string(),
        Some(NodeId::Prefix(p)) => p.to_string(),
        Some(NodeId::Controller(c)) => c,
        None => "?".to_string(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::net::Ipv4Addr;

    fn rid(n: u8) -> RouterId {
        RouterId(Ipv4Addr::new(10, 0, 0, n))
    }

    /// R1 -> {E1, R2} -> {D via E1 cost 110, D via R2/E2 cost 120}.
    /// Requiring R1 to reach D via R2 needs exactly one fake LSA on R1.
    fn trapezoid() -> (IgpGraph, Ipv4Network) {
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
        let prefix: Ipv4Network = "192.0.2.0/24".parse().unwrap();
        let p = g.add_prefix(prefix);
        g.add_route(d, p, RouteKind::Real, 1, None);
        (g, prefix)
    }

    #[test]
    fn trapezoid_requires_one_fake_lsa_with_partial_merger() {
        let (g, prefix) = trapezoid();
        let sp = ShortestPaths::compute(&g).unwrap();
        let d_idx = g.find(&NodeId::Prefix(prefix)).unwrap();
        let r1 = g.find(&NodeId::Router(rid(1))).unwrap();
        let r2 = g.find(&NodeId::Router(rid(2))).unwrap();
        // Sanity: default path from R1 goes via E1, not R2.
        assert_eq!(sp.default_path(r1, d_idx)[0][1], g.find(&NodeId::Router(rid(3))).unwrap());
        let _ = r2;

        let mut dag: Dag<DagNode> = Dag::new();
        dag.add_edge(DagNode::Router(rid(1)), DagNode::Router(rid(2)));
        dag.add_edge(DagNode::Router(rid(2)), DagNode::Router(rid(4)));
        dag.add_edge(DagNode::Router(rid(4)), DagNode::Dest);

        let merger = Merger::new(Policy::Partial);
        let lsas = merger
            .solve(&g, &[Requirement { prefix, dag }])
            .unwrap();
        assert_eq!(lsas.len(), 1);
        assert_eq!(lsas[0].node, rid(1));
        assert_eq!(lsas[0].next_hop, rid(2));
    }

    #[test]
    fn unsolvable_requirement_is_skipped_not_fatal() {
        let (g, prefix) = trapezoid();
        let mut dag: Dag<DagNode> = Dag::new();
        // rid(9) never appears in the graph at all.
        dag.add_edge(DagNode::Router(rid(1)), DagNode::Router(rid(9)));
        dag.add_edge(DagNode::Router(rid(9)), DagNode::Dest);

        let merger = Merger::new(Policy::Partial);
        let lsas = merger.solve(&g, &[Requirement { prefix, dag }]).unwrap();
        assert!(lsas.is_empty());
    }
}
