//
// Copyright (c) The Fibbing Controller Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::HashMap;
use std::net::Ipv4Addr;

use fibbing_graph::{EdgeKind, IgpGraph, NodeId, NodeKind, RouteKind};
use fibbing_utils::RouterId;
use ipnetwork::Ipv4Network;
use tracing::debug;

use crate::error::Error;
use crate::lsa::{is_expired, is_newer_seqnum, Lsa, LsaKey, LsaResolver, LsaType, NetworkLsa};
use crate::parse::{parse_ingest_line, IngestLine};
use crate::private_addr::PrivateAddressStore;

/// A snapshot of one edge, keyed by the endpoints' stable [`NodeId`]s rather
/// than their (rebuild-local) arena indices, so that diffs survive a graph
/// rebuild.
#[derive(Clone, Debug, PartialEq)]
pub struct EdgeSnapshot {
    pub u: NodeId,
    pub v: NodeId,
    pub metric: u32,
    pub fake: bool,
    pub targets: Option<Vec<RouterId>>,
}

/// Mutable per-node properties a listener may care about, distinct from a
/// node's identity.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeProperties {
    pub private_addrs: Vec<Ipv4Addr>,
}

/// What a graph rebuild yields for listener fan-out.
#[derive(Clone, Debug)]
pub enum GraphEvent {
    Bootstrap {
        edges: Vec<EdgeSnapshot>,
        node_properties: Vec<(NodeId, NodeProperties)>,
    },
    Diff {
        added: Vec<EdgeSnapshot>,
        removed: Vec<(NodeId, NodeId)>,
        node_properties: Vec<(NodeId, NodeProperties)>,
    },
}

/// A listener attached to the LSDB's graph-changed notifications. The LSDB
/// delivers a bootstrap on first attachment and a diff on every subsequent
/// rebuild, always followed by a call to `commit`.
pub trait Listener: Send {
    fn bootstrap_graph(&mut self, edges: &[EdgeSnapshot], node_properties: &[(NodeId, NodeProperties)]);
    fn add_edge(&mut self, edge: &EdgeSnapshot);
    fn remove_edge(&mut self, u: &NodeId, v: &NodeId);
    fn update_node_properties(&mut self, updates: &[(NodeId, NodeProperties)]);
    fn commit(&mut self);
}

struct ListenerSlot {
    listener: Box<dyn Listener>,
    bootstrapped: bool,
}

/// Keyed store of current LSAs, the reconstructed IGP graph, and the set of
/// attached listeners.
///
/// A single writer is expected to drive `handle_line`/`commit`/`force_commit`
/// (see the concurrency design in the daemon crate); `graph()` is safe to
/// read concurrently once a snapshot has been published.
pub struct Lsdb {
    store: HashMap<LsaKey, Lsa>,
    transaction_open: bool,
    dirty_add: bool,
    dirty_asext_rem: bool,
    last_line: String,
    graph: IgpGraph,
    base_net: Ipv4Network,
    controller_prefix: u8,
    private_addresses: PrivateAddressStore,
    controllers: Vec<u32>,
    listeners: Vec<ListenerSlot>,
}

impl Lsdb {
    pub fn new(
        base_net: Ipv4Network,
        controller_prefix: u8,
        private_addresses: PrivateAddressStore,
    ) -> Lsdb {
        Lsdb {
            store: HashMap::new(),
            transaction_open: false,
            dirty_add: false,
            dirty_asext_rem: false,
            last_line: String::new(),
            graph: IgpGraph::new(),
            base_net,
            controller_prefix,
            private_addresses,
            controllers: Vec::new(),
            listeners: Vec::new(),
        }
    }

    pub fn graph(&self) -> &IgpGraph {
        &self.graph
    }

    /// The smallest controller instance id currently visible in the graph,
    /// used as a crude leader-election tiebreak; `None` if no controller
    /// instance has been contracted yet.
    pub fn leader(&self) -> Option<u32> {
        self.controllers.iter().min().copied()
    }

    pub fn register_listener(&mut self, listener: Box<dyn Listener>) {
        self.listeners.push(ListenerSlot {
            listener,
            bootstrapped: false,
        });
    }

    /// Handles one line from the ingest stream: applies it to the LSA store
    /// immediately (per OSPF's own sequence-number discipline) without
    /// rebuilding the graph. Rebuilds happen via [`Lsdb::commit`] or
    /// [`Lsdb::force_commit`].
    pub fn handle_line(&mut self, line: &str) -> Result<(), Error> {
        if line.is_empty() || line == self.last_line {
            return Ok(());
        }
        self.last_line = line.to_string();

        match parse_ingest_line(line)? {
            IngestLine::Begin => {
                self.transaction_open = true;
            }
            IngestLine::Commit => {
                self.transaction_open = false;
            }
            IngestLine::Add(lsa) => {
                if !self.is_old_seqnum(&lsa) {
                    debug!(lsa = %lsa, "adding LSA");
                    if let Some(key) = lsa.key() {
                        self.dirty_add = true;
                        self.store.insert(key, lsa);
                    }
                }
            }
            IngestLine::Rem(lsa) => {
                if let Some(key) = lsa.key() {
                    if matches!(key, LsaKey::AsExternal(..)) {
                        self.dirty_asext_rem = true;
                    }
                    self.store.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn is_old_seqnum(&self, lsa: &Lsa) -> bool {
        let Some(key) = lsa.key() else {
            return false;
        };
        match self.store.get(&key) {
            Some(current) => {
                let current_seq = current.header().seq_num;
                let new_seq = lsa.header().seq_num;
                !is_newer_seqnum(new_seq, current_seq) && new_seq != current_seq
            }
            None => false,
        }
    }

    fn dirty(&self) -> bool {
        self.dirty_add || self.dirty_asext_rem
    }

    /// Rebuilds and fans out a diff if the transaction is closed and the
    /// store has changed since the last commit; a no-op otherwise.
    pub fn commit(&mut self) -> Option<GraphEvent> {
        if self.transaction_open || !self.dirty() {
            return None;
        }
        Some(self.do_commit())
    }

    /// Unconditionally rebuilds if dirty, regardless of whether a
    /// transaction is still open; used by the idle-timeout auto-commit.
    pub fn force_commit(&mut self) -> Option<GraphEvent> {
        self.transaction_open = false;
        if !self.dirty() {
            return None;
        }
        Some(self.do_commit())
    }

    fn do_commit(&mut self) -> GraphEvent {
        let previous = std::mem::take(&mut self.graph);
        self.graph = self.rebuild();
        self.dirty_add = false;
        self.dirty_asext_rem = false;

        let event = self.diff_against(&previous);
        self.notify_listeners(&event);
        event
    }

    fn rebuild(&mut self) -> IgpGraph {
        self.controllers.clear();
        let live: HashMap<LsaKey, Lsa> = self
            .store
            .iter()
            .filter(|(_, lsa)| !is_expired(lsa.header().age))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let resolver = Resolver {
            live: &live,
            base_net: self.base_net,
            private_addresses: &self.private_addresses,
        };

        let mut graph = IgpGraph::new();
        for lsa in live.values() {
            lsa.apply(&mut graph, &resolver);
        }

        // Contract each router's interface IPs (Router-LSA link addresses
        // plus the private-address store) into its router-id.
        for lsa in live.values() {
            let Some(rlsa) = lsa.as_router() else {
                continue;
            };
            let router_idx = graph.add_router(rlsa.header.router_id);
            let mut ips = rlsa.interface_ips();
            if let Some(private) = self.private_addresses.addresses_of(rlsa.header.router_id, None)
            {
                ips.extend(private);
            }
            let group: Vec<_> = ips
                .into_iter()
                .filter_map(|ip| graph.find(&NodeId::Router(RouterId(ip))))
                .collect();
            graph.contract(router_idx, group);
        }

        // Identify controller instances by bit-masking router-ids inside
        // the base network, then contract each group into `C_<instance>`.
        let base_addr: u32 = self.base_net.network().into();
        let shift = 32u8.saturating_sub(self.controller_prefix);
        let mask: u32 = if self.controller_prefix >= 32 {
            u32::MAX
        } else {
            (1u32 << self.controller_prefix) - 1
        };
        let mut groups: HashMap<u32, Vec<fibbing_graph::NodeIndex>> = HashMap::new();
        for idx in graph.routers() {
            let Some(router_id) = graph.router_id(idx) else {
                continue;
            };
            if !self.base_net.contains(router_id.0) {
                continue;
            }
            let addr: u32 = router_id.0.into();
            let cid = ((addr.wrapping_sub(base_addr)) >> shift) & mask;
            groups.entry(cid).or_default().push(idx);
        }
        let mut cids: Vec<u32> = groups.keys().copied().collect();
        cids.sort_unstable();
        self.controllers = cids.clone();
        for cid in cids {
            let members = groups.remove(&cid).unwrap_or_default();
            let cname = format!("C_{cid}");
            let controller_idx = graph.add_controller(cname);
            graph.contract(controller_idx, members);
        }

        graph.remove_self_loops();
        self.apply_secondary_addresses(&mut graph);
        graph
    }

    /// Annotates `dst_address` on each router-link edge from the
    /// private-address store, so `forwarding_address_of(Some(src), dst)`
    /// can resolve a private link-local address.
    fn apply_secondary_addresses(&self, graph: &mut IgpGraph) {
        let edges: Vec<(fibbing_graph::NodeIndex, fibbing_graph::NodeIndex)> = graph
            .export_edges()
            .filter(|(_, _, data)| matches!(data.kind, EdgeKind::RouterLink { .. }))
            .map(|(u, v, _)| (u, v))
            .collect();
        for (u, v) in edges {
            let (Some(src_rid), Some(dst_rid)) = (graph.router_id(u), graph.router_id(v)) else {
                continue;
            };
            if let Some(addrs) = self.private_addresses.addresses_of(dst_rid, Some(src_rid)) {
                if let Some(&addr) = addrs.first() {
                    graph.set_router_link_dst_address(u, v, addr);
                }
            }
        }
    }

    /// `forwarding_address_of(src, dst)`: if `src` is given, the private
    /// `dst_address` of the `src -> dst` link; otherwise the numerically
    /// smallest `src_address` among `dst`'s outgoing router-links, to yield
    /// a stable public address. Never raises; missing data yields `None`.
    pub fn forwarding_address_of(&self, src: Option<RouterId>, dst: RouterId) -> Option<Ipv4Addr> {
        let dst_idx = self.graph.find(&NodeId::Router(dst))?;
        match src {
            Some(src) => {
                let src_idx = self.graph.find(&NodeId::Router(src))?;
                match self.graph.edge(src_idx, dst_idx)?.kind {
                    EdgeKind::RouterLink { dst_address, .. } => dst_address,
                    _ => None,
                }
            }
            None => self
                .graph
                .successors(dst_idx)
                .filter_map(|succ| match self.graph.edge(dst_idx, succ)?.kind {
                    EdgeKind::RouterLink { src_address, .. } => src_address,
                    _ => None,
                })
                .min(),
        }
    }

    fn diff_against(&self, previous: &IgpGraph) -> GraphEvent {
        let node_properties: Vec<(NodeId, NodeProperties)> = self
            .graph
            .routers()
            .filter_map(|idx| {
                let node = self.graph.node(idx)?;
                let NodeKind::Router {
                    router_id,
                    private_addrs,
                } = &node.kind
                else {
                    return None;
                };
                Some((
                    NodeId::Router(*router_id),
                    NodeProperties {
                        private_addrs: private_addrs.clone(),
                    },
                ))
            })
            .collect();

        let any_bootstrap_pending = self.listeners.iter().any(|l| !l.bootstrapped);
        if any_bootstrap_pending || previous.export_edges().next().is_none() {
            let edges = self
                .graph
                .export_edges()
                .filter_map(|(u, v, data)| snapshot(&self.graph, u, v, data))
                .collect();
            return GraphEvent::Bootstrap {
                edges,
                node_properties,
            };
        }

        let added: Vec<EdgeSnapshot> = self
            .graph
            .difference(previous)
            .filter_map(|(u, v, data)| snapshot(&self.graph, u, v, data))
            .collect();
        let removed: Vec<(NodeId, NodeId)> = previous
            .difference(&self.graph)
            .filter_map(|(u, v, _)| Some((previous.node_id(u)?, previous.node_id(v)?)))
            .collect();

        GraphEvent::Diff {
            added,
            removed,
            node_properties,
        }
    }

    fn notify_listeners(&mut self, event: &GraphEvent) {
        for slot in &mut self.listeners {
            if !slot.bootstrapped {
                if let GraphEvent::Bootstrap {
                    edges,
                    node_properties,
                } = event
                {
                    slot.listener.bootstrap_graph(edges, node_properties);
                    slot.bootstrapped = true;
                }
            } else if let GraphEvent::Diff {
                added,
                removed,
                node_properties,
            } = event
            {
                for edge in added {
                    slot.listener.add_edge(edge);
                }
                for (u, v) in removed {
                    slot.listener.remove_edge(u, v);
                }
                slot.listener.update_node_properties(node_properties);
            }
            slot.listener.commit();
        }
    }
}

impl std::fmt::Display for Lsdb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "* LSDB Content [{}]:", self.store.len())?;
        for lsa in self.store.values() {
            writeln!(f, "{lsa}")?;
        }
        Ok(())
    }
}

fn snapshot(graph: &IgpGraph, u: fibbing_graph::NodeIndex, v: fibbing_graph::NodeIndex, data: &fibbing_graph::EdgeData) -> Option<EdgeSnapshot> {
    Some(EdgeSnapshot {
        u: graph.node_id(u)?,
        v: graph.node_id(v)?,
        metric: data.metric,
        fake: data.is_fake(),
        targets: data.targets().map(|t| t.to_vec()),
    })
}

struct Resolver<'a> {
    live: &'a HashMap<LsaKey, Lsa>,
    base_net: Ipv4Network,
    private_addresses: &'a PrivateAddressStore,
}

impl LsaResolver for Resolver<'_> {
    fn network_lsa(&self, dr_ip: Ipv4Addr) -> Option<&NetworkLsa> {
        self.live.get(&LsaKey::Network(dr_ip)).and_then(Lsa::as_network)
    }

    fn is_controller_owned(&self, router_id: RouterId) -> bool {
        self.base_net.contains(router_id.0)
    }

    fn private_targets_for(&self, addr: Ipv4Addr) -> Option<Vec<RouterId>> {
        self.private_addresses.targets_for(addr)
    }
}

#[allow(dead_code)]
fn lsa_type_of(key: &LsaKey) -> LsaType {
    match key {
        LsaKey::Router(_) => LsaType::Router,
        LsaKey::Network(_) => LsaType::Network,
        LsaKey::AsExternal(..) => LsaType::AsExternal,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn lsdb() -> Lsdb {
        Lsdb::new(
            "172.16.0.0/16".parse().unwrap(),
            8,
            PrivateAddressStore::empty(),
        )
    }

    #[test]
    fn duplicate_of_last_line_is_dropped() {
        let mut db = lsdb();
        let line = "ADD|rid:10.0.0.1;link_id:10.0.0.1;lsa_type:1;age:1;seq_num:1;";
        db.handle_line(line).unwrap();
        let before = db.store.len();
        db.handle_line(line).unwrap();
        assert_eq!(db.store.len(), before);
    }

    #[test]
    fn transaction_defers_commit_until_closed() {
        let mut db = lsdb();
        db.handle_line("BEGIN|").unwrap();
        db.handle_line("ADD|rid:10.0.0.1;link_id:10.0.0.1;lsa_type:1;age:1;seq_num:1;")
            .unwrap();
        assert!(db.commit().is_none());
        db.handle_line("COMMIT|").unwrap();
        assert!(db.commit().is_some());
    }

    #[test]
    fn old_seqnum_add_is_discarded() {
        let mut db = lsdb();
        db.handle_line("ADD|rid:10.0.0.1;link_id:10.0.0.1;lsa_type:1;age:1;seq_num:5;")
            .unwrap();
        db.handle_line("ADD|rid:10.0.0.1;link_id:10.0.0.1;lsa_type:1;age:1;seq_num:3;")
            .unwrap();
        let key = LsaKey::Router(RouterId(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(db.store.get(&key).unwrap().header().seq_num, 5);
    }

    #[test]
    fn equal_seqnum_add_overwrites_for_flush() {
        let mut db = lsdb();
        db.handle_line("ADD|rid:10.0.0.1;link_id:10.0.0.1;lsa_type:1;age:1;seq_num:5; link_id:10.0.0.2;link_type:1;link_data:10.0.1.1;link_metric:10;")
            .unwrap();
        db.handle_line("ADD|rid:10.0.0.1;link_id:10.0.0.1;lsa_type:1;age:30;seq_num:5;")
            .unwrap();
        let key = LsaKey::Router(RouterId(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(db.store.get(&key).unwrap().header().age, 30);
    }
}
