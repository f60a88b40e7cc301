//
// Copyright (c) The Fibbing Controller Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

use fibbing_graph::{IgpGraph, NodeId, NodeIndex, RouteKind};
use fibbing_lsdb::{EdgeSnapshot, Listener, NodeProperties};
use fibbing_solver::{FakeLsa, Merger, Requirement};
use fibbing_utils::RouterId;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

use crate::sjmp::{self, ExecArg, MethodInfo, Target};

/// A command for the southbound side: what the controller wants advertised
/// or withdrawn towards the Quagga-facing Fibbing agent, or a request to
/// shut that agent down.
#[derive(Clone, Debug)]
pub enum SouthboundCommand {
    Add(Vec<FakeLsa>),
    Remove(Vec<FakeLsa>),
    Exit,
}

/// Mirrors the committed IGP graph and drives the Fibbing solver's refresh
/// loop whenever the topology or the requirement set changes.
///
/// Implements [`Listener`] so the LSDB can feed it graph diffs directly in
/// process, and separately implements [`Target`] so the same northbound
/// method surface can be driven over an SJMP connection from an external
/// topology monitor (the architecture the wire protocol was designed for).
/// Running the solver inline inside `commit()`/`exec()` rather than
/// dispatching it to a dedicated `Idle -> Solving -> Dirty?` task is a
/// simplification: solving is pure CPU and these calls never block on I/O,
/// so no suspension point is lost by keeping it synchronous here.
pub struct Controller {
    graph: IgpGraph,
    requirements: Vec<Requirement>,
    merger: Merger,
    advertized: HashSet<FakeLsa>,
    southbound: UnboundedSender<SouthboundCommand>,
    /// Set once `bootstrap_graph` has run. Until then `graph` is the empty
    /// graph from `IgpGraph::new()`, and solving against it would just churn
    /// every requirement as unsolvable.
    bootstrapped: bool,
}

impl Controller {
    pub fn new(
        merger: Merger,
        requirements: Vec<Requirement>,
        southbound: UnboundedSender<SouthboundCommand>,
    ) -> Controller {
        Controller {
            graph: IgpGraph::new(),
            requirements,
            merger,
            advertized: HashSet::new(),
            southbound,
            bootstrapped: false,
        }
    }

    pub fn graph(&self) -> &IgpGraph {
        &self.graph
    }

    pub fn set_requirements(&mut self, requirements: Vec<Requirement>) {
        self.requirements = requirements;
        self.refresh();
    }

    fn resolve(&mut self, id: &NodeId) -> NodeIndex {
        match id {
            NodeId::Router(rid) => self.graph.add_router(*rid),
            NodeId::Prefix(prefix) => self.graph.add_prefix(*prefix),
            NodeId::Controller(name) => self.graph.add_controller(name.clone()),
        }
    }

    fn apply_edge(&mut self, snap: &EdgeSnapshot) {
        let u = self.resolve(&snap.u);
        let v = self.resolve(&snap.v);
        match &snap.v {
            NodeId::Prefix(_) => {
                let kind = if snap.fake { RouteKind::Fake } else { RouteKind::Real };
                self.graph.add_route(u, v, kind, snap.metric, snap.targets.clone());
            }
            _ => self.graph.add_router_link(u, v, snap.metric, None, None),
        }
    }

    fn apply_node_properties(&mut self, updates: &[(NodeId, NodeProperties)]) {
        for (id, props) in updates {
            let idx = self.resolve(id);
            self.graph.set_private_addrs(idx, props.private_addrs.clone());
        }
    }

    /// Re-solves every requirement against the current graph and pushes the
    /// add/remove delta to the southbound agent. A solver exception leaves
    /// `advertized` untouched, per the "keep previously-advertised LSAs"
    /// recovery rule.
    fn refresh(&mut self) {
        if !self.bootstrapped {
            warn!("refresh requested before the graph was bootstrapped, skipping solve");
            return;
        }
        match self.merger.solve(&self.graph, &self.requirements) {
            Ok(lsas) => {
                let new_set: HashSet<FakeLsa> = lsas.into_iter().collect();
                let to_remove: Vec<FakeLsa> =
                    self.advertized.difference(&new_set).copied().collect();
                let to_add: Vec<FakeLsa> = new_set.difference(&self.advertized).copied().collect();
                self.advertized = new_set;
                if !to_remove.is_empty() {
                    let _ = self.southbound.send(SouthboundCommand::Remove(to_remove));
                }
                if !to_add.is_empty() {
                    let _ = self.southbound.send(SouthboundCommand::Add(to_add));
                }
            }
            Err(error) => {
                warn!(%error, "solver exception, keeping previously advertised LSAs");
            }
        }
    }

    pub fn shutdown(&self) {
        let _ = self.southbound.send(SouthboundCommand::Exit);
    }
}

impl Listener for Controller {
    fn bootstrap_graph(&mut self, edges: &[EdgeSnapshot], node_properties: &[(NodeId, NodeProperties)]) {
        self.graph = IgpGraph::new();
        for snap in edges {
            self.apply_edge(snap);
        }
        self.apply_node_properties(node_properties);
        self.bootstrapped = true;
    }

    fn add_edge(&mut self, edge: &EdgeSnapshot) {
        self.apply_edge(edge);
    }

    fn remove_edge(&mut self, u: &NodeId, v: &NodeId) {
        if let (Some(u_idx), Some(v_idx)) = (self.graph.find(u), self.graph.find(v)) {
            self.graph.remove_edge(u_idx, v_idx);
        }
    }

    fn update_node_properties(&mut self, updates: &[(NodeId, NodeProperties)]) {
        self.apply_node_properties(updates);
    }

    fn commit(&mut self) {
        self.refresh();
    }
}

impl Target for Controller {
    fn exec(&mut self, method: &str, arg: &ExecArg) -> Result<Option<Value>, String> {
        match method {
            "add_edge" => {
                let source = router_arg(arg.arg_list.first())?;
                let destination = router_arg(arg.arg_list.get(1))?;
                let metric = metric_arg(arg.arg_list.get(2), arg.arg_dict.get("properties"))?;
                let u = self.graph.add_router(source);
                let v = self.graph.add_router(destination);
                self.graph.add_router_link(u, v, metric, None, None);
                Ok(None)
            }
            "remove_edge" => {
                let source = router_arg(arg.arg_list.first())?;
                let destination = router_arg(arg.arg_list.get(1))?;
                if let (Some(u), Some(v)) = (
                    self.graph.find(&NodeId::Router(source)),
                    self.graph.find(&NodeId::Router(destination)),
                ) {
                    self.graph.remove_edge(u, v);
                }
                Ok(None)
            }
            "update_node_properties" => {
                for (key, value) in &arg.arg_dict {
                    let Ok(addr) = key.parse::<RouterId>() else {
                        continue;
                    };
                    let addrs = value
                        .as_array()
                        .map(|a| a.iter().filter_map(|v| v.as_str()?.parse::<Ipv4Addr>().ok()).collect())
                        .unwrap_or_default();
                    let idx = self.graph.add_router(addr);
                    self.graph.set_private_addrs(idx, addrs);
                }
                Ok(None)
            }
            "commit" => {
                self.commit();
                Ok(None)
            }
            "bootstrap_graph" => {
                let edges = arg.arg_list.first().and_then(Value::as_array).cloned().unwrap_or_default();
                self.graph = IgpGraph::new();
                for triple in &edges {
                    let Some(t) = triple.as_array() else { continue };
                    let (Some(u), Some(v)) = (t.first().and_then(Value::as_str), t.get(1).and_then(Value::as_str))
                    else {
                        continue;
                    };
                    let (Ok(u), Ok(v)) = (u.parse::<Ipv4Addr>(), v.parse::<Ipv4Addr>()) else {
                        continue;
                    };
                    let metric = t.get(2).map(|m| metric_arg(Some(m), None)).transpose()?.unwrap_or(1);
                    let u_idx = self.graph.add_router(RouterId(u));
                    let v_idx = self.graph.add_router(RouterId(v));
                    self.graph.add_router_link(u_idx, v_idx, metric, None, None);
                }
                self.bootstrapped = true;
                self.commit();
                Ok(None)
            }
            other => Err(format!("unknown method: {other}")),
        }
    }

    fn catalog(&self) -> HashMap<String, MethodInfo> {
        [
            ("add_edge", vec!["source", "destination", "properties"]),
            ("remove_edge", vec!["source", "destination"]),
            ("update_node_properties", vec!["node_properties"]),
            ("commit", vec![]),
            ("bootstrap_graph", vec!["edges", "node_properties"]),
        ]
        .into_iter()
        .map(|(name, args)| {
            (
                name.to_string(),
                MethodInfo {
                    doc: None,
                    args: args.into_iter().map(str::to_string).collect(),
                },
            )
        })
        .collect()
    }
}

fn router_arg(value: Option<&Value>) -> Result<RouterId, String> {
    value
        .and_then(Value::as_str)
        .ok_or_else(|| "missing router-id argument".to_string())?
        .parse::<Ipv4Addr>()
        .map(RouterId)
        .map_err(|error| error.to_string())
}

fn metric_arg(positional: Option<&Value>, properties: Option<&Value>) -> Result<u32, String> {
    if let Some(v) = positional {
        if let Some(n) = v.as_u64() {
            return Ok(n as u32);
        }
        if let Some(obj) = v.as_object() {
            if let Some(n) = obj.get("metric").and_then(Value::as_u64) {
                return Ok(n as u32);
            }
        }
    }
    if let Some(n) = properties.and_then(|p| p.get("metric")).and_then(Value::as_u64) {
        return Ok(n as u32);
    }
    Err("missing metric argument".to_string())
}

impl sjmp::ExecArg {
    #[cfg(test)]
    fn with_list(method: &str, arg_list: Vec<Value>) -> ExecArg {
        ExecArg {
            method: method.to_string(),
            arg_list,
            arg_dict: HashMap::new(),
        }
    }
}

/// Thread-safe handle to a [`Controller`], shared between the LSDB's
/// single-writer worker (which drives it as a [`Listener`]) and the RPC
/// server's per-connection tasks (which drive it as a [`Target`]). Both
/// sides only ever take the lock for the duration of one call, so there is
/// no risk of a held lock spanning a suspension point.
#[derive(Clone)]
pub struct SharedController(Arc<Mutex<Controller>>);

impl SharedController {
    pub fn new(controller: Controller) -> SharedController {
        SharedController(Arc::new(Mutex::new(controller)))
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut Controller) -> R) -> R {
        let mut guard = self.0.lock().unwrap();
        f(&mut guard)
    }
}

impl Listener for SharedController {
    fn bootstrap_graph(&mut self, edges: &[EdgeSnapshot], node_properties: &[(NodeId, NodeProperties)]) {
        self.with(|c| c.bootstrap_graph(edges, node_properties));
    }

    fn add_edge(&mut self, edge: &EdgeSnapshot) {
        self.with(|c| c.add_edge(edge));
    }

    fn remove_edge(&mut self, u: &NodeId, v: &NodeId) {
        self.with(|c| c.remove_edge(u, v));
    }

    fn update_node_properties(&mut self, updates: &[(NodeId, NodeProperties)]) {
        self.with(|c| c.update_node_properties(updates));
    }

    fn commit(&mut self) {
        self.with(Controller::commit);
    }
}

impl Target for SharedController {
    fn exec(&mut self, method: &str, arg: &ExecArg) -> Result<Option<Value>, String> {
        self.with(|c| c.exec(method, arg))
    }

    fn catalog(&self) -> HashMap<String, MethodInfo> {
        self.with(|c| c.catalog())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use fibbing_solver::Policy;
    use std::net::Ipv4Addr as Addr;

    fn rid(n: u8) -> RouterId {
        RouterId(Addr::new(10, 0, 0, n))
    }

    #[test]
    fn add_edge_then_remove_edge_round_trips() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let mut controller = Controller::new(Merger::new(Policy::Partial), Vec::new(), tx);

        let add = ExecArg::with_list(
            "add_edge",
            vec![
                Value::String(rid(1).0.to_string()),
                Value::String(rid(2).0.to_string()),
                Value::from(10),
            ],
        );
        controller.exec("add_edge", &add).unwrap();
        let u = controller.graph().find(&NodeId::Router(rid(1))).unwrap();
        let v = controller.graph().find(&NodeId::Router(rid(2))).unwrap();
        assert!(controller.graph().edge(u, v).is_some());

        let remove = ExecArg::with_list(
            "remove_edge",
            vec![Value::String(rid(1).0.to_string()), Value::String(rid(2).0.to_string())],
        );
        controller.exec("remove_edge", &remove).unwrap();
        assert!(controller.graph().edge(u, v).is_none());
    }

    #[test]
    fn unknown_method_reports_exception_message() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let mut controller = Controller::new(Merger::new(Policy::Partial), Vec::new(), tx);
        let arg = ExecArg::with_list("bogus", vec![]);
        assert!(controller.exec("bogus", &arg).is_err());
    }
}
