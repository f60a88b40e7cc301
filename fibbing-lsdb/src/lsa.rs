//
// Copyright (c) The Fibbing Controller Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use fibbing_graph::{IgpGraph, RouteKind};
use fibbing_utils::RouterId;
use ipnetwork::Ipv4Network;

/// Everything the LSA model needs from the LSDB in order to apply itself to
/// a graph: resolving a Network LSA's attached routers, and classifying an
/// AS-external LSA's forwarding address.
pub trait LsaResolver {
    fn network_lsa(&self, dr_ip: Ipv4Addr) -> Option<&NetworkLsa>;
    /// Whether `router_id` falls inside the controller's reserved
    /// base-network, meaning this AS-external LSA reflects a lie a Fibbing
    /// controller previously injected rather than a genuine external route.
    fn is_controller_owned(&self, router_id: RouterId) -> bool;
    /// `Some(targets)` when `addr` is a private broadcast-domain address
    /// bound to a set of target router-ids in the private-address store.
    fn private_targets_for(&self, addr: Ipv4Addr) -> Option<Vec<RouterId>>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LsaType {
    Router,
    Network,
    AsExternal,
    Unused,
}

impl LsaType {
    pub fn from_code(code: &str) -> LsaType {
        match code {
            "1" => LsaType::Router,
            "2" => LsaType::Network,
            "5" => LsaType::AsExternal,
            _ => LsaType::Unused,
        }
    }
}

#[derive(Clone, Debug)]
pub struct LsaHeader {
    pub router_id: RouterId,
    pub link_id: Ipv4Addr,
    pub lsa_type: LsaType,
    pub mask: Option<Ipv4Addr>,
    pub age: u32,
    pub seq_num: i32,
}

/// Unique identity of an LSA among all other LSAs of the same type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum LsaKey {
    Router(RouterId),
    Network(Ipv4Addr),
    AsExternal(RouterId, Ipv4Network),
}

#[derive(Clone, Debug)]
pub enum Link {
    P2P {
        other_router_id: RouterId,
        if_addr: Option<Ipv4Addr>,
        metric: u32,
    },
    Transit {
        dr_ip: Ipv4Addr,
        if_addr: Option<Ipv4Addr>,
        metric: u32,
    },
    Stub {
        prefix: Ipv4Network,
        metric: u32,
    },
    Virtual,
}

impl Link {
    /// The interface address carried by this link, used later to contract
    /// interface IPs into the owning router-id. Stub and virtual links
    /// carry none.
    pub fn if_addr(&self) -> Option<Ipv4Addr> {
        match self {
            Link::P2P { if_addr, .. } | Link::Transit { if_addr, .. } => *if_addr,
            Link::Stub { .. } | Link::Virtual => None,
        }
    }

    fn endpoints(&self, resolver: &dyn LsaResolver) -> Vec<RouterId> {
        match self {
            Link::P2P {
                other_router_id, ..
            } => vec![*other_router_id],
            Link::Transit { dr_ip, .. } => resolver
                .network_lsa(*dr_ip)
                .map(|lsa| lsa.attached_routers.clone())
                .unwrap_or_default(),
            // Stub links describe leaf subnets, not router adjacencies;
            // they never appear as graph edges.
            Link::Stub { .. } => Vec::new(),
            Link::Virtual => Vec::new(),
        }
    }

    fn metric(&self) -> u32 {
        match self {
            Link::P2P { metric, .. }
            | Link::Transit { metric, .. }
            | Link::Stub { metric, .. } => *metric,
            Link::Virtual => 1,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RouterLsa {
    pub header: LsaHeader,
    pub links: Vec<Link>,
}

impl RouterLsa {
    pub fn key(&self) -> LsaKey {
        LsaKey::Router(self.header.router_id)
    }

    pub fn apply(&self, graph: &mut IgpGraph, resolver: &dyn LsaResolver) {
        let router = graph.add_router(self.header.router_id);
        for link in &self.links {
            for endpoint in link.endpoints(resolver) {
                let endpoint_idx = graph.add_router(endpoint);
                graph.add_router_link(router, endpoint_idx, link.metric(), link.if_addr(), None);
            }
        }
    }

    /// Interface IPs carried by this LSA's links, to be contracted into
    /// `router_id` together with whatever the private-address store adds.
    pub fn interface_ips(&self) -> Vec<Ipv4Addr> {
        self.links
            .iter()
            .filter_map(|link| link.if_addr())
            .filter(|addr| *addr != self.header.router_id.0)
            .collect()
    }
}

#[derive(Clone, Debug)]
pub struct NetworkLsa {
    pub header: LsaHeader,
    pub dr_ip: Ipv4Addr,
    pub attached_routers: Vec<RouterId>,
}

impl NetworkLsa {
    pub fn key(&self) -> LsaKey {
        LsaKey::Network(self.dr_ip)
    }

    /// A Network LSA contributes nothing directly; Router LSAs resolve
    /// Transit links through it via [`LsaResolver::network_lsa`].
    pub fn apply(&self, _graph: &mut IgpGraph, _resolver: &dyn LsaResolver) {}
}

#[derive(Clone, Debug)]
pub struct AsExternalRoute {
    pub metric: u32,
    pub fwd_addr: Ipv4Addr,
}

#[derive(Clone, Debug)]
pub struct AsExternalLsa {
    pub header: LsaHeader,
    pub prefix: Ipv4Network,
    pub routes: Vec<AsExternalRoute>,
}

impl AsExternalLsa {
    pub fn key(&self) -> LsaKey {
        LsaKey::AsExternal(self.header.router_id, self.prefix)
    }

    fn resolve_fwd_addr(&self, fwd_addr: Ipv4Addr) -> Ipv4Addr {
        if fwd_addr == Ipv4Addr::UNSPECIFIED {
            self.header.router_id.0
        } else {
            fwd_addr
        }
    }

    pub fn apply(&self, graph: &mut IgpGraph, resolver: &dyn LsaResolver) {
        let prefix_idx = graph.add_prefix(self.prefix);
        for route in &self.routes {
            let fwd_addr = self.resolve_fwd_addr(route.fwd_addr);
            let router_idx = graph.add_router(RouterId(fwd_addr));
            if resolver.is_controller_owned(self.header.router_id) {
                match resolver.private_targets_for(fwd_addr) {
                    Some(targets) => {
                        graph.add_route(
                            router_idx,
                            prefix_idx,
                            RouteKind::Fake,
                            route.metric,
                            Some(targets),
                        );
                    }
                    None => {
                        graph.add_route(
                            router_idx,
                            prefix_idx,
                            RouteKind::Fake,
                            route.metric,
                            None,
                        );
                    }
                }
            } else {
                graph.add_route(router_idx, prefix_idx, RouteKind::Real, route.metric, None);
            }
        }
    }
}

#[derive(Clone, Debug)]
pub enum Lsa {
    Router(RouterLsa),
    Network(NetworkLsa),
    AsExternal(AsExternalLsa),
    Unused(LsaHeader),
}

impl Lsa {
    pub fn header(&self) -> &LsaHeader {
        match self {
            Lsa::Router(lsa) => &lsa.header,
            Lsa::Network(lsa) => &lsa.header,
            Lsa::AsExternal(lsa) => &lsa.header,
            Lsa::Unused(header) => header,
        }
    }

    pub fn key(&self) -> Option<LsaKey> {
        match self {
            Lsa::Router(lsa) => Some(lsa.key()),
            Lsa::Network(lsa) => Some(lsa.key()),
            Lsa::AsExternal(lsa) => Some(lsa.key()),
            Lsa::Unused(_) => None,
        }
    }

    pub fn apply(&self, graph: &mut IgpGraph, resolver: &dyn LsaResolver) {
        match self {
            Lsa::Router(lsa) => lsa.apply(graph, resolver),
            Lsa::Network(lsa) => lsa.apply(graph, resolver),
            Lsa::AsExternal(lsa) => lsa.apply(graph, resolver),
            Lsa::Unused(_) => {}
        }
    }

    pub fn as_router(&self) -> Option<&RouterLsa> {
        match self {
            Lsa::Router(lsa) => Some(lsa),
            _ => None,
        }
    }

    pub fn as_network(&self) -> Option<&NetworkLsa> {
        match self {
            Lsa::Network(lsa) => Some(lsa),
            _ => None,
        }
    }
}

impl std::fmt::Display for Lsa {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Lsa::Router(lsa) => {
                write!(f, "[R]<{}: ", lsa.header.router_id)?;
                let parts: Vec<String> = lsa
                    .links
                    .iter()
                    .map(|l| format!("{:?}", l.if_addr()))
                    .collect();
                write!(f, "{}>", parts.join(", "))
            }
            Lsa::Network(lsa) => {
                write!(
                    f,
                    "[N]<{}: {}>",
                    lsa.dr_ip,
                    lsa.attached_routers
                        .iter()
                        .map(|r| r.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            }
            Lsa::AsExternal(lsa) => {
                write!(
                    f,
                    "[E]<{}: {}>",
                    lsa.prefix,
                    lsa.routes
                        .iter()
                        .map(|r| format!("({}, {})", lsa.resolve_fwd_addr(r.fwd_addr), r.metric))
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            }
            Lsa::Unused(header) => write!(f, "[?]<{}>", header.router_id),
        }
    }
}

/// As of OSPFv2, sequence numbers are signed integers ranging from
/// `0x80000001` to `0x7fffffff`; "newer" is simply signed `>`.
pub fn is_newer_seqnum(a: i32, b: i32) -> bool {
    a > b
}

pub const MAX_LS_AGE: u32 = 3600;

pub fn is_expired(age: u32) -> bool {
    age >= MAX_LS_AGE
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn seqnum_ordering_is_signed() {
        assert!(is_newer_seqnum(1, i32::MIN));
        assert!(!is_newer_seqnum(i32::MIN, 1));
        assert!(!is_newer_seqnum(5, 5));
    }

    #[test]
    fn age_expiry_threshold() {
        assert!(!is_expired(3599));
        assert!(is_expired(3600));
    }
}
