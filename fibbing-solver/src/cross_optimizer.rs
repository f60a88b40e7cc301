//
// Copyright (c) The Fibbing Controller Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::HashMap;

use fibbing_utils::RouterId;
use ipnetwork::Ipv4Network;

use crate::merger::FakeLsa;

/// One route advertised as part of an [`ExtendedLsa`]: a destination and the
/// cost the owning router should claim for it via `next_hop`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExtLsaRoute {
    pub dest: Ipv4Network,
    pub cost: i64,
}

/// A single router-LSA fragment covering every fake route the solver wants
/// `node` to advertise via `next_hop`. Grouping by `(node, next_hop)` lets
/// the northbound layer inject one fake router-LSA per real link instead of
/// one per destination.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtendedLsa {
    pub node: RouterId,
    pub next_hop: RouterId,
    pub routes: Vec<ExtLsaRoute>,
}

/// Groups a solver's flat `FakeLsa` output by `(node, next_hop)`.
pub fn group(lsas: &[FakeLsa]) -> Vec<ExtendedLsa> {
    let mut grouped: HashMap<(RouterId, RouterId), Vec<ExtLsaRoute>> = HashMap::new();
    let mut order: Vec<(RouterId, RouterId)> = Vec::new();
    for lsa in lsas {
        let key = (lsa.node, lsa.next_hop);
        if !grouped.contains_key(&key) {
            order.push(key);
        }
        grouped.entry(key).or_default().push(ExtLsaRoute {
            dest: lsa.dest,
            cost: lsa.cost,
        });
    }
    order
        .into_iter()
        .map(|(node, next_hop)| ExtendedLsa {
            node,
            next_hop,
            routes: grouped.remove(&(node, next_hop)).unwrap_or_default(),
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use std::net::Ipv4Addr;

    fn rid(n: u8) -> RouterId {
        RouterId(Ipv4Addr::new(10, 0, 0, n))
    }

    #[test]
    fn groups_by_node_and_next_hop() {
        let p1: Ipv4Network = "192.0.2.0/24".parse().unwrap();
        let p2: Ipv4Network = "198.51.100.0/24".parse().unwrap();
        let lsas = vec![
            FakeLsa { node: rid(1), next_hop: rid(2), cost: 5, dest: p1 },
            FakeLsa { node: rid(1), next_hop: rid(2), cost: 7, dest: p2 },
            FakeLsa { node: rid(1), next_hop: rid(3), cost: 5, dest: p1 },
        ];
        let grouped = group(&lsas);
        assert_eq!(grouped.len(), 2);
        let first = grouped.iter().find(|g| g.next_hop == rid(2)).unwrap();
        assert_eq!(first.routes.len(), 2);
    }
}
