//
// Copyright (c) The Fibbing Controller Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::path::Path;

use fibbing_utils::RouterId;
use serde_json::Value;
use tracing::warn;

use crate::error::Error;

/// Maps router-id -> private link-local address and private-address ->
/// broadcast-domain peers, loaded once at startup from the private-address
/// binding file.
///
/// A missing or malformed file yields an empty store with a logged warning
/// rather than an error, since private addressing is an optional layer on
/// top of an otherwise functional controller.
#[derive(Clone, Debug, Default)]
pub struct PrivateAddressStore {
    /// `bindings[router][peer]` = the private addresses `router` uses when
    /// forwarding is seen from `peer`.
    bindings: HashMap<RouterId, HashMap<RouterId, Vec<Ipv4Addr>>>,
    /// `domains[addr]` = the other routers sharing a broadcast domain with
    /// the address's owner, i.e. who the address is visible to.
    domains: HashMap<Ipv4Addr, Vec<RouterId>>,
}

impl PrivateAddressStore {
    pub fn empty() -> PrivateAddressStore {
        PrivateAddressStore::default()
    }

    pub fn load(path: impl AsRef<Path>) -> PrivateAddressStore {
        let path = path.as_ref();
        match Self::try_load(path) {
            Ok(store) => store,
            Err(error) => {
                error.log();
                PrivateAddressStore::empty()
            }
        }
    }

    fn try_load(path: &Path) -> Result<PrivateAddressStore, Error> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::PrivateAddressFile(path.display().to_string(), e))?;
        let root: HashMap<String, HashMap<String, Value>> = serde_json::from_str(&text)
            .map_err(|_| Error::PrivateAddressFormat(path.display().to_string()))?;

        let mut bindings: HashMap<RouterId, HashMap<RouterId, Vec<Ipv4Addr>>> = HashMap::new();
        let mut domains: HashMap<Ipv4Addr, Vec<RouterId>> = HashMap::new();

        for subnet in root.values() {
            let mut parsed: HashMap<RouterId, Vec<Ipv4Addr>> = HashMap::new();
            for (rid_str, value) in subnet {
                let rid: RouterId = rid_str
                    .parse()
                    .map_err(|_| Error::PrivateAddressFormat(path.display().to_string()))?;
                let addrs = parse_addr_list(value)
                    .ok_or_else(|| Error::PrivateAddressFormat(path.display().to_string()))?;
                parsed.insert(rid, addrs);
            }

            let rids: Vec<RouterId> = parsed.keys().copied().collect();
            for (&rid, addrs) in &parsed {
                let others: Vec<RouterId> = rids.iter().copied().filter(|&r| r != rid).collect();
                let entry = bindings.entry(rid).or_default();
                for &peer in &others {
                    entry.insert(peer, addrs.clone());
                }
                for &addr in addrs {
                    domains.insert(addr, others.clone());
                }
            }
        }

        Ok(PrivateAddressStore { bindings, domains })
    }

    /// Private addresses of `rid`, optionally restricted to those used when
    /// forwarding from `peer`.
    pub fn addresses_of(&self, rid: RouterId, peer: Option<RouterId>) -> Option<Vec<Ipv4Addr>> {
        let peers = self.bindings.get(&rid)?;
        match peer {
            Some(peer) => peers.get(&peer).cloned(),
            None => {
                let mut all: Vec<Ipv4Addr> = peers.values().flatten().copied().collect();
                all.sort();
                all.dedup();
                Some(all)
            }
        }
    }

    /// Router-ids able to reach `addr`, i.e. for whom a local lie at that
    /// address would be visible. `None` means `addr` is not a known
    /// private address.
    pub fn targets_for(&self, addr: Ipv4Addr) -> Option<Vec<RouterId>> {
        self.domains.get(&addr).cloned()
    }
}

fn parse_addr_list(value: &Value) -> Option<Vec<Ipv4Addr>> {
    match value {
        Value::String(s) => parse_one(s).map(|a| vec![a]),
        Value::Array(items) => items.iter().map(|v| v.as_str().and_then(parse_one)).collect(),
        _ => None,
    }
}

fn parse_one(s: &str) -> Option<Ipv4Addr> {
    let host = s.split('/').next().unwrap_or(s);
    host.parse().ok()
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    fn rid(n: u8) -> RouterId {
        RouterId(Ipv4Addr::new(10, 0, 0, n))
    }

    #[test]
    fn loads_single_string_binding() {
        let mut file = tempfile_with_contents(
            r#"{"10.0.0.0/24": {"10.0.0.1": "192.168.1.1", "10.0.0.2": "192.168.1.2"}}"#,
        );
        let store = PrivateAddressStore::load(file.path());
        assert_eq!(
            store.addresses_of(rid(1), Some(rid(2))),
            Some(vec![Ipv4Addr::new(192, 168, 1, 1)])
        );
        assert_eq!(
            store.targets_for(Ipv4Addr::new(192, 168, 1, 1)),
            Some(vec![rid(2)])
        );
        let _ = file.flush();
    }

    #[test]
    fn missing_file_yields_empty_store() {
        let store = PrivateAddressStore::load("/nonexistent/path/for/testing.json");
        assert_eq!(store.addresses_of(rid(1), None), None);
    }

    fn tempfile_with_contents(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }
}
