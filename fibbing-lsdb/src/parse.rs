//
// Copyright (c) The Fibbing Controller Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::HashMap;
use std::net::Ipv4Addr;

use fibbing_utils::RouterId;
use ipnetwork::Ipv4Network;

use crate::error::Error;
use crate::lsa::{
    AsExternalLsa, AsExternalRoute, Link, Lsa, LsaHeader, LsaType, NetworkLsa, RouterLsa,
};

const SEP_GROUP: char = ' ';
const SEP_INTRA_FIELD: char = ':';
const SEP_INTER_FIELD: char = ';';

/// One line from the inbound LSA stream.
#[derive(Debug)]
pub enum IngestLine {
    Begin,
    Commit,
    Add(Lsa),
    Rem(Lsa),
}

pub fn parse_ingest_line(line: &str) -> Result<IngestLine, Error> {
    let line = line.trim();
    if let Some(rest) = line.strip_prefix("BEGIN|") {
        let _ = rest;
        return Ok(IngestLine::Begin);
    }
    if let Some(rest) = line.strip_prefix("COMMIT|") {
        let _ = rest;
        return Ok(IngestLine::Commit);
    }
    if let Some(payload) = line.strip_prefix("ADD|") {
        return parse_lsa(payload).map(IngestLine::Add);
    }
    if let Some(payload) = line.strip_prefix("REM|") {
        return parse_lsa(payload).map(IngestLine::Rem);
    }
    Err(Error::MalformedLine(line.to_string()))
}

fn extract_fields(group: &str) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    for prop in group.split(SEP_INTER_FIELD) {
        if prop.is_empty() {
            continue;
        }
        if let Some((key, val)) = prop.split_once(SEP_INTRA_FIELD) {
            fields.insert(key.to_string(), val.to_string());
        }
    }
    fields
}

fn field<'a>(fields: &'a HashMap<String, String>, key: &str, payload: &str) -> Result<&'a str, Error> {
    fields
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| Error::MalformedLsa(payload.to_string()))
}

fn parse_ip(s: &str, payload: &str) -> Result<Ipv4Addr, Error> {
    s.parse().map_err(|_| Error::MalformedLsa(payload.to_string()))
}

fn parse_u32(s: &str, payload: &str) -> Result<u32, Error> {
    s.parse().map_err(|_| Error::MalformedLsa(payload.to_string()))
}

fn parse_i32(s: &str, payload: &str) -> Result<i32, Error> {
    s.parse().map_err(|_| Error::MalformedLsa(payload.to_string()))
}

/// Builds an LSA from its textual payload: `<header-fields> <group-1> <group-2> ...`.
pub fn parse_lsa(payload: &str) -> Result<Lsa, Error> {
    let mut groups = payload.split(SEP_GROUP).filter(|g| !g.is_empty());
    let header_group = groups.next().ok_or_else(|| Error::MalformedLsa(payload.to_string()))?;
    let header_fields = extract_fields(header_group);

    let router_id = RouterId(parse_ip(field(&header_fields, "rid", payload)?, payload)?);
    let link_id = parse_ip(field(&header_fields, "link_id", payload)?, payload)?;
    let lsa_type = LsaType::from_code(field(&header_fields, "lsa_type", payload)?);
    let mask = header_fields
        .get("link_mask")
        .map(|s| parse_ip(s, payload))
        .transpose()?;
    let age = parse_u32(field(&header_fields, "age", payload)?, payload)?;
    let seq_num = parse_i32(field(&header_fields, "seq_num", payload)?, payload)?;

    let header = LsaHeader {
        router_id,
        link_id,
        lsa_type,
        mask,
        age,
        seq_num,
    };

    let rest: Vec<HashMap<String, String>> = groups.map(extract_fields).collect();

    match lsa_type {
        LsaType::Router => {
            let mut links = Vec::with_capacity(rest.len());
            for group in &rest {
                links.push(parse_link(group, payload)?);
            }
            Ok(Lsa::Router(RouterLsa { header, links }))
        }
        LsaType::Network => {
            let mut attached_routers = Vec::with_capacity(rest.len());
            for group in &rest {
                let rid = parse_ip(field(group, "rid", payload)?, payload)?;
                attached_routers.push(RouterId(rid));
            }
            Ok(Lsa::Network(NetworkLsa {
                dr_ip: header.link_id,
                header,
                attached_routers,
            }))
        }
        LsaType::AsExternal => {
            let mask = mask.ok_or_else(|| Error::MalformedLsa(payload.to_string()))?;
            let prefix = Ipv4Network::with_netmask(link_id, mask)
                .map_err(|_| Error::MalformedLsa(payload.to_string()))?;
            let mut routes = Vec::with_capacity(rest.len());
            for group in &rest {
                let metric = parse_u32(field(group, "link_metric", payload)?, payload)?;
                let fwd_addr = parse_ip(field(group, "fwd_addr", payload)?, payload)?;
                routes.push(AsExternalRoute { metric, fwd_addr });
            }
            Ok(Lsa::AsExternal(AsExternalLsa {
                header,
                prefix,
                routes,
            }))
        }
        LsaType::Unused => Ok(Lsa::Unused(header)),
    }
}

fn parse_link(group: &HashMap<String, String>, payload: &str) -> Result<Link, Error> {
    let link_type = field(group, "link_type", payload)?;
    let link_id = parse_ip(field(group, "link_id", payload)?, payload)?;
    let link_data = field(group, "link_data", payload)?;
    let metric = parse_u32(field(group, "link_metric", payload)?, payload)?;

    match link_type {
        "1" => Ok(Link::P2P {
            other_router_id: RouterId(link_id),
            if_addr: Some(parse_ip(link_data, payload)?),
            metric,
        }),
        "2" => Ok(Link::Transit {
            dr_ip: link_id,
            if_addr: Some(parse_ip(link_data, payload)?),
            metric,
        }),
        "3" => {
            let mask = parse_ip(link_data, payload)?;
            let prefix = Ipv4Network::with_netmask(link_id, mask)
                .map_err(|_| Error::MalformedLsa(payload.to_string()))?;
            Ok(Link::Stub { prefix, metric })
        }
        "4" => Ok(Link::Virtual),
        _ => Err(Error::MalformedLsa(payload.to_string())),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_router_lsa_with_p2p_link() {
        let line =
            "ADD|rid:10.0.0.1;link_id:10.0.0.1;lsa_type:1;age:1;seq_num:-2147483647; link_id:10.0.0.2;link_type:1;link_data:10.0.1.1;link_metric:10;";
        match parse_ingest_line(line).unwrap() {
            IngestLine::Add(Lsa::Router(lsa)) => {
                assert_eq!(lsa.header.router_id, RouterId(Ipv4Addr::new(10, 0, 0, 1)));
                assert_eq!(lsa.links.len(), 1);
            }
            other => panic!("unexpected parse result: {other:?}"),
        }
    }

    #[test]
    fn parses_begin_and_commit() {
        assert!(matches!(parse_ingest_line("BEGIN|").unwrap(), IngestLine::Begin));
        assert!(matches!(parse_ingest_line("COMMIT|").unwrap(), IngestLine::Commit));
    }

    #[test]
    fn malformed_line_is_an_error() {
        assert!(parse_ingest_line("GARBAGE").is_err());
    }
}
