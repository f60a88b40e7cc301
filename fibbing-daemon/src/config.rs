//
// Copyright (c) The Fibbing Controller Contributors
//
// SPDX-License-Identifier: MIT
//

use clap::{App, Arg};
use fibbing_solver::Policy;
use ipnetwork::Ipv4Network;

/// Daemon configuration. Unlike a routing protocol daemon's config, there is
/// no persisted or reloadable state here worth a file format: everything the
/// controller needs is either fixed at process start (these fields) or
/// arrives over the network (LSAs, SJMP commands). Built from the
/// command-line, falling back to [`Config::default`] for anything unset.
#[derive(Debug, Clone)]
pub struct Config {
    /// Human-readable name for this controller instance, used only in logs.
    pub instance_name: String,
    /// The network from which controller and router instance ids are drawn,
    /// used by the LSDB to tell apart controller-owned addresses.
    pub base_net: Ipv4Network,
    /// Prefix length, within `base_net`, of one controller instance's block.
    pub controller_prefix: u8,
    /// Path to the named pipe the LSA ingest reader polls.
    pub ingest_path: String,
    /// Optional JSON file binding routers to their private addresses.
    pub private_address_file: Option<String>,
    /// Optional JSON file describing the forwarding requirement DAGs.
    pub requirements_file: Option<String>,
    /// Northbound SJMP listen address (host, or `unix://<path>`).
    pub northbound_host: String,
    pub northbound_port: u16,
    /// Southbound SJMP remote address (host, or `unix://<path>`).
    pub southbound_host: String,
    pub southbound_port: u16,
    /// Which of the Merger's node-placement policies to run.
    pub policy: Policy,
    /// Cost assigned to the synthetic edges the solver inserts for fake
    /// nodes; must dominate any real metric in the network.
    pub new_edge_metric: u32,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            instance_name: "fibbing0".to_owned(),
            base_net: "172.16.0.0/16".parse().unwrap(),
            controller_prefix: 8,
            ingest_path: "/var/run/fibbing/lsas.fifo".to_owned(),
            private_address_file: None,
            requirements_file: None,
            northbound_host: "0.0.0.0".to_owned(),
            northbound_port: 2189,
            southbound_host: "unix:///var/run/fibbing/quagga.sock".to_owned(),
            southbound_port: 0,
            policy: Policy::Partial,
            new_edge_metric: 100_000,
        }
    }
}

impl Config {
    /// Parses command-line arguments into a `Config`, starting from
    /// [`Config::default`] and overriding only the flags that were given.
    pub fn from_args() -> Config {
        let defaults = Config::default();
        let matches = App::new("Fibbing controller")
            .version(clap::crate_version!())
            .arg(Arg::with_name("instance-name").long("instance-name").value_name("name").help("Name of this controller instance"))
            .arg(Arg::with_name("base-net").long("base-net").value_name("cidr").help("Network controller/router instance ids are drawn from"))
            .arg(Arg::with_name("controller-prefix").long("controller-prefix").value_name("bits").help("Prefix length of one controller instance's block"))
            .arg(Arg::with_name("ingest-path").long("ingest-path").value_name("path").help("Named pipe the LSA ingest reader polls"))
            .arg(Arg::with_name("private-address-file").long("private-address-file").value_name("file").help("JSON file binding routers to private addresses"))
            .arg(Arg::with_name("requirements-file").long("requirements-file").value_name("file").help("JSON file describing forwarding requirement DAGs"))
            .arg(Arg::with_name("northbound-host").long("northbound-host").value_name("host").help("SJMP northbound listen host, or unix://<path>"))
            .arg(Arg::with_name("northbound-port").long("northbound-port").value_name("port").help("SJMP northbound listen port"))
            .arg(Arg::with_name("southbound-host").long("southbound-host").value_name("host").help("SJMP southbound remote host, or unix://<path>"))
            .arg(Arg::with_name("southbound-port").long("southbound-port").value_name("port").help("SJMP southbound remote port"))
            .arg(Arg::with_name("policy").long("policy").value_name("full|partial|partial-ecmp").help("Fake-node placement policy"))
            .arg(Arg::with_name("new-edge-metric").long("new-edge-metric").value_name("metric").help("Cost assigned to synthetic fake-node edges"))
            .get_matches();

        Config {
            instance_name: matches.value_of("instance-name").map(str::to_owned).unwrap_or(defaults.instance_name),
            base_net: matches
                .value_of("base-net")
                .map(|s| s.parse().expect("invalid --base-net"))
                .unwrap_or(defaults.base_net),
            controller_prefix: matches
                .value_of("controller-prefix")
                .map(|s| s.parse().expect("invalid --controller-prefix"))
                .unwrap_or(defaults.controller_prefix),
            ingest_path: matches.value_of("ingest-path").map(str::to_owned).unwrap_or(defaults.ingest_path),
            private_address_file: matches.value_of("private-address-file").map(str::to_owned).or(defaults.private_address_file),
            requirements_file: matches.value_of("requirements-file").map(str::to_owned).or(defaults.requirements_file),
            northbound_host: matches.value_of("northbound-host").map(str::to_owned).unwrap_or(defaults.northbound_host),
            northbound_port: matches
                .value_of("northbound-port")
                .map(|s| s.parse().expect("invalid --northbound-port"))
                .unwrap_or(defaults.northbound_port),
            southbound_host: matches.value_of("southbound-host").map(str::to_owned).unwrap_or(defaults.southbound_host),
            southbound_port: matches
                .value_of("southbound-port")
                .map(|s| s.parse().expect("invalid --southbound-port"))
                .unwrap_or(defaults.southbound_port),
            policy: match matches.value_of("policy") {
                Some("full") => Policy::Full,
                Some("partial-ecmp") => Policy::PartialEcmp,
                Some("partial") | None => defaults.policy,
                Some(other) => panic!("invalid --policy {other}"),
            },
            new_edge_metric: matches
                .value_of("new-edge-metric")
                .map(|s| s.parse().expect("invalid --new-edge-metric"))
                .unwrap_or(defaults.new_edge_metric),
        }
    }
}
