//
// Copyright (c) The Fibbing Controller Contributors
//
// SPDX-License-Identifier: MIT
//

#![warn(rust_2018_idioms)]

mod config;
mod error;
mod ingest;
mod network;
mod requirements;
mod worker;

use config::Config;
use fibbing_lsdb::{Lsdb, PrivateAddressStore};
use fibbing_northbound::controller::{Controller, SharedController};
use fibbing_northbound::sjmp;
use fibbing_solver::Merger;
use tracing::{error, info};

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive("fibbing=info".parse().unwrap())
        .from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(env_filter).with_target(false).init();
}

async fn run(config: Config) {
    let private_addresses = match &config.private_address_file {
        Some(path) => PrivateAddressStore::load(path),
        None => PrivateAddressStore::empty(),
    };
    let requirements = match &config.requirements_file {
        Some(path) => requirements::load(path),
        None => Vec::new(),
    };

    let mut lsdb = Lsdb::new(config.base_net, config.controller_prefix, private_addresses);

    let (southbound_tx, southbound_rx) = tokio::sync::mpsc::unbounded_channel();
    let mut merger = Merger::new(config.policy);
    merger.set_new_edge_metric(config.new_edge_metric);
    let controller = Controller::new(merger, requirements, southbound_tx);
    let controller = SharedController::new(controller);

    lsdb.register_listener(Box::new(controller.clone()));

    let (lsa_tx, lsa_rx) = tokio::sync::mpsc::channel(1024);
    let ingest_path: std::path::PathBuf = config.ingest_path.clone().into();
    fibbing_utils::task::Task::spawn_supervised(move || {
        let path = ingest_path.clone();
        let tx = lsa_tx.clone();
        async move { ingest::run(path, tx).await }
    })
    .detach();

    let worker = tokio::spawn(worker::run(lsdb, lsa_rx));

    let northbound_endpoint = sjmp::Endpoint::parse(&config.northbound_host, config.northbound_port);
    let northbound_controller = controller.clone();
    tokio::spawn(async move {
        if let Err(error) = network::serve_northbound(northbound_endpoint, northbound_controller).await {
            error.log();
        }
    });

    let southbound_endpoint = sjmp::Endpoint::parse(&config.southbound_host, config.southbound_port);
    tokio::spawn(async move {
        if let Err(error) = network::run_southbound(southbound_endpoint, southbound_rx).await {
            error.log();
        }
    });

    info!(instance = %config.instance_name, "fibbing controller started");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
        }
        result = worker => {
            if let Err(error) = result {
                error!(%error, "LSA worker task ended unexpectedly");
            }
        }
    }

    controller.with(|c| c.shutdown());
}

fn main() {
    init_tracing();

    let config = Config::from_args();

    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_panic(info);
        std::process::exit(1);
    }));

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to create async runtime")
        .block_on(run(config));
}
