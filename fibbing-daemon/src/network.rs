//
// Copyright (c) The Fibbing Controller Contributors
//
// SPDX-License-Identifier: MIT
//

//! Binds the northbound SJMP listener and dials the southbound SJMP
//! transport, over TCP or a Unix domain socket depending on the configured
//! [`Endpoint`].

use fibbing_northbound::controller::{SharedController, SouthboundCommand};
use fibbing_northbound::{sjmp, southbound, Error};
use tokio::net::{TcpListener, TcpStream, UnixListener, UnixStream};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info};

/// Accepts northbound SJMP connections forever, handing each off to
/// [`sjmp::serve`] against a clone of `controller`. Never returns on
/// success; only a listen failure ends the task.
pub async fn serve_northbound(endpoint: sjmp::Endpoint, controller: SharedController) -> Result<(), Error> {
    match endpoint {
        sjmp::Endpoint::Tcp(host, port) => {
            let listener = TcpListener::bind((host.as_str(), port))
                .await
                .map_err(Error::Listen)?;
            info!(%host, port, "listening for northbound SJMP connections");
            loop {
                let (stream, peer) = listener.accept().await.map_err(Error::Listen)?;
                debug!(%peer, "accepted northbound connection");
                let controller = controller.clone();
                tokio::spawn(async move { sjmp::serve(stream, controller).await });
            }
        }
        sjmp::Endpoint::Unix(path) => {
            let _ = std::fs::remove_file(&path);
            let listener = UnixListener::bind(&path).map_err(Error::Listen)?;
            info!(path = %path.display(), "listening for northbound SJMP connections");
            loop {
                let (stream, _) = listener.accept().await.map_err(Error::Listen)?;
                debug!("accepted northbound connection");
                let controller = controller.clone();
                tokio::spawn(async move { sjmp::serve(stream, controller).await });
            }
        }
    }
}

/// Dials the southbound agent once and drains `commands` onto it for the
/// remainder of the connection's life. A dial failure propagates so the
/// caller can decide whether to retry or give up.
pub async fn run_southbound(
    endpoint: sjmp::Endpoint,
    commands: UnboundedReceiver<SouthboundCommand>,
) -> Result<(), Error> {
    match endpoint {
        sjmp::Endpoint::Tcp(host, port) => {
            let stream = TcpStream::connect((host.as_str(), port))
                .await
                .map_err(Error::Connect)?;
            info!(%host, port, "connected to southbound agent");
            southbound::run(stream, commands).await;
        }
        sjmp::Endpoint::Unix(path) => {
            let stream = UnixStream::connect(&path).await.map_err(Error::Connect)?;
            info!(path = %path.display(), "connected to southbound agent");
            southbound::run(stream, commands).await;
        }
    }
    Ok(())
}
