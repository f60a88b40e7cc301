//
// Copyright (c) The Fibbing Controller Contributors
//
// SPDX-License-Identifier: MIT
//

//! Drives the southbound method surface: translates [`SouthboundCommand`]s
//! queued by the [`crate::controller::Controller`] refresh loop into EXEC
//! frames sent to the remote Fibbing agent running alongside Quagga.

use fibbing_solver::FakeLsa;
use serde_json::Value;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::warn;

use crate::controller::SouthboundCommand;
use crate::sjmp;

/// Drains `commands` onto `stream` until the channel closes, the stream
/// write fails, or an `Exit` command is sent (which terminates the loop
/// after the frame goes out, matching `exit()`'s "initiates shutdown"
/// semantics).
pub async fn run<S>(mut stream: S, mut commands: UnboundedReceiver<SouthboundCommand>)
where
    S: AsyncWrite + Unpin,
{
    while let Some(cmd) = commands.recv().await {
        let is_exit = matches!(cmd, SouthboundCommand::Exit);
        let (method, args) = match &cmd {
            SouthboundCommand::Add(lsas) => ("add", vec![add_points(lsas)]),
            SouthboundCommand::Remove(lsas) => ("remove", vec![remove_points(lsas)]),
            SouthboundCommand::Exit => ("exit", vec![]),
        };
        let arg = sjmp::exec_arg(method, args);
        if let Err(error) = sjmp::send_frame(&mut stream, sjmp::CMD_EXEC, arg).await {
            warn!(%error, "failed to reach southbound agent");
            break;
        }
        if is_exit {
            break;
        }
    }
}

fn add_points(lsas: &[FakeLsa]) -> Value {
    Value::Array(
        lsas.iter()
            .map(|l| {
                Value::Array(vec![
                    Value::String(l.node.to_string()),
                    Value::String(l.next_hop.to_string()),
                    Value::from(l.cost),
                    Value::String(l.dest.to_string()),
                ])
            })
            .collect(),
    )
}

fn remove_points(lsas: &[FakeLsa]) -> Value {
    Value::Array(
        lsas.iter()
            .map(|l| {
                Value::Array(vec![
                    Value::String(l.node.to_string()),
                    Value::String(l.next_hop.to_string()),
                    Value::String(l.dest.to_string()),
                ])
            })
            .collect(),
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use fibbing_utils::RouterId;
    use ipnetwork::Ipv4Network;
    use std::net::Ipv4Addr;

    fn rid(n: u8) -> RouterId {
        RouterId(Ipv4Addr::new(10, 0, 0, n))
    }

    #[tokio::test]
    async fn add_then_exit_writes_two_frames_and_stops() {
        use tokio::io::AsyncReadExt;

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let prefix: Ipv4Network = "192.0.2.0/24".parse().unwrap();
        tx.send(SouthboundCommand::Add(vec![FakeLsa {
            node: rid(1),
            next_hop: rid(2),
            cost: 5,
            dest: prefix,
        }]))
        .unwrap();
        tx.send(SouthboundCommand::Exit).unwrap();
        drop(tx);

        let (mut server, client) = tokio::io::duplex(4096);
        run(client, rx).await;

        let mut buf = Vec::new();
        server.read_to_end(&mut buf).await.unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"add\""));
        assert!(lines[1].contains("\"exit\""));
    }
}
