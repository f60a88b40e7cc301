//
// Copyright (c) The Fibbing Controller Contributors
//
// SPDX-License-Identifier: MIT
//

//! The "Simple JSON Message Passing" wire protocol: newline-delimited UTF-8
//! JSON frames exchanged over a TCP or Unix-domain stream, used both to
//! expose the northbound method surface to a remote topology monitor and to
//! invoke the southbound surface on a remote Fibbing agent.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

pub const CMD_EXEC: &str = "exec";
pub const CMD_RESULT: &str = "result";
pub const CMD_EXCEPTION: &str = "exception";
pub const CMD_INFO: &str = "info";
pub const CMD_DISPLAY: &str = "display";
pub const CMD_PING: &str = "ping";
pub const CMD_PONG: &str = "pong";

/// How long a connection waits for the peer before sending a keep-alive PING.
pub const IDLE_PING_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Frame {
    pub cmd: String,
    pub cmd_arg: Value,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ExecArg {
    pub method: String,
    #[serde(default)]
    pub arg_list: Vec<Value>,
    #[serde(default)]
    pub arg_dict: HashMap<String, Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MethodInfo {
    pub doc: Option<String>,
    pub args: Vec<String>,
}

/// Where an SJMP endpoint listens or connects: a TCP address, or a Unix
/// socket path selected by the `unix://` URL scheme.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Endpoint {
    Tcp(String, u16),
    Unix(PathBuf),
}

impl Endpoint {
    pub fn parse(hostname: &str, port: u16) -> Endpoint {
        match hostname.strip_prefix("unix://") {
            Some(path) => Endpoint::Unix(PathBuf::from(path)),
            None => Endpoint::Tcp(hostname.to_string(), port),
        }
    }
}

/// The object exposed on the EXEC channel of an SJMP connection.
pub trait Target: Send {
    /// Invokes `method`, returning the value to send back as a RESULT frame
    /// (or `None` if the method has no meaningful reply), or an error
    /// message to report back as an EXCEPTION frame.
    fn exec(&mut self, method: &str, arg: &ExecArg) -> Result<Option<Value>, String>;

    /// Method catalog reported in response to an INFO request. The default
    /// (empty) catalog is fine for targets that never expect an INFO probe.
    fn catalog(&self) -> HashMap<String, MethodInfo> {
        HashMap::new()
    }
}

/// Serves one SJMP connection until EOF or a read error, dispatching EXEC
/// frames to `target` and replying to PING/INFO on the spot. Sends an idle
/// PING whenever [`IDLE_PING_INTERVAL`] passes without a frame from the
/// peer, matching the keep-alive discipline of the wire protocol.
pub async fn serve<S, T>(stream: S, mut target: T)
where
    S: AsyncRead + AsyncWrite + Unpin,
    T: Target,
{
    let (rd, mut wr) = tokio::io::split(stream);
    let mut lines = BufReader::new(rd).lines();

    loop {
        match tokio::time::timeout(IDLE_PING_INTERVAL, lines.next_line()).await {
            Ok(Ok(Some(line))) => {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<Frame>(&line) {
                    Ok(frame) => handle_frame(&mut wr, &mut target, frame).await,
                    Err(error) => {
                        warn!(%error, %line, "malformed SJMP frame, ignoring");
                    }
                }
            }
            Ok(Ok(None)) => break,
            Ok(Err(error)) => {
                warn!(%error, "SJMP connection read error");
                break;
            }
            Err(_) => {
                if send_frame(&mut wr, CMD_PING, Value::Object(Default::default()))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        }
    }
}

async fn handle_frame<W, T>(wr: &mut W, target: &mut T, frame: Frame)
where
    W: AsyncWrite + Unpin,
    T: Target,
{
    match frame.cmd.as_str() {
        CMD_EXEC => match serde_json::from_value::<ExecArg>(frame.cmd_arg.clone()) {
            Ok(arg) => match target.exec(&arg.method, &arg) {
                Ok(Some(result)) => {
                    let _ = send_frame(wr, CMD_RESULT, result).await;
                }
                Ok(None) => {}
                Err(message) => {
                    let payload = serde_json::json!({
                        "cmd_arg": frame.cmd_arg,
                        "exception": message,
                    });
                    let _ = send_frame(wr, CMD_EXCEPTION, payload).await;
                }
            },
            Err(error) => warn!(%error, "malformed exec arguments, ignoring"),
        },
        CMD_PING => {
            let _ = send_frame(wr, CMD_PONG, Value::Object(Default::default())).await;
        }
        CMD_PONG => {}
        CMD_INFO => {
            let catalog = target.catalog();
            if let Ok(value) = serde_json::to_value(catalog) {
                let _ = send_frame(wr, CMD_DISPLAY, value).await;
            }
        }
        CMD_RESULT => debug!(result = %frame.cmd_arg, "remote RPC result"),
        CMD_EXCEPTION => warn!(exception = %frame.cmd_arg, "remote RPC exception"),
        CMD_DISPLAY => debug!(catalog = %frame.cmd_arg, "remote method catalog"),
        other => warn!(cmd = other, "unknown SJMP command, ignoring"),
    }
}

pub async fn send_frame<W>(wr: &mut W, cmd: &str, cmd_arg: Value) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = Frame {
        cmd: cmd.to_string(),
        cmd_arg,
    };
    let line = serde_json::to_string(&frame).expect("Frame always serializes");
    wr.write_all(line.as_bytes()).await?;
    wr.write_all(b"\n").await
}

/// Builds the `cmd_arg` payload of an EXEC frame invoking `method` with
/// positional arguments only (the southbound surface never needs keyword
/// arguments).
pub fn exec_arg(method: &str, arg_list: Vec<Value>) -> Value {
    serde_json::to_value(ExecArg {
        method: method.to_string(),
        arg_list,
        arg_dict: HashMap::new(),
    })
    .expect("ExecArg always serializes")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn endpoint_parses_unix_scheme() {
        assert_eq!(
            Endpoint::parse("unix:///run/fibbing.sock", 0),
            Endpoint::Unix(PathBuf::from("/run/fibbing.sock"))
        );
    }

    #[test]
    fn endpoint_defaults_to_tcp() {
        assert_eq!(
            Endpoint::parse("127.0.0.1", 8080),
            Endpoint::Tcp("127.0.0.1".to_string(), 8080)
        );
    }

    #[test]
    fn exec_arg_round_trips() {
        let value = exec_arg("add_edge", vec![Value::String("r1".into())]);
        let parsed: ExecArg = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.method, "add_edge");
        assert_eq!(parsed.arg_list.len(), 1);
    }
}
