//
// Copyright (c) The Fibbing Controller Contributors
//
// SPDX-License-Identifier: MIT
//

//! Reads the inbound LSA stream: one textual LSA-change line per read, fed
//! to the LSA-processing worker over a bounded channel.

use std::path::PathBuf;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::warn;

/// Polls `path` forever, forwarding each line onto `tx`. A FIFO yields EOF
/// once its writer closes rather than staying open, so a clean EOF reopens
/// the pipe instead of ending the task; only a channel close (the worker
/// shutting down) ends the loop.
pub async fn run(path: PathBuf, tx: mpsc::Sender<String>) {
    loop {
        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(error) => {
                warn!(%error, path = %path.display(), "failed to open LSA ingest stream, retrying");
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
        };

        let mut lines = BufReader::new(file).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).await.is_err() {
                        return;
                    }
                }
                Ok(None) => break,
                Err(error) => {
                    warn!(%error, "LSA ingest read error");
                    break;
                }
            }
        }
    }
}
