//
// Copyright (c) The Fibbing Controller Contributors
//
// SPDX-License-Identifier: MIT
//

//! The single-writer LSA-processing worker: the only task allowed to mutate
//! the [`Lsdb`], so the graph it rebuilds never observes a half-applied
//! batch of LSA changes.

use std::time::Duration;

use fibbing_lsdb::Lsdb;
use fibbing_utils::task::Task;
use tokio::sync::mpsc;

const AUTO_COMMIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Drains `rx` into `lsdb` on a dedicated blocking thread and returns once
/// the channel closes. Bridges the async ingest side to the blocking
/// `recv_timeout`-style read loop the LSDB's transaction discipline wants:
/// apply everything immediately available, commit if nothing is pending,
/// then block for the next line or the five-second auto-commit deadline.
pub async fn run(mut lsdb: Lsdb, mut rx: mpsc::Receiver<String>) {
    let handle = tokio::runtime::Handle::current();
    let result = Task::spawn_blocking(move || loop {
        while let Ok(line) = rx.try_recv() {
            if let Err(error) = lsdb.handle_line(&line) {
                error.log();
            }
        }
        lsdb.commit();

        match handle.block_on(tokio::time::timeout(AUTO_COMMIT_TIMEOUT, rx.recv())) {
            Ok(Some(line)) => {
                if let Err(error) = lsdb.handle_line(&line) {
                    error.log();
                }
            }
            Ok(None) => return,
            Err(_) => {
                lsdb.force_commit();
            }
        }
    })
    .await;

    if let Err(error) = result {
        tracing::error!(%error, "LSA worker thread panicked");
    }
}
