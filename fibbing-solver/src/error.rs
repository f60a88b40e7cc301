//
// Copyright (c) The Fibbing Controller Contributors
//
// SPDX-License-Identifier: MIT
//

use tracing::warn;

/// Per-destination failures the solver can hit. None of these stop other
/// destinations in the same `solve()` call from being processed.
#[derive(Debug)]
pub enum Error {
    /// A DAG edge has no counterpart in the IGP graph, so the requirement
    /// cannot be embedded no matter how fake nodes are placed.
    Unsolvable { from: String, to: String },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Unsolvable { from, to } => {
                write!(f, "cannot satisfy the DAG: ({from}, {to}) is not in the IGP graph")
            }
        }
    }
}

impl Error {
    pub fn log(&self) {
        match self {
            Error::Unsolvable { from, to } => warn!(%from, %to, "{}", self),
        }
    }
}
