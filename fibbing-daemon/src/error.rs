//
// Copyright (c) The Fibbing Controller Contributors
//
// SPDX-License-Identifier: MIT
//

use tracing::warn;

/// Errors specific to loading the operator-supplied requirement set. Kept
/// separate from [`fibbing_lsdb::Error`] and [`fibbing_northbound::Error`],
/// which cover the ingest stream and the RPC transports respectively.
#[derive(Debug)]
pub enum Error {
    RequirementsFile(String, std::io::Error),
    RequirementsFormat(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::RequirementsFile(path, error) => {
                write!(f, "failed to read requirements file {path}: {error}")
            }
            Error::RequirementsFormat(path) => {
                write!(f, "requirements file {path} is not in the expected shape")
            }
        }
    }
}

impl Error {
    pub fn log(&self) {
        warn!("{}", self);
    }
}
