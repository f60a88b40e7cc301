//
// Copyright (c) The Fibbing Controller Contributors
//
// SPDX-License-Identifier: MIT
//

use tracing::warn;

/// Errors the LSDB can encounter while ingesting the textual LSA stream.
///
/// None of these are fatal: every variant is logged and the offending input
/// is dropped, matching the "log and continue" design of the ingest
/// pipeline.
#[derive(Debug)]
pub enum Error {
    /// A line didn't match `BEGIN|`, `COMMIT|`, `ADD|...` or `REM|...`.
    MalformedLine(String),
    /// An LSA payload was missing a required header or link field.
    MalformedLsa(String),
    /// The private-address binding file was missing or not valid JSON.
    PrivateAddressFile(String, std::io::Error),
    /// The private-address binding file parsed as JSON but not in the
    /// expected shape.
    PrivateAddressFormat(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::MalformedLine(line) => {
                write!(f, "malformed LSDB ingest line: {line}")
            }
            Error::MalformedLsa(payload) => {
                write!(f, "malformed LSA payload: {payload}")
            }
            Error::PrivateAddressFile(path, error) => {
                write!(f, "failed to read private-address file {path}: {error}")
            }
            Error::PrivateAddressFormat(path) => {
                write!(f, "private-address file {path} is not in the expected shape")
            }
        }
    }
}

impl Error {
    pub fn log(&self) {
        match self {
            Error::MalformedLine(line) => {
                warn!(%line, "{}", self);
            }
            Error::MalformedLsa(payload) => {
                warn!(%payload, "{}", self);
            }
            Error::PrivateAddressFile(path, error) => {
                warn!(%path, %error, "{}", self);
            }
            Error::PrivateAddressFormat(path) => {
                warn!(%path, "{}", self);
            }
        }
    }
}
