//
// Copyright (c) The Fibbing Controller Contributors
//
// SPDX-License-Identifier: MIT
//

use tracing::warn;

#[derive(Debug)]
pub enum Error {
    Listen(std::io::Error),
    Connect(std::io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Listen(error) => write!(f, "failed to listen for SJMP connections: {error}"),
            Error::Connect(error) => write!(f, "failed to connect to southbound agent: {error}"),
        }
    }
}

impl Error {
    pub fn log(&self) {
        warn!("{}", self);
    }
}
