//
// Copyright (c) The Fibbing Controller Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod error;
pub mod lsa;
pub mod lsdb;
pub mod parse;
pub mod private_addr;

pub use error::Error;
pub use lsa::{
    is_expired, is_newer_seqnum, AsExternalLsa, AsExternalRoute, Link, Lsa, LsaHeader, LsaKey,
    LsaResolver, LsaType, NetworkLsa, RouterLsa, MAX_LS_AGE,
};
pub use lsdb::{EdgeSnapshot, GraphEvent, Listener, Lsdb, NodeProperties};
pub use parse::{parse_ingest_line, parse_lsa, IngestLine};
pub use private_addr::PrivateAddressStore;
