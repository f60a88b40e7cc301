//
// Copyright (c) The Fibbing Controller Contributors
//
// SPDX-License-Identifier: MIT
//

//! The IGP graph carrier and the ECMP shortest-path engine.
//!
//! This crate has no notion of LSAs or solver state; it is the shared graph
//! representation that the LSDB rebuilds into and the solver operates on.

pub mod graph;
pub mod spt;

pub use graph::{EdgeData, EdgeKind, IgpGraph, NodeData, NodeId, NodeIndex, NodeKind, RouteKind};
pub use spt::ShortestPaths;
