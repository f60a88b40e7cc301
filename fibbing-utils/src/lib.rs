//
// Copyright (c) The Fibbing Controller Contributors
//
// SPDX-License-Identifier: MIT
//

//! Shared types and async-task building blocks used across the fibbing
//! controller crates.

pub mod ids;
pub mod task;

pub use ids::RouterId;
