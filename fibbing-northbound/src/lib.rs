//
// Copyright (c) The Fibbing Controller Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod controller;
pub mod error;
pub mod sjmp;
pub mod southbound;

pub use controller::{Controller, SharedController, SouthboundCommand};
pub use error::Error;
