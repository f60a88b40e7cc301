//
// Copyright (c) The Fibbing Controller Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod cross_optimizer;
pub mod dag;
pub mod error;
pub mod merger;
pub mod node;

pub use cross_optimizer::{group, ExtLsaRoute, ExtendedLsa};
pub use dag::{Dag, DagNode};
pub use error::Error;
pub use merger::{FakeLsa, Merger, Policy, Requirement};
pub use node::{FakeKind, Node};
