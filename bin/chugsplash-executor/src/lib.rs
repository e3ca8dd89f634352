//! Off-chain executor for `ChugSplash` deployments.
//!
//! The [`Executor`](executor::Executor) follows the announcement feed of the registry, claims
//! approved remote deployments, rebuilds their bundles from the proposed config and drives them to
//! completion in gas-bounded batches. The same driver executes local deployments on behalf of the
//! project owner.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod cmd;
pub use cmd::*;

pub mod bundle;
/// Shared CLI arguments and helpers.
pub mod common;
pub mod deploy;
pub mod executor;
