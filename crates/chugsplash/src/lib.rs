//! Merkle-committed, atomic proxy upgrades.
//!
//! A project owner commits to a deployment by proposing the Merkle roots of its actions and
//! targets to the project's [`ChugSplashManager`]. Once approved, an executor submits the actions
//! in gas-bounded batches, each proven against the committed roots, locks every proxy on the
//! updater, applies the storage writes and finally points every proxy at its new implementation.
//! The manager pays remote executors from the owner's deposit.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod constants;
pub mod events;
pub use events::{Event, Log};
pub mod merkle;

mod adapter;
pub use adapter::*;

mod batch;
pub use batch::*;

mod bundle;
pub use bundle::*;

mod chain;
pub use chain::*;

mod context;
pub use context::*;

mod create;
pub use create::*;

mod gas;
pub use gas::*;

mod manager;
pub use manager::*;

mod registry;
pub use registry::*;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

mod types;
pub use types::*;

mod world;
pub use world::*;
