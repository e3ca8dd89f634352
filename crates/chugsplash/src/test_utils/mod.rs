//! Test utilities for managers and deployments.

mod creator;
mod project;

pub use creator::*;
pub use project::*;
