//! The `bundle` subcommand.

mod cmd;

pub use cmd::*;
