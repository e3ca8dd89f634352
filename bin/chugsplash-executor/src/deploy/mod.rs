//! The `deploy` and `simulate` subcommands.
//!
//! Both run against a fresh in-process chain: the project is registered, missing proxies are
//! created with the manager as their admin, and the config is proposed and approved by its
//! owner. `deploy` then executes it as the owner, `simulate` hands it to a remote executor.

mod cmd;

pub use cmd::*;
