//! `ChugSplash` executor CLI.

use chugsplash_executor::{Error, MainCmd};
use clap::Parser;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let cmd = MainCmd::parse();
    cmd.log_args().init()?;
    cmd.run().await.inspect_err(|e| eprintln!("{e}"))
}
