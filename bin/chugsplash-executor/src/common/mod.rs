mod args;
mod logging;
mod setup;

pub use args::*;
pub use logging::*;
pub use setup::*;
