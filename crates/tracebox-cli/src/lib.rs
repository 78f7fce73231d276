mod args;
mod commands;
mod handlers;
pub mod host;
mod logging;
mod render;
pub mod types;

pub use args::{Cli, Commands};
pub use commands::run;
