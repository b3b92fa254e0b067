pub mod commands;
pub mod handlers;
pub mod output;

pub use commands::{CliArgs, Commands, RunArgs};
pub use output::{OutputFormat, OutputFormatter, TerminalHandler};
