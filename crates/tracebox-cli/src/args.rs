use crate::types::{GroupBy, LogLevel, OutputFormat};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tracebox")]
#[command(about = "Capture and browse stack traces printed by running programs", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Data directory (defaults to $TRACEBOX_PATH or the platform data dir)
    #[arg(long, global = true)]
    pub data_dir: Option<String>,

    #[arg(long, default_value = "plain", global = true)]
    pub format: OutputFormat,

    #[arg(long, default_value = "warn", global = true)]
    pub log_level: LogLevel,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a program and capture the stack traces it prints
    Run {
        /// Echo the program's output as it arrives
        #[arg(long)]
        raw: bool,

        /// Store file to append captured traces to
        #[arg(long)]
        store: Option<PathBuf>,

        /// Program and its arguments
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        program: Vec<String>,
    },

    /// List captured traces
    Show {
        #[arg(long)]
        store: Option<PathBuf>,

        /// Nest traces by these criteria, outermost first
        #[arg(long, value_delimiter = ',')]
        group_by: Vec<GroupBy>,

        /// Source roots to resolve trace lines against (adds to config)
        #[arg(long)]
        source_root: Vec<PathBuf>,
    },

    /// Remove every captured trace
    Clear {
        #[arg(long)]
        store: Option<PathBuf>,
    },
}
