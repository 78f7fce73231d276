use super::args::{Cli, Commands};
use super::{handlers, logging};
use anyhow::Result;
use std::path::{Path, PathBuf};
use tracebox_runtime::{Config, resolve_data_dir};

const STORE_FILE: &str = "traces.json";

/// Dispatch a parsed command line. Returns the process exit code.
pub fn run(cli: Cli) -> Result<i32> {
    logging::init(cli.log_level);

    let data_dir = resolve_data_dir(cli.data_dir.as_deref())?;
    let config = Config::load(&data_dir)?;
    tracing::debug!(data_dir = %data_dir.display(), "Resolved data directory");

    match cli.command {
        Commands::Run {
            raw,
            store,
            program,
        } => handlers::run::handle(
            &config,
            &store_path(&data_dir, store),
            &program,
            raw,
            cli.format,
        ),

        Commands::Show {
            store,
            group_by,
            source_root,
        } => {
            handlers::show::handle(
                &config,
                &store_path(&data_dir, store),
                &group_by,
                source_root,
                cli.format,
            )?;
            Ok(0)
        }

        Commands::Clear { store } => {
            handlers::clear::handle(&store_path(&data_dir, store), cli.format)?;
            Ok(0)
        }
    }
}

fn store_path(data_dir: &Path, explicit: Option<PathBuf>) -> PathBuf {
    explicit.unwrap_or_else(|| data_dir.join(STORE_FILE))
}
