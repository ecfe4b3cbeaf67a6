#[macro_use]
mod errors;
mod repl;
mod statement;
mod storage;

use clap::Parser;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(
    name = "leafdb",
    version = VERSION,
    about = "Embedded B+ tree table engine with a tiny shell."
)]
struct Cli {
    /// Path to the database file; created on first open.
    file: PathBuf,
    /// File that diagnostic logs are appended to (stdout belongs to the shell).
    #[arg(long, env = "LEAFDB_LOG", default_value = "leafdb.log")]
    log_file: PathBuf,
    /// History file; resolved against the home directory unless absolute.
    #[arg(long, env = "LEAFDB_HISTORY")]
    history: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match OpenOptions::new()
        .append(true)
        .create(true)
        .open(&cli.log_file)
    {
        Ok(file) => {
            tracing_subscriber::fmt()
                .with_writer(Arc::new(file))
                .with_ansi(false)
                .with_env_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
                )
                .init();
        }
        Err(e) => eprintln!("Could not open log file: {}", e),
    }

    let mut table = match storage::table::Table::open(&cli.file) {
        Ok(table) => table,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let history_path = cli.history.as_deref().map(repl::history::resolve_path);
    match repl::start(&mut table, history_path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
