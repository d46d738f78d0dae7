use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use picodb::common::{APP_DIR_NAME, DEFAULT_PAGE_SIZE_KB};
use picodb::{Result, StorageManager};

/// PicoDB command-line tool
#[derive(Parser, Debug)]
#[command(
    name = "picodb",
    version,
    about = "Embedded single-file paged database engine"
)]
struct Args {
    /// Database directory (defaults to the per-user data directory)
    #[arg(short, long, global = true, env = "PICODB_DIR")]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a fresh database directory
    Init {
        /// Page size in KiB
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE_KB)]
        page_size_kb: usize,

        /// Replace an existing database directory
        #[arg(long)]
        overwrite: bool,
    },
    /// Inspect database configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Print the configuration stored in the data file header
    Get,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("\x1b[31mFatal Error:\x1b[0m {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    let dir = args.dir.unwrap_or_else(default_data_dir);

    match args.command {
        Command::Init {
            page_size_kb,
            overwrite,
        } => {
            StorageManager::create(page_size_kb, &dir, overwrite)?;
            println!("Initialized database at {}", dir.display());
        }
        Command::Config {
            command: ConfigCommand::Get,
        } => {
            let metadata = StorageManager::metadata(&dir)?;
            println!("page_size = {}", metadata.page_size);
        }
    }

    Ok(())
}

/// Per-user application data directory, resolved at runtime.
fn default_data_dir() -> PathBuf {
    if let Some(data_dir) = dirs::data_dir() {
        return data_dir.join(APP_DIR_NAME);
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(format!(".{APP_DIR_NAME}"));
    }
    PathBuf::from(".").join(APP_DIR_NAME)
}
