mod commands;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::EnvFilter;

#[derive(Parser)]
#[command(version, about = "Unity Editor log parser")]
struct Cli {
    /// Append diagnostics to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a whole log and print a summary
    Parse {
        path: PathBuf,
        /// Stream every event to stdout as JSON lines instead
        #[arg(long)]
        jsonl: bool,
    },
    /// Tail a log, writing events to stdout as JSON lines until ctrl-c
    Live {
        /// Log to tail; defaults to the configured or platform Editor.log
        #[arg(short, long)]
        path: Option<PathBuf>,
        #[arg(long)]
        checkpoint_dir: Option<PathBuf>,
        /// Ignore any saved checkpoint and parse from the start
        #[arg(long)]
        fresh: bool,
    },
    /// Show the configuration, or write the defaults with --init
    Config {
        #[arg(long)]
        init: bool,
    },
}

fn init_logging(log_file: Option<&PathBuf>) -> Option<WorkerGuard> {
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .from_env_lossy();

    if let Some(path) = log_file {
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
        let name = path.file_name().map(|n| n.to_owned()).unwrap_or_else(|| "editorlog.log".into());
        let appender = tracing_appender::rolling::never(dir.unwrap_or_else(|| Path::new(".")), name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_ansi(false)
            .with_writer(writer)
            .init();
        return Some(guard);
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
    None
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let cli = Cli::parse();
    let _guard = init_logging(cli.log_file.as_ref());

    let result = match cli.command {
        Commands::Parse { path, jsonl } => commands::parse(&path, jsonl),
        Commands::Live {
            path,
            checkpoint_dir,
            fresh,
        } => commands::live(path, checkpoint_dir, fresh).await,
        Commands::Config { init } => commands::show_config(init),
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Command failed");
    }
    result
}
