use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use wftrace::TraceConfig;

mod commands;

#[derive(Parser)]
#[command(name = "wft")]
#[command(about = "Live trace of a workflow execution and its child workflows")]
#[command(version)]
struct Cli {
    /// Path to the config file (default: ~/.config/wftrace/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log more (-v for debug, -vv for trace). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Trace a workflow execution until it closes or is interrupted
    Trace {
        /// Workflow id
        workflow_id: String,

        /// Run id (default: the latest history for the workflow id)
        #[arg(long, short = 'r', default_value = "")]
        run_id: String,

        /// Directory holding JSONL workflow histories
        #[arg(long)]
        history_dir: Option<PathBuf>,

        /// Child workflow hops to follow (-1 = unlimited)
        #[arg(long, allow_hyphen_values = true)]
        depth: Option<i32>,

        /// Maximum histories fetched at once
        #[arg(long, allow_hyphen_values = true)]
        concurrency: Option<i64>,

        /// Statuses whose child workflows are folded (e.g. completed,canceled)
        #[arg(long)]
        fold: Option<String>,

        /// Expand and fetch every child workflow regardless of status
        #[arg(long)]
        no_fold: bool,

        /// Redraw period in milliseconds
        #[arg(long)]
        update_period_ms: Option<u64>,
    },

    /// Show what each status icon means
    Legend,
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = TraceConfig::load_or_default(cli.config.as_deref()).context("Failed to load config")?;

    match cli.command {
        Commands::Trace {
            workflow_id,
            run_id,
            history_dir,
            depth,
            concurrency,
            fold,
            no_fold,
            update_period_ms,
        } => {
            if let Some(dir) = history_dir {
                config.history.dir = dir;
            }
            if let Some(depth) = depth {
                config.trace.depth = depth;
            }
            if let Some(concurrency) = concurrency {
                config.trace.concurrency = concurrency;
            }
            if let Some(fold) = fold {
                config.trace.fold = fold;
            }
            if no_fold {
                config.trace.no_fold = true;
            }
            if let Some(period) = update_period_ms {
                config.trace.update_period_ms = period;
            }

            let code = commands::trace::run(&config, &workflow_id, &run_id)?;
            if code != 0 {
                std::process::exit(code);
            }
            Ok(())
        }
        Commands::Legend => commands::legend::run(),
    }
}
