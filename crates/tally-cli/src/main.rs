//! tally CLI — ingest assessment attempts, dedupe and score them.

use std::path::PathBuf;
use std::process;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use tally_core::model::AttemptState;
use tally_store::AttemptFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "tally",
    version,
    about = "Assessment attempt deduplication and negative-marking scoring"
)]
struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a batch of attempt events
    Ingest {
        /// JSON file: an array of events or {"events": [...]}
        #[arg(long)]
        batch: PathBuf,

        /// Directory for report files
        #[arg(long, default_value = "./tally-reports")]
        output: PathBuf,

        /// Report formats: text, json, html, all (comma-separated)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Recompute the score of a stored attempt
    Recompute {
        /// Attempt id
        attempt_id: Uuid,
    },

    /// Flag an attempt for manual review
    Flag {
        /// Attempt id
        attempt_id: Uuid,

        /// Why the attempt needs review
        #[arg(long)]
        reason: String,
    },

    /// Show an attempt with its score, flags and duplicate thread
    Show {
        /// Attempt id
        attempt_id: Uuid,

        /// Print JSON instead of tables
        #[arg(long)]
        json: bool,
    },

    /// List stored attempts, newest start first
    List {
        /// Only attempts of this test
        #[arg(long)]
        test: Option<String>,

        /// Only attempts in this state (ingested, deduped, scored, flagged)
        #[arg(long)]
        status: Option<AttemptState>,

        /// true: only duplicates; false: only canonical attempts
        #[arg(long)]
        duplicates: Option<bool>,

        /// Started at or after (date or timestamp, UTC)
        #[arg(long, value_parser = commands::list::parse_start_bound)]
        from: Option<DateTime<Utc>>,

        /// Started at or before (date or timestamp, UTC)
        #[arg(long, value_parser = commands::list::parse_start_bound)]
        to: Option<DateTime<Utc>>,

        /// Match student name, email or phone
        #[arg(long)]
        search: Option<String>,

        /// Page number, from 1
        #[arg(long, default_value_t = 1)]
        page: usize,

        /// Attempts per page (1-100)
        #[arg(long, default_value_t = tally_store::listing::DEFAULT_PER_PAGE)]
        per_page: usize,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Rank the best attempt of each student in a test
    Leaderboard {
        /// Test id
        test_id: String,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,

        /// Also write an HTML page here
        #[arg(long)]
        html: Option<PathBuf>,
    },

    /// Validate a test catalog and, optionally, an event batch
    Validate {
        /// Test catalog TOML
        #[arg(long)]
        catalog: PathBuf,

        /// Event batch JSON to check without ingesting
        #[arg(long)]
        batch: Option<PathBuf>,
    },

    /// Create a starter config, catalog and sample batch
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tally=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.config;

    let result = match cli.command {
        Commands::Ingest {
            batch,
            output,
            format,
        } => commands::ingest::execute(batch, output, format, config).await,
        Commands::Recompute { attempt_id } => {
            commands::recompute::execute(attempt_id, config).await
        }
        Commands::Flag { attempt_id, reason } => {
            commands::flag::execute(attempt_id, reason, config).await
        }
        Commands::Show { attempt_id, json } => {
            commands::show::execute(attempt_id, json, config).await
        }
        Commands::List {
            test,
            status,
            duplicates,
            from,
            to,
            search,
            page,
            per_page,
            json,
        } => {
            let filter = AttemptFilter {
                test_id: test,
                state: status,
                has_duplicates: duplicates,
                started_from: from,
                started_to: to,
                search,
            };
            commands::list::execute(filter, page, per_page, json, config).await
        }
        Commands::Leaderboard {
            test_id,
            json,
            html,
        } => commands::leaderboard::execute(test_id, json, html, config).await,
        Commands::Validate { catalog, batch } => commands::validate::execute(catalog, batch),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
