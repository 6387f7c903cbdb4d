//! adaptest CLI — bank validation, score conversion and ability-recovery
//! simulation on top of `adaptest-core`.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "adaptest", version, about = "IRT-based adaptive testing engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate item bank TOML files
    Validate {
        /// Path to item bank file or directory
        #[arg(long)]
        bank: PathBuf,
    },

    /// Convert an ability estimate to the published score scale
    Score {
        /// Ability estimate on the theta scale
        #[arg(long, allow_hyphen_values = true)]
        theta: f64,

        /// Standard error of the estimate
        #[arg(long)]
        se: Option<f64>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Simulate examinees against an item bank and report ability recovery
    Simulate {
        /// Path to item bank file
        #[arg(long)]
        bank: PathBuf,

        /// Number of simulated sessions
        #[arg(long, default_value = "1000")]
        sessions: usize,

        /// Seed for the simulated population
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Max concurrent sessions
        #[arg(long, default_value = "4")]
        parallelism: usize,

        /// Minimum items per session (default: from config)
        #[arg(long)]
        min_items: Option<usize>,

        /// Maximum items per session (default: from config)
        #[arg(long)]
        max_items: Option<usize>,

        /// Standard error target (default: from config)
        #[arg(long)]
        se_target: Option<f64>,

        /// Lower bound of the true ability range
        #[arg(long, default_value = "-2.5", allow_hyphen_values = true)]
        theta_min: f64,

        /// Upper bound of the true ability range
        #[arg(long, default_value = "2.5", allow_hyphen_values = true)]
        theta_max: f64,

        /// Write the full simulation report as JSON
        #[arg(long)]
        output: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Create starter config and example item bank
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("adaptest=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate { bank } => commands::validate::execute(bank),
        Commands::Score { theta, se, config } => commands::score::execute(theta, se, config),
        Commands::Simulate {
            bank,
            sessions,
            seed,
            parallelism,
            min_items,
            max_items,
            se_target,
            theta_min,
            theta_max,
            output,
            config,
        } => {
            commands::simulate::execute(commands::simulate::SimulateArgs {
                bank,
                sessions,
                seed,
                parallelism,
                min_items,
                max_items,
                se_target,
                theta_min,
                theta_max,
                output,
                config,
            })
            .await
        }
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
