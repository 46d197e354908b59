use clap::{Parser, Subcommand};
use overseer::{
    FleetFile, LogFormat, ObservabilityConfig, RuntimeConfigBuilder, RuntimeLimits, init_tracing,
};
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

mod agents;
mod simulate;

use simulate::{SimulateArgs, run_simulation};

#[derive(Parser, Debug)]
#[command(name = "overseer", version)]
#[command(about = "Overseer CLI - inspect limits and simulate agent fleets")]
struct Cli {
    /// Log output format (json, pretty, compact)
    #[arg(long, global = true, default_value = "json")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the effective runtime limits as JSON
    Limits {
        /// Also apply the [limits] table of this fleet file
        #[arg(long)]
        fleet: Option<PathBuf>,
    },
    /// Register a fleet against the demo agents and run ticks on a manual clock
    Simulate {
        /// Fleet file (TOML)
        #[arg(long)]
        fleet: PathBuf,
        /// Number of ticks to run
        #[arg(long, default_value_t = 3)]
        ticks: u32,
        /// Minutes the clock advances between ticks
        #[arg(long, default_value_t = 60)]
        advance_minutes: i64,
        /// Event to emit before the first tick, as TYPE or TYPE=JSON (repeatable)
        #[arg(long)]
        emit: Vec<String>,
        /// Include Prometheus metrics in the summary
        #[arg(long)]
        metrics: bool,
    },
}

fn effective_limits(fleet: Option<PathBuf>) -> Result<RuntimeLimits, Box<dyn Error>> {
    let mut builder = RuntimeConfigBuilder::from_env()?;
    if let Some(path) = fleet {
        builder = builder.overrides(&FleetFile::load(path)?.limits);
    }
    Ok(builder.build()?.limits)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let observability = ObservabilityConfig {
        log_format: cli.log_format,
        default_filter: "warn".to_string(),
        ..Default::default()
    };
    if let Err(e) = init_tracing(&observability) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let output: Result<String, Box<dyn Error>> = match cli.command {
        Commands::Limits { fleet } => effective_limits(fleet)
            .and_then(|limits| Ok(serde_json::to_string_pretty(&limits)?)),
        Commands::Simulate {
            fleet,
            ticks,
            advance_minutes,
            emit,
            metrics,
        } => run_simulation(SimulateArgs {
            fleet,
            ticks,
            advance_minutes,
            emit,
            metrics,
        })
        .await
        .map_err(|e| Box::new(e) as Box<dyn Error>)
        .and_then(|summary| Ok(serde_json::to_string_pretty(&summary)?)),
    };

    match output {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
