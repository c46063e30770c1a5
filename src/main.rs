use clap::{Parser, Subcommand};
use dotenv::dotenv;
use ruleguard_rs::governor::dataset::{DatasetSource, FileDatasetSource};
use ruleguard_rs::governor::workflow::{build_service, RunRequest};
use ruleguard_rs::governor::{server, DriftDetector, GovernorConfig, Profiler};

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the HTTP run control API
    Serve {
        /// Port to listen on (overrides the configuration)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Start a governance run and print its state
    Run {
        /// Dataset to govern
        #[arg(short, long)]
        dataset: String,

        /// Table name the rule queries use
        #[arg(short, long)]
        table: String,

        /// Reference dataset for drift detection
        #[arg(short, long)]
        reference: Option<String>,
    },
    /// Show the state of a run
    Status {
        run_id: String,
    },
    /// Approve or reject a run waiting for review
    Approve {
        run_id: String,

        /// Reject the rule instead of approving it
        #[arg(long)]
        reject: bool,

        /// Name recorded in the audit log
        #[arg(long)]
        reviewer: Option<String>,
    },
    /// Profile a dataset
    Profile {
        #[arg(short, long)]
        dataset: String,
    },
    /// Compare a dataset against a reference
    Drift {
        #[arg(short, long)]
        current: String,

        #[arg(short, long)]
        reference: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let config = GovernorConfig::load(args.config.as_deref())?;

    match args.command {
        Commands::Serve { port } => {
            let service = build_service(&config).await?;
            server::serve(service, port.unwrap_or(config.port)).await?;
        }
        Commands::Run {
            dataset,
            table,
            reference,
        } => {
            if config.checkpoint_dir.is_none() {
                log::warn!("No checkpoint_dir configured; this run cannot be resumed later");
            }
            let service = build_service(&config).await?;
            let snapshot = service
                .start(RunRequest {
                    dataset_uri: dataset,
                    table_name: table,
                    reference_uri: reference,
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Commands::Status { run_id } => {
            let service = build_service(&config).await?;
            let snapshot = service.status(&run_id).await?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Commands::Approve {
            run_id,
            reject,
            reviewer,
        } => {
            let service = build_service(&config).await?;
            let snapshot = service
                .submit_approval(&run_id, !reject, reviewer.as_deref())
                .await?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Commands::Profile { dataset } => {
            let source = FileDatasetSource::new(&config.data_root);
            let dataset = source.load(&dataset).await?;
            let profile = Profiler::new()
                .with_outlier_threshold(config.outlier_threshold)
                .profile(&dataset)?;
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }
        Commands::Drift { current, reference } => {
            let source = FileDatasetSource::new(&config.data_root);
            let current = source.load(&current).await?;
            let reference = source.load(&reference).await?;
            let result =
                DriftDetector::new(config.significance).detect_drift(&current, &reference)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            println!("severity: {}", result.severity());
        }
    }

    Ok(())
}
