mod api_client;
mod config;
mod database;
mod error;
mod history;
mod logging;
mod model;
mod runner;
mod sink;

use clap::{Parser, Subcommand};
use config::Config;
use error::Error;
use log::{error, info};
use std::path::Path;
use std::time::Duration;

const DEFAULT_SCHEDULE_SECS: u64 = 60;

#[derive(Parser)]
struct Args {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract once and exit
    Run,

    /// Extract on a fixed interval until stopped
    Schedule {
        #[arg(
            long,
            default_value_t = DEFAULT_SCHEDULE_SECS,
            value_parser = clap::value_parser!(u64).range(1..),
            help = "Seconds between two runs"
        )]
        every_secs: u64,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Error> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let log_file = logging::init(Path::new(&args.config.log_dir))?;
    info!("Logging to {}", log_file.display());

    match args.command {
        Command::Run => {
            if let Err(err) = runner::run_once(&args.config).await {
                error!("failed to extract ads data: {}", err);
                std::process::exit(1);
            }
        }
        Command::Schedule { every_secs } => {
            runner::schedule(args.config, Duration::from_secs(every_secs)).await?;
        }
    };

    Ok(())
}
