//! `atserver`: serve the demonstration AT command set over TCP.

use std::path::PathBuf;
use std::process::ExitCode;

use atserver_runner::{register_demo_commands, RunnerConfig, RunnerResult, TcpAtServer, SERVER_CLIENT};
use clap::Parser;
use tracing::{error, info};

/// AT command server.
#[derive(Parser, Debug)]
#[command(name = "atserver")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overriding the configuration file.
    #[arg(short, long)]
    listen: Option<String>,

    /// Default log filter when RUST_LOG is not set.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Broadcast `+TICK` every N seconds, overriding the configuration file.
    #[arg(long)]
    tick: Option<u64>,
}

fn init_logging(default_filter: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

async fn run(args: Args) -> RunnerResult<()> {
    let mut config = match &args.config {
        Some(path) => RunnerConfig::load(path)?,
        None => RunnerConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    if let Some(secs) = args.tick {
        config.unsolicited_interval_secs = Some(secs);
    }

    atserver::metrics::describe_metrics();

    let mut server = TcpAtServer::bind(config).await?;
    register_demo_commands(server.server_mut(), SERVER_CLIENT)?;
    info!(
        "Serving {} commands on {}",
        server.server_mut().command_count(),
        server.local_addr()?
    );

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
            }
        })
        .await
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args.log_level);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
