//! inferlink CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use tracing::debug;

use inferlink_client::cli::{Cli, Command, ConfigAction};
use inferlink_client::commands::{self, infer::Inference};
use inferlink_client::config::ClientConfig;
use inferlink_client::error::ClientResult;
use inferlink_core::{ObjectDetectionInput, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Loaded before tracing so the file's `debug` flag can raise verbosity.
    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_tracing(cli.tracing_config(&config)) {
        eprintln!("warning: {}", e);
    }

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> ClientResult<ClientConfig> {
    match cli.config {
        Some(ref path) => ClientConfig::load_from(path),
        None => ClientConfig::load(),
    }
}

async fn run(cli: Cli, mut config: ClientConfig) -> ClientResult<()> {
    if let Some(endpoint) = cli.endpoint {
        config.connection.endpoint = endpoint;
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.connection.request_timeout_ms = timeout_ms;
    }
    debug!(?config, "Configuration loaded");

    let inference = match cli.command {
        Command::Config { action } => {
            return match action {
                ConfigAction::Dump => commands::config::dump(&config),
                ConfigAction::Validate => commands::config::validate(&config),
                ConfigAction::Path => commands::config::path(),
            };
        }
        Command::Server {
            bind,
            no_echo_request_id,
        } => return commands::server::run(bind, !no_echo_request_id).await,
        Command::Trajectory { points, horizon } => Inference::trajectory(points, horizon),
        Command::Anomaly { sensors } => Inference::Anomaly(sensors),
        Command::Objects { frame_id, complex } => {
            Inference::Objects(ObjectDetectionInput::new(frame_id).with_complex(complex))
        }
        Command::Fusion { sensors } => Inference::fusion(sensors),
    };

    // One request per process; heartbeats would never fire.
    let settings = config.to_settings()?.with_heartbeat_interval(None);
    commands::infer::run(settings, inference).await
}
