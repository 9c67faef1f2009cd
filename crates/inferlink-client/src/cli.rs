//! Command-line interface definition.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::Level;

use inferlink_core::{DEFAULT_PREDICTION_HORIZON, SensorReading, TracingConfig, TrajectoryPoint};

use crate::config::ClientConfig;

/// inferlink - route inference requests to a remote model server
#[derive(Debug, Parser)]
#[command(name = "inferlink")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "INFERLINK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Server endpoint (overrides the config file)
    #[arg(long, env = "INFERLINK_ENDPOINT", global = true)]
    pub endpoint: Option<String>,

    /// Request timeout in milliseconds (overrides the config file)
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    /// Enable debug output
    #[arg(long, short = 'v', global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Tracing setup for this invocation.
    ///
    /// Debug output is on when either `-v` or the config file's `debug`
    /// asks for it.
    pub fn tracing_config(&self, config: &ClientConfig) -> TracingConfig {
        let debug = self.debug || config.debug;
        match self.command {
            Command::Server { .. } if debug => TracingConfig::server().with_level(Level::DEBUG),
            Command::Server { .. } => TracingConfig::server(),
            _ => TracingConfig::cli(debug),
        }
    }
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Predict future positions from a position history
    Trajectory {
        /// History point as `x,y` (repeat, oldest first)
        #[arg(long = "point", required = true, value_parser = parse_point)]
        points: Vec<TrajectoryPoint>,

        /// Number of positions to predict
        #[arg(long, default_value_t = DEFAULT_PREDICTION_HORIZON)]
        horizon: usize,
    },

    /// Score sensor readings for anomalies
    Anomaly {
        /// Readings as `name=v1,v2,...` (repeat per sensor)
        #[arg(long = "sensor", required = true, value_parser = parse_reading)]
        sensors: Vec<SensorReading>,
    },

    /// Detect objects in a frame
    Objects {
        /// Frame identifier
        #[arg(long)]
        frame_id: String,

        /// Simulate a busier scene
        #[arg(long)]
        complex: bool,
    },

    /// Fuse sensor liveness into an overall confidence
    Fusion {
        /// Sensor state as `name=on` or `name=off` (repeat per sensor)
        #[arg(long = "sensor", required = true, value_parser = parse_sensor_state)]
        sensors: Vec<(String, bool)>,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Run the reference inference server in the foreground
    Server {
        /// Address to listen on
        #[arg(long, default_value = inferlink_server::DEFAULT_BIND_ADDR)]
        bind: SocketAddr,

        /// Answer without echoing request ids
        #[arg(long)]
        no_echo_request_id: bool,
    },
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Validate configuration
    Validate,

    /// Show configuration file path
    Path,
}

fn parse_f64(s: &str) -> Result<f64, String> {
    s.trim()
        .parse()
        .map_err(|_| format!("{:?} is not a number", s.trim()))
}

/// Parses `x,y`.
pub fn parse_point(s: &str) -> Result<TrajectoryPoint, String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected x,y but got {:?}", s))?;
    Ok(TrajectoryPoint::new(parse_f64(x)?, parse_f64(y)?))
}

/// Parses `name=v1,v2,...`.
pub fn parse_reading(s: &str) -> Result<SensorReading, String> {
    let (name, values) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=v1,v2,... but got {:?}", s))?;
    if name.is_empty() {
        return Err("sensor name must not be empty".into());
    }
    let values = values
        .split(',')
        .filter(|v| !v.trim().is_empty())
        .map(parse_f64)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(SensorReading::new(name, values))
}

/// Parses `name=on|off`.
pub fn parse_sensor_state(s: &str) -> Result<(String, bool), String> {
    let (name, state) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=on|off but got {:?}", s))?;
    if name.is_empty() {
        return Err("sensor name must not be empty".into());
    }
    let active = match state.to_ascii_lowercase().as_str() {
        "on" | "true" | "1" => true,
        "off" | "false" | "0" => false,
        other => return Err(format!("sensor state must be on or off, got {:?}", other)),
    };
    Ok((name.to_string(), active))
}
