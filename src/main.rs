//! Main entry point for Fleet Predict
//!
//! Loads the configuration, loads every enabled model once and starts the
//! HTTP server.

use clap::Parser;
use fleet_predict::{
    api::{start_server, AppState},
    config::Config,
    error::Result,
    load_deployments,
    utils::{format_duration, init_logging},
    VERSION,
};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info};

/// Prediction-serving service for vehicle telemetry models
#[derive(Debug, Parser)]
#[command(name = "fleet-predict", version, about)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "FLEET_PREDICT_CONFIG")]
    config: Option<PathBuf>,
}

#[actix_web::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return Err(e);
        }
    };

    if let Err(e) = init_logging(&config.logging.level, &config.logging.format) {
        eprintln!("Failed to initialize logging: {}", e);
        return Err(e);
    }

    print_banner();

    info!("Starting Fleet Predict with configuration:");
    info!("  Server: {}:{}", config.server.host, config.server.port);
    info!("  CORS: {}", config.server.enable_cors);
    info!("  Metrics: {}", config.metrics.enabled);
    for (id, deployment) in config.deployments.enabled() {
        info!("  Model {}: {}", id, deployment.artifact_path.display());
    }

    info!("Loading models...");
    let start_time = Instant::now();
    let dispatchers = match load_deployments(&config) {
        Ok(dispatchers) => dispatchers,
        Err(e) => {
            error!("Failed to load models: {}", e);
            return Err(e);
        }
    };
    info!("Models loaded in {}", format_duration(start_time.elapsed()));

    let state = AppState::new(config, dispatchers);
    if let Err(e) = start_server(state).await {
        error!("Server error: {}", e);
        return Err(e);
    }

    info!("Shutdown complete");
    Ok(())
}

/// Print the startup banner
fn print_banner() {
    println!();
    println!("  🚗 Fleet Predict v{}", VERSION);
    println!("  Battery usage, collision and maintenance prediction API");
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse_config_path() {
        let args = Args::parse_from(["fleet-predict", "--config", "fleet.toml"]);
        assert_eq!(args.config, Some(PathBuf::from("fleet.toml")));
    }

    #[test]
    fn test_args_config_is_optional() {
        let args = Args::try_parse_from(["fleet-predict"]).unwrap();
        // May be picked up from FLEET_PREDICT_CONFIG in the environment
        let _ = args.config;
    }
}
