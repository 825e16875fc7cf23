//! HTTP serving layer
//!
//! Decodes request bodies, forwards them to the deployment's dispatcher and
//! encodes the result. All prediction semantics live in [`crate::inference`].

pub mod handlers;
pub mod middleware;
pub mod routes;

use crate::config::Config;
use crate::deployment::DeploymentId;
use crate::error::Result;
use crate::inference::InferenceDispatcher;
use crate::metrics::MetricsCollector;
use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// API server state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub dispatchers: Arc<BTreeMap<DeploymentId, InferenceDispatcher>>,
    pub metrics: Arc<MetricsCollector>,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config, dispatchers: Vec<InferenceDispatcher>) -> Self {
        let dispatchers = dispatchers
            .into_iter()
            .map(|dispatcher| (dispatcher.spec().id, dispatcher))
            .collect();
        Self {
            dispatchers: Arc::new(dispatchers),
            metrics: Arc::new(MetricsCollector::new()),
            config,
        }
    }

    pub fn dispatcher(&self, id: DeploymentId) -> Option<&InferenceDispatcher> {
        self.dispatchers.get(&id)
    }

    /// Whether every served deployment has a Ready model
    pub fn all_models_ready(&self) -> bool {
        self.dispatchers.values().all(|d| d.model().is_ready())
    }
}

/// Register state, body limits and routes on an app or scope
pub fn configure(state: AppState) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg| {
        let deployments: Vec<DeploymentId> = state.dispatchers.keys().copied().collect();
        cfg.app_data(web::PayloadConfig::new(state.config.server.max_body_bytes))
            .app_data(web::Data::new(state));
        routes::configure_routes(cfg, &deployments);
    }
}

/// Start the API server
pub async fn start_server(state: AppState) -> Result<()> {
    let enable_cors = state.config.server.enable_cors;
    let workers = state.config.server.workers;
    let log_requests = state.config.logging.log_requests;
    let bind_address = state.config.server_address();
    info!("Starting API server on {}", bind_address);
    for dispatcher in state.dispatchers.values() {
        let spec = dispatcher.spec();
        info!(
            "  POST {} -> {} ({})",
            spec.route,
            spec.title,
            dispatcher.model().status()
        );
    }

    let mut server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(actix_web::middleware::Condition::new(enable_cors, cors))
            .wrap(middleware::logging::RequestLogging::new(log_requests))
            .configure(configure(state.clone()))
    });
    if let Some(workers) = workers {
        server = server.workers(workers);
    }

    server.bind(&bind_address)?.run().await?;
    Ok(())
}
