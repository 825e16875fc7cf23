//! HTTP request handlers for API endpoints

use super::AppState;
use crate::deployment::DeploymentId;
use crate::error::{ErrorResponse, PredictError};
use crate::models::ModelStatus;
use actix_web::{http::StatusCode, web, HttpResponse};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::error;

/// Handler for POST on a deployment's prediction route
pub async fn predict(
    data: web::Data<AppState>,
    deployment: DeploymentId,
    body: Result<web::Bytes, actix_web::Error>,
) -> HttpResponse {
    let start = Instant::now();
    let Some(dispatcher) = data.dispatcher(deployment) else {
        error!(%deployment, "Route registered without a dispatcher");
        return not_found().await;
    };

    let result = match body {
        Ok(body) => match serde_json::from_slice(&body) {
            Ok(value) => dispatcher.handle_value(value),
            Err(e) => dispatcher.fail(&PredictError::invalid_request(format!(
                "Invalid JSON payload: {}",
                e
            ))),
        },
        Err(e) => dispatcher.fail(&payload_error(e)),
    };

    data.metrics.record(deployment, result.status(), start.elapsed());
    HttpResponse::build(result.status()).json(result.body())
}

/// Map a body extraction failure onto the pipeline's error kinds
fn payload_error(error: actix_web::Error) -> PredictError {
    if error.error_response().status() == StatusCode::PAYLOAD_TOO_LARGE {
        PredictError::PayloadTooLarge
    } else {
        PredictError::invalid_request(format!("Invalid request body: {}", error))
    }
}

/// Handler for GET /
pub async fn index(data: web::Data<AppState>) -> HttpResponse {
    let mut text = String::from("🚗 Fleet prediction API is running!\n");
    for dispatcher in data.dispatchers.values() {
        let spec = dispatcher.spec();
        text.push_str(&format!("POST {} - {}\n", spec.route, spec.title));
    }
    HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body(text)
}

/// Readiness of one model, as reported by /health
#[derive(Debug, Serialize)]
pub struct ModelHealth {
    pub status: ModelStatus,
    pub route: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Body of the /health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub models: BTreeMap<DeploymentId, ModelHealth>,
}

/// Handler for GET /health
pub async fn health_check(data: web::Data<AppState>) -> HttpResponse {
    let models = data
        .dispatchers
        .iter()
        .map(|(id, dispatcher)| {
            let model = dispatcher.model();
            let health = ModelHealth {
                status: model.status(),
                route: dispatcher.spec().route,
                reason: model.unavailable_reason().map(str::to_string),
            };
            (*id, health)
        })
        .collect();

    if data.all_models_ready() {
        HttpResponse::Ok().json(HealthResponse {
            status: "healthy",
            version: crate::VERSION,
            models,
        })
    } else {
        HttpResponse::ServiceUnavailable().json(HealthResponse {
            status: "degraded",
            version: crate::VERSION,
            models,
        })
    }
}

/// Handler for GET /metrics (Prometheus text format)
pub async fn metrics(data: web::Data<AppState>) -> HttpResponse {
    if !data.config.metrics.enabled {
        return HttpResponse::NotFound().json(ErrorResponse {
            error: "Metrics endpoint is disabled".to_string(),
        });
    }

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4; charset=utf-8")
        .body(data.metrics.render_prometheus())
}

/// Default 404 handler
pub async fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(ErrorResponse {
        error: "The requested endpoint was not found".to_string(),
    })
}
