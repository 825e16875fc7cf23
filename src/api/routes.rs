//! Route configuration for the API endpoints

use super::{handlers, AppState};
use crate::deployment::DeploymentId;
use actix_web::web;

/// Configure all API routes
pub fn configure_routes(cfg: &mut web::ServiceConfig, deployments: &[DeploymentId]) {
    for &deployment in deployments {
        cfg.route(
            deployment.spec().route,
            web::post().to(
                move |data: web::Data<AppState>, body: Result<web::Bytes, actix_web::Error>| {
                    handlers::predict(data, deployment, body)
                },
            ),
        );
    }

    cfg.route("/", web::get().to(handlers::index))
        .route("/health", web::get().to(handlers::health_check))
        .route("/metrics", web::get().to(handlers::metrics))
        .default_service(web::route().to(handlers::not_found));
}
