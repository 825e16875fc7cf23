//! # Fleet Predict
//!
//! Serves point predictions from pre-trained vehicle telemetry models.
//!
//! Each deployment loads one model artifact at startup, validates incoming
//! JSON records against a fixed ordered schema, runs inference and replies
//! with a JSON body. Three deployments are built in:
//!
//! - `battery`: battery usage regression (`POST /predict_battery`)
//! - `collision`: collision detection (`POST /predict`)
//! - `maintenance`: vehicle failure prediction (`POST /predict_maintenance`)

pub mod api;
pub mod config;
pub mod deployment;
pub mod error;
pub mod inference;
pub mod metrics;
pub mod models;
pub mod schema;
pub mod utils;

#[doc(hidden)]
pub mod test_utils;

pub use config::Config;
pub use deployment::{DeploymentId, DeploymentSpec};
pub use error::{PredictError, Result};
pub use inference::{InferenceDispatcher, Prediction, PredictionResult};
pub use models::{ModelArtifact, ModelHandle, ModelStatus, Predictor};
pub use schema::{NumericPolicy, RawRequest, SchemaDescriptor, ValidatedRow};

use std::sync::Arc;
use tracing::{error, warn};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Load the model of every enabled deployment and build its dispatcher.
///
/// Each artifact is loaded exactly once. A deployment whose artifact fails to
/// load keeps serving "model unavailable" errors, unless
/// `server.require_all_models` is set, in which case the first failure is
/// returned instead.
pub fn load_deployments(config: &Config) -> Result<Vec<InferenceDispatcher>> {
    let mut dispatchers = Vec::new();

    for (id, deployment) in config.deployments.enabled() {
        let spec = id.spec();
        let mut handle = ModelHandle::new(spec.schema.name());

        if let Err(e) = handle.load(&deployment.artifact_path, &spec.schema) {
            if config.server.require_all_models {
                error!(deployment = %id, "Refusing to start: {}", e);
                return Err(e);
            }
            warn!(
                deployment = %id,
                route = spec.route,
                "Serving without a model, requests will fail until restart"
            );
        }

        let dispatcher = InferenceDispatcher::new(spec, Arc::new(handle))
            .with_numeric_policy(config.validation.numeric)
            .with_missing_field_report(config.validation.missing_fields.resolve(spec.missing_fields))
            .with_prediction_logging(config.logging.log_predictions);
        dispatchers.push(dispatcher);
    }

    Ok(dispatchers)
}
