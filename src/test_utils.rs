//! Test utilities and helpers
//!
//! Shared by unit and integration tests: one-time tracing setup and small,
//! hand-checkable model artifacts for every deployment.

use crate::config::Config;
use crate::deployment::DeploymentId;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Once;

/// Global test initialization
static TEST_INIT: Once = Once::new();

/// Initialize test environment once for all tests
pub fn init_test_env() {
    TEST_INIT.call_once(|| {
        // Ignore the error if another test already installed a subscriber
        let _ = tracing_subscriber::fmt()
            .with_env_filter("error")
            .with_test_writer()
            .try_init();
    });
}

/// `0.05*speed + 0.1*distance + 0.02*temperature + 1.0`
pub fn battery_artifact() -> Value {
    json!({
        "kind": "linear_regression",
        "coefficients": [0.05, 0.1, 0.02],
        "intercept": 1.0,
        "feature_names": ["speed", "distance", "temperature"]
    })
}

/// Predicts a collision when `z_accel > 10.5`, unless both trees disagree
pub fn collision_artifact() -> Value {
    json!({
        "kind": "random_forest_classifier",
        "n_features": 4,
        "classes": [0, 1],
        "feature_names": ["x_accel", "y_accel", "z_accel", "gps_speed"],
        "trees": [
            {"nodes": [
                {"feature": 2, "threshold": 10.5, "left": 1, "right": 2},
                {"value": [5.0, 0.0]},
                {"value": [0.0, 5.0]}
            ]},
            {"nodes": [
                {"feature": 3, "threshold": 5.0, "left": 1, "right": 2},
                {"value": [3.0, 1.0]},
                {"value": [1.0, 3.0]}
            ]}
        ]
    })
}

/// Predicts failure when `engine_temp > 100` or `battery_level <= 30`
pub fn maintenance_artifact() -> Value {
    json!({
        "kind": "random_forest_classifier",
        "n_features": 4,
        "classes": [0, 1],
        "feature_names": ["engine_temp", "brake_status", "battery_level", "fuel_level"],
        "trees": [
            {"nodes": [
                {"feature": 0, "threshold": 100.0, "left": 1, "right": 4},
                {"feature": 2, "threshold": 30.0, "left": 2, "right": 3},
                {"value": [1.0, 3.0]},
                {"value": [4.0, 0.0]},
                {"value": [0.0, 6.0]}
            ]}
        ]
    })
}

/// Fixture artifact for a deployment
pub fn artifact_for(id: DeploymentId) -> Value {
    match id {
        DeploymentId::Battery => battery_artifact(),
        DeploymentId::Collision => collision_artifact(),
        DeploymentId::Maintenance => maintenance_artifact(),
    }
}

/// Write every fixture artifact into `dir` and return a config pointing at them
pub fn write_fixture_models(dir: &Path) -> Config {
    let mut config = Config::default();
    config.logging.log_predictions = false;
    for id in DeploymentId::ALL {
        let path = dir.join(format!("{}_model.json", id));
        let body = serde_json::to_vec_pretty(&artifact_for(id)).expect("fixture serializes");
        std::fs::write(&path, body).expect("fixture is writable");
        config.deployments.get_mut(id).artifact_path = path;
    }
    config
}
