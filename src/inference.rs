//! Inference dispatcher
//!
//! Turns one raw request into one [`PredictionResult`]: availability check,
//! validation, prediction, then formatting. The dispatcher holds no mutable
//! state, so any number of requests can run through it concurrently.

use crate::deployment::{DeploymentSpec, MissingFieldReport, OutputKind};
use crate::error::PredictError;
use crate::models::ModelHandle;
use crate::schema::{self, NumericPolicy, RawRequest};
use actix_web::http::StatusCode;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Raw model output after formatting
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Prediction {
    /// Rounded regression output
    Value(f64),
    /// Classification label
    Label(i64),
}

impl From<Prediction> for Value {
    fn from(prediction: Prediction) -> Self {
        match prediction {
            Prediction::Value(value) => Value::from(value),
            Prediction::Label(label) => Value::from(label),
        }
    }
}

/// Outcome of a single request, independent of any other request
#[derive(Debug, Clone, PartialEq)]
pub enum PredictionResult {
    Success {
        field: &'static str,
        prediction: Prediction,
        message: Option<&'static str>,
    },
    Failure {
        status: StatusCode,
        error: String,
    },
}

impl PredictionResult {
    /// Build a failure from a pipeline error, worded per `report`
    pub fn from_error(error: &PredictError, report: MissingFieldReport) -> Self {
        let message = match (error, report) {
            (PredictError::MissingFields { fields }, MissingFieldReport::First) => {
                format!("Missing field: {}", fields.first().map(String::as_str).unwrap_or(""))
            }
            (PredictError::Inference { .. }, _)
            | (PredictError::MissingFields { .. }, _)
            | (PredictError::InvalidFields { .. }, _)
            | (PredictError::InvalidRequest { .. }, _)
            | (PredictError::PayloadTooLarge, _)
            | (PredictError::ModelUnavailable, _) => error.to_string(),
            // Anything else came from inside a predictor; keep it out of the response.
            _ => PredictError::inference("internal model error").to_string(),
        };
        PredictionResult::Failure {
            status: error.http_status(),
            error: message,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            PredictionResult::Success { .. } => StatusCode::OK,
            PredictionResult::Failure { status, .. } => *status,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PredictionResult::Success { .. })
    }

    /// JSON body sent to the client
    pub fn body(&self) -> Value {
        let mut body = Map::new();
        match self {
            PredictionResult::Success {
                field,
                prediction,
                message,
            } => {
                body.insert((*field).to_string(), Value::from(*prediction));
                if let Some(message) = message {
                    body.insert("message".to_string(), Value::from(*message));
                }
            }
            PredictionResult::Failure { error, .. } => {
                body.insert("error".to_string(), Value::from(error.as_str()));
            }
        }
        Value::Object(body)
    }
}

/// Per-deployment request pipeline
#[derive(Debug, Clone)]
pub struct InferenceDispatcher {
    spec: &'static DeploymentSpec,
    model: Arc<ModelHandle>,
    numeric: NumericPolicy,
    missing_fields: MissingFieldReport,
    log_predictions: bool,
}

impl InferenceDispatcher {
    /// Create a dispatcher using the deployment's default wording and strict typing
    pub fn new(spec: &'static DeploymentSpec, model: Arc<ModelHandle>) -> Self {
        Self {
            spec,
            model,
            numeric: NumericPolicy::Strict,
            missing_fields: spec.missing_fields,
            log_predictions: false,
        }
    }

    pub fn with_numeric_policy(mut self, policy: NumericPolicy) -> Self {
        self.numeric = policy;
        self
    }

    pub fn with_missing_field_report(mut self, report: MissingFieldReport) -> Self {
        self.missing_fields = report;
        self
    }

    pub fn with_prediction_logging(mut self, enabled: bool) -> Self {
        self.log_predictions = enabled;
        self
    }

    pub fn spec(&self) -> &'static DeploymentSpec {
        self.spec
    }

    pub fn model(&self) -> &ModelHandle {
        &self.model
    }

    pub fn missing_field_report(&self) -> MissingFieldReport {
        self.missing_fields
    }

    /// Handle one decoded request record
    pub fn handle(&self, raw: &RawRequest) -> PredictionResult {
        let deployment = self.spec.schema.name();

        if !self.model.is_ready() {
            warn!(deployment, "Rejecting request, model is not loaded");
            return self.fail(&PredictError::ModelUnavailable);
        }

        let row = match schema::validate(raw, &self.spec.schema, self.numeric) {
            Ok(row) => row,
            Err(e) => {
                debug!(deployment, "Request failed validation: {}", e);
                return self.fail(&e);
            }
        };

        let raw_output = match self.model.predict(&row) {
            Ok(value) => value,
            Err(e) => {
                warn!(deployment, "Inference failed: {}", e);
                return self.fail(&e);
            }
        };

        let result = match self.format(raw_output) {
            Ok(result) => result,
            Err(e) => {
                warn!(deployment, raw_output, "Could not format model output: {}", e);
                return self.fail(&e);
            }
        };

        if self.log_predictions {
            let input = Value::Object(row.labelled(&self.spec.schema));
            let prediction = result.body();
            info!(
                deployment,
                input = %input,
                prediction = %prediction,
                "Prediction served"
            );
        }
        result
    }

    /// Handle an arbitrary JSON document, rejecting anything but an object
    pub fn handle_value(&self, value: Value) -> PredictionResult {
        match value {
            Value::Object(raw) => self.handle(&raw),
            _ => self.fail(&PredictError::invalid_request(
                "Request body must be a JSON object",
            )),
        }
    }

    /// Failure result for `error`, worded for this deployment
    pub fn fail(&self, error: &PredictError) -> PredictionResult {
        PredictionResult::from_error(error, self.missing_fields)
    }

    fn format(&self, raw_output: f64) -> Result<PredictionResult, PredictError> {
        if !raw_output.is_finite() {
            return Err(PredictError::inference("model produced a non-finite value"));
        }
        let (prediction, message) = match self.spec.output {
            OutputKind::Regression { decimals, message } => {
                let rounded = round_to(raw_output, decimals);
                if !rounded.is_finite() {
                    return Err(PredictError::inference("model output is out of range"));
                }
                (Prediction::Value(rounded), message)
            }
            OutputKind::Classification { messages } => {
                // Truncates toward zero, like an integer cast of the label
                let label = raw_output.trunc() as i64;
                (
                    Prediction::Label(label),
                    messages.map(|m| m.for_label(label)),
                )
            }
        };
        Ok(PredictionResult::Success {
            field: self.spec.output_field,
            prediction,
            message,
        })
    }
}

/// Round half away from zero to `decimals` places
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deployment::{BATTERY, COLLISION, MAINTENANCE};
    use crate::error::Result;
    use crate::models::Predictor;
    use serde_json::json;

    /// Returns a fixed value, or the sum of the row when `fixed` is None
    struct Fixed {
        n_features: usize,
        fixed: Option<f64>,
    }

    impl Predictor for Fixed {
        fn kind(&self) -> &'static str {
            "fixed"
        }

        fn n_features(&self) -> usize {
            self.n_features
        }

        fn predict(&self, row: &[f64]) -> Result<f64> {
            Ok(self.fixed.unwrap_or_else(|| row.iter().sum()))
        }
    }

    struct Leaky;

    impl Predictor for Leaky {
        fn kind(&self) -> &'static str {
            "leaky"
        }

        fn n_features(&self) -> usize {
            3
        }

        fn predict(&self, _row: &[f64]) -> Result<f64> {
            Err(PredictError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "/secret/path/weights.bin",
            )))
        }
    }

    fn dispatcher(spec: &'static DeploymentSpec, fixed: Option<f64>) -> InferenceDispatcher {
        let predictor = Arc::new(Fixed {
            n_features: spec.schema.len(),
            fixed,
        });
        InferenceDispatcher::new(spec, Arc::new(ModelHandle::ready(spec.schema.name(), predictor)))
    }

    fn record(value: Value) -> RawRequest {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_battery_success_is_rounded_and_annotated() {
        let d = dispatcher(&BATTERY, Some(12.3456));
        let result = d.handle(&record(json!({"speed": 60, "distance": 120, "temperature": 30})));
        assert_eq!(result.status(), StatusCode::OK);
        assert_eq!(
            result.body(),
            json!({
                "battery_used": 12.35,
                "message": "⚡ Battery usage estimated successfully!"
            })
        );
    }

    #[test]
    fn test_battery_lists_all_missing_fields() {
        let d = dispatcher(&BATTERY, Some(1.0));
        let result = d.handle(&record(json!({"distance": 10})));
        assert_eq!(result.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            result.body(),
            json!({"error": "Missing input fields: speed, temperature"})
        );
    }

    #[test]
    fn test_collision_names_first_missing_field() {
        let d = dispatcher(&COLLISION, Some(1.0));
        let result = d.handle(&record(json!({"x_accel": 3.0, "y_accel": 2.5, "z_accel": 11.0})));
        assert_eq!(result.status(), StatusCode::BAD_REQUEST);
        assert_eq!(result.body(), json!({"error": "Missing field: gps_speed"}));
    }

    #[test]
    fn test_missing_field_report_override() {
        let d = dispatcher(&COLLISION, Some(1.0)).with_missing_field_report(MissingFieldReport::All);
        let result = d.handle(&record(json!({"x_accel": 3.0})));
        assert_eq!(
            result.body(),
            json!({"error": "Missing input fields: y_accel, z_accel, gps_speed"})
        );
    }

    #[test]
    fn test_collision_label_has_no_message() {
        let d = dispatcher(&COLLISION, Some(1.0));
        let result = d.handle(&record(
            json!({"x_accel": 3.0, "y_accel": 2.5, "z_accel": 11.0, "gps_speed": 10}),
        ));
        assert_eq!(result.body(), json!({"collision_detected": 1}));
    }

    #[test]
    fn test_maintenance_messages_follow_label() {
        let raw = record(json!({
            "engine_temp": 105, "brake_status": 0, "battery_level": 25, "fuel_level": 15
        }));
        let failing = dispatcher(&MAINTENANCE, Some(1.0)).handle(&raw);
        assert_eq!(
            failing.body(),
            json!({"vehicle_failure": 1, "message": "Failure expected!"})
        );
        let healthy = dispatcher(&MAINTENANCE, Some(0.0)).handle(&raw);
        assert_eq!(
            healthy.body(),
            json!({"vehicle_failure": 0, "message": "Vehicle is healthy!"})
        );
    }

    #[test]
    fn test_unavailable_model_short_circuits_validation() {
        let handle = Arc::new(ModelHandle::unavailable("battery", "file not found"));
        let d = InferenceDispatcher::new(&BATTERY, handle);
        for raw in [json!({}), json!({"speed": 1, "distance": 2, "temperature": 3})] {
            let result = d.handle(&record(raw));
            assert_eq!(result.status(), StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(result.body(), json!({"error": "Model not loaded properly"}));
        }
    }

    #[test]
    fn test_handle_is_idempotent_and_order_independent() {
        let d = dispatcher(&BATTERY, None);
        let a = record(json!({"speed": 1.5, "distance": 2, "temperature": 3}));
        let b = record(json!({"temperature": 3, "speed": 1.5, "distance": 2}));
        let first = serde_json::to_vec(&d.handle(&a).body()).unwrap();
        let second = serde_json::to_vec(&d.handle(&a).body()).unwrap();
        let reordered = serde_json::to_vec(&d.handle(&b).body()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, reordered);
    }

    #[test]
    fn test_non_numeric_values_are_rejected() {
        let d = dispatcher(&BATTERY, Some(1.0));
        let result = d.handle(&record(json!({"speed": "fast", "distance": 2, "temperature": 3})));
        assert_eq!(result.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            result.body(),
            json!({"error": "Invalid numeric value for field(s): speed"})
        );

        let lenient = dispatcher(&BATTERY, Some(1.0)).with_numeric_policy(NumericPolicy::Lenient);
        let result = lenient.handle(&record(json!({"speed": "60", "distance": 2, "temperature": 3})));
        assert!(result.is_success());
    }

    #[test]
    fn test_internal_predictor_errors_are_not_leaked() {
        let handle = Arc::new(ModelHandle::ready("battery", Arc::new(Leaky)));
        let d = InferenceDispatcher::new(&BATTERY, handle);
        let result = d.handle(&record(json!({"speed": 1, "distance": 2, "temperature": 3})));
        assert_eq!(result.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = result.body().to_string();
        assert!(!body.contains("secret"));
        assert!(body.contains("Prediction failed"));
    }

    #[test]
    fn test_non_finite_output_is_an_inference_error() {
        let d = dispatcher(&BATTERY, Some(f64::NAN));
        let result = d.handle(&record(json!({"speed": 1, "distance": 2, "temperature": 3})));
        assert_eq!(result.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_output_too_large_to_round_is_an_inference_error() {
        let d = dispatcher(&BATTERY, Some(1e308));
        let result = d.handle(&record(json!({"speed": 0, "distance": 1e308, "temperature": 0})));
        assert_eq!(result.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            result.body(),
            json!({"error": "Prediction failed: model output is out of range"})
        );
    }

    #[test]
    fn test_prediction_logging_does_not_change_result() {
        let d = dispatcher(&BATTERY, Some(2.5)).with_prediction_logging(true);
        let result = d.handle(&record(json!({"speed": 1, "distance": 2, "temperature": 3})));
        assert_eq!(result.body()["battery_used"], json!(2.5));
    }

    #[test]
    fn test_payload_too_large_is_reported_as_json() {
        let d = dispatcher(&BATTERY, Some(1.0));
        let result = d.fail(&PredictError::PayloadTooLarge);
        assert_eq!(result.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(result.body(), json!({"error": "Request body too large"}));
    }

    #[test]
    fn test_non_object_body_is_rejected() {
        let d = dispatcher(&BATTERY, Some(1.0));
        let result = d.handle_value(json!([1, 2, 3]));
        assert_eq!(result.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            result.body(),
            json!({"error": "Request body must be a JSON object"})
        );
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1.005_1, 2), 1.01);
        assert_eq!(round_to(-2.345_6, 2), -2.35);
        assert_eq!(round_to(7.0, 2), 7.0);
    }
}
