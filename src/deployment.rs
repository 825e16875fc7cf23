//! Built-in deployment definitions
//!
//! Each deployment ties one schema to one model artifact and one response
//! shape. They are declared together so the field order a model was trained
//! on cannot drift away from the schema used to build its input rows.

use crate::schema::SchemaDescriptor;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a missing-field failure is worded in the response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingFieldReport {
    /// `Missing input fields: a, b`
    All,
    /// `Missing field: a`, naming only the first missing field
    First,
}

/// Shape of a successful prediction
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputKind {
    /// Continuous value rounded to `decimals`, with a fixed annotation
    Regression {
        decimals: u32,
        message: Option<&'static str>,
    },
    /// Integer label; annotation picked by whether the label is non-zero
    Classification {
        messages: Option<LabelMessages>,
    },
}

/// Annotation pair for a binary classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelMessages {
    pub positive: &'static str,
    pub negative: &'static str,
}

impl LabelMessages {
    pub fn for_label(&self, label: i64) -> &'static str {
        if label != 0 {
            self.positive
        } else {
            self.negative
        }
    }
}

/// Identifier of one of the built-in deployments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentId {
    Battery,
    Collision,
    Maintenance,
}

impl DeploymentId {
    pub const ALL: [DeploymentId; 3] = [
        DeploymentId::Battery,
        DeploymentId::Collision,
        DeploymentId::Maintenance,
    ];

    pub fn spec(self) -> &'static DeploymentSpec {
        match self {
            DeploymentId::Battery => &BATTERY,
            DeploymentId::Collision => &COLLISION,
            DeploymentId::Maintenance => &MAINTENANCE,
        }
    }

    pub fn as_str(self) -> &'static str {
        self.spec().schema.name()
    }
}

impl fmt::Display for DeploymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static description of one prediction deployment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeploymentSpec {
    pub id: DeploymentId,
    pub title: &'static str,
    /// HTTP route serving this deployment
    pub route: &'static str,
    pub schema: SchemaDescriptor,
    /// Default artifact location, relative to the working directory
    pub default_artifact: &'static str,
    /// Response key holding the prediction
    pub output_field: &'static str,
    pub output: OutputKind,
    pub missing_fields: MissingFieldReport,
}

/// Battery usage regression
pub static BATTERY: DeploymentSpec = DeploymentSpec {
    id: DeploymentId::Battery,
    title: "Battery Usage Prediction",
    route: "/predict_battery",
    schema: SchemaDescriptor::new("battery", &["speed", "distance", "temperature"]),
    default_artifact: "models/battery_model.json",
    output_field: "battery_used",
    output: OutputKind::Regression {
        decimals: 2,
        message: Some("⚡ Battery usage estimated successfully!"),
    },
    missing_fields: MissingFieldReport::All,
};

/// Collision detection from accelerometer and GPS readings
pub static COLLISION: DeploymentSpec = DeploymentSpec {
    id: DeploymentId::Collision,
    title: "Collision Detection",
    route: "/predict",
    schema: SchemaDescriptor::new("collision", &["x_accel", "y_accel", "z_accel", "gps_speed"]),
    default_artifact: "models/collision_model.json",
    output_field: "collision_detected",
    output: OutputKind::Classification { messages: None },
    missing_fields: MissingFieldReport::First,
};

/// Predictive maintenance classification
pub static MAINTENANCE: DeploymentSpec = DeploymentSpec {
    id: DeploymentId::Maintenance,
    title: "Predictive Maintenance",
    route: "/predict_maintenance",
    schema: SchemaDescriptor::new(
        "maintenance",
        &["engine_temp", "brake_status", "battery_level", "fuel_level"],
    ),
    default_artifact: "models/maintenance_model.json",
    output_field: "vehicle_failure",
    output: OutputKind::Classification {
        messages: Some(LabelMessages {
            positive: "Failure expected!",
            negative: "Vehicle is healthy!",
        }),
    },
    missing_fields: MissingFieldReport::First,
};
