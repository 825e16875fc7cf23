//! Configuration management for the prediction service
//!
//! Settings are resolved in three layers: built-in defaults, an optional TOML
//! file, then `FLEET_PREDICT_*` environment variables.

use crate::deployment::{DeploymentId, MissingFieldReport};
use crate::error::{PredictError, Result};
use crate::schema::NumericPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "FLEET_PREDICT";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub deployments: DeploymentsConfig,
    pub validation: ValidationConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

/// Server configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Worker threads; defaults to the number of CPUs
    pub workers: Option<usize>,
    /// Allow cross-origin calls from the dashboard
    pub enable_cors: bool,
    /// Refuse to start when any enabled model fails to load
    pub require_all_models: bool,
    /// Maximum accepted JSON body in bytes
    pub max_body_bytes: usize,
}

/// Settings for one deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentConfig {
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    pub artifact_path: PathBuf,
}

fn enabled_by_default() -> bool {
    true
}

impl DeploymentConfig {
    fn for_id(id: DeploymentId) -> Self {
        Self {
            enabled: true,
            artifact_path: PathBuf::from(id.spec().default_artifact),
        }
    }
}

/// Per-deployment settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentsConfig {
    pub battery: DeploymentConfig,
    pub collision: DeploymentConfig,
    pub maintenance: DeploymentConfig,
}

impl DeploymentsConfig {
    pub fn get(&self, id: DeploymentId) -> &DeploymentConfig {
        match id {
            DeploymentId::Battery => &self.battery,
            DeploymentId::Collision => &self.collision,
            DeploymentId::Maintenance => &self.maintenance,
        }
    }

    pub fn get_mut(&mut self, id: DeploymentId) -> &mut DeploymentConfig {
        match id {
            DeploymentId::Battery => &mut self.battery,
            DeploymentId::Collision => &mut self.collision,
            DeploymentId::Maintenance => &mut self.maintenance,
        }
    }

    /// Enabled deployments in declaration order
    pub fn enabled(&self) -> impl Iterator<Item = (DeploymentId, &DeploymentConfig)> {
        DeploymentId::ALL
            .into_iter()
            .map(|id| (id, self.get(id)))
            .filter(|(_, config)| config.enabled)
    }
}

/// Wording of missing-field errors across deployments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingFieldsMode {
    /// Each deployment keeps its own wording
    #[default]
    Deployment,
    All,
    First,
}

impl MissingFieldsMode {
    pub fn resolve(self, deployment_default: MissingFieldReport) -> MissingFieldReport {
        match self {
            MissingFieldsMode::Deployment => deployment_default,
            MissingFieldsMode::All => MissingFieldReport::All,
            MissingFieldsMode::First => MissingFieldReport::First,
        }
    }
}

/// Request validation settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub missing_fields: MissingFieldsMode,
    pub numeric: NumericPolicy,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
    /// Log every HTTP request
    pub log_requests: bool,
    /// Log the input and output of every served prediction
    pub log_predictions: bool,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            workers: None,
            enable_cors: false,
            require_all_models: false,
            max_body_bytes: 64 * 1024,
        }
    }
}

impl Default for DeploymentsConfig {
    fn default() -> Self {
        Self {
            battery: DeploymentConfig::for_id(DeploymentId::Battery),
            collision: DeploymentConfig::for_id(DeploymentId::Collision),
            maintenance: DeploymentConfig::for_id(DeploymentId::Maintenance),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            log_requests: true,
            log_predictions: true,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Config {
    /// Defaults, then the optional file, then the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::read_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Self::read_file(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PredictError::config(format!("Failed to read config file: {}", e)))?;
        toml::from_str(&content)
            .map_err(|e| PredictError::config(format!("Failed to parse config file: {}", e)))
    }

    /// Override settings from `FLEET_PREDICT_*` variables supplied by `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}_{name}"));

        if let Some(host) = var("HOST") {
            self.server.host = host;
        }
        if let Some(port) = var("PORT") {
            self.server.port = parse(&port, "port number")?;
        }
        if let Some(workers) = var("WORKERS") {
            self.server.workers = Some(parse(&workers, "worker count")?);
        }
        if let Some(flag) = var("ENABLE_CORS") {
            self.server.enable_cors = parse(&flag, "CORS flag")?;
        }
        if let Some(flag) = var("REQUIRE_ALL_MODELS") {
            self.server.require_all_models = parse(&flag, "require-all-models flag")?;
        }

        for id in DeploymentId::ALL {
            let prefix = id.as_str().to_uppercase();
            let deployment = self.deployments.get_mut(id);
            if let Some(path) = var(&format!("{prefix}_MODEL_PATH")) {
                deployment.artifact_path = PathBuf::from(path);
            }
            if let Some(flag) = var(&format!("{prefix}_ENABLED")) {
                deployment.enabled = parse(&flag, "deployment enabled flag")?;
            }
        }

        if let Some(mode) = var("MISSING_FIELDS") {
            self.validation.missing_fields = parse_enum(&mode, "missing-fields mode")?;
        }
        if let Some(policy) = var("NUMERIC") {
            self.validation.numeric = parse_enum(&policy, "numeric policy")?;
        }

        if let Some(level) = var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Some(flag) = var("LOG_REQUESTS") {
            self.logging.log_requests = parse(&flag, "log-requests flag")?;
        }
        if let Some(flag) = var("LOG_PREDICTIONS") {
            self.logging.log_predictions = parse(&flag, "log-predictions flag")?;
        }
        if let Some(flag) = var("METRICS_ENABLED") {
            self.metrics.enabled = parse(&flag, "metrics flag")?;
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(PredictError::config("Server port cannot be 0"));
        }
        if self.server.workers == Some(0) {
            return Err(PredictError::config("Worker count must be greater than 0"));
        }
        if self.server.max_body_bytes == 0 {
            return Err(PredictError::config("Maximum body size must be greater than 0"));
        }
        if self.deployments.enabled().next().is_none() {
            return Err(PredictError::config("At least one deployment must be enabled"));
        }
        for (id, deployment) in self.deployments.enabled() {
            if deployment.artifact_path.as_os_str().is_empty() {
                return Err(PredictError::config(format!(
                    "Artifact path for '{}' cannot be empty",
                    id
                )));
            }
        }
        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(PredictError::config(
                "Log level must be one of: trace, debug, info, warn, error",
            ));
        }
        if !["json", "pretty"].contains(&self.logging.format.as_str()) {
            return Err(PredictError::config("Log format must be one of: json, pretty"));
        }
        Ok(())
    }

    /// Get the full server address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse<T: std::str::FromStr>(value: &str, what: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| PredictError::config(format!("Invalid {}: {}", what, value)))
}

fn parse_enum<T: serde::de::DeserializeOwned>(value: &str, what: &str) -> Result<T> {
    serde_json::from_value(serde_json::Value::String(value.trim().to_lowercase()))
        .map_err(|_| PredictError::config(format!("Invalid {}: {}", what, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 5000);
        assert!(!config.server.enable_cors);
        assert_eq!(config.deployments.enabled().count(), 3);
        assert_eq!(
            config.deployments.battery.artifact_path,
            PathBuf::from("models/battery_model.json")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.deployments.battery.enabled = false;
        config.deployments.collision.enabled = false;
        config.deployments.maintenance.enabled = false;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env(env(&[
                ("FLEET_PREDICT_PORT", "5002"),
                ("FLEET_PREDICT_BATTERY_MODEL_PATH", "/srv/battery.json"),
                ("FLEET_PREDICT_COLLISION_ENABLED", "false"),
                ("FLEET_PREDICT_MISSING_FIELDS", "all"),
                ("FLEET_PREDICT_NUMERIC", "Lenient"),
                ("FLEET_PREDICT_ENABLE_CORS", "true"),
                ("FLEET_PREDICT_LOG_REQUESTS", "false"),
            ]))
            .unwrap();

        assert!(config.server.enable_cors);
        assert!(!config.logging.log_requests);

        assert_eq!(config.server.port, 5002);
        assert_eq!(
            config.deployments.battery.artifact_path,
            PathBuf::from("/srv/battery.json")
        );
        assert!(!config.deployments.collision.enabled);
        assert_eq!(config.validation.missing_fields, MissingFieldsMode::All);
        assert_eq!(config.validation.numeric, NumericPolicy::Lenient);
    }

    #[test]
    fn test_env_rejects_bad_values() {
        let mut config = Config::default();
        assert!(config
            .apply_env(env(&[("FLEET_PREDICT_PORT", "not-a-port")]))
            .is_err());
        assert!(config
            .apply_env(env(&[("FLEET_PREDICT_NUMERIC", "sometimes")]))
            .is_err());
    }

    #[test]
    fn test_partial_toml_file() {
        let config: Config = toml::from_str(
            r#"
            [server]
            port = 5002

            [deployments.maintenance]
            enabled = false
            artifact_path = "other/maintenance.json"

            [validation]
            missing_fields = "first"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 5002);
        assert_eq!(config.server.host, "127.0.0.1");
        assert!(!config.deployments.maintenance.enabled);
        assert!(config.deployments.battery.enabled);
        assert_eq!(
            config.validation.missing_fields.resolve(MissingFieldReport::All),
            MissingFieldReport::First
        );
    }

    #[test]
    fn test_missing_fields_mode_defaults_to_deployment() {
        let mode = MissingFieldsMode::default();
        assert_eq!(mode.resolve(MissingFieldReport::All), MissingFieldReport::All);
        assert_eq!(mode.resolve(MissingFieldReport::First), MissingFieldReport::First);
    }

    #[test]
    fn test_server_address() {
        let config = Config::default();
        assert_eq!(config.server_address(), "127.0.0.1:5000");
    }
}
