//! Model artifacts and the model handle lifecycle
//!
//! Artifacts are produced offline by the training pipeline and exported as
//! JSON. A [`ModelHandle`] loads one artifact exactly once at startup and is
//! read-only afterwards, so it can be shared across workers without locking.

use crate::error::{PredictError, Result};
use crate::schema::{SchemaDescriptor, ValidatedRow};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// Inference capability of a loaded artifact
pub trait Predictor: Send + Sync {
    /// Short estimator name for logs and health output
    fn kind(&self) -> &'static str;

    /// Number of input columns the estimator was fitted on
    fn n_features(&self) -> usize;

    /// Column names recorded at training time, if the exporter kept them
    fn feature_names(&self) -> Option<&[String]> {
        None
    }

    /// Predict a single row. `row` must already be in training column order.
    fn predict(&self, row: &[f64]) -> Result<f64>;
}

/// Serialized artifact formats understood by the service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelArtifact {
    LinearRegression(LinearRegression),
    DecisionTreeClassifier(DecisionTreeClassifier),
    RandomForestClassifier(RandomForestClassifier),
}

impl ModelArtifact {
    /// Read and structurally check an artifact file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .map_err(|e| PredictError::load(format!("{}: {}", path.display(), e)))?;
        let artifact: Self = serde_json::from_reader(std::io::BufReader::new(file))
            .map_err(|e| PredictError::load(format!("{}: {}", path.display(), e)))?;
        artifact.check()?;
        Ok(artifact)
    }

    fn check(&self) -> Result<()> {
        match self {
            ModelArtifact::LinearRegression(model) => model.check(),
            ModelArtifact::DecisionTreeClassifier(model) => model.check(),
            ModelArtifact::RandomForestClassifier(model) => model.check(),
        }
    }

    fn into_predictor(self) -> Arc<dyn Predictor> {
        match self {
            ModelArtifact::LinearRegression(model) => Arc::new(model),
            ModelArtifact::DecisionTreeClassifier(model) => Arc::new(model),
            ModelArtifact::RandomForestClassifier(model) => Arc::new(model),
        }
    }
}

/// Ordinary least squares regressor: `intercept + coefficients · row`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearRegression {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_names: Option<Vec<String>>,
}

impl LinearRegression {
    fn check(&self) -> Result<()> {
        if self.coefficients.is_empty() {
            return Err(PredictError::load("linear model has no coefficients"));
        }
        if !self.intercept.is_finite() || self.coefficients.iter().any(|c| !c.is_finite()) {
            return Err(PredictError::load("linear model has non-finite parameters"));
        }
        check_feature_names(self.feature_names.as_deref(), self.coefficients.len())
    }
}

impl Predictor for LinearRegression {
    fn kind(&self) -> &'static str {
        "linear_regression"
    }

    fn n_features(&self) -> usize {
        self.coefficients.len()
    }

    fn feature_names(&self) -> Option<&[String]> {
        self.feature_names.as_deref()
    }

    fn predict(&self, row: &[f64]) -> Result<f64> {
        check_row(row, self.n_features())?;
        let value = self.intercept
            + self
                .coefficients
                .iter()
                .zip(row)
                .map(|(c, x)| c * x)
                .sum::<f64>();
        finite(value)
    }
}

/// Flat-array decision tree node. The root is at index 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    /// Go left when `row[feature] <= threshold`
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    /// Class weights at this leaf, one per entry in `classes`
    Leaf { value: Vec<f64> },
}

/// A single fitted classification tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<TreeNode>,
}

impl Tree {
    fn check(&self, n_features: usize, n_classes: usize) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(PredictError::load("tree has no nodes"));
        }
        for (index, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= n_features {
                        return Err(PredictError::load(format!(
                            "node {index} splits on feature {feature}, model has {n_features}"
                        )));
                    }
                    if *left >= self.nodes.len() || *right >= self.nodes.len() {
                        return Err(PredictError::load(format!(
                            "node {index} has a child index out of range"
                        )));
                    }
                    if threshold.is_nan() {
                        return Err(PredictError::load(format!("node {index} threshold is NaN")));
                    }
                }
                TreeNode::Leaf { value } => {
                    if value.len() != n_classes {
                        return Err(PredictError::load(format!(
                            "leaf {index} has {} class weights, expected {n_classes}",
                            value.len()
                        )));
                    }
                    if value.iter().any(|w| !w.is_finite() || *w < 0.0) {
                        return Err(PredictError::load(format!(
                            "leaf {index} has invalid class weights"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Class weights of the leaf `row` falls into
    fn leaf(&self, row: &[f64]) -> Result<&[f64]> {
        let mut index = 0;
        // A well-formed tree reaches a leaf in fewer steps than it has nodes.
        for _ in 0..self.nodes.len() {
            match &self.nodes[index] {
                TreeNode::Leaf { value } => return Ok(value),
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
        Err(PredictError::inference("tree traversal did not reach a leaf"))
    }

    /// Leaf weights normalised to a probability distribution
    fn proba(&self, row: &[f64]) -> Result<Vec<f64>> {
        let weights = self.leaf(row)?;
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return Ok(vec![0.0; weights.len()]);
        }
        Ok(weights.iter().map(|w| w / total).collect())
    }
}

/// Single decision tree classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTreeClassifier {
    pub n_features: usize,
    pub classes: Vec<f64>,
    pub tree: Tree,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_names: Option<Vec<String>>,
}

impl DecisionTreeClassifier {
    fn check(&self) -> Result<()> {
        check_classes(&self.classes)?;
        check_feature_names(self.feature_names.as_deref(), self.n_features)?;
        self.tree.check(self.n_features, self.classes.len())
    }
}

impl Predictor for DecisionTreeClassifier {
    fn kind(&self) -> &'static str {
        "decision_tree_classifier"
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn feature_names(&self) -> Option<&[String]> {
        self.feature_names.as_deref()
    }

    fn predict(&self, row: &[f64]) -> Result<f64> {
        check_row(row, self.n_features)?;
        let proba = self.tree.proba(row)?;
        Ok(self.classes[argmax(&proba)])
    }
}

/// Bagged ensemble of classification trees with soft voting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForestClassifier {
    pub n_features: usize,
    pub classes: Vec<f64>,
    pub trees: Vec<Tree>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_names: Option<Vec<String>>,
}

impl RandomForestClassifier {
    fn check(&self) -> Result<()> {
        check_classes(&self.classes)?;
        check_feature_names(self.feature_names.as_deref(), self.n_features)?;
        if self.trees.is_empty() {
            return Err(PredictError::load("forest has no trees"));
        }
        self.trees
            .iter()
            .try_for_each(|tree| tree.check(self.n_features, self.classes.len()))
    }
}

impl Predictor for RandomForestClassifier {
    fn kind(&self) -> &'static str {
        "random_forest_classifier"
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn feature_names(&self) -> Option<&[String]> {
        self.feature_names.as_deref()
    }

    fn predict(&self, row: &[f64]) -> Result<f64> {
        check_row(row, self.n_features)?;
        let mut votes = vec![0.0; self.classes.len()];
        for tree in &self.trees {
            for (acc, p) in votes.iter_mut().zip(tree.proba(row)?) {
                *acc += p;
            }
        }
        Ok(self.classes[argmax(&votes)])
    }
}

fn check_classes(classes: &[f64]) -> Result<()> {
    if classes.is_empty() {
        return Err(PredictError::load("classifier has no classes"));
    }
    if classes.iter().any(|c| !c.is_finite()) {
        return Err(PredictError::load("classifier has non-finite class labels"));
    }
    Ok(())
}

fn check_feature_names(names: Option<&[String]>, n_features: usize) -> Result<()> {
    match names {
        Some(names) if names.len() != n_features => Err(PredictError::load(format!(
            "artifact lists {} feature names for {} features",
            names.len(),
            n_features
        ))),
        _ => Ok(()),
    }
}

fn check_row(row: &[f64], n_features: usize) -> Result<()> {
    if row.len() != n_features {
        return Err(PredictError::inference(format!(
            "expected {} features, got {}",
            n_features,
            row.len()
        )));
    }
    if row.iter().any(|x| !x.is_finite()) {
        return Err(PredictError::inference("input contains non-finite values"));
    }
    Ok(())
}

fn finite(value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(PredictError::inference("model produced a non-finite value"))
    }
}

/// Index of the largest entry; ties resolve to the lowest index
fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (index, value) in values.iter().enumerate().skip(1) {
        if *value > values[best] {
            best = index;
        }
    }
    best
}

/// Lifecycle state of a [`ModelHandle`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    Uninitialized,
    Loading,
    Ready,
    Unavailable,
}

impl fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ModelStatus::Uninitialized => "uninitialized",
            ModelStatus::Loading => "loading",
            ModelStatus::Ready => "ready",
            ModelStatus::Unavailable => "unavailable",
        };
        f.write_str(label)
    }
}

enum HandleState {
    Uninitialized,
    Loading,
    Ready(Arc<dyn Predictor>),
    Unavailable(String),
}

/// Owns one deployment's model for the lifetime of the process.
///
/// `load` takes `&mut self`; once the handle is shared behind an `Arc` it can
/// no longer transition, so a failed load is permanent.
pub struct ModelHandle {
    name: String,
    source: Option<PathBuf>,
    state: HandleState,
}

impl ModelHandle {
    /// Create an uninitialized handle
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            source: None,
            state: HandleState::Uninitialized,
        }
    }

    /// Create a handle that is already Ready with an in-memory predictor
    pub fn ready<S: Into<String>>(name: S, predictor: Arc<dyn Predictor>) -> Self {
        Self {
            name: name.into(),
            source: None,
            state: HandleState::Ready(predictor),
        }
    }

    /// Create a handle that is permanently Unavailable
    pub fn unavailable<S: Into<String>, R: Into<String>>(name: S, reason: R) -> Self {
        Self {
            name: name.into(),
            source: None,
            state: HandleState::Unavailable(reason.into()),
        }
    }

    /// Load the artifact at `path`, checking it against `schema`.
    ///
    /// Only the first call does anything. On failure the handle becomes
    /// Unavailable and the error is returned for the caller to report.
    pub fn load<P: AsRef<Path>>(&mut self, path: P, schema: &SchemaDescriptor) -> Result<()> {
        if !matches!(self.state, HandleState::Uninitialized) {
            return Err(PredictError::load(format!(
                "model '{}' has already been loaded",
                self.name
            )));
        }

        let path = path.as_ref();
        self.source = Some(path.to_path_buf());
        self.state = HandleState::Loading;
        debug!(model = %self.name, path = %path.display(), "Loading model artifact");

        let start = Instant::now();
        match Self::open(path, schema) {
            Ok(predictor) => {
                info!(
                    model = %self.name,
                    kind = predictor.kind(),
                    features = predictor.n_features(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Model loaded"
                );
                self.state = HandleState::Ready(predictor);
                Ok(())
            }
            Err(e) => {
                error!(model = %self.name, path = %path.display(), "Model failed to load: {}", e);
                self.state = HandleState::Unavailable(e.to_string());
                Err(e)
            }
        }
    }

    fn open(path: &Path, schema: &SchemaDescriptor) -> Result<Arc<dyn Predictor>> {
        let predictor = ModelArtifact::from_path(path)?.into_predictor();
        if predictor.n_features() != schema.len() {
            return Err(PredictError::load(format!(
                "artifact expects {} features, schema {} has {}",
                predictor.n_features(),
                schema,
                schema.len()
            )));
        }
        if let Some(names) = predictor.feature_names() {
            if !schema.matches(names) {
                return Err(PredictError::load(format!(
                    "artifact feature order [{}] does not match schema {}",
                    names.join(", "),
                    schema
                )));
            }
        }
        Ok(predictor)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Artifact path, once a load has been attempted
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn status(&self) -> ModelStatus {
        match self.state {
            HandleState::Uninitialized => ModelStatus::Uninitialized,
            HandleState::Loading => ModelStatus::Loading,
            HandleState::Ready(_) => ModelStatus::Ready,
            HandleState::Unavailable(_) => ModelStatus::Unavailable,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, HandleState::Ready(_))
    }

    /// Why the model is unavailable, if it is
    pub fn unavailable_reason(&self) -> Option<&str> {
        match &self.state {
            HandleState::Unavailable(reason) => Some(reason),
            _ => None,
        }
    }

    /// Run inference on a validated row
    pub fn predict(&self, row: &ValidatedRow) -> Result<f64> {
        match &self.state {
            HandleState::Ready(predictor) => predictor.predict(row.as_slice()),
            _ => Err(PredictError::ModelUnavailable),
        }
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("status", &self.status())
            .finish()
    }
}
