//! Error types for the revenue core
//!
//! Caller-input problems (`FieldError`, collected into `ValidationErrors`) are
//! kept apart from startup failures (`ConfigurationError`, `ModelError`,
//! `DatasetError`) so the host can report the former to the user and abort on
//! the latter.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// A single problem with one field of a record or filter.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum FieldError {
    /// Field is required by the feature layout, absent, and has no default
    #[error("missing required field `{field}`")]
    MissingField { field: String },

    /// Field name is not part of the schema
    #[error("unknown field `{field}`")]
    UnknownField { field: String },

    /// Numeric or date value outside the declared domain
    #[error("field `{field}`: value {value} is outside the allowed range [{min}, {max}]")]
    OutOfRange {
        field: String,
        value: String,
        min: String,
        max: String,
    },

    /// Category label not present in the training-time domain
    #[error("field `{field}`: unknown category `{value}` (allowed: {})", .allowed.join(", "))]
    UnknownCategory {
        field: String,
        value: String,
        allowed: Vec<String>,
    },

    /// Value cannot be read as the field's kind at all
    #[error("field `{field}`: expected {expected}, found `{found}`")]
    TypeMismatch {
        field: String,
        expected: String,
        found: String,
    },

    /// Predicate does not apply to the field's kind
    #[error("field `{field}`: {predicate} predicate is not applicable to a {kind} field")]
    IncompatiblePredicate {
        field: String,
        predicate: String,
        kind: String,
    },
}

impl FieldError {
    /// Name of the field the error refers to
    pub fn field(&self) -> &str {
        match self {
            FieldError::MissingField { field }
            | FieldError::UnknownField { field }
            | FieldError::OutOfRange { field, .. }
            | FieldError::UnknownCategory { field, .. }
            | FieldError::TypeMismatch { field, .. }
            | FieldError::IncompatiblePredicate { field, .. } => field,
        }
    }
}

/// Every field-level problem found in one request, in layout order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, error: FieldError) {
        self.0.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.0
    }

    /// Names of the offending fields, for UI highlighting
    pub fn fields(&self) -> Vec<&str> {
        self.0.iter().map(FieldError::field).collect()
    }

    /// `Ok(())` when nothing was collected
    pub fn into_result(self) -> std::result::Result<(), ValidationErrors> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl From<FieldError> for ValidationErrors {
    fn from(error: FieldError) -> Self {
        Self(vec![error])
    }
}

impl IntoIterator for ValidationErrors {
    type Item = FieldError;
    type IntoIter = std::vec::IntoIter<FieldError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "{}", messages.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

/// Schema, layout or model incompatibility detected at startup
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    #[error("feature layout width {layout} does not match model input width {model}")]
    WidthMismatch { layout: usize, model: usize },

    #[error("feature name mismatch at position {position}: layout has `{layout}`, model expects `{model}`")]
    FeatureNameMismatch {
        position: usize,
        layout: String,
        model: String,
    },

    #[error("layout fingerprint {layout} does not match model's training layout {model}")]
    LayoutFingerprintMismatch { layout: String, model: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Errors from the model adapter
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("failed to read model artifact: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed model artifact: {0}")]
    Malformed(String),

    #[error("unsupported model artifact: {0}")]
    Unsupported(String),

    #[error("model validation failed: {0}")]
    ValidationFailed(String),

    #[error("model hash mismatch: expected {expected}, computed {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("feature vector has {actual} values, model expects {expected}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("canonical serialization error: {0}")]
    Canonical(#[from] crate::serde_canon::CanonicalError),
}

impl ModelError {
    /// Load-time failures, as opposed to per-call contract violations
    pub fn is_load_error(&self) -> bool {
        !matches!(self, ModelError::ShapeMismatch { .. })
    }
}

/// Errors while reading a historical dataset
#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("failed to read dataset: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("invalid table name `{0}`: expected letters, digits or underscores")]
    InvalidTable(String),

    #[error("failed to fingerprint dataset: {0}")]
    Fingerprint(#[from] crate::serde_canon::CanonicalError),

    #[error("dataset is empty")]
    Empty,
}

/// Pipeline stage that produced a prediction failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validation,
    Encoding,
    Inference,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Validation => "validation",
            Stage::Encoding => "encoding",
            Stage::Inference => "inference",
        };
        f.write_str(name)
    }
}

/// Failure of a single prediction request, tagged by stage
#[derive(Error, Debug)]
pub enum PredictionError {
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("encoding failed: {0}")]
    Encoding(ValidationErrors),

    #[error("inference failed: {0}")]
    Inference(ModelError),
}

impl PredictionError {
    pub fn stage(&self) -> Stage {
        match self {
            PredictionError::Validation(_) => Stage::Validation,
            PredictionError::Encoding(_) => Stage::Encoding,
            PredictionError::Inference(_) => Stage::Inference,
        }
    }

    /// Field-level problems, empty for inference failures
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            PredictionError::Validation(errors) | PredictionError::Encoding(errors) => {
                errors.errors()
            }
            PredictionError::Inference(_) => &[],
        }
    }
}

/// Umbrella error for startup and host-level operations
#[derive(Error, Debug)]
pub enum RevenueError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("prediction failed at {}: {0}", .0.stage())]
    Prediction(#[from] PredictionError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for revenue core operations
pub type Result<T> = std::result::Result<T, RevenueError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_collect_fields_in_order() {
        let mut errors = ValidationErrors::new();
        errors.push(FieldError::MissingField {
            field: "room_type".into(),
        });
        errors.push(FieldError::UnknownCategory {
            field: "season".into(),
            value: "Monsoon".into(),
            allowed: vec!["Spring".into(), "Summer".into()],
        });

        assert_eq!(errors.len(), 2);
        assert_eq!(errors.fields(), vec!["room_type", "season"]);
        assert!(errors.to_string().contains("missing required field `room_type`"));
        assert!(errors.to_string().contains("allowed: Spring, Summer"));
    }

    #[test]
    fn empty_validation_errors_are_ok() {
        assert!(ValidationErrors::new().into_result().is_ok());
    }

    #[test]
    fn prediction_error_reports_stage() {
        let err = PredictionError::Inference(ModelError::ShapeMismatch {
            expected: 3,
            actual: 2,
        });
        assert_eq!(err.stage(), Stage::Inference);
        assert!(err.field_errors().is_empty());

        let wrapped: RevenueError = err.into();
        assert!(wrapped.to_string().starts_with("prediction failed at inference"));
    }

    #[test]
    fn field_errors_serialize_with_tag() {
        let err = FieldError::MissingField {
            field: "customer_segment".into(),
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["error"], "missing_field");
        assert_eq!(json["field"], "customer_segment");
    }
}
