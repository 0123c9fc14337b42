//! Revenue model artifact and the loaded model handle
//!
//! The artifact is a fixed-point tree ensemble with embedded input metadata
//! (feature count, feature names, optionally the layout fingerprint it was
//! trained on). It is stored either as canonical JSON or as bincode; the model
//! hash is always the blake3 hash of the canonical JSON form, so both encodings
//! of the same ensemble share one hash.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::tree::Tree;
use crate::encoder::FeatureVector;
use crate::errors::ModelError;
use crate::fixed::{Fixed, SCALE};
use crate::serde_canon::{hash_canonical_hex, to_canonical_json};

/// Artifact format version understood by this build
pub const FORMAT_VERSION: u32 = 1;

/// Serialized gradient-boosted tree ensemble
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Model {
    pub version: u32,

    /// Fixed-point scale of thresholds, leaves and weights; must equal `SCALE`
    pub scale: i64,

    /// Declared input width
    pub feature_count: usize,

    /// Column names in input order, checked against the feature layout
    pub feature_names: Vec<String>,

    /// Fingerprint of the feature layout used at training time
    #[serde(default)]
    pub layout_fingerprint: Option<String>,

    pub trees: Vec<Tree>,

    /// Base score added to the tree contributions
    pub bias: Fixed,
}

impl Model {
    pub fn new(feature_names: Vec<String>, trees: Vec<Tree>, bias: Fixed) -> Self {
        Self {
            version: FORMAT_VERSION,
            scale: SCALE,
            feature_count: feature_names.len(),
            feature_names,
            layout_fingerprint: None,
            trees,
            bias,
        }
    }

    pub fn with_layout_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.layout_fingerprint = Some(fingerprint.into());
        self
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.version != FORMAT_VERSION {
            return Err(ModelError::Unsupported(format!(
                "artifact version {} (supported: {FORMAT_VERSION})",
                self.version
            )));
        }

        if self.scale != SCALE {
            return Err(ModelError::Unsupported(format!(
                "fixed-point scale {} (supported: {SCALE})",
                self.scale
            )));
        }

        if self.feature_count == 0 {
            return Err(ModelError::ValidationFailed(
                "model declares zero input features".to_string(),
            ));
        }

        if self.feature_names.len() != self.feature_count {
            return Err(ModelError::ValidationFailed(format!(
                "{} feature names for declared width {}",
                self.feature_names.len(),
                self.feature_count
            )));
        }

        if self.trees.is_empty() {
            return Err(ModelError::ValidationFailed("model has no trees".to_string()));
        }

        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate()
                .map_err(|e| ModelError::ValidationFailed(format!("tree {i}: {e}")))?;

            if let Some(max) = tree.max_feature() {
                if max >= self.feature_count {
                    return Err(ModelError::ValidationFailed(format!(
                        "tree {i} splits on feature {max}, width is {}",
                        self.feature_count
                    )));
                }
            }
        }

        Ok(())
    }

    /// Bias plus the weighted contribution of every tree
    pub fn score(&self, features: &[Fixed]) -> Option<Fixed> {
        self.trees
            .iter()
            .try_fold(self.bias, |acc, tree| Some(acc + tree.evaluate(features)?))
    }

    pub fn to_canonical_json(&self) -> Result<String, ModelError> {
        Ok(to_canonical_json(self)?)
    }

    pub fn hash_hex(&self) -> Result<String, ModelError> {
        Ok(hash_canonical_hex(self)?)
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<(), ModelError> {
        fs::write(path, self.to_canonical_json()?)?;
        Ok(())
    }

    pub fn save_binary<P: AsRef<Path>>(&self, path: P) -> Result<(), ModelError> {
        let data = bincode::serialize(self).map_err(|e| ModelError::Malformed(e.to_string()))?;
        fs::write(path, data)?;
        Ok(())
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }
}

/// Summary of a loaded model, for logs and host tooling
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub version: u32,
    pub hash: String,
    pub feature_count: usize,
    pub feature_names: Vec<String>,
    pub num_trees: usize,
    pub layout_fingerprint: Option<String>,
}

/// A validated, hashed model held for the process lifetime
#[derive(Debug)]
pub struct ModelHandle {
    model: Model,
    hash: String,
}

impl ModelHandle {
    /// Validate and hash an in-memory model
    pub fn from_model(model: Model) -> Result<Self, ModelError> {
        model.validate()?;
        let hash = model.hash_hex()?;
        Ok(Self { model, hash })
    }

    /// Load an artifact; `.bin` files are bincode, anything else canonical JSON.
    ///
    /// When `expected_hash` is given the computed hash must match it.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load<P: AsRef<Path>>(path: P, expected_hash: Option<&str>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let binary = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("bin"))
            .unwrap_or(false);

        let model: Model = if binary {
            let data = fs::read(path)?;
            bincode::deserialize(&data).map_err(|e| ModelError::Malformed(e.to_string()))?
        } else {
            let data = fs::read_to_string(path)?;
            serde_json::from_str(&data).map_err(|e| ModelError::Malformed(e.to_string()))?
        };

        let handle = Self::from_model(model)?;

        if let Some(expected) = expected_hash {
            if !expected.trim().eq_ignore_ascii_case(&handle.hash) {
                return Err(ModelError::HashMismatch {
                    expected: expected.trim().to_string(),
                    actual: handle.hash,
                });
            }
            debug!("model hash pinned and verified");
        }

        info!(
            hash = %handle.hash,
            width = handle.expected_width(),
            trees = handle.model.num_trees(),
            "model loaded"
        );
        Ok(handle)
    }

    pub fn expected_width(&self) -> usize {
        self.model.feature_count
    }

    pub fn feature_names(&self) -> &[String] {
        &self.model.feature_names
    }

    pub fn layout_fingerprint(&self) -> Option<&str> {
        self.model.layout_fingerprint.as_deref()
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn info(&self) -> ModelInfo {
        ModelInfo {
            version: self.model.version,
            hash: self.hash.clone(),
            feature_count: self.model.feature_count,
            feature_names: self.model.feature_names.clone(),
            num_trees: self.model.num_trees(),
            layout_fingerprint: self.model.layout_fingerprint.clone(),
        }
    }

    /// Fixed-point score for one vector
    pub fn predict_fixed(&self, vector: &FeatureVector) -> Result<Fixed, ModelError> {
        if vector.len() != self.expected_width() {
            return Err(ModelError::ShapeMismatch {
                expected: self.expected_width(),
                actual: vector.len(),
            });
        }

        self.model.score(vector.values()).ok_or_else(|| {
            ModelError::ValidationFailed("tree traversal left the ensemble".to_string())
        })
    }

    /// Predicted value for one vector
    pub fn predict(&self, vector: &FeatureVector) -> Result<f64, ModelError> {
        self.predict_fixed(vector).map(Fixed::to_f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gbdt::tree::Node;
    use tempfile::TempDir;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("f{i}")).collect()
    }

    fn two_tree_model() -> Model {
        let first = Tree::new(
            vec![
                Node::split(0, 0, Fixed::from_int(50), 1, 2),
                Node::leaf(1, Fixed::from_int(100)),
                Node::leaf(2, Fixed::from_int(200)),
            ],
            Fixed::ONE,
        );
        let second = Tree::new(
            vec![
                Node::split(0, 1, Fixed::from_int(30), 1, 2),
                Node::leaf(1, Fixed::from_int(-50)),
                Node::leaf(2, Fixed::from_int(50)),
            ],
            Fixed::ONE,
        );
        Model::new(names(2), vec![first, second], Fixed::from_int(10))
    }

    fn vector(values: &[i64]) -> FeatureVector {
        FeatureVector::new(values.iter().map(|v| Fixed::from_int(*v)).collect())
    }

    #[test]
    fn score_adds_bias_and_trees() {
        let handle = ModelHandle::from_model(two_tree_model()).unwrap();
        assert_eq!(handle.predict(&vector(&[30, 20])).unwrap(), 60.0);
        assert_eq!(handle.predict(&vector(&[60, 40])).unwrap(), 260.0);
    }

    #[test]
    fn wrong_width_is_shape_mismatch() {
        let handle = ModelHandle::from_model(two_tree_model()).unwrap();
        let err = handle.predict(&vector(&[1])).unwrap_err();
        assert!(matches!(
            err,
            ModelError::ShapeMismatch {
                expected: 2,
                actual: 1
            }
        ));
        assert!(!err.is_load_error());
    }

    #[test]
    fn json_and_binary_artifacts_share_hash() {
        let dir = TempDir::new().unwrap();
        let model = two_tree_model();
        model.save_json(dir.path().join("model.json")).unwrap();
        model.save_binary(dir.path().join("model.bin")).unwrap();

        let from_json = ModelHandle::load(dir.path().join("model.json"), None).unwrap();
        let from_bin = ModelHandle::load(dir.path().join("model.bin"), None).unwrap();

        assert_eq!(from_json.hash(), from_bin.hash());
        assert_eq!(from_json.model(), from_bin.model());
    }

    #[test]
    fn pinned_hash_must_match() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.json");
        let model = two_tree_model();
        model.save_json(&path).unwrap();

        let hash = model.hash_hex().unwrap();
        assert!(ModelHandle::load(&path, Some(hash.to_uppercase().as_str())).is_ok());

        let err = ModelHandle::load(&path, Some("00ff")).unwrap_err();
        assert!(matches!(err, ModelError::HashMismatch { .. }));
    }

    #[test]
    fn incompatible_version_is_unsupported() {
        let mut model = two_tree_model();
        model.version = 7;
        let err = ModelHandle::from_model(model).unwrap_err();
        assert!(matches!(err, ModelError::Unsupported(_)));
        assert!(err.is_load_error());
    }

    #[test]
    fn malformed_artifact_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.json");
        fs::write(&path, "{\"version\": 1, \"trees\": ").unwrap();
        assert!(matches!(
            ModelHandle::load(&path, None),
            Err(ModelError::Malformed(_))
        ));
    }

    #[test]
    fn split_beyond_width_is_rejected() {
        let mut model = two_tree_model();
        model.feature_count = 1;
        model.feature_names.truncate(1);
        assert!(matches!(
            model.validate(),
            Err(ModelError::ValidationFailed(_))
        ));
    }

    #[test]
    fn inference_is_bit_for_bit_repeatable() {
        let handle = ModelHandle::from_model(two_tree_model()).unwrap();
        let input = vector(&[45, 31]);
        let first = handle.predict_fixed(&input).unwrap();
        for _ in 0..100 {
            assert_eq!(handle.predict_fixed(&input).unwrap(), first);
        }
    }
}
