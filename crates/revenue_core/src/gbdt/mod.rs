//! Gradient-boosted tree ensemble for revenue prediction
//!
//! - Thresholds, leaves, weights and bias are fixed-point integers at `SCALE`
//! - Traversal goes left when `feature <= threshold`
//! - Score = bias + Σ leaf × weight
//! - Model identity is the blake3 hash of the canonical JSON artifact
//!
//! # Artifact format
//!
//! ```json
//! {
//!   "version": 1,
//!   "scale": 1000000,
//!   "feature_count": 2,
//!   "feature_names": ["room_price", "occupancy_rate"],
//!   "layout_fingerprint": null,
//!   "trees": [
//!     {
//!       "nodes": [
//!         {"id":0,"feature":0,"threshold":150000000,"left":1,"right":2,"value":null},
//!         {"id":1,"feature":null,"threshold":0,"left":null,"right":null,"value":420000000},
//!         {"id":2,"feature":null,"threshold":0,"left":null,"right":null,"value":910000000}
//!       ],
//!       "weight": 100000
//!     }
//!   ],
//!   "bias": 1250000000
//! }
//! ```

pub mod model;
pub mod tree;

pub use model::{Model, ModelHandle, ModelInfo, FORMAT_VERSION};
pub use tree::{Node, Tree};
