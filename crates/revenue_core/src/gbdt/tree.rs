//! Decision tree structures for revenue inference
//!
//! Nodes hold fixed-point thresholds and leaf values; traversal compares
//! integers only.

use serde::{Deserialize, Serialize};

use crate::fixed::Fixed;

/// A decision tree node (split or leaf)
///
/// Split nodes carry `feature`, `threshold` and both children; leaves carry
/// `value`. Children always point forward (`left`, `right` > own index) so
/// every traversal terminates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Node {
    pub id: u32,

    /// Feature-vector position to split on; `None` for leaves
    #[serde(default)]
    pub feature: Option<usize>,

    /// Go left when `vector[feature] <= threshold`
    #[serde(default)]
    pub threshold: Fixed,

    #[serde(default)]
    pub left: Option<usize>,

    #[serde(default)]
    pub right: Option<usize>,

    /// Leaf contribution
    #[serde(default)]
    pub value: Option<Fixed>,
}

impl Node {
    pub fn split(id: u32, feature: usize, threshold: Fixed, left: usize, right: usize) -> Self {
        Self {
            id,
            feature: Some(feature),
            threshold,
            left: Some(left),
            right: Some(right),
            value: None,
        }
    }

    pub fn leaf(id: u32, value: Fixed) -> Self {
        Self {
            id,
            feature: None,
            threshold: Fixed::ZERO,
            left: None,
            right: None,
            value: Some(value),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.feature.is_none()
    }
}

/// A single weighted regression tree; node 0 is the root
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Tree {
    pub nodes: Vec<Node>,

    /// Multiplier applied to the leaf value (learning rate)
    pub weight: Fixed,
}

impl Tree {
    pub fn new(nodes: Vec<Node>, weight: Fixed) -> Self {
        Self { nodes, weight }
    }

    /// Leaf value reached by `features`, before weighting.
    ///
    /// Assumes a validated tree whose split features fit in `features`;
    /// returns `None` otherwise.
    pub fn leaf_for(&self, features: &[Fixed]) -> Option<Fixed> {
        let mut idx = 0usize;
        loop {
            let node = self.nodes.get(idx)?;
            match node.feature {
                None => return node.value,
                Some(feature) => {
                    let value = *features.get(feature)?;
                    idx = if value <= node.threshold {
                        node.left?
                    } else {
                        node.right?
                    };
                }
            }
        }
    }

    /// Weighted contribution of this tree
    pub fn evaluate(&self, features: &[Fixed]) -> Option<Fixed> {
        self.leaf_for(features).map(|leaf| leaf.mul_fixed(self.weight))
    }

    /// Highest feature position referenced by a split
    pub fn max_feature(&self) -> Option<usize> {
        self.nodes.iter().filter_map(|n| n.feature).max()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }

        let len = self.nodes.len();
        for (i, node) in self.nodes.iter().enumerate() {
            if node.is_leaf() {
                if node.value.is_none() {
                    return Err(format!("leaf node {i} has no value"));
                }
                continue;
            }

            for (side, child) in [("left", node.left), ("right", node.right)] {
                match child {
                    Some(c) if c > i && c < len => {}
                    Some(c) => {
                        return Err(format!("node {i} has invalid {side} child {c}"));
                    }
                    None => return Err(format!("split node {i} has no {side} child")),
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stump(threshold: i64) -> Tree {
        Tree::new(
            vec![
                Node::split(0, 0, Fixed::from_int(threshold), 1, 2),
                Node::leaf(1, Fixed::from_int(100)),
                Node::leaf(2, Fixed::from_int(200)),
            ],
            Fixed::ONE,
        )
    }

    #[test]
    fn equal_value_goes_left() {
        let tree = stump(50);
        assert_eq!(tree.evaluate(&[Fixed::from_int(30)]), Some(Fixed::from_int(100)));
        assert_eq!(tree.evaluate(&[Fixed::from_int(50)]), Some(Fixed::from_int(100)));
        assert_eq!(tree.evaluate(&[Fixed::from_int(51)]), Some(Fixed::from_int(200)));
    }

    #[test]
    fn weight_scales_leaf() {
        let mut tree = stump(50);
        tree.weight = Fixed::from_f64(0.1);
        assert_eq!(tree.evaluate(&[Fixed::ZERO]), Some(Fixed::from_int(10)));
    }

    #[test]
    fn short_vector_yields_none() {
        assert_eq!(stump(50).evaluate(&[]), None);
    }

    #[test]
    fn backward_child_is_rejected() {
        let tree = Tree::new(
            vec![
                Node::leaf(0, Fixed::ONE),
                Node::split(1, 0, Fixed::ZERO, 0, 0),
            ],
            Fixed::ONE,
        );
        assert!(tree.validate().is_err());
        assert!(stump(1).validate().is_ok());
    }

    #[test]
    fn leaf_without_value_is_rejected() {
        let mut tree = stump(1);
        tree.nodes[2].value = None;
        assert!(tree.validate().unwrap_err().contains("leaf node 2"));
    }
}
