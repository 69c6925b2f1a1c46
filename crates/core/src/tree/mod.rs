//! Decision tree structures shared by the forest and the booster
//!
//! Trees are stored as flat node arrays (node 0 is the root). Internal nodes
//! send a row left when `value <= threshold`; NaN always goes right. Training
//! works on quantised features (see [`binning`]), but thresholds are kept in
//! the original value space so inference needs no bin mapper.

pub mod binning;

pub use binning::BinnedMatrix;

use serde::{Deserialize, Serialize};

/// A decision tree node (internal or leaf)
///
/// Leaves have `feature_idx == -1`, `left == right == -1` and a `leaf` value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    /// Node ID (position in the node array)
    pub id: i32,

    /// Left child index (-1 for leaf nodes)
    pub left: i32,

    /// Right child index (-1 for leaf nodes)
    pub right: i32,

    /// Feature index to split on (-1 for leaf nodes)
    pub feature_idx: i32,

    /// Split threshold in feature space
    pub threshold: f64,

    /// Leaf value (Some for leaf nodes, None for internal nodes)
    pub leaf: Option<f64>,
}

impl Node {
    /// Create a new internal (split) node
    pub fn internal(id: i32, feature_idx: i32, threshold: f64, left: i32, right: i32) -> Self {
        Self {
            id,
            left,
            right,
            feature_idx,
            threshold,
            leaf: None,
        }
    }

    /// Create a new leaf node
    pub fn leaf(id: i32, value: f64) -> Self {
        Self {
            id,
            left: -1,
            right: -1,
            feature_idx: -1,
            threshold: 0.0,
            leaf: Some(value),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.feature_idx == -1 || self.leaf.is_some()
    }
}

/// A single decision tree
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    /// Evaluate this tree on a feature vector
    pub fn predict(&self, features: &[f64]) -> f64 {
        let mut idx = 0usize;

        loop {
            let Some(node) = self.nodes.get(idx) else {
                return 0.0;
            };

            if node.is_leaf() {
                return node.leaf.unwrap_or(0.0);
            }

            let Some(&value) = features.get(node.feature_idx as usize) else {
                return 0.0;
            };

            let next = if value <= node.threshold {
                node.left
            } else {
                node.right
            };
            if next < 0 {
                return 0.0;
            }
            idx = next as usize;
        }
    }

    /// Number of leaves
    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Length of the longest root-to-leaf path, in edges
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match nodes.get(idx) {
                Some(n) if !n.is_leaf() => {
                    1 + walk(nodes, n.left as usize).max(walk(nodes, n.right as usize))
                }
                _ => 0,
            }
        }
        walk(&self.nodes, 0)
    }

    /// Validate tree structure
    pub fn validate(&self) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("Tree has no nodes".to_string());
        }

        for (i, node) in self.nodes.iter().enumerate() {
            if node.is_leaf() {
                match node.leaf {
                    Some(v) if v.is_finite() => {}
                    Some(v) => return Err(format!("Leaf node {i} has non-finite value {v}")),
                    None => return Err(format!("Leaf node {i} has no leaf value")),
                }
                continue;
            }

            for (side, child) in [("left", node.left), ("right", node.right)] {
                if child <= i as i32 || child as usize >= self.nodes.len() {
                    return Err(format!("Node {i} has invalid {side} child: {child}"));
                }
            }
            if node.feature_idx < 0 {
                return Err(format!(
                    "Internal node {i} has invalid feature index: {}",
                    node.feature_idx
                ));
            }
        }

        Ok(())
    }
}

/// Best split found for a node
///
/// Ties on gain are broken by the lower `(feature, bin)` pair so growth does
/// not depend on iteration order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitCandidate {
    pub feature: usize,
    pub bin: u16,
    pub gain: f64,
}

impl SplitCandidate {
    /// Whether `self` should replace `current`
    pub fn beats(&self, current: Option<&SplitCandidate>) -> bool {
        match current {
            None => true,
            Some(cur) => {
                self.gain > cur.gain
                    || (self.gain == cur.gain && (self.feature, self.bin) < (cur.feature, cur.bin))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stump() -> Tree {
        Tree::new(vec![
            Node::internal(0, 0, 50.0, 1, 2),
            Node::leaf(1, 100.0),
            Node::leaf(2, 200.0),
        ])
    }

    #[test]
    fn test_tree_prediction() {
        let tree = stump();
        assert_eq!(tree.predict(&[30.0]), 100.0);
        assert_eq!(tree.predict(&[50.0]), 100.0); // Equal goes left
        assert_eq!(tree.predict(&[60.0]), 200.0);
        assert_eq!(tree.predict(&[f64::NAN]), 200.0);
    }

    #[test]
    fn test_tree_shape() {
        let tree = stump();
        assert_eq!(tree.leaf_count(), 2);
        assert_eq!(tree.depth(), 1);
        assert_eq!(Tree::new(vec![Node::leaf(0, 1.0)]).depth(), 0);
    }

    #[test]
    fn test_tree_validation() {
        assert!(stump().validate().is_ok());

        let invalid = Tree::new(vec![
            Node::internal(0, 0, 50.0, 5, 2),
            Node::leaf(1, 100.0),
            Node::leaf(2, 200.0),
        ]);
        assert!(invalid.validate().is_err());
        assert!(Tree::default().validate().is_err());
    }

    #[test]
    fn test_split_tie_breaking() {
        let a = SplitCandidate { feature: 1, bin: 3, gain: 2.0 };
        let b = SplitCandidate { feature: 0, bin: 9, gain: 2.0 };
        let c = SplitCandidate { feature: 4, bin: 0, gain: 2.5 };

        assert!(a.beats(None));
        assert!(b.beats(Some(&a)));
        assert!(!a.beats(Some(&b)));
        assert!(c.beats(Some(&b)));
    }
}
