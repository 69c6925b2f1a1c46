//! Boosted-tree hyperparameters

use hotel_core::errors::{PipelineError, Result, Stage};
use hotel_core::ParamValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Training configuration of one boosted classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub num_leaves: usize,
    /// `<= 0` means unlimited
    pub max_depth: i64,
    pub subsample: f64,
    pub colsample_bytree: f64,
    pub min_child_samples: usize,
    pub reg_lambda: f64,
    pub max_bin: usize,
    pub random_state: u64,
}

impl Default for HyperParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            num_leaves: 31,
            max_depth: -1,
            subsample: 1.0,
            colsample_bytree: 1.0,
            min_child_samples: 20,
            reg_lambda: 0.0,
            max_bin: 255,
            random_state: 42,
        }
    }
}

fn invalid(name: &str, value: ParamValue, reason: &str) -> PipelineError {
    PipelineError::new(Stage::Training, "apply hyperparameter", reason)
        .with_context("param", name)
        .with_context("value", value)
}

fn as_count(name: &str, value: ParamValue, min: i64) -> Result<i64> {
    let v = match value {
        ParamValue::Int(v) => v,
        ParamValue::Float(f) if f.fract() == 0.0 && f.is_finite() => f as i64,
        ParamValue::Float(_) => return Err(invalid(name, value, "expected an integer")),
    };
    if v < min {
        return Err(invalid(name, value, &format!("must be at least {min}")));
    }
    Ok(v)
}

fn as_fraction(name: &str, value: ParamValue) -> Result<f64> {
    let v = value.as_f64();
    if v > 0.0 && v <= 1.0 {
        Ok(v)
    } else {
        Err(invalid(name, value, "must lie in (0, 1]"))
    }
}

impl HyperParams {
    /// Defaults with the given seed
    pub fn with_seed(random_state: u64) -> Self {
        Self {
            random_state,
            ..Self::default()
        }
    }

    /// Set one named parameter, checking its range
    pub fn set(&mut self, name: &str, value: ParamValue) -> Result<()> {
        match name {
            "n_estimators" => self.n_estimators = as_count(name, value, 1)? as usize,
            "num_leaves" => self.num_leaves = as_count(name, value, 2)? as usize,
            "max_depth" => self.max_depth = as_count(name, value, i64::MIN)?,
            "min_child_samples" => self.min_child_samples = as_count(name, value, 1)? as usize,
            "max_bin" => self.max_bin = as_count(name, value, 2)? as usize,
            "subsample" => self.subsample = as_fraction(name, value)?,
            "colsample_bytree" => self.colsample_bytree = as_fraction(name, value)?,
            "learning_rate" => {
                let v = value.as_f64();
                if !(v > 0.0 && v.is_finite()) {
                    return Err(invalid(name, value, "must be positive"));
                }
                self.learning_rate = v;
            }
            "reg_lambda" => {
                let v = value.as_f64();
                if !(v >= 0.0 && v.is_finite()) {
                    return Err(invalid(name, value, "must be non-negative"));
                }
                self.reg_lambda = v;
            }
            _ => return Err(invalid(name, value, "unknown hyperparameter")),
        }
        Ok(())
    }

    /// Copy of `self` with every sampled value applied
    pub fn with_overrides(&self, sampled: &BTreeMap<String, ParamValue>) -> Result<Self> {
        let mut params = self.clone();
        for (name, value) in sampled {
            params.set(name, *value)?;
        }
        Ok(params)
    }

    /// Depth limit, `None` when unlimited
    pub fn depth_limit(&self) -> Option<usize> {
        (self.max_depth > 0).then_some(self.max_depth as usize)
    }

    /// Every parameter as strings, for experiment tracking
    pub fn to_param_map(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("n_estimators".to_string(), self.n_estimators.to_string()),
            ("learning_rate".to_string(), self.learning_rate.to_string()),
            ("num_leaves".to_string(), self.num_leaves.to_string()),
            ("max_depth".to_string(), self.max_depth.to_string()),
            ("subsample".to_string(), self.subsample.to_string()),
            ("colsample_bytree".to_string(), self.colsample_bytree.to_string()),
            ("min_child_samples".to_string(), self.min_child_samples.to_string()),
            ("reg_lambda".to_string(), self.reg_lambda.to_string()),
            ("max_bin".to_string(), self.max_bin.to_string()),
            ("random_state".to_string(), self.random_state.to_string()),
        ])
    }
}
