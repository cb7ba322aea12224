//! Truncation configuration
//!
//! Every compression site takes a [`TruncationConfig`]: a hard rank ceiling
//! plus optional absolute and relative Frobenius-norm error targets. The rank
//! ceiling always wins; an unmet error target is reported, not raised.

use serde::{Deserialize, Serialize};

use crate::error::{HtError, HtResult};
use crate::trunc_rank::{trunc_rank, RankChoice};

/// Rank and accuracy limits for truncation
///
/// # Examples
///
/// ```
/// use htucker_tensor::TruncationConfig;
///
/// let config = TruncationConfig::new(10).abs_err(1e-8);
/// assert_eq!(config.max_rank, 10);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TruncationConfig {
    /// Largest rank kept at any node
    pub max_rank: usize,
    /// Absolute Frobenius error target
    pub abs_err: Option<f64>,
    /// Error target relative to the norm of the truncated quantity
    pub rel_err: Option<f64>,
}

impl Default for TruncationConfig {
    fn default() -> Self {
        Self {
            max_rank: usize::MAX,
            abs_err: None,
            rel_err: None,
        }
    }
}

impl TruncationConfig {
    /// Fixed-rank truncation
    pub fn new(max_rank: usize) -> Self {
        Self {
            max_rank,
            ..Self::default()
        }
    }

    /// Set the absolute error target
    pub fn abs_err(mut self, abs_err: f64) -> Self {
        self.abs_err = Some(abs_err);
        self
    }

    /// Set the relative error target
    pub fn rel_err(mut self, rel_err: f64) -> Self {
        self.rel_err = Some(rel_err);
        self
    }

    /// Check that the rank is positive and error targets are finite and positive
    pub fn validate(&self) -> HtResult<()> {
        if self.max_rank == 0 {
            return Err(HtError::InvalidArgument(
                "max_rank must be at least 1".to_string(),
            ));
        }
        for (name, value) in [("abs_err", self.abs_err), ("rel_err", self.rel_err)] {
            if let Some(v) = value {
                if !(v.is_finite() && v > 0.0) {
                    return Err(HtError::InvalidArgument(format!(
                        "{} must be finite and positive, got {}",
                        name, v
                    )));
                }
            }
        }
        Ok(())
    }

    /// Per-node limits for a tensor of order `order`
    ///
    /// Error targets are divided by `sqrt(2 * order - 2)`, the number of
    /// truncated edges, so that node errors adding in quadrature stay near the
    /// global target.
    pub fn per_node(&self, order: usize) -> Self {
        let edges = (2 * order).saturating_sub(2).max(1) as f64;
        let scale = edges.sqrt();
        Self {
            max_rank: self.max_rank,
            abs_err: self.abs_err.map(|e| e / scale),
            rel_err: self.rel_err.map(|e| e / scale),
        }
    }

    /// Apply the rank policy to descending singular values
    pub fn choose_rank(&self, singular_values: &[f64]) -> HtResult<RankChoice> {
        trunc_rank(singular_values, self.max_rank, self.abs_err, self.rel_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let c = TruncationConfig::new(4).abs_err(0.1).rel_err(0.01);
        assert_eq!(c.max_rank, 4);
        assert_eq!(c.abs_err, Some(0.1));
        assert_eq!(c.rel_err, Some(0.01));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(TruncationConfig::new(0).validate().is_err());
        assert!(TruncationConfig::new(3).abs_err(-1.0).validate().is_err());
        assert!(TruncationConfig::new(3).rel_err(f64::NAN).validate().is_err());
        assert!(TruncationConfig::default().validate().is_ok());
    }

    #[test]
    fn test_per_node_budget() {
        let c = TruncationConfig::new(5).abs_err(1.0).per_node(3);
        assert!((c.abs_err.unwrap() - 0.5).abs() < 1e-15);
        assert_eq!(c.rel_err, None);
        assert_eq!(c.max_rank, 5);
    }
}
