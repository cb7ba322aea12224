//! Rank selection from singular values
//!
//! The single place where accuracy is traded for size. Given descending
//! singular values `s`, the residual of keeping the first `k` of them is
//!
//! ```text
//! tail(k) = sqrt(Σ_{i ≥ k} s_i²),   tail(len(s)) = 0
//! ```
//!
//! An error target picks the smallest `k ≥ 1` with `tail(k)` strictly below the
//! target. When both absolute and relative targets are given the larger rank
//! wins, and `max_rank` caps the result last. Without any target the rank is
//! exactly `min(max_rank, len(s))`.

use crate::error::{HtError, HtResult};

/// Outcome of a rank decision
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankChoice {
    /// Number of leading singular directions to keep
    pub rank: usize,
    /// Frobenius residual `tail(rank)`
    pub error: f64,
    /// `false` when the rank ceiling (or the full rank) stopped short of the
    /// requested accuracy
    pub satisfied: bool,
}

/// Choose a truncation rank for descending singular values `s`
///
/// # Errors
///
/// Returns [`HtError::InvalidArgument`] for an empty or negative `s`, a zero
/// `max_rank`, or non-positive error targets.
///
/// # Examples
///
/// ```
/// use htucker_tensor::trunc_rank;
///
/// let s = [4.0, 2.0, 1.0, 0.5];
/// let choice = trunc_rank(&s, 4, Some(1.2), None).unwrap();
/// assert_eq!(choice.rank, 2);
/// assert!(choice.satisfied);
///
/// // the ceiling dominates the accuracy target
/// let capped = trunc_rank(&s, 1, Some(1e-3), None).unwrap();
/// assert_eq!(capped.rank, 1);
/// assert!(!capped.satisfied);
/// ```
pub fn trunc_rank(
    s: &[f64],
    max_rank: usize,
    abs_err: Option<f64>,
    rel_err: Option<f64>,
) -> HtResult<RankChoice> {
    if s.is_empty() {
        return Err(HtError::InvalidArgument(
            "singular value vector is empty".to_string(),
        ));
    }
    if let Some(bad) = s.iter().find(|v| !(v.is_finite() && **v >= 0.0)) {
        return Err(HtError::InvalidArgument(format!(
            "singular values must be finite and non-negative, found {}",
            bad
        )));
    }
    if max_rank == 0 {
        return Err(HtError::InvalidArgument(
            "max_rank must be at least 1".to_string(),
        ));
    }
    for (name, value) in [("abs_err", abs_err), ("rel_err", rel_err)] {
        if let Some(v) = value {
            if !(v.is_finite() && v > 0.0) {
                return Err(HtError::InvalidArgument(format!(
                    "{} must be finite and positive, got {}",
                    name, v
                )));
            }
        }
    }

    let len = s.len();
    let max_rank = max_rank.min(len);
    let tail = tail_norms(s);

    let bounds: Vec<f64> = abs_err
        .into_iter()
        .chain(rel_err.map(|r| r * tail[0]))
        .collect();

    if bounds.is_empty() {
        return Ok(RankChoice {
            rank: max_rank,
            error: tail[max_rank],
            satisfied: true,
        });
    }

    let (mut rank, mut satisfied) = (0, true);
    for bound in bounds {
        let (k, ok) = smallest_rank_below(&tail[..len], bound);
        rank = rank.max(k);
        satisfied &= ok;
    }
    if rank > max_rank {
        rank = max_rank;
        satisfied = false;
    }

    Ok(RankChoice {
        rank,
        error: tail[rank],
        satisfied,
    })
}

/// `tail[k] = sqrt(Σ_{i ≥ k} s_i²)` for `k = 0..=len`
pub(crate) fn tail_norms(s: &[f64]) -> Vec<f64> {
    let mut tail = vec![0.0; s.len() + 1];
    let mut acc = 0.0;
    for k in (0..s.len()).rev() {
        acc += s[k] * s[k];
        tail[k] = acc.sqrt();
    }
    tail
}

/// Smallest `k ≥ 1` with `tail[k] < bound`, or the full rank when none is
fn smallest_rank_below(tail: &[f64], bound: f64) -> (usize, bool) {
    match tail.iter().position(|&t| t < bound) {
        Some(k) => (k.max(1), true),
        None => (tail.len(), false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const S: [f64; 5] = [5.0, 3.0, 1.0, 0.1, 0.01];

    #[test]
    fn test_fixed_rank_full() {
        let c = trunc_rank(&S, S.len(), None, None).unwrap();
        assert_eq!(c.rank, 5);
        assert_eq!(c.error, 0.0);
        assert!(c.satisfied);
    }

    #[test]
    fn test_max_rank_capped_at_len() {
        let c = trunc_rank(&S, 100, None, None).unwrap();
        assert_eq!(c.rank, 5);
    }

    #[test]
    fn test_abs_err_selects_smallest_rank() {
        // tail(2) = sqrt(1 + 0.01 + 0.0001) ≈ 1.005, tail(3) ≈ 0.1005
        let c = trunc_rank(&S, 5, Some(0.5), None).unwrap();
        assert_eq!(c.rank, 3);
        assert!((c.error - (0.1f64 * 0.1 + 0.01 * 0.01).sqrt()).abs() < 1e-14);
        assert!(c.satisfied);
    }

    #[test]
    fn test_huge_abs_err_keeps_one() {
        let c = trunc_rank(&S, 1, Some(1e9), None).unwrap();
        assert_eq!(c.rank, 1);
        assert!(c.satisfied);
        let c = trunc_rank(&S, 5, Some(1e9), None).unwrap();
        assert_eq!(c.rank, 1);
    }

    #[test]
    fn test_unreachable_target_falls_back_to_full_rank() {
        let c = trunc_rank(&[1.0, 1.0], 5, Some(1e-30), None).unwrap();
        assert_eq!(c.rank, 2);
        assert_eq!(c.error, 0.0);
        assert!(!c.satisfied);
    }

    #[test]
    fn test_max_rank_dominates() {
        let c = trunc_rank(&S, 2, Some(1e-6), None).unwrap();
        assert_eq!(c.rank, 2);
        assert!(!c.satisfied);
        assert!(c.error > 1.0);
    }

    #[test]
    fn test_both_bounds_take_larger_rank() {
        let norm = S.iter().map(|v| v * v).sum::<f64>().sqrt();
        let only_abs = trunc_rank(&S, 5, Some(2.0), None).unwrap();
        let only_rel = trunc_rank(&S, 5, None, Some(0.05 / norm)).unwrap();
        let both = trunc_rank(&S, 5, Some(2.0), Some(0.05 / norm)).unwrap();
        assert_eq!(only_abs.rank, 2);
        assert_eq!(only_rel.rank, 4);
        assert_eq!(both.rank, 4);
    }

    #[test]
    fn test_all_zero_singular_values() {
        let c = trunc_rank(&[0.0, 0.0, 0.0], 3, Some(1e-12), None).unwrap();
        assert_eq!(c.rank, 1);
        assert_eq!(c.error, 0.0);
    }

    #[test]
    fn test_invalid_arguments() {
        assert!(trunc_rank(&[], 1, None, None).is_err());
        assert!(trunc_rank(&S, 0, None, None).is_err());
        assert!(trunc_rank(&S, 1, Some(0.0), None).is_err());
        assert!(trunc_rank(&S, 1, None, Some(-0.1)).is_err());
        assert!(trunc_rank(&[1.0, -1.0], 1, None, None).is_err());
    }
}
