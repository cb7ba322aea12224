//! Hadamard product with simultaneous truncation
//!
//! Both operands are orthogonalized and every node basis is rotated onto the
//! left singular vectors of the node matricization, read off the reduced
//! Gramians. The exact product then has one basis column per pair of rotated
//! columns `(i, j)`, weighted by `σ_i(x) · σ_j(y)`. Each node keeps the pairs
//! with the largest weights:
//!
//! - leaves: `(U_x u_x[:, i]) ∘ (U_y u_y[:, j])` for every kept pair
//! - transfer tensors: the elementwise product of both operands' transfer
//!   tensors, each projected onto its kept pairs along all three axes (the
//!   root along its two child axes only)

use htucker_core::left_svd_via_gram;
use scirs2_core::ndarray_ext::{Array1, Array2, Array3, Axis};

use crate::config::TruncationConfig;
use crate::error::{HtError, HtResult};
use crate::kernels::mode_product3;
use crate::report::TruncationReport;
use crate::tensor::{collect_nodes, HTucker, NodeData};

/// Kept column pairs of one node, as selection matrices of both operands
struct Selection {
    x: Array2<f64>,
    y: Array2<f64>,
}

impl HTucker {
    /// Elementwise product `self ∘ other`, truncated node by node
    ///
    /// Only `max_rank` and `abs_err` of `config` are used; the absolute
    /// target is split over the nodes as in [`HTucker::truncate`]. The result
    /// is not orthogonal.
    #[tracing::instrument(level = "debug", skip_all, fields(order = self.order(), max_rank = config.max_rank))]
    pub fn ews_multiplication(
        &self,
        other: &HTucker,
        config: &TruncationConfig,
    ) -> HtResult<(HTucker, TruncationReport)> {
        config.validate()?;
        self.check_same_structure(other, "ews_multiplication")?;
        let node_config = TruncationConfig {
            rel_err: None,
            ..*config
        }
        .per_node(self.order());

        let x = self.orthogonalize()?;
        let y = other.orthogonalize()?;
        let gx = x.gramians_orthog()?;
        let gy = y.gramians_orthog()?;

        let tree = x.tree();
        let n = tree.nr_nodes();
        let mut report = TruncationReport::new(n);
        let mut selections: Vec<Option<Selection>> = (0..n).map(|_| None).collect();

        for t in 1..n {
            let (ux, sx) = left_svd_via_gram(&gx[t].view())?;
            let (uy, sy) = left_svd_via_gram(&gy[t].view())?;

            let mut pairs: Vec<(f64, usize, usize)> = Vec::with_capacity(sx.len() * sy.len());
            for (j, &b) in sy.iter().enumerate() {
                for (i, &a) in sx.iter().enumerate() {
                    pairs.push((a * b, i, j));
                }
            }
            pairs.sort_by(|p, q| q.0.total_cmp(&p.0));

            let weights: Array1<f64> = pairs.iter().map(|p| p.0).collect();
            let choice = node_config.choose_rank(&weights.to_vec())?;
            let kept = &pairs[..choice.rank];
            let cols_x: Vec<usize> = kept.iter().map(|p| p.1).collect();
            let cols_y: Vec<usize> = kept.iter().map(|p| p.2).collect();
            selections[t] = Some(Selection {
                x: ux.select(Axis(1), &cols_x),
                y: uy.select(Axis(1), &cols_y),
            });
            report.record(t, choice, weights);
        }

        let mut nodes = Vec::with_capacity(n);
        for t in 0..n {
            let node = match tree.children(t) {
                None => {
                    let sel = selected(&selections, t)?;
                    NodeData::Leaf(x.u(t)?.dot(&sel.x) * &y.u(t)?.dot(&sel.y))
                }
                Some((l, r)) => {
                    let (sl, sr) = (selected(&selections, l)?, selected(&selections, r)?);
                    let mut bx = project(x.b(t)?, &sl.x, &sr.x)?;
                    let mut by = project(y.b(t)?, &sl.y, &sr.y)?;
                    if t != 0 {
                        let st = selected(&selections, t)?;
                        bx = mode_product3(&bx, &st.x.t(), 2)?;
                        by = mode_product3(&by, &st.y.t(), 2)?;
                    }
                    NodeData::Transfer(bx * &by)
                }
            };
            nodes.push(Some(node));
        }

        let z = HTucker::new(collect_nodes(nodes)?, tree.clone(), false)?;
        Ok((z, report))
    }
}

fn selected(selections: &[Option<Selection>], t: usize) -> HtResult<&Selection> {
    selections[t].as_ref().ok_or_else(|| {
        HtError::StructuralMismatch(format!("node {} has no selection", t))
    })
}

/// `B ×₀ S_lᵀ ×₁ S_rᵀ`
fn project(b: &Array3<f64>, sl: &Array2<f64>, sr: &Array2<f64>) -> HtResult<Array3<f64>> {
    mode_product3(&mode_product3(b, &sl.t(), 0)?, &sr.t(), 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use htucker_core::DenseND;

    fn dense(shape: &[usize], phase: f64) -> DenseND<f64> {
        DenseND::from_shape_fn(shape, |ix| {
            let s: f64 = ix.iter().enumerate().map(|(k, &i)| (k as f64 + 1.0) * i as f64).sum();
            1.0 / (3.0 + (0.3 * s + phase).sin())
        })
    }

    fn hadamard(a: &DenseND<f64>, b: &DenseND<f64>) -> DenseND<f64> {
        DenseND::from_array(a.as_array() * b.as_array())
    }

    #[test]
    fn test_exact_at_full_pair_rank() {
        let a = dense(&[3, 4, 3], 0.0);
        let b = dense(&[3, 4, 3], 1.0);
        let (x, _) = HTucker::truncate(&a, &TruncationConfig::new(3), None).unwrap();
        let (y, _) = HTucker::truncate(&b, &TruncationConfig::new(3), None).unwrap();
        let (z, report) = x.ews_multiplication(&y, &TruncationConfig::new(64)).unwrap();
        assert!(!z.is_orthog());
        let expected = hadamard(&x.full().unwrap(), &y.full().unwrap());
        let err = (&z.full().unwrap() - &expected).frobenius_norm();
        assert!(err < 1e-9 * expected.frobenius_norm());
        assert!(report.node(0).is_none());
    }

    #[test]
    fn test_truncated_product_is_close() {
        let a = dense(&[5, 5, 5, 5], 0.2);
        let (x, _) = HTucker::truncate(&a, &TruncationConfig::new(5), None).unwrap();
        let expected = hadamard(&x.full().unwrap(), &x.full().unwrap());

        let (z, _) = x
            .ews_multiplication(&x, &TruncationConfig::new(12).abs_err(1e-6))
            .unwrap();
        assert!(z.ranks().iter().all(|&r| r <= 12));
        let rel = (&z.full().unwrap() - &expected).frobenius_norm() / expected.frobenius_norm();
        assert!(rel < 1e-1, "relative error {}", rel);

        // 25 = 5 * 5 keeps every pair
        let (full, _) = x.ews_multiplication(&x, &TruncationConfig::new(25)).unwrap();
        let rel = (&full.full().unwrap() - &expected).frobenius_norm() / expected.frobenius_norm();
        assert!(rel < 1e-10, "relative error {}", rel);
    }

    #[test]
    fn test_relative_error_is_ignored() {
        let a = dense(&[4, 3, 4, 3], 0.7);
        let (x, _) = HTucker::truncate(&a, &TruncationConfig::new(4), None).unwrap();

        let absolute = TruncationConfig::new(6).abs_err(1e-4);
        let (z_abs, report_abs) = x.ews_multiplication(&x, &absolute).unwrap();
        let (z_both, report_both) = x.ews_multiplication(&x, &absolute.rel_err(0.9)).unwrap();
        assert_eq!(z_abs.nodes(), z_both.nodes());
        assert_eq!(report_abs, report_both);

        // a relative target alone leaves the fixed-rank mode in charge
        let (z_fixed, _) = x.ews_multiplication(&x, &TruncationConfig::new(3)).unwrap();
        let (z_rel, _) = x
            .ews_multiplication(&x, &TruncationConfig::new(3).rel_err(0.5))
            .unwrap();
        assert_eq!(z_fixed.nodes(), z_rel.nodes());
        assert_eq!(z_rel.ranks(), z_fixed.ranks());
    }

    #[test]
    fn test_rank_one_operands() {
        let ones = DenseND::ones(&[2, 3, 4]);
        let (x, _) = HTucker::truncate(&ones, &TruncationConfig::new(1), None).unwrap();
        let b = dense(&[2, 3, 4], 0.4);
        let (y, _) = HTucker::truncate(&b, &TruncationConfig::new(4), None).unwrap();
        // ranks above the numerical rank still carry orthonormal bases
        assert!(x.is_orthogonal_within(1e-10));
        assert!(y.is_orthogonal_within(1e-10));
        let (z, _) = x.ews_multiplication(&y, &TruncationConfig::new(4)).unwrap();
        let err = (&z.full().unwrap() - &y.full().unwrap()).frobenius_norm();
        assert!(err < 1e-9 * b.frobenius_norm());
    }

    #[test]
    fn test_rejects_mismatched_operands() {
        let (x, _) = HTucker::truncate(&dense(&[2, 3, 4], 0.0), &TruncationConfig::new(2), None).unwrap();
        let (y, _) = HTucker::truncate(&dense(&[2, 3, 5], 0.0), &TruncationConfig::new(2), None).unwrap();
        assert!(x.ews_multiplication(&y, &TruncationConfig::new(2)).is_err());
    }
}
