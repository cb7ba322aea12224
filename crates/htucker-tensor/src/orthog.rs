//! Orthogonalization and reduced Gramians
//!
//! An orthogonal tensor has leaves with orthonormal columns and non-root
//! transfer tensors that are column-orthonormal over their two child axes, so
//! every node basis is orthonormal. Its reduced Gramians `G_t: (r_t × r_t)`
//! then satisfy `A_(t) A_(t)ᵀ = U_t G_t U_tᵀ` and are computed top-down:
//!
//! ```text
//! G_root = [[1]]
//! G_left  = B_(0) (B ×₂ G_t)_(0)ᵀ
//! G_right = B_(1) (B ×₂ G_t)_(1)ᵀ
//! ```

use std::collections::VecDeque;

use htucker_core::thin_qr;
use scirs2_core::ndarray_ext::{Array2, Array3};

use crate::error::{HtError, HtResult};
use crate::kernels::{matrix_to_transfer, mode_product3, transfer_to_matrix, unfold3};
use crate::tensor::{collect_nodes, HTucker, NodeData};

impl HTucker {
    /// Equivalent orthogonal tensor
    ///
    /// QR factors are pushed from the leaves towards the root. Ranks may
    /// shrink where a factor has fewer rows than columns. An already orthogonal
    /// tensor is returned unchanged.
    #[tracing::instrument(level = "debug", skip_all, fields(order = self.order()))]
    pub fn orthogonalize(&self) -> HtResult<HTucker> {
        if self.is_orthog() {
            return Ok(self.clone());
        }
        let tree = self.tree();
        let n = tree.nr_nodes();
        let mut nodes: Vec<Option<NodeData>> = vec![None; n];
        let mut r_factors: Vec<Option<Array2<f64>>> = vec![None; n];

        for t in tree.post_order() {
            match tree.children(t) {
                None => {
                    let (q, r) = thin_qr(&self.u(t)?.view())?;
                    nodes[t] = Some(NodeData::Leaf(q));
                    r_factors[t] = Some(r);
                }
                Some((l, r)) => {
                    let b = absorb_children(self.b(t)?, &r_factors, l, r)?;
                    if t == 0 {
                        nodes[t] = Some(NodeData::Transfer(b));
                        continue;
                    }
                    let (rl, rr, _) = b.dim();
                    let (q, rt) = thin_qr(&transfer_to_matrix(&b).view())?;
                    nodes[t] = Some(NodeData::Transfer(matrix_to_transfer(&q.view(), rl, rr)?));
                    r_factors[t] = Some(rt);
                }
            }
        }

        HTucker::new(collect_nodes(nodes)?, tree.clone(), true)
    }

    /// Reduced Gramians of an orthogonal tensor, indexed by node id
    ///
    /// # Errors
    ///
    /// [`HtError::NotOrthogonal`] unless the tensor is flagged orthogonal.
    pub fn gramians_orthog(&self) -> HtResult<Vec<Array2<f64>>> {
        if !self.is_orthog() {
            return Err(HtError::NotOrthogonal);
        }
        let tree = self.tree();
        let mut grams = vec![Array2::zeros((0, 0)); tree.nr_nodes()];
        grams[0] = Array2::ones((1, 1));

        let mut queue = VecDeque::from([0]);
        while let Some(t) = queue.pop_front() {
            let Some((l, r)) = tree.children(t) else {
                continue;
            };
            let b = self.b(t)?;
            let bmod = mode_product3(b, &grams[t].view(), 2)?;
            grams[l] = unfold3(b, 0)?.dot(&unfold3(&bmod, 0)?.t());
            grams[r] = unfold3(b, 1)?.dot(&unfold3(&bmod, 1)?.t());
            queue.push_back(l);
            queue.push_back(r);
        }
        Ok(grams)
    }
}

/// `B ×₀ R_left ×₁ R_right`
fn absorb_children(
    b: &Array3<f64>,
    r_factors: &[Option<Array2<f64>>],
    l: usize,
    r: usize,
) -> HtResult<Array3<f64>> {
    match (&r_factors[l], &r_factors[r]) {
        (Some(rl), Some(rr)) => mode_product3(&mode_product3(b, &rl.view(), 0)?, &rr.view(), 1),
        _ => Err(HtError::StructuralMismatch(
            "child visited after its parent".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TruncationConfig;
    use htucker_core::{DenseND, DimTree};

    fn skewed() -> HTucker {
        // deliberately non-orthogonal factors
        let tree = DimTree::canonical(3).unwrap();
        let nodes = vec![
            NodeData::Transfer(Array3::from_shape_fn((2, 2, 1), |(a, b, _)| 1.0 + a as f64 - 0.5 * b as f64)),
            NodeData::Transfer(Array3::from_shape_fn((2, 3, 2), |(a, b, c)| ((a + 2 * b + 3 * c) as f64).cos())),
            NodeData::Leaf(Array2::from_shape_fn((4, 2), |(i, j)| (i + 1) as f64 * (j as f64 + 0.3))),
            NodeData::Leaf(Array2::from_shape_fn((3, 2), |(i, j)| (i * j) as f64 + 1.0)),
            NodeData::Leaf(Array2::from_shape_fn((5, 3), |(i, j)| ((i + 3 * j) as f64).sin())),
        ];
        HTucker::new(nodes, tree, false).unwrap()
    }

    #[test]
    fn test_orthogonalize_preserves_tensor() {
        let x = skewed();
        let y = x.orthogonalize().unwrap();
        assert!(y.is_orthog());
        assert!(y.is_orthogonal_within(1e-10));
        let diff = (&x.full().unwrap() - &y.full().unwrap()).frobenius_norm();
        assert!(diff < 1e-10 * x.full().unwrap().frobenius_norm().max(1.0));
    }

    #[test]
    fn test_orthogonalize_wide_factors() {
        let a = DenseND::from_shape_fn(&[2, 3, 4], |ix| 1.0 / (1.0 + (ix[0] + 2 * ix[1] + 3 * ix[2]) as f64));
        let (x, _) = HTucker::truncate(&a, &TruncationConfig::new(3), None).unwrap();
        // doubling every rank leaves the leaf of mode 0 with 2 rows and 4 columns
        let sum = x.add(&x).unwrap();
        let leaf = sum.tree().leaf_of_mode(0);
        assert!(sum.leaf(leaf).unwrap().ncols() > 2);

        let y = sum.orthogonalize().unwrap();
        assert!(y.is_orthogonal_within(1e-10));
        assert!(y.leaf(leaf).unwrap().ncols() <= 2);
        let expected = sum.full().unwrap();
        let diff = (&y.full().unwrap() - &expected).frobenius_norm();
        assert!(diff < 1e-10 * expected.frobenius_norm(), "difference {}", diff);
    }

    #[test]
    fn test_orthogonalize_is_idempotent_on_flag() {
        let y = skewed().orthogonalize().unwrap();
        let z = y.orthogonalize().unwrap();
        assert_eq!(y.ranks(), z.ranks());
        assert_eq!(y.nodes(), z.nodes());
    }

    #[test]
    fn test_gramians_match_dense_matricization() {
        let x = skewed().orthogonalize().unwrap();
        let grams = x.gramians_orthog().unwrap();
        let full = x.full().unwrap();
        for (mode, &leaf) in x.tree().dim2ind().iter().enumerate() {
            let m = full.matricize(&[mode]).unwrap();
            let u = x.leaf(leaf).unwrap();
            let lhs = m.dot(&m.t());
            let rhs = u.dot(&grams[leaf]).dot(&u.t());
            assert!((&lhs - &rhs).iter().all(|v| v.abs() < 1e-9));
        }
        assert_eq!(grams[0], Array2::<f64>::ones((1, 1)));
    }

    #[test]
    fn test_gramians_require_orthogonal_input() {
        assert!(matches!(skewed().gramians_orthog(), Err(HtError::NotOrthogonal)));
        let a = DenseND::from_shape_fn(&[3, 3, 3], |ix| (ix[0] * ix[1] + ix[2]) as f64);
        let (x, _) = HTucker::truncate(&a, &TruncationConfig::new(3), None).unwrap();
        assert!(x.gramians_orthog().is_ok());
    }
}
