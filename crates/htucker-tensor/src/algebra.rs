//! Exact algebra in HT format
//!
//! None of these operations truncate. Addition grows ranks, the mode
//! products touch a single leaf, and the inner product contracts two tensors
//! bottom-up through their cross Gramians.

use scirs2_core::ndarray_ext::{s, Array2, Array3, ArrayView1, ArrayView2, Axis};

use crate::error::{HtError, HtResult};
use crate::kernels::{cross_project, hstack};
use crate::tensor::{HTucker, NodeData};

impl HTucker {
    /// Exact sum `self + other`
    ///
    /// Leaf factors are concatenated and transfer tensors embedded
    /// block-diagonally, so every non-root rank is the sum of the operand
    /// ranks. The result is not orthogonal.
    #[allow(clippy::should_implement_trait)]
    pub fn add(&self, other: &HTucker) -> HtResult<HTucker> {
        self.check_same_structure(other, "add")?;
        let tree = self.tree();
        let mut nodes = Vec::with_capacity(tree.nr_nodes());
        for (t, (nx, ny)) in self.nodes().iter().zip(other.nodes()).enumerate() {
            let node = match (nx, ny) {
                (NodeData::Leaf(ux), NodeData::Leaf(uy)) => NodeData::Leaf(hstack(&[ux, uy])?),
                (NodeData::Transfer(bx), NodeData::Transfer(by)) => {
                    NodeData::Transfer(embed_block_diagonal(bx, by, t == 0))
                }
                _ => {
                    return Err(HtError::StructuralMismatch(format!(
                        "node {} differs in kind between the operands",
                        t
                    )))
                }
            };
            nodes.push(node);
        }
        HTucker::new(nodes, tree.clone(), false)
    }

    /// `alpha · self`
    ///
    /// Only the root transfer tensor is rescaled; the orthogonality flag is
    /// kept. The result owns a full copy of the payloads.
    pub fn scalar_mul(&self, alpha: f64) -> HtResult<HTucker> {
        let (mut nodes, tree, is_orthog) = self.clone().into_parts();
        if let Some(NodeData::Transfer(b)) = nodes.first_mut() {
            b.mapv_inplace(|v| v * alpha);
        }
        HTucker::new(nodes, tree, is_orthog)
    }

    /// Mode product `self ×_mode a` with a dense `a: (m × shape[mode])`
    ///
    /// Only the leaf factor of `mode` changes (`U ← a U`); the size of the mode
    /// becomes `m`, ranks are untouched. The result is not orthogonal.
    pub fn mode_multiplication(&self, a: &ArrayView2<f64>, mode: usize) -> HtResult<HTucker> {
        self.check_mode(mode)?;
        if a.ncols() != self.shape()[mode] || a.nrows() == 0 {
            return Err(HtError::ShapeMismatch(format!(
                "matrix of shape {:?} cannot act on mode {} of size {}",
                a.dim(),
                mode,
                self.shape()[mode]
            )));
        }
        let leaf = self.tree().leaf_of_mode(mode);
        let product = a.dot(self.u(leaf)?);
        self.with_leaf(leaf, product)
    }

    /// Scale every slice of `mode` by the matching entry of `v`
    ///
    /// Equivalent to a mode product with `diag(v)`: row `i` of the leaf factor
    /// is multiplied by `v[i]`. The result is not orthogonal.
    pub fn ews_mode_multiplication(&self, v: &ArrayView1<f64>, mode: usize) -> HtResult<HTucker> {
        self.check_mode(mode)?;
        if v.len() != self.shape()[mode] {
            return Err(HtError::ShapeMismatch(format!(
                "vector of length {} cannot scale mode {} of size {}",
                v.len(),
                mode,
                self.shape()[mode]
            )));
        }
        let leaf = self.tree().leaf_of_mode(mode);
        let scaled = self.u(leaf)? * &v.view().insert_axis(Axis(1));
        self.with_leaf(leaf, scaled)
    }

    /// Euclidean inner product `⟨self, other⟩`
    ///
    /// # Examples
    ///
    /// ```
    /// use htucker_core::DenseND;
    /// use htucker_tensor::{HTucker, TruncationConfig};
    ///
    /// let a = DenseND::<f64>::from_shape_fn(&[2, 3, 2], |ix| (ix[0] + ix[1] * ix[2]) as f64);
    /// let (x, _) = HTucker::truncate(&a, &TruncationConfig::new(6), None).unwrap();
    /// let dot = x.inner_product(&x).unwrap();
    /// let norm = x.norm().unwrap();
    /// assert!((dot - norm * norm).abs() < 1e-9);
    /// ```
    pub fn inner_product(&self, other: &HTucker) -> HtResult<f64> {
        self.check_same_structure(other, "inner_product")?;
        let tree = self.tree();
        let mut cross: Vec<Array2<f64>> = vec![Array2::zeros((0, 0)); tree.nr_nodes()];
        for t in tree.post_order() {
            cross[t] = match tree.children(t) {
                None => self.u(t)?.t().dot(other.u(t)?),
                Some((l, r)) => cross_project(
                    &cross[l].view(),
                    &cross[r].view(),
                    self.b(t)?,
                    other.b(t)?,
                )?,
            };
        }
        Ok(cross[0][[0, 0]])
    }

    /// Frobenius norm
    ///
    /// Orthogonalizes when needed; the norm of an orthogonal tensor is the
    /// norm of its root transfer tensor.
    pub fn norm(&self) -> HtResult<f64> {
        let orthogonal;
        let x = if self.is_orthog() {
            self
        } else {
            orthogonal = self.orthogonalize()?;
            &orthogonal
        };
        Ok(x.b(0)?.iter().map(|v| v * v).sum::<f64>().sqrt())
    }

    pub(crate) fn check_mode(&self, mode: usize) -> HtResult<()> {
        if mode >= self.order() {
            return Err(HtError::InvalidArgument(format!(
                "mode {} out of range for an order-{} tensor",
                mode,
                self.order()
            )));
        }
        Ok(())
    }

    /// Copy of `self` with the factor of `leaf` replaced, not orthogonal
    fn with_leaf(&self, leaf: usize, u: Array2<f64>) -> HtResult<HTucker> {
        let (mut nodes, tree, _) = self.clone().into_parts();
        nodes[leaf] = NodeData::Leaf(u);
        HTucker::new(nodes, tree, false)
    }
}

/// Block-diagonal embedding of two transfer tensors
///
/// At the root both blocks share the single output index.
fn embed_block_diagonal(bx: &Array3<f64>, by: &Array3<f64>, root: bool) -> Array3<f64> {
    let (lx, rx, tx) = bx.dim();
    let (ly, ry, ty) = by.dim();
    if root {
        let mut b = Array3::zeros((lx + ly, rx + ry, 1));
        b.slice_mut(s![..lx, ..rx, ..]).assign(bx);
        b.slice_mut(s![lx.., rx.., ..]).assign(by);
        b
    } else {
        let mut b = Array3::zeros((lx + ly, rx + ry, tx + ty));
        b.slice_mut(s![..lx, ..rx, ..tx]).assign(bx);
        b.slice_mut(s![lx.., rx.., tx..]).assign(by);
        b
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TruncationConfig;
    use htucker_core::{mode_multiply, DenseND};
    use scirs2_core::ndarray_ext::Array1;

    fn dense(shape: &[usize], phase: f64) -> DenseND<f64> {
        DenseND::from_shape_fn(shape, |ix| {
            let s: f64 = ix.iter().enumerate().map(|(k, &i)| (k as f64 + 0.5) * i as f64).sum();
            (0.3 * s + phase).cos()
        })
    }

    fn ht(shape: &[usize], phase: f64) -> HTucker {
        HTucker::truncate(&dense(shape, phase), &TruncationConfig::new(8), None)
            .unwrap()
            .0
    }

    fn close(a: &DenseND<f64>, b: &DenseND<f64>, tol: f64) -> bool {
        (a - b).frobenius_norm() <= tol * b.frobenius_norm().max(1.0)
    }

    #[test]
    fn test_add_is_exact() {
        let x = ht(&[3, 4, 2, 3], 0.2);
        let y = ht(&[3, 4, 2, 3], 1.1);
        let z = x.add(&y).unwrap();
        assert!(!z.is_orthog());
        for t in 1..z.tree().nr_nodes() {
            assert_eq!(z.rank(t), x.rank(t) + y.rank(t));
        }
        assert_eq!(z.rank(0), 1);
        let expected = &x.full().unwrap() + &y.full().unwrap();
        assert!(close(&z.full().unwrap(), &expected, 1e-10));
    }

    #[test]
    fn test_add_rejects_other_shape() {
        let x = ht(&[3, 4, 2], 0.2);
        let y = ht(&[3, 4, 3], 0.2);
        assert!(matches!(x.add(&y), Err(HtError::ShapeMismatch(_))));
    }

    #[test]
    fn test_scalar_mul() {
        let x = ht(&[2, 3, 4], 0.4);
        let y = x.scalar_mul(-2.5).unwrap();
        assert!(y.is_orthog());
        let mut expected = x.full().unwrap().into_array();
        expected.mapv_inplace(|v| -2.5 * v);
        assert!(close(&y.full().unwrap(), &DenseND::from_array(expected), 1e-12));
    }

    #[test]
    fn test_mode_multiplication_matches_dense() {
        let a = dense(&[3, 4, 5], 0.0);
        let x = HTucker::truncate(&a, &TruncationConfig::new(20), None).unwrap().0;
        let m = Array2::from_shape_fn((2, 4), |(i, j)| (i as f64 + 1.0) * (j as f64 - 1.5));
        let y = x.mode_multiplication(&m.view(), 1).unwrap();
        assert_eq!(y.shape(), &[3, 2, 5]);
        let expected = DenseND::from_array(mode_multiply(&a.view(), &m.view(), 1).unwrap());
        assert!(close(&y.full().unwrap(), &expected, 1e-10));
        assert!(x.mode_multiplication(&m.view(), 0).is_err());
        assert!(x.mode_multiplication(&m.view(), 3).is_err());
    }

    #[test]
    fn test_ews_mode_multiplication_scales_slices() {
        let a = dense(&[3, 4, 5], 0.7);
        let x = HTucker::truncate(&a, &TruncationConfig::new(20), None).unwrap().0;
        let v = Array1::from_vec(vec![1.0, -2.0, 0.5, 3.0, 0.0]);
        let y = x.ews_mode_multiplication(&v.view(), 2).unwrap();
        let full = y.full().unwrap();
        for i in 0..3 {
            for j in 0..4 {
                for k in 0..5 {
                    assert!((full[&[i, j, k][..]] - v[k] * a[&[i, j, k][..]]).abs() < 1e-10);
                }
            }
        }
        assert!(x.ews_mode_multiplication(&v.view(), 0).is_err());
    }

    #[test]
    fn test_inner_product_and_norm_agree() {
        let x = ht(&[3, 2, 4, 2, 3], 0.3);
        let y = x.add(&x).unwrap();
        let nx = x.norm().unwrap();
        let ny = y.norm().unwrap();
        assert!((x.inner_product(&x).unwrap() - nx * nx).abs() < 1e-9 * nx * nx);
        assert!((ny - 2.0 * nx).abs() < 1e-9 * nx);
        assert!((nx - x.full().unwrap().frobenius_norm()).abs() < 1e-10 * nx);
    }

    #[test]
    fn test_inner_product_is_bilinear() {
        let x = ht(&[3, 3, 4], 0.1);
        let y = ht(&[3, 3, 4], 0.9);
        let z = ht(&[3, 3, 4], 2.0);
        let lhs = x.add(&y).unwrap().inner_product(&z).unwrap();
        let rhs = x.inner_product(&z).unwrap() + y.inner_product(&z).unwrap();
        assert!((lhs - rhs).abs() < 1e-9 * lhs.abs().max(1.0));
    }
}
