//! Mode products and dense tensor contraction
//!
//! For tensor X ∈ ℝ^(I₁×...×Iₙ) and matrix M ∈ ℝ^(J×Iₖ), the mode-k product
//! Y = X ×ₖ M has shape (I₁×...×Iₖ₋₁×J×Iₖ₊₁×...×Iₙ). The axis order of X is
//! preserved; only the size of axis k changes.
//!
//! Multilinear (Tucker) multiplication applies a list of mode products in
//! sequence. [`tensordot`] is the general pairwise contraction used to verify
//! compressed-format contractions against their dense counterparts.

use anyhow::Result;
use scirs2_core::ndarray_ext::{Array, Array2, ArrayView, ArrayView2, Ix2, IxDyn};
use scirs2_core::numeric::Float;

use crate::dense::inverse_permutation;

/// Compute the mode product `tensor ×ₘ matrix`
///
/// Contracts the second axis of `matrix` against axis `mode` of `tensor` and
/// puts the resulting axis back at position `mode`.
///
/// # Errors
///
/// Returns error if the mode is out of bounds or the matrix column count does
/// not match the mode size.
///
/// # Examples
///
/// ```
/// use scirs2_core::ndarray_ext::{Array, array};
/// use htucker_core::mode_multiply;
///
/// let tensor = Array::from_shape_vec(vec![2, 3, 4], (0..24).map(|x| x as f64).collect()).unwrap();
/// let matrix = array![[1.0, 0.0, 0.0], [0.0, 1.0, 1.0]];
/// let result = mode_multiply(&tensor.view(), &matrix.view(), 1).unwrap();
/// assert_eq!(result.shape(), &[2, 2, 4]);
/// assert_eq!(result[[1, 1, 3]], tensor[[1, 1, 3]] + tensor[[1, 2, 3]]);
/// ```
pub fn mode_multiply<T>(
    tensor: &ArrayView<T, IxDyn>,
    matrix: &ArrayView2<T>,
    mode: usize,
) -> Result<Array<T, IxDyn>>
where
    T: Float + 'static,
{
    let shape = tensor.shape().to_vec();
    if mode >= shape.len() {
        anyhow::bail!(
            "Mode {} out of bounds for tensor with {} modes",
            mode,
            shape.len()
        );
    }
    if matrix.ncols() != shape[mode] {
        anyhow::bail!(
            "Matrix columns ({}) must match tensor mode-{} size ({})",
            matrix.ncols(),
            mode,
            shape[mode]
        );
    }

    let mut perm = Vec::with_capacity(shape.len());
    perm.push(mode);
    perm.extend((0..shape.len()).filter(|&i| i != mode));

    let rest: usize = shape
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != mode)
        .map(|(_, &s)| s)
        .product();

    let unfolded = tensor
        .view()
        .permuted_axes(IxDyn(&perm))
        .as_standard_layout()
        .into_owned()
        .into_shape_with_order((shape[mode], rest))?;

    let product = matrix.dot(&unfolded);

    let mut folded_shape = Vec::with_capacity(shape.len());
    folded_shape.push(matrix.nrows());
    folded_shape.extend(perm[1..].iter().map(|&i| shape[i]));

    let folded = product.into_shape_with_order(IxDyn(&folded_shape))?;
    Ok(folded
        .permuted_axes(IxDyn(&inverse_permutation(&perm)))
        .as_standard_layout()
        .into_owned())
}

/// Sequential mode products `tensor ×ₘ₁ M₁ ×ₘ₂ M₂ ...`
///
/// Matrices are applied in list order. Since every mode product keeps the
/// axis order intact, `modes[i]` always refers to the same axis of the input.
pub fn multilinear_multiply<T>(
    tensor: &ArrayView<T, IxDyn>,
    matrices: &[ArrayView2<T>],
    modes: &[usize],
) -> Result<Array<T, IxDyn>>
where
    T: Float + 'static,
{
    if matrices.len() != modes.len() {
        anyhow::bail!(
            "Number of matrices ({}) must match number of modes ({})",
            matrices.len(),
            modes.len()
        );
    }

    let mut result = tensor.to_owned();
    for (matrix, &mode) in matrices.iter().zip(modes.iter()) {
        result = mode_multiply(&result.view(), matrix, mode)?;
    }
    Ok(result)
}

/// Contract `axes_a` of `a` with `axes_b` of `b` pairwise
///
/// The result carries the free axes of `a` followed by the free axes of `b`,
/// each in their original relative order.
///
/// # Examples
///
/// ```
/// use scirs2_core::ndarray_ext::Array;
/// use htucker_core::tensordot;
///
/// let a = Array::from_shape_vec(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
/// let b = Array::from_shape_vec(vec![3, 1], vec![1.0, 1.0, 1.0]).unwrap();
/// let c = tensordot(&a.view(), &b.view(), &[1], &[0]).unwrap();
/// assert_eq!(c.shape(), &[2, 1]);
/// assert_eq!(c[[1, 0]], 15.0);
/// ```
pub fn tensordot<T>(
    a: &ArrayView<T, IxDyn>,
    b: &ArrayView<T, IxDyn>,
    axes_a: &[usize],
    axes_b: &[usize],
) -> Result<Array<T, IxDyn>>
where
    T: Float + 'static,
{
    if axes_a.len() != axes_b.len() {
        anyhow::bail!(
            "Contracted axis lists differ in length: {:?} vs {:?}",
            axes_a,
            axes_b
        );
    }
    for (&ia, &ib) in axes_a.iter().zip(axes_b.iter()) {
        if ia >= a.ndim() || ib >= b.ndim() {
            anyhow::bail!("Contracted axis pair ({}, {}) out of bounds", ia, ib);
        }
        if a.shape()[ia] != b.shape()[ib] {
            anyhow::bail!(
                "Contracted axes have different sizes: {} vs {}",
                a.shape()[ia],
                b.shape()[ib]
            );
        }
    }

    let free_a: Vec<usize> = (0..a.ndim()).filter(|i| !axes_a.contains(i)).collect();
    let free_b: Vec<usize> = (0..b.ndim()).filter(|i| !axes_b.contains(i)).collect();
    if free_a.len() + axes_a.len() != a.ndim() || free_b.len() + axes_b.len() != b.ndim() {
        anyhow::bail!("Duplicate contracted axes in {:?} / {:?}", axes_a, axes_b);
    }

    let inner: usize = axes_a.iter().map(|&i| a.shape()[i]).product();
    let outer_a: usize = free_a.iter().map(|&i| a.shape()[i]).product();
    let outer_b: usize = free_b.iter().map(|&i| b.shape()[i]).product();

    let perm_a: Vec<usize> = free_a.iter().chain(axes_a.iter()).copied().collect();
    let perm_b: Vec<usize> = axes_b.iter().chain(free_b.iter()).copied().collect();

    let mat_a: Array2<T> = a
        .view()
        .permuted_axes(IxDyn(&perm_a))
        .as_standard_layout()
        .into_owned()
        .into_shape_with_order(IxDyn(&[outer_a, inner]))?
        .into_dimensionality::<Ix2>()?;
    let mat_b: Array2<T> = b
        .view()
        .permuted_axes(IxDyn(&perm_b))
        .as_standard_layout()
        .into_owned()
        .into_shape_with_order(IxDyn(&[inner, outer_b]))?
        .into_dimensionality::<Ix2>()?;

    let mut out_shape: Vec<usize> = free_a.iter().map(|&i| a.shape()[i]).collect();
    out_shape.extend(free_b.iter().map(|&i| b.shape()[i]));

    Ok(mat_a.dot(&mat_b).into_shape_with_order(IxDyn(&out_shape))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scirs2_core::ndarray_ext::{array, Dimension};

    fn sample(shape: &[usize]) -> Array<f64, IxDyn> {
        Array::from_shape_fn(IxDyn(shape), |ix| {
            ix.slice()
                .iter()
                .enumerate()
                .map(|(k, &i)| ((k as f64 + 1.3) * (i as f64 + 0.5)).cos())
                .sum()
        })
    }

    #[test]
    fn test_mode_multiply_identity() {
        let t = sample(&[3, 4, 2]);
        let eye = Array2::<f64>::eye(4);
        let r = mode_multiply(&t.view(), &eye.view(), 1).unwrap();
        assert_eq!(r, t);
    }

    #[test]
    fn test_mode_multiply_matches_loops() {
        let t = sample(&[3, 4, 2]);
        let m = array![[1.0, 2.0], [0.5, -1.0], [3.0, 0.0]];
        let r = mode_multiply(&t.view(), &m.view(), 2).unwrap();
        assert_eq!(r.shape(), &[3, 4, 3]);
        for i in 0..3 {
            for j in 0..4 {
                for k in 0..3 {
                    let expected = m[[k, 0]] * t[[i, j, 0]] + m[[k, 1]] * t[[i, j, 1]];
                    assert!((r[[i, j, k]] - expected).abs() < 1e-12);
                }
            }
        }
    }

    #[test]
    fn test_mode_multiply_errors() {
        let t = sample(&[3, 4]);
        let m = Array2::<f64>::zeros((2, 5));
        assert!(mode_multiply(&t.view(), &m.view(), 0).is_err());
        assert!(mode_multiply(&t.view(), &m.view(), 2).is_err());
    }

    #[test]
    fn test_multilinear_order_independent_for_distinct_modes() {
        let t = sample(&[3, 4, 2]);
        let a = array![[1.0, 0.5, 0.0], [0.0, 1.0, 2.0]];
        let b = array![[1.0, -1.0]];
        let r1 = multilinear_multiply(&t.view(), &[a.view(), b.view()], &[0, 2]).unwrap();
        let r2 = multilinear_multiply(&t.view(), &[b.view(), a.view()], &[2, 0]).unwrap();
        assert_eq!(r1.shape(), &[2, 4, 1]);
        for (x, y) in r1.iter().zip(r2.iter()) {
            assert!((x - y).abs() < 1e-12);
        }
    }

    #[test]
    fn test_tensordot_matches_matmul() {
        let a = sample(&[3, 4]);
        let b = sample(&[4, 5]);
        let c = tensordot(&a.view(), &b.view(), &[1], &[0]).unwrap();
        let a2 = a.clone().into_dimensionality::<Ix2>().unwrap();
        let b2 = b.clone().into_dimensionality::<Ix2>().unwrap();
        let expected = a2.dot(&b2).into_dyn();
        for (x, y) in c.iter().zip(expected.iter()) {
            assert!((x - y).abs() < 1e-12);
        }
    }

    #[test]
    fn test_tensordot_two_axes() {
        let a = sample(&[2, 3, 4]);
        let b = sample(&[4, 5, 2]);
        let c = tensordot(&a.view(), &b.view(), &[0, 2], &[2, 0]).unwrap();
        assert_eq!(c.shape(), &[3, 5]);
        let mut expected = 0.0;
        for i in 0..2 {
            for k in 0..4 {
                expected += a[[i, 1, k]] * b[[k, 3, i]];
            }
        }
        assert!((c[[1, 3]] - expected).abs() < 1e-12);
    }
}
