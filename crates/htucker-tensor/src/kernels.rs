//! Small dense kernels on leaf factors and transfer tensors
//!
//! Transfer tensors `B: (r_left, r_right, r_node)` are matricized over their
//! two child axes with the left index fastest, matching the column-major row
//! order of the node basis: row `a + r_left * b`.

use htucker_core::mode_multiply;
use scirs2_core::ndarray_ext::{s, Array2, Array3, ArrayD, ArrayView2, Axis, Ix3};

use crate::error::{HtError, HtResult};

/// `B[a, b, c] -> M[a + r_left * b, c]`
pub(crate) fn transfer_to_matrix(b: &Array3<f64>) -> Array2<f64> {
    let (rl, rr, rt) = b.dim();
    Array2::from_shape_fn((rl * rr, rt), |(row, c)| b[[row % rl, row / rl, c]])
}

/// Inverse of [`transfer_to_matrix`]
pub(crate) fn matrix_to_transfer(m: &ArrayView2<f64>, rl: usize, rr: usize) -> HtResult<Array3<f64>> {
    if m.nrows() != rl * rr {
        return Err(HtError::ShapeMismatch(format!(
            "matrix with {} rows cannot be folded into a {}x{} transfer tensor",
            m.nrows(),
            rl,
            rr
        )));
    }
    Ok(Array3::from_shape_fn((rl, rr, m.ncols()), |(a, b, c)| {
        m[[a + rl * b, c]]
    }))
}

/// Mode product of a transfer tensor: `B ×_axis M`
pub(crate) fn mode_product3(b: &Array3<f64>, m: &ArrayView2<f64>, axis: usize) -> HtResult<Array3<f64>> {
    let out = mode_multiply(&b.view().into_dyn(), m, axis)?;
    to_array3(out)
}

pub(crate) fn to_array3(a: ArrayD<f64>) -> HtResult<Array3<f64>> {
    a.into_dimensionality::<Ix3>()
        .map_err(|e| HtError::Kernel(anyhow::anyhow!("expected an order-3 array: {}", e)))
}

/// Row-major unfolding of a transfer tensor along `axis`
///
/// Only used where both operands of a product are unfolded the same way, so
/// the column order is irrelevant.
pub(crate) fn unfold3(b: &Array3<f64>, axis: usize) -> HtResult<Array2<f64>> {
    let n = b.len_of(Axis(axis));
    let rest = if n == 0 { 0 } else { b.len() / n };
    let mut perm = vec![axis];
    perm.extend((0..3).filter(|&i| i != axis));
    let unfolded = b
        .view()
        .permuted_axes([perm[0], perm[1], perm[2]])
        .as_standard_layout()
        .into_owned()
        .into_shape_with_order((n, rest))
        .map_err(|e| HtError::Kernel(anyhow::anyhow!("unfolding failed: {}", e)))?;
    Ok(unfolded)
}

/// Cross projection of two transfer tensors through child cross-Gramians
///
/// ```text
/// out[c, c'] = Σ bk[a, b, c] · ml[a, a'] · mr[b, b'] · bl[a', b', c']
/// ```
pub(crate) fn cross_project(
    ml: &ArrayView2<f64>,
    mr: &ArrayView2<f64>,
    bk: &Array3<f64>,
    bl: &Array3<f64>,
) -> HtResult<Array2<f64>> {
    let t = mode_product3(&mode_product3(bl, ml, 0)?, mr, 1)?;
    if t.dim().0 != bk.dim().0 || t.dim().1 != bk.dim().1 {
        return Err(HtError::ShapeMismatch(format!(
            "cross projection of {:?} against {:?}",
            bk.dim(),
            t.dim()
        )));
    }
    Ok(transfer_to_matrix(bk).t().dot(&transfer_to_matrix(&t)))
}

/// Horizontal concatenation `[A₀ A₁ ...]`
pub(crate) fn hstack(blocks: &[&Array2<f64>]) -> HtResult<Array2<f64>> {
    let rows = blocks.first().map_or(0, |b| b.nrows());
    if blocks.iter().any(|b| b.nrows() != rows) {
        return Err(HtError::ShapeMismatch(
            "blocks to concatenate differ in row count".to_string(),
        ));
    }
    let cols: usize = blocks.iter().map(|b| b.ncols()).sum();
    let mut out = Array2::zeros((rows, cols));
    let mut offset = 0;
    for block in blocks {
        out.slice_mut(s![.., offset..offset + block.ncols()]).assign(*block);
        offset += block.ncols();
    }
    Ok(out)
}

/// Column blocks of `m` with the given widths
pub(crate) fn split_columns(m: &Array2<f64>, widths: &[usize]) -> Vec<Array2<f64>> {
    let mut offset = 0;
    widths
        .iter()
        .map(|&w| {
            let block = m.slice(s![.., offset..offset + w]).to_owned();
            offset += w;
            block
        })
        .collect()
}

/// Matrix assembled from a square grid of blocks
pub(crate) fn assemble_blocks(blocks: &[Vec<Array2<f64>>]) -> Array2<f64> {
    let heights: Vec<usize> = blocks.iter().map(|row| row[0].nrows()).collect();
    let widths: Vec<usize> = blocks[0].iter().map(|b| b.ncols()).collect();
    let mut out = Array2::zeros((heights.iter().sum(), widths.iter().sum()));
    let mut r0 = 0;
    for (i, row) in blocks.iter().enumerate() {
        let mut c0 = 0;
        for (j, block) in row.iter().enumerate() {
            out.slice_mut(s![r0..r0 + heights[i], c0..c0 + widths[j]])
                .assign(block);
            c0 += widths[j];
        }
        r0 += heights[i];
    }
    out
}
