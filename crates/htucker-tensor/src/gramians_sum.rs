//! Reduced Gramians of an unmaterialized sum
//!
//! For `S = x₁ + ... + x_m` on a shared tree, the basis of node `t` in the
//! sum is the concatenation `[U_t¹ ... U_tᵐ]` of the summands' bases. The
//! reduced Gramian of `S` at `t` is therefore an `m × m` grid of blocks
//!
//! ```text
//! G_t[i, j] = V_tⁱᵀ V_tʲ
//! ```
//!
//! where `V_tⁱ` is the complementary factor of summand `i`. Two sweeps compute
//! the grid without forming `S`:
//!
//! 1. bottom-up, the cross Gramians `M_t[i, j] = U_tⁱᵀ U_tʲ` of the bases;
//! 2. top-down, `G` from the parent's `G` and the sibling's `M`.

use std::collections::VecDeque;

use scirs2_core::ndarray_ext::Array2;

use crate::error::{HtError, HtResult};
use crate::kernels::{assemble_blocks, cross_project, mode_product3, unfold3};
use crate::tensor::HTucker;

type Grid = Vec<Vec<Array2<f64>>>;

/// Reduced Gramians of `Σ summands`, indexed by node id
///
/// Node `t` gets a square matrix of size `Σ_i rank_i(t)`, blocked by summand.
/// The summands need not be orthogonal.
///
/// # Errors
///
/// [`HtError::InvalidArgument`] for an empty list and
/// [`HtError::StructuralMismatch`] / [`HtError::ShapeMismatch`] unless all
/// summands share one tree and shape.
pub fn gramians_sum(summands: &[&HTucker]) -> HtResult<Vec<Array2<f64>>> {
    let first = summands
        .first()
        .ok_or_else(|| HtError::InvalidArgument("no summands given".to_string()))?;
    for x in &summands[1..] {
        first.check_same_structure(x, "gramians_sum")?;
    }
    let tree = first.tree();
    let n = tree.nr_nodes();
    let m = summands.len();

    let mut cross: Vec<Grid> = vec![Vec::new(); n];
    for t in tree.post_order() {
        let mut grid = Vec::with_capacity(m);
        for (i, xi) in summands.iter().enumerate() {
            let mut row = Vec::with_capacity(m);
            for (j, xj) in summands.iter().enumerate() {
                let block = match tree.children(t) {
                    None => xi.u(t)?.t().dot(xj.u(t)?),
                    Some((l, r)) => {
                        cross_project(
                            &cross[l][i][j].view(),
                            &cross[r][i][j].view(),
                            xi.b(t)?,
                            xj.b(t)?,
                        )?
                    }
                };
                row.push(block);
            }
            grid.push(row);
        }
        cross[t] = grid;
    }

    let mut grams: Vec<Grid> = vec![Vec::new(); n];
    grams[0] = vec![vec![Array2::ones((1, 1)); m]; m];
    let mut queue = VecDeque::from([0]);
    while let Some(t) = queue.pop_front() {
        let Some((l, r)) = tree.children(t) else {
            continue;
        };
        let mut left = Vec::with_capacity(m);
        let mut right = Vec::with_capacity(m);
        for (i, xi) in summands.iter().enumerate() {
            let bi = xi.b(t)?;
            let mut left_row = Vec::with_capacity(m);
            let mut right_row = Vec::with_capacity(m);
            for (j, xj) in summands.iter().enumerate() {
                let bj = xj.b(t)?;
                let g = grams[t][i][j].view();
                let tl = mode_product3(&mode_product3(bj, &cross[r][i][j].view(), 1)?, &g, 2)?;
                let tr = mode_product3(&mode_product3(bj, &cross[l][i][j].view(), 0)?, &g, 2)?;
                left_row.push(unfold3(bi, 0)?.dot(&unfold3(&tl, 0)?.t()));
                right_row.push(unfold3(bi, 1)?.dot(&unfold3(&tr, 1)?.t()));
            }
            left.push(left_row);
            right.push(right_row);
        }
        grams[l] = left;
        grams[r] = right;
        queue.push_back(l);
        queue.push_back(r);
    }

    Ok(grams.iter().map(|grid| assemble_blocks(grid)).collect())
}
