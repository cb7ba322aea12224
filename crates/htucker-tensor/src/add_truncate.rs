//! Truncated summation of several HT tensors in one sweep
//!
//! The rank-summed tensor `x₁ + ... + x_m` is never formed. Leaves to root,
//! every node
//!
//! 1. stacks the summands' (already projected) bases and QR-factors them,
//! 2. takes its reduced Gramian from [`gramians_sum`] in the QR coordinates,
//!    `g = R G_t Rᵀ`,
//! 3. keeps the leading eigenvectors `u_k` of `g` under the rank policy,
//! 4. hands `u_kᵀ R` to its parent, which folds the block of every summand
//!    into that summand's transfer tensor before stacking.
//!
//! The root combines the summands' root transfer tensors with the final
//! factors of its two children.

use htucker_core::{left_svd_via_gram, thin_qr};
use scirs2_core::ndarray_ext::{s, Array2, Array3};

use crate::config::TruncationConfig;
use crate::error::{HtError, HtResult};
use crate::gramians_sum::gramians_sum;
use crate::kernels::{hstack, matrix_to_transfer, mode_product3, split_columns, transfer_to_matrix};
use crate::report::TruncationReport;
use crate::tensor::{collect_nodes, HTucker, NodeData};

/// Truncated sum of one or more tensors sharing a dimension tree
///
/// Error targets of `config` are split over the nodes as in
/// [`HTucker::truncate`]. The result is orthogonal.
///
/// # Examples
///
/// ```
/// use htucker_core::DenseND;
/// use htucker_tensor::{add_and_truncate, HTucker, TruncationConfig};
///
/// let a = DenseND::<f64>::from_shape_fn(&[3, 3, 3], |ix| (ix[0] + ix[1] + ix[2]) as f64);
/// let (x, _) = HTucker::truncate(&a, &TruncationConfig::new(3), None).unwrap();
/// let (sum, report) = add_and_truncate(&[&x, &x], &TruncationConfig::new(3)).unwrap();
/// assert!(sum.is_orthog());
/// assert!(report.all_satisfied());
/// assert!((sum.norm().unwrap() - 2.0 * x.norm().unwrap()).abs() < 1e-9);
/// ```
#[tracing::instrument(level = "debug", skip_all, fields(summands = summands.len(), max_rank = config.max_rank))]
pub fn add_and_truncate(
    summands: &[&HTucker],
    config: &TruncationConfig,
) -> HtResult<(HTucker, TruncationReport)> {
    config.validate()?;
    let grams = gramians_sum(summands)?;
    let first = summands
        .first()
        .ok_or_else(|| HtError::InvalidArgument("no summands given".to_string()))?;
    let tree = first.tree();
    let n = tree.nr_nodes();
    let node_config = config.per_node(first.order());

    let mut report = TruncationReport::new(n);
    let mut nodes: Vec<Option<NodeData>> = vec![None; n];
    let mut factors: Vec<Option<Array2<f64>>> = vec![None; n];

    for t in tree.post_order() {
        if t == 0 {
            continue;
        }
        let (q, r, child_ranks) = match tree.children(t) {
            None => {
                let leaves = summands.iter().map(|x| x.u(t)).collect::<HtResult<Vec<_>>>()?;
                let (q, r) = thin_qr(&hstack(&leaves)?.view())?;
                (q, r, None)
            }
            Some((l, r)) => {
                let parts = project_summands(summands, &factors, t, l, r)?;
                let (kl, kr, _) = parts[0].dim();
                let mats: Vec<Array2<f64>> = parts.iter().map(transfer_to_matrix).collect();
                let (q, rf) = thin_qr(&hstack(&mats.iter().collect::<Vec<_>>())?.view())?;
                (q, rf, Some((kl, kr)))
            }
        };

        let g = r.dot(&grams[t]).dot(&r.t());
        let (u, sv) = left_svd_via_gram(&g.view())?;
        let choice = node_config.choose_rank(&sv.to_vec())?;
        let uk = u.slice(s![.., ..choice.rank]);
        let basis = q.dot(&uk);

        nodes[t] = Some(match child_ranks {
            None => NodeData::Leaf(basis),
            Some((kl, kr)) => NodeData::Transfer(matrix_to_transfer(&basis.view(), kl, kr)?),
        });
        factors[t] = Some(uk.t().dot(&r));
        report.record(t, choice, sv);
    }

    let (l, r) = tree.children(0).ok_or_else(|| {
        HtError::StructuralMismatch("root of the dimension tree is a leaf".to_string())
    })?;
    let parts = project_summands(summands, &factors, 0, l, r)?;
    let mut root = Array3::zeros(parts[0].dim());
    for part in &parts {
        root += part;
    }
    nodes[0] = Some(NodeData::Transfer(root));

    let x = HTucker::new(collect_nodes(nodes)?, tree.clone(), true)?;
    Ok((x, report))
}

/// `B_t^j ×₀ R_l^j ×₁ R_r^j` for every summand `j`
///
/// `R^j` is the column block of a child's factor belonging to summand `j`.
fn project_summands(
    summands: &[&HTucker],
    factors: &[Option<Array2<f64>>],
    t: usize,
    l: usize,
    r: usize,
) -> HtResult<Vec<Array3<f64>>> {
    let (Some(fl), Some(fr)) = (&factors[l], &factors[r]) else {
        return Err(HtError::StructuralMismatch(format!(
            "children of node {} were not truncated before it",
            t
        )));
    };
    let widths_l: Vec<usize> = summands.iter().map(|x| x.rank(l)).collect();
    let widths_r: Vec<usize> = summands.iter().map(|x| x.rank(r)).collect();
    let blocks_l = split_columns(fl, &widths_l);
    let blocks_r = split_columns(fr, &widths_r);

    summands
        .iter()
        .zip(blocks_l.iter().zip(&blocks_r))
        .map(|(x, (rl, rr))| mode_product3(&mode_product3(x.b(t)?, &rl.view(), 0)?, &rr.view(), 1))
        .collect()
}
