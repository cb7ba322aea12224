//! Compression of a dense tensor into hierarchical Tucker format
//!
//! # Algorithm
//!
//! 1. Every leaf takes the leading left singular vectors of the mode
//!    matricization of `A`.
//! 2. The core `C = A ×₀ U₀ᵀ ×₁ U₁ᵀ ...` keeps one axis per leaf.
//! 3. Levels are swept bottom-up. At an inner node the core is matricized over
//!    the axes of its two children, the leading left singular vectors become
//!    the transfer tensor, and the two axes are contracted into one axis for
//!    the node itself.
//! 4. The two axes left at the root form the root transfer tensor.
//!
//! An explicit node → core-axis map follows the shrinking core: the merged
//! axis takes the position of the smaller child axis and every axis beyond
//! the larger one moves down by one.

use htucker_core::{left_svd_via_qr, multilinear_multiply, reshape_col_major, DenseND, DimTree};
use scirs2_core::ndarray_ext::{s, Array2, Array3, ArrayD, ArrayView2, IxDyn};

use crate::config::TruncationConfig;
use crate::error::{HtError, HtResult};
use crate::kernels::matrix_to_transfer;
use crate::report::TruncationReport;
use crate::tensor::{collect_nodes, HTucker, NodeData};

impl HTucker {
    /// Compress a dense tensor
    ///
    /// Uses the canonical tree for `a.rank()` modes unless `tree` is given.
    /// Error targets of `config` are split over the nodes (see
    /// [`TruncationConfig::per_node`]). The result is orthogonal.
    ///
    /// # Examples
    ///
    /// ```
    /// use htucker_core::DenseND;
    /// use htucker_tensor::{HTucker, TruncationConfig};
    ///
    /// let a = DenseND::<f64>::from_shape_fn(&[3, 4, 5], |ix| (ix[0] + 2 * ix[1] + 3 * ix[2]) as f64);
    /// let (x, report) = HTucker::truncate(&a, &TruncationConfig::new(10), None).unwrap();
    /// assert_eq!(x.shape(), &[3, 4, 5]);
    /// assert!(report.total_error() < 1e-8);
    /// let err = (&x.full().unwrap() - &a).frobenius_norm();
    /// assert!(err < 1e-8);
    /// ```
    #[tracing::instrument(level = "debug", skip_all, fields(shape = ?a.shape(), max_rank = config.max_rank))]
    pub fn truncate(
        a: &DenseND<f64>,
        config: &TruncationConfig,
        tree: Option<DimTree>,
    ) -> HtResult<(HTucker, TruncationReport)> {
        config.validate()?;
        let d = a.rank();
        if a.is_empty() {
            return Err(HtError::InvalidArgument(format!(
                "cannot compress a tensor of shape {:?}",
                a.shape()
            )));
        }
        let tree = match tree {
            Some(tree) => tree,
            None => DimTree::canonical(d)?,
        };
        if tree.nr_dims() != d {
            return Err(HtError::InvalidArgument(format!(
                "dimension tree covers {} modes, tensor has {}",
                tree.nr_dims(),
                d
            )));
        }

        let n = tree.nr_nodes();
        let node_config = config.per_node(d);
        let mut report = TruncationReport::new(n);
        let mut nodes: Vec<Option<NodeData>> = vec![None; n];

        let mut leaf_factors = Vec::with_capacity(d);
        for mode in 0..d {
            let leaf = tree.leaf_of_mode(mode);
            let unfolded = a.matricize(&[mode])?;
            let (u, sv) = left_svd_via_qr(&unfolded.view())?;
            let choice = node_config.choose_rank(&sv.to_vec())?;
            leaf_factors.push(u.slice(s![.., ..choice.rank]).to_owned());
            report.record(leaf, choice, sv);
        }

        let transposed: Vec<Array2<f64>> = leaf_factors.iter().map(|u| u.t().to_owned()).collect();
        let views: Vec<ArrayView2<f64>> = transposed.iter().map(|m| m.view()).collect();
        let modes: Vec<usize> = (0..d).collect();
        let mut core = multilinear_multiply(&a.view(), &views, &modes)?;

        let mut axis_of: Vec<Option<usize>> = vec![None; n];
        for (mode, u) in leaf_factors.into_iter().enumerate() {
            let leaf = tree.leaf_of_mode(mode);
            axis_of[leaf] = Some(mode);
            nodes[leaf] = Some(NodeData::Leaf(u));
        }

        for level in (1..tree.depth()).rev() {
            for t in tree.nodes_of_level(level) {
                let Some((l, r)) = tree.children(t) else {
                    continue;
                };
                let (al, ar) = child_axes(&axis_of, t, l, r)?;
                let core_shape = core.shape().to_vec();
                let (rl, rr) = (core_shape[al], core_shape[ar]);

                let unfolded = DenseND::from_array(core).matricize(&[al, ar])?;
                let (u, sv) = left_svd_via_qr(&unfolded.view())?;
                let choice = node_config.choose_rank(&sv.to_vec())?;
                let uk = u.slice(s![.., ..choice.rank]);

                nodes[t] = Some(NodeData::Transfer(matrix_to_transfer(&uk, rl, rr)?));
                core = merge_axes(uk.t().dot(&unfolded), &core_shape, al, ar)?;

                let (lo, hi) = (al.min(ar), al.max(ar));
                for entry in axis_of.iter_mut().flatten() {
                    if *entry > hi {
                        *entry -= 1;
                    }
                }
                axis_of[l] = None;
                axis_of[r] = None;
                axis_of[t] = Some(lo);
                report.record(t, choice, sv);
            }
        }

        let (l, r) = tree.children(0).ok_or_else(|| {
            HtError::StructuralMismatch("root of the dimension tree is a leaf".to_string())
        })?;
        let (al, ar) = child_axes(&axis_of, 0, l, r)?;
        if core.ndim() != 2 {
            return Err(HtError::StructuralMismatch(format!(
                "core has {} axes left at the root",
                core.ndim()
            )));
        }
        let (kl, kr) = (core.shape()[al], core.shape()[ar]);
        let root = Array3::from_shape_fn((kl, kr, 1), |(i, j, _)| {
            let mut ix = [0usize; 2];
            ix[al] = i;
            ix[ar] = j;
            core[IxDyn(&ix)]
        });
        nodes[0] = Some(NodeData::Transfer(root));

        let x = HTucker::new(collect_nodes(nodes)?, tree, true)?;
        Ok((x, report))
    }
}

fn child_axes(axis_of: &[Option<usize>], t: usize, l: usize, r: usize) -> HtResult<(usize, usize)> {
    match (axis_of[l], axis_of[r]) {
        (Some(al), Some(ar)) => Ok((al, ar)),
        _ => Err(HtError::StructuralMismatch(format!(
            "children of node {} were not reduced before it",
            t
        ))),
    }
}

/// Fold `reduced: (k × rest)` back into a core in which axes `al` and `ar` of
/// `shape` are replaced by a single axis of size `k` at `min(al, ar)`
fn merge_axes(reduced: Array2<f64>, shape: &[usize], al: usize, ar: usize) -> HtResult<ArrayD<f64>> {
    let rest: Vec<usize> = (0..shape.len())
        .filter(|&i| i != al && i != ar)
        .map(|i| shape[i])
        .collect();
    let lo = al.min(ar);

    let mut folded_shape = vec![reduced.nrows()];
    folded_shape.extend_from_slice(&rest);
    let folded = reshape_col_major(reduced.into_dyn(), &folded_shape)?;

    let perm: Vec<usize> = (1..=lo)
        .chain(std::iter::once(0))
        .chain(lo + 1..=rest.len())
        .collect();
    Ok(folded
        .permuted_axes(IxDyn(&perm))
        .as_standard_layout()
        .into_owned())
}
