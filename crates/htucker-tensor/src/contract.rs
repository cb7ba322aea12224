//! Contraction of two HT tensors over paired modes
//!
//! Two structural cases are supported.
//!
//! **One node.** The contracted modes of each operand are the modes of one
//! node, or the complement of the modes of one node. Both operands are
//! re-rooted so that the right child of the root covers exactly the
//! contracted modes. The two right subtrees must then branch identically
//! (up to the order of children); contracting them bottom-up gives the
//! elimination matrix `M`, and the result is spliced from the two left
//! subtrees under the root `B_x · M · B_yᵀ`. Contracting no modes or all
//! modes goes through a dummy singleton mode (see [`HTucker::change_root`]),
//! removed from the result afterwards.
//!
//! **Two nodes.** One operand is contracted over all of its modes and the
//! contracted modes of the other form two subtrees whose neighbours towards
//! the rest of the tree are adjacent. The partially contracted operand is
//! re-rooted on that edge, the fully contracted one so that its root children
//! match the two subtrees, and both elimination matrices are folded through
//! the two transfer tensors next to the root.
//!
//! Everything else is rejected. Surviving modes of `x` come first in the
//! result, followed by those of `y`, each in their original order.

use std::collections::{BTreeSet, VecDeque};

use htucker_core::DimTree;
use scirs2_core::ndarray_ext::{Array2, Array3, Axis};

use crate::error::{HtError, HtResult};
use crate::kernels::{cross_project, mode_product3, unfold3};
use crate::restructure::Side;
use crate::tensor::{HTucker, HtValue, NodeData};

/// Contract modes `dims_x[i]` of `x` with modes `dims_y[i]` of `y`
///
/// A result without free modes is [`HtValue::Scalar`]. A result with a single
/// free mode cannot be a dimension tree of its own, so it comes back as an
/// order-2 tensor that keeps a size-1 mode from the fully contracted operand:
/// `(n, 1)` when `y` is fully contracted and `(1, n)` when `x` is.
///
/// # Errors
///
/// [`HtError::InvalidArgument`] for out-of-range, duplicate or size-mismatched
/// modes and [`HtError::StructuralMismatch`] when the contraction pattern is
/// neither of the supported cases.
///
/// # Examples
///
/// ```
/// use htucker_core::DenseND;
/// use htucker_tensor::{contract, HTucker, TruncationConfig};
///
/// let a = DenseND::<f64>::from_shape_fn(&[3, 4, 5], |ix| (ix[0] + ix[1] * ix[2]) as f64);
/// let b = DenseND::<f64>::from_shape_fn(&[5, 6], |ix| (ix[0] as f64 - ix[1] as f64).cos());
/// let (x, _) = HTucker::truncate(&a, &TruncationConfig::new(20), None).unwrap();
/// let (y, _) = HTucker::truncate(&b, &TruncationConfig::new(5), None).unwrap();
///
/// let z = contract(&x, &y, &[2], &[0]).unwrap().into_tensor().unwrap();
/// assert_eq!(z.shape(), &[3, 4, 6]);
/// ```
#[tracing::instrument(level = "debug", skip(x, y), fields(shape_x = ?x.shape(), shape_y = ?y.shape()))]
pub fn contract(x: &HTucker, y: &HTucker, dims_x: &[usize], dims_y: &[usize]) -> HtResult<HtValue> {
    validate(x, y, dims_x, dims_y)?;

    if let (Some(xr), Some(yr)) = (Rooted::one_node(x, dims_x)?, Rooted::one_node(y, dims_y)?) {
        tracing::debug!("one-node contraction");
        return contract_one_node(&xr, &yr, dims_x, dims_y);
    }
    if dims_y.len() == y.order() {
        tracing::debug!("two-node contraction");
        return contract_two_node(x, y, dims_x, dims_y);
    }
    if dims_x.len() == x.order() {
        tracing::debug!("two-node contraction, operands swapped");
        return contract_two_node(y, x, dims_y, dims_x);
    }
    Err(HtError::StructuralMismatch(format!(
        "contracting modes {:?} with {:?} needs more than two subtrees",
        dims_x, dims_y
    )))
}

fn validate(x: &HTucker, y: &HTucker, dims_x: &[usize], dims_y: &[usize]) -> HtResult<()> {
    if dims_x.len() != dims_y.len() {
        return Err(HtError::InvalidArgument(format!(
            "{} modes of x paired with {} modes of y",
            dims_x.len(),
            dims_y.len()
        )));
    }
    for (dims, t, name) in [(dims_x, x, "x"), (dims_y, y, "y")] {
        let unique: BTreeSet<&usize> = dims.iter().collect();
        if unique.len() != dims.len() {
            return Err(HtError::InvalidArgument(format!(
                "duplicate modes {:?} of {}",
                dims, name
            )));
        }
        for &m in dims {
            t.check_mode(m)?;
        }
    }
    for (&dx, &dy) in dims_x.iter().zip(dims_y) {
        if x.shape()[dx] != y.shape()[dy] {
            return Err(HtError::InvalidArgument(format!(
                "mode {} of x has size {} but mode {} of y has size {}",
                dx,
                x.shape()[dx],
                dy,
                y.shape()[dy]
            )));
        }
    }
    Ok(())
}

/// An operand re-rooted for the one-node case
struct Rooted {
    x: HTucker,
    /// 1 when a dummy mode 0 was put in front of the original modes
    shift: usize,
}

impl Rooted {
    /// Re-root so that the right child of the root covers exactly `dims`
    fn one_node(x: &HTucker, dims: &[usize]) -> HtResult<Option<Self>> {
        let tree = x.tree();
        let d = x.order();
        if dims.len() == d {
            let x = x.change_root(0, Side::Right)?;
            return Ok(Some(Self { x, shift: 1 }));
        }
        if dims.is_empty() {
            let x = x.change_root(0, Side::Left)?;
            return Ok(Some(Self { x, shift: 1 }));
        }
        if let [t] = tree.covering_subtrees(dims)[..] {
            let x = x.change_root(t, Side::Right)?;
            return Ok(Some(Self { x, shift: 0 }));
        }
        let complement: Vec<usize> = (0..d).filter(|m| !dims.contains(m)).collect();
        if let [t] = tree.covering_subtrees(&complement)[..] {
            let x = x.change_root(t, Side::Left)?;
            return Ok(Some(Self { x, shift: 0 }));
        }
        Ok(None)
    }

    /// Original mode of a mode of the re-rooted tensor, `None` for the dummy
    fn original(&self, mode: usize) -> Option<usize> {
        mode.checked_sub(self.shift)
    }
}

fn contract_one_node(xr: &Rooted, yr: &Rooted, dims_x: &[usize], dims_y: &[usize]) -> HtResult<HtValue> {
    let mut pair = vec![None; xr.x.order()];
    for (&dx, &dy) in dims_x.iter().zip(dims_y) {
        pair[dx + xr.shift] = Some(dy + yr.shift);
    }
    if dims_x.is_empty() {
        pair[0] = Some(0);
    }

    let (lx, rx) = root_children(xr.x.tree())?;
    let (ly, ry) = root_children(yr.x.tree())?;
    let m = eliminate(&xr.x, rx, &yr.x, ry, &pair)?;

    let bx = root_matrix(&xr.x)?;
    let by = root_matrix(&yr.x)?;
    let root = bx.dot(&m).dot(&by.t());

    let xs = survivors(&xr.x, lx, |h| xr.original(h));
    let ys = survivors(&yr.x, ly, |h| yr.original(h));
    let mut result_orig: Vec<Option<usize>> = Vec::new();
    let modes_x = assign_modes(xr.x.order(), &xs, &mut result_orig);
    let modes_y = assign_modes(yr.x.order(), &ys, &mut result_orig);

    let z = adjust_tree(
        to_root(root),
        [(&xr.x, lx, modes_x.as_slice()), (&yr.x, ly, modes_y.as_slice())],
    )?;

    let dummies: Vec<usize> = (0..result_orig.len())
        .filter(|&m| result_orig[m].is_none())
        .collect();
    if dummies.is_empty() {
        Ok(HtValue::Tensor(z))
    } else {
        z.squeeze(Some(dummies.as_slice()))
    }
}

/// `y` is contracted over all of its modes
fn contract_two_node(x: &HTucker, y: &HTucker, dims_x: &[usize], dims_y: &[usize]) -> HtResult<HtValue> {
    let tree = x.tree();
    let [r1, r2] = tree.covering_subtrees(dims_x)[..] else {
        return Err(HtError::StructuralMismatch(format!(
            "modes {:?} do not form two subtrees",
            dims_x
        )));
    };
    let (u1, u2) = match (tree.up(r1), tree.up(r2)) {
        (Some(u1), Some(u2)) if u1 != u2 && tree.is_inner(u1) && tree.is_inner(u2) => (u1, u2),
        _ => {
            return Err(HtError::StructuralMismatch(format!(
                "subtrees {} and {} do not hang off two distinct inner nodes",
                r1, r2
            )))
        }
    };
    let xh = if tree.up(u1) == Some(u2) {
        x.change_root(u1, Side::Left)?
    } else if tree.up(u2) == Some(u1) {
        x.change_root(u2, Side::Right)?
    } else {
        return Err(HtError::StructuralMismatch(format!(
            "nodes {} and {} next to the contracted subtrees are not adjacent",
            u1, u2
        )));
    };

    let (dims1, dims2) = (tree.dims(r1), tree.dims(r2));
    let ht = xh.tree();
    let (l0, r0) = root_children(ht)?;
    let r1h = ht.node_of_dims(&dims1)?;
    let r2h = ht.node_of_dims(&dims2)?;
    if ht.parent(r1h) != Some(l0) || ht.parent(r2h) != Some(r0) {
        return Err(HtError::StructuralMismatch(
            "re-rooting did not place the contracted subtrees below the root".to_string(),
        ));
    }

    let paired = |dims: &[usize]| -> Vec<usize> {
        dims_x
            .iter()
            .zip(dims_y)
            .filter(|(dx, _)| dims.contains(*dx))
            .map(|(_, &dy)| dy)
            .collect()
    };
    let (cy1, cy2) = (paired(&dims1), paired(&dims2));
    let yh = if let Ok(t) = y.tree().node_of_dims(&cy1) {
        y.change_root(t, Side::Left)?
    } else if let Ok(t) = y.tree().node_of_dims(&cy2) {
        y.change_root(t, Side::Right)?
    } else {
        return Err(HtError::StructuralMismatch(format!(
            "neither {:?} nor {:?} is a node of the fully contracted operand",
            cy1, cy2
        )));
    };

    let mut pair = vec![None; xh.order()];
    for (&dx, &dy) in dims_x.iter().zip(dims_y) {
        pair[dx] = Some(dy);
    }
    let (ly, ry) = root_children(yh.tree())?;
    let m_left = eliminate(&xh, r1h, &yh, ly, &pair)?;
    let m_right = eliminate(&xh, r2h, &yh, ry, &pair)?;
    let my = m_left.dot(&root_matrix(&yh)?).dot(&m_right.t());

    let (c1, s1) = contracted_first(&xh, l0, r1h)?;
    let (c2, s2) = contracted_first(&xh, r0, r2h)?;
    let t = mode_product3(&c1, &root_matrix(&xh)?.t(), 2)?;
    let v = mode_product3(&t, &my.t(), 0)?;
    let root = unfold3(&v, 1)?.dot(&unfold3(&c2, 1)?.t());

    let mut kept: Vec<usize> = ht.dims(s1);
    kept.extend(ht.dims(s2));
    let kept: Vec<(Option<usize>, usize)> = kept.into_iter().map(|m| (Some(m), m)).collect();
    let mut result_orig = Vec::new();
    let modes = assign_modes(xh.order(), &kept, &mut result_orig);
    let z = adjust_tree(to_root(root), [(&xh, s1, modes.as_slice()), (&xh, s2, modes.as_slice())])?;
    Ok(HtValue::Tensor(z))
}

/// Transfer tensor of `u` with the contracted child `r` moved to axis 0, and
/// the other child
fn contracted_first(x: &HTucker, u: usize, r: usize) -> HtResult<(Array3<f64>, usize)> {
    let (l, rr) = x
        .tree()
        .children(u)
        .ok_or_else(|| HtError::StructuralMismatch(format!("node {} is a leaf", u)))?;
    let b = x.b(u)?;
    if l == r {
        Ok((b.clone(), rr))
    } else {
        Ok((swap_children(b), l))
    }
}

/// Elimination matrix of the subtree of `x` at `tx` against the subtree of
/// `y` at `ty`
///
/// Entry `(a, b)` is the inner product of column `a` of the basis of `tx` with
/// column `b` of the basis of `ty`, pairing leaf modes through `pair`.
fn eliminate(x: &HTucker, tx: usize, y: &HTucker, ty: usize, pair: &[Option<usize>]) -> HtResult<Array2<f64>> {
    let (m, matched) = eliminate_rec(x, tx, y, pair)?;
    if matched != ty {
        return Err(HtError::StructuralMismatch(format!(
            "subtree {} of x matched node {} of y instead of {}",
            tx, matched, ty
        )));
    }
    Ok(m)
}

fn eliminate_rec(x: &HTucker, tx: usize, y: &HTucker, pair: &[Option<usize>]) -> HtResult<(Array2<f64>, usize)> {
    match x.tree().children(tx) {
        None => {
            let my = x
                .tree()
                .mode_of_leaf(tx)
                .and_then(|mx| pair.get(mx).copied().flatten())
                .ok_or_else(|| {
                    HtError::StructuralMismatch(format!("leaf {} of x is not contracted", tx))
                })?;
            let wy = y.tree().leaf_of_mode(my);
            let (ux, uy) = (x.u(tx)?, y.u(wy)?);
            if ux.nrows() != uy.nrows() {
                return Err(HtError::ShapeMismatch(format!(
                    "paired leaves {} and {} have {} and {} rows",
                    tx,
                    wy,
                    ux.nrows(),
                    uy.nrows()
                )));
            }
            Ok((ux.t().dot(uy), wy))
        }
        Some((a, b)) => {
            let (ma, wa) = eliminate_rec(x, a, y, pair)?;
            let (mb, wb) = eliminate_rec(x, b, y, pair)?;
            let w = match (y.tree().parent(wa), y.tree().parent(wb)) {
                (Some(pa), Some(pb)) if pa == pb && pa != 0 => pa,
                _ => {
                    return Err(HtError::StructuralMismatch(format!(
                        "node {} of x branches differently from its counterpart in y",
                        tx
                    )))
                }
            };
            let by = y.b(w)?;
            let by = if y.tree().left(w) == Some(wa) {
                by.clone()
            } else {
                swap_children(by)
            };
            Ok((cross_project(&ma.view(), &mb.view(), x.b(tx)?, &by)?, w))
        }
    }
}

fn swap_children(b: &Array3<f64>) -> Array3<f64> {
    b.view()
        .permuted_axes([1, 0, 2])
        .as_standard_layout()
        .into_owned()
}

fn root_children(tree: &DimTree) -> HtResult<(usize, usize)> {
    tree.children(0)
        .ok_or_else(|| HtError::StructuralMismatch("root of the dimension tree is a leaf".to_string()))
}

fn root_matrix(x: &HTucker) -> HtResult<Array2<f64>> {
    Ok(x.b(0)?.index_axis(Axis(2), 0).to_owned())
}

fn to_root(m: Array2<f64>) -> Array3<f64> {
    let (rl, rr) = m.dim();
    Array3::from_shape_fn((rl, rr, 1), |(i, j, _)| m[[i, j]])
}

/// Modes below `node` as `(original mode, mode of x)`, in original order
fn survivors(x: &HTucker, node: usize, original: impl Fn(usize) -> Option<usize>) -> Vec<(Option<usize>, usize)> {
    let mut out: Vec<(Option<usize>, usize)> = x
        .tree()
        .dims(node)
        .into_iter()
        .map(|m| (original(m), m))
        .collect();
    out.sort_unstable();
    out
}

/// Append `survivors` to the result modes; returns mode of x → result mode
fn assign_modes(
    order: usize,
    survivors: &[(Option<usize>, usize)],
    result_orig: &mut Vec<Option<usize>>,
) -> Vec<Option<usize>> {
    let mut modes = vec![None; order];
    let mut sorted = survivors.to_vec();
    sorted.sort_unstable();
    for (orig, m) in sorted {
        modes[m] = Some(result_orig.len());
        result_orig.push(orig);
    }
    modes
}

/// Tensor whose root is `root` and whose two root subtrees are copied from
/// existing tensors
///
/// Each part is `(source, subtree root, source mode → result mode)`. Nodes are
/// numbered breadth-first.
fn adjust_tree(root: Array3<f64>, parts: [(&HTucker, usize, &[Option<usize>]); 2]) -> HtResult<HTucker> {
    let mut children: Vec<Option<(usize, usize)>> = vec![Some((1, 2))];
    let mut nodes = vec![NodeData::Transfer(root)];
    let mut leaves: Vec<(usize, usize)> = Vec::new();
    let mut queue = VecDeque::from([(0, parts[0].1), (1, parts[1].1)]);
    let mut next = 3;

    while let Some((p, t)) = queue.pop_front() {
        let (src, _, modes) = parts[p];
        let id = nodes.len();
        nodes.push(src.nodes()[t].clone());
        match src.tree().children(t) {
            Some((l, r)) => {
                children.push(Some((next, next + 1)));
                next += 2;
                queue.push_back((p, l));
                queue.push_back((p, r));
            }
            None => {
                children.push(None);
                let mode = src
                    .tree()
                    .mode_of_leaf(t)
                    .and_then(|m| modes.get(m).copied().flatten())
                    .ok_or_else(|| {
                        HtError::StructuralMismatch(format!("surviving leaf {} has no result mode", t))
                    })?;
                leaves.push((mode, id));
            }
        }
    }

    leaves.sort_unstable();
    let dim2ind = leaves.into_iter().map(|(_, id)| id).collect();
    HTucker::new(nodes, DimTree::new(children, dim2ind)?, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TruncationConfig;
    use htucker_core::{tensordot, DenseND};

    fn dense(shape: &[usize], phase: f64) -> DenseND<f64> {
        DenseND::from_shape_fn(shape, |ix| {
            let s: f64 = ix.iter().enumerate().map(|(k, &i)| (k as f64 + 1.3) * i as f64).sum();
            (0.21 * s + phase).sin() + 0.05 * s
        })
    }

    fn ht(a: &DenseND<f64>) -> HTucker {
        let x = HTucker::truncate(a, &TruncationConfig::new(64), None).unwrap().0;
        assert!(x.is_orthogonal_within(1e-10));
        x
    }

    fn check(shape_x: &[usize], shape_y: &[usize], dims_x: &[usize], dims_y: &[usize]) {
        let (a, b) = (dense(shape_x, 0.1), dense(shape_y, 0.9));
        let z = contract(&ht(&a), &ht(&b), dims_x, dims_y)
            .unwrap()
            .into_tensor()
            .unwrap();
        let expected = DenseND::from_array(tensordot(&a.view(), &b.view(), dims_x, dims_y).unwrap());
        assert_eq!(z.shape(), expected.shape());
        let err = (&z.full().unwrap() - &expected).frobenius_norm();
        assert!(err < 1e-9 * expected.frobenius_norm().max(1.0), "error {}", err);
    }

    #[test]
    fn test_one_node_leaf_against_leaf() {
        check(&[3, 4, 5], &[5, 6], &[2], &[0]);
    }

    #[test]
    fn test_one_node_inner_against_inner() {
        check(&[2, 3, 4, 3], &[3, 2, 5], &[0, 1], &[1, 0]);
    }

    #[test]
    fn test_one_node_complement() {
        // modes {0, 2} of canonical(3) are the complement of the leaf of mode 1
        check(&[2, 3, 4], &[4, 2, 5], &[0, 2], &[1, 0]);
    }

    #[test]
    fn test_two_node_fully_contracted_right() {
        check(&[2, 3, 4, 5], &[3, 4], &[1, 2], &[0, 1]);
    }

    #[test]
    fn test_two_node_fully_contracted_left() {
        let (a, b) = (dense(&[3, 4], 0.3), dense(&[2, 3, 4, 5], 0.6));
        let z = contract(&ht(&a), &ht(&b), &[0, 1], &[1, 2])
            .unwrap()
            .into_tensor()
            .unwrap();
        let expected = DenseND::from_array(tensordot(&b.view(), &a.view(), &[1, 2], &[0, 1]).unwrap());
        assert_eq!(z.shape(), &[2, 5]);
        assert!((&z.full().unwrap() - &expected).frobenius_norm() < 1e-9 * expected.frobenius_norm());
    }

    #[test]
    fn test_full_contraction_is_inner_product() {
        let (a, b) = (dense(&[2, 3, 4], 0.0), dense(&[2, 3, 4], 1.0));
        let (x, y) = (ht(&a), ht(&b));
        let v = contract(&x, &y, &[0, 1, 2], &[0, 1, 2]).unwrap().as_scalar().unwrap();
        let expected = x.inner_product(&y).unwrap();
        assert!((v - expected).abs() < 1e-9 * expected.abs().max(1.0));
    }

    #[test]
    fn test_empty_contraction_is_outer_product() {
        let (a, b) = (dense(&[2, 3], 0.0), dense(&[4, 2], 0.5));
        let z = contract(&ht(&a), &ht(&b), &[], &[]).unwrap().into_tensor().unwrap();
        assert_eq!(z.shape(), &[2, 3, 4, 2]);
        let full = z.full().unwrap();
        for (ix, v) in full.as_array().indexed_iter() {
            let expected = a[&[ix[0], ix[1]][..]] * b[&[ix[2], ix[3]][..]];
            assert!((v - expected).abs() < 1e-10);
        }
    }

    #[test]
    fn test_single_free_mode_keeps_singleton() {
        let (a, b) = (dense(&[2, 3, 4], 0.3), dense(&[3, 4], 0.8));
        let expected = tensordot(&a.view(), &b.view(), &[1, 2], &[0, 1]).unwrap();

        // free mode of x first, then the dummy left by y
        let z = contract(&ht(&a), &ht(&b), &[1, 2], &[0, 1])
            .unwrap()
            .into_tensor()
            .unwrap();
        assert_eq!(z.shape(), &[2, 1]);
        let full = z.full().unwrap();
        for (v, e) in full.as_array().iter().zip(expected.iter()) {
            assert!((v - e).abs() < 1e-9 * e.abs().max(1.0), "{} vs {}", v, e);
        }

        let z = contract(&ht(&b), &ht(&a), &[0, 1], &[1, 2])
            .unwrap()
            .into_tensor()
            .unwrap();
        assert_eq!(z.shape(), &[1, 2]);
        let full = z.full().unwrap();
        for (v, e) in full.as_array().iter().zip(expected.iter()) {
            assert!((v - e).abs() < 1e-9 * e.abs().max(1.0), "{} vs {}", v, e);
        }
    }

    #[test]
    fn test_rejects_unsupported_and_invalid() {
        let x = ht(&dense(&[2, 3, 4, 5], 0.0));
        let y = ht(&dense(&[3, 4, 6], 0.0));
        assert!(matches!(
            contract(&x, &y, &[1, 2], &[0, 1]),
            Err(HtError::StructuralMismatch(_))
        ));
        assert!(matches!(
            contract(&x, &y, &[0], &[0]),
            Err(HtError::InvalidArgument(_))
        ));
        assert!(contract(&x, &y, &[1, 1], &[0, 0]).is_err());
        assert!(contract(&x, &y, &[1], &[0, 1]).is_err());
    }
}
