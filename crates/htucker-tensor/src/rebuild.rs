//! Reconstruction to dense form and element/slice selection

use std::ops::Range;

use htucker_core::{inverse_permutation, reshape_col_major, DenseND};
use scirs2_core::ndarray_ext::{s, Array2, Array3, Axis};

use crate::error::{HtError, HtResult};
use crate::tensor::{HTucker, HtValue, NodeData};

/// Selection along one mode
///
/// A range stop beyond the mode size is clamped to it, so
/// [`ModeIndex::all`] selects every index of any mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeIndex {
    /// A single index; the mode keeps size 1
    At(usize),
    /// Every `step`-th index in `start..stop`
    Range { start: usize, stop: usize, step: usize },
}

impl ModeIndex {
    /// The whole mode
    pub fn all() -> Self {
        ModeIndex::Range {
            start: 0,
            stop: usize::MAX,
            step: 1,
        }
    }

    /// Selected indices within a mode of size `n`
    pub fn indices(&self, n: usize) -> HtResult<Vec<usize>> {
        match *self {
            ModeIndex::At(i) if i < n => Ok(vec![i]),
            ModeIndex::At(i) => Err(HtError::InvalidArgument(format!(
                "index {} out of range for a mode of size {}",
                i, n
            ))),
            ModeIndex::Range { step: 0, .. } => Err(HtError::InvalidArgument(
                "range step must be at least 1".to_string(),
            )),
            ModeIndex::Range { start, stop, step } => {
                let stop = stop.min(n);
                if start >= stop {
                    return Err(HtError::InvalidArgument(format!(
                        "empty range {}..{} in a mode of size {}",
                        start, stop, n
                    )));
                }
                Ok((start..stop).step_by(step).collect())
            }
        }
    }
}

impl From<usize> for ModeIndex {
    fn from(i: usize) -> Self {
        ModeIndex::At(i)
    }
}

impl From<Range<usize>> for ModeIndex {
    fn from(r: Range<usize>) -> Self {
        ModeIndex::Range {
            start: r.start,
            stop: r.end,
            step: 1,
        }
    }
}

impl HTucker {
    /// Dense reconstruction
    ///
    /// Node bases are formed bottom-up, so the cost is dominated by the root
    /// basis, a single column of `Π shape` entries.
    #[tracing::instrument(level = "trace", skip_all, fields(shape = ?self.shape()))]
    pub fn full(&self) -> HtResult<DenseND<f64>> {
        let tree = self.tree();
        let mut bases: Vec<Option<Array2<f64>>> = vec![None; tree.nr_nodes()];
        for t in tree.post_order() {
            let basis = match (self.nodes().get(t), tree.children(t)) {
                (Some(NodeData::Leaf(u)), None) => u.clone(),
                (Some(NodeData::Transfer(b)), Some((l, r))) => {
                    let (Some(wl), Some(wr)) = (bases[l].take(), bases[r].take()) else {
                        return Err(HtError::StructuralMismatch(format!(
                            "children of node {} rebuilt out of order",
                            t
                        )));
                    };
                    combine(&wl, &wr, b)
                }
                _ => {
                    return Err(HtError::StructuralMismatch(format!(
                        "payload of node {} does not match the tree",
                        t
                    )))
                }
            };
            bases[t] = Some(basis);
        }

        let root = bases[0]
            .take()
            .ok_or_else(|| HtError::StructuralMismatch("root basis missing".to_string()))?;
        let order = tree.ordered_dims(0);
        let sizes: Vec<usize> = order.iter().map(|&m| self.shape()[m]).collect();
        let flat = reshape_col_major(root.into_dyn(), &sizes)?;
        Ok(DenseND::from_array(flat).permute(&inverse_permutation(&order))?)
    }

    /// Select an element, slice or sub-tensor
    ///
    /// One [`ModeIndex`] per mode. Only the leaf factors are restricted, so
    /// ranks are unchanged. A selection whose every mode has size 1 collapses
    /// to a scalar.
    ///
    /// # Examples
    ///
    /// ```
    /// use htucker_core::DenseND;
    /// use htucker_tensor::{HTucker, ModeIndex, TruncationConfig};
    ///
    /// let a = DenseND::<f64>::from_shape_fn(&[3, 4, 2], |ix| (ix[0] * 100 + ix[1] * 10 + ix[2]) as f64);
    /// let (x, _) = HTucker::truncate(&a, &TruncationConfig::new(8), None).unwrap();
    ///
    /// let v = x.get(&[2.into(), 3.into(), 1.into()]).unwrap();
    /// assert!((v.as_scalar().unwrap() - 231.0).abs() < 1e-9);
    ///
    /// let slab = x.get(&[ModeIndex::all(), (1..3).into(), 0.into()]).unwrap();
    /// assert_eq!(slab.into_tensor().unwrap().shape(), &[3, 2, 1]);
    /// ```
    pub fn get(&self, index: &[ModeIndex]) -> HtResult<HtValue> {
        if index.len() != self.order() {
            return Err(HtError::InvalidArgument(format!(
                "{} indices given for an order-{} tensor",
                index.len(),
                self.order()
            )));
        }
        let rows = index
            .iter()
            .zip(self.shape())
            .map(|(ix, &n)| ix.indices(n))
            .collect::<HtResult<Vec<_>>>()?;

        let tree = self.tree();
        let mut nodes = self.nodes().to_vec();
        for (mode, selected) in rows.iter().enumerate() {
            let leaf = tree.leaf_of_mode(mode);
            nodes[leaf] = NodeData::Leaf(self.u(leaf)?.select(Axis(0), selected));
        }
        let sub = HTucker::new(nodes, tree.clone(), false)?;

        if sub.shape().iter().all(|&n| n == 1) {
            let value = sub.full()?.as_array().iter().next().copied().unwrap_or(0.0);
            return Ok(HtValue::Scalar(value));
        }
        Ok(HtValue::Tensor(sub))
    }
}

/// Basis of a node from its children's bases, left index fastest
fn combine(wl: &Array2<f64>, wr: &Array2<f64>, b: &Array3<f64>) -> Array2<f64> {
    let (nl, nr) = (wl.nrows(), wr.nrows());
    let rt = b.dim().2;
    let mut w = Array2::zeros((nl * nr, rt));
    for c in 0..rt {
        let m = wl.dot(&b.slice(s![.., .., c])).dot(&wr.t());
        for (dst, src) in w.column_mut(c).iter_mut().zip(m.t().iter()) {
            *dst = *src;
        }
    }
    w
}
