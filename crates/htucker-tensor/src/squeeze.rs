//! Removal of singleton modes
//!
//! A leaf of a size-1 mode holds a single row `u`. Contracting `u` into the
//! parent transfer tensor leaves a matrix `T` that maps the sibling's basis
//! to the parent's, so parent and sibling merge into one node:
//!
//! - a leaf sibling makes the parent a leaf with factor `U_sibling · T`
//! - an inner sibling gives the parent `B_sibling ×₂ Tᵀ` and its children
//!
//! One mode disappears per step. Pairs of singleton sibling leaves go first
//! (lowest parent id, left leaf first), then the singleton mode with the
//! lowest index. The surviving nodes are renumbered breadth-first.

use std::collections::{BTreeSet, VecDeque};

use htucker_core::DimTree;
use scirs2_core::ndarray_ext::{Array2, Axis};

use crate::error::{HtError, HtResult};
use crate::kernels::mode_product3;
use crate::tensor::{HTucker, HtValue, NodeData};

impl HTucker {
    /// Remove singleton modes
    ///
    /// `dims: None` removes every mode of size 1, `Some(dims)` only the listed
    /// ones, which must all have size 1. Order-2 tensors are returned
    /// unchanged and squeezing never goes below order 2, except that
    /// squeezing every mode of a tensor of shape `(1, ..., 1)` yields the
    /// scalar. The orthogonality flag is kept.
    pub fn squeeze(&self, dims: Option<&[usize]>) -> HtResult<HtValue> {
        let eligible: BTreeSet<usize> = match dims {
            None => (0..self.order()).filter(|&m| self.shape()[m] == 1).collect(),
            Some(dims) => {
                let set: BTreeSet<usize> = dims.iter().copied().collect();
                if set.len() != dims.len() {
                    return Err(HtError::InvalidArgument(format!(
                        "duplicate modes in {:?}",
                        dims
                    )));
                }
                for &m in &set {
                    self.check_mode(m)?;
                    if self.shape()[m] != 1 {
                        return Err(HtError::InvalidArgument(format!(
                            "mode {} has size {} and cannot be squeezed",
                            m,
                            self.shape()[m]
                        )));
                    }
                }
                set
            }
        };

        if eligible.len() == self.order() {
            let value = self.full()?.as_array().iter().next().copied().unwrap_or(0.0);
            return Ok(HtValue::Scalar(value));
        }
        if self.order() == 2 || eligible.is_empty() {
            return Ok(HtValue::Tensor(self.clone()));
        }

        let mut ws = Workspace::new(self);
        let mut eligible = eligible;
        let mut order = self.order();
        while order > 2 {
            let Some(leaf) = ws.pick(&eligible) else {
                break;
            };
            let mode = ws.mode[leaf].ok_or_else(|| {
                HtError::StructuralMismatch(format!("node {} is not a leaf", leaf))
            })?;
            ws.eliminate(leaf)?;
            eligible.remove(&mode);
            order -= 1;
            tracing::debug!(mode, leaf, "squeezed singleton mode");
        }

        let (nodes, tree) = ws.into_tree()?;
        Ok(HtValue::Tensor(HTucker::new(nodes, tree, self.is_orthog())?))
    }
}

/// Mutable tree with payloads, indexed by the original node ids
struct Workspace {
    children: Vec<Option<(usize, usize)>>,
    parent: Vec<Option<usize>>,
    payload: Vec<Option<NodeData>>,
    /// Original mode of each live leaf
    mode: Vec<Option<usize>>,
}

impl Workspace {
    fn new(x: &HTucker) -> Self {
        let tree = x.tree();
        let n = tree.nr_nodes();
        Self {
            children: tree.children_table().to_vec(),
            parent: (0..n).map(|t| tree.parent(t)).collect(),
            payload: x.nodes().iter().cloned().map(Some).collect(),
            mode: (0..n).map(|t| tree.mode_of_leaf(t)).collect(),
        }
    }

    fn is_eligible_leaf(&self, t: usize, eligible: &BTreeSet<usize>) -> bool {
        self.children[t].is_none() && self.mode[t].is_some_and(|m| eligible.contains(&m))
    }

    /// Next leaf to eliminate
    fn pick(&self, eligible: &BTreeSet<usize>) -> Option<usize> {
        let pair = (0..self.children.len()).find_map(|p| match self.children[p] {
            Some((l, r)) if self.is_eligible_leaf(l, eligible) && self.is_eligible_leaf(r, eligible) => {
                Some(l)
            }
            _ => None,
        });
        pair.or_else(|| {
            let first = *eligible.iter().next()?;
            self.mode.iter().position(|m| *m == Some(first))
        })
    }

    /// Fold leaf `t` into its parent and merge the parent with `t`'s sibling
    fn eliminate(&mut self, t: usize) -> HtResult<()> {
        let p = self.parent[t]
            .ok_or_else(|| HtError::StructuralMismatch(format!("leaf {} has no parent", t)))?;
        let (l, r) = self.children[p]
            .ok_or_else(|| HtError::StructuralMismatch(format!("parent {} has no children", p)))?;
        let (s, axis) = if l == t { (r, 0) } else { (l, 1) };

        let (Some(NodeData::Leaf(u)), Some(NodeData::Transfer(b))) =
            (self.payload[t].take(), self.payload[p].take())
        else {
            return Err(HtError::StructuralMismatch(format!(
                "node {} or its parent {} carries the wrong payload",
                t, p
            )));
        };
        // (r_sibling × r_parent)
        let folded: Array2<f64> = mode_product3(&b, &u.view(), axis)?
            .index_axis(Axis(axis), 0)
            .to_owned();

        match self.payload[s].take() {
            Some(NodeData::Leaf(us)) => {
                self.payload[p] = Some(NodeData::Leaf(us.dot(&folded)));
                self.children[p] = None;
                self.mode[p] = self.mode[s].take();
            }
            Some(NodeData::Transfer(bs)) => {
                self.payload[p] = Some(NodeData::Transfer(mode_product3(&bs, &folded.t(), 2)?));
                self.children[p] = self.children[s];
                if let Some((sl, sr)) = self.children[s] {
                    self.parent[sl] = Some(p);
                    self.parent[sr] = Some(p);
                }
            }
            None => {
                return Err(HtError::StructuralMismatch(format!(
                    "sibling {} of leaf {} has no payload",
                    s, t
                )))
            }
        }
        for dead in [t, s] {
            self.children[dead] = None;
            self.parent[dead] = None;
            self.mode[dead] = None;
        }
        Ok(())
    }

    /// Renumber the live nodes breadth-first and renumber modes densely
    fn into_tree(mut self) -> HtResult<(Vec<NodeData>, DimTree)> {
        let mut order = Vec::new();
        let mut queue = VecDeque::from([0]);
        while let Some(t) = queue.pop_front() {
            order.push(t);
            if let Some((l, r)) = self.children[t] {
                queue.push_back(l);
                queue.push_back(r);
            }
        }
        let mut new_id = vec![usize::MAX; self.children.len()];
        for (i, &t) in order.iter().enumerate() {
            new_id[t] = i;
        }

        let children = order
            .iter()
            .map(|&t| self.children[t].map(|(l, r)| (new_id[l], new_id[r])))
            .collect();
        let mut leaves: Vec<(usize, usize)> = order
            .iter()
            .filter_map(|&t| self.mode[t].map(|m| (m, new_id[t])))
            .collect();
        leaves.sort_unstable();
        let dim2ind = leaves.into_iter().map(|(_, id)| id).collect();

        let nodes = order
            .iter()
            .map(|&t| {
                self.payload[t].take().ok_or_else(|| {
                    HtError::StructuralMismatch(format!("live node {} lost its payload", t))
                })
            })
            .collect::<HtResult<Vec<_>>>()?;
        Ok((nodes, DimTree::new(children, dim2ind)?))
    }
}
