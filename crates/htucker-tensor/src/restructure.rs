//! Moving an HT tensor to another dimension tree over the same modes
//!
//! # Unrooted view
//!
//! Folding the root transfer tensor into its right child turns the payloads
//! into a tensor network on the unrooted tree: the two children of the root
//! are joined by an edge and every other edge connects a node to its parent.
//! Every axis of a payload then belongs to exactly one edge, in slot order
//! `[left, right, up]` (see [`DimTree::neighbors`]).
//!
//! Two dimension trees whose unrooted trees coincide differ only in where the
//! root sits and in the order of children. Moving a tensor between them is a
//! relabelling of nodes plus an axis permutation of every transfer tensor;
//! the new root is an identity matrix on the edge it splits.

use std::collections::VecDeque;

use htucker_core::DimTree;
use scirs2_core::ndarray_ext::{Array2, Array3, Axis};

use crate::error::{HtError, HtResult};
use crate::kernels::mode_product3;
use crate::tensor::{HTucker, NodeData};

/// Side of the root on which a subtree is placed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl HTucker {
    /// The same tensor represented on `new_tree`
    ///
    /// `new_tree` must describe the same unrooted tree as the current one,
    /// i.e. it may differ only by the position of the root and the order of
    /// children. The result is not orthogonal.
    ///
    /// # Errors
    ///
    /// [`HtError::InvalidArgument`] for a tree over a different number of
    /// modes and [`HtError::StructuralMismatch`] when the unrooted trees
    /// differ.
    pub fn change_dimtree(&self, new_tree: &DimTree) -> HtResult<HTucker> {
        if new_tree.nr_dims() != self.order() {
            return Err(HtError::InvalidArgument(format!(
                "new tree covers {} modes, tensor has {}",
                new_tree.nr_dims(),
                self.order()
            )));
        }
        let old = self.tree();
        let n = old.nr_nodes();
        let payloads = self.unrooted_payloads()?;

        let mut map: Vec<usize> = vec![0; n];
        for v in new_tree.post_order() {
            if v == 0 {
                continue;
            }
            map[v] = match new_tree.children(v) {
                None => {
                    let mode = new_tree.mode_of_leaf(v).ok_or_else(|| {
                        HtError::StructuralMismatch(format!("leaf {} carries no mode", v))
                    })?;
                    old.leaf_of_mode(mode)
                }
                Some((a, b)) => common_neighbor(old, map[a], map[b]).ok_or_else(|| {
                    HtError::StructuralMismatch(format!(
                        "node {} of the new tree has no counterpart: nodes {} and {} are not siblings in any rooting",
                        v, map[a], map[b]
                    ))
                })?,
            };
        }
        let mut used = vec![false; n];
        for &m in &map[1..] {
            if std::mem::replace(&mut used[m], true) {
                return Err(HtError::StructuralMismatch(format!(
                    "node {} matched twice; the trees differ",
                    m
                )));
            }
        }
        tracing::trace!(?map, "new nodes matched to old nodes");

        let mut nodes = Vec::with_capacity(n);
        nodes.push(NodeData::Transfer(Array3::zeros((0, 0, 1))));
        for v in 1..n {
            let up = new_tree
                .up(v)
                .map(|u| map[u])
                .ok_or_else(|| HtError::StructuralMismatch(format!("node {} has no parent", v)))?;
            let slots = old.neighbors(map[v]);
            let wanted = match new_tree.children(v) {
                None => vec![up],
                Some((a, b)) => vec![map[a], map[b], up],
            };
            let perm = wanted
                .iter()
                .map(|w| slots.iter().position(|s| s == w))
                .collect::<Option<Vec<usize>>>()
                .filter(|p| p.len() == slots.len())
                .ok_or_else(|| {
                    HtError::StructuralMismatch(format!(
                        "neighbours {:?} of node {} do not match {:?}",
                        slots, map[v], wanted
                    ))
                })?;

            nodes.push(match &payloads[map[v]] {
                NodeData::Leaf(u) => NodeData::Leaf(u.clone()),
                NodeData::Transfer(b) => NodeData::Transfer(
                    b.view()
                        .permuted_axes([perm[0], perm[1], perm[2]])
                        .as_standard_layout()
                        .into_owned(),
                ),
            });
        }

        let (nl, nr) = new_tree.children(0).ok_or_else(|| {
            HtError::StructuralMismatch("root of the new tree is a leaf".to_string())
        })?;
        if !old.neighbors(map[nl]).contains(&map[nr]) {
            return Err(HtError::StructuralMismatch(format!(
                "children {} and {} of the new root are not adjacent",
                map[nl], map[nr]
            )));
        }
        let r = nodes[nl].rank();
        nodes[0] = NodeData::Transfer(identity_root(r));

        HTucker::new(nodes, new_tree.clone(), false)
    }

    /// Equivalent tensor in which node `ind` is a child of the root
    ///
    /// For `ind > 0` the root is moved onto the edge between `ind` and its
    /// unrooted neighbour towards the old root, with `ind` on `side`. Nodes are
    /// renumbered breadth-first from the new root.
    ///
    /// For `ind == 0` a new root is put on top of the tree whose other child is
    /// a dummy leaf with factor `[[1]]`: it becomes mode 0 of size 1 and all
    /// other modes shift up by one. The old tree keeps its numbering offset by
    /// two and goes on `side`.
    pub fn change_root(&self, ind: usize, side: Side) -> HtResult<HTucker> {
        let old = self.tree();
        old.check_node(ind)?;
        if ind == 0 {
            return self.add_dummy_root(side);
        }
        let up = old.up(ind).ok_or_else(|| {
            HtError::StructuralMismatch(format!("node {} has no neighbour towards the root", ind))
        })?;
        let n = old.nr_nodes();

        let mut new_id: Vec<Option<usize>> = vec![None; n];
        let mut children: Vec<Option<(usize, usize)>> = vec![None; n];
        let (first, second) = match side {
            Side::Left => (ind, up),
            Side::Right => (up, ind),
        };
        new_id[first] = Some(1);
        new_id[second] = Some(2);
        children[0] = Some((1, 2));
        let mut next = 3;
        let mut queue = VecDeque::from([(first, second), (second, first)]);
        while let Some((v, from)) = queue.pop_front() {
            let Some(v_id) = new_id[v] else {
                continue;
            };
            let Some((l, r)) = old.children(v) else {
                continue;
            };
            let up_v = old.up(v).unwrap_or(0);
            let (a, b) = if from == up_v {
                (l, r)
            } else if from == l {
                (up_v, r)
            } else {
                (l, up_v)
            };
            for c in [a, b] {
                new_id[c] = Some(next);
                next += 1;
                queue.push_back((c, v));
            }
            children[v_id] = Some((next - 2, next - 1));
        }

        let dim2ind = (0..old.nr_dims())
            .map(|mode| new_id[old.leaf_of_mode(mode)])
            .collect::<Option<Vec<usize>>>()
            .ok_or_else(|| HtError::StructuralMismatch("re-rooting missed a leaf".to_string()))?;
        let new_tree = DimTree::new(children, dim2ind)?;
        tracing::debug!(ind, ?side, "re-rooted dimension tree");
        self.change_dimtree(&new_tree)
    }

    /// Payloads of the unrooted tree: the root matrix folded into the right child
    fn unrooted_payloads(&self) -> HtResult<Vec<NodeData>> {
        let tree = self.tree();
        let (_, r0) = tree.children(0).ok_or_else(|| {
            HtError::StructuralMismatch("root of the dimension tree is a leaf".to_string())
        })?;
        let root: Array2<f64> = self.b(0)?.index_axis(Axis(2), 0).to_owned();
        let mut payloads = self.nodes().to_vec();
        payloads[r0] = match &payloads[r0] {
            NodeData::Leaf(u) => NodeData::Leaf(u.dot(&root.t())),
            NodeData::Transfer(b) => NodeData::Transfer(mode_product3(b, &root.view(), 2)?),
        };
        Ok(payloads)
    }

    fn add_dummy_root(&self, side: Side) -> HtResult<HTucker> {
        let old = self.tree();
        let mut children = vec![
            Some(match side {
                Side::Left => (2, 1),
                Side::Right => (1, 2),
            }),
            None,
        ];
        children.extend(
            old.children_table()
                .iter()
                .map(|c| c.map(|(l, r)| (l + 2, r + 2))),
        );
        let mut dim2ind = vec![1];
        dim2ind.extend(old.dim2ind().iter().map(|&t| t + 2));
        let tree = DimTree::new(children, dim2ind)?;

        let mut nodes = vec![
            NodeData::Transfer(Array3::ones((1, 1, 1))),
            NodeData::Leaf(Array2::ones((1, 1))),
        ];
        nodes.extend(self.nodes().iter().cloned());
        tracing::debug!(?side, "added a dummy root");
        HTucker::new(nodes, tree, false)
    }
}

/// The unique node adjacent to both `a` and `b` in the unrooted tree
fn common_neighbor(tree: &DimTree, a: usize, b: usize) -> Option<usize> {
    let nb = tree.neighbors(b);
    tree.neighbors(a).into_iter().find(|v| nb.contains(v))
}

fn identity_root(r: usize) -> Array3<f64> {
    Array3::from_shape_fn((r, r, 1), |(i, j, _)| if i == j { 1.0 } else { 0.0 })
}
