//! The hierarchical Tucker tensor type
//!
//! An order-`d` tensor is stored relative to a [`DimTree`]:
//!
//! - every leaf `t` owns a factor matrix `U_t: (n_mode × r_t)`
//! - every inner node `t` owns a transfer tensor `B_t: (r_left × r_right × r_t)`
//! - the root rank is 1
//!
//! The basis of an inner node is built from its children's bases,
//!
//! ```text
//! U_t[:, c] = Σ_{a,b} B_t[a, b, c] · (U_left[:, a] ⊗ U_right[:, b])
//! ```
//!
//! with the left index varying fastest, and the tensor itself is the single
//! column of the root basis reshaped (column-major) to the mode sizes.
//!
//! Payloads live in an arena indexed by node id, so a node without payload or
//! with the wrong kind of payload cannot exist once [`HTucker::new`] succeeded.

use htucker_core::DimTree;
use scirs2_core::ndarray_ext::{Array2, Array3};

use crate::error::{HtError, HtResult};
use crate::kernels::transfer_to_matrix;

/// Payload of one tree node
#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    /// Leaf factor matrix `(mode size × rank)`
    Leaf(Array2<f64>),
    /// Transfer tensor `(left rank × right rank × rank)`
    Transfer(Array3<f64>),
}

impl NodeData {
    /// Rank of the edge towards the parent
    pub fn rank(&self) -> usize {
        match self {
            NodeData::Leaf(u) => u.ncols(),
            NodeData::Transfer(b) => b.dim().2,
        }
    }

    /// Number of stored elements
    pub fn len(&self) -> usize {
        match self {
            NodeData::Leaf(u) => u.len(),
            NodeData::Transfer(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Either a scalar or a tensor
///
/// Returned by operations that collapse every mode of their result
/// (element selection, squeezing all-singleton tensors, full contraction).
#[derive(Debug, Clone)]
pub enum HtValue {
    Scalar(f64),
    Tensor(HTucker),
}

impl HtValue {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            HtValue::Scalar(v) => Some(*v),
            HtValue::Tensor(_) => None,
        }
    }

    pub fn into_tensor(self) -> Option<HTucker> {
        match self {
            HtValue::Scalar(_) => None,
            HtValue::Tensor(t) => Some(t),
        }
    }
}

/// Tensor in hierarchical Tucker format
///
/// Values are independent: operations borrow their inputs and return freshly
/// allocated results, so no two tensors share payload storage.
#[derive(Debug, Clone)]
pub struct HTucker {
    nodes: Vec<NodeData>,
    tree: DimTree,
    shape: Vec<usize>,
    is_orthog: bool,
}

impl HTucker {
    /// Assemble a tensor from per-node payloads
    ///
    /// `nodes[t]` must be a [`NodeData::Leaf`] for every leaf of `tree` and a
    /// [`NodeData::Transfer`] for every inner node. Transfer tensors must match
    /// their children's ranks and the root rank must be 1.
    ///
    /// `is_orthog` is advisory; pass `true` only when the leaves have
    /// orthonormal columns and every non-root transfer tensor is
    /// column-orthonormal when matricized over its two child axes.
    pub fn new(nodes: Vec<NodeData>, tree: DimTree, is_orthog: bool) -> HtResult<Self> {
        if nodes.len() != tree.nr_nodes() {
            return Err(HtError::StructuralMismatch(format!(
                "{} payloads for a tree with {} nodes",
                nodes.len(),
                tree.nr_nodes()
            )));
        }

        for (t, node) in nodes.iter().enumerate() {
            match (node, tree.children(t)) {
                (NodeData::Leaf(u), None) => {
                    if u.nrows() == 0 || u.ncols() == 0 {
                        return Err(HtError::ShapeMismatch(format!(
                            "leaf {} has empty factor of shape {:?}",
                            t,
                            u.dim()
                        )));
                    }
                }
                (NodeData::Transfer(b), Some((l, r))) => {
                    let (bl, br, bt) = b.dim();
                    if bt == 0 {
                        return Err(HtError::ShapeMismatch(format!(
                            "transfer tensor {} has zero rank",
                            t
                        )));
                    }
                    if bl != nodes[l].rank() || br != nodes[r].rank() {
                        return Err(HtError::ShapeMismatch(format!(
                            "transfer tensor {} has shape {:?} but children {} and {} have ranks {} and {}",
                            t,
                            b.dim(),
                            l,
                            r,
                            nodes[l].rank(),
                            nodes[r].rank()
                        )));
                    }
                }
                (NodeData::Leaf(_), Some(_)) => {
                    return Err(HtError::StructuralMismatch(format!(
                        "inner node {} carries a leaf factor",
                        t
                    )))
                }
                (NodeData::Transfer(_), None) => {
                    return Err(HtError::StructuralMismatch(format!(
                        "leaf {} carries a transfer tensor",
                        t
                    )))
                }
            }
        }
        if nodes[0].rank() != 1 {
            return Err(HtError::ShapeMismatch(format!(
                "root rank must be 1, got {}",
                nodes[0].rank()
            )));
        }

        let shape = tree
            .dim2ind()
            .iter()
            .map(|&leaf| match &nodes[leaf] {
                NodeData::Leaf(u) => u.nrows(),
                NodeData::Transfer(b) => b.dim().0,
            })
            .collect();

        Ok(Self {
            nodes,
            tree,
            shape,
            is_orthog,
        })
    }

    /// Governing dimension tree
    pub fn tree(&self) -> &DimTree {
        &self.tree
    }

    /// Mode sizes, `shape[k]` being the size of mode `k`
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Tensor order
    pub fn order(&self) -> usize {
        self.shape.len()
    }

    pub fn is_orthog(&self) -> bool {
        self.is_orthog
    }

    /// Payloads indexed by node id
    pub fn nodes(&self) -> &[NodeData] {
        &self.nodes
    }

    /// Leaf factor of `node`, `None` for inner nodes
    pub fn leaf(&self, node: usize) -> Option<&Array2<f64>> {
        match self.nodes.get(node)? {
            NodeData::Leaf(u) => Some(u),
            NodeData::Transfer(_) => None,
        }
    }

    /// Transfer tensor of `node`, `None` for leaves
    pub fn transfer(&self, node: usize) -> Option<&Array3<f64>> {
        match self.nodes.get(node)? {
            NodeData::Transfer(b) => Some(b),
            NodeData::Leaf(_) => None,
        }
    }

    /// Rank of `node`
    pub fn rank(&self, node: usize) -> usize {
        self.nodes[node].rank()
    }

    /// Ranks of all nodes indexed by node id
    pub fn ranks(&self) -> Vec<usize> {
        self.nodes.iter().map(NodeData::rank).collect()
    }

    /// Total payload storage in bytes
    pub fn size_in_bytes(&self) -> usize {
        self.nodes.iter().map(NodeData::len).sum::<usize>() * std::mem::size_of::<f64>()
    }

    /// Numerically verify the orthogonality invariant
    ///
    /// Independent of the advisory [`HTucker::is_orthog`] flag.
    pub fn is_orthogonal_within(&self, tol: f64) -> bool {
        self.nodes.iter().enumerate().skip(1).all(|(t, node)| {
            let gram = match node {
                NodeData::Leaf(u) => u.t().dot(u),
                NodeData::Transfer(b) => {
                    let m = transfer_to_matrix(b);
                    m.t().dot(&m)
                }
            };
            let ok = gram.indexed_iter().all(|((i, j), v)| {
                let expected = if i == j { 1.0 } else { 0.0 };
                (v - expected).abs() <= tol
            });
            if !ok {
                tracing::trace!(node = t, "orthogonality check failed");
            }
            ok
        })
    }

    /// Leaf factor or a structural error
    pub(crate) fn u(&self, node: usize) -> HtResult<&Array2<f64>> {
        self.leaf(node).ok_or_else(|| {
            HtError::StructuralMismatch(format!("node {} is not a leaf", node))
        })
    }

    /// Transfer tensor or a structural error
    pub(crate) fn b(&self, node: usize) -> HtResult<&Array3<f64>> {
        self.transfer(node).ok_or_else(|| {
            HtError::StructuralMismatch(format!("node {} is not an inner node", node))
        })
    }

    pub(crate) fn into_parts(self) -> (Vec<NodeData>, DimTree, bool) {
        (self.nodes, self.tree, self.is_orthog)
    }

    /// Fail unless `self` and `other` share the same dimension tree and shape
    pub(crate) fn check_same_structure(&self, other: &HTucker, op: &str) -> HtResult<()> {
        if !htucker_core::equal(&self.tree, &other.tree) {
            return Err(HtError::StructuralMismatch(format!(
                "{} requires identical dimension trees",
                op
            )));
        }
        if self.shape != other.shape {
            return Err(HtError::ShapeMismatch(format!(
                "{} requires equal shapes, got {:?} and {:?}",
                op, self.shape, other.shape
            )));
        }
        Ok(())
    }
}

/// Unwrap a fully populated payload arena
pub(crate) fn collect_nodes(nodes: Vec<Option<NodeData>>) -> HtResult<Vec<NodeData>> {
    nodes
        .into_iter()
        .enumerate()
        .map(|(t, node)| {
            node.ok_or_else(|| HtError::StructuralMismatch(format!("node {} has no payload", t)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order3(ranks: [usize; 5]) -> HtResult<HTucker> {
        // canonical(3): 0 -> (1, 2), 1 -> (3, 4); modes 0, 1, 2 at 3, 4, 2
        let tree = DimTree::canonical(3)?;
        let nodes = vec![
            NodeData::Transfer(Array3::ones((ranks[1], ranks[2], ranks[0]))),
            NodeData::Transfer(Array3::ones((ranks[3], ranks[4], ranks[1]))),
            NodeData::Leaf(Array2::ones((4, ranks[2]))),
            NodeData::Leaf(Array2::ones((2, ranks[3]))),
            NodeData::Leaf(Array2::ones((3, ranks[4]))),
        ];
        HTucker::new(nodes, tree, false)
    }

    #[test]
    fn test_new_and_accessors() {
        let x = order3([1, 2, 3, 2, 2]).unwrap();
        assert_eq!(x.shape(), &[2, 3, 4]);
        assert_eq!(x.order(), 3);
        assert_eq!(x.ranks(), vec![1, 2, 3, 2, 2]);
        assert!(x.leaf(3).is_some());
        assert!(x.leaf(1).is_none());
        assert!(x.transfer(0).is_some());
        assert!(x.transfer(17).is_none());
        // 2*3 + 2*2*2 + 4*3 + 2*2 + 3*2 = 36 elements
        assert_eq!(x.size_in_bytes(), 36 * 8);
    }

    #[test]
    fn test_new_rejects_rank_mismatch() {
        let tree = DimTree::canonical(2).unwrap();
        let nodes = vec![
            NodeData::Transfer(Array3::ones((2, 2, 1))),
            NodeData::Leaf(Array2::ones((3, 2))),
            NodeData::Leaf(Array2::ones((3, 3))),
        ];
        assert!(matches!(
            HTucker::new(nodes, tree, false),
            Err(HtError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_new_rejects_root_rank() {
        assert!(order3([2, 2, 3, 2, 2]).is_err());
    }

    #[test]
    fn test_new_rejects_wrong_payload_kind() {
        let tree = DimTree::canonical(2).unwrap();
        let nodes = vec![
            NodeData::Transfer(Array3::ones((2, 2, 1))),
            NodeData::Transfer(Array3::ones((1, 1, 2))),
            NodeData::Leaf(Array2::ones((3, 2))),
        ];
        assert!(matches!(
            HTucker::new(nodes, tree, false),
            Err(HtError::StructuralMismatch(_))
        ));
    }

    #[test]
    fn test_orthogonality_check() {
        let tree = DimTree::canonical(2).unwrap();
        let nodes = vec![
            NodeData::Transfer(Array3::ones((2, 2, 1))),
            NodeData::Leaf(Array2::eye(2)),
            NodeData::Leaf(Array2::eye(2)),
        ];
        let x = HTucker::new(nodes, tree, true).unwrap();
        assert!(x.is_orthogonal_within(1e-14));
        let y = order3([1, 2, 3, 2, 2]).unwrap();
        assert!(!y.is_orthogonal_within(1e-8));
    }
}
