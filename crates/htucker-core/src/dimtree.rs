//! Dimension trees
//!
//! A dimension tree is a binary tree over the modes `0..d` of an order-`d`
//! tensor. Node ids are dense integers `0..2d-1`; node `0` is the root, every
//! inner node has exactly two children, and each leaf represents exactly one
//! mode (`dim2ind[mode] == leaf`).
//!
//! The tree carries no numeric payload. Parent links and levels are derived
//! once at construction, so every structural query is O(1) or a short
//! traversal.
//!
//! # Canonical tree
//!
//! [`DimTree::canonical`] builds the balanced tree used by default: inner
//! node `k` has children `2k+1` and `2k+2`, leaves are the nodes `d-1..2d-1`,
//! and modes are assigned left to right so that subtree sizes differ by at most
//! one along every level.
//!
//! ```
//! use htucker_core::DimTree;
//!
//! let tree = DimTree::canonical(4).unwrap();
//! assert_eq!(tree.nr_nodes(), 7);
//! assert_eq!(tree.children(0), Some((1, 2)));
//! assert_eq!(tree.dims(1), vec![0, 1]);
//! assert_eq!(tree.node_of_dims(&[2, 3]).unwrap(), 2);
//! ```

use std::collections::VecDeque;
use std::fmt;
use thiserror::Error;

/// Errors raised by dimension-tree construction and queries
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DimTreeError {
    #[error("A dimension tree needs at least two modes, got {0}")]
    TooFewModes(usize),

    #[error("Invalid dimension tree: {0}")]
    InvalidTopology(String),

    #[error("Node {node} out of range for a tree with {nr_nodes} nodes")]
    NodeOutOfRange { node: usize, nr_nodes: usize },

    #[error("No single node covers modes {0:?}")]
    UnknownDims(Vec<usize>),
}

/// Binary tree over tensor modes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimTree {
    children: Vec<Option<(usize, usize)>>,
    dim2ind: Vec<usize>,
    parent: Vec<Option<usize>>,
    level: Vec<usize>,
    ind2dim: Vec<Option<usize>>,
}

impl DimTree {
    /// Build a tree from a children table and a mode-to-leaf map
    ///
    /// `children[t]` is `Some((left, right))` for inner nodes and `None` for
    /// leaves. The topology is validated completely: node count, unique root,
    /// unique parents, connectivity, and `dim2ind` being a bijection onto the
    /// leaves.
    pub fn new(
        children: Vec<Option<(usize, usize)>>,
        dim2ind: Vec<usize>,
    ) -> Result<Self, DimTreeError> {
        let d = dim2ind.len();
        if d < 2 {
            return Err(DimTreeError::TooFewModes(d));
        }
        let n = children.len();
        if n != 2 * d - 1 {
            return Err(DimTreeError::InvalidTopology(format!(
                "{} modes require {} nodes, got {}",
                d,
                2 * d - 1,
                n
            )));
        }

        let mut parent = vec![None; n];
        for (t, entry) in children.iter().enumerate() {
            if let Some((l, r)) = *entry {
                for c in [l, r] {
                    if c >= n {
                        return Err(DimTreeError::InvalidTopology(format!(
                            "child {} of node {} is out of range",
                            c, t
                        )));
                    }
                    if c == 0 {
                        return Err(DimTreeError::InvalidTopology(format!(
                            "root listed as child of node {}",
                            t
                        )));
                    }
                    if let Some(p) = parent[c] {
                        return Err(DimTreeError::InvalidTopology(format!(
                            "node {} has two parents ({} and {})",
                            c, p, t
                        )));
                    }
                    parent[c] = Some(t);
                }
                if l == r {
                    return Err(DimTreeError::InvalidTopology(format!(
                        "node {} lists child {} twice",
                        t, l
                    )));
                }
            }
        }
        if children[0].is_none() {
            return Err(DimTreeError::InvalidTopology(
                "root must be an inner node".to_string(),
            ));
        }
        if let Some(orphan) = (1..n).find(|&t| parent[t].is_none()) {
            return Err(DimTreeError::InvalidTopology(format!(
                "node {} is disconnected",
                orphan
            )));
        }

        // Every non-root node has exactly one parent, so reaching all nodes
        // from the root rules out cycles.
        let mut level = vec![0; n];
        let mut reached = vec![false; n];
        reached[0] = true;
        let mut queue = VecDeque::from([0usize]);
        let mut count = 0;
        while let Some(t) = queue.pop_front() {
            count += 1;
            if let Some((l, r)) = children[t] {
                for c in [l, r] {
                    if reached[c] {
                        return Err(DimTreeError::InvalidTopology(format!(
                            "cycle through node {}",
                            c
                        )));
                    }
                    reached[c] = true;
                    level[c] = level[t] + 1;
                    queue.push_back(c);
                }
            }
        }
        if count != n {
            return Err(DimTreeError::InvalidTopology(format!(
                "only {} of {} nodes are reachable from the root",
                count, n
            )));
        }

        let mut ind2dim = vec![None; n];
        for (mode, &leaf) in dim2ind.iter().enumerate() {
            if leaf >= n || children[leaf].is_some() {
                return Err(DimTreeError::InvalidTopology(format!(
                    "mode {} maps to node {}, which is not a leaf",
                    mode, leaf
                )));
            }
            if let Some(other) = ind2dim[leaf] {
                return Err(DimTreeError::InvalidTopology(format!(
                    "modes {} and {} map to the same leaf {}",
                    other, mode, leaf
                )));
            }
            ind2dim[leaf] = Some(mode);
        }

        Ok(Self {
            children,
            dim2ind,
            parent,
            level,
            ind2dim,
        })
    }

    /// Build a tree from a `(-1, -1)`-encoded children table
    ///
    /// ```
    /// use htucker_core::DimTree;
    ///
    /// let tree = DimTree::from_table(&[[1, 2], [-1, -1], [-1, -1]], &[2, 1]).unwrap();
    /// assert_eq!(tree.leaf_of_mode(0), 2);
    /// ```
    pub fn from_table(table: &[[i64; 2]], dim2ind: &[usize]) -> Result<Self, DimTreeError> {
        let children = table
            .iter()
            .enumerate()
            .map(|(t, &[l, r])| match (l, r) {
                (-1, -1) => Ok(None),
                (l, r) if l >= 0 && r >= 0 => Ok(Some((l as usize, r as usize))),
                _ => Err(DimTreeError::InvalidTopology(format!(
                    "node {} has malformed children ({}, {})",
                    t, l, r
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(children, dim2ind.to_vec())
    }

    /// Default tree over `d` modes
    ///
    /// A complete binary tree in heap order: inner nodes are `0..d-1` and the
    /// children of `t` are `2t + 1` and `2t + 2`. With `p = ⌈log2 d⌉`, the
    /// first `2d - 2^p` modes are leaves on level `p` and the remaining modes
    /// on level `p - 1`, left to right. Sibling subtrees are therefore not
    /// always within one mode of each other: `d = 6` splits the root 4/2.
    ///
    /// ```
    /// use htucker_core::DimTree;
    ///
    /// let tree = DimTree::canonical(6).unwrap();
    /// assert_eq!(tree.dims(1), vec![0, 1, 2, 3]);
    /// assert_eq!(tree.dims(2), vec![4, 5]);
    /// ```
    pub fn canonical(d: usize) -> Result<Self, DimTreeError> {
        if d < 2 {
            return Err(DimTreeError::TooFewModes(d));
        }
        let n = 2 * d - 1;
        let children = (0..n)
            .map(|t| (t < d - 1).then_some((2 * t + 1, 2 * t + 2)))
            .collect();

        // p = ceil(log2(d)); the first 2d - 2^p modes sit on the deepest level.
        let p = usize::BITS - (d - 1).leading_zeros();
        let full = 1usize << p;
        let dim2ind = (0..d)
            .map(|i| {
                if i < 2 * d - full {
                    full - 1 + i
                } else {
                    full - 1 - d + i
                }
            })
            .collect();
        Self::new(children, dim2ind)
    }

    /// Number of nodes (`2d - 1`)
    pub fn nr_nodes(&self) -> usize {
        self.children.len()
    }

    /// Number of modes covered by the tree
    pub fn nr_dims(&self) -> usize {
        self.dim2ind.len()
    }

    /// Fail with [`DimTreeError::NodeOutOfRange`] for an invalid node id
    pub fn check_node(&self, node: usize) -> Result<(), DimTreeError> {
        if node < self.nr_nodes() {
            Ok(())
        } else {
            Err(DimTreeError::NodeOutOfRange {
                node,
                nr_nodes: self.nr_nodes(),
            })
        }
    }

    /// Children of `node`, `None` for leaves
    ///
    /// All node queries panic on out-of-range ids, like slice indexing; use
    /// [`DimTree::check_node`] to validate ids from untrusted input.
    pub fn children(&self, node: usize) -> Option<(usize, usize)> {
        self.children[node]
    }

    pub fn left(&self, node: usize) -> Option<usize> {
        self.children[node].map(|(l, _)| l)
    }

    pub fn right(&self, node: usize) -> Option<usize> {
        self.children[node].map(|(_, r)| r)
    }

    pub fn parent(&self, node: usize) -> Option<usize> {
        self.parent[node]
    }

    /// The other child of `node`'s parent
    pub fn sibling(&self, node: usize) -> Option<usize> {
        let (l, r) = self.children[self.parent[node]?]?;
        Some(if l == node { r } else { l })
    }

    pub fn is_root(&self, node: usize) -> bool {
        node == 0
    }

    pub fn is_leaf(&self, node: usize) -> bool {
        self.children[node].is_none()
    }

    pub fn is_inner(&self, node: usize) -> bool {
        self.children[node].is_some()
    }

    pub fn is_left(&self, node: usize) -> bool {
        self.parent[node].and_then(|p| self.left(p)) == Some(node)
    }

    pub fn is_right(&self, node: usize) -> bool {
        self.parent[node].and_then(|p| self.right(p)) == Some(node)
    }

    /// Distance from the root
    pub fn level(&self, node: usize) -> usize {
        self.level[node]
    }

    /// Largest level of any node
    pub fn depth(&self) -> usize {
        self.level.iter().copied().max().unwrap_or(0)
    }

    /// Nodes on level `l`, ascending by id
    pub fn nodes_of_level(&self, l: usize) -> Vec<usize> {
        (0..self.nr_nodes()).filter(|&t| self.level[t] == l).collect()
    }

    /// Leaf ids, ascending
    pub fn leaves(&self) -> Vec<usize> {
        (0..self.nr_nodes()).filter(|&t| self.is_leaf(t)).collect()
    }

    /// Inner node ids (root included), ascending
    pub fn inner_nodes(&self) -> Vec<usize> {
        (0..self.nr_nodes()).filter(|&t| self.is_inner(t)).collect()
    }

    /// Leaf representing `mode`
    pub fn leaf_of_mode(&self, mode: usize) -> usize {
        self.dim2ind[mode]
    }

    /// Mode represented by `node`, `None` for inner nodes
    pub fn mode_of_leaf(&self, node: usize) -> Option<usize> {
        self.ind2dim[node]
    }

    /// Mode-to-leaf map
    pub fn dim2ind(&self) -> &[usize] {
        &self.dim2ind
    }

    /// Children table indexed by node id
    pub fn children_table(&self) -> &[Option<(usize, usize)>] {
        &self.children
    }

    /// Nodes of the subtree rooted at `node` in breadth-first order
    pub fn subtree(&self, node: usize) -> Vec<usize> {
        let mut out = Vec::new();
        let mut queue = VecDeque::from([node]);
        while let Some(t) = queue.pop_front() {
            out.push(t);
            if let Some((l, r)) = self.children[t] {
                queue.push_back(l);
                queue.push_back(r);
            }
        }
        out
    }

    /// All nodes with children listed before their parents
    pub fn post_order(&self) -> Vec<usize> {
        let mut out = self.subtree(0);
        out.reverse();
        out
    }

    /// Modes covered by `node`, in left-to-right leaf order
    ///
    /// This is the order in which the modes are flattened into the row index
    /// of the node basis.
    pub fn ordered_dims(&self, node: usize) -> Vec<usize> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(t) = stack.pop() {
            match self.children[t] {
                Some((l, r)) => {
                    stack.push(r);
                    stack.push(l);
                }
                None => {
                    if let Some(mode) = self.ind2dim[t] {
                        out.push(mode);
                    }
                }
            }
        }
        out
    }

    /// Modes covered by `node`, sorted ascending
    pub fn dims(&self, node: usize) -> Vec<usize> {
        let mut dims = self.ordered_dims(node);
        dims.sort_unstable();
        dims
    }

    /// The unique node whose covered modes are exactly `dims`
    pub fn node_of_dims(&self, dims: &[usize]) -> Result<usize, DimTreeError> {
        let mut wanted = dims.to_vec();
        wanted.sort_unstable();
        (0..self.nr_nodes())
            .find(|&t| self.dims(t) == wanted)
            .ok_or(DimTreeError::UnknownDims(wanted))
    }

    /// Minimal set of subtree roots whose modes together are exactly `dims`
    ///
    /// Returned in ascending node order. Empty when `dims` is empty; `[0]`
    /// when `dims` covers every mode.
    pub fn covering_subtrees(&self, dims: &[usize]) -> Vec<usize> {
        let n = self.nr_nodes();
        let mut marked = vec![false; n];
        for &mode in dims {
            if let Some(&leaf) = self.dim2ind.get(mode) {
                marked[leaf] = true;
            }
        }
        for t in self.post_order() {
            if let Some((l, r)) = self.children[t] {
                marked[t] = marked[l] && marked[r];
            }
        }
        (0..n)
            .filter(|&t| marked[t] && self.parent[t].map_or(true, |p| !marked[p]))
            .collect()
    }

    /// Neighbour of `node` towards the root once the root is removed
    ///
    /// Removing the root and joining its two children by an edge turns the
    /// tree into an unrooted tree in which every inner node has degree three
    /// and every leaf degree one. For a child of the root this is its sibling,
    /// for every other non-root node its parent. `None` for the root.
    pub fn up(&self, node: usize) -> Option<usize> {
        let p = self.parent[node]?;
        if p == 0 {
            self.sibling(node)
        } else {
            Some(p)
        }
    }

    /// Neighbours of `node` in the unrooted tree, in slot order
    ///
    /// Slot order is `[left, right, up]` for inner nodes and `[up]` for
    /// leaves; it matches the axis order of the node's payload. Empty for
    /// the root.
    pub fn neighbors(&self, node: usize) -> Vec<usize> {
        let Some(up) = self.up(node) else {
            return Vec::new();
        };
        match self.children[node] {
            Some((l, r)) => vec![l, r, up],
            None => vec![up],
        }
    }
}

/// Structural equality of two trees (same children table and `dim2ind`)
pub fn equal(a: &DimTree, b: &DimTree) -> bool {
    a.children == b.children && a.dim2ind == b.dim2ind
}

impl fmt::Display for DimTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn walk(tree: &DimTree, node: usize, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let indent = "  ".repeat(tree.level(node));
            match tree.children(node) {
                Some((l, r)) => {
                    writeln!(f, "{}{} {:?}", indent, node, tree.dims(node))?;
                    walk(tree, l, f)?;
                    walk(tree, r, f)
                }
                None => writeln!(
                    f,
                    "{}{} (mode {})",
                    indent,
                    node,
                    tree.mode_of_leaf(node).unwrap_or(usize::MAX)
                ),
            }
        }
        walk(self, 0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_small_trees() {
        let t2 = DimTree::canonical(2).unwrap();
        assert_eq!(t2.dim2ind(), &[1, 2]);

        let t3 = DimTree::canonical(3).unwrap();
        assert_eq!(t3.dim2ind(), &[3, 4, 2]);
        assert_eq!(t3.dims(1), vec![0, 1]);
        assert_eq!(t3.depth(), 2);

        let t5 = DimTree::canonical(5).unwrap();
        assert_eq!(t5.dim2ind(), &[7, 8, 4, 5, 6]);
        assert_eq!(t5.ordered_dims(0), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_canonical_invariants() {
        for d in 2..12 {
            let tree = DimTree::canonical(d).unwrap();
            assert_eq!(tree.leaves().len(), d);
            assert_eq!(tree.inner_nodes().len(), d - 1);
            assert_eq!(tree.ordered_dims(0), (0..d).collect::<Vec<_>>());

            let p = (d as f64).log2().ceil() as usize;
            let deep = 2 * d - (1 << p);
            for mode in 0..d {
                let expected = if mode < deep { p } else { p - 1 };
                assert_eq!(tree.level(tree.leaf_of_mode(mode)), expected, "mode {} for d = {}", mode, d);
            }
            for t in tree.inner_nodes() {
                assert_eq!(tree.children(t), Some((2 * t + 1, 2 * t + 2)));
            }
        }
    }

    #[test]
    fn test_canonical_uneven_split() {
        let tree = DimTree::canonical(6).unwrap();
        assert_eq!(tree.dims(1), vec![0, 1, 2, 3]);
        assert_eq!(tree.dims(2), vec![4, 5]);
        assert_eq!(tree.depth(), 3);
    }

    #[test]
    fn test_too_few_modes() {
        assert_eq!(DimTree::canonical(1), Err(DimTreeError::TooFewModes(1)));
    }

    #[test]
    fn test_relations() {
        let tree = DimTree::canonical(4).unwrap();
        assert_eq!(tree.parent(4), Some(1));
        assert_eq!(tree.sibling(4), Some(3));
        assert_eq!(tree.sibling(0), None);
        assert!(tree.is_left(3));
        assert!(tree.is_right(4));
        assert!(!tree.is_left(0) && !tree.is_right(0));
        assert!(tree.is_root(0));
        assert_eq!(tree.nodes_of_level(1), vec![1, 2]);
        assert_eq!(tree.subtree(1), vec![1, 3, 4]);
        assert_eq!(tree.mode_of_leaf(5), Some(2));
        assert_eq!(tree.mode_of_leaf(1), None);
    }

    #[test]
    fn test_node_of_dims() {
        let tree = DimTree::canonical(4).unwrap();
        assert_eq!(tree.node_of_dims(&[3, 2]).unwrap(), 2);
        assert_eq!(tree.node_of_dims(&[0, 1, 2, 3]).unwrap(), 0);
        assert_eq!(
            tree.node_of_dims(&[1, 2]),
            Err(DimTreeError::UnknownDims(vec![1, 2]))
        );
    }

    #[test]
    fn test_covering_subtrees() {
        let tree = DimTree::canonical(4).unwrap();
        assert_eq!(tree.covering_subtrees(&[0, 1]), vec![1]);
        assert_eq!(tree.covering_subtrees(&[1, 2]), vec![4, 5]);
        assert_eq!(tree.covering_subtrees(&[0, 1, 2, 3]), vec![0]);
        assert!(tree.covering_subtrees(&[]).is_empty());
    }

    #[test]
    fn test_unrooted_neighbors() {
        let tree = DimTree::canonical(4).unwrap();
        assert_eq!(tree.up(1), Some(2));
        assert_eq!(tree.up(2), Some(1));
        assert_eq!(tree.up(3), Some(1));
        assert_eq!(tree.neighbors(1), vec![3, 4, 2]);
        assert_eq!(tree.neighbors(6), vec![2]);
        assert!(tree.neighbors(0).is_empty());
    }

    #[test]
    fn test_rejects_malformed_trees() {
        // wrong node count
        assert!(DimTree::new(vec![Some((1, 2)), None], vec![1, 2]).is_err());
        // node with two parents
        assert!(DimTree::new(
            vec![Some((1, 2)), Some((2, 3)), None, None, None],
            vec![2, 3, 4]
        )
        .is_err());
        // disconnected cycle
        assert!(DimTree::new(
            vec![Some((1, 2)), None, None, Some((4, 3)), None],
            vec![1, 2, 4]
        )
        .is_err());
        // dim2ind pointing at an inner node
        assert!(DimTree::new(vec![Some((1, 2)), None, None], vec![0, 1]).is_err());
        // duplicate leaf
        assert!(DimTree::new(vec![Some((1, 2)), None, None], vec![1, 1]).is_err());
        // malformed (-1, x) encoding
        assert!(DimTree::from_table(&[[1, 2], [-1, 3], [-1, -1]], &[1, 2]).is_err());
    }

    #[test]
    fn test_equal_and_display() {
        let a = DimTree::canonical(3).unwrap();
        let b = DimTree::from_table(&[[1, 2], [3, 4], [-1, -1], [-1, -1], [-1, -1]], &[3, 4, 2])
            .unwrap();
        let c = DimTree::from_table(&[[1, 2], [3, 4], [-1, -1], [-1, -1], [-1, -1]], &[4, 3, 2])
            .unwrap();
        assert!(equal(&a, &b));
        assert!(!equal(&a, &c));
        let printed = a.to_string();
        assert!(printed.starts_with("0 [0, 1, 2]"));
        assert!(printed.contains("(mode 2)"));
    }
}
