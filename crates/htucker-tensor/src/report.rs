//! Per-node truncation outcomes

use scirs2_core::ndarray_ext::Array1;

use crate::trunc_rank::RankChoice;

/// Rank decision taken at one node
#[derive(Debug, Clone, PartialEq)]
pub struct NodeTruncation {
    pub rank: usize,
    /// Frobenius residual of the node-wise truncation
    pub error: f64,
    /// Singular values the rank was chosen from, descending
    pub singular_values: Array1<f64>,
    /// `false` when `max_rank` stopped short of the error target
    pub satisfied: bool,
}

/// Rank decisions of a compression run, indexed by node id
///
/// Nodes that were not truncated (the root, and nodes untouched by the
/// operation) have no entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TruncationReport {
    nodes: Vec<Option<NodeTruncation>>,
}

impl TruncationReport {
    pub(crate) fn new(nr_nodes: usize) -> Self {
        Self {
            nodes: vec![None; nr_nodes],
        }
    }

    pub(crate) fn record(&mut self, node: usize, choice: RankChoice, singular_values: Array1<f64>) {
        tracing::debug!(
            node,
            rank = choice.rank,
            error = choice.error,
            satisfied = choice.satisfied,
            "node truncated"
        );
        if !choice.satisfied {
            tracing::debug!(node, "accuracy target missed at rank ceiling");
        }
        self.nodes[node] = Some(NodeTruncation {
            rank: choice.rank,
            error: choice.error,
            singular_values,
            satisfied: choice.satisfied,
        });
    }

    /// Decision at `node`, if the node was truncated
    pub fn node(&self, node: usize) -> Option<&NodeTruncation> {
        self.nodes.get(node).and_then(Option::as_ref)
    }

    /// Node errors indexed by node id, zero where nothing was truncated
    pub fn errors(&self) -> Vec<f64> {
        self.nodes
            .iter()
            .map(|n| n.as_ref().map_or(0.0, |n| n.error))
            .collect()
    }

    /// Root-sum-square of all node errors
    ///
    /// An upper bound on the total Frobenius error of an orthogonal
    /// hierarchical truncation.
    pub fn total_error(&self) -> f64 {
        self.errors().iter().map(|e| e * e).sum::<f64>().sqrt()
    }

    /// Whether every node met its error target
    pub fn all_satisfied(&self) -> bool {
        self.nodes.iter().flatten().all(|n| n.satisfied)
    }
}
