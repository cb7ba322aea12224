//! Binary serialization of HT tensors
//!
//! The blob is a `bincode` (standard configuration) encoding of the dimension
//! tree, every node payload as shape plus row-major data, and the
//! orthogonality flag. Decoding goes through [`DimTree::new`] and
//! [`HTucker::new`], so a blob that decodes is a valid tensor.
//!
//! Decoding is bounded by [`MAX_DECODED_BYTES`]: a corrupt length prefix
//! fails with a limit error instead of reserving memory for it.

use htucker_core::DimTree;
use scirs2_core::ndarray_ext::{Array2, Array3};
use serde::{Deserialize, Serialize};

use crate::error::{HtError, HtResult};
use crate::tensor::{HTucker, NodeData};

const FORMAT_VERSION: u32 = 1;

/// Upper bound on the memory a decoded blob may claim (1 GiB)
pub const MAX_DECODED_BYTES: usize = 1 << 30;

fn decode_config() -> impl bincode::config::Config {
    bincode::config::standard().with_limit::<MAX_DECODED_BYTES>()
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredTensor {
    version: u32,
    children: Vec<Option<(usize, usize)>>,
    dim2ind: Vec<usize>,
    nodes: Vec<StoredNode>,
    is_orthog: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredNode {
    shape: Vec<usize>,
    data: Vec<f64>,
}

impl StoredNode {
    fn from_node(node: &NodeData) -> Self {
        match node {
            NodeData::Leaf(u) => Self {
                shape: u.shape().to_vec(),
                data: u.iter().copied().collect(),
            },
            NodeData::Transfer(b) => Self {
                shape: b.shape().to_vec(),
                data: b.iter().copied().collect(),
            },
        }
    }

    fn into_node(self, t: usize) -> HtResult<NodeData> {
        let malformed = |e: String| HtError::Serialization(format!("payload of node {}: {}", t, e));
        let StoredNode { shape, data } = self;
        match shape[..] {
            [n, r] => Ok(NodeData::Leaf(
                Array2::from_shape_vec((n, r), data).map_err(|e| malformed(e.to_string()))?,
            )),
            [rl, rr, rt] => Ok(NodeData::Transfer(
                Array3::from_shape_vec((rl, rr, rt), data).map_err(|e| malformed(e.to_string()))?,
            )),
            _ => Err(HtError::Serialization(format!(
                "payload of node {} has order {}",
                t,
                shape.len()
            ))),
        }
    }
}

impl HTucker {
    /// Encode the tensor as an opaque byte blob
    pub fn to_bytes(&self) -> HtResult<Vec<u8>> {
        let stored = StoredTensor {
            version: FORMAT_VERSION,
            children: self.tree().children_table().to_vec(),
            dim2ind: self.tree().dim2ind().to_vec(),
            nodes: self.nodes().iter().map(StoredNode::from_node).collect(),
            is_orthog: self.is_orthog(),
        };
        bincode::serde::encode_to_vec(&stored, bincode::config::standard())
            .map_err(|e| HtError::Serialization(e.to_string()))
    }

    /// Decode a blob written by [`HTucker::to_bytes`]
    ///
    /// # Errors
    ///
    /// [`HtError::Serialization`] for undecodable blobs, blobs claiming more
    /// than [`MAX_DECODED_BYTES`], or an unknown format version; tree and payload errors when the decoded content is not a
    /// valid tensor.
    pub fn from_bytes(bytes: &[u8]) -> HtResult<HTucker> {
        if bytes.len() > MAX_DECODED_BYTES {
            return Err(HtError::Serialization(format!(
                "blob of {} bytes exceeds the {} byte limit",
                bytes.len(),
                MAX_DECODED_BYTES
            )));
        }
        let (stored, read): (StoredTensor, usize) =
            bincode::serde::decode_from_slice(bytes, decode_config())
                .map_err(|e| HtError::Serialization(e.to_string()))?;
        if read != bytes.len() {
            return Err(HtError::Serialization(format!(
                "{} trailing bytes after the tensor",
                bytes.len() - read
            )));
        }
        if stored.version != FORMAT_VERSION {
            return Err(HtError::Serialization(format!(
                "unsupported format version {}",
                stored.version
            )));
        }

        let tree = DimTree::new(stored.children, stored.dim2ind)?;
        let nodes = stored
            .nodes
            .into_iter()
            .enumerate()
            .map(|(t, node)| node.into_node(t))
            .collect::<HtResult<Vec<_>>>()?;
        tracing::trace!(nodes = nodes.len(), "decoded HT tensor");
        HTucker::new(nodes, tree, stored.is_orthog)
    }
}
