//! # htucker - Hierarchical Tucker Tensor Engine
//!
//! Compressed tensor algebra on binary dimension trees. High-order tensors
//! are stored in the hierarchical Tucker (HT) format and added, multiplied,
//! contracted and truncated without ever forming them densely.
//!
//! This is the **meta crate** that re-exports the HT components.
//!
//! ## Quick Start
//!
//! ```
//! use htucker::prelude::*;
//!
//! let a = DenseND::<f64>::from_shape_fn(&[4, 5, 4, 5], |ix| {
//!     (ix[0] as f64 + 0.5 * ix[1] as f64).sin() * (1.0 + (ix[2] * ix[3]) as f64).sqrt()
//! });
//! let (x, _) = HTucker::truncate(&a, &TruncationConfig::new(8), None)?;
//!
//! // 2x, recompressed to the original ranks
//! let (y, report) = add_and_truncate(&[&x, &x], &TruncationConfig::new(8))?;
//! assert!(report.all_satisfied());
//! assert!((y.norm()? - 2.0 * x.norm()?).abs() < 1e-8 * x.norm()?);
//! # Ok::<(), HtError>(())
//! ```
//!
//! ## Components
//!
//! ### Building blocks ([`core`])
//!
//! Dimension trees, dense tensors with column-major matricization, mode
//! products, dense contraction and the QR/SVD helpers.
//!
//! ```
//! use htucker::core::DimTree;
//!
//! let tree = DimTree::canonical(5).unwrap();
//! assert_eq!(tree.nr_nodes(), 9);
//! ```
//!
//! ### HT tensors ([`tensor`])
//!
//! The [`HTucker`](tensor::HTucker) type with compression, orthogonalization,
//! algebra, restructuring, contraction and serialization.
//!
//! ### Logging ([`tracing_support`])
//!
//! Subscriber setup for the spans and events emitted by the engine.
//!
//! ## Features
//!
//! - `tracing` (default): subscriber bootstrap through `tracing-subscriber`

pub use htucker_core as core;
pub use htucker_tensor as tensor;

pub mod tracing_support;

pub mod prelude {
    //! Prelude module for convenient imports
    //!
    //! # Example
    //!
    //! ```
    //! use htucker::prelude::*;
    //!
    //! let tree = DimTree::canonical(3).unwrap();
    //! ```

    // Building blocks
    pub use crate::core::{tensordot, DenseND, DimTree, DimTreeError};

    // HT tensors
    pub use crate::tensor::{
        add_and_truncate, contract, gramians_sum, trunc_rank, HTucker, HtError, HtResult, HtValue,
        ModeIndex, NodeData, RankChoice, Side, TruncationConfig, TruncationReport,
    };
}
