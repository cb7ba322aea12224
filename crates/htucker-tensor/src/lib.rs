//! # htucker-tensor - Hierarchical Tucker Tensors
//!
//! Tensors of high order stored and manipulated in the hierarchical Tucker
//! (HT) format, a binary tree of small factors whose size grows linearly with
//! the order instead of exponentially.
//!
//! ## Format
//!
//! Relative to a [`htucker_core::DimTree`], every leaf `t` stores a factor
//! matrix `U_t` and every inner node a transfer tensor `B_t`:
//!
//! ```text
//! U_t[:, c] = Σ_{a,b} B_t[a, b, c] · (U_left[:, a] ⊗ U_right[:, b])
//! ```
//!
//! The tensor is the single column of the root basis. See [`HTucker`].
//!
//! ## Operations
//!
//! **Compression and truncation:**
//! - [`HTucker::truncate`]: dense tensor to HT with rank/error control
//! - [`HTucker::recompress`]: truncate the ranks of an HT tensor
//! - [`add_and_truncate`]: sum of several HT tensors, truncated without
//!   forming the exact sum
//! - [`HTucker::ews_multiplication`]: truncated element-wise product
//!
//! **Exact algebra:** [`HTucker::add`], [`HTucker::scalar_mul`],
//! [`HTucker::mode_multiplication`], [`HTucker::ews_mode_multiplication`],
//! [`HTucker::inner_product`], [`HTucker::norm`]
//!
//! **Orthogonality:** [`HTucker::orthogonalize`], [`HTucker::gramians_orthog`],
//! [`gramians_sum`]
//!
//! **Restructuring:** [`HTucker::change_dimtree`], [`HTucker::change_root`],
//! [`HTucker::squeeze`], [`contract`]
//!
//! **Access:** [`HTucker::full`], [`HTucker::get`], [`HTucker::size_in_bytes`],
//! [`HTucker::to_bytes`] / [`HTucker::from_bytes`]
//!
//! Every operation borrows its inputs and returns a new tensor.
//!
//! ## Truncation control
//!
//! [`TruncationConfig`] carries the rank ceiling and the optional absolute
//! and relative error targets. Each truncating operation returns a
//! [`TruncationReport`] with the rank, error and singular values chosen at
//! every node; a target missed because of the rank ceiling is reported there,
//! not as an error.
//!
//! ## Quick Start
//!
//! ```
//! use htucker_core::DenseND;
//! use htucker_tensor::{HTucker, TruncationConfig};
//!
//! let a = DenseND::<f64>::from_shape_fn(&[6, 6, 6, 6], |ix| {
//!     1.0 / (1.0 + ix.iter().sum::<usize>() as f64)
//! });
//! let config = TruncationConfig::new(4).rel_err(1e-6);
//! let (x, report) = HTucker::truncate(&a, &config, None)?;
//!
//! println!("ranks {:?}, {} bytes", x.ranks(), x.size_in_bytes());
//! let err = (&x.full()? - &a).frobenius_norm();
//! assert!(err <= report.total_error() * (1.0 + 1e-8) + 1e-10);
//! # Ok::<(), htucker_tensor::HtError>(())
//! ```
//!
//! ## SciRS2 Integration
//!
//! Payloads are `scirs2_core::ndarray_ext` arrays; QR and SVD go through the
//! helpers of `htucker-core`, which wrap `scirs2_linalg`.
//!
//! ## References
//!
//! - Hackbusch & Kühn (2009), "A New Scheme for the Tensor Representation"
//! - Grasedyck (2010), "Hierarchical Singular Value Decomposition of Tensors"
//! - Kressner & Tobler (2012), "htucker - A Matlab Toolbox for Tensors in
//!   Hierarchical Tucker Format"

pub mod add_truncate;
pub mod algebra;
pub mod config;
pub mod contract;
pub mod error;
pub mod ews;
pub mod gramians_sum;
pub mod orthog;
pub mod persist;
pub mod rebuild;
pub mod recompress;
pub mod report;
pub mod restructure;
pub mod squeeze;
pub mod tensor;
pub mod trunc_rank;
pub mod truncate;

pub(crate) mod kernels;

#[cfg(test)]
mod property_tests;

// Re-exports
pub use add_truncate::add_and_truncate;
pub use config::TruncationConfig;
pub use contract::contract;
pub use error::{HtError, HtResult};
pub use gramians_sum::gramians_sum;
pub use rebuild::ModeIndex;
pub use report::{NodeTruncation, TruncationReport};
pub use restructure::Side;
pub use tensor::{HTucker, HtValue, NodeData};
pub use trunc_rank::{trunc_rank, RankChoice};
