//! # htucker-core
//!
//! Foundational building blocks for the hierarchical Tucker (HT) engine:
//!
//! - **Dimension trees** ([`DimTree`]): binary trees over tensor modes, with
//!   validated construction, the canonical balanced layout, and the structural
//!   queries used by compression and restructuring
//! - **Dense tensors** ([`DenseND`]): explicit tensors with column-major
//!   matricization ([`DenseND::matricize`] / [`DenseND::dematricize`])
//! - **Mode products** ([`mode_multiply`], [`multilinear_multiply`]) and the
//!   general dense contraction [`tensordot`]
//! - **Linear algebra** ([`thin_qr`], [`thin_svd`], [`left_svd_via_qr`],
//!   [`left_svd_via_gram`], [`orthonormal_columns`]) on top of `scirs2-linalg`
//!
//! ## SciRS2 Integration
//!
//! All array storage goes through `scirs2_core::ndarray_ext` and all
//! factorizations through `scirs2_linalg`.
//!
//! ## Quick Start
//!
//! ```
//! use htucker_core::{DenseND, DimTree};
//!
//! let tree = DimTree::canonical(3).unwrap();
//! assert_eq!(tree.dims(0), vec![0, 1, 2]);
//!
//! let x = DenseND::<f64>::from_shape_fn(&[2, 3, 4], |ix| ix.iter().sum::<usize>() as f64);
//! let m = x.matricize(&[1]).unwrap();
//! assert_eq!(m.dim(), (3, 8));
//! ```

pub mod dense;
pub mod dimtree;
pub mod linalg;
pub mod nmode;

#[cfg(test)]
mod property_tests;

pub use dense::{inverse_permutation, reshape_col_major, DenseND};
pub use dimtree::{equal, DimTree, DimTreeError};
pub use linalg::{left_svd_via_gram, left_svd_via_qr, orthonormal_columns, thin_qr, thin_svd};
pub use nmode::{mode_multiply, multilinear_multiply, tensordot};
