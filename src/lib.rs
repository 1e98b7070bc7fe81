//! Labeled multi-dimensional arrays for scientific data.
//!
//! The central abstraction is the [`Variable`]: a typed buffer paired with
//! a named-dimension shape ([`Dimensions`]), an optional per-element
//! variance buffer, and a physical [`Unit`]. Variables compose into
//! [`Dataset`]s: named collections of data items sharing coordinates,
//! labels, and masks. Operations preserve dimensional alignment, propagate
//! uncertainties, and work through non-copying strided views.
//!
//! # Core Types
//!
//! - [`Dim`] / [`Dimensions`]: labeled-shape algebra with an optional
//!   innermost *sparse* dimension of variable-length rows
//! - [`Variable`] / [`VariableView`]: owned buffers and non-owning windows
//!   realizing slicing, broadcasting, and transposition
//! - [`ViewIndex`] / [`StridedView`]: the strided offset iterator behind
//!   every window
//! - [`ValueAndVariance`]: uncertainty propagation for `+ - * /`, `sqrt`,
//!   `abs`, `acos`, and friends
//! - [`Dataset`] / [`DatasetSlice`]: aligned collections with bin-edge
//!   aware slicing
//!
//! # Operations
//!
//! Arithmetic and reductions live in [`ops`]; user-defined element kernels
//! go through [`transform_in_place!`] / [`transform!`] /
//! [`transform_in_place_binary!`], parameterized by the admissible
//! element-type tags.
//!
//! # Example
//!
//! ```rust
//! use labeled_rs::{ops, Dim, Dimensions, Unit, Variable};
//!
//! # fn main() -> labeled_rs::Result<()> {
//! let dims = Dimensions::new(&[(Dim::X, 2)])?;
//! let mut a = Variable::with_variances(
//!     dims.clone(), Unit::counts(), vec![1.0, 2.0], vec![1.0, 1.0])?;
//! let b = Variable::with_variances(
//!     dims, Unit::counts(), vec![10.0, 20.0], vec![4.0, 9.0])?;
//! ops::add_in_place(&mut a, &b)?;
//! assert_eq!(a.values::<f64>()?, &[11.0, 22.0]);
//! assert_eq!(a.variances::<f64>()?, &[5.0, 10.0]);
//! # Ok(())
//! # }
//! ```

pub mod dataset;
pub mod dim;
pub mod element;
pub mod ops;
pub mod transform;
pub mod value_variance;
pub mod variable;
pub mod view;

// ============================================================================
// Shapes and elements
// ============================================================================
pub use dim::{Dim, Dimensions};
pub use element::{DType, Element, Matrix3, SparseElement, Values, Vector3};
pub use labeled_units::{Unit, UnitError};

// ============================================================================
// Variables and views
// ============================================================================
pub use value_variance::{ValueAndVariance, ValuesAndVariances};
pub use variable::{Variable, VariableView, VariableViewMut};
pub use view::{Bin, BinView, StridedView, StridedViewMut, ViewIndex};

// ============================================================================
// Datasets
// ============================================================================
pub use dataset::{DataItem, Dataset, DatasetSlice};

// ============================================================================
// Transform kernels
// ============================================================================
pub use transform::{BinaryKernel, BinaryValueKernel, UnaryKernel, UnaryValueKernel};

// ============================================================================
// Error types
// ============================================================================

/// Errors that can occur during labeled-array operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An element type the operation is not implemented for.
    #[error("type error: {0}")]
    Type(String),

    /// Shapes cannot be reconciled (missing dims, conflicting extents,
    /// forbidden mixed bin-edge iteration).
    #[error("dimension error: {0}")]
    Dimension(String),

    /// Slice bounds outside the extent of the sliced dim.
    #[error("slice [{begin}, {end}) out of range for {dim} of extent {extent}")]
    Slice {
        dim: dim::Dim,
        begin: usize,
        end: usize,
        extent: usize,
    },

    /// Coordinates (or labels) of two datasets are not element-wise equal.
    #[error("coordinate mismatch: {0}")]
    CoordMismatch(String),

    /// An unknown item, coord, label, or mask name.
    #[error("unknown name: {0}")]
    Name(String),

    /// Sparse row lengths do not match.
    #[error("row length mismatch: {0} vs {1}")]
    Shape(usize, usize),

    /// Inconsistent presence of variances.
    #[error("variances error: {0}")]
    Variances(&'static str),

    /// Unit arithmetic failure.
    #[error(transparent)]
    Unit(#[from] labeled_units::UnitError),

    /// An entry point that is deliberately not implemented.
    #[error("unsupported: {0}")]
    Unsupported(&'static str),
}

/// Result type for labeled-array operations.
pub type Result<T> = std::result::Result<T, Error>;
