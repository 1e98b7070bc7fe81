//! Dimension labels and the labeled-shape algebra.
//!
//! A [`Dimensions`] is an ordered list of `(Dim, extent)` pairs, outer to
//! inner, describing a row-major dense buffer. At most one dimension may be
//! *sparse* (extent [`Dimensions::SPARSE`]), and a sparse dimension must be
//! innermost: the buffer then holds one variable-length row per combination
//! of the dense indices, and [`Dimensions::volume`] counts rows.

use std::fmt;

use crate::{Error, Result};

/// A dimension label. Labels are compared by identity only; there is no
/// global ordering between labels, only the order within a given shape.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Dim {
    X,
    Y,
    Z,
    Qx,
    Qy,
    Qz,
    Time,
    Tof,
    Energy,
    DeltaE,
    Spectrum,
    Position,
    Row,
    Event,
    Detector,
    Temperature,
    Invalid,
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dim.{self:?}")
    }
}

/// An ordered sequence of `(Dim, extent)` pairs.
#[derive(Clone, PartialEq, Eq, Default, Debug)]
pub struct Dimensions {
    dims: Vec<Dim>,
    shape: Vec<usize>,
}

impl Dimensions {
    /// Sentinel extent marking the sparse dimension.
    pub const SPARSE: usize = usize::MAX;

    /// The empty (scalar) shape.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a shape from `(Dim, extent)` pairs, outer to inner.
    pub fn new(pairs: &[(Dim, usize)]) -> Result<Self> {
        let mut out = Self::empty();
        for &(dim, extent) in pairs {
            if extent == Self::SPARSE {
                out.add_sparse(dim)?;
            } else {
                out.add_inner(dim, extent)?;
            }
        }
        Ok(out)
    }

    pub fn labels(&self) -> &[Dim] {
        &self.dims
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dims.is_empty()
    }

    pub fn contains(&self, dim: Dim) -> bool {
        self.dims.contains(&dim)
    }

    /// True iff every dim of `other` is present with equal extent.
    pub fn contains_dims(&self, other: &Dimensions) -> bool {
        other.iter().all(|(d, n)| self.extent(d) == Some(n))
    }

    /// Extent along `dim`, `None` if absent. Sparse dims report
    /// [`Dimensions::SPARSE`].
    pub fn extent(&self, dim: Dim) -> Option<usize> {
        self.index(dim).ok().map(|i| self.shape[i])
    }

    /// Position of `dim` within this shape, outermost first.
    pub fn index(&self, dim: Dim) -> Result<usize> {
        self.dims
            .iter()
            .position(|&d| d == dim)
            .ok_or_else(|| Error::Dimension(format!("{dim} not found in {self}")))
    }

    /// Iterate `(Dim, extent)` pairs outer to inner.
    pub fn iter(&self) -> impl Iterator<Item = (Dim, usize)> + '_ {
        self.dims.iter().copied().zip(self.shape.iter().copied())
    }

    /// The sparse dimension, if any.
    pub fn sparse_dim(&self) -> Option<Dim> {
        match (self.dims.last(), self.shape.last()) {
            (Some(&dim), Some(&Self::SPARSE)) => Some(dim),
            _ => None,
        }
    }

    pub fn is_sparse(&self) -> bool {
        self.sparse_dim().is_some()
    }

    /// This shape without its sparse dimension (identity for dense shapes).
    pub fn dense_dims(&self) -> Dimensions {
        let mut out = self.clone();
        if out.is_sparse() {
            out.dims.pop();
            out.shape.pop();
        }
        out
    }

    /// The innermost non-sparse dim.
    pub fn inner(&self) -> Option<Dim> {
        let dense = if self.is_sparse() {
            &self.dims[..self.dims.len() - 1]
        } else {
            &self.dims[..]
        };
        dense.last().copied()
    }

    /// Product of the non-sparse extents. For a sparse shape this counts
    /// rows; each row holds its own variable-length slab.
    pub fn volume(&self) -> usize {
        self.iter()
            .filter(|&(_, n)| n != Self::SPARSE)
            .map(|(_, n)| n)
            .product()
    }

    /// Row-major stride of `dim` into the dense buffer (or the row buffer
    /// for sparse shapes): the product of the extents inner to `dim`.
    pub fn stride(&self, dim: Dim) -> Result<usize> {
        let at = self.index(dim)?;
        if self.shape[at] == Self::SPARSE {
            return Err(Error::Dimension(format!(
                "sparse {dim} has no stride in {self}"
            )));
        }
        Ok(self.shape[at + 1..]
            .iter()
            .filter(|&&n| n != Self::SPARSE)
            .product())
    }

    /// Add `dim` as the new outermost dimension.
    pub fn add(&mut self, dim: Dim, extent: usize) -> Result<()> {
        self.check_new(dim)?;
        if extent == Self::SPARSE {
            return Err(Error::Dimension(format!(
                "sparse {dim} must be the innermost dimension"
            )));
        }
        self.dims.insert(0, dim);
        self.shape.insert(0, extent);
        Ok(())
    }

    /// Add `dim` as the new innermost dense dimension.
    pub fn add_inner(&mut self, dim: Dim, extent: usize) -> Result<()> {
        self.check_new(dim)?;
        if self.is_sparse() {
            return Err(Error::Dimension(format!(
                "cannot add {dim} inside the sparse dimension of {self}"
            )));
        }
        self.dims.push(dim);
        self.shape.push(extent);
        Ok(())
    }

    /// Add `dim` as the (single, innermost) sparse dimension.
    pub fn add_sparse(&mut self, dim: Dim) -> Result<()> {
        self.add_inner(dim, 0)?;
        if let Some(extent) = self.shape.last_mut() {
            *extent = Self::SPARSE;
        }
        Ok(())
    }

    fn check_new(&self, dim: Dim) -> Result<()> {
        if dim == Dim::Invalid {
            return Err(Error::Dimension("cannot add Dim.Invalid".into()));
        }
        if self.contains(dim) {
            return Err(Error::Dimension(format!("duplicate {dim} in {self}")));
        }
        Ok(())
    }

    /// Remove `dim` from the shape.
    pub fn erase(&mut self, dim: Dim) -> Result<()> {
        let at = self.index(dim)?;
        self.dims.remove(at);
        self.shape.remove(at);
        Ok(())
    }

    /// Set the extent along an existing `dim`.
    pub fn resize(&mut self, dim: Dim, extent: usize) -> Result<()> {
        let at = self.index(dim)?;
        if self.shape[at] == Self::SPARSE || extent == Self::SPARSE {
            return Err(Error::Dimension(format!(
                "cannot resize across the sparse marker in {self}"
            )));
        }
        self.shape[at] = extent;
        Ok(())
    }

    /// Rename a dimension without touching data layout.
    pub fn relabel(&mut self, from: Dim, to: Dim) -> Result<()> {
        if self.contains(to) {
            return Err(Error::Dimension(format!("duplicate {to} in {self}")));
        }
        let at = self.index(from)?;
        self.dims[at] = to;
        Ok(())
    }

    /// Reorder to `order`, which must be a permutation of the labels. A
    /// sparse dimension must remain innermost.
    pub fn transpose(&self, order: &[Dim]) -> Result<Dimensions> {
        if order.len() != self.ndim() {
            return Err(Error::Dimension(format!(
                "transpose order has {} labels, shape {self} has {}",
                order.len(),
                self.ndim()
            )));
        }
        let mut out = Self::empty();
        for &dim in order {
            let at = self.index(dim)?;
            if out.contains(dim) {
                return Err(Error::Dimension(format!("duplicate {dim} in order")));
            }
            out.dims.push(dim);
            out.shape.push(self.shape[at]);
        }
        if let Some(sparse) = self.sparse_dim() {
            if out.sparse_dim() != Some(sparse) {
                return Err(Error::Dimension(format!(
                    "sparse {sparse} must remain innermost"
                )));
            }
        }
        Ok(out)
    }

    /// True iff this shape's dims form a contiguous innermost suffix of
    /// `larger` with matching extents.
    pub fn is_contiguous_in(&self, larger: &Dimensions) -> bool {
        let n = self.ndim();
        if n > larger.ndim() {
            return false;
        }
        let tail = larger.ndim() - n;
        self.dims == larger.dims[tail..] && self.shape == larger.shape[tail..]
    }

    /// Union of two shapes, ordered by leftmost appearance. Conflicting
    /// extents fail unless they differ by exactly one (the bin-edge rule),
    /// in which case the smaller (data) extent wins.
    pub fn merge(&self, other: &Dimensions) -> Result<Dimensions> {
        let mut out = Self::empty();
        let mut sparse = None;
        for (dim, extent) in self.iter().chain(other.iter()) {
            if extent == Self::SPARSE {
                match sparse {
                    None => sparse = Some(dim),
                    Some(s) if s == dim => {}
                    Some(s) => {
                        return Err(Error::Dimension(format!(
                            "cannot merge sparse {s} with sparse {dim}"
                        )))
                    }
                }
                continue;
            }
            match out.extent(dim) {
                None => out.add_inner(dim, extent)?,
                Some(have) if have == extent => {}
                Some(have) if have.abs_diff(extent) == 1 => {
                    out.resize(dim, have.min(extent))?;
                }
                Some(have) => {
                    return Err(Error::Dimension(format!(
                        "conflicting extents for {dim}: {have} vs {extent}"
                    )))
                }
            }
        }
        if let Some(dim) = sparse {
            if out.contains(dim) {
                return Err(Error::Dimension(format!(
                    "{dim} is sparse on one side and dense on the other"
                )));
            }
            out.add_sparse(dim)?;
        }
        Ok(out)
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (dim, extent)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            if extent == Self::SPARSE {
                write!(f, "{dim}: sparse")?;
            } else {
                write!(f, "{dim}: {extent}")?;
            }
        }
        write!(f, "}}")
    }
}
