//! The element-wise kernel driver.
//!
//! The mechanism has three layers:
//! 1. Runtime tags are resolved to concrete element types by the dispatch
//!    macros ([`transform_in_place!`](crate::transform_in_place) and
//!    friends), which enumerate the admissible element types per call and
//!    convert an unmatched tag into [`Error::Type`] carrying the operand
//!    type names.
//! 2. The generic drivers here align the operands' shapes, fork on the
//!    presence of variances, and walk both strided windows in lockstep.
//! 3. The user-supplied kernel is applied per element, either on plain
//!    values or on [`ValueAndVariance`] pairs.
//!
//! Sparse data does not need user-visible special casing: when an operand
//! is a sparse row the driver descends into the row once and applies the
//! same scalar kernel element-wise inside it, so a kernel written for
//! `f64` also serves `sparse_float64`. Row sizes are validated before any
//! element is written.
//!
//! Operands reached through this module are always distinct borrows, so
//! in-place writes cannot alias their reads; the one same-buffer entry
//! point ([`binary_in_place_within`]) detects overlapping windows via the
//! offset-range intersection and copies the source side first.

use labeled_units::Unit;
use num_traits::Zero;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::dim::{Dim, Dimensions};
use crate::element::{DType, Element, SparseElement, Values};
use crate::value_variance::{ValueAndVariance, ValuesAndVariances};
use crate::variable::{Variable, VariableView, VariableViewMut};
use crate::view::ViewIndex;
use crate::{Error, Result};

// ============================================================================
// Kernel traits
// ============================================================================

/// A unary kernel on plain values.
pub trait UnaryValueKernel<T> {
    fn value(&self, x: T) -> T;

    /// The unit of the result given the operand's unit.
    fn unit(&self, unit: Unit) -> Result<Unit>;
}

/// A unary kernel that also propagates uncertainties.
pub trait UnaryKernel<T>: UnaryValueKernel<T> {
    fn value_variance(&self, x: ValueAndVariance<T>) -> ValueAndVariance<T>;
}

/// A binary kernel on plain values, writing into the left operand's type.
/// The right operand may be of a different element type (vector-by-scalar
/// scaling).
pub trait BinaryValueKernel<A, B = A> {
    fn value(&self, a: A, b: B) -> A;

    /// The unit of the result given both operands' units.
    fn unit(&self, a: Unit, b: Unit) -> Result<Unit>;
}

/// A binary kernel that also propagates uncertainties.
pub trait BinaryKernel<T>: BinaryValueKernel<T> {
    fn value_variance(&self, a: ValueAndVariance<T>, b: ValueAndVariance<T>)
        -> ValueAndVariance<T>;
}

// ============================================================================
// Operands and alignment
// ============================================================================

/// The read side of a transform: an untyped buffer plus its window.
pub(crate) struct Operand<'a> {
    pub(crate) values: &'a Values,
    pub(crate) variances: Option<&'a Values>,
    pub(crate) data_dims: &'a Dimensions,
    pub(crate) dims: Dimensions,
    pub(crate) offset: usize,
    pub(crate) unit: Unit,
}

impl<'a> Operand<'a> {
    pub(crate) fn from_variable(var: &'a Variable) -> Self {
        Self {
            values: var.values_raw(),
            variances: var.variances_raw(),
            data_dims: var.dims(),
            dims: var.dims().clone(),
            offset: 0,
            unit: var.unit(),
        }
    }

    pub(crate) fn from_view(view: &VariableView<'a>) -> Self {
        Self {
            values: view.values_raw(),
            variances: view.variances_raw(),
            data_dims: view.data_dims(),
            dims: view.dims().clone(),
            offset: view.offset(),
            unit: view.unit(),
        }
    }

    pub(crate) fn dtype(&self) -> DType {
        self.values.dtype()
    }

    fn index(&self, target: &Dimensions) -> Result<ViewIndex> {
        ViewIndex::new(&self.data_dims.dense_dims(), &target.dense_dims(), self.offset)
    }
}

fn type_error(expected: DType, got: DType) -> Error {
    Error::Type(format!("expected {expected}, operand holds {got}"))
}

/// Target shape of a two-operand in-place transform: the LHS shape when it
/// covers the RHS (broadcast), the RHS shape when the LHS is the smaller
/// side (reductions). Mixed bin-edge extents are rejected with a pointer
/// to explicit bin iteration.
fn align_target(lhs: &Dimensions, rhs: &Dimensions) -> Result<Dimensions> {
    if lhs.contains_dims(rhs) {
        return Ok(lhs.clone());
    }
    if rhs.contains_dims(lhs) {
        return Ok(rhs.clone());
    }
    for (dim, n) in rhs.iter() {
        if let Some(m) = lhs.extent(dim) {
            if m != Dimensions::SPARSE && n != Dimensions::SPARSE && m.abs_diff(n) == 1 {
                return Err(Error::Dimension(format!(
                    "mixed bin-edge extents along {dim} ({m} vs {n}); \
                     element-wise iteration is not defined here, use bin iteration"
                )));
            }
        }
    }
    Err(Error::Dimension(format!(
        "operands {lhs} and {rhs} cannot be aligned"
    )))
}

/// Union of two shapes for operations producing a new variable. Unlike
/// [`Dimensions::merge`] there is no bin-edge tolerance: element-wise
/// iteration over a mixed edge/non-edge pair is forbidden.
pub(crate) fn strict_union(a: &Dimensions, b: &Dimensions) -> Result<Dimensions> {
    let mut out = Dimensions::empty();
    let mut sparse = None;
    for (dim, extent) in a.iter().chain(b.iter()) {
        if extent == Dimensions::SPARSE {
            match sparse {
                None => sparse = Some(dim),
                Some(s) if s == dim => {}
                Some(s) => {
                    return Err(Error::Dimension(format!(
                        "cannot combine sparse {s} with sparse {dim}"
                    )))
                }
            }
            continue;
        }
        match out.extent(dim) {
            None => out.add_inner(dim, extent)?,
            Some(have) if have == extent => {}
            Some(have) if have.abs_diff(extent) == 1 => {
                return Err(Error::Dimension(format!(
                    "mixed bin-edge extents along {dim} ({have} vs {extent}); \
                     element-wise iteration is not defined here, use bin iteration"
                )));
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

/// A variable's unit is shared by all its slices, so an operation reached
/// through a partial window must not change it.
fn check_window_unit(lhs: &VariableViewMut<'_>, new_unit: Unit) -> Result<()> {
    let full = lhs.offset == 0 && lhs.dims == lhs.data_dims;
    if new_unit != *lhs.unit && !full {
        return Err(Error::Unsupported("cannot change the unit through a slice"));
    }
    Ok(())
}

fn check_variance_fork(lhs_has: bool, rhs_has: bool) -> Result<()> {
    if rhs_has && !lhs_has {
        return Err(Error::Variances("RHS has variances but LHS does not"));
    }
    Ok(())
}

// ============================================================================
// Dense drivers
// ============================================================================

/// Apply a unary kernel in place over a dense window.
pub fn unary_in_place_dense<T, K>(lhs: &mut VariableViewMut<'_>, op: &K) -> Result<()>
where
    T: Element + Copy + Send + Sync,
    K: UnaryKernel<T> + Sync,
{
    let new_unit = op.unit(*lhs.unit)?;
    check_window_unit(lhs, new_unit)?;
    let index = lhs.index()?;
    let got = lhs.values.dtype();
    let vals = T::slice_mut(lhs.values).ok_or_else(|| type_error(T::DTYPE, got))?;
    match lhs.variances.as_deref_mut() {
        Some(variances) => {
            let vars =
                T::slice_mut(variances).ok_or_else(|| type_error(T::DTYPE, got))?;
            for i in index {
                let out = op.value_variance(ValueAndVariance::new(vals[i], vars[i]));
                vals[i] = out.value;
                vars[i] = out.variance;
            }
        }
        None => {
            #[cfg(feature = "parallel")]
            if lhs.offset == 0 && lhs.dims == lhs.data_dims {
                vals.par_iter_mut().for_each(|x| *x = op.value(*x));
                *lhs.unit = new_unit;
                return Ok(());
            }
            for i in index {
                vals[i] = op.value(vals[i]);
            }
        }
    }
    *lhs.unit = new_unit;
    Ok(())
}

/// Apply a unary kernel in place over the rows of a sparse window.
pub fn unary_in_place_sparse<T, K>(lhs: &mut VariableViewMut<'_>, op: &K) -> Result<()>
where
    T: SparseElement + Copy,
    K: UnaryKernel<T>,
{
    let new_unit = op.unit(*lhs.unit)?;
    check_window_unit(lhs, new_unit)?;
    let index = lhs.index()?;
    let got = lhs.values.dtype();
    let rows = T::rows_mut(lhs.values).ok_or_else(|| type_error(T::DTYPE, got))?;
    match lhs.variances.as_deref_mut() {
        Some(variances) => {
            let var_rows =
                T::rows_mut(variances).ok_or_else(|| type_error(T::DTYPE, got))?;
            for i in index {
                let mut pair = ValuesAndVariances::new(&mut rows[i], &mut var_rows[i]);
                for k in 0..pair.len() {
                    let out = op.value_variance(pair.get(k));
                    pair.set(k, out);
                }
            }
        }
        None => {
            for i in index {
                for x in rows[i].iter_mut() {
                    *x = op.value(*x);
                }
            }
        }
    }
    *lhs.unit = new_unit;
    Ok(())
}

/// Apply a binary kernel in place over two aligned dense windows.
pub(crate) fn binary_in_place_dense<T, K>(
    lhs: &mut VariableViewMut<'_>,
    rhs: &Operand<'_>,
    op: &K,
) -> Result<()>
where
    T: Element + Copy + Zero,
    K: BinaryKernel<T>,
{
    check_variance_fork(lhs.variances.is_some(), rhs.variances.is_some())?;
    let new_unit = op.unit(*lhs.unit, rhs.unit)?;
    check_window_unit(lhs, new_unit)?;
    let target = align_target(&lhs.dims, &rhs.dims)?;
    let lhs_index = lhs.index_at(&target)?;
    let rhs_index = rhs.index(&target)?;
    let got = lhs.values.dtype();
    let vals = T::slice_mut(lhs.values).ok_or_else(|| type_error(T::DTYPE, got))?;
    let rvals =
        T::slice(rhs.values).ok_or_else(|| type_error(T::DTYPE, rhs.values.dtype()))?;
    match (lhs.variances.as_deref_mut(), rhs.variances) {
        (Some(lvariances), Some(rvariances)) => {
            let lvars = T::slice_mut(lvariances).ok_or_else(|| type_error(T::DTYPE, got))?;
            let rvars =
                T::slice(rvariances).ok_or_else(|| type_error(T::DTYPE, rhs.values.dtype()))?;
            for (i, j) in lhs_index.zip(rhs_index) {
                let out = op.value_variance(
                    ValueAndVariance::new(vals[i], lvars[i]),
                    ValueAndVariance::new(rvals[j], rvars[j]),
                );
                vals[i] = out.value;
                lvars[i] = out.variance;
            }
        }
        (Some(lvariances), None) => {
            let lvars = T::slice_mut(lvariances).ok_or_else(|| type_error(T::DTYPE, got))?;
            for (i, j) in lhs_index.zip(rhs_index) {
                let out = op.value_variance(
                    ValueAndVariance::new(vals[i], lvars[i]),
                    ValueAndVariance::new(rvals[j], T::zero()),
                );
                vals[i] = out.value;
                lvars[i] = out.variance;
            }
        }
        (None, _) => {
            for (i, j) in lhs_index.zip(rhs_index) {
                vals[i] = op.value(vals[i], rvals[j]);
            }
        }
    }
    *lhs.unit = new_unit;
    Ok(())
}

/// Binary in-place driver for operand pairings without a variance path:
/// vector/matrix left-hand sides, optionally against a scalar right-hand
/// side.
pub(crate) fn binary_in_place_dense_value_only<A, B, K>(
    lhs: &mut VariableViewMut<'_>,
    rhs: &Operand<'_>,
    op: &K,
) -> Result<()>
where
    A: Element + Copy,
    B: Element + Copy,
    K: BinaryValueKernel<A, B>,
{
    if lhs.variances.is_some() || rhs.variances.is_some() {
        return Err(Error::Type(format!(
            "dtype {} cannot have variances",
            lhs.values.dtype()
        )));
    }
    let new_unit = op.unit(*lhs.unit, rhs.unit)?;
    check_window_unit(lhs, new_unit)?;
    let target = align_target(&lhs.dims, &rhs.dims)?;
    let lhs_index = lhs.index_at(&target)?;
    let rhs_index = rhs.index(&target)?;
    let got = lhs.values.dtype();
    let vals = A::slice_mut(lhs.values).ok_or_else(|| type_error(A::DTYPE, got))?;
    let rvals =
        B::slice(rhs.values).ok_or_else(|| type_error(B::DTYPE, rhs.values.dtype()))?;
    for (i, j) in lhs_index.zip(rhs_index) {
        vals[i] = op.value(vals[i], rvals[j]);
    }
    *lhs.unit = new_unit;
    Ok(())
}

// ============================================================================
// Sparse drivers
// ============================================================================

/// Validate corresponding row sizes before any element is written.
fn check_row_sizes<T, U>(
    lhs_rows: &[Vec<T>],
    lhs_index: ViewIndex,
    rhs_rows: &[Vec<U>],
    rhs_index: ViewIndex,
) -> Result<()> {
    for (i, j) in lhs_index.zip(rhs_index) {
        if lhs_rows[i].len() != rhs_rows[j].len() {
            return Err(Error::Shape(lhs_rows[i].len(), rhs_rows[j].len()));
        }
    }
    Ok(())
}

/// Zip corresponding rows of two sparse windows element-wise.
pub(crate) fn binary_in_place_sparse<T, K>(
    lhs: &mut VariableViewMut<'_>,
    rhs: &Operand<'_>,
    op: &K,
) -> Result<()>
where
    T: SparseElement + Copy + Zero,
    K: BinaryKernel<T>,
{
    check_variance_fork(lhs.variances.is_some(), rhs.variances.is_some())?;
    let new_unit = op.unit(*lhs.unit, rhs.unit)?;
    check_window_unit(lhs, new_unit)?;
    if lhs.dims.sparse_dim() != rhs.dims.sparse_dim() {
        return Err(Error::Dimension(format!(
            "sparse dimensions differ: {} vs {}",
            lhs.dims, rhs.dims
        )));
    }
    let target = align_target(&lhs.dims, &rhs.dims)?;
    let lhs_index = lhs.index_at(&target)?;
    let rhs_index = rhs.index(&target)?;
    let got = lhs.values.dtype();
    let rows = T::rows_mut(lhs.values).ok_or_else(|| type_error(T::SPARSE_DTYPE, got))?;
    let rrows = T::rows(rhs.values)
        .ok_or_else(|| type_error(T::SPARSE_DTYPE, rhs.values.dtype()))?;
    check_row_sizes(rows, lhs_index.clone(), rrows, rhs_index.clone())?;
    match (lhs.variances.as_deref_mut(), rhs.variances) {
        (Some(lvariances), Some(rvariances)) => {
            let lvar_rows =
                T::rows_mut(lvariances).ok_or_else(|| type_error(T::SPARSE_DTYPE, got))?;
            let rvar_rows = T::rows(rvariances)
                .ok_or_else(|| type_error(T::SPARSE_DTYPE, rhs.values.dtype()))?;
            for (i, j) in lhs_index.zip(rhs_index) {
                let mut pair = ValuesAndVariances::new(&mut rows[i], &mut lvar_rows[i]);
                for k in 0..pair.len() {
                    let out = op.value_variance(
                        pair.get(k),
                        ValueAndVariance::new(rrows[j][k], rvar_rows[j][k]),
                    );
                    pair.set(k, out);
                }
            }
        }
        (Some(lvariances), None) => {
            let lvar_rows =
                T::rows_mut(lvariances).ok_or_else(|| type_error(T::SPARSE_DTYPE, got))?;
            for (i, j) in lhs_index.zip(rhs_index) {
                let mut pair = ValuesAndVariances::new(&mut rows[i], &mut lvar_rows[i]);
                for k in 0..pair.len() {
                    let out = op
                        .value_variance(pair.get(k), ValueAndVariance::new(rrows[j][k], T::zero()));
                    pair.set(k, out);
                }
            }
        }
        (None, _) => {
            for (i, j) in lhs_index.zip(rhs_index) {
                let rrow = &rrows[j];
                for (x, &y) in rows[i].iter_mut().zip(rrow.iter()) {
                    *x = op.value(*x, y);
                }
            }
        }
    }
    *lhs.unit = new_unit;
    Ok(())
}

/// Sparse LHS against a dense RHS: the RHS element for each row is
/// broadcast across the row.
pub(crate) fn binary_in_place_sparse_dense<T, K>(
    lhs: &mut VariableViewMut<'_>,
    rhs: &Operand<'_>,
    op: &K,
) -> Result<()>
where
    T: SparseElement + Copy + Zero,
    K: BinaryKernel<T>,
{
    check_variance_fork(lhs.variances.is_some(), rhs.variances.is_some())?;
    let new_unit = op.unit(*lhs.unit, rhs.unit)?;
    check_window_unit(lhs, new_unit)?;
    if !lhs.dims.dense_dims().contains_dims(&rhs.dims) {
        return Err(Error::Dimension(format!(
            "dense operand {} does not fit the row grid of {}",
            rhs.dims, lhs.dims
        )));
    }
    let target = lhs.dims.clone();
    let lhs_index = lhs.index()?;
    let rhs_index = rhs.index(&target)?;
    let got = lhs.values.dtype();
    let rows = T::rows_mut(lhs.values).ok_or_else(|| type_error(T::SPARSE_DTYPE, got))?;
    let rvals =
        T::slice(rhs.values).ok_or_else(|| type_error(T::DTYPE, rhs.values.dtype()))?;
    match (lhs.variances.as_deref_mut(), rhs.variances) {
        (Some(lvariances), rhs_variances) => {
            let lvar_rows =
                T::rows_mut(lvariances).ok_or_else(|| type_error(T::SPARSE_DTYPE, got))?;
            let rvars = match rhs_variances {
                Some(rvariances) => Some(
                    T::slice(rvariances)
                        .ok_or_else(|| type_error(T::DTYPE, rhs.values.dtype()))?,
                ),
                None => None,
            };
            for (i, j) in lhs_index.zip(rhs_index) {
                let scalar = ValueAndVariance::new(
                    rvals[j],
                    rvars.map_or_else(T::zero, |rv| rv[j]),
                );
                let mut pair = ValuesAndVariances::new(&mut rows[i], &mut lvar_rows[i]);
                for k in 0..pair.len() {
                    let out = op.value_variance(pair.get(k), scalar);
                    pair.set(k, out);
                }
            }
        }
        (None, _) => {
            for (i, j) in lhs_index.zip(rhs_index) {
                let y = rvals[j];
                for x in rows[i].iter_mut() {
                    *x = op.value(*x, y);
                }
            }
        }
    }
    *lhs.unit = new_unit;
    Ok(())
}

// ============================================================================
// Same-buffer slice operation
// ============================================================================

/// Apply a binary kernel in place between two range slices of the *same*
/// variable along `dim`: `var[dst] ⊕= var[src]`.
///
/// Overlapping windows are detected via the offset-range intersection and
/// the source side is copied before iteration. Sequences of calls on
/// disjoint slices remain write-order dependent; that ordering is the
/// caller's contract.
pub(crate) fn binary_in_place_within<T, K>(
    var: &mut Variable,
    dim: Dim,
    dst: (usize, usize),
    src: (usize, usize),
    op: &K,
) -> Result<()>
where
    T: Element + Copy + Zero,
    K: BinaryKernel<T>,
{
    let dims = var.dims().clone();
    let extent = dims.extent(dim).ok_or_else(|| {
        Error::Dimension(format!("no {dim} to slice in {dims}"))
    })?;
    for &(begin, end) in &[dst, src] {
        if begin > end || end > extent {
            return Err(Error::Slice {
                dim,
                begin,
                end,
                extent,
            });
        }
    }
    if dst.1 - dst.0 != src.1 - src.0 {
        return Err(Error::Dimension(format!(
            "slice lengths differ along {dim}: {} vs {}",
            dst.1 - dst.0,
            src.1 - src.0
        )));
    }
    let unit = var.unit();
    let new_unit = op.unit(unit, unit)?;
    if new_unit != unit {
        return Err(Error::Unsupported("cannot change the unit through a slice"));
    }

    let dense = dims.dense_dims();
    let stride = dense.stride(dim)?;
    let mut window = dense.clone();
    window.resize(dim, dst.1 - dst.0)?;
    let dst_index = ViewIndex::new(&dense, &window, dst.0 * stride)?;
    let src_index = ViewIndex::new(&dense, &window, src.0 * stride)?;
    let overlap = dst_index.range_overlaps(&src_index);

    let (values, variances) = var.parts_mut();
    let got = values.dtype();
    let vals = T::slice_mut(values).ok_or_else(|| type_error(T::DTYPE, got))?;
    let vars = match variances {
        Some(variances) => Some(T::slice_mut(variances).ok_or_else(|| type_error(T::DTYPE, got))?),
        None => None,
    };

    if overlap {
        let src_vals: Vec<T> = src_index.clone().map(|j| vals[j]).collect();
        match vars {
            Some(vars) => {
                let src_vars: Vec<T> = src_index.map(|j| vars[j]).collect();
                for (k, i) in dst_index.enumerate() {
                    let out = op.value_variance(
                        ValueAndVariance::new(vals[i], vars[i]),
                        ValueAndVariance::new(src_vals[k], src_vars[k]),
                    );
                    vals[i] = out.value;
                    vars[i] = out.variance;
                }
            }
            None => {
                for (k, i) in dst_index.enumerate() {
                    vals[i] = op.value(vals[i], src_vals[k]);
                }
            }
        }
    } else {
        match vars {
            Some(vars) => {
                for (i, j) in dst_index.zip(src_index) {
                    let out = op.value_variance(
                        ValueAndVariance::new(vals[i], vars[i]),
                        ValueAndVariance::new(vals[j], vars[j]),
                    );
                    vals[i] = out.value;
                    vars[i] = out.variance;
                }
            }
            None => {
                for (i, j) in dst_index.zip(src_index) {
                    vals[i] = op.value(vals[i], vals[j]);
                }
            }
        }
    }
    Ok(())
}

// ============================================================================
// Variable-level wrappers for the dispatch macros
// ============================================================================

/// Two-operand in-place transform, both operands dense.
pub fn binary_in_place_dense_vars<T, K>(a: &mut Variable, b: &Variable, op: &K) -> Result<()>
where
    T: Element + Copy + Zero,
    K: BinaryKernel<T>,
{
    let mut lhs = a.view_mut();
    binary_in_place_dense::<T, K>(&mut lhs, &Operand::from_variable(b), op)
}

/// Two-operand in-place transform, both operands sparse.
pub fn binary_in_place_sparse_vars<T, K>(a: &mut Variable, b: &Variable, op: &K) -> Result<()>
where
    T: SparseElement + Copy + Zero,
    K: BinaryKernel<T>,
{
    let mut lhs = a.view_mut();
    binary_in_place_sparse::<T, K>(&mut lhs, &Operand::from_variable(b), op)
}

/// Two-operand in-place transform, sparse LHS and dense RHS.
pub fn binary_in_place_sparse_dense_vars<T, K>(
    a: &mut Variable,
    b: &Variable,
    op: &K,
) -> Result<()>
where
    T: SparseElement + Copy + Zero,
    K: BinaryKernel<T>,
{
    let mut lhs = a.view_mut();
    binary_in_place_sparse_dense::<T, K>(&mut lhs, &Operand::from_variable(b), op)
}

// ============================================================================
// Dispatch macros
// ============================================================================

/// Maps a dtype tag to its element type; building block of the dispatch
/// macros.
#[macro_export]
#[doc(hidden)]
macro_rules! elem_ty {
    (I32) => { i32 };
    (I64) => { i64 };
    (F32) => { f32 };
    (F64) => { f64 };
    (Bool) => { bool };
}

/// Apply a unary kernel to every element of a variable, in place.
///
/// The bracketed list enumerates the admissible element-type tags; a
/// variable of any other dtype fails with [`Error::Type`](crate::Error).
/// Sparse counterparts of the listed tags are handled automatically by
/// descending into each row, so the listed tags must be sparse-capable
/// scalar tags (`F64`, `F32`, `I64`, `I32`, `Bool`).
///
/// ```rust
/// use labeled_rs::{transform_in_place, Dim, Dimensions, Variable, Unit};
/// # use labeled_rs::{Result, UnaryKernel, UnaryValueKernel, ValueAndVariance};
/// struct Double;
/// impl<T: std::ops::Add<Output = T> + Copy> UnaryValueKernel<T> for Double {
///     fn value(&self, x: T) -> T { x + x }
///     fn unit(&self, unit: Unit) -> Result<Unit> { Ok(unit) }
/// }
/// impl<T: num_traits::Num + Copy> UnaryKernel<T> for Double {
///     fn value_variance(&self, x: ValueAndVariance<T>) -> ValueAndVariance<T> { x + x }
/// }
/// # fn main() -> Result<()> {
/// let mut var = Variable::new(
///     Dimensions::new(&[(Dim::X, 2)])?, Unit::counts(), vec![1.0, 2.0])?;
/// transform_in_place!(&mut var, &Double, [F64, F32])?;
/// assert_eq!(var.values::<f64>()?, &[2.0, 4.0]);
/// # Ok(())
/// # }
/// ```
#[macro_export]
macro_rules! transform_in_place {
    ($var:expr, $op:expr, [$($tag:ident),+ $(,)?]) => {{
        let var: &mut $crate::Variable = $var;
        let dtype = var.dtype();
        let mut view = var.view_mut();
        match dtype {
            $(
                t if t == $crate::DType::$tag =>
                    $crate::transform::unary_in_place_dense::<$crate::elem_ty!($tag), _>(
                        &mut view, $op),
                t if t.is_sparse() && t.scalar() == $crate::DType::$tag =>
                    $crate::transform::unary_in_place_sparse::<$crate::elem_ty!($tag), _>(
                        &mut view, $op),
            )+
            other => Err($crate::Error::Type(format!(
                "operation not implemented for {other}"
            ))),
        }
    }};
}

/// Apply a unary kernel to every element, returning a new variable.
///
/// Same tag-list mechanism as [`transform_in_place!`](crate::transform_in_place).
#[macro_export]
macro_rules! transform {
    ($var:expr, $op:expr, [$($tag:ident),+ $(,)?]) => {{
        let var: &$crate::Variable = $var;
        let mut out = var.clone();
        $crate::transform_in_place!(&mut out, $op, [$($tag),+]).map(|()| out)
    }};
}

/// Apply a binary kernel element-wise across two variables, writing into
/// the first.
///
/// The tag list enumerates admissible same-type operand pairs; for each
/// listed tag the sparse/sparse and sparse/dense pairings are installed
/// automatically. Unmatched tag pairs fail with
/// [`Error::Type`](crate::Error) naming both operand dtypes.
#[macro_export]
macro_rules! transform_in_place_binary {
    ($a:expr, $b:expr, $op:expr, [$($tag:ident),+ $(,)?]) => {{
        let a: &mut $crate::Variable = $a;
        let b: &$crate::Variable = $b;
        match (a.dtype(), b.dtype()) {
            $(
                (ta, tb) if ta == $crate::DType::$tag && tb == $crate::DType::$tag =>
                    $crate::transform::binary_in_place_dense_vars::<$crate::elem_ty!($tag), _>(
                        a, b, $op),
                (ta, tb) if ta.is_sparse()
                    && ta.scalar() == $crate::DType::$tag
                    && tb == ta =>
                    $crate::transform::binary_in_place_sparse_vars::<$crate::elem_ty!($tag), _>(
                        a, b, $op),
                (ta, tb) if ta.is_sparse()
                    && ta.scalar() == $crate::DType::$tag
                    && tb == $crate::DType::$tag =>
                    $crate::transform::binary_in_place_sparse_dense_vars::<
                        $crate::elem_ty!($tag), _>(a, b, $op),
            )+
            (ta, tb) => Err($crate::Error::Type(format!(
                "cannot apply operation to item dtypes {ta} and {tb}"
            ))),
        }
    }};
}
