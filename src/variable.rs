//! Typed buffers with a labeled shape, a unit, and optional variances.
//!
//! A [`Variable`] owns its buffers. [`VariableView`] and [`VariableViewMut`]
//! are non-owning windows described by a target shape and a flat start
//! offset into the owner's buffer; slicing, transposing, and broadcasting
//! compose on the window without touching data. Views are valid only while
//! the owner is alive (enforced by the borrow checker); growing a sparse
//! row in place does not invalidate them because rows are owned per-index.

use labeled_units::Unit;

use crate::dim::{Dim, Dimensions};
use crate::element::{map_values, DType, Element, SparseElement, Values};
use crate::view::{Bin, BinView, StridedView, StridedViewMut, ViewIndex};
use crate::{Error, Result};

// ============================================================================
// Slice arithmetic shared by views
// ============================================================================

fn slice_extent(dims: &Dimensions, dim: Dim) -> Result<usize> {
    match dims.extent(dim) {
        None => Err(Error::Dimension(format!("no {dim} to slice in {dims}"))),
        Some(Dimensions::SPARSE) => Err(Error::Dimension(format!(
            "cannot slice the sparse {dim} by index"
        ))),
        Some(extent) => Ok(extent),
    }
}

/// Stride of `dim` in the owner's dense layout, 0 for broadcast dims.
fn data_stride(data_dims: &Dimensions, dim: Dim) -> Result<usize> {
    if data_dims.contains(dim) {
        data_dims.dense_dims().stride(dim)
    } else {
        Ok(0)
    }
}

fn apply_point_slice(
    data_dims: &Dimensions,
    dims: &mut Dimensions,
    offset: &mut usize,
    dim: Dim,
    index: usize,
) -> Result<()> {
    let extent = slice_extent(dims, dim)?;
    if index >= extent {
        return Err(Error::Slice {
            dim,
            begin: index,
            end: index + 1,
            extent,
        });
    }
    *offset += index * data_stride(data_dims, dim)?;
    dims.erase(dim)
}

fn apply_range_slice(
    data_dims: &Dimensions,
    dims: &mut Dimensions,
    offset: &mut usize,
    dim: Dim,
    begin: usize,
    end: usize,
) -> Result<()> {
    let extent = slice_extent(dims, dim)?;
    if begin > end || end > extent {
        return Err(Error::Slice {
            dim,
            begin,
            end,
            extent,
        });
    }
    *offset += begin * data_stride(data_dims, dim)?;
    dims.resize(dim, end - begin)
}

// ============================================================================
// Variable
// ============================================================================

/// A typed buffer paired with a labeled shape, optional per-element
/// variances, and a physical unit.
#[derive(Clone, Debug, PartialEq)]
pub struct Variable {
    dims: Dimensions,
    unit: Unit,
    values: Values,
    variances: Option<Values>,
}

fn validate_buffers(dims: &Dimensions, values: &Values, variances: Option<&Values>) -> Result<()> {
    if dims.is_sparse() != values.dtype().is_sparse() {
        return Err(Error::Type(format!(
            "dtype {} does not fit shape {dims}",
            values.dtype()
        )));
    }
    if values.len() != dims.volume() {
        return Err(Error::Dimension(format!(
            "buffer of {} elements does not match volume {} of {dims}",
            values.len(),
            dims.volume()
        )));
    }
    if let Some(variances) = variances {
        if !values.dtype().can_have_variances() {
            return Err(Error::Type(format!(
                "dtype {} cannot have variances",
                values.dtype()
            )));
        }
        if variances.dtype() != values.dtype() {
            return Err(Error::Type(format!(
                "variance dtype {} does not match value dtype {}",
                variances.dtype(),
                values.dtype()
            )));
        }
        if variances.len() != values.len() {
            return Err(Error::Dimension(format!(
                "variance buffer of {} elements does not match {} values",
                variances.len(),
                values.len()
            )));
        }
        if !row_sizes_match(values, variances) {
            return Err(Error::Dimension(
                "variance row sizes do not match value row sizes".into(),
            ));
        }
    }
    Ok(())
}

fn row_sizes_match(values: &Values, variances: &Values) -> bool {
    fn check<T, U>(a: &[Vec<T>], b: &[Vec<U>]) -> bool {
        a.iter().zip(b.iter()).all(|(x, y)| x.len() == y.len())
    }
    match (values, variances) {
        (Values::SparseI32(a), Values::SparseI32(b)) => check(a, b),
        (Values::SparseI64(a), Values::SparseI64(b)) => check(a, b),
        (Values::SparseF32(a), Values::SparseF32(b)) => check(a, b),
        (Values::SparseF64(a), Values::SparseF64(b)) => check(a, b),
        (Values::SparseBool(a), Values::SparseBool(b)) => check(a, b),
        _ => true,
    }
}

/// Zero values shaped like `values`, preserving sparse row sizes.
fn zeroed(values: &Values) -> Values {
    fn rows<T: Default + Clone>(rows: &[Vec<T>]) -> Vec<Vec<T>> {
        rows.iter().map(|r| vec![T::default(); r.len()]).collect()
    }
    match values {
        Values::SparseI32(r) => Values::SparseI32(rows(r)),
        Values::SparseI64(r) => Values::SparseI64(rows(r)),
        Values::SparseF32(r) => Values::SparseF32(rows(r)),
        Values::SparseF64(r) => Values::SparseF64(rows(r)),
        Values::SparseBool(r) => Values::SparseBool(rows(r)),
        dense => Values::new(dense.dtype(), dense.len()),
    }
}

impl Variable {
    /// Build a variable from an untyped buffer.
    pub fn from_values(
        dims: Dimensions,
        unit: Unit,
        values: Values,
        variances: Option<Values>,
    ) -> Result<Variable> {
        validate_buffers(&dims, &values, variances.as_ref())?;
        Ok(Variable {
            dims,
            unit,
            values,
            variances,
        })
    }

    /// Build a dense variable from typed values.
    pub fn new<T: Element>(dims: Dimensions, unit: Unit, values: Vec<T>) -> Result<Variable> {
        Self::from_values(dims, unit, T::from_vec(values), None)
    }

    /// Build a dense variable with variances.
    pub fn with_variances<T: Element>(
        dims: Dimensions,
        unit: Unit,
        values: Vec<T>,
        variances: Vec<T>,
    ) -> Result<Variable> {
        Self::from_values(dims, unit, T::from_vec(values), Some(T::from_vec(variances)))
    }

    /// A rank-0 variable holding a single element.
    pub fn scalar<T: Element>(value: T, unit: Unit) -> Variable {
        Variable {
            dims: Dimensions::empty(),
            unit,
            values: T::from_vec(vec![value]),
            variances: None,
        }
    }

    /// A zero-initialized variable of `dtype` (empty rows for sparse tags).
    pub fn zeros(dtype: DType, dims: Dimensions, unit: Unit) -> Result<Variable> {
        let values = Values::new(dtype, dims.volume());
        Self::from_values(dims, unit, values, None)
    }

    /// A sparse variable of `T` rows with one empty row per dense index.
    /// `dims` must carry a sparse dimension.
    pub fn sparse<T: SparseElement>(dims: Dimensions, unit: Unit) -> Result<Variable> {
        let rows = vec![Vec::new(); dims.volume()];
        Self::from_values(dims, unit, T::from_rows(rows), None)
    }

    /// A sparse variable from explicit rows.
    pub fn sparse_from_rows<T: SparseElement>(
        dims: Dimensions,
        unit: Unit,
        rows: Vec<Vec<T>>,
    ) -> Result<Variable> {
        Self::from_values(dims, unit, T::from_rows(rows), None)
    }

    /// A sparse variable from explicit rows with per-element variances.
    pub fn sparse_with_variances<T: SparseElement>(
        dims: Dimensions,
        unit: Unit,
        rows: Vec<Vec<T>>,
        variances: Vec<Vec<T>>,
    ) -> Result<Variable> {
        Self::from_values(
            dims,
            unit,
            T::from_rows(rows),
            Some(T::from_rows(variances)),
        )
    }

    /// Same shape, dtype, unit, and variance presence as `var`, all zeros.
    /// Sparse row sizes are preserved.
    pub fn zeros_like(var: &Variable) -> Variable {
        Variable {
            dims: var.dims.clone(),
            unit: var.unit,
            values: zeroed(&var.values),
            variances: var.variances.as_ref().map(zeroed),
        }
    }

    pub fn dims(&self) -> &Dimensions {
        &self.dims
    }

    pub fn unit(&self) -> Unit {
        self.unit
    }

    pub fn set_unit(&mut self, unit: Unit) {
        self.unit = unit;
    }

    pub fn dtype(&self) -> DType {
        self.values.dtype()
    }

    pub fn has_variances(&self) -> bool {
        self.variances.is_some()
    }

    fn type_error<T: Element>(&self) -> Error {
        Error::Type(format!(
            "expected {}, variable holds {}",
            T::DTYPE,
            self.dtype()
        ))
    }

    /// The raw dense buffer.
    pub fn values<T: Element>(&self) -> Result<&[T]> {
        T::slice(&self.values).ok_or_else(|| self.type_error::<T>())
    }

    pub fn values_mut<T: Element>(&mut self) -> Result<&mut [T]> {
        let err = self.type_error::<T>();
        T::slice_mut(&mut self.values).ok_or(err)
    }

    /// The raw variance buffer; fails if absent.
    pub fn variances<T: Element>(&self) -> Result<&[T]> {
        let variances = self
            .variances
            .as_ref()
            .ok_or(Error::Variances("variable has no variances"))?;
        T::slice(variances).ok_or_else(|| self.type_error::<T>())
    }

    pub fn variances_mut<T: Element>(&mut self) -> Result<&mut [T]> {
        let err = self.type_error::<T>();
        let variances = self
            .variances
            .as_mut()
            .ok_or(Error::Variances("variable has no variances"))?;
        T::slice_mut(variances).ok_or(err)
    }

    /// The rows of a sparse variable.
    pub fn sparse_values<T: SparseElement>(&self) -> Result<&[Vec<T>]> {
        T::rows(&self.values).ok_or_else(|| self.type_error::<T>())
    }

    pub fn sparse_values_mut<T: SparseElement>(&mut self) -> Result<&mut Vec<Vec<T>>> {
        let err = self.type_error::<T>();
        T::rows_mut(&mut self.values).ok_or(err)
    }

    pub fn sparse_variances<T: SparseElement>(&self) -> Result<&[Vec<T>]> {
        let variances = self
            .variances
            .as_ref()
            .ok_or(Error::Variances("variable has no variances"))?;
        T::rows(variances).ok_or_else(|| self.type_error::<T>())
    }

    pub fn sparse_variances_mut<T: SparseElement>(&mut self) -> Result<&mut Vec<Vec<T>>> {
        let err = self.type_error::<T>();
        let variances = self
            .variances
            .as_mut()
            .ok_or(Error::Variances("variable has no variances"))?;
        T::rows_mut(variances).ok_or(err)
    }

    pub(crate) fn values_raw(&self) -> &Values {
        &self.values
    }

    pub(crate) fn values_raw_mut(&mut self) -> &mut Values {
        &mut self.values
    }

    pub(crate) fn variances_raw(&self) -> Option<&Values> {
        self.variances.as_ref()
    }

    pub(crate) fn variances_raw_mut(&mut self) -> Option<&mut Values> {
        self.variances.as_mut()
    }

    /// Simultaneous mutable access to both buffers.
    pub(crate) fn parts_mut(&mut self) -> (&mut Values, Option<&mut Values>) {
        (&mut self.values, self.variances.as_mut())
    }

    /// Drop the variances, if any.
    pub fn strip_variances(&mut self) {
        self.variances = None;
    }

    /// The full-shape view of this variable.
    pub fn view(&self) -> VariableView<'_> {
        VariableView {
            var: self,
            dims: self.dims.clone(),
            offset: 0,
        }
    }

    /// Rank-reducing point slice.
    pub fn slice(&self, dim: Dim, index: usize) -> Result<VariableView<'_>> {
        self.view().slice(dim, index)
    }

    /// Range slice `[begin, end)`, keeping `dim` with extent `end - begin`.
    pub fn slice_range(&self, dim: Dim, begin: usize, end: usize) -> Result<VariableView<'_>> {
        self.view().slice_range(dim, begin, end)
    }

    /// Permute dims; no data movement, materialized on iteration.
    pub fn transpose(&self, order: &[Dim]) -> Result<VariableView<'_>> {
        self.view().transpose(order)
    }

    /// View this variable at a larger shape; extra dims broadcast.
    pub fn broadcast(&self, target: &Dimensions) -> Result<VariableView<'_>> {
        self.view().broadcast(target)
    }

    /// Typed strided iteration of the values at an arbitrary target shape.
    pub fn values_view<T: Element>(&self, target: &Dimensions) -> Result<StridedView<'_, T>> {
        let data = T::slice(&self.values).ok_or_else(|| self.type_error::<T>())?;
        let index = ViewIndex::new(&self.dims.dense_dims(), &target.dense_dims(), 0)?;
        Ok(StridedView::new(data, index))
    }

    /// Typed strided iteration of the variances at a target shape.
    pub fn variances_view<T: Element>(&self, target: &Dimensions) -> Result<StridedView<'_, T>> {
        let variances = self
            .variances
            .as_ref()
            .ok_or(Error::Variances("variable has no variances"))?;
        let data = T::slice(variances).ok_or_else(|| self.type_error::<T>())?;
        let index = ViewIndex::new(&self.dims.dense_dims(), &target.dense_dims(), 0)?;
        Ok(StridedView::new(data, index))
    }

    /// Mutable strided traversal of the values at a target shape.
    pub fn values_view_mut<T: Element>(
        &mut self,
        target: &Dimensions,
    ) -> Result<StridedViewMut<'_, T>> {
        let err = self.type_error::<T>();
        let index = ViewIndex::new(&self.dims.dense_dims(), &target.dense_dims(), 0)?;
        let data = T::slice_mut(&mut self.values).ok_or(err)?;
        Ok(StridedViewMut::new(data, index))
    }

    /// Iterate this variable's values as bins along `dim`: explicit
    /// bin-edge iteration for edge coordinates.
    pub fn bin_view<T: Element + Copy>(&self, dim: Dim) -> Result<BinView<'_, T>> {
        let data = T::slice(&self.values).ok_or_else(|| self.type_error::<T>())?;
        BinView::over(data, &self.dims.dense_dims(), dim)
    }

    /// The bins of a 1-D edge coordinate, collected.
    pub fn bins<T: Element + Copy>(&self, dim: Dim) -> Result<Vec<Bin<T>>> {
        Ok(self.bin_view::<T>(dim)?.collect())
    }

    /// Mutable full-shape window, the left-hand side of in-place transforms.
    pub fn view_mut(&mut self) -> VariableViewMut<'_> {
        VariableViewMut {
            data_dims: self.dims.clone(),
            dims: self.dims.clone(),
            offset: 0,
            values: &mut self.values,
            variances: self.variances.as_mut(),
            unit: &mut self.unit,
        }
    }

    /// Mutable point slice.
    pub fn slice_mut(&mut self, dim: Dim, index: usize) -> Result<VariableViewMut<'_>> {
        self.view_mut().slice(dim, index)
    }

    /// Mutable range slice.
    pub fn slice_range_mut(
        &mut self,
        dim: Dim,
        begin: usize,
        end: usize,
    ) -> Result<VariableViewMut<'_>> {
        self.view_mut().slice_range(dim, begin, end)
    }
}

// ============================================================================
// VariableView
// ============================================================================

/// A non-owning window into a variable: a target shape plus a flat start
/// offset. Realizes slicing, broadcasting, and transposition lazily.
#[derive(Clone, Debug)]
pub struct VariableView<'a> {
    var: &'a Variable,
    dims: Dimensions,
    offset: usize,
}

impl<'a> VariableView<'a> {
    pub fn dims(&self) -> &Dimensions {
        &self.dims
    }

    pub fn unit(&self) -> Unit {
        self.var.unit
    }

    pub fn dtype(&self) -> DType {
        self.var.dtype()
    }

    pub fn has_variances(&self) -> bool {
        self.var.has_variances()
    }

    pub(crate) fn data_dims(&self) -> &'a Dimensions {
        &self.var.dims
    }

    pub(crate) fn offset(&self) -> usize {
        self.offset
    }

    pub(crate) fn values_raw(&self) -> &'a Values {
        &self.var.values
    }

    pub(crate) fn variances_raw(&self) -> Option<&'a Values> {
        self.var.variances.as_ref()
    }

    /// Rank-reducing point slice.
    pub fn slice(mut self, dim: Dim, index: usize) -> Result<VariableView<'a>> {
        apply_point_slice(&self.var.dims, &mut self.dims, &mut self.offset, dim, index)?;
        Ok(self)
    }

    /// Range slice `[begin, end)`.
    pub fn slice_range(mut self, dim: Dim, begin: usize, end: usize) -> Result<VariableView<'a>> {
        apply_range_slice(
            &self.var.dims,
            &mut self.dims,
            &mut self.offset,
            dim,
            begin,
            end,
        )?;
        Ok(self)
    }

    /// Permute the window's dims.
    pub fn transpose(mut self, order: &[Dim]) -> Result<VariableView<'a>> {
        self.dims = self.dims.transpose(order)?;
        Ok(self)
    }

    /// Re-view at `target`; dims absent from the window broadcast, dims
    /// present must keep their extent.
    pub fn broadcast(mut self, target: &Dimensions) -> Result<VariableView<'a>> {
        for (dim, extent) in self.dims.iter() {
            if target.extent(dim) != Some(extent) {
                return Err(Error::Dimension(format!(
                    "cannot broadcast {} away or resize {dim} to {:?}",
                    self.dims,
                    target.extent(dim)
                )));
            }
        }
        self.dims = target.clone();
        Ok(self)
    }

    /// Typed strided iteration of the values over the window.
    pub fn values_view<T: Element>(&self) -> Result<StridedView<'a, T>> {
        let data = T::slice(&self.var.values).ok_or_else(|| self.var.type_error::<T>())?;
        let index = ViewIndex::new(
            &self.var.dims.dense_dims(),
            &self.dims.dense_dims(),
            self.offset,
        )?;
        Ok(StridedView::new(data, index))
    }

    /// Typed strided iteration of the variances over the window.
    pub fn variances_view<T: Element>(&self) -> Result<StridedView<'a, T>> {
        let variances = self
            .var
            .variances
            .as_ref()
            .ok_or(Error::Variances("variable has no variances"))?;
        let data = T::slice(variances).ok_or_else(|| self.var.type_error::<T>())?;
        let index = ViewIndex::new(
            &self.var.dims.dense_dims(),
            &self.dims.dense_dims(),
            self.offset,
        )?;
        Ok(StridedView::new(data, index))
    }

    /// The window's offset iterator over the owner's dense row grid.
    pub(crate) fn index(&self) -> Result<ViewIndex> {
        ViewIndex::new(
            &self.var.dims.dense_dims(),
            &self.dims.dense_dims(),
            self.offset,
        )
    }

    /// Iterate the window as bins along `dim`.
    pub fn bin_view<T: Element + Copy>(&self, dim: Dim) -> Result<BinView<'a, T>> {
        let data = T::slice(&self.var.values).ok_or_else(|| self.var.type_error::<T>())?;
        let extent = self.dims.extent(dim).ok_or_else(|| {
            Error::Dimension(format!("no {dim} in {} to iterate bins over", self.dims))
        })?;
        if extent < 2 {
            return Err(Error::Dimension(format!(
                "need at least two edges along {dim}, got {extent}"
            )));
        }
        let mut target = self.dims.clone();
        target.resize(dim, extent - 1)?;
        let index = ViewIndex::new(
            &self.var.dims.dense_dims(),
            &target.dense_dims(),
            self.offset,
        )?;
        Ok(BinView::with_index(
            data,
            index,
            self.var.dims.dense_dims().stride(dim)?,
        ))
    }

    /// Materialize the window into an owned variable.
    pub fn to_owned(&self) -> Result<Variable> {
        let index = self.index()?;
        let values = map_values!(&self.var.values, |v| index
            .clone()
            .map(|i| v[i].clone())
            .collect());
        let variances = match &self.var.variances {
            Some(variances) => Some(map_values!(variances, |v| index
                .clone()
                .map(|i| v[i].clone())
                .collect())),
            None => None,
        };
        Variable::from_values(self.dims.clone(), self.var.unit, values, variances)
    }

    /// True iff both windows sit on the same owner and their reachable
    /// offset ranges intersect.
    pub fn overlaps(&self, other: &VariableView<'_>) -> Result<bool> {
        if !std::ptr::eq(self.var, other.var) {
            return Ok(false);
        }
        Ok(self.index()?.range_overlaps(&other.index()?))
    }
}

// ============================================================================
// VariableViewMut
// ============================================================================

/// A mutable window into a variable: the write side of in-place transforms.
#[derive(Debug)]
pub struct VariableViewMut<'a> {
    pub(crate) values: &'a mut Values,
    pub(crate) variances: Option<&'a mut Values>,
    pub(crate) unit: &'a mut Unit,
    pub(crate) data_dims: Dimensions,
    pub(crate) dims: Dimensions,
    pub(crate) offset: usize,
}

impl<'a> VariableViewMut<'a> {
    pub fn dims(&self) -> &Dimensions {
        &self.dims
    }

    pub fn unit(&self) -> Unit {
        *self.unit
    }

    pub fn dtype(&self) -> DType {
        self.values.dtype()
    }

    pub fn has_variances(&self) -> bool {
        self.variances.is_some()
    }

    /// Rank-reducing point slice.
    pub fn slice(mut self, dim: Dim, index: usize) -> Result<VariableViewMut<'a>> {
        apply_point_slice(&self.data_dims, &mut self.dims, &mut self.offset, dim, index)?;
        Ok(self)
    }

    /// Range slice `[begin, end)`.
    pub fn slice_range(
        mut self,
        dim: Dim,
        begin: usize,
        end: usize,
    ) -> Result<VariableViewMut<'a>> {
        apply_range_slice(
            &self.data_dims,
            &mut self.dims,
            &mut self.offset,
            dim,
            begin,
            end,
        )?;
        Ok(self)
    }

    /// The window's offset iterator over the owner's dense row grid.
    pub(crate) fn index(&self) -> Result<ViewIndex> {
        ViewIndex::new(&self.data_dims.dense_dims(), &self.dims.dense_dims(), self.offset)
    }

    /// Offset iterator at an explicit target (used for reduction-style
    /// writes where the window is re-viewed in the operand's dims).
    pub(crate) fn index_at(&self, target: &Dimensions) -> Result<ViewIndex> {
        ViewIndex::new(&self.data_dims.dense_dims(), &target.dense_dims(), self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dim::Dim;

    fn dims(pairs: &[(Dim, usize)]) -> Dimensions {
        Dimensions::new(pairs).unwrap()
    }

    fn var_2x3() -> Variable {
        Variable::new(
            dims(&[(Dim::Y, 2), (Dim::X, 3)]),
            Unit::counts(),
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
        )
        .unwrap()
    }

    #[test]
    fn test_new_checks_volume() {
        let err = Variable::new(dims(&[(Dim::X, 3)]), Unit::counts(), vec![1.0, 2.0]);
        assert!(matches!(err, Err(Error::Dimension(_))));
    }

    #[test]
    fn test_variances_only_for_numeric_scalars() {
        let err = Variable::with_variances(
            dims(&[(Dim::X, 1)]),
            Unit::dimensionless(),
            vec![true],
            vec![false],
        );
        assert!(matches!(err, Err(Error::Type(_))));
    }

    #[test]
    fn test_variance_length_checked() {
        let err = Variable::with_variances(
            dims(&[(Dim::X, 2)]),
            Unit::counts(),
            vec![1.0, 2.0],
            vec![1.0],
        );
        assert!(matches!(err, Err(Error::Dimension(_))));
    }

    #[test]
    fn test_sparse_shape_requires_sparse_dtype() {
        let mut d = dims(&[(Dim::X, 2)]);
        d.add_sparse(Dim::Event).unwrap();
        let err = Variable::new(d, Unit::counts(), vec![1.0, 2.0]);
        assert!(matches!(err, Err(Error::Type(_))));
    }

    #[test]
    fn test_sparse_row_count_is_volume() {
        let mut d = dims(&[(Dim::X, 2)]);
        d.add_sparse(Dim::Event).unwrap();
        let var =
            Variable::sparse_from_rows::<f64>(d, Unit::us(), vec![vec![1.0, 2.0], vec![]]).unwrap();
        assert_eq!(var.sparse_values::<f64>().unwrap().len(), 2);
        assert_eq!(var.dtype(), DType::SparseF64);
    }

    #[test]
    fn test_sparse_variance_row_sizes_checked() {
        let mut d = dims(&[(Dim::X, 1)]);
        d.add_sparse(Dim::Event).unwrap();
        let err = Variable::sparse_with_variances::<f64>(
            d,
            Unit::us(),
            vec![vec![1.0, 2.0]],
            vec![vec![1.0]],
        );
        assert!(matches!(err, Err(Error::Dimension(_))));
    }

    #[test]
    fn test_typed_access() {
        let var = var_2x3();
        assert_eq!(var.values::<f64>().unwrap().len(), 6);
        assert!(matches!(var.values::<i32>(), Err(Error::Type(_))));
        assert!(matches!(var.variances::<f64>(), Err(Error::Variances(_))));
    }

    #[test]
    fn test_point_slice() {
        let var = var_2x3();
        let row = var.slice(Dim::Y, 1).unwrap();
        assert_eq!(row.dims(), &dims(&[(Dim::X, 3)]));
        let collected: Vec<f64> = row.values_view::<f64>().unwrap().copied().collect();
        assert_eq!(collected, vec![4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_range_slice_keeps_dim() {
        let var = var_2x3();
        let window = var.slice_range(Dim::X, 1, 3).unwrap();
        assert_eq!(window.dims().extent(Dim::X), Some(2));
        let collected: Vec<f64> = window.values_view::<f64>().unwrap().copied().collect();
        assert_eq!(collected, vec![2.0, 3.0, 5.0, 6.0]);
    }

    #[test]
    fn test_slice_out_of_range() {
        let var = var_2x3();
        assert!(matches!(var.slice(Dim::Y, 2), Err(Error::Slice { .. })));
        assert!(matches!(
            var.slice_range(Dim::X, 2, 5),
            Err(Error::Slice { .. })
        ));
        assert!(matches!(
            var.slice_range(Dim::X, 2, 1),
            Err(Error::Slice { .. })
        ));
    }

    #[test]
    fn test_nested_slices_compose() {
        let var = var_2x3();
        let cell = var
            .slice_range(Dim::X, 1, 3)
            .and_then(|v| v.slice(Dim::Y, 1))
            .and_then(|v| v.slice(Dim::X, 1))
            .unwrap();
        assert!(cell.dims().is_empty());
        let collected: Vec<f64> = cell.values_view::<f64>().unwrap().copied().collect();
        assert_eq!(collected, vec![6.0]);
    }

    #[test]
    fn test_transpose_view() {
        let var = var_2x3();
        let t = var.transpose(&[Dim::X, Dim::Y]).unwrap();
        let collected: Vec<f64> = t.values_view::<f64>().unwrap().copied().collect();
        assert_eq!(collected, vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn test_broadcast_view() {
        let var = Variable::new(dims(&[(Dim::X, 2)]), Unit::counts(), vec![10.0, 20.0]).unwrap();
        let target = dims(&[(Dim::Y, 2), (Dim::X, 2)]);
        let b = var.broadcast(&target).unwrap();
        let collected: Vec<f64> = b.values_view::<f64>().unwrap().copied().collect();
        assert_eq!(collected, vec![10.0, 20.0, 10.0, 20.0]);
        assert!(var.broadcast(&dims(&[(Dim::X, 5)])).is_err());
    }

    #[test]
    fn test_to_owned_materializes_window() {
        let var = var_2x3();
        let owned = var.slice_range(Dim::X, 0, 2).unwrap().to_owned().unwrap();
        assert_eq!(owned.dims().extent(Dim::X), Some(2));
        assert_eq!(owned.values::<f64>().unwrap(), &[1.0, 2.0, 4.0, 5.0]);
    }

    #[test]
    fn test_to_owned_of_sparse_slice() {
        let mut d = dims(&[(Dim::X, 3)]);
        d.add_sparse(Dim::Event).unwrap();
        let var = Variable::sparse_from_rows::<f64>(
            d,
            Unit::us(),
            vec![vec![1.0], vec![2.0, 3.0], vec![]],
        )
        .unwrap();
        let owned = var.slice_range(Dim::X, 1, 3).unwrap().to_owned().unwrap();
        assert_eq!(
            owned.sparse_values::<f64>().unwrap(),
            &[vec![2.0, 3.0], vec![]]
        );
    }

    #[test]
    fn test_overlaps() {
        let var = Variable::new(
            dims(&[(Dim::X, 10)]),
            Unit::counts(),
            (0..10).map(f64::from).collect(),
        )
        .unwrap();
        let a = var.slice_range(Dim::X, 0, 4).unwrap();
        let b = var.slice_range(Dim::X, 3, 6).unwrap();
        let c = var.slice_range(Dim::X, 6, 9).unwrap();
        assert!(a.overlaps(&b).unwrap());
        assert!(!a.overlaps(&c).unwrap());
        let other = var.clone();
        let d = other.slice_range(Dim::X, 0, 4).unwrap();
        assert!(!a.overlaps(&d).unwrap());
    }

    #[test]
    fn test_zeros_like_preserves_sparse_row_sizes() {
        let mut d = dims(&[(Dim::X, 2)]);
        d.add_sparse(Dim::Event).unwrap();
        let var = Variable::sparse_from_rows::<f64>(d, Unit::us(), vec![vec![1.0, 2.0], vec![3.0]])
            .unwrap();
        let z = Variable::zeros_like(&var);
        assert_eq!(
            z.sparse_values::<f64>().unwrap(),
            &[vec![0.0, 0.0], vec![0.0]]
        );
    }

    #[test]
    fn test_nested_dataset_elements() {
        use crate::dataset::Dataset;

        let inner = Dataset::new();
        let var = Variable::new(
            dims(&[(Dim::Spectrum, 2)]),
            Unit::dimensionless(),
            vec![inner.clone(), inner.clone()],
        )
        .unwrap();
        assert_eq!(var.dtype(), DType::Dataset);
        assert_eq!(var.values::<Dataset>().unwrap().len(), 2);
        // No variances for nested datasets.
        let err = Variable::with_variances(
            dims(&[(Dim::Spectrum, 1)]),
            Unit::dimensionless(),
            vec![inner.clone()],
            vec![inner],
        );
        assert!(matches!(err, Err(Error::Type(_))));
    }

    #[test]
    fn test_bins() {
        let edges = Variable::new(
            dims(&[(Dim::Tof, 3)]),
            Unit::us(),
            vec![0.2, 1.2, 2.2],
        )
        .unwrap();
        let bins = edges.bins::<f64>(Dim::Tof).unwrap();
        assert_eq!(bins.len(), 2);
        assert_eq!(bins[0].left, 0.2);
        assert_eq!(bins[1].right, 2.2);
    }
}
