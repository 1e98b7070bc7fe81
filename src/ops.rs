//! Built-in operations on variables.
//!
//! The arithmetic kernels implement the transform traits per supported
//! element type; the free functions wire them through the dispatch layer.
//! In-place forms validate everything before writing and leave the target
//! untouched on failure.

use labeled_units::Unit;

use crate::dim::{Dim, Dimensions};
use crate::element::{with_values_pair, DType, Values, Vector3};
use crate::transform::{
    self, BinaryKernel, BinaryValueKernel, Operand, UnaryKernel, UnaryValueKernel,
};
use crate::value_variance::ValueAndVariance;
use crate::variable::{Variable, VariableView, VariableViewMut};
use crate::view::ViewIndex;
use crate::{Error, Result};

// ============================================================================
// Arithmetic kernels
// ============================================================================

/// `a += b`
pub struct PlusEq;
/// `a -= b`
pub struct MinusEq;
/// `a *= b`
pub struct TimesEq;
/// `a /= b`
pub struct DivideEq;

macro_rules! impl_arith_kernels {
    ($($t:ty),+) => {$(
        impl BinaryValueKernel<$t> for PlusEq {
            fn value(&self, a: $t, b: $t) -> $t {
                a + b
            }

            fn unit(&self, a: Unit, b: Unit) -> Result<Unit> {
                Ok(a.expect_same(b)?)
            }
        }

        impl BinaryKernel<$t> for PlusEq {
            fn value_variance(
                &self,
                a: ValueAndVariance<$t>,
                b: ValueAndVariance<$t>,
            ) -> ValueAndVariance<$t> {
                a + b
            }
        }

        impl BinaryValueKernel<$t> for MinusEq {
            fn value(&self, a: $t, b: $t) -> $t {
                a - b
            }

            fn unit(&self, a: Unit, b: Unit) -> Result<Unit> {
                Ok(a.expect_same(b)?)
            }
        }

        impl BinaryKernel<$t> for MinusEq {
            fn value_variance(
                &self,
                a: ValueAndVariance<$t>,
                b: ValueAndVariance<$t>,
            ) -> ValueAndVariance<$t> {
                a - b
            }
        }

        impl BinaryValueKernel<$t> for TimesEq {
            fn value(&self, a: $t, b: $t) -> $t {
                a * b
            }

            fn unit(&self, a: Unit, b: Unit) -> Result<Unit> {
                Ok(a * b)
            }
        }

        impl BinaryKernel<$t> for TimesEq {
            fn value_variance(
                &self,
                a: ValueAndVariance<$t>,
                b: ValueAndVariance<$t>,
            ) -> ValueAndVariance<$t> {
                a * b
            }
        }

        impl BinaryValueKernel<$t> for DivideEq {
            fn value(&self, a: $t, b: $t) -> $t {
                a / b
            }

            fn unit(&self, a: Unit, b: Unit) -> Result<Unit> {
                Ok(a / b)
            }
        }

        impl BinaryKernel<$t> for DivideEq {
            fn value_variance(
                &self,
                a: ValueAndVariance<$t>,
                b: ValueAndVariance<$t>,
            ) -> ValueAndVariance<$t> {
                a / b
            }
        }
    )+};
}

impl_arith_kernels!(i32, i64, f32, f64);

impl BinaryValueKernel<Vector3> for PlusEq {
    fn value(&self, a: Vector3, b: Vector3) -> Vector3 {
        a + b
    }

    fn unit(&self, a: Unit, b: Unit) -> Result<Unit> {
        Ok(a.expect_same(b)?)
    }
}

impl BinaryValueKernel<Vector3> for MinusEq {
    fn value(&self, a: Vector3, b: Vector3) -> Vector3 {
        a - b
    }

    fn unit(&self, a: Unit, b: Unit) -> Result<Unit> {
        Ok(a.expect_same(b)?)
    }
}

// Vector-by-scalar scaling, for normalizing and calibrating positions.

impl BinaryValueKernel<Vector3, f64> for TimesEq {
    fn value(&self, a: Vector3, b: f64) -> Vector3 {
        a * b
    }

    fn unit(&self, a: Unit, b: Unit) -> Result<Unit> {
        Ok(a * b)
    }
}

impl BinaryValueKernel<Vector3, f64> for DivideEq {
    fn value(&self, a: Vector3, b: f64) -> Vector3 {
        a / b
    }

    fn unit(&self, a: Unit, b: Unit) -> Result<Unit> {
        Ok(a / b)
    }
}

// ============================================================================
// Unary kernels
// ============================================================================

/// Unary `-a`
pub struct Negate;
/// `|a|`
pub struct Abs;
/// `sqrt(a)`, halving the unit's exponents
pub struct Sqrt;
/// `acos(a)` for dimensionless operands
pub struct Acos;
/// `1 / a`
pub struct Reciprocal;
/// `a + c` for a plain (variance-free, unit-free) constant
pub struct AddConst(pub f64);
/// `a - c`
pub struct SubConst(pub f64);
/// `a * c`
pub struct Scale(pub f64);

macro_rules! impl_signed_kernels {
    ($($t:ty),+) => {$(
        impl UnaryValueKernel<$t> for Negate {
            fn value(&self, x: $t) -> $t {
                -x
            }

            fn unit(&self, unit: Unit) -> Result<Unit> {
                Ok(unit)
            }
        }

        impl UnaryKernel<$t> for Negate {
            fn value_variance(&self, x: ValueAndVariance<$t>) -> ValueAndVariance<$t> {
                -x
            }
        }

        impl UnaryValueKernel<$t> for Abs {
            fn value(&self, x: $t) -> $t {
                x.abs()
            }

            fn unit(&self, unit: Unit) -> Result<Unit> {
                Ok(unit)
            }
        }

        impl UnaryKernel<$t> for Abs {
            fn value_variance(&self, x: ValueAndVariance<$t>) -> ValueAndVariance<$t> {
                x.abs()
            }
        }
    )+};
}

impl_signed_kernels!(i32, i64, f32, f64);

macro_rules! impl_float_kernels {
    ($($t:ty),+) => {$(
        impl UnaryValueKernel<$t> for Sqrt {
            fn value(&self, x: $t) -> $t {
                x.sqrt()
            }

            fn unit(&self, unit: Unit) -> Result<Unit> {
                Ok(unit.sqrt()?)
            }
        }

        impl UnaryKernel<$t> for Sqrt {
            fn value_variance(&self, x: ValueAndVariance<$t>) -> ValueAndVariance<$t> {
                x.sqrt()
            }
        }

        impl UnaryValueKernel<$t> for Acos {
            fn value(&self, x: $t) -> $t {
                x.acos()
            }

            fn unit(&self, unit: Unit) -> Result<Unit> {
                Ok(unit.expect_dimensionless()?)
            }
        }

        impl UnaryKernel<$t> for Acos {
            fn value_variance(&self, x: ValueAndVariance<$t>) -> ValueAndVariance<$t> {
                x.acos()
            }
        }

        impl UnaryValueKernel<$t> for Reciprocal {
            fn value(&self, x: $t) -> $t {
                x.recip()
            }

            fn unit(&self, unit: Unit) -> Result<Unit> {
                Ok(unit.recip())
            }
        }

        impl UnaryKernel<$t> for Reciprocal {
            fn value_variance(&self, x: ValueAndVariance<$t>) -> ValueAndVariance<$t> {
                x.recip()
            }
        }

        impl UnaryValueKernel<$t> for AddConst {
            fn value(&self, x: $t) -> $t {
                x + self.0 as $t
            }

            fn unit(&self, unit: Unit) -> Result<Unit> {
                Ok(unit)
            }
        }

        impl UnaryKernel<$t> for AddConst {
            fn value_variance(&self, x: ValueAndVariance<$t>) -> ValueAndVariance<$t> {
                x + self.0 as $t
            }
        }

        impl UnaryValueKernel<$t> for SubConst {
            fn value(&self, x: $t) -> $t {
                x - self.0 as $t
            }

            fn unit(&self, unit: Unit) -> Result<Unit> {
                Ok(unit)
            }
        }

        impl UnaryKernel<$t> for SubConst {
            fn value_variance(&self, x: ValueAndVariance<$t>) -> ValueAndVariance<$t> {
                x - self.0 as $t
            }
        }

        impl UnaryValueKernel<$t> for Scale {
            fn value(&self, x: $t) -> $t {
                x * self.0 as $t
            }

            fn unit(&self, unit: Unit) -> Result<Unit> {
                Ok(unit)
            }
        }

        impl UnaryKernel<$t> for Scale {
            fn value_variance(&self, x: ValueAndVariance<$t>) -> ValueAndVariance<$t> {
                x * self.0 as $t
            }
        }
    )+};
}

impl_float_kernels!(f32, f64);

// ============================================================================
// Dispatch over the numeric pair set
// ============================================================================

macro_rules! dispatch_binary {
    ($lhs:expr, $rhs:expr, $op:expr) => {
        match ($lhs.dtype(), $rhs.dtype()) {
            (DType::F64, DType::F64) => {
                transform::binary_in_place_dense::<f64, _>($lhs, $rhs, $op)
            }
            (DType::F32, DType::F32) => {
                transform::binary_in_place_dense::<f32, _>($lhs, $rhs, $op)
            }
            (DType::I64, DType::I64) => {
                transform::binary_in_place_dense::<i64, _>($lhs, $rhs, $op)
            }
            (DType::I32, DType::I32) => {
                transform::binary_in_place_dense::<i32, _>($lhs, $rhs, $op)
            }
            (DType::SparseF64, DType::SparseF64) => {
                transform::binary_in_place_sparse::<f64, _>($lhs, $rhs, $op)
            }
            (DType::SparseF32, DType::SparseF32) => {
                transform::binary_in_place_sparse::<f32, _>($lhs, $rhs, $op)
            }
            (DType::SparseI64, DType::SparseI64) => {
                transform::binary_in_place_sparse::<i64, _>($lhs, $rhs, $op)
            }
            (DType::SparseI32, DType::SparseI32) => {
                transform::binary_in_place_sparse::<i32, _>($lhs, $rhs, $op)
            }
            (DType::SparseF64, DType::F64) => {
                transform::binary_in_place_sparse_dense::<f64, _>($lhs, $rhs, $op)
            }
            (DType::SparseF32, DType::F32) => {
                transform::binary_in_place_sparse_dense::<f32, _>($lhs, $rhs, $op)
            }
            (DType::SparseI64, DType::I64) => {
                transform::binary_in_place_sparse_dense::<i64, _>($lhs, $rhs, $op)
            }
            (DType::SparseI32, DType::I32) => {
                transform::binary_in_place_sparse_dense::<i32, _>($lhs, $rhs, $op)
            }
            (ta, tb) => Err(Error::Type(format!(
                "cannot apply operation to item dtypes {ta} and {tb}"
            ))),
        }
    };
}

fn add_impl(lhs: &mut VariableViewMut<'_>, rhs: &Operand<'_>) -> Result<()> {
    match (lhs.dtype(), rhs.dtype()) {
        (DType::Vector3, DType::Vector3) => {
            transform::binary_in_place_dense_value_only::<Vector3, Vector3, _>(lhs, rhs, &PlusEq)
        }
        _ => dispatch_binary!(lhs, rhs, &PlusEq),
    }
}

fn sub_impl(lhs: &mut VariableViewMut<'_>, rhs: &Operand<'_>) -> Result<()> {
    match (lhs.dtype(), rhs.dtype()) {
        (DType::Vector3, DType::Vector3) => {
            transform::binary_in_place_dense_value_only::<Vector3, Vector3, _>(lhs, rhs, &MinusEq)
        }
        _ => dispatch_binary!(lhs, rhs, &MinusEq),
    }
}

fn mul_impl(lhs: &mut VariableViewMut<'_>, rhs: &Operand<'_>) -> Result<()> {
    match (lhs.dtype(), rhs.dtype()) {
        (DType::Vector3, DType::F64) => {
            transform::binary_in_place_dense_value_only::<Vector3, f64, _>(lhs, rhs, &TimesEq)
        }
        _ => dispatch_binary!(lhs, rhs, &TimesEq),
    }
}

fn div_impl(lhs: &mut VariableViewMut<'_>, rhs: &Operand<'_>) -> Result<()> {
    match (lhs.dtype(), rhs.dtype()) {
        (DType::Vector3, DType::F64) => {
            transform::binary_in_place_dense_value_only::<Vector3, f64, _>(lhs, rhs, &DivideEq)
        }
        _ => dispatch_binary!(lhs, rhs, &DivideEq),
    }
}

// ============================================================================
// In-place binary operations
// ============================================================================

pub fn add_in_place(a: &mut Variable, b: &Variable) -> Result<()> {
    add_impl(&mut a.view_mut(), &Operand::from_variable(b))
}

pub fn sub_in_place(a: &mut Variable, b: &Variable) -> Result<()> {
    sub_impl(&mut a.view_mut(), &Operand::from_variable(b))
}

pub fn mul_in_place(a: &mut Variable, b: &Variable) -> Result<()> {
    mul_impl(&mut a.view_mut(), &Operand::from_variable(b))
}

pub fn div_in_place(a: &mut Variable, b: &Variable) -> Result<()> {
    div_impl(&mut a.view_mut(), &Operand::from_variable(b))
}

/// In-place addition through windows, e.g. a dataset item slice on the
/// left and a coord-aligned slice of another dataset on the right.
pub fn add_in_place_view(mut lhs: VariableViewMut<'_>, rhs: &VariableView<'_>) -> Result<()> {
    add_impl(&mut lhs, &Operand::from_view(rhs))
}

pub fn sub_in_place_view(mut lhs: VariableViewMut<'_>, rhs: &VariableView<'_>) -> Result<()> {
    sub_impl(&mut lhs, &Operand::from_view(rhs))
}

pub fn mul_in_place_view(mut lhs: VariableViewMut<'_>, rhs: &VariableView<'_>) -> Result<()> {
    mul_impl(&mut lhs, &Operand::from_view(rhs))
}

pub fn div_in_place_view(mut lhs: VariableViewMut<'_>, rhs: &VariableView<'_>) -> Result<()> {
    div_impl(&mut lhs, &Operand::from_view(rhs))
}

// ============================================================================
// Pure binary operations
// ============================================================================

fn binary_new(
    a: &Variable,
    b: &Variable,
    apply: impl FnOnce(&mut Variable, &Variable) -> Result<()>,
) -> Result<Variable> {
    if b.dtype().is_sparse() && !a.dtype().is_sparse() {
        return Err(Error::Type(format!(
            "cannot apply operation to item dtypes {} and {}",
            a.dtype(),
            b.dtype()
        )));
    }
    let target = transform::strict_union(a.dims(), b.dims())?;
    let mut out = a.broadcast(&target)?.to_owned()?;
    apply(&mut out, b)?;
    Ok(out)
}

pub fn add(a: &Variable, b: &Variable) -> Result<Variable> {
    binary_new(a, b, add_in_place)
}

pub fn sub(a: &Variable, b: &Variable) -> Result<Variable> {
    binary_new(a, b, sub_in_place)
}

pub fn mul(a: &Variable, b: &Variable) -> Result<Variable> {
    binary_new(a, b, mul_in_place)
}

pub fn div(a: &Variable, b: &Variable) -> Result<Variable> {
    binary_new(a, b, div_in_place)
}

// ============================================================================
// Same-buffer slice operations
// ============================================================================

fn ranges_in_place<K>(
    var: &mut Variable,
    dim: Dim,
    dst: (usize, usize),
    src: (usize, usize),
    op: &K,
) -> Result<()>
where
    K: BinaryKernel<f64> + BinaryKernel<f32> + BinaryKernel<i64> + BinaryKernel<i32>,
{
    match var.dtype() {
        DType::F64 => transform::binary_in_place_within::<f64, _>(var, dim, dst, src, op),
        DType::F32 => transform::binary_in_place_within::<f32, _>(var, dim, dst, src, op),
        DType::I64 => transform::binary_in_place_within::<i64, _>(var, dim, dst, src, op),
        DType::I32 => transform::binary_in_place_within::<i32, _>(var, dim, dst, src, op),
        other => Err(Error::Type(format!(
            "operation not implemented for {other}"
        ))),
    }
}

/// `var[dst] += var[src]` along `dim`. Overlapping ranges within one call
/// are detected and the source is copied first; the outcome of *sequences*
/// of such calls on a shared buffer depends on call order.
pub fn add_ranges_in_place(
    var: &mut Variable,
    dim: Dim,
    dst: (usize, usize),
    src: (usize, usize),
) -> Result<()> {
    ranges_in_place(var, dim, dst, src, &PlusEq)
}

/// `var[dst] -= var[src]` along `dim`; see [`add_ranges_in_place`].
pub fn sub_ranges_in_place(
    var: &mut Variable,
    dim: Dim,
    dst: (usize, usize),
    src: (usize, usize),
) -> Result<()> {
    ranges_in_place(var, dim, dst, src, &MinusEq)
}

// ============================================================================
// Unary operations
// ============================================================================

pub fn neg(var: &Variable) -> Result<Variable> {
    crate::transform!(var, &Negate, [F64, F32, I64, I32])
}

pub fn abs(var: &Variable) -> Result<Variable> {
    crate::transform!(var, &Abs, [F64, F32, I64, I32])
}

pub fn sqrt(var: &Variable) -> Result<Variable> {
    crate::transform!(var, &Sqrt, [F64, F32])
}

pub fn acos(var: &Variable) -> Result<Variable> {
    crate::transform!(var, &Acos, [F64, F32])
}

pub fn reciprocal(var: &Variable) -> Result<Variable> {
    crate::transform!(var, &Reciprocal, [F64, F32])
}

/// `var + c` for a plain constant (no variance contribution).
pub fn add_scalar(var: &Variable, constant: f64) -> Result<Variable> {
    crate::transform!(var, &AddConst(constant), [F64, F32])
}

/// `var - c` for a plain constant.
pub fn sub_scalar(var: &Variable, constant: f64) -> Result<Variable> {
    crate::transform!(var, &SubConst(constant), [F64, F32])
}

/// `var * c` for a plain constant; variances scale with `c^2`.
pub fn mul_scalar(var: &Variable, constant: f64) -> Result<Variable> {
    crate::transform!(var, &Scale(constant), [F64, F32])
}

/// `var / c` for a plain constant.
pub fn div_scalar(var: &Variable, constant: f64) -> Result<Variable> {
    crate::transform!(var, &Scale(1.0 / constant), [F64, F32])
}

// ============================================================================
// Reductions
// ============================================================================

/// Sum over `dim`. Variances add; the unit is unchanged.
pub fn sum(var: &Variable, dim: Dim) -> Result<Variable> {
    if var.dtype().is_sparse() {
        return Err(Error::Type(format!(
            "cannot sum a variable of dtype {}",
            var.dtype()
        )));
    }
    let mut dims = var.dims().clone();
    dims.erase(dim)?;
    let volume = dims.volume();
    let values = Values::new(var.dtype(), volume);
    let variances = var
        .has_variances()
        .then(|| Values::new(var.dtype(), volume));
    let mut out = Variable::from_values(dims, var.unit(), values, variances)?;
    add_in_place(&mut out, var)?;
    Ok(out)
}

/// Mean over `dim` for float dtypes. The variance of the mean is the
/// summed variance divided by the squared sample count.
pub fn mean(var: &Variable, dim: Dim) -> Result<Variable> {
    let extent = var
        .dims()
        .extent(dim)
        .ok_or_else(|| Error::Dimension(format!("no {dim} in {}", var.dims())))?;
    if extent == 0 || extent == Dimensions::SPARSE {
        return Err(Error::Dimension(format!(
            "cannot take the mean over {dim} with extent {extent}"
        )));
    }
    let mut out = sum(var, dim)?;
    crate::transform_in_place!(&mut out, &Scale(1.0 / extent as f64), [F64, F32])?;
    Ok(out)
}

// ============================================================================
// Vector operations
// ============================================================================

/// Element-wise Euclidean norm of a 3-vector variable.
pub fn norm(var: &Variable) -> Result<Variable> {
    let vectors = var.values::<Vector3>()?;
    let values: Vec<f64> = vectors.iter().map(|v| v.norm()).collect();
    Variable::new(var.dims().clone(), var.unit(), values)
}

/// Element-wise dot product of two 3-vector variables.
pub fn dot(a: &Variable, b: &Variable) -> Result<Variable> {
    let target = transform::strict_union(a.dims(), b.dims())?;
    let av = a.values_view::<Vector3>(&target)?;
    let bv = b.values_view::<Vector3>(&target)?;
    let values: Vec<f64> = av.zip(bv).map(|(x, y)| x.dot(*y)).collect();
    Variable::new(target, a.unit() * b.unit(), values)
}

// ============================================================================
// Concatenation
// ============================================================================

fn extend_rows(dst: &mut Values, src: &Values) -> Result<()> {
    fn extend<T: Clone>(dst: &mut [Vec<T>], src: &[Vec<T>]) {
        for (d, s) in dst.iter_mut().zip(src.iter()) {
            d.extend_from_slice(s);
        }
    }
    match (dst, src) {
        (Values::SparseI32(d), Values::SparseI32(s)) => extend(d, s),
        (Values::SparseI64(d), Values::SparseI64(s)) => extend(d, s),
        (Values::SparseF32(d), Values::SparseF32(s)) => extend(d, s),
        (Values::SparseF64(d), Values::SparseF64(s)) => extend(d, s),
        (Values::SparseBool(d), Values::SparseBool(s)) => extend(d, s),
        (d, s) => {
            return Err(Error::Type(format!(
                "cannot concatenate dtypes {} and {}",
                d.dtype(),
                s.dtype()
            )))
        }
    }
    Ok(())
}

fn concatenate_sparse(a: &Variable, b: &Variable, dim: Dim) -> Result<Variable> {
    if a.dims() != b.dims() {
        return Err(Error::Dimension(format!(
            "cannot concatenate {} and {} along the sparse {dim}",
            a.dims(),
            b.dims()
        )));
    }
    if a.has_variances() {
        return Err(Error::Unsupported(
            "`append` not implemented for sparse data with variances",
        ));
    }
    let mut out = a.clone();
    extend_rows(out.values_raw_mut(), b.values_raw())?;
    Ok(out)
}

fn copy_slab(dst: &mut Variable, dim: Dim, begin: usize, end: usize, src: &Variable) -> Result<()> {
    let mut window = dst.dims().clone();
    window.resize(dim, end - begin)?;
    let dense = dst.dims().dense_dims();
    let stride = dense.stride(dim)?;
    let dst_index = ViewIndex::new(&dense, &window.dense_dims(), begin * stride)?;
    let src_index = ViewIndex::new(&src.dims().dense_dims(), &window.dense_dims(), 0)?;
    let dst_dtype = dst.dtype();
    with_values_pair!(dst.values_raw_mut(), src.values_raw(), |d, s| {
        for (i, j) in dst_index.clone().zip(src_index.clone()) {
            d[i] = s[j].clone();
        }
    })
    .ok_or_else(|| {
        Error::Type(format!(
            "cannot concatenate dtypes {dst_dtype} and {}",
            src.dtype()
        ))
    })?;
    if let (Some(dst_variances), Some(src_variances)) =
        (dst.variances_raw_mut(), src.variances_raw())
    {
        let _ = with_values_pair!(dst_variances, src_variances, |d, s| {
            for (i, j) in dst_index.clone().zip(src_index.clone()) {
                d[i] = s[j].clone();
            }
        });
    }
    Ok(())
}

/// Concatenate two variables along `dim`.
///
/// With `dim` present in both operands the extents add; with `dim` absent
/// from both the operands are stacked along a new outermost `dim`. For a
/// sparse `dim` the corresponding rows are extended (refused with
/// `Unsupported` when variances are present). Variables carry no bin-edge
/// context; the shared-edge seam rule for edge coords lives in
/// [`dataset::concatenate`](crate::dataset::concatenate).
pub fn concatenate(a: &Variable, b: &Variable, dim: Dim) -> Result<Variable> {
    if a.dtype() != b.dtype() {
        return Err(Error::Type(format!(
            "cannot concatenate dtypes {} and {}",
            a.dtype(),
            b.dtype()
        )));
    }
    a.unit().expect_same(b.unit())?;
    if a.has_variances() != b.has_variances() {
        return Err(Error::Variances(
            "either both or neither operand must have variances",
        ));
    }
    if a.dims().sparse_dim() == Some(dim) || b.dims().sparse_dim() == Some(dim) {
        return concatenate_sparse(a, b, dim);
    }

    let a_has = a.dims().contains(dim);
    if a_has != b.dims().contains(dim) {
        return Err(Error::Dimension(format!(
            "cannot concatenate {} and {} along {dim}",
            a.dims(),
            b.dims()
        )));
    }
    let mut rest_a = a.dims().clone();
    let mut rest_b = b.dims().clone();
    if a_has {
        rest_a.erase(dim)?;
        rest_b.erase(dim)?;
    }
    if rest_a != rest_b {
        return Err(Error::Dimension(format!(
            "cannot concatenate {} and {} along {dim}",
            a.dims(),
            b.dims()
        )));
    }

    let (na, nb) = if a_has {
        (
            a.dims().extent(dim).unwrap_or(1),
            b.dims().extent(dim).unwrap_or(1),
        )
    } else {
        (1, 1)
    };
    let mut out_dims = a.dims().clone();
    if a_has {
        out_dims.resize(dim, na + nb)?;
    } else {
        out_dims.add(dim, na + nb)?;
    }
    let volume = out_dims.volume();
    let values = Values::new(a.dtype(), volume);
    let variances = a.has_variances().then(|| Values::new(a.dtype(), volume));
    let mut out = Variable::from_values(out_dims, a.unit(), values, variances)?;
    copy_slab(&mut out, dim, 0, na, a)?;
    copy_slab(&mut out, dim, na, na + nb, b)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn dims(pairs: &[(Dim, usize)]) -> Dimensions {
        Dimensions::new(pairs).unwrap()
    }

    fn counts(values: Vec<f64>) -> Variable {
        Variable::new(dims(&[(Dim::X, values.len())]), Unit::counts(), values).unwrap()
    }

    #[test]
    fn test_add_with_variances() {
        let mut a = Variable::with_variances(
            dims(&[(Dim::X, 2)]),
            Unit::counts(),
            vec![1.0, 2.0],
            vec![1.0, 1.0],
        )
        .unwrap();
        let b = Variable::with_variances(
            dims(&[(Dim::X, 2)]),
            Unit::counts(),
            vec![10.0, 20.0],
            vec![4.0, 9.0],
        )
        .unwrap();
        add_in_place(&mut a, &b).unwrap();
        assert_eq!(a.values::<f64>().unwrap(), &[11.0, 22.0]);
        assert_eq!(a.variances::<f64>().unwrap(), &[5.0, 10.0]);
    }

    #[test]
    fn test_mul_variance_propagation() {
        let mut a = Variable::with_variances(
            dims(&[(Dim::X, 1)]),
            Unit::m(),
            vec![3.0],
            vec![1.0],
        )
        .unwrap();
        let b = Variable::with_variances(
            dims(&[(Dim::X, 1)]),
            Unit::s(),
            vec![2.0],
            vec![4.0],
        )
        .unwrap();
        mul_in_place(&mut a, &b).unwrap();
        assert_eq!(a.values::<f64>().unwrap(), &[6.0]);
        assert_eq!(a.variances::<f64>().unwrap(), &[40.0]);
        assert_eq!(a.unit(), Unit::m() * Unit::s());
    }

    #[test]
    fn test_broadcast_add() {
        let mut a = Variable::new(
            dims(&[(Dim::Y, 2), (Dim::X, 2)]),
            Unit::counts(),
            vec![1.0, 2.0, 3.0, 4.0],
        )
        .unwrap();
        let b = counts(vec![10.0, 20.0]);
        add_in_place(&mut a, &b).unwrap();
        assert_eq!(a.values::<f64>().unwrap(), &[11.0, 22.0, 13.0, 24.0]);
    }

    #[test]
    fn test_add_unit_mismatch_leaves_lhs_unchanged() {
        let mut a = counts(vec![1.0]);
        let b = Variable::new(dims(&[(Dim::X, 1)]), Unit::m(), vec![1.0]).unwrap();
        assert!(matches!(add_in_place(&mut a, &b), Err(Error::Unit(_))));
        assert_eq!(a.values::<f64>().unwrap(), &[1.0]);
        assert_eq!(a.unit(), Unit::counts());
    }

    #[test]
    fn test_pure_ops_leave_inputs_alone() {
        let a = counts(vec![1.0, 2.0]);
        let b = counts(vec![10.0, 20.0]);
        let c = add(&a, &b).unwrap();
        assert_eq!(c.values::<f64>().unwrap(), &[11.0, 22.0]);
        assert_eq!(a.values::<f64>().unwrap(), &[1.0, 2.0]);
        let d = sub(&c, &a).unwrap();
        assert_eq!(d.values::<f64>().unwrap(), &[10.0, 20.0]);
    }

    #[test]
    fn test_div_unit() {
        let a = Variable::new(dims(&[(Dim::X, 1)]), Unit::m(), vec![6.0]).unwrap();
        let b = Variable::new(dims(&[(Dim::X, 1)]), Unit::s(), vec![2.0]).unwrap();
        let c = div(&a, &b).unwrap();
        assert_eq!(c.values::<f64>().unwrap(), &[3.0]);
        assert_eq!(c.unit(), Unit::m() / Unit::s());
    }

    #[test]
    fn test_neg_abs() {
        let var = counts(vec![1.0, -2.0]);
        assert_eq!(neg(&var).unwrap().values::<f64>().unwrap(), &[-1.0, 2.0]);
        assert_eq!(abs(&var).unwrap().values::<f64>().unwrap(), &[1.0, 2.0]);
    }

    #[test]
    fn test_sqrt_unit_and_variance() {
        let area = Variable::with_variances(
            dims(&[(Dim::X, 1)]),
            Unit::m() * Unit::m(),
            vec![4.0],
            vec![8.0],
        )
        .unwrap();
        let side = sqrt(&area).unwrap();
        assert_eq!(side.unit(), Unit::m());
        assert_relative_eq!(side.values::<f64>().unwrap()[0], 2.0);
        assert_relative_eq!(side.variances::<f64>().unwrap()[0], 0.25 * 8.0 / 4.0);
        assert!(matches!(sqrt(&counts(vec![1.0])), Err(Error::Unit(_))));
    }

    #[test]
    fn test_acos_requires_dimensionless() {
        let var = Variable::new(dims(&[(Dim::X, 1)]), Unit::dimensionless(), vec![0.5]).unwrap();
        assert_relative_eq!(acos(&var).unwrap().values::<f64>().unwrap()[0], 0.5f64.acos());
        assert!(matches!(acos(&counts(vec![0.5])), Err(Error::Unit(_))));
    }

    #[test]
    fn test_reciprocal() {
        let var = Variable::new(dims(&[(Dim::X, 1)]), Unit::s(), vec![2.0]).unwrap();
        let r = reciprocal(&var).unwrap();
        assert_eq!(r.values::<f64>().unwrap(), &[0.5]);
        assert_eq!(r.unit(), Unit::s().recip());
    }

    #[test]
    fn test_scalar_ops() {
        let var = Variable::with_variances(
            dims(&[(Dim::X, 1)]),
            Unit::counts(),
            vec![4.0],
            vec![2.0],
        )
        .unwrap();
        let shifted = add_scalar(&var, 1.0).unwrap();
        assert_eq!(shifted.values::<f64>().unwrap(), &[5.0]);
        assert_eq!(shifted.variances::<f64>().unwrap(), &[2.0]);
        let scaled = mul_scalar(&var, 3.0).unwrap();
        assert_eq!(scaled.values::<f64>().unwrap(), &[12.0]);
        assert_eq!(scaled.variances::<f64>().unwrap(), &[18.0]);
        let halved = div_scalar(&var, 2.0).unwrap();
        assert_eq!(halved.values::<f64>().unwrap(), &[2.0]);
        assert_eq!(halved.variances::<f64>().unwrap(), &[0.5]);
    }

    #[test]
    fn test_sum_dense() {
        let var = Variable::with_variances(
            dims(&[(Dim::Y, 2), (Dim::X, 3)]),
            Unit::counts(),
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            vec![1.0; 6],
        )
        .unwrap();
        let summed = sum(&var, Dim::Y).unwrap();
        assert_eq!(summed.dims(), &dims(&[(Dim::X, 3)]));
        assert_eq!(summed.values::<f64>().unwrap(), &[5.0, 7.0, 9.0]);
        assert_eq!(summed.variances::<f64>().unwrap(), &[2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_mean() {
        let var = Variable::with_variances(
            dims(&[(Dim::X, 4)]),
            Unit::counts(),
            vec![1.0, 2.0, 3.0, 4.0],
            vec![4.0, 4.0, 4.0, 4.0],
        )
        .unwrap();
        let m = mean(&var, Dim::X).unwrap();
        assert!(m.dims().is_empty());
        assert_relative_eq!(m.values::<f64>().unwrap()[0], 2.5);
        // sum of variances / n^2
        assert_relative_eq!(m.variances::<f64>().unwrap()[0], 1.0);
    }

    #[test]
    fn test_mean_rejects_int() {
        let var = Variable::new(dims(&[(Dim::X, 2)]), Unit::counts(), vec![1i64, 2]).unwrap();
        assert!(matches!(mean(&var, Dim::X), Err(Error::Type(_))));
    }

    #[test]
    fn test_vector_add_and_norm_and_dot() {
        let mut a = Variable::new(
            dims(&[(Dim::X, 1)]),
            Unit::m(),
            vec![Vector3::new(3.0, 0.0, 0.0)],
        )
        .unwrap();
        let b = Variable::new(
            dims(&[(Dim::X, 1)]),
            Unit::m(),
            vec![Vector3::new(0.0, 4.0, 0.0)],
        )
        .unwrap();
        add_in_place(&mut a, &b).unwrap();
        let n = norm(&a).unwrap();
        assert_eq!(n.values::<f64>().unwrap(), &[5.0]);
        assert_eq!(n.unit(), Unit::m());
        let d = dot(&a, &b).unwrap();
        assert_eq!(d.values::<f64>().unwrap(), &[16.0]);
        assert_eq!(d.unit(), Unit::m() * Unit::m());
    }

    #[test]
    fn test_vector_scaling_by_scalar() {
        let mut v = Variable::new(
            dims(&[(Dim::X, 2)]),
            Unit::m(),
            vec![Vector3::new(1.0, 2.0, 3.0), Vector3::new(-1.0, 0.0, 4.0)],
        )
        .unwrap();
        let factor = Variable::scalar(2.0f64, Unit::dimensionless());
        mul_in_place(&mut v, &factor).unwrap();
        assert_eq!(
            v.values::<Vector3>().unwrap(),
            &[Vector3::new(2.0, 4.0, 6.0), Vector3::new(-2.0, 0.0, 8.0)]
        );
        assert_eq!(v.unit(), Unit::m());
        let time = Variable::scalar(2.0f64, Unit::s());
        div_in_place(&mut v, &time).unwrap();
        assert_eq!(
            v.values::<Vector3>().unwrap(),
            &[Vector3::new(1.0, 2.0, 3.0), Vector3::new(-1.0, 0.0, 4.0)]
        );
        assert_eq!(v.unit(), Unit::m() / Unit::s());
    }

    #[test]
    fn test_concatenate_dense() {
        let a = counts(vec![1.0, 2.0]);
        let b = counts(vec![3.0]);
        let c = concatenate(&a, &b, Dim::X).unwrap();
        assert_eq!(c.dims().extent(Dim::X), Some(3));
        assert_eq!(c.values::<f64>().unwrap(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_concatenate_new_outer_dim() {
        let a = counts(vec![1.0, 2.0]);
        let b = counts(vec![3.0, 4.0]);
        let c = concatenate(&a, &b, Dim::Spectrum).unwrap();
        assert_eq!(c.dims().labels(), &[Dim::Spectrum, Dim::X]);
        assert_eq!(c.values::<f64>().unwrap(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_concatenate_with_variances() {
        let a = Variable::with_variances(
            dims(&[(Dim::X, 1)]),
            Unit::counts(),
            vec![1.0],
            vec![0.5],
        )
        .unwrap();
        let b = Variable::with_variances(
            dims(&[(Dim::X, 2)]),
            Unit::counts(),
            vec![2.0, 3.0],
            vec![0.25, 0.125],
        )
        .unwrap();
        let c = concatenate(&a, &b, Dim::X).unwrap();
        assert_eq!(c.values::<f64>().unwrap(), &[1.0, 2.0, 3.0]);
        assert_eq!(c.variances::<f64>().unwrap(), &[0.5, 0.25, 0.125]);
    }

    #[test]
    fn test_concatenate_sparse_rows() {
        let mut d = dims(&[(Dim::X, 2)]);
        d.add_sparse(Dim::Event).unwrap();
        let a = Variable::sparse_from_rows::<f64>(
            d.clone(),
            Unit::us(),
            vec![vec![1.0], vec![2.0]],
        )
        .unwrap();
        let b =
            Variable::sparse_from_rows::<f64>(d, Unit::us(), vec![vec![3.0], vec![]]).unwrap();
        let c = concatenate(&a, &b, Dim::Event).unwrap();
        assert_eq!(
            c.sparse_values::<f64>().unwrap(),
            &[vec![1.0, 3.0], vec![2.0]]
        );
    }

    #[test]
    fn test_concatenate_sparse_with_variances_unsupported() {
        let mut d = dims(&[(Dim::X, 1)]);
        d.add_sparse(Dim::Event).unwrap();
        let a = Variable::sparse_with_variances::<f64>(
            d.clone(),
            Unit::us(),
            vec![vec![1.0]],
            vec![vec![0.1]],
        )
        .unwrap();
        let err = concatenate(&a, &a, Dim::Event).unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }

    #[test]
    fn test_ranges_in_place_both_orders() {
        // Disjoint halves of one buffer: the two call orders give different
        // results, which is the documented contract for same-buffer slices.
        let make = || counts(vec![1.0, 2.0, 10.0, 20.0]);

        let mut forward = make();
        add_ranges_in_place(&mut forward, Dim::X, (0, 2), (2, 4)).unwrap();
        add_ranges_in_place(&mut forward, Dim::X, (2, 4), (0, 2)).unwrap();
        assert_eq!(
            forward.values::<f64>().unwrap(),
            &[11.0, 22.0, 21.0, 42.0]
        );

        let mut backward = make();
        add_ranges_in_place(&mut backward, Dim::X, (2, 4), (0, 2)).unwrap();
        add_ranges_in_place(&mut backward, Dim::X, (0, 2), (2, 4)).unwrap();
        assert_eq!(
            backward.values::<f64>().unwrap(),
            &[12.0, 24.0, 11.0, 22.0]
        );
    }

    #[test]
    fn test_ranges_in_place_overlap_is_detected() {
        let mut var = counts(vec![1.0, 10.0, 100.0]);
        add_ranges_in_place(&mut var, Dim::X, (0, 2), (1, 3)).unwrap();
        assert_eq!(var.values::<f64>().unwrap(), &[11.0, 110.0, 100.0]);
    }

    #[test]
    fn test_mul_through_slice_cannot_change_unit() {
        let mut var = counts(vec![1.0, 2.0, 3.0, 4.0]);
        let err = mul_ranges_err_helper(&mut var);
        assert!(matches!(err, Error::Unsupported(_)));
    }

    fn mul_ranges_err_helper(var: &mut Variable) -> Error {
        ranges_in_place(var, Dim::X, (0, 2), (2, 4), &TimesEq).unwrap_err()
    }
}
