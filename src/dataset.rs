//! Named collections of data items sharing coordinates, labels, and masks.
//!
//! A [`Dataset`] owns a coord table keyed by [`Dim`], label and mask tables
//! keyed by name, and a named map of [`DataItem`]s. Insertion validates
//! extents against everything already present (bin-edge coords are one
//! longer along their key dim). Slicing returns a borrowing
//! [`DatasetSlice`] that lazily slices every entry depending on the
//! slicing dim.
//!
//! Binary operations validate the full alignment contract up front
//! (coords element-wise equal, labels matched by name, RHS item names a
//! subset of LHS), then delegate to the variable engine item by item. A
//! failure during the per-item phase leaves previously updated items
//! modified; callers wanting transactional behavior snapshot first.

use std::collections::BTreeMap;
use std::fmt;

use crate::dim::{Dim, Dimensions};
use crate::element::DType;
use crate::ops;
use crate::variable::{Variable, VariableView};
use crate::{Error, Result};

// ============================================================================
// DataItem
// ============================================================================

/// One named entry of a dataset: data plus optional per-item (sparse)
/// coords.
#[derive(Clone, Debug, PartialEq)]
pub struct DataItem {
    data: Variable,
    coords: BTreeMap<Dim, Variable>,
}

impl DataItem {
    pub fn new(data: Variable) -> Self {
        Self {
            data,
            coords: BTreeMap::new(),
        }
    }

    pub fn data(&self) -> &Variable {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Variable {
        &mut self.data
    }

    pub fn dims(&self) -> &Dimensions {
        self.data.dims()
    }

    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    pub fn has_variances(&self) -> bool {
        self.data.has_variances()
    }

    /// Per-item coords (sparse coords live here, one per item).
    pub fn coords(&self) -> &BTreeMap<Dim, Variable> {
        &self.coords
    }

    pub fn coord(&self, dim: Dim) -> Option<&Variable> {
        self.coords.get(&dim)
    }
}

// ============================================================================
// Dataset
// ============================================================================

/// A coord/label/mask table plus named data items.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Dataset {
    coords: BTreeMap<Dim, Variable>,
    labels: BTreeMap<String, Variable>,
    masks: BTreeMap<String, Variable>,
    items: BTreeMap<String, DataItem>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Union of all item and coord shapes. Bin-edge coords contribute
    /// their data extent.
    pub fn dimensions(&self) -> Dimensions {
        let mut out = Dimensions::empty();
        let all = self
            .items
            .values()
            .map(|item| item.data.dims())
            .chain(self.coords.values().map(|coord| coord.dims()));
        for dims in all {
            if let Ok(merged) = out.merge(dims) {
                out = merged;
            }
        }
        out
    }

    /// True iff `coord` (keyed by `key`) is a bin-edge coord along `along`.
    fn coord_is_edge(&self, key: Dim, coord: &Variable, along: Dim) -> bool {
        if key != along {
            return false;
        }
        match (coord.dims().extent(along), self.dimensions().extent(along)) {
            (Some(c), Some(d)) => d != Dimensions::SPARSE && c == d + 1,
            _ => false,
        }
    }

    fn check_fits(&self, dims: &Dimensions, edge_key: Option<Dim>) -> Result<()> {
        for (d, n) in dims.iter() {
            for item in self.items.values() {
                if let Some(m) = item.data.dims().extent(d) {
                    let edge_ok = edge_key == Some(d)
                        && m != Dimensions::SPARSE
                        && n == m + 1;
                    if m != n && !edge_ok {
                        return Err(Error::Dimension(format!(
                            "extent {n} of {d} does not fit dataset extent {m}"
                        )));
                    }
                }
            }
            for (&cd, coord) in &self.coords {
                if let Some(m) = coord.dims().extent(d) {
                    // A stored edge coord is one longer than the data.
                    let stored_is_edge =
                        cd == d && n != Dimensions::SPARSE && m == n + 1;
                    let new_is_edge = edge_key == Some(d)
                        && cd == d
                        && m != Dimensions::SPARSE
                        && n == m + 1;
                    if m != n && !stored_is_edge && !new_is_edge {
                        return Err(Error::Dimension(format!(
                            "extent {n} of {d} does not fit coord extent {m}"
                        )));
                    }
                }
            }
            for labels in self.labels.values() {
                if let Some(m) = labels.dims().extent(d) {
                    let stored_is_edge = labels.dims().inner() == Some(d)
                        && n != Dimensions::SPARSE
                        && m == n + 1;
                    if m != n && !stored_is_edge {
                        return Err(Error::Dimension(format!(
                            "extent {n} of {d} does not fit label extent {m}"
                        )));
                    }
                }
            }
            for mask in self.masks.values() {
                if let Some(m) = mask.dims().extent(d) {
                    if m != n {
                        return Err(Error::Dimension(format!(
                            "extent {n} of {d} does not fit mask extent {m}"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Insert or replace a data item.
    pub fn set_data(&mut self, name: impl Into<String>, data: Variable) -> Result<()> {
        let name = name.into();
        self.check_fits(data.dims(), None)?;
        match self.items.get_mut(&name) {
            Some(item) => item.data = data,
            None => {
                self.items.insert(name, DataItem::new(data));
            }
        }
        Ok(())
    }

    /// Attach a coord for `dim`; at most one per dim. The coord may be a
    /// bin-edge coord (one longer along `dim`) and may be
    /// multi-dimensional.
    pub fn set_coord(&mut self, dim: Dim, coord: Variable) -> Result<()> {
        if !coord.dims().contains(dim) {
            return Err(Error::Dimension(format!(
                "coord for {dim} has dims {}",
                coord.dims()
            )));
        }
        self.check_fits(coord.dims(), Some(dim))?;
        self.coords.insert(dim, coord);
        Ok(())
    }

    /// Attach named labels; their `inner()` dim binds them for alignment.
    pub fn set_labels(&mut self, name: impl Into<String>, labels: Variable) -> Result<()> {
        self.check_fits(labels.dims(), labels.dims().inner())?;
        self.labels.insert(name.into(), labels);
        Ok(())
    }

    /// Attach a named boolean mask.
    pub fn set_mask(&mut self, name: impl Into<String>, mask: Variable) -> Result<()> {
        if mask.dtype() != DType::Bool {
            return Err(Error::Type(format!(
                "mask must be bool, got {}",
                mask.dtype()
            )));
        }
        self.check_fits(mask.dims(), None)?;
        self.masks.insert(name.into(), mask);
        Ok(())
    }

    /// Attach a per-item sparse coord along `dim` to item `name`.
    pub fn set_sparse_coord(
        &mut self,
        name: &str,
        dim: Dim,
        coord: Variable,
    ) -> Result<()> {
        let item = self
            .items
            .get_mut(name)
            .ok_or_else(|| Error::Name(name.into()))?;
        if coord.dims().sparse_dim() != Some(dim)
            || item.data.dims().sparse_dim() != Some(dim)
            || coord.dims().dense_dims() != item.data.dims().dense_dims()
        {
            return Err(Error::Dimension(format!(
                "sparse coord {} does not fit item {}",
                coord.dims(),
                item.data.dims()
            )));
        }
        item.coords.insert(dim, coord);
        Ok(())
    }

    pub fn item(&self, name: &str) -> Result<&DataItem> {
        self.items
            .get(name)
            .ok_or_else(|| Error::Name(name.into()))
    }

    pub fn item_mut(&mut self, name: &str) -> Result<&mut DataItem> {
        self.items
            .get_mut(name)
            .ok_or_else(|| Error::Name(name.into()))
    }

    /// Remove and return an item.
    pub fn remove(&mut self, name: &str) -> Option<DataItem> {
        self.items.remove(name)
    }

    pub fn coord(&self, dim: Dim) -> Result<&Variable> {
        self.coords
            .get(&dim)
            .ok_or_else(|| Error::Name(format!("{dim}")))
    }

    pub fn labels(&self, name: &str) -> Result<&Variable> {
        self.labels
            .get(name)
            .ok_or_else(|| Error::Name(name.into()))
    }

    pub fn mask(&self, name: &str) -> Result<&Variable> {
        self.masks
            .get(name)
            .ok_or_else(|| Error::Name(name.into()))
    }

    pub fn coords(&self) -> &BTreeMap<Dim, Variable> {
        &self.coords
    }

    pub fn masks(&self) -> &BTreeMap<String, Variable> {
        &self.masks
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate `(name, item)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &DataItem)> {
        self.items.iter().map(|(name, item)| (name.as_str(), item))
    }

    /// Rank-reducing point slice; items independent of `dim` are removed.
    pub fn slice(&self, dim: Dim, index: usize) -> Result<DatasetSlice<'_>> {
        let extent = self.slice_extent(dim)?;
        if index >= extent {
            return Err(Error::Slice {
                dim,
                begin: index,
                end: index + 1,
                extent,
            });
        }
        Ok(DatasetSlice {
            parent: self,
            op: SliceOp::Point(dim, index),
        })
    }

    /// Range slice `[begin, end)`; items independent of `dim` are
    /// retained.
    pub fn slice_range(&self, dim: Dim, begin: usize, end: usize) -> Result<DatasetSlice<'_>> {
        let extent = self.slice_extent(dim)?;
        if begin > end || end > extent {
            return Err(Error::Slice {
                dim,
                begin,
                end,
                extent,
            });
        }
        Ok(DatasetSlice {
            parent: self,
            op: SliceOp::Range(dim, begin, end),
        })
    }

    fn slice_extent(&self, dim: Dim) -> Result<usize> {
        match self.dimensions().extent(dim) {
            None => Err(Error::Dimension(format!(
                "no {dim} in dataset with {}",
                self.dimensions()
            ))),
            Some(Dimensions::SPARSE) => Err(Error::Dimension(format!(
                "cannot slice the sparse {dim} by index"
            ))),
            Some(extent) => Ok(extent),
        }
    }
}

impl std::ops::Index<&str> for Dataset {
    type Output = DataItem;

    fn index(&self, name: &str) -> &DataItem {
        match self.items.get(name) {
            Some(item) => item,
            None => panic!("no item named {name:?}"),
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dataset{} with ", self.dimensions())?;
        let names: Vec<&str> = self.items.keys().map(String::as_str).collect();
        write!(f, "{names:?}")
    }
}

// ============================================================================
// DatasetSlice
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq)]
enum SliceOp {
    Point(Dim, usize),
    Range(Dim, usize, usize),
}

/// A borrowing slice of a dataset; every dependent entry is sliced lazily
/// on access.
#[derive(Clone, Copy)]
pub struct DatasetSlice<'a> {
    parent: &'a Dataset,
    op: SliceOp,
}

impl<'a> DatasetSlice<'a> {
    pub fn parent(&self) -> &'a Dataset {
        self.parent
    }

    fn dim(&self) -> Dim {
        match self.op {
            SliceOp::Point(dim, _) | SliceOp::Range(dim, _, _) => dim,
        }
    }

    fn is_point(&self) -> bool {
        matches!(self.op, SliceOp::Point(_, _))
    }

    /// Slice `var` if it depends on the slicing dim; `edge` widens a range
    /// slice by one (bin-edge coords keep the closing edge).
    fn slice_view(&self, var: &'a Variable, edge: bool) -> Result<VariableView<'a>> {
        if !var.dims().contains(self.dim()) {
            return Ok(var.view());
        }
        match self.op {
            SliceOp::Point(dim, index) => var.slice(dim, index),
            SliceOp::Range(dim, begin, end) => {
                var.slice_range(dim, begin, if edge { end + 1 } else { end })
            }
        }
    }

    /// The sliced view of a coord. Fails with `Name` for a coord that a
    /// point slice of its own bin-edge dim removed.
    pub fn coord(&self, dim: Dim) -> Result<VariableView<'a>> {
        let coord = self.parent.coord(dim)?;
        let edge = self.parent.coord_is_edge(dim, coord, self.dim());
        if edge && self.is_point() {
            return Err(Error::Name(format!("{dim}")));
        }
        self.slice_view(coord, edge)
    }

    /// The sliced view of an item's data. Fails with `Name` for items a
    /// point slice removed.
    pub fn item(&self, name: &str) -> Result<VariableView<'a>> {
        let item = self.parent.item(name)?;
        if self.is_point() && !item.data.dims().contains(self.dim()) {
            return Err(Error::Name(name.into()));
        }
        self.slice_view(&item.data, false)
    }

    /// Names of the items this slice retains.
    pub fn item_names(&self) -> Vec<&'a str> {
        self.parent
            .items
            .iter()
            .filter(|(_, item)| {
                !(self.is_point() && !item.data.dims().contains(self.dim()))
            })
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Materialize into an owned dataset.
    pub fn to_dataset(&self) -> Result<Dataset> {
        let mut out = Dataset::new();
        for (&dim, coord) in &self.parent.coords {
            let edge = self.parent.coord_is_edge(dim, coord, self.dim());
            if edge && self.is_point() {
                continue;
            }
            let sliced = self.slice_view(coord, edge)?.to_owned()?;
            out.coords.insert(dim, sliced);
        }
        for (name, labels) in &self.parent.labels {
            out.labels
                .insert(name.clone(), self.slice_view(labels, false)?.to_owned()?);
        }
        for (name, mask) in &self.parent.masks {
            out.masks
                .insert(name.clone(), self.slice_view(mask, false)?.to_owned()?);
        }
        for (name, item) in &self.parent.items {
            if self.is_point() && !item.data.dims().contains(self.dim()) {
                continue;
            }
            let mut new_item = DataItem::new(self.slice_view(&item.data, false)?.to_owned()?);
            for (&dim, coord) in &item.coords {
                new_item
                    .coords
                    .insert(dim, self.slice_view(coord, false)?.to_owned()?);
            }
            out.items.insert(name.clone(), new_item);
        }
        Ok(out)
    }
}

// ============================================================================
// Binary operations
// ============================================================================

#[derive(Clone, Copy)]
enum BinOp {
    Plus,
    Minus,
    Times,
    Divide,
}

impl BinOp {
    fn apply(
        self,
        lhs: &mut Variable,
        rhs: &VariableView<'_>,
    ) -> Result<()> {
        match self {
            BinOp::Plus => ops::add_in_place_view(lhs.view_mut(), rhs),
            BinOp::Minus => ops::sub_in_place_view(lhs.view_mut(), rhs),
            BinOp::Times => ops::mul_in_place_view(lhs.view_mut(), rhs),
            BinOp::Divide => ops::div_in_place_view(lhs.view_mut(), rhs),
        }
    }
}

/// Normal form of a binary operation's right-hand side.
struct RhsParts<'a> {
    coords: Vec<(Dim, VariableView<'a>)>,
    labels: Vec<(&'a str, VariableView<'a>)>,
    items: Vec<(&'a str, VariableView<'a>, Vec<(Dim, VariableView<'a>)>)>,
}

impl<'a> RhsParts<'a> {
    fn from_dataset(rhs: &'a Dataset) -> Self {
        Self {
            coords: rhs
                .coords
                .iter()
                .map(|(&dim, coord)| (dim, coord.view()))
                .collect(),
            labels: rhs
                .labels
                .iter()
                .map(|(name, labels)| (name.as_str(), labels.view()))
                .collect(),
            items: rhs
                .items
                .iter()
                .map(|(name, item)| {
                    (
                        name.as_str(),
                        item.data.view(),
                        item.coords
                            .iter()
                            .map(|(&dim, coord)| (dim, coord.view()))
                            .collect(),
                    )
                })
                .collect(),
        }
    }

    fn from_slice(rhs: &DatasetSlice<'a>) -> Result<Self> {
        let mut coords = Vec::new();
        for (&dim, coord) in &rhs.parent.coords {
            let edge = rhs.parent.coord_is_edge(dim, coord, rhs.dim());
            if edge && rhs.is_point() {
                continue;
            }
            coords.push((dim, rhs.slice_view(coord, edge)?));
        }
        let mut labels = Vec::new();
        for (name, label_var) in &rhs.parent.labels {
            labels.push((name.as_str(), rhs.slice_view(label_var, false)?));
        }
        let mut items = Vec::new();
        for (name, item) in &rhs.parent.items {
            if rhs.is_point() && !item.data.dims().contains(rhs.dim()) {
                continue;
            }
            let mut item_coords = Vec::new();
            for (&dim, coord) in &item.coords {
                item_coords.push((dim, rhs.slice_view(coord, false)?));
            }
            items.push((name.as_str(), rhs.slice_view(&item.data, false)?, item_coords));
        }
        Ok(Self {
            coords,
            labels,
            items,
        })
    }

    fn from_item(name: &'a str, item: &'a DataItem) -> Self {
        Self {
            coords: Vec::new(),
            labels: Vec::new(),
            items: vec![(
                name,
                item.data.view(),
                item.coords
                    .iter()
                    .map(|(&dim, coord)| (dim, coord.view()))
                    .collect(),
            )],
        }
    }
}

fn view_equals(lhs: &Variable, rhs: &VariableView<'_>) -> Result<bool> {
    Ok(*lhs == rhs.to_owned()?)
}

impl Dataset {
    /// Alignment contract shared by all dataset binary operations; checked
    /// in full before anything is written.
    fn check_alignment(&self, rhs: &RhsParts<'_>, broadcast_item: bool) -> Result<()> {
        for (dim, rhs_coord) in &rhs.coords {
            if let Some(lhs_coord) = self.coords.get(dim) {
                if !view_equals(lhs_coord, rhs_coord)? {
                    return Err(Error::CoordMismatch(format!("{dim}")));
                }
            }
        }
        for (name, rhs_labels) in &rhs.labels {
            if let Some(lhs_labels) = self.labels.get(*name) {
                if !view_equals(lhs_labels, rhs_labels)? {
                    return Err(Error::CoordMismatch(format!("labels {name:?}")));
                }
            }
        }
        for (name, _, rhs_item_coords) in &rhs.items {
            let lhs_item = match self.items.get(*name) {
                Some(item) => item,
                None if broadcast_item => continue,
                None => return Err(Error::Name((*name).into())),
            };
            for (dim, rhs_coord) in rhs_item_coords {
                if let Some(lhs_coord) = lhs_item.coords.get(dim) {
                    if !view_equals(lhs_coord, rhs_coord)? {
                        return Err(Error::CoordMismatch(format!("sparse coord {dim}")));
                    }
                }
            }
        }
        Ok(())
    }

    fn op_assign(&mut self, rhs: &RhsParts<'_>, op: BinOp, broadcast_item: bool) -> Result<()> {
        self.check_alignment(rhs, broadcast_item)?;
        if broadcast_item {
            // A single item applies to every LHS item.
            for (_, rhs_view, _) in &rhs.items {
                for item in self.items.values_mut() {
                    op.apply(&mut item.data, rhs_view)?;
                }
            }
        } else {
            for (name, rhs_view, _) in &rhs.items {
                if let Some(item) = self.items.get_mut(*name) {
                    op.apply(&mut item.data, rhs_view)?;
                }
            }
        }
        Ok(())
    }

    pub fn add_assign(&mut self, rhs: &Dataset) -> Result<()> {
        self.op_assign(&RhsParts::from_dataset(rhs), BinOp::Plus, false)
    }

    pub fn sub_assign(&mut self, rhs: &Dataset) -> Result<()> {
        self.op_assign(&RhsParts::from_dataset(rhs), BinOp::Minus, false)
    }

    pub fn mul_assign(&mut self, rhs: &Dataset) -> Result<()> {
        self.op_assign(&RhsParts::from_dataset(rhs), BinOp::Times, false)
    }

    pub fn div_assign(&mut self, rhs: &Dataset) -> Result<()> {
        self.op_assign(&RhsParts::from_dataset(rhs), BinOp::Divide, false)
    }

    pub fn add_assign_slice(&mut self, rhs: &DatasetSlice<'_>) -> Result<()> {
        self.op_assign(&RhsParts::from_slice(rhs)?, BinOp::Plus, false)
    }

    pub fn sub_assign_slice(&mut self, rhs: &DatasetSlice<'_>) -> Result<()> {
        self.op_assign(&RhsParts::from_slice(rhs)?, BinOp::Minus, false)
    }

    pub fn mul_assign_slice(&mut self, rhs: &DatasetSlice<'_>) -> Result<()> {
        self.op_assign(&RhsParts::from_slice(rhs)?, BinOp::Times, false)
    }

    pub fn div_assign_slice(&mut self, rhs: &DatasetSlice<'_>) -> Result<()> {
        self.op_assign(&RhsParts::from_slice(rhs)?, BinOp::Divide, false)
    }

    /// Apply a single item to every LHS item.
    pub fn add_assign_item(&mut self, rhs: &DataItem) -> Result<()> {
        self.op_assign(&RhsParts::from_item("", rhs), BinOp::Plus, true)
    }

    pub fn sub_assign_item(&mut self, rhs: &DataItem) -> Result<()> {
        self.op_assign(&RhsParts::from_item("", rhs), BinOp::Minus, true)
    }

    pub fn mul_assign_item(&mut self, rhs: &DataItem) -> Result<()> {
        self.op_assign(&RhsParts::from_item("", rhs), BinOp::Times, true)
    }

    pub fn div_assign_item(&mut self, rhs: &DataItem) -> Result<()> {
        self.op_assign(&RhsParts::from_item("", rhs), BinOp::Divide, true)
    }

    fn own_item(&self, name: &str) -> Result<DataItem> {
        // The RHS aliases this dataset, so it is copied up front; this is
        // the dataset-level form of the copy-on-overlap rule.
        Ok(self.item(name)?.clone())
    }

    /// `self ⊕= self[name]`, copying the item first.
    pub fn add_assign_own_item(&mut self, name: &str) -> Result<()> {
        let item = self.own_item(name)?;
        self.add_assign_item(&item)
    }

    pub fn sub_assign_own_item(&mut self, name: &str) -> Result<()> {
        let item = self.own_item(name)?;
        self.sub_assign_item(&item)
    }

    pub fn mul_assign_own_item(&mut self, name: &str) -> Result<()> {
        let item = self.own_item(name)?;
        self.mul_assign_item(&item)
    }

    pub fn div_assign_own_item(&mut self, name: &str) -> Result<()> {
        let item = self.own_item(name)?;
        self.div_assign_item(&item)
    }
}

// ============================================================================
// Concatenation
// ============================================================================

/// Concatenate a bin-edge coord: the closing edge of `a` must equal the
/// opening edge of `b`, and the duplicate is dropped at the seam.
fn concatenate_edge_coord(a: &Variable, b: &Variable, dim: Dim) -> Result<Variable> {
    let na = a
        .dims()
        .extent(dim)
        .ok_or_else(|| Error::Dimension(format!("no {dim} in {}", a.dims())))?;
    let nb = b
        .dims()
        .extent(dim)
        .ok_or_else(|| Error::Dimension(format!("no {dim} in {}", b.dims())))?;
    let closing = a.slice(dim, na - 1)?.to_owned()?;
    let opening = b.slice(dim, 0)?.to_owned()?;
    if closing != opening {
        return Err(Error::CoordMismatch(format!(
            "bin edges along {dim} do not meet at the seam"
        )));
    }
    let rest = b.slice_range(dim, 1, nb)?.to_owned()?;
    ops::concatenate(a, &rest, dim)
}

/// Concatenate two datasets along `dim`.
///
/// Both sides must carry the same item, coord, label, and mask names.
/// Entries depending on `dim` are concatenated; entries independent of
/// `dim` must be element-wise equal and are carried over unchanged. A
/// bin-edge coord along `dim` must share its closing edge with the other
/// side's opening edge, and that edge appears once in the result.
pub fn concatenate(a: &Dataset, b: &Dataset, dim: Dim) -> Result<Dataset> {
    for name in a.items.keys().chain(b.items.keys()) {
        if !(a.items.contains_key(name) && b.items.contains_key(name)) {
            return Err(Error::Name(name.clone()));
        }
    }
    for cd in a.coords.keys().chain(b.coords.keys()) {
        if !(a.coords.contains_key(cd) && b.coords.contains_key(cd)) {
            return Err(Error::CoordMismatch(format!("{cd}")));
        }
    }
    for name in a.labels.keys().chain(b.labels.keys()) {
        if !(a.labels.contains_key(name) && b.labels.contains_key(name)) {
            return Err(Error::CoordMismatch(format!("labels {name:?}")));
        }
    }
    for name in a.masks.keys().chain(b.masks.keys()) {
        if !(a.masks.contains_key(name) && b.masks.contains_key(name)) {
            return Err(Error::Name(name.clone()));
        }
    }
    // Mixed dependence would leave the result with conflicting extents.
    let depends = |item: &DataItem| item.data.dims().contains(dim);
    if a.items.values().any(depends) && !a.items.values().all(depends) {
        return Err(Error::Dimension(format!(
            "cannot concatenate along {dim}: some items depend on it and some do not"
        )));
    }

    let mut out = Dataset::new();
    for (&cd, coord_a) in &a.coords {
        let coord_b = &b.coords[&cd];
        let joined = if !coord_a.dims().contains(dim) {
            if coord_a != coord_b {
                return Err(Error::CoordMismatch(format!("{cd}")));
            }
            coord_a.clone()
        } else {
            let a_edge = a.coord_is_edge(cd, coord_a, dim);
            let b_edge = b.coord_is_edge(cd, coord_b, dim);
            if a_edge != b_edge {
                return Err(Error::Dimension(format!(
                    "coord for {cd} is bin edges on one side only"
                )));
            }
            if a_edge {
                concatenate_edge_coord(coord_a, coord_b, dim)?
            } else {
                ops::concatenate(coord_a, coord_b, dim)?
            }
        };
        out.coords.insert(cd, joined);
    }
    for (name, labels_a) in &a.labels {
        let labels_b = &b.labels[name];
        let joined = if labels_a.dims().contains(dim) {
            ops::concatenate(labels_a, labels_b, dim)?
        } else {
            if labels_a != labels_b {
                return Err(Error::CoordMismatch(format!("labels {name:?}")));
            }
            labels_a.clone()
        };
        out.labels.insert(name.clone(), joined);
    }
    for (name, mask_a) in &a.masks {
        let mask_b = &b.masks[name];
        let joined = if mask_a.dims().contains(dim) {
            ops::concatenate(mask_a, mask_b, dim)?
        } else {
            if mask_a != mask_b {
                return Err(Error::CoordMismatch(format!("mask {name:?}")));
            }
            mask_a.clone()
        };
        out.masks.insert(name.clone(), joined);
    }
    for (name, item_a) in &a.items {
        let item_b = &b.items[name];
        for key in item_a.coords.keys().chain(item_b.coords.keys()) {
            if !(item_a.coords.contains_key(key) && item_b.coords.contains_key(key)) {
                return Err(Error::CoordMismatch(format!("sparse coord {key}")));
            }
        }
        let mut item = DataItem::new(ops::concatenate(&item_a.data, &item_b.data, dim)?);
        for (&scd, coord_a) in &item_a.coords {
            item.coords
                .insert(scd, ops::concatenate(coord_a, &item_b.coords[&scd], dim)?);
        }
        out.items.insert(name.clone(), item);
    }
    Ok(out)
}
