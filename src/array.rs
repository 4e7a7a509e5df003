//! Labelled arrays and datasets
//!
//! [`DataArray`] is an N-dimensional array with named dimensions, coordinate
//! arrays and free-form attributes. Its values are either held in memory or
//! deferred behind a [`LazyArray`]. A [`Dataset`] is an ordered collection of
//! named data arrays.

use crate::errors::{Result, UmRegridError};
use crate::lazy::LazyArray;
use chrono::NaiveDateTime;
use ndarray::{Array1, ArrayD, Axis};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Free-form metadata attached to arrays, coordinates and datasets
pub type Attributes = BTreeMap<String, Value>;

/// Values of a coordinate: plain numbers or calendar timestamps
#[derive(Debug, Clone, PartialEq)]
pub enum CoordValues {
    Numeric(ArrayD<f64>),
    Time(Vec<NaiveDateTime>),
}

impl CoordValues {
    pub fn shape(&self) -> Vec<usize> {
        match self {
            CoordValues::Numeric(values) => values.shape().to_vec(),
            CoordValues::Time(times) => vec![times.len()],
        }
    }

    pub fn ndim(&self) -> usize {
        match self {
            CoordValues::Numeric(values) => values.ndim(),
            CoordValues::Time(_) => 1,
        }
    }
}

/// A coordinate array attached to one or more dimensions of a [`DataArray`]
#[derive(Debug, Clone, PartialEq)]
pub struct Coordinate {
    pub name: String,
    pub dims: Vec<String>,
    pub values: CoordValues,
    /// Cell bounds with shape `values.shape() + [n_vertices]`
    pub bounds: Option<ArrayD<f64>>,
    pub attrs: Attributes,
}

impl Coordinate {
    pub fn new(
        name: impl Into<String>,
        dims: impl IntoIterator<Item = impl Into<String>>,
        values: ArrayD<f64>,
    ) -> Self {
        Self {
            name: name.into(),
            dims: dims.into_iter().map(Into::into).collect(),
            values: CoordValues::Numeric(values),
            bounds: None,
            attrs: Attributes::new(),
        }
    }

    /// A 1-D dimension coordinate whose single dimension shares its name
    pub fn from_1d(name: impl Into<String>, values: Vec<f64>) -> Self {
        let name = name.into();
        Self::new(name.clone(), [name], Array1::from(values).into_dyn())
    }

    /// A 1-D time coordinate whose single dimension shares its name
    pub fn time(name: impl Into<String>, times: Vec<NaiveDateTime>) -> Self {
        let name = name.into();
        Self {
            dims: vec![name.clone()],
            name,
            values: CoordValues::Time(times),
            bounds: None,
            attrs: Attributes::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    pub fn with_bounds(mut self, bounds: ArrayD<f64>) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).and_then(Value::as_str)
    }

    pub fn units(&self) -> Option<&str> {
        self.attr_str("units")
    }

    pub fn numeric(&self) -> Option<&ArrayD<f64>> {
        match &self.values {
            CoordValues::Numeric(values) => Some(values),
            CoordValues::Time(_) => None,
        }
    }

    pub fn times(&self) -> Option<&[NaiveDateTime]> {
        match &self.values {
            CoordValues::Time(times) => Some(times),
            CoordValues::Numeric(_) => None,
        }
    }

    pub fn shape(&self) -> Vec<usize> {
        self.values.shape()
    }

    pub fn ndim(&self) -> usize {
        self.values.ndim()
    }

    /// Select `index` along `dim`; `None` when the coordinate collapses to a scalar
    fn select(&self, dim: &str, index: usize) -> Option<Coordinate> {
        let axis = match self.dims.iter().position(|d| d == dim) {
            Some(axis) => axis,
            None => return Some(self.clone()),
        };
        let values = match &self.values {
            CoordValues::Numeric(values) if values.ndim() > 1 => {
                values.index_axis(Axis(axis), index).to_owned()
            }
            _ => return None,
        };
        let mut dims = self.dims.clone();
        dims.remove(axis);
        Some(Coordinate {
            name: self.name.clone(),
            dims,
            values: CoordValues::Numeric(values),
            bounds: self
                .bounds
                .as_ref()
                .map(|b| b.index_axis(Axis(axis), index).to_owned()),
            attrs: self.attrs.clone(),
        })
    }
}

/// Values of a [`DataArray`]
#[derive(Debug, Clone)]
pub enum ArrayData {
    Eager(ArrayD<f64>),
    Deferred(LazyArray),
}

impl ArrayData {
    pub fn shape(&self) -> Vec<usize> {
        match self {
            ArrayData::Eager(values) => values.shape().to_vec(),
            ArrayData::Deferred(lazy) => lazy.shape().to_vec(),
        }
    }

    pub fn ndim(&self) -> usize {
        match self {
            ArrayData::Eager(values) => values.ndim(),
            ArrayData::Deferred(lazy) => lazy.ndim(),
        }
    }

    pub fn is_lazy(&self) -> bool {
        matches!(self, ArrayData::Deferred(_))
    }

    /// Materialize the values
    pub fn compute(&self) -> Result<ArrayD<f64>> {
        match self {
            ArrayData::Eager(values) => Ok(values.clone()),
            ArrayData::Deferred(lazy) => lazy.compute(),
        }
    }

    /// Deferred view of the values, chunked along `chunk_axis` when eager
    pub fn to_lazy(&self, chunk_axis: usize, chunk_len: usize) -> Result<LazyArray> {
        match self {
            ArrayData::Eager(values) => {
                LazyArray::from_shared(Arc::new(values.clone()), chunk_axis, chunk_len)
            }
            ArrayData::Deferred(lazy) => Ok(lazy.clone()),
        }
    }

    /// Select `index` along `axis`; deferred data stays deferred
    pub fn index_axis(&self, axis: usize, index: usize) -> Result<ArrayData> {
        match self {
            ArrayData::Eager(values) => {
                if axis >= values.ndim() || index >= values.len_of(Axis(axis)) {
                    return Err(UmRegridError::Generic(format!(
                        "Index {index} along axis {axis} is out of bounds for shape {:?}",
                        values.shape()
                    )));
                }
                Ok(ArrayData::Eager(values.index_axis(Axis(axis), index).to_owned()))
            }
            ArrayData::Deferred(lazy) => Ok(ArrayData::Deferred(lazy.index_axis(axis, index)?)),
        }
    }
}

impl From<ArrayD<f64>> for ArrayData {
    fn from(values: ArrayD<f64>) -> Self {
        ArrayData::Eager(values)
    }
}

impl From<LazyArray> for ArrayData {
    fn from(lazy: LazyArray) -> Self {
        ArrayData::Deferred(lazy)
    }
}

/// N-dimensional labelled array
#[derive(Debug, Clone)]
pub struct DataArray {
    pub name: Option<String>,
    pub dims: Vec<String>,
    pub data: ArrayData,
    pub coords: Vec<Coordinate>,
    pub attrs: Attributes,
}

impl DataArray {
    /// Build an array from dimension names and data, checking they agree
    pub fn new(
        dims: impl IntoIterator<Item = impl Into<String>>,
        data: impl Into<ArrayData>,
    ) -> Result<Self> {
        let dims: Vec<String> = dims.into_iter().map(Into::into).collect();
        let data = data.into();

        if dims.len() != data.ndim() {
            return Err(UmRegridError::Generic(format!(
                "{} dimension names given for data of shape {:?}",
                dims.len(),
                data.shape()
            )));
        }
        for (i, dim) in dims.iter().enumerate() {
            if dims[..i].contains(dim) {
                return Err(UmRegridError::Generic(format!("Dimension '{dim}' repeated")));
            }
        }

        Ok(Self {
            name: None,
            dims,
            data,
            coords: Vec::new(),
            attrs: Attributes::new(),
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    /// Attach a coordinate, replacing any coordinate of the same name
    pub fn with_coord(mut self, coord: Coordinate) -> Result<Self> {
        self.set_coord(coord)?;
        Ok(self)
    }

    pub fn set_coord(&mut self, coord: Coordinate) -> Result<()> {
        let shape = self.shape();
        let coord_shape = coord.shape();
        if coord.dims.len() != coord_shape.len() {
            return Err(UmRegridError::Generic(format!(
                "Coordinate '{}' has {} dimension names for shape {:?}",
                coord.name,
                coord.dims.len(),
                coord_shape
            )));
        }
        for (dim, len) in coord.dims.iter().zip(&coord_shape) {
            let axis = self.dim_index(dim).ok_or_else(|| UmRegridError::DimensionNotFound {
                var: self.label().to_string(),
                dim: dim.clone(),
            })?;
            if shape[axis] != *len {
                return Err(UmRegridError::Generic(format!(
                    "Coordinate '{}' has length {} along '{}', array has {}",
                    coord.name, len, dim, shape[axis]
                )));
            }
        }

        self.coords.retain(|c| c.name != coord.name);
        self.coords.push(coord);
        Ok(())
    }

    /// Name for messages
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }

    pub fn shape(&self) -> Vec<usize> {
        self.data.shape()
    }

    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    pub fn is_lazy(&self) -> bool {
        self.data.is_lazy()
    }

    pub fn dim_index(&self, dim: &str) -> Option<usize> {
        self.dims.iter().position(|d| d == dim)
    }

    pub fn dim_len(&self, dim: &str) -> Option<usize> {
        self.dim_index(dim).map(|axis| self.shape()[axis])
    }

    pub fn coord(&self, name: &str) -> Option<&Coordinate> {
        self.coords.iter().find(|c| c.name == name)
    }

    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).and_then(Value::as_str)
    }

    /// Materialized values, leaving `self` untouched
    pub fn values(&self) -> Result<ArrayD<f64>> {
        self.data.compute()
    }

    /// An eager copy of this array
    pub fn compute(&self) -> Result<DataArray> {
        Ok(DataArray {
            data: ArrayData::Eager(self.values()?),
            ..self.clone()
        })
    }

    /// A deferred copy of this array, chunked along `dim`
    pub fn chunk(&self, dim: &str, chunk_len: usize) -> Result<DataArray> {
        let axis = self.dim_index(dim).ok_or_else(|| UmRegridError::DimensionNotFound {
            var: self.label().to_string(),
            dim: dim.to_string(),
        })?;
        let values = self.values()?;
        Ok(DataArray {
            data: ArrayData::Deferred(LazyArray::from_array(values, axis, chunk_len)?),
            ..self.clone()
        })
    }

    /// Select `index` along `dim`, dropping the dimension
    ///
    /// Coordinates that only span `dim` are dropped; multi-dimensional ones are sliced.
    pub fn isel(&self, dim: &str, index: usize) -> Result<DataArray> {
        let axis = self.dim_index(dim).ok_or_else(|| UmRegridError::DimensionNotFound {
            var: self.label().to_string(),
            dim: dim.to_string(),
        })?;

        let mut dims = self.dims.clone();
        dims.remove(axis);

        Ok(DataArray {
            name: self.name.clone(),
            dims,
            data: self.data.index_axis(axis, index)?,
            coords: self
                .coords
                .iter()
                .filter_map(|c| c.select(dim, index))
                .collect(),
            attrs: self.attrs.clone(),
        })
    }
}

/// Ordered collection of named [`DataArray`]s
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    variables: Vec<DataArray>,
    pub attrs: Attributes,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `array` under `name`, replacing an existing variable of that name
    pub fn insert(&mut self, name: impl Into<String>, array: DataArray) {
        let name = name.into();
        let array = array.with_name(name.clone());
        match self
            .variables
            .iter_mut()
            .find(|v| v.name.as_deref() == Some(name.as_str()))
        {
            Some(slot) => *slot = array,
            None => self.variables.push(array),
        }
    }

    pub fn with_variable(mut self, name: impl Into<String>, array: DataArray) -> Self {
        self.insert(name, array);
        self
    }

    pub fn get(&self, name: &str) -> Option<&DataArray> {
        self.variables
            .iter()
            .find(|v| v.name.as_deref() == Some(name))
    }

    /// Like [`Dataset::get`] but missing variables are an error
    pub fn variable(&self, name: &str) -> Result<&DataArray> {
        self.get(name).ok_or_else(|| UmRegridError::VariableNotFound {
            var: name.to_string(),
        })
    }

    pub fn names(&self) -> Vec<&str> {
        self.variables
            .iter()
            .filter_map(|v| v.name.as_deref())
            .collect()
    }

    pub fn variables(&self) -> impl Iterator<Item = &DataArray> {
        self.variables.iter()
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}
