//! NetCDF I/O for labelled arrays
//!
//! Reading applies CF decoding: `_FillValue`/`missing_value` become NaN,
//! packed values are unpacked with `scale_factor`/`add_offset`, and time
//! coordinates with `<unit> since <date>` units become timestamps. Writing
//! reverses the time encoding and stores NaN as the fill value.

use crate::array::{ArrayData, Attributes, CoordValues, Coordinate, DataArray, Dataset};
use crate::dimension::{decode_cf_time, encode_cf_time};
use crate::errors::{Result, UmRegridError};
use crate::lazy::{LazyArray, LazyChunk};
use chrono::Utc;
use ndarray::{ArrayD, Axis, Slice};
use netcdf::{AttributeValue, Extent};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Fill value written for NaN cells
pub const FILL_VALUE: f64 = 1.0e20;

/// Attributes consumed by CF decoding and not carried on the decoded array
const DECODING_ATTRS: &[&str] = &["_FillValue", "missing_value", "scale_factor", "add_offset"];

const STANDARD_CALENDARS: &[&str] = &["standard", "gregorian", "proleptic_gregorian"];

/// CF packing and fill parameters of one variable
#[derive(Debug, Clone, Copy)]
struct Decoding {
    fill: Option<f64>,
    missing: Option<f64>,
    scale: f64,
    offset: f64,
}

impl Decoding {
    fn of(var: &netcdf::Variable<'_>) -> Self {
        Self {
            fill: attr_f64(var, "_FillValue"),
            missing: attr_f64(var, "missing_value"),
            scale: attr_f64(var, "scale_factor").unwrap_or(1.0),
            offset: attr_f64(var, "add_offset").unwrap_or(0.0),
        }
    }

    fn apply(&self, raw: Vec<f64>) -> Vec<f64> {
        raw.into_iter()
            .map(|v| {
                if Some(v) == self.fill || Some(v) == self.missing {
                    f64::NAN
                } else {
                    v * self.scale + self.offset
                }
            })
            .collect()
    }
}

fn attr_f64(var: &netcdf::Variable<'_>, name: &str) -> Option<f64> {
    match var.attribute(name)?.value().ok()? {
        AttributeValue::Double(v) => Some(v),
        AttributeValue::Float(v) => Some(v as f64),
        AttributeValue::Int(v) => Some(v as f64),
        AttributeValue::Short(v) => Some(v as f64),
        AttributeValue::Schar(v) => Some(v as f64),
        AttributeValue::Uchar(v) => Some(v as f64),
        AttributeValue::Ushort(v) => Some(v as f64),
        AttributeValue::Uint(v) => Some(v as f64),
        AttributeValue::Longlong(v) => Some(v as f64),
        AttributeValue::Doubles(v) => v.first().copied(),
        AttributeValue::Floats(v) => v.first().map(|&x| x as f64),
        _ => None,
    }
}

fn attribute_to_json(value: AttributeValue) -> Option<Value> {
    Some(match value {
        AttributeValue::Str(v) => Value::from(v),
        AttributeValue::Strs(v) => Value::from(v),
        AttributeValue::Double(v) => Value::from(v),
        AttributeValue::Doubles(v) => Value::from(v),
        AttributeValue::Float(v) => Value::from(v),
        AttributeValue::Floats(v) => Value::from(v),
        AttributeValue::Int(v) => Value::from(v),
        AttributeValue::Ints(v) => Value::from(v),
        AttributeValue::Short(v) => Value::from(v),
        AttributeValue::Shorts(v) => Value::from(v),
        AttributeValue::Longlong(v) => Value::from(v),
        AttributeValue::Longlongs(v) => Value::from(v),
        AttributeValue::Schar(v) => Value::from(v),
        AttributeValue::Uchar(v) => Value::from(v),
        AttributeValue::Ushort(v) => Value::from(v),
        AttributeValue::Uint(v) => Value::from(v),
        _ => return None,
    })
}

fn json_to_attribute(value: &Value) -> Option<AttributeValue> {
    match value {
        Value::String(s) => Some(AttributeValue::Str(s.clone())),
        Value::Bool(b) => Some(AttributeValue::Int(i32::from(*b))),
        Value::Number(n) => match n.as_i64() {
            Some(i) if i32::try_from(i).is_ok() => Some(AttributeValue::Int(i as i32)),
            Some(i) => Some(AttributeValue::Longlong(i)),
            None => n.as_f64().map(AttributeValue::Double),
        },
        Value::Array(items) if items.iter().all(Value::is_string) => Some(AttributeValue::Strs(
            items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect(),
        )),
        Value::Array(items) if items.iter().all(Value::is_number) => Some(AttributeValue::Doubles(
            items.iter().filter_map(Value::as_f64).collect(),
        )),
        _ => None,
    }
}

fn read_attributes(var: &netcdf::Variable<'_>) -> Attributes {
    let mut attrs = BTreeMap::new();
    for attr in var.attributes() {
        if DECODING_ATTRS.contains(&attr.name()) {
            continue;
        }
        match attr.value().ok().and_then(attribute_to_json) {
            Some(value) => {
                attrs.insert(attr.name().to_string(), value);
            }
            None => debug!(attr = attr.name(), "skipped attribute of unsupported type"),
        }
    }
    attrs
}

fn put_attributes(var: &mut netcdf::VariableMut<'_>, attrs: &Attributes) -> Result<()> {
    for (name, value) in attrs {
        if name == "_FillValue" {
            continue;
        }
        match json_to_attribute(value) {
            Some(attr) => {
                var.put_attribute(name, attr)?;
            }
            None => warn!(attr = %name, "skipped attribute with no NetCDF representation"),
        }
    }
    Ok(())
}

fn dims_and_shape(var: &netcdf::Variable<'_>) -> (Vec<String>, Vec<usize>) {
    var.dimensions().iter().map(|d| (d.name(), d.len())).unzip()
}

fn required<'f>(file: &'f netcdf::File, name: &str) -> Result<netcdf::Variable<'f>> {
    file.variable(name).ok_or_else(|| UmRegridError::VariableNotFound {
        var: name.to_string(),
    })
}

fn read_decoded(var: &netcdf::Variable<'_>) -> Result<ArrayD<f64>> {
    let (_, shape) = dims_and_shape(var);
    let raw = var.get_values::<f64, _>(..)?;
    Ok(ArrayD::from_shape_vec(shape, Decoding::of(var).apply(raw))?)
}

/// Read a coordinate variable with its bounds, decoding CF time
fn read_coordinate(file: &netcdf::File, name: &str) -> Result<Coordinate> {
    let var = required(file, name)?;
    let (dims, _) = dims_and_shape(&var);
    let values = read_decoded(&var)?;
    let mut attrs = read_attributes(&var);

    let units = attrs.get("units").and_then(Value::as_str).map(str::to_string);
    let calendar = attrs
        .get("calendar")
        .and_then(Value::as_str)
        .unwrap_or("standard")
        .to_ascii_lowercase();

    let mut coord = Coordinate::new(name, dims, values.clone());
    if let Some(units) = units.filter(|u| u.contains(" since ")) {
        if !STANDARD_CALENDARS.contains(&calendar.as_str()) {
            warn!(coord = name, %calendar, "non-standard calendar, time left undecoded");
        } else if values.ndim() == 1 {
            let raw: Vec<f64> = values.iter().copied().collect();
            let times = decode_cf_time(&raw, &units)?;
            attrs.remove("units");
            attrs.remove("calendar");
            coord.values = CoordValues::Time(times);
        }
    }
    coord.attrs = attrs;

    if let Some(bounds_name) = coord.attr_str("bounds").map(str::to_string) {
        match file.variable(&bounds_name) {
            Some(bounds) => coord.bounds = Some(read_decoded(&bounds)?),
            None => warn!(coord = name, bounds = %bounds_name, "bounds variable missing"),
        }
    }
    Ok(coord)
}

/// Names of coordinate variables attached to `var`
fn coordinate_names(file: &netcdf::File, var: &netcdf::Variable<'_>) -> Vec<String> {
    let (dims, _) = dims_and_shape(var);
    let mut names: Vec<String> = dims
        .iter()
        .filter(|d| {
            file.variable(d)
                .is_some_and(|c| c.dimensions().len() == 1 && c.dimensions()[0].name() == **d)
        })
        .cloned()
        .collect();

    let listed = var
        .attribute("coordinates")
        .and_then(|a| a.value().ok())
        .and_then(|v| match v {
            AttributeValue::Str(s) => Some(s),
            _ => None,
        })
        .unwrap_or_default();
    for name in listed.split_whitespace() {
        let fits = file
            .variable(name)
            .is_some_and(|c| c.dimensions().iter().all(|d| dims.contains(&d.name())));
        if fits && !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

fn attach_coordinates(file: &netcdf::File, var: &netcdf::Variable<'_>, mut array: DataArray) -> Result<DataArray> {
    for name in coordinate_names(file, var) {
        array.set_coord(read_coordinate(file, &name)?)?;
    }
    Ok(array)
}

/// Read variable `name` of a NetCDF file into memory
pub fn open_dataarray(path: impl AsRef<Path>, name: &str) -> Result<DataArray> {
    let file = netcdf::open(path.as_ref())?;
    let var = required(&file, name)?;
    let (dims, _) = dims_and_shape(&var);

    let mut array = DataArray::new(dims, read_decoded(&var)?)?.with_name(name);
    array.attrs = read_attributes(&var);
    attach_coordinates(&file, &var, array)
}

fn read_hyperslab(
    path: &Path,
    name: &str,
    shape: &[usize],
    axis: usize,
    start: usize,
    len: usize,
    decoding: Decoding,
) -> Result<ArrayD<f64>> {
    let file = netcdf::open(path)?;
    let var = required(&file, name)?;
    let extents: Vec<Extent> = shape
        .iter()
        .enumerate()
        .map(|(k, &n)| if k == axis { (start..start + len).into() } else { (0..n).into() })
        .collect();
    let raw = var.get_values::<f64, _>(extents)?;

    let mut chunk_shape = shape.to_vec();
    chunk_shape[axis] = len;
    Ok(ArrayD::from_shape_vec(chunk_shape, decoding.apply(raw))?)
}

/// Open variable `name` without reading its values
///
/// Values are split into chunks of `chunk_len` along `chunk_dim`; each chunk
/// reopens the file and reads only its own hyperslab when computed.
/// Coordinates are read eagerly.
pub fn open_dataarray_lazy(
    path: impl AsRef<Path>,
    name: &str,
    chunk_dim: &str,
    chunk_len: usize,
) -> Result<DataArray> {
    let path: PathBuf = path.as_ref().to_path_buf();
    let file = netcdf::open(&path)?;
    let var = required(&file, name)?;
    let (dims, shape) = dims_and_shape(&var);
    let decoding = Decoding::of(&var);

    let axis = dims
        .iter()
        .position(|d| d == chunk_dim)
        .ok_or_else(|| UmRegridError::DimensionNotFound {
            var: name.to_string(),
            dim: chunk_dim.to_string(),
        })?;
    if chunk_len == 0 {
        return Err(UmRegridError::Generic("Chunk length must be positive".to_string()));
    }

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < shape[axis] {
        let len = chunk_len.min(shape[axis] - start);
        let (path, name, shape) = (path.clone(), name.to_string(), shape.clone());
        chunks.push(LazyChunk::new(len, move || {
            read_hyperslab(&path, &name, &shape, axis, start, len, decoding)
        }));
        start += len;
    }
    let lazy = LazyArray::from_chunks(shape, axis, chunks)?;

    let mut array = DataArray::new(dims, lazy)?.with_name(name);
    array.attrs = read_attributes(&var);
    debug!(var = name, chunk_dim, chunk_len, "opened lazily");
    attach_coordinates(&file, &var, array)
}

/// Join per-file pieces of the coordinate along `dim`
fn concat_coordinates(dim: &str, parts: Vec<Coordinate>) -> Result<Coordinate> {
    let mut parts = parts.into_iter();
    let mut joined = parts
        .next()
        .ok_or_else(|| UmRegridError::Generic(format!("No pieces of coordinate '{dim}' to join")))?;
    for part in parts {
        joined.values = match (joined.values, part.values) {
            (CoordValues::Time(mut times), CoordValues::Time(more)) => {
                times.extend(more);
                CoordValues::Time(times)
            }
            (CoordValues::Numeric(a), CoordValues::Numeric(b)) => {
                CoordValues::Numeric(ndarray::concatenate(Axis(0), &[a.view(), b.view()])?)
            }
            _ => {
                return Err(UmRegridError::Generic(format!(
                    "Coordinate '{dim}' is decoded as times in some files and numbers in others"
                )))
            }
        };
        joined.bounds = match (joined.bounds, part.bounds) {
            (Some(a), Some(b)) => Some(ndarray::concatenate(Axis(0), &[a.view(), b.view()])?),
            _ => None,
        };
    }
    Ok(joined)
}

/// Open variable `name` across a series of files, joined along `concat_dim`
///
/// Files are taken in the order given and each is split into chunks of
/// `chunk_len` along `concat_dim`; nothing beyond metadata and the joined
/// coordinate is read until the array is computed. Only the shapes are checked
/// for consistency, coordinates other than `concat_dim` come from the first file.
pub fn open_mfdataarray_lazy<P: AsRef<Path>>(
    paths: &[P],
    name: &str,
    concat_dim: &str,
    chunk_len: usize,
) -> Result<DataArray> {
    if paths.is_empty() {
        return Err(UmRegridError::Generic(format!("No files given for '{name}'")));
    }
    if chunk_len == 0 {
        return Err(UmRegridError::Generic("Chunk length must be positive".to_string()));
    }

    let mut layout: Option<(Vec<String>, Vec<usize>, usize)> = None;
    let mut chunks = Vec::new();
    let mut pieces = Vec::new();
    let mut total = 0;

    for path in paths {
        let path: PathBuf = path.as_ref().to_path_buf();
        let file = netcdf::open(&path)?;
        let var = required(&file, name)?;
        let (dims, shape) = dims_and_shape(&var);
        let axis = dims
            .iter()
            .position(|d| d == concat_dim)
            .ok_or_else(|| UmRegridError::DimensionNotFound {
                var: name.to_string(),
                dim: concat_dim.to_string(),
            })?;

        if let Some((first_dims, first_shape, _)) = layout.as_ref() {
            let other = |s: &[usize]| -> Vec<usize> {
                s.iter().enumerate().filter(|&(k, _)| k != axis).map(|(_, &n)| n).collect()
            };
            if *first_dims != dims || other(first_shape.as_slice()) != other(shape.as_slice()) {
                return Err(UmRegridError::Generic(format!(
                    "'{name}' in {} has dimensions {dims:?} {shape:?}, expected {first_dims:?} {first_shape:?}",
                    path.display()
                )));
            }
        }
        if layout.is_none() {
            layout = Some((dims.clone(), shape.clone(), axis));
        }

        let decoding = Decoding::of(&var);
        let mut start = 0;
        while start < shape[axis] {
            let len = chunk_len.min(shape[axis] - start);
            let (path, name, shape) = (path.clone(), name.to_string(), shape.clone());
            chunks.push(LazyChunk::new(len, move || {
                read_hyperslab(&path, &name, &shape, axis, start, len, decoding)
            }));
            start += len;
        }
        total += shape[axis];

        if file.variable(concat_dim).is_some() {
            pieces.push(read_coordinate(&file, concat_dim)?);
        }
    }

    let Some((dims, mut shape, axis)) = layout else {
        return Err(UmRegridError::Generic(format!("No files given for '{name}'")));
    };
    shape[axis] = total;
    let lazy = LazyArray::from_chunks(shape, axis, chunks)?;

    let first = netcdf::open(paths[0].as_ref())?;
    let var = required(&first, name)?;
    let mut array = DataArray::new(dims, lazy)?.with_name(name);
    array.attrs = read_attributes(&var);
    for coord_name in coordinate_names(&first, &var) {
        let coord = read_coordinate(&first, &coord_name)?;
        if !coord.dims.iter().any(|d| d == concat_dim) {
            array.set_coord(coord)?;
        }
    }
    if pieces.len() == paths.len() {
        array.set_coord(concat_coordinates(concat_dim, pieces)?)?;
    } else if !pieces.is_empty() {
        warn!(var = name, dim = concat_dim, "coordinate missing from some files, left off");
    }

    info!(var = name, files = paths.len(), length = total, "opened file series lazily");
    Ok(array)
}

/// Variables that are neither coordinates nor bounds of other variables
pub fn data_variable_names(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let file = netcdf::open(path.as_ref())?;
    let mut auxiliary: Vec<String> = Vec::new();
    for var in file.variables() {
        auxiliary.extend(coordinate_names(&file, &var));
        if let Some(AttributeValue::Str(bounds)) = var.attribute("bounds").and_then(|a| a.value().ok()) {
            auxiliary.push(bounds);
        }
    }
    Ok(file
        .variables()
        .map(|v| v.name())
        .filter(|name| !auxiliary.contains(name))
        .collect())
}

/// Read every data variable of a file into memory
pub fn open_dataset(path: impl AsRef<Path>) -> Result<Dataset> {
    let path = path.as_ref();
    let mut dataset = Dataset::new();
    for name in data_variable_names(path)? {
        let array = open_dataarray(path, &name)?;
        dataset.insert(name, array);
    }
    let file = netcdf::open(path)?;
    for attr in file.attributes() {
        if let Some(value) = attr.value().ok().and_then(attribute_to_json) {
            dataset.attrs.insert(attr.name().to_string(), value);
        }
    }
    Ok(dataset)
}

/// Writes datasets to NetCDF, one file per call
pub struct NetCDFWriter<'a> {
    output_path: &'a Path,
}

impl<'a> NetCDFWriter<'a> {
    pub fn new(output_path: &'a Path) -> Self {
        Self { output_path }
    }

    fn dimensions(dataset: &Dataset) -> Result<Vec<(String, usize)>> {
        let mut dims: Vec<(String, usize)> = Vec::new();
        for array in dataset.variables() {
            for (name, len) in array.dims.iter().zip(array.shape()) {
                match dims.iter().find(|(n, _)| n == name) {
                    Some((_, existing)) if *existing != len => {
                        return Err(UmRegridError::Generic(format!(
                            "Dimension '{name}' has length {existing} and {len} in the same dataset"
                        )));
                    }
                    Some(_) => {}
                    None => dims.push((name.clone(), len)),
                }
            }
        }
        Ok(dims)
    }

    fn write_coordinate(file: &mut netcdf::FileMut, coord: &Coordinate) -> Result<()> {
        let dims: Vec<&str> = coord.dims.iter().map(String::as_str).collect();
        let (values, time_units) = match &coord.values {
            CoordValues::Numeric(values) => (values.clone(), None),
            CoordValues::Time(times) => {
                let (values, units) = encode_cf_time(times);
                (ArrayD::from_shape_vec(vec![values.len()], values)?, Some(units))
            }
        };
        let bounds_name = coord.bounds.as_ref().map(|_| format!("{}_bnds", coord.name));

        let mut var = file.add_variable::<f64>(&coord.name, &dims)?;
        put_attributes(&mut var, &coord.attrs)?;
        if let Some(units) = time_units {
            var.put_attribute("units", units)?;
            var.put_attribute("calendar", "proleptic_gregorian")?;
        }
        if let Some(bounds_name) = &bounds_name {
            var.put_attribute("bounds", bounds_name.as_str())?;
        }
        if !values.is_empty() {
            var.put(values.view(), ..)?;
        }

        if let (Some(bounds), Some(bounds_name)) = (&coord.bounds, &bounds_name) {
            let nv = bounds.shape().last().copied().unwrap_or(2);
            let vertex_dim = format!("nv{nv}");
            if file.dimension(&vertex_dim).is_none() {
                file.add_dimension(&vertex_dim, nv)?;
            }
            let mut bounds_dims = dims.clone();
            bounds_dims.push(&vertex_dim);
            let mut var = file.add_variable::<f64>(bounds_name, &bounds_dims)?;
            if !bounds.is_empty() {
                var.put(bounds.view(), ..)?;
            }
        }
        Ok(())
    }

    fn write_variable(file: &mut netcdf::FileMut, name: &str, array: &DataArray) -> Result<()> {
        let dims: Vec<&str> = array.dims.iter().map(String::as_str).collect();
        let mut var = file.add_variable::<f64>(name, &dims)?;
        var.put_attribute("_FillValue", FILL_VALUE)?;
        put_attributes(&mut var, &array.attrs)?;

        let auxiliary: Vec<&str> = array
            .coords
            .iter()
            .filter(|c| !(c.dims.len() == 1 && c.dims[0] == c.name))
            .map(|c| c.name.as_str())
            .collect();
        if !auxiliary.is_empty() {
            var.put_attribute("coordinates", auxiliary.join(" "))?;
        }

        let fill = |block: ArrayD<f64>| block.mapv(|v| if v.is_finite() { v } else { FILL_VALUE });
        match &array.data {
            ArrayData::Eager(values) => {
                if !values.is_empty() {
                    var.put(fill(values.clone()).view(), ..)?;
                }
            }
            ArrayData::Deferred(lazy) => {
                // One chunk in memory at a time
                let axis = lazy.chunk_axis();
                let shape = lazy.shape().to_vec();
                let mut start = 0;
                for chunk in lazy.chunks() {
                    let block = fill(chunk.compute()?);
                    let extents: Vec<Extent> = shape
                        .iter()
                        .enumerate()
                        .map(|(k, &n)| {
                            if k == axis {
                                (start..start + chunk.len()).into()
                            } else {
                                (0..n).into()
                            }
                        })
                        .collect();
                    if !block.is_empty() {
                        var.put(block.view(), extents)?;
                    }
                    start += chunk.len();
                }
            }
        }
        Ok(())
    }

    /// Write every variable of `dataset`, with coordinates and global attributes
    pub fn write_dataset(&self, dataset: &Dataset) -> Result<()> {
        if self.output_path.exists() {
            fs::remove_file(self.output_path)?;
        }
        let mut file = netcdf::create(self.output_path)?;

        for (name, len) in Self::dimensions(dataset)? {
            file.add_dimension(&name, len)?;
        }

        let mut written: Vec<&str> = Vec::new();
        for array in dataset.variables() {
            for coord in &array.coords {
                if !written.contains(&coord.name.as_str()) {
                    Self::write_coordinate(&mut file, coord)?;
                    written.push(&coord.name);
                }
            }
        }

        for array in dataset.variables() {
            let name = array.name.as_deref().ok_or_else(|| {
                UmRegridError::Generic("Cannot write an unnamed variable".to_string())
            })?;
            if written.contains(&name) {
                return Err(UmRegridError::Generic(format!(
                    "Variable '{name}' clashes with a coordinate of the same name"
                )));
            }
            Self::write_variable(&mut file, name, array)?;
        }

        for (name, value) in &dataset.attrs {
            if name == "history" {
                continue;
            }
            if let Some(attr) = json_to_attribute(value) {
                file.add_attribute(name, attr)?;
            }
        }
        file.add_attribute(
            "history",
            format!("Created by um_regrid on {}", Utc::now().to_rfc3339()),
        )?;

        info!(path = %self.output_path.display(), variables = dataset.len(), "wrote dataset");
        Ok(())
    }
}

/// Write a dataset to `path`, replacing any existing file
pub fn write_dataset(dataset: &Dataset, path: impl AsRef<Path>) -> Result<()> {
    NetCDFWriter::new(path.as_ref()).write_dataset(dataset)
}

/// Write a single array to `path`; unnamed arrays are stored as `data`
pub fn write_dataarray(array: &DataArray, path: impl AsRef<Path>) -> Result<()> {
    let name = array.name.clone().unwrap_or_else(|| "data".to_string());
    let dataset = Dataset::new().with_variable(name, array.clone());
    write_dataset(&dataset, path)
}

/// Values of `array` between `start` and `end` along `dim`, as a new in-memory array
pub fn slice_dataarray(array: &DataArray, dim: &str, start: usize, end: usize) -> Result<DataArray> {
    let axis = array.dim_index(dim).ok_or_else(|| UmRegridError::DimensionNotFound {
        var: array.label().to_string(),
        dim: dim.to_string(),
    })?;
    let len = array.shape()[axis];
    if start >= end || end > len {
        return Err(UmRegridError::Generic(format!(
            "Slice {start}..{end} is out of bounds for '{dim}' of length {len}"
        )));
    }

    let values = array.values()?.slice_axis(Axis(axis), Slice::from(start..end)).to_owned();
    let mut out = DataArray::new(array.dims.clone(), values)?;
    out.name = array.name.clone();
    out.attrs = array.attrs.clone();
    for coord in &array.coords {
        let Some(k) = coord.dims.iter().position(|d| d == dim) else {
            out.set_coord(coord.clone())?;
            continue;
        };
        let mut sliced = coord.clone();
        sliced.values = match &coord.values {
            CoordValues::Numeric(v) => {
                CoordValues::Numeric(v.slice_axis(Axis(k), Slice::from(start..end)).to_owned())
            }
            CoordValues::Time(t) => CoordValues::Time(t[start..end].to_vec()),
        };
        sliced.bounds = coord
            .bounds
            .as_ref()
            .map(|b| b.slice_axis(Axis(k), Slice::from(start..end)).to_owned());
        out.set_coord(sliced)?;
    }
    Ok(out)
}
