//! Surface ancillary records
//!
//! [`create_surface_ancillary`] turns a dataset of `(time, lat, lon)` fields
//! into an [`AncilFile`]: one shared header plus one [`Field`] per variable
//! and timestep. Writing the legacy binary format is left to an
//! [`AncilSink`]; field data stays deferred until the sink asks for it.

use crate::array::{DataArray, Dataset};
use crate::dimension::{identify_lat_lon, identify_time};
use crate::errors::{Result, UmRegridError};
use crate::lazy::LazyArray;
use chrono::{Datelike, Duration, NaiveDateTime, Timelike};
use ndarray::{Array2, Ix2};
use tracing::{debug, info};

/// Missing data indicator written in place of invalid cells
pub const MDI: f64 = -1073741824.0;

/// A calendar date and time as stored in UM headers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct UmTime {
    pub year: i32,
    pub month: i32,
    pub day: i32,
    pub hour: i32,
    pub minute: i32,
    pub second: i32,
}

impl From<NaiveDateTime> for UmTime {
    fn from(t: NaiveDateTime) -> Self {
        Self {
            year: t.year(),
            month: t.month() as i32,
            day: t.day() as i32,
            hour: t.hour() as i32,
            minute: t.minute() as i32,
            second: t.second() as i32,
        }
    }
}

/// File-level header
#[derive(Debug, Clone, PartialEq)]
pub struct FixedLengthHeader {
    pub sub_model: i32,
    pub dataset_type: i32,
    pub horiz_grid_type: i32,
    pub calendar: i32,
    pub grid_staggering: i32,
    pub time_type: i32,
    pub model_version: i32,
    /// First validity time
    pub t1: UmTime,
    /// Last validity time
    pub t2: UmTime,
    /// Interval between fields; year and month are unused
    pub t3: UmTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntegerConstants {
    pub num_times: i32,
    pub num_cols: i32,
    pub num_rows: i32,
    pub num_levels: i32,
    pub num_field_types: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RealConstants {
    pub start_lat: f64,
    pub row_spacing: f64,
    pub start_lon: f64,
    pub col_spacing: f64,
    pub north_pole_lat: f64,
    pub north_pole_lon: f64,
}

/// Deferred 2-D field values in `(rows, cols)` order
#[derive(Debug, Clone)]
pub struct FieldData {
    lazy: LazyArray,
}

impl FieldData {
    pub fn new(lazy: LazyArray) -> Result<Self> {
        if lazy.ndim() != 2 {
            return Err(UmRegridError::AncillaryError(format!(
                "Field data must be 2-D, got shape {:?}",
                lazy.shape()
            )));
        }
        Ok(Self { lazy })
    }

    pub fn shape(&self) -> (usize, usize) {
        let shape = self.lazy.shape();
        (shape[0], shape[1])
    }

    /// Materialize as 4-byte floats with non-finite values replaced by [`MDI`]
    pub fn values(&self) -> Result<Array2<f32>> {
        let values = self.lazy.compute()?.into_dimensionality::<Ix2>()?;
        Ok(values.mapv(|v| if v.is_finite() { v as f32 } else { MDI as f32 }))
    }
}

/// One field record: a single variable at a single time
#[derive(Debug, Clone)]
pub struct Field {
    pub lbyr: i32,
    pub lbmon: i32,
    pub lbdat: i32,
    pub lbhr: i32,
    pub lbmin: i32,
    pub lbsec: i32,
    pub lbtime: i32,
    pub lbcode: i32,
    pub lbhem: i32,
    pub lbrow: i32,
    pub lbnpt: i32,
    pub lbpack: i32,
    pub lbrel: i32,
    pub lbvc: i32,
    pub lbuser1: i32,
    /// STASH code
    pub lbuser4: i32,
    pub lbuser7: i32,
    pub bplat: f64,
    pub bplon: f64,
    pub bdx: f64,
    pub bdy: f64,
    pub bzx: f64,
    pub bzy: f64,
    pub bmdi: f64,
    pub bmks: f64,
    pub data: FieldData,
}

impl Field {
    pub fn validity_time(&self) -> UmTime {
        UmTime {
            year: self.lbyr,
            month: self.lbmon,
            day: self.lbdat,
            hour: self.lbhr,
            minute: self.lbmin,
            second: self.lbsec,
        }
    }
}

/// A complete ancillary file ready for serialization
#[derive(Debug, Clone)]
pub struct AncilFile {
    pub fixed_length_header: FixedLengthHeader,
    pub integer_constants: IntegerConstants,
    pub real_constants: RealConstants,
    pub fields: Vec<Field>,
}

/// Destination for ancillary files, such as a binary fieldsfile writer
pub trait AncilSink {
    fn write_header(&mut self, file: &AncilFile) -> Result<()>;

    fn write_field(&mut self, field: &Field, data: &Array2<f32>) -> Result<()>;

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

impl AncilFile {
    /// Check that headers and fields agree with each other
    pub fn validate(&self) -> Result<()> {
        let ic = &self.integer_constants;
        let expected = (ic.num_times * ic.num_field_types) as usize;
        if self.fields.len() != expected {
            return Err(UmRegridError::AncillaryError(format!(
                "{} fields present, header declares {} times x {} field types",
                self.fields.len(),
                ic.num_times,
                ic.num_field_types
            )));
        }

        let header = &self.fixed_length_header;
        if header.t1 > header.t2 {
            return Err(UmRegridError::AncillaryError(
                "First validity time is after the last".to_string(),
            ));
        }

        for (k, field) in self.fields.iter().enumerate() {
            if field.lbrow != ic.num_rows || field.lbnpt != ic.num_cols {
                return Err(UmRegridError::AncillaryError(format!(
                    "Field {k} is {}x{}, header declares {}x{}",
                    field.lbrow, field.lbnpt, ic.num_rows, ic.num_cols
                )));
            }
            if field.data.shape() != (ic.num_rows as usize, ic.num_cols as usize) {
                return Err(UmRegridError::AncillaryError(format!(
                    "Field {k} data has shape {:?}",
                    field.data.shape()
                )));
            }
            if field.bmdi != MDI {
                return Err(UmRegridError::AncillaryError(format!(
                    "Field {k} has missing data indicator {}",
                    field.bmdi
                )));
            }
            let t = field.validity_time();
            if t < header.t1 || t > header.t2 {
                return Err(UmRegridError::AncillaryError(format!(
                    "Field {k} validity time is outside the file's time range"
                )));
            }
        }
        Ok(())
    }

    /// Validate, then stream header and fields to `sink`, one field in memory at a time
    pub fn write_to(&self, sink: &mut dyn AncilSink) -> Result<()> {
        self.validate()?;
        sink.write_header(self)?;
        for field in &self.fields {
            let data = field.data.values()?;
            sink.write_field(field, &data)?;
        }
        sink.finish()
    }
}

/// The constant interval between `times`
///
/// Needs at least two steps, a positive interval and no more than one per day.
fn update_interval(times: &[NaiveDateTime]) -> Result<Duration> {
    if times.len() < 2 {
        return Err(UmRegridError::AncillaryError(format!(
            "Need at least two timesteps to determine the update interval, got {}",
            times.len()
        )));
    }

    let step = times[1] - times[0];
    if step <= Duration::zero() {
        return Err(UmRegridError::AncillaryError(
            "Timesteps must be strictly increasing".to_string(),
        ));
    }
    if let Some(k) = (1..times.len()).find(|&k| times[k] - times[k - 1] != step) {
        return Err(UmRegridError::AncillaryError(format!(
            "Timesteps are unevenly spaced: {} to {} differs from the first interval",
            times[k - 1],
            times[k]
        )));
    }
    if step > Duration::days(1) {
        return Err(UmRegridError::AncillaryError(format!(
            "Update interval of {} seconds is longer than one day",
            step.num_seconds()
        )));
    }
    Ok(step)
}

/// 1-D coordinate values and their spacing, which must be uniform
fn axis_spacing(array: &DataArray, name: &str, values: &ndarray::ArrayD<f64>) -> Result<(Vec<f64>, f64)> {
    if values.ndim() != 1 || values.len() < 2 {
        return Err(UmRegridError::AncillaryError(format!(
            "Coordinate '{name}' of '{}' must be 1-D with at least two points",
            array.label()
        )));
    }
    let values: Vec<f64> = values.iter().copied().collect();
    let spacing = values[1] - values[0];
    if values
        .windows(2)
        .any(|w| ((w[1] - w[0]) - spacing).abs() > 1e-6 * spacing.abs().max(1.0))
    {
        return Err(UmRegridError::AncillaryError(format!(
            "Coordinate '{name}' of '{}' is not regularly spaced",
            array.label()
        )));
    }
    Ok((values, spacing))
}

/// One timestep `slice` as a 2-D field in `(lat, lon)` order
fn field_data(slice: LazyArray, time_axis: usize, lat_axis: usize) -> Result<FieldData> {
    let lat_pos = if lat_axis > time_axis { lat_axis - 1 } else { lat_axis };
    if lat_pos == 0 {
        return FieldData::new(slice);
    }
    let shape = slice.shape();
    let out_shape = vec![shape[1], shape[0]];
    let swapped = slice.map_whole(out_shape, 0, |block| {
        Ok(block.reversed_axes().as_standard_layout().into_owned())
    })?;
    FieldData::new(swapped)
}

/// Build an ancillary file from `(time, lat, lon)` variables
///
/// `stash_map` pairs variable names with STASH codes; fields are emitted in
/// that order, each variable for every timestep in time order.
pub fn create_surface_ancillary(dataset: &Dataset, stash_map: &[(&str, i32)]) -> Result<AncilFile> {
    let Some(&(first_name, _)) = stash_map.first() else {
        return Err(UmRegridError::AncillaryError(
            "No variables requested".to_string(),
        ));
    };
    let first = dataset.variable(first_name)?;

    let time = identify_time(first)?;
    let times = time.times().ok_or_else(|| {
        UmRegridError::AncillaryError(format!(
            "Time coordinate '{}' of '{first_name}' is not decoded as calendar timestamps",
            time.name
        ))
    })?;
    let step = update_interval(times)?;

    let (lat, lon) = identify_lat_lon(first)?;
    let lat_values = lat.numeric().ok_or_else(|| UmRegridError::AncillaryError("Latitude is not numeric".into()))?;
    let lon_values = lon.numeric().ok_or_else(|| UmRegridError::AncillaryError("Longitude is not numeric".into()))?;
    let (lats, dlat) = axis_spacing(first, &lat.name, lat_values)?;
    let (lons, dlon) = axis_spacing(first, &lon.name, lon_values)?;

    let (first_time, last_time) = (times[0], times[times.len() - 1]);
    let interval = step.num_seconds();
    let fixed_length_header = FixedLengthHeader {
        sub_model: 1,
        dataset_type: 4,
        horiz_grid_type: 0,
        calendar: 1,
        grid_staggering: 6,
        time_type: 1,
        model_version: 1006,
        t1: first_time.into(),
        t2: last_time.into(),
        t3: UmTime {
            day: (interval / 86400) as i32,
            hour: (interval % 86400 / 3600) as i32,
            minute: (interval % 3600 / 60) as i32,
            second: (interval % 60) as i32,
            ..UmTime::default()
        },
    };

    let integer_constants = IntegerConstants {
        num_times: times.len() as i32,
        num_cols: lons.len() as i32,
        num_rows: lats.len() as i32,
        num_levels: 1,
        num_field_types: stash_map.len() as i32,
    };

    let real_constants = RealConstants {
        start_lat: lats[0],
        row_spacing: dlat,
        start_lon: lons[0],
        col_spacing: dlon,
        north_pole_lat: 90.0,
        north_pole_lon: 0.0,
    };

    let mut fields = Vec::with_capacity(stash_map.len() * times.len());
    for &(name, stash) in stash_map {
        let array = dataset.variable(name)?;
        let shape_error = || {
            UmRegridError::AncillaryError(format!(
                "Variable '{name}' must have exactly dimensions ({}, {}, {}), found {:?}",
                time.dims[0], lat.dims[0], lon.dims[0], array.dims
            ))
        };
        if array.ndim() != 3 {
            return Err(shape_error());
        }
        let time_axis = array.dim_index(&time.dims[0]).ok_or_else(shape_error)?;
        let lat_axis = array.dim_index(&lat.dims[0]).ok_or_else(shape_error)?;
        array.dim_index(&lon.dims[0]).ok_or_else(shape_error)?;

        let array_times = identify_time(array)?.times();
        if array_times != Some(times) {
            return Err(UmRegridError::AncillaryError(format!(
                "Variable '{name}' does not share the time axis of '{first_name}'"
            )));
        }
        if array.dim_len(&lat.dims[0]) != Some(lats.len()) || array.dim_len(&lon.dims[0]) != Some(lons.len()) {
            return Err(shape_error());
        }

        let slices = array.data.to_lazy(time_axis, 1)?.unstack(time_axis)?;
        for (t, (when, slice)) in times.iter().zip(slices).enumerate() {
            let when = UmTime::from(*when);
            debug!(var = name, stash, time = t, "adding field");
            fields.push(Field {
                lbyr: when.year,
                lbmon: when.month,
                lbdat: when.day,
                lbhr: when.hour,
                lbmin: when.minute,
                lbsec: when.second,
                lbtime: 1,
                lbcode: 1,
                lbhem: 0,
                lbrow: lats.len() as i32,
                lbnpt: lons.len() as i32,
                lbpack: 0,
                lbrel: 3,
                lbvc: 129,
                lbuser1: 1,
                lbuser4: stash,
                lbuser7: 1,
                bplat: 90.0,
                bplon: 0.0,
                bdx: dlon,
                bdy: dlat,
                bzx: lons[0] - dlon,
                bzy: lats[0] - dlat,
                bmdi: MDI,
                bmks: 1.0,
                data: field_data(slice, time_axis, lat_axis)?,
            });
        }
    }

    let file = AncilFile {
        fixed_length_header,
        integer_constants,
        real_constants,
        fields,
    };
    file.validate()?;
    info!(
        fields = file.fields.len(),
        times = times.len(),
        interval_seconds = interval,
        "built surface ancillary"
    );
    Ok(file)
}
