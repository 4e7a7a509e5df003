//! Coordinate helpers: unit recognition, degenerate axes and CF time

use crate::array::{Coordinate, DataArray};
use crate::errors::{Result, UmRegridError};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use ndarray::{Array1, ArrayD, Axis};

/// CF unit spellings for latitude
pub const LATITUDE_UNITS: &[&str] = &[
    "degrees_north",
    "degree_north",
    "degree_N",
    "degrees_N",
    "degreeN",
    "degreesN",
];

/// CF unit spellings for longitude
pub const LONGITUDE_UNITS: &[&str] = &[
    "degrees_east",
    "degree_east",
    "degree_E",
    "degrees_E",
    "degreeE",
    "degreesE",
];

pub fn is_latitude_units(units: &str) -> bool {
    LATITUDE_UNITS.contains(&units.trim())
}

pub fn is_longitude_units(units: &str) -> bool {
    LONGITUDE_UNITS.contains(&units.trim())
}

/// Collapse axes along which the values do not vary
///
/// A 2-D latitude array whose rows are all equal becomes its first row, and so
/// on for every axis. A constant 1-D array becomes a 0-d scalar. Values are
/// compared exactly, so an axis is only dropped when every lane is identical.
pub fn remove_degenerate_axes(values: &ArrayD<f64>) -> ArrayD<f64> {
    let mut out = values.clone();
    let mut axis = 0;
    while axis < out.ndim() {
        let first = out.index_axis(Axis(axis), 0).to_owned();
        let degenerate = out.len_of(Axis(axis)) > 0
            && out
                .axis_iter(Axis(axis))
                .all(|lane| lane == first.view());
        if degenerate {
            out = first;
        } else {
            axis += 1;
        }
    }
    out
}

/// Reduce a 2-D array to the 1-D axis it was broadcast from, if it was
///
/// `along` is 0 for values constant along rows (latitudes) and 1 for values
/// constant along columns (longitudes).
pub(crate) fn collapse_2d(values: &ndarray::Array2<f64>, along: usize) -> Option<Array1<f64>> {
    let reduced = remove_degenerate_axes(&values.clone().into_dyn());
    if reduced.ndim() == 0 {
        // Constant everywhere: only a single row or column is a valid axis
        let expected = if along == 0 { values.nrows() } else { values.ncols() };
        return (expected == 1).then(|| Array1::from_iter(reduced.iter().copied()));
    }
    if reduced.ndim() != 1 {
        return None;
    }
    let expected = if along == 0 { values.nrows() } else { values.ncols() };
    let other = if along == 0 { values.ncols() } else { values.nrows() };
    // A 1x1 array is degenerate both ways
    if reduced.len() != expected && !(expected == 1 && other == 1) {
        return None;
    }
    reduced.into_dimensionality::<ndarray::Ix1>().ok()
}

fn looks_like(coord: &Coordinate, names: &[&str], axis: &str, standard_name: &str) -> bool {
    names.contains(&coord.name.to_ascii_lowercase().as_str())
        || coord.attr_str("axis") == Some(axis)
        || coord.attr_str("standard_name") == Some(standard_name)
}

fn unique<'a>(
    array: &DataArray,
    found: Vec<&'a Coordinate>,
    what: &str,
) -> Result<&'a Coordinate> {
    match found.as_slice() {
        [coord] => Ok(coord),
        [] => Err(UmRegridError::grid_id(format!(
            "No {what} coordinate on '{}'",
            array.label()
        ))),
        many => Err(UmRegridError::grid_id(format!(
            "Ambiguous {what} coordinate on '{}': {}",
            array.label(),
            many.iter().map(|c| c.name.as_str()).collect::<Vec<_>>().join(", ")
        ))),
    }
}

/// Find the latitude and longitude coordinates of `array`
///
/// Coordinates carrying recognised units win. When none do, coordinates
/// marked by `axis`, `standard_name` or a conventional name are accepted.
pub fn identify_lat_lon(array: &DataArray) -> Result<(&Coordinate, &Coordinate)> {
    let numeric: Vec<&Coordinate> = array.coords.iter().filter(|c| c.numeric().is_some()).collect();

    let mut lats: Vec<&Coordinate> = numeric
        .iter()
        .copied()
        .filter(|c| c.units().is_some_and(is_latitude_units))
        .collect();
    if lats.is_empty() {
        lats = numeric
            .iter()
            .copied()
            .filter(|c| looks_like(c, &["lat", "latitude"], "Y", "latitude"))
            .collect();
    }

    let mut lons: Vec<&Coordinate> = numeric
        .iter()
        .copied()
        .filter(|c| c.units().is_some_and(is_longitude_units))
        .collect();
    if lons.is_empty() {
        lons = numeric
            .iter()
            .copied()
            .filter(|c| looks_like(c, &["lon", "longitude"], "X", "longitude"))
            .collect();
    }

    Ok((unique(array, lats, "latitude")?, unique(array, lons, "longitude")?))
}

/// Find the time coordinate of `array`
pub fn identify_time(array: &DataArray) -> Result<&Coordinate> {
    let mut found: Vec<&Coordinate> = array.coords.iter().filter(|c| c.times().is_some()).collect();
    if found.is_empty() {
        found = array
            .coords
            .iter()
            .filter(|c| c.ndim() == 1 && looks_like(c, &["time"], "T", "time"))
            .collect();
    }
    unique(array, found, "time").map_err(|e| match e {
        UmRegridError::GridIdentificationError(msg) => UmRegridError::AncillaryError(msg),
        other => other,
    })
}

/// Seconds per unit for the CF time units understood here
fn unit_seconds(unit: &str) -> Option<f64> {
    match unit.to_ascii_lowercase().as_str() {
        "seconds" | "second" | "secs" | "sec" | "s" => Some(1.0),
        "minutes" | "minute" | "mins" | "min" => Some(60.0),
        "hours" | "hour" | "hrs" | "hr" | "h" => Some(3600.0),
        "days" | "day" | "d" => Some(86400.0),
        _ => None,
    }
}

fn parse_reference_date(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim().trim_end_matches("UTC").trim_end_matches('Z').trim();
    const FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Split CF time units such as `"hours since 1900-01-01 00:00:00"`
pub fn parse_time_units(units: &str) -> Result<(f64, NaiveDateTime)> {
    let (unit, reference) = units
        .split_once(" since ")
        .ok_or_else(|| UmRegridError::Generic(format!("Not a CF time unit: '{units}'")))?;
    let scale = unit_seconds(unit.trim())
        .ok_or_else(|| UmRegridError::Generic(format!("Unknown time unit '{unit}'")))?;
    let reference = parse_reference_date(reference)
        .ok_or_else(|| UmRegridError::Generic(format!("Cannot parse reference date '{reference}'")))?;
    Ok((scale, reference))
}

/// Decode numeric CF time values into timestamps (proleptic Gregorian)
pub fn decode_cf_time(values: &[f64], units: &str) -> Result<Vec<NaiveDateTime>> {
    let (scale, reference) = parse_time_units(units)?;
    values
        .iter()
        .map(|&v| {
            if !v.is_finite() {
                return Err(UmRegridError::Generic(format!("Non-finite time value {v}")));
            }
            let millis = (v * scale * 1000.0).round();
            let offset = (millis.abs() < i64::MAX as f64)
                .then(|| Duration::try_milliseconds(millis as i64))
                .flatten();
            offset
                .and_then(|offset| reference.checked_add_signed(offset))
                .ok_or_else(|| UmRegridError::Generic(format!("Time value {v} in '{units}' is out of range")))
        })
        .collect()
}

/// Encode timestamps as seconds since the first one
pub fn encode_cf_time(times: &[NaiveDateTime]) -> (Vec<f64>, String) {
    let Some(&reference) = times.first() else {
        return (Vec::new(), "seconds since 1970-01-01 00:00:00".to_string());
    };
    let values = times
        .iter()
        .map(|t| (*t - reference).num_milliseconds() as f64 / 1000.0)
        .collect();
    (
        values,
        format!("seconds since {}", reference.format("%Y-%m-%d %H:%M:%S")),
    )
}
