//! Infer a [`Grid`] from the coordinates of a [`DataArray`]
//!
//! Latitude and longitude are found strictly by their CF units. Which kind of
//! grid they describe is decided by a list of [`GridConvention`]s tried in
//! priority order; exactly one must match.

use super::{CurvilinearGrid, Grid, RectilinearGrid};
use crate::array::{Coordinate, DataArray};
use crate::dimension::{is_latitude_units, is_longitude_units};
use crate::errors::{Result, UmRegridError};
use ndarray::{Array1, Array2, ArrayD, Ix1, Ix2, Ix3};
use tracing::debug;

/// A grid identified on an array, with the dimensions it occupies
#[derive(Debug, Clone)]
pub struct IdentifiedGrid {
    pub grid: Grid,
    /// Dimension running along latitude rows
    pub y_dim: String,
    /// Dimension running along longitude columns
    pub x_dim: String,
}

/// One way of turning a latitude/longitude coordinate pair into a grid
pub trait GridConvention: Send + Sync {
    fn name(&self) -> &'static str;

    fn matches(&self, lat: &Coordinate, lon: &Coordinate) -> bool;

    fn build(&self, lat: &Coordinate, lon: &Coordinate) -> Result<IdentifiedGrid>;
}

/// 1-D latitude and longitude on two different dimensions
pub struct RectilinearByUnits;

/// Latitude and longitude spanning the same two dimensions
pub struct CurvilinearBySharedDims;

pub fn default_conventions() -> Vec<Box<dyn GridConvention>> {
    vec![Box::new(RectilinearByUnits), Box::new(CurvilinearBySharedDims)]
}

fn numeric_values(coord: &Coordinate) -> Result<&ArrayD<f64>> {
    coord.numeric().ok_or_else(|| {
        UmRegridError::grid_id(format!("Coordinate '{}' is not numeric", coord.name))
    })
}

fn as_1d(coord: &Coordinate) -> Result<Array1<f64>> {
    Ok(numeric_values(coord)?.clone().into_dimensionality::<Ix1>()?)
}

fn as_2d(coord: &Coordinate) -> Result<Array2<f64>> {
    Ok(numeric_values(coord)?.clone().into_dimensionality::<Ix2>()?)
}

/// Vertices from CF `(n, 2)` bounds; cells must be contiguous
fn vertices_1d(coord: &Coordinate) -> Result<Option<Array1<f64>>> {
    let Some(bounds) = &coord.bounds else {
        return Ok(None);
    };
    let bounds = bounds.clone().into_dimensionality::<Ix2>()?;
    let n = bounds.nrows();
    if bounds.ncols() != 2 || n == 0 {
        return Err(UmRegridError::InvalidGrid(format!(
            "Bounds of '{}' must have shape ({n}, 2)",
            coord.name
        )));
    }
    for k in 1..n {
        if (bounds[[k - 1, 1]] - bounds[[k, 0]]).abs() > 1e-6 {
            return Err(UmRegridError::InvalidGrid(format!(
                "Bounds of '{}' are not contiguous at index {k}",
                coord.name
            )));
        }
    }
    let mut vertices = Array1::zeros(n + 1);
    for k in 0..n {
        vertices[k] = bounds[[k, 0]];
    }
    vertices[n] = bounds[[n - 1, 1]];
    Ok(Some(vertices))
}

/// Corner vertices from CF `(ny, nx, 4)` counterclockwise bounds
fn vertices_2d(coord: &Coordinate) -> Result<Option<Array2<f64>>> {
    let Some(bounds) = &coord.bounds else {
        return Ok(None);
    };
    let bounds = bounds.clone().into_dimensionality::<Ix3>()?;
    let (ny, nx, nv) = bounds.dim();
    if nv != 4 {
        return Err(UmRegridError::InvalidGrid(format!(
            "Bounds of '{}' need 4 vertices per cell, found {nv}",
            coord.name
        )));
    }
    Ok(Some(Array2::from_shape_fn((ny + 1, nx + 1), |(j, i)| {
        let (cj, ci) = (j.min(ny - 1), i.min(nx - 1));
        let k = match (j > cj, i > ci) {
            (false, false) => 0,
            (false, true) => 1,
            (true, true) => 2,
            (true, false) => 3,
        };
        bounds[[cj, ci, k]]
    })))
}

impl GridConvention for RectilinearByUnits {
    fn name(&self) -> &'static str {
        "rectilinear"
    }

    fn matches(&self, lat: &Coordinate, lon: &Coordinate) -> bool {
        lat.ndim() == 1 && lon.ndim() == 1 && lat.dims[0] != lon.dims[0]
    }

    fn build(&self, lat: &Coordinate, lon: &Coordinate) -> Result<IdentifiedGrid> {
        let mut grid = RectilinearGrid::new(as_1d(lat)?, as_1d(lon)?)?;
        if let (Some(lat_v), Some(lon_v)) = (vertices_1d(lat)?, vertices_1d(lon)?) {
            grid = grid.with_vertices(lat_v, lon_v)?;
        }
        Ok(IdentifiedGrid {
            grid: Grid::Rectilinear(grid),
            y_dim: lat.dims[0].clone(),
            x_dim: lon.dims[0].clone(),
        })
    }
}

impl CurvilinearBySharedDims {
    /// The two dimensions of the grid, taken from whichever coordinate is 2-D
    fn dims<'a>(lat: &'a Coordinate, lon: &'a Coordinate) -> Option<(&'a str, &'a str)> {
        let full = if lat.ndim() == 2 { lat } else { lon };
        if full.ndim() != 2 || full.dims[0] == full.dims[1] {
            return None;
        }
        let covered = |c: &Coordinate| c.dims.iter().all(|d| full.dims.contains(d));
        if covered(lat) && covered(lon) && lat.ndim() >= 1 && lon.ndim() >= 1 {
            Some((full.dims[0].as_str(), full.dims[1].as_str()))
        } else {
            None
        }
    }

    fn broadcast(coord: &Coordinate, y: &str, x: &str, shape: (usize, usize)) -> Result<Array2<f64>> {
        if coord.ndim() == 2 {
            let values = as_2d(coord)?;
            return Ok(if coord.dims[0] == y { values } else { values.reversed_axes() });
        }
        let values = as_1d(coord)?;
        Ok(if coord.dims[0] == y {
            Array2::from_shape_fn(shape, |(j, _)| values[j])
        } else {
            debug_assert_eq!(coord.dims[0], x);
            Array2::from_shape_fn(shape, |(_, i)| values[i])
        })
    }
}

impl GridConvention for CurvilinearBySharedDims {
    fn name(&self) -> &'static str {
        "curvilinear"
    }

    fn matches(&self, lat: &Coordinate, lon: &Coordinate) -> bool {
        Self::dims(lat, lon).is_some()
    }

    fn build(&self, lat: &Coordinate, lon: &Coordinate) -> Result<IdentifiedGrid> {
        let (y, x) = Self::dims(lat, lon)
            .ok_or_else(|| UmRegridError::grid_id("Coordinates do not share two dimensions"))?;
        let full = if lat.ndim() == 2 { lat } else { lon };
        let shape = if full.dims[0] == y {
            (full.shape()[0], full.shape()[1])
        } else {
            (full.shape()[1], full.shape()[0])
        };

        let lats = Self::broadcast(lat, y, x, shape)?;
        let lons = Self::broadcast(lon, y, x, shape)?;
        let mut grid = CurvilinearGrid::new(lats, lons)?;
        if lat.ndim() == 2 && lon.ndim() == 2 {
            if let (Some(lat_v), Some(lon_v)) = (vertices_2d(lat)?, vertices_2d(lon)?) {
                grid = grid.with_vertices(lat_v, lon_v)?;
            }
        }

        Ok(IdentifiedGrid {
            grid: Grid::Curvilinear(grid),
            y_dim: y.to_string(),
            x_dim: x.to_string(),
        })
    }
}

fn looks_like_lat(coord: &Coordinate) -> bool {
    matches!(coord.name.to_ascii_lowercase().as_str(), "lat" | "latitude")
        || coord.attr_str("standard_name") == Some("latitude")
}

fn looks_like_lon(coord: &Coordinate) -> bool {
    matches!(coord.name.to_ascii_lowercase().as_str(), "lon" | "longitude")
        || coord.attr_str("standard_name") == Some("longitude")
}

/// Latitude and longitude coordinates selected by units alone
pub fn find_lat_lon(array: &DataArray) -> Result<(&Coordinate, &Coordinate)> {
    let mut lats = Vec::new();
    let mut lons = Vec::new();

    for coord in &array.coords {
        match coord.units() {
            Some(units) if is_latitude_units(units) => lats.push(coord),
            Some(units) if is_longitude_units(units) => lons.push(coord),
            Some(units) if looks_like_lat(coord) || looks_like_lon(coord) => {
                return Err(UmRegridError::grid_id(format!(
                    "Coordinate '{}' has unrecognised units '{units}'",
                    coord.name
                )));
            }
            _ => {}
        }
    }

    Ok((
        pick(array, lats, "latitude", "degrees_north")?,
        pick(array, lons, "longitude", "degrees_east")?,
    ))
}

fn pick<'a>(array: &DataArray, found: Vec<&'a Coordinate>, what: &str, units: &str) -> Result<&'a Coordinate> {
    match found.as_slice() {
        [coord] => Ok(coord),
        [] => Err(UmRegridError::grid_id(format!(
            "No {what} coordinate with units '{units}' on '{}'",
            array.label()
        ))),
        many => Err(UmRegridError::grid_id(format!(
            "Ambiguous {what} coordinates on '{}': {}",
            array.label(),
            many.iter().map(|c| c.name.as_str()).collect::<Vec<_>>().join(", ")
        ))),
    }
}

/// Identify the grid of `array` with the default conventions
pub fn identify(array: &DataArray) -> Result<IdentifiedGrid> {
    identify_with(array, &default_conventions())
}

pub fn identify_with(array: &DataArray, conventions: &[Box<dyn GridConvention>]) -> Result<IdentifiedGrid> {
    let (lat, lon) = find_lat_lon(array)?;

    let matching: Vec<&dyn GridConvention> = conventions
        .iter()
        .map(|c| c.as_ref())
        .filter(|c| c.matches(lat, lon))
        .collect();

    match matching.as_slice() {
        [convention] => {
            debug!(
                var = array.label(),
                convention = convention.name(),
                lat = %lat.name,
                lon = %lon.name,
                "identified grid"
            );
            convention.build(lat, lon)
        }
        [] => Err(UmRegridError::grid_id(format!(
            "Coordinates '{}' {:?} and '{}' {:?} match no grid convention",
            lat.name, lat.dims, lon.name, lon.dims
        ))),
        many => Err(UmRegridError::grid_id(format!(
            "Coordinates match several grid conventions: {}",
            many.iter().map(|c| c.name()).collect::<Vec<_>>().join(", ")
        ))),
    }
}

/// The grid of `array`, without the dimension bookkeeping
pub fn identify_grid(array: &DataArray) -> Result<Grid> {
    Ok(identify(array)?.grid)
}
