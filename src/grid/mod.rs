//! Horizontal grid descriptions
//!
//! A [`Grid`] is either rectilinear (1-D latitude and longitude axes) or
//! curvilinear (2-D latitude and longitude arrays of equal shape). Optional
//! cell boundaries are stored as vertex arrays one larger than the centres.

pub mod cdo;
pub mod identify;

pub use identify::{identify, identify_grid, GridConvention, IdentifiedGrid};

use crate::array::Coordinate;
use crate::dimension::collapse_2d;
use crate::errors::{Result, UmRegridError};
use ndarray::{Array1, Array2};
use tracing::debug;

/// Grid with 1-D latitude and longitude axes
#[derive(Debug, Clone, PartialEq)]
pub struct RectilinearGrid {
    lats: Array1<f64>,
    lons: Array1<f64>,
    lat_vertices: Option<Array1<f64>>,
    lon_vertices: Option<Array1<f64>>,
}

/// Grid with 2-D latitude and longitude arrays
#[derive(Debug, Clone, PartialEq)]
pub struct CurvilinearGrid {
    lats: Array2<f64>,
    lons: Array2<f64>,
    lat_vertices: Option<Array2<f64>>,
    lon_vertices: Option<Array2<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Grid {
    Rectilinear(RectilinearGrid),
    Curvilinear(CurvilinearGrid),
}

fn strictly_monotonic(values: &Array1<f64>) -> bool {
    if values.iter().any(|v| !v.is_finite()) {
        return false;
    }
    let diffs: Vec<f64> = values.windows(2).into_iter().map(|w| w[1] - w[0]).collect();
    diffs.iter().all(|&d| d > 0.0) || diffs.iter().all(|&d| d < 0.0)
}

impl RectilinearGrid {
    pub fn new(lats: Array1<f64>, lons: Array1<f64>) -> Result<Self> {
        if lats.is_empty() || lons.is_empty() {
            return Err(UmRegridError::InvalidGrid("Grid axes must not be empty".to_string()));
        }
        if !strictly_monotonic(&lats) {
            return Err(UmRegridError::InvalidGrid(
                "Latitude axis is not strictly monotonic".to_string(),
            ));
        }
        if !strictly_monotonic(&lons) {
            return Err(UmRegridError::InvalidGrid(
                "Longitude axis is not strictly monotonic".to_string(),
            ));
        }
        Ok(Self {
            lats,
            lons,
            lat_vertices: None,
            lon_vertices: None,
        })
    }

    /// Attach cell boundaries, one more vertex than centres along each axis
    pub fn with_vertices(mut self, lat_vertices: Array1<f64>, lon_vertices: Array1<f64>) -> Result<Self> {
        if lat_vertices.len() != self.lats.len() + 1 || lon_vertices.len() != self.lons.len() + 1 {
            return Err(UmRegridError::InvalidGrid(format!(
                "Boundary lengths ({}, {}) do not match centres ({}, {})",
                lat_vertices.len(),
                lon_vertices.len(),
                self.lats.len(),
                self.lons.len()
            )));
        }
        self.lat_vertices = Some(lat_vertices);
        self.lon_vertices = Some(lon_vertices);
        Ok(self)
    }

    pub fn lats(&self) -> &Array1<f64> {
        &self.lats
    }

    pub fn lons(&self) -> &Array1<f64> {
        &self.lons
    }

    pub fn lat_vertices(&self) -> Option<&Array1<f64>> {
        self.lat_vertices.as_ref()
    }

    pub fn lon_vertices(&self) -> Option<&Array1<f64>> {
        self.lon_vertices.as_ref()
    }

    /// Cell edges between centres, closed at the poles and wrapped in longitude
    pub fn derived_vertices(&self) -> (Array1<f64>, Array1<f64>) {
        let lats = &self.lats;
        let n = lats.len();
        let ascending = n < 2 || lats[n - 1] > lats[0];
        let (south, north) = if ascending { (-90.0, 90.0) } else { (90.0, -90.0) };
        let mut lat_v = Array1::zeros(n + 1);
        lat_v[0] = south;
        lat_v[n] = north;
        for k in 1..n {
            lat_v[k] = 0.5 * (lats[k - 1] + lats[k]);
        }

        let lons = &self.lons;
        let m = lons.len();
        let half_gap = |a: f64, b: f64| (b - a).rem_euclid(360.0) / 2.0;
        let mut lon_v = Array1::zeros(m + 1);
        lon_v[0] = (lons[0] - half_gap(lons[m - 1], lons[0])).rem_euclid(360.0);
        for k in 1..m {
            lon_v[k] = (lons[k - 1] + half_gap(lons[k - 1], lons[k])).rem_euclid(360.0);
        }
        lon_v[m] = (lons[m - 1] + half_gap(lons[m - 1], lons[0])).rem_euclid(360.0);

        (lat_v, lon_v)
    }
}

impl CurvilinearGrid {
    pub fn new(lats: Array2<f64>, lons: Array2<f64>) -> Result<Self> {
        if lats.shape() != lons.shape() {
            return Err(UmRegridError::InvalidGrid(format!(
                "Latitude shape {:?} differs from longitude shape {:?}",
                lats.shape(),
                lons.shape()
            )));
        }
        if lats.is_empty() {
            return Err(UmRegridError::InvalidGrid("Grid arrays must not be empty".to_string()));
        }
        Ok(Self {
            lats,
            lons,
            lat_vertices: None,
            lon_vertices: None,
        })
    }

    /// Attach cell corner arrays of shape `(ny + 1, nx + 1)`
    pub fn with_vertices(mut self, lat_vertices: Array2<f64>, lon_vertices: Array2<f64>) -> Result<Self> {
        let (ny, nx) = self.lats.dim();
        if lat_vertices.dim() != (ny + 1, nx + 1) || lon_vertices.dim() != (ny + 1, nx + 1) {
            return Err(UmRegridError::InvalidGrid(format!(
                "Corner arrays must have shape ({}, {})",
                ny + 1,
                nx + 1
            )));
        }
        self.lat_vertices = Some(lat_vertices);
        self.lon_vertices = Some(lon_vertices);
        Ok(self)
    }

    pub fn lats(&self) -> &Array2<f64> {
        &self.lats
    }

    pub fn lons(&self) -> &Array2<f64> {
        &self.lons
    }

    pub fn lat_vertices(&self) -> Option<&Array2<f64>> {
        self.lat_vertices.as_ref()
    }

    pub fn lon_vertices(&self) -> Option<&Array2<f64>> {
        self.lon_vertices.as_ref()
    }
}

impl Grid {
    /// Rectilinear grid from 1-D centre values
    pub fn rectilinear(lats: impl Into<Array1<f64>>, lons: impl Into<Array1<f64>>) -> Result<Self> {
        Ok(Grid::Rectilinear(RectilinearGrid::new(lats.into(), lons.into())?))
    }

    /// Curvilinear grid from 2-D centre values
    pub fn curvilinear(lats: Array2<f64>, lons: Array2<f64>) -> Result<Self> {
        Ok(Grid::Curvilinear(CurvilinearGrid::new(lats, lons)?))
    }

    /// Grid from 2-D centre arrays, rectilinear when they are broadcast 1-D axes
    pub fn from_centers(lats: Array2<f64>, lons: Array2<f64>) -> Result<Self> {
        if let (Some(lat_axis), Some(lon_axis)) = (collapse_2d(&lats, 0), collapse_2d(&lons, 1)) {
            match RectilinearGrid::new(lat_axis, lon_axis) {
                Ok(grid) => return Ok(Grid::Rectilinear(grid)),
                Err(e) => debug!("centres do not form a rectilinear grid: {e}"),
            }
        }
        Self::curvilinear(lats, lons)
    }

    /// `(ny, nx)`
    pub fn shape(&self) -> (usize, usize) {
        match self {
            Grid::Rectilinear(g) => (g.lats.len(), g.lons.len()),
            Grid::Curvilinear(g) => g.lats.dim(),
        }
    }

    pub fn size(&self) -> usize {
        let (ny, nx) = self.shape();
        ny * nx
    }

    pub fn is_rectilinear(&self) -> bool {
        matches!(self, Grid::Rectilinear(_))
    }

    pub fn has_bounds(&self) -> bool {
        match self {
            Grid::Rectilinear(g) => g.lat_vertices.is_some(),
            Grid::Curvilinear(g) => g.lat_vertices.is_some(),
        }
    }

    /// Centre latitudes broadcast to `(ny, nx)`
    pub fn center_lats(&self) -> Array2<f64> {
        match self {
            Grid::Rectilinear(g) => {
                let (ny, nx) = self.shape();
                Array2::from_shape_fn((ny, nx), |(j, _)| g.lats[j])
            }
            Grid::Curvilinear(g) => g.lats.clone(),
        }
    }

    /// Centre longitudes broadcast to `(ny, nx)`
    pub fn center_lons(&self) -> Array2<f64> {
        match self {
            Grid::Rectilinear(g) => {
                let (ny, nx) = self.shape();
                Array2::from_shape_fn((ny, nx), |(_, i)| g.lons[i])
            }
            Grid::Curvilinear(g) => g.lons.clone(),
        }
    }

    /// Four corners per cell, counterclockwise from the lower left, as `(ny*nx, 4)` arrays
    ///
    /// Rectilinear grids without boundaries use [`RectilinearGrid::derived_vertices`].
    pub fn cell_corners(&self) -> Result<(Array2<f64>, Array2<f64>)> {
        let (lat_v, lon_v) = match self {
            Grid::Rectilinear(g) => {
                let (lat_v, lon_v) = match (&g.lat_vertices, &g.lon_vertices) {
                    (Some(lat_v), Some(lon_v)) => (lat_v.clone(), lon_v.clone()),
                    _ => g.derived_vertices(),
                };
                let (ny, nx) = self.shape();
                (
                    Array2::from_shape_fn((ny + 1, nx + 1), |(j, _)| lat_v[j]),
                    Array2::from_shape_fn((ny + 1, nx + 1), |(_, i)| lon_v[i]),
                )
            }
            Grid::Curvilinear(g) => match (&g.lat_vertices, &g.lon_vertices) {
                (Some(lat_v), Some(lon_v)) => (lat_v.clone(), lon_v.clone()),
                _ => {
                    return Err(UmRegridError::UnsupportedGridError(
                        "Curvilinear grid without cell boundaries has no corners".to_string(),
                    ))
                }
            },
        };

        let (ny, nx) = self.shape();
        let corner = |v: &Array2<f64>| {
            Array2::from_shape_fn((ny * nx, 4), |(cell, k)| {
                let (j, i) = (cell / nx, cell % nx);
                match k {
                    0 => v[[j, i]],
                    1 => v[[j, i + 1]],
                    2 => v[[j + 1, i + 1]],
                    _ => v[[j + 1, i]],
                }
            })
        };
        Ok((corner(&lat_v), corner(&lon_v)))
    }

    /// Dimension names used when this grid labels an array: `(y, x)`
    pub fn dim_names(&self) -> (&'static str, &'static str) {
        match self {
            Grid::Rectilinear(_) => ("lat", "lon"),
            Grid::Curvilinear(_) => ("y", "x"),
        }
    }

    /// Latitude and longitude coordinates describing this grid
    pub fn coordinates(&self) -> (Coordinate, Coordinate) {
        let (ydim, xdim) = self.dim_names();
        match self {
            Grid::Rectilinear(g) => {
                let mut lat = Coordinate::new("lat", [ydim], g.lats.clone().into_dyn())
                    .with_attr("units", "degrees_north")
                    .with_attr("standard_name", "latitude")
                    .with_attr("axis", "Y");
                let mut lon = Coordinate::new("lon", [xdim], g.lons.clone().into_dyn())
                    .with_attr("units", "degrees_east")
                    .with_attr("standard_name", "longitude")
                    .with_attr("axis", "X");
                if let (Some(lat_v), Some(lon_v)) = (&g.lat_vertices, &g.lon_vertices) {
                    lat.bounds = Some(pairs(lat_v));
                    lon.bounds = Some(pairs(lon_v));
                }
                (lat, lon)
            }
            Grid::Curvilinear(g) => {
                let mut lat = Coordinate::new("lat", [ydim, xdim], g.lats.clone().into_dyn())
                    .with_attr("units", "degrees_north")
                    .with_attr("standard_name", "latitude");
                let mut lon = Coordinate::new("lon", [ydim, xdim], g.lons.clone().into_dyn())
                    .with_attr("units", "degrees_east")
                    .with_attr("standard_name", "longitude");
                if let (Some(lat_v), Some(lon_v)) = (&g.lat_vertices, &g.lon_vertices) {
                    lat.bounds = Some(quads(lat_v));
                    lon.bounds = Some(quads(lon_v));
                }
                (lat, lon)
            }
        }
    }
}

/// CF `(n, 2)` bounds from `n + 1` vertices
fn pairs(vertices: &Array1<f64>) -> ndarray::ArrayD<f64> {
    let n = vertices.len() - 1;
    Array2::from_shape_fn((n, 2), |(k, side)| vertices[k + side]).into_dyn()
}

/// CF `(ny, nx, 4)` counterclockwise bounds from `(ny + 1, nx + 1)` vertices
fn quads(vertices: &Array2<f64>) -> ndarray::ArrayD<f64> {
    let (ny, nx) = (vertices.nrows() - 1, vertices.ncols() - 1);
    ndarray::Array3::from_shape_fn((ny, nx, 4), |(j, i, k)| match k {
        0 => vertices[[j, i]],
        1 => vertices[[j, i + 1]],
        2 => vertices[[j + 1, i + 1]],
        _ => vertices[[j + 1, i]],
    })
    .into_dyn()
}
