//! Grid serialization: CDO grid descriptions, sample NetCDF files and SCRIP files

use super::Grid;
use crate::errors::{Result, UmRegridError};
use ndarray::{Array1, Array2};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Value written to masked cells of a sample file
pub const SAMPLE_FILL_VALUE: f64 = -9999.0;

fn join(values: impl IntoIterator<Item = f64>) -> String {
    values
        .into_iter()
        .map(|v| format!("{v:.6}"))
        .collect::<Vec<_>>()
        .join(",")
}

impl Grid {
    /// Text grid description understood by `cdo gen*`
    pub fn to_cdo_grid(&self) -> String {
        let mut out = String::new();
        let (ny, nx) = self.shape();
        // write! to a String cannot fail
        match self {
            Grid::Rectilinear(g) => {
                let _ = writeln!(out, "gridtype = lonlat");
                let _ = writeln!(out, "xsize = {nx}");
                let _ = writeln!(out, "xvals = {}", join(g.lons().iter().copied()));
                if let Some(v) = g.lon_vertices() {
                    let bounds = v.windows(2).into_iter().flat_map(|w| [w[0], w[1]]).collect::<Vec<_>>();
                    let _ = writeln!(out, "xbounds = {}", join(bounds));
                }
                let _ = writeln!(out, "ysize = {ny}");
                let _ = writeln!(out, "yvals = {}", join(g.lats().iter().copied()));
                if let Some(v) = g.lat_vertices() {
                    let bounds = v.windows(2).into_iter().flat_map(|w| [w[0], w[1]]).collect::<Vec<_>>();
                    let _ = writeln!(out, "ybounds = {}", join(bounds));
                }
            }
            Grid::Curvilinear(g) => {
                let _ = writeln!(out, "gridtype = curvilinear");
                let _ = writeln!(out, "gridsize = {}", ny * nx);
                let _ = writeln!(out, "xsize = {nx}");
                let _ = writeln!(out, "ysize = {ny}");
                let _ = writeln!(out, "xvals = {}", join(g.lons().iter().copied()));
                let _ = writeln!(out, "yvals = {}", join(g.lats().iter().copied()));
                if let Ok((lat_c, lon_c)) = self.cell_corners() {
                    let _ = writeln!(out, "nvertex = 4");
                    let _ = writeln!(out, "xbounds = {}", join(lon_c.iter().copied()));
                    let _ = writeln!(out, "ybounds = {}", join(lat_c.iter().copied()));
                }
            }
        }
        out
    }

    pub fn write_cdo_grid(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path.as_ref(), self.to_cdo_grid())?;
        Ok(())
    }

    /// Sample NetCDF file on this grid, with masked cells set to the fill value
    ///
    /// `mask` is `true` for valid cells and must have the grid's shape.
    pub fn to_netcdf(&self, path: impl AsRef<Path>, mask: Option<&Array2<bool>>) -> Result<()> {
        let path = path.as_ref();
        let (ny, nx) = self.shape();
        if let Some(mask) = mask {
            if mask.dim() != (ny, nx) {
                return Err(UmRegridError::RegridShapeError {
                    expected: vec![ny, nx],
                    found: mask.shape().to_vec(),
                });
            }
        }

        if path.exists() {
            fs::remove_file(path)?;
        }
        let mut file = netcdf::create(path)?;
        let (ydim, xdim) = self.dim_names();
        file.add_dimension(ydim, ny)?;
        file.add_dimension(xdim, nx)?;

        let bounded = self.has_bounds();
        match self {
            Grid::Rectilinear(g) => {
                let mut lat = file.add_variable::<f64>("lat", &[ydim])?;
                lat.put_attribute("units", "degrees_north")?;
                lat.put_attribute("standard_name", "latitude")?;
                if bounded {
                    lat.put_attribute("bounds", "lat_bnds")?;
                }
                lat.put(g.lats().view(), ..)?;
                let mut lon = file.add_variable::<f64>("lon", &[xdim])?;
                lon.put_attribute("units", "degrees_east")?;
                lon.put_attribute("standard_name", "longitude")?;
                if bounded {
                    lon.put_attribute("bounds", "lon_bnds")?;
                }
                lon.put(g.lons().view(), ..)?;

                if let (Some(lat_v), Some(lon_v)) = (g.lat_vertices(), g.lon_vertices()) {
                    file.add_dimension("bnds", 2)?;
                    let pairs = |v: &Array1<f64>| {
                        Array2::from_shape_fn((v.len() - 1, 2), |(k, s)| v[k + s])
                    };
                    let mut lat_b = file.add_variable::<f64>("lat_bnds", &[ydim, "bnds"])?;
                    lat_b.put(pairs(lat_v).view(), ..)?;
                    let mut lon_b = file.add_variable::<f64>("lon_bnds", &[xdim, "bnds"])?;
                    lon_b.put(pairs(lon_v).view(), ..)?;
                }
            }
            Grid::Curvilinear(g) => {
                let mut lat = file.add_variable::<f64>("lat", &[ydim, xdim])?;
                lat.put_attribute("units", "degrees_north")?;
                lat.put_attribute("standard_name", "latitude")?;
                if bounded {
                    lat.put_attribute("bounds", "lat_bnds")?;
                }
                lat.put(g.lats().view(), ..)?;
                let mut lon = file.add_variable::<f64>("lon", &[ydim, xdim])?;
                lon.put_attribute("units", "degrees_east")?;
                lon.put_attribute("standard_name", "longitude")?;
                if bounded {
                    lon.put_attribute("bounds", "lon_bnds")?;
                }
                lon.put(g.lons().view(), ..)?;

                if bounded {
                    let (lat_c, lon_c) = self.cell_corners()?;
                    file.add_dimension("nv4", 4)?;
                    let mut lat_b = file.add_variable::<f64>("lat_bnds", &[ydim, xdim, "nv4"])?;
                    lat_b.put(lat_c.into_shape((ny, nx, 4))?.view(), ..)?;
                    let mut lon_b = file.add_variable::<f64>("lon_bnds", &[ydim, xdim, "nv4"])?;
                    lon_b.put(lon_c.into_shape((ny, nx, 4))?.view(), ..)?;
                }
            }
        }

        let sample = match mask {
            Some(mask) => mask.mapv(|valid| if valid { 0.0 } else { SAMPLE_FILL_VALUE }),
            None => Array2::zeros((ny, nx)),
        };
        let mut var = file.add_variable::<f64>("sample", &[ydim, xdim])?;
        var.put_attribute("_FillValue", SAMPLE_FILL_VALUE)?;
        if !self.is_rectilinear() {
            var.put_attribute("coordinates", "lat lon")?;
        }
        var.put(sample.view(), ..)?;

        debug!(path = %path.display(), ny, nx, "wrote grid sample file");
        Ok(())
    }

    /// SCRIP grid file with cell centres and corners
    pub fn to_scrip(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let (ny, nx) = self.shape();
        let size = ny * nx;
        let (lat_c, lon_c) = self.cell_corners()?;

        if path.exists() {
            fs::remove_file(path)?;
        }
        let mut file = netcdf::create(path)?;
        file.add_dimension("grid_size", size)?;
        file.add_dimension("grid_corners", 4)?;
        file.add_dimension("grid_rank", 2)?;

        let mut dims = file.add_variable::<i32>("grid_dims", &["grid_rank"])?;
        dims.put(Array1::from(vec![nx as i32, ny as i32]).view(), ..)?;

        let lats = Array1::from_iter(self.center_lats().iter().copied());
        let mut center_lat = file.add_variable::<f64>("grid_center_lat", &["grid_size"])?;
        center_lat.put_attribute("units", "degrees")?;
        center_lat.put(lats.view(), ..)?;

        let lons = Array1::from_iter(self.center_lons().iter().copied());
        let mut center_lon = file.add_variable::<f64>("grid_center_lon", &["grid_size"])?;
        center_lon.put_attribute("units", "degrees")?;
        center_lon.put(lons.view(), ..)?;

        let mut imask = file.add_variable::<i32>("grid_imask", &["grid_size"])?;
        imask.put(Array1::<i32>::ones(size).view(), ..)?;

        let mut corner_lat = file.add_variable::<f64>("grid_corner_lat", &["grid_size", "grid_corners"])?;
        corner_lat.put_attribute("units", "degrees")?;
        corner_lat.put(lat_c.view(), ..)?;

        let mut corner_lon = file.add_variable::<f64>("grid_corner_lon", &["grid_size", "grid_corners"])?;
        corner_lon.put_attribute("units", "degrees")?;
        corner_lon.put(lon_c.view(), ..)?;

        file.add_attribute("title", "um_regrid grid")?;
        debug!(path = %path.display(), size, "wrote SCRIP grid");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn lonlat_description() {
        let grid = Grid::rectilinear(array![-45.0, 45.0], array![0.0, 180.0]).unwrap();
        let text = grid.to_cdo_grid();
        let expected = "gridtype = lonlat\n\
                        xsize = 2\n\
                        xvals = 0.000000,180.000000\n\
                        ysize = 2\n\
                        yvals = -45.000000,45.000000\n";
        assert_eq!(text, expected);
    }

    #[test]
    fn curvilinear_description_has_gridsize() {
        let grid = Grid::curvilinear(array![[0.0, 1.0], [2.0, 3.0]], array![[10.0, 20.0], [11.0, 21.0]]).unwrap();
        let text = grid.to_cdo_grid();
        assert!(text.starts_with("gridtype = curvilinear\ngridsize = 4\n"));
        assert!(!text.contains("xbounds"));
    }
}
