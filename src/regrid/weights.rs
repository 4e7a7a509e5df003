//! Sparse remapping weights
//!
//! A [`RemapMatrix`] maps flattened source cells onto flattened destination
//! cells. Links are kept sorted by destination so each destination row is a
//! contiguous slice, which makes applying the weights a parallel loop over
//! rows. Weights are stored and read in the SCRIP layout that CDO writes.

use crate::errors::{Result, UmRegridError};
use crate::grid::Grid;
use ndarray::{Array1, Array2, ArrayView2, Zip};
use netcdf::AttributeValue;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// One source-to-destination link of a remap matrix
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RemapLink {
    pub dst: usize,
    pub src: usize,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemapMatrix {
    src_shape: (usize, usize),
    dst_grid: Grid,
    links: Vec<RemapLink>,
    row_offsets: Vec<usize>,
}

impl RemapMatrix {
    /// Build a matrix from links in any order
    pub fn new(src_shape: (usize, usize), dst_grid: Grid, mut links: Vec<RemapLink>) -> Result<Self> {
        let src_size = src_shape.0 * src_shape.1;
        let dst_size = dst_grid.size();

        if let Some(bad) = links
            .iter()
            .find(|l| l.src >= src_size || l.dst >= dst_size || !l.weight.is_finite())
        {
            return Err(UmRegridError::weights(format!(
                "Link {bad:?} is outside a {src_size} -> {dst_size} matrix or has a non-finite weight"
            )));
        }

        links.sort_by_key(|l| (l.dst, l.src));

        let mut row_offsets = vec![0; dst_size + 1];
        for link in &links {
            row_offsets[link.dst + 1] += 1;
        }
        for d in 0..dst_size {
            row_offsets[d + 1] += row_offsets[d];
        }

        Ok(Self {
            src_shape,
            dst_grid,
            links,
            row_offsets,
        })
    }

    /// Source grid shape `(ny, nx)`
    pub fn src_shape(&self) -> (usize, usize) {
        self.src_shape
    }

    pub fn src_size(&self) -> usize {
        self.src_shape.0 * self.src_shape.1
    }

    /// Destination grid shape `(ny, nx)`
    pub fn dst_shape(&self) -> (usize, usize) {
        self.dst_grid.shape()
    }

    pub fn dst_size(&self) -> usize {
        self.dst_grid.size()
    }

    pub fn dst_grid(&self) -> &Grid {
        &self.dst_grid
    }

    pub fn links(&self) -> &[RemapLink] {
        &self.links
    }

    pub fn num_links(&self) -> usize {
        self.links.len()
    }

    /// Links contributing to destination cell `dst`
    pub fn row(&self, dst: usize) -> &[RemapLink] {
        &self.links[self.row_offsets[dst]..self.row_offsets[dst + 1]]
    }

    /// Sum of weights per destination cell
    pub fn weight_sums(&self) -> Array1<f64> {
        Array1::from_shape_fn(self.dst_size(), |d| self.row(d).iter().map(|l| l.weight).sum())
    }

    /// Replace the destination grid with an equivalent one of the same shape
    pub fn with_dst_grid(self, dst_grid: Grid) -> Result<Self> {
        if dst_grid.shape() != self.dst_grid.shape() {
            let (ny, nx) = dst_grid.shape();
            let (ey, ex) = self.dst_grid.shape();
            return Err(UmRegridError::weights(format!(
                "Destination grid ({ny}, {nx}) does not match weights ({ey}, {ex})"
            )));
        }
        Ok(Self { dst_grid, ..self })
    }

    /// Unmap every destination cell whose stencil touches a source cell where `valid` is false
    ///
    /// Partial stencils are dropped whole rather than renormalized, so those
    /// cells come out missing from [`RemapMatrix::apply_flat`].
    pub fn without_sources(&self, valid: &Array2<bool>) -> Result<Self> {
        if valid.dim() != self.src_shape {
            return Err(UmRegridError::RegridShapeError {
                expected: vec![self.src_shape.0, self.src_shape.1],
                found: valid.shape().to_vec(),
            });
        }
        let nx = self.src_shape.1;
        let is_valid = |l: &RemapLink| valid[[l.src / nx, l.src % nx]];
        let links: Vec<RemapLink> = (0..self.dst_size())
            .filter(|&d| self.row(d).iter().all(is_valid))
            .flat_map(|d| self.row(d).iter().copied())
            .collect();
        debug!(
            dropped = self.links.len() - links.len(),
            "unmapped destination cells with masked sources"
        );
        Self::new(self.src_shape, self.dst_grid.clone(), links)
    }

    /// Apply to rows of flattened source values, `(n, src_size)` to `(n, dst_size)`
    ///
    /// Destination cells with no links come out as NaN.
    pub fn apply_flat(&self, src: ArrayView2<f64>) -> Result<Array2<f64>> {
        let (rows, n_src) = src.dim();
        if n_src != self.src_size() {
            return Err(UmRegridError::RegridShapeError {
                expected: vec![self.src_shape.0, self.src_shape.1],
                found: vec![n_src],
            });
        }

        let n_dst = self.dst_size();
        let mut out = Array2::from_elem((rows, n_dst), f64::NAN);
        Zip::from(out.rows_mut())
            .and(src.rows())
            .par_for_each(|mut dst_row, src_row| {
                for (d, value) in dst_row.iter_mut().enumerate() {
                    let links = self.row(d);
                    if !links.is_empty() {
                        *value = links.iter().map(|l| l.weight * src_row[l.src]).sum();
                    }
                }
            });
        Ok(out)
    }

    /// Write the matrix as a SCRIP remap file
    pub fn to_netcdf(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if path.exists() {
            fs::remove_file(path)?;
        }

        let (src_ny, src_nx) = self.src_shape;
        let (dst_ny, dst_nx) = self.dst_shape();
        let n_links = self.links.len();

        let mut file = netcdf::create(path)?;
        file.add_dimension("src_grid_size", self.src_size())?;
        file.add_dimension("dst_grid_size", self.dst_size())?;
        file.add_dimension("src_grid_rank", 2)?;
        file.add_dimension("dst_grid_rank", 2)?;
        file.add_dimension("num_links", n_links)?;
        file.add_dimension("num_wts", 1)?;

        let mut src_dims = file.add_variable::<i32>("src_grid_dims", &["src_grid_rank"])?;
        src_dims.put(Array1::from(vec![src_nx as i32, src_ny as i32]).view(), ..)?;
        let mut dst_dims = file.add_variable::<i32>("dst_grid_dims", &["dst_grid_rank"])?;
        dst_dims.put(Array1::from(vec![dst_nx as i32, dst_ny as i32]).view(), ..)?;

        let lats = Array1::from_iter(self.dst_grid.center_lats().iter().copied());
        let mut dst_lat = file.add_variable::<f64>("dst_grid_center_lat", &["dst_grid_size"])?;
        dst_lat.put_attribute("units", "degrees")?;
        dst_lat.put(lats.view(), ..)?;
        let lons = Array1::from_iter(self.dst_grid.center_lons().iter().copied());
        let mut dst_lon = file.add_variable::<f64>("dst_grid_center_lon", &["dst_grid_size"])?;
        dst_lon.put_attribute("units", "degrees")?;
        dst_lon.put(lons.view(), ..)?;

        let src_address: Array1<i32> = self.links.iter().map(|l| l.src as i32 + 1).collect();
        let dst_address: Array1<i32> = self.links.iter().map(|l| l.dst as i32 + 1).collect();
        let weights = Array2::from_shape_fn((n_links, 1), |(k, _)| self.links[k].weight);

        let mut src_var = file.add_variable::<i32>("src_address", &["num_links"])?;
        if n_links > 0 {
            src_var.put(src_address.view(), ..)?;
        }
        let mut dst_var = file.add_variable::<i32>("dst_address", &["num_links"])?;
        if n_links > 0 {
            dst_var.put(dst_address.view(), ..)?;
        }
        let mut wts_var = file.add_variable::<f64>("remap_matrix", &["num_links", "num_wts"])?;
        if n_links > 0 {
            wts_var.put(weights.view(), ..)?;
        }

        file.add_attribute("conventions", "SCRIP")?;
        file.add_attribute("normalization", "none")?;
        info!(path = %path.display(), links = n_links, "wrote remap weights");
        Ok(())
    }

    /// Read a SCRIP remap file, as written by [`RemapMatrix::to_netcdf`] or CDO
    pub fn from_netcdf(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = netcdf::open(path)?;

        let src_dims: Vec<i32> = required(&file, "src_grid_dims")?.get_values::<i32, _>(..)?;
        let dst_dims: Vec<i32> = required(&file, "dst_grid_dims")?.get_values::<i32, _>(..)?;
        let src_shape = grid_dims_to_shape(&src_dims, "source")?;
        let dst_shape = grid_dims_to_shape(&dst_dims, "destination")?;

        let dst_lats = read_centres(&required(&file, "dst_grid_center_lat")?)?;
        let dst_lons = read_centres(&required(&file, "dst_grid_center_lon")?)?;
        if dst_lats.len() != dst_shape.0 * dst_shape.1 || dst_lons.len() != dst_lats.len() {
            return Err(UmRegridError::weights(
                "Destination centre arrays do not match dst_grid_dims",
            ));
        }
        let dst_grid = Grid::from_centers(
            Array2::from_shape_vec(dst_shape, dst_lats)?,
            Array2::from_shape_vec(dst_shape, dst_lons)?,
        )?;

        let num_links = file.dimension("num_links").map(|d| d.len()).unwrap_or(0);
        let links = if num_links == 0 {
            Vec::new()
        } else {
            let src_address: Vec<i32> = required(&file, "src_address")?.get_values::<i32, _>(..)?;
            let dst_address: Vec<i32> = required(&file, "dst_address")?.get_values::<i32, _>(..)?;
            let matrix_var = required(&file, "remap_matrix")?;
            let num_wts = matrix_var
                .dimensions()
                .get(1)
                .map(|d| d.len())
                .unwrap_or(1)
                .max(1);
            let matrix: Vec<f64> = matrix_var.get_values::<f64, _>(..)?;

            if src_address.len() != num_links
                || dst_address.len() != num_links
                || matrix.len() != num_links * num_wts
            {
                return Err(UmRegridError::weights("Link arrays have inconsistent lengths"));
            }

            src_address
                .iter()
                .zip(&dst_address)
                .enumerate()
                .map(|(k, (&s, &d))| {
                    if s < 1 || d < 1 {
                        return Err(UmRegridError::weights(format!(
                            "Link {k} has a non-positive address"
                        )));
                    }
                    Ok(RemapLink {
                        src: (s - 1) as usize,
                        dst: (d - 1) as usize,
                        weight: matrix[k * num_wts],
                    })
                })
                .collect::<Result<Vec<_>>>()?
        };

        debug!(path = %path.display(), links = links.len(), "read remap weights");
        Self::new(src_shape, dst_grid, links)
    }
}

fn required<'f>(file: &'f netcdf::File, name: &str) -> Result<netcdf::Variable<'f>> {
    file.variable(name)
        .ok_or_else(|| UmRegridError::weights(format!("Weights file has no '{name}' variable")))
}

/// SCRIP stores grid dimensions as `[nx, ny]`
fn grid_dims_to_shape(dims: &[i32], which: &str) -> Result<(usize, usize)> {
    match dims {
        [nx, ny] if *nx > 0 && *ny > 0 => Ok((*ny as usize, *nx as usize)),
        [_] => Err(UmRegridError::UnsupportedGridError(format!(
            "Unstructured {which} grid in weights file"
        ))),
        _ => Err(UmRegridError::weights(format!(
            "Invalid {which} grid dimensions {dims:?}"
        ))),
    }
}

/// Centre coordinates in degrees
fn read_centres(var: &netcdf::Variable<'_>) -> Result<Vec<f64>> {
    let values: Vec<f64> = var.get_values::<f64, _>(..)?;
    let radians = match var.attribute("units").map(|a| a.value()) {
        Some(Ok(AttributeValue::Str(units))) => units.trim().eq_ignore_ascii_case("radians"),
        _ => false,
    };
    Ok(if radians {
        values.into_iter().map(f64::to_degrees).collect()
    } else {
        values
    })
}
