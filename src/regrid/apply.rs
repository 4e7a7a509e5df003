//! Applying weights to labelled arrays

use super::generate::{RemapMethod, WeightGenerator};
use super::weights::RemapMatrix;
use crate::array::{ArrayData, DataArray};
use crate::dimension::{is_latitude_units, is_longitude_units};
use crate::errors::{Result, UmRegridError};
use crate::grid::{identify, identify_grid, Grid};
use ndarray::{Array2, ArrayD, IxDyn};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Where a grid comes from: given directly or identified on an array
#[derive(Debug, Clone, Copy)]
pub enum GridSource<'a> {
    Grid(&'a Grid),
    Array(&'a DataArray),
}

impl<'a> From<&'a Grid> for GridSource<'a> {
    fn from(grid: &'a Grid) -> Self {
        GridSource::Grid(grid)
    }
}

impl<'a> From<&'a DataArray> for GridSource<'a> {
    fn from(array: &'a DataArray) -> Self {
        GridSource::Array(array)
    }
}

impl GridSource<'_> {
    pub fn resolve(&self) -> Result<Grid> {
        match self {
            GridSource::Grid(grid) => Ok((*grid).clone()),
            GridSource::Array(array) => identify_grid(array),
        }
    }
}

/// Positions of the horizontal axes in an array and where the output puts them
#[derive(Debug, Clone)]
struct Layout {
    y_axis: usize,
    x_axis: usize,
    /// Index among the non-horizontal axes where the destination axes go
    insert_at: usize,
}

impl Layout {
    fn new(y_axis: usize, x_axis: usize) -> Self {
        let first = y_axis.min(x_axis);
        Self {
            y_axis,
            x_axis,
            insert_at: first,
        }
    }

    fn extra_axes(&self, ndim: usize) -> Vec<usize> {
        (0..ndim)
            .filter(|&k| k != self.y_axis && k != self.x_axis)
            .collect()
    }

    /// Output position of input axis `axis`, which must not be horizontal
    fn output_axis(&self, axis: usize) -> usize {
        let rank = (0..axis)
            .filter(|&k| k != self.y_axis && k != self.x_axis)
            .count();
        if rank < self.insert_at {
            rank
        } else {
            rank + 2
        }
    }
}

/// The per-block regridding computation, shared by eager and deferred paths
struct Kernel {
    weights: Arc<RemapMatrix>,
    layout: Layout,
}

impl Kernel {
    fn apply(&self, block: ArrayD<f64>) -> Result<ArrayD<f64>> {
        let shape = block.shape().to_vec();
        let (ny, nx) = self.weights.src_shape();
        let (y, x) = (self.layout.y_axis, self.layout.x_axis);
        if (shape[y], shape[x]) != (ny, nx) {
            return Err(UmRegridError::RegridShapeError {
                expected: vec![ny, nx],
                found: vec![shape[y], shape[x]],
            });
        }

        let extras = self.layout.extra_axes(shape.len());
        let extra_shape: Vec<usize> = extras.iter().map(|&k| shape[k]).collect();
        let n_extra: usize = extra_shape.iter().product();

        let mut order = extras.clone();
        order.extend([y, x]);
        let moved = block.permuted_axes(IxDyn(&order));
        let flat = Array2::from_shape_vec((n_extra, ny * nx), moved.iter().copied().collect())?;

        let regridded = self.weights.apply_flat(flat.view())?;

        let (dny, dnx) = self.weights.dst_shape();
        let mut out_shape = extra_shape;
        out_shape.extend([dny, dnx]);
        let out = regridded.into_shape(IxDyn(&out_shape))?;

        let m = extras.len();
        let p = self.layout.insert_at;
        if p == m {
            return Ok(out);
        }
        let mut back: Vec<usize> = (0..p).collect();
        back.extend([m, m + 1]);
        back.extend(p..m);
        Ok(out.permuted_axes(IxDyn(&back)).as_standard_layout().into_owned())
    }
}

/// Reusable regridding operation from one grid to another
///
/// Weights are computed once, by a [`WeightGenerator`] or loaded from a file,
/// and applied to any number of arrays on the source grid.
#[derive(Debug, Clone)]
pub struct Regridder {
    weights: Arc<RemapMatrix>,
}

impl Regridder {
    pub fn from_weights(weights: RemapMatrix) -> Self {
        Self {
            weights: Arc::new(weights),
        }
    }

    /// Reuse weights previously saved with [`Regridder::save_weights`] or made by CDO
    pub fn from_weights_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_weights(RemapMatrix::from_netcdf(path)?))
    }

    pub fn new<'a, 'b>(
        source: impl Into<GridSource<'a>>,
        target: impl Into<GridSource<'b>>,
        method: RemapMethod,
        generator: &dyn WeightGenerator,
    ) -> Result<Self> {
        Self::build(source.into(), target.into(), method, generator, None)
    }

    /// Like [`Regridder::new`], omitting source cells where `source_mask` is false
    pub fn with_mask<'a, 'b>(
        source: impl Into<GridSource<'a>>,
        target: impl Into<GridSource<'b>>,
        method: RemapMethod,
        generator: &dyn WeightGenerator,
        source_mask: &Array2<bool>,
    ) -> Result<Self> {
        Self::build(source.into(), target.into(), method, generator, Some(source_mask))
    }

    fn build(
        source: GridSource<'_>,
        target: GridSource<'_>,
        method: RemapMethod,
        generator: &dyn WeightGenerator,
        source_mask: Option<&Array2<bool>>,
    ) -> Result<Self> {
        let source = source.resolve()?;
        let target = target.resolve()?;
        info!(
            %method,
            source = ?source.shape(),
            target = ?target.shape(),
            "building regridder"
        );
        let weights = generator.generate_weights(&source, &target, method, source_mask)?;
        Ok(Self::from_weights(weights))
    }

    pub fn weights(&self) -> &RemapMatrix {
        &self.weights
    }

    pub fn save_weights(&self, path: impl AsRef<Path>) -> Result<()> {
        self.weights.to_netcdf(path)
    }

    fn locate_horizontal(&self, source: &DataArray) -> Result<(usize, usize)> {
        let (ny, nx) = self.weights.src_shape();
        match identify(source) {
            Ok(found) => {
                let y = source.dim_index(&found.y_dim).ok_or_else(|| UmRegridError::DimensionNotFound {
                    var: source.label().to_string(),
                    dim: found.y_dim.clone(),
                })?;
                let x = source.dim_index(&found.x_dim).ok_or_else(|| UmRegridError::DimensionNotFound {
                    var: source.label().to_string(),
                    dim: found.x_dim.clone(),
                })?;
                let shape = source.shape();
                if (shape[y], shape[x]) != (ny, nx) {
                    return Err(UmRegridError::RegridShapeError {
                        expected: vec![ny, nx],
                        found: vec![shape[y], shape[x]],
                    });
                }
                Ok((y, x))
            }
            Err(err @ UmRegridError::GridIdentificationError(_)) => {
                if has_horizontal_hints(source) {
                    return Err(err);
                }
                // Bare arrays: accept the single adjacent axis pair matching the weights
                let shape = source.shape();
                let candidates: Vec<usize> = (1..shape.len())
                    .filter(|&k| (shape[k - 1], shape[k]) == (ny, nx))
                    .collect();
                match candidates.as_slice() {
                    [k] => {
                        debug!(var = source.label(), axis = k - 1, "horizontal axes taken from shape");
                        Ok((k - 1, *k))
                    }
                    [] => Err(UmRegridError::RegridShapeError {
                        expected: vec![ny, nx],
                        found: shape,
                    }),
                    _ => Err(err),
                }
            }
            Err(other) => Err(other),
        }
    }

    /// Regrid `source` onto the destination grid
    ///
    /// Axes other than the horizontal pair pass through unchanged; the
    /// destination axes take the place of the first source horizontal axis.
    /// Deferred input stays deferred.
    pub fn regrid(&self, source: &DataArray) -> Result<DataArray> {
        let (y, x) = self.locate_horizontal(source)?;
        let layout = Layout::new(y, x);
        let dst_grid = self.weights.dst_grid();
        let (dny, dnx) = dst_grid.shape();
        let (ydim, xdim) = dst_grid.dim_names();

        let extras = layout.extra_axes(source.ndim());
        for &k in &extras {
            if source.dims[k] == ydim || source.dims[k] == xdim {
                return Err(UmRegridError::Generic(format!(
                    "Dimension '{}' of '{}' clashes with the destination grid",
                    source.dims[k],
                    source.label()
                )));
            }
        }

        let mut dims: Vec<String> = extras.iter().map(|&k| source.dims[k].clone()).collect();
        dims.insert(layout.insert_at, xdim.to_string());
        dims.insert(layout.insert_at, ydim.to_string());

        let shape = source.shape();
        let mut out_shape: Vec<usize> = extras.iter().map(|&k| shape[k]).collect();
        out_shape.insert(layout.insert_at, dnx);
        out_shape.insert(layout.insert_at, dny);

        let kernel = Kernel {
            weights: Arc::clone(&self.weights),
            layout: layout.clone(),
        };

        let data = match &source.data {
            ArrayData::Eager(values) => ArrayData::Eager(kernel.apply(values.clone())?),
            ArrayData::Deferred(lazy) => {
                let chunk_axis = lazy.chunk_axis();
                let lazy = if chunk_axis == y || chunk_axis == x {
                    lazy.map_whole(out_shape, layout.insert_at, move |block| kernel.apply(block))?
                } else {
                    let out_axis = layout.output_axis(chunk_axis);
                    lazy.map_chunks(out_shape, out_axis, move |block| kernel.apply(block))?
                };
                ArrayData::Deferred(lazy)
            }
        };

        let horizontal = [source.dims[y].as_str(), source.dims[x].as_str()];
        let mut out = DataArray::new(dims, data)?;
        out.name = source.name.clone();
        out.attrs = source.attrs.clone();
        for coord in &source.coords {
            if !coord.dims.iter().any(|d| horizontal.contains(&d.as_str())) {
                out.set_coord(coord.clone())?;
            }
        }
        let (lat, lon) = dst_grid.coordinates();
        out.set_coord(lat)?;
        out.set_coord(lon)?;

        debug!(var = source.label(), shape = ?out.shape(), lazy = out.is_lazy(), "regridded");
        Ok(out)
    }
}

/// Whether any coordinate looks like latitude or longitude by name or units
fn has_horizontal_hints(source: &DataArray) -> bool {
    source.coords.iter().any(|c| {
        let name = c.name.to_ascii_lowercase();
        name.contains("lat")
            || name.contains("lon")
            || c.units().map_or(false, |u| is_latitude_units(u) || is_longitude_units(u))
    })
}

/// One-shot regrid: identify grids, generate weights and apply them
pub fn regrid<'a>(
    source: &DataArray,
    target: impl Into<GridSource<'a>>,
    method: RemapMethod,
    generator: &dyn WeightGenerator,
) -> Result<DataArray> {
    Regridder::new(source, target, method, generator)?.regrid(source)
}

/// Valid-cell mask of `array` on its horizontal grid, from the first slice
///
/// A cell is valid when its value is finite. Only one horizontal slice is
/// materialized, even for deferred arrays.
pub fn valid_mask(array: &DataArray) -> Result<Array2<bool>> {
    let found = identify(array)?;
    let mut slice = array.clone();
    let extras: Vec<String> = array
        .dims
        .iter()
        .filter(|d| **d != found.y_dim && **d != found.x_dim)
        .cloned()
        .collect();
    for dim in &extras {
        slice = slice.isel(dim, 0)?;
    }

    let values = slice.values()?.into_dimensionality::<ndarray::Ix2>()?;
    let values = if slice.dims[0] == found.y_dim {
        values
    } else {
        values.reversed_axes()
    };
    Ok(values.mapv(f64::is_finite))
}

