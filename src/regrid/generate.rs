//! Weight generation
//!
//! [`WeightGenerator`] is the seam between the regridding driver and whatever
//! computes interpolation weights. [`CdoWeightGenerator`] shells out to the
//! CDO toolkit; [`NativeBilinear`] computes bilinear weights in process for
//! rectilinear sources.

use super::weights::{RemapLink, RemapMatrix};
use crate::config::CdoConfig;
use crate::errors::{Result, UmRegridError};
use crate::grid::Grid;
use ndarray::Array2;
use rayon::prelude::*;
use std::fmt;
use std::process::Command;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Interpolation method requested from a weight generator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemapMethod {
    Bilinear,
    Conservative,
    NearestNeighbor,
    Bicubic,
    DistanceWeighted,
}

impl RemapMethod {
    /// CDO operator producing weights for this method
    pub fn cdo_operator(self) -> &'static str {
        match self {
            RemapMethod::Bilinear => "genbil",
            RemapMethod::Conservative => "gencon",
            RemapMethod::NearestNeighbor => "gennn",
            RemapMethod::Bicubic => "genbic",
            RemapMethod::DistanceWeighted => "gendis",
        }
    }
}

impl fmt::Display for RemapMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RemapMethod::Bilinear => "bilinear",
            RemapMethod::Conservative => "conservative",
            RemapMethod::NearestNeighbor => "nearest-neighbor",
            RemapMethod::Bicubic => "bicubic",
            RemapMethod::DistanceWeighted => "distance-weighted",
        };
        f.write_str(name)
    }
}

impl FromStr for RemapMethod {
    type Err = UmRegridError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "bilinear" | "bil" => Ok(RemapMethod::Bilinear),
            "conservative" | "con" => Ok(RemapMethod::Conservative),
            "nearest-neighbor" | "nearest" | "nn" => Ok(RemapMethod::NearestNeighbor),
            "bicubic" | "bic" => Ok(RemapMethod::Bicubic),
            "distance-weighted" | "distance" | "dis" => Ok(RemapMethod::DistanceWeighted),
            other => Err(UmRegridError::weights(format!("Unknown remap method '{other}'"))),
        }
    }
}

/// Something that can compute a [`RemapMatrix`] between two grids
pub trait WeightGenerator: Send + Sync {
    /// Weights from `source` to `target`
    ///
    /// When given, `source_mask` is `true` for valid source cells. A destination
    /// cell whose stencil reaches an invalid cell gets no links and is missing.
    fn generate_weights(
        &self,
        source: &Grid,
        target: &Grid,
        method: RemapMethod,
        source_mask: Option<&Array2<bool>>,
    ) -> Result<RemapMatrix>;
}

fn check_mask(source: &Grid, mask: Option<&Array2<bool>>) -> Result<()> {
    if let Some(mask) = mask {
        let (ny, nx) = source.shape();
        if mask.dim() != (ny, nx) {
            return Err(UmRegridError::RegridShapeError {
                expected: vec![ny, nx],
                found: mask.shape().to_vec(),
            });
        }
    }
    Ok(())
}

/// Weights from the external `cdo` program
#[derive(Debug, Clone, Default)]
pub struct CdoWeightGenerator {
    config: CdoConfig,
}

impl CdoWeightGenerator {
    pub fn new(config: CdoConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CdoConfig {
        &self.config
    }
}

impl WeightGenerator for CdoWeightGenerator {
    fn generate_weights(
        &self,
        source: &Grid,
        target: &Grid,
        method: RemapMethod,
        source_mask: Option<&Array2<bool>>,
    ) -> Result<RemapMatrix> {
        check_mask(source, source_mask)?;

        let scratch = tempfile::tempdir()?;
        let source_path = scratch.path().join("source.nc");
        let target_path = scratch.path().join("target.grid");
        let weights_path = scratch.path().join("weights.nc");

        source.to_netcdf(&source_path, source_mask)?;
        target.write_cdo_grid(&target_path)?;

        let mut command = Command::new(&self.config.executable);
        command
            .args(&self.config.global_options)
            .arg(format!("{},{}", method.cdo_operator(), target_path.display()))
            .arg(&source_path)
            .arg(&weights_path);

        info!(
            executable = %self.config.executable.display(),
            %method,
            source = ?source.shape(),
            target = ?target.shape(),
            "generating weights with cdo"
        );

        let output = command.output().map_err(|e| UmRegridError::WeightGenerationError {
            message: format!("Failed to run {}: {e}", self.config.executable.display()),
            diagnostics: String::new(),
        })?;

        let mut diagnostics = String::from_utf8_lossy(&output.stderr).into_owned();
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            diagnostics.push_str(&stdout);
        }

        if !output.status.success() {
            warn!(status = %output.status, "cdo failed");
            return Err(UmRegridError::WeightGenerationError {
                message: format!("cdo {} exited with {}", method.cdo_operator(), output.status),
                diagnostics,
            });
        }

        let weights = RemapMatrix::from_netcdf(&weights_path).map_err(|e| match e {
            UmRegridError::WeightGenerationError { message, .. } => {
                UmRegridError::WeightGenerationError {
                    message,
                    diagnostics: diagnostics.clone(),
                }
            }
            other => UmRegridError::WeightGenerationError {
                message: format!("Unreadable weights file: {other}"),
                diagnostics: diagnostics.clone(),
            },
        })?;

        if weights.src_shape() != source.shape() {
            return Err(UmRegridError::WeightGenerationError {
                message: format!(
                    "cdo weights have source shape {:?}, expected {:?}",
                    weights.src_shape(),
                    source.shape()
                ),
                diagnostics,
            });
        }

        let weights = weights.with_dst_grid(target.clone())?;
        debug!(links = weights.num_links(), "cdo weights loaded");
        match source_mask {
            Some(mask) => weights.without_sources(mask),
            None => Ok(weights),
        }
    }
}

/// In-process bilinear weights for rectilinear source grids
///
/// Latitude axes may run either way. Longitude is treated as periodic when the
/// gap across the 0/360 seam is no wider than the largest interior spacing.
/// Destination points outside the source latitude range get no links.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeBilinear;

/// Bracketing indices and the fractional distance from the first to the second
type Bracket = (usize, usize, f64);

fn bracket_lat(axis: &[f64], x: f64) -> Option<Bracket> {
    let n = axis.len();
    if n == 1 {
        return (axis[0] == x).then_some((0, 0, 0.0));
    }
    let ascending = axis[n - 1] > axis[0];
    let (lo, hi) = if ascending { (axis[0], axis[n - 1]) } else { (axis[n - 1], axis[0]) };
    if !(lo..=hi).contains(&x) {
        return None;
    }
    let k = if ascending {
        axis.partition_point(|&v| v <= x)
    } else {
        axis.partition_point(|&v| v >= x)
    };
    let i = k.saturating_sub(1).min(n - 2);
    let frac = (x - axis[i]) / (axis[i + 1] - axis[i]);
    Some((i, i + 1, frac))
}

/// Longitudes sorted into [0, 360) with their original indices
struct LonAxis {
    sorted: Vec<(f64, usize)>,
    periodic: bool,
}

impl LonAxis {
    fn new(lons: &[f64]) -> Self {
        let mut sorted: Vec<(f64, usize)> = lons
            .iter()
            .enumerate()
            .map(|(i, &v)| (v.rem_euclid(360.0), i))
            .collect();
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

        let n = sorted.len();
        let periodic = n > 1 && {
            let max_step = sorted
                .windows(2)
                .map(|w| w[1].0 - w[0].0)
                .fold(0.0_f64, f64::max);
            let seam = sorted[0].0 + 360.0 - sorted[n - 1].0;
            seam <= max_step * (1.0 + 1e-9) + 1e-9
        };
        Self { sorted, periodic }
    }

    fn bracket(&self, x: f64) -> Option<Bracket> {
        let n = self.sorted.len();
        let x = x.rem_euclid(360.0);
        let (first, last) = (self.sorted[0], self.sorted[n - 1]);
        let frac = |a: f64, b: f64| if b > a { (x - a) / (b - a) } else { 0.0 };

        let k = self.sorted.partition_point(|&(v, _)| v <= x);
        if k == 0 {
            return self
                .periodic
                .then(|| (last.1, first.1, frac(last.0 - 360.0, first.0)));
        }
        if k == n {
            if x == last.0 {
                return Some((last.1, last.1, 0.0));
            }
            return self
                .periodic
                .then(|| (last.1, first.1, frac(last.0, first.0 + 360.0)));
        }
        let (a, b) = (self.sorted[k - 1], self.sorted[k]);
        Some((a.1, b.1, frac(a.0, b.0)))
    }
}

impl WeightGenerator for NativeBilinear {
    fn generate_weights(
        &self,
        source: &Grid,
        target: &Grid,
        method: RemapMethod,
        source_mask: Option<&Array2<bool>>,
    ) -> Result<RemapMatrix> {
        if method != RemapMethod::Bilinear {
            return Err(UmRegridError::weights(format!(
                "In-process weights only support bilinear remapping, not {method}"
            )));
        }
        let Grid::Rectilinear(src) = source else {
            return Err(UmRegridError::UnsupportedGridError(
                "In-process bilinear weights need a rectilinear source grid".to_string(),
            ));
        };
        check_mask(source, source_mask)?;

        let lats = src.lats().to_vec();
        let lon_axis = LonAxis::new(&src.lons().to_vec());
        let nx = src.lons().len();

        let dst_lats = target.center_lats();
        let dst_lons = target.center_lons();
        let points: Vec<(f64, f64)> = dst_lats
            .iter()
            .zip(dst_lons.iter())
            .map(|(&lat, &lon)| (lat, lon))
            .collect();

        let links: Vec<RemapLink> = points
            .par_iter()
            .enumerate()
            .flat_map_iter(|(dst, &(lat, lon))| {
                let corners = match (bracket_lat(&lats, lat), lon_axis.bracket(lon)) {
                    (Some((j0, j1, t)), Some((i0, i1, u))) => vec![
                        (j0, i0, (1.0 - t) * (1.0 - u)),
                        (j0, i1, (1.0 - t) * u),
                        (j1, i0, t * (1.0 - u)),
                        (j1, i1, t * u),
                    ],
                    _ => Vec::new(),
                };
                let mut corners: Vec<_> = corners.into_iter().filter(|&(_, _, w)| w != 0.0).collect();
                // A partly masked stencil leaves the point unmapped
                if let Some(mask) = source_mask {
                    if corners.iter().any(|&(j, i, _)| !mask[[j, i]]) {
                        corners.clear();
                    }
                }
                corners
                    .into_iter()
                    .map(move |(j, i, weight)| RemapLink {
                        dst,
                        src: j * nx + i,
                        weight,
                    })
            })
            .collect();

        debug!(links = links.len(), "computed bilinear weights");
        RemapMatrix::new(source.shape(), target.clone(), links)
    }
}
