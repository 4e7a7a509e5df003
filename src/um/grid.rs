//! Unified Model global grids
//!
//! Resolutions are written `n<N>` with an optional `e` suffix for ENDGame
//! grids, e.g. `n96e`. Only ENDGame grids are supported.

use crate::errors::{Result, UmRegridError};
use crate::grid::Grid;
use ndarray::Array1;
use std::str::FromStr;

/// Which staggered field a grid describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldType {
    /// Cell centres (theta points)
    #[default]
    T,
    /// Eastward wind points, shifted half a cell west
    U,
    /// Northward wind points, on cell edges including both poles
    V,
}

impl FromStr for FieldType {
    type Err = UmRegridError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "T" => Ok(FieldType::T),
            "U" => Ok(FieldType::U),
            "V" => Ok(FieldType::V),
            other => Err(UmRegridError::InvalidGrid(format!("Unknown field type '{other}'"))),
        }
    }
}

/// A parsed resolution string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub n: usize,
    pub endgame_suffix: bool,
}

impl FromStr for Resolution {
    type Err = UmRegridError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || UmRegridError::InvalidGrid(format!("Invalid resolution '{s}'"));
        let lower = s.trim().to_ascii_lowercase();
        let digits = lower.strip_prefix('n').ok_or_else(invalid)?;
        let (digits, endgame_suffix) = match digits.strip_suffix('e') {
            Some(d) => (d, true),
            None => (digits, false),
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let n: usize = digits.parse().map_err(|_| invalid())?;
        if n == 0 || n % 2 != 0 {
            return Err(invalid());
        }
        Ok(Self { n, endgame_suffix })
    }
}

/// An explicit flag wins over the resolution suffix
pub fn resolve_endgame(suffix: bool, explicit: Option<bool>) -> bool {
    explicit.unwrap_or(suffix)
}

/// Everything needed to build a UM global grid
#[derive(Debug, Clone)]
pub struct UmGridConfig {
    pub resolution: String,
    pub field: FieldType,
    pub endgame: Option<bool>,
}

impl UmGridConfig {
    pub fn new(resolution: impl Into<String>) -> Self {
        Self {
            resolution: resolution.into(),
            field: FieldType::T,
            endgame: None,
        }
    }

    pub fn with_field(mut self, field: FieldType) -> Self {
        self.field = field;
        self
    }

    pub fn with_endgame(mut self, endgame: bool) -> Self {
        self.endgame = Some(endgame);
        self
    }

    pub fn grid(&self) -> Result<Grid> {
        global_grid(&self.resolution, self.field, self.endgame)
    }
}

/// Rectilinear global grid of a UM resolution
///
/// An ENDGame `nN` grid has `2N` longitudes and `3N/2` latitudes. T points sit
/// at cell centres, U points are shifted to start at 0 degrees east and V
/// points run pole to pole with one extra row.
pub fn global_grid(resolution: &str, field: FieldType, endgame: Option<bool>) -> Result<Grid> {
    let parsed: Resolution = resolution.parse()?;
    if !resolve_endgame(parsed.endgame_suffix, endgame) {
        return Err(UmRegridError::UnsupportedGridError(format!(
            "New Dynamics grids are not supported ('{resolution}')"
        )));
    }

    let nx = 2 * parsed.n;
    let mut ny = parsed.n * 3 / 2;
    let dx = 360.0 / nx as f64;
    let dy = 180.0 / ny as f64;

    let mut x0 = dx / 2.0;
    let mut y0 = -90.0 + dy / 2.0;
    match field {
        FieldType::T => {}
        FieldType::U => x0 = 0.0,
        FieldType::V => {
            ny += 1;
            y0 = -90.0;
        }
    }

    let lons = Array1::from_shape_fn(nx, |i| x0 + i as f64 * dx);
    let lats = Array1::from_shape_fn(ny, |j| y0 + j as f64 * dy);
    Grid::rectilinear(lats, lons)
}
