//! Regridding between horizontal grids
//!
//! Weights are produced by a [`WeightGenerator`] and held in a sparse
//! [`RemapMatrix`]. A [`Regridder`] applies them to any array on the source
//! grid, keeping non-horizontal axes and coordinates intact.

pub mod apply;
pub mod generate;
pub mod weights;

pub use apply::{regrid, valid_mask, GridSource, Regridder};
pub use generate::{CdoWeightGenerator, NativeBilinear, RemapMethod, WeightGenerator};
pub use weights::{RemapLink, RemapMatrix};
