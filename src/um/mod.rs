//! Unified Model support: global grids and surface ancillaries

pub mod ancil;
pub mod grid;
pub mod sstice;

pub use ancil::{
    create_surface_ancillary, AncilFile, AncilSink, Field, FieldData, FixedLengthHeader,
    IntegerConstants, RealConstants, UmTime, MDI,
};
pub use grid::{global_grid, FieldType, Resolution, UmGridConfig};
pub use sstice::sstice_ancillary;
