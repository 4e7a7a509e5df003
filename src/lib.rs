//! um_regrid: horizontal regridding and Unified Model ancillaries
//!
//! A Rust library for moving gridded climate data between horizontal grids
//! and packaging reanalysis fields (such as sea surface temperature and sea
//! ice) as Unified Model surface ancillaries.
//!
//! ## Key Features
//!
//! - **Grid Identification**: Find latitude and longitude coordinates by their units and
//!   build rectilinear or curvilinear grid descriptions
//! - **Weight Generation**: Remapping weights from CDO, or a native bilinear generator for
//!   rectilinear grids
//! - **Lazy Regridding**: Apply weights across any extra dimensions (time, level, ensemble)
//!   chunk by chunk, with Rayon for the sparse multiply
//! - **UM Grids**: ENDGame `nN` global grids for T, U and V points
//! - **Ancillaries**: Surface ancillary headers and fields with validation
//! - **NetCDF I/O**: CF-aware reading and writing of labelled arrays
//!
//! ## Module Organization
//!
//! - [`array`]: Labelled arrays, coordinates and datasets
//! - [`lazy`]: Deferred, chunked arrays
//! - [`dimension`]: Coordinate identification and CF time handling
//! - [`grid`]: Grid descriptions, identification and CDO/SCRIP serialisation
//! - [`regrid`]: Weight generation and application
//! - [`um`]: UM global grids and ancillary construction
//! - [`netcdf_io`]: NetCDF file I/O
//! - [`data_source`]: Data source abstraction
//! - [`split_var`]: One file per variable
//! - [`config`]: Compute and tool configuration
//! - [`errors`]: Centralized error handling
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use um_regrid::prelude::*;
//!
//! let source = NetCDFSource::new("era_interim_sst.nc");
//! let sst = source.read_variable_lazy("tos", "time", 12).unwrap();
//!
//! let target = global_grid("n96e", FieldType::T, None).unwrap();
//! let generator = CdoWeightGenerator::new(CdoConfig::default());
//! let regridder = Regridder::new(&sst, &target, RemapMethod::Bilinear, &generator).unwrap();
//!
//! let on_n96 = regridder.regrid(&sst).unwrap();
//! write_dataarray(&on_n96, "tos_n96e.nc").unwrap();
//! ```

pub mod array;
pub mod config;
pub mod data_source;
pub mod dimension;
pub mod errors;
pub mod grid;
pub mod lazy;
pub mod netcdf_io;
pub mod regrid;
pub mod split_var;
pub mod um;

pub use errors::{Result, UmRegridError};

pub mod prelude {
    //! Commonly used imports for convenience
    pub use crate::array::{ArrayData, Coordinate, DataArray, Dataset};
    pub use crate::config::{CdoConfig, ComputeConfig, SstIceConfig};
    pub use crate::data_source::{DataSource, NetCDFSeries, NetCDFSource};
    pub use crate::errors::{Result, UmRegridError};
    pub use crate::grid::{identify_grid, Grid};
    pub use crate::lazy::LazyArray;
    pub use crate::netcdf_io::{open_dataarray, open_dataset, write_dataarray, write_dataset, NetCDFWriter};
    pub use crate::regrid::{regrid, CdoWeightGenerator, NativeBilinear, RemapMatrix, RemapMethod, Regridder, WeightGenerator};
    pub use crate::split_var::{split_by_var, write_split_vars};
    pub use crate::um::{global_grid, sstice_ancillary, AncilFile, FieldType, UmGridConfig};
}
