//! Sea surface temperature and sea ice ancillary from reanalysis fields

use super::ancil::{create_surface_ancillary, AncilFile};
use crate::array::Dataset;
use crate::config::SstIceConfig;
use crate::errors::Result;
use crate::grid::{identify_grid, Grid};
use crate::regrid::{valid_mask, RemapMethod, Regridder, WeightGenerator};
use tracing::info;

/// Regrid SST and sea ice onto `target` and package them as an ancillary
///
/// Land points are taken from the missing values of the SST field and are
/// excluded from the interpolation weights of both variables.
pub fn sstice_ancillary(
    data: &Dataset,
    target: &Grid,
    generator: &dyn WeightGenerator,
    config: &SstIceConfig,
) -> Result<AncilFile> {
    let sst = data.variable(&config.sst_var)?;
    let ice = data.variable(&config.ice_var)?;

    let source = identify_grid(sst)?;
    let mask = valid_mask(sst)?;
    let weights = generator.generate_weights(&source, target, RemapMethod::Bilinear, Some(&mask))?;
    let regridder = Regridder::from_weights(weights);

    info!(
        sst = %config.sst_var,
        ice = %config.ice_var,
        target = ?target.shape(),
        "regridding sst and sea ice"
    );

    let mut regridded = Dataset::new();
    regridded.insert(config.sst_var.clone(), regridder.regrid(sst)?);
    regridded.insert(config.ice_var.clone(), regridder.regrid(ice)?);

    create_surface_ancillary(
        &regridded,
        &[
            (config.sst_var.as_str(), config.sst_stash),
            (config.ice_var.as_str(), config.ice_stash),
        ],
    )
}
