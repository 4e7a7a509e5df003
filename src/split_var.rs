//! Split a dataset into one file per variable

use crate::array::{DataArray, Dataset};
use crate::errors::Result;
use crate::netcdf_io::NetCDFWriter;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// The named variables of `dataset` in the order given, or all of them
pub fn split_by_var<'d>(dataset: &'d Dataset, names: Option<&[&str]>) -> Result<Vec<&'d DataArray>> {
    match names {
        Some(names) => names.iter().map(|name| dataset.variable(name)).collect(),
        None => Ok(dataset.variables().collect()),
    }
}

/// Write each selected variable to `<out_dir>/<name>.nc`
///
/// Each file carries the variable with its coordinates and the dataset's
/// global attributes. Returns the paths written.
pub fn write_split_vars(
    dataset: &Dataset,
    out_dir: impl AsRef<Path>,
    names: Option<&[&str]>,
) -> Result<Vec<PathBuf>> {
    let out_dir = out_dir.as_ref();
    fs::create_dir_all(out_dir)?;

    let mut written = Vec::new();
    for array in split_by_var(dataset, names)? {
        let name = array.label().to_string();
        let path = out_dir.join(format!("{name}.nc"));

        let mut single = Dataset::new().with_variable(name.clone(), array.clone());
        single.attrs = dataset.attrs.clone();
        NetCDFWriter::new(&path).write_dataset(&single)?;

        info!(var = %name, path = %path.display(), "wrote variable");
        written.push(path);
    }
    Ok(written)
}
