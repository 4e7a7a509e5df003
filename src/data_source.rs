//! Data source abstraction over gridded input files
//!
//! The regridding and ancillary code works on [`DataArray`]s; a
//! [`DataSource`] is anything that can hand them out by name.

use crate::array::{DataArray, Dataset};
use crate::errors::{Result, UmRegridError};
use crate::netcdf_io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Read labelled arrays from some storage
pub trait DataSource {
    /// Names of the data variables, excluding coordinates and bounds
    fn list_variables(&self) -> Result<Vec<String>>;

    /// Read a variable fully into memory
    fn read_variable(&self, name: &str) -> Result<DataArray>;

    /// Open a variable whose values are read chunk by chunk along `chunk_dim`
    fn read_variable_lazy(&self, name: &str, chunk_dim: &str, chunk_len: usize) -> Result<DataArray>;

    /// Read the named variables, or all of them
    fn read_dataset(&self, names: Option<&[&str]>) -> Result<Dataset> {
        let names: Vec<String> = match names {
            Some(names) => names.iter().map(|n| n.to_string()).collect(),
            None => self.list_variables()?,
        };
        let mut dataset = Dataset::new();
        for name in names {
            let array = self.read_variable(&name)?;
            dataset.insert(name, array);
        }
        Ok(dataset)
    }
}

/// A single NetCDF file
#[derive(Debug, Clone)]
pub struct NetCDFSource {
    path: PathBuf,
}

impl NetCDFSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DataSource for NetCDFSource {
    fn list_variables(&self) -> Result<Vec<String>> {
        netcdf_io::data_variable_names(&self.path)
    }

    fn read_variable(&self, name: &str) -> Result<DataArray> {
        debug!(path = %self.path.display(), var = name, "reading variable");
        netcdf_io::open_dataarray(&self.path, name)
    }

    fn read_variable_lazy(&self, name: &str, chunk_dim: &str, chunk_len: usize) -> Result<DataArray> {
        netcdf_io::open_dataarray_lazy(&self.path, name, chunk_dim, chunk_len)
    }
}

/// A series of NetCDF files holding consecutive pieces of the same variables
///
/// Typical of reanalysis archives with one file per month or year. Reads join
/// the files along `concat_dim`, which is also the only dimension lazy reads
/// can be chunked along.
#[derive(Debug, Clone)]
pub struct NetCDFSeries {
    paths: Vec<PathBuf>,
    concat_dim: String,
}

impl NetCDFSeries {
    pub fn new<P: AsRef<Path>>(paths: impl IntoIterator<Item = P>, concat_dim: impl Into<String>) -> Self {
        Self {
            paths: paths.into_iter().map(|p| p.as_ref().to_path_buf()).collect(),
            concat_dim: concat_dim.into(),
        }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl DataSource for NetCDFSeries {
    fn list_variables(&self) -> Result<Vec<String>> {
        let first = self
            .paths
            .first()
            .ok_or_else(|| UmRegridError::Generic("Empty file series".to_string()))?;
        netcdf_io::data_variable_names(first)
    }

    fn read_variable(&self, name: &str) -> Result<DataArray> {
        debug!(files = self.paths.len(), var = name, "reading variable from series");
        self.read_variable_lazy(name, &self.concat_dim, 1)?.compute()
    }

    fn read_variable_lazy(&self, name: &str, chunk_dim: &str, chunk_len: usize) -> Result<DataArray> {
        if chunk_dim != self.concat_dim {
            return Err(UmRegridError::Generic(format!(
                "File series joined along '{}' cannot be chunked along '{chunk_dim}'",
                self.concat_dim
            )));
        }
        netcdf_io::open_mfdataarray_lazy(&self.paths, name, chunk_dim, chunk_len)
    }
}
