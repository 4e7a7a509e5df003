//! Configuration structures
//!
//! Plain structs with sensible defaults. Nothing here holds global state:
//! [`ComputeConfig`] builds its own rayon pool instead of touching the global one.

use crate::errors::{Result, UmRegridError};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::path::PathBuf;

/// Thread configuration used when materializing deferred arrays
#[derive(Debug, Clone, Default)]
pub struct ComputeConfig {
    pub num_threads: Option<usize>,
}

impl ComputeConfig {
    /// Create a new compute configuration
    pub fn new(num_threads: Option<usize>) -> Self {
        Self { num_threads }
    }

    /// Create a configuration that uses all available CPU cores
    pub fn all_cores() -> Self {
        Self {
            num_threads: Some(num_cpus::get()),
        }
    }

    /// Create a configuration that uses a specific number of threads
    pub fn with_threads(num_threads: usize) -> Self {
        Self {
            num_threads: Some(num_threads),
        }
    }

    /// Build a dedicated thread pool for this configuration
    pub fn build_pool(&self) -> Result<ThreadPool> {
        let mut builder = ThreadPoolBuilder::new();
        if let Some(num_threads) = self.num_threads {
            builder = builder.num_threads(num_threads);
        }
        builder.build().map_err(|e| {
            UmRegridError::ThreadPoolError(format!(
                "Failed to build thread pool with {:?} threads: {}",
                self.num_threads, e
            ))
        })
    }
}

/// How to invoke the external CDO weight generator
#[derive(Debug, Clone)]
pub struct CdoConfig {
    /// Executable name or path
    pub executable: PathBuf,
    /// Options placed before the operator, e.g. `-s` for silent mode
    pub global_options: Vec<String>,
}

impl Default for CdoConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("cdo"),
            global_options: Vec::new(),
        }
    }
}

impl CdoConfig {
    pub fn with_executable(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            ..Self::default()
        }
    }
}

/// Variable names and STASH codes for the SST / sea-ice ancillary
#[derive(Debug, Clone)]
pub struct SstIceConfig {
    pub sst_var: String,
    pub ice_var: String,
    pub sst_stash: i32,
    pub ice_stash: i32,
}

impl Default for SstIceConfig {
    fn default() -> Self {
        Self {
            sst_var: "tos".to_string(),
            ice_var: "sic".to_string(),
            sst_stash: 507,
            ice_stash: 31,
        }
    }
}
