//! Centralized error handling for um_regrid
//!
//! Every fallible operation in the crate returns [`Result`], whose error type
//! names the stage that detected the fault. None of these errors are retried
//! or downgraded internally.

use thiserror::Error;

/// Main error type for um_regrid operations
#[derive(Error, Debug)]
pub enum UmRegridError {
    /// Latitude/longitude axes are missing, ambiguous or carry unknown units
    #[error("Grid identification error: {0}")]
    GridIdentificationError(String),

    /// The weight generator failed; `diagnostics` holds the tool's output
    #[error("Weight generation error: {message}{}", format_diagnostics(.diagnostics))]
    WeightGenerationError { message: String, diagnostics: String },

    /// Weight matrix source size does not match the array being regridded
    #[error("Regrid shape error: weights expect source shape {expected:?}, found {found:?}")]
    RegridShapeError {
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    /// A grid kind that is recognised but not implemented
    #[error("Unsupported grid: {0}")]
    UnsupportedGridError(String),

    /// Grid values violate the grid invariants (monotonic axes, matching shapes)
    #[error("Invalid grid: {0}")]
    InvalidGrid(String),

    /// Input cannot be turned into an ancillary file
    #[error("Ancillary error: {0}")]
    AncillaryError(String),

    /// Variable not found in a file or dataset
    #[error("Variable '{var}' not found")]
    VariableNotFound { var: String },

    /// Dimension not found in variable
    #[error("Dimension '{dim}' not found in variable '{var}'")]
    DimensionNotFound { var: String, dim: String },

    /// NetCDF file operation errors
    #[error("NetCDF error: {0}")]
    NetCDFError(#[from] netcdf::Error),

    /// I/O operation errors
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Array shape or dimension error
    #[error("Array error: {0}")]
    ArrayError(#[from] ndarray::ShapeError),

    /// Thread pool configuration error
    #[error("Thread pool error: {0}")]
    ThreadPoolError(String),

    /// Anything else
    #[error("{0}")]
    Generic(String),
}

fn format_diagnostics(diagnostics: &str) -> String {
    let trimmed = diagnostics.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("\n{trimmed}")
    }
}

impl UmRegridError {
    pub(crate) fn grid_id(message: impl Into<String>) -> Self {
        Self::GridIdentificationError(message.into())
    }

    pub(crate) fn weights(message: impl Into<String>) -> Self {
        Self::WeightGenerationError {
            message: message.into(),
            diagnostics: String::new(),
        }
    }
}

impl From<String> for UmRegridError {
    fn from(error: String) -> Self {
        UmRegridError::Generic(error)
    }
}

impl From<&str> for UmRegridError {
    fn from(error: &str) -> Self {
        UmRegridError::Generic(error.to_string())
    }
}

/// Result type alias for um_regrid operations
pub type Result<T> = std::result::Result<T, UmRegridError>;
