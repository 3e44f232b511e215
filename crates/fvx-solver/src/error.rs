//! Error type for the finite-volume core.

use thiserror::Error;

use crate::dimensions::DimensionSet;

pub type Result<T> = std::result::Result<T, FvError>;

#[derive(Error, Debug)]
pub enum FvError {
    #[error("unknown {category} type '{name}', valid {category} types are: {}", valid.join(" "))]
    UnknownSelection {
        category: String,
        name: String,
        valid: Vec<String>,
    },

    #[error("keyword '{key}' is undefined in dictionary '{dictionary}'")]
    MissingEntry { dictionary: String, key: String },

    #[error("malformed scheme specification: {0}")]
    BadSchemeSpec(String),

    #[error("incompatible dimensions for operation [{lhs}{lhs_dims}] {op} [{rhs}{rhs_dims}]")]
    DimensionMismatch {
        op: String,
        lhs: String,
        lhs_dims: DimensionSet,
        rhs: String,
        rhs_dims: DimensionSet,
    },

    #[error("incompatible fields for operation [{lhs}] {op} [{rhs}]")]
    FieldMismatch { op: String, lhs: String, rhs: String },

    #[error(
        "flux requested but {0} not specified in the fluxRequired sub-dictionary of fvSchemes"
    )]
    FluxNotRequired(String),

    #[error("coefficients requested from calculated patch '{patch}' of field '{field}'")]
    CalculatedPatch { field: String, patch: String },

    #[error("size mismatch for {what}: expected {expected}, found {found}")]
    SizeMismatch {
        what: String,
        expected: usize,
        found: usize,
    },

    #[error("mesh error: {0}")]
    Mesh(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("parallel communication failed: {0}")]
    Parallel(String),

    #[error(transparent)]
    Io(fvx_io::IoError),
}

impl From<fvx_io::IoError> for FvError {
    fn from(err: fvx_io::IoError) -> Self {
        match err {
            fvx_io::IoError::MissingEntry { dictionary, key } => {
                FvError::MissingEntry { dictionary, key }
            }
            other => FvError::Io(other),
        }
    }
}

impl From<fvx_dict::ParseError> for FvError {
    fn from(err: fvx_dict::ParseError) -> Self {
        FvError::BadSchemeSpec(err.to_string())
    }
}

impl FvError {
    pub fn size(what: impl Into<String>, expected: usize, found: usize) -> Self {
        FvError::SizeMismatch {
            what: what.into(),
            expected,
            found,
        }
    }
}
