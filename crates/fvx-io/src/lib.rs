//! Case dictionaries and field persistence for fvx.
//!
//! Scheme selection (`fvSchemes`), solver controls (`fvSolution`) and
//! case descriptions are JSON documents; field snapshots are written in
//! the same format.

pub mod case;
pub mod error;
pub mod schemes;
pub mod snapshot;
pub mod solution;

use std::fs;
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

pub use case::{CaseConfig, FieldSpec, MeshSpec, PatchSpec, TimeControls};
pub use error::{IoError, Result};
pub use schemes::{FvSchemes, SchemeCategory};
pub use snapshot::{FieldSnapshot, load_snapshot, save_snapshot};
pub use solution::{FvSolution, RelaxationFactors, SolverControls};

/// Reads a JSON document into `T`.
pub fn read_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(IoError::FileNotFound(path.display().to_string()));
    }
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Writes `value` as pretty JSON, creating parent directories as needed.
pub fn write_json<T: Serialize>(path: impl AsRef<Path>, value: &T) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let bytes = serde_json::to_vec_pretty(value)?;
    fs::write(path, bytes)?;
    Ok(())
}
