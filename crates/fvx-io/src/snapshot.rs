use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{IoError, Result};

/// A field written at one time level. Values are stored component-major
/// per cell (`values[cell * n_components + c]`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldSnapshot {
    pub schema_version: u32,
    pub name: String,
    pub time: f64,
    pub time_index: usize,
    pub dimensions: [f64; 7],
    pub component_names: Vec<String>,
    pub internal: Vec<f64>,
    pub boundary: BTreeMap<String, Vec<f64>>,
    pub metadata: BTreeMap<String, String>,
}

impl Default for FieldSnapshot {
    fn default() -> Self {
        Self {
            schema_version: 1,
            name: String::new(),
            time: 0.0,
            time_index: 0,
            dimensions: [0.0; 7],
            component_names: vec!["x".to_string()],
            internal: Vec::new(),
            boundary: BTreeMap::new(),
            metadata: BTreeMap::new(),
        }
    }
}

impl FieldSnapshot {
    pub fn n_components(&self) -> usize {
        self.component_names.len().max(1)
    }

    pub fn n_cells(&self) -> usize {
        self.internal.len() / self.n_components()
    }

    fn check(&self) -> Result<()> {
        let n = self.n_components();
        if self.internal.len() % n != 0 {
            return Err(IoError::InvalidData(format!(
                "field '{}' has {} internal values, not a multiple of {} components",
                self.name,
                self.internal.len(),
                n
            )));
        }
        for (patch, values) in &self.boundary {
            if values.len() % n != 0 {
                return Err(IoError::InvalidData(format!(
                    "patch '{}' of field '{}' has a truncated value list",
                    patch, self.name
                )));
            }
        }
        Ok(())
    }
}

pub fn save_snapshot(path: impl AsRef<Path>, snapshot: &FieldSnapshot) -> Result<()> {
    snapshot.check()?;
    crate::write_json(path, snapshot)
}

pub fn load_snapshot(path: impl AsRef<Path>) -> Result<FieldSnapshot> {
    let snapshot: FieldSnapshot = crate::read_json(path)?;
    snapshot.check()?;
    Ok(snapshot)
}
