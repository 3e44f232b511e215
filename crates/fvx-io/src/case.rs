//! Case descriptions for the command-line driver.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{IoError, Result};
use crate::schemes::FvSchemes;
use crate::solution::FvSolution;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum MeshSpec {
    Line {
        cells: usize,
        length: f64,
    },
    Rectangle {
        nx: usize,
        ny: usize,
        lx: f64,
        ly: f64,
        #[serde(default)]
        shear: f64,
        #[serde(default, rename = "periodicX")]
        periodic_x: bool,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PatchSpec {
    FixedValue {
        value: f64,
    },
    ZeroGradient,
    FixedGradient {
        gradient: f64,
    },
    Mixed {
        #[serde(rename = "refValue")]
        ref_value: f64,
        #[serde(rename = "refGradient", default)]
        ref_gradient: f64,
        #[serde(rename = "valueFraction")]
        value_fraction: f64,
    },
    Calculated,
    Cyclic,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    /// Exponents of mass, length, time, temperature, moles, current and
    /// luminous intensity.
    #[serde(default)]
    pub dimensions: [f64; 7],
    #[serde(default)]
    pub initial: f64,
    pub boundary: BTreeMap<String, PatchSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimeControls {
    #[serde(default)]
    pub steady: bool,
    pub delta_t: f64,
    pub end_time: f64,
    /// Outer (non-linear) iterations per time step.
    #[serde(default = "one")]
    pub outer_iterations: usize,
}

fn one() -> usize {
    1
}

impl Default for TimeControls {
    fn default() -> Self {
        Self {
            steady: true,
            delta_t: 1.0,
            end_time: 1.0,
            outer_iterations: 1,
        }
    }
}

/// A scalar transport case: `ddt(T) + div(phi,T) - laplacian(DT,T) == S`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CaseConfig {
    pub mesh: MeshSpec,
    pub field: FieldSpec,
    #[serde(default)]
    pub diffusivity: f64,
    #[serde(default)]
    pub velocity: [f64; 3],
    #[serde(default)]
    pub source: f64,
    /// Linearised sink/source coefficient handled by `SuSp`.
    #[serde(default)]
    pub sink: f64,
    #[serde(default)]
    pub time: TimeControls,
    #[serde(default)]
    pub schemes: FvSchemes,
    #[serde(default)]
    pub solution: FvSolution,
    #[serde(default)]
    pub output: Option<String>,
}

impl CaseConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let case: CaseConfig = crate::read_json(path)?;
        case.validate()?;
        Ok(case)
    }

    pub fn validate(&self) -> Result<()> {
        match &self.mesh {
            MeshSpec::Line { cells, length } => {
                if *cells == 0 || *length <= 0.0 {
                    return Err(IoError::InvalidData(
                        "line mesh needs at least one cell and a positive length".to_string(),
                    ));
                }
            }
            MeshSpec::Rectangle { nx, ny, lx, ly, .. } => {
                if *nx == 0 || *ny == 0 || *lx <= 0.0 || *ly <= 0.0 {
                    return Err(IoError::InvalidData(
                        "rectangle mesh needs positive cell counts and extents".to_string(),
                    ));
                }
            }
        }
        if !self.time.steady && (self.time.delta_t <= 0.0 || self.time.end_time <= 0.0) {
            return Err(IoError::InvalidData(
                "transient case needs positive deltaT and endTime".to_string(),
            ));
        }
        if self.field.name.is_empty() {
            return Err(IoError::InvalidData("field name is empty".to_string()));
        }
        Ok(())
    }
}
