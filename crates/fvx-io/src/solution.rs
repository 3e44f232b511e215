//! The `fvSolution` dictionary: linear solver controls and relaxation
//! factors keyed by field name.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{IoError, Result};

fn default_tolerance() -> f64 {
    1e-6
}

fn default_max_iter() -> usize {
    1000
}

fn default_sweeps() -> usize {
    1
}

/// Controls for one linear solve.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SolverControls {
    pub solver: String,
    #[serde(default)]
    pub preconditioner: Option<String>,
    #[serde(default)]
    pub smoother: Option<String>,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    #[serde(default)]
    pub rel_tol: f64,
    #[serde(default = "default_max_iter")]
    pub max_iter: usize,
    #[serde(default)]
    pub min_iter: usize,
    #[serde(default = "default_sweeps")]
    pub n_sweeps: usize,
}

impl SolverControls {
    pub fn new(solver: &str) -> Self {
        Self {
            solver: solver.to_string(),
            preconditioner: None,
            smoother: None,
            tolerance: default_tolerance(),
            rel_tol: 0.0,
            max_iter: default_max_iter(),
            min_iter: 0,
            n_sweeps: default_sweeps(),
        }
    }

    pub fn with_preconditioner(mut self, name: &str) -> Self {
        self.preconditioner = Some(name.to_string());
        self
    }

    pub fn with_smoother(mut self, name: &str) -> Self {
        self.smoother = Some(name.to_string());
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64, rel_tol: f64) -> Self {
        self.tolerance = tolerance;
        self.rel_tol = rel_tol;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RelaxationFactors {
    #[serde(default)]
    pub fields: BTreeMap<String, f64>,
    #[serde(default)]
    pub equations: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FvSolution {
    #[serde(default)]
    pub solvers: BTreeMap<String, SolverControls>,
    #[serde(default)]
    pub relaxation_factors: RelaxationFactors,
}

fn select(name: &str, final_iteration: bool) -> String {
    if final_iteration {
        format!("{name}Final")
    } else {
        name.to_string()
    }
}

impl FvSolution {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        crate::read_json(path)
    }

    pub fn with_solver(mut self, field: &str, controls: SolverControls) -> Self {
        self.solvers.insert(field.to_string(), controls);
        self
    }

    pub fn with_equation_relaxation(mut self, name: &str, factor: f64) -> Self {
        self.relaxation_factors
            .equations
            .insert(name.to_string(), factor);
        self
    }

    pub fn with_field_relaxation(mut self, name: &str, factor: f64) -> Self {
        self.relaxation_factors.fields.insert(name.to_string(), factor);
        self
    }

    /// Solver controls for `field`; `<field>Final` is preferred on the final
    /// outer iteration and falls back to `<field>`.
    pub fn solver_controls(&self, field: &str, final_iteration: bool) -> Result<&SolverControls> {
        if final_iteration && let Some(c) = self.solvers.get(&select(field, true)) {
            return Ok(c);
        }
        self.solvers
            .get(field)
            .ok_or_else(|| IoError::MissingEntry {
                dictionary: "solvers".to_string(),
                key: field.to_string(),
            })
    }

    pub fn equation_relaxation_factor(&self, name: &str, final_iteration: bool) -> Option<f64> {
        self.relaxation_factors
            .equations
            .get(&select(name, final_iteration))
            .copied()
    }

    pub fn field_relaxation_factor(&self, name: &str, final_iteration: bool) -> Option<f64> {
        self.relaxation_factors
            .fields
            .get(&select(name, final_iteration))
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn final_controls_fall_back_to_base_entry() {
        let solution = FvSolution::default()
            .with_solver("p", SolverControls::new("PCG").with_preconditioner("DIC"))
            .with_solver(
                "pFinal",
                SolverControls::new("PCG").with_tolerance(1e-8, 0.0),
            )
            .with_solver("U", SolverControls::new("smoothSolver"));

        assert_eq!(solution.solver_controls("p", true).unwrap().tolerance, 1e-8);
        assert_eq!(solution.solver_controls("p", false).unwrap().tolerance, 1e-6);
        assert_eq!(
            solution.solver_controls("U", true).unwrap().solver,
            "smoothSolver"
        );
        assert!(solution.solver_controls("T", false).is_err());
    }

    #[test]
    fn relaxation_on_final_iteration_needs_final_entry() {
        let solution = FvSolution::default().with_equation_relaxation("U", 0.7);
        assert_eq!(solution.equation_relaxation_factor("U", false), Some(0.7));
        assert_eq!(solution.equation_relaxation_factor("U", true), None);

        let solution = FvSolution::default()
            .with_field_relaxation("p", 0.3)
            .with_field_relaxation("pFinal", 1.0);
        assert_eq!(solution.field_relaxation_factor("p", false), Some(0.3));
        assert_eq!(solution.field_relaxation_factor("p", true), Some(1.0));
        assert_eq!(solution.field_relaxation_factor("U", false), None);
    }

    #[test]
    fn controls_take_defaults() {
        let raw = r#"{ "solvers": { "T": { "solver": "PBiCGStab", "preconditioner": "DILU", "relTol": 0.01 } } }"#;
        let solution: FvSolution = serde_json::from_str(raw).unwrap();
        let c = solution.solver_controls("T", false).unwrap();
        assert_eq!(c.max_iter, 1000);
        assert_eq!(c.min_iter, 0);
        assert_eq!(c.n_sweeps, 1);
        assert_eq!(c.rel_tol, 0.01);
        assert_eq!(c.preconditioner.as_deref(), Some("DILU"));
    }
}
