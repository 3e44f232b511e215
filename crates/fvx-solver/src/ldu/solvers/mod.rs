//! Linear solvers for LDU systems.
//!
//! Solvers, preconditioners and smoothers are chosen by name from
//! run-time selection tables. Separate tables exist for symmetric and
//! asymmetric matrices; a diagonal matrix is always handled by the
//! diagonal solver regardless of the requested name.

mod diagonal;
mod direct;
mod pbicgstab;
mod pcg;
pub mod preconditioners;
mod smooth_solver;
pub mod smoothers;

use std::fmt;
use std::sync::OnceLock;

use fvx_io::SolverControls;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{FvError, Result};
use crate::ldu::{LduInterfaces, LduMatrix};
use crate::parallel::Communicator;
use crate::selection::RuntimeSelectionTable;

pub use diagonal::DiagonalSolver;
pub use direct::DirectSolver;
pub use pbicgstab::PBiCGStab;
pub use pcg::Pcg;
pub use smooth_solver::SmoothSolver;

/// Guard added to residual normalisation factors.
pub const SMALL: f64 = 1e-20;

/// Residuals below this mark a singular system.
pub const VSMALL: f64 = 1e-300;

pub const GREAT: f64 = 1e20;

/// Outcome of one scalar linear solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolverPerformance {
    pub solver_name: String,
    pub field_name: String,
    pub initial_residual: f64,
    pub final_residual: f64,
    pub n_iterations: usize,
    pub converged: bool,
    pub singular: bool,
}

impl SolverPerformance {
    pub fn new(solver_name: &str, field_name: &str) -> Self {
        Self {
            solver_name: solver_name.to_string(),
            field_name: field_name.to_string(),
            initial_residual: 0.0,
            final_residual: 0.0,
            n_iterations: 0,
            converged: false,
            singular: false,
        }
    }

    pub fn check_convergence(&mut self, tolerance: f64, rel_tol: f64) -> bool {
        self.converged = self.final_residual < tolerance
            || (rel_tol > SMALL && self.final_residual < rel_tol * self.initial_residual);
        self.converged
    }

    pub fn check_singularity(&mut self, residual: f64) -> bool {
        self.singular = residual < VSMALL;
        self.singular
    }
}

impl fmt::Display for SolverPerformance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: Solving for {}, Initial residual = {:e}, Final residual = {:e}, No Iterations {}",
            self.solver_name,
            self.field_name,
            self.initial_residual,
            self.final_residual,
            self.n_iterations
        )
    }
}

/// Performance of every component of a segregated solve.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSolverPerformance {
    pub field_name: String,
    pub components: Vec<SolverPerformance>,
}

impl FieldSolverPerformance {
    pub fn converged(&self) -> bool {
        self.components.iter().all(|p| p.converged)
    }

    pub fn max_initial_residual(&self) -> f64 {
        self.components
            .iter()
            .map(|p| p.initial_residual)
            .fold(0.0, f64::max)
    }

    pub fn max_final_residual(&self) -> f64 {
        self.components
            .iter()
            .map(|p| p.final_residual)
            .fold(0.0, f64::max)
    }

    pub fn max_iterations(&self) -> usize {
        self.components
            .iter()
            .map(|p| p.n_iterations)
            .max()
            .unwrap_or(0)
    }
}

/// One scalar system `A psi = b` with its coupled interfaces.
#[derive(Debug, Clone, Copy)]
pub struct LduSystem<'a> {
    pub field_name: &'a str,
    pub matrix: &'a LduMatrix,
    /// Interface coefficients indexed by patch; see
    /// [`LduInterfaces::update_matrix_interfaces`].
    pub interface_bou_coeffs: &'a [Vec<f64>],
    pub interfaces: &'a LduInterfaces,
}

impl LduSystem<'_> {
    pub fn comm(&self) -> &dyn Communicator {
        self.interfaces.mesh().comm().as_ref()
    }

    pub fn amul(&self, psi: &[f64]) -> Result<Vec<f64>> {
        self.matrix
            .amul(psi, self.interface_bou_coeffs, self.interfaces)
    }

    pub fn residual(&self, psi: &[f64], source: &[f64]) -> Result<Vec<f64>> {
        self.matrix
            .residual(psi, source, self.interface_bou_coeffs, self.interfaces)
    }

    pub fn sum_mag(&self, values: &[f64]) -> Result<f64> {
        self.comm().sum(values.iter().map(|v| v.abs()).sum())
    }

    pub fn sum_prod(&self, a: &[f64], b: &[f64]) -> Result<f64> {
        self.comm().sum(a.iter().zip(b).map(|(x, y)| x * y).sum())
    }

    /// Scale making residuals comparable across problems:
    /// `sum(|A psi - A xRef| + |b - A xRef|)` with `xRef` the average of
    /// `psi`.
    pub fn norm_factor(&self, psi: &[f64], source: &[f64], a_psi: &[f64]) -> Result<f64> {
        let comm = self.comm();
        let n = comm.sum(psi.len() as f64)?;
        let average = if n > 0.0 {
            comm.sum(psi.iter().sum())? / n
        } else {
            0.0
        };
        let sum_a = self
            .matrix
            .sum_a(self.interface_bou_coeffs, self.interfaces);
        let local: f64 = sum_a
            .iter()
            .zip(a_psi.iter().zip(source))
            .map(|(s, (ap, b))| {
                let x_ref = s * average;
                (ap - x_ref).abs() + (b - x_ref).abs()
            })
            .sum();
        Ok(comm.sum(local)? + SMALL)
    }
}

pub trait LduSolver: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    fn solve(&self, system: &LduSystem<'_>, psi: &mut [f64], source: &[f64]) -> Result<SolverPerformance>;
}

pub type SolverConstructor = fn(&SolverControls) -> Box<dyn LduSolver>;

pub fn symmetric_solvers() -> &'static RuntimeSelectionTable<SolverConstructor> {
    static TABLE: OnceLock<RuntimeSelectionTable<SolverConstructor>> = OnceLock::new();
    TABLE.get_or_init(|| {
        RuntimeSelectionTable::<SolverConstructor>::new("symmetric matrix solver")
            .register("PCG", |c| Box::new(Pcg::new(c)))
            .register("PBiCGStab", |c| Box::new(PBiCGStab::new(c)))
            .register("smoothSolver", |c| Box::new(SmoothSolver::new(c)))
            .register("direct", |c| Box::new(DirectSolver::new(c)))
            .register("diagonal", |_| Box::new(DiagonalSolver))
    })
}

pub fn asymmetric_solvers() -> &'static RuntimeSelectionTable<SolverConstructor> {
    static TABLE: OnceLock<RuntimeSelectionTable<SolverConstructor>> = OnceLock::new();
    TABLE.get_or_init(|| {
        RuntimeSelectionTable::<SolverConstructor>::new("asymmetric matrix solver")
            .register("PBiCGStab", |c| Box::new(PBiCGStab::new(c)))
            .register("smoothSolver", |c| Box::new(SmoothSolver::new(c)))
            .register("direct", |c| Box::new(DirectSolver::new(c)))
            .register("diagonal", |_| Box::new(DiagonalSolver))
    })
}

/// Picks the solver for `matrix` named by `controls`.
pub fn new_solver(matrix: &LduMatrix, controls: &SolverControls) -> Result<Box<dyn LduSolver>> {
    if matrix.diagonal() {
        return Ok(Box::new(DiagonalSolver));
    }
    let table = if matrix.symmetric() {
        symmetric_solvers()
    } else {
        asymmetric_solvers()
    };
    let constructor = table.lookup(&controls.solver)?;
    Ok(constructor(controls))
}

/// Solves one scalar system. An all-zero diagonal yields a singular,
/// unconverged record without iterating.
pub fn solve(
    system: &LduSystem<'_>,
    controls: &SolverControls,
    psi: &mut [f64],
    source: &[f64],
) -> Result<SolverPerformance> {
    let solver = new_solver(system.matrix, controls)?;
    let locally_zero = system.matrix.diag().iter().all(|d| *d == 0.0);
    if system.comm().all(locally_zero)? {
        warn!(
            "{}: zero diagonal for {}, skipping solve",
            solver.name(),
            system.field_name
        );
        let mut perf = SolverPerformance::new(solver.name(), system.field_name);
        perf.singular = true;
        return Ok(perf);
    }
    let perf = solver.solve(system, psi, source)?;
    if !perf.converged {
        warn!(
            "{} did not converge for {} in {} iterations (final residual {:e})",
            perf.solver_name, perf.field_name, perf.n_iterations, perf.final_residual
        );
    }
    Ok(perf)
}

pub(crate) fn missing_entry(system: &LduSystem<'_>, key: &str) -> FvError {
    FvError::MissingEntry {
        dictionary: format!("solvers.{}", system.field_name),
        key: key.to_string(),
    }
}
