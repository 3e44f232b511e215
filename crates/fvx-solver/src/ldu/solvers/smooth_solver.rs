use fvx_io::SolverControls;
use log::trace;

use crate::error::Result;
use crate::ldu::solvers::smoothers::new_smoother;
use crate::ldu::solvers::{LduSolver, LduSystem, SolverPerformance};

/// Repeated smoothing until converged. Iterations are counted in sweeps.
#[derive(Debug, Clone)]
pub struct SmoothSolver {
    controls: SolverControls,
}

impl SmoothSolver {
    pub fn new(controls: &SolverControls) -> Self {
        Self {
            controls: controls.clone(),
        }
    }
}

impl LduSolver for SmoothSolver {
    fn name(&self) -> &'static str {
        "smoothSolver"
    }

    fn solve(&self, system: &LduSystem<'_>, psi: &mut [f64], source: &[f64]) -> Result<SolverPerformance> {
        let c = &self.controls;
        let n_sweeps = c.n_sweeps.max(1);
        let mut perf = SolverPerformance::new(self.name(), system.field_name);

        let a_psi = system.amul(psi)?;
        let norm_factor = system.norm_factor(psi, source, &a_psi)?;
        perf.initial_residual = system.sum_mag(&system.residual(psi, source)?)? / norm_factor;
        perf.final_residual = perf.initial_residual;

        if c.min_iter > 0 || !perf.check_convergence(c.tolerance, c.rel_tol) {
            let smoother = new_smoother(system, c)?;
            loop {
                smoother.smooth(system, psi, source, n_sweeps)?;
                perf.final_residual = system.sum_mag(&system.residual(psi, source)?)? / norm_factor;
                perf.n_iterations += n_sweeps;
                trace!(
                    "{} {} sweep {}: residual {:e}",
                    smoother.name(),
                    system.field_name,
                    perf.n_iterations,
                    perf.final_residual
                );

                let converged = perf.check_convergence(c.tolerance, c.rel_tol);
                if (perf.n_iterations >= c.max_iter || converged) && perf.n_iterations >= c.min_iter {
                    break;
                }
            }
        }
        Ok(perf)
    }
}
