use fvx_io::SolverControls;
use log::trace;

use crate::error::Result;
use crate::ldu::solvers::preconditioners::new_preconditioner;
use crate::ldu::solvers::{LduSolver, LduSystem, SolverPerformance};

/// Preconditioned bi-conjugate gradient stabilised, for symmetric and
/// asymmetric matrices.
#[derive(Debug, Clone)]
pub struct PBiCGStab {
    controls: SolverControls,
}

impl PBiCGStab {
    pub fn new(controls: &SolverControls) -> Self {
        Self {
            controls: controls.clone(),
        }
    }
}

impl LduSolver for PBiCGStab {
    fn name(&self) -> &'static str {
        "PBiCGStab"
    }

    fn solve(&self, system: &LduSystem<'_>, psi: &mut [f64], source: &[f64]) -> Result<SolverPerformance> {
        let c = &self.controls;
        let mut perf = SolverPerformance::new(self.name(), system.field_name);
        let n = psi.len();

        let y_a = system.amul(psi)?;
        let mut r_a: Vec<f64> = source.iter().zip(&y_a).map(|(b, a)| b - a).collect();
        let norm_factor = system.norm_factor(psi, source, &y_a)?;

        perf.initial_residual = system.sum_mag(&r_a)? / norm_factor;
        perf.final_residual = perf.initial_residual;

        if c.min_iter == 0 && perf.check_convergence(c.tolerance, c.rel_tol) {
            return Ok(perf);
        }

        let preconditioner = new_preconditioner(system, c)?;
        let r_a0 = r_a.clone();
        let mut p_a = vec![0.0; n];
        let mut y_a = y_a;
        let mut ay_a = vec![0.0; n];
        let mut z_a = vec![0.0; n];
        let mut s_a = vec![0.0; n];
        let mut r_a0r_a = 0.0;
        let mut alpha = 0.0;
        let mut omega: f64 = 0.0;

        loop {
            let r_a0r_a_old = r_a0r_a;
            r_a0r_a = system.sum_prod(&r_a0, &r_a)?;
            if perf.check_singularity(r_a0r_a.abs()) {
                break;
            }

            if perf.n_iterations == 0 {
                p_a.copy_from_slice(&r_a);
            } else {
                if perf.check_singularity(omega.abs()) {
                    break;
                }
                let beta = (r_a0r_a / r_a0r_a_old) * (alpha / omega);
                for i in 0..n {
                    p_a[i] = r_a[i] + beta * (p_a[i] - omega * ay_a[i]);
                }
            }

            preconditioner.precondition(system, &mut y_a, &p_a);
            ay_a = system.amul(&y_a)?;
            let r_a0ay_a = system.sum_prod(&r_a0, &ay_a)?;
            alpha = r_a0r_a / r_a0ay_a;

            for i in 0..n {
                s_a[i] = r_a[i] - alpha * ay_a[i];
            }
            perf.final_residual = system.sum_mag(&s_a)? / norm_factor;

            if perf.check_convergence(c.tolerance, c.rel_tol) && perf.n_iterations + 1 >= c.min_iter {
                for i in 0..n {
                    psi[i] += alpha * y_a[i];
                }
                perf.n_iterations += 1;
                return Ok(perf);
            }

            preconditioner.precondition(system, &mut z_a, &s_a);
            let t_a = system.amul(&z_a)?;
            let t_at_a = system.sum_prod(&t_a, &t_a)?;
            omega = system.sum_prod(&t_a, &s_a)? / t_at_a;

            for i in 0..n {
                psi[i] += alpha * y_a[i] + omega * z_a[i];
                r_a[i] = s_a[i] - omega * t_a[i];
            }
            perf.final_residual = system.sum_mag(&r_a)? / norm_factor;
            perf.n_iterations += 1;
            trace!(
                "PBiCGStab {} iteration {}: residual {:e}",
                system.field_name, perf.n_iterations, perf.final_residual
            );

            let converged = perf.check_convergence(c.tolerance, c.rel_tol);
            if (perf.n_iterations >= c.max_iter || converged) && perf.n_iterations >= c.min_iter {
                break;
            }
        }
        Ok(perf)
    }
}
