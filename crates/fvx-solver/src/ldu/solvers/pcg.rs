use fvx_io::SolverControls;
use log::trace;

use crate::error::Result;
use crate::ldu::solvers::preconditioners::new_preconditioner;
use crate::ldu::solvers::{GREAT, LduSolver, LduSystem, SolverPerformance};

/// Preconditioned conjugate gradients for symmetric matrices.
#[derive(Debug, Clone)]
pub struct Pcg {
    controls: SolverControls,
}

impl Pcg {
    pub fn new(controls: &SolverControls) -> Self {
        Self {
            controls: controls.clone(),
        }
    }
}

impl LduSolver for Pcg {
    fn name(&self) -> &'static str {
        "PCG"
    }

    fn solve(&self, system: &LduSystem<'_>, psi: &mut [f64], source: &[f64]) -> Result<SolverPerformance> {
        let c = &self.controls;
        let mut perf = SolverPerformance::new(self.name(), system.field_name);
        let n = psi.len();

        let mut w_a = system.amul(psi)?;
        let mut r_a: Vec<f64> = source.iter().zip(&w_a).map(|(b, a)| b - a).collect();
        let norm_factor = system.norm_factor(psi, source, &w_a)?;

        perf.initial_residual = system.sum_mag(&r_a)? / norm_factor;
        perf.final_residual = perf.initial_residual;

        if c.min_iter > 0 || !perf.check_convergence(c.tolerance, c.rel_tol) {
            let preconditioner = new_preconditioner(system, c)?;
            let mut p_a = vec![0.0; n];
            let mut w_ar_a = GREAT;

            loop {
                let w_ar_a_old = w_ar_a;
                preconditioner.precondition(system, &mut w_a, &r_a);
                w_ar_a = system.sum_prod(&w_a, &r_a)?;

                if perf.n_iterations == 0 {
                    p_a.copy_from_slice(&w_a);
                } else {
                    let beta = w_ar_a / w_ar_a_old;
                    for (p, w) in p_a.iter_mut().zip(&w_a) {
                        *p = w + beta * *p;
                    }
                }

                w_a = system.amul(&p_a)?;
                let w_ap_a = system.sum_prod(&w_a, &p_a)?;
                if perf.check_singularity(w_ap_a.abs() / norm_factor) {
                    break;
                }

                let alpha = w_ar_a / w_ap_a;
                for i in 0..n {
                    psi[i] += alpha * p_a[i];
                    r_a[i] -= alpha * w_a[i];
                }
                perf.final_residual = system.sum_mag(&r_a)? / norm_factor;
                perf.n_iterations += 1;
                trace!(
                    "PCG {} iteration {}: residual {:e}",
                    system.field_name, perf.n_iterations, perf.final_residual
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ldu::LduInterfaces;
    use crate::ldu::solvers::test_support::poisson;

    #[test]
    fn converges_on_poisson() {
        let (mesh, m, b, exact) = poisson(20);
        let interfaces = LduInterfaces::new(&mesh);
        let system = LduSystem {
            field_name: "T",
            matrix: &m,
            interface_bou_coeffs: &[],
            interfaces: &interfaces,
        };
        for precon in ["DIC", "diagonal", "none"] {
            let controls = SolverControls::new("PCG")
                .with_preconditioner(precon)
                .with_tolerance(1e-12, 0.0);
            let mut psi = vec![0.0; 20];
            let perf = Pcg::new(&controls).solve(&system, &mut psi, &b).unwrap();
            assert!(perf.converged, "{precon}: {perf}");
            assert!(perf.initial_residual > perf.final_residual);
            for (p, e) in psi.iter().zip(&exact) {
                assert!((p - e).abs() < 1e-8, "{precon}");
            }
        }
    }

    #[test]
    fn converged_start_skips_iterations() {
        let (mesh, m, b, exact) = poisson(5);
        let interfaces = LduInterfaces::new(&mesh);
        let system = LduSystem {
            field_name: "T",
            matrix: &m,
            interface_bou_coeffs: &[],
            interfaces: &interfaces,
        };
        let controls = SolverControls::new("PCG").with_preconditioner("DIC");
        let mut psi = exact.clone();
        let perf = Pcg::new(&controls).solve(&system, &mut psi, &b).unwrap();
        assert_eq!(perf.n_iterations, 0);
        assert!(perf.converged);
        assert_eq!(psi, exact);
    }
}
