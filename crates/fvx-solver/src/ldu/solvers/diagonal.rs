use crate::error::Result;
use crate::ldu::solvers::{LduSolver, LduSystem, SolverPerformance};

/// Direct solution of a diagonal system, `psi = b / D`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiagonalSolver;

impl LduSolver for DiagonalSolver {
    fn name(&self) -> &'static str {
        "diagonal"
    }

    fn solve(&self, system: &LduSystem<'_>, psi: &mut [f64], source: &[f64]) -> Result<SolverPerformance> {
        for ((p, b), d) in psi.iter_mut().zip(source).zip(system.matrix.diag()) {
            *p = b / d;
        }
        let mut perf = SolverPerformance::new(self.name(), system.field_name);
        perf.converged = true;
        Ok(perf)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::ldu::{LduInterfaces, LduMatrix};
    use crate::mesh::MeshBuilder;
    use crate::parallel::serial;

    #[test]
    fn divides_by_diagonal() {
        let mesh = Arc::new(MeshBuilder::line(3, 1.0, serial()).unwrap());
        let mut m = LduMatrix::new(Arc::clone(mesh.addressing()));
        *m.diag_mut() = vec![2.0, 4.0, 5.0];
        let interfaces = LduInterfaces::new(&mesh);
        let system = LduSystem {
            field_name: "rho",
            matrix: &m,
            interface_bou_coeffs: &[],
            interfaces: &interfaces,
        };
        let mut psi = vec![0.0; 3];
        let perf = DiagonalSolver.solve(&system, &mut psi, &[2.0, 2.0, 10.0]).unwrap();
        assert_eq!(psi, vec![1.0, 0.5, 2.0]);
        assert_eq!(perf.n_iterations, 0);
        assert!(perf.converged);
    }
}
