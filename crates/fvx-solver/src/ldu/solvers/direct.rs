use fvx_io::SolverControls;
use nalgebra::{DMatrix, DVector};

use crate::error::{FvError, Result};
use crate::ldu::solvers::{LduSolver, LduSystem, SolverPerformance};
use crate::mesh::PatchKind;

/// Dense LU factorisation of the assembled system. Cyclic couplings are
/// folded into the matrix; processor interfaces are not supported.
#[derive(Debug, Clone)]
pub struct DirectSolver {
    controls: SolverControls,
}

impl DirectSolver {
    pub fn new(controls: &SolverControls) -> Self {
        Self {
            controls: controls.clone(),
        }
    }

    fn assemble(&self, system: &LduSystem<'_>) -> Result<DMatrix<f64>> {
        let n = system.matrix.n_cells();
        let csr = system.matrix.to_csr()?;
        let mut dense = DMatrix::zeros(n, n);
        for (row_idx, row) in csr.row_iter().enumerate() {
            for (&col_idx, &value) in row.col_indices().iter().zip(row.values().iter()) {
                dense[(row_idx, col_idx)] += value;
            }
        }

        let mesh = system.interfaces.mesh();
        for &p in system.interfaces.patches() {
            let patch = mesh.patch(p);
            match patch.kind() {
                PatchKind::Cyclic { neighbour_patch } => {
                    let nbr_cells = mesh.patch(neighbour_patch).face_cells();
                    let coeffs = &system.interface_bou_coeffs[p];
                    for (i, &cell) in patch.face_cells().iter().enumerate() {
                        dense[(cell, nbr_cells[i])] -= coeffs[i];
                    }
                }
                _ => {
                    return Err(FvError::Unsupported(format!(
                        "direct solver cannot couple across interface {}",
                        patch.name()
                    )));
                }
            }
        }
        Ok(dense)
    }
}

impl LduSolver for DirectSolver {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn solve(&self, system: &LduSystem<'_>, psi: &mut [f64], source: &[f64]) -> Result<SolverPerformance> {
        let mut perf = SolverPerformance::new(self.name(), system.field_name);
        let a_psi = system.amul(psi)?;
        let norm_factor = system.norm_factor(psi, source, &a_psi)?;
        perf.initial_residual = system.sum_mag(&system.residual(psi, source)?)? / norm_factor;

        let dense = self.assemble(system)?;
        let b = DVector::from_column_slice(source);
        let x = dense.lu().solve(&b).ok_or_else(|| {
            FvError::Unsupported(format!("singular matrix for {}", system.field_name))
        })?;
        psi.copy_from_slice(x.as_slice());

        perf.final_residual = system.sum_mag(&system.residual(psi, source)?)? / norm_factor;
        perf.n_iterations = 1;
        perf.check_convergence(self.controls.tolerance, self.controls.rel_tol);
        Ok(perf)
    }
}
