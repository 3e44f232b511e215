//! Segregated solution of an equation, one component at a time.

use fvx_io::SolverControls;
use log::{debug, info};

use super::FvMatrix;
use crate::context::FvContext;
use crate::error::Result;
use crate::fields::VolField;
use crate::ldu::solvers::{self, FieldSolverPerformance, LduSystem};
use crate::ldu::LduInterfaces;
use crate::primitives::FieldValue;

impl<T: FieldValue> FvMatrix<T> {
    /// Solves with the controls configured for `psi`, selecting the
    /// `<name>Final` entry on the final outer iteration.
    pub fn solve(&mut self, ctx: &FvContext, psi: &mut VolField<T>) -> Result<FieldSolverPerformance> {
        ctx.check_mesh(psi.mesh())?;
        let controls = ctx
            .solution()
            .solver_controls(psi.name(), ctx.time().final_iteration)?
            .clone();
        self.solve_with(psi, &controls)
    }

    /// Solves every component of `psi` in turn and updates its boundary
    /// conditions. The coupled patches of the other components are taken
    /// from their current values.
    pub fn solve_with(
        &mut self,
        psi: &mut VolField<T>,
        controls: &SolverControls,
    ) -> Result<FieldSolverPerformance> {
        self.check_psi(psi, "solve")?;
        debug!(
            "Solving {} {} equation with {}",
            T::TYPE_NAME,
            self.psi_name,
            controls.solver
        );

        let saved_diag = self.ldu.diag().to_vec();
        let mut total_source = self.source.clone();
        self.add_boundary_source(&mut total_source, psi, false);

        let interfaces = LduInterfaces::new(&self.mesh);
        let mut performance = FieldSolverPerformance {
            field_name: self.psi_name.clone(),
            components: Vec::with_capacity(T::N_COMPONENTS),
        };

        for c in 0..T::N_COMPONENTS {
            let mut diag = saved_diag.clone();
            self.add_boundary_diag(&mut diag, c);
            *self.ldu.diag_mut() = diag;

            let mut psi_c = psi.component(c);
            let source_c: Vec<f64> = total_source.iter().map(|s| s.component(c)).collect();
            let bou = self.boundary_coeffs_component(c);
            let name = format!("{}{}", self.psi_name, T::COMPONENT_NAMES[c]);

            let system = LduSystem {
                field_name: &name,
                matrix: &self.ldu,
                interface_bou_coeffs: &bou,
                interfaces: &interfaces,
            };
            let result = solvers::solve(&system, controls, &mut psi_c, &source_c);
            *self.ldu.diag_mut() = saved_diag.clone();
            let perf = result?;
            info!("{perf}");

            psi.replace_component(c, &psi_c)?;
            performance.components.push(perf);
        }

        psi.correct_boundary_conditions()?;
        Ok(performance)
    }
}
