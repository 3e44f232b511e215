//! Coupled interfaces of an LDU system.
//!
//! A coupled patch contributes `-coeff * psi_neighbour` to the rows of its
//! face cells without storing the coupling in the matrix. The exchange is
//! split into two phases: `init_matrix_interfaces` posts every outgoing
//! buffer, `update_matrix_interfaces` receives and blends. Every rank must
//! finish the first phase before any rank starts the second; that is what
//! keeps a decomposed solve identical to the serial one.

use std::sync::Arc;

use crate::error::{FvError, Result};
use crate::mesh::{FvMesh, PatchKind};

#[derive(Debug, Clone)]
pub struct LduInterfaces {
    mesh: Arc<FvMesh>,
    coupled: Vec<usize>,
}

impl LduInterfaces {
    pub fn new(mesh: &Arc<FvMesh>) -> Self {
        let coupled = mesh
            .patches()
            .iter()
            .filter(|p| p.coupled())
            .map(|p| p.index())
            .collect();
        Self {
            mesh: Arc::clone(mesh),
            coupled,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.coupled.is_empty()
    }

    /// Indices of the coupled patches.
    pub fn patches(&self) -> &[usize] {
        &self.coupled
    }

    pub fn mesh(&self) -> &Arc<FvMesh> {
        &self.mesh
    }

    pub fn has_processor_interfaces(&self) -> bool {
        self.coupled.iter().any(|&p| {
            matches!(self.mesh.patch(p).kind(), PatchKind::Processor { .. })
        })
    }

    /// Phase one: sends the face-cell values of every processor interface.
    pub fn init_matrix_interfaces(&self, psi: &[f64]) -> Result<()> {
        let comm = self.mesh.comm();
        for &p in &self.coupled {
            let patch = self.mesh.patch(p);
            if let PatchKind::Processor { neighbour_rank, tag } = patch.kind() {
                comm.send(neighbour_rank, tag, patch.patch_internal(psi))?;
            }
        }
        Ok(())
    }

    /// Phase two: `result[face cell] -= coeffs[patch][face] * psi_neighbour`.
    /// `coeffs` is indexed by patch; entries of uncoupled patches are
    /// ignored.
    pub fn update_matrix_interfaces(
        &self,
        coeffs: &[Vec<f64>],
        psi: &[f64],
        result: &mut [f64],
    ) -> Result<()> {
        for &p in &self.coupled {
            let pnf = self.neighbour_values(p, psi)?;
            let patch = self.mesh.patch(p);
            let c = &coeffs[p];
            for (i, &cell) in patch.face_cells().iter().enumerate() {
                result[cell] -= c[i] * pnf[i];
            }
        }
        Ok(())
    }

    /// Both phases back to back.
    pub fn exchange(&self, coeffs: &[Vec<f64>], psi: &[f64], result: &mut [f64]) -> Result<()> {
        self.init_matrix_interfaces(psi)?;
        self.update_matrix_interfaces(coeffs, psi, result)
    }

    fn neighbour_values(&self, p: usize, psi: &[f64]) -> Result<Vec<f64>> {
        let patch = self.mesh.patch(p);
        match patch.kind() {
            PatchKind::Cyclic { neighbour_patch } => {
                Ok(self.mesh.patch(neighbour_patch).patch_internal(psi))
            }
            PatchKind::Processor { neighbour_rank, tag } => {
                let values = self.mesh.comm().receive(neighbour_rank, tag)?;
                if values.len() != patch.size() {
                    return Err(FvError::size(
                        format!("interface values on {}", patch.name()),
                        patch.size(),
                        values.len(),
                    ));
                }
                Ok(values)
            }
            PatchKind::Physical => Err(FvError::Mesh(format!(
                "patch {} is not coupled",
                patch.name()
            ))),
        }
    }
}
