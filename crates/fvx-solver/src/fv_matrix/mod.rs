//! Discretised equations.
//!
//! An [`FvMatrix`] is the linear system of one field on one mesh: an LDU
//! matrix, a source and, for every patch, the coefficients through which
//! the boundary enters the system. Applied to the field it represents
//!
//! ```text
//! (M & psi) = ((D + ic) psi + N psi - source - bc) / V
//! ```
//!
//! where `ic`/`bc` are the patch internal and boundary coefficients (the
//! latter multiplied by the neighbour values on coupled patches). Solving
//! `M` makes this expression vanish.

mod algebra;
mod solve;

use std::sync::Arc;

use log::{debug, log_enabled, Level};

use crate::context::FvContext;
use crate::dimensions::{self, DimensionSet, DIM_VOL};
use crate::error::{FvError, Result};
use crate::fields::{FieldId, SurfaceField, VolField};
use crate::ldu::{LduInterfaces, LduMatrix};
use crate::mesh::FvMesh;
use crate::primitives::FieldValue;

#[derive(Debug, Clone)]
pub struct FvMatrix<T> {
    ldu: LduMatrix,
    psi_id: FieldId,
    psi_name: String,
    psi_dimensions: DimensionSet,
    mesh: Arc<FvMesh>,
    dimensions: DimensionSet,
    source: Vec<T>,
    internal_coeffs: Vec<Vec<T>>,
    boundary_coeffs: Vec<Vec<T>>,
    face_flux_correction: Option<SurfaceField<T>>,
}

impl<T: FieldValue> FvMatrix<T> {
    /// An empty equation for `psi`. `dimensions` are those of the volume
    /// integrated equation, e.g. `[T] [L^3] / [t]` for `ddt(T)`.
    pub fn new(psi: &VolField<T>, dimensions: DimensionSet) -> Self {
        let mesh = Arc::clone(psi.mesh());
        let zeros: Vec<Vec<T>> = mesh
            .patches()
            .iter()
            .map(|p| vec![T::zero(); p.size()])
            .collect();
        let mut ldu = LduMatrix::new(Arc::clone(mesh.addressing()));
        ldu.diag_mut();
        Self {
            ldu,
            psi_id: psi.id(),
            psi_name: psi.name().to_string(),
            psi_dimensions: psi.dimensions(),
            source: vec![T::zero(); mesh.n_cells()],
            internal_coeffs: zeros.clone(),
            boundary_coeffs: zeros,
            mesh,
            dimensions,
            face_flux_correction: None,
        }
    }

    pub fn ldu(&self) -> &LduMatrix {
        &self.ldu
    }

    pub fn ldu_mut(&mut self) -> &mut LduMatrix {
        &mut self.ldu
    }

    pub fn psi_id(&self) -> FieldId {
        self.psi_id
    }

    pub fn psi_name(&self) -> &str {
        &self.psi_name
    }

    pub fn mesh(&self) -> &Arc<FvMesh> {
        &self.mesh
    }

    pub fn dimensions(&self) -> DimensionSet {
        self.dimensions
    }

    pub fn diag(&self) -> &[f64] {
        self.ldu.diag()
    }

    pub fn diag_mut(&mut self) -> &mut Vec<f64> {
        self.ldu.diag_mut()
    }

    pub fn upper(&self) -> &[f64] {
        self.ldu.upper()
    }

    pub fn upper_mut(&mut self) -> &mut Vec<f64> {
        self.ldu.upper_mut()
    }

    pub fn lower(&self) -> &[f64] {
        self.ldu.lower()
    }

    pub fn lower_mut(&mut self) -> &mut Vec<f64> {
        self.ldu.lower_mut()
    }

    pub fn source(&self) -> &[T] {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut Vec<T> {
        &mut self.source
    }

    pub fn internal_coeffs(&self) -> &[Vec<T>] {
        &self.internal_coeffs
    }

    pub fn internal_coeffs_mut(&mut self) -> &mut [Vec<T>] {
        &mut self.internal_coeffs
    }

    pub fn boundary_coeffs(&self) -> &[Vec<T>] {
        &self.boundary_coeffs
    }

    pub fn boundary_coeffs_mut(&mut self) -> &mut [Vec<T>] {
        &mut self.boundary_coeffs
    }

    /// Explicit face-flux part left over from a corrected discretisation;
    /// added back by [`FvMatrix::flux`].
    pub fn face_flux_correction(&self) -> Option<&SurfaceField<T>> {
        self.face_flux_correction.as_ref()
    }

    pub fn set_face_flux_correction(&mut self, correction: Option<SurfaceField<T>>) {
        self.face_flux_correction = correction;
    }

    pub(crate) fn check_psi(&self, psi: &VolField<T>, op: &str) -> Result<()> {
        if psi.id() != self.psi_id {
            return Err(FvError::FieldMismatch {
                op: op.to_string(),
                lhs: self.psi_name.clone(),
                rhs: psi.name().to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn check_compatible(&self, other: &FvMatrix<T>, op: &str) -> Result<()> {
        if self.psi_id != other.psi_id {
            return Err(FvError::FieldMismatch {
                op: op.to_string(),
                lhs: self.psi_name.clone(),
                rhs: other.psi_name.clone(),
            });
        }
        if dimensions::checking() && !self.dimensions.matches(&other.dimensions) {
            return Err(FvError::DimensionMismatch {
                op: op.to_string(),
                lhs: self.psi_name.clone(),
                lhs_dims: self.dimensions,
                rhs: other.psi_name.clone(),
                rhs_dims: other.dimensions,
            });
        }
        Ok(())
    }

    /// An explicit source added to the equation must carry the dimensions
    /// of the equation per unit volume.
    pub(crate) fn check_source(&self, name: &str, dims: DimensionSet, op: &str) -> Result<()> {
        let expected = self.dimensions / DIM_VOL;
        if dimensions::checking() && !expected.matches(&dims) {
            return Err(FvError::DimensionMismatch {
                op: op.to_string(),
                lhs: self.psi_name.clone(),
                lhs_dims: expected,
                rhs: name.to_string(),
                rhs_dims: dims,
            });
        }
        Ok(())
    }

    pub(crate) fn check_mesh(&self, mesh: &FvMesh, what: &str) -> Result<()> {
        if mesh.generation() != self.mesh.generation() {
            return Err(FvError::Mesh(format!(
                "{what} lives on mesh generation {} but the equation for {} on generation {}",
                mesh.generation(),
                self.psi_name,
                self.mesh.generation()
            )));
        }
        Ok(())
    }

    /// Adds component `c` of the patch internal coefficients to `diag`.
    pub fn add_boundary_diag(&self, diag: &mut [f64], c: usize) {
        for (patch, ic) in self.mesh.patches().iter().zip(&self.internal_coeffs) {
            for (coeff, &cell) in ic.iter().zip(patch.face_cells()) {
                diag[cell] += coeff.component(c);
            }
        }
    }

    /// Adds the component average of the patch internal coefficients.
    pub fn add_cmpt_av_boundary_diag(&self, diag: &mut [f64]) {
        for (patch, ic) in self.mesh.patches().iter().zip(&self.internal_coeffs) {
            for (coeff, &cell) in ic.iter().zip(patch.face_cells()) {
                diag[cell] += coeff.cmpt_av();
            }
        }
    }

    /// Adds the boundary coefficients of physical patches to `source` and,
    /// when `couples` is set, those of coupled patches multiplied by the
    /// neighbour values.
    pub fn add_boundary_source(&self, source: &mut [T], psi: &VolField<T>, couples: bool) {
        for (p, patch) in self.mesh.patches().iter().enumerate() {
            let bc = &self.boundary_coeffs[p];
            if !patch.coupled() {
                for (coeff, &cell) in bc.iter().zip(patch.face_cells()) {
                    source[cell] += *coeff;
                }
            } else if couples {
                if let Some(pnf) = psi.patch_field(p).neighbour_values() {
                    for ((coeff, nbr), &cell) in bc.iter().zip(pnf).zip(patch.face_cells()) {
                        source[cell] += coeff.cmpt_multiply(nbr);
                    }
                }
            }
        }
    }

    /// Diagonal including the component-averaged boundary contribution.
    pub fn d(&self) -> Vec<f64> {
        let mut diag = self.ldu.diag().to_vec();
        self.add_cmpt_av_boundary_diag(&mut diag);
        diag
    }

    /// Diagonal per component, including the physical-patch contribution.
    pub fn dd(&self) -> Vec<T> {
        let mut diag: Vec<T> = self.ldu.diag().iter().map(|d| T::uniform(*d)).collect();
        for (patch, ic) in self.mesh.patches().iter().zip(&self.internal_coeffs) {
            if patch.coupled() {
                continue;
            }
            for (coeff, &cell) in ic.iter().zip(patch.face_cells()) {
                diag[cell] += *coeff;
            }
        }
        diag
    }

    /// Central coefficient per unit volume.
    pub fn a(&self, psi: &VolField<T>) -> Result<VolField<f64>> {
        self.check_psi(psi, "A")?;
        let a: Vec<f64> = self
            .d()
            .iter()
            .zip(self.mesh.v())
            .map(|(d, v)| d / v)
            .collect();
        VolField::extrapolated(
            &format!("A({})", self.psi_name),
            &self.mesh,
            self.dimensions / self.psi_dimensions / DIM_VOL,
            a,
        )
    }

    /// Off-diagonal part applied to `psi` plus the sources, per unit volume:
    /// the value `psi` would take with only the central coefficient left.
    pub fn h(&self, psi: &VolField<T>) -> Result<VolField<T>> {
        self.check_psi(psi, "H")?;
        let n = self.mesh.n_cells();
        let mut hphi = vec![T::zero(); n];
        for c in 0..T::N_COMPONENTS {
            let mut boundary_diag = vec![0.0; n];
            self.add_boundary_diag(&mut boundary_diag, c);
            boundary_diag.iter_mut().for_each(|d| *d = -*d);
            self.add_cmpt_av_boundary_diag(&mut boundary_diag);
            for ((h, bd), p) in hphi.iter_mut().zip(&boundary_diag).zip(psi.internal()) {
                h.set_component(c, bd * p.component(c));
            }
        }
        let off = self.ldu.h(psi.internal());
        for ((h, o), s) in hphi.iter_mut().zip(off).zip(&self.source) {
            *h += o + *s;
        }
        self.add_boundary_source(&mut hphi, psi, true);
        for (h, v) in hphi.iter_mut().zip(self.mesh.v()) {
            *h = *h * (1.0 / v);
        }
        VolField::extrapolated(
            &format!("H({})", self.psi_name),
            &self.mesh,
            self.dimensions / DIM_VOL,
            hphi,
        )
    }

    /// Negated off-diagonal row sums per unit volume, with the coupled
    /// interface coefficients included.
    pub fn h1(&self, psi: &VolField<T>) -> Result<VolField<f64>> {
        self.check_psi(psi, "H1")?;
        let mut h1 = self.ldu.h1();
        for (patch, bc) in self.mesh.patches().iter().zip(&self.boundary_coeffs) {
            if patch.coupled() {
                for (coeff, &cell) in bc.iter().zip(patch.face_cells()) {
                    h1[cell] += coeff.component(0);
                }
            }
        }
        for (h, v) in h1.iter_mut().zip(self.mesh.v()) {
            *h /= v;
        }
        VolField::extrapolated(
            "H(1)",
            &self.mesh,
            self.dimensions / (DIM_VOL * self.psi_dimensions),
            h1,
        )
    }

    /// Face fluxes implied by the coefficients and the current `psi`.
    pub fn flux(&self, ctx: &FvContext, psi: &VolField<T>) -> Result<SurfaceField<T>> {
        if !ctx.schemes().flux_required(&self.psi_name) {
            return Err(FvError::FluxNotRequired(self.psi_name.clone()));
        }
        self.check_psi(psi, "flux")?;
        let internal = self.ldu.face_h(psi.internal());
        let boundary = self
            .mesh
            .patches()
            .iter()
            .enumerate()
            .map(|(p, patch)| {
                let ic = &self.internal_coeffs[p];
                let bc = &self.boundary_coeffs[p];
                let pif = psi.patch_internal(p);
                match psi.patch_field(p).neighbour_values() {
                    Some(pnf) if patch.coupled() => (0..patch.size())
                        .map(|i| ic[i].cmpt_multiply(&pif[i]) - bc[i].cmpt_multiply(&pnf[i]))
                        .collect(),
                    _ => (0..patch.size())
                        .map(|i| ic[i].cmpt_multiply(&pif[i]) - bc[i])
                        .collect(),
                }
            })
            .collect();
        let mut flux = SurfaceField::new(
            &format!("flux({})", self.psi_name),
            &self.mesh,
            self.dimensions,
            internal,
            boundary,
        )?;
        if let Some(correction) = &self.face_flux_correction {
            flux.add_assign(correction);
        }
        Ok(flux)
    }

    /// `b - A psi` per cell, with `b` the source plus the physical
    /// boundary contributions and `A` including the coupled interfaces.
    pub fn residual(&self, psi: &VolField<T>) -> Result<Vec<T>> {
        self.check_psi(psi, "residual")?;
        let n = self.mesh.n_cells();
        let mut res = self.source.clone();
        self.add_boundary_source(&mut res, psi, false);
        let interfaces = LduInterfaces::new(&self.mesh);
        for c in 0..T::N_COMPONENTS {
            let psi_c = psi.component(c);
            let mut boundary_diag = vec![0.0; n];
            self.add_boundary_diag(&mut boundary_diag, c);
            let source_c: Vec<f64> = res
                .iter()
                .zip(&boundary_diag)
                .zip(&psi_c)
                .map(|((r, bd), p)| r.component(c) - bd * p)
                .collect();
            let bou = self.boundary_coeffs_component(c);
            let r_c = self.ldu.residual(&psi_c, &source_c, &bou, &interfaces)?;
            for (r, x) in res.iter_mut().zip(r_c) {
                r.set_component(c, x);
            }
        }
        Ok(res)
    }

    /// The operator applied to `psi`, per unit volume (`M & psi`).
    pub fn apply(&self, psi: &VolField<T>) -> Result<VolField<T>> {
        self.check_psi(psi, "&")?;
        let n = self.mesh.n_cells();
        let mut mphi = vec![T::zero(); n];
        for c in 0..T::N_COMPONENTS {
            let mut diag = self.ldu.diag().to_vec();
            self.add_boundary_diag(&mut diag, c);
            for ((m, d), p) in mphi.iter_mut().zip(&diag).zip(psi.internal()) {
                m.set_component(c, -d * p.component(c));
            }
        }
        let off = self.ldu.h(psi.internal());
        for ((m, o), s) in mphi.iter_mut().zip(off).zip(&self.source) {
            *m += o + *s;
        }
        self.add_boundary_source(&mut mphi, psi, true);
        for (m, v) in mphi.iter_mut().zip(self.mesh.v()) {
            *m = *m * (-1.0 / v);
        }
        VolField::extrapolated(
            &format!("({0}Eqn&{0})", self.psi_name),
            &self.mesh,
            self.dimensions / DIM_VOL,
            mphi,
        )
    }

    pub(crate) fn boundary_coeffs_component(&self, c: usize) -> Vec<Vec<f64>> {
        self.boundary_coeffs
            .iter()
            .map(|bc| bc.iter().map(|v| v.component(c)).collect())
            .collect()
    }

    /// Pins the level of `psi` at `cell` when no boundary condition does
    /// (or when `force` is set). Ranks that do not own the reference cell
    /// pass `None` but must still make the call.
    pub fn set_reference(
        &mut self,
        psi: &VolField<T>,
        cell: Option<usize>,
        value: T,
        force: bool,
    ) -> Result<()> {
        self.check_psi(psi, "setReference")?;
        if !(force || psi.needs_reference()?) {
            return Ok(());
        }
        if let Some(c) = cell {
            if c >= self.mesh.n_cells() {
                return Err(FvError::size("reference cell", self.mesh.n_cells(), c));
            }
            let d = self.ldu.diag()[c];
            self.source[c] += value * d;
            self.ldu.diag_mut()[c] += d;
        }
        Ok(())
    }

    /// Fixes `psi` in `cells` and removes their coupling from the rows of
    /// the neighbouring cells, moving it into the neighbours' sources.
    pub fn set_values(&mut self, psi: &mut VolField<T>, cells: &[usize], values: &[T]) -> Result<()> {
        self.check_psi(psi, "setValues")?;
        if cells.len() != values.len() {
            return Err(FvError::size("values for fixed cells", cells.len(), values.len()));
        }
        let addr = Arc::clone(self.mesh.addressing());
        let (l, u) = (addr.lower_addr(), addr.upper_addr());
        let has_off_diag = self.ldu.has_upper();
        for (&cell, &value) in cells.iter().zip(values) {
            if cell >= self.mesh.n_cells() {
                return Err(FvError::size("fixed cell", self.mesh.n_cells(), cell));
            }
            psi.internal_mut()[cell] = value;
            self.source[cell] = value * self.ldu.diag()[cell];

            let symmetric = self.ldu.symmetric();
            for f in addr.cell_faces(cell).filter(|_| has_off_diag) {
                if symmetric {
                    let other = if cell == l[f] { u[f] } else { l[f] };
                    self.source[other] -= value * self.ldu.upper()[f];
                    self.ldu.upper_mut()[f] = 0.0;
                } else {
                    if cell == l[f] {
                        self.source[u[f]] -= value * self.ldu.lower()[f];
                    } else {
                        self.source[l[f]] -= value * self.ldu.upper()[f];
                    }
                    self.ldu.upper_mut()[f] = 0.0;
                    self.ldu.lower_mut()[f] = 0.0;
                }
            }
            for (p, i) in self.mesh.cell_boundary_faces(cell) {
                self.internal_coeffs[p][i] = T::zero();
                self.boundary_coeffs[p][i] = T::zero();
            }
        }
        Ok(())
    }

    /// Implicit under-relaxation with factor `alpha`. The diagonal is made
    /// at least as large as the off-diagonal magnitudes, divided by `alpha`
    /// and the source is compensated so the converged solution is
    /// unchanged. `alpha <= 0` leaves the equation alone.
    pub fn relax(&mut self, alpha: f64, psi: &VolField<T>) -> Result<()> {
        if alpha <= 0.0 {
            return Ok(());
        }
        self.check_psi(psi, "relax")?;
        debug!("Relaxing {} by {alpha}", self.psi_name);

        let n = self.mesh.n_cells();
        let d0 = self.ldu.diag().to_vec();
        let mut d = d0.clone();
        let mut sum_off = vec![0.0; n];
        self.ldu.sum_mag_off_diag(&mut sum_off);

        let boundary_diag = |patch_coupled: bool, coeff: &T| {
            if patch_coupled {
                coeff.component(0)
            } else {
                coeff.cmpt_av()
            }
        };

        for (p, patch) in self.mesh.patches().iter().enumerate() {
            let ic = &self.internal_coeffs[p];
            let bc = &self.boundary_coeffs[p];
            for (i, &cell) in patch.face_cells().iter().enumerate() {
                d[cell] += boundary_diag(patch.coupled(), &ic[i]);
                if patch.coupled() {
                    sum_off[cell] += bc[i].component(0).abs();
                }
            }
        }

        if log_enabled!(Level::Debug) {
            self.log_dominance(&d, &sum_off)?;
        }

        for (di, so) in d.iter_mut().zip(&sum_off) {
            *di = di.abs().max(*so) / alpha;
        }

        for (p, patch) in self.mesh.patches().iter().enumerate() {
            let ic = &self.internal_coeffs[p];
            for (i, &cell) in patch.face_cells().iter().enumerate() {
                d[cell] -= boundary_diag(patch.coupled(), &ic[i]);
            }
        }

        for ((s, p), (dn, d_old)) in self
            .source
            .iter_mut()
            .zip(psi.internal())
            .zip(d.iter().zip(&d0))
        {
            *s += *p * (dn - d_old);
        }
        *self.ldu.diag_mut() = d;
        Ok(())
    }

    fn log_dominance(&self, d: &[f64], sum_off: &[f64]) -> Result<()> {
        let comm = self.mesh.comm();
        let mut n_non = 0.0;
        let mut max_non: f64 = 0.0;
        let mut sum_non = 0.0;
        for (di, so) in d.iter().zip(sum_off) {
            let excess = (so - di) / di.abs();
            if excess > 0.0 {
                n_non += 1.0;
                max_non = max_non.max(excess);
                sum_non += excess;
            }
        }
        let n_non = comm.sum(n_non)?;
        let max_non = comm.max(max_non)?;
        let n_cells = comm.sum(d.len() as f64)?;
        let avg_non = comm.sum(sum_non)? / n_cells.max(1.0);
        debug!(
            "Matrix dominance test for {}: non-dominant cells {}, maximum relative non-dominance {:e}, average relative non-dominance {:e}",
            self.psi_name, n_non, max_non, avg_non
        );
        Ok(())
    }

    /// Relaxes with the equation factor configured for `psi`, using the
    /// `<name>Final` entry on the final outer iteration.
    pub fn relax_auto(&mut self, ctx: &FvContext, psi: &VolField<T>) -> Result<()> {
        let factor = ctx
            .solution()
            .equation_relaxation_factor(psi.name(), ctx.time().final_iteration);
        match factor {
            Some(alpha) => self.relax(alpha, psi),
            None => Ok(()),
        }
    }
}
