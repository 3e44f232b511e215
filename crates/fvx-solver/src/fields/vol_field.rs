use std::sync::Arc;

use fvx_io::FieldSnapshot;
use log::debug;

use crate::context::FvContext;
use crate::dimensions::DimensionSet;
use crate::error::{FvError, Result};
use crate::fields::{FieldId, PatchCondition, PatchField};
use crate::mesh::{FvMesh, PatchKind};
use crate::primitives::{FieldValue, pack, unpack};
use crate::time::TimeState;

/// Number of previous time levels kept by a field.
const MAX_OLD_TIMES: usize = 2;

/// A cell-centred field with one patch field per mesh patch.
#[derive(Debug, Clone)]
pub struct VolField<T> {
    id: FieldId,
    name: String,
    mesh: Arc<FvMesh>,
    dimensions: DimensionSet,
    internal: Vec<T>,
    boundary: Vec<PatchField<T>>,
    old: Vec<Vec<T>>,
    prev_iter: Option<Vec<T>>,
}

impl<T: FieldValue> VolField<T> {
    /// A uniform field. Physical patches start as `calculated`, coupled
    /// patches as coupled.
    pub fn new(name: &str, mesh: &Arc<FvMesh>, dimensions: DimensionSet, value: T) -> Self {
        let internal = vec![value; mesh.n_cells()];
        Self::assemble(name, mesh, dimensions, internal)
    }

    /// A field with the given cell values and `calculated` physical
    /// patches holding the adjacent cell values.
    pub fn from_internal(
        name: &str,
        mesh: &Arc<FvMesh>,
        dimensions: DimensionSet,
        internal: Vec<T>,
    ) -> Result<Self> {
        if internal.len() != mesh.n_cells() {
            return Err(FvError::size(
                format!("cell values of {name}"),
                mesh.n_cells(),
                internal.len(),
            ));
        }
        Ok(Self::assemble(name, mesh, dimensions, internal))
    }

    /// A derived field whose physical patches extrapolate the adjacent cell
    /// values. Coupled patches are brought up to date, so every rank must
    /// make the same call.
    pub fn extrapolated(
        name: &str,
        mesh: &Arc<FvMesh>,
        dimensions: DimensionSet,
        internal: Vec<T>,
    ) -> Result<Self> {
        let mut field = Self::from_internal(name, mesh, dimensions, internal)?;
        for (pf, patch) in field.boundary.iter_mut().zip(mesh.patches()) {
            if !patch.coupled() {
                *pf = PatchField::from_condition(
                    &PatchCondition::ExtrapolatedCalculated,
                    patch,
                    &field.internal,
                );
            }
        }
        field.correct_boundary_conditions()?;
        Ok(field)
    }

    /// Component `c` as a scalar field. Patch values, including the
    /// neighbour values of coupled patches, are copied as they stand.
    pub fn component_field(&self, c: usize) -> VolField<f64> {
        let name = format!("{}{}", self.name, T::COMPONENT_NAMES[c]);
        let mut out = VolField::<f64>::assemble(&name, &self.mesh, self.dimensions, self.component(c));
        for (target, pf) in out.boundary.iter_mut().zip(&self.boundary) {
            if let Some(nbr) = pf.neighbour_values() {
                target.set_neighbour_values(nbr.iter().map(|v| v.component(c)).collect());
            }
            for (t, v) in target.values_mut().iter_mut().zip(pf.values()) {
                *t = v.component(c);
            }
        }
        out
    }

    fn assemble(name: &str, mesh: &Arc<FvMesh>, dimensions: DimensionSet, internal: Vec<T>) -> Self {
        let boundary = mesh
            .patches()
            .iter()
            .map(|patch| {
                if patch.coupled() {
                    let mut pf = PatchField::coupled(patch, &internal);
                    if let PatchKind::Cyclic { neighbour_patch } = patch.kind() {
                        pf.set_neighbour_values(mesh.patch(neighbour_patch).patch_internal(&internal));
                        pf.evaluate(patch, &internal);
                    }
                    pf
                } else {
                    PatchField::from_condition(&PatchCondition::Calculated, patch, &internal)
                }
            })
            .collect();
        Self {
            id: FieldId::next(),
            name: name.to_string(),
            mesh: Arc::clone(mesh),
            dimensions,
            internal,
            boundary,
            old: Vec::new(),
            prev_iter: None,
        }
    }

    /// Replaces the condition on a physical patch.
    pub fn set_condition(&mut self, patch_name: &str, condition: PatchCondition<T>) -> Result<()> {
        let p = self.mesh.find_patch(patch_name).ok_or_else(|| {
            FvError::Mesh(format!("field {} has no patch '{patch_name}'", self.name))
        })?;
        let patch = self.mesh.patch(p);
        if patch.coupled() {
            return Err(FvError::Unsupported(format!(
                "patch '{patch_name}' of {} is coupled and takes no condition",
                self.name
            )));
        }
        self.boundary[p] = PatchField::from_condition(&condition, patch, &self.internal);
        Ok(())
    }

    pub fn with_condition(mut self, patch_name: &str, condition: PatchCondition<T>) -> Result<Self> {
        self.set_condition(patch_name, condition)?;
        Ok(self)
    }

    pub fn id(&self) -> FieldId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rename(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn mesh(&self) -> &Arc<FvMesh> {
        &self.mesh
    }

    pub fn dimensions(&self) -> DimensionSet {
        self.dimensions
    }

    pub fn internal(&self) -> &[T] {
        &self.internal
    }

    pub fn internal_mut(&mut self) -> &mut [T] {
        &mut self.internal
    }

    pub fn boundary(&self) -> &[PatchField<T>] {
        &self.boundary
    }

    pub fn patch_field(&self, patch: usize) -> &PatchField<T> {
        &self.boundary[patch]
    }

    pub fn patch_field_mut(&mut self, patch: usize) -> &mut PatchField<T> {
        &mut self.boundary[patch]
    }

    /// Values of the cells next to `patch`.
    pub fn patch_internal(&self, patch: usize) -> Vec<T> {
        self.mesh.patch(patch).patch_internal(&self.internal)
    }

    /// Shifts the current values into the old-time levels. Called once at
    /// the start of every time step.
    pub fn store_old_time(&mut self) {
        self.old.insert(0, self.internal.clone());
        self.old.truncate(MAX_OLD_TIMES);
    }

    pub fn n_old_times(&self) -> usize {
        self.old.len()
    }

    /// Values `level` steps back in time. Missing levels fall back to the
    /// most recent level available, ultimately the current values.
    pub fn old_time(&self, level: usize) -> &[T] {
        if level == 0 {
            return &self.internal;
        }
        match self.old.get(level - 1).or_else(|| self.old.last()) {
            Some(values) => values,
            None => &self.internal,
        }
    }

    /// Keeps the current values as the previous outer iteration for
    /// [`VolField::relax`].
    pub fn store_prev_iter(&mut self) {
        self.prev_iter = Some(self.internal.clone());
    }

    pub fn prev_iter(&self) -> Option<&[T]> {
        self.prev_iter.as_deref()
    }

    /// Under-relaxes towards the stored previous iteration:
    /// `psi = prev + alpha (psi - prev)`, then re-evaluates the patches.
    pub fn relax(&mut self, alpha: f64) -> Result<()> {
        let Some(prev) = &self.prev_iter else {
            return Err(FvError::Unsupported(format!(
                "previous iteration of {} not stored",
                self.name
            )));
        };
        for (v, p) in self.internal.iter_mut().zip(prev) {
            *v = *p + (*v - *p) * alpha;
        }
        self.correct_boundary_conditions()
    }

    /// Relaxes with the field factor from `relaxationFactors.fields`,
    /// `<name>Final` on the final outer iteration. Without a factor the
    /// field is left untouched.
    pub fn relax_auto(&mut self, ctx: &FvContext) -> Result<()> {
        let factor = ctx
            .solution()
            .field_relaxation_factor(&self.name, ctx.time().final_iteration);
        match factor {
            Some(alpha) => {
                debug!("Relaxing field {} with factor {alpha}", self.name);
                self.relax(alpha)
            }
            None => Ok(()),
        }
    }

    /// Updates every patch from the current cell values. Processor patches
    /// first post all their sends, then receive and evaluate, so no rank
    /// reads stale neighbour data.
    pub fn correct_boundary_conditions(&mut self) -> Result<()> {
        let mesh = Arc::clone(&self.mesh);
        let comm = mesh.comm();
        for patch in mesh.patches() {
            if let PatchKind::Processor { neighbour_rank, tag } = patch.kind() {
                comm.send(neighbour_rank, tag, pack(&patch.patch_internal(&self.internal)))?;
            }
        }
        for (p, patch) in mesh.patches().iter().enumerate() {
            match patch.kind() {
                PatchKind::Processor { neighbour_rank, tag } => {
                    let values: Vec<T> = unpack(&comm.receive(neighbour_rank, tag)?);
                    if values.len() != patch.size() {
                        return Err(FvError::size(
                            format!("neighbour values of patch {}", patch.name()),
                            patch.size(),
                            values.len(),
                        ));
                    }
                    self.boundary[p].set_neighbour_values(values);
                }
                PatchKind::Cyclic { neighbour_patch } => {
                    let values = mesh.patch(neighbour_patch).patch_internal(&self.internal);
                    self.boundary[p].set_neighbour_values(values);
                }
                PatchKind::Physical => {}
            }
            self.boundary[p].evaluate(patch, &self.internal);
        }
        Ok(())
    }

    /// True when no patch on any rank fixes the level of the solution.
    pub fn needs_reference(&self) -> Result<bool> {
        let local = !self.boundary.iter().any(|pf| pf.fixes_value());
        self.mesh.comm().all(local)
    }

    pub fn component(&self, c: usize) -> Vec<f64> {
        self.internal.iter().map(|v| v.component(c)).collect()
    }

    pub fn replace_component(&mut self, c: usize, values: &[f64]) -> Result<()> {
        if values.len() != self.internal.len() {
            return Err(FvError::size(
                format!("component {c} of {}", self.name),
                self.internal.len(),
                values.len(),
            ));
        }
        for (v, x) in self.internal.iter_mut().zip(values) {
            v.set_component(c, *x);
        }
        Ok(())
    }

    fn patch_error(&self, patch: usize) -> FvError {
        FvError::CalculatedPatch {
            field: self.name.clone(),
            patch: self.mesh.patch(patch).name().to_string(),
        }
    }

    pub fn value_internal_coeffs(&self, patch: usize, weights: &[f64]) -> Result<Vec<T>> {
        self.boundary[patch]
            .value_internal_coeffs(weights)
            .ok_or_else(|| self.patch_error(patch))
    }

    pub fn value_boundary_coeffs(&self, patch: usize, weights: &[f64]) -> Result<Vec<T>> {
        self.boundary[patch]
            .value_boundary_coeffs(self.mesh.patch(patch), weights)
            .ok_or_else(|| self.patch_error(patch))
    }

    pub fn gradient_internal_coeffs(&self, patch: usize, delta_coeffs: &[f64]) -> Result<Vec<T>> {
        self.boundary[patch]
            .gradient_internal_coeffs(self.mesh.patch(patch), delta_coeffs)
            .ok_or_else(|| self.patch_error(patch))
    }

    pub fn gradient_boundary_coeffs(&self, patch: usize, delta_coeffs: &[f64]) -> Result<Vec<T>> {
        self.boundary[patch]
            .gradient_boundary_coeffs(self.mesh.patch(patch), delta_coeffs)
            .ok_or_else(|| self.patch_error(patch))
    }

    pub fn to_snapshot(&self, time: &TimeState) -> FieldSnapshot {
        FieldSnapshot {
            name: self.name.clone(),
            time: time.value,
            time_index: time.time_index,
            dimensions: self.dimensions.to_array(),
            component_names: T::COMPONENT_NAMES.iter().map(|n| n.to_string()).collect(),
            internal: pack(&self.internal),
            boundary: self
                .mesh
                .patches()
                .iter()
                .zip(&self.boundary)
                .map(|(patch, pf)| (patch.name().to_string(), pack(pf.values())))
                .collect(),
            metadata: [("type".to_string(), T::TYPE_NAME.to_string())]
                .into_iter()
                .collect(),
            ..FieldSnapshot::default()
        }
    }

    /// Loads cell values from a snapshot and re-evaluates the boundary.
    /// Values of patches absent from the snapshot are recomputed.
    pub fn assign_snapshot(&mut self, snapshot: &FieldSnapshot) -> Result<()> {
        if snapshot.n_components() != T::N_COMPONENTS {
            return Err(FvError::size(
                format!("components of snapshot {}", snapshot.name),
                T::N_COMPONENTS,
                snapshot.n_components(),
            ));
        }
        if snapshot.n_cells() != self.internal.len() {
            return Err(FvError::size(
                format!("cells of snapshot {}", snapshot.name),
                self.internal.len(),
                snapshot.n_cells(),
            ));
        }
        self.internal = unpack(&snapshot.internal);
        for (p, patch) in self.mesh.patches().iter().enumerate() {
            if let Some(values) = snapshot.boundary.get(patch.name()) {
                let values: Vec<T> = unpack(values);
                if values.len() == patch.size() && !self.boundary[p].fixes_value() {
                    self.boundary[p].values_mut().copy_from_slice(&values);
                }
            }
        }
        self.correct_boundary_conditions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimensions::DIM_TEMPERATURE;
    use crate::mesh::MeshBuilder;
    use crate::parallel::serial;

    fn line(n: usize) -> Arc<FvMesh> {
        Arc::new(MeshBuilder::line(n, 1.0, serial()).unwrap())
    }

    #[test]
    fn relax_blends_with_previous_iteration() {
        let mesh = line(3);
        let mut t = VolField::from_internal("T", &mesh, DIM_TEMPERATURE, vec![1.0, 2.0, 3.0])
            .unwrap()
            .with_condition("left", PatchCondition::FixedValue(0.0))
            .unwrap()
            .with_condition("right", PatchCondition::ZeroGradient)
            .unwrap();
        assert!(t.relax(0.5).is_err());

        t.store_prev_iter();
        t.internal_mut().copy_from_slice(&[3.0, 2.0, 7.0]);
        t.relax(0.25).unwrap();
        assert_eq!(t.internal(), &[1.5, 2.0, 4.0]);
        assert_eq!(t.prev_iter(), Some(&[1.0, 2.0, 3.0][..]));
        // Zero-gradient right patch follows the relaxed cell value.
        let right = mesh.find_patch("right").unwrap();
        assert_eq!(t.boundary()[right].values(), &[4.0]);
    }

    #[test]
    fn relax_auto_uses_field_factor() {
        use fvx_io::{FvSchemes, FvSolution};

        let mesh = line(2);
        let solution = FvSolution::default()
            .with_field_relaxation("T", 0.5)
            .with_field_relaxation("TFinal", 1.0);
        let mut ctx = FvContext::new(Arc::clone(&mesh), FvSchemes::default(), solution);

        let mut t = VolField::from_internal("T", &mesh, DIM_TEMPERATURE, vec![0.0, 4.0]).unwrap();
        t.store_prev_iter();
        t.internal_mut().copy_from_slice(&[2.0, 8.0]);
        t.relax_auto(&ctx).unwrap();
        assert_eq!(t.internal(), &[1.0, 6.0]);

        ctx.time_mut().final_iteration = true;
        t.store_prev_iter();
        t.internal_mut().copy_from_slice(&[3.0, 3.0]);
        t.relax_auto(&ctx).unwrap();
        assert_eq!(t.internal(), &[3.0, 3.0]);

        let mut k = VolField::from_internal("k", &mesh, DIM_TEMPERATURE, vec![5.0, 6.0]).unwrap();
        k.relax_auto(&ctx).unwrap();
        ctx.time_mut().final_iteration = false;
        k.relax_auto(&ctx).unwrap();
        assert_eq!(k.internal(), &[5.0, 6.0]);
    }

    #[test]
    fn old_times_shift() {
        let mesh = line(2);
        let mut t = VolField::new("T", &mesh, DIM_TEMPERATURE, 1.0);
        assert_eq!(t.old_time(1), &[1.0, 1.0]);
        t.store_old_time();
        t.internal_mut()[0] = 2.0;
        t.store_old_time();
        t.internal_mut()[0] = 3.0;
        t.store_old_time();
        assert_eq!(t.n_old_times(), 2);
        assert_eq!(t.old_time(1)[0], 3.0);
        assert_eq!(t.old_time(2)[0], 2.0);
    }

    #[test]
    fn reference_needed_without_fixed_values() {
        let mesh = line(3);
        let t = VolField::new("T", &mesh, DIM_TEMPERATURE, 0.0)
            .with_condition("left", PatchCondition::ZeroGradient)
            .unwrap();
        assert!(t.needs_reference().unwrap());
        let t = t.with_condition("right", PatchCondition::FixedValue(1.0)).unwrap();
        assert!(!t.needs_reference().unwrap());
        assert!(t.clone().id() == t.id());
    }

    #[test]
    fn calculated_patch_refuses_coefficients() {
        let mesh = line(3);
        let t = VolField::new("T", &mesh, DIM_TEMPERATURE, 0.0);
        let err = t.value_internal_coeffs(0, &[1.0]).unwrap_err();
        assert!(err.to_string().contains("calculated patch 'left'"));
    }

    #[test]
    fn cyclic_patches_see_the_other_side() {
        let mesh = Arc::new(MeshBuilder::rectangle(3, 1, 3.0, 1.0, 0.0, true, serial()).unwrap());
        let mut t = VolField::new("T", &mesh, DIM_TEMPERATURE, 0.0);
        t.internal_mut().copy_from_slice(&[1.0, 2.0, 4.0]);
        t.correct_boundary_conditions().unwrap();
        let left = mesh.find_patch("left").unwrap();
        assert_eq!(t.patch_field(left).neighbour_values(), Some(&[4.0][..]));
        assert!((t.patch_field(left).values()[0] - 2.5).abs() < 1e-12);
    }

    #[test]
    fn snapshot_restores_values() {
        let mesh = line(2);
        let mut t = VolField::new("T", &mesh, DIM_TEMPERATURE, 0.0)
            .with_condition("left", PatchCondition::ZeroGradient)
            .unwrap();
        t.internal_mut().copy_from_slice(&[3.0, 4.0]);
        let snap = t.to_snapshot(&TimeState::default());
        let mut restored = VolField::new("T", &mesh, DIM_TEMPERATURE, 0.0)
            .with_condition("left", PatchCondition::ZeroGradient)
            .unwrap();
        restored.assign_snapshot(&snap).unwrap();
        assert_eq!(restored.internal(), &[3.0, 4.0]);
        assert_eq!(restored.patch_field(0).values(), &[3.0]);
    }
}
