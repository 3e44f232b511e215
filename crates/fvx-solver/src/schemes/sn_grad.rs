//! Face-normal gradients, with optional explicit non-orthogonal
//! correction.

use std::sync::OnceLock;

use fvx_dict::{TokenStream, term_key};

use crate::context::FvContext;
use crate::dimensions::DIM_LENGTH;
use crate::error::{FvError, Result};
use crate::fields::{SurfaceField, VolField};
use crate::ldu::solvers::SMALL;
use crate::mesh::{FvMesh, PolyPatch};
use crate::primitives::FieldValue;
use crate::schemes::interpolation::component_gradients;
use crate::schemes::{InterpolationScheme, parse_spec};
use crate::selection::RuntimeSelectionTable;

pub type SnGradConstructor = fn(&mut TokenStream) -> Result<SnGradScheme>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SnGradScheme {
    /// Plain difference over the centre distance, ignoring
    /// non-orthogonality.
    Orthogonal,
    /// Difference scaled by the non-orthogonal coefficients, no
    /// correction.
    Uncorrected,
    Corrected,
    /// Corrected, with the correction capped at `k / (1 - k)` of the
    /// uncorrected gradient.
    Limited { limit_coeff: f64 },
}

impl SnGradScheme {
    pub fn new(spec: &str) -> Result<Self> {
        parse_spec(spec, Self::from_tokens)
    }

    pub fn from_tokens(tokens: &mut TokenStream) -> Result<Self> {
        let name = tokens.next_word()?;
        sn_grad_schemes().lookup(&name)?(tokens)
    }

    pub fn name(&self) -> &'static str {
        match self {
            SnGradScheme::Orthogonal => "orthogonal",
            SnGradScheme::Uncorrected => "uncorrected",
            SnGradScheme::Corrected => "corrected",
            SnGradScheme::Limited { .. } => "limited",
        }
    }

    pub fn corrected(&self) -> bool {
        match self {
            SnGradScheme::Corrected => true,
            SnGradScheme::Limited { limit_coeff } => *limit_coeff > 0.0,
            _ => false,
        }
    }

    pub fn delta_coeffs<'m>(&self, mesh: &'m FvMesh) -> &'m [f64] {
        match self {
            SnGradScheme::Orthogonal => mesh.delta_coeffs(),
            _ => mesh.non_orth_delta_coeffs(),
        }
    }

    pub fn patch_delta_coeffs<'m>(&self, patch: &'m PolyPatch) -> &'m [f64] {
        match self {
            SnGradScheme::Orthogonal => patch.delta_coeffs(),
            _ => patch.non_orth_delta_coeffs(),
        }
    }

    /// Uncorrected face-normal gradient. Physical patches use their own
    /// condition, coupled patches the neighbour values.
    fn uncorrected<T: FieldValue>(&self, vf: &VolField<T>) -> Result<SurfaceField<T>> {
        let mesh = vf.mesh();
        let values = vf.internal();
        let delta = self.delta_coeffs(mesh);
        let internal = mesh
            .owner()
            .iter()
            .zip(mesh.neighbour())
            .zip(delta)
            .map(|((&o, &n), &d)| (values[n] - values[o]) * d)
            .collect();
        let boundary = mesh
            .patches()
            .iter()
            .enumerate()
            .map(|(p, patch)| {
                let pf = vf.patch_field(p);
                match pf.neighbour_values() {
                    Some(nbr) if patch.coupled() => patch
                        .face_cells()
                        .iter()
                        .zip(nbr)
                        .zip(self.patch_delta_coeffs(patch))
                        .map(|((&c, n), &d)| (*n - values[c]) * d)
                        .collect(),
                    _ => pf.sn_grad(patch, values),
                }
            })
            .collect();
        SurfaceField::new(
            &term_key("snGrad", &[vf.name()]),
            mesh,
            vf.dimensions() / DIM_LENGTH,
            internal,
            boundary,
        )
    }

    /// Explicit non-orthogonal correction, `None` for uncorrected schemes.
    /// The cell gradients come from the gradient scheme of `grad(<name>)`.
    pub fn correction<T: FieldValue>(
        &self,
        ctx: &FvContext,
        vf: &VolField<T>,
    ) -> Result<Option<SurfaceField<T>>> {
        if !self.corrected() {
            return Ok(None);
        }
        let mesh = vf.mesh();
        let grads = component_gradients(ctx, &term_key("grad", &[vf.name()]), vf)?;

        let mut corr = SurfaceField::uniform(
            &format!("snGradCorr({})", vf.name()),
            mesh,
            vf.dimensions() / DIM_LENGTH,
            T::zero(),
        );
        for (k, grad) in grads.iter().enumerate() {
            let gf = InterpolationScheme::Linear.interpolate(ctx, grad, None)?;
            for (f, v) in corr.internal_mut().iter_mut().enumerate() {
                v.set_component(k, mesh.non_orth_correction_vectors()[f].dot(&gf.internal()[f]));
            }
            for (p, patch) in mesh.patches().iter().enumerate() {
                if !patch.coupled() {
                    continue;
                }
                let kv = patch.non_orth_correction_vectors();
                for (i, v) in corr.boundary_mut(p).iter_mut().enumerate() {
                    v.set_component(k, kv[i].dot(&gf.boundary(p)[i]));
                }
            }
        }

        if let SnGradScheme::Limited { limit_coeff } = *self
            && limit_coeff < 1.0
        {
            let plain = self.uncorrected(vf)?;
            let limit = |c: &mut T, u: &T| {
                let l = (limit_coeff * u.mag() / ((1.0 - limit_coeff) * c.mag() + SMALL)).min(1.0);
                *c = *c * l;
            };
            for (c, u) in corr.internal_mut().iter_mut().zip(plain.internal()) {
                limit(c, u);
            }
            for p in 0..mesh.patches().len() {
                for (c, u) in corr.boundary_mut(p).iter_mut().zip(plain.boundary(p)) {
                    limit(c, u);
                }
            }
        }
        Ok(Some(corr))
    }

    /// Full face-normal gradient, corrected where the scheme says so.
    pub fn sn_grad<T: FieldValue>(&self, ctx: &FvContext, vf: &VolField<T>) -> Result<SurfaceField<T>> {
        let mut sn = self.uncorrected(vf)?;
        if let Some(corr) = self.correction(ctx, vf)? {
            sn.add_assign(&corr);
        }
        Ok(sn)
    }
}

fn limited(tokens: &mut TokenStream) -> Result<SnGradScheme> {
    // Both `limited 0.5` and `limited corrected 0.5` are accepted.
    if tokens.peek_word() == Some("corrected") {
        tokens.next_word()?;
    }
    let limit_coeff = tokens.next_scalar()?;
    if !(0.0..=1.0).contains(&limit_coeff) {
        return Err(FvError::BadSchemeSpec(format!(
            "limited snGrad coefficient {limit_coeff} is outside [0, 1]"
        )));
    }
    Ok(SnGradScheme::Limited { limit_coeff })
}

pub fn sn_grad_schemes() -> &'static RuntimeSelectionTable<SnGradConstructor> {
    static TABLE: OnceLock<RuntimeSelectionTable<SnGradConstructor>> = OnceLock::new();
    TABLE.get_or_init(|| {
        RuntimeSelectionTable::<SnGradConstructor>::new("snGrad scheme")
            .register("orthogonal", |_| Ok(SnGradScheme::Orthogonal))
            .register("uncorrected", |_| Ok(SnGradScheme::Uncorrected))
            .register("corrected", |_| Ok(SnGradScheme::Corrected))
            .register("limited", limited)
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use fvx_io::{FvSchemes, FvSolution, SchemeCategory};

    use super::*;
    use crate::dimensions::DIM_TEMPERATURE;
    use crate::fields::PatchCondition;
    use crate::mesh::MeshBuilder;
    use crate::parallel::serial;
    use crate::primitives::Vector;

    fn sheared() -> (Arc<FvMesh>, FvContext) {
        let mesh = Arc::new(MeshBuilder::rectangle(4, 4, 1.0, 1.0, 0.4, false, serial()).unwrap());
        let schemes = FvSchemes::default().with(SchemeCategory::Grad, "default", "leastSquares");
        let ctx = FvContext::new(Arc::clone(&mesh), schemes, FvSolution::default());
        (mesh, ctx)
    }

    fn planar(mesh: &Arc<FvMesh>) -> VolField<f64> {
        let f = |x: &Vector| 2.0 * x.x + x.y;
        let mut vf = VolField::from_internal("T", mesh, DIM_TEMPERATURE, mesh.c().iter().map(f).collect())
            .unwrap();
        for (p, patch) in mesh.patches().iter().enumerate() {
            let values: Vec<f64> = patch.cf().iter().map(f).collect();
            vf.patch_field_mut(p).values_mut().copy_from_slice(&values);
        }
        vf
    }

    #[test]
    fn parses_limited_forms() {
        assert_eq!(
            SnGradScheme::new("limited 0.5").unwrap(),
            SnGradScheme::Limited { limit_coeff: 0.5 }
        );
        assert_eq!(
            SnGradScheme::new("limited corrected 0.33").unwrap(),
            SnGradScheme::Limited { limit_coeff: 0.33 }
        );
        assert!(SnGradScheme::new("limited 1.5").is_err());
        assert!(!SnGradScheme::new("limited 0").unwrap().corrected());
    }

    #[test]
    fn uncorrected_is_exact_on_orthogonal_line() {
        let mesh = Arc::new(MeshBuilder::line(4, 4.0, serial()).unwrap());
        let ctx = FvContext::new(Arc::clone(&mesh), FvSchemes::default(), FvSolution::default());
        let vf = VolField::from_internal("T", &mesh, DIM_TEMPERATURE, vec![0.5, 1.5, 2.5, 3.5])
            .unwrap()
            .with_condition("left", PatchCondition::FixedValue(0.0))
            .unwrap()
            .with_condition("right", PatchCondition::FixedGradient(1.0))
            .unwrap();
        let sn = SnGradScheme::Uncorrected.sn_grad(&ctx, &vf).unwrap();
        assert!(sn.internal().iter().all(|g| (g - 1.0).abs() < 1e-12));
        // Outward normal of the left patch points in -x.
        assert!((sn.boundary(0)[0] + 1.0).abs() < 1e-12);
        assert_eq!(sn.boundary(1), &[1.0]);
    }

    #[test]
    fn correction_recovers_normal_gradient_on_sheared_mesh() {
        let (mesh, ctx) = sheared();
        let vf = planar(&mesh);
        let exact = |f: usize| mesh.sf()[f].dot(&Vector::new(2.0, 1.0, 0.0)) / mesh.mag_sf()[f];

        let plain = SnGradScheme::Uncorrected.sn_grad(&ctx, &vf).unwrap();
        let corrected = SnGradScheme::Corrected.sn_grad(&ctx, &vf).unwrap();
        let mut plain_error: f64 = 0.0;
        for f in 0..mesh.n_internal_faces() {
            assert!((corrected.internal()[f] - exact(f)).abs() < 1e-10, "face {f}");
            plain_error = plain_error.max((plain.internal()[f] - exact(f)).abs());
        }
        assert!(plain_error > 1e-3);
    }

    #[test]
    fn limited_correction_is_bounded() {
        let (mesh, ctx) = sheared();
        let vf = planar(&mesh);
        let k = 0.2;
        let full = SnGradScheme::Corrected.correction(&ctx, &vf).unwrap().unwrap();
        let limited = SnGradScheme::Limited { limit_coeff: k }
            .correction(&ctx, &vf)
            .unwrap()
            .unwrap();
        let plain = SnGradScheme::Uncorrected.sn_grad(&ctx, &vf).unwrap();
        for f in 0..mesh.n_internal_faces() {
            let bound = k / (1.0 - k) * plain.internal()[f].abs() + 1e-12;
            assert!(limited.internal()[f].abs() <= bound);
            assert!(limited.internal()[f].abs() <= full.internal()[f].abs() + 1e-12);
        }
    }
}
