//! Cell-to-face interpolation.
//!
//! A scheme supplies the owner weight `w` of every face, so that the face
//! value is `w * P + (1 - w) * N`, plus an optional explicit correction
//! added on top. Upwind-biased schemes need the face flux to decide which
//! side is upwind.

use std::sync::OnceLock;

use fvx_dict::{TokenStream, term_key};

use crate::context::FvContext;
use crate::dimensions::DIMLESS;
use crate::error::{FvError, Result};
use crate::fields::{SurfaceField, VolField};
use crate::ldu::solvers::SMALL;
use crate::primitives::{FieldValue, Vector};
use crate::schemes::parse_spec;
use crate::selection::RuntimeSelectionTable;

pub type InterpolationConstructor = fn(&mut TokenStream) -> Result<InterpolationScheme>;

/// Flux limiters of the TVD family, as functions of the gradient ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Limiter {
    /// `limitedLinear k`: linear where the ratio exceeds `k / 2`, upwind
    /// where the profile is not smooth.
    LimitedLinear { two_by_k: f64 },
    VanLeer,
    Minmod,
    SuperBee,
    Muscl,
}

impl Limiter {
    pub fn name(&self) -> &'static str {
        match self {
            Limiter::LimitedLinear { .. } => "limitedLinear",
            Limiter::VanLeer => "vanLeer",
            Limiter::Minmod => "Minmod",
            Limiter::SuperBee => "SuperBee",
            Limiter::Muscl => "MUSCL",
        }
    }

    pub fn limit(&self, r: f64) -> f64 {
        match *self {
            Limiter::LimitedLinear { two_by_k } => (two_by_k * r).min(1.0).max(0.0),
            Limiter::VanLeer => (r + r.abs()) / (1.0 + r.abs()),
            Limiter::Minmod => r.min(1.0).min(2.0).max(0.0),
            Limiter::SuperBee => (2.0 * r).min(1.0).max(r.min(2.0)).max(0.0),
            Limiter::Muscl => (2.0 * r).min(0.5 * r + 0.5).min(2.0).max(0.0),
        }
    }
}

fn sign(x: f64) -> f64 {
    if x >= 0.0 { 1.0 } else { -1.0 }
}

fn pos0(x: f64) -> f64 {
    if x >= 0.0 { 1.0 } else { 0.0 }
}

/// Ratio of the upwind-cell gradient projected on `d` to the face
/// difference, shifted so a linear profile gives one.
pub fn gradient_ratio(flux: f64, phi_p: f64, phi_n: f64, grad_p: &Vector, grad_n: &Vector, d: &Vector) -> f64 {
    let gradf = phi_n - phi_p;
    let gradcf = if flux > 0.0 { d.dot(grad_p) } else { d.dot(grad_n) };
    if gradcf.abs() >= 1000.0 * gradf.abs() {
        2.0 * 1000.0 * sign(gradcf) * sign(gradf) - 1.0
    } else {
        2.0 * (gradcf / gradf) - 1.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InterpolationScheme {
    Linear,
    MidPoint,
    Upwind,
    /// Upwind plus the gradient extrapolation from the upwind cell. The
    /// gradient scheme is looked up under `grad_key`, by default
    /// `grad(<field>)`.
    LinearUpwind { grad_key: Option<String> },
    Tvd(Limiter),
}

impl InterpolationScheme {
    pub fn new(spec: &str) -> Result<Self> {
        parse_spec(spec, Self::from_tokens)
    }

    pub fn from_tokens(tokens: &mut TokenStream) -> Result<Self> {
        let name = tokens.next_word()?;
        interpolation_schemes().lookup(&name)?(tokens)
    }

    pub fn name(&self) -> &'static str {
        match self {
            InterpolationScheme::Linear => "linear",
            InterpolationScheme::MidPoint => "midPoint",
            InterpolationScheme::Upwind => "upwind",
            InterpolationScheme::LinearUpwind { .. } => "linearUpwind",
            InterpolationScheme::Tvd(limiter) => limiter.name(),
        }
    }

    pub fn needs_flux(&self) -> bool {
        !matches!(self, InterpolationScheme::Linear | InterpolationScheme::MidPoint)
    }

    /// True when the scheme adds an explicit correction to the weighted
    /// face value.
    pub fn corrected(&self) -> bool {
        matches!(self, InterpolationScheme::LinearUpwind { .. })
    }

    fn require_flux<'a>(&self, vf_name: &str, flux: Option<&'a SurfaceField<f64>>) -> Result<&'a SurfaceField<f64>> {
        flux.ok_or_else(|| {
            FvError::Unsupported(format!(
                "{} interpolation of {vf_name} needs a face flux",
                self.name()
            ))
        })
    }

    pub fn weights<T: FieldValue>(
        &self,
        ctx: &FvContext,
        vf: &VolField<T>,
        flux: Option<&SurfaceField<f64>>,
    ) -> Result<SurfaceField<f64>> {
        let mesh = vf.mesh();
        let name = format!("{}Weights", self.name());
        match self {
            InterpolationScheme::Linear => {
                let boundary = mesh.patches().iter().map(|p| p.weights().to_vec()).collect();
                SurfaceField::new(&name, mesh, DIMLESS, mesh.weights().to_vec(), boundary)
            }
            InterpolationScheme::MidPoint => {
                let boundary = mesh
                    .patches()
                    .iter()
                    .map(|p| vec![if p.coupled() { 0.5 } else { 1.0 }; p.size()])
                    .collect();
                SurfaceField::new(&name, mesh, DIMLESS, vec![0.5; mesh.n_internal_faces()], boundary)
            }
            InterpolationScheme::Upwind | InterpolationScheme::LinearUpwind { .. } => {
                let phi = self.require_flux(vf.name(), flux)?;
                Ok(upwind_weights(phi, &name))
            }
            InterpolationScheme::Tvd(limiter) => {
                let phi = self.require_flux(vf.name(), flux)?;
                let lim = limiter_field(ctx, *limiter, vf, phi)?;
                let mut w = upwind_weights(phi, &name);
                for ((wf, l), cd) in w.internal_mut().iter_mut().zip(lim.internal()).zip(mesh.weights()) {
                    *wf = l * cd + (1.0 - l) * *wf;
                }
                for (p, patch) in mesh.patches().iter().enumerate() {
                    if !patch.coupled() {
                        w.boundary_mut(p).iter_mut().for_each(|x| *x = 1.0);
                        continue;
                    }
                    let lp = lim.boundary(p).to_vec();
                    for ((wf, l), cd) in w.boundary_mut(p).iter_mut().zip(&lp).zip(patch.weights()) {
                        *wf = l * cd + (1.0 - l) * *wf;
                    }
                }
                Ok(w)
            }
        }
    }

    /// Explicit correction for schemes that have one.
    pub fn correction<T: FieldValue>(
        &self,
        ctx: &FvContext,
        vf: &VolField<T>,
        flux: Option<&SurfaceField<f64>>,
    ) -> Result<Option<SurfaceField<T>>> {
        let InterpolationScheme::LinearUpwind { grad_key } = self else {
            return Ok(None);
        };
        let phi = self.require_flux(vf.name(), flux)?;
        let key = grad_key
            .clone()
            .unwrap_or_else(|| term_key("grad", &[vf.name()]));
        let grads = component_gradients(ctx, &key, vf)?;

        let mesh = vf.mesh();
        let (owner, neighbour) = (mesh.owner(), mesh.neighbour());
        let (c, cf) = (mesh.c(), mesh.cf());

        let internal = (0..mesh.n_internal_faces())
            .map(|f| {
                let cell = if phi.internal()[f] > 0.0 { owner[f] } else { neighbour[f] };
                let r = cf[f] - c[cell];
                let mut value = T::zero();
                for (k, g) in grads.iter().enumerate() {
                    value.set_component(k, r.dot(&g.internal()[cell]));
                }
                value
            })
            .collect();

        let mut boundary = Vec::with_capacity(mesh.patches().len());
        for (p, patch) in mesh.patches().iter().enumerate() {
            if !patch.coupled() {
                boundary.push(vec![T::zero(); patch.size()]);
                continue;
            }
            let nbr_grads = grads
                .iter()
                .map(|g| g.patch_field(p).neighbour_values().map(<[Vector]>::to_vec))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| FvError::Mesh(format!("no neighbour gradient on patch {}", patch.name())))?;
            let values = (0..patch.size())
                .map(|i| {
                    let own = patch.face_cells()[i];
                    let mut value = T::zero();
                    for (k, g) in grads.iter().enumerate() {
                        let x = if phi.boundary(p)[i] > 0.0 {
                            (patch.cf()[i] - c[own]).dot(&g.internal()[own])
                        } else {
                            (patch.cf()[i] - patch.delta()[i] - c[own]).dot(&nbr_grads[k][i])
                        };
                        value.set_component(k, x);
                    }
                    value
                })
                .collect();
            boundary.push(values);
        }
        let name = format!("linearUpwindCorrection({})", vf.name());
        Ok(Some(SurfaceField::new(&name, mesh, vf.dimensions(), internal, boundary)?))
    }

    /// Face values of `vf`. Physical patches take the patch values,
    /// coupled patches weight the two adjacent cells.
    pub fn interpolate<T: FieldValue>(
        &self,
        ctx: &FvContext,
        vf: &VolField<T>,
        flux: Option<&SurfaceField<f64>>,
    ) -> Result<SurfaceField<T>> {
        let w = self.weights(ctx, vf, flux)?;
        let mut face = weighted_interpolate(vf, &w)?;
        if let Some(correction) = self.correction(ctx, vf, flux)? {
            face.add_assign(&correction);
        }
        Ok(face)
    }
}

fn upwind_weights(phi: &SurfaceField<f64>, name: &str) -> SurfaceField<f64> {
    let mut w = phi.map(name, DIMLESS, |f| pos0(*f));
    for (p, patch) in phi.mesh().patches().iter().enumerate() {
        if !patch.coupled() {
            w.boundary_mut(p).iter_mut().for_each(|x| *x = 1.0);
        }
    }
    w
}

/// `w * P + (1 - w) * N` with the given weights.
pub(crate) fn weighted_interpolate<T: FieldValue>(
    vf: &VolField<T>,
    weights: &SurfaceField<f64>,
) -> Result<SurfaceField<T>> {
    let mesh = vf.mesh();
    let values = vf.internal();
    let internal = mesh
        .owner()
        .iter()
        .zip(mesh.neighbour())
        .zip(weights.internal())
        .map(|((&o, &n), &w)| values[o] * w + values[n] * (1.0 - w))
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
                    .zip(weights.boundary(p))
                    .map(|((&c, n), &w)| values[c] * w + *n * (1.0 - w))
                    .collect(),
                _ => pf.values().to_vec(),
            }
        })
        .collect();
    SurfaceField::new(
        &format!("interpolate({})", vf.name()),
        mesh,
        vf.dimensions(),
        internal,
        boundary,
    )
}

/// Gradient of every component of `vf`, with the scheme found under `key`.
pub(crate) fn component_gradients<T: FieldValue>(
    ctx: &FvContext,
    key: &str,
    vf: &VolField<T>,
) -> Result<Vec<VolField<Vector>>> {
    let scheme = ctx.grad_scheme(key)?;
    (0..T::N_COMPONENTS)
        .map(|c| scheme.grad(ctx, &vf.component_field(c)))
        .collect()
}

/// Limiter per face, the smallest over the components of `vf`. Physical
/// patches are not limited.
fn limiter_field<T: FieldValue>(
    ctx: &FvContext,
    limiter: Limiter,
    vf: &VolField<T>,
    phi: &SurfaceField<f64>,
) -> Result<SurfaceField<f64>> {
    let mesh = vf.mesh();
    let grads = component_gradients(ctx, &term_key("grad", &[vf.name()]), vf)?;
    let (owner, neighbour, c) = (mesh.owner(), mesh.neighbour(), mesh.c());

    let mut lim = SurfaceField::uniform("limiter", mesh, DIMLESS, f64::INFINITY);
    for (k, grad) in grads.iter().enumerate() {
        let g = grad.internal();
        for f in 0..mesh.n_internal_faces() {
            let (o, n) = (owner[f], neighbour[f]);
            let r = gradient_ratio(
                phi.internal()[f],
                vf.internal()[o].component(k),
                vf.internal()[n].component(k),
                &g[o],
                &g[n],
                &(c[n] - c[o]),
            );
            let l = &mut lim.internal_mut()[f];
            *l = l.min(limiter.limit(r));
        }
        for (p, patch) in mesh.patches().iter().enumerate() {
            let nbr = (
                vf.patch_field(p).neighbour_values(),
                grad.patch_field(p).neighbour_values(),
            );
            let (Some(nbr_values), Some(nbr_grads), true) = (nbr.0, nbr.1, patch.coupled()) else {
                lim.boundary_mut(p).iter_mut().for_each(|l| *l = 1.0);
                continue;
            };
            for i in 0..patch.size() {
                let own = patch.face_cells()[i];
                let r = gradient_ratio(
                    phi.boundary(p)[i],
                    vf.internal()[own].component(k),
                    nbr_values[i].component(k),
                    &g[own],
                    &nbr_grads[i],
                    &patch.delta()[i],
                );
                let l = &mut lim.boundary_mut(p)[i];
                *l = l.min(limiter.limit(r));
            }
        }
    }
    Ok(lim)
}

fn linear(_: &mut TokenStream) -> Result<InterpolationScheme> {
    Ok(InterpolationScheme::Linear)
}

fn mid_point(_: &mut TokenStream) -> Result<InterpolationScheme> {
    Ok(InterpolationScheme::MidPoint)
}

fn upwind(_: &mut TokenStream) -> Result<InterpolationScheme> {
    Ok(InterpolationScheme::Upwind)
}

fn linear_upwind(tokens: &mut TokenStream) -> Result<InterpolationScheme> {
    let grad_key = match tokens.peek_word() {
        Some(word) if word.starts_with("grad(") => Some(tokens.next_word()?),
        _ => None,
    };
    Ok(InterpolationScheme::LinearUpwind { grad_key })
}

fn limited_linear(tokens: &mut TokenStream) -> Result<InterpolationScheme> {
    let k = tokens.next_scalar()?;
    if !(0.0..=1.0).contains(&k) {
        return Err(FvError::BadSchemeSpec(format!(
            "limitedLinear coefficient {k} is outside [0, 1]"
        )));
    }
    let k = (k / 2.0).max(SMALL);
    Ok(InterpolationScheme::Tvd(Limiter::LimitedLinear { two_by_k: 2.0 / k }))
}

pub fn interpolation_schemes() -> &'static RuntimeSelectionTable<InterpolationConstructor> {
    static TABLE: OnceLock<RuntimeSelectionTable<InterpolationConstructor>> = OnceLock::new();
    TABLE.get_or_init(|| {
        RuntimeSelectionTable::<InterpolationConstructor>::new("interpolation scheme")
            .register("linear", linear)
            .register("midPoint", mid_point)
            .register("upwind", upwind)
            .register("linearUpwind", linear_upwind)
            .register("limitedLinear", limited_linear)
            .register("vanLeer", |_| Ok(InterpolationScheme::Tvd(Limiter::VanLeer)))
            .register("Minmod", |_| Ok(InterpolationScheme::Tvd(Limiter::Minmod)))
            .register("SuperBee", |_| Ok(InterpolationScheme::Tvd(Limiter::SuperBee)))
            .register("MUSCL", |_| Ok(InterpolationScheme::Tvd(Limiter::Muscl)))
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use fvx_io::{FvSchemes, FvSolution, SchemeCategory};

    use super::*;
    use crate::dimensions::{DIM_TEMPERATURE, DIM_VOLUMETRIC_FLUX};
    use crate::fields::PatchCondition;
    use crate::mesh::{FvMesh, MeshBuilder};
    use crate::parallel::serial;

    fn setup(n: usize) -> (Arc<FvMesh>, FvContext) {
        let mesh = Arc::new(MeshBuilder::line(n, n as f64, serial()).unwrap());
        let schemes = FvSchemes::default().with(SchemeCategory::Grad, "default", "Gauss linear");
        let ctx = FvContext::new(Arc::clone(&mesh), schemes, FvSolution::default());
        (mesh, ctx)
    }

    fn ramp(mesh: &Arc<FvMesh>, f: impl Fn(f64) -> f64) -> VolField<f64> {
        let values = mesh.c().iter().map(|c| f(c.x)).collect();
        VolField::from_internal("T", mesh, DIM_TEMPERATURE, values)
            .unwrap()
            .with_condition("left", PatchCondition::FixedValue(f(0.0)))
            .unwrap()
            .with_condition("right", PatchCondition::FixedValue(f(mesh.n_cells() as f64)))
            .unwrap()
    }

    #[test]
    fn parses_names_and_arguments() {
        assert_eq!(InterpolationScheme::new("linear").unwrap(), InterpolationScheme::Linear);
        assert_eq!(
            InterpolationScheme::new("linearUpwind grad(U)").unwrap(),
            InterpolationScheme::LinearUpwind {
                grad_key: Some("grad(U)".to_string())
            }
        );
        assert_eq!(
            InterpolationScheme::new("limitedLinear 1").unwrap(),
            InterpolationScheme::Tvd(Limiter::LimitedLinear { two_by_k: 4.0 })
        );
        assert!(matches!(
            InterpolationScheme::new("limitedLinear 3"),
            Err(FvError::BadSchemeSpec(_))
        ));
        let err = InterpolationScheme::new("cubicSpline").unwrap_err();
        assert!(err.to_string().contains("valid interpolation scheme types are"));
    }

    #[test]
    fn limiters_match_reference_values() {
        assert_eq!(Limiter::Minmod.limit(0.5), 0.5);
        assert_eq!(Limiter::Minmod.limit(-1.0), 0.0);
        assert_eq!(Limiter::SuperBee.limit(0.25), 0.5);
        assert_eq!(Limiter::SuperBee.limit(3.0), 2.0);
        assert!((Limiter::VanLeer.limit(1.0) - 1.0).abs() < 1e-15);
        assert_eq!(Limiter::Muscl.limit(1.0), 1.0);
        assert_eq!(Limiter::LimitedLinear { two_by_k: 4.0 }.limit(0.1), 0.4);
    }

    #[test]
    fn linear_profile_has_unit_ratio() {
        let d = Vector::new(1.0, 0.0, 0.0);
        let g = Vector::new(2.0, 0.0, 0.0);
        assert!((gradient_ratio(1.0, 0.0, 2.0, &g, &g, &d) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn linear_reproduces_linear_profile() {
        let (mesh, ctx) = setup(5);
        let vf = ramp(&mesh, |x| 3.0 * x + 1.0);
        let face = InterpolationScheme::Linear.interpolate(&ctx, &vf, None).unwrap();
        for (v, cf) in face.internal().iter().zip(mesh.cf()) {
            assert!((v - (3.0 * cf.x + 1.0)).abs() < 1e-12);
        }
        assert_eq!(face.boundary(1), &[16.0]);
    }

    #[test]
    fn upwind_follows_flux_direction() {
        let (mesh, ctx) = setup(4);
        let vf = ramp(&mesh, |x| x);
        assert!(matches!(
            InterpolationScheme::Upwind.interpolate(&ctx, &vf, None),
            Err(FvError::Unsupported(_))
        ));
        let phi = SurfaceField::uniform("phi", &mesh, DIM_VOLUMETRIC_FLUX, -1.0);
        let face = InterpolationScheme::Upwind.interpolate(&ctx, &vf, Some(&phi)).unwrap();
        for (f, v) in face.internal().iter().enumerate() {
            assert_eq!(*v, vf.internal()[mesh.neighbour()[f]]);
        }
    }

    #[test]
    fn linear_upwind_is_exact_for_linear_profile() {
        let (mesh, ctx) = setup(6);
        let vf = ramp(&mesh, |x| 2.0 * x);
        let phi = SurfaceField::uniform("phi", &mesh, DIM_VOLUMETRIC_FLUX, 1.0);
        let scheme = InterpolationScheme::new("linearUpwind").unwrap();
        let face = scheme.interpolate(&ctx, &vf, Some(&phi)).unwrap();
        // Interior faces away from the boundary see the exact gradient.
        for f in 1..mesh.n_internal_faces() {
            assert!((face.internal()[f] - 2.0 * mesh.cf()[f].x).abs() < 1e-10);
        }
    }

    #[test]
    fn tvd_is_central_on_smooth_and_upwind_at_extrema() {
        let (mesh, ctx) = setup(8);
        let phi = SurfaceField::uniform("phi", &mesh, DIM_VOLUMETRIC_FLUX, 1.0);
        let scheme = InterpolationScheme::new("vanLeer").unwrap();

        let smooth = ramp(&mesh, |x| x);
        let w = scheme.weights(&ctx, &smooth, Some(&phi)).unwrap();
        for f in 1..mesh.n_internal_faces() - 1 {
            assert!((w.internal()[f] - 0.5).abs() < 1e-10);
        }

        let values = (0..8).map(|i| if i % 2 == 0 { 0.0 } else { 1.0 }).collect();
        let rough = VolField::from_internal("T", &mesh, DIM_TEMPERATURE, values)
            .unwrap()
            .with_condition("left", PatchCondition::ZeroGradient)
            .unwrap()
            .with_condition("right", PatchCondition::ZeroGradient)
            .unwrap();
        let w = scheme.weights(&ctx, &rough, Some(&phi)).unwrap();
        for f in 1..mesh.n_internal_faces() - 1 {
            assert_eq!(w.internal()[f], 1.0);
        }
    }
}
