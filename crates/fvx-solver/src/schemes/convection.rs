//! Convection `div(phi, vf)` for a given face flux `phi`.

use std::sync::OnceLock;

use fvx_dict::{TokenStream, term_key};

use crate::context::FvContext;
use crate::dimensions::DIM_VOL;
use crate::error::Result;
use crate::fields::{SurfaceField, VolField};
use crate::fv_matrix::FvMatrix;
use crate::fvc::surface_sum_values;
use crate::primitives::FieldValue;
use crate::schemes::{InterpolationScheme, parse_spec};
use crate::selection::RuntimeSelectionTable;

pub type ConvectionConstructor = fn(&mut TokenStream) -> Result<ConvectionScheme>;

#[derive(Debug, Clone, PartialEq)]
pub enum ConvectionScheme {
    /// Face values from an interpolation scheme times the flux.
    Gauss(InterpolationScheme),
    /// Another scheme minus `div(phi) * vf`, which keeps the operator
    /// bounded while the flux is not yet divergence free.
    Bounded(Box<ConvectionScheme>),
}

impl ConvectionScheme {
    pub fn new(spec: &str) -> Result<Self> {
        parse_spec(spec, Self::from_tokens)
    }

    pub fn from_tokens(tokens: &mut TokenStream) -> Result<Self> {
        let name = tokens.next_word()?;
        convection_schemes().lookup(&name)?(tokens)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ConvectionScheme::Gauss(_) => "Gauss",
            ConvectionScheme::Bounded(_) => "bounded",
        }
    }

    pub fn interpolation(&self) -> &InterpolationScheme {
        match self {
            ConvectionScheme::Gauss(interpolation) => interpolation,
            ConvectionScheme::Bounded(inner) => inner.interpolation(),
        }
    }

    /// `phi * vf_f`, the convective face flux.
    pub fn flux<T: FieldValue>(
        &self,
        ctx: &FvContext,
        phi: &SurfaceField<f64>,
        vf: &VolField<T>,
    ) -> Result<SurfaceField<T>> {
        let face = self.interpolation().interpolate(ctx, vf, Some(phi))?;
        Ok(phi.zip_map(
            &face,
            &format!("flux({},{})", phi.name(), vf.name()),
            phi.dimensions() * vf.dimensions(),
            |f, v| *v * *f,
        ))
    }

    pub fn fvm_div<T: FieldValue>(
        &self,
        ctx: &FvContext,
        phi: &SurfaceField<f64>,
        vf: &VolField<T>,
    ) -> Result<FvMatrix<T>> {
        match self {
            ConvectionScheme::Gauss(interpolation) => {
                gauss_fvm_div(ctx, interpolation, phi, vf)
            }
            ConvectionScheme::Bounded(inner) => {
                let mut m = inner.fvm_div(ctx, phi, vf)?;
                let net = surface_sum_values(phi);
                for (d, s) in m.diag_mut().iter_mut().zip(&net) {
                    *d -= s;
                }
                Ok(m)
            }
        }
    }

    /// Explicit divergence per unit volume.
    pub fn fvc_div<T: FieldValue>(
        &self,
        ctx: &FvContext,
        phi: &SurfaceField<f64>,
        vf: &VolField<T>,
    ) -> Result<VolField<T>> {
        let mesh = vf.mesh();
        let mut values = surface_sum_values(&self.flux(ctx, phi, vf)?);
        if let ConvectionScheme::Bounded(_) = self {
            let net = surface_sum_values(phi);
            for ((v, s), psi) in values.iter_mut().zip(&net).zip(vf.internal()) {
                *v -= *psi * *s;
            }
        }
        for (v, vol) in values.iter_mut().zip(mesh.v()) {
            *v = *v * (1.0 / vol);
        }
        VolField::extrapolated(
            &term_key("div", &[phi.name(), vf.name()]),
            mesh,
            phi.dimensions() * vf.dimensions() / DIM_VOL,
            values,
        )
    }
}

fn gauss_fvm_div<T: FieldValue>(
    ctx: &FvContext,
    interpolation: &InterpolationScheme,
    phi: &SurfaceField<f64>,
    vf: &VolField<T>,
) -> Result<FvMatrix<T>> {
    let weights = interpolation.weights(ctx, vf, Some(phi))?;
    let mut m = FvMatrix::new(vf, phi.dimensions() * vf.dimensions());

    let lower: Vec<f64> = weights
        .internal()
        .iter()
        .zip(phi.internal())
        .map(|(w, f)| -w * f)
        .collect();
    let upper = lower.iter().zip(phi.internal()).map(|(l, f)| l + f).collect();
    *m.upper_mut() = upper;
    *m.lower_mut() = lower;
    m.ldu_mut().neg_sum_diag();

    for p in 0..vf.mesh().patches().len() {
        let pw = weights.boundary(p);
        let pphi = phi.boundary(p);
        let ic = vf.value_internal_coeffs(p, pw)?;
        let bc = vf.value_boundary_coeffs(p, pw)?;
        m.internal_coeffs_mut()[p] = ic.iter().zip(pphi).map(|(c, f)| *c * *f).collect();
        m.boundary_coeffs_mut()[p] = bc.iter().zip(pphi).map(|(c, f)| *c * -*f).collect();
    }

    if let Some(correction) = interpolation.correction(ctx, vf, Some(phi))? {
        let face_flux = phi.zip_map(
            &correction,
            &format!("faceFluxCorr({},{})", phi.name(), vf.name()),
            phi.dimensions() * vf.dimensions(),
            |f, c| *c * *f,
        );
        for (s, net) in m.source_mut().iter_mut().zip(surface_sum_values(&face_flux)) {
            *s -= net;
        }
        if ctx.schemes().flux_required(vf.name()) {
            m.set_face_flux_correction(Some(face_flux));
        }
    }
    Ok(m)
}

fn gauss(tokens: &mut TokenStream) -> Result<ConvectionScheme> {
    Ok(ConvectionScheme::Gauss(InterpolationScheme::from_tokens(tokens)?))
}

fn bounded(tokens: &mut TokenStream) -> Result<ConvectionScheme> {
    Ok(ConvectionScheme::Bounded(Box::new(ConvectionScheme::from_tokens(tokens)?)))
}

pub fn convection_schemes() -> &'static RuntimeSelectionTable<ConvectionConstructor> {
    static TABLE: OnceLock<RuntimeSelectionTable<ConvectionConstructor>> = OnceLock::new();
    TABLE.get_or_init(|| {
        RuntimeSelectionTable::<ConvectionConstructor>::new("div scheme")
            .register("Gauss", gauss)
            .register("bounded", bounded)
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use fvx_io::{FvSchemes, FvSolution, SchemeCategory};

    use super::*;
    use crate::dimensions::{DIM_TEMPERATURE, DIM_VOLUMETRIC_FLUX, DIMLESS};
    use crate::fields::PatchCondition;
    use crate::mesh::{FvMesh, MeshBuilder};
    use crate::parallel::serial;
    use crate::primitives::Vector;

    fn setup(n: usize) -> (Arc<FvMesh>, FvContext, SurfaceField<f64>) {
        let mesh = Arc::new(MeshBuilder::line(n, n as f64, serial()).unwrap());
        let schemes = FvSchemes::default().with(SchemeCategory::Grad, "default", "Gauss linear");
        let ctx = FvContext::new(Arc::clone(&mesh), schemes, FvSolution::default());
        let u = Vector::new(1.0, 0.0, 0.0);
        let phi = SurfaceField::from_face_vectors("phi", &mesh, DIM_VOLUMETRIC_FLUX, |sf| sf.dot(&u));
        (mesh, ctx, phi)
    }

    fn inlet_field(mesh: &Arc<FvMesh>, value: f64) -> VolField<f64> {
        VolField::new("T", mesh, DIM_TEMPERATURE, value)
            .with_condition("left", PatchCondition::FixedValue(value))
            .unwrap()
            .with_condition("right", PatchCondition::ZeroGradient)
            .unwrap()
    }

    #[test]
    fn parses_nested_schemes() {
        let scheme = ConvectionScheme::new("bounded Gauss upwind").unwrap();
        assert_eq!(scheme.name(), "bounded");
        assert_eq!(scheme.interpolation(), &InterpolationScheme::Upwind);
        assert!(ConvectionScheme::new("Gauss").is_err());
    }

    #[test]
    fn upwind_matrix_transports_inlet_value() {
        let (mesh, ctx, phi) = setup(4);
        let t = inlet_field(&mesh, 2.0);
        let m = ConvectionScheme::new("Gauss upwind")
            .unwrap()
            .fvm_div(&ctx, &phi, &t)
            .unwrap();
        assert!(m.lower().iter().all(|l| *l == -1.0));
        assert!(m.upper().iter().all(|u| *u == 0.0));
        assert_eq!(m.dimensions(), DIM_VOLUMETRIC_FLUX * DIM_TEMPERATURE);
        let applied = m.apply(&t).unwrap();
        assert!(applied.internal().iter().all(|r| r.abs() < 1e-12));
    }

    #[test]
    fn explicit_divergence_is_conservative() {
        let (mesh, ctx, phi) = setup(5);
        let values = (0..5).map(|i| (i * i) as f64).collect();
        let t = VolField::from_internal("T", &mesh, DIM_TEMPERATURE, values)
            .unwrap()
            .with_condition("left", PatchCondition::FixedValue(0.0))
            .unwrap()
            .with_condition("right", PatchCondition::ZeroGradient)
            .unwrap();
        let div = ConvectionScheme::new("Gauss linear")
            .unwrap()
            .fvc_div(&ctx, &phi, &t)
            .unwrap();
        assert_eq!(div.name(), "div(phi,T)");
        let total: f64 = div.internal().iter().zip(mesh.v()).map(|(d, v)| d * v).sum();
        // Net outflow: the right boundary value minus the inlet value.
        assert!((total - 16.0).abs() < 1e-12);
    }

    #[test]
    fn bounded_form_vanishes_for_uniform_field() {
        let (mesh, ctx, _) = setup(3);
        let phi = SurfaceField::new(
            "phi",
            &mesh,
            DIM_VOLUMETRIC_FLUX,
            vec![1.0, 3.0],
            vec![vec![-0.5], vec![2.0]],
        )
        .unwrap();
        let t = inlet_field(&mesh, 5.0);
        let plain = ConvectionScheme::new("Gauss upwind").unwrap();
        let bounded = ConvectionScheme::new("bounded Gauss upwind").unwrap();
        assert!(plain.fvc_div(&ctx, &phi, &t).unwrap().internal()[1].abs() > 1.0);
        let div = bounded.fvc_div(&ctx, &phi, &t).unwrap();
        assert!(div.internal().iter().all(|v| v.abs() < 1e-12));
        let m = bounded.fvm_div(&ctx, &phi, &t).unwrap();
        assert!(m.apply(&t).unwrap().internal().iter().all(|v| v.abs() < 1e-12));
    }

    #[test]
    fn linear_upwind_records_face_flux_correction_when_required() {
        let (mesh, mut ctx, phi) = setup(4);
        let t = inlet_field(&mesh, 1.0);
        let scheme = ConvectionScheme::new("Gauss linearUpwind grad(T)").unwrap();

        let m = scheme.fvm_div(&ctx, &phi, &t).unwrap();
        assert!(m.face_flux_correction().is_none());

        ctx.schemes_mut().set_flux_required("T");
        let corrected = scheme.fvm_div(&ctx, &phi, &t).unwrap();
        assert!(corrected.face_flux_correction().is_some());
        assert_eq!(corrected.source(), m.source());

        let plain = ConvectionScheme::new("Gauss upwind")
            .unwrap()
            .fvm_div(&ctx, &phi, &t)
            .unwrap();
        assert!(plain.face_flux_correction().is_none());
        assert_eq!(mesh.n_cells(), m.source().len());
    }

    #[test]
    fn linear_upwind_matrix_scales_by_field() {
        let (mesh, ctx, phi) = setup(4);
        let values = (0..4).map(|i| (i * i) as f64).collect();
        let t = VolField::from_internal("T", &mesh, DIM_TEMPERATURE, values)
            .unwrap()
            .with_condition("left", PatchCondition::FixedValue(0.0))
            .unwrap()
            .with_condition("right", PatchCondition::ZeroGradient)
            .unwrap();
        let rho = VolField::from_internal("rho", &mesh, DIMLESS, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let scheme = ConvectionScheme::new("Gauss linearUpwind grad(T)").unwrap();

        let m = scheme.fvm_div(&ctx, &phi, &t).unwrap();
        let expected: Vec<f64> = m
            .source()
            .iter()
            .zip(rho.internal())
            .map(|(s, r)| s * r)
            .collect();
        assert!(m.source().iter().any(|s| *s != 0.0));

        let mut scaled = m.clone();
        scaled.try_scale_by_field(&rho).unwrap();
        assert_eq!(scaled.source(), expected.as_slice());

        let product = &rho * m;
        assert_eq!(product.source(), expected.as_slice());
    }
}
