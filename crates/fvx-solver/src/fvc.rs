//! Explicit operators: each evaluates one term from the current field
//! values and returns a field.

use fvx_dict::term_key;

use crate::context::FvContext;
use crate::dimensions::{DIM_AREA, DIM_LENGTH, DIM_VOL, DIMLESS};
use crate::error::Result;
use crate::fields::{Coefficient, Dimensioned, Gamma, SurfaceField, VolField};
use crate::primitives::{Divergible, FieldValue, Gradable, Vector, curl_of_grad};

/// Per-cell sum of face values: owner faces add, neighbour faces
/// subtract, boundary faces add.
pub(crate) fn surface_sum_values<T: FieldValue>(ssf: &SurfaceField<T>) -> Vec<T> {
    let mesh = ssf.mesh();
    let mut sum = vec![T::zero(); mesh.n_cells()];
    for ((&o, &n), v) in mesh.owner().iter().zip(mesh.neighbour()).zip(ssf.internal()) {
        sum[o] += *v;
        sum[n] -= *v;
    }
    for (p, patch) in mesh.patches().iter().enumerate() {
        for (&c, v) in patch.face_cells().iter().zip(ssf.boundary(p)) {
            sum[c] += *v;
        }
    }
    sum
}

/// Net outflow of `ssf` per unit volume.
pub fn surface_integrate<T: FieldValue>(ssf: &SurfaceField<T>) -> Result<VolField<T>> {
    let mesh = ssf.mesh();
    let mut values = surface_sum_values(ssf);
    for (v, vol) in values.iter_mut().zip(mesh.v()) {
        *v = *v * (1.0 / vol);
    }
    VolField::extrapolated(
        &format!("surfaceIntegrate({})", ssf.name()),
        mesh,
        ssf.dimensions() / DIM_VOL,
        values,
    )
}

pub fn surface_sum<T: FieldValue>(ssf: &SurfaceField<T>) -> Result<VolField<T>> {
    VolField::extrapolated(
        &format!("surfaceSum({})", ssf.name()),
        ssf.mesh(),
        ssf.dimensions(),
        surface_sum_values(ssf),
    )
}

pub fn ddt<T: FieldValue>(ctx: &FvContext, vf: &VolField<T>) -> Result<VolField<T>> {
    ctx.check_mesh(vf.mesh())?;
    ctx.ddt_scheme(&term_key("ddt", &[vf.name()]))?
        .fvc_ddt(ctx, None, vf)
}

pub fn ddt_rho<T: FieldValue>(ctx: &FvContext, rho: &Coefficient, vf: &VolField<T>) -> Result<VolField<T>> {
    ctx.check_mesh(vf.mesh())?;
    ctx.ddt_scheme(&term_key("ddt", &[rho.name(), vf.name()]))?
        .fvc_ddt(ctx, Some(rho), vf)
}

pub fn d2dt2<T: FieldValue>(ctx: &FvContext, vf: &VolField<T>) -> Result<VolField<T>> {
    ctx.check_mesh(vf.mesh())?;
    ctx.d2dt2_scheme(&term_key("d2dt2", &[vf.name()]))?
        .fvc_d2dt2(ctx, None, vf)
}

pub fn grad<T: Gradable>(ctx: &FvContext, vf: &VolField<T>) -> Result<VolField<T::Grad>> {
    ctx.check_mesh(vf.mesh())?;
    ctx.grad_scheme(&term_key("grad", &[vf.name()]))?.grad(ctx, vf)
}

/// Convection `div(phi, vf)` per unit volume.
pub fn div<T: FieldValue>(ctx: &FvContext, phi: &SurfaceField<f64>, vf: &VolField<T>) -> Result<VolField<T>> {
    ctx.check_mesh(vf.mesh())?;
    ctx.check_mesh(phi.mesh())?;
    ctx.div_scheme(&term_key("div", &[phi.name(), vf.name()]))?
        .fvc_div(ctx, phi, vf)
}

/// Divergence of a face flux field.
pub fn div_surface<T: FieldValue>(ssf: &SurfaceField<T>) -> Result<VolField<T>> {
    Ok(surface_integrate(ssf)?.rename(&term_key("div", &[ssf.name()])))
}

/// Divergence of a cell vector or tensor field, with the face values from
/// the interpolation of the `div(<name>)` scheme.
pub fn div_vol<T: Divergible>(ctx: &FvContext, vf: &VolField<T>) -> Result<VolField<T::Div>> {
    ctx.check_mesh(vf.mesh())?;
    let key = term_key("div", &[vf.name()]);
    let face = ctx
        .div_scheme(&key)?
        .interpolation()
        .interpolate(ctx, vf, None)?;
    let mesh = vf.mesh();
    let internal = mesh
        .sf()
        .iter()
        .zip(face.internal())
        .map(|(s, v)| T::inner(s, v))
        .collect();
    let boundary = mesh
        .patches()
        .iter()
        .enumerate()
        .map(|(p, patch)| {
            patch
                .sf()
                .iter()
                .zip(face.boundary(p))
                .map(|(s, v)| T::inner(s, v))
                .collect()
        })
        .collect();
    let flux = SurfaceField::new(&key, mesh, vf.dimensions() * DIM_AREA, internal, boundary)?;
    Ok(surface_integrate(&flux)?.rename(&key))
}

pub fn laplacian<T: FieldValue>(ctx: &FvContext, gamma: &Gamma, vf: &VolField<T>) -> Result<VolField<T>> {
    ctx.check_mesh(vf.mesh())?;
    ctx.laplacian_scheme(&term_key("laplacian", &[gamma.name(), vf.name()]))?
        .fvc_laplacian(ctx, gamma, vf)
}

pub fn laplacian_unit<T: FieldValue>(ctx: &FvContext, vf: &VolField<T>) -> Result<VolField<T>> {
    ctx.check_mesh(vf.mesh())?;
    let gamma = Gamma::Uniform(Dimensioned::new("1", DIMLESS, 1.0));
    let key = term_key("laplacian", &[vf.name()]);
    Ok(ctx.laplacian_scheme(&key)?.fvc_laplacian(ctx, &gamma, vf)?.rename(&key))
}

/// Curl of a vector field from its gradient under `grad(<name>)`.
pub fn curl(ctx: &FvContext, vf: &VolField<Vector>) -> Result<VolField<Vector>> {
    let g = grad(ctx, vf)?;
    VolField::extrapolated(
        &term_key("curl", &[vf.name()]),
        vf.mesh(),
        vf.dimensions() / DIM_LENGTH,
        g.internal().iter().map(curl_of_grad).collect(),
    )
}

pub fn interpolate<T: FieldValue>(ctx: &FvContext, vf: &VolField<T>) -> Result<SurfaceField<T>> {
    ctx.check_mesh(vf.mesh())?;
    ctx.interpolation_scheme(&term_key("interpolate", &[vf.name()]))?
        .interpolate(ctx, vf, None)
}

/// Convective face flux `phi * vf_f` with the interpolation of the
/// `div(phi,<name>)` scheme.
pub fn flux<T: FieldValue>(ctx: &FvContext, phi: &SurfaceField<f64>, vf: &VolField<T>) -> Result<SurfaceField<T>> {
    ctx.check_mesh(vf.mesh())?;
    ctx.div_scheme(&term_key("div", &[phi.name(), vf.name()]))?
        .flux(ctx, phi, vf)
}

/// Volumetric face flux `Sf . U_f` of a velocity field.
pub fn face_flux(ctx: &FvContext, u: &VolField<Vector>) -> Result<SurfaceField<f64>> {
    let face = interpolate(ctx, u)?;
    let mesh = u.mesh();
    let dims = u.dimensions() * DIM_AREA;
    let sf = SurfaceField::from_face_vectors("Sf", mesh, DIM_AREA, |s| *s);
    Ok(sf.zip_map(&face, &term_key("flux", &[u.name()]), dims, |s, v| s.dot(v)))
}

pub fn sn_grad<T: FieldValue>(ctx: &FvContext, vf: &VolField<T>) -> Result<SurfaceField<T>> {
    ctx.check_mesh(vf.mesh())?;
    ctx.sn_grad_scheme(&term_key("snGrad", &[vf.name()]))?
        .sn_grad(ctx, vf)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use fvx_io::{FvSchemes, FvSolution, SchemeCategory};

    use super::*;
    use crate::dimensions::{DIM_TEMPERATURE, DIM_VELOCITY};
    use crate::mesh::{FvMesh, MeshBuilder};
    use crate::parallel::serial;

    fn setup() -> (Arc<FvMesh>, FvContext) {
        let mesh = Arc::new(MeshBuilder::rectangle(3, 3, 3.0, 3.0, 0.0, false, serial()).unwrap());
        let schemes = FvSchemes::default()
            .with(SchemeCategory::Grad, "default", "Gauss linear")
            .with(SchemeCategory::Div, "default", "Gauss linear")
            .with(SchemeCategory::Interpolation, "default", "linear");
        let ctx = FvContext::new(Arc::clone(&mesh), schemes, FvSolution::default());
        (mesh, ctx)
    }

    /// Velocity linear in position, exact on every patch face.
    fn velocity(mesh: &Arc<FvMesh>, f: impl Fn(&Vector) -> Vector) -> VolField<Vector> {
        let mut u = VolField::from_internal("U", mesh, DIM_VELOCITY, mesh.c().iter().map(&f).collect())
            .unwrap();
        for (p, patch) in mesh.patches().iter().enumerate() {
            let values: Vec<Vector> = patch.cf().iter().map(&f).collect();
            u.patch_field_mut(p).values_mut().copy_from_slice(&values);
        }
        u
    }

    #[test]
    fn surface_integrate_sums_with_face_orientation() {
        let mesh = Arc::new(MeshBuilder::line(3, 3.0, serial()).unwrap());
        let ssf = SurfaceField::new("q", &mesh, DIM_TEMPERATURE, vec![1.0, 2.0], vec![vec![0.5], vec![4.0]])
            .unwrap();
        let sum = surface_sum(&ssf).unwrap();
        assert_eq!(sum.internal(), &[1.5, 1.0, 2.0]);
        let integral = surface_integrate(&ssf).unwrap();
        assert_eq!(integral.dimensions(), DIM_TEMPERATURE / DIM_VOL);
        assert_eq!(integral.internal(), sum.internal());
    }

    #[test]
    fn divergence_of_linear_velocity_is_exact() {
        let (mesh, ctx) = setup();
        let u = velocity(&mesh, |x| Vector::new(2.0 * x.x, -0.5 * x.y, 0.0));
        let div = div_vol(&ctx, &u).unwrap();
        assert_eq!(div.name(), "div(U)");
        assert_eq!(div.dimensions(), DIM_VELOCITY / DIM_LENGTH);
        assert!(div.internal().iter().all(|d| (d - 1.5).abs() < 1e-12));

        let phi = face_flux(&ctx, &u).unwrap();
        assert_eq!(phi.name(), "flux(U)");
        let from_flux = div_surface(&phi).unwrap();
        for (a, b) in from_flux.internal().iter().zip(div.internal()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn curl_of_solid_rotation() {
        let (mesh, ctx) = setup();
        let u = velocity(&mesh, |x| Vector::new(-x.y, x.x, 0.0));
        let w = curl(&ctx, &u).unwrap();
        assert_eq!(w.name(), "curl(U)");
        for v in w.internal() {
            assert!((v - Vector::new(0.0, 0.0, 2.0)).norm() < 1e-12, "{v}");
        }
    }

    #[test]
    fn gradient_of_vector_field_follows_index_convention() {
        let (mesh, ctx) = setup();
        let u = velocity(&mesh, |x| Vector::new(0.0, 3.0 * x.x, 0.0));
        let g = grad(&ctx, &u).unwrap();
        // grad(U)[(i, j)] = dU_j / dx_i
        for t in g.internal() {
            assert!((t[(0, 1)] - 3.0).abs() < 1e-12);
            assert!(t[(1, 0)].abs() < 1e-12);
        }
    }
}
