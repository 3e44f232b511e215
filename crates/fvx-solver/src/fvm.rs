//! Implicit operators: each returns the matrix of one term for `vf`.
//!
//! Schemes are looked up in the context under the usual term keys, e.g.
//! `ddt(rho,T)`, `div(phi,T)` or `laplacian(DT,T)`.

use fvx_dict::term_key;

use crate::context::FvContext;
use crate::dimensions::{DIM_VOL, DIMLESS};
use crate::error::Result;
use crate::fields::{Coefficient, Dimensioned, Gamma, SurfaceField, VolField};
use crate::fv_matrix::FvMatrix;
use crate::primitives::FieldValue;

pub fn ddt<T: FieldValue>(ctx: &FvContext, vf: &VolField<T>) -> Result<FvMatrix<T>> {
    ctx.check_mesh(vf.mesh())?;
    ctx.ddt_scheme(&term_key("ddt", &[vf.name()]))?
        .fvm_ddt(ctx, None, vf)
}

pub fn ddt_rho<T: FieldValue>(ctx: &FvContext, rho: &Coefficient, vf: &VolField<T>) -> Result<FvMatrix<T>> {
    ctx.check_mesh(vf.mesh())?;
    ctx.ddt_scheme(&term_key("ddt", &[rho.name(), vf.name()]))?
        .fvm_ddt(ctx, Some(rho), vf)
}

pub fn d2dt2<T: FieldValue>(ctx: &FvContext, vf: &VolField<T>) -> Result<FvMatrix<T>> {
    ctx.check_mesh(vf.mesh())?;
    ctx.d2dt2_scheme(&term_key("d2dt2", &[vf.name()]))?
        .fvm_d2dt2(ctx, None, vf)
}

pub fn d2dt2_rho<T: FieldValue>(ctx: &FvContext, rho: &Coefficient, vf: &VolField<T>) -> Result<FvMatrix<T>> {
    ctx.check_mesh(vf.mesh())?;
    ctx.d2dt2_scheme(&term_key("d2dt2", &[rho.name(), vf.name()]))?
        .fvm_d2dt2(ctx, Some(rho), vf)
}

/// Convection of `vf` by the face flux `phi`.
pub fn div<T: FieldValue>(ctx: &FvContext, phi: &SurfaceField<f64>, vf: &VolField<T>) -> Result<FvMatrix<T>> {
    ctx.check_mesh(vf.mesh())?;
    ctx.check_mesh(phi.mesh())?;
    ctx.div_scheme(&term_key("div", &[phi.name(), vf.name()]))?
        .fvm_div(ctx, phi, vf)
}

pub fn laplacian<T: FieldValue>(ctx: &FvContext, gamma: &Gamma, vf: &VolField<T>) -> Result<FvMatrix<T>> {
    ctx.check_mesh(vf.mesh())?;
    if let Gamma::Face(face) = gamma {
        ctx.check_mesh(face.mesh())?;
    }
    ctx.laplacian_scheme(&term_key("laplacian", &[gamma.name(), vf.name()]))?
        .fvm_laplacian(ctx, gamma, vf)
}

/// `laplacian(vf)` with a dimensionless unit diffusivity.
pub fn laplacian_unit<T: FieldValue>(ctx: &FvContext, vf: &VolField<T>) -> Result<FvMatrix<T>> {
    ctx.check_mesh(vf.mesh())?;
    let gamma = Gamma::Uniform(Dimensioned::new("1", DIMLESS, 1.0));
    ctx.laplacian_scheme(&term_key("laplacian", &[vf.name()]))?
        .fvm_laplacian(ctx, &gamma, vf)
}

/// Explicit source `su`, added to the right-hand side.
pub fn su<T: FieldValue>(su: &VolField<T>, vf: &VolField<T>) -> Result<FvMatrix<T>> {
    let mut m = FvMatrix::new(vf, su.dimensions() * DIM_VOL);
    m.check_mesh(su.mesh(), su.name())?;
    let v = vf.mesh().v();
    for ((s, value), vol) in m.source_mut().iter_mut().zip(su.internal()).zip(v) {
        *s -= *value * *vol;
    }
    Ok(m)
}

/// Implicit linear source `sp * vf`.
pub fn sp<T: FieldValue>(sp: &Coefficient, vf: &VolField<T>) -> Result<FvMatrix<T>> {
    let mut m = FvMatrix::new(vf, sp.dimensions() * vf.dimensions() * DIM_VOL);
    if let Coefficient::Cell(field) = sp {
        m.check_mesh(field.mesh(), field.name())?;
    }
    let v = vf.mesh().v();
    for (c, d) in m.diag_mut().iter_mut().enumerate() {
        *d += v[c] * sp.value(c);
    }
    Ok(m)
}

/// Implicit where `susp` is positive, explicit with the current `vf`
/// where it is negative.
pub fn su_sp<T: FieldValue>(susp: &Coefficient, vf: &VolField<T>) -> Result<FvMatrix<T>> {
    let mut m = FvMatrix::new(vf, susp.dimensions() * vf.dimensions() * DIM_VOL);
    if let Coefficient::Cell(field) = susp {
        m.check_mesh(field.mesh(), field.name())?;
    }
    let v = vf.mesh().v();
    let psi = vf.internal();
    for c in 0..v.len() {
        let coeff = susp.value(c);
        m.diag_mut()[c] += v[c] * coeff.max(0.0);
        m.source_mut()[c] -= psi[c] * (v[c] * coeff.min(0.0));
    }
    Ok(m)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use fvx_io::{FvSchemes, FvSolution, SchemeCategory};

    use super::*;
    use crate::dimensions::{DIM_TEMPERATURE, DIM_TIME};
    use crate::error::FvError;
    use crate::mesh::MeshBuilder;
    use crate::parallel::serial;

    #[test]
    fn explicit_source_moves_to_right_hand_side() {
        let mesh = Arc::new(MeshBuilder::line(3, 3.0, serial()).unwrap());
        let t = VolField::new("T", &mesh, DIM_TEMPERATURE, 0.0);
        let q = VolField::new("q", &mesh, DIM_TEMPERATURE / DIM_TIME, 2.0);
        let m = su(&q, &t).unwrap();
        assert_eq!(m.source(), &[-2.0, -2.0, -2.0]);
        assert_eq!(m.dimensions(), DIM_TEMPERATURE * DIM_VOL / DIM_TIME);
    }

    #[test]
    fn implicit_source_scales_diagonal_by_volume() {
        let mesh = Arc::new(MeshBuilder::line(2, 4.0, serial()).unwrap());
        let t = VolField::new("T", &mesh, DIM_TEMPERATURE, 1.0);
        let k = Coefficient::Uniform(Dimensioned::new("k", DIMLESS / DIM_TIME, 0.5));
        let m = sp(&k, &t).unwrap();
        assert_eq!(m.diag(), &[1.0, 1.0]);
        assert!(m.source().iter().all(|s| *s == 0.0));
    }

    #[test]
    fn missing_scheme_names_the_term() {
        let mesh = Arc::new(MeshBuilder::line(2, 2.0, serial()).unwrap());
        let schemes = FvSchemes::default().with(SchemeCategory::Laplacian, "laplacian(DT,T)", "Gauss linear corrected");
        let ctx = FvContext::new(Arc::clone(&mesh), schemes, FvSolution::default());
        let t = VolField::new("T", &mesh, DIM_TEMPERATURE, 1.0);
        match ddt(&ctx, &t) {
            Err(FvError::MissingEntry { key, .. }) => assert_eq!(key, "ddt(T)"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn foreign_mesh_is_rejected() {
        let mesh = Arc::new(MeshBuilder::line(2, 2.0, serial()).unwrap());
        let other = Arc::new(MeshBuilder::line(2, 2.0, serial()).unwrap());
        let ctx = FvContext::new(Arc::clone(&mesh), FvSchemes::default(), FvSolution::default());
        let t = VolField::new("T", &other, DIM_TEMPERATURE, 1.0);
        assert!(matches!(laplacian_unit(&ctx, &t), Err(FvError::Mesh(_))));
    }
}
