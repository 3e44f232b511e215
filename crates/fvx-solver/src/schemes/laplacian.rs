//! Diffusion `laplacian(gamma, vf)` by Gauss integration of a face-normal
//! gradient.

use std::sync::{Arc, OnceLock};

use fvx_dict::{TokenStream, term_key};

use crate::context::FvContext;
use crate::dimensions::{DIM_AREA, DIM_LENGTH, DIM_VOL};
use crate::error::{FvError, Result};
use crate::fields::{Gamma, SurfaceField, VolField};
use crate::fv_matrix::FvMatrix;
use crate::fvc::surface_sum_values;
use crate::mesh::FvMesh;
use crate::primitives::FieldValue;
use crate::schemes::{InterpolationScheme, SnGradScheme, parse_spec};
use crate::selection::RuntimeSelectionTable;

pub type LaplacianConstructor = fn(&mut TokenStream) -> Result<LaplacianScheme>;

#[derive(Debug, Clone, PartialEq)]
pub struct LaplacianScheme {
    /// Interpolation of a cell diffusivity to the faces.
    pub gamma_interpolation: InterpolationScheme,
    pub sn_grad: SnGradScheme,
}

impl LaplacianScheme {
    pub fn new(spec: &str) -> Result<Self> {
        parse_spec(spec, Self::from_tokens)
    }

    pub fn from_tokens(tokens: &mut TokenStream) -> Result<Self> {
        let name = tokens.next_word()?;
        laplacian_schemes().lookup(&name)?(tokens)
    }

    pub fn name(&self) -> &'static str {
        "Gauss"
    }

    /// `gamma_f * |Sf|` on every face.
    fn gamma_mag_sf(&self, ctx: &FvContext, mesh: &Arc<FvMesh>, gamma: &Gamma) -> Result<SurfaceField<f64>> {
        let dims = gamma.dimensions() * DIM_AREA;
        let name = format!("{}*magSf", gamma.name());
        let mag_sf = SurfaceField::new(
            "magSf",
            mesh,
            DIM_AREA,
            mesh.mag_sf().to_vec(),
            mesh.patches().iter().map(|p| p.mag_sf().to_vec()).collect(),
        )?;
        match gamma {
            Gamma::Uniform(g) => Ok(mag_sf.map(&name, dims, |a| a * g.value)),
            Gamma::Cell(field) => {
                let face = self.gamma_interpolation.interpolate(ctx, *field, None)?;
                Ok(face.zip_map(&mag_sf, &name, dims, |g, a| g * a))
            }
            Gamma::Face(face) => Ok(face.zip_map(&mag_sf, &name, dims, |g, a| g * a)),
        }
    }

    pub fn fvm_laplacian<T: FieldValue>(
        &self,
        ctx: &FvContext,
        gamma: &Gamma,
        vf: &VolField<T>,
    ) -> Result<FvMatrix<T>> {
        let mesh = vf.mesh();
        let gamma_mag_sf = self.gamma_mag_sf(ctx, mesh, gamma)?;
        let dims = gamma_mag_sf.dimensions() * vf.dimensions() / DIM_LENGTH;
        let mut m = FvMatrix::new(vf, dims);

        *m.upper_mut() = self
            .sn_grad
            .delta_coeffs(mesh)
            .iter()
            .zip(gamma_mag_sf.internal())
            .map(|(d, g)| d * g)
            .collect();
        m.ldu_mut().neg_sum_diag();

        for (p, patch) in mesh.patches().iter().enumerate() {
            let delta = self.sn_grad.patch_delta_coeffs(patch);
            let pgamma = gamma_mag_sf.boundary(p);
            let gic = vf.gradient_internal_coeffs(p, delta)?;
            let gbc = vf.gradient_boundary_coeffs(p, delta)?;
            m.internal_coeffs_mut()[p] = gic.iter().zip(pgamma).map(|(c, g)| *c * *g).collect();
            m.boundary_coeffs_mut()[p] = gbc.iter().zip(pgamma).map(|(c, g)| *c * -*g).collect();
        }

        if let Some(correction) = self.sn_grad.correction(ctx, vf)? {
            let face_flux = gamma_mag_sf.zip_map(
                &correction,
                &format!("faceFluxCorr({})", vf.name()),
                dims,
                |g, c| *c * *g,
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

    /// Explicit Laplacian per unit volume.
    pub fn fvc_laplacian<T: FieldValue>(
        &self,
        ctx: &FvContext,
        gamma: &Gamma,
        vf: &VolField<T>,
    ) -> Result<VolField<T>> {
        let mesh = vf.mesh();
        let gamma_mag_sf = self.gamma_mag_sf(ctx, mesh, gamma)?;
        let sn = self.sn_grad.sn_grad(ctx, vf)?;
        let dims = gamma_mag_sf.dimensions() * sn.dimensions();
        let face_flux = gamma_mag_sf.zip_map(&sn, "gammaSnGrad", dims, |g, s| *s * *g);
        let mut values = surface_sum_values(&face_flux);
        for (v, vol) in values.iter_mut().zip(mesh.v()) {
            *v = *v * (1.0 / vol);
        }
        VolField::extrapolated(
            &term_key("laplacian", &[gamma.name(), vf.name()]),
            mesh,
            dims / DIM_VOL,
            values,
        )
    }
}

fn gauss(tokens: &mut TokenStream) -> Result<LaplacianScheme> {
    let gamma_interpolation = InterpolationScheme::from_tokens(tokens)?;
    if gamma_interpolation.needs_flux() {
        return Err(FvError::BadSchemeSpec(format!(
            "diffusivity interpolation '{}' needs a flux",
            gamma_interpolation.name()
        )));
    }
    let sn_grad = SnGradScheme::from_tokens(tokens)?;
    Ok(LaplacianScheme {
        gamma_interpolation,
        sn_grad,
    })
}

pub fn laplacian_schemes() -> &'static RuntimeSelectionTable<LaplacianConstructor> {
    static TABLE: OnceLock<RuntimeSelectionTable<LaplacianConstructor>> = OnceLock::new();
    TABLE.get_or_init(|| {
        RuntimeSelectionTable::<LaplacianConstructor>::new("laplacian scheme").register("Gauss", gauss)
    })
}
