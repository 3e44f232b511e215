//! Second time derivative.

use std::sync::OnceLock;

use fvx_dict::{TokenStream, term_key};

use crate::context::FvContext;
use crate::dimensions::{DIM_TIME, DIM_VOL};
use crate::error::Result;
use crate::fields::{Coefficient, VolField};
use crate::fv_matrix::FvMatrix;
use crate::primitives::FieldValue;
use crate::schemes::parse_spec;
use crate::selection::RuntimeSelectionTable;

pub type D2dt2Constructor = fn(&mut TokenStream) -> Result<D2dt2Scheme>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum D2dt2Scheme {
    SteadyState,
    /// Three-level central difference over possibly unequal steps.
    Euler,
}

/// `(coefft, coefft0, coefft00, 1 / dt^2)` of the three-level stencil.
fn euler_coeffs(delta_t: f64, delta_t0: f64) -> (f64, f64, f64, f64) {
    let coefft = (delta_t + delta_t0) / (2.0 * delta_t);
    let coefft00 = (delta_t + delta_t0) / (2.0 * delta_t0);
    let r_delta_t2 = 4.0 / (delta_t + delta_t0).powi(2);
    (coefft, coefft + coefft00, coefft00, r_delta_t2)
}

impl D2dt2Scheme {
    pub fn new(spec: &str) -> Result<Self> {
        parse_spec(spec, Self::from_tokens)
    }

    pub fn from_tokens(tokens: &mut TokenStream) -> Result<Self> {
        let name = tokens.next_word()?;
        d2dt2_schemes().lookup(&name)?(tokens)
    }

    pub fn name(&self) -> &'static str {
        match self {
            D2dt2Scheme::SteadyState => "steadyState",
            D2dt2Scheme::Euler => "Euler",
        }
    }

    /// Implicit `d2dt2(rho, vf)`. The coefficient is taken at the current
    /// level for all three time levels.
    pub fn fvm_d2dt2<T: FieldValue>(
        &self,
        ctx: &FvContext,
        rho: Option<&Coefficient>,
        vf: &VolField<T>,
    ) -> Result<FvMatrix<T>> {
        let unit = Coefficient::unit();
        let r = rho.unwrap_or(&unit);
        let dims = r.dimensions() * vf.dimensions() * DIM_VOL / (DIM_TIME * DIM_TIME);
        let mut m = FvMatrix::new(vf, dims);
        if *self == D2dt2Scheme::SteadyState {
            return Ok(m);
        }

        let time = ctx.time();
        let (coefft, coefft0, coefft00, r_dt2) = euler_coeffs(time.delta_t, time.delta_t0);
        let v = vf.mesh().v();
        let (psi0, psi00) = (vf.old_time(1), vf.old_time(2));
        for c in 0..vf.mesh().n_cells() {
            let scale = r_dt2 * v[c] * r.value(c);
            m.diag_mut()[c] = coefft * scale;
            m.source_mut()[c] = (psi0[c] * coefft0 - psi00[c] * coefft00) * scale;
        }
        Ok(m)
    }

    /// Explicit `d2dt2(rho, vf)` per unit volume.
    pub fn fvc_d2dt2<T: FieldValue>(
        &self,
        ctx: &FvContext,
        rho: Option<&Coefficient>,
        vf: &VolField<T>,
    ) -> Result<VolField<T>> {
        let unit = Coefficient::unit();
        let r = rho.unwrap_or(&unit);
        let n = vf.mesh().n_cells();
        let values = match self {
            D2dt2Scheme::SteadyState => vec![T::zero(); n],
            D2dt2Scheme::Euler => {
                let time = ctx.time();
                let (coefft, coefft0, coefft00, r_dt2) = euler_coeffs(time.delta_t, time.delta_t0);
                let (psi, psi0, psi00) = (vf.internal(), vf.old_time(1), vf.old_time(2));
                (0..n)
                    .map(|c| {
                        (psi[c] * coefft - psi0[c] * coefft0 + psi00[c] * coefft00)
                            * (r_dt2 * r.value(c))
                    })
                    .collect()
            }
        };
        let name = match rho {
            Some(rho) => term_key("d2dt2", &[rho.name(), vf.name()]),
            None => term_key("d2dt2", &[vf.name()]),
        };
        VolField::extrapolated(
            &name,
            vf.mesh(),
            r.dimensions() * vf.dimensions() / (DIM_TIME * DIM_TIME),
            values,
        )
    }
}

pub fn d2dt2_schemes() -> &'static RuntimeSelectionTable<D2dt2Constructor> {
    static TABLE: OnceLock<RuntimeSelectionTable<D2dt2Constructor>> = OnceLock::new();
    TABLE.get_or_init(|| {
        RuntimeSelectionTable::<D2dt2Constructor>::new("d2dt2 scheme")
            .register("steadyState", |_| Ok(D2dt2Scheme::SteadyState))
            .register("Euler", |_| Ok(D2dt2Scheme::Euler))
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use fvx_io::{FvSchemes, FvSolution};

    use super::*;
    use crate::dimensions::DIM_LENGTH;
    use crate::mesh::MeshBuilder;
    use crate::parallel::serial;
    use crate::time::TimeState;

    #[test]
    fn quadratic_history_gives_constant_acceleration() {
        let mesh = Arc::new(MeshBuilder::line(2, 2.0, serial()).unwrap());
        let f = |t: f64| 1.5 * t * t;
        let mut x = VolField::new("x", &mesh, DIM_LENGTH, f(0.0));
        let mut time = TimeState::new(0.0, 0.1);
        for dt in [0.1, 0.3] {
            x.store_old_time();
            time.advance(dt);
            x.internal_mut().iter_mut().for_each(|v| *v = f(time.value));
        }
        let ctx = FvContext::new(Arc::clone(&mesh), FvSchemes::default(), FvSolution::default())
            .with_time(time);

        let acc = D2dt2Scheme::Euler.fvc_d2dt2(&ctx, None, &x).unwrap();
        assert_eq!(acc.name(), "d2dt2(x)");
        assert!((acc.internal()[0] - 3.0).abs() < 1e-10);

        // The implicit form is satisfied by the same history.
        let m = D2dt2Scheme::Euler.fvm_d2dt2(&ctx, None, &x).unwrap();
        let residual = m.diag()[0] * x.internal()[0] - m.source()[0];
        assert!((residual - 3.0).abs() < 1e-10);
    }

    #[test]
    fn parses_registered_names() {
        assert_eq!(D2dt2Scheme::new("Euler").unwrap(), D2dt2Scheme::Euler);
        assert!(D2dt2Scheme::new("backward").is_err());
    }
}
