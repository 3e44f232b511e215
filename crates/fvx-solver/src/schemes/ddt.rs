//! First time derivative.
//!
//! `rho` is an optional coefficient; without one a dimensionless unit
//! coefficient is used and the result keeps the field's own name.

use std::sync::OnceLock;

use fvx_dict::{TokenStream, term_key};

use crate::context::FvContext;
use crate::dimensions::{DIM_TIME, DIM_VOL};
use crate::error::{FvError, Result};
use crate::fields::{Coefficient, VolField};
use crate::fv_matrix::FvMatrix;
use crate::primitives::{FieldValue, pack, unpack};
use crate::schemes::parse_spec;
use crate::selection::RuntimeSelectionTable;

pub type DdtConstructor = fn(&mut TokenStream) -> Result<DdtScheme>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DdtScheme {
    SteadyState,
    Euler,
    /// Second-order backward differencing over the two old levels; first
    /// order while fewer than two are stored.
    Backward,
    /// Crank-Nicolson blended with Euler by the off-centring coefficient,
    /// one for pure Crank-Nicolson and zero for Euler.
    CrankNicolson { off_centre: f64 },
}

/// Time derivative carried between steps by Crank-Nicolson, packed by
/// component.
#[derive(Debug, Clone, PartialEq)]
pub struct Ddt0State {
    pub start_time_index: usize,
    pub time_index: usize,
    pub values: Vec<f64>,
}

fn term_name(rho: Option<&Coefficient>, name: &str) -> String {
    match rho {
        Some(rho) => term_key("ddt", &[rho.name(), name]),
        None => term_key("ddt", &[name]),
    }
}

impl DdtScheme {
    pub fn new(spec: &str) -> Result<Self> {
        parse_spec(spec, Self::from_tokens)
    }

    pub fn from_tokens(tokens: &mut TokenStream) -> Result<Self> {
        let name = tokens.next_word()?;
        ddt_schemes().lookup(&name)?(tokens)
    }

    pub fn name(&self) -> &'static str {
        match self {
            DdtScheme::SteadyState => "steadyState",
            DdtScheme::Euler => "Euler",
            DdtScheme::Backward => "backward",
            DdtScheme::CrankNicolson { .. } => "CrankNicolson",
        }
    }

    /// Implicit `ddt(rho, vf)`.
    pub fn fvm_ddt<T: FieldValue>(
        &self,
        ctx: &FvContext,
        rho: Option<&Coefficient>,
        vf: &VolField<T>,
    ) -> Result<FvMatrix<T>> {
        let unit = Coefficient::unit();
        let r = rho.unwrap_or(&unit);
        let mut m = FvMatrix::new(vf, r.dimensions() * vf.dimensions() * DIM_VOL / DIM_TIME);
        let mesh = vf.mesh();
        let v = mesh.v();
        let time = ctx.time();
        let r_dt = time.r_delta_t();
        let psi0 = vf.old_time(1);

        match *self {
            DdtScheme::SteadyState => {}
            DdtScheme::Euler => {
                for c in 0..mesh.n_cells() {
                    m.diag_mut()[c] = r_dt * v[c] * r.value(c);
                    m.source_mut()[c] = psi0[c] * (r_dt * v[c] * r.old_value(1, c));
                }
            }
            DdtScheme::Backward => {
                let (coefft, coefft0, coefft00) = backward_coeffs(time.delta_t, time.delta_t0, vf.n_old_times());
                let psi00 = vf.old_time(2);
                for c in 0..mesh.n_cells() {
                    m.diag_mut()[c] = coefft * r_dt * r.value(c) * v[c];
                    m.source_mut()[c] = (psi0[c] * (coefft0 * r.old_value(1, c))
                        - psi00[c] * (coefft00 * r.old_value(2, c)))
                        * (r_dt * v[c]);
                }
            }
            DdtScheme::CrankNicolson { off_centre } => {
                let ddt0 = self.crank_nicolson_ddt0(ctx, rho, vf, off_centre)?;
                let r_dt_coef = cn_coef(off_centre, time.time_index, ddt0.start_time_index, 0) * r_dt;
                let old_rate: Vec<T> = unpack(&ddt0.values);
                for c in 0..mesh.n_cells() {
                    m.diag_mut()[c] = r_dt_coef * r.value(c) * v[c];
                    m.source_mut()[c] = (psi0[c] * (r_dt_coef * r.old_value(1, c))
                        + off_centred(off_centre, old_rate[c]))
                        * v[c];
                }
            }
        }
        Ok(m)
    }

    /// Explicit `ddt(rho, vf)` per unit volume.
    pub fn fvc_ddt<T: FieldValue>(
        &self,
        ctx: &FvContext,
        rho: Option<&Coefficient>,
        vf: &VolField<T>,
    ) -> Result<VolField<T>> {
        let unit = Coefficient::unit();
        let r = rho.unwrap_or(&unit);
        let mesh = vf.mesh();
        let time = ctx.time();
        let r_dt = time.r_delta_t();
        let (psi, psi0) = (vf.internal(), vf.old_time(1));

        let values: Vec<T> = match *self {
            DdtScheme::SteadyState => vec![T::zero(); mesh.n_cells()],
            DdtScheme::Euler => (0..mesh.n_cells())
                .map(|c| (psi[c] * r.value(c) - psi0[c] * r.old_value(1, c)) * r_dt)
                .collect(),
            DdtScheme::Backward => {
                let (coefft, coefft0, coefft00) = backward_coeffs(time.delta_t, time.delta_t0, vf.n_old_times());
                let psi00 = vf.old_time(2);
                (0..mesh.n_cells())
                    .map(|c| {
                        (psi[c] * (coefft * r.value(c)) - psi0[c] * (coefft0 * r.old_value(1, c))
                            + psi00[c] * (coefft00 * r.old_value(2, c)))
                            * r_dt
                    })
                    .collect()
            }
            DdtScheme::CrankNicolson { off_centre } => {
                let ddt0 = self.crank_nicolson_ddt0(ctx, rho, vf, off_centre)?;
                let r_dt_coef = cn_coef(off_centre, time.time_index, ddt0.start_time_index, 0) * r_dt;
                let old_rate: Vec<T> = unpack(&ddt0.values);
                (0..mesh.n_cells())
                    .map(|c| {
                        (psi[c] * r.value(c) - psi0[c] * r.old_value(1, c)) * r_dt_coef
                            - off_centred(off_centre, old_rate[c])
                    })
                    .collect()
            }
        };
        VolField::extrapolated(
            &term_name(rho, vf.name()),
            mesh,
            r.dimensions() * vf.dimensions() / DIM_TIME,
            values,
        )
    }

    /// Brings the stored old-time derivative up to the current time step
    /// and returns it. The state is created on first use, starting from
    /// Euler.
    fn crank_nicolson_ddt0<T: FieldValue>(
        &self,
        ctx: &FvContext,
        rho: Option<&Coefficient>,
        vf: &VolField<T>,
        off_centre: f64,
    ) -> Result<Ddt0State> {
        let time = ctx.time();
        let key = match rho {
            Some(rho) => term_key("ddt0", &[rho.name(), vf.name()]),
            None => term_key("ddt0", &[vf.name()]),
        };
        let n = vf.mesh().n_cells();
        let mut state = ctx.take_ddt0(&key).unwrap_or_else(|| Ddt0State {
            start_time_index: time.time_index,
            time_index: time.time_index,
            values: vec![0.0; n * T::N_COMPONENTS],
        });
        if state.values.len() != n * T::N_COMPONENTS {
            return Err(FvError::size(key, n * T::N_COMPONENTS, state.values.len()));
        }

        if state.time_index != time.time_index {
            let unit = Coefficient::unit();
            let r = rho.unwrap_or(&unit);
            let r_dt_coef0 = cn_coef(off_centre, time.time_index, state.start_time_index, 1) / time.delta_t0;
            let (psi0, psi00) = (vf.old_time(1), vf.old_time(2));
            let previous: Vec<T> = unpack(&state.values);
            let rate: Vec<T> = (0..n)
                .map(|c| {
                    (psi0[c] * r.old_value(1, c) - psi00[c] * r.old_value(2, c)) * r_dt_coef0
                        - off_centred(off_centre, previous[c])
                })
                .collect();
            state.values = pack(&rate);
            state.time_index = time.time_index;
        }
        ctx.store_ddt0(&key, state.clone());
        Ok(state)
    }
}

/// Backward coefficients for the current, old and old-old levels. With
/// fewer than two old levels the old-old step is taken as infinite, which
/// reduces to Euler.
fn backward_coeffs(delta_t: f64, delta_t0: f64, n_old_times: usize) -> (f64, f64, f64) {
    if n_old_times < 2 {
        return (1.0, 1.0, 0.0);
    }
    let coefft = 1.0 + delta_t / (delta_t + delta_t0);
    let coefft00 = delta_t * delta_t / (delta_t0 * (delta_t + delta_t0));
    (coefft, coefft + coefft00, coefft00)
}

/// `1 + psi` once the derivative `lag` steps back is itself
/// Crank-Nicolson, one before that.
fn cn_coef(off_centre: f64, time_index: usize, start_time_index: usize, lag: usize) -> f64 {
    if time_index > start_time_index + lag {
        1.0 + off_centre
    } else {
        1.0
    }
}

fn off_centred<T: FieldValue>(off_centre: f64, ddt0: T) -> T {
    if off_centre < 1.0 { ddt0 * off_centre } else { ddt0 }
}

fn crank_nicolson(tokens: &mut TokenStream) -> Result<DdtScheme> {
    let off_centre = tokens.next_scalar()?;
    if !(0.0..=1.0).contains(&off_centre) {
        return Err(FvError::BadSchemeSpec(format!(
            "CrankNicolson off-centre coefficient {off_centre} is outside [0, 1]"
        )));
    }
    Ok(DdtScheme::CrankNicolson { off_centre })
}

pub fn ddt_schemes() -> &'static RuntimeSelectionTable<DdtConstructor> {
    static TABLE: OnceLock<RuntimeSelectionTable<DdtConstructor>> = OnceLock::new();
    TABLE.get_or_init(|| {
        RuntimeSelectionTable::<DdtConstructor>::new("ddt scheme")
            .register("steadyState", |_| Ok(DdtScheme::SteadyState))
            .register("Euler", |_| Ok(DdtScheme::Euler))
            .register("backward", |_| Ok(DdtScheme::Backward))
            .register("CrankNicolson", crank_nicolson)
    })
}
