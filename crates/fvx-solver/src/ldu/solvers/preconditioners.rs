//! Preconditioners for the Krylov solvers.

use std::fmt;
use std::sync::OnceLock;

use fvx_io::SolverControls;

use crate::error::Result;
use crate::ldu::LduMatrix;
use crate::ldu::solvers::{LduSystem, missing_entry};
use crate::selection::RuntimeSelectionTable;

pub trait Preconditioner: fmt::Debug {
    fn name(&self) -> &'static str;

    /// `w_a = M^-1 r_a`.
    fn precondition(&self, system: &LduSystem<'_>, w_a: &mut [f64], r_a: &[f64]);
}

pub type PreconditionerConstructor = fn(&LduMatrix) -> Box<dyn Preconditioner>;

/// Reciprocal of the incomplete-Cholesky diagonal.
pub(crate) fn dic_reciprocal_d(matrix: &LduMatrix) -> Vec<f64> {
    let addr = matrix.ldu_addr();
    let (l, u) = (addr.lower_addr(), addr.upper_addr());
    let mut r_d = matrix.diag().to_vec();
    for (f, up) in matrix.upper().iter().enumerate() {
        r_d[u[f]] -= up * up / r_d[l[f]];
    }
    r_d.iter_mut().for_each(|d| *d = 1.0 / *d);
    r_d
}

/// Forward and backward substitution with the DIC factors, in place.
pub(crate) fn dic_substitute(matrix: &LduMatrix, r_d: &[f64], w: &mut [f64]) {
    let addr = matrix.ldu_addr();
    let (l, u) = (addr.lower_addr(), addr.upper_addr());
    let upper = matrix.upper();
    for f in 0..upper.len() {
        w[u[f]] -= r_d[u[f]] * upper[f] * w[l[f]];
    }
    for f in (0..upper.len()).rev() {
        w[l[f]] -= r_d[l[f]] * upper[f] * w[u[f]];
    }
}

/// Reciprocal of the incomplete-LU diagonal.
pub(crate) fn dilu_reciprocal_d(matrix: &LduMatrix) -> Vec<f64> {
    let addr = matrix.ldu_addr();
    let (l, u) = (addr.lower_addr(), addr.upper_addr());
    let mut r_d = matrix.diag().to_vec();
    let lower = matrix.lower();
    for (f, up) in matrix.upper().iter().enumerate() {
        r_d[u[f]] -= up * lower[f] / r_d[l[f]];
    }
    r_d.iter_mut().for_each(|d| *d = 1.0 / *d);
    r_d
}

/// DILU substitution; the forward pass runs in `losort` order so every
/// row sees the already updated lower neighbours.
pub(crate) fn dilu_substitute(matrix: &LduMatrix, r_d: &[f64], w: &mut [f64]) {
    let addr = matrix.ldu_addr();
    let (l, u) = (addr.lower_addr(), addr.upper_addr());
    let upper = matrix.upper();
    let lower = matrix.lower();
    for &f in addr.losort() {
        w[u[f]] -= r_d[u[f]] * lower[f] * w[l[f]];
    }
    for f in (0..upper.len()).rev() {
        w[l[f]] -= r_d[l[f]] * upper[f] * w[u[f]];
    }
}

#[derive(Debug)]
pub struct DicPreconditioner {
    r_d: Vec<f64>,
}

impl DicPreconditioner {
    pub fn new(matrix: &LduMatrix) -> Self {
        Self {
            r_d: dic_reciprocal_d(matrix),
        }
    }
}

impl Preconditioner for DicPreconditioner {
    fn name(&self) -> &'static str {
        "DIC"
    }

    fn precondition(&self, system: &LduSystem<'_>, w_a: &mut [f64], r_a: &[f64]) {
        for ((w, r), d) in w_a.iter_mut().zip(r_a).zip(&self.r_d) {
            *w = d * r;
        }
        dic_substitute(system.matrix, &self.r_d, w_a);
    }
}

#[derive(Debug)]
pub struct DiluPreconditioner {
    r_d: Vec<f64>,
}

impl DiluPreconditioner {
    pub fn new(matrix: &LduMatrix) -> Self {
        Self {
            r_d: dilu_reciprocal_d(matrix),
        }
    }
}

impl Preconditioner for DiluPreconditioner {
    fn name(&self) -> &'static str {
        "DILU"
    }

    fn precondition(&self, system: &LduSystem<'_>, w_a: &mut [f64], r_a: &[f64]) {
        for ((w, r), d) in w_a.iter_mut().zip(r_a).zip(&self.r_d) {
            *w = d * r;
        }
        dilu_substitute(system.matrix, &self.r_d, w_a);
    }
}

/// Jacobi preconditioning.
#[derive(Debug)]
pub struct DiagonalPreconditioner {
    r_d: Vec<f64>,
}

impl DiagonalPreconditioner {
    pub fn new(matrix: &LduMatrix) -> Self {
        Self {
            r_d: matrix.diag().iter().map(|d| 1.0 / d).collect(),
        }
    }
}

impl Preconditioner for DiagonalPreconditioner {
    fn name(&self) -> &'static str {
        "diagonal"
    }

    fn precondition(&self, _system: &LduSystem<'_>, w_a: &mut [f64], r_a: &[f64]) {
        for ((w, r), d) in w_a.iter_mut().zip(r_a).zip(&self.r_d) {
            *w = d * r;
        }
    }
}

#[derive(Debug)]
pub struct NoPreconditioner;

impl Preconditioner for NoPreconditioner {
    fn name(&self) -> &'static str {
        "none"
    }

    fn precondition(&self, _system: &LduSystem<'_>, w_a: &mut [f64], r_a: &[f64]) {
        w_a.copy_from_slice(r_a);
    }
}

pub fn symmetric_preconditioners() -> &'static RuntimeSelectionTable<PreconditionerConstructor> {
    static TABLE: OnceLock<RuntimeSelectionTable<PreconditionerConstructor>> = OnceLock::new();
    TABLE.get_or_init(|| {
        RuntimeSelectionTable::<PreconditionerConstructor>::new("symmetric matrix preconditioner")
            .register("DIC", |m| Box::new(DicPreconditioner::new(m)))
            .register("diagonal", |m| Box::new(DiagonalPreconditioner::new(m)))
            .register("none", |_| Box::new(NoPreconditioner))
    })
}

pub fn asymmetric_preconditioners() -> &'static RuntimeSelectionTable<PreconditionerConstructor> {
    static TABLE: OnceLock<RuntimeSelectionTable<PreconditionerConstructor>> = OnceLock::new();
    TABLE.get_or_init(|| {
        RuntimeSelectionTable::<PreconditionerConstructor>::new("asymmetric matrix preconditioner")
            .register("DILU", |m| Box::new(DiluPreconditioner::new(m)))
            .register("diagonal", |m| Box::new(DiagonalPreconditioner::new(m)))
            .register("none", |_| Box::new(NoPreconditioner))
    })
}

/// The preconditioner named in `controls` for the system's matrix.
pub fn new_preconditioner(
    system: &LduSystem<'_>,
    controls: &SolverControls,
) -> Result<Box<dyn Preconditioner>> {
    let name = controls
        .preconditioner
        .as_deref()
        .ok_or_else(|| missing_entry(system, "preconditioner"))?;
    let table = if system.matrix.symmetric() {
        symmetric_preconditioners()
    } else {
        asymmetric_preconditioners()
    };
    Ok(table.lookup(name)?(system.matrix))
}
