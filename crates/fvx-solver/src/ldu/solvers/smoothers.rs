//! Smoothers used by `smoothSolver`.

use std::fmt;
use std::sync::OnceLock;

use fvx_io::SolverControls;

use crate::error::Result;
use crate::ldu::LduMatrix;
use crate::ldu::solvers::preconditioners::{
    dic_reciprocal_d, dic_substitute, dilu_reciprocal_d, dilu_substitute,
};
use crate::ldu::solvers::{LduSystem, missing_entry};
use crate::selection::RuntimeSelectionTable;

pub trait Smoother: fmt::Debug {
    fn name(&self) -> &'static str;

    fn smooth(&self, system: &LduSystem<'_>, psi: &mut [f64], source: &[f64], n_sweeps: usize) -> Result<()>;
}

pub type SmootherConstructor = fn(&LduMatrix) -> Box<dyn Smoother>;

/// Source with the coupled interfaces treated explicitly, the way a
/// Jacobi sweep would see them.
fn interface_source(system: &LduSystem<'_>, psi: &[f64], source: &[f64]) -> Result<Vec<f64>> {
    let mut b_prime = source.to_vec();
    let negated: Vec<Vec<f64>> = system
        .interface_bou_coeffs
        .iter()
        .map(|c| c.iter().map(|x| -x).collect())
        .collect();
    system
        .interfaces
        .exchange(&negated, psi, &mut b_prime)?;
    Ok(b_prime)
}

fn forward_sweep(matrix: &LduMatrix, psi: &mut [f64], b_prime: &mut [f64]) {
    let addr = matrix.ldu_addr();
    let u = addr.upper_addr();
    let owner_start = addr.owner_start();
    let diag = matrix.diag();
    let upper = matrix.upper();
    let lower = matrix.lower();
    for cell in 0..diag.len() {
        let faces = owner_start[cell]..owner_start[cell + 1];
        let mut cur = b_prime[cell];
        for f in faces.clone() {
            cur -= upper[f] * psi[u[f]];
        }
        cur /= diag[cell];
        for f in faces {
            b_prime[u[f]] -= lower[f] * cur;
        }
        psi[cell] = cur;
    }
}

fn backward_sweep(matrix: &LduMatrix, psi: &mut [f64], b_prime: &[f64]) {
    let addr = matrix.ldu_addr();
    let u = addr.upper_addr();
    let owner_start = addr.owner_start();
    let diag = matrix.diag();
    let upper = matrix.upper();
    for cell in (0..diag.len()).rev() {
        let mut cur = b_prime[cell];
        for f in owner_start[cell]..owner_start[cell + 1] {
            cur -= upper[f] * psi[u[f]];
        }
        psi[cell] = cur / diag[cell];
    }
}

#[derive(Debug)]
pub struct GaussSeidelSmoother;

impl Smoother for GaussSeidelSmoother {
    fn name(&self) -> &'static str {
        "GaussSeidel"
    }

    fn smooth(&self, system: &LduSystem<'_>, psi: &mut [f64], source: &[f64], n_sweeps: usize) -> Result<()> {
        for _ in 0..n_sweeps {
            let mut b_prime = interface_source(system, psi, source)?;
            forward_sweep(system.matrix, psi, &mut b_prime);
        }
        Ok(())
    }
}

/// Forward then backward Gauss-Seidel sweep.
#[derive(Debug)]
pub struct SymGaussSeidelSmoother;

impl Smoother for SymGaussSeidelSmoother {
    fn name(&self) -> &'static str {
        "symGaussSeidel"
    }

    fn smooth(&self, system: &LduSystem<'_>, psi: &mut [f64], source: &[f64], n_sweeps: usize) -> Result<()> {
        for _ in 0..n_sweeps {
            let mut b_prime = interface_source(system, psi, source)?;
            forward_sweep(system.matrix, psi, &mut b_prime);
            backward_sweep(system.matrix, psi, &b_prime);
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct DicSmoother {
    r_d: Vec<f64>,
}

impl Smoother for DicSmoother {
    fn name(&self) -> &'static str {
        "DIC"
    }

    fn smooth(&self, system: &LduSystem<'_>, psi: &mut [f64], source: &[f64], n_sweeps: usize) -> Result<()> {
        for _ in 0..n_sweeps {
            let mut r_a = system.residual(psi, source)?;
            for (r, d) in r_a.iter_mut().zip(&self.r_d) {
                *r *= d;
            }
            dic_substitute(system.matrix, &self.r_d, &mut r_a);
            for (p, r) in psi.iter_mut().zip(&r_a) {
                *p += r;
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct DiluSmoother {
    r_d: Vec<f64>,
}

impl Smoother for DiluSmoother {
    fn name(&self) -> &'static str {
        "DILU"
    }

    fn smooth(&self, system: &LduSystem<'_>, psi: &mut [f64], source: &[f64], n_sweeps: usize) -> Result<()> {
        for _ in 0..n_sweeps {
            let mut r_a = system.residual(psi, source)?;
            for (r, d) in r_a.iter_mut().zip(&self.r_d) {
                *r *= d;
            }
            dilu_substitute(system.matrix, &self.r_d, &mut r_a);
            for (p, r) in psi.iter_mut().zip(&r_a) {
                *p += r;
            }
        }
        Ok(())
    }
}

pub fn symmetric_smoothers() -> &'static RuntimeSelectionTable<SmootherConstructor> {
    static TABLE: OnceLock<RuntimeSelectionTable<SmootherConstructor>> = OnceLock::new();
    TABLE.get_or_init(|| {
        RuntimeSelectionTable::<SmootherConstructor>::new("symmetric matrix smoother")
            .register("GaussSeidel", |_| Box::new(GaussSeidelSmoother))
            .register("symGaussSeidel", |_| Box::new(SymGaussSeidelSmoother))
            .register("DIC", |m| {
                Box::new(DicSmoother {
                    r_d: dic_reciprocal_d(m),
                })
            })
    })
}

pub fn asymmetric_smoothers() -> &'static RuntimeSelectionTable<SmootherConstructor> {
    static TABLE: OnceLock<RuntimeSelectionTable<SmootherConstructor>> = OnceLock::new();
    TABLE.get_or_init(|| {
        RuntimeSelectionTable::<SmootherConstructor>::new("asymmetric matrix smoother")
            .register("GaussSeidel", |_| Box::new(GaussSeidelSmoother))
            .register("symGaussSeidel", |_| Box::new(SymGaussSeidelSmoother))
            .register("DILU", |m| {
                Box::new(DiluSmoother {
                    r_d: dilu_reciprocal_d(m),
                })
            })
    })
}

pub fn new_smoother(system: &LduSystem<'_>, controls: &SolverControls) -> Result<Box<dyn Smoother>> {
    let name = controls
        .smoother
        .as_deref()
        .ok_or_else(|| missing_entry(system, "smoother"))?;
    let table = if system.matrix.symmetric() {
        symmetric_smoothers()
    } else {
        asymmetric_smoothers()
    };
    Ok(table.lookup(name)?(system.matrix))
}
