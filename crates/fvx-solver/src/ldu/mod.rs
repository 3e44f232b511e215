//! Face-addressed sparse matrix.
//!
//! The non-zero pattern is the cell itself plus its face neighbours. Face
//! `f` with lower (owner) cell `l` and upper (neighbour) cell `u` stores
//! `upper[f] = A[l][u]` and `lower[f] = A[u][l]`. A matrix without `lower`
//! is symmetric; a matrix without off-diagonals is diagonal. Coefficient
//! arrays are allocated on first mutable access.

mod interfaces;
pub mod solvers;

use std::sync::Arc;

use nalgebra_sparse::{CooMatrix, CsrMatrix};

use crate::error::{FvError, Result};
use crate::mesh::LduAddressing;
use crate::primitives::FieldValue;

pub use interfaces::LduInterfaces;

#[derive(Debug, Clone)]
pub struct LduMatrix {
    addr: Arc<LduAddressing>,
    diag: Option<Vec<f64>>,
    upper: Option<Vec<f64>>,
    lower: Option<Vec<f64>>,
}

fn axpy(y: &mut [f64], x: &[f64], a: f64) {
    for (yi, xi) in y.iter_mut().zip(x) {
        *yi += a * xi;
    }
}

impl LduMatrix {
    pub fn new(addr: Arc<LduAddressing>) -> Self {
        Self {
            addr,
            diag: None,
            upper: None,
            lower: None,
        }
    }

    pub fn ldu_addr(&self) -> &Arc<LduAddressing> {
        &self.addr
    }

    pub fn n_cells(&self) -> usize {
        self.addr.size()
    }

    pub fn has_diag(&self) -> bool {
        self.diag.is_some()
    }

    pub fn has_upper(&self) -> bool {
        self.upper.is_some()
    }

    pub fn has_lower(&self) -> bool {
        self.lower.is_some()
    }

    pub fn diagonal(&self) -> bool {
        self.diag.is_some() && self.upper.is_none()
    }

    pub fn symmetric(&self) -> bool {
        self.upper.is_some() && self.lower.is_none()
    }

    pub fn asymmetric(&self) -> bool {
        self.lower.is_some()
    }

    /// Diagonal coefficients; empty until allocated.
    pub fn diag(&self) -> &[f64] {
        self.diag.as_deref().unwrap_or(&[])
    }

    pub fn upper(&self) -> &[f64] {
        self.upper.as_deref().unwrap_or(&[])
    }

    /// Lower coefficients, which are the upper ones for a symmetric matrix.
    pub fn lower(&self) -> &[f64] {
        self.lower.as_deref().unwrap_or_else(|| self.upper())
    }

    pub fn diag_mut(&mut self) -> &mut Vec<f64> {
        let n = self.addr.size();
        self.diag.get_or_insert_with(|| vec![0.0; n])
    }

    pub fn upper_mut(&mut self) -> &mut Vec<f64> {
        let n = self.addr.n_faces();
        self.upper.get_or_insert_with(|| vec![0.0; n])
    }

    /// Allocating `lower` makes the matrix asymmetric, starting from the
    /// current upper coefficients.
    pub fn lower_mut(&mut self) -> &mut Vec<f64> {
        if self.lower.is_none() {
            let copy = self.upper_mut().clone();
            self.lower = Some(copy);
        }
        let n = self.addr.n_faces();
        self.lower.get_or_insert_with(|| vec![0.0; n])
    }

    fn combine(&mut self, other: &LduMatrix, sign: f64) {
        if let Some(d) = &other.diag {
            axpy(self.diag_mut(), d, sign);
        }
        if let Some(u) = &other.upper {
            if other.asymmetric() || self.asymmetric() {
                axpy(self.lower_mut(), other.lower(), sign);
            }
            axpy(self.upper_mut(), u, sign);
        }
    }

    pub fn add_assign(&mut self, other: &LduMatrix) {
        self.combine(other, 1.0);
    }

    pub fn sub_assign(&mut self, other: &LduMatrix) {
        self.combine(other, -1.0);
    }

    pub fn scale(&mut self, s: f64) {
        for coeffs in [&mut self.diag, &mut self.upper, &mut self.lower]
            .into_iter()
            .flatten()
        {
            coeffs.iter_mut().for_each(|c| *c *= s);
        }
    }

    /// Scales row `i` by `sf[i]`. Off-diagonal rows differ afterwards, so
    /// the matrix becomes asymmetric.
    pub fn scale_rows(&mut self, sf: &[f64]) {
        if let Some(d) = &mut self.diag {
            for (di, s) in d.iter_mut().zip(sf) {
                *di *= s;
            }
        }
        if self.upper.is_some() {
            self.lower_mut();
            let addr = Arc::clone(&self.addr);
            if let Some(upper) = &mut self.upper {
                for (f, c) in upper.iter_mut().enumerate() {
                    *c *= sf[addr.lower_addr()[f]];
                }
            }
            if let Some(lower) = &mut self.lower {
                for (f, c) in lower.iter_mut().enumerate() {
                    *c *= sf[addr.upper_addr()[f]];
                }
            }
        }
    }

    pub fn negate(&mut self) {
        self.scale(-1.0);
    }

    /// Adds the off-diagonal row sums to the diagonal.
    pub fn sum_diag(&mut self) {
        let addr = Arc::clone(&self.addr);
        let lower = self.lower().to_vec();
        let upper = self.upper().to_vec();
        let diag = self.diag_mut();
        for f in 0..upper.len() {
            diag[addr.lower_addr()[f]] += lower[f];
            diag[addr.upper_addr()[f]] += upper[f];
        }
    }

    /// Subtracts the off-diagonal row sums from the diagonal.
    pub fn neg_sum_diag(&mut self) {
        let addr = Arc::clone(&self.addr);
        let lower = self.lower().to_vec();
        let upper = self.upper().to_vec();
        let diag = self.diag_mut();
        for f in 0..upper.len() {
            diag[addr.lower_addr()[f]] -= lower[f];
            diag[addr.upper_addr()[f]] -= upper[f];
        }
    }

    /// Accumulates the magnitudes of the off-diagonal coefficients of each
    /// row into `sum_off`.
    pub fn sum_mag_off_diag(&self, sum_off: &mut [f64]) {
        let l = self.addr.lower_addr();
        let u = self.addr.upper_addr();
        let lower = self.lower();
        for (f, up) in self.upper().iter().enumerate() {
            sum_off[u[f]] += lower[f].abs();
            sum_off[l[f]] += up.abs();
        }
    }

    fn amul_internal(&self, psi: &[f64]) -> Vec<f64> {
        let l = self.addr.lower_addr();
        let u = self.addr.upper_addr();
        let diag = self.diag();
        let mut out: Vec<f64> = if diag.is_empty() {
            vec![0.0; psi.len()]
        } else {
            diag.iter().zip(psi).map(|(d, p)| d * p).collect()
        };
        let lower = self.lower();
        for (f, up) in self.upper().iter().enumerate() {
            out[u[f]] += lower[f] * psi[l[f]];
            out[l[f]] += up * psi[u[f]];
        }
        out
    }

    /// `A psi`, including the coupling through `interfaces`.
    pub fn amul(
        &self,
        psi: &[f64],
        interface_bou_coeffs: &[Vec<f64>],
        interfaces: &LduInterfaces,
    ) -> Result<Vec<f64>> {
        let mut out = self.amul_internal(psi);
        interfaces.exchange(interface_bou_coeffs, psi, &mut out)?;
        Ok(out)
    }

    /// `b - A psi`.
    pub fn residual(
        &self,
        psi: &[f64],
        source: &[f64],
        interface_bou_coeffs: &[Vec<f64>],
        interfaces: &LduInterfaces,
    ) -> Result<Vec<f64>> {
        let a_psi = self.amul_internal(psi);
        let mut r: Vec<f64> = source.iter().zip(&a_psi).map(|(b, a)| b - a).collect();
        let negated: Vec<Vec<f64>> = interface_bou_coeffs
            .iter()
            .map(|c| c.iter().map(|x| -x).collect())
            .collect();
        interfaces.exchange(&negated, psi, &mut r)?;
        Ok(r)
    }

    /// Row sums of the coupled matrix.
    pub fn sum_a(&self, interface_bou_coeffs: &[Vec<f64>], interfaces: &LduInterfaces) -> Vec<f64> {
        let l = self.addr.lower_addr();
        let u = self.addr.upper_addr();
        let mut out = if self.diag().is_empty() {
            vec![0.0; self.n_cells()]
        } else {
            self.diag().to_vec()
        };
        let lower = self.lower();
        for (f, up) in self.upper().iter().enumerate() {
            out[l[f]] += up;
            out[u[f]] += lower[f];
        }
        for &p in interfaces.patches() {
            let coeffs = &interface_bou_coeffs[p];
            for (i, &cell) in self.addr.patch_addr(p).iter().enumerate() {
                out[cell] -= coeffs[i];
            }
        }
        out
    }

    /// Off-diagonal part applied to `psi`, negated: `-(A - D) psi`.
    pub fn h<T: FieldValue>(&self, psi: &[T]) -> Vec<T> {
        let l = self.addr.lower_addr();
        let u = self.addr.upper_addr();
        let mut out = vec![T::zero(); self.n_cells()];
        let lower = self.lower();
        for (f, up) in self.upper().iter().enumerate() {
            out[u[f]] -= psi[l[f]] * lower[f];
            out[l[f]] -= psi[u[f]] * *up;
        }
        out
    }

    /// Negated off-diagonal row sums.
    pub fn h1(&self) -> Vec<f64> {
        let l = self.addr.lower_addr();
        let u = self.addr.upper_addr();
        let mut out = vec![0.0; self.n_cells()];
        let lower = self.lower();
        for (f, up) in self.upper().iter().enumerate() {
            out[u[f]] -= lower[f];
            out[l[f]] -= up;
        }
        out
    }

    /// Face contribution `upper * psi_u - lower * psi_l`.
    pub fn face_h<T: FieldValue>(&self, psi: &[T]) -> Vec<T> {
        let l = self.addr.lower_addr();
        let u = self.addr.upper_addr();
        let lower = self.lower();
        self.upper()
            .iter()
            .enumerate()
            .map(|(f, up)| psi[u[f]] * *up - psi[l[f]] * lower[f])
            .collect()
    }

    /// Rank-local coefficients as triplets. Interface couplings are not
    /// included.
    pub fn to_coo(&self) -> Result<CooMatrix<f64>> {
        let n = self.n_cells();
        let l = self.addr.lower_addr();
        let u = self.addr.upper_addr();
        let mut rows = Vec::with_capacity(n + 2 * l.len());
        let mut cols = Vec::with_capacity(rows.capacity());
        let mut vals = Vec::with_capacity(rows.capacity());
        for (i, d) in self.diag().iter().enumerate() {
            rows.push(i);
            cols.push(i);
            vals.push(*d);
        }
        let lower = self.lower();
        for (f, up) in self.upper().iter().enumerate() {
            rows.push(l[f]);
            cols.push(u[f]);
            vals.push(*up);
            rows.push(u[f]);
            cols.push(l[f]);
            vals.push(lower[f]);
        }
        CooMatrix::try_from_triplets(n, n, rows, cols, vals)
            .map_err(|e| FvError::Unsupported(format!("matrix export failed: {e}")))
    }

    pub fn to_csr(&self) -> Result<CsrMatrix<f64>> {
        Ok(CsrMatrix::from(&self.to_coo()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::MeshBuilder;
    use crate::parallel::serial;

    fn chain(n: usize) -> Arc<LduAddressing> {
        let lower = (0..n - 1).collect();
        let upper = (1..n).collect();
        Arc::new(LduAddressing::new(n, lower, upper, Vec::new()).unwrap())
    }

    #[test]
    fn classification_follows_allocation() {
        let mut m = LduMatrix::new(chain(3));
        m.diag_mut();
        assert!(m.diagonal());
        m.upper_mut()[0] = 1.0;
        assert!(m.symmetric());
        m.lower_mut()[1] = 2.0;
        assert!(m.asymmetric());
        assert_eq!(m.lower(), &[1.0, 2.0]);
    }

    #[test]
    fn adding_asymmetric_to_symmetric_keeps_both_triangles() {
        let mut a = LduMatrix::new(chain(3));
        a.upper_mut().copy_from_slice(&[1.0, 1.0]);
        let mut b = LduMatrix::new(chain(3));
        b.upper_mut().copy_from_slice(&[2.0, 3.0]);
        b.lower_mut().copy_from_slice(&[5.0, 7.0]);
        a.add_assign(&b);
        assert_eq!(a.upper(), &[3.0, 4.0]);
        assert_eq!(a.lower(), &[6.0, 8.0]);
        a.sub_assign(&b);
        assert_eq!(a.lower(), &[1.0, 1.0]);
    }

    #[test]
    fn amul_matches_csr_product() {
        let mut m = LduMatrix::new(chain(4));
        m.diag_mut().copy_from_slice(&[4.0, 5.0, 6.0, 7.0]);
        m.upper_mut().copy_from_slice(&[-1.0, -2.0, -3.0]);
        m.lower_mut().copy_from_slice(&[-0.5, -1.5, -2.5]);
        let psi = [1.0, 2.0, 3.0, 4.0];

        let csr = m.to_csr().unwrap();
        let mut expected = [0.0; 4];
        for (i, row) in csr.row_iter().enumerate() {
            for (&j, v) in row.col_indices().iter().zip(row.values()) {
                expected[i] += v * psi[j];
            }
        }
        let mesh = Arc::new(MeshBuilder::line(4, 1.0, serial()).unwrap());
        let interfaces = LduInterfaces::new(&mesh);
        let got = m.amul(&psi, &[], &interfaces).unwrap();
        for i in 0..4 {
            assert!((got[i] - expected[i]).abs() < 1e-12);
        }
        let r = m.residual(&psi, &expected, &[], &interfaces).unwrap();
        assert!(r.iter().all(|x| x.abs() < 1e-12));
    }

    #[test]
    fn h_is_negated_off_diagonal_product() {
        let mut m = LduMatrix::new(chain(3));
        m.diag_mut().copy_from_slice(&[2.0, 2.0, 2.0]);
        m.upper_mut().copy_from_slice(&[-1.0, -1.0]);
        let psi = [1.0, 2.0, 3.0];
        assert_eq!(m.h(&psi), vec![2.0, 4.0, 2.0]);
        assert_eq!(m.h1(), vec![1.0, 2.0, 1.0]);
        assert_eq!(m.face_h(&psi), vec![-1.0, -1.0]);

        let mut sum = vec![0.0; 3];
        m.sum_mag_off_diag(&mut sum);
        assert_eq!(sum, vec![1.0, 2.0, 1.0]);
        m.neg_sum_diag();
        assert_eq!(m.diag(), &[3.0, 4.0, 3.0]);
    }

    #[test]
    fn row_scaling_makes_matrix_asymmetric() {
        let mut m = LduMatrix::new(chain(2));
        m.diag_mut().copy_from_slice(&[1.0, 1.0]);
        m.upper_mut()[0] = 1.0;
        m.scale_rows(&[2.0, 3.0]);
        assert_eq!(m.diag(), &[2.0, 3.0]);
        assert_eq!(m.upper(), &[2.0]);
        assert_eq!(m.lower(), &[3.0]);
    }
}
