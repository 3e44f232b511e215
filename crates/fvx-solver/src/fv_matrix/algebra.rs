//! Equation algebra: combining matrices of the same field and moving
//! explicit fields into the source.
//!
//! The operator forms panic on incompatible operands, with the message of
//! the corresponding [`FvError`]; the `try_` forms return it instead.

use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use std::sync::Arc;

use super::FvMatrix;
use crate::dimensions::DimensionSet;
use crate::error::{FvError, Result};
use crate::fields::{Dimensioned, VolField};
use crate::primitives::FieldValue;

fn or_panic<R>(result: Result<R>) -> R {
    match result {
        Ok(value) => value,
        Err(err) => panic!("{err}"),
    }
}

impl<T: FieldValue> FvMatrix<T> {
    pub fn try_add_assign(&mut self, other: &FvMatrix<T>) -> Result<()> {
        self.check_compatible(other, "+=")?;
        self.ldu.add_assign(&other.ldu);
        self.combine_coefficients(other, 1.0);
        match (&mut self.face_flux_correction, &other.face_flux_correction) {
            (Some(mine), Some(theirs)) => mine.add_assign(theirs),
            (None, Some(theirs)) => self.face_flux_correction = Some(theirs.clone()),
            _ => {}
        }
        Ok(())
    }

    pub fn try_sub_assign(&mut self, other: &FvMatrix<T>) -> Result<()> {
        self.check_compatible(other, "-=")?;
        self.ldu.sub_assign(&other.ldu);
        self.combine_coefficients(other, -1.0);
        if let Some(theirs) = &other.face_flux_correction {
            let negated = theirs.map(theirs.name(), theirs.dimensions(), |v| -*v);
            match &mut self.face_flux_correction {
                Some(mine) => mine.add_assign(&negated),
                None => self.face_flux_correction = Some(negated),
            }
        }
        Ok(())
    }

    fn combine_coefficients(&mut self, other: &FvMatrix<T>, sign: f64) {
        for (s, o) in self.source.iter_mut().zip(&other.source) {
            *s += *o * sign;
        }
        let pairs = self
            .internal_coeffs
            .iter_mut()
            .zip(&other.internal_coeffs)
            .chain(self.boundary_coeffs.iter_mut().zip(&other.boundary_coeffs));
        for (mine, theirs) in pairs {
            for (m, t) in mine.iter_mut().zip(theirs) {
                *m += *t * sign;
            }
        }
    }

    pub fn try_add(mut self, other: &FvMatrix<T>) -> Result<Self> {
        self.try_add_assign(other)?;
        Ok(self)
    }

    pub fn try_sub(mut self, other: &FvMatrix<T>) -> Result<Self> {
        self.try_sub_assign(other)?;
        Ok(self)
    }

    pub fn negate(&mut self) {
        self.ldu.negate();
        self.scale_coefficients(-1.0);
    }

    /// Multiplies the whole equation by a constant.
    pub fn scale(&mut self, s: f64) {
        self.ldu.scale(s);
        self.scale_coefficients(s);
    }

    fn scale_coefficients(&mut self, s: f64) {
        self.source.iter_mut().for_each(|v| *v = *v * s);
        for coeffs in self.internal_coeffs.iter_mut().chain(&mut self.boundary_coeffs) {
            coeffs.iter_mut().for_each(|v| *v = *v * s);
        }
        if let Some(correction) = &mut self.face_flux_correction {
            *correction = correction.map(correction.name(), correction.dimensions(), |v| *v * s);
        }
    }

    /// Multiplies every row by the value of `sf` in that cell. The equation
    /// dimensions pick up those of `sf`.
    pub fn try_scale_by_field(&mut self, sf: &VolField<f64>) -> Result<()> {
        self.check_mesh(sf.mesh(), sf.name())?;
        if self.face_flux_correction.is_some() {
            return Err(FvError::Unsupported(format!(
                "cannot scale the equation for {} containing a face-flux correction",
                self.psi_name
            )));
        }
        self.dimensions = self.dimensions * sf.dimensions();
        self.ldu.scale_rows(sf.internal());
        for (s, f) in self.source.iter_mut().zip(sf.internal()) {
            *s = *s * *f;
        }
        for (p, patch) in self.mesh.patches().iter().enumerate() {
            let pisf = patch.patch_internal(sf.internal());
            for coeffs in [&mut self.internal_coeffs[p], &mut self.boundary_coeffs[p]] {
                for (c, f) in coeffs.iter_mut().zip(&pisf) {
                    *c = *c * *f;
                }
            }
        }
        Ok(())
    }

    /// Adds `sign * V * values` to the source after the dimension check.
    fn add_to_source(
        &mut self,
        name: &str,
        dims: DimensionSet,
        values: impl Fn(usize) -> T,
        sign: f64,
        op: &str,
    ) -> Result<()> {
        self.check_source(name, dims, op)?;
        let mesh = Arc::clone(&self.mesh);
        for (i, (s, vol)) in self.source.iter_mut().zip(mesh.v()).enumerate() {
            *s += values(i) * (sign * vol);
        }
        Ok(())
    }

    /// `M + su`: an explicit field on the operator side moves to the source
    /// with a negative sign.
    pub fn try_add_field(mut self, su: &VolField<T>) -> Result<Self> {
        self.check_mesh(su.mesh(), su.name())?;
        let values = su.internal();
        self.add_to_source(su.name(), su.dimensions(), |i| values[i], -1.0, "+")?;
        Ok(self)
    }

    pub fn try_sub_field(mut self, su: &VolField<T>) -> Result<Self> {
        self.check_mesh(su.mesh(), su.name())?;
        let values = su.internal();
        self.add_to_source(su.name(), su.dimensions(), |i| values[i], 1.0, "-")?;
        Ok(self)
    }

    pub fn try_add_value(mut self, su: &Dimensioned<T>) -> Result<Self> {
        self.add_to_source(&su.name, su.dimensions, |_| su.value, -1.0, "+")?;
        Ok(self)
    }

    pub fn try_sub_value(mut self, su: &Dimensioned<T>) -> Result<Self> {
        self.add_to_source(&su.name, su.dimensions, |_| su.value, 1.0, "-")?;
        Ok(self)
    }

    /// `M == N`, i.e. `M - N`.
    pub fn equals(self, other: FvMatrix<T>) -> Self {
        or_panic(self.try_sub(&other))
    }

    /// `M == su`: the equation with `su` as its right-hand side.
    pub fn equals_field(self, su: &VolField<T>) -> Self {
        or_panic(self.try_sub_field(su))
    }

    pub fn equals_value(self, su: &Dimensioned<T>) -> Self {
        or_panic(self.try_sub_value(su))
    }
}

impl<T: FieldValue> AddAssign<&FvMatrix<T>> for FvMatrix<T> {
    fn add_assign(&mut self, rhs: &FvMatrix<T>) {
        or_panic(self.try_add_assign(rhs));
    }
}

impl<T: FieldValue> SubAssign<&FvMatrix<T>> for FvMatrix<T> {
    fn sub_assign(&mut self, rhs: &FvMatrix<T>) {
        or_panic(self.try_sub_assign(rhs));
    }
}

impl<T: FieldValue> Add for FvMatrix<T> {
    type Output = FvMatrix<T>;

    fn add(self, rhs: FvMatrix<T>) -> FvMatrix<T> {
        or_panic(self.try_add(&rhs))
    }
}

impl<T: FieldValue> Sub for FvMatrix<T> {
    type Output = FvMatrix<T>;

    fn sub(self, rhs: FvMatrix<T>) -> FvMatrix<T> {
        or_panic(self.try_sub(&rhs))
    }
}

impl<T: FieldValue> Neg for FvMatrix<T> {
    type Output = FvMatrix<T>;

    fn neg(mut self) -> FvMatrix<T> {
        self.negate();
        self
    }
}

impl<T: FieldValue> Mul<f64> for FvMatrix<T> {
    type Output = FvMatrix<T>;

    fn mul(mut self, rhs: f64) -> FvMatrix<T> {
        self.scale(rhs);
        self
    }
}

impl<T: FieldValue> Mul<FvMatrix<T>> for f64 {
    type Output = FvMatrix<T>;

    fn mul(self, mut rhs: FvMatrix<T>) -> FvMatrix<T> {
        rhs.scale(self);
        rhs
    }
}

impl<T: FieldValue> Mul<FvMatrix<T>> for &VolField<f64> {
    type Output = FvMatrix<T>;

    fn mul(self, mut rhs: FvMatrix<T>) -> FvMatrix<T> {
        or_panic(rhs.try_scale_by_field(self));
        rhs
    }
}

impl<T: FieldValue> Add<&VolField<T>> for FvMatrix<T> {
    type Output = FvMatrix<T>;

    fn add(self, rhs: &VolField<T>) -> FvMatrix<T> {
        or_panic(self.try_add_field(rhs))
    }
}

impl<T: FieldValue> Sub<&VolField<T>> for FvMatrix<T> {
    type Output = FvMatrix<T>;

    fn sub(self, rhs: &VolField<T>) -> FvMatrix<T> {
        or_panic(self.try_sub_field(rhs))
    }
}

impl<T: FieldValue> Add<&Dimensioned<T>> for FvMatrix<T> {
    type Output = FvMatrix<T>;

    fn add(self, rhs: &Dimensioned<T>) -> FvMatrix<T> {
        or_panic(self.try_add_value(rhs))
    }
}

impl<T: FieldValue> Sub<&Dimensioned<T>> for FvMatrix<T> {
    type Output = FvMatrix<T>;

    fn sub(self, rhs: &Dimensioned<T>) -> FvMatrix<T> {
        or_panic(self.try_sub_value(rhs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimensions::{DIM_TEMPERATURE, DIM_TIME, DIM_VOL, DIMLESS};
    use crate::mesh::{FvMesh, MeshBuilder};
    use crate::parallel::serial;

    fn setup() -> (Arc<FvMesh>, VolField<f64>) {
        let mesh = Arc::new(MeshBuilder::line(4, 2.0, serial()).unwrap());
        let psi = VolField::new("T", &mesh, DIM_TEMPERATURE, 1.0);
        (mesh, psi)
    }

    fn equation(psi: &VolField<f64>, diag: f64) -> FvMatrix<f64> {
        let mut m = FvMatrix::new(psi, DIM_TEMPERATURE * DIM_VOL / DIM_TIME);
        m.diag_mut().iter_mut().for_each(|d| *d = diag);
        m.upper_mut().iter_mut().for_each(|u| *u = -0.5 * diag);
        m.source_mut().iter_mut().for_each(|s| *s = diag);
        m.boundary_coeffs_mut()[0][0] = diag;
        m
    }

    #[test]
    fn sum_and_difference_are_coefficientwise() {
        let (_mesh, psi) = setup();
        let sum = equation(&psi, 2.0) + equation(&psi, 3.0);
        assert_eq!(sum.diag(), &[5.0; 4]);
        assert_eq!(sum.upper(), &[-2.5; 3]);
        assert_eq!(sum.source(), &[5.0; 4]);
        assert_eq!(sum.boundary_coeffs()[0][0], 5.0);

        let diff = equation(&psi, 2.0).equals(equation(&psi, 3.0));
        assert_eq!(diff.diag(), &[-1.0; 4]);
        assert_eq!(diff.upper(), &[0.5; 3]);

        let neg = -equation(&psi, 2.0);
        assert_eq!(neg.source(), &[-2.0; 4]);
        let scaled = 3.0 * equation(&psi, 2.0);
        assert_eq!(scaled.lower(), &[-3.0; 3]);
    }

    #[test]
    fn explicit_field_moves_to_source_with_volume() {
        let (mesh, psi) = setup();
        let q = VolField::new("q", &mesh, DIM_TEMPERATURE / DIM_TIME, 4.0);
        let m = equation(&psi, 1.0).equals_field(&q);
        for (s, v) in m.source().iter().zip(mesh.v()) {
            assert!((s - (1.0 + 4.0 * v)).abs() < 1e-12);
        }
        let m = equation(&psi, 1.0) + &Dimensioned::new("q0", DIM_TEMPERATURE / DIM_TIME, 2.0);
        for (s, v) in m.source().iter().zip(mesh.v()) {
            assert!((s - (1.0 - 2.0 * v)).abs() < 1e-12);
        }
    }

    #[test]
    fn mismatched_dimensions_are_reported() {
        let (mesh, psi) = setup();
        let wrong = VolField::new("q", &mesh, DIMLESS, 4.0);
        let err = equation(&psi, 1.0).try_add_field(&wrong).unwrap_err();
        assert!(matches!(err, FvError::DimensionMismatch { .. }));

        let other = VolField::new("S", &mesh, DIM_TEMPERATURE, 0.0);
        let err = equation(&psi, 1.0).try_add(&equation(&other, 1.0)).unwrap_err();
        assert!(matches!(err, FvError::FieldMismatch { .. }));
    }

    #[test]
    #[should_panic(expected = "incompatible fields")]
    fn operator_form_panics_on_foreign_field() {
        let (mesh, psi) = setup();
        let other = VolField::new("S", &mesh, DIM_TEMPERATURE, 0.0);
        let _ = equation(&psi, 1.0) + equation(&other, 1.0);
    }

    #[test]
    fn row_scaling_by_field() {
        let (mesh, psi) = setup();
        let rho = VolField::from_internal("rho", &mesh, DIMLESS, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let m = &rho * equation(&psi, 1.0);
        assert_eq!(m.diag(), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(m.upper(), &[-0.5, -1.0, -1.5]);
        assert_eq!(m.lower(), &[-1.0, -1.5, -2.0]);
        assert_eq!(m.boundary_coeffs()[0][0], 1.0);
    }
}
