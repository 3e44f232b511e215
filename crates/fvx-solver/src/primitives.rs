//! Value types carried by fields: scalars, vectors and rank-2 tensors.

use std::fmt::Debug;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

use nalgebra::{Matrix3, Vector3};

pub type Vector = Vector3<f64>;
pub type Tensor = Matrix3<f64>;

/// Component access and component-wise algebra shared by all field value
/// types. Linear solves are segregated, so every operation that reaches the
/// LDU core goes through `component`/`set_component`.
pub trait FieldValue:
    Copy
    + Debug
    + PartialEq
    + Send
    + Sync
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<f64, Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + 'static
{
    const N_COMPONENTS: usize;
    const COMPONENT_NAMES: &'static [&'static str];
    const TYPE_NAME: &'static str;

    fn zero() -> Self;

    /// The value with every component equal to one.
    fn one() -> Self;

    fn component(&self, c: usize) -> f64;

    fn set_component(&mut self, c: usize, value: f64);

    fn cmpt_multiply(&self, other: &Self) -> Self {
        let mut out = *self;
        for c in 0..Self::N_COMPONENTS {
            out.set_component(c, self.component(c) * other.component(c));
        }
        out
    }

    fn cmpt_av(&self) -> f64 {
        (0..Self::N_COMPONENTS).map(|c| self.component(c)).sum::<f64>() / Self::N_COMPONENTS as f64
    }

    fn mag(&self) -> f64 {
        (0..Self::N_COMPONENTS)
            .map(|c| self.component(c).powi(2))
            .sum::<f64>()
            .sqrt()
    }

    fn uniform(value: f64) -> Self {
        Self::one() * value
    }

    fn from_components(values: &[f64]) -> Self {
        let mut out = Self::zero();
        for (c, v) in values.iter().enumerate().take(Self::N_COMPONENTS) {
            out.set_component(c, *v);
        }
        out
    }
}

impl FieldValue for f64 {
    const N_COMPONENTS: usize = 1;
    const COMPONENT_NAMES: &'static [&'static str] = &[""];
    const TYPE_NAME: &'static str = "scalar";

    fn zero() -> Self {
        0.0
    }

    fn one() -> Self {
        1.0
    }

    fn component(&self, _c: usize) -> f64 {
        *self
    }

    fn set_component(&mut self, _c: usize, value: f64) {
        *self = value;
    }

    fn mag(&self) -> f64 {
        self.abs()
    }
}

impl FieldValue for Vector {
    const N_COMPONENTS: usize = 3;
    const COMPONENT_NAMES: &'static [&'static str] = &["x", "y", "z"];
    const TYPE_NAME: &'static str = "vector";

    fn zero() -> Self {
        Vector::zeros()
    }

    fn one() -> Self {
        Vector::repeat(1.0)
    }

    fn component(&self, c: usize) -> f64 {
        self[c]
    }

    fn set_component(&mut self, c: usize, value: f64) {
        self[c] = value;
    }

    fn mag(&self) -> f64 {
        self.norm()
    }
}

impl FieldValue for Tensor {
    const N_COMPONENTS: usize = 9;
    const COMPONENT_NAMES: &'static [&'static str] =
        &["xx", "xy", "xz", "yx", "yy", "yz", "zx", "zy", "zz"];
    const TYPE_NAME: &'static str = "tensor";

    fn zero() -> Self {
        Tensor::zeros()
    }

    fn one() -> Self {
        Tensor::repeat(1.0)
    }

    // Row-major component numbering: c = 3*row + col.
    fn component(&self, c: usize) -> f64 {
        self[(c / 3, c % 3)]
    }

    fn set_component(&mut self, c: usize, value: f64) {
        self[(c / 3, c % 3)] = value;
    }

    fn mag(&self) -> f64 {
        self.norm()
    }
}

/// Types with a gradient one rank higher.
///
/// Gradients follow the convention `grad(U)[(i, j)] = d U_j / d x_i`.
pub trait Gradable: FieldValue {
    type Grad: FieldValue;

    /// `sf * value` (outer product with a face area vector).
    fn outer(sf: &Vector, value: &Self) -> Self::Grad;

    /// `d & grad`, the change of the value along `d`.
    fn dot_grad(d: &Vector, grad: &Self::Grad) -> Self;

    /// Scales the gradient of each component by the matching component of
    /// `limiter`.
    fn limit_grad(grad: &Self::Grad, limiter: &Self) -> Self::Grad;
}

impl Gradable for f64 {
    type Grad = Vector;

    fn outer(sf: &Vector, value: &f64) -> Vector {
        sf * *value
    }

    fn dot_grad(d: &Vector, grad: &Vector) -> f64 {
        d.dot(grad)
    }

    fn limit_grad(grad: &Vector, limiter: &f64) -> Vector {
        grad * *limiter
    }
}

impl Gradable for Vector {
    type Grad = Tensor;

    fn outer(sf: &Vector, value: &Vector) -> Tensor {
        sf * value.transpose()
    }

    fn dot_grad(d: &Vector, grad: &Tensor) -> Vector {
        grad.transpose() * d
    }

    fn limit_grad(grad: &Tensor, limiter: &Vector) -> Tensor {
        let mut out = *grad;
        for j in 0..3 {
            for i in 0..3 {
                out[(i, j)] *= limiter[j];
            }
        }
        out
    }
}

/// Types whose inner product with a face vector lowers the rank.
pub trait Divergible: FieldValue {
    type Div: FieldValue;

    fn inner(sf: &Vector, value: &Self) -> Self::Div;
}

impl Divergible for Vector {
    type Div = f64;

    fn inner(sf: &Vector, value: &Vector) -> f64 {
        sf.dot(value)
    }
}

impl Divergible for Tensor {
    type Div = Vector;

    fn inner(sf: &Vector, value: &Tensor) -> Vector {
        value.transpose() * sf
    }
}

/// Axial vector of the skew part of a velocity gradient, i.e. the curl.
pub fn curl_of_grad(g: &Tensor) -> Vector {
    Vector::new(
        g[(1, 2)] - g[(2, 1)],
        g[(2, 0)] - g[(0, 2)],
        g[(0, 1)] - g[(1, 0)],
    )
}

/// Flattens values into their components, value by value.
pub fn pack<T: FieldValue>(values: &[T]) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len() * T::N_COMPONENTS);
    for v in values {
        out.extend((0..T::N_COMPONENTS).map(|c| v.component(c)));
    }
    out
}

/// Inverse of [`pack`].
pub fn unpack<T: FieldValue>(data: &[f64]) -> Vec<T> {
    data.chunks(T::N_COMPONENTS)
        .map(T::from_components)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_access_round_trips() {
        let mut t = Tensor::zeros();
        t.set_component(5, 2.0);
        assert_eq!(t[(1, 2)], 2.0);
        assert_eq!(t.component(5), 2.0);
        assert_eq!(Vector::new(1.0, 2.0, 3.0).cmpt_av(), 2.0);
        assert_eq!(<f64 as FieldValue>::one().cmpt_av(), 1.0);
    }

    #[test]
    fn gradient_convention() {
        let sf = Vector::new(0.0, 2.0, 0.0);
        let u = Vector::new(1.0, 0.0, 0.0);
        let g = Vector::outer(&sf, &u);
        // d(U_x)/dy lives in row y, column x.
        assert_eq!(g[(1, 0)], 2.0);
        let d = Vector::new(0.0, 0.5, 0.0);
        assert_eq!(Vector::dot_grad(&d, &g), Vector::new(1.0, 0.0, 0.0));
        assert_eq!(curl_of_grad(&g), Vector::new(0.0, 0.0, -2.0));
    }

    #[test]
    fn limiter_scales_columns() {
        let g = Tensor::repeat(1.0);
        let limited = Vector::limit_grad(&g, &Vector::new(1.0, 0.5, 0.0));
        assert_eq!(limited[(2, 1)], 0.5);
        assert_eq!(limited[(0, 2)], 0.0);
        assert_eq!(Tensor::inner(&Vector::x(), &Tensor::identity()), Vector::x());
    }

    #[test]
    fn pack_interleaves_components() {
        let values = [Vector::new(1.0, 2.0, 3.0), Vector::new(4.0, 5.0, 6.0)];
        let flat = pack(&values);
        assert_eq!(flat, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(unpack::<Vector>(&flat), values.to_vec());
    }
}
