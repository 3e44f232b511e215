//! Scalar coefficients accepted by the operators: density in `ddt`,
//! diffusivity in `laplacian`, rates in `Sp`/`SuSp`.

use crate::dimensions::{DIMLESS, DimensionSet};
use crate::fields::{Dimensioned, SurfaceField, VolField};

/// A uniform or per-cell scalar.
#[derive(Debug, Clone)]
pub enum Coefficient<'a> {
    Uniform(Dimensioned<f64>),
    Cell(&'a VolField<f64>),
}

impl Coefficient<'_> {
    /// Dimensionless one, used where an operator is called without a
    /// coefficient.
    pub fn unit() -> Self {
        Coefficient::Uniform(Dimensioned::new("1", DIMLESS, 1.0))
    }

    pub fn name(&self) -> &str {
        match self {
            Coefficient::Uniform(d) => &d.name,
            Coefficient::Cell(f) => f.name(),
        }
    }

    pub fn dimensions(&self) -> DimensionSet {
        match self {
            Coefficient::Uniform(d) => d.dimensions,
            Coefficient::Cell(f) => f.dimensions(),
        }
    }

    pub fn value(&self, cell: usize) -> f64 {
        match self {
            Coefficient::Uniform(d) => d.value,
            Coefficient::Cell(f) => f.internal()[cell],
        }
    }

    /// Value `level` time steps back; uniform values do not change.
    pub fn old_value(&self, level: usize, cell: usize) -> f64 {
        match self {
            Coefficient::Uniform(d) => d.value,
            Coefficient::Cell(f) => f.old_time(level)[cell],
        }
    }
}

impl From<Dimensioned<f64>> for Coefficient<'_> {
    fn from(value: Dimensioned<f64>) -> Self {
        Coefficient::Uniform(value)
    }
}

impl<'a> From<&'a VolField<f64>> for Coefficient<'a> {
    fn from(field: &'a VolField<f64>) -> Self {
        Coefficient::Cell(field)
    }
}

/// Diffusivity of a Laplacian: uniform, per cell (interpolated to the
/// faces by the scheme) or given on the faces.
#[derive(Debug, Clone)]
pub enum Gamma<'a> {
    Uniform(Dimensioned<f64>),
    Cell(&'a VolField<f64>),
    Face(&'a SurfaceField<f64>),
}

impl Gamma<'_> {
    pub fn name(&self) -> &str {
        match self {
            Gamma::Uniform(d) => &d.name,
            Gamma::Cell(f) => f.name(),
            Gamma::Face(f) => f.name(),
        }
    }

    pub fn dimensions(&self) -> DimensionSet {
        match self {
            Gamma::Uniform(d) => d.dimensions,
            Gamma::Cell(f) => f.dimensions(),
            Gamma::Face(f) => f.dimensions(),
        }
    }
}

impl From<Dimensioned<f64>> for Gamma<'_> {
    fn from(value: Dimensioned<f64>) -> Self {
        Gamma::Uniform(value)
    }
}

impl<'a> From<&'a VolField<f64>> for Gamma<'a> {
    fn from(field: &'a VolField<f64>) -> Self {
        Gamma::Cell(field)
    }
}

impl<'a> From<&'a SurfaceField<f64>> for Gamma<'a> {
    fn from(field: &'a SurfaceField<f64>) -> Self {
        Gamma::Face(field)
    }
}
