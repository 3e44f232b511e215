//! Physical dimension sets.
//!
//! A `DimensionSet` holds the exponents of the seven SI base units. Equation
//! terms carry one so that adding incompatible physics fails loudly. The
//! check can be switched off process-wide with [`set_checking`].

use std::fmt;
use std::ops::{Div, Mul};
use std::sync::atomic::{AtomicBool, Ordering};

static CHECKING: AtomicBool = AtomicBool::new(true);

/// Enables or disables dimension checking in equation algebra.
pub fn set_checking(enabled: bool) {
    CHECKING.store(enabled, Ordering::Relaxed);
}

pub fn checking() -> bool {
    CHECKING.load(Ordering::Relaxed)
}

const TOLERANCE: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DimensionSet {
    exponents: [f64; 7],
}

pub const MASS: usize = 0;
pub const LENGTH: usize = 1;
pub const TIME: usize = 2;
pub const TEMPERATURE: usize = 3;
pub const MOLES: usize = 4;
pub const CURRENT: usize = 5;
pub const LUMINOUS_INTENSITY: usize = 6;

pub const DIMLESS: DimensionSet = DimensionSet::new(0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0);
pub const DIM_MASS: DimensionSet = DimensionSet::new(1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0);
pub const DIM_LENGTH: DimensionSet = DimensionSet::new(0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0);
pub const DIM_TIME: DimensionSet = DimensionSet::new(0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0);
pub const DIM_TEMPERATURE: DimensionSet = DimensionSet::new(0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0);
pub const DIM_AREA: DimensionSet = DimensionSet::new(0.0, 2.0, 0.0, 0.0, 0.0, 0.0, 0.0);
pub const DIM_VOL: DimensionSet = DimensionSet::new(0.0, 3.0, 0.0, 0.0, 0.0, 0.0, 0.0);
pub const DIM_VELOCITY: DimensionSet = DimensionSet::new(0.0, 1.0, -1.0, 0.0, 0.0, 0.0, 0.0);
pub const DIM_DENSITY: DimensionSet = DimensionSet::new(1.0, -3.0, 0.0, 0.0, 0.0, 0.0, 0.0);
pub const DIM_PRESSURE: DimensionSet = DimensionSet::new(1.0, -1.0, -2.0, 0.0, 0.0, 0.0, 0.0);
pub const DIM_KINEMATIC_VISCOSITY: DimensionSet =
    DimensionSet::new(0.0, 2.0, -1.0, 0.0, 0.0, 0.0, 0.0);
pub const DIM_VOLUMETRIC_FLUX: DimensionSet =
    DimensionSet::new(0.0, 3.0, -1.0, 0.0, 0.0, 0.0, 0.0);

impl DimensionSet {
    pub const fn new(
        mass: f64,
        length: f64,
        time: f64,
        temperature: f64,
        moles: f64,
        current: f64,
        luminous_intensity: f64,
    ) -> Self {
        Self {
            exponents: [
                mass,
                length,
                time,
                temperature,
                moles,
                current,
                luminous_intensity,
            ],
        }
    }

    pub const fn from_array(exponents: [f64; 7]) -> Self {
        Self { exponents }
    }

    pub fn to_array(&self) -> [f64; 7] {
        self.exponents
    }

    pub fn exponent(&self, base: usize) -> f64 {
        self.exponents[base]
    }

    pub fn is_dimensionless(&self) -> bool {
        self.matches(&DIMLESS)
    }

    /// Exponent-wise comparison with a small tolerance for fractional powers.
    pub fn matches(&self, other: &DimensionSet) -> bool {
        self.exponents
            .iter()
            .zip(other.exponents.iter())
            .all(|(a, b)| (a - b).abs() < TOLERANCE)
    }

    pub fn pow(&self, p: f64) -> Self {
        let mut exponents = self.exponents;
        for e in &mut exponents {
            *e *= p;
        }
        Self { exponents }
    }

    pub fn recip(&self) -> Self {
        self.pow(-1.0)
    }
}

impl Mul for DimensionSet {
    type Output = DimensionSet;

    fn mul(self, rhs: DimensionSet) -> DimensionSet {
        let mut exponents = self.exponents;
        for (e, r) in exponents.iter_mut().zip(rhs.exponents) {
            *e += r;
        }
        DimensionSet { exponents }
    }
}

impl Div for DimensionSet {
    type Output = DimensionSet;

    fn div(self, rhs: DimensionSet) -> DimensionSet {
        let mut exponents = self.exponents;
        for (e, r) in exponents.iter_mut().zip(rhs.exponents) {
            *e -= r;
        }
        DimensionSet { exponents }
    }
}

impl fmt::Display for DimensionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, e) in self.exponents.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{e}")?;
        }
        write!(f, "]")
    }
}
