//! Boundary conditions.
//!
//! Each patch field supplies the four coefficient sets through which the
//! boundary enters an assembled equation:
//!
//! * value internal/boundary coefficients: face value
//!   `= vi * psi_P + vb`, used by convection;
//! * gradient internal/boundary coefficients: face normal gradient
//!   `= gi * psi_P + gb`, used by diffusion.

use crate::mesh::PolyPatch;
use crate::primitives::FieldValue;

/// User-facing condition used to set up a patch field.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchCondition<T> {
    Calculated,
    ExtrapolatedCalculated,
    FixedValue(T),
    ZeroGradient,
    FixedGradient(T),
    Mixed {
        ref_value: T,
        ref_gradient: T,
        value_fraction: f64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PatchFieldKind<T> {
    /// Values are assigned by whoever computed the field.
    Calculated,
    /// Values are copied from the adjacent cells on evaluation.
    ExtrapolatedCalculated,
    FixedValue,
    ZeroGradient,
    FixedGradient { gradient: Vec<T> },
    Mixed {
        ref_value: Vec<T>,
        ref_gradient: Vec<T>,
        value_fraction: Vec<f64>,
    },
    /// Cyclic or processor coupling; holds the latest values of the cells
    /// on the other side.
    Coupled { neighbour_values: Vec<T> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatchField<T> {
    kind: PatchFieldKind<T>,
    values: Vec<T>,
}

impl<T: FieldValue> PatchField<T> {
    pub fn new(kind: PatchFieldKind<T>, values: Vec<T>) -> Self {
        Self { kind, values }
    }

    pub fn from_condition(condition: &PatchCondition<T>, patch: &PolyPatch, internal: &[T]) -> Self {
        let n = patch.size();
        let kind = match condition {
            PatchCondition::Calculated => PatchFieldKind::Calculated,
            PatchCondition::ExtrapolatedCalculated => PatchFieldKind::ExtrapolatedCalculated,
            PatchCondition::FixedValue(_) => PatchFieldKind::FixedValue,
            PatchCondition::ZeroGradient => PatchFieldKind::ZeroGradient,
            PatchCondition::FixedGradient(g) => PatchFieldKind::FixedGradient {
                gradient: vec![*g; n],
            },
            PatchCondition::Mixed {
                ref_value,
                ref_gradient,
                value_fraction,
            } => PatchFieldKind::Mixed {
                ref_value: vec![*ref_value; n],
                ref_gradient: vec![*ref_gradient; n],
                value_fraction: vec![*value_fraction; n],
            },
        };
        let values = match condition {
            PatchCondition::FixedValue(v) => vec![*v; n],
            _ => patch.patch_internal(internal),
        };
        let mut field = Self { kind, values };
        field.evaluate(patch, internal);
        field
    }

    pub fn coupled(patch: &PolyPatch, internal: &[T]) -> Self {
        let values = patch.patch_internal(internal);
        Self {
            kind: PatchFieldKind::Coupled {
                neighbour_values: values.clone(),
            },
            values,
        }
    }

    pub fn kind(&self) -> &PatchFieldKind<T> {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut PatchFieldKind<T> {
        &mut self.kind
    }

    pub fn type_name(&self) -> &'static str {
        match self.kind {
            PatchFieldKind::Calculated => "calculated",
            PatchFieldKind::ExtrapolatedCalculated => "extrapolatedCalculated",
            PatchFieldKind::FixedValue => "fixedValue",
            PatchFieldKind::ZeroGradient => "zeroGradient",
            PatchFieldKind::FixedGradient { .. } => "fixedGradient",
            PatchFieldKind::Mixed { .. } => "mixed",
            PatchFieldKind::Coupled { .. } => "coupled",
        }
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [T] {
        &mut self.values
    }

    pub fn is_coupled(&self) -> bool {
        matches!(self.kind, PatchFieldKind::Coupled { .. })
    }

    /// Whether the condition pins the level of the solution.
    pub fn fixes_value(&self) -> bool {
        matches!(
            self.kind,
            PatchFieldKind::FixedValue | PatchFieldKind::Mixed { .. }
        )
    }

    pub fn neighbour_values(&self) -> Option<&[T]> {
        match &self.kind {
            PatchFieldKind::Coupled { neighbour_values } => Some(neighbour_values),
            _ => None,
        }
    }

    pub fn set_neighbour_values(&mut self, values: Vec<T>) {
        if let PatchFieldKind::Coupled { neighbour_values } = &mut self.kind {
            *neighbour_values = values;
        }
    }

    /// Recomputes the face values from the adjacent cell values.
    pub fn evaluate(&mut self, patch: &PolyPatch, internal: &[T]) {
        let delta = patch.delta_coeffs();
        let faces = patch.face_cells();
        match &self.kind {
            PatchFieldKind::Calculated | PatchFieldKind::FixedValue => {}
            PatchFieldKind::ExtrapolatedCalculated | PatchFieldKind::ZeroGradient => {
                self.values = patch.patch_internal(internal);
            }
            PatchFieldKind::FixedGradient { gradient } => {
                self.values = faces
                    .iter()
                    .enumerate()
                    .map(|(i, &c)| internal[c] + gradient[i] * (1.0 / delta[i]))
                    .collect();
            }
            PatchFieldKind::Mixed {
                ref_value,
                ref_gradient,
                value_fraction,
            } => {
                self.values = faces
                    .iter()
                    .enumerate()
                    .map(|(i, &c)| {
                        let f = value_fraction[i];
                        ref_value[i] * f
                            + (internal[c] + ref_gradient[i] * (1.0 / delta[i])) * (1.0 - f)
                    })
                    .collect();
            }
            PatchFieldKind::Coupled { neighbour_values } => {
                let w = patch.weights();
                self.values = faces
                    .iter()
                    .enumerate()
                    .map(|(i, &c)| internal[c] * w[i] + neighbour_values[i] * (1.0 - w[i]))
                    .collect();
            }
        }
    }

    /// Face-normal gradient at the patch.
    pub fn sn_grad(&self, patch: &PolyPatch, internal: &[T]) -> Vec<T> {
        let faces = patch.face_cells();
        let delta = patch.delta_coeffs();
        match &self.kind {
            PatchFieldKind::ZeroGradient => vec![T::zero(); faces.len()],
            PatchFieldKind::FixedGradient { gradient } => gradient.clone(),
            PatchFieldKind::Mixed {
                ref_value,
                ref_gradient,
                value_fraction,
            } => faces
                .iter()
                .enumerate()
                .map(|(i, &c)| {
                    let f = value_fraction[i];
                    (ref_value[i] - internal[c]) * (f * delta[i]) + ref_gradient[i] * (1.0 - f)
                })
                .collect(),
            PatchFieldKind::Coupled { neighbour_values } => faces
                .iter()
                .enumerate()
                .map(|(i, &c)| (neighbour_values[i] - internal[c]) * delta[i])
                .collect(),
            _ => faces
                .iter()
                .enumerate()
                .map(|(i, &c)| (self.values[i] - internal[c]) * delta[i])
                .collect(),
        }
    }

    /// `None` for calculated patches, which cannot take part in an
    /// implicit discretisation.
    pub fn value_internal_coeffs(&self, weights: &[f64]) -> Option<Vec<T>> {
        let n = self.values.len();
        match &self.kind {
            PatchFieldKind::Calculated | PatchFieldKind::ExtrapolatedCalculated => None,
            PatchFieldKind::FixedValue => Some(vec![T::zero(); n]),
            PatchFieldKind::ZeroGradient | PatchFieldKind::FixedGradient { .. } => {
                Some(vec![T::one(); n])
            }
            PatchFieldKind::Mixed { value_fraction, .. } => {
                Some(value_fraction.iter().map(|f| T::uniform(1.0 - f)).collect())
            }
            PatchFieldKind::Coupled { .. } => Some(weights.iter().map(|&w| T::uniform(w)).collect()),
        }
    }

    pub fn value_boundary_coeffs(&self, patch: &PolyPatch, weights: &[f64]) -> Option<Vec<T>> {
        let n = self.values.len();
        let delta = patch.delta_coeffs();
        match &self.kind {
            PatchFieldKind::Calculated | PatchFieldKind::ExtrapolatedCalculated => None,
            PatchFieldKind::FixedValue => Some(self.values.clone()),
            PatchFieldKind::ZeroGradient => Some(vec![T::zero(); n]),
            PatchFieldKind::FixedGradient { gradient } => Some(
                gradient
                    .iter()
                    .zip(delta)
                    .map(|(g, d)| *g * (1.0 / d))
                    .collect(),
            ),
            PatchFieldKind::Mixed {
                ref_value,
                ref_gradient,
                value_fraction,
            } => Some(
                (0..n)
                    .map(|i| {
                        let f = value_fraction[i];
                        ref_value[i] * f + ref_gradient[i] * ((1.0 - f) / delta[i])
                    })
                    .collect(),
            ),
            PatchFieldKind::Coupled { .. } => {
                Some(weights.iter().map(|&w| T::uniform(1.0 - w)).collect())
            }
        }
    }

    /// `delta_coeffs` are the scheme's coefficients for coupled patches;
    /// other patches use their own geometry.
    pub fn gradient_internal_coeffs(&self, patch: &PolyPatch, delta_coeffs: &[f64]) -> Option<Vec<T>> {
        let n = self.values.len();
        let delta = patch.delta_coeffs();
        match &self.kind {
            PatchFieldKind::Calculated | PatchFieldKind::ExtrapolatedCalculated => None,
            PatchFieldKind::FixedValue => Some(delta.iter().map(|d| T::uniform(-d)).collect()),
            PatchFieldKind::ZeroGradient | PatchFieldKind::FixedGradient { .. } => {
                Some(vec![T::zero(); n])
            }
            PatchFieldKind::Mixed { value_fraction, .. } => Some(
                value_fraction
                    .iter()
                    .zip(delta)
                    .map(|(f, d)| T::uniform(-f * d))
                    .collect(),
            ),
            PatchFieldKind::Coupled { .. } => {
                Some(delta_coeffs.iter().map(|d| T::uniform(-d)).collect())
            }
        }
    }

    pub fn gradient_boundary_coeffs(&self, patch: &PolyPatch, delta_coeffs: &[f64]) -> Option<Vec<T>> {
        let n = self.values.len();
        let delta = patch.delta_coeffs();
        match &self.kind {
            PatchFieldKind::Calculated | PatchFieldKind::ExtrapolatedCalculated => None,
            PatchFieldKind::FixedValue => Some(
                self.values
                    .iter()
                    .zip(delta)
                    .map(|(v, d)| *v * *d)
                    .collect(),
            ),
            PatchFieldKind::ZeroGradient => Some(vec![T::zero(); n]),
            PatchFieldKind::FixedGradient { gradient } => Some(gradient.clone()),
            PatchFieldKind::Mixed {
                ref_value,
                ref_gradient,
                value_fraction,
            } => Some(
                (0..n)
                    .map(|i| {
                        let f = value_fraction[i];
                        ref_value[i] * (f * delta[i]) + ref_gradient[i] * (1.0 - f)
                    })
                    .collect(),
            ),
            PatchFieldKind::Coupled { .. } => {
                Some(delta_coeffs.iter().map(|d| T::uniform(*d)).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::MeshBuilder;
    use crate::parallel::serial;

    #[test]
    fn fixed_value_coefficients_reproduce_sn_grad() {
        let mesh = MeshBuilder::line(4, 1.0, serial()).unwrap();
        let patch = mesh.patch(0);
        let internal = vec![1.0, 2.0, 3.0, 4.0];
        let pf = PatchField::from_condition(&PatchCondition::FixedValue(5.0), patch, &internal);
        let gi = pf.gradient_internal_coeffs(patch, &[]).unwrap();
        let gb = pf.gradient_boundary_coeffs(patch, &[]).unwrap();
        let from_coeffs = gi[0] * internal[0] + gb[0];
        assert!((from_coeffs - pf.sn_grad(patch, &internal)[0]).abs() < 1e-12);
        assert!(pf.fixes_value());
    }

    #[test]
    fn mixed_blends_value_and_gradient() {
        let mesh = MeshBuilder::line(2, 2.0, serial()).unwrap();
        let patch = mesh.patch(1);
        let internal = vec![0.0, 1.0];
        let condition = PatchCondition::Mixed {
            ref_value: 3.0,
            ref_gradient: 2.0,
            value_fraction: 0.25,
        };
        let pf = PatchField::from_condition(&condition, patch, &internal);
        // delta = 2, so extrapolation gives 1 + 2/2 = 2.
        assert!((pf.values()[0] - (0.25 * 3.0 + 0.75 * 2.0)).abs() < 1e-12);
        let vi = pf.value_internal_coeffs(&[]).unwrap();
        let vb = pf.value_boundary_coeffs(patch, &[]).unwrap();
        assert!((vi[0] * internal[1] + vb[0] - pf.values()[0]).abs() < 1e-12);
    }

    #[test]
    fn calculated_has_no_coefficients() {
        let mesh = MeshBuilder::line(2, 1.0, serial()).unwrap();
        let pf = PatchField::from_condition(&PatchCondition::Calculated, mesh.patch(0), &[1.0, 2.0]);
        assert!(pf.value_internal_coeffs(&[1.0]).is_none());
        assert!(!pf.fixes_value());
        assert_eq!(pf.values(), &[1.0]);
    }
}
