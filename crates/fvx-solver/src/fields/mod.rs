//! Cell-centred and face-centred fields.

mod coefficient;
mod patch_field;
mod surface_field;
mod vol_field;

use std::sync::atomic::{AtomicU64, Ordering};

use crate::dimensions::DimensionSet;

pub use coefficient::{Coefficient, Gamma};
pub use patch_field::{PatchCondition, PatchField, PatchFieldKind};
pub use surface_field::SurfaceField;
pub use vol_field::VolField;

static NEXT_FIELD_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a volume field. Copies made with `Clone` keep the identity
/// of the field they were copied from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(u64);

impl FieldId {
    pub(crate) fn next() -> Self {
        FieldId(NEXT_FIELD_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A named uniform value with dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct Dimensioned<T> {
    pub name: String,
    pub dimensions: DimensionSet,
    pub value: T,
}

impl<T> Dimensioned<T> {
    pub fn new(name: &str, dimensions: DimensionSet, value: T) -> Self {
        Self {
            name: name.to_string(),
            dimensions,
            value,
        }
    }
}
