use std::sync::Arc;

use crate::dimensions::DimensionSet;
use crate::error::{FvError, Result};
use crate::mesh::FvMesh;
use crate::primitives::FieldValue;

/// Face values: one per internal face and one per face of every patch.
#[derive(Debug, Clone)]
pub struct SurfaceField<T> {
    name: String,
    mesh: Arc<FvMesh>,
    dimensions: DimensionSet,
    internal: Vec<T>,
    boundary: Vec<Vec<T>>,
}

impl<T: FieldValue> SurfaceField<T> {
    pub fn new(
        name: &str,
        mesh: &Arc<FvMesh>,
        dimensions: DimensionSet,
        internal: Vec<T>,
        boundary: Vec<Vec<T>>,
    ) -> Result<Self> {
        if internal.len() != mesh.n_internal_faces() {
            return Err(FvError::size(
                format!("internal faces of {name}"),
                mesh.n_internal_faces(),
                internal.len(),
            ));
        }
        if boundary.len() != mesh.patches().len() {
            return Err(FvError::size(
                format!("patches of {name}"),
                mesh.patches().len(),
                boundary.len(),
            ));
        }
        for (patch, values) in mesh.patches().iter().zip(&boundary) {
            if values.len() != patch.size() {
                return Err(FvError::size(
                    format!("patch {} of {name}", patch.name()),
                    patch.size(),
                    values.len(),
                ));
            }
        }
        Ok(Self {
            name: name.to_string(),
            mesh: Arc::clone(mesh),
            dimensions,
            internal,
            boundary,
        })
    }

    pub fn uniform(name: &str, mesh: &Arc<FvMesh>, dimensions: DimensionSet, value: T) -> Self {
        Self {
            name: name.to_string(),
            mesh: Arc::clone(mesh),
            dimensions,
            internal: vec![value; mesh.n_internal_faces()],
            boundary: mesh.patches().iter().map(|p| vec![value; p.size()]).collect(),
        }
    }

    /// Evaluates `f(face area vector)` on every face.
    pub fn from_face_vectors(
        name: &str,
        mesh: &Arc<FvMesh>,
        dimensions: DimensionSet,
        f: impl Fn(&crate::primitives::Vector) -> T,
    ) -> Self {
        Self {
            name: name.to_string(),
            mesh: Arc::clone(mesh),
            dimensions,
            internal: mesh.sf().iter().map(&f).collect(),
            boundary: mesh
                .patches()
                .iter()
                .map(|p| p.sf().iter().map(&f).collect())
                .collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rename(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn mesh(&self) -> &Arc<FvMesh> {
        &self.mesh
    }

    pub fn dimensions(&self) -> DimensionSet {
        self.dimensions
    }

    pub fn internal(&self) -> &[T] {
        &self.internal
    }

    pub fn internal_mut(&mut self) -> &mut [T] {
        &mut self.internal
    }

    pub fn boundary(&self, patch: usize) -> &[T] {
        &self.boundary[patch]
    }

    pub fn boundary_mut(&mut self, patch: usize) -> &mut [T] {
        &mut self.boundary[patch]
    }

    pub fn n_patches(&self) -> usize {
        self.boundary.len()
    }

    /// Applies `f` to every face value.
    pub fn map<U: FieldValue>(&self, name: &str, dimensions: DimensionSet, f: impl Fn(&T) -> U) -> SurfaceField<U> {
        SurfaceField {
            name: name.to_string(),
            mesh: Arc::clone(&self.mesh),
            dimensions,
            internal: self.internal.iter().map(&f).collect(),
            boundary: self
                .boundary
                .iter()
                .map(|values| values.iter().map(&f).collect())
                .collect(),
        }
    }

    /// Combines two fields face by face.
    pub fn zip_map<U: FieldValue, V: FieldValue>(
        &self,
        other: &SurfaceField<U>,
        name: &str,
        dimensions: DimensionSet,
        f: impl Fn(&T, &U) -> V,
    ) -> SurfaceField<V> {
        SurfaceField {
            name: name.to_string(),
            mesh: Arc::clone(&self.mesh),
            dimensions,
            internal: self
                .internal
                .iter()
                .zip(&other.internal)
                .map(|(a, b)| f(a, b))
                .collect(),
            boundary: self
                .boundary
                .iter()
                .zip(&other.boundary)
                .map(|(a, b)| a.iter().zip(b).map(|(x, y)| f(x, y)).collect())
                .collect(),
        }
    }

    /// Adds `other` face by face.
    pub fn add_assign(&mut self, other: &SurfaceField<T>) {
        for (a, b) in self.internal.iter_mut().zip(&other.internal) {
            *a += *b;
        }
        for (pa, pb) in self.boundary.iter_mut().zip(&other.boundary) {
            for (a, b) in pa.iter_mut().zip(pb) {
                *a += *b;
            }
        }
    }
}
