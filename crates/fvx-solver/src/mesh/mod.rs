//! Finite-volume mesh: topology, addressing and derived geometry.
//!
//! The mesh is assembled from primitive arrays (`MeshData`) and is immutable
//! afterwards. Every mesh gets a fresh generation number; cached schemes
//! compare it to detect that the mesh they were built for has been
//! replaced.

mod addressing;
pub mod builder;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{FvError, Result};
use crate::parallel::Communicator;
use crate::primitives::Vector;

pub use addressing::LduAddressing;
pub use builder::MeshBuilder;

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Lower bound on `nf & d` relative to `|d|` for non-orthogonal delta
/// coefficients.
const NON_ORTH_DELTA_FLOOR: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchKind {
    Physical,
    /// Periodic pairing with another patch of the same mesh; face `i` of
    /// this patch is coupled to face `i` of `neighbour_patch`.
    Cyclic { neighbour_patch: usize },
    /// Coupling to the matching patch of another rank.
    Processor { neighbour_rank: usize, tag: u64 },
}

impl PatchKind {
    pub fn coupled(&self) -> bool {
        !matches!(self, PatchKind::Physical)
    }
}

/// Raw description of one boundary patch.
#[derive(Debug, Clone)]
pub struct PatchData {
    pub name: String,
    pub kind: PatchKind,
    pub face_cells: Vec<usize>,
    pub face_areas: Vec<Vector>,
    pub face_centres: Vec<Vector>,
    /// Centres of the cells across a processor patch, expressed in this
    /// rank's coordinates. Unused for other patch kinds.
    pub neighbour_cell_centres: Vec<Vector>,
}

/// Raw description of a mesh.
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    pub cell_centres: Vec<Vector>,
    pub cell_volumes: Vec<f64>,
    pub owner: Vec<usize>,
    pub neighbour: Vec<usize>,
    pub face_areas: Vec<Vector>,
    pub face_centres: Vec<Vector>,
    pub patches: Vec<PatchData>,
}

/// A boundary patch with its derived geometry.
#[derive(Debug, Clone)]
pub struct PolyPatch {
    name: String,
    kind: PatchKind,
    index: usize,
    start: usize,
    face_cells: Vec<usize>,
    sf: Vec<Vector>,
    cf: Vec<Vector>,
    mag_sf: Vec<f64>,
    delta: Vec<Vector>,
    weights: Vec<f64>,
    delta_coeffs: Vec<f64>,
    non_orth_delta_coeffs: Vec<f64>,
    non_orth_correction_vectors: Vec<Vector>,
}

impl PolyPatch {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> PatchKind {
        self.kind
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Global index of the first face of this patch.
    pub fn start(&self) -> usize {
        self.start
    }

    pub fn size(&self) -> usize {
        self.face_cells.len()
    }

    pub fn coupled(&self) -> bool {
        self.kind.coupled()
    }

    pub fn face_cells(&self) -> &[usize] {
        &self.face_cells
    }

    pub fn sf(&self) -> &[Vector] {
        &self.sf
    }

    pub fn cf(&self) -> &[Vector] {
        &self.cf
    }

    pub fn mag_sf(&self) -> &[f64] {
        &self.mag_sf
    }

    pub fn nf(&self, face: usize) -> Vector {
        self.sf[face] / self.mag_sf[face]
    }

    /// Cell-centre to face-centre vector, or to the coupled neighbour
    /// centre on coupled patches.
    pub fn delta(&self) -> &[Vector] {
        &self.delta
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn delta_coeffs(&self) -> &[f64] {
        &self.delta_coeffs
    }

    pub fn non_orth_delta_coeffs(&self) -> &[f64] {
        &self.non_orth_delta_coeffs
    }

    pub fn non_orth_correction_vectors(&self) -> &[Vector] {
        &self.non_orth_correction_vectors
    }

    /// Values of a cell field at the cells next to this patch.
    pub fn patch_internal<T: Copy>(&self, cell_values: &[T]) -> Vec<T> {
        self.face_cells.iter().map(|&c| cell_values[c]).collect()
    }
}

pub struct FvMesh {
    generation: u64,
    comm: Arc<dyn Communicator>,
    addressing: Arc<LduAddressing>,
    c: Vec<Vector>,
    v: Vec<f64>,
    sf: Vec<Vector>,
    cf: Vec<Vector>,
    mag_sf: Vec<f64>,
    weights: Vec<f64>,
    delta_coeffs: Vec<f64>,
    non_orth_delta_coeffs: Vec<f64>,
    non_orth_correction_vectors: Vec<Vector>,
    patches: Vec<PolyPatch>,
}

impl fmt::Debug for FvMesh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FvMesh")
            .field("generation", &self.generation)
            .field("n_cells", &self.n_cells())
            .field("n_internal_faces", &self.n_internal_faces())
            .field("patches", &self.patches.iter().map(|p| p.name()).collect::<Vec<_>>())
            .finish()
    }
}

struct FaceGeometry {
    delta: Vector,
    weight: f64,
    delta_coeff: f64,
    non_orth_delta_coeff: f64,
    correction: Vector,
}

/// Geometry of a face between a cell at `c_own` and a (possibly remote)
/// cell at `c_nei`.
fn coupled_face_geometry(sf: &Vector, cf: &Vector, c_own: &Vector, c_nei: &Vector) -> FaceGeometry {
    let nf = sf / sf.norm();
    let sfd_own = nf.dot(&(cf - c_own)).abs();
    let sfd_nei = nf.dot(&(c_nei - cf)).abs();
    let delta = c_nei - c_own;
    let non_orth = 1.0 / nf.dot(&delta).max(NON_ORTH_DELTA_FLOOR * delta.norm());
    FaceGeometry {
        delta,
        weight: sfd_nei / (sfd_own + sfd_nei),
        delta_coeff: 1.0 / delta.norm(),
        non_orth_delta_coeff: non_orth,
        correction: nf - delta * non_orth,
    }
}

fn boundary_face_geometry(sf: &Vector, cf: &Vector, c_own: &Vector) -> FaceGeometry {
    let nf = sf / sf.norm();
    let delta = cf - c_own;
    let coeff = 1.0 / nf.dot(&delta).max(NON_ORTH_DELTA_FLOOR * delta.norm());
    FaceGeometry {
        delta,
        weight: 1.0,
        delta_coeff: coeff,
        non_orth_delta_coeff: coeff,
        correction: Vector::zeros(),
    }
}

impl FvMesh {
    pub fn new(data: MeshData, comm: Arc<dyn Communicator>) -> Result<Self> {
        let n_cells = data.cell_centres.len();
        let n_faces = data.owner.len();

        if data.cell_volumes.len() != n_cells {
            return Err(FvError::size("cell volumes", n_cells, data.cell_volumes.len()));
        }
        if let Some(c) = data.cell_volumes.iter().position(|&v| v <= 0.0) {
            return Err(FvError::Mesh(format!("cell {c} has non-positive volume")));
        }
        for (what, len) in [
            ("neighbour list", data.neighbour.len()),
            ("face areas", data.face_areas.len()),
            ("face centres", data.face_centres.len()),
        ] {
            if len != n_faces {
                return Err(FvError::size(what, n_faces, len));
            }
        }

        let mut patch_addr = Vec::with_capacity(data.patches.len());
        for p in &data.patches {
            let n = p.face_cells.len();
            if p.face_areas.len() != n || p.face_centres.len() != n {
                return Err(FvError::Mesh(format!(
                    "patch '{}' has inconsistent face lists",
                    p.name
                )));
            }
            if let PatchKind::Processor { .. } = p.kind
                && p.neighbour_cell_centres.len() != n
            {
                return Err(FvError::Mesh(format!(
                    "processor patch '{}' needs one neighbour centre per face",
                    p.name
                )));
            }
            patch_addr.push(p.face_cells.clone());
        }

        let addressing = LduAddressing::new(
            n_cells,
            data.owner.clone(),
            data.neighbour.clone(),
            patch_addr,
        )?;

        let mut weights = Vec::with_capacity(n_faces);
        let mut delta_coeffs = Vec::with_capacity(n_faces);
        let mut non_orth_delta_coeffs = Vec::with_capacity(n_faces);
        let mut non_orth_correction_vectors = Vec::with_capacity(n_faces);
        let mut mag_sf = Vec::with_capacity(n_faces);
        for f in 0..n_faces {
            let sf = &data.face_areas[f];
            if sf.norm() <= 0.0 {
                return Err(FvError::Mesh(format!("face {f} has zero area")));
            }
            let g = coupled_face_geometry(
                sf,
                &data.face_centres[f],
                &data.cell_centres[data.owner[f]],
                &data.cell_centres[data.neighbour[f]],
            );
            mag_sf.push(sf.norm());
            weights.push(g.weight);
            delta_coeffs.push(g.delta_coeff);
            non_orth_delta_coeffs.push(g.non_orth_delta_coeff);
            non_orth_correction_vectors.push(g.correction);
        }

        let mut patches = Vec::with_capacity(data.patches.len());
        let mut start = n_faces;
        for (index, p) in data.patches.iter().enumerate() {
            let neighbour_centres: Vec<Vector> = match p.kind {
                PatchKind::Physical => Vec::new(),
                PatchKind::Processor { .. } => p.neighbour_cell_centres.clone(),
                PatchKind::Cyclic { neighbour_patch } => {
                    let nbr = data.patches.get(neighbour_patch).ok_or_else(|| {
                        FvError::Mesh(format!(
                            "cyclic patch '{}' refers to missing patch {neighbour_patch}",
                            p.name
                        ))
                    })?;
                    match nbr.kind {
                        PatchKind::Cyclic { neighbour_patch: back } if back == index => {}
                        _ => {
                            return Err(FvError::Mesh(format!(
                                "cyclic patches '{}' and '{}' are not paired",
                                p.name, nbr.name
                            )));
                        }
                    }
                    if nbr.face_cells.len() != p.face_cells.len() {
                        return Err(FvError::Mesh(format!(
                            "cyclic patches '{}' and '{}' differ in size",
                            p.name, nbr.name
                        )));
                    }
                    // Bring the neighbour cell centre across the periodic
                    // interface by the face-centre offset.
                    (0..p.face_cells.len())
                        .map(|i| {
                            let nbr_cell = data.cell_centres[nbr.face_cells[i]];
                            p.face_centres[i] - (nbr.face_centres[i] - nbr_cell)
                        })
                        .collect()
                }
            };

            let mut patch = PolyPatch {
                name: p.name.clone(),
                kind: p.kind,
                index,
                start,
                face_cells: p.face_cells.clone(),
                sf: p.face_areas.clone(),
                cf: p.face_centres.clone(),
                mag_sf: p.face_areas.iter().map(|s| s.norm()).collect(),
                delta: Vec::new(),
                weights: Vec::new(),
                delta_coeffs: Vec::new(),
                non_orth_delta_coeffs: Vec::new(),
                non_orth_correction_vectors: Vec::new(),
            };
            for i in 0..patch.size() {
                let c_own = &data.cell_centres[p.face_cells[i]];
                let g = if p.kind.coupled() {
                    coupled_face_geometry(&p.face_areas[i], &p.face_centres[i], c_own, &neighbour_centres[i])
                } else {
                    boundary_face_geometry(&p.face_areas[i], &p.face_centres[i], c_own)
                };
                patch.delta.push(g.delta);
                patch.weights.push(g.weight);
                patch.delta_coeffs.push(g.delta_coeff);
                patch.non_orth_delta_coeffs.push(g.non_orth_delta_coeff);
                patch.non_orth_correction_vectors.push(g.correction);
            }
            start += patch.size();
            patches.push(patch);
        }

        Ok(Self {
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
            comm,
            addressing: Arc::new(addressing),
            c: data.cell_centres,
            v: data.cell_volumes,
            sf: data.face_areas,
            cf: data.face_centres,
            mag_sf,
            weights,
            delta_coeffs,
            non_orth_delta_coeffs,
            non_orth_correction_vectors,
            patches,
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn comm(&self) -> &Arc<dyn Communicator> {
        &self.comm
    }

    pub fn addressing(&self) -> &Arc<LduAddressing> {
        &self.addressing
    }

    pub fn n_cells(&self) -> usize {
        self.c.len()
    }

    pub fn n_internal_faces(&self) -> usize {
        self.sf.len()
    }

    pub fn owner(&self) -> &[usize] {
        self.addressing.lower_addr()
    }

    pub fn neighbour(&self) -> &[usize] {
        self.addressing.upper_addr()
    }

    pub fn c(&self) -> &[Vector] {
        &self.c
    }

    pub fn v(&self) -> &[f64] {
        &self.v
    }

    pub fn sf(&self) -> &[Vector] {
        &self.sf
    }

    pub fn cf(&self) -> &[Vector] {
        &self.cf
    }

    pub fn mag_sf(&self) -> &[f64] {
        &self.mag_sf
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn delta_coeffs(&self) -> &[f64] {
        &self.delta_coeffs
    }

    pub fn non_orth_delta_coeffs(&self) -> &[f64] {
        &self.non_orth_delta_coeffs
    }

    pub fn non_orth_correction_vectors(&self) -> &[Vector] {
        &self.non_orth_correction_vectors
    }

    pub fn patches(&self) -> &[PolyPatch] {
        &self.patches
    }

    pub fn patch(&self, index: usize) -> &PolyPatch {
        &self.patches[index]
    }

    pub fn find_patch(&self, name: &str) -> Option<usize> {
        self.patches.iter().position(|p| p.name == name)
    }

    /// Boundary faces adjacent to `cell` as `(patch, patch face)` pairs.
    pub fn cell_boundary_faces(&self, cell: usize) -> Vec<(usize, usize)> {
        let mut out = Vec::new();
        for (p, patch) in self.patches.iter().enumerate() {
            for (i, &fc) in patch.face_cells.iter().enumerate() {
                if fc == cell {
                    out.push((p, i));
                }
            }
        }
        out
    }

    /// Sum of cell volumes over all ranks.
    pub fn total_volume(&self) -> Result<f64> {
        self.comm.sum(self.v.iter().sum())
    }

    pub fn statistics(&self) -> MeshStatistics {
        let max_non_orth = self
            .sf
            .iter()
            .zip(self.owner().iter().zip(self.neighbour()))
            .map(|(sf, (&o, &n))| {
                let d = self.c[n] - self.c[o];
                let cos = (sf.dot(&d) / (sf.norm() * d.norm())).clamp(-1.0, 1.0);
                cos.acos().to_degrees()
            })
            .fold(0.0, f64::max);
        MeshStatistics {
            num_cells: self.n_cells(),
            num_internal_faces: self.n_internal_faces(),
            num_boundary_faces: self.patches.iter().map(|p| p.size()).sum(),
            num_patches: self.patches.len(),
            num_coupled_patches: self.patches.iter().filter(|p| p.coupled()).count(),
            max_non_orthogonality: max_non_orth,
            volume: self.v.iter().sum(),
        }
    }
}

/// Summary of a rank-local mesh.
#[derive(Debug, Clone)]
pub struct MeshStatistics {
    pub num_cells: usize,
    pub num_internal_faces: usize,
    pub num_boundary_faces: usize,
    pub num_patches: usize,
    pub num_coupled_patches: usize,
    /// Largest angle between a face normal and the owner-neighbour vector,
    /// in degrees.
    pub max_non_orthogonality: f64,
    pub volume: f64,
}

impl MeshStatistics {
    pub fn format(&self) -> String {
        format!(
            "cells: {}\ninternal faces: {}\nboundary faces: {}\npatches: {} ({} coupled)\nmax non-orthogonality: {:.2} deg\nvolume: {:.6e}",
            self.num_cells,
            self.num_internal_faces,
            self.num_boundary_faces,
            self.num_patches,
            self.num_coupled_patches,
            self.max_non_orthogonality,
            self.volume
        )
    }
}
