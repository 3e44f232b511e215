//! Generators for the structured meshes used by cases and tests.

use std::sync::Arc;

use crate::error::{FvError, Result};
use crate::mesh::{FvMesh, MeshData, PatchData, PatchKind};
use crate::parallel::Communicator;
use crate::primitives::Vector;

pub struct MeshBuilder;

fn patch(name: &str, kind: PatchKind) -> PatchData {
    PatchData {
        name: name.to_string(),
        kind,
        face_cells: Vec::new(),
        face_areas: Vec::new(),
        face_centres: Vec::new(),
        neighbour_cell_centres: Vec::new(),
    }
}

impl PatchData {
    fn push_face(&mut self, cell: usize, sf: Vector, cf: Vector) {
        self.face_cells.push(cell);
        self.face_areas.push(sf);
        self.face_centres.push(cf);
    }
}

/// Cells `[start, start + count)` of a line of `n_total` cells split over
/// `n_procs` ranks as evenly as possible.
fn line_partition(n_total: usize, n_procs: usize, rank: usize) -> (usize, usize) {
    let base = n_total / n_procs;
    let rem = n_total % n_procs;
    let count = base + usize::from(rank < rem);
    let start = rank * base + rank.min(rem);
    (start, count)
}

impl MeshBuilder {
    /// Uniform 1-D mesh of `n` cells on `[0, length]` with unit cross
    /// section and patches `left` and `right`.
    pub fn line(n: usize, length: f64, comm: Arc<dyn Communicator>) -> Result<FvMesh> {
        if n == 0 || length <= 0.0 {
            return Err(FvError::Mesh(format!(
                "line mesh needs cells and a positive length (got {n} cells, length {length})"
            )));
        }
        Self::line_segment(n, length, 0, n, None, comm)
    }

    /// The portion of a uniform line of `n_total` cells owned by this rank
    /// of `comm`. Neighbouring ranks are joined by processor patches; the
    /// physical patches exist on every rank and are empty away from the
    /// ends.
    pub fn line_decomposed(
        n_total: usize,
        length: f64,
        comm: Arc<dyn Communicator>,
    ) -> Result<FvMesh> {
        let n_procs = comm.n_procs();
        if n_total < n_procs || length <= 0.0 {
            return Err(FvError::Mesh(format!(
                "cannot split {n_total} cells over {n_procs} ranks"
            )));
        }
        let (start, count) = line_partition(n_total, n_procs, comm.rank());
        Self::line_segment(n_total, length, start, count, Some(n_procs), comm)
    }

    fn line_segment(
        n_total: usize,
        length: f64,
        start: usize,
        count: usize,
        n_procs: Option<usize>,
        comm: Arc<dyn Communicator>,
    ) -> Result<FvMesh> {
        let dx = length / n_total as f64;
        let centre = |global: usize| Vector::new((global as f64 + 0.5) * dx, 0.0, 0.0);
        let face = |global: usize| Vector::new(global as f64 * dx, 0.0, 0.0);

        let mut data = MeshData {
            cell_centres: (start..start + count).map(centre).collect(),
            cell_volumes: vec![dx; count],
            ..MeshData::default()
        };
        for i in 0..count.saturating_sub(1) {
            data.owner.push(i);
            data.neighbour.push(i + 1);
            data.face_areas.push(Vector::x());
            data.face_centres.push(face(start + i + 1));
        }

        let mut left = patch("left", PatchKind::Physical);
        let mut right = patch("right", PatchKind::Physical);
        if start == 0 {
            left.push_face(0, -Vector::x(), face(0));
        }
        if start + count == n_total {
            right.push_face(count - 1, Vector::x(), face(n_total));
        }
        data.patches.push(left);
        data.patches.push(right);

        if let Some(n_procs) = n_procs {
            let rank = comm.rank();
            if rank > 0 {
                let nbr = rank - 1;
                let mut p = patch(
                    &format!("procBoundary{rank}to{nbr}"),
                    PatchKind::Processor {
                        neighbour_rank: nbr,
                        tag: 1 + nbr as u64,
                    },
                );
                p.push_face(0, -Vector::x(), face(start));
                p.neighbour_cell_centres.push(centre(start - 1));
                data.patches.push(p);
            }
            if rank + 1 < n_procs {
                let nbr = rank + 1;
                let mut p = patch(
                    &format!("procBoundary{rank}to{nbr}"),
                    PatchKind::Processor {
                        neighbour_rank: nbr,
                        tag: 1 + rank as u64,
                    },
                );
                p.push_face(count - 1, Vector::x(), face(start + count));
                p.neighbour_cell_centres.push(centre(start + count));
                data.patches.push(p);
            }
        }

        FvMesh::new(data, comm)
    }

    /// 2-D mesh of `nx` by `ny` parallelogram cells with unit depth. Node
    /// `(x, y)` of the orthogonal grid is moved to `(x + shear * y, y)`, so
    /// any non-zero shear makes the mesh non-orthogonal. Patches are
    /// `left`, `right`, `bottom` and `top`; with `periodic_x` the first two
    /// are a cyclic pair.
    pub fn rectangle(
        nx: usize,
        ny: usize,
        lx: f64,
        ly: f64,
        shear: f64,
        periodic_x: bool,
        comm: Arc<dyn Communicator>,
    ) -> Result<FvMesh> {
        if nx == 0 || ny == 0 || lx <= 0.0 || ly <= 0.0 {
            return Err(FvError::Mesh(format!(
                "invalid rectangle {nx}x{ny} on {lx}x{ly}"
            )));
        }
        let dx = lx / nx as f64;
        let dy = ly / ny as f64;
        let cell = |i: usize, j: usize| j * nx + i;
        let x_at = |x: f64, y: f64| Vector::new(x + shear * y, y, 0.0);

        let mut data = MeshData::default();
        for j in 0..ny {
            for i in 0..nx {
                let yc = (j as f64 + 0.5) * dy;
                data.cell_centres.push(x_at((i as f64 + 0.5) * dx, yc));
                data.cell_volumes.push(dx * dy);
            }
        }

        let slanted = Vector::new(dy, -shear * dy, 0.0);
        let horizontal = Vector::new(0.0, dx, 0.0);
        for j in 0..ny {
            for i in 0..nx {
                let c = cell(i, j);
                let yc = (j as f64 + 0.5) * dy;
                if i + 1 < nx {
                    data.owner.push(c);
                    data.neighbour.push(cell(i + 1, j));
                    data.face_areas.push(slanted);
                    data.face_centres.push(x_at((i + 1) as f64 * dx, yc));
                }
                if j + 1 < ny {
                    data.owner.push(c);
                    data.neighbour.push(cell(i, j + 1));
                    data.face_areas.push(horizontal);
                    data.face_centres
                        .push(x_at((i as f64 + 0.5) * dx, (j + 1) as f64 * dy));
                }
            }
        }

        let (left_kind, right_kind) = if periodic_x {
            (
                PatchKind::Cyclic { neighbour_patch: 1 },
                PatchKind::Cyclic { neighbour_patch: 0 },
            )
        } else {
            (PatchKind::Physical, PatchKind::Physical)
        };
        let mut left = patch("left", left_kind);
        let mut right = patch("right", right_kind);
        for j in 0..ny {
            let yc = (j as f64 + 0.5) * dy;
            left.push_face(cell(0, j), -slanted, x_at(0.0, yc));
            right.push_face(cell(nx - 1, j), slanted, x_at(lx, yc));
        }
        let mut bottom = patch("bottom", PatchKind::Physical);
        let mut top = patch("top", PatchKind::Physical);
        for i in 0..nx {
            let xc = (i as f64 + 0.5) * dx;
            bottom.push_face(cell(i, 0), -horizontal, x_at(xc, 0.0));
            top.push_face(cell(i, ny - 1), horizontal, x_at(xc, ly));
        }
        data.patches = vec![left, right, bottom, top];

        FvMesh::new(data, comm)
    }
}
