//! Finite-volume discretisation on unstructured meshes.
//!
//! Equations are assembled term by term from the implicit operators in
//! [`fvm`] and the explicit ones in [`fvc`] into an [`FvMatrix`], whose
//! LDU storage is solved by the run-time selected solvers in
//! [`ldu::solvers`]. Discretisation schemes are chosen per term from the
//! [`FvSchemes`](fvx_io::FvSchemes) held by an [`FvContext`].

pub mod context;
pub mod dimensions;
pub mod error;
pub mod fields;
pub mod fv_matrix;
pub mod fvc;
pub mod fvm;
pub mod ldu;
pub mod mesh;
pub mod parallel;
pub mod primitives;
pub mod schemes;
pub mod selection;
pub mod time;

pub use context::FvContext;
pub use dimensions::DimensionSet;
pub use error::{FvError, Result};
pub use fields::{Coefficient, Dimensioned, Gamma, PatchCondition, SurfaceField, VolField};
pub use fv_matrix::FvMatrix;
pub use ldu::LduMatrix;
pub use ldu::solvers::{FieldSolverPerformance, SolverPerformance};
pub use mesh::{FvMesh, MeshBuilder, PolyPatch};
pub use parallel::{Communicator, run_ranks, serial};
pub use primitives::{Tensor, Vector};
pub use time::TimeState;
