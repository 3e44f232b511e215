//! The state shared by the operators of one run: mesh, time, the scheme
//! and solution dictionaries and the schemes resolved from them.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use fvx_io::{FvSchemes, FvSolution, SchemeCategory};
use log::debug;

use crate::error::{FvError, Result};
use crate::mesh::FvMesh;
use crate::schemes::{
    ConvectionScheme, D2dt2Scheme, Ddt0State, DdtScheme, GradScheme, InterpolationScheme,
    LaplacianScheme, SchemeCache, SnGradScheme,
};
use crate::time::TimeState;

/// Operators take the context by shared reference. Resolved schemes are
/// cached per specification string and dropped whenever the mesh
/// generation changes.
#[derive(Debug)]
pub struct FvContext {
    mesh: Arc<FvMesh>,
    time: TimeState,
    schemes: FvSchemes,
    solution: FvSolution,
    interpolation: SchemeCache<InterpolationScheme>,
    sn_grad: SchemeCache<SnGradScheme>,
    grad: SchemeCache<GradScheme>,
    ddt: SchemeCache<DdtScheme>,
    d2dt2: SchemeCache<D2dt2Scheme>,
    div: SchemeCache<ConvectionScheme>,
    laplacian: SchemeCache<LaplacianScheme>,
    ddt0: RefCell<HashMap<String, Ddt0State>>,
}

impl FvContext {
    pub fn new(mesh: Arc<FvMesh>, schemes: FvSchemes, solution: FvSolution) -> Self {
        Self {
            mesh,
            time: TimeState::default(),
            schemes,
            solution,
            interpolation: SchemeCache::new(SchemeCategory::Interpolation),
            sn_grad: SchemeCache::new(SchemeCategory::SnGrad),
            grad: SchemeCache::new(SchemeCategory::Grad),
            ddt: SchemeCache::new(SchemeCategory::Ddt),
            d2dt2: SchemeCache::new(SchemeCategory::D2dt2),
            div: SchemeCache::new(SchemeCategory::Div),
            laplacian: SchemeCache::new(SchemeCategory::Laplacian),
            ddt0: RefCell::new(HashMap::new()),
        }
    }

    pub fn with_time(mut self, time: TimeState) -> Self {
        self.time = time;
        self
    }

    pub fn mesh(&self) -> &Arc<FvMesh> {
        &self.mesh
    }

    /// Moves the context to a new mesh. Cached schemes and time-scheme
    /// state belong to the old mesh and are discarded.
    pub fn set_mesh(&mut self, mesh: Arc<FvMesh>) {
        debug!(
            "Mesh generation {} replaces generation {}",
            mesh.generation(),
            self.mesh.generation()
        );
        self.mesh = mesh;
        self.ddt0.borrow_mut().clear();
    }

    pub fn time(&self) -> &TimeState {
        &self.time
    }

    pub fn time_mut(&mut self) -> &mut TimeState {
        &mut self.time
    }

    pub fn schemes(&self) -> &FvSchemes {
        &self.schemes
    }

    pub fn schemes_mut(&mut self) -> &mut FvSchemes {
        &mut self.schemes
    }

    pub fn solution(&self) -> &FvSolution {
        &self.solution
    }

    pub fn solution_mut(&mut self) -> &mut FvSolution {
        &mut self.solution
    }

    /// Fields from another mesh cannot be discretised here.
    pub fn check_mesh(&self, mesh: &FvMesh) -> Result<()> {
        if mesh.generation() != self.mesh.generation() {
            return Err(FvError::Mesh(format!(
                "field on mesh generation {} used with a context on generation {}",
                mesh.generation(),
                self.mesh.generation()
            )));
        }
        Ok(())
    }

    fn spec(&self, category: SchemeCategory, key: &str) -> Result<&str> {
        Ok(self.schemes.lookup(category, key)?)
    }

    pub fn interpolation_scheme(&self, key: &str) -> Result<InterpolationScheme> {
        let spec = self.spec(SchemeCategory::Interpolation, key)?;
        self.interpolation
            .resolve(self.mesh.generation(), spec, InterpolationScheme::new)
    }

    pub fn sn_grad_scheme(&self, key: &str) -> Result<SnGradScheme> {
        let spec = self.spec(SchemeCategory::SnGrad, key)?;
        self.sn_grad.resolve(self.mesh.generation(), spec, SnGradScheme::new)
    }

    pub fn grad_scheme(&self, key: &str) -> Result<GradScheme> {
        let spec = self.spec(SchemeCategory::Grad, key)?;
        self.grad.resolve(self.mesh.generation(), spec, GradScheme::new)
    }

    pub fn ddt_scheme(&self, key: &str) -> Result<DdtScheme> {
        let spec = self.spec(SchemeCategory::Ddt, key)?;
        self.ddt.resolve(self.mesh.generation(), spec, DdtScheme::new)
    }

    pub fn d2dt2_scheme(&self, key: &str) -> Result<D2dt2Scheme> {
        let spec = self.spec(SchemeCategory::D2dt2, key)?;
        self.d2dt2.resolve(self.mesh.generation(), spec, D2dt2Scheme::new)
    }

    pub fn div_scheme(&self, key: &str) -> Result<ConvectionScheme> {
        let spec = self.spec(SchemeCategory::Div, key)?;
        self.div.resolve(self.mesh.generation(), spec, ConvectionScheme::new)
    }

    pub fn laplacian_scheme(&self, key: &str) -> Result<LaplacianScheme> {
        let spec = self.spec(SchemeCategory::Laplacian, key)?;
        self.laplacian
            .resolve(self.mesh.generation(), spec, LaplacianScheme::new)
    }

    pub(crate) fn take_ddt0(&self, key: &str) -> Option<Ddt0State> {
        self.ddt0.borrow_mut().remove(key)
    }

    pub(crate) fn store_ddt0(&self, key: &str, state: Ddt0State) {
        self.ddt0.borrow_mut().insert(key.to_string(), state);
    }
}
