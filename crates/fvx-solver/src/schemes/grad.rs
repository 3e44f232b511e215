//! Cell gradients.

use std::sync::OnceLock;

use fvx_dict::{TokenStream, term_key};
use log::debug;

use crate::context::FvContext;
use crate::dimensions::{DIM_LENGTH, DimensionSet};
use crate::error::{FvError, Result};
use crate::fields::VolField;
use crate::ldu::solvers::{SMALL, VSMALL};
use crate::primitives::{FieldValue, Gradable, Tensor, Vector};
use crate::schemes::{InterpolationScheme, parse_spec};
use crate::selection::RuntimeSelectionTable;

pub type GradConstructor = fn(&mut TokenStream) -> Result<GradScheme>;

#[derive(Debug, Clone, PartialEq)]
pub enum GradScheme {
    /// Green-Gauss: sum of face values times face area over the volume.
    Gauss(InterpolationScheme),
    /// Inverse-distance weighted least-squares fit to the neighbours.
    LeastSquares,
    /// Another gradient limited so that extrapolation to the faces stays
    /// within the neighbour bounds, relaxed by `1/k - 1` of the range.
    CellLimited { inner: Box<GradScheme>, k: f64 },
}

impl GradScheme {
    pub fn new(spec: &str) -> Result<Self> {
        parse_spec(spec, Self::from_tokens)
    }

    pub fn from_tokens(tokens: &mut TokenStream) -> Result<Self> {
        let name = tokens.next_word()?;
        grad_schemes().lookup(&name)?(tokens)
    }

    pub fn name(&self) -> &'static str {
        match self {
            GradScheme::Gauss(_) => "Gauss",
            GradScheme::LeastSquares => "leastSquares",
            GradScheme::CellLimited { .. } => "cellLimited",
        }
    }

    /// Gradient of `vf` with boundary values consistent with the patch
    /// normal gradients.
    pub fn grad<T: Gradable>(&self, ctx: &FvContext, vf: &VolField<T>) -> Result<VolField<T::Grad>> {
        let name = term_key("grad", &[vf.name()]);
        let dims = vf.dimensions() / DIM_LENGTH;
        let internal = self.cell_grad(ctx, vf)?;
        corrected_grad(&name, vf, dims, internal)
    }

    fn cell_grad<T: Gradable>(&self, ctx: &FvContext, vf: &VolField<T>) -> Result<Vec<T::Grad>> {
        match self {
            GradScheme::Gauss(interpolation) => {
                let face = interpolation.interpolate(ctx, vf, None)?;
                let mesh = vf.mesh();
                let mut g = vec![T::Grad::zero(); mesh.n_cells()];
                for (f, (&o, &n)) in mesh.owner().iter().zip(mesh.neighbour()).enumerate() {
                    let flux = T::outer(&mesh.sf()[f], &face.internal()[f]);
                    g[o] += flux;
                    g[n] -= flux;
                }
                for (p, patch) in mesh.patches().iter().enumerate() {
                    for (i, &c) in patch.face_cells().iter().enumerate() {
                        g[c] += T::outer(&patch.sf()[i], &face.boundary(p)[i]);
                    }
                }
                for (gc, v) in g.iter_mut().zip(mesh.v()) {
                    *gc = *gc * (1.0 / v);
                }
                Ok(g)
            }
            GradScheme::LeastSquares => least_squares(vf),
            GradScheme::CellLimited { inner, k } => {
                let g = inner.cell_grad(ctx, vf)?;
                if *k <= 0.0 {
                    return Ok(g);
                }
                Ok(cell_limit(vf, &g, *k))
            }
        }
    }
}

/// Builds the gradient field and replaces the values on physical patches
/// by the cell gradient with its normal part swapped for the patch normal
/// gradient.
fn corrected_grad<T: Gradable>(
    name: &str,
    vf: &VolField<T>,
    dims: DimensionSet,
    internal: Vec<T::Grad>,
) -> Result<VolField<T::Grad>> {
    let mesh = vf.mesh();
    let mut g = VolField::from_internal(name, mesh, dims, internal)?;
    g.correct_boundary_conditions()?;
    for (p, patch) in mesh.patches().iter().enumerate() {
        if patch.coupled() {
            continue;
        }
        let sn = vf.patch_field(p).sn_grad(patch, vf.internal());
        let cell_grads = g.patch_internal(p);
        let values: Vec<T::Grad> = (0..patch.size())
            .map(|i| {
                let n = patch.nf(i);
                let gc = cell_grads[i];
                gc + T::outer(&n, &(sn[i] - T::dot_grad(&n, &gc)))
            })
            .collect();
        g.patch_field_mut(p).values_mut().copy_from_slice(&values);
    }
    Ok(g)
}

fn least_squares<T: Gradable>(vf: &VolField<T>) -> Result<Vec<T::Grad>> {
    let mesh = vf.mesh();
    let c = mesh.c();
    let values = vf.internal();

    let mut dd = vec![Tensor::zeros(); mesh.n_cells()];
    for (&o, &n) in mesh.owner().iter().zip(mesh.neighbour()) {
        let d = c[n] - c[o];
        let wdd = d * d.transpose() / d.norm_squared();
        dd[o] += wdd;
        dd[n] += wdd;
    }
    for patch in mesh.patches() {
        for (d, &cell) in patch.delta().iter().zip(patch.face_cells()) {
            dd[cell] += d * d.transpose() / d.norm_squared();
        }
    }

    // Directions with no neighbours (the empty directions of 1-D and 2-D
    // meshes) get a unit entry so the matrix stays invertible.
    let mut inv_dd = Vec::with_capacity(dd.len());
    for (cell, mut m) in dd.into_iter().enumerate() {
        for k in 0..3 {
            if m[(k, k)].abs() < SMALL {
                m[(k, k)] = 1.0;
            }
        }
        let inv = m.try_inverse().ok_or_else(|| {
            FvError::Mesh(format!("singular least-squares matrix in cell {cell}"))
        })?;
        inv_dd.push(inv);
    }

    let weighted = |inv: &Tensor, d: &Vector| -> Vector { inv * d / d.norm_squared() };

    let mut g = vec![T::Grad::zero(); mesh.n_cells()];
    for (&o, &n) in mesh.owner().iter().zip(mesh.neighbour()) {
        let d = c[n] - c[o];
        let delta = values[n] - values[o];
        g[o] += T::outer(&weighted(&inv_dd[o], &d), &delta);
        g[n] += T::outer(&weighted(&inv_dd[n], &d), &delta);
    }
    for (p, patch) in mesh.patches().iter().enumerate() {
        let pf = vf.patch_field(p);
        let far: &[T] = match pf.neighbour_values() {
            Some(nbr) if patch.coupled() => nbr,
            _ => pf.values(),
        };
        for (i, &cell) in patch.face_cells().iter().enumerate() {
            let d = patch.delta()[i];
            let delta = far[i] - values[cell];
            g[cell] += T::outer(&weighted(&inv_dd[cell], &d), &delta);
        }
    }
    Ok(g)
}

fn cmpt_max<T: FieldValue>(a: &T, b: &T) -> T {
    let mut out = *a;
    for c in 0..T::N_COMPONENTS {
        out.set_component(c, a.component(c).max(b.component(c)));
    }
    out
}

fn cmpt_min<T: FieldValue>(a: &T, b: &T) -> T {
    let mut out = *a;
    for c in 0..T::N_COMPONENTS {
        out.set_component(c, a.component(c).min(b.component(c)));
    }
    out
}

fn limit_face<T: FieldValue>(limiter: &mut T, max: &T, min: &T, extrapolate: &T) {
    for c in 0..T::N_COMPONENTS {
        let (e, hi, lo) = (extrapolate.component(c), max.component(c), min.component(c));
        let l = limiter.component(c);
        if e > hi + VSMALL {
            limiter.set_component(c, l.min(hi / e));
        } else if e < lo - VSMALL {
            limiter.set_component(c, l.min(lo / e));
        }
    }
}

fn cell_limit<T: Gradable>(vf: &VolField<T>, grad: &[T::Grad], k: f64) -> Vec<T::Grad> {
    let mesh = vf.mesh();
    let values = vf.internal();
    let (owner, neighbour) = (mesh.owner(), mesh.neighbour());
    let (c, cf) = (mesh.c(), mesh.cf());

    let mut max = values.to_vec();
    let mut min = values.to_vec();
    for (&o, &n) in owner.iter().zip(neighbour) {
        max[o] = cmpt_max(&max[o], &values[n]);
        min[o] = cmpt_min(&min[o], &values[n]);
        max[n] = cmpt_max(&max[n], &values[o]);
        min[n] = cmpt_min(&min[n], &values[o]);
    }
    for (p, patch) in mesh.patches().iter().enumerate() {
        let pf = vf.patch_field(p);
        let far: &[T] = match pf.neighbour_values() {
            Some(nbr) if patch.coupled() => nbr,
            _ => pf.values(),
        };
        for (i, &cell) in patch.face_cells().iter().enumerate() {
            max[cell] = cmpt_max(&max[cell], &far[i]);
            min[cell] = cmpt_min(&min[cell], &far[i]);
        }
    }

    for ((hi, lo), v) in max.iter_mut().zip(min.iter_mut()).zip(values) {
        *hi -= *v;
        *lo -= *v;
        if k < 1.0 {
            let spread = (*hi - *lo) * (1.0 / k - 1.0);
            *hi += spread;
            *lo -= spread;
        }
    }

    let mut limiter = vec![T::one(); mesh.n_cells()];
    for (f, (&o, &n)) in owner.iter().zip(neighbour).enumerate() {
        let ext_o = T::dot_grad(&(cf[f] - c[o]), &grad[o]);
        limit_face(&mut limiter[o], &max[o], &min[o], &ext_o);
        let ext_n = T::dot_grad(&(cf[f] - c[n]), &grad[n]);
        limit_face(&mut limiter[n], &max[n], &min[n], &ext_n);
    }
    for patch in mesh.patches() {
        for (i, &cell) in patch.face_cells().iter().enumerate() {
            let ext = T::dot_grad(&(patch.cf()[i] - c[cell]), &grad[cell]);
            limit_face(&mut limiter[cell], &max[cell], &min[cell], &ext);
        }
    }

    if log::log_enabled!(log::Level::Debug) {
        let all: Vec<f64> = limiter
            .iter()
            .flat_map(|l| (0..T::N_COMPONENTS).map(move |c| l.component(c)))
            .collect();
        let lo = all.iter().copied().fold(f64::INFINITY, f64::min);
        let avg = all.iter().sum::<f64>() / all.len().max(1) as f64;
        debug!("Gradient limiter for {}: min {lo} average {avg}", vf.name());
    }

    grad.iter()
        .zip(&limiter)
        .map(|(g, l)| T::limit_grad(g, l))
        .collect()
}

fn gauss(tokens: &mut TokenStream) -> Result<GradScheme> {
    let interpolation = if tokens.is_empty() {
        InterpolationScheme::Linear
    } else {
        InterpolationScheme::from_tokens(tokens)?
    };
    if interpolation.needs_flux() {
        return Err(FvError::BadSchemeSpec(format!(
            "Gauss gradient cannot use flux-dependent interpolation '{}'",
            interpolation.name()
        )));
    }
    Ok(GradScheme::Gauss(interpolation))
}

fn least_squares_ctor(_: &mut TokenStream) -> Result<GradScheme> {
    Ok(GradScheme::LeastSquares)
}

fn cell_limited(tokens: &mut TokenStream) -> Result<GradScheme> {
    let inner = GradScheme::from_tokens(tokens)?;
    let k = tokens.next_scalar()?;
    if !(0.0..=1.0).contains(&k) {
        return Err(FvError::BadSchemeSpec(format!(
            "cellLimited coefficient {k} is outside [0, 1]"
        )));
    }
    Ok(GradScheme::CellLimited {
        inner: Box::new(inner),
        k,
    })
}

pub fn grad_schemes() -> &'static RuntimeSelectionTable<GradConstructor> {
    static TABLE: OnceLock<RuntimeSelectionTable<GradConstructor>> = OnceLock::new();
    TABLE.get_or_init(|| {
        RuntimeSelectionTable::<GradConstructor>::new("grad scheme")
            .register("Gauss", gauss)
            .register("leastSquares", least_squares_ctor)
            .register("cellLimited", cell_limited)
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use fvx_io::{FvSchemes, FvSolution};

    use super::*;
    use crate::dimensions::DIM_TEMPERATURE;
    use crate::fields::PatchCondition;
    use crate::mesh::{FvMesh, MeshBuilder};
    use crate::parallel::serial;

    fn ctx(mesh: &Arc<FvMesh>) -> FvContext {
        FvContext::new(Arc::clone(mesh), FvSchemes::default(), FvSolution::default())
    }

    /// `a.x + b.y` with the exact value on every physical patch face.
    fn planar(mesh: &Arc<FvMesh>, a: f64, b: f64) -> VolField<f64> {
        let f = |x: &Vector| a * x.x + b * x.y;
        let mut vf = VolField::from_internal("T", mesh, DIM_TEMPERATURE, mesh.c().iter().map(f).collect())
            .unwrap();
        for (p, patch) in mesh.patches().iter().enumerate() {
            let values: Vec<f64> = patch.cf().iter().map(f).collect();
            vf.patch_field_mut(p).values_mut().copy_from_slice(&values);
        }
        vf
    }

    #[test]
    fn parses_nested_specifications() {
        assert_eq!(
            GradScheme::new("Gauss linear").unwrap(),
            GradScheme::Gauss(InterpolationScheme::Linear)
        );
        assert_eq!(
            GradScheme::new("cellLimited leastSquares 1").unwrap(),
            GradScheme::CellLimited {
                inner: Box::new(GradScheme::LeastSquares),
                k: 1.0
            }
        );
        assert!(matches!(
            GradScheme::new("cellLimited Gauss linear 2"),
            Err(FvError::BadSchemeSpec(_))
        ));
        assert!(GradScheme::new("Gauss upwind").is_err());
    }

    #[test]
    fn gauss_linear_is_exact_on_uniform_line() {
        let mesh = Arc::new(MeshBuilder::line(5, 5.0, serial()).unwrap());
        let vf = VolField::from_internal("T", &mesh, DIM_TEMPERATURE, mesh.c().iter().map(|c| 2.0 * c.x).collect())
            .unwrap()
            .with_condition("left", PatchCondition::FixedValue(0.0))
            .unwrap()
            .with_condition("right", PatchCondition::FixedValue(10.0))
            .unwrap();
        let g = GradScheme::new("Gauss linear").unwrap().grad(&ctx(&mesh), &vf).unwrap();
        assert_eq!(g.name(), "grad(T)");
        assert_eq!(g.dimensions(), DIM_TEMPERATURE / DIM_LENGTH);
        for v in g.internal() {
            assert!((v.x - 2.0).abs() < 1e-12);
        }
        for p in 0..2 {
            assert!((g.patch_field(p).values()[0].x - 2.0).abs() < 1e-12);
        }
    }

    #[test]
    fn least_squares_is_exact_on_sheared_mesh() {
        let mesh = Arc::new(MeshBuilder::rectangle(4, 3, 1.0, 1.0, 0.3, false, serial()).unwrap());
        let vf = planar(&mesh, 1.5, -0.5);
        let g = GradScheme::LeastSquares.grad(&ctx(&mesh), &vf).unwrap();
        for v in g.internal() {
            assert!((v - Vector::new(1.5, -0.5, 0.0)).norm() < 1e-10, "{v}");
        }
    }

    #[test]
    fn cell_limiter_flattens_gradient_at_a_step() {
        let mesh = Arc::new(MeshBuilder::line(4, 4.0, serial()).unwrap());
        let vf = VolField::from_internal("T", &mesh, DIM_TEMPERATURE, vec![0.0, 0.0, 1.0, 1.0])
            .unwrap()
            .with_condition("left", PatchCondition::ZeroGradient)
            .unwrap()
            .with_condition("right", PatchCondition::ZeroGradient)
            .unwrap();
        let c = ctx(&mesh);
        let raw = GradScheme::new("Gauss linear").unwrap().grad(&c, &vf).unwrap();
        assert!((raw.internal()[1].x - 0.5).abs() < 1e-12);

        let limited = GradScheme::new("cellLimited Gauss linear 1")
            .unwrap()
            .grad(&c, &vf)
            .unwrap();
        assert_eq!(limited.internal()[1].x, 0.0);
        assert_eq!(limited.internal()[2].x, 0.0);

        let relaxed = GradScheme::new("cellLimited Gauss linear 0")
            .unwrap()
            .grad(&c, &vf)
            .unwrap();
        assert_eq!(relaxed.internal(), raw.internal());
    }
}
