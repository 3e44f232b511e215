//! Steady diffusion with a uniform source on 1-D meshes, serial and
//! decomposed.

use std::sync::Arc;

use fvx_io::{FvSchemes, FvSolution, SchemeCategory, SolverControls};
use fvx_solver::dimensions::{DIM_AREA, DIM_TEMPERATURE, DIMLESS};
use fvx_solver::{
    Dimensioned, FvContext, FvMesh, Gamma, MeshBuilder, PatchCondition, VolField, fvm, run_ranks,
    serial,
};

const SOURCE: f64 = 2.0;

fn solution() -> FvSolution {
    FvSolution::default().with_solver(
        "T",
        SolverControls::new("PCG")
            .with_preconditioner("DIC")
            .with_tolerance(1e-13, 0.0)
            .with_max_iter(1000),
    )
}

/// Solves `-laplacian(1, T) == SOURCE` with `T = 0` at both ends.
fn solve_parabola(mesh: &Arc<FvMesh>, laplacian: &str) -> VolField<f64> {
    let schemes = FvSchemes::default()
        .with(SchemeCategory::Laplacian, "default", laplacian)
        .with(SchemeCategory::Grad, "default", "Gauss linear");
    let ctx = FvContext::new(Arc::clone(mesh), schemes, solution());
    let mut t = VolField::new("T", mesh, DIM_TEMPERATURE, 0.0)
        .with_condition("left", PatchCondition::FixedValue(0.0))
        .expect("left patch")
        .with_condition("right", PatchCondition::FixedValue(0.0))
        .expect("right patch");
    t.correct_boundary_conditions().expect("boundary update");

    let unit = Gamma::Uniform(Dimensioned::new("1", DIMLESS, 1.0));
    let source = Dimensioned::new("S", DIM_TEMPERATURE / DIM_AREA, SOURCE);
    let mut eqn = (-fvm::laplacian(&ctx, &unit, &t).expect("laplacian")).equals_value(&source);
    let performance = eqn.solve(&ctx, &mut t).expect("solve");
    assert!(!performance.components[0].singular);
    t
}

fn max_error(mesh: &FvMesh, t: &VolField<f64>) -> f64 {
    mesh.c()
        .iter()
        .zip(t.internal())
        .map(|(c, v)| (v - 0.5 * SOURCE * c.x * (1.0 - c.x)).abs())
        .fold(0.0, f64::max)
}

#[test]
fn test_parabolic_profile_converges_second_order() {
    let mut errors = Vec::new();
    for n in [10, 20, 40] {
        let mesh = Arc::new(MeshBuilder::line(n, 1.0, serial()).expect("line mesh"));
        let t = solve_parabola(&mesh, "Gauss linear corrected");
        let h = 1.0 / n as f64;
        let err = max_error(&mesh, &t);
        assert!(err < SOURCE * h * h / 4.0, "n = {n}: error {err}");
        errors.push(err);
    }
    for pair in errors.windows(2) {
        let ratio = pair[0] / pair[1];
        assert!((3.5..4.5).contains(&ratio), "refinement ratio {ratio}");
    }
}

#[test]
fn test_decomposed_solve_matches_serial() {
    const N: usize = 16;
    let mesh = Arc::new(MeshBuilder::line(N, 1.0, serial()).expect("serial mesh"));
    let reference = solve_parabola(&mesh, "Gauss linear uncorrected");

    let pieces = run_ranks(3, |comm| {
        let mesh = Arc::new(MeshBuilder::line_decomposed(N, 1.0, comm).expect("rank mesh"));
        let t = solve_parabola(&mesh, "Gauss linear uncorrected");
        mesh.c()
            .iter()
            .map(|c| c.x)
            .zip(t.internal().iter().copied())
            .collect::<Vec<_>>()
    })
    .expect("ranks");

    let h = 1.0 / N as f64;
    let mut seen = 0;
    for (x, value) in pieces.into_iter().flatten() {
        let cell = (x / h).floor() as usize;
        let expected = reference.internal()[cell];
        assert!(
            (value - expected).abs() < 1e-7,
            "cell {cell}: {value} vs {expected}"
        );
        seen += 1;
    }
    assert_eq!(seen, N);
}
