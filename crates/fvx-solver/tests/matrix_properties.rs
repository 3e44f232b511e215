//! Algebraic properties of assembled equations.

use std::sync::Arc;

use fvx_io::{FvSchemes, FvSolution, SchemeCategory, SolverControls};
use fvx_solver::dimensions::{
    DIM_AREA, DIM_KINEMATIC_VISCOSITY, DIM_TEMPERATURE, DIM_TIME, DIM_VOLUMETRIC_FLUX, DIMLESS,
};
use fvx_solver::{
    Coefficient, Dimensioned, FvContext, FvMatrix, FvMesh, Gamma, MeshBuilder, PatchCondition,
    SurfaceField, TimeState, Vector, VolField, fvc, fvm, serial,
};

fn schemes(div: &str, laplacian: &str) -> FvSchemes {
    FvSchemes::default()
        .with(SchemeCategory::Ddt, "default", "Euler")
        .with(SchemeCategory::Div, "default", div)
        .with(SchemeCategory::Laplacian, "default", laplacian)
        .with(SchemeCategory::Grad, "default", "Gauss linear")
        .with(SchemeCategory::Interpolation, "default", "linear")
}

fn flux(mesh: &Arc<FvMesh>, u: Vector) -> SurfaceField<f64> {
    SurfaceField::from_face_vectors("phi", mesh, DIM_VOLUMETRIC_FLUX, |sf| sf.dot(&u))
}

fn diffusivity(value: f64) -> Gamma<'static> {
    Gamma::Uniform(Dimensioned::new("DT", DIM_KINEMATIC_VISCOSITY, value))
}

/// Transport equation with every kind of term on `mesh`.
fn transport_equation(ctx: &FvContext, t: &VolField<f64>, k: &VolField<f64>) -> FvMatrix<f64> {
    let phi = flux(ctx.mesh(), Vector::new(1.0, 0.4, 0.0));
    fvm::ddt(ctx, t).expect("ddt") + fvm::div(ctx, &phi, t).expect("div")
        - fvm::laplacian(ctx, &diffusivity(0.3), t).expect("laplacian")
        + fvm::su_sp(&Coefficient::Cell(k), t).expect("SuSp")
}

fn scattered_field(mesh: &Arc<FvMesh>) -> VolField<f64> {
    let values = mesh
        .c()
        .iter()
        .map(|c| 1.0 + c.x * c.x - 0.5 * c.y)
        .collect();
    VolField::from_internal("T", mesh, DIM_TEMPERATURE, values).expect("field")
}

fn mixed_sign_rate(mesh: &Arc<FvMesh>) -> VolField<f64> {
    let values = (0..mesh.n_cells())
        .map(|c| if c % 2 == 0 { 2.0 } else { -1.5 })
        .collect();
    VolField::from_internal("k", mesh, DIMLESS / DIM_TIME, values).expect("rate")
}

fn assert_h_a_identity(m: &FvMatrix<f64>, t: &VolField<f64>) {
    let applied = m.apply(t).expect("apply");
    let a = m.a(t).expect("A");
    let h = m.h(t).expect("H");
    for c in 0..t.internal().len() {
        let expected = a.internal()[c] * t.internal()[c] - h.internal()[c];
        let got = applied.internal()[c];
        assert!(
            (got - expected).abs() < 1e-9 * (1.0 + got.abs()),
            "cell {c}: {got} vs {expected}"
        );
    }
}

#[test]
fn test_operator_equals_a_psi_minus_h_on_sheared_mesh() {
    let mesh = Arc::new(MeshBuilder::rectangle(4, 3, 2.0, 1.5, 0.3, false, serial()).expect("mesh"));
    let ctx = FvContext::new(
        Arc::clone(&mesh),
        schemes("Gauss vanLeer", "Gauss linear corrected"),
        FvSolution::default(),
    )
    .with_time(TimeState::new(0.0, 0.1));

    let mut t = scattered_field(&mesh)
        .with_condition("left", PatchCondition::FixedValue(1.0))
        .expect("left")
        .with_condition(
            "right",
            PatchCondition::Mixed {
                ref_value: 2.0,
                ref_gradient: 0.5,
                value_fraction: 0.3,
            },
        )
        .expect("right")
        .with_condition("bottom", PatchCondition::ZeroGradient)
        .expect("bottom")
        .with_condition("top", PatchCondition::FixedGradient(-0.2))
        .expect("top");
    t.correct_boundary_conditions().expect("boundary update");
    t.store_old_time();

    let k = mixed_sign_rate(&mesh);
    let m = transport_equation(&ctx, &t, &k);
    assert!(m.ldu().asymmetric());
    assert_h_a_identity(&m, &t);
}

#[test]
fn test_operator_equals_a_psi_minus_h_with_cyclic_patches() {
    let mesh = Arc::new(MeshBuilder::rectangle(5, 2, 1.0, 1.0, 0.0, true, serial()).expect("mesh"));
    let ctx = FvContext::new(
        Arc::clone(&mesh),
        schemes("Gauss linear", "Gauss linear uncorrected"),
        FvSolution::default(),
    )
    .with_time(TimeState::new(0.0, 0.1));

    let mut t = scattered_field(&mesh)
        .with_condition("bottom", PatchCondition::FixedValue(0.0))
        .expect("bottom")
        .with_condition("top", PatchCondition::ZeroGradient)
        .expect("top");
    t.correct_boundary_conditions().expect("boundary update");

    let k = mixed_sign_rate(&mesh);
    let m = transport_equation(&ctx, &t, &k);
    assert_h_a_identity(&m, &t);
}

#[test]
fn test_su_sp_switches_on_coefficient_sign() {
    let mesh = Arc::new(MeshBuilder::line(2, 2.0, serial()).expect("mesh"));
    let t = VolField::from_internal("T", &mesh, DIM_TEMPERATURE, vec![5.0, 7.0]).expect("field");
    let k = VolField::from_internal("k", &mesh, DIMLESS / DIM_TIME, vec![3.0, -2.0]).expect("rate");

    let m = fvm::su_sp(&Coefficient::Cell(&k), &t).expect("SuSp");
    // Implicit where positive, explicit with the current value otherwise.
    assert_eq!(m.diag(), &[3.0, 0.0]);
    assert_eq!(m.source(), &[0.0, 14.0]);

    let applied = m.apply(&t).expect("apply");
    assert_eq!(applied.internal(), &[15.0, -14.0]);
}

#[test]
#[should_panic(expected = "incompatible dimensions")]
fn test_adding_equations_of_different_dimensions_panics() {
    let mesh = Arc::new(MeshBuilder::line(3, 3.0, serial()).expect("mesh"));
    let ctx = FvContext::new(
        Arc::clone(&mesh),
        schemes("Gauss linear", "Gauss linear uncorrected"),
        FvSolution::default(),
    );
    let t = VolField::new("T", &mesh, DIM_TEMPERATURE, 1.0);
    let _ = fvm::ddt(&ctx, &t).expect("ddt") + fvm::laplacian_unit(&ctx, &t).expect("laplacian");
}

#[test]
fn test_checked_addition_reports_dimension_mismatch() {
    let mesh = Arc::new(MeshBuilder::line(3, 3.0, serial()).expect("mesh"));
    let ctx = FvContext::new(
        Arc::clone(&mesh),
        schemes("Gauss linear", "Gauss linear uncorrected"),
        FvSolution::default(),
    );
    let t = VolField::new("T", &mesh, DIM_TEMPERATURE, 1.0);
    let ddt = fvm::ddt(&ctx, &t).expect("ddt");
    let err = ddt
        .try_add(&fvm::laplacian_unit(&ctx, &t).expect("laplacian"))
        .unwrap_err();
    assert!(err.to_string().contains("incompatible dimensions"), "{err}");
}

fn convection_diffusion() -> (Arc<FvMesh>, FvContext, VolField<f64>) {
    let mesh = Arc::new(MeshBuilder::line(10, 1.0, serial()).expect("mesh"));
    let solution = FvSolution::default().with_solver(
        "T",
        SolverControls::new("PBiCGStab")
            .with_preconditioner("DILU")
            .with_tolerance(1e-13, 0.0)
            .with_max_iter(500),
    );
    let ctx = FvContext::new(
        Arc::clone(&mesh),
        schemes("Gauss upwind", "Gauss linear uncorrected"),
        solution,
    );
    let mut t = VolField::new("T", &mesh, DIM_TEMPERATURE, 0.5)
        .with_condition("left", PatchCondition::FixedValue(1.0))
        .expect("left")
        .with_condition("right", PatchCondition::FixedValue(0.0))
        .expect("right");
    t.correct_boundary_conditions().expect("boundary update");
    (mesh, ctx, t)
}

fn steady_equation(ctx: &FvContext, t: &VolField<f64>) -> FvMatrix<f64> {
    let phi = flux(ctx.mesh(), Vector::new(1.0, 0.0, 0.0));
    fvm::div(ctx, &phi, t).expect("div") - fvm::laplacian(ctx, &diffusivity(0.1), t).expect("laplacian")
}

#[test]
fn test_relaxation_leaves_converged_solution_unchanged() {
    let (_mesh, ctx, mut t) = convection_diffusion();
    let mut eqn = steady_equation(&ctx, &t);
    assert!(eqn.ldu().asymmetric());
    eqn.solve(&ctx, &mut t).expect("solve");
    let converged = t.internal().to_vec();

    for alpha in [0.3, 0.7, 1.0] {
        let mut relaxed = steady_equation(&ctx, &t);
        relaxed.relax(alpha, &t).expect("relax");
        relaxed.solve(&ctx, &mut t).expect("solve");
        for (a, b) in t.internal().iter().zip(&converged) {
            assert!((a - b).abs() < 1e-9, "alpha {alpha}: {a} vs {b}");
        }
    }
}

#[test]
fn test_relaxed_equation_is_diagonally_dominant() {
    let (_mesh, ctx, t) = convection_diffusion();
    let mut eqn = steady_equation(&ctx, &t);
    let before = eqn.diag().to_vec();
    eqn.relax(0.5, &t).expect("relax");
    for (c, (d, d0)) in eqn.diag().iter().zip(&before).enumerate() {
        assert!(*d >= 2.0 * d0 - 1e-12, "cell {c}: {d} < 2 * {d0}");
    }
}

#[test]
fn test_boundary_fluxes_balance_accumulation() {
    let mesh = Arc::new(MeshBuilder::line(8, 1.0, serial()).expect("mesh"));
    let mut fv_schemes = schemes("Gauss linear", "Gauss linear corrected");
    fv_schemes.set_flux_required("T");
    let solution = FvSolution::default().with_solver(
        "T",
        SolverControls::new("PCG")
            .with_preconditioner("DIC")
            .with_tolerance(1e-14, 0.0)
            .with_max_iter(200),
    );
    let mut ctx = FvContext::new(Arc::clone(&mesh), fv_schemes, solution)
        .with_time(TimeState::new(0.0, 0.01));
    let mut t = VolField::new("T", &mesh, DIM_TEMPERATURE, 1.0)
        .with_condition("left", PatchCondition::FixedValue(0.0))
        .expect("left")
        .with_condition("right", PatchCondition::FixedValue(0.0))
        .expect("right");
    t.correct_boundary_conditions().expect("boundary update");

    for _ in 0..3 {
        t.store_old_time();
        ctx.time_mut().advance(0.01);
        let mut eqn = fvm::ddt(&ctx, &t).expect("ddt")
            - fvm::laplacian(&ctx, &diffusivity(0.5), &t).expect("laplacian");
        eqn.solve(&ctx, &mut t).expect("solve");

        let face_flux = eqn.flux(&ctx, &t).expect("flux");
        let outflow: f64 = (0..mesh.patches().len())
            .flat_map(|p| face_flux.boundary(p).iter().copied())
            .sum();
        let rate = fvc::ddt(&ctx, &t).expect("fvc::ddt");
        let accumulation: f64 = rate.internal().iter().zip(mesh.v()).map(|(r, v)| r * v).sum();

        assert!(accumulation < 0.0);
        assert!(
            (accumulation + outflow).abs() < 1e-8,
            "accumulation {accumulation}, outflow {outflow}"
        );
    }
}

/// `-laplacian(1, T) == S` with zero-gradient ends, pinned at `cell`.
fn solve_neumann(cell: usize, reference: f64) -> VolField<f64> {
    const N: usize = 12;
    let mesh = Arc::new(MeshBuilder::line(N, 1.0, serial()).expect("mesh"));
    let solution = FvSolution::default().with_solver(
        "T",
        SolverControls::new("PCG")
            .with_preconditioner("DIC")
            .with_tolerance(1e-14, 0.0)
            .with_max_iter(500),
    );
    let ctx = FvContext::new(
        Arc::clone(&mesh),
        schemes("Gauss linear", "Gauss linear uncorrected"),
        solution,
    );
    let mut t = VolField::new("T", &mesh, DIM_TEMPERATURE, 0.0)
        .with_condition("left", PatchCondition::ZeroGradient)
        .expect("left")
        .with_condition("right", PatchCondition::ZeroGradient)
        .expect("right");
    t.correct_boundary_conditions().expect("boundary update");
    assert!(t.needs_reference().expect("reference check"));

    // Zero net source, so the singular problem is compatible.
    let values = mesh
        .c()
        .iter()
        .map(|c| (std::f64::consts::PI * c.x).cos())
        .collect();
    let source = VolField::from_internal("S", &mesh, DIM_TEMPERATURE / DIM_AREA, values).expect("source");

    let unit = Gamma::Uniform(Dimensioned::new("1", DIMLESS, 1.0));
    let mut eqn = (-fvm::laplacian(&ctx, &unit, &t).expect("laplacian")).equals_field(&source);
    eqn.set_reference(&t, Some(cell), reference, false).expect("reference");
    let performance = eqn.solve(&ctx, &mut t).expect("solve");
    assert!(!performance.components[0].singular);
    t
}

#[test]
fn test_pure_neumann_solve_is_pinned_at_reference_cell() {
    let t = solve_neumann(0, 0.0);
    assert!(t.internal()[0].abs() < 1e-9, "reference cell {}", t.internal()[0]);
    assert!(t.internal().iter().any(|v| v.abs() > 1e-3));

    let shifted = solve_neumann(5, 3.0);
    assert!((shifted.internal()[5] - 3.0).abs() < 1e-9);
    // Same profile, only the level moves.
    let offset = shifted.internal()[0] - t.internal()[0];
    for (a, b) in shifted.internal().iter().zip(t.internal()) {
        assert!((a - b - offset).abs() < 1e-8, "{a} vs {b} + {offset}");
    }
}
