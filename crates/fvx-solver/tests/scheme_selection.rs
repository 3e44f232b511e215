//! Scheme lookup from fvSchemes and corrected gradients across cyclic
//! patches.

use std::sync::Arc;

use fvx_io::{FvSchemes, FvSolution, SchemeCategory};
use fvx_solver::dimensions::DIM_TEMPERATURE;
use fvx_solver::{FvContext, FvError, MeshBuilder, PatchCondition, VolField, fvc, fvm, serial};

#[test]
fn test_unknown_scheme_lists_valid_names() {
    let mesh = Arc::new(MeshBuilder::line(3, 1.0, serial()).expect("mesh"));
    let schemes = FvSchemes::default().with(SchemeCategory::Ddt, "default", "Eulr");
    let ctx = FvContext::new(Arc::clone(&mesh), schemes, FvSolution::default());
    let t = VolField::new("T", &mesh, DIM_TEMPERATURE, 1.0);

    let err = fvm::ddt(&ctx, &t).unwrap_err();
    match &err {
        FvError::UnknownSelection {
            category,
            name,
            valid,
        } => {
            assert_eq!(category, "ddt scheme");
            assert_eq!(name, "Eulr");
            assert_eq!(valid, &["CrankNicolson", "Euler", "backward", "steadyState"]);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(err.to_string().contains("CrankNicolson Euler backward steadyState"));
}

#[test]
fn test_default_none_requires_explicit_entry() {
    let mesh = Arc::new(MeshBuilder::line(3, 1.0, serial()).expect("mesh"));
    let schemes = FvSchemes::default()
        .with(SchemeCategory::Laplacian, "default", "none")
        .with(SchemeCategory::Laplacian, "laplacian(DT,T)", "Gauss linear uncorrected");
    let ctx = FvContext::new(Arc::clone(&mesh), schemes, FvSolution::default());
    let t = VolField::new("T", &mesh, DIM_TEMPERATURE, 1.0)
        .with_condition("left", PatchCondition::FixedValue(0.0))
        .expect("left");

    match fvc::laplacian_unit(&ctx, &t) {
        Err(FvError::MissingEntry { dictionary, key }) => {
            assert_eq!(dictionary, "laplacianSchemes");
            assert_eq!(key, "laplacian(T)");
        }
        other => panic!("unexpected result {other:?}"),
    }
}

#[test]
fn test_malformed_specification_is_rejected() {
    let mesh = Arc::new(MeshBuilder::line(3, 1.0, serial()).expect("mesh"));
    let schemes = FvSchemes::default().with(SchemeCategory::Ddt, "default", "CrankNicolson");
    let ctx = FvContext::new(Arc::clone(&mesh), schemes, FvSolution::default());
    let t = VolField::new("T", &mesh, DIM_TEMPERATURE, 1.0);
    assert!(matches!(fvm::ddt(&ctx, &t), Err(FvError::BadSchemeSpec(_))));
}

#[test]
fn test_corrected_sn_grad_is_exact_across_cyclic_faces() {
    let mesh = Arc::new(MeshBuilder::rectangle(4, 4, 2.0, 1.0, 0.4, true, serial()).expect("mesh"));
    let schemes = FvSchemes::default()
        .with(SchemeCategory::Grad, "default", "Gauss linear")
        .with(SchemeCategory::SnGrad, "default", "corrected");
    let mut ctx = FvContext::new(Arc::clone(&mesh), schemes, FvSolution::default());

    // Periodic in x and linear in y.
    let values = mesh.c().iter().map(|c| c.y).collect();
    let mut t = VolField::from_internal("T", &mesh, DIM_TEMPERATURE, values)
        .expect("field")
        .with_condition("bottom", PatchCondition::FixedValue(0.0))
        .expect("bottom")
        .with_condition("top", PatchCondition::FixedValue(1.0))
        .expect("top");
    t.correct_boundary_conditions().expect("boundary update");

    let left = mesh.find_patch("left").expect("left patch");
    let sn = fvc::sn_grad(&ctx, &t).expect("snGrad");
    for (i, v) in sn.boundary(left).iter().enumerate() {
        let exact = mesh.patch(left).nf(i).y;
        assert!(exact.abs() > 0.1);
        assert!((v - exact).abs() < 1e-10, "face {i}: {v} vs {exact}");
    }

    ctx.schemes_mut()
        .category_mut(SchemeCategory::SnGrad)
        .insert("default".to_string(), "uncorrected".to_string());
    let plain = fvc::sn_grad(&ctx, &t).expect("snGrad");
    assert!(plain.boundary(left).iter().all(|v| v.abs() < 1e-12));
}

#[test]
fn test_context_follows_mesh_replacement() {
    let first = Arc::new(MeshBuilder::line(3, 1.0, serial()).expect("mesh"));
    let second = Arc::new(MeshBuilder::line(6, 1.0, serial()).expect("mesh"));
    let schemes = FvSchemes::default().with(SchemeCategory::Laplacian, "default", "Gauss linear uncorrected");
    let mut ctx = FvContext::new(Arc::clone(&first), schemes, FvSolution::default());

    let t = VolField::new("T", &second, DIM_TEMPERATURE, 1.0);
    assert!(matches!(fvm::laplacian_unit(&ctx, &t), Err(FvError::Mesh(_))));

    ctx.set_mesh(Arc::clone(&second));
    let m = fvm::laplacian_unit(&ctx, &t).expect("laplacian");
    assert_eq!(m.diag().len(), 6);
}
