use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use env_logger::{Builder, Target};
use fvx_io::{CaseConfig, FieldSpec, MeshSpec, PatchSpec, save_snapshot};
use fvx_solver::dimensions::{DIM_KINEMATIC_VISCOSITY, DIM_TIME, DIM_VOLUMETRIC_FLUX, DIMLESS};
use fvx_solver::ldu::solvers::{asymmetric_solvers, symmetric_solvers};
use fvx_solver::{
    Coefficient, DimensionSet, Dimensioned, FieldSolverPerformance, FvContext, FvError, FvMatrix,
    FvMesh, Gamma, MeshBuilder, PatchCondition, Result, SurfaceField, TimeState, Vector, VolField,
    fvm, schemes, serial,
};
use log::{LevelFilter, info};

fn usage() {
    eprintln!("usage: fvx schemes");
    eprintln!("       fvx solve <case.json>");
}

fn init_logging() {
    let level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|v| v.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Info);
    Builder::new()
        .filter_level(level)
        .target(Target::Stdout)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {:5}] {}",
                chrono::Local::now().format("%H:%M:%S%.3f"),
                record.level(),
                record.args()
            )
        })
        .init();
}

fn print_schemes() {
    for (dictionary, names) in schemes::registered() {
        println!("{dictionary}: {}", names.join(", "));
    }
    println!("symmetric solvers: {}", symmetric_solvers().names().join(", "));
    println!("asymmetric solvers: {}", asymmetric_solvers().names().join(", "));
}

fn build_mesh(spec: &MeshSpec) -> Result<FvMesh> {
    match *spec {
        MeshSpec::Line { cells, length } => MeshBuilder::line(cells, length, serial()),
        MeshSpec::Rectangle {
            nx,
            ny,
            lx,
            ly,
            shear,
            periodic_x,
        } => MeshBuilder::rectangle(nx, ny, lx, ly, shear, periodic_x, serial()),
    }
}

fn build_field(spec: &FieldSpec, mesh: &Arc<FvMesh>) -> Result<VolField<f64>> {
    let dims = DimensionSet::from_array(spec.dimensions);
    let mut field = VolField::new(&spec.name, mesh, dims, spec.initial);
    for (patch, condition) in &spec.boundary {
        let condition = match *condition {
            PatchSpec::FixedValue { value } => PatchCondition::FixedValue(value),
            PatchSpec::ZeroGradient => PatchCondition::ZeroGradient,
            PatchSpec::FixedGradient { gradient } => PatchCondition::FixedGradient(gradient),
            PatchSpec::Mixed {
                ref_value,
                ref_gradient,
                value_fraction,
            } => PatchCondition::Mixed {
                ref_value,
                ref_gradient,
                value_fraction,
            },
            PatchSpec::Calculated => PatchCondition::Calculated,
            PatchSpec::Cyclic => {
                let coupled = mesh
                    .find_patch(patch)
                    .is_some_and(|p| mesh.patch(p).coupled());
                if !coupled {
                    return Err(FvError::Mesh(format!("patch '{patch}' is not cyclic")));
                }
                continue;
            }
        };
        field.set_condition(patch, condition)?;
    }
    field.correct_boundary_conditions()?;
    Ok(field)
}

/// `ddt(T) + div(phi,T) - laplacian(DT,T) + SuSp(sink,T) == source`
fn assemble(
    ctx: &FvContext,
    case: &CaseConfig,
    phi: Option<&SurfaceField<f64>>,
    t: &VolField<f64>,
) -> Result<FvMatrix<f64>> {
    let dt = Gamma::Uniform(Dimensioned::new("DT", DIM_KINEMATIC_VISCOSITY, case.diffusivity));
    let mut eqn = -fvm::laplacian(ctx, &dt, t)?;
    if !case.time.steady {
        eqn.try_add_assign(&fvm::ddt(ctx, t)?)?;
    }
    if let Some(phi) = phi {
        eqn.try_add_assign(&fvm::div(ctx, phi, t)?)?;
    }
    if case.sink != 0.0 {
        let sink = Coefficient::Uniform(Dimensioned::new("sink", DIMLESS / DIM_TIME, case.sink));
        eqn.try_add_assign(&fvm::su_sp(&sink, t)?)?;
    }
    if case.source != 0.0 {
        let source = Dimensioned::new("source", t.dimensions() / DIM_TIME, case.source);
        eqn = eqn.try_sub_value(&source)?;
    }
    Ok(eqn)
}

fn solve(path: &str) -> Result<FieldSolverPerformance> {
    let case = CaseConfig::from_file(path)?;
    let mesh = Arc::new(build_mesh(&case.mesh)?);
    info!("{}", mesh.statistics().format());

    let mut t = build_field(&case.field, &mesh)?;
    let velocity = Vector::from(case.velocity);
    let phi = (velocity.norm() > 0.0).then(|| {
        SurfaceField::from_face_vectors("phi", &mesh, DIM_VOLUMETRIC_FLUX, |sf| sf.dot(&velocity))
    });

    let (n_steps, delta_t) = if case.time.steady {
        (1, 1.0)
    } else {
        let n = (case.time.end_time / case.time.delta_t).round().max(1.0) as usize;
        (n, case.time.delta_t)
    };
    let mut ctx = FvContext::new(Arc::clone(&mesh), case.schemes.clone(), case.solution.clone())
        .with_time(TimeState::new(0.0, delta_t));

    let mut performance = FieldSolverPerformance::default();
    for _ in 0..n_steps {
        if !case.time.steady {
            t.store_old_time();
        }
        ctx.time_mut().advance(delta_t);
        info!("Time = {}", ctx.time().value);
        let n_outer = case.time.outer_iterations.max(1);
        for outer in 0..n_outer {
            ctx.time_mut().final_iteration = outer + 1 == n_outer;
            let mut eqn = assemble(&ctx, &case, phi.as_ref(), &t)?;
            eqn.relax_auto(&ctx, &t)?;
            t.store_prev_iter();
            performance = eqn.solve(&ctx, &mut t)?;
            t.relax_auto(&ctx)?;
        }
    }

    if let Some(output) = &case.output {
        save_snapshot(output, &t.to_snapshot(ctx.time()))?;
        info!("Wrote {} to {output}", t.name());
    }
    Ok(performance)
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("schemes") if args.len() == 2 => {
            print_schemes();
            ExitCode::SUCCESS
        }
        Some("solve") if args.len() == 3 => {
            init_logging();
            info!("Starting fvx {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));
            match solve(&args[2]) {
                Ok(performance) => match serde_json::to_string_pretty(&performance) {
                    Ok(json) => {
                        println!("{json}");
                        ExitCode::SUCCESS
                    }
                    Err(err) => {
                        eprintln!("error: {err}");
                        ExitCode::from(1)
                    }
                },
                Err(err) => {
                    eprintln!("error: {err}");
                    ExitCode::from(1)
                }
            }
        }
        _ => {
            usage();
            ExitCode::from(2)
        }
    }
}
