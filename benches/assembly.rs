use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use cvflow::algorithm::SolverAlgorithm;
use cvflow::algorithms::{AssembleElemSolverAlgorithm, ScalarDiffElemKernel};
use cvflow::assembly::BatchAssembler;
use cvflow::config::{LinearSolverConfig, PreconditionerType, SolutionOptions};
use cvflow::linear_solver::KrylovMethod;
use cvflow::linear_system::{CsrLinearSystem, LinearSystem};
use cvflow::master_element::MasterElementRepo;
use cvflow::mesh::procedural::{create_rectangular_hex_mesh, BLOCK};
use cvflow::mesh::{FieldState, MeshDatabase};
use cvflow::realm::SolveContext;
use cvflow::time_integrator::TimeState;
use cvflow::topology::EntityRank;
use std::hint::black_box;

fn diffusion_problem(cells: usize) -> eyre::Result<(MeshDatabase, AssembleElemSolverAlgorithm, CsrLinearSystem)> {
    let mut mesh = create_rectangular_hex_mesh([cells; 3], [1.0; 3])?;
    let block = mesh.part_id(BLOCK)?;
    mesh.declare_field_on_parts("temperature", EntityRank::Node, 1, 1, &[block])?;
    mesh.declare_field_on_parts("thermal_conductivity", EntityRank::Node, 1, 1, &[block])?;
    let coords = mesh.coordinates()?.to_vec();
    for (t, x) in mesh
        .field_state_mut("temperature", FieldState::Np1)?
        .iter_mut()
        .zip(coords.chunks_exact(3))
    {
        *t = x[0] * x[1] + x[2];
    }
    mesh.field_state_mut("thermal_conductivity", FieldState::Np1)?
        .fill(1.0);

    let mut algorithm = AssembleElemSolverAlgorithm::new(&[block], 1);
    algorithm.add_kernel(Box::new(ScalarDiffElemKernel::new("temperature", "thermal_conductivity")));

    let solver = LinearSolverConfig {
        name: "solve_scalar".to_string(),
        method: KrylovMethod::Cg,
        preconditioner: PreconditionerType::Jacobi,
        tolerance: 1e-8,
        max_iterations: 1000,
    };
    let mut system = CsrLinearSystem::new("temperature", 1, mesh.num_nodes(), solver);
    algorithm.initialize_connectivity(&mesh, &mut system)?;
    system.finalize_linear_system()?;
    Ok((mesh, algorithm, system))
}

fn elem_assembly_benchmark(c: &mut Criterion) {
    let (mesh, algorithm, mut system) = diffusion_problem(16).unwrap();
    let repo = MasterElementRepo::new();
    let options = SolutionOptions::default();

    let mut group = c.benchmark_group("hex8 scalar diffusion assembly");
    for simd_len in [1, 4, 8, 32] {
        let assembler = BatchAssembler::new(simd_len);
        let ctx = SolveContext {
            time: TimeState::default(),
            repo: &repo,
            assembler: &assembler,
            options: &options,
        };
        group.bench_with_input(BenchmarkId::new("simd_len", simd_len), &simd_len, |b, _| {
            b.iter(|| {
                system.zero_system().unwrap();
                algorithm
                    .execute(black_box(&mesh), &ctx, &mut system)
                    .unwrap();
            })
        });
    }
    group.finish();
}

criterion_group!(benches, elem_assembly_benchmark);
criterion_main!(benches);
