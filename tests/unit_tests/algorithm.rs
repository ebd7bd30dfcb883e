use cvflow::algorithm::{Algorithm, AlgorithmDriver, AlgorithmType, SolverAlgorithm, SolverAlgorithmDriver};
use cvflow::algorithms::{
    AssembleScalarFluxBcSolverAlgorithm, ConstantAuxFunction, CopyFieldAlgorithm, DirichletBc, FluxLocation,
};
use cvflow::mesh::procedural::create_rectangular_quad_mesh_2d;
use cvflow::mesh::FieldState;

#[test]
fn two_parts_under_one_type_share_one_algorithm() {
    let mesh = create_rectangular_quad_mesh_2d([2, 2], [1.0, 1.0]).unwrap();
    let (left, right) = (mesh.part_id("left").unwrap(), mesh.part_id("right").unwrap());

    let mut driver = SolverAlgorithmDriver::new();
    let mut builds = 0;
    for part in [left, right] {
        driver
            .build_or_extend_dirichlet(AlgorithmType::Wall, &[part], |parts| {
                builds += 1;
                Ok(Box::new(DirichletBc::new(parts, "temperature", "temperature_bc", 0, 1)))
            })
            .unwrap();
    }
    assert_eq!(builds, 1);
    assert_eq!(driver.num_dirichlet_algorithms(), 1);
    assert_eq!(driver.num_solver_algorithms(), 0);
    let algorithm = driver.dirichlet_algorithm(AlgorithmType::Wall).unwrap();
    assert_eq!(algorithm.parts(), &[left, right]);
}

#[test]
fn extending_with_a_known_part_does_not_duplicate_it() {
    let mesh = create_rectangular_quad_mesh_2d([2, 2], [1.0, 1.0]).unwrap();
    let top = mesh.part_id("top").unwrap();

    let mut driver = SolverAlgorithmDriver::new();
    for _ in 0..2 {
        driver
            .build_or_extend_solver(AlgorithmType::WallHeatFlux, &[top], |parts| {
                Ok(Box::new(AssembleScalarFluxBcSolverAlgorithm::new(
                    parts,
                    "heat_flux_bc",
                    FluxLocation::Node,
                )))
            })
            .unwrap();
    }
    let algorithm = driver.solver_algorithm(AlgorithmType::WallHeatFlux).unwrap();
    assert_eq!(algorithm.parts(), &[top]);
}

#[test]
fn solver_and_dirichlet_maps_are_separate() {
    let mesh = create_rectangular_quad_mesh_2d([1, 1], [1.0, 1.0]).unwrap();
    let left = mesh.part_id("left").unwrap();
    let mut driver = SolverAlgorithmDriver::new();
    driver
        .build_or_extend_solver(AlgorithmType::Wall, &[left], |parts| {
            Ok(Box::new(AssembleScalarFluxBcSolverAlgorithm::new(parts, "q", FluxLocation::Face)))
        })
        .unwrap();
    driver
        .build_or_extend_dirichlet(AlgorithmType::Wall, &[left], |parts| {
            Ok(Box::new(DirichletBc::new(parts, "t", "t_bc", 0, 1)))
        })
        .unwrap();
    assert_eq!(driver.num_solver_algorithms(), 1);
    assert_eq!(driver.num_dirichlet_algorithms(), 1);
}

#[test]
fn non_solver_driver_extends_by_type() {
    let mut driver = AlgorithmDriver::new();
    for part in [0, 1, 0] {
        driver
            .build_or_extend(AlgorithmType::Wall, &[part], |parts| {
                Ok(Box::new(CopyFieldAlgorithm::new(
                    parts,
                    ("a", FieldState::Np1),
                    ("b", FieldState::Np1),
                    0,
                    1,
                )))
            })
            .unwrap();
    }
    assert_eq!(driver.len(), 1);
    assert_eq!(driver.get(AlgorithmType::Wall).unwrap().parts(), &[0, 1]);
}

#[test]
fn constant_function_checks_its_component_range() {
    assert!(ConstantAuxFunction::new(0, 2, vec![1.0, 2.0]).is_ok());
    assert!(ConstantAuxFunction::new(0, 2, vec![1.0]).is_err());
    assert!(ConstantAuxFunction::new(2, 1, vec![]).is_err());
}
