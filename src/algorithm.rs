//! Algorithm contracts and the drivers that own algorithms per [`AlgorithmType`].
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt::Debug;

use log::debug;

use crate::error::Result;
use crate::linear_system::LinearSystem;
use crate::mesh::{MeshDatabase, PartId};
use crate::realm::SolveContext;

/// Key of the algorithm maps of an equation system.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AlgorithmType {
    Interior,
    Wall,
    WallHeatFlux,
    Mass,
}

/// A non-solver algorithm: writes fields, never touches a linear system.
pub trait Algorithm: Debug + Send + Sync {
    fn parts(&self) -> &[PartId];

    fn add_parts(&mut self, parts: &[PartId]);

    fn execute(&mut self, mesh: &mut MeshDatabase, ctx: &SolveContext) -> Result<()>;
}

/// An algorithm that assembles contributions into a linear system.
pub trait SolverAlgorithm: Debug + Send + Sync {
    fn parts(&self) -> &[PartId];

    fn add_parts(&mut self, parts: &[PartId]);

    /// Adds the matrix graph this algorithm needs to `system`.
    fn initialize_connectivity(&self, mesh: &MeshDatabase, system: &mut dyn LinearSystem) -> Result<()>;

    fn execute(&self, mesh: &MeshDatabase, ctx: &SolveContext, system: &mut dyn LinearSystem) -> Result<()>;
}

pub(crate) fn extend_parts(parts: &mut Vec<PartId>, new_parts: &[PartId]) {
    for &part in new_parts {
        if !parts.contains(&part) {
            parts.push(part);
        }
    }
}

/// Looks up `algorithm_type` in `map` and extends the existing algorithm with `parts`, or builds
/// a new one with `build` on first registration.
fn build_or_extend<A: ?Sized, F>(
    map: &mut BTreeMap<AlgorithmType, Box<A>>,
    algorithm_type: AlgorithmType,
    parts: &[PartId],
    build: F,
    add_parts: impl FnOnce(&mut A, &[PartId]),
) -> Result<()>
where
    F: FnOnce(&[PartId]) -> Result<Box<A>>,
{
    match map.entry(algorithm_type) {
        Entry::Occupied(mut existing) => add_parts(existing.get_mut().as_mut(), parts),
        Entry::Vacant(slot) => {
            debug!("building {:?} algorithm on parts {:?}", algorithm_type, parts);
            slot.insert(build(parts)?);
        }
    }
    Ok(())
}

/// Runs non-solver algorithms in the order of their type.
#[derive(Debug, Default)]
pub struct AlgorithmDriver {
    algorithms: BTreeMap<AlgorithmType, Box<dyn Algorithm>>,
}

impl AlgorithmDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build_or_extend<F>(&mut self, algorithm_type: AlgorithmType, parts: &[PartId], build: F) -> Result<()>
    where
        F: FnOnce(&[PartId]) -> Result<Box<dyn Algorithm>>,
    {
        build_or_extend(&mut self.algorithms, algorithm_type, parts, build, |a, p| a.add_parts(p))
    }

    pub fn get(&self, algorithm_type: AlgorithmType) -> Option<&dyn Algorithm> {
        self.algorithms.get(&algorithm_type).map(|a| a.as_ref())
    }

    pub fn len(&self) -> usize {
        self.algorithms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.algorithms.is_empty()
    }

    pub fn execute(&mut self, mesh: &mut MeshDatabase, ctx: &SolveContext) -> Result<()> {
        for algorithm in self.algorithms.values_mut() {
            algorithm.execute(mesh, ctx)?;
        }
        Ok(())
    }
}

/// Owns the solver algorithms of one equation system.
///
/// Solver algorithms run first, Dirichlet algorithms afterwards so that they see and overwrite
/// the fully assembled rows.
#[derive(Debug, Default)]
pub struct SolverAlgorithmDriver {
    solver_algorithms: BTreeMap<AlgorithmType, Box<dyn SolverAlgorithm>>,
    dirichlet_algorithms: BTreeMap<AlgorithmType, Box<dyn SolverAlgorithm>>,
}

impl SolverAlgorithmDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build_or_extend_solver<F>(&mut self, algorithm_type: AlgorithmType, parts: &[PartId], build: F) -> Result<()>
    where
        F: FnOnce(&[PartId]) -> Result<Box<dyn SolverAlgorithm>>,
    {
        build_or_extend(&mut self.solver_algorithms, algorithm_type, parts, build, |a, p| {
            a.add_parts(p)
        })
    }

    pub fn build_or_extend_dirichlet<F>(
        &mut self,
        algorithm_type: AlgorithmType,
        parts: &[PartId],
        build: F,
    ) -> Result<()>
    where
        F: FnOnce(&[PartId]) -> Result<Box<dyn SolverAlgorithm>>,
    {
        build_or_extend(&mut self.dirichlet_algorithms, algorithm_type, parts, build, |a, p| {
            a.add_parts(p)
        })
    }

    pub fn solver_algorithm(&self, algorithm_type: AlgorithmType) -> Option<&dyn SolverAlgorithm> {
        self.solver_algorithms
            .get(&algorithm_type)
            .map(|a| a.as_ref())
    }

    pub fn dirichlet_algorithm(&self, algorithm_type: AlgorithmType) -> Option<&dyn SolverAlgorithm> {
        self.dirichlet_algorithms
            .get(&algorithm_type)
            .map(|a| a.as_ref())
    }

    pub fn num_solver_algorithms(&self) -> usize {
        self.solver_algorithms.len()
    }

    pub fn num_dirichlet_algorithms(&self) -> usize {
        self.dirichlet_algorithms.len()
    }

    pub fn initialize_connectivity(&self, mesh: &MeshDatabase, system: &mut dyn LinearSystem) -> Result<()> {
        for algorithm in self
            .solver_algorithms
            .values()
            .chain(self.dirichlet_algorithms.values())
        {
            algorithm.initialize_connectivity(mesh, system)?;
        }
        Ok(())
    }

    /// Zeroes the system, then assembles all solver and Dirichlet contributions.
    pub fn execute(&self, mesh: &MeshDatabase, ctx: &SolveContext, system: &mut dyn LinearSystem) -> Result<()> {
        system.zero_system()?;
        for algorithm in self.solver_algorithms.values() {
            algorithm.execute(mesh, ctx, system)?;
        }
        for algorithm in self.dirichlet_algorithms.values() {
            algorithm.execute(mesh, ctx, system)?;
        }
        Ok(())
    }
}
