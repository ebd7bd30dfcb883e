use std::fmt::Debug;

use crate::algorithm::{extend_parts, Algorithm};
use crate::error::{CvfemError, Result};
use crate::mesh::{FieldState, MeshDatabase, Ownership, PartId};
use crate::realm::SolveContext;
use crate::topology::EntityRank;

/// A function of space and time evaluated into the components of a field.
pub trait AuxFunction: Debug + Send + Sync {
    /// Writes the components `begin..end` of `out` at the point `coords`.
    fn evaluate(&self, coords: &[f64], time: f64, out: &mut [f64]);
}

/// Constant values for the components `begin..end`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantAuxFunction {
    begin: usize,
    end: usize,
    values: Vec<f64>,
}

impl ConstantAuxFunction {
    pub fn new(begin: usize, end: usize, values: Vec<f64>) -> Result<Self> {
        if end < begin || values.len() != end - begin {
            return Err(CvfemError::configuration(format!(
                "{} constant values for components {}..{}",
                values.len(),
                begin,
                end
            )));
        }
        Ok(Self { begin, end, values })
    }
}

impl AuxFunction for ConstantAuxFunction {
    fn evaluate(&self, _coords: &[f64], _time: f64, out: &mut [f64]) {
        out[self.begin..self.end].copy_from_slice(&self.values);
    }
}

/// Evaluates an [`AuxFunction`] on every node (or face) of its parts.
///
/// Nodes are evaluated at their coordinates, faces at their centroid. All states of the field
/// are written, so that the function also serves as an initial condition.
#[derive(Debug)]
pub struct AuxFunctionAlgorithm {
    parts: Vec<PartId>,
    field: String,
    rank: EntityRank,
    function: Box<dyn AuxFunction>,
}

impl AuxFunctionAlgorithm {
    pub fn new(parts: &[PartId], field: &str, rank: EntityRank, function: Box<dyn AuxFunction>) -> Self {
        Self {
            parts: parts.to_vec(),
            field: field.to_string(),
            rank,
            function,
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }
}

/// Evaluation points and entity indices of the entities of `rank` on `parts`.
fn evaluation_points(mesh: &MeshDatabase, parts: &[PartId], rank: EntityRank) -> Result<Vec<(usize, Vec<f64>)>> {
    let coords = mesh.coordinates()?;
    let dim = mesh.spatial_dim();
    match rank {
        EntityRank::Node => Ok(mesh
            .select_nodes(parts, Ownership::OwnedOrShared)
            .into_iter()
            .map(|n| (n, coords[n * dim..(n + 1) * dim].to_vec()))
            .collect()),
        EntityRank::Face | EntityRank::Element => {
            let mut points = Vec::new();
            for bucket in mesh.buckets(rank, parts, Ownership::All) {
                for &e in &bucket.entities {
                    let nodes = &mesh
                        .entity(rank, e)
                        .ok_or_else(|| CvfemError::precondition("aux function", format!("no {:?} {}", rank, e)))?
                        .nodes;
                    let mut centroid = vec![0.0; dim];
                    for &n in nodes {
                        for d in 0..dim {
                            centroid[d] += coords[n * dim + d] / nodes.len() as f64;
                        }
                    }
                    points.push((e, centroid));
                }
            }
            Ok(points)
        }
    }
}

impl Algorithm for AuxFunctionAlgorithm {
    fn parts(&self) -> &[PartId] {
        &self.parts
    }

    fn add_parts(&mut self, parts: &[PartId]) {
        extend_parts(&mut self.parts, parts);
    }

    fn execute(&mut self, mesh: &mut MeshDatabase, ctx: &SolveContext) -> Result<()> {
        let field = mesh.field(&self.field)?;
        if field.rank() != self.rank {
            return Err(CvfemError::Field(format!(
                "aux function targets {:?} entities but {} lives on {:?}",
                self.rank,
                self.field,
                field.rank()
            )));
        }
        let components = field.components();
        let num_states = field.num_states();
        let points = evaluation_points(mesh, &self.parts, self.rank)?;

        // Components outside of the function's range keep their current value.
        let current = mesh.field_state(&self.field, FieldState::Np1)?;
        let mut evaluated = Vec::with_capacity(points.len());
        for (entity, point) in points {
            let mut values = current[entity * components..(entity + 1) * components].to_vec();
            self.function
                .evaluate(&point, ctx.time.time, &mut values);
            evaluated.push((entity, values));
        }

        let field = mesh.field_mut(&self.field)?;
        for state in [FieldState::Np1, FieldState::N, FieldState::Nm1]
            .into_iter()
            .take(num_states)
        {
            let values = field.state_mut(state)?;
            for (entity, v) in &evaluated {
                values[entity * components..(entity + 1) * components].copy_from_slice(v);
            }
        }
        Ok(())
    }
}

/// Writes constant boundary values into a side-rank field on the faces of its parts.
#[derive(Debug)]
pub struct ConstantBcAuxFunctionAlgorithm {
    inner: AuxFunctionAlgorithm,
}

impl ConstantBcAuxFunctionAlgorithm {
    pub fn new(parts: &[PartId], field: &str, values: Vec<f64>) -> Result<Self> {
        let end = values.len();
        let function = ConstantAuxFunction::new(0, end, values)?;
        Ok(Self {
            inner: AuxFunctionAlgorithm::new(parts, field, EntityRank::Face, Box::new(function)),
        })
    }
}

impl Algorithm for ConstantBcAuxFunctionAlgorithm {
    fn parts(&self) -> &[PartId] {
        self.inner.parts()
    }

    fn add_parts(&mut self, parts: &[PartId]) {
        self.inner.add_parts(parts);
    }

    fn execute(&mut self, mesh: &mut MeshDatabase, ctx: &SolveContext) -> Result<()> {
        self.inner.execute(mesh, ctx)
    }
}
