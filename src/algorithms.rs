//! Concrete algorithms assembled by the equation systems.
use crate::error::Result;
use crate::mesh::{FieldState, MeshDatabase};

mod aux_function;
mod copy_field;
mod dirichlet;
mod elem_solver;
mod flux_bc;
mod nodal_gradient;
mod node_solver;

pub use aux_function::*;
pub use copy_field::*;
pub use dirichlet::*;
pub use elem_solver::*;
pub use flux_bc::*;
pub use nodal_gradient::*;
pub use node_solver::*;

/// Dense per-entity contribution collected during a batched pass and scattered afterwards.
#[derive(Debug, Clone, Default)]
pub struct LocalContribution {
    pub nodes: Vec<usize>,
    pub rhs: Vec<f64>,
    /// Row-major square block matching `rhs`.
    pub lhs: Vec<f64>,
}

impl LocalContribution {
    pub fn zeros(nodes: &[usize], dofs: usize) -> Self {
        let n = nodes.len() * dofs;
        Self {
            nodes: nodes.to_vec(),
            rhs: vec![0.0; n],
            lhs: vec![0.0; n * n],
        }
    }
}

/// Adds nodal contributions `(node, values)` to the NP1 state of a nodal field.
pub(crate) fn scatter_nodal_sum(mesh: &mut MeshDatabase, field: &str, contributions: &[(usize, Vec<f64>)]) -> Result<()> {
    let components = mesh.field(field)?.components();
    let values = mesh.field_state_mut(field, FieldState::Np1)?;
    for (node, contribution) in contributions {
        for (i, v) in contribution.iter().enumerate().take(components) {
            values[node * components + i] += v;
        }
    }
    Ok(())
}

/// Euclidean norm of a vector given as a slice.
pub(crate) fn magnitude(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}
