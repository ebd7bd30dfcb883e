//! Whole-field linear algebra on mesh fields.
//!
//! Nodal fields are processed on locally owned and shared nodes, fields of other ranks on all
//! of their entities.
use crate::error::{CvfemError, Result};
use crate::mesh::{FieldState, MeshDatabase, Ownership};
use crate::topology::EntityRank;

fn selected_entities(mesh: &MeshDatabase, name: &str) -> Result<Vec<usize>> {
    let field = mesh.field(name)?;
    Ok(match field.rank() {
        EntityRank::Node => mesh.select_all_nodes(Ownership::OwnedOrShared),
        rank => (0..mesh.num_entities(rank)).collect(),
    })
}

fn check_layout(mesh: &MeshDatabase, x: &str, y: &str) -> Result<usize> {
    let (fx, fy) = (mesh.field(x)?, mesh.field(y)?);
    if fx.rank() != fy.rank() || fx.components() != fy.components() {
        return Err(CvfemError::Field(format!("fields {} and {} have different layouts", x, y)));
    }
    Ok(fx.components())
}

/// `y = alpha * x + beta * y` on the NP1 states.
pub fn field_axpby(mesh: &mut MeshDatabase, alpha: f64, x: &str, beta: f64, y: &str) -> Result<()> {
    let components = check_layout(mesh, x, y)?;
    let entities = selected_entities(mesh, y)?;
    let xs = mesh.field_state(x, FieldState::Np1)?.to_vec();
    let ys = mesh.field_state_mut(y, FieldState::Np1)?;
    for e in entities {
        for i in e * components..(e + 1) * components {
            ys[i] = alpha * xs[i] + beta * ys[i];
        }
    }
    Ok(())
}

/// Sets every component of the given state to `alpha`.
pub fn field_fill(mesh: &mut MeshDatabase, alpha: f64, x: &str, state: FieldState) -> Result<()> {
    let components = mesh.field(x)?.components();
    let entities = selected_entities(mesh, x)?;
    let values = mesh.field_state_mut(x, state)?;
    for e in entities {
        values[e * components..(e + 1) * components].fill(alpha);
    }
    Ok(())
}

/// `x = alpha * x` on the NP1 state.
pub fn field_scale(mesh: &mut MeshDatabase, alpha: f64, x: &str) -> Result<()> {
    let components = mesh.field(x)?.components();
    let entities = selected_entities(mesh, x)?;
    let values = mesh.field_state_mut(x, FieldState::Np1)?;
    for e in entities {
        for v in &mut values[e * components..(e + 1) * components] {
            *v *= alpha;
        }
    }
    Ok(())
}

/// Copies `x` into `y`. The two may be different states of the same field.
pub fn field_copy(mesh: &mut MeshDatabase, x: (&str, FieldState), y: (&str, FieldState)) -> Result<()> {
    let components = check_layout(mesh, x.0, y.0)?;
    let entities = selected_entities(mesh, y.0)?;
    let source = mesh.field_state(x.0, x.1)?.to_vec();
    let target = mesh.field_state_mut(y.0, y.1)?;
    for e in entities {
        let range = e * components..(e + 1) * components;
        target[range.clone()].copy_from_slice(&source[range]);
    }
    Ok(())
}

/// Copies component `x_index` of `x` into component `y_index` of `y` (NP1 states).
pub fn field_index_copy(mesh: &mut MeshDatabase, x: &str, x_index: usize, y: &str, y_index: usize) -> Result<()> {
    let (fx, fy) = (mesh.field(x)?, mesh.field(y)?);
    if fx.rank() != fy.rank() || x_index >= fx.components() || y_index >= fy.components() {
        return Err(CvfemError::Field(format!(
            "cannot copy component {} of {} into component {} of {}",
            x_index, x, y_index, y
        )));
    }
    let (cx, cy) = (fx.components(), fy.components());
    let entities = selected_entities(mesh, y)?;
    let source = mesh.field_state(x, FieldState::Np1)?.to_vec();
    let target = mesh.field_state_mut(y, FieldState::Np1)?;
    for e in entities {
        target[e * cy + y_index] = source[e * cx + x_index];
    }
    Ok(())
}
