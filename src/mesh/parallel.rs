//! Reductions over the shared nodes of several mesh partitions.
use rustc_hash::FxHashMap;

use crate::error::Result;
use crate::mesh::{FieldState, MeshDatabase};

/// Sums the NP1 state of nodal fields over all copies of every shared node.
///
/// For each global node id that appears as a shared node on more than one partition, every copy
/// receives the sum of all copies. With a single partition this is the identity. This is the
/// collective barrier of the assembly: all partitions must pass the same field names.
pub fn parallel_sum(partitions: &mut [MeshDatabase], field_names: &[&str]) -> Result<()> {
    if partitions.len() < 2 {
        return Ok(());
    }
    for name in field_names {
        let mut sums: FxHashMap<u64, Vec<f64>> = FxHashMap::default();
        let mut copies: FxHashMap<u64, usize> = FxHashMap::default();
        for mesh in partitions.iter() {
            let field = mesh.field(name)?;
            let components = field.components();
            let values = field.state(FieldState::Np1)?;
            for (index, node) in mesh.nodes().iter().enumerate() {
                if !node.shared {
                    continue;
                }
                let sum = sums
                    .entry(node.global_id)
                    .or_insert_with(|| vec![0.0; components]);
                for (s, v) in sum
                    .iter_mut()
                    .zip(&values[index * components..(index + 1) * components])
                {
                    *s += v;
                }
                *copies.entry(node.global_id).or_insert(0) += 1;
            }
        }

        for mesh in partitions.iter_mut() {
            let shared: Vec<(usize, u64)> = mesh
                .nodes()
                .iter()
                .enumerate()
                .filter(|(_, node)| node.shared)
                .map(|(index, node)| (index, node.global_id))
                .collect();
            let field = mesh.field_mut(name)?;
            let components = field.components();
            let values = field.state_mut(FieldState::Np1)?;
            for (index, global_id) in shared {
                if copies.get(&global_id).copied().unwrap_or(0) < 2 {
                    continue;
                }
                if let Some(sum) = sums.get(&global_id) {
                    values[index * components..(index + 1) * components].copy_from_slice(sum);
                }
            }
        }
    }
    Ok(())
}
