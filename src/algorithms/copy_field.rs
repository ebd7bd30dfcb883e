use crate::algorithm::{extend_parts, Algorithm};
use crate::error::{CvfemError, Result};
use crate::mesh::{FieldState, MeshDatabase, Ownership, PartId};
use crate::realm::SolveContext;

/// Copies components `begin..end` of one nodal field state into another on the nodes of its
/// parts.
///
/// Used to move boundary data (e.g. `temperature_bc`) into the solution field.
#[derive(Debug, Clone)]
pub struct CopyFieldAlgorithm {
    parts: Vec<PartId>,
    from: (String, FieldState),
    to: (String, FieldState),
    begin: usize,
    end: usize,
}

impl CopyFieldAlgorithm {
    pub fn new(
        parts: &[PartId],
        from: (&str, FieldState),
        to: (&str, FieldState),
        begin: usize,
        end: usize,
    ) -> Self {
        Self {
            parts: parts.to_vec(),
            from: (from.0.to_string(), from.1),
            to: (to.0.to_string(), to.1),
            begin,
            end,
        }
    }
}

impl Algorithm for CopyFieldAlgorithm {
    fn parts(&self) -> &[PartId] {
        &self.parts
    }

    fn add_parts(&mut self, parts: &[PartId]) {
        extend_parts(&mut self.parts, parts);
    }

    fn execute(&mut self, mesh: &mut MeshDatabase, _ctx: &SolveContext) -> Result<()> {
        let (from, to) = (mesh.field(&self.from.0)?, mesh.field(&self.to.0)?);
        let (cf, ct) = (from.components(), to.components());
        if self.end > cf || self.end > ct || self.begin > self.end {
            return Err(CvfemError::Field(format!(
                "cannot copy components {}..{} from {} ({}) to {} ({})",
                self.begin, self.end, self.from.0, cf, self.to.0, ct
            )));
        }
        let nodes = mesh.select_nodes(&self.parts, Ownership::OwnedOrShared);
        let source = mesh.field_state(&self.from.0, self.from.1)?.to_vec();
        let target = mesh.field_state_mut(&self.to.0, self.to.1)?;
        for n in nodes {
            for i in self.begin..self.end {
                target[n * ct + i] = source[n * cf + i];
            }
        }
        Ok(())
    }
}
