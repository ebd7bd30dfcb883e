//! Named, multi-state field storage attached to mesh entities.
use std::collections::BTreeSet;

use rustc_hash::FxHashMap;

use crate::error::{CvfemError, Result};
use crate::mesh::PartId;
use crate::topology::EntityRank;

/// Time level of a field state.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldState {
    Np1,
    N,
    Nm1,
}

impl FieldState {
    pub fn index(&self) -> usize {
        match self {
            FieldState::Np1 => 0,
            FieldState::N => 1,
            FieldState::Nm1 => 2,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(pub usize);

#[derive(Debug, Clone)]
pub struct Field {
    name: String,
    rank: EntityRank,
    components: usize,
    states: Vec<Vec<f64>>,
    parts: BTreeSet<PartId>,
}

impl Field {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rank(&self) -> EntityRank {
        self.rank
    }

    pub fn components(&self) -> usize {
        self.components
    }

    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    /// Parts the field has been put on.
    pub fn parts(&self) -> &BTreeSet<PartId> {
        &self.parts
    }

    fn check_state(&self, state: FieldState) -> Result<usize> {
        let index = state.index();
        if index < self.states.len() {
            Ok(index)
        } else {
            Err(CvfemError::Field(format!(
                "field {} has {} state(s), state {:?} is unavailable",
                self.name,
                self.states.len(),
                state
            )))
        }
    }

    pub fn state(&self, state: FieldState) -> Result<&[f64]> {
        let index = self.check_state(state)?;
        Ok(&self.states[index])
    }

    pub fn state_mut(&mut self, state: FieldState) -> Result<&mut [f64]> {
        let index = self.check_state(state)?;
        Ok(&mut self.states[index])
    }

    /// Values of one entity in the given state.
    pub fn entity_values(&self, state: FieldState, entity: usize) -> Result<&[f64]> {
        let c = self.components;
        Ok(&self.state(state)?[entity * c..(entity + 1) * c])
    }

    /// Rotates the states so that NP1 becomes N and N becomes NM1.
    pub fn rotate_states(&mut self) {
        if self.states.len() > 1 {
            self.states.rotate_right(1);
        }
    }
}

/// Registry of all fields of one mesh, looked up by name.
#[derive(Debug, Clone, Default)]
pub struct FieldRegistry {
    ids: FxHashMap<String, FieldId>,
    fields: Vec<Field>,
}

impl FieldRegistry {
    /// Declares a field, or returns the existing one if a field with the same name and layout
    /// was declared before. A repeated declaration with more states grows the state count.
    pub fn declare(
        &mut self,
        name: &str,
        rank: EntityRank,
        components: usize,
        num_states: usize,
        entity_count: usize,
    ) -> Result<FieldId> {
        if let Some(&id) = self.ids.get(name) {
            let field = &mut self.fields[id.0];
            if field.rank != rank || field.components != components {
                return Err(CvfemError::Field(format!(
                    "field {} redeclared with layout ({:?}, {}), previously ({:?}, {})",
                    name, rank, components, field.rank, field.components
                )));
            }
            while field.states.len() < num_states {
                let copy = field.states[0].clone();
                field.states.push(copy);
            }
            return Ok(id);
        }
        let id = FieldId(self.fields.len());
        self.fields.push(Field {
            name: name.to_string(),
            rank,
            components,
            states: vec![vec![0.0; entity_count * components]; num_states.max(1)],
            parts: BTreeSet::new(),
        });
        self.ids.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn id(&self, name: &str) -> Result<FieldId> {
        self.ids
            .get(name)
            .copied()
            .ok_or_else(|| CvfemError::Field(format!("no field named {}", name)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ids.contains_key(name)
    }

    pub fn get(&self, id: FieldId) -> &Field {
        &self.fields[id.0]
    }

    pub fn get_mut(&mut self, id: FieldId) -> &mut Field {
        &mut self.fields[id.0]
    }

    pub fn by_name(&self, name: &str) -> Result<&Field> {
        Ok(self.get(self.id(name)?))
    }

    pub fn by_name_mut(&mut self, name: &str) -> Result<&mut Field> {
        let id = self.id(name)?;
        Ok(self.get_mut(id))
    }

    pub fn put_on_part(&mut self, id: FieldId, part: PartId) {
        self.fields[id.0].parts.insert(part);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }

    pub fn rotate_states(&mut self) {
        for field in &mut self.fields {
            field.rotate_states();
        }
    }
}
