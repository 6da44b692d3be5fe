//! Local mirror of the hub's entity states.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use zoneplan_domain::entity::EntityState;

use crate::message::StateChanged;

/// Entity states keyed by entity id. Written by the session task, read by
/// everyone else.
#[derive(Debug, Default)]
pub struct EntityCache {
    states: RwLock<HashMap<String, EntityState>>,
}

impl EntityCache {
    #[must_use]
    pub fn get(&self, entity_id: &str) -> Option<EntityState> {
        self.states
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(entity_id)
            .cloned()
    }

    /// Replace the whole cache with a fresh `get_states` answer.
    pub fn replace_all(&self, states: Vec<EntityState>) {
        let fresh: HashMap<_, _> = states
            .into_iter()
            .map(|s| (s.entity_id.clone(), s))
            .collect();
        *self.states.write().unwrap_or_else(PoisonError::into_inner) = fresh;
    }

    /// Apply one `state_changed` event. Other entities are untouched.
    pub fn apply(&self, change: StateChanged) {
        let mut states = self.states.write().unwrap_or_else(PoisonError::into_inner);
        match change.new_state {
            Some(state) => {
                tracing::trace!(entity_id = %change.entity_id, state = %state.state, "entity updated");
                states.insert(change.entity_id, state);
            }
            None => {
                tracing::debug!(entity_id = %change.entity_id, "entity removed");
                states.remove(&change.entity_id);
            }
        }
    }

    pub fn clear(&self) {
        self.states
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.states.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
