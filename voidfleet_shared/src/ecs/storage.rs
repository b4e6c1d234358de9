//! Typed component storage.
//!
//! One `Storage<T>` per component kind, keyed by entity id. Removed values are
//! moved to a graveyard stamped with the change tick of the removal, so
//! systems observing a query's `removed` set can still read them.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
};

use super::entity::EntityId;

/// Marker for types that can be attached to entities.
pub trait Component: 'static + Send + Sync {}

impl<T: 'static + Send + Sync> Component for T {}

/// Identifies a component kind. Compared by `TypeId`; the name is for logs.
#[derive(Debug, Clone, Copy)]
pub struct ComponentKind {
    id: TypeId,
    name: &'static str,
}

impl ComponentKind {
    pub fn of<T: Component>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for ComponentKind {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ComponentKind {}

impl std::hash::Hash for ComponentKind {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for ComponentKind {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ComponentKind {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

/// Type-erased view used when the world must act on every kind of an entity.
pub(crate) trait ErasedStorage: Send + Sync {
    /// Moves the entity's value to the graveyard. Returns false if absent.
    fn bury(&mut self, entity: EntityId, tick: u64) -> bool;
    /// Drops graveyard entries stamped before `tick`.
    fn purge(&mut self, tick: u64);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

pub(crate) struct Storage<T> {
    live: HashMap<EntityId, T>,
    graveyard: HashMap<EntityId, (u64, T)>,
}

impl<T> Default for Storage<T> {
    fn default() -> Self {
        Self {
            live: HashMap::new(),
            graveyard: HashMap::new(),
        }
    }
}

impl<T: Component> Storage<T> {
    pub fn insert(&mut self, entity: EntityId, value: T) -> Option<T> {
        self.live.insert(entity, value)
    }

    pub fn get(&self, entity: EntityId) -> Option<&T> {
        self.live.get(&entity)
    }

    pub fn get_mut(&mut self, entity: EntityId) -> Option<&mut T> {
        self.live.get_mut(&entity)
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.live.contains_key(&entity)
    }

    pub fn buried(&self, entity: EntityId) -> Option<&T> {
        self.graveyard.get(&entity).map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &T)> {
        self.live.iter().map(|(k, v)| (*k, v))
    }
}

impl<T: Component> ErasedStorage for Storage<T> {
    fn bury(&mut self, entity: EntityId, tick: u64) -> bool {
        match self.live.remove(&entity) {
            Some(value) => {
                self.graveyard.insert(entity, (tick, value));
                true
            }
            None => false,
        }
    }

    fn purge(&mut self, tick: u64) {
        self.graveyard.retain(|_, (stamp, _)| *stamp >= tick);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
