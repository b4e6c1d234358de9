//! Singleton resources.
//!
//! One value per type, owned by the `World` and reachable from every system:
//! connection inboxes, spawn tuning, the renderer, the instance buffer.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
};

/// Type-keyed singleton store.
#[derive(Default)]
pub struct Resources {
    by_type: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Resources {
    /// Inserts a resource, returning the previous value of the same type.
    pub fn insert<T: 'static + Send + Sync>(&mut self, value: T) -> Option<T> {
        self.by_type
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|boxed| *boxed)
    }

    pub fn get<T: 'static + Send + Sync>(&self) -> Option<&T> {
        self.by_type
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref::<T>())
    }

    pub fn get_mut<T: 'static + Send + Sync>(&mut self) -> Option<&mut T> {
        self.by_type
            .get_mut(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_mut::<T>())
    }

    pub fn remove<T: 'static + Send + Sync>(&mut self) -> Option<T> {
        self.by_type
            .remove(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast::<T>().ok())
            .map(|boxed| *boxed)
    }

    pub fn contains<T: 'static + Send + Sync>(&self) -> bool {
        self.by_type.contains_key(&TypeId::of::<T>())
    }
}

impl crate::ecs::World {
    /// Temporarily takes resource `R` out of the world so a system can use it
    /// alongside mutable component access. Returns `None` if `R` is absent.
    pub fn resource_scope<R, U>(&mut self, f: impl FnOnce(&mut Self, &mut R) -> U) -> Option<U>
    where
        R: 'static + Send + Sync,
    {
        let mut resource = self.resources.remove::<R>()?;
        let out = f(self, &mut resource);
        self.resources.insert(resource);
        Some(out)
    }
}
