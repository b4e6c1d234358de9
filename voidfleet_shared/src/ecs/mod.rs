//! Entity/component system.
//!
//! Typed component storages keyed by generational entity ids, incrementally
//! maintained queries with per-system `added`/`removed` diffs, and an ordered
//! system schedule driven by `World::execute`. Not archetype-based.

mod entity;
mod query;
mod storage;
mod system;
mod world;

pub use entity::EntityId;
pub use query::{QueryId, QuerySpec, QueryView};
pub use storage::{Component, ComponentKind};
pub use system::{clamp_delta, System, Time, MAX_DELTA};
pub use world::World;
