//! The world: entities, component storages, queries and the system schedule.

use std::{
    any::TypeId,
    collections::{HashMap, HashSet},
};

use tracing::{debug, trace};

use super::{
    entity::{EntityAllocator, EntityId},
    query::{QueryId, QuerySpec, QueryState, QueryView, Window},
    storage::{Component, ComponentKind, ErasedStorage, Storage},
    system::{clamp_delta, System, SystemEntry, Time},
};
use crate::{error::EcsError, event::EventBus, resources::Resources};

/// Owned simulation context. Passed explicitly to every system.
pub struct World {
    entities: EntityAllocator,
    signatures: HashMap<EntityId, HashSet<ComponentKind>>,
    storages: HashMap<TypeId, Box<dyn ErasedStorage>>,

    queries: Vec<QueryState>,
    query_lookup: HashMap<QuerySpec, QueryId>,
    queries_by_kind: HashMap<TypeId, Vec<QueryId>>,

    systems: Vec<SystemEntry>,
    change_tick: u64,
    window: Window,
    time: Time,

    /// Singleton state shared by systems.
    pub resources: Resources,
    /// Typed events produced and consumed within a tick.
    pub events: EventBus,
}

impl Default for World {
    fn default() -> Self {
        Self {
            entities: EntityAllocator::default(),
            signatures: HashMap::new(),
            storages: HashMap::new(),
            queries: Vec::new(),
            query_lookup: HashMap::new(),
            queries_by_kind: HashMap::new(),
            systems: Vec::new(),
            change_tick: 1,
            window: Window::ALL,
            time: Time::default(),
            resources: Resources::default(),
            events: EventBus::default(),
        }
    }
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    // ─── Entities ───

    /// Creates a new entity with no components.
    pub fn spawn(&mut self) -> EntityId {
        let id = self.entities.alloc();
        self.signatures.insert(id, HashSet::new());
        id
    }

    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.entities.is_alive(entity)
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.len() == 0
    }

    /// Detaches every component and frees the id, all in one step.
    ///
    /// Returns false if the entity was already gone.
    pub fn despawn(&mut self, entity: EntityId) -> bool {
        let Some(signature) = self.signatures.remove(&entity) else {
            return false;
        };
        for kind in &signature {
            self.evict_from_queries(entity, kind.type_id());
            if let Some(storage) = self.storages.get_mut(&kind.type_id()) {
                storage.bury(entity, self.change_tick);
            }
        }
        self.entities.free(entity);
        trace!(%entity, kinds = signature.len(), "despawned");
        true
    }

    // ─── Components ───

    /// Attaches `component`, overwriting any existing value of the same kind.
    ///
    /// Inserting on a dead entity is ignored.
    pub fn insert<T: Component>(&mut self, entity: EntityId, component: T) {
        if let Err(e) = self.attach(entity, component, true) {
            debug!(%entity, error = %e, "insert ignored");
        }
    }

    /// Attaches `component`, failing if the entity already has one of this kind.
    pub fn try_insert<T: Component>(&mut self, entity: EntityId, component: T) -> Result<(), EcsError> {
        self.attach(entity, component, false)
    }

    fn attach<T: Component>(&mut self, entity: EntityId, component: T, overwrite: bool) -> Result<(), EcsError> {
        let kind = ComponentKind::of::<T>();
        let signature = self
            .signatures
            .get_mut(&entity)
            .ok_or(EcsError::NoSuchEntity(entity))?;

        if signature.contains(&kind) {
            if !overwrite {
                return Err(EcsError::DuplicateComponent {
                    entity,
                    component: kind.name(),
                });
            }
            self.storage_mut::<T>().insert(entity, component);
            return Ok(());
        }

        signature.insert(kind);
        self.storage_mut::<T>().insert(entity, component);

        let tick = self.change_tick;
        let signature = &self.signatures[&entity];
        if let Some(ids) = self.queries_by_kind.get(&kind.type_id()) {
            for id in ids {
                let query = &mut self.queries[id.0];
                if query.accepts(signature) {
                    query.admit(entity, tick);
                }
            }
        }
        Ok(())
    }

    /// Detaches component `T`. Its value stays readable through `removed`
    /// until every system has run once. Returns false if it was absent.
    pub fn remove<T: Component>(&mut self, entity: EntityId) -> bool {
        let kind = ComponentKind::of::<T>();
        let removed = self
            .signatures
            .get_mut(&entity)
            .is_some_and(|signature| signature.remove(&kind));
        if !removed {
            return false;
        }

        self.evict_from_queries(entity, kind.type_id());
        let tick = self.change_tick;
        self.storage_mut::<T>().bury(entity, tick);
        true
    }

    /// Like `remove`, but reports why nothing was removed.
    pub fn try_remove<T: Component>(&mut self, entity: EntityId) -> Result<(), EcsError> {
        if !self.is_alive(entity) {
            return Err(EcsError::NoSuchEntity(entity));
        }
        if self.remove::<T>(entity) {
            Ok(())
        } else {
            Err(EcsError::MissingComponent {
                entity,
                component: std::any::type_name::<T>(),
            })
        }
    }

    fn evict_from_queries(&mut self, entity: EntityId, kind: TypeId) {
        let tick = self.change_tick;
        if let Some(ids) = self.queries_by_kind.get(&kind) {
            for id in ids {
                self.queries[id.0].evict(entity, tick);
            }
        }
    }

    pub fn has<T: Component>(&self, entity: EntityId) -> bool {
        self.storage::<T>().is_some_and(|s| s.contains(entity))
    }

    pub fn get<T: Component>(&self, entity: EntityId) -> Option<&T> {
        self.storage::<T>().and_then(|s| s.get(entity))
    }

    pub fn get_mut<T: Component>(&mut self, entity: EntityId) -> Option<&mut T> {
        self.storages
            .get_mut(&TypeId::of::<T>())
            .and_then(|boxed| boxed.as_any_mut().downcast_mut::<Storage<T>>())
            .and_then(|storage| storage.get_mut(entity))
    }

    /// Last known value of `T` for an entity that lost it (or died) recently,
    /// falling back to the live value.
    pub fn removed<T: Component>(&self, entity: EntityId) -> Option<&T> {
        let storage = self.storage::<T>()?;
        storage.buried(entity).or_else(|| storage.get(entity))
    }

    /// Iterates live entities with component `T`, in no particular order.
    pub fn iter<T: Component>(&self) -> impl Iterator<Item = (EntityId, &T)> {
        self.storage::<T>().into_iter().flat_map(|s| s.iter())
    }

    fn storage<T: Component>(&self) -> Option<&Storage<T>> {
        self.storages
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.as_any().downcast_ref::<Storage<T>>())
    }

    fn storage_mut<T: Component>(&mut self) -> &mut Storage<T> {
        self.storages
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(Storage::<T>::default()))
            .as_any_mut()
            .downcast_mut::<Storage<T>>()
            .expect("storage registered under a foreign TypeId")
    }

    // ─── Queries ───

    /// Registers a query, or returns the existing one for the same kind set.
    ///
    /// Entities already matching are reported as `added` on first observation.
    pub fn register_query(&mut self, spec: QuerySpec) -> QueryId {
        if let Some(id) = self.query_lookup.get(&spec) {
            return *id;
        }

        let id = QueryId(self.queries.len());
        let mut state = QueryState::new(spec.clone());

        let mut matching: Vec<EntityId> = self
            .signatures
            .iter()
            .filter(|(_, signature)| state.accepts(signature))
            .map(|(entity, _)| *entity)
            .collect();
        matching.sort();
        for entity in matching {
            state.admit(entity, self.change_tick);
        }

        for kind in spec.kinds() {
            self.queries_by_kind.entry(kind.type_id()).or_default().push(id);
        }
        debug!(query = id.0, kinds = ?spec.kinds().iter().map(|k| k.name()).collect::<Vec<_>>(), matches = state.len(), "query registered");
        self.queries.push(state);
        self.query_lookup.insert(spec, id);
        id
    }

    /// Current results plus the changes the running system has not yet seen.
    ///
    /// Outside `execute` the diff covers every change still retained.
    pub fn query(&self, id: QueryId) -> QueryView {
        let state = &self.queries[id.0];
        let (added, removed) = state.diff(self.window);
        QueryView {
            results: state.results(),
            added,
            removed,
        }
    }

    /// Current matches only, without computing diffs.
    pub fn results(&self, id: QueryId) -> Vec<EntityId> {
        self.queries[id.0].results()
    }

    pub fn matches(&self, id: QueryId, entity: EntityId) -> bool {
        self.queries[id.0].contains(entity)
    }

    // ─── Schedule ───

    /// Adds a system. Lower priorities run first; ties keep registration order.
    pub fn register_system<S: System + 'static>(&mut self, mut system: S, priority: i32) {
        system.init(self);
        debug!(system = system.name(), priority, "system registered");
        let pos = self.systems.partition_point(|entry| entry.priority <= priority);
        self.systems.insert(
            pos,
            SystemEntry {
                system: Box::new(system),
                priority,
                last_run: 0,
            },
        );
    }

    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    pub fn time(&self) -> Time {
        self.time
    }

    /// Runs every registered system once, in priority order.
    ///
    /// `delta` (seconds) is clamped to `MAX_DELTA`; `now` is passed through.
    pub fn execute(&mut self, delta: f32, now: f64) {
        self.time = Time {
            delta: clamp_delta(delta),
            now,
            tick: self.time.tick,
        };

        let mut systems = std::mem::take(&mut self.systems);
        for entry in &mut systems {
            self.change_tick += 1;
            let start = self.change_tick;
            self.window = Window {
                since: entry.last_run,
                until: start,
            };
            entry.system.run(self);
            entry.last_run = start;
        }

        // Systems registered from inside a run land in the emptied vec.
        for late in std::mem::take(&mut self.systems) {
            let pos = systems.partition_point(|entry| entry.priority <= late.priority);
            systems.insert(pos, late);
        }
        self.systems = systems;

        self.window = Window::ALL;
        self.change_tick += 1;
        self.time.tick += 1;
        self.purge();
    }

    /// Forgets changes every system has already observed.
    fn purge(&mut self) {
        let horizon = self
            .systems
            .iter()
            .map(|entry| entry.last_run)
            .min()
            .unwrap_or(self.change_tick);
        for query in &mut self.queries {
            query.purge(horizon);
        }
        for storage in self.storages.values_mut() {
            storage.purge(horizon);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Pos(f32);
    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Vel(f32);
    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Tag;

    #[test]
    fn ecs_insert_and_get() {
        let mut world = World::default();
        let e = world.spawn();
        world.insert(e, Pos(1.0));
        assert_eq!(world.get::<Pos>(e), Some(&Pos(1.0)));
    }

    #[test]
    fn duplicate_insert_overwrites_but_strict_variant_errors() {
        let mut world = World::new();
        let e = world.spawn();
        world.insert(e, Pos(1.0));
        world.insert(e, Pos(2.0));
        assert_eq!(world.get::<Pos>(e), Some(&Pos(2.0)));

        let err = world.try_insert(e, Pos(3.0)).unwrap_err();
        assert!(matches!(err, EcsError::DuplicateComponent { .. }));
        assert_eq!(world.get::<Pos>(e), Some(&Pos(2.0)));
    }

    #[test]
    fn operations_on_dead_entities_are_rejected() {
        let mut world = World::new();
        let e = world.spawn();
        assert!(world.despawn(e));
        assert!(!world.despawn(e));
        world.insert(e, Pos(1.0));
        assert!(world.get::<Pos>(e).is_none());
        assert!(matches!(world.try_insert(e, Pos(1.0)), Err(EcsError::NoSuchEntity(_))));
        assert!(matches!(world.try_remove::<Pos>(e), Err(EcsError::NoSuchEntity(_))));
    }

    #[test]
    fn results_track_exact_membership_through_random_edits() {
        let mut world = World::new();
        let q = world.register_query(QuerySpec::new().with::<Pos>().with::<Vel>());
        let entities: Vec<_> = (0..16).map(|_| world.spawn()).collect();

        // Deterministic pseudo-random edit sequence.
        let mut seed = 0x2545_f491_u32;
        for _ in 0..500 {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            let e = entities[(seed % 16) as usize];
            match (seed >> 8) % 4 {
                0 => world.insert(e, Pos(1.0)),
                1 => world.insert(e, Vel(1.0)),
                2 => {
                    world.remove::<Pos>(e);
                }
                _ => {
                    world.remove::<Vel>(e);
                }
            }

            let mut expected: Vec<_> = entities
                .iter()
                .copied()
                .filter(|e| world.has::<Pos>(*e) && world.has::<Vel>(*e))
                .collect();
            let mut got = world.results(q);
            expected.sort();
            got.sort();
            assert_eq!(got, expected);
        }
    }

    #[test]
    fn late_query_sees_existing_matches() {
        let mut world = World::new();
        let a = world.spawn();
        world.insert(a, Pos(0.0));
        let b = world.spawn();
        world.insert(b, Vel(0.0));

        let q = world.register_query(QuerySpec::new().with::<Pos>());
        assert_eq!(world.query(q).results, vec![a]);
        assert_eq!(world.register_query(QuerySpec::new().with::<Pos>()), q);
    }

    #[test]
    fn despawn_detaches_everything_and_keeps_last_values_readable() {
        let mut world = World::new();
        let q = world.register_query(QuerySpec::new().with::<Pos>());
        let e = world.spawn();
        world.insert(e, Pos(4.0));
        world.insert(e, Vel(2.0));

        assert!(world.despawn(e));
        assert!(!world.is_alive(e));
        assert!(world.get::<Pos>(e).is_none());
        assert!(world.get::<Vel>(e).is_none());
        assert!(world.results(q).is_empty());
        assert_eq!(world.removed::<Pos>(e), Some(&Pos(4.0)));
    }

    /// Records the diff it observes on every run.
    struct Observer {
        query: Option<QueryId>,
        seen: Arc<Mutex<Vec<QueryView>>>,
    }

    impl System for Observer {
        fn init(&mut self, world: &mut World) {
            self.query = Some(world.register_query(QuerySpec::new().with::<Pos>()));
        }

        fn run(&mut self, world: &mut World) {
            if let Some(q) = self.query {
                self.seen.lock().unwrap().push(world.query(q));
            }
        }
    }

    /// Spawns one `Pos` entity per run and removes the previous one.
    struct Spawner {
        last: Option<EntityId>,
    }

    impl System for Spawner {
        fn run(&mut self, world: &mut World) {
            if let Some(prev) = self.last.take() {
                world.remove::<Pos>(prev);
            }
            let e = world.spawn();
            world.insert(e, Pos(world.time().tick as f32));
            self.last = Some(e);
        }
    }

    #[test]
    fn diffs_are_relative_to_each_systems_last_run() {
        let mut world = World::new();
        let before = Arc::new(Mutex::new(Vec::new()));
        let after = Arc::new(Mutex::new(Vec::new()));

        world.register_system(Observer { query: None, seen: before.clone() }, 0);
        world.register_system(Spawner { last: None }, 10);
        world.register_system(Observer { query: None, seen: after.clone() }, 20);

        world.execute(0.016, 0.0);
        world.execute(0.016, 0.016);

        let before = before.lock().unwrap();
        let after = after.lock().unwrap();

        // Runs ahead of the spawner: sees tick N's spawn on tick N+1.
        assert!(before[0].added.is_empty());
        assert_eq!(before[1].added.len(), 1);
        assert!(before[1].removed.is_empty());

        // Runs behind it: sees each spawn within the same tick.
        assert_eq!(after[0].added.len(), 1);
        assert_eq!(after[1].added.len(), 1);
        assert_eq!(after[1].removed, after[0].added);
        assert_ne!(after[1].added, after[0].added);
    }

    #[test]
    fn removed_values_survive_until_all_systems_observed() {
        let mut world = World::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        world.register_system(Observer { query: None, seen: seen.clone() }, 0);

        let e = world.spawn();
        world.insert(e, Pos(9.0));
        world.execute(0.016, 0.0);
        world.remove::<Pos>(e);
        assert_eq!(world.removed::<Pos>(e), Some(&Pos(9.0)));

        world.execute(0.016, 0.016);
        assert_eq!(seen.lock().unwrap()[1].removed, vec![e]);

        world.execute(0.016, 0.032);
        assert!(world.removed::<Pos>(e).is_none());
    }

    struct Mover {
        query: Option<QueryId>,
    }

    impl System for Mover {
        fn init(&mut self, world: &mut World) {
            self.query = Some(world.register_query(QuerySpec::new().with::<Pos>().with::<Vel>()));
        }

        fn run(&mut self, world: &mut World) {
            let Some(q) = self.query else { return };
            let dt = world.time().delta;
            for e in world.results(q) {
                let Some(vel) = world.get::<Vel>(e).copied() else { continue };
                if let Some(pos) = world.get_mut::<Pos>(e) {
                    pos.0 += vel.0 * dt;
                }
            }
        }
    }

    #[test]
    fn execute_clamps_long_stalls() {
        let mut world = World::new();
        world.register_system(Mover { query: None }, 0);
        let e = world.spawn();
        world.insert(e, Pos(0.0));
        world.insert(e, Vel(10.0));

        world.execute(5.0, 5.0);
        assert_eq!(world.time().delta, 0.25);
        assert_eq!(world.get::<Pos>(e), Some(&Pos(2.5)));
    }

    struct Recorder(&'static str, Arc<Mutex<Vec<&'static str>>>);

    impl System for Recorder {
        fn run(&mut self, _world: &mut World) {
            self.1.lock().unwrap().push(self.0);
        }
    }

    #[test]
    fn systems_run_in_priority_then_registration_order() {
        let mut world = World::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        world.register_system(Recorder("c", log.clone()), 5);
        world.register_system(Recorder("a", log.clone()), -1);
        world.register_system(Recorder("d", log.clone()), 5);
        world.register_system(Recorder("b", log.clone()), 0);
        world.execute(0.01, 0.0);
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn tag_only_entities_match_tag_queries() {
        let mut world = World::new();
        let q = world.register_query(QuerySpec::new().with::<Tag>());
        let e = world.spawn();
        world.insert(e, Tag);
        assert_eq!(world.query(q).added, vec![e]);
        world.remove::<Tag>(e);
        assert!(world.query(q).results.is_empty());
    }
}
