//! Systems and the per-tick clock they read.

use super::world::World;

/// Largest step a single `execute` will integrate, in seconds.
///
/// A stalled process (debugger, suspended tab, GC pause on a peer) would
/// otherwise hand the pipeline one enormous step.
pub const MAX_DELTA: f32 = 0.25;

/// Clamps an elapsed interval to `[0, MAX_DELTA]`. Non-finite input maps to zero.
pub fn clamp_delta(delta: f32) -> f32 {
    if delta.is_finite() {
        delta.clamp(0.0, MAX_DELTA)
    } else {
        0.0
    }
}

/// Clock for the current `execute` call.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Time {
    /// Clamped step in seconds.
    pub delta: f32,
    /// Caller-supplied time in seconds.
    pub now: f64,
    /// Number of completed `execute` calls before this one.
    pub tick: u64,
}

/// A per-tick transform over the entities matching its queries.
///
/// Queries are declared once in `init`; `run` is called exactly once per
/// `World::execute`, in ascending priority.
pub trait System: Send {
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Registers queries and resources. Called once from `register_system`.
    fn init(&mut self, _world: &mut World) {}

    fn run(&mut self, world: &mut World);
}

pub(crate) struct SystemEntry {
    pub system: Box<dyn System>,
    pub priority: i32,
    /// Change tick at which the system last started; 0 before its first run.
    pub last_run: u64,
}
