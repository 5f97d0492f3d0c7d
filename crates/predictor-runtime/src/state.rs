//! The lifecycle state machine:
//! `FRESH -> INITIALIZED -> LOADED -> IDLE_UNLOAD_SCHEDULED -> INITIALIZED`,
//! with `INITIALIZED` also reachable from `LOADED` via explicit unload.

/// Runtime lifecycle state. `IdleUnloadScheduled` is observationally the
/// same as `Loaded` (a forward call still succeeds without reloading) but
/// is tracked separately so `manual_unload` and the idle timer can assert
/// a pending-unload task exists before cancelling it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    Fresh,
    Initialized,
    Loaded,
    IdleUnloadScheduled,
}

impl RuntimeState {
    pub fn is_loaded(&self) -> bool {
        matches!(self, RuntimeState::Loaded | RuntimeState::IdleUnloadScheduled)
    }
}
