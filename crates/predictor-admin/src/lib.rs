//! Admin HTTP API (C9): traffic-mutation endpoints and liveness check,
//! plus the `AppState` shared across handlers. Platform wiring and the
//! binary entrypoint live in `src/bin/main.rs`.

pub mod handlers;
pub mod server;
pub mod state;

pub use server::Server;
pub use state::{AppState, AppStateInner};
