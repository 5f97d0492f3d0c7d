//! Shared state handed to every axum handler.

use chrono::{DateTime, Utc};
use predictor_broker::Broker;
use predictor_router::TrafficRouter;
use predictor_store::Store;
use std::sync::Arc;

pub struct AppStateInner {
    pub(crate) router: TrafficRouter,
    pub(crate) store: Store,
    pub(crate) broker: Arc<dyn Broker>,
    pub(crate) started_at: DateTime<Utc>,
}

/// Cheaply cloneable handle passed into axum's `State` extractor.
pub type AppState = Arc<AppStateInner>;

impl AppStateInner {
    pub fn new(router: TrafficRouter, store: Store, broker: Arc<dyn Broker>) -> AppState {
        Arc::new(AppStateInner {
            router,
            store,
            broker,
            started_at: Utc::now(),
        })
    }
}
