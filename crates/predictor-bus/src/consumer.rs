//! Per-queue consumer loop: accumulate up to `batch_size`
//! events via short-timeout blocking pops, flush on the first timeout
//! with a non-empty accumulator, decode/validate/group/dispatch.

use crate::EventBus;
use predictor_common::{Error, Event, EventType, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{info, warn};

pub(crate) async fn run_consumer(
    bus: Arc<EventBus>,
    queue_name: String,
    batch_size: usize,
    running: Arc<AtomicBool>,
    pop_timeout: Duration,
) {
    info!(queue = %queue_name, batch_size, "consumer started");
    let mut accumulator: Vec<Event> = Vec::new();

    while running.load(Ordering::SeqCst) {
        match bus.broker.blocking_pop(&queue_name, pop_timeout).await {
            Ok(Some(raw)) => match decode_event(&raw) {
                Ok(event) => {
                    accumulator.push(event);
                    if accumulator.len() >= batch_size {
                        flush(&bus, std::mem::take(&mut accumulator)).await;
                    }
                }
                Err(error) => {
                    warn!(queue = %queue_name, %error, "dropping malformed event");
                }
            },
            Ok(None) => {
                if !accumulator.is_empty() {
                    flush(&bus, std::mem::take(&mut accumulator)).await;
                }
            }
            Err(error) => {
                warn!(queue = %queue_name, %error, "broker pop failed, backing off");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }

    if !accumulator.is_empty() {
        flush(&bus, accumulator).await;
    }
    info!(queue = %queue_name, "consumer stopped");
}

fn decode_event(raw: &[u8]) -> Result<Event> {
    serde_json::from_slice(raw).map_err(|e| Error::Malformed(e.to_string()))
}

/// Groups a flushed batch by `event_type` and invokes every subscribing
/// handler once per group, concurrently. A handler failure is logged and
/// never poisons the others, nor is the event re-queued.
async fn flush(bus: &Arc<EventBus>, batch: Vec<Event>) {
    let mut by_type: HashMap<EventType, Vec<Event>> = HashMap::new();
    for event in batch {
        by_type.entry(event.event_type).or_default().push(event);
    }

    for (event_type, events) in by_type {
        let handlers = bus.handlers.read().await.get(&event_type).cloned().unwrap_or_default();
        if handlers.is_empty() {
            warn!(?event_type, count = events.len(), "no handlers subscribed for event type, dropping batch");
            continue;
        }

        let dispatches = handlers.into_iter().map(|handler| {
            let events = events.clone();
            async move {
                if let Err(error) = handler.handle(events).await {
                    warn!(?event_type, %error, "handler failed");
                }
            }
        });
        futures::future::join_all(dispatches).await;
    }
}
