//! Event bus (C6): a multi-queue consumer over the broker gateway,
//! routing typed events to batch handlers with at-least-once delivery up
//! to the pop, at-most-once after. Grounded on
//! `original_source/src/events/event_bus.py`.
//!
//! Model: N named queues, each with a `batch_size`. Each event type binds
//! to at most one queue. Each queue may carry several event types, each
//! with its own set of subscribing handlers.

mod consumer;

use async_trait::async_trait;
use consumer::run_consumer;
use predictor_broker::Broker;
use predictor_common::{Error, Event, EventType, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{info, warn};

/// A batch handler for one or more event types. Implementations are
/// invoked once per `(event_type, batch)` pairing within a flushed batch;
/// a handler failure is caught and logged, never propagated to the
/// consumer loop.
#[async_trait]
pub trait Handler: Send + Sync {
    fn event_types(&self) -> Vec<EventType>;
    async fn handle(&self, events: Vec<Event>) -> Result<()>;
}

/// The default per-item pop timeout used while accumulating a batch
/// (~100ms).
pub const DEFAULT_POP_TIMEOUT: Duration = Duration::from_millis(100);

struct QueueState {
    batch_size: usize,
}

/// Multi-queue event bus: registration/subscription state plus the
/// running consumer tasks.
pub struct EventBus {
    broker: Arc<dyn Broker>,
    queues: RwLock<HashMap<String, QueueState>>,
    bindings: RwLock<HashMap<EventType, String>>,
    handlers: RwLock<HashMap<EventType, Vec<Arc<dyn Handler>>>>,
    running: Arc<AtomicBool>,
    consumer_tasks: Mutex<Vec<JoinHandle<()>>>,
    pop_timeout: Duration,
}

impl EventBus {
    pub fn new(broker: Arc<dyn Broker>) -> Arc<Self> {
        Self::with_pop_timeout(broker, DEFAULT_POP_TIMEOUT)
    }

    pub fn with_pop_timeout(broker: Arc<dyn Broker>, pop_timeout: Duration) -> Arc<Self> {
        Arc::new(EventBus {
            broker,
            queues: RwLock::new(HashMap::new()),
            bindings: RwLock::new(HashMap::new()),
            handlers: RwLock::new(HashMap::new()),
            running: Arc::new(AtomicBool::new(false)),
            consumer_tasks: Mutex::new(Vec::new()),
            pop_timeout,
        })
    }

    /// `register_queue(name, batch_size)` — idempotent; a later call for
    /// the same name is a no-op.
    pub async fn register_queue(&self, name: &str, batch_size: usize) {
        let mut queues = self.queues.write().await;
        if queues.contains_key(name) {
            return;
        }
        queues.insert(name.to_string(), QueueState { batch_size });
    }

    /// `subscribe(queue_name, handler)` — installs a binding for each of
    /// the handler's event types. Fails `QueueBindingConflict` if an
    /// event type is already bound to a different queue.
    pub async fn subscribe(&self, queue_name: &str, handler: Arc<dyn Handler>) -> Result<()> {
        if !self.queues.read().await.contains_key(queue_name) {
            return Err(Error::QueueBindingConflict(format!(
                "queue '{queue_name}' is not registered"
            )));
        }

        let mut bindings = self.bindings.write().await;
        for event_type in handler.event_types() {
            if let Some(existing) = bindings.get(&event_type) {
                if existing != queue_name {
                    return Err(Error::QueueBindingConflict(format!(
                        "{event_type:?} already bound to queue '{existing}', cannot rebind to '{queue_name}'"
                    )));
                }
            } else {
                bindings.insert(event_type, queue_name.to_string());
            }
        }
        drop(bindings);

        let mut handlers = self.handlers.write().await;
        for event_type in handler.event_types() {
            handlers.entry(event_type).or_default().push(Arc::clone(&handler));
        }
        Ok(())
    }

    /// `publish(event)` — serialises to JSON and right-pushes onto the
    /// event's bound queue.
    pub async fn publish(&self, event: &Event) -> Result<()> {
        let queue_name = self
            .bindings
            .read()
            .await
            .get(&event.event_type)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("no queue bound for event type {:?}", event.event_type)))?;

        let payload = serde_json::to_vec(event)?;
        self.broker.push(&queue_name, &payload).await
    }

    /// `start()` — verifies broker reachability, then spawns one consumer
    /// task per registered queue.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        self.broker.ping().await?;
        self.running.store(true, Ordering::SeqCst);

        let queue_names: Vec<(String, usize)> = self
            .queues
            .read()
            .await
            .iter()
            .map(|(name, state)| (name.clone(), state.batch_size))
            .collect();

        let mut tasks = self.consumer_tasks.lock().await;
        for (queue_name, batch_size) in queue_names {
            let bus = Arc::clone(self);
            let running = Arc::clone(&self.running);
            let pop_timeout = self.pop_timeout;
            tasks.push(tokio::spawn(async move {
                run_consumer(bus, queue_name, batch_size, running, pop_timeout).await;
            }));
        }

        info!(queues = tasks.len(), "event bus started");
        Ok(())
    }

    /// `stop()` — flips the running flag, cancels all consumer tasks, and
    /// awaits their termination. Events already popped from the broker
    /// but not yet delivered to a handler are lost.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let mut tasks = self.consumer_tasks.lock().await;
        for task in tasks.drain(..) {
            if let Err(error) = task.await {
                warn!(%error, "consumer task join failed during shutdown");
            }
        }
        info!("event bus stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct FakeBroker {
        pushed: StdMutex<Vec<(String, Vec<u8>)>>,
    }

    #[async_trait]
    impl Broker for FakeBroker {
        async fn push(&self, queue: &str, payload: &[u8]) -> Result<()> {
            self.pushed.lock().unwrap().push((queue.to_string(), payload.to_vec()));
            Ok(())
        }
        async fn blocking_pop(&self, _queue: &str, _timeout: Duration) -> Result<Option<Vec<u8>>> {
            Ok(None)
        }
        async fn ping(&self) -> Result<()> {
            Ok(())
        }
    }

    struct NoopHandler(Vec<EventType>);

    #[async_trait]
    impl Handler for NoopHandler {
        fn event_types(&self) -> Vec<EventType> {
            self.0.clone()
        }
        async fn handle(&self, _events: Vec<Event>) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn register_queue_is_idempotent() {
        let bus = EventBus::new(Arc::new(FakeBroker { pushed: StdMutex::new(Vec::new()) }));
        bus.register_queue("articles", 10).await;
        bus.register_queue("articles", 999).await;
        assert_eq!(bus.queues.read().await.get("articles").unwrap().batch_size, 10);
    }

    #[tokio::test]
    async fn subscribe_without_registered_queue_fails() {
        let bus = EventBus::new(Arc::new(FakeBroker { pushed: StdMutex::new(Vec::new()) }));
        let err = bus
            .subscribe("missing", Arc::new(NoopHandler(vec![EventType::ArticlesEvent])))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::QueueBindingConflict(_)));
    }

    #[tokio::test]
    async fn conflicting_event_type_binding_fails() {
        let bus = EventBus::new(Arc::new(FakeBroker { pushed: StdMutex::new(Vec::new()) }));
        bus.register_queue("articles", 10).await;
        bus.register_queue("metrics", 10).await;
        bus.subscribe("articles", Arc::new(NoopHandler(vec![EventType::ArticlesEvent]))).await.unwrap();

        let err = bus
            .subscribe("metrics", Arc::new(NoopHandler(vec![EventType::ArticlesEvent])))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::QueueBindingConflict(_)));
    }

    #[tokio::test]
    async fn publish_routes_to_bound_queue() {
        let broker = Arc::new(FakeBroker { pushed: StdMutex::new(Vec::new()) });
        let bus = EventBus::new(broker.clone());
        bus.register_queue("articles", 10).await;
        bus.subscribe("articles", Arc::new(NoopHandler(vec![EventType::ArticlesEvent]))).await.unwrap();

        let event = Event::article(predictor_common::ArticlePayload {
            id: "a1".to_string(),
            title: Some("hello".to_string()),
            description: None,
        });
        bus.publish(&event).await.unwrap();

        let pushed = broker.pushed.lock().unwrap();
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0].0, "articles");
    }

    #[tokio::test]
    async fn publish_without_binding_fails() {
        let bus = EventBus::new(Arc::new(FakeBroker { pushed: StdMutex::new(Vec::new()) }));
        let event = Event::metric(predictor_common::MetricPayload {
            metric_name: "x".to_string(),
            metric_value: 1.0,
            tags: HashMap::new(),
        });
        assert!(bus.publish(&event).await.is_err());
    }
}
