//! predictor-admin server binary: connects the document store and queue
//! broker, boots the configured predictor runtimes, starts the event bus
//! and article pipeline, and serves the traffic-mutation admin API.
//! Grounded on `mcp-gateway/src/bin/main.rs`'s CLI/tracing-init/graceful
//! -shutdown shape.

use clap::{Arg, ArgAction, Command};
use predictor_admin::{AppStateInner, Server};
use predictor_broker::{Broker, RedisBroker};
use predictor_bus::EventBus;
use predictor_common::{retry_operation, Result, RetryStrategy, Settings};
use predictor_metrics::MetricsSink;
use predictor_pipeline::ArticlesHandler;
use predictor_registry::Registry;
use predictor_router::TrafficRouter;
use predictor_runtime::predictors::{
    InferenceBackend, NewsClassificationV2, SentimentAnalysisV1, SentimentAnalysisV2, CANDIDATE_LABELS,
};
use predictor_runtime::{PredictorRuntime, RuntimeHandle};
use predictor_store::Store;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("fatal: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let matches = Command::new("predictor-admin")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Predictor serving and traffic-split admin API")
        .arg(
            Arg::new("bind")
                .short('b')
                .long("bind")
                .value_name("ADDRESS")
                .help("Override the bind address (default: 0.0.0.0:<API_PORT>)"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Force debug-level logging regardless of LOGGING_LEVEL"),
        )
        .get_matches();

    let settings = Settings::from_env()?;
    init_tracing(&settings, matches.get_flag("verbose"));
    info!(version = env!("CARGO_PKG_VERSION"), "starting predictor-admin");

    let store = retry_operation("document store connect", RetryStrategy::exponential_backoff(), || {
        Store::connect(&settings.mongo_url, &settings.mongo_database_name)
    })
    .await?;
    store.ensure_indexes().await?;

    let broker: Arc<dyn Broker> = Arc::new(
        retry_operation("queue broker connect", RetryStrategy::exponential_backoff(), || {
            RedisBroker::connect(&settings.redis_url)
        })
        .await?,
    );

    let registry = Registry::new(&store);
    let metrics = MetricsSink::new(&store);
    let router = TrafficRouter::new(store.clone(), registry.clone(), metrics.clone(), settings.max_traffic_threshold);

    let runtimes = boot_predictor_runtimes(&settings, &store, &registry, &metrics).await?;

    let articles_handler = Arc::new(ArticlesHandler::new(
        &store,
        registry.clone(),
        runtimes,
        vec!["sentiment_analysis".to_string(), "news_classification".to_string()],
        settings.concurrent_predictions,
    ));

    let bus = EventBus::new(broker.clone());
    bus.register_queue(&settings.queue_articles, settings.event_batch_size).await;
    bus.subscribe(&settings.queue_articles, articles_handler).await?;
    bus.start().await?;

    let app_state = AppStateInner::new(router, store, broker);

    let shutdown = Arc::new(Notify::new());
    let shutdown_for_signal = Arc::clone(&shutdown);
    let bus_for_signal = Arc::clone(&bus);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            error!("failed to install ctrl-c handler");
            return;
        }
        info!("received shutdown signal, draining event bus and http listener");
        bus_for_signal.stop().await;
        shutdown_for_signal.notify_one();
    });

    let bind_addr = matches
        .get_one::<String>("bind")
        .cloned()
        .unwrap_or_else(|| format!("0.0.0.0:{}", settings.api_port));

    let server = Server::new(app_state, shutdown);
    server.run(&bind_addr).await?;

    info!("predictor-admin shut down cleanly");
    Ok(())
}

/// Boots every concrete predictor this process hosts: constructs its
/// capability, wraps it in a `PredictorRuntime`, runs `setup()` so it is
/// registered (or re-validated) against the document store, and returns
/// the object-safe handles the article pipeline dispatches through.
async fn boot_predictor_runtimes(
    settings: &Settings,
    store: &Store,
    registry: &Registry,
    metrics: &MetricsSink,
) -> Result<Vec<Arc<dyn RuntimeHandle>>> {
    let weights_root = PathBuf::from(&settings.weights_path);
    let unload_timeout = Duration::from_secs(settings.unload_timeout_seconds);

    let v1 = PredictorRuntime::new(
        SentimentAnalysisV1::new(inference_backend()),
        registry.clone(),
        store.clone(),
        metrics.clone(),
        weights_root.clone(),
        "baseline sentiment analysis model",
        unload_timeout,
    );
    v1.setup().await?;

    let v2 = PredictorRuntime::new(
        SentimentAnalysisV2::new(inference_backend()),
        registry.clone(),
        store.clone(),
        metrics.clone(),
        weights_root.clone(),
        "quantized sentiment analysis model",
        unload_timeout,
    );
    v2.setup().await?;

    let news_v2 = PredictorRuntime::new(
        NewsClassificationV2::new(news_inference_backend()),
        registry.clone(),
        store.clone(),
        metrics.clone(),
        weights_root,
        "zero-shot news classification model",
        unload_timeout,
    );
    news_v2.setup().await?;

    Ok(vec![Arc::new(v1), Arc::new(v2), Arc::new(news_v2)])
}

fn inference_backend() -> Arc<dyn InferenceBackend> {
    Arc::new(LexiconInferenceBackend)
}

fn news_inference_backend() -> Arc<dyn InferenceBackend> {
    Arc::new(NewsLexiconInferenceBackend)
}

/// Minimal heuristic stand-in for the real `nlptown/bert-...` inference
/// call, which sits out of scope for this system. Scores text by a tiny
/// fixed lexicon so the pipeline is exercisable end-to-end without a
/// model dependency; wire a real client behind `InferenceBackend` for
/// production deployments.
struct LexiconInferenceBackend;

const POSITIVE_WORDS: &[&str] = &["good", "great", "excellent", "love", "happy", "positive", "amazing"];
const NEGATIVE_WORDS: &[&str] = &["bad", "terrible", "hate", "awful", "negative", "poor", "worst"];

#[async_trait::async_trait]
impl InferenceBackend for LexiconInferenceBackend {
    async fn infer(&self, text: &str) -> Result<(String, f64, f64)> {
        let lower = text.to_lowercase();
        let positive_hits = POSITIVE_WORDS.iter().filter(|word| lower.contains(*word)).count();
        let negative_hits = NEGATIVE_WORDS.iter().filter(|word| lower.contains(*word)).count();

        let (value, confidence) = match positive_hits.cmp(&negative_hits) {
            std::cmp::Ordering::Greater => ("positive", 0.6 + 0.1 * positive_hits.min(3) as f64),
            std::cmp::Ordering::Less => ("negative", 0.6 + 0.1 * negative_hits.min(3) as f64),
            std::cmp::Ordering::Equal => ("neutral", 0.5),
        };
        let price = text.len() as f64 * 0.001;
        Ok((value.to_string(), confidence.min(0.99), price))
    }
}

/// Minimal heuristic stand-in for the real ONNX zero-shot classifier:
/// scores each candidate label by keyword overlap with the input and
/// returns the best match with a synthetic confidence, rather than the
/// full ranked-label distribution the reference predictor returns.
struct NewsLexiconInferenceBackend;

const NEWS_KEYWORDS: &[(&str, &[&str])] = &[
    ("politics", &["election", "senate", "government", "president", "policy"]),
    ("business", &["market", "company", "earnings", "stock", "ipo"]),
    ("technology", &["software", "chip", "startup", "ai", "app"]),
    ("sports", &["match", "tournament", "league", "score", "team"]),
    ("health", &["hospital", "vaccine", "disease", "treatment", "patient"]),
    ("science", &["research", "study", "discovery", "experiment", "nasa"]),
    ("weather", &["storm", "forecast", "rain", "temperature", "hurricane"]),
];

#[async_trait::async_trait]
impl InferenceBackend for NewsLexiconInferenceBackend {
    async fn infer(&self, text: &str) -> Result<(String, f64, f64)> {
        let lower = text.to_lowercase();
        let mut best_label = CANDIDATE_LABELS[0];
        let mut best_hits = 0usize;
        for (label, keywords) in NEWS_KEYWORDS {
            let hits = keywords.iter().filter(|word| lower.contains(*word)).count();
            if hits > best_hits {
                best_hits = hits;
                best_label = label;
            }
        }
        let confidence = if best_hits == 0 { 1.0 / CANDIDATE_LABELS.len() as f64 } else { (0.5 + 0.15 * best_hits as f64).min(0.95) };
        Ok((best_label.to_string(), confidence, 0.0))
    }
}

fn init_tracing(settings: &Settings, verbose: bool) {
    let level = if verbose { "debug".to_string() } else { settings.logging_level.clone() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}
