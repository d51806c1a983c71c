//! Fraud Scoring Service - Main Entry Point
//!
//! Loads the model artifact and operating threshold once, then serves scoring
//! over HTTP and, when enabled, over NATS with bounded parallelism.

use anyhow::{Context, Result};
use fraud_scoring::{
    api::{self, AppState},
    config::{AppConfig, LoggingConfig, NatsConfig},
    consumer::{connect_optional, decode_event, EventConsumer},
    dedup::DuplicateFilter,
    metrics::{MetricsReporter, ScoringMetrics},
    models::ModelLoader,
    producer::DecisionProducer,
    scoring::ScoringService,
    threshold::ThresholdLoader,
};
use futures::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_tracing(&config.logging)?;

    info!("Starting Fraud Scoring Service");

    let model = ModelLoader::new(&config.model.artifact_path).load();
    let threshold =
        ThresholdLoader::new(config.model.threshold_path.clone(), &config.model.threshold_env).load();
    info!(
        model_loaded = model.is_loaded(),
        threshold = threshold.value(),
        source = %threshold.source(),
        "Scoring context ready"
    );

    let service = Arc::new(ScoringService::new(model, threshold));
    let metrics = Arc::new(ScoringMetrics::new());

    let reporter = MetricsReporter::new(metrics.clone(), config.pipeline.metrics_interval_secs);
    tokio::spawn(reporter.start());

    if config.nats.enabled {
        if let Some(client) = connect_optional(&config.nats.url).await {
            let service = service.clone();
            let metrics = metrics.clone();
            let nats = config.nats.clone();
            let workers = config.pipeline.workers;
            let dedup = Arc::new(DuplicateFilter::new(
                Duration::from_secs(config.pipeline.dedup_ttl_secs),
                config.pipeline.dedup_capacity,
            ));
            tokio::spawn(async move {
                if let Err(e) = run_stream(client, nats, workers, dedup, service, metrics).await {
                    error!(error = %e, "Streaming lane stopped");
                }
            });
        }
    }

    let app = api::router(AppState::new(service, metrics.clone()));
    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    info!("HTTP server listening on {}", config.server.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Service shutting down...");
    metrics.print_summary();

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(format!("fraud_scoring={}", logging.level))
            .context("Invalid logging.level")?,
    };

    if logging.is_json() {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

/// Consume scoring events and publish decisions until the subscription ends.
async fn run_stream(
    client: async_nats::Client,
    nats: NatsConfig,
    workers: usize,
    dedup: Arc<DuplicateFilter>,
    service: Arc<ScoringService>,
    metrics: Arc<ScoringMetrics>,
) -> Result<()> {
    let consumer = EventConsumer::new(client.clone(), &nats.transaction_subject);
    let producer = Arc::new(DecisionProducer::new(
        client,
        &nats.decision_subject,
        nats.publish_all,
    ));

    info!(
        "Starting streaming lane with {} parallel workers",
        workers
    );
    info!("Listening on subject: {}", consumer.subject());
    info!("Publishing decisions to: {}", producer.subject());

    // Semaphore to limit concurrent processing
    let semaphore = Arc::new(Semaphore::new(workers));
    let processed_count = Arc::new(AtomicU64::new(0));

    let mut subscription = consumer.subscribe().await?;

    while let Some(message) = subscription.next().await {
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .context("Worker semaphore closed")?;

        let service = service.clone();
        let producer = producer.clone();
        let metrics = metrics.clone();
        let processed_count = processed_count.clone();
        let dedup = dedup.clone();

        tokio::spawn(async move {
            let start_time = Instant::now();

            match decode_event(&message.payload) {
                Ok(event) if dedup.is_duplicate(&event.transaction_id) => {
                    metrics.record_duplicate();
                    debug!(transaction_id = %event.transaction_id, "Duplicate delivery skipped");
                }
                Ok(event) => {
                    let outcome = service.decide(&event);
                    let processing_time = start_time.elapsed();

                    match outcome {
                        Ok(decision) => {
                            metrics.record_score(processing_time, &decision.result);
                            if decision.escalated {
                                metrics.record_escalation();
                            }
                            match producer.publish(&decision).await {
                                Ok(true) => info!(
                                    transaction_id = %decision.transaction_id,
                                    fraud_probability = decision.result.fraud_probability,
                                    is_fraud = decision.result.is_fraud,
                                    escalated = decision.escalated,
                                    processing_time_us = processing_time.as_micros(),
                                    "Decision published"
                                ),
                                Ok(false) => debug!(
                                    transaction_id = %decision.transaction_id,
                                    fraud_probability = decision.result.fraud_probability,
                                    processing_time_us = processing_time.as_micros(),
                                    "Transaction cleared"
                                ),
                                Err(e) => error!(
                                    transaction_id = %decision.transaction_id,
                                    error = %e,
                                    "Failed to publish decision"
                                ),
                            }
                        }
                        Err(e) => {
                            metrics.record_failure(&e);
                            warn!(
                                transaction_id = %event.transaction_id,
                                error = %e,
                                "Scoring failed"
                            );
                        }
                    }

                    let count = processed_count.fetch_add(1, Ordering::Relaxed) + 1;
                    if count % 100 == 0 {
                        let stats = metrics.get_processing_stats();
                        info!(
                            processed = count,
                            throughput = format!("{:.1} tx/s", metrics.get_throughput()),
                            avg_latency_us = stats.mean_us,
                            "Processing milestone"
                        );
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Failed to deserialize scoring event");
                }
            }

            drop(permit);
        });
    }

    Ok(())
}
