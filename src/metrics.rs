//! Performance metrics and statistics tracking for the scoring service.

use crate::error::ScoringError;
use crate::types::score::{Confidence, ScoreResult};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Latency samples kept before the oldest half is discarded
const LATENCY_WINDOW: usize = 10_000;

/// Metrics collector shared by the HTTP surface and the streaming lane
pub struct ScoringMetrics {
    /// Successfully scored transactions
    pub scored: AtomicU64,
    /// Scored transactions at or above the threshold
    pub flagged: AtomicU64,
    /// Requests refused because no model is loaded
    pub unavailable: AtomicU64,
    /// Records rejected by validation
    pub invalid: AtomicU64,
    /// Evaluation failures
    pub errors: AtomicU64,
    /// Redelivered events skipped by the streaming lane
    pub duplicates: AtomicU64,
    /// Streamed events flagged by rule although the model cleared them
    pub escalated: AtomicU64,
    confidence_low: AtomicU64,
    confidence_medium: AtomicU64,
    confidence_high: AtomicU64,
    /// Scoring latency (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Fraud probability distribution buckets
    probability_buckets: RwLock<[u64; 10]>,
    start_time: Instant,
}

impl ScoringMetrics {
    pub fn new() -> Self {
        Self {
            scored: AtomicU64::new(0),
            flagged: AtomicU64::new(0),
            unavailable: AtomicU64::new(0),
            invalid: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            duplicates: AtomicU64::new(0),
            escalated: AtomicU64::new(0),
            confidence_low: AtomicU64::new(0),
            confidence_medium: AtomicU64::new(0),
            confidence_high: AtomicU64::new(0),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            probability_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record a successful score
    pub fn record_score(&self, processing_time: Duration, result: &ScoreResult) {
        self.scored.fetch_add(1, Ordering::Relaxed);
        if result.is_fraud {
            self.flagged.fetch_add(1, Ordering::Relaxed);
        }
        match result.confidence {
            Confidence::Low => &self.confidence_low,
            Confidence::Medium => &self.confidence_medium,
            Confidence::High => &self.confidence_high,
        }
        .fetch_add(1, Ordering::Relaxed);

        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_micros() as u64);
            if times.len() > LATENCY_WINDOW {
                times.drain(0..LATENCY_WINDOW / 2);
            }
        }

        let bucket = ((result.fraud_probability * 10.0) as usize).min(9);
        if let Ok(mut buckets) = self.probability_buckets.write() {
            buckets[bucket] += 1;
        }
    }

    /// Record a failed scoring attempt
    pub fn record_failure(&self, error: &ScoringError) {
        let counter = match error {
            ScoringError::ModelUnavailable => &self.unavailable,
            ScoringError::InvalidRecord(_) => &self.invalid,
            ScoringError::Evaluation(_) => &self.errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_escalation(&self) {
        self.escalated.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the outcome of one scoring call
    pub fn record(&self, processing_time: Duration, outcome: &Result<ScoreResult, ScoringError>) {
        match outcome {
            Ok(result) => self.record_score(processing_time, result),
            Err(e) => self.record_failure(e),
        }
    }

    /// Get processing time statistics
    pub fn get_processing_stats(&self) -> ProcessingStats {
        let mut sorted: Vec<u64> = match self.processing_times.read() {
            Ok(times) => times.clone(),
            Err(_) => return ProcessingStats::default(),
        };
        if sorted.is_empty() {
            return ProcessingStats::default();
        }
        sorted.sort_unstable();

        let count = sorted.len();
        let sum: u64 = sorted.iter().sum();
        let at = |q: f64| sorted[((count as f64 * q) as usize).min(count - 1)];

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: at(0.50),
            p95_us: at(0.95),
            p99_us: at(0.99),
            max_us: sorted[count - 1],
        }
    }

    /// Scored transactions per second since startup
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.scored.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn get_probability_distribution(&self) -> [u64; 10] {
        self.probability_buckets
            .read()
            .map(|buckets| *buckets)
            .unwrap_or_default()
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.start_time.elapsed().as_secs(),
            scored: self.scored.load(Ordering::Relaxed),
            flagged: self.flagged.load(Ordering::Relaxed),
            unavailable: self.unavailable.load(Ordering::Relaxed),
            invalid: self.invalid.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            escalated: self.escalated.load(Ordering::Relaxed),
            confidence: ConfidenceCounts {
                low: self.confidence_low.load(Ordering::Relaxed),
                medium: self.confidence_medium.load(Ordering::Relaxed),
                high: self.confidence_high.load(Ordering::Relaxed),
            },
            throughput: self.get_throughput(),
            latency: self.get_processing_stats(),
            probability_distribution: self.get_probability_distribution(),
        }
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let snapshot = self.snapshot();
        let flag_rate = if snapshot.scored > 0 {
            (snapshot.flagged as f64 / snapshot.scored as f64) * 100.0
        } else {
            0.0
        };
        let latency = &snapshot.latency;

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║              FRAUD SCORING SERVICE - METRICS SUMMARY         ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Transactions Scored: {:>8}  │  Throughput: {:>6.1} tx/s    ║",
            snapshot.scored, snapshot.throughput
        );
        info!(
            "║ Flagged as Fraud:    {:>8}  │  Flag Rate:  {:>6.1}%        ║",
            snapshot.flagged, flag_rate
        );
        info!(
            "║ Refused: unavailable={:>6} invalid={:>6} errors={:>6}      ║",
            snapshot.unavailable, snapshot.invalid, snapshot.errors
        );
        info!(
            "║ Escalated by rule:   {:>8}  │  Duplicates: {:>8}        ║",
            snapshot.escalated, snapshot.duplicates
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Latency (μs): mean={:>5} p50={:>5} p95={:>5} p99={:>5}       ║",
            latency.mean_us, latency.p50_us, latency.p95_us, latency.p99_us
        );
        info!(
            "║ Confidence: low={:>8} medium={:>8} high={:>8}        ║",
            snapshot.confidence.low, snapshot.confidence.medium, snapshot.confidence.high
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Fraud Probability Distribution:                              ║");
        let total: u64 = snapshot.probability_distribution.iter().sum();
        for (i, &count) in snapshot.probability_distribution.iter().enumerate() {
            let pct = if total > 0 { (count as f64 / total as f64) * 100.0 } else { 0.0 };
            let bar: String = "█".repeat(((pct / 2.0) as usize).min(20));
            info!(
                "║   {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                i as f64 / 10.0,
                (i + 1) as f64 / 10.0,
                count,
                pct,
                bar
            );
        }
        info!("╚══════════════════════════════════════════════════════════════╝");
    }
}

impl Default for ScoringMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Processing time statistics
#[derive(Debug, Default, Clone, Serialize)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct ConfidenceCounts {
    pub low: u64,
    pub medium: u64,
    pub high: u64,
}

/// Served by `GET /metrics`
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub scored: u64,
    pub flagged: u64,
    pub unavailable: u64,
    pub invalid: u64,
    pub errors: u64,
    pub duplicates: u64,
    pub escalated: u64,
    pub confidence: ConfidenceCounts,
    pub throughput: f64,
    pub latency: ProcessingStats,
    pub probability_distribution: [u64; 10],
}

/// Real-time metrics reporter that prints periodic summaries
pub struct MetricsReporter {
    metrics: Arc<ScoringMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<ScoringMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs.max(1)));
        // The first tick fires immediately; skip the empty summary.
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}
