//! Test Event Producer
//!
//! Simulates a population of users, derives the novelty flags and 60-second
//! velocity from each user's history, and publishes scoring events to NATS.

use anyhow::Context;
use chrono::{DateTime, Duration as ChronoDuration, Timelike, Utc};
use clap::Parser;
use fraud_scoring::types::{ScoringEvent, TransactionRecord};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const COUNTRIES: [&str; 6] = ["US", "IN", "GB", "CA", "DE", "SG"];

/// Sliding window for the velocity feature
const VELOCITY_WINDOW_SECS: i64 = 60;

#[derive(Debug, Parser)]
#[command(name = "test-producer", about = "Publish synthetic scoring events")]
struct Args {
    #[arg(long, default_value = "nats://localhost:4222")]
    nats_url: String,

    #[arg(long, default_value = "transactions")]
    subject: String,

    /// Number of events to publish
    #[arg(long, default_value_t = 100)]
    count: u64,

    /// Share of events generated with fraud-like behaviour
    #[arg(long, default_value_t = 0.02)]
    fraud_rate: f64,

    /// Size of the simulated user population
    #[arg(long, default_value_t = 2000)]
    users: usize,

    /// Delay between events
    #[arg(long, default_value_t = 100)]
    delay_ms: u64,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Log events instead of publishing them
    #[arg(long)]
    dry_run: bool,
}

/// What the store remembers about one user
#[derive(Debug, Default)]
struct UserProfile {
    countries: HashSet<String>,
    devices: HashSet<String>,
    recent: VecDeque<DateTime<Utc>>,
}

/// Behavioural features derived for one transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Derived {
    country_novelty: u8,
    device_novelty: u8,
    velocity: u32,
}

/// Per-user history keyed by user id
#[derive(Debug, Default)]
struct UserProfileStore {
    profiles: HashMap<String, UserProfile>,
}

impl UserProfileStore {
    /// Record a known country and device without producing features.
    fn enroll(&mut self, user_id: &str, country: &str, device: &str) {
        let profile = self.profiles.entry(user_id.to_string()).or_default();
        profile.countries.insert(country.to_string());
        profile.devices.insert(device.to_string());
    }

    /// Derive features for a transaction and fold it into the history.
    ///
    /// Velocity counts this transaction plus earlier ones inside the window.
    fn observe(&mut self, user_id: &str, country: &str, device: &str, at: DateTime<Utc>) -> Derived {
        let profile = self.profiles.entry(user_id.to_string()).or_default();

        let country_novelty = u8::from(profile.countries.insert(country.to_string()));
        let device_novelty = u8::from(profile.devices.insert(device.to_string()));

        let cutoff = at - ChronoDuration::seconds(VELOCITY_WINDOW_SECS);
        while profile.recent.front().is_some_and(|&t| t <= cutoff) {
            profile.recent.pop_front();
        }
        profile.recent.push_back(at);

        Derived {
            country_novelty,
            device_novelty,
            velocity: profile.recent.len() as u32,
        }
    }
}

struct EventGenerator {
    rng: StdRng,
    users: Vec<(String, String, String)>,
    store: UserProfileStore,
    base_amount: Normal<f64>,
    fraud_rate: f64,
    counter: u64,
}

impl EventGenerator {
    fn new(users: usize, fraud_rate: f64, seed: u64) -> anyhow::Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut store = UserProfileStore::default();
        let users: Vec<_> = (0..users.max(1))
            .map(|n| {
                let user_id = format!("u{n:05}");
                let country = COUNTRIES[rng.gen_range(0..COUNTRIES.len())].to_string();
                let device = format!("dev_{:016x}", rng.gen::<u64>());
                store.enroll(&user_id, &country, &device);
                (user_id, country, device)
            })
            .collect();

        Ok(Self {
            rng,
            users,
            store,
            base_amount: Normal::new(40.0, 20.0)?,
            fraud_rate,
            counter: 0,
        })
    }

    fn other_country(&mut self, home: &str) -> String {
        let candidates: Vec<&str> = COUNTRIES.iter().copied().filter(|c| *c != home).collect();
        candidates[self.rng.gen_range(0..candidates.len())].to_string()
    }

    /// Next event and whether it was generated as fraud
    fn next_event(&mut self, at: DateTime<Utc>) -> (ScoringEvent, bool) {
        self.counter += 1;
        let idx = self.rng.gen_range(0..self.users.len());
        let (user_id, home_country, home_device) = self.users[idx].clone();

        let is_fraud = self.rng.gen_bool(self.fraud_rate);
        let mut amount = self.base_amount.sample(&mut self.rng).abs().max(1.0);
        if is_fraud {
            amount *= self.rng.gen_range(5.0..20.0);
        }

        let country_drift = if is_fraud { 0.50 } else { 0.03 };
        let country = if self.rng.gen_bool(country_drift) {
            self.other_country(&home_country)
        } else {
            home_country
        };

        let device_drift = if is_fraud { 0.60 } else { 0.02 };
        let device = if self.rng.gen_bool(device_drift) {
            format!("dev_{:016x}", self.rng.gen::<u64>())
        } else {
            home_device
        };

        let derived = self.store.observe(&user_id, &country, &device, at);
        let event = ScoringEvent {
            transaction_id: format!("tx_{:012}", self.counter),
            record: TransactionRecord::new(
                (amount * 100.0).round() / 100.0,
                at.hour() as u8,
                derived.country_novelty,
                derived.device_novelty,
                derived.velocity,
            ),
        };
        (event, is_fraud)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("test_producer=info"),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    if !(0.0..=1.0).contains(&args.fraud_rate) {
        anyhow::bail!("--fraud-rate must be within [0, 1], got {}", args.fraud_rate);
    }
    info!(
        nats_url = %args.nats_url,
        subject = %args.subject,
        count = args.count,
        fraud_rate = args.fraud_rate,
        users = args.users,
        delay_ms = args.delay_ms,
        dry_run = args.dry_run,
        "Starting Test Event Producer"
    );

    let client = if args.dry_run {
        None
    } else {
        match async_nats::connect(&args.nats_url).await {
            Ok(c) => {
                info!("Connected to NATS");
                Some(c)
            }
            Err(e) => {
                warn!(error = %e, "Failed to connect to NATS. Running in dry-run mode.");
                None
            }
        }
    };

    let mut generator = EventGenerator::new(args.users, args.fraud_rate, args.seed)?;
    let step = ChronoDuration::milliseconds(args.delay_ms.max(1) as i64);
    let mut clock = Utc::now();
    let mut suspicious_count = 0u64;

    for i in 0..args.count {
        let (event, is_fraud) = generator.next_event(clock);
        clock += step;
        if is_fraud {
            suspicious_count += 1;
        }

        match &client {
            Some(client) => {
                let payload = serde_json::to_vec(&event)?;
                client
                    .publish(args.subject.clone(), payload.into())
                    .await
                    .context("Failed to publish event")?;
            }
            None => info!(
                transaction_id = %event.transaction_id,
                amount = event.record.amount,
                hour = event.record.hour,
                country_novelty = event.record.country_novelty,
                device_novelty = event.record.device_novelty,
                velocity = event.record.user_velocity_60s,
                suspicious = is_fraud,
                "[DRY-RUN] Generated event"
            ),
        }

        if (i + 1) % 10 == 0 {
            info!(
                "Produced {}/{} events ({} suspicious)",
                i + 1,
                args.count,
                suspicious_count
            );
        }

        tokio::time::sleep(Duration::from_millis(args.delay_ms)).await;
    }

    if let Some(client) = client {
        client.flush().await.context("Failed to flush NATS client")?;
    }
    info!(
        "Completed! Produced {} events ({} suspicious)",
        args.count, suspicious_count
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_country_and_device_are_not_novel() {
        let mut store = UserProfileStore::default();
        store.enroll("u1", "US", "dev_a");

        let derived = store.observe("u1", "US", "dev_a", Utc::now());

        assert_eq!(derived.country_novelty, 0);
        assert_eq!(derived.device_novelty, 0);
        assert_eq!(derived.velocity, 1);
    }

    #[test]
    fn test_novelty_is_reported_once() {
        let mut store = UserProfileStore::default();
        store.enroll("u1", "US", "dev_a");
        let now = Utc::now();

        let first = store.observe("u1", "DE", "dev_b", now);
        let second = store.observe("u1", "DE", "dev_b", now);

        assert_eq!((first.country_novelty, first.device_novelty), (1, 1));
        assert_eq!((second.country_novelty, second.device_novelty), (0, 0));
    }

    #[test]
    fn test_velocity_window_slides() {
        let mut store = UserProfileStore::default();
        let t0 = Utc::now();

        store.observe("u1", "US", "dev_a", t0);
        store.observe("u1", "US", "dev_a", t0 + ChronoDuration::seconds(30));
        let in_window = store.observe("u1", "US", "dev_a", t0 + ChronoDuration::seconds(59));
        let after = store.observe("u1", "US", "dev_a", t0 + ChronoDuration::seconds(95));

        assert_eq!(in_window.velocity, 3);
        // t0 and t0+30s have aged out; t0+59s and this one remain.
        assert_eq!(after.velocity, 2);
    }

    #[test]
    fn test_users_are_independent() {
        let mut store = UserProfileStore::default();
        let now = Utc::now();

        store.observe("u1", "US", "dev_a", now);
        let other = store.observe("u2", "US", "dev_a", now);

        assert_eq!(other.velocity, 1);
        assert_eq!(other.country_novelty, 1);
    }

    #[test]
    fn test_generated_events_are_valid() {
        let mut generator = EventGenerator::new(50, 0.3, 7).unwrap();
        let start = Utc::now();

        for i in 0..500 {
            let (event, _) = generator.next_event(start + ChronoDuration::milliseconds(i * 100));
            assert!(event.record.validate().is_ok());
            assert!(event.record.user_velocity_60s >= 1);
        }
    }
}
