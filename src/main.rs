//! circuit-guard demo driver.
//!
//! Drives a synthetic, flaky dependency through a `Guard` so the circuit
//! breaker, executor pool and fallbacks can be watched in the logs (and on
//! the Prometheus endpoint when metrics are enabled).
//!
//! ```text
//! circuit-guard --config guard.toml --watch --failure-rate 0.6 --rps 100
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use clap::Parser;
use rand::Rng;
use serde::Serialize;
use thiserror::Error;

use circuit_guard::config::loader::load_config;
use circuit_guard::config::watcher::{apply_updates, ConfigWatcher};
use circuit_guard::config::GuardConfig;
use circuit_guard::observability::{logging, metrics};
use circuit_guard::Guard;

#[derive(Parser)]
#[command(name = "circuit-guard")]
#[command(about = "Drive a synthetic flaky dependency through a circuit guard", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Reload the configuration file when it changes.
    #[arg(long)]
    watch: bool,

    /// Circuit name used for the synthetic dependency.
    #[arg(long, default_value = "demo")]
    circuit: String,

    /// How long to run, in seconds.
    #[arg(long, default_value_t = 30)]
    duration_secs: u64,

    /// Calls issued per second.
    #[arg(long, default_value_t = 50)]
    rps: u64,

    /// Probability that a call to the dependency fails (0.0 - 1.0).
    #[arg(long, default_value_t = 0.3)]
    failure_rate: f64,

    /// Upper bound of the simulated dependency latency in milliseconds.
    #[arg(long, default_value_t = 20)]
    latency_ms: u64,
}

#[derive(Debug, Error)]
#[error("synthetic dependency failure")]
struct SyntheticFailure;

/// A dependency that fails at a fixed rate and answers with jittered latency.
#[derive(Debug, Clone, Copy)]
struct FlakyDependency {
    failure_rate: f64,
    max_latency_ms: u64,
}

impl FlakyDependency {
    async fn call(self) -> Result<u64, SyntheticFailure> {
        let (fail, latency_ms) = {
            let mut rng = rand::thread_rng();
            (
                rng.gen_bool(self.failure_rate),
                rng.gen_range(0..=self.max_latency_ms),
            )
        };
        tokio::time::sleep(Duration::from_millis(latency_ms)).await;
        if fail {
            Err(SyntheticFailure)
        } else {
            // Zero is reserved for the fallback value.
            Ok(latency_ms + 1)
        }
    }
}

#[derive(Debug, Default)]
struct Tally {
    ok: AtomicU64,
    fallback: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Serialize)]
struct Summary {
    ok: u64,
    fallback: u64,
    failed: u64,
}

impl Tally {
    fn summary(&self) -> Summary {
        Summary {
            ok: self.ok.load(Ordering::Relaxed),
            fallback: self.fallback.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GuardConfig::default(),
    };

    logging::init_logging(&config.observability)?;
    tracing::info!("circuit-guard v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let guard = Guard::from_config(&config);

    // Keep the watcher alive for the whole run.
    let _watcher = match (&cli.config, cli.watch) {
        (Some(path), true) => {
            let (watcher, updates) = ConfigWatcher::new(path, config.clone());
            let handle = watcher.run()?;
            tokio::spawn(apply_updates(guard.clone(), updates));
            Some(handle)
        }
        (None, true) => {
            tracing::warn!("--watch requires --config; hot reload disabled");
            None
        }
        _ => None,
    };

    let dependency = FlakyDependency {
        failure_rate: cli.failure_rate.clamp(0.0, 1.0),
        max_latency_ms: cli.latency_ms,
    };
    let tally = Arc::new(Tally::default());

    tracing::info!(
        circuit = %cli.circuit,
        rps = cli.rps,
        failure_rate = dependency.failure_rate,
        duration_secs = cli.duration_secs,
        "Driving synthetic load"
    );

    let mut issue = tokio::time::interval(Duration::from_micros(1_000_000 / cli.rps.max(1)));
    let mut report = tokio::time::interval(Duration::from_secs(1));
    let stop = tokio::time::sleep(Duration::from_secs(cli.duration_secs));
    tokio::pin!(stop);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = issue.tick() => {
                let handle = guard.go_with_fallback(
                    &cli.circuit,
                    move || dependency.call(),
                    |err| async move {
                        tracing::trace!(error = %err, "Serving fallback");
                        Ok::<u64, SyntheticFailure>(0)
                    },
                );
                let tally = tally.clone();
                tokio::spawn(async move {
                    match handle.await {
                        Ok(0) => tally.fallback.fetch_add(1, Ordering::Relaxed),
                        Ok(_) => tally.ok.fetch_add(1, Ordering::Relaxed),
                        Err(_) => tally.failed.fetch_add(1, Ordering::Relaxed),
                    };
                });
            }
            _ = report.tick() => {
                for snapshot in guard.snapshots() {
                    tracing::info!(snapshot = %serde_json::to_string(&snapshot)?, "Circuit status");
                }
            }
            _ = &mut stop => break,
            _ = &mut ctrl_c => {
                tracing::info!("Interrupted");
                break;
            }
        }
    }

    println!("{}", serde_json::to_string_pretty(&tally.summary())?);
    println!("{}", serde_json::to_string_pretty(&guard.snapshots())?);

    tracing::info!("Shutdown complete");
    Ok(())
}
