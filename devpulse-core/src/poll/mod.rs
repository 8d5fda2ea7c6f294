//! Polling scheduler
//!
//! Periodically asks every configured [`SourceProvider`] for the
//! authenticated user's recent activity and feeds it through the
//! [`Ingestor`]. Webhooks can be missed or unconfigured; polling is the
//! safety net, and the dedup gate makes overlap between the two harmless.
//!
//! ## Cycle lifecycle
//!
//! ```text
//!   trigger ──► Idle ──(flag acquired)──► Running ──(all scans settled)──► Idle
//!                 │
//!                 └──(flag held)──► Skipped
//! ```
//!
//! At most one cycle runs at a time. A trigger that finds a cycle running
//! is dropped, never queued.

mod client;
pub mod github;
pub mod gitlab;
pub mod provider;

pub use github::GitHubProvider;
pub use gitlab::GitLabProvider;
pub use provider::{scan_provider, Identity, RemoteProject, ScanReport, SourceProvider};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::ingest::Ingestor;
use crate::types::Source;
use chrono::{DateTime, Utc};
use provider::scan_error;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

/// Result of one scheduler trigger.
#[derive(Debug)]
pub enum CycleOutcome {
    /// Another cycle was already running
    Skipped,
    /// The cycle ran to completion (possibly with provider failures)
    Completed(CycleReport),
}

/// Everything one cycle did, per provider.
#[derive(Debug, Default)]
pub struct CycleReport {
    /// Successful provider scans
    pub scans: Vec<ScanReport>,
    /// Providers whose scan failed as a whole
    pub failures: Vec<Error>,
    /// Providers skipped for lack of a credential
    pub unconfigured: Vec<Source>,
    pub duration: Duration,
}

impl CycleReport {
    /// Events stored across all providers.
    pub fn inserted(&self) -> usize {
        self.scans.iter().map(|s| s.inserted).sum()
    }

    /// Events dropped as duplicates across all providers.
    pub fn skipped(&self) -> usize {
        self.scans.iter().map(|s| s.skipped).sum()
    }
}

/// Clears the running flag when the cycle ends, however it ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives poll cycles over a set of providers.
pub struct PollScheduler {
    ingestor: Arc<Ingestor>,
    providers: Vec<Arc<dyn SourceProvider>>,
    lookback: chrono::Duration,
    scan_timeout: Duration,
    running: AtomicBool,
}

impl PollScheduler {
    pub fn new(
        ingestor: Arc<Ingestor>,
        providers: Vec<Arc<dyn SourceProvider>>,
        lookback: chrono::Duration,
        scan_timeout: Duration,
    ) -> Self {
        Self {
            ingestor,
            providers,
            lookback,
            scan_timeout,
            running: AtomicBool::new(false),
        }
    }

    /// Scheduler over the GitHub and GitLab providers described by `config`.
    pub fn from_config(config: &Config, ingestor: Arc<Ingestor>) -> Result<Self> {
        let providers: Vec<Arc<dyn SourceProvider>> = vec![
            Arc::new(GitHubProvider::new(&config.github)?),
            Arc::new(GitLabProvider::new(&config.gitlab)?),
        ];

        Ok(Self::new(
            ingestor,
            providers,
            config.polling.lookback(),
            config.polling.scan_timeout(),
        ))
    }

    /// Whether a cycle is in progress.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Whether any provider has a credential.
    pub fn has_configured_provider(&self) -> bool {
        self.providers.iter().any(|p| p.is_configured())
    }

    /// Run one cycle over the lookback window unless one is already running.
    ///
    /// Providers are scanned concurrently and every scan is awaited, so one
    /// provider's failure, timeout or panic never affects its siblings.
    pub async fn run_cycle(&self) -> CycleOutcome {
        self.cycle(Utc::now() - self.lookback, Some(self.scan_timeout))
            .await
    }

    /// Scan everything since `since`, walking every page the providers
    /// return. Shares the reentrancy guard with [`run_cycle`](Self::run_cycle)
    /// but has no scan timeout, since a long history takes as long as it takes.
    pub async fn backfill(&self, since: DateTime<Utc>) -> CycleOutcome {
        self.cycle(since, None).await
    }

    async fn cycle(&self, since: DateTime<Utc>, timeout: Option<Duration>) -> CycleOutcome {
        let Some(_guard) = RunningGuard::acquire(&self.running) else {
            tracing::info!("Polling already in progress, skipping this iteration");
            return CycleOutcome::Skipped;
        };

        let started = Instant::now();
        let mut report = CycleReport::default();
        let mut scans = JoinSet::new();

        tracing::info!(since = %since, "Starting poll cycle");

        for provider in &self.providers {
            let source = provider.source();
            if !provider.is_configured() {
                tracing::debug!(source = source.as_str(), "Skipping provider: no token configured");
                report.unconfigured.push(source);
                continue;
            }

            let provider = Arc::clone(provider);
            let ingestor = Arc::clone(&self.ingestor);

            scans.spawn(async move {
                let mut scan = tokio::spawn(async move {
                    scan_provider(provider.as_ref(), &ingestor, since).await
                });

                let joined = match timeout {
                    Some(timeout) => match tokio::time::timeout(timeout, &mut scan).await {
                        Ok(joined) => joined,
                        Err(_) => {
                            scan.abort();
                            let message = format!("timed out after {}s", timeout.as_secs());
                            return (source, Err(scan_error(source, message)));
                        }
                    },
                    None => (&mut scan).await,
                };

                let result = joined.unwrap_or_else(|join_error| {
                    Err(scan_error(
                        source,
                        format!("scan task failed: {}", join_error),
                    ))
                });
                (source, result)
            });
        }

        while let Some(joined) = scans.join_next().await {
            match joined {
                Ok((_, Ok(scan))) => report.scans.push(scan),
                Ok((source, Err(e))) => {
                    tracing::error!(source = source.as_str(), error = %e, "Provider polling failed");
                    report.failures.push(e);
                }
                Err(join_error) => {
                    tracing::error!(error = %join_error, "Provider task failed");
                }
            }
        }

        report.duration = started.elapsed();
        tracing::info!(
            inserted = report.inserted(),
            skipped = report.skipped(),
            failed_providers = report.failures.len(),
            duration_secs = report.duration.as_secs(),
            "Polling completed"
        );

        CycleOutcome::Completed(report)
    }

    /// Trigger a cycle every `interval` until `shutdown` resolves.
    ///
    /// The first cycle starts immediately. Each tick spawns its own cycle,
    /// so a slow cycle makes later ticks hit the reentrancy guard. Cycles
    /// in flight at shutdown are drained, not cancelled.
    pub async fn run<F>(self: Arc<Self>, interval: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tracing::info!(
            interval_secs = interval.as_secs(),
            lookback_hours = self.lookback.num_hours(),
            "Starting polling service"
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cycles = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    let scheduler = Arc::clone(&self);
                    cycles.spawn(async move { scheduler.run_cycle().await });
                }
                Some(_) = cycles.join_next(), if !cycles.is_empty() => {}
            }
        }

        tracing::info!(in_flight = cycles.len(), "Polling service stopping");
        while cycles.join_next().await.is_some() {}
        tracing::info!("Polling service stopped");
    }
}
