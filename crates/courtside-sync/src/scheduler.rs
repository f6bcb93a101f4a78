use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, TimeDelta, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, error, info, warn};

use crate::config::ConfigError;
use crate::pipeline::{CycleReport, IngestError};
use crate::shutdown::Shutdown;

/// Wall-clock source for the daily timer.
pub type WallClock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Something that can run one live cycle or one settlement cycle.
#[async_trait]
pub trait CycleRunner: Send + Sync {
    async fn run_live(&self) -> Result<CycleReport, IngestError>;
    async fn run_batch(&self) -> Result<CycleReport, IngestError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    pub poll_interval: Duration,
    /// UTC hour of the daily settlement run.
    pub daily_hour: u32,
    pub live_enabled: bool,
    pub daily_enabled: bool,
    pub batch_max_attempts: u32,
    pub batch_retry_delay: Duration,
    /// Consecutive `SeasonNotFound` live cycles before an operator alert.
    pub season_alert_threshold: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            daily_hour: 3,
            live_enabled: true,
            daily_enabled: true,
            batch_max_attempts: 3,
            batch_retry_delay: Duration::from_secs(5),
            season_alert_threshold: 3,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::invalid(
                "COURTSIDE_POLL_INTERVAL_SECS",
                self.poll_interval.as_secs(),
                "poll interval must be positive",
            ));
        }
        if self.daily_hour > 23 {
            return Err(ConfigError::invalid(
                "COURTSIDE_DAILY_HOUR",
                self.daily_hour,
                "hour must be between 0 and 23",
            ));
        }
        if self.batch_max_attempts == 0 {
            return Err(ConfigError::invalid(
                "COURTSIDE_BATCH_MAX_ATTEMPTS",
                0,
                "at least one attempt is required",
            ));
        }
        if self.season_alert_threshold == 0 {
            return Err(ConfigError::invalid(
                "COURTSIDE_SEASON_ALERT_THRESHOLD",
                0,
                "threshold must be at least 1",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct SchedulerStats {
    live_cycles: AtomicU64,
    live_failures: AtomicU64,
    ticks_coalesced: AtomicU64,
    batch_runs: AtomicU64,
    batch_exhausted: AtomicU64,
    consecutive_season_failures: AtomicU64,
    season_alerts: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SchedulerStatsSnapshot {
    pub live_cycles: u64,
    pub live_failures: u64,
    pub ticks_coalesced: u64,
    pub batch_runs: u64,
    pub batch_exhausted: u64,
    pub consecutive_season_failures: u64,
    pub season_alerts: u64,
}

impl SchedulerStats {
    pub fn snapshot(&self) -> SchedulerStatsSnapshot {
        SchedulerStatsSnapshot {
            live_cycles: self.live_cycles.load(Ordering::Relaxed),
            live_failures: self.live_failures.load(Ordering::Relaxed),
            ticks_coalesced: self.ticks_coalesced.load(Ordering::Relaxed),
            batch_runs: self.batch_runs.load(Ordering::Relaxed),
            batch_exhausted: self.batch_exhausted.load(Ordering::Relaxed),
            consecutive_season_failures: self.consecutive_season_failures.load(Ordering::Relaxed),
            season_alerts: self.season_alerts.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub live_enabled: bool,
    pub daily_enabled: bool,
    pub poll_interval_secs: u64,
    pub daily_hour: u32,
    pub batch_max_attempts: u32,
    pub batch_retry_delay_secs: u64,
    pub next_daily_run: Option<DateTime<Utc>>,
    pub stats: SchedulerStatsSnapshot,
}

#[derive(Debug)]
pub enum BatchResult {
    Succeeded { attempts: u32, report: CycleReport },
    /// Every attempt failed with a transient error.
    Exhausted { attempts: u32, last_error: IngestError },
    /// Shutdown arrived before or between attempts.
    Aborted { attempts: u32 },
    /// A non-transient error; retrying would not help.
    Failed { attempts: u32, error: IngestError },
}

impl BatchResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

/// The first `hour:00:00` UTC strictly after `now`.
pub fn next_daily_run(now: DateTime<Utc>, hour: u32) -> DateTime<Utc> {
    let at = NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN);
    let today = now.date_naive().and_time(at).and_utc();
    if today > now {
        today
    } else {
        today + TimeDelta::days(1)
    }
}

/// Runs the settlement cycle up to `max_attempts` times with `delay` between attempts.
pub async fn run_batch_with_retry(
    runner: &dyn CycleRunner,
    max_attempts: u32,
    delay: Duration,
    shutdown: &Shutdown,
) -> BatchResult {
    let max_attempts = max_attempts.max(1);
    let mut attempts = 0;
    loop {
        if shutdown.is_triggered() {
            return BatchResult::Aborted { attempts };
        }
        attempts += 1;
        match runner.run_batch().await {
            Ok(report) => return BatchResult::Succeeded { attempts, report },
            Err(error) if !error.is_transient() => return BatchResult::Failed { attempts, error },
            Err(last_error) if attempts >= max_attempts => {
                return BatchResult::Exhausted {
                    attempts,
                    last_error,
                }
            }
            Err(err) => {
                warn!(attempt = attempts, max_attempts, error = %err, "settlement attempt failed; retrying");
                tokio::select! {
                    biased;
                    _ = shutdown.triggered() => return BatchResult::Aborted { attempts },
                    _ = sleep(delay) => {}
                }
            }
        }
    }
}

async fn settle(
    runner: &dyn CycleRunner,
    config: &SchedulerConfig,
    stats: &SchedulerStats,
    shutdown: &Shutdown,
) -> BatchResult {
    stats.batch_runs.fetch_add(1, Ordering::Relaxed);
    let result = run_batch_with_retry(
        runner,
        config.batch_max_attempts,
        config.batch_retry_delay,
        shutdown,
    )
    .await;
    match &result {
        BatchResult::Succeeded { attempts, report } => {
            info!(attempts, games = report.games, date = %report.date, "daily settlement complete")
        }
        BatchResult::Exhausted {
            attempts,
            last_error,
        } => {
            stats.batch_exhausted.fetch_add(1, Ordering::Relaxed);
            let err = IngestError::BatchExhausted {
                attempts: *attempts,
                last_error: last_error.to_string(),
            };
            error!(error = %err, "daily settlement failed; operator attention required");
        }
        BatchResult::Aborted { attempts } => info!(attempts, "daily settlement aborted by shutdown"),
        BatchResult::Failed { attempts, error } => {
            error!(attempts, error = %error, "daily settlement failed without retry")
        }
    }
    result
}

async fn run_live_once(runner: &dyn CycleRunner, stats: &SchedulerStats, alert_threshold: u32) {
    stats.live_cycles.fetch_add(1, Ordering::Relaxed);
    match runner.run_live().await {
        Ok(report) => {
            stats.consecutive_season_failures.store(0, Ordering::Relaxed);
            debug!(state = %report.state, games = report.games, "live cycle finished");
        }
        Err(IngestError::SeasonNotFound(season)) => {
            stats.live_failures.fetch_add(1, Ordering::Relaxed);
            let streak = stats.consecutive_season_failures.fetch_add(1, Ordering::Relaxed) + 1;
            if streak % u64::from(alert_threshold.max(1)) == 0 {
                stats.season_alerts.fetch_add(1, Ordering::Relaxed);
                error!(%season, consecutive = streak, "season lookup keeps failing; check the seasons table");
            } else {
                warn!(%season, consecutive = streak, "season not found; cycle skipped");
            }
        }
        Err(err) => {
            stats.live_failures.fetch_add(1, Ordering::Relaxed);
            warn!(error = %err, transient = err.is_transient(), "live cycle failed");
        }
    }
}

/// Fixed tick grid; cycles run inline so they never overlap, and grid points that fall due
/// during a long cycle are dropped rather than queued.
async fn live_loop(
    runner: Arc<dyn CycleRunner>,
    period: Duration,
    alert_threshold: u32,
    stats: Arc<SchedulerStats>,
    shutdown: Shutdown,
) {
    let period_nanos = period.as_nanos().max(1);
    let mut next = Instant::now();
    loop {
        tokio::select! {
            biased;
            _ = shutdown.triggered() => break,
            _ = sleep_until(next) => {}
        }

        run_live_once(runner.as_ref(), &stats, alert_threshold).await;

        let overdue = Instant::now().saturating_duration_since(next);
        let steps = overdue.as_nanos().div_ceil(period_nanos).max(1);
        let skipped = steps - 1;
        if skipped > 0 {
            let skipped = u64::try_from(skipped).unwrap_or(u64::MAX);
            stats.ticks_coalesced.fetch_add(skipped, Ordering::Relaxed);
            debug!(skipped, "live ticks coalesced behind a slow cycle");
        }
        next += period * u32::try_from(steps).unwrap_or(u32::MAX);
    }
    info!("live poll loop stopped");
}

async fn daily_loop(
    runner: Arc<dyn CycleRunner>,
    config: SchedulerConfig,
    clock: WallClock,
    stats: Arc<SchedulerStats>,
    shutdown: Shutdown,
) {
    loop {
        let now = clock();
        let due = next_daily_run(now, config.daily_hour);
        let wait = (due - now).to_std().unwrap_or(Duration::ZERO);
        info!(next_run = %due, "daily settlement scheduled");
        tokio::select! {
            biased;
            _ = shutdown.triggered() => break,
            _ = sleep(wait) => {}
        }
        settle(runner.as_ref(), &config, &stats, &shutdown).await;
    }
    info!("daily settlement loop stopped");
}

/// Drives the live and daily cadences until stopped.
pub struct Scheduler {
    config: SchedulerConfig,
    runner: Arc<dyn CycleRunner>,
    clock: WallClock,
    stats: Arc<SchedulerStats>,
    shutdown: Shutdown,
    started: AtomicBool,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, runner: Arc<dyn CycleRunner>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            runner,
            clock: Arc::new(Utc::now),
            stats: Arc::new(SchedulerStats::default()),
            shutdown: Shutdown::new(),
            started: AtomicBool::new(false),
            handles: Mutex::new(Vec::new()),
        })
    }

    /// Replaces the wall clock the daily timer reads.
    pub fn with_clock(mut self, clock: WallClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn stats(&self) -> &Arc<SchedulerStats> {
        &self.stats
    }

    /// Spawns the enabled cadences. Triggering `parent` stops them like [`Scheduler::stop`]
    /// does, without waiting. A scheduler starts at most once.
    pub async fn start(&self, parent: Shutdown) {
        let mut handles = self.handles.lock().await;
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("scheduler already started");
            return;
        }

        let own = self.shutdown.clone();
        handles.push(tokio::spawn(async move {
            tokio::select! {
                _ = parent.triggered() => own.trigger(),
                _ = own.triggered() => {}
            }
        }));

        if self.config.live_enabled {
            handles.push(tokio::spawn(live_loop(
                self.runner.clone(),
                self.config.poll_interval,
                self.config.season_alert_threshold,
                self.stats.clone(),
                self.shutdown.clone(),
            )));
        }
        if self.config.daily_enabled {
            handles.push(tokio::spawn(daily_loop(
                self.runner.clone(),
                self.config.clone(),
                self.clock.clone(),
                self.stats.clone(),
                self.shutdown.clone(),
            )));
        }
        info!(
            live = self.config.live_enabled,
            daily = self.config.daily_enabled,
            poll_interval_secs = self.config.poll_interval.as_secs(),
            daily_hour = self.config.daily_hour,
            "scheduler started"
        );
    }

    /// Signals both cadences and waits for any in-flight cycle to finish. Safe to call more
    /// than once and from several tasks; every caller returns after the tasks have exited.
    pub async fn stop(&self) {
        self.shutdown.trigger();
        let mut handles = self.handles.lock().await;
        for handle in handles.drain(..) {
            if let Err(err) = handle.await {
                error!(error = %err, "scheduler task ended abnormally");
            }
        }
    }

    /// One settlement run outside the daily timer, with the configured retries.
    pub async fn run_batch_now(&self) -> BatchResult {
        settle(self.runner.as_ref(), &self.config, &self.stats, &self.shutdown).await
    }

    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            running: self.started.load(Ordering::SeqCst) && !self.shutdown.is_triggered(),
            live_enabled: self.config.live_enabled,
            daily_enabled: self.config.daily_enabled,
            poll_interval_secs: self.config.poll_interval.as_secs(),
            daily_hour: self.config.daily_hour,
            batch_max_attempts: self.config.batch_max_attempts,
            batch_retry_delay_secs: self.config.batch_retry_delay.as_secs(),
            next_daily_run: self
                .config
                .daily_enabled
                .then(|| next_daily_run((self.clock)(), self.config.daily_hour)),
            stats: self.stats.snapshot(),
        }
    }
}
