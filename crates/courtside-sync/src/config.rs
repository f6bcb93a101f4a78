use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};
use courtside_core::SeasonLabel;
use courtside_storage::{HttpClientConfig, RateLimit};
use thiserror::Error;

use crate::reconcile::MergePolicyKind;
use crate::scheduler::SchedulerConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {key}={value:?}: {reason}")]
pub struct ConfigError {
    pub key: String,
    pub value: String,
    pub reason: String,
}

impl ConfigError {
    pub fn invalid(key: &str, value: impl ToString, reason: impl Into<String>) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub season: SeasonLabel,
    pub sport: String,
    pub poll_interval: Duration,
    /// Hour of day (UTC) at which the settlement cycle runs.
    pub daily_hour: u32,
    pub live_enabled: bool,
    pub daily_enabled: bool,
    pub batch_max_attempts: u32,
    pub batch_retry_delay: Duration,
    pub staleness: Duration,
    pub merge_policy: MergePolicyKind,
    pub score_divergence_limit: u32,
    pub reporting_offset: FixedOffset,
    pub fuzzy_team_threshold: f64,
    pub season_alert_threshold: u32,
    pub http_timeout_secs: u64,
    /// Upstream requests per second across both sources; `None` leaves them unthrottled.
    pub http_rate_per_sec: Option<u32>,
    pub http_burst: u32,
    pub user_agent: String,
    pub workspace_root: PathBuf,
    pub sources_file: PathBuf,
    pub web_port: u16,
}

const DEFAULT_SEASON_START: u16 = 2025;
const DEFAULT_REPORTING_OFFSET_HOURS: i32 = -5;

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            redis_url: None,
            season: SeasonLabel::starting(DEFAULT_SEASON_START),
            sport: "basketball_nba".to_string(),
            poll_interval: Duration::from_secs(10),
            daily_hour: 3,
            live_enabled: true,
            daily_enabled: true,
            batch_max_attempts: 3,
            batch_retry_delay: Duration::from_secs(5),
            staleness: Duration::from_secs(30),
            merge_policy: MergePolicyKind::SmartMerge,
            score_divergence_limit: 20,
            reporting_offset: hours_offset(DEFAULT_REPORTING_OFFSET_HOURS).unwrap_or_else(|| Utc.fix()),
            fuzzy_team_threshold: 0.93,
            season_alert_threshold: 3,
            http_timeout_secs: 20,
            http_rate_per_sec: None,
            http_burst: 4,
            user_agent: "courtside-bot/0.1".to_string(),
            workspace_root: PathBuf::from("."),
            sources_file: PathBuf::from("sources.yaml"),
            web_port: 8080,
        }
    }
}

fn hours_offset(hours: i32) -> Option<FixedOffset> {
    if !(-14..=14).contains(&hours) {
        return None;
    }
    FixedOffset::east_opt(hours * 3600)
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid(key, raw, "expected a boolean")),
    }
}

fn parse_num<T: FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::invalid(key, raw, "expected a number"))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl SyncConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let get = |key: &str| non_empty(lookup(key));

        config.database_url = get("DATABASE_URL");
        config.redis_url = get("REDIS_URL");
        if let Some(raw) = get("COURTSIDE_SEASON") {
            config.season = SeasonLabel::parse(&raw)
                .map_err(|err| ConfigError::invalid("COURTSIDE_SEASON", &raw, err.to_string()))?;
        }
        if let Some(raw) = get("COURTSIDE_SPORT") {
            config.sport = raw.trim().to_string();
        }
        if let Some(raw) = get("COURTSIDE_POLL_INTERVAL_SECS") {
            config.poll_interval = Duration::from_secs(parse_num("COURTSIDE_POLL_INTERVAL_SECS", &raw)?);
        }
        if let Some(raw) = get("COURTSIDE_DAILY_HOUR") {
            config.daily_hour = parse_num("COURTSIDE_DAILY_HOUR", &raw)?;
        }
        if let Some(raw) = get("COURTSIDE_LIVE_ENABLED") {
            config.live_enabled = parse_bool("COURTSIDE_LIVE_ENABLED", &raw)?;
        }
        if let Some(raw) = get("COURTSIDE_DAILY_ENABLED") {
            config.daily_enabled = parse_bool("COURTSIDE_DAILY_ENABLED", &raw)?;
        }
        if let Some(raw) = get("COURTSIDE_BATCH_MAX_ATTEMPTS") {
            config.batch_max_attempts = parse_num("COURTSIDE_BATCH_MAX_ATTEMPTS", &raw)?;
        }
        if let Some(raw) = get("COURTSIDE_BATCH_RETRY_DELAY_SECS") {
            config.batch_retry_delay =
                Duration::from_secs(parse_num("COURTSIDE_BATCH_RETRY_DELAY_SECS", &raw)?);
        }
        if let Some(raw) = get("COURTSIDE_STALENESS_SECS") {
            config.staleness = Duration::from_secs(parse_num("COURTSIDE_STALENESS_SECS", &raw)?);
        }
        if let Some(raw) = get("COURTSIDE_MERGE_POLICY") {
            config.merge_policy = raw
                .parse()
                .map_err(|reason: String| ConfigError::invalid("COURTSIDE_MERGE_POLICY", &raw, reason))?;
        }
        if let Some(raw) = get("COURTSIDE_SCORE_DIVERGENCE_LIMIT") {
            config.score_divergence_limit = parse_num("COURTSIDE_SCORE_DIVERGENCE_LIMIT", &raw)?;
        }
        if let Some(raw) = get("COURTSIDE_REPORTING_UTC_OFFSET_HOURS") {
            let hours: i32 = parse_num("COURTSIDE_REPORTING_UTC_OFFSET_HOURS", &raw)?;
            config.reporting_offset = hours_offset(hours).ok_or_else(|| {
                ConfigError::invalid(
                    "COURTSIDE_REPORTING_UTC_OFFSET_HOURS",
                    &raw,
                    "offset must be within +/-14 hours",
                )
            })?;
        }
        if let Some(raw) = get("COURTSIDE_FUZZY_TEAM_THRESHOLD") {
            config.fuzzy_team_threshold = parse_num("COURTSIDE_FUZZY_TEAM_THRESHOLD", &raw)?;
        }
        if let Some(raw) = get("COURTSIDE_SEASON_ALERT_THRESHOLD") {
            config.season_alert_threshold = parse_num("COURTSIDE_SEASON_ALERT_THRESHOLD", &raw)?;
        }
        if let Some(raw) = get("COURTSIDE_HTTP_TIMEOUT_SECS") {
            config.http_timeout_secs = parse_num("COURTSIDE_HTTP_TIMEOUT_SECS", &raw)?;
        }
        if let Some(raw) = get("COURTSIDE_HTTP_RATE_PER_SEC") {
            config.http_rate_per_sec = Some(parse_num("COURTSIDE_HTTP_RATE_PER_SEC", &raw)?);
        }
        if let Some(raw) = get("COURTSIDE_HTTP_BURST") {
            config.http_burst = parse_num("COURTSIDE_HTTP_BURST", &raw)?;
        }
        if let Some(raw) = get("COURTSIDE_USER_AGENT") {
            config.user_agent = raw;
        }
        if let Some(raw) = get("COURTSIDE_WORKSPACE_ROOT") {
            config.workspace_root = PathBuf::from(raw);
        }
        if let Some(raw) = get("COURTSIDE_SOURCES") {
            config.sources_file = PathBuf::from(raw);
        }
        if let Some(raw) = get("COURTSIDE_WEB_PORT") {
            config.web_port = parse_num("COURTSIDE_WEB_PORT", &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scheduler_config().validate()?;
        if self.staleness.is_zero() {
            return Err(ConfigError::invalid(
                "COURTSIDE_STALENESS_SECS",
                self.staleness.as_secs(),
                "staleness bound must be positive",
            ));
        }
        if !(self.fuzzy_team_threshold > 0.0 && self.fuzzy_team_threshold <= 1.0) {
            return Err(ConfigError::invalid(
                "COURTSIDE_FUZZY_TEAM_THRESHOLD",
                self.fuzzy_team_threshold,
                "threshold must be in (0, 1]",
            ));
        }
        if self.sport.is_empty() {
            return Err(ConfigError::invalid("COURTSIDE_SPORT", "", "sport must not be empty"));
        }
        if self.http_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "COURTSIDE_HTTP_TIMEOUT_SECS",
                0,
                "timeout must be positive",
            ));
        }
        if let Some(rate) = self.http_rate_per_sec {
            if !(1..=1000).contains(&rate) {
                return Err(ConfigError::invalid(
                    "COURTSIDE_HTTP_RATE_PER_SEC",
                    rate,
                    "rate must be between 1 and 1000",
                ));
            }
        }
        if self.http_burst == 0 {
            return Err(ConfigError::invalid("COURTSIDE_HTTP_BURST", 0, "burst must be at least 1"));
        }
        Ok(())
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            poll_interval: self.poll_interval,
            daily_hour: self.daily_hour,
            live_enabled: self.live_enabled,
            daily_enabled: self.daily_enabled,
            batch_max_attempts: self.batch_max_attempts,
            batch_retry_delay: self.batch_retry_delay,
            season_alert_threshold: self.season_alert_threshold,
        }
    }

    /// Client settings shared by both adapters.
    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: Duration::from_secs(self.http_timeout_secs),
            user_agent: Some(self.user_agent.clone()),
            rate_limit: self.http_rate_per_sec.map(|per_second| RateLimit {
                per_second,
                burst: self.http_burst,
            }),
            ..HttpClientConfig::default()
        }
    }

    pub fn sources_path(&self) -> PathBuf {
        self.workspace_root.join(&self.sources_file)
    }
}
