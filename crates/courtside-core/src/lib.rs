//! Core game-state model and provenance types for courtside.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CRATE_NAME: &str = "courtside-core";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid season label {0:?}: expected YYYY-YY with consecutive years")]
    InvalidSeasonLabel(String),
}

/// Which upstream feed produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Low-latency feed, occasionally incomplete or missing.
    Primary,
    /// System of record; wins stable-field disagreements.
    Authoritative,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Authoritative => "authoritative",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Scheduled,
    InProgress,
    Final,
    Unknown,
}

impl GameStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::InProgress => "in_progress",
            Self::Final => "final",
            Self::Unknown => "unknown",
        }
    }

    /// Maps the status vocabularies used by upstream feeds onto the canonical set.
    pub fn parse_loose(raw: &str) -> Self {
        let lower = raw.trim().to_ascii_lowercase();
        let lower = lower.strip_prefix("status_").unwrap_or(&lower);
        match lower {
            "final" | "post" | "completed" | "final/ot" => Self::Final,
            "in" | "live" | "in_progress" | "in progress" | "halftime" | "end_period" => {
                Self::InProgress
            }
            "pre" | "scheduled" => Self::Scheduled,
            other if other.starts_with("final") => Self::Final,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub home: u32,
    pub away: u32,
}

impl Score {
    pub fn new(home: u32, away: u32) -> Self {
        Self { home, away }
    }

    /// Largest per-team difference between two scores.
    pub fn divergence(&self, other: &Score) -> u32 {
        self.home.abs_diff(other.home).max(self.away.abs_diff(other.away))
    }
}

/// Period number plus the clock text the feed displayed ("4:12", "Halftime").
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GameClock {
    pub period: Option<u8>,
    pub display: Option<String>,
}

impl GameClock {
    pub fn is_empty(&self) -> bool {
        self.period.is_none() && self.display.is_none()
    }
}

/// One source's view of one game at fetch time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub source: SourceKind,
    pub external_id: String,
    pub home_team: String,
    pub away_team: String,
    pub status: GameStatus,
    #[serde(default)]
    pub score: Option<Score>,
    #[serde(default)]
    pub clock: GameClock,
    #[serde(default)]
    pub scheduled_start: Option<DateTime<Utc>>,
    pub observed_at: DateTime<Utc>,
}

/// Human-readable season identifier such as `2025-26`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SeasonLabel(String);

impl SeasonLabel {
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let invalid = || CoreError::InvalidSeasonLabel(raw.to_string());
        let trimmed = raw.trim();
        let (start, end) = trimmed.split_once('-').ok_or_else(invalid)?;
        if start.len() != 4 || end.len() != 2 {
            return Err(invalid());
        }
        let start: u32 = start.parse().map_err(|_| invalid())?;
        let end: u32 = end.parse().map_err(|_| invalid())?;
        if (start + 1) % 100 != end {
            return Err(invalid());
        }
        Ok(Self(trimmed.to_string()))
    }

    /// The season that starts in `year`, e.g. `2025` gives `2025-26`.
    pub fn starting(year: u16) -> Self {
        Self(format!("{year:04}-{:02}", (year + 1) % 100))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for SeasonLabel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SeasonLabel {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SeasonLabel> for String {
    fn from(value: SeasonLabel) -> Self {
        value.0
    }
}

impl fmt::Display for SeasonLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What an adapter is asked to produce: one season, one local calendar date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchScope {
    pub season: SeasonLabel,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchConfidence {
    High,
    Unmatched,
}

/// Records from both sources believed to describe the same game. At least one side is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedPair {
    pub authoritative: Option<SourceRecord>,
    pub primary: Option<SourceRecord>,
    pub confidence: MatchConfidence,
}

impl MatchedPair {
    pub fn both(authoritative: SourceRecord, primary: SourceRecord) -> Self {
        Self {
            authoritative: Some(authoritative),
            primary: Some(primary),
            confidence: MatchConfidence::High,
        }
    }

    pub fn primary_only(primary: SourceRecord) -> Self {
        Self {
            authoritative: None,
            primary: Some(primary),
            confidence: MatchConfidence::Unmatched,
        }
    }

    pub fn authoritative_only(authoritative: SourceRecord) -> Self {
        Self {
            authoritative: Some(authoritative),
            primary: None,
            confidence: MatchConfidence::Unmatched,
        }
    }

    pub fn is_two_sided(&self) -> bool {
        self.authoritative.is_some() && self.primary.is_some()
    }

    /// The single record of a one-sided pair.
    pub fn single(&self) -> Option<&SourceRecord> {
        match (&self.authoritative, &self.primary) {
            (Some(record), None) | (None, Some(record)) => Some(record),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameField {
    ExternalId,
    HomeTeam,
    AwayTeam,
    ScheduledStart,
    Status,
    Score,
    Clock,
}

impl GameField {
    pub const ALL: [GameField; 7] = [
        GameField::ExternalId,
        GameField::HomeTeam,
        GameField::AwayTeam,
        GameField::ScheduledStart,
        GameField::Status,
        GameField::Score,
        GameField::Clock,
    ];

    pub const VOLATILE: [GameField; 3] = [GameField::Status, GameField::Score, GameField::Clock];

    /// Volatile fields change quickly during play and favour the fresher feed.
    pub fn is_volatile(self) -> bool {
        matches!(self, Self::Status | Self::Score | Self::Clock)
    }
}

/// Which source supplied a canonical field, and whether the two sources disagreed on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldProvenance {
    pub field: GameField,
    pub source: SourceKind,
    pub conflicted: bool,
}

/// The merged representation of one logical game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalGame {
    pub external_id: String,
    pub alternate_id: Option<String>,
    pub home_team: String,
    pub away_team: String,
    pub status: GameStatus,
    pub score: Option<Score>,
    pub clock: GameClock,
    pub scheduled_start: Option<DateTime<Utc>>,
    pub observed_at: DateTime<Utc>,
    pub conflicted: bool,
    pub winning_source: SourceKind,
    pub provenance: Vec<FieldProvenance>,
}

impl CanonicalGame {
    /// Single-source pass-through: every field from `record`, nothing conflicted.
    pub fn from_record(record: SourceRecord) -> Self {
        let source = record.source;
        Self {
            external_id: record.external_id,
            alternate_id: None,
            home_team: record.home_team,
            away_team: record.away_team,
            status: record.status,
            score: record.score,
            clock: record.clock,
            scheduled_start: record.scheduled_start,
            observed_at: record.observed_at,
            conflicted: false,
            winning_source: source,
            provenance: GameField::ALL
                .iter()
                .map(|field| FieldProvenance {
                    field: *field,
                    source,
                    conflicted: false,
                })
                .collect(),
        }
    }

    pub fn provenance_for(&self, field: GameField) -> Option<&FieldProvenance> {
        self.provenance.iter().find(|p| p.field == field)
    }

    pub fn conflicted_fields(&self) -> impl Iterator<Item = GameField> + '_ {
        self.provenance.iter().filter(|p| p.conflicted).map(|p| p.field)
    }

    pub fn is_live(&self) -> bool {
        self.status == GameStatus::InProgress
    }
}

/// Availability classification of one orchestrator pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    BothUnavailable,
    AuthoritativeOnly,
    PrimaryOnly,
    BothReconciled,
}

impl CycleState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BothUnavailable => "both_unavailable",
            Self::AuthoritativeOnly => "authoritative_only",
            Self::PrimaryOnly => "primary_only",
            Self::BothReconciled => "both_reconciled",
        }
    }
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleOutcome {
    pub state: CycleState,
    pub games: Vec<CanonicalGame>,
    /// Set when reconciliation failed and the cycle fell back to authoritative-only.
    pub anomaly: Option<String>,
}

impl CycleOutcome {
    pub fn empty() -> Self {
        Self {
            state: CycleState::BothUnavailable,
            games: Vec::new(),
            anomaly: None,
        }
    }
}

/// Point-in-time copy of the process-wide reconciliation counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_reconciliations: u64,
    pub conflicts: u64,
    pub primary_preferred: u64,
    pub authoritative_preferred: u64,
    pub last_reconciled_at: Option<DateTime<Utc>>,
}
