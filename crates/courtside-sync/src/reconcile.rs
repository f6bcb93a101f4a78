use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use courtside_core::{
    CanonicalGame, FieldProvenance, GameField, GameStatus, MatchedPair, MetricsSnapshot, Score,
    SourceKind, SourceRecord,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::teams::TeamDirectory;

const NEVER_RECONCILED: i64 = i64::MIN;

/// Process-wide reconciliation counters. Monotonic; only a restart resets them.
#[derive(Debug)]
pub struct ReconciliationMetrics {
    total_reconciliations: AtomicU64,
    conflicts: AtomicU64,
    primary_preferred: AtomicU64,
    authoritative_preferred: AtomicU64,
    last_reconciled_ms: AtomicI64,
}

impl Default for ReconciliationMetrics {
    fn default() -> Self {
        Self {
            total_reconciliations: AtomicU64::new(0),
            conflicts: AtomicU64::new(0),
            primary_preferred: AtomicU64::new(0),
            authoritative_preferred: AtomicU64::new(0),
            last_reconciled_ms: AtomicI64::new(NEVER_RECONCILED),
        }
    }
}

impl ReconciliationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, tally: MergeTally, at: DateTime<Utc>) {
        self.total_reconciliations.fetch_add(1, Ordering::Relaxed);
        self.conflicts.fetch_add(tally.stable_conflicts, Ordering::Relaxed);
        self.primary_preferred.fetch_add(tally.primary_won, Ordering::Relaxed);
        self.authoritative_preferred
            .fetch_add(tally.authoritative_won, Ordering::Relaxed);
        self.last_reconciled_ms
            .fetch_max(at.timestamp_millis(), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let last = self.last_reconciled_ms.load(Ordering::Relaxed);
        MetricsSnapshot {
            total_reconciliations: self.total_reconciliations.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            primary_preferred: self.primary_preferred.load(Ordering::Relaxed),
            authoritative_preferred: self.authoritative_preferred.load(Ordering::Relaxed),
            last_reconciled_at: (last != NEVER_RECONCILED)
                .then(|| DateTime::from_timestamp_millis(last))
                .flatten(),
        }
    }
}

/// What one merge contributes to the counters, read off the merged provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeTally {
    pub stable_conflicts: u64,
    pub primary_won: u64,
    pub authoritative_won: u64,
}

impl MergeTally {
    pub fn from_game(game: &CanonicalGame) -> Self {
        let mut tally = Self::default();
        for entry in &game.provenance {
            if entry.field.is_volatile() {
                match entry.source {
                    SourceKind::Primary => tally.primary_won += 1,
                    SourceKind::Authoritative => tally.authoritative_won += 1,
                }
            } else if entry.conflicted {
                tally.stable_conflicts += 1;
            }
        }
        tally
    }
}

/// Inputs a policy may consult besides the two records.
#[derive(Debug, Clone, Copy)]
pub struct MergeContext<'a> {
    pub now: DateTime<Utc>,
    pub teams: &'a TeamDirectory,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub game: CanonicalGame,
    pub conflicted: bool,
}

/// Field-level merge strategy for a two-sided pair.
pub trait MergePolicy: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn merge(
        &self,
        authoritative: &SourceRecord,
        primary: &SourceRecord,
        ctx: &MergeContext<'_>,
    ) -> MergeOutcome;
}

/// Which side supplies each volatile field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolatileChoice {
    pub status: SourceKind,
    pub score: SourceKind,
    pub clock: SourceKind,
}

impl VolatileChoice {
    pub fn all(source: SourceKind) -> Self {
        Self {
            status: source,
            score: source,
            clock: source,
        }
    }
}

/// Primary score in the authoritative home/away orientation. Live cards occasionally list
/// the teams the other way round.
fn aligned_primary_score(
    authoritative: &SourceRecord,
    primary: &SourceRecord,
    teams: &TeamDirectory,
) -> Option<Score> {
    let score = primary.score?;
    let swapped = teams.same_team(&primary.home_team, &authoritative.away_team)
        && teams.same_team(&primary.away_team, &authoritative.home_team);
    Some(if swapped {
        Score::new(score.away, score.home)
    } else {
        score
    })
}

fn primary_has_status(primary: &SourceRecord) -> bool {
    primary.status != GameStatus::Unknown
}

/// Builds the canonical game shared by every policy: stable fields from the authoritative
/// record, volatile fields from whichever side `choice` names, and provenance for all of them.
pub fn assemble(
    authoritative: &SourceRecord,
    primary: &SourceRecord,
    choice: VolatileChoice,
    ctx: &MergeContext<'_>,
) -> MergeOutcome {
    let teams = ctx.teams;
    let primary_score = aligned_primary_score(authoritative, primary, teams);
    let pick = |source: SourceKind| match source {
        SourceKind::Authoritative => authoritative,
        SourceKind::Primary => primary,
    };

    let home_conflict = !teams.same_team(&authoritative.home_team, &primary.home_team);
    let away_conflict = !teams.same_team(&authoritative.away_team, &primary.away_team);
    let (start, start_source, start_conflict) = match (authoritative.scheduled_start, primary.scheduled_start) {
        (Some(a), Some(p)) => (Some(a), SourceKind::Authoritative, a != p),
        (Some(a), None) => (Some(a), SourceKind::Authoritative, false),
        (None, Some(p)) => (Some(p), SourceKind::Primary, false),
        (None, None) => (None, SourceKind::Authoritative, false),
    };

    let status_conflict = primary_has_status(primary)
        && authoritative.status != GameStatus::Unknown
        && primary.status != authoritative.status;
    let score_conflict = matches!(
        (authoritative.score, primary_score),
        (Some(a), Some(p)) if a != p
    );
    let clock_conflict = !authoritative.clock.is_empty()
        && !primary.clock.is_empty()
        && authoritative.clock != primary.clock;

    let score = match choice.score {
        SourceKind::Authoritative => authoritative.score,
        SourceKind::Primary => primary_score,
    };
    let status_record = pick(choice.status);

    let entry = |field, source, conflicted| FieldProvenance {
        field,
        source,
        conflicted,
    };
    let provenance = vec![
        entry(GameField::ExternalId, SourceKind::Authoritative, false),
        entry(GameField::HomeTeam, SourceKind::Authoritative, home_conflict),
        entry(GameField::AwayTeam, SourceKind::Authoritative, away_conflict),
        entry(GameField::ScheduledStart, start_source, start_conflict),
        entry(GameField::Status, choice.status, status_conflict),
        entry(GameField::Score, choice.score, score_conflict),
        entry(GameField::Clock, choice.clock, clock_conflict),
    ];
    let conflicted = provenance.iter().any(|p| p.conflicted);

    MergeOutcome {
        game: CanonicalGame {
            external_id: authoritative.external_id.clone(),
            alternate_id: Some(primary.external_id.clone()),
            home_team: authoritative.home_team.clone(),
            away_team: authoritative.away_team.clone(),
            status: status_record.status,
            score,
            clock: pick(choice.clock).clock.clone(),
            scheduled_start: start,
            observed_at: status_record.observed_at,
            conflicted,
            winning_source: choice.status,
            provenance,
        },
        conflicted,
    }
}

/// Volatile fields follow the fresher primary feed unless it is stale, lacks the value, or the
/// authoritative feed has already settled the game.
#[derive(Debug, Clone, Copy)]
pub struct SmartMerge {
    pub staleness: Duration,
    pub score_divergence_limit: u32,
}

impl SmartMerge {
    pub fn is_fresh(&self, primary: &SourceRecord, now: DateTime<Utc>) -> bool {
        let bound = TimeDelta::from_std(self.staleness).unwrap_or(TimeDelta::MAX);
        now.signed_duration_since(primary.observed_at) <= bound
    }
}

impl MergePolicy for SmartMerge {
    fn name(&self) -> &'static str {
        "smart_merge"
    }

    fn merge(
        &self,
        authoritative: &SourceRecord,
        primary: &SourceRecord,
        ctx: &MergeContext<'_>,
    ) -> MergeOutcome {
        let eligible = self.is_fresh(primary, ctx.now) && authoritative.status != GameStatus::Final;
        let side = |use_primary: bool| {
            if eligible && use_primary {
                SourceKind::Primary
            } else {
                SourceKind::Authoritative
            }
        };

        let score_ok = match (
            authoritative.score,
            aligned_primary_score(authoritative, primary, ctx.teams),
        ) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(a), Some(p)) => {
                let divergence = a.divergence(&p);
                if divergence > self.score_divergence_limit {
                    debug!(
                        external_id = %authoritative.external_id,
                        divergence,
                        "primary score diverges past the limit; keeping authoritative"
                    );
                }
                divergence <= self.score_divergence_limit
            }
        };

        let choice = VolatileChoice {
            status: side(primary_has_status(primary)),
            score: side(score_ok),
            clock: side(!primary.clock.is_empty()),
        };
        assemble(authoritative, primary, choice, ctx)
    }
}

/// Every field from the system of record; disagreements are still recorded.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreferAuthoritative;

impl MergePolicy for PreferAuthoritative {
    fn name(&self) -> &'static str {
        "prefer_authoritative"
    }

    fn merge(
        &self,
        authoritative: &SourceRecord,
        primary: &SourceRecord,
        ctx: &MergeContext<'_>,
    ) -> MergeOutcome {
        assemble(
            authoritative,
            primary,
            VolatileChoice::all(SourceKind::Authoritative),
            ctx,
        )
    }
}

/// Volatile fields from the primary feed whenever it has them, regardless of age.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreferLatest;

impl MergePolicy for PreferLatest {
    fn name(&self) -> &'static str {
        "prefer_latest"
    }

    fn merge(
        &self,
        authoritative: &SourceRecord,
        primary: &SourceRecord,
        ctx: &MergeContext<'_>,
    ) -> MergeOutcome {
        let side = |present: bool| {
            if present {
                SourceKind::Primary
            } else {
                SourceKind::Authoritative
            }
        };
        let choice = VolatileChoice {
            status: side(primary_has_status(primary)),
            score: side(primary.score.is_some()),
            clock: side(!primary.clock.is_empty()),
        };
        assemble(authoritative, primary, choice, ctx)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicyKind {
    #[default]
    SmartMerge,
    PreferAuthoritative,
    PreferLatest,
}

impl MergePolicyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SmartMerge => "smart_merge",
            Self::PreferAuthoritative => "prefer_authoritative",
            Self::PreferLatest => "prefer_latest",
        }
    }

    pub fn build(self, staleness: Duration, score_divergence_limit: u32) -> Arc<dyn MergePolicy> {
        match self {
            Self::SmartMerge => Arc::new(SmartMerge {
                staleness,
                score_divergence_limit,
            }),
            Self::PreferAuthoritative => Arc::new(PreferAuthoritative),
            Self::PreferLatest => Arc::new(PreferLatest),
        }
    }
}

impl FromStr for MergePolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "smart_merge" | "smart" => Ok(Self::SmartMerge),
            "prefer_authoritative" | "authoritative" => Ok(Self::PreferAuthoritative),
            "prefer_latest" | "latest" => Ok(Self::PreferLatest),
            other => Err(format!("unknown merge policy {other:?}")),
        }
    }
}

impl fmt::Display for MergePolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Applies a merge policy to matched pairs and keeps the shared counters current.
///
/// Only two-sided pairs are merged and counted. One-sided pairs pass through unchanged and
/// never touch the metrics, including `total_reconciliations`.
#[derive(Debug, Clone)]
pub struct ReconciliationEngine {
    policy: Arc<dyn MergePolicy>,
    metrics: Arc<ReconciliationMetrics>,
    teams: Arc<TeamDirectory>,
}

impl ReconciliationEngine {
    pub fn new(
        policy: Arc<dyn MergePolicy>,
        metrics: Arc<ReconciliationMetrics>,
        teams: Arc<TeamDirectory>,
    ) -> Self {
        Self {
            policy,
            metrics,
            teams,
        }
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    pub fn metrics(&self) -> &Arc<ReconciliationMetrics> {
        &self.metrics
    }

    /// Merges one two-sided pair and records it. Calling this twice for the same pair counts
    /// twice.
    pub fn reconcile(
        &self,
        authoritative: &SourceRecord,
        primary: &SourceRecord,
        now: DateTime<Utc>,
    ) -> CanonicalGame {
        let ctx = MergeContext {
            now,
            teams: &self.teams,
        };
        let outcome = self.policy.merge(authoritative, primary, &ctx);
        let tally = MergeTally::from_game(&outcome.game);
        self.metrics.record(tally, now);
        if outcome.conflicted {
            debug!(
                external_id = %outcome.game.external_id,
                fields = ?outcome.game.conflicted_fields().collect::<Vec<_>>(),
                policy = self.policy.name(),
                "sources disagreed"
            );
        }
        outcome.game
    }

    pub fn reconcile_pairs(&self, pairs: Vec<MatchedPair>, now: DateTime<Utc>) -> Vec<CanonicalGame> {
        pairs
            .into_iter()
            .filter_map(|pair| match (pair.authoritative, pair.primary) {
                (Some(auth), Some(primary)) => Some(self.reconcile(&auth, &primary, now)),
                (Some(record), None) | (None, Some(record)) => Some(CanonicalGame::from_record(record)),
                (None, None) => None,
            })
            .collect()
    }
}
