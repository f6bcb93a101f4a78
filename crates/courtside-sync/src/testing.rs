//! Canned adapters and record builders shared by unit tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use courtside_adapters::{AdapterError, SourceAdapter};
use courtside_core::{FetchScope, GameClock, GameStatus, Score, SourceKind, SourceRecord};

use crate::matcher::EntityMatcher;
use crate::orchestrator::FallbackOrchestrator;
use crate::reconcile::{MergePolicyKind, ReconciliationEngine, ReconciliationMetrics};
use crate::teams::TeamDirectory;

#[derive(Debug)]
enum Canned {
    Records(Vec<SourceRecord>),
    Fail,
}

#[derive(Debug)]
pub struct StaticAdapter {
    kind: SourceKind,
    canned: Canned,
}

impl StaticAdapter {
    pub fn records(kind: SourceKind, records: Vec<SourceRecord>) -> Arc<dyn SourceAdapter> {
        Arc::new(Self {
            kind,
            canned: Canned::Records(records),
        })
    }

    pub fn failing(kind: SourceKind) -> Arc<dyn SourceAdapter> {
        Arc::new(Self {
            kind,
            canned: Canned::Fail,
        })
    }
}

#[async_trait]
impl SourceAdapter for StaticAdapter {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn name(&self) -> &'static str {
        "static"
    }

    async fn fetch(&self, _scope: &FetchScope) -> Result<Vec<SourceRecord>, AdapterError> {
        match &self.canned {
            Canned::Records(records) => Ok(records.clone()),
            Canned::Fail => Err(AdapterError::Message("upstream down".into())),
        }
    }
}

/// 01:40:30Z on 2026-01-11, which is the evening of the 10th in UTC-5.
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 11, 1, 40, 30).unwrap()
}

pub fn eastern() -> FixedOffset {
    FixedOffset::west_opt(5 * 3600).unwrap()
}

pub fn scope() -> FetchScope {
    FetchScope {
        season: "2025-26".parse().unwrap(),
        date: NaiveDate::from_ymd_opt(2026, 1, 10).unwrap(),
    }
}

pub fn record(
    source: SourceKind,
    id: &str,
    home: &str,
    away: &str,
    status: GameStatus,
    score: (u32, u32),
) -> SourceRecord {
    SourceRecord {
        source,
        external_id: id.into(),
        home_team: home.into(),
        away_team: away.into(),
        status,
        score: Some(Score::new(score.0, score.1)),
        clock: GameClock::default(),
        scheduled_start: None,
        observed_at: now() - chrono::TimeDelta::seconds(5),
    }
}

pub fn live(source: SourceKind, id: &str, home: &str, away: &str, score: (u32, u32)) -> SourceRecord {
    record(source, id, home, away, GameStatus::InProgress, score)
}

/// Five authoritative games on the 10th, ids `401810000` to `401810004`.
pub fn five_authoritative() -> Vec<SourceRecord> {
    [("BOS", "LAL"), ("PHX", "GSW"), ("MIA", "NYK"), ("DEN", "SAS"), ("MIL", "CHI")]
        .iter()
        .enumerate()
        .map(|(i, (h, a))| live(SourceKind::Authoritative, &format!("40181000{i}"), h, a, (50, 49)))
        .collect()
}

pub fn orchestrator(
    primary: Arc<dyn SourceAdapter>,
    authoritative: Arc<dyn SourceAdapter>,
) -> FallbackOrchestrator {
    let teams = Arc::new(TeamDirectory::default());
    FallbackOrchestrator::new(
        primary,
        authoritative,
        EntityMatcher::new(teams.clone(), eastern()),
        ReconciliationEngine::new(
            MergePolicyKind::SmartMerge.build(Duration::from_secs(30), 20),
            Arc::new(ReconciliationMetrics::new()),
            teams,
        ),
    )
}
