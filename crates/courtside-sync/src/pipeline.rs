use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use courtside_adapters::adapter_for_source;
use courtside_core::{CycleOutcome, CycleState, FetchScope, SeasonLabel, SourceKind};
use courtside_storage::{
    stream_for, EventSink, GameEvent, GameStore, HttpFetcher, StoreError,
};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::load_source_registry;
use crate::matcher::EntityMatcher;
use crate::orchestrator::FallbackOrchestrator;
use crate::reconcile::{ReconciliationEngine, ReconciliationMetrics};
use crate::scheduler::CycleRunner;
use crate::teams::TeamDirectory;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("season {0} not found")]
    SeasonNotFound(SeasonLabel),
    #[error("reconciliation anomaly: {0}")]
    ReconciliationAnomaly(String),
    #[error("publishing {external_id} failed: {reason}")]
    PublishFailure { external_id: String, reason: String },
    #[error("settlement gave up after {attempts} attempts: {last_error}")]
    BatchExhausted { attempts: u32, last_error: String },
    #[error("persistence: {0}")]
    Persistence(StoreError),
}

impl From<StoreError> for IngestError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::SeasonNotFound(label) => Self::SeasonNotFound(label),
            other => Self::Persistence(other),
        }
    }
}

impl IngestError {
    /// Everything except a missing season may clear up on the next attempt.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::SeasonNotFound(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    Live,
    Batch,
}

impl Cadence {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Batch => "batch",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub cadence: Cadence,
    pub date: NaiveDate,
    pub state: CycleState,
    pub anomaly: Option<String>,
    pub games: usize,
    pub live_games: usize,
    pub conflicted_games: usize,
    pub inserted: usize,
    pub updated: usize,
    /// Primary-only rows deleted because a reconciled game now carries their id.
    pub retired: usize,
    pub published: usize,
    pub publish_failures: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Most recent cycle report, shared with the operator surface.
#[derive(Debug, Clone, Default)]
pub struct LatestCycle(Arc<RwLock<Option<CycleReport>>>);

impl LatestCycle {
    pub async fn set(&self, report: CycleReport) {
        *self.0.write().await = Some(report);
    }

    pub async fn get(&self) -> Option<CycleReport> {
        self.0.read().await.clone()
    }
}

/// Orchestrator plus the persistence and publish boundaries.
#[derive(Clone)]
pub struct IngestPipeline {
    orchestrator: FallbackOrchestrator,
    store: Arc<dyn GameStore>,
    sink: Arc<dyn EventSink>,
    season: SeasonLabel,
    sport: String,
    reporting_offset: FixedOffset,
    latest: LatestCycle,
}

impl IngestPipeline {
    pub fn new(
        orchestrator: FallbackOrchestrator,
        store: Arc<dyn GameStore>,
        sink: Arc<dyn EventSink>,
        season: SeasonLabel,
        sport: impl Into<String>,
        reporting_offset: FixedOffset,
    ) -> Self {
        Self {
            orchestrator,
            store,
            sink,
            season,
            sport: sport.into(),
            reporting_offset,
            latest: LatestCycle::default(),
        }
    }

    /// Wires adapters, matcher and engine from configuration and the source registry.
    pub async fn from_config(
        config: &SyncConfig,
        store: Arc<dyn GameStore>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self> {
        let registry_path = config.sources_path();
        let registry = load_source_registry(&registry_path).await?;
        let http = Arc::new(
            HttpFetcher::new(config.http_client_config()).context("building http client")?,
        );

        let adapter = |kind: SourceKind| {
            let source = registry
                .source(kind)
                .with_context(|| format!("no {kind} source in {}", registry_path.display()))?;
            adapter_for_source(source, http.clone(), &config.workspace_root)
                .with_context(|| format!("building {kind} adapter {:?}", source.display_name))
        };
        let primary = adapter(SourceKind::Primary)?;
        let authoritative = adapter(SourceKind::Authoritative)?;

        let teams = Arc::new(TeamDirectory::nba(config.fuzzy_team_threshold));
        let matcher = EntityMatcher::new(teams.clone(), config.reporting_offset);
        let engine = ReconciliationEngine::new(
            config
                .merge_policy
                .build(config.staleness, config.score_divergence_limit),
            Arc::new(ReconciliationMetrics::new()),
            teams,
        );
        info!(
            primary = primary.name(),
            authoritative = authoritative.name(),
            policy = engine.policy_name(),
            season = %config.season,
            "ingest pipeline ready"
        );

        Ok(Self::new(
            FallbackOrchestrator::new(primary, authoritative, matcher, engine),
            store,
            sink,
            config.season.clone(),
            config.sport.clone(),
            config.reporting_offset,
        ))
    }

    pub fn with_latest(mut self, latest: LatestCycle) -> Self {
        self.latest = latest;
        self
    }

    pub fn latest(&self) -> &LatestCycle {
        &self.latest
    }

    pub fn metrics(&self) -> &Arc<ReconciliationMetrics> {
        self.orchestrator.engine().metrics()
    }

    pub fn season(&self) -> &SeasonLabel {
        &self.season
    }

    fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.reporting_offset).date_naive()
    }

    pub async fn run_live_cycle(&self) -> Result<CycleReport, IngestError> {
        self.run_live_cycle_at(Utc::now()).await
    }

    /// Today's games in the reporting timezone: persist all, publish in-progress games to the
    /// live stream and final games to the stats stream.
    pub async fn run_live_cycle_at(&self, now: DateTime<Utc>) -> Result<CycleReport, IngestError> {
        self.run_instrumented(Cadence::Live, self.local_date(now), now).await
    }

    pub async fn run_batch_cycle(&self) -> Result<CycleReport, IngestError> {
        self.run_batch_cycle_at(Utc::now()).await
    }

    /// Settles yesterday's games. Fails with `SourceUnavailable` unless the authoritative
    /// source answered, so the caller can retry.
    pub async fn run_batch_cycle_at(&self, now: DateTime<Utc>) -> Result<CycleReport, IngestError> {
        let today = self.local_date(now);
        let yesterday = today.pred_opt().unwrap_or(today);
        self.run_instrumented(Cadence::Batch, yesterday, now).await
    }

    async fn run_instrumented(
        &self,
        cadence: Cadence,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<CycleReport, IngestError> {
        let cycle_id = Uuid::new_v4();
        let span = info_span!(
            "cycle",
            %cycle_id,
            cadence = cadence.as_str(),
            season = %self.season,
            %date
        );
        self.run_cycle(cycle_id, cadence, date, now).instrument(span).await
    }

    async fn run_cycle(
        &self,
        cycle_id: Uuid,
        cadence: Cadence,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<CycleReport, IngestError> {
        let started_at = Utc::now();
        let season_id = self.store.resolve_season(&self.season).await?;

        let scope = FetchScope {
            season: self.season.clone(),
            date,
        };
        let CycleOutcome {
            state,
            games,
            anomaly,
        } = self.orchestrator.run_cycle_at(&scope, now).await;
        if let Some(detail) = &anomaly {
            let err = IngestError::ReconciliationAnomaly(detail.clone());
            warn!(error = %err, "cycle degraded to authoritative-only");
        }

        if cadence == Cadence::Batch
            && matches!(state, CycleState::BothUnavailable | CycleState::PrimaryOnly)
        {
            return Err(IngestError::SourceUnavailable(format!(
                "authoritative source has no games for {date}"
            )));
        }

        let summary = self.store.upsert_games(season_id, &games).await?;
        let superseded: Vec<String> = games
            .iter()
            .filter_map(|g| g.alternate_id.clone().filter(|alt| *alt != g.external_id))
            .collect();
        let retired = self.store.retire_games(&superseded).await?;
        if retired > 0 {
            info!(retired, "dropped primary-only rows now covered by reconciled games");
        }

        let mut published = 0;
        let mut publish_failures = 0;
        if cadence == Cadence::Live {
            for game in &games {
                let Some(stream) = stream_for(&self.sport, game) else {
                    continue;
                };
                let event = GameEvent::new(game.clone(), Utc::now());
                match self.sink.publish(&stream, &event).await {
                    Ok(()) => published += 1,
                    Err(err) => {
                        publish_failures += 1;
                        let err = IngestError::PublishFailure {
                            external_id: game.external_id.clone(),
                            reason: err.to_string(),
                        };
                        warn!(%stream, error = %err, "game update not published");
                    }
                }
            }
        }

        let report = CycleReport {
            cycle_id,
            cadence,
            date,
            state,
            anomaly,
            games: games.len(),
            live_games: games.iter().filter(|g| g.is_live()).count(),
            conflicted_games: games.iter().filter(|g| g.conflicted).count(),
            inserted: summary.inserted,
            updated: summary.updated,
            retired,
            published,
            publish_failures,
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            state = %report.state,
            games = report.games,
            live_games = report.live_games,
            conflicted = report.conflicted_games,
            inserted = report.inserted,
            updated = report.updated,
            retired = report.retired,
            published = report.published,
            publish_failures = report.publish_failures,
            "cycle complete"
        );
        self.latest.set(report.clone()).await;
        Ok(report)
    }
}

#[async_trait]
impl CycleRunner for IngestPipeline {
    async fn run_live(&self) -> Result<CycleReport, IngestError> {
        self.run_live_cycle().await
    }

    async fn run_batch(&self) -> Result<CycleReport, IngestError> {
        self.run_batch_cycle().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{eastern, five_authoritative, live, now, orchestrator, record, StaticAdapter};
    use chrono::TimeZone;
    use courtside_core::GameStatus;
    use courtside_storage::{MemoryGameStore, MemorySink, SeasonId};

    fn season() -> SeasonLabel {
        SeasonLabel::starting(2025)
    }

    fn pipeline(
        primary: Arc<dyn courtside_adapters::SourceAdapter>,
        authoritative: Arc<dyn courtside_adapters::SourceAdapter>,
        store: Arc<MemoryGameStore>,
        sink: Arc<MemorySink>,
    ) -> IngestPipeline {
        IngestPipeline::new(
            orchestrator(primary, authoritative),
            store,
            sink,
            season(),
            "basketball_nba",
            eastern(),
        )
    }

    fn seeded_store() -> Arc<MemoryGameStore> {
        Arc::new(MemoryGameStore::with_season(season(), SeasonId(1)))
    }

    #[tokio::test]
    async fn live_cycle_persists_everything_and_routes_updates_by_status() {
        let store = seeded_store();
        let sink = Arc::new(MemorySink::new());
        let mut authoritative = five_authoritative();
        authoritative[2].status = GameStatus::Final;
        let primary = vec![live(SourceKind::Primary, "live-1", "Celtics", "Lakers", (54, 50))];
        let pipeline = pipeline(
            StaticAdapter::records(SourceKind::Primary, primary),
            StaticAdapter::records(SourceKind::Authoritative, authoritative),
            store.clone(),
            sink.clone(),
        );

        let report = pipeline.run_live_cycle_at(now()).await.unwrap();
        assert_eq!(report.cadence, Cadence::Live);
        assert_eq!(report.state, CycleState::BothReconciled);
        assert_eq!(report.date, NaiveDate::from_ymd_opt(2026, 1, 10).unwrap());
        assert_eq!((report.games, report.live_games), (5, 4));
        assert_eq!((report.inserted, report.updated, report.retired), (5, 0, 0));
        assert_eq!((report.published, report.publish_failures), (5, 0));

        let events = sink.events().await;
        let (live, stats): (Vec<_>, Vec<_>) = events
            .iter()
            .partition(|e| e.stream == "games.live.basketball_nba");
        assert_eq!(live.len(), 4);
        assert!(live.iter().all(|e| e.event.game.is_live()));
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].stream, "games.stats.basketball_nba");
        assert_eq!(stats[0].event.game.external_id, "401810002");
        assert_eq!(store.len().await, 5);
        assert_eq!(pipeline.latest().get().await, Some(report));
        assert_eq!(pipeline.metrics().snapshot().total_reconciliations, 1);
    }

    #[tokio::test]
    async fn second_cycle_updates_instead_of_inserting() {
        let store = seeded_store();
        let pipeline = pipeline(
            StaticAdapter::failing(SourceKind::Primary),
            StaticAdapter::records(SourceKind::Authoritative, five_authoritative()),
            store,
            Arc::new(MemorySink::new()),
        );
        pipeline.run_live_cycle_at(now()).await.unwrap();
        let second = pipeline.run_live_cycle_at(now()).await.unwrap();
        assert_eq!(second.state, CycleState::AuthoritativeOnly);
        assert_eq!((second.inserted, second.updated), (0, 5));
    }

    #[tokio::test]
    async fn rejected_publishes_do_not_stop_the_rest() {
        let sink = Arc::new(MemorySink::rejecting(["401810001"]));
        let pipeline = pipeline(
            StaticAdapter::failing(SourceKind::Primary),
            StaticAdapter::records(SourceKind::Authoritative, five_authoritative()),
            seeded_store(),
            sink.clone(),
        );
        let report = pipeline.run_live_cycle_at(now()).await.unwrap();
        assert_eq!((report.published, report.publish_failures), (4, 1));
        assert_eq!(sink.events().await.len(), 4);
    }

    #[tokio::test]
    async fn missing_season_aborts_the_cycle() {
        let store = Arc::new(MemoryGameStore::new());
        let pipeline = pipeline(
            StaticAdapter::failing(SourceKind::Primary),
            StaticAdapter::records(SourceKind::Authoritative, five_authoritative()),
            store.clone(),
            Arc::new(MemorySink::new()),
        );
        let err = pipeline.run_live_cycle_at(now()).await.unwrap_err();
        assert!(matches!(err, IngestError::SeasonNotFound(ref s) if *s == season()));
        assert!(!err.is_transient());
        assert!(store.is_empty().await);
        assert!(pipeline.latest().get().await.is_none());
    }

    #[tokio::test]
    async fn nothing_anywhere_is_an_empty_live_cycle() {
        let pipeline = pipeline(
            StaticAdapter::failing(SourceKind::Primary),
            StaticAdapter::failing(SourceKind::Authoritative),
            seeded_store(),
            Arc::new(MemorySink::new()),
        );
        let report = pipeline.run_live_cycle_at(now()).await.unwrap();
        assert_eq!(report.state, CycleState::BothUnavailable);
        assert_eq!(report.games, 0);
    }

    #[tokio::test]
    async fn batch_settles_yesterday_without_publishing() {
        let sink = Arc::new(MemorySink::new());
        let finals: Vec<_> = five_authoritative()
            .into_iter()
            .map(|mut r| {
                r.status = GameStatus::Final;
                r
            })
            .collect();
        let pipeline = pipeline(
            StaticAdapter::records(SourceKind::Primary, vec![]),
            StaticAdapter::records(SourceKind::Authoritative, finals),
            seeded_store(),
            sink.clone(),
        );
        let report = pipeline.run_batch_cycle_at(now()).await.unwrap();
        assert_eq!(report.cadence, Cadence::Batch);
        assert_eq!(report.date, NaiveDate::from_ymd_opt(2026, 1, 9).unwrap());
        assert_eq!(report.inserted, 5);
        assert_eq!(report.published, 0);
        assert!(sink.events().await.is_empty());
    }

    #[tokio::test]
    async fn batch_matches_start_less_primary_records_to_yesterdays_games() {
        let mut authoritative = record(
            SourceKind::Authoritative,
            "401810000",
            "BOS",
            "LAL",
            GameStatus::Final,
            (110, 104),
        );
        // 19:30 on the 9th in UTC-5, the day being settled.
        authoritative.scheduled_start = Some(Utc.with_ymd_and_hms(2026, 1, 10, 0, 30, 0).unwrap());
        // Seen this evening, a day after tip-off, with no start time on the card.
        let primary = record(
            SourceKind::Primary,
            "live-20260109-lakers-celtics",
            "Celtics",
            "Lakers",
            GameStatus::Final,
            (110, 104),
        );
        let store = seeded_store();
        let sink = Arc::new(MemorySink::new());
        let pipeline = pipeline(
            StaticAdapter::records(SourceKind::Primary, vec![primary]),
            StaticAdapter::records(SourceKind::Authoritative, vec![authoritative]),
            store.clone(),
            sink.clone(),
        );

        let report = pipeline.run_batch_cycle_at(now()).await.unwrap();
        assert_eq!(report.state, CycleState::BothReconciled);
        assert_eq!((report.games, report.inserted), (1, 1));
        assert_eq!(store.len().await, 1);
        let settled = store.get("401810000").await.unwrap().game;
        assert_eq!(settled.alternate_id.as_deref(), Some("live-20260109-lakers-celtics"));
        assert_eq!(pipeline.metrics().snapshot().total_reconciliations, 1);
        assert!(sink.events().await.is_empty());
    }

    #[tokio::test]
    async fn reconciled_game_replaces_the_primary_only_row_it_absorbed() {
        let store = seeded_store();
        let primary = || {
            StaticAdapter::records(
                SourceKind::Primary,
                vec![live(SourceKind::Primary, "live-1", "Celtics", "Lakers", (54, 50))],
            )
        };

        let degraded = pipeline(
            primary(),
            StaticAdapter::failing(SourceKind::Authoritative),
            store.clone(),
            Arc::new(MemorySink::new()),
        );
        let first = degraded.run_live_cycle_at(now()).await.unwrap();
        assert_eq!(first.state, CycleState::PrimaryOnly);
        assert!(store.get("live-1").await.is_some());

        let recovered = pipeline(
            primary(),
            StaticAdapter::records(SourceKind::Authoritative, five_authoritative()),
            store.clone(),
            Arc::new(MemorySink::new()),
        );
        let second = recovered.run_live_cycle_at(now()).await.unwrap();
        assert_eq!(second.state, CycleState::BothReconciled);
        assert_eq!(second.retired, 1);
        assert!(store.get("live-1").await.is_none());
        assert_eq!(
            store.get("401810000").await.unwrap().game.alternate_id.as_deref(),
            Some("live-1")
        );
        assert_eq!(store.len().await, 5);

        let again = recovered.run_live_cycle_at(now()).await.unwrap();
        assert_eq!(again.retired, 0);
    }

    #[tokio::test]
    async fn batch_without_authoritative_data_is_retryable() {
        let primary = vec![record(
            SourceKind::Primary,
            "live-1",
            "Celtics",
            "Lakers",
            GameStatus::Final,
            (101, 99),
        )];
        let store = seeded_store();
        let pipeline = pipeline(
            StaticAdapter::records(SourceKind::Primary, primary),
            StaticAdapter::failing(SourceKind::Authoritative),
            store.clone(),
            Arc::new(MemorySink::new()),
        );
        let err = pipeline.run_batch_cycle_at(now()).await.unwrap_err();
        assert!(matches!(err, IngestError::SourceUnavailable(_)));
        assert!(err.is_transient());
        assert!(store.is_empty().await);
    }

    #[test]
    fn store_errors_map_onto_the_ingest_taxonomy() {
        let err: IngestError = StoreError::SeasonNotFound(season()).into();
        assert!(matches!(err, IngestError::SeasonNotFound(_)));
        let encode = serde_json::from_str::<u32>("not a number").unwrap_err();
        let err: IngestError = StoreError::Encode(encode).into();
        assert!(matches!(err, IngestError::Persistence(_)));
        assert!(err.is_transient());
    }
}
