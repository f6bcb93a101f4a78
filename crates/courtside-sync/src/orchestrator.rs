use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use courtside_adapters::{AdapterError, SourceAdapter};
use courtside_core::{CanonicalGame, CycleOutcome, CycleState, FetchScope, SourceKind, SourceRecord};
use tracing::{info, warn};

use crate::matcher::{verify_injective, EntityMatcher, MatchError};
use crate::reconcile::ReconciliationEngine;

/// What one adapter call produced. Empty and failed both count as unavailable.
#[derive(Debug)]
pub enum SourceResult {
    Records(Vec<SourceRecord>),
    Empty,
    Failed(AdapterError),
}

impl SourceResult {
    fn from_fetch(kind: SourceKind, adapter: &str, result: Result<Vec<SourceRecord>, AdapterError>) -> Self {
        match result {
            Ok(records) if records.is_empty() => {
                info!(source = %kind, adapter, "source returned no games");
                Self::Empty
            }
            Ok(records) => Self::Records(records),
            Err(err) => {
                warn!(
                    source = %kind,
                    adapter,
                    error = %err,
                    transient = err.is_transient(),
                    "source unavailable"
                );
                Self::Failed(err)
            }
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Records(_))
    }

    pub fn into_records(self) -> Vec<SourceRecord> {
        match self {
            Self::Records(records) => records,
            Self::Empty | Self::Failed(_) => Vec::new(),
        }
    }
}

/// The four-way availability decision.
pub fn classify(primary_available: bool, authoritative_available: bool) -> CycleState {
    match (primary_available, authoritative_available) {
        (false, false) => CycleState::BothUnavailable,
        (false, true) => CycleState::AuthoritativeOnly,
        (true, false) => CycleState::PrimaryOnly,
        (true, true) => CycleState::BothReconciled,
    }
}

fn pass_through(records: Vec<SourceRecord>) -> Vec<CanonicalGame> {
    records.into_iter().map(CanonicalGame::from_record).collect()
}

/// Runs one cycle: always queries both sources, then picks direct use or reconciliation.
#[derive(Clone)]
pub struct FallbackOrchestrator {
    primary: Arc<dyn SourceAdapter>,
    authoritative: Arc<dyn SourceAdapter>,
    matcher: EntityMatcher,
    engine: ReconciliationEngine,
}

impl FallbackOrchestrator {
    pub fn new(
        primary: Arc<dyn SourceAdapter>,
        authoritative: Arc<dyn SourceAdapter>,
        matcher: EntityMatcher,
        engine: ReconciliationEngine,
    ) -> Self {
        Self {
            primary,
            authoritative,
            matcher,
            engine,
        }
    }

    pub fn engine(&self) -> &ReconciliationEngine {
        &self.engine
    }

    pub fn matcher(&self) -> &EntityMatcher {
        &self.matcher
    }

    pub async fn run_cycle(&self, scope: &FetchScope) -> CycleOutcome {
        self.run_cycle_at(scope, Utc::now()).await
    }

    /// Never fails: source errors drive the fallback table, and a reconciliation anomaly
    /// degrades the cycle to authoritative-only with the anomaly attached.
    pub async fn run_cycle_at(&self, scope: &FetchScope, now: DateTime<Utc>) -> CycleOutcome {
        let (primary, authoritative) = tokio::join!(
            self.primary.fetch(scope),
            self.authoritative.fetch(scope)
        );
        let primary = SourceResult::from_fetch(SourceKind::Primary, self.primary.name(), primary);
        let authoritative =
            SourceResult::from_fetch(SourceKind::Authoritative, self.authoritative.name(), authoritative);

        let state = classify(primary.is_available(), authoritative.is_available());
        let primary = primary.into_records();
        let authoritative = authoritative.into_records();

        match state {
            CycleState::BothUnavailable => CycleOutcome::empty(),
            CycleState::AuthoritativeOnly => CycleOutcome {
                state,
                games: pass_through(authoritative),
                anomaly: None,
            },
            CycleState::PrimaryOnly => CycleOutcome {
                state,
                games: pass_through(primary),
                anomaly: None,
            },
            CycleState::BothReconciled => match self.reconcile(authoritative.clone(), primary, scope.date, now) {
                Ok(games) => CycleOutcome {
                    state,
                    games,
                    anomaly: None,
                },
                Err(err) => {
                    warn!(error = %err, "reconciliation anomaly; degrading to authoritative-only");
                    CycleOutcome {
                        state: CycleState::AuthoritativeOnly,
                        games: pass_through(authoritative),
                        anomaly: Some(err.to_string()),
                    }
                }
            },
        }
    }

    fn reconcile(
        &self,
        authoritative: Vec<SourceRecord>,
        primary: Vec<SourceRecord>,
        fetched_for: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Vec<CanonicalGame>, MatchError> {
        let pairs = self.matcher.match_records(authoritative, primary, fetched_for);
        verify_injective(&pairs)?;
        Ok(self.engine.reconcile_pairs(pairs, now))
    }
}
