use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courtside_core::{CanonicalGame, SeasonLabel};
use sqlx::{PgPool, Row};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

/// Internal numeric season identifier resolved from a [`SeasonLabel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeasonId(pub i32);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("season {0} not found")]
    SeasonNotFound(SeasonLabel),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("encoding provenance: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("{field} of {external_id} does not fit the column: {value}")]
    OutOfRange {
        external_id: String,
        field: &'static str,
        value: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpsertSummary {
    pub inserted: usize,
    pub updated: usize,
}

impl UpsertSummary {
    pub fn total(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Persistence boundary: upsert-by-external-identity for canonical games.
#[async_trait]
pub trait GameStore: Send + Sync {
    async fn resolve_season(&self, label: &SeasonLabel) -> Result<SeasonId, StoreError>;

    /// Last writer wins: a later upsert of the same `external_id` replaces the row.
    async fn upsert_games(
        &self,
        season: SeasonId,
        games: &[CanonicalGame],
    ) -> Result<UpsertSummary, StoreError>;

    /// Deletes rows stored under ids that a reconciled game has since replaced. Returns how
    /// many rows were removed; unknown ids are ignored.
    async fn retire_games(&self, external_ids: &[String]) -> Result<usize, StoreError>;
}

/// Home and away score as they are stored, rejecting values the `INTEGER` columns cannot hold.
fn score_columns(game: &CanonicalGame) -> Result<(Option<i32>, Option<i32>), StoreError> {
    let Some(score) = game.score else {
        return Ok((None, None));
    };
    let column = |field: &'static str, value: u32| {
        i32::try_from(value).map_err(|_| StoreError::OutOfRange {
            external_id: game.external_id.clone(),
            field,
            value,
        })
    };
    Ok((
        Some(column("home_score", score.home)?),
        Some(column("away_score", score.away)?),
    ))
}

pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    info!("database migrations applied");
    Ok(())
}

#[derive(Debug, Clone)]
pub struct PgGameStore {
    pool: PgPool,
    sport: String,
}

impl PgGameStore {
    pub fn new(pool: PgPool, sport: impl Into<String>) -> Self {
        Self {
            pool,
            sport: sport.into(),
        }
    }

    pub async fn connect(database_url: &str, sport: impl Into<String>) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool, sport))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl GameStore for PgGameStore {
    async fn resolve_season(&self, label: &SeasonLabel) -> Result<SeasonId, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT season_id
              FROM seasons
             WHERE season_label = $1 AND sport = $2
             LIMIT 1
            "#,
        )
        .bind(label.as_str())
        .bind(&self.sport)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(SeasonId(row.try_get("season_id")?)),
            None => Err(StoreError::SeasonNotFound(label.clone())),
        }
    }

    async fn upsert_games(
        &self,
        season: SeasonId,
        games: &[CanonicalGame],
    ) -> Result<UpsertSummary, StoreError> {
        let mut summary = UpsertSummary::default();
        if games.is_empty() {
            return Ok(summary);
        }

        let mut tx = self.pool.begin().await?;
        for game in games {
            let provenance = serde_json::to_value(&game.provenance)?;
            let (home_score, away_score) = score_columns(game)?;
            let row = sqlx::query(
                r#"
                INSERT INTO games (
                    external_id, season_id, home_team, away_team, status,
                    home_score, away_score, period, clock, scheduled_start,
                    observed_at, conflicted, winning_source, alternate_id, provenance, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, NOW())
                ON CONFLICT (external_id) DO UPDATE SET
                    season_id = EXCLUDED.season_id,
                    home_team = EXCLUDED.home_team,
                    away_team = EXCLUDED.away_team,
                    status = EXCLUDED.status,
                    home_score = EXCLUDED.home_score,
                    away_score = EXCLUDED.away_score,
                    period = EXCLUDED.period,
                    clock = EXCLUDED.clock,
                    scheduled_start = EXCLUDED.scheduled_start,
                    observed_at = EXCLUDED.observed_at,
                    conflicted = EXCLUDED.conflicted,
                    winning_source = EXCLUDED.winning_source,
                    alternate_id = EXCLUDED.alternate_id,
                    provenance = EXCLUDED.provenance,
                    updated_at = NOW()
                RETURNING (xmax = 0) AS inserted
                "#,
            )
            .bind(&game.external_id)
            .bind(season.0)
            .bind(&game.home_team)
            .bind(&game.away_team)
            .bind(game.status.as_str())
            .bind(home_score)
            .bind(away_score)
            .bind(game.clock.period.map(i16::from))
            .bind(game.clock.display.as_deref())
            .bind(game.scheduled_start)
            .bind(game.observed_at)
            .bind(game.conflicted)
            .bind(game.winning_source.as_str())
            .bind(game.alternate_id.as_deref())
            .bind(provenance)
            .fetch_one(&mut *tx)
            .await?;

            if row.try_get::<bool, _>("inserted")? {
                summary.inserted += 1;
            } else {
                summary.updated += 1;
            }
        }
        tx.commit().await?;
        Ok(summary)
    }

    async fn retire_games(&self, external_ids: &[String]) -> Result<usize, StoreError> {
        if external_ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query("DELETE FROM games WHERE external_id = ANY($1)")
            .bind(external_ids)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }
}

#[derive(Debug, Clone)]
pub struct StoredGame {
    pub season: SeasonId,
    pub game: CanonicalGame,
    pub updated_at: DateTime<Utc>,
}

/// In-process store used by tests and fixture runs.
#[derive(Debug, Default)]
pub struct MemoryGameStore {
    seasons: Mutex<BTreeMap<SeasonLabel, SeasonId>>,
    games: Mutex<BTreeMap<String, StoredGame>>,
}

impl MemoryGameStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_season(label: SeasonLabel, id: SeasonId) -> Self {
        let mut seasons = BTreeMap::new();
        seasons.insert(label, id);
        Self {
            seasons: Mutex::new(seasons),
            games: Mutex::new(BTreeMap::new()),
        }
    }

    pub async fn insert_season(&self, label: SeasonLabel, id: SeasonId) {
        self.seasons.lock().await.insert(label, id);
    }

    pub async fn get(&self, external_id: &str) -> Option<StoredGame> {
        self.games.lock().await.get(external_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.games.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.games.lock().await.is_empty()
    }
}

#[async_trait]
impl GameStore for MemoryGameStore {
    async fn resolve_season(&self, label: &SeasonLabel) -> Result<SeasonId, StoreError> {
        self.seasons
            .lock()
            .await
            .get(label)
            .copied()
            .ok_or_else(|| StoreError::SeasonNotFound(label.clone()))
    }

    async fn upsert_games(
        &self,
        season: SeasonId,
        games: &[CanonicalGame],
    ) -> Result<UpsertSummary, StoreError> {
        let mut stored = self.games.lock().await;
        let mut summary = UpsertSummary::default();
        let now = Utc::now();
        for game in games {
            let previous = stored.insert(
                game.external_id.clone(),
                StoredGame {
                    season,
                    game: game.clone(),
                    updated_at: now,
                },
            );
            if previous.is_some() {
                summary.updated += 1;
            } else {
                summary.inserted += 1;
            }
        }
        Ok(summary)
    }

    async fn retire_games(&self, external_ids: &[String]) -> Result<usize, StoreError> {
        let mut stored = self.games.lock().await;
        Ok(external_ids
            .iter()
            .filter(|id| stored.remove(id.as_str()).is_some())
            .count())
    }
}
