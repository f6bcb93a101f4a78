use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courtside_core::{CanonicalGame, GameStatus};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

/// Stream that carries live canonical game updates for one sport.
pub fn live_stream_name(sport: &str) -> String {
    format!("games.live.{sport}")
}

/// Stream that carries final game lines for one sport.
pub fn stats_stream_name(sport: &str) -> String {
    format!("games.stats.{sport}")
}

/// In-progress games go to the live stream and final games to the stats stream. Scheduled
/// and unknown games are not published.
pub fn stream_for(sport: &str, game: &CanonicalGame) -> Option<String> {
    match game.status {
        GameStatus::InProgress => Some(live_stream_name(sport)),
        GameStatus::Final => Some(stats_stream_name(sport)),
        GameStatus::Scheduled | GameStatus::Unknown => None,
    }
}

/// Payload appended to the event sink: the canonical game plus when it was published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameEvent {
    pub game: CanonicalGame,
    pub published_at: DateTime<Utc>,
}

impl GameEvent {
    pub fn new(game: CanonicalGame, published_at: DateTime<Utc>) -> Self {
        Self { game, published_at }
    }
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("sink rejected {external_id} on {stream}: {reason}")]
    Rejected {
        stream: String,
        external_id: String,
        reason: String,
    },
    #[error("serializing event: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Append-only downstream event sink keyed by stream name.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, stream: &str, event: &GameEvent) -> Result<(), PublishError>;
}

/// Redis Streams sink: `XADD <stream> * data <json> timestamp <unix-seconds>`.
#[derive(Clone)]
pub struct RedisStreamSink {
    conn: redis::aio::ConnectionManager,
}

impl RedisStreamSink {
    pub async fn connect(redis_url: &str) -> Result<Self, PublishError> {
        let client = redis::Client::open(redis_url)?;
        let conn = redis::aio::ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl EventSink for RedisStreamSink {
    async fn publish(&self, stream: &str, event: &GameEvent) -> Result<(), PublishError> {
        let payload = serde_json::to_string(&event.game)?;
        let mut conn = self.conn.clone();
        let _: String = conn
            .xadd(
                stream,
                "*",
                &[
                    ("data", payload),
                    ("timestamp", event.published_at.timestamp().to_string()),
                ],
            )
            .await?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublishedEvent {
    pub stream: String,
    pub event: GameEvent,
}

/// In-process sink. Games whose external id is in the reject list fail to publish.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<PublishedEvent>>,
    reject: HashSet<String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting<I, S>(external_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            events: Mutex::new(Vec::new()),
            reject: external_ids.into_iter().map(Into::into).collect(),
        }
    }

    pub async fn events(&self) -> Vec<PublishedEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl EventSink for MemorySink {
    async fn publish(&self, stream: &str, event: &GameEvent) -> Result<(), PublishError> {
        if self.reject.contains(&event.game.external_id) {
            return Err(PublishError::Rejected {
                stream: stream.to_string(),
                external_id: event.game.external_id.clone(),
                reason: "rejected by memory sink".into(),
            });
        }
        self.events.lock().await.push(PublishedEvent {
            stream: stream.to_string(),
            event: event.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use courtside_core::{GameClock, GameStatus, SourceKind, SourceRecord};

    fn game(id: &str, status: GameStatus) -> CanonicalGame {
        CanonicalGame::from_record(SourceRecord {
            source: SourceKind::Primary,
            external_id: id.to_string(),
            home_team: "MIA".into(),
            away_team: "ORL".into(),
            status,
            score: None,
            clock: GameClock::default(),
            scheduled_start: None,
            observed_at: Utc.with_ymd_and_hms(2026, 3, 1, 0, 30, 0).unwrap(),
        })
    }

    fn event(id: &str) -> GameEvent {
        let game = game(id, GameStatus::InProgress);
        let published_at = game.observed_at;
        GameEvent::new(game, published_at)
    }

    #[test]
    fn streams_are_keyed_by_sport() {
        assert_eq!(live_stream_name("basketball_nba"), "games.live.basketball_nba");
        assert_eq!(stats_stream_name("basketball_nba"), "games.stats.basketball_nba");
    }

    #[tokio::test]
    async fn final_games_land_on_the_stats_stream() {
        let sink = MemorySink::new();
        for (id, status) in [
            ("g-live", GameStatus::InProgress),
            ("g-final", GameStatus::Final),
            ("g-later", GameStatus::Scheduled),
            ("g-odd", GameStatus::Unknown),
        ] {
            let game = game(id, status);
            if let Some(stream) = stream_for("basketball_nba", &game) {
                let published_at = game.observed_at;
                sink.publish(&stream, &GameEvent::new(game, published_at)).await.unwrap();
            }
        }

        let routed: Vec<(String, String)> = sink
            .events()
            .await
            .into_iter()
            .map(|e| (e.event.game.external_id, e.stream))
            .collect();
        assert_eq!(
            routed,
            vec![
                ("g-live".to_string(), "games.live.basketball_nba".to_string()),
                ("g-final".to_string(), "games.stats.basketball_nba".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn memory_sink_records_and_rejects() {
        let sink = MemorySink::rejecting(["bad"]);
        sink.publish("games.live.test", &event("good")).await.unwrap();
        let err = sink.publish("games.live.test", &event("bad")).await.unwrap_err();
        assert!(matches!(err, PublishError::Rejected { ref external_id, .. } if external_id == "bad"));

        let events = sink.events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].stream, "games.live.test");
        assert_eq!(events[0].event.game.external_id, "good");
    }

    #[test]
    fn event_payload_is_self_describing_json() {
        let json = serde_json::to_value(event("g1")).unwrap();
        assert_eq!(json["game"]["external_id"], "g1");
        assert_eq!(json["game"]["status"], "in_progress");
        assert!(json["published_at"].is_string());
    }
}
