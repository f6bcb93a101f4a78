//! Source adapter contract plus the scoreboard, live-card and fixture adapters.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use courtside_core::{FetchScope, GameClock, GameStatus, Score, SourceKind, SourceRecord};
use courtside_storage::{FetchError, HttpFetcher, RetryDisposition};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, warn};

pub const CRATE_NAME: &str = "courtside-adapters";

/// Concrete adapter implementation named by a `sources.yaml` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    Scoreboard,
    LiveCard,
    Fixture,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceRegistry {
    pub sources: Vec<SourceConfig>,
}

impl SourceRegistry {
    pub fn source(&self, kind: SourceKind) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.kind == kind)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub adapter: AdapterKind,
    pub display_name: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub fixture_path: Option<PathBuf>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("unparseable upstream payload: {0}")]
    Parse(String),
    #[error("fixture {path}: {message}")]
    Fixture { path: String, message: String },
    #[error("{0}")]
    Message(String),
}

impl AdapterError {
    /// True when the next scheduled poll may reasonably succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Fetch(err) => err.disposition() == RetryDisposition::Retryable,
            Self::Parse(_) | Self::Fixture { .. } | Self::Message(_) => false,
        }
    }
}

/// Fetches one source's records for a scope.
///
/// Implementations never retry: a failed call is reported once and the next cadence tick
/// is the retry. An empty vector means the source answered but had no games.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn kind(&self) -> SourceKind;
    fn name(&self) -> &'static str;

    async fn fetch(&self, scope: &FetchScope) -> Result<Vec<SourceRecord>, AdapterError>;
}

/// Builds the adapter described by a registry entry. Relative fixture paths resolve against
/// `workspace_root`.
pub fn adapter_for_source(
    config: &SourceConfig,
    http: Arc<HttpFetcher>,
    workspace_root: &Path,
) -> Result<Arc<dyn SourceAdapter>> {
    let require_url = || {
        config
            .base_url
            .clone()
            .with_context(|| format!("source {:?} needs a base_url", config.display_name))
    };

    let adapter: Arc<dyn SourceAdapter> = match config.adapter {
        AdapterKind::Scoreboard => {
            if config.kind != SourceKind::Authoritative {
                anyhow::bail!("the scoreboard adapter only serves the authoritative source");
            }
            Arc::new(ScoreboardAdapter::new(http, require_url()?))
        }
        AdapterKind::LiveCard => {
            if config.kind != SourceKind::Primary {
                anyhow::bail!("the live-card adapter only serves the primary source");
            }
            let query = config.query.clone().unwrap_or_else(|| "scores".to_string());
            Arc::new(LiveCardAdapter::new(http, require_url()?, query))
        }
        AdapterKind::Fixture => {
            let path = config
                .fixture_path
                .as_ref()
                .with_context(|| format!("source {:?} needs a fixture_path", config.display_name))?;
            Arc::new(FixtureAdapter::new(config.kind, workspace_root.join(path)))
        }
    };
    Ok(adapter)
}

fn json_at<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a JsonValue> {
    let mut cur = value;
    for segment in path {
        cur = cur.get(*segment)?;
    }
    Some(cur)
}

fn json_str<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a str> {
    json_at(value, path)?.as_str()
}

fn text_or_none(value: String) -> Option<String> {
    let trimmed = value.trim().to_string();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

/// Maps the scoreboard's short forms onto the three-letter codes used everywhere else.
pub fn normalize_abbreviation(raw: &str) -> String {
    let upper = raw.trim().to_ascii_uppercase();
    match upper.as_str() {
        "GS" => "GSW".to_string(),
        "SA" => "SAS".to_string(),
        "NO" => "NOP".to_string(),
        "NY" => "NYK".to_string(),
        "UTAH" => "UTA".to_string(),
        "WSH" => "WAS".to_string(),
        _ => upper,
    }
}

/// Scoreboard timestamps come both with and without seconds (`2026-01-11T00:30Z`).
fn parse_upstream_time(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%MZ")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Authoritative source: a scoreboard JSON API keyed by date.
#[derive(Debug, Clone)]
pub struct ScoreboardAdapter {
    http: Arc<HttpFetcher>,
    base_url: String,
}

impl ScoreboardAdapter {
    pub fn new(http: Arc<HttpFetcher>, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl SourceAdapter for ScoreboardAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Authoritative
    }

    fn name(&self) -> &'static str {
        "scoreboard"
    }

    async fn fetch(&self, scope: &FetchScope) -> Result<Vec<SourceRecord>, AdapterError> {
        let url = format!("{}/scoreboard", self.base_url.trim_end_matches('/'));
        let query = [("dates", scope.date.format("%Y%m%d").to_string())];
        let body: JsonValue = self.http.get_json(self.name(), &url, &query).await?;
        parse_scoreboard(&body, Utc::now())
    }
}

/// Parses a scoreboard payload. Events missing an id or either team are skipped; a payload
/// without an `events` array is rejected outright.
pub fn parse_scoreboard(
    payload: &JsonValue,
    observed_at: DateTime<Utc>,
) -> Result<Vec<SourceRecord>, AdapterError> {
    let events = payload
        .get("events")
        .and_then(JsonValue::as_array)
        .ok_or_else(|| AdapterError::Parse("scoreboard payload has no events array".into()))?;

    let mut records = Vec::with_capacity(events.len());
    for event in events {
        match parse_scoreboard_event(event, observed_at) {
            Some(record) => records.push(record),
            None => warn!(
                event_id = json_str(event, &["id"]).unwrap_or("<missing>"),
                "skipping incomplete scoreboard event"
            ),
        }
    }
    Ok(records)
}

fn parse_scoreboard_event(event: &JsonValue, observed_at: DateTime<Utc>) -> Option<SourceRecord> {
    let external_id = json_str(event, &["id"])?.to_string();
    let competitors = event
        .get("competitions")?
        .as_array()?
        .first()?
        .get("competitors")?
        .as_array()?;

    let side = |home_away: &str| {
        competitors
            .iter()
            .find(|c| json_str(c, &["homeAway"]) == Some(home_away))
    };
    let home = side("home")?;
    let away = side("away")?;
    let home_team = normalize_abbreviation(json_str(home, &["team", "abbreviation"])?);
    let away_team = normalize_abbreviation(json_str(away, &["team", "abbreviation"])?);

    let completed = json_at(event, &["status", "type", "completed"])
        .and_then(JsonValue::as_bool)
        .unwrap_or(false);
    let status = if completed {
        GameStatus::Final
    } else {
        json_str(event, &["status", "type", "state"])
            .map(GameStatus::parse_loose)
            .unwrap_or(GameStatus::Unknown)
    };

    let team_score = |c: &JsonValue| json_str(c, &["score"]).and_then(|s| s.trim().parse::<u32>().ok());
    let score = match (status, team_score(home), team_score(away)) {
        (GameStatus::Scheduled, _, _) => None,
        (_, Some(h), Some(a)) => Some(Score::new(h, a)),
        _ => None,
    };

    let clock = if status == GameStatus::Scheduled {
        GameClock::default()
    } else {
        GameClock {
            period: json_at(event, &["status", "period"])
                .and_then(JsonValue::as_u64)
                .filter(|p| *p > 0)
                .and_then(|p| u8::try_from(p).ok()),
            display: json_str(event, &["status", "displayClock"])
                .and_then(|s| text_or_none(s.to_string())),
        }
    };

    Some(SourceRecord {
        source: SourceKind::Authoritative,
        external_id,
        home_team,
        away_team,
        status,
        score,
        clock,
        scheduled_start: json_str(event, &["date"]).and_then(parse_upstream_time),
        observed_at,
    })
}

const LIVE_CARD_SELECTOR: &str = "div.imso_mh__lv-m-stl-cont";
const LIVE_CARD_TEAM_SELECTOR: &str = "div.imso_mh__first-tn-ed";
const LIVE_CARD_SCORE_SELECTOR: &str = "div.imso_mh__l-tm-sc";
const LIVE_CARD_STATUS_SELECTOR: &str = "div.imso_mh__lv-m-stts-cont";

/// Primary source: live score cards scraped from a search results page.
#[derive(Debug, Clone)]
pub struct LiveCardAdapter {
    http: Arc<HttpFetcher>,
    base_url: String,
    query: String,
}

impl LiveCardAdapter {
    pub fn new(http: Arc<HttpFetcher>, base_url: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            query: query.into(),
        }
    }
}

#[async_trait]
impl SourceAdapter for LiveCardAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Primary
    }

    fn name(&self) -> &'static str {
        "live_card"
    }

    async fn fetch(&self, scope: &FetchScope) -> Result<Vec<SourceRecord>, AdapterError> {
        let query = [(
            "q",
            format!("{} {}", self.query, scope.date.format("%B %-d %Y")),
        )];
        let fetched = self.http.get_text(self.name(), &self.base_url, &query).await?;
        parse_live_cards(&fetched.body, scope.date, Utc::now())
    }
}

fn selector(css: &str) -> Result<Selector, AdapterError> {
    Selector::parse(css).map_err(|e| AdapterError::Message(e.to_string()))
}

fn element_texts(card: &ElementRef<'_>, sel: &Selector) -> Vec<String> {
    card.select(sel)
        .map(|n| n.text().collect::<String>().trim().to_string())
        .collect()
}

fn slug(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Identifier for a card that carries no upstream id of its own.
pub fn live_card_external_id(date: NaiveDate, home: &str, away: &str) -> String {
    format!("live-{}-{}-{}", date.format("%Y%m%d"), slug(away), slug(home))
}

/// Parses every live card on a results page. The first team listed on a card is the home
/// team. Cards without two team names are skipped.
pub fn parse_live_cards(
    html: &str,
    date: NaiveDate,
    observed_at: DateTime<Utc>,
) -> Result<Vec<SourceRecord>, AdapterError> {
    let document = Html::parse_document(html);
    let card_sel = selector(LIVE_CARD_SELECTOR)?;
    let team_sel = selector(LIVE_CARD_TEAM_SELECTOR)?;
    let score_sel = selector(LIVE_CARD_SCORE_SELECTOR)?;
    let status_sel = selector(LIVE_CARD_STATUS_SELECTOR)?;

    let mut records = Vec::new();
    for card in document.select(&card_sel) {
        let teams: Vec<String> = element_texts(&card, &team_sel)
            .into_iter()
            .filter(|t| !t.is_empty())
            .collect();
        let [home_team, away_team] = match teams.as_slice() {
            [home, away, ..] => [home.clone(), away.clone()],
            _ => {
                debug!(teams = teams.len(), "skipping live card without two teams");
                continue;
            }
        };

        let scores: Vec<u32> = element_texts(&card, &score_sel)
            .iter()
            .filter_map(|s| s.parse().ok())
            .collect();
        let status_text = element_texts(&card, &status_sel).join(" ");
        let status = live_card_status(&status_text);

        let score = match (status, scores.as_slice()) {
            (GameStatus::Scheduled, _) => None,
            (_, [home, away, ..]) => Some(Score::new(*home, *away)),
            _ => None,
        };
        let clock = if status == GameStatus::InProgress {
            parse_game_clock(&status_text)
        } else {
            GameClock::default()
        };

        records.push(SourceRecord {
            source: SourceKind::Primary,
            external_id: live_card_external_id(date, &home_team, &away_team),
            home_team,
            away_team,
            status,
            score,
            clock,
            scheduled_start: None,
            observed_at,
        });
    }
    Ok(records)
}

fn live_card_status(text: &str) -> GameStatus {
    let lower = text.to_lowercase();
    if lower.contains("final") {
        GameStatus::Final
    } else if lower.contains("live") || lower.contains("half") || parse_game_clock(text).period.is_some() {
        GameStatus::InProgress
    } else if lower.contains(" am") || lower.contains(" pm") || lower.contains("scheduled") {
        GameStatus::Scheduled
    } else {
        GameStatus::Unknown
    }
}

fn period_token(token: &str) -> Option<u8> {
    match token {
        "q1" | "1st" | "first" => Some(1),
        "q2" | "2nd" | "second" => Some(2),
        "q3" | "3rd" | "third" => Some(3),
        "q4" | "4th" | "fourth" => Some(4),
        "ot" | "overtime" => Some(5),
        _ => token
            .strip_suffix("ot")
            .and_then(|n| n.parse::<u8>().ok())
            .map(|n| 4u8.saturating_add(n)),
    }
}

/// Extracts period and clock from card status text such as `Live · Q3 5:30`, `4th 0:41`,
/// `2OT 1:12` or `Halftime`.
pub fn parse_game_clock(text: &str) -> GameClock {
    let lower = text.to_lowercase();
    if lower.contains("halftime") || lower.split_whitespace().any(|t| t == "half") {
        return GameClock {
            period: Some(2),
            display: Some("Halftime".to_string()),
        };
    }

    let mut clock = GameClock::default();
    for token in lower.split(|c: char| c.is_whitespace() || c == '·' || c == ',') {
        if token.is_empty() {
            continue;
        }
        if clock.period.is_none() {
            if let Some(period) = period_token(token) {
                clock.period = Some(period);
                continue;
            }
        }
        if clock.display.is_none() && NaiveTime::parse_from_str(&format!("00:{token}"), "%H:%M:%S").is_ok() {
            clock.display = Some(token.to_string());
        }
    }
    clock
}

/// Replays captured records from disk as if they had just been observed.
///
/// Every record is re-stamped with the fetch time and its scheduled start is moved onto the
/// requested date, keeping the time of day, so a snapshot can drive any cycle date.
#[derive(Debug, Clone)]
pub struct FixtureAdapter {
    kind: SourceKind,
    path: PathBuf,
}

impl FixtureAdapter {
    pub fn new(kind: SourceKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Vec<SourceRecord>, AdapterError> {
        let fixture_err = |message: String| AdapterError::Fixture {
            path: self.path.display().to_string(),
            message,
        };
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| fixture_err(e.to_string()))?;
        let records: Vec<SourceRecord> =
            serde_json::from_str(&text).map_err(|e| fixture_err(e.to_string()))?;
        if let Some(wrong) = records.iter().find(|r| r.source != self.kind) {
            return Err(fixture_err(format!(
                "record {} is tagged {} but the fixture serves {}",
                wrong.external_id, wrong.source, self.kind
            )));
        }
        Ok(records)
    }
}

#[async_trait]
impl SourceAdapter for FixtureAdapter {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn name(&self) -> &'static str {
        "fixture"
    }

    async fn fetch(&self, scope: &FetchScope) -> Result<Vec<SourceRecord>, AdapterError> {
        let now = Utc::now();
        let mut records = self.load().await?;
        let anchor = records
            .iter()
            .filter_map(|r| r.scheduled_start)
            .min()
            .map(|start| start.date_naive());
        for record in &mut records {
            record.observed_at = now;
            if let (Some(start), Some(anchor)) = (record.scheduled_start, anchor) {
                let shift = scope.date.signed_duration_since(anchor);
                record.scheduled_start = Some(start + shift);
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;

    fn workspace_root() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../..")
            .canonicalize()
            .expect("workspace root")
    }

    fn observed() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 11, 1, 40, 0).unwrap()
    }

    fn scope(date: NaiveDate) -> FetchScope {
        FetchScope {
            season: "2025-26".parse().unwrap(),
            date,
        }
    }

    #[test]
    fn scoreboard_fixture_parses_complete_events() {
        let text = std::fs::read_to_string(workspace_root().join("fixtures/scoreboard/sample.json")).unwrap();
        let payload: JsonValue = serde_json::from_str(&text).unwrap();
        let records = parse_scoreboard(&payload, observed()).unwrap();

        assert_eq!(records.len(), 5, "malformed event is skipped");
        let bos = &records[0];
        assert_eq!(bos.external_id, "401810001");
        assert_eq!((bos.home_team.as_str(), bos.away_team.as_str()), ("BOS", "LAL"));
        assert_eq!(bos.status, GameStatus::InProgress);
        assert_eq!(bos.score, Some(Score::new(54, 49)));
        assert_eq!(bos.clock.period, Some(3));
        assert_eq!(bos.clock.display.as_deref(), Some("5:42"));
        assert_eq!(
            bos.scheduled_start,
            Some(Utc.with_ymd_and_hms(2026, 1, 11, 0, 30, 0).unwrap())
        );
        assert_eq!(bos.observed_at, observed());

        let phx = &records[1];
        assert_eq!(phx.away_team, "GSW");
        assert_eq!(phx.status, GameStatus::Scheduled);
        assert!(phx.score.is_none());
        assert!(phx.clock.is_empty());

        let mia = &records[2];
        assert_eq!(mia.away_team, "NYK");
        assert_eq!(mia.status, GameStatus::Final);
        assert_eq!(mia.score, Some(Score::new(112, 104)));
    }

    #[test]
    fn scoreboard_without_events_is_a_parse_error() {
        let err = parse_scoreboard(&serde_json::json!({ "leagues": [] }), observed()).unwrap_err();
        assert!(matches!(err, AdapterError::Parse(_)));
        assert!(!err.is_transient());

        let empty = parse_scoreboard(&serde_json::json!({ "events": [] }), observed()).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn live_card_fixture_parses_cards_home_first() {
        let html = std::fs::read_to_string(workspace_root().join("fixtures/live_card/sample.html")).unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 1, 10).unwrap();
        let records = parse_live_cards(&html, date, observed()).unwrap();

        assert_eq!(records.len(), 4, "card without teams is skipped");
        let celtics = &records[0];
        assert_eq!(celtics.source, SourceKind::Primary);
        assert_eq!(celtics.external_id, "live-20260110-lakers-celtics");
        assert_eq!(celtics.home_team, "Celtics");
        assert_eq!(celtics.away_team, "Lakers");
        assert_eq!(celtics.status, GameStatus::InProgress);
        assert_eq!(celtics.score, Some(Score::new(54, 50)));
        assert_eq!(celtics.clock.period, Some(3));
        assert_eq!(celtics.clock.display.as_deref(), Some("5:30"));
        assert!(celtics.scheduled_start.is_none());

        assert_eq!(records[1].status, GameStatus::Final);
        assert!(records[1].clock.is_empty());
        assert_eq!(records[2].clock.period, Some(1));
        assert_eq!(records[3].clock.display.as_deref(), Some("Halftime"));
    }

    #[test]
    fn game_clock_parsing_handles_card_vocabularies() {
        assert_eq!(
            parse_game_clock("Live · Q4 0:41"),
            GameClock { period: Some(4), display: Some("0:41".into()) }
        );
        assert_eq!(
            parse_game_clock("2nd 11:02"),
            GameClock { period: Some(2), display: Some("11:02".into()) }
        );
        assert_eq!(parse_game_clock("OT 3:00").period, Some(5));
        assert_eq!(parse_game_clock("2OT 1:12").period, Some(6));
        assert_eq!(parse_game_clock("Half").period, Some(2));
        assert!(parse_game_clock("Final").is_empty());
    }

    #[test]
    fn live_card_status_distinguishes_pregame() {
        assert_eq!(live_card_status("Today, 7:30 PM"), GameStatus::Scheduled);
        assert_eq!(live_card_status("Final/OT"), GameStatus::Final);
        assert_eq!(live_card_status("Live"), GameStatus::InProgress);
        assert_eq!(live_card_status("Postponed"), GameStatus::Unknown);
    }

    #[test]
    fn scoreboard_short_forms_normalize() {
        assert_eq!(normalize_abbreviation("gs"), "GSW");
        assert_eq!(normalize_abbreviation("UTAH"), "UTA");
        assert_eq!(normalize_abbreviation("bos"), "BOS");
    }

    #[tokio::test]
    async fn fixture_adapter_replays_onto_the_requested_date() {
        let adapter = FixtureAdapter::new(
            SourceKind::Authoritative,
            workspace_root().join("fixtures/records/authoritative.json"),
        );
        let before = Utc::now();
        let records = adapter
            .fetch(&scope(NaiveDate::from_ymd_opt(2026, 2, 3).unwrap()))
            .await
            .unwrap();

        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.observed_at >= before));
        // Earliest start was 2026-01-10 20:00Z; everything shifts by the same number of days.
        assert_eq!(
            records[1].scheduled_start,
            Some(Utc.with_ymd_and_hms(2026, 2, 3, 20, 0, 0).unwrap())
        );
        assert_eq!(
            records[0].scheduled_start,
            Some(Utc.with_ymd_and_hms(2026, 2, 4, 0, 30, 0).unwrap())
        );
    }

    #[tokio::test]
    async fn fixture_adapter_rejects_mislabelled_records() {
        let adapter = FixtureAdapter::new(
            SourceKind::Authoritative,
            workspace_root().join("fixtures/records/primary.json"),
        );
        let err = adapter
            .fetch(&scope(NaiveDate::from_ymd_opt(2026, 1, 10).unwrap()))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Fixture { .. }), "{err}");
    }

    #[tokio::test]
    async fn fixture_adapter_reports_missing_and_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = FixtureAdapter::new(SourceKind::Primary, dir.path().join("nope.json"));
        let date = NaiveDate::from_ymd_opt(2026, 1, 10).unwrap();
        assert!(missing.fetch(&scope(date)).await.is_err());

        let path = dir.path().join("empty.json");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"[]").unwrap();
        let empty = FixtureAdapter::new(SourceKind::Primary, &path);
        assert!(empty.fetch(&scope(date)).await.unwrap().is_empty());
    }

    #[test]
    fn registry_builds_fixture_adapters_relative_to_workspace() {
        let config = SourceConfig {
            kind: SourceKind::Primary,
            adapter: AdapterKind::Fixture,
            display_name: "Captured primary snapshot".into(),
            base_url: None,
            query: None,
            fixture_path: Some(PathBuf::from("fixtures/records/primary.json")),
            notes: None,
        };
        let http = Arc::new(HttpFetcher::new(Default::default()).unwrap());
        let adapter = adapter_for_source(&config, http.clone(), &workspace_root()).unwrap();
        assert_eq!(adapter.kind(), SourceKind::Primary);
        assert_eq!(adapter.name(), "fixture");

        let misrouted = SourceConfig {
            kind: SourceKind::Primary,
            adapter: AdapterKind::Scoreboard,
            base_url: Some("https://example.invalid".into()),
            ..config
        };
        assert!(adapter_for_source(&misrouted, http, &workspace_root()).is_err());
    }
}
