use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use courtside_core::{MatchedPair, SourceKind, SourceRecord};
use thiserror::Error;

use crate::teams::TeamDirectory;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    #[error("{side} record {external_id} appears in {count} matched pairs")]
    NonInjective {
        side: SourceKind,
        external_id: String,
        count: usize,
    },
}

/// Order-independent team pair plus the local calendar date of the game.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MatchKey {
    pub team_a: String,
    pub team_b: String,
    pub date: NaiveDate,
}

/// Correlates authoritative and primary records that describe the same game.
#[derive(Debug, Clone)]
pub struct EntityMatcher {
    teams: Arc<TeamDirectory>,
    reporting_offset: FixedOffset,
}

impl EntityMatcher {
    pub fn new(teams: Arc<TeamDirectory>, reporting_offset: FixedOffset) -> Self {
        Self {
            teams,
            reporting_offset,
        }
    }

    pub fn teams(&self) -> &Arc<TeamDirectory> {
        &self.teams
    }

    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.reporting_offset).date_naive()
    }

    /// A record without a scheduled start is keyed to `fetched_for`, the date it was fetched
    /// for, never to the moment it was observed.
    pub fn key_for(&self, record: &SourceRecord, fetched_for: NaiveDate) -> MatchKey {
        let home = self.teams.canonical(&record.home_team);
        let away = self.teams.canonical(&record.away_team);
        let (team_a, team_b) = if home <= away { (home, away) } else { (away, home) };
        MatchKey {
            team_a,
            team_b,
            date: record
                .scheduled_start
                .map_or(fetched_for, |start| self.local_date(start)),
        }
    }

    /// Pairs every primary record with at most one authoritative record.
    ///
    /// Output order is the primary input order, followed by the authoritative records nobody
    /// claimed in their input order. Among several candidates for one primary record the
    /// closest scheduled start wins, then the lowest authoritative external id.
    pub fn match_records(
        &self,
        authoritative: Vec<SourceRecord>,
        primary: Vec<SourceRecord>,
        fetched_for: NaiveDate,
    ) -> Vec<MatchedPair> {
        let mut index: BTreeMap<MatchKey, Vec<usize>> = BTreeMap::new();
        for (i, record) in authoritative.iter().enumerate() {
            index.entry(self.key_for(record, fetched_for)).or_default().push(i);
        }
        let mut slots: Vec<Option<SourceRecord>> = authoritative.into_iter().map(Some).collect();
        let mut pairs = Vec::with_capacity(slots.len() + primary.len());

        for record in primary {
            let key = self.key_for(&record, fetched_for);
            let reference = record.scheduled_start.unwrap_or(record.observed_at);
            let chosen = index.get(&key).and_then(|candidates| {
                candidates
                    .iter()
                    .copied()
                    .filter_map(|i| slots[i].as_ref().map(|auth| (i, auth)))
                    .min_by(|(_, a), (_, b)| {
                        start_distance(a, reference)
                            .cmp(&start_distance(b, reference))
                            .then_with(|| a.external_id.cmp(&b.external_id))
                    })
                    .map(|(i, _)| i)
            });

            match chosen.and_then(|i| slots[i].take()) {
                Some(auth) => pairs.push(MatchedPair::both(auth, record)),
                None => pairs.push(MatchedPair::primary_only(record)),
            }
        }

        pairs.extend(slots.into_iter().flatten().map(MatchedPair::authoritative_only));
        pairs
    }
}

/// Seconds between the candidate's scheduled start and `reference`; no start sorts last.
fn start_distance(candidate: &SourceRecord, reference: DateTime<Utc>) -> i64 {
    candidate
        .scheduled_start
        .map(|start| (start - reference).num_seconds().abs())
        .unwrap_or(i64::MAX)
}

/// Rejects pair lists in which one external id of either side appears in more than one pair.
pub fn verify_injective(pairs: &[MatchedPair]) -> Result<(), MatchError> {
    for side in [SourceKind::Authoritative, SourceKind::Primary] {
        let mut seen: HashMap<&str, usize> = HashMap::new();
        for pair in pairs {
            let record = match side {
                SourceKind::Authoritative => pair.authoritative.as_ref(),
                SourceKind::Primary => pair.primary.as_ref(),
            };
            if let Some(record) = record {
                *seen.entry(record.external_id.as_str()).or_default() += 1;
            }
        }
        let mut repeated: Vec<(&str, usize)> =
            seen.into_iter().filter(|(_, count)| *count > 1).collect();
        repeated.sort();
        if let Some((external_id, count)) = repeated.first() {
            return Err(MatchError::NonInjective {
                side,
                external_id: external_id.to_string(),
                count: *count,
            });
        }
    }
    Ok(())
}
