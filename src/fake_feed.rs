//! Scripted stand-in for the football-data client. Used by the tests and by
//! `--replay`, which drives the whole sync from a JSON file instead of the
//! network.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;

use crate::error::FeedError;
use crate::feed::{MatchBatch, MatchFeed, MatchRecord, UpstreamTeam};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedCall {
    Dated { from: NaiveDate, to: NaiveDate },
    Live,
    Competition(u32),
    Details(u64),
    Standings(u32),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ReplayFile {
    matches: Option<Value>,
    live: Option<Value>,
    competitions: BTreeMap<String, Value>,
    details: BTreeMap<String, Value>,
    standings: BTreeMap<String, Vec<Value>>,
}

type Scripted = RefCell<VecDeque<Result<MatchBatch, FeedError>>>;

/// Each queue hands out its responses in order and keeps repeating the last
/// one. An empty queue answers with `FeedError::Missing`.
#[derive(Default)]
pub struct ScriptedFeed {
    dated: Scripted,
    live: Scripted,
    competitions: HashMap<u32, MatchBatch>,
    details: HashMap<u64, MatchRecord>,
    standings: HashMap<u32, Vec<UpstreamTeam>>,
    calls: RefCell<Vec<FeedCall>>,
}

impl ScriptedFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a replay file:
    /// `{"matches": [..], "live": [..], "competitions": {"2021": [..]},
    ///   "details": {"<id>": {..}}, "standings": {"2021": [team, ..]}}`.
    /// Every key is optional.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read replay file {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("parse replay file {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let replay: ReplayFile = serde_json::from_str(raw.trim()).context("invalid replay json")?;
        let mut feed = Self::new();

        if let Some(records) = replay.matches {
            feed.push_dated(Ok(batch_from(records)?));
        }
        if let Some(records) = replay.live {
            feed.push_live(Ok(batch_from(records)?));
        }
        for (key, records) in replay.competitions {
            feed.insert_competition(parse_key(&key)?, batch_from(records)?);
        }
        for (key, record) in replay.details {
            feed.insert_detail(parse_key(&key)?, record);
        }
        for (key, rows) in replay.standings {
            let teams = rows
                .iter()
                .filter_map(|row| UpstreamTeam::from_value(row.get("team").unwrap_or(row)))
                .collect();
            feed.insert_standings(parse_key(&key)?, teams);
        }
        Ok(feed)
    }

    pub fn push_dated(&self, response: Result<MatchBatch, FeedError>) {
        self.dated.borrow_mut().push_back(response);
    }

    pub fn push_live(&self, response: Result<MatchBatch, FeedError>) {
        self.live.borrow_mut().push_back(response);
    }

    pub fn insert_competition(&mut self, competition_id: u32, batch: MatchBatch) {
        self.competitions.insert(competition_id, batch);
    }

    pub fn insert_detail(&mut self, external_id: u64, record: MatchRecord) {
        self.details.insert(external_id, record);
    }

    pub fn insert_standings(&mut self, competition_id: u32, teams: Vec<UpstreamTeam>) {
        self.standings.insert(competition_id, teams);
    }

    pub fn calls(&self) -> Vec<FeedCall> {
        self.calls.borrow().clone()
    }

    pub fn live_call_count(&self) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|call| matches!(call, FeedCall::Live))
            .count()
    }

    fn record(&self, call: FeedCall) {
        self.calls.borrow_mut().push(call);
    }
}

fn next_scripted(queue: &Scripted, what: &str) -> Result<MatchBatch, FeedError> {
    let mut queue = queue.borrow_mut();
    if queue.len() > 1
        && let Some(response) = queue.pop_front()
    {
        return response;
    }
    match queue.front() {
        Some(response) => response.clone(),
        None => Err(FeedError::Missing(what.to_string())),
    }
}

impl MatchFeed for ScriptedFeed {
    fn fetch_matches(
        &self,
        date_from: NaiveDate,
        date_to: NaiveDate,
    ) -> Result<MatchBatch, FeedError> {
        self.record(FeedCall::Dated {
            from: date_from,
            to: date_to,
        });
        next_scripted(&self.dated, "dated matches")
    }

    fn fetch_live_matches(&self) -> Result<MatchBatch, FeedError> {
        self.record(FeedCall::Live);
        next_scripted(&self.live, "live matches")
    }

    fn fetch_competition_matches(&self, competition_id: u32) -> Result<MatchBatch, FeedError> {
        self.record(FeedCall::Competition(competition_id));
        self.competitions
            .get(&competition_id)
            .cloned()
            .ok_or_else(|| FeedError::Missing(format!("competition {competition_id}")))
    }

    fn fetch_match_details(&self, external_id: u64) -> Result<MatchRecord, FeedError> {
        self.record(FeedCall::Details(external_id));
        self.details
            .get(&external_id)
            .cloned()
            .ok_or_else(|| FeedError::Missing(format!("match {external_id}")))
    }

    fn fetch_standings(&self, competition_id: u32) -> Result<Vec<UpstreamTeam>, FeedError> {
        self.record(FeedCall::Standings(competition_id));
        self.standings
            .get(&competition_id)
            .cloned()
            .ok_or_else(|| FeedError::Missing(format!("standings {competition_id}")))
    }
}

fn batch_from(records: Value) -> Result<MatchBatch> {
    MatchBatch::from_value(records).map_err(|err| anyhow!("{err}"))
}

fn parse_key<T: std::str::FromStr>(key: &str) -> Result<T> {
    key.trim()
        .parse::<T>()
        .map_err(|_| anyhow!("replay key {key:?} is not a numeric id"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn last_response_repeats_and_empty_queue_fails() {
        let feed = ScriptedFeed::new();
        assert!(matches!(
            feed.fetch_live_matches(),
            Err(FeedError::Missing(_))
        ));

        feed.push_live(Err(FeedError::Transport("down".to_string())));
        feed.push_live(Ok(MatchBatch::new(vec![json!({"id": 1})])));
        assert!(feed.fetch_live_matches().is_err());
        assert_eq!(feed.fetch_live_matches().unwrap().len(), 1);
        assert_eq!(feed.fetch_live_matches().unwrap().len(), 1);
        assert_eq!(feed.live_call_count(), 4);
    }

    #[test]
    fn replay_json_fills_every_endpoint() {
        let feed = ScriptedFeed::from_json(
            r#"{
                "matches": {"matches": [{"id": 1}, {"id": 2}]},
                "live": [{"id": 2}],
                "competitions": {"2021": [{"id": 3}]},
                "details": {"2": {"status": "FINISHED"}},
                "standings": {"2021": [{"team": {"id": 57, "name": "Arsenal FC"}}]}
            }"#,
        )
        .unwrap();
        let day = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        assert_eq!(feed.fetch_matches(day, day).unwrap().len(), 2);
        assert_eq!(feed.fetch_live_matches().unwrap().len(), 1);
        assert_eq!(feed.fetch_competition_matches(2021).unwrap().len(), 1);
        assert!(feed.fetch_match_details(2).is_ok());
        assert_eq!(feed.fetch_standings(2021).unwrap()[0].id, Some(57));
        assert!(feed.fetch_standings(2014).is_err());
        assert_eq!(feed.calls()[0], FeedCall::Dated { from: day, to: day });
    }

    #[test]
    fn replay_rejects_non_numeric_keys() {
        assert!(ScriptedFeed::from_json(r#"{"details": {"abc": {}}}"#).is_err());
        assert!(ScriptedFeed::from_json("42").is_err());
    }
}
