//! football-data.org v4 client and the record types the sync reads from it.
//!
//! Batches keep each match as raw JSON so a single malformed record is
//! rejected on its own when it is reconciled instead of failing the whole
//! response.

use chrono::{DateTime, NaiveDate, Utc};
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{FeedError, MalformedMatch};
use crate::http_client::http_client;

const AUTH_HEADER: &str = "X-Auth-Token";
const ERROR_BODY_LIMIT: usize = 300;

/// A single match object as the feed returns it.
pub type MatchRecord = Value;

/// Upstream data source. Every call is a single attempt; an `Err` means the
/// caller should try again on a later cycle.
pub trait MatchFeed {
    fn fetch_matches(&self, date_from: NaiveDate, date_to: NaiveDate)
    -> Result<MatchBatch, FeedError>;
    fn fetch_live_matches(&self) -> Result<MatchBatch, FeedError>;
    fn fetch_competition_matches(&self, competition_id: u32) -> Result<MatchBatch, FeedError>;
    fn fetch_match_details(&self, external_id: u64) -> Result<MatchRecord, FeedError>;
    fn fetch_standings(&self, competition_id: u32) -> Result<Vec<UpstreamTeam>, FeedError>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchBatch {
    pub records: Vec<MatchRecord>,
}

impl MatchBatch {
    pub fn new(records: Vec<MatchRecord>) -> Self {
        Self { records }
    }

    /// Decodes a `{"matches": [...]}` response. A body without a `matches`
    /// array is a failure, not an empty batch.
    pub fn from_json(raw: &str) -> Result<Self, FeedError> {
        let value: Value = serde_json::from_str(raw.trim())
            .map_err(|err| FeedError::Decode(format!("invalid matches json: {err}")))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, FeedError> {
        match value {
            Value::Object(mut map) => match map.remove("matches") {
                Some(Value::Array(records)) => Ok(Self { records }),
                _ => Err(FeedError::Decode("response has no matches array".to_string())),
            },
            Value::Array(records) => Ok(Self { records }),
            _ => Err(FeedError::Decode("response is not an object".to_string())),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Home/away names of every record that has both, malformed or not
    /// otherwise.
    pub fn team_name_pairs(&self) -> Vec<(String, String)> {
        self.records
            .iter()
            .filter_map(|record| {
                let home = team_name(record.get("homeTeam")?)?;
                let away = team_name(record.get("awayTeam")?)?;
                Some((home, away))
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpstreamTeam {
    pub id: Option<u64>,
    pub name: String,
    pub short_name: Option<String>,
    pub tla: Option<String>,
    pub crest: Option<String>,
}

impl UpstreamTeam {
    pub fn from_value(v: &Value) -> Option<Self> {
        let name = team_name(v)?;
        Some(Self {
            id: v.get("id").and_then(as_u64_any),
            name,
            short_name: opt_string(v.get("shortName")),
            tla: opt_string(v.get("tla")),
            crest: opt_string(v.get("crest")),
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScorePair {
    pub home: Option<i32>,
    pub away: Option<i32>,
}

impl ScorePair {
    fn from_value(v: Option<&Value>) -> Self {
        let Some(v) = v else {
            return Self::default();
        };
        Self {
            home: v.get("home").and_then(as_i32_any),
            away: v.get("away").and_then(as_i32_any),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.home.is_some() && self.away.is_some()
    }

    pub fn swapped(self) -> Self {
        Self {
            home: self.away,
            away: self.home,
        }
    }
}

/// A validated upstream match, ready for reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamMatch {
    pub id: Option<u64>,
    pub competition_id: u32,
    pub kickoff: DateTime<Utc>,
    pub status: String,
    pub minute: Option<i32>,
    pub venue: Option<String>,
    pub matchday: Option<i32>,
    pub home: UpstreamTeam,
    pub away: UpstreamTeam,
    pub full_time: ScorePair,
    pub half_time: ScorePair,
}

impl UpstreamMatch {
    pub fn from_value(v: &Value) -> Result<Self, MalformedMatch> {
        if !v.is_object() {
            return Err(MalformedMatch::Shape(truncate(&v.to_string(), 80)));
        }
        let competition_id = v
            .get("competition")
            .and_then(|c| c.get("id"))
            .and_then(as_u64_any)
            .and_then(|id| u32::try_from(id).ok())
            .ok_or(MalformedMatch::MissingCompetition)?;
        let home = v
            .get("homeTeam")
            .and_then(UpstreamTeam::from_value)
            .ok_or(MalformedMatch::MissingTeam { side: "home" })?;
        let away = v
            .get("awayTeam")
            .and_then(UpstreamTeam::from_value)
            .ok_or(MalformedMatch::MissingTeam { side: "away" })?;
        let raw_date = v
            .get("utcDate")
            .and_then(|d| d.as_str())
            .unwrap_or_default();
        let kickoff = parse_utc(raw_date).ok_or_else(|| MalformedMatch::BadDate(raw_date.to_string()))?;
        let score = v.get("score");

        Ok(Self {
            id: v.get("id").and_then(as_u64_any),
            competition_id,
            kickoff,
            status: v
                .get("status")
                .and_then(|s| s.as_str())
                .unwrap_or_default()
                .to_string(),
            minute: v.get("minute").and_then(as_minute),
            venue: opt_string(v.get("venue")),
            matchday: v.get("matchday").and_then(as_i32_any),
            home,
            away,
            full_time: ScorePair::from_value(score.and_then(|s| s.get("fullTime"))),
            half_time: ScorePair::from_value(score.and_then(|s| s.get("halfTime"))),
        })
    }
}

/// Status and scores of a single-match detail response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoreSnapshot {
    pub status: Option<String>,
    pub full_time: ScorePair,
    pub half_time: ScorePair,
}

impl ScoreSnapshot {
    pub fn from_value(v: &Value) -> Self {
        // Some deployments wrap the detail in {"match": {...}}.
        let v = v.get("match").filter(|m| m.is_object()).unwrap_or(v);
        let score = v.get("score");
        Self {
            status: opt_string(v.get("status")),
            full_time: ScorePair::from_value(score.and_then(|s| s.get("fullTime"))),
            half_time: ScorePair::from_value(score.and_then(|s| s.get("halfTime"))),
        }
    }
}

/// Teams of the overall table in a standings response.
pub fn parse_standings_json(raw: &str) -> Result<Vec<UpstreamTeam>, FeedError> {
    let value: Value = serde_json::from_str(raw.trim())
        .map_err(|err| FeedError::Decode(format!("invalid standings json: {err}")))?;
    let standings = value
        .get("standings")
        .and_then(|s| s.as_array())
        .ok_or_else(|| FeedError::Decode("response has no standings array".to_string()))?;
    let table = standings
        .iter()
        .find(|s| s.get("type").and_then(|t| t.as_str()) == Some("TOTAL"))
        .or_else(|| standings.first())
        .and_then(|s| s.get("table"))
        .and_then(|t| t.as_array());
    let Some(table) = table else {
        return Ok(Vec::new());
    };
    Ok(table
        .iter()
        .filter_map(|row| row.get("team").and_then(UpstreamTeam::from_value))
        .collect())
}

pub struct FootballDataClient {
    base_url: String,
    api_key: String,
}

impl FootballDataClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn get_text(&self, path: &str, query: &[(&str, String)]) -> Result<String, FeedError> {
        let client = http_client().map_err(|err| FeedError::Transport(format!("{err:#}")))?;
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, ?query, "feed request");

        let resp = client
            .get(&url)
            .header(AUTH_HEADER, &self.api_key)
            .query(query)
            .send()
            .map_err(|err| FeedError::Transport(err.to_string()))?;
        let status = resp.status();
        let body = resp
            .text()
            .map_err(|err| FeedError::Transport(format!("failed reading body: {err}")))?;
        if !status.is_success() {
            warn!(%url, status = status.as_u16(), "feed request rejected");
            return Err(status_error(status, &body));
        }
        Ok(body)
    }
}

impl MatchFeed for FootballDataClient {
    fn fetch_matches(
        &self,
        date_from: NaiveDate,
        date_to: NaiveDate,
    ) -> Result<MatchBatch, FeedError> {
        let query = [
            ("dateFrom", date_from.format("%Y-%m-%d").to_string()),
            ("dateTo", date_to.format("%Y-%m-%d").to_string()),
        ];
        MatchBatch::from_json(&self.get_text("/matches", &query)?)
    }

    fn fetch_live_matches(&self) -> Result<MatchBatch, FeedError> {
        let query = [("status", "LIVE".to_string())];
        MatchBatch::from_json(&self.get_text("/matches", &query)?)
    }

    fn fetch_competition_matches(&self, competition_id: u32) -> Result<MatchBatch, FeedError> {
        let path = format!("/competitions/{competition_id}/matches");
        MatchBatch::from_json(&self.get_text(&path, &[])?)
    }

    fn fetch_match_details(&self, external_id: u64) -> Result<MatchRecord, FeedError> {
        let path = format!("/matches/{external_id}");
        let body = self.get_text(&path, &[])?;
        serde_json::from_str(body.trim())
            .map_err(|err| FeedError::Decode(format!("invalid match json: {err}")))
    }

    fn fetch_standings(&self, competition_id: u32) -> Result<Vec<UpstreamTeam>, FeedError> {
        let path = format!("/competitions/{competition_id}/standings");
        parse_standings_json(&self.get_text(&path, &[])?)
    }
}

fn status_error(status: StatusCode, body: &str) -> FeedError {
    FeedError::Status {
        status: status.as_u16(),
        body: truncate(body.trim(), ERROR_BODY_LIMIT),
    }
}

pub fn parse_utc(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    // Occasionally seen without the zone designator.
    chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

fn team_name(v: &Value) -> Option<String> {
    let name = v.get("name")?.as_str()?.trim();
    if name.is_empty() {
        return None;
    }
    Some(name.to_string())
}

fn opt_string(v: Option<&Value>) -> Option<String> {
    let s = v?.as_str()?.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

fn as_u64_any(v: &Value) -> Option<u64> {
    if let Some(n) = v.as_u64() {
        return Some(n);
    }
    v.as_str()?.trim().parse::<u64>().ok()
}

fn as_i32_any(v: &Value) -> Option<i32> {
    if let Some(n) = v.as_i64() {
        return i32::try_from(n).ok();
    }
    v.as_str()?.trim().parse::<i32>().ok()
}

/// Minutes arrive as numbers or as strings like "45+2".
fn as_minute(v: &Value) -> Option<i32> {
    if let Some(n) = as_i32_any(v) {
        return Some(n);
    }
    let raw = v.as_str()?;
    let base = raw.split('+').next()?.trim().trim_end_matches('\'');
    base.parse::<i32>().ok()
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max).collect();
    out.push('…');
    out
}
