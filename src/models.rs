use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchStatus {
    Scheduled,
    Live,
    Finished,
    Postponed,
    Cancelled,
}

impl MatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchStatus::Scheduled => "scheduled",
            MatchStatus::Live => "live",
            MatchStatus::Finished => "finished",
            MatchStatus::Postponed => "postponed",
            MatchStatus::Cancelled => "cancelled",
        }
    }

    /// Maps the list/live feed vocabulary. Total: anything unrecognised is
    /// treated as not yet started.
    pub fn from_upstream(raw: &str) -> Self {
        match raw {
            "SCHEDULED" | "TIMED" => MatchStatus::Scheduled,
            "IN_PLAY" | "PAUSED" => MatchStatus::Live,
            "FINISHED" => MatchStatus::Finished,
            "POSTPONED" | "SUSPENDED" | "CANCELLED" => MatchStatus::Postponed,
            _ => MatchStatus::Scheduled,
        }
    }

    /// Maps the single-match detail vocabulary used when backfilling results.
    /// Detail lookups only happen for fixtures already in the past, so the
    /// fallback is `Finished`.
    pub fn from_detail(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "FINISHED" | "FULL_TIME" | "FT" => MatchStatus::Finished,
            "IN_PLAY" | "LIVE" | "FIRST_HALF" | "SECOND_HALF" | "HALF_TIME" => MatchStatus::Live,
            "SCHEDULED" | "TIMED" => MatchStatus::Scheduled,
            "POSTPONED" => MatchStatus::Postponed,
            "CANCELLED" => MatchStatus::Cancelled,
            _ => MatchStatus::Finished,
        }
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(MatchStatus::Scheduled),
            "live" => Ok(MatchStatus::Live),
            "finished" => Ok(MatchStatus::Finished),
            "postponed" => Ok(MatchStatus::Postponed),
            "cancelled" => Ok(MatchStatus::Cancelled),
            other => Err(anyhow::anyhow!("unknown match status {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct League {
    pub id: i64,
    pub slug: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Team {
    pub id: i64,
    pub name: String,
    pub short_name: String,
    pub slug: String,
    pub league_id: Option<i64>,
    pub api_id: Option<u64>,
    pub logo_url: Option<String>,
    pub city: String,
}

#[derive(Debug, Clone)]
pub struct NewTeam {
    pub name: String,
    pub short_name: String,
    pub slug: String,
    pub league_id: i64,
    pub api_id: Option<u64>,
    pub logo_url: Option<String>,
    pub city: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredMatch {
    pub id: i64,
    pub league_id: i64,
    pub home_team_id: i64,
    pub away_team_id: i64,
    pub kickoff: DateTime<Utc>,
    pub status: MatchStatus,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
    pub halftime_home_score: Option<i32>,
    pub halftime_away_score: Option<i32>,
    pub minute: Option<i32>,
    pub api_match_id: Option<u64>,
    pub venue: Option<String>,
    pub matchweek: Option<i32>,
}

/// A live match joined with its team names, as the sweeper needs it.
#[derive(Debug, Clone)]
pub struct LiveFixture {
    pub match_id: i64,
    pub home_name: String,
    pub away_name: String,
    pub home_short: String,
    pub away_short: String,
}

#[derive(Debug, Clone)]
pub struct NewMatch {
    pub league_id: i64,
    pub home_team_id: i64,
    pub away_team_id: i64,
    pub kickoff: DateTime<Utc>,
    pub status: MatchStatus,
    pub home_score: i32,
    pub away_score: i32,
    pub halftime_home_score: Option<i32>,
    pub halftime_away_score: Option<i32>,
    pub minute: Option<i32>,
    pub api_match_id: Option<u64>,
    pub venue: Option<String>,
    pub matchweek: Option<i32>,
}

/// Values carried by an upstream observation of an existing match. `None`
/// fields keep whatever is stored.
#[derive(Debug, Clone)]
pub struct MatchUpdate {
    pub status: MatchStatus,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
    pub halftime_home_score: Option<i32>,
    pub halftime_away_score: Option<i32>,
    pub minute: Option<i32>,
    pub api_match_id: Option<u64>,
    pub venue: Option<String>,
    pub matchweek: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::MatchStatus;

    #[test]
    fn upstream_status_mapping_is_total() {
        let cases = [
            ("SCHEDULED", MatchStatus::Scheduled),
            ("TIMED", MatchStatus::Scheduled),
            ("IN_PLAY", MatchStatus::Live),
            ("PAUSED", MatchStatus::Live),
            ("FINISHED", MatchStatus::Finished),
            ("POSTPONED", MatchStatus::Postponed),
            ("SUSPENDED", MatchStatus::Postponed),
            ("CANCELLED", MatchStatus::Postponed),
            ("<unknown>", MatchStatus::Scheduled),
            ("", MatchStatus::Scheduled),
            ("in_play", MatchStatus::Scheduled),
        ];
        for (raw, expected) in cases {
            assert_eq!(MatchStatus::from_upstream(raw), expected, "status {raw:?}");
        }
    }

    #[test]
    fn detail_status_defaults_to_finished() {
        assert_eq!(MatchStatus::from_detail("ft"), MatchStatus::Finished);
        assert_eq!(MatchStatus::from_detail("HALF_TIME"), MatchStatus::Live);
        assert_eq!(MatchStatus::from_detail("CANCELLED"), MatchStatus::Cancelled);
        assert_eq!(MatchStatus::from_detail("AWARDED"), MatchStatus::Finished);
    }
}
