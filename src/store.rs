use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::config::LeagueMapping;
use crate::feed::parse_utc;
use crate::models::{
    League, LiveFixture, MatchStatus, MatchUpdate, NewMatch, NewTeam, StoredMatch, Team,
};
use crate::names::{slugify, strip_affixes};

const TEAM_COLUMNS: &str = "id, name, short_name, slug, league_id, api_id, logo_url, city";
const MATCH_COLUMNS: &str = "id, league_id, home_team_id, away_team_id, kickoff, status, \
     home_score, away_score, halftime_home_score, halftime_away_score, minute, api_match_id, \
     venue, matchweek";

const KNOWN_LEAGUE_NAMES: &[(&str, &str)] = &[
    ("premier-league", "Premier League"),
    ("la-liga", "La Liga"),
    ("serie-a", "Serie A"),
    ("bundesliga", "Bundesliga"),
    ("ligue-1", "Ligue 1"),
    ("champions-league", "UEFA Champions League"),
    ("eredivisie", "Eredivisie"),
    ("primeira-liga", "Primeira Liga"),
    ("championship", "Championship"),
];

/// Teams whose names reduce to the same club key.
#[derive(Debug, Clone)]
pub struct DuplicateGroup {
    pub key: String,
    pub teams: Vec<(Team, Option<String>)>,
}

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create database directory {}", parent.display()))?;
        }
        let conn =
            Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    fn init_schema(&self) -> Result<()> {
        self.conn
            .execute_batch(
                r#"
                PRAGMA journal_mode = WAL;
                PRAGMA foreign_keys = ON;
                CREATE TABLE IF NOT EXISTS leagues (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    slug TEXT NOT NULL UNIQUE,
                    name TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS teams (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
                    short_name TEXT NOT NULL,
                    slug TEXT NOT NULL UNIQUE,
                    league_id INTEGER NULL REFERENCES leagues(id),
                    api_id INTEGER NULL UNIQUE,
                    logo_url TEXT NULL,
                    city TEXT NOT NULL DEFAULT 'Unknown',
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_teams_name ON teams(name);

                CREATE TABLE IF NOT EXISTS matches (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    league_id INTEGER NOT NULL REFERENCES leagues(id),
                    home_team_id INTEGER NOT NULL REFERENCES teams(id),
                    away_team_id INTEGER NOT NULL REFERENCES teams(id),
                    kickoff TEXT NOT NULL,
                    match_day TEXT NOT NULL,
                    status TEXT NOT NULL,
                    home_score INTEGER NULL CHECK (home_score IS NULL OR home_score >= 0),
                    away_score INTEGER NULL CHECK (away_score IS NULL OR away_score >= 0),
                    halftime_home_score INTEGER NULL,
                    halftime_away_score INTEGER NULL,
                    minute INTEGER NULL,
                    api_match_id INTEGER NULL UNIQUE,
                    venue TEXT NULL,
                    matchweek INTEGER NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    UNIQUE (league_id, home_team_id, away_team_id, match_day)
                );
                CREATE INDEX IF NOT EXISTS idx_matches_status ON matches(status);
                CREATE INDEX IF NOT EXISTS idx_matches_kickoff ON matches(kickoff);
                "#,
            )
            .context("create sqlite schema")?;
        Ok(())
    }

    /// Makes sure every mapped league has a reference row.
    pub fn seed_leagues(&self, mapping: &LeagueMapping) -> Result<usize> {
        let mut inserted = 0usize;
        for slug in mapping.slugs() {
            inserted += self
                .conn
                .execute(
                    "INSERT INTO leagues (slug, name, created_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(slug) DO NOTHING",
                    params![slug, league_display_name(slug), now_text()],
                )
                .with_context(|| format!("seed league {slug}"))?;
        }
        Ok(inserted)
    }

    pub fn league_by_slug(&self, slug: &str) -> Result<Option<League>> {
        self.conn
            .query_row(
                "SELECT id, slug, name FROM leagues WHERE slug = ?1",
                params![slug],
                |row| {
                    Ok(League {
                        id: row.get(0)?,
                        slug: row.get(1)?,
                        name: row.get(2)?,
                    })
                },
            )
            .optional()
            .context("query league by slug")
    }

    // ---- teams ----------------------------------------------------------

    pub fn team_by_id(&self, id: i64) -> Result<Option<Team>> {
        self.team_where("id = ?1", params![id])
    }

    pub fn team_by_api_id(&self, api_id: u64) -> Result<Option<Team>> {
        self.team_where("api_id = ?1", params![sql_id(api_id)?])
    }

    pub fn team_by_slug(&self, slug: &str) -> Result<Option<Team>> {
        self.team_where("slug = ?1", params![slug])
    }

    /// Case-sensitive equality, lowest id first.
    pub fn team_by_exact_name(&self, name: &str) -> Result<Option<Team>> {
        self.team_where("name = ?1", params![name])
    }

    /// First team (by id) whose name contains `fragment`, ASCII
    /// case-insensitively.
    pub fn team_name_containing(&self, fragment: &str) -> Result<Option<Team>> {
        let pattern = format!("%{}%", escape_like(fragment));
        self.team_where("name LIKE ?1 ESCAPE '\\'", params![pattern])
    }

    fn team_where(&self, clause: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Option<Team>> {
        let sql = format!("SELECT {TEAM_COLUMNS} FROM teams WHERE {clause} ORDER BY id LIMIT 1");
        self.conn
            .query_row(&sql, args, team_from_row)
            .optional()
            .with_context(|| format!("query team where {clause}"))
    }

    /// Inserts a team. Returns `None` when a uniqueness constraint (slug or
    /// api id) already holds another row.
    pub fn insert_team(&self, team: &NewTeam) -> Result<Option<Team>> {
        let now = now_text();
        let changed = self
            .conn
            .execute(
                "INSERT INTO teams (name, short_name, slug, league_id, api_id, logo_url, city,
                                    created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
                 ON CONFLICT DO NOTHING",
                params![
                    team.name,
                    team.short_name,
                    team.slug,
                    team.league_id,
                    sql_opt_id(team.api_id)?,
                    team.logo_url,
                    team.city,
                    now,
                ],
            )
            .with_context(|| format!("insert team {}", team.name))?;
        if changed == 0 {
            return Ok(None);
        }
        self.team_by_id(self.conn.last_insert_rowid())
    }

    /// Attaches an upstream id to a team that has none, unless another team
    /// already holds it.
    pub fn attach_team_api_id(&self, team_id: i64, api_id: u64) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                "UPDATE teams SET api_id = ?2, updated_at = ?3
                 WHERE id = ?1 AND api_id IS NULL
                   AND NOT EXISTS (SELECT 1 FROM teams WHERE api_id = ?2)",
                params![team_id, sql_id(api_id)?, now_text()],
            )
            .context("attach team api id")?;
        Ok(changed > 0)
    }

    /// Refreshes league, crest and (when missing) upstream id of a known team.
    pub fn refresh_team(
        &self,
        team_id: i64,
        league_id: i64,
        api_id: Option<u64>,
        logo_url: Option<&str>,
    ) -> Result<()> {
        self.conn
            .execute(
                "UPDATE teams SET
                    league_id = ?2,
                    logo_url = COALESCE(?4, logo_url),
                    api_id = COALESCE(api_id, CASE
                        WHEN ?3 IS NULL OR EXISTS (SELECT 1 FROM teams t2 WHERE t2.api_id = ?3)
                        THEN NULL ELSE ?3 END),
                    updated_at = ?5
                 WHERE id = ?1",
                params![
                    team_id,
                    league_id,
                    sql_opt_id(api_id)?,
                    logo_url,
                    now_text()
                ],
            )
            .context("refresh team")?;
        Ok(())
    }

    pub fn team_count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM teams", [], |row| row.get(0))
            .context("count teams")?;
        Ok(n as usize)
    }

    /// Teams grouped by their affix-stripped slug, only groups of two or more.
    pub fn duplicate_team_groups(&self) -> Result<Vec<DuplicateGroup>> {
        let sql = "SELECT t.id, t.name, t.short_name, t.slug, t.league_id, t.api_id, t.logo_url,
                          t.city, l.slug
                   FROM teams t LEFT JOIN leagues l ON l.id = t.league_id
                   ORDER BY t.id";
        let mut stmt = self.conn.prepare(sql).context("prepare duplicate teams query")?;
        let rows = stmt
            .query_map([], |row| Ok((team_from_row(row)?, row.get::<_, Option<String>>(8)?)))
            .context("query duplicate teams")?;

        let mut groups: BTreeMap<String, Vec<(Team, Option<String>)>> = BTreeMap::new();
        for row in rows {
            let (team, league) = row.context("decode team row")?;
            let key = slugify(&strip_affixes(&team.name));
            groups.entry(key).or_default().push((team, league));
        }
        Ok(groups
            .into_iter()
            .filter(|(_, teams)| teams.len() > 1)
            .map(|(key, teams)| DuplicateGroup { key, teams })
            .collect())
    }

    // ---- matches --------------------------------------------------------

    pub fn match_by_id(&self, id: i64) -> Result<Option<StoredMatch>> {
        self.match_where("id = ?1", params![id])
    }

    pub fn match_by_api_id(&self, api_match_id: u64) -> Result<Option<StoredMatch>> {
        self.match_where("api_match_id = ?1", params![sql_id(api_match_id)?])
    }

    /// Lookup by (league, home, away, calendar day of kickoff).
    pub fn match_by_fixture(
        &self,
        league_id: i64,
        home_team_id: i64,
        away_team_id: i64,
        day: NaiveDate,
    ) -> Result<Option<StoredMatch>> {
        self.match_where(
            "league_id = ?1 AND home_team_id = ?2 AND away_team_id = ?3 AND match_day = ?4",
            params![league_id, home_team_id, away_team_id, day_text(day)],
        )
    }

    fn match_where(
        &self,
        clause: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> Result<Option<StoredMatch>> {
        let sql =
            format!("SELECT {MATCH_COLUMNS} FROM matches WHERE {clause} ORDER BY id LIMIT 1");
        self.conn
            .query_row(&sql, args, match_from_row)
            .optional()
            .with_context(|| format!("query match where {clause}"))
    }

    /// Inserts a match unless a row with the same fixture key or upstream id
    /// exists. Returns the new id, or `None` when another writer got there
    /// first.
    pub fn insert_match(&self, m: &NewMatch) -> Result<Option<i64>> {
        let now = now_text();
        let changed = self
            .conn
            .execute(
                "INSERT INTO matches (
                    league_id, home_team_id, away_team_id, kickoff, match_day, status,
                    home_score, away_score, halftime_home_score, halftime_away_score, minute,
                    api_match_id, venue, matchweek, created_at, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?15)
                 ON CONFLICT DO NOTHING",
                params![
                    m.league_id,
                    m.home_team_id,
                    m.away_team_id,
                    kickoff_text(m.kickoff),
                    day_text(m.kickoff.date_naive()),
                    m.status.as_str(),
                    m.home_score,
                    m.away_score,
                    m.halftime_home_score,
                    m.halftime_away_score,
                    m.minute,
                    sql_opt_id(m.api_match_id)?,
                    m.venue,
                    m.matchweek,
                    now,
                ],
            )
            .context("insert match")?;
        if changed == 0 {
            return Ok(None);
        }
        Ok(Some(self.conn.last_insert_rowid()))
    }

    /// Last-write-wins merge: status always, everything else only when the
    /// update carries a value. The upstream id is attached only if the row has
    /// none and no other row claims it.
    pub fn apply_match_update(&self, id: i64, update: &MatchUpdate) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                "UPDATE matches SET
                    status = ?2,
                    home_score = COALESCE(?3, home_score),
                    away_score = COALESCE(?4, away_score),
                    halftime_home_score = COALESCE(?5, halftime_home_score),
                    halftime_away_score = COALESCE(?6, halftime_away_score),
                    minute = COALESCE(?7, minute),
                    api_match_id = COALESCE(api_match_id, CASE
                        WHEN ?8 IS NULL OR EXISTS (SELECT 1 FROM matches m2 WHERE m2.api_match_id = ?8)
                        THEN NULL ELSE ?8 END),
                    venue = COALESCE(venue, ?9),
                    matchweek = COALESCE(matchweek, ?10),
                    updated_at = ?11
                 WHERE id = ?1",
                params![
                    id,
                    update.status.as_str(),
                    update.home_score,
                    update.away_score,
                    update.halftime_home_score,
                    update.halftime_away_score,
                    update.minute,
                    sql_opt_id(update.api_match_id)?,
                    update.venue,
                    update.matchweek,
                    now_text(),
                ],
            )
            .with_context(|| format!("update match {id}"))?;
        Ok(changed > 0)
    }

    pub fn set_match_status(&self, id: i64, status: MatchStatus) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                "UPDATE matches SET status = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, status.as_str(), now_text()],
            )
            .with_context(|| format!("set status of match {id}"))?;
        Ok(changed > 0)
    }

    /// Marks a still-live match finished at minute 90. A row that is no
    /// longer live is left alone.
    pub fn finish_live_match(&self, id: i64) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                "UPDATE matches SET status = 'finished', minute = 90, updated_at = ?2
                 WHERE id = ?1 AND status = 'live'",
                params![id, now_text()],
            )
            .with_context(|| format!("finish live match {id}"))?;
        Ok(changed > 0)
    }

    pub fn count_matches_with_status(&self, status: MatchStatus) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM matches WHERE status = ?1",
                params![status.as_str()],
                |row| row.get(0),
            )
            .context("count matches by status")?;
        Ok(n as usize)
    }

    pub fn match_count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM matches", [], |row| row.get(0))
            .context("count matches")?;
        Ok(n as usize)
    }

    pub fn live_fixtures(&self) -> Result<Vec<LiveFixture>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT m.id, h.name, a.name, h.short_name, a.short_name
                 FROM matches m
                 JOIN teams h ON h.id = m.home_team_id
                 JOIN teams a ON a.id = m.away_team_id
                 WHERE m.status = 'live'
                 ORDER BY m.id",
            )
            .context("prepare live fixtures query")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(LiveFixture {
                    match_id: row.get(0)?,
                    home_name: row.get(1)?,
                    away_name: row.get(2)?,
                    home_short: row.get(3)?,
                    away_short: row.get(4)?,
                })
            })
            .context("query live fixtures")?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("decode live fixture row")?);
        }
        Ok(out)
    }

    /// Finished matches lacking a real score that can be looked up upstream,
    /// newest first. Besides NULL scores this covers the 0-0 placeholder a
    /// match is created with when the feed has no score yet: a 0-0 without
    /// any half-time score was never reported by the feed as a result.
    pub fn matches_missing_scores(&self, limit: usize) -> Result<Vec<StoredMatch>> {
        self.matches_where(
            "status = 'finished'
             AND (home_score IS NULL OR away_score IS NULL
                  OR (home_score = 0 AND away_score = 0 AND halftime_home_score IS NULL))
             AND api_match_id IS NOT NULL
             ORDER BY kickoff DESC LIMIT ?1",
            params![i64::try_from(limit).unwrap_or(i64::MAX)],
        )
    }

    /// Matches still scheduled although they kicked off before `cutoff`,
    /// newest first.
    pub fn scheduled_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<StoredMatch>> {
        self.matches_where(
            "status = 'scheduled' AND kickoff < ?1 ORDER BY kickoff DESC",
            params![kickoff_text(cutoff)],
        )
    }

    fn matches_where(
        &self,
        clause: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<StoredMatch>> {
        let sql = format!("SELECT {MATCH_COLUMNS} FROM matches WHERE {clause}");
        let mut stmt = self.conn.prepare(&sql).context("prepare matches query")?;
        let rows = stmt
            .query_map(args, match_from_row)
            .context("query matches")?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("decode match row")?);
        }
        Ok(out)
    }

    /// "Home vs Away" using short names, for log lines.
    pub fn fixture_label(&self, m: &StoredMatch) -> Result<String> {
        let home = self.team_by_id(m.home_team_id)?;
        let away = self.team_by_id(m.away_team_id)?;
        let name = |t: Option<Team>, id: i64| {
            t.map(|t| t.short_name)
                .unwrap_or_else(|| format!("team#{id}"))
        };
        Ok(format!(
            "{} vs {}",
            name(home, m.home_team_id),
            name(away, m.away_team_id)
        ))
    }
}

fn team_from_row(row: &Row<'_>) -> rusqlite::Result<Team> {
    Ok(Team {
        id: row.get(0)?,
        name: row.get(1)?,
        short_name: row.get(2)?,
        slug: row.get(3)?,
        league_id: row.get(4)?,
        api_id: row.get::<_, Option<i64>>(5)?.and_then(|v| u64::try_from(v).ok()),
        logo_url: row.get(6)?,
        city: row.get(7)?,
    })
}

fn match_from_row(row: &Row<'_>) -> rusqlite::Result<StoredMatch> {
    let kickoff_raw: String = row.get(4)?;
    let kickoff = parse_utc(&kickoff_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            Type::Text,
            format!("bad kickoff {kickoff_raw:?}").into(),
        )
    })?;
    let status_raw: String = row.get(5)?;
    let status = status_raw.parse::<MatchStatus>().map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(5, Type::Text, err.to_string().into())
    })?;
    Ok(StoredMatch {
        id: row.get(0)?,
        league_id: row.get(1)?,
        home_team_id: row.get(2)?,
        away_team_id: row.get(3)?,
        kickoff,
        status,
        home_score: row.get(6)?,
        away_score: row.get(7)?,
        halftime_home_score: row.get(8)?,
        halftime_away_score: row.get(9)?,
        minute: row.get(10)?,
        api_match_id: row.get::<_, Option<i64>>(11)?.and_then(|v| u64::try_from(v).ok()),
        venue: row.get(12)?,
        matchweek: row.get(13)?,
    })
}

fn league_display_name(slug: &str) -> String {
    if let Some((_, name)) = KNOWN_LEAGUE_NAMES.iter().find(|(s, _)| *s == slug) {
        return name.to_string();
    }
    slug.split('-')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Upstream ids are stored in INTEGER columns; ids beyond `i64::MAX` are
/// rejected rather than wrapped.
fn sql_id(id: u64) -> Result<i64> {
    i64::try_from(id).with_context(|| format!("upstream id {id} does not fit in the store"))
}

fn sql_opt_id(id: Option<u64>) -> Result<Option<i64>> {
    id.map(sql_id).transpose()
}

fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Fixed-width UTC text so lexical order is chronological order.
pub fn kickoff_text(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn day_text(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

fn now_text() -> String {
    kickoff_text(Utc::now())
}
