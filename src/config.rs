use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Result, anyhow};

pub const DEFAULT_BASE_URL: &str = "https://api.football-data.org/v4";
const CACHE_DIR: &str = "matchday_sync";
const DB_FILE: &str = "matchday.sqlite";

/// Upstream competitions we track, keyed by the feed's competition id.
const DEFAULT_LEAGUES: &[(u32, &str)] = &[
    (2021, "premier-league"),
    (2014, "la-liga"),
    (2019, "serie-a"),
];

/// How eagerly the team resolver merges differently spelled names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strictness {
    /// Full heuristic cascade. Occasional duplicate or wrongly merged teams
    /// are accepted in exchange for always resolving.
    #[default]
    Loose,
    /// Only id, exact, affix-stripped exact and synonym lookups.
    Strict,
}

impl FromStr for Strictness {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "loose" | "lenient" => Ok(Strictness::Loose),
            "strict" => Ok(Strictness::Strict),
            other => Err(anyhow!("unknown resolver strictness {other:?}")),
        }
    }
}

/// Feed competition id -> local league slug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeagueMapping {
    entries: BTreeMap<u32, String>,
}

impl LeagueMapping {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (u32, S)>,
        S: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(id, slug)| (id, slug.into()))
                .collect(),
        }
    }

    /// Parses `2021=premier-league,2014=la-liga`. Separators may be `,` `;` or
    /// whitespace.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut entries = BTreeMap::new();
        for part in raw.split([',', ';', ' ', '\n']) {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let Some((id, slug)) = part.split_once('=') else {
                return Err(anyhow!("league mapping entry {part:?} is not id=slug"));
            };
            let id = id
                .trim()
                .parse::<u32>()
                .map_err(|_| anyhow!("league mapping id {id:?} is not a number"))?;
            let slug = slug.trim();
            if slug.is_empty() {
                return Err(anyhow!("league mapping for {id} has an empty slug"));
            }
            entries.insert(id, slug.to_string());
        }
        if entries.is_empty() {
            return Err(anyhow!("league mapping is empty"));
        }
        Ok(Self { entries })
    }

    pub fn slug_for(&self, competition_id: u32) -> Option<&str> {
        self.entries.get(&competition_id).map(String::as_str)
    }

    pub fn competition_ids(&self) -> Vec<u32> {
        self.entries.keys().copied().collect()
    }

    pub fn slugs(&self) -> Vec<&str> {
        self.entries.values().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.entries.iter().map(|(id, slug)| (*id, slug.as_str()))
    }
}

impl Default for LeagueMapping {
    fn default() -> Self {
        Self::new(DEFAULT_LEAGUES.iter().copied())
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub api_key: String,
    pub base_url: String,
    pub db_path: Option<PathBuf>,
    pub interval: Duration,
    pub leagues: LeagueMapping,
    pub strictness: Strictness,
    pub request_pause: Duration,
}

impl SyncConfig {
    /// Reads the process environment. Call `load_dotenv` first when `.env`
    /// files should be honoured.
    pub fn from_env() -> Result<Self> {
        let leagues = match env::var("LEAGUE_MAPPING") {
            Ok(raw) if !raw.trim().is_empty() => LeagueMapping::parse(&raw)?,
            _ => LeagueMapping::default(),
        };
        let strictness = match env::var("RESOLVER_STRICTNESS") {
            Ok(raw) if !raw.trim().is_empty() => raw.parse()?,
            _ => Strictness::default(),
        };
        let interval = env::var("SYNC_INTERVAL_SECS")
            .ok()
            .and_then(|val| val.parse::<u64>().ok())
            .unwrap_or(120)
            .max(5);
        let request_pause = env::var("REQUEST_PAUSE_MS")
            .ok()
            .and_then(|val| val.parse::<u64>().ok())
            .unwrap_or(100)
            .min(120_000);

        Ok(Self {
            api_key: env::var("FOOTBALL_DATA_API_KEY").unwrap_or_default(),
            base_url: env::var("FOOTBALL_DATA_BASE_URL")
                .ok()
                .map(|s| s.trim().trim_end_matches('/').to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            db_path: env::var("MATCHDAY_DB")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            interval: Duration::from_secs(interval),
            leagues,
            strictness,
            request_pause: Duration::from_millis(request_pause),
        })
    }

    pub fn resolved_db_path(&self) -> Option<PathBuf> {
        self.db_path.clone().or_else(default_db_path)
    }
}

pub fn load_dotenv() {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
}

pub fn default_db_path() -> Option<PathBuf> {
    app_cache_dir().map(|dir| dir.join(DB_FILE))
}

fn app_cache_dir() -> Option<PathBuf> {
    if let Ok(base) = env::var("XDG_CACHE_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(CACHE_DIR));
    }
    let home = env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(CACHE_DIR))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_mapping_tracks_three_leagues() {
        let mapping = LeagueMapping::default();
        assert_eq!(mapping.slug_for(2021), Some("premier-league"));
        assert_eq!(mapping.slug_for(2014), Some("la-liga"));
        assert_eq!(mapping.slug_for(2019), Some("serie-a"));
        assert_eq!(mapping.slug_for(2002), None);
    }

    #[test]
    fn mapping_parses_mixed_separators() {
        let mapping = LeagueMapping::parse("2021=premier-league; 2002=bundesliga ,").unwrap();
        assert_eq!(mapping.competition_ids(), vec![2002, 2021]);
        assert_eq!(mapping.slug_for(2002), Some("bundesliga"));
    }

    #[test]
    fn mapping_rejects_garbage() {
        assert!(LeagueMapping::parse("premier-league").is_err());
        assert!(LeagueMapping::parse("x=premier-league").is_err());
        assert!(LeagueMapping::parse("2021=").is_err());
        assert!(LeagueMapping::parse(" ,, ").is_err());
    }

    #[test]
    fn strictness_parses_case_insensitively() {
        assert_eq!("STRICT".parse::<Strictness>().unwrap(), Strictness::Strict);
        assert_eq!("loose".parse::<Strictness>().unwrap(), Strictness::Loose);
        assert!("fuzzy".parse::<Strictness>().is_err());
    }
}
