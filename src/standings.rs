use std::thread;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use crate::config::LeagueMapping;
use crate::feed::{MatchFeed, UpstreamTeam};
use crate::models::NewTeam;
use crate::names::slugify;
use crate::store::Store;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeamSyncSummary {
    pub competitions: usize,
    pub created: usize,
    pub refreshed: usize,
    pub skipped: usize,
    pub feed_errors: usize,
}

/// Upserts the teams of every mapped competition's standings table.
pub fn sync_teams(
    store: &Store,
    feed: &dyn MatchFeed,
    leagues: &LeagueMapping,
    pause_between: Duration,
) -> Result<TeamSyncSummary> {
    let mut summary = TeamSyncSummary::default();
    for (idx, (competition_id, slug)) in leagues.iter().enumerate() {
        if idx > 0 && !pause_between.is_zero() {
            thread::sleep(pause_between);
        }
        let Some(league) = store.league_by_slug(slug)? else {
            warn!(league = slug, "mapped league has no stored row");
            continue;
        };
        let teams = match feed.fetch_standings(competition_id) {
            Ok(teams) => teams,
            Err(err) => {
                summary.feed_errors += 1;
                warn!(competition = competition_id, error = %err, "standings unavailable");
                continue;
            }
        };
        summary.competitions += 1;
        info!(league = slug, teams = teams.len(), "syncing teams from standings");
        for team in &teams {
            upsert_team(store, team, league.id, &mut summary)?;
        }
    }
    Ok(summary)
}

fn upsert_team(
    store: &Store,
    team: &UpstreamTeam,
    league_id: i64,
    summary: &mut TeamSyncSummary,
) -> Result<()> {
    let slug = slugify(&team.name);
    let existing = match team.id {
        Some(api_id) => store.team_by_api_id(api_id)?,
        None => None,
    };
    let existing = match existing {
        Some(found) => Some(found),
        None => store.team_by_slug(&slug)?,
    };
    if let Some(found) = existing {
        store.refresh_team(found.id, league_id, team.id, team.crest.as_deref())?;
        summary.refreshed += 1;
        return Ok(());
    }

    let short_name = team
        .tla
        .clone()
        .filter(|tla| !tla.trim().is_empty())
        .unwrap_or_else(|| team.name.chars().take(3).collect());
    let new_team = NewTeam {
        name: team.name.clone(),
        short_name,
        slug,
        league_id,
        api_id: team.id,
        logo_url: team.crest.clone(),
        city: "Unknown".to_string(),
    };
    match store.insert_team(&new_team)? {
        Some(created) => {
            summary.created += 1;
            info!(team = %created.name, slug = %created.slug, "created team from standings");
        }
        None => {
            summary.skipped += 1;
            warn!(team = %team.name, "team conflicts with an existing row, skipped");
        }
    }
    Ok(())
}
