//! Maps upstream team names onto stored teams.
//!
//! Resolution is an ordered list of strategies; the first one that returns a
//! team wins. When every strategy misses, a new team is created. The resolver
//! never fails for lack of a match: the worst case is a duplicate team.

use anyhow::{Result, bail};
use tracing::{debug, info};

use crate::config::Strictness;
use crate::feed::UpstreamTeam;
use crate::models::{NewTeam, Team};
use crate::names::{
    is_generic_fragment, keyword_tokens, short_name_for, slugify, stripped_variants,
    synonyms_for,
};
use crate::store::Store;

/// Containment searches need at least this many characters, otherwise a
/// fragment like "AS" matches half the table.
const MIN_FRAGMENT_LEN: usize = 3;
const MAX_SLUG_ATTEMPTS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Stored team carrying the upstream team id.
    ApiId,
    /// Case-sensitive name equality.
    Exact,
    /// Name with club-type affixes removed, exact first, then (loose only)
    /// containment.
    Stripped,
    /// Curated alternative spellings.
    Synonym,
    /// Containment search on distinctive words of the name (loose only).
    Keyword,
}

// Synonyms run before any containment search.
const LOOSE_CASCADE: &[Strategy] = &[
    Strategy::ApiId,
    Strategy::Exact,
    Strategy::Synonym,
    Strategy::Stripped,
    Strategy::Keyword,
];

const STRICT_CASCADE: &[Strategy] = &[
    Strategy::ApiId,
    Strategy::Exact,
    Strategy::Synonym,
    Strategy::Stripped,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedBy {
    Strategy(Strategy),
    Created,
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub team: Team,
    pub resolved_by: ResolvedBy,
}

impl Resolution {
    pub fn created(&self) -> bool {
        self.resolved_by == ResolvedBy::Created
    }
}

/// League a newly created team is filed under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeagueContext {
    pub league_id: i64,
    pub slug: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TeamQuery<'a> {
    pub name: &'a str,
    pub short_name: Option<&'a str>,
    pub api_id: Option<u64>,
    pub crest: Option<&'a str>,
}

impl<'a> TeamQuery<'a> {
    pub fn named(name: &'a str) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }
}

impl<'a> From<&'a UpstreamTeam> for TeamQuery<'a> {
    fn from(team: &'a UpstreamTeam) -> Self {
        Self {
            name: &team.name,
            short_name: team.short_name.as_deref(),
            api_id: team.id,
            crest: team.crest.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TeamResolver {
    strictness: Strictness,
}

impl TeamResolver {
    pub fn new(strictness: Strictness) -> Self {
        Self { strictness }
    }

    pub fn strictness(&self) -> Strictness {
        self.strictness
    }

    pub fn cascade(&self) -> &'static [Strategy] {
        match self.strictness {
            Strictness::Loose => LOOSE_CASCADE,
            Strictness::Strict => STRICT_CASCADE,
        }
    }

    pub fn resolve(
        &self,
        store: &Store,
        query: &TeamQuery<'_>,
        ctx: &LeagueContext,
    ) -> Result<Resolution> {
        let name = query.name.trim();
        if name.is_empty() {
            bail!("cannot resolve a team without a name");
        }
        let query = TeamQuery { name, ..*query };

        for &strategy in self.cascade() {
            let Some(team) = self.try_strategy(strategy, store, &query)? else {
                continue;
            };
            debug!(name, team_id = team.id, ?strategy, "team resolved");
            let team = attach_api_id(store, team, strategy, query.api_id)?;
            return Ok(Resolution {
                team,
                resolved_by: ResolvedBy::Strategy(strategy),
            });
        }
        create_team(store, &query, ctx)
    }

    fn try_strategy(
        &self,
        strategy: Strategy,
        store: &Store,
        query: &TeamQuery<'_>,
    ) -> Result<Option<Team>> {
        let name = query.name;
        match strategy {
            Strategy::ApiId => match query.api_id {
                Some(api_id) => store.team_by_api_id(api_id),
                None => Ok(None),
            },
            Strategy::Exact => store.team_by_exact_name(name),
            Strategy::Stripped => {
                let variants = stripped_variants(name);
                for variant in &variants {
                    if let Some(team) = store.team_by_exact_name(variant)? {
                        return Ok(Some(team));
                    }
                }
                if self.strictness == Strictness::Strict {
                    return Ok(None);
                }
                let fragments = std::iter::once(name).chain(variants.iter().map(String::as_str));
                for fragment in fragments {
                    if fragment.chars().count() < MIN_FRAGMENT_LEN || is_generic_fragment(fragment)
                    {
                        continue;
                    }
                    if let Some(team) = store.team_name_containing(fragment)? {
                        return Ok(Some(team));
                    }
                }
                Ok(None)
            }
            Strategy::Synonym => {
                let mut spellings = synonyms_for(name);
                for variant in stripped_variants(name) {
                    spellings.extend(synonyms_for(&variant));
                }
                for spelling in spellings {
                    if let Some(team) = store.team_by_exact_name(spelling)? {
                        return Ok(Some(team));
                    }
                }
                Ok(None)
            }
            Strategy::Keyword => {
                for token in keyword_tokens(name) {
                    if let Some(team) = store.team_name_containing(&token)? {
                        return Ok(Some(team));
                    }
                }
                Ok(None)
            }
        }
    }
}

fn attach_api_id(
    store: &Store,
    team: Team,
    strategy: Strategy,
    api_id: Option<u64>,
) -> Result<Team> {
    let Some(api_id) = api_id else {
        return Ok(team);
    };
    if strategy == Strategy::ApiId || team.api_id.is_some() {
        return Ok(team);
    }
    if !store.attach_team_api_id(team.id, api_id)? {
        return Ok(team);
    }
    info!(team = %team.name, api_id, "attached upstream id to team");
    Ok(Team {
        api_id: Some(api_id),
        ..team
    })
}

fn create_team(store: &Store, query: &TeamQuery<'_>, ctx: &LeagueContext) -> Result<Resolution> {
    let base = match slugify(query.name) {
        slug if slug.is_empty() => "team".to_string(),
        slug => slug,
    };
    for attempt in 0..MAX_SLUG_ATTEMPTS {
        let slug = if attempt == 0 {
            base.clone()
        } else {
            format!("{base}-{attempt}")
        };
        let new_team = NewTeam {
            name: query.name.to_string(),
            short_name: short_name_for(query.name, query.short_name),
            slug,
            league_id: ctx.league_id,
            api_id: query.api_id,
            logo_url: query.crest.map(str::to_string),
            city: "Unknown".to_string(),
        };
        if let Some(team) = store.insert_team(&new_team)? {
            info!(
                team = %team.name,
                slug = %team.slug,
                league = %ctx.slug,
                "created team"
            );
            return Ok(Resolution {
                team,
                resolved_by: ResolvedBy::Created,
            });
        }
        // The conflict may be the api id rather than the slug: someone else
        // created this very team in the meantime.
        if let Some(api_id) = query.api_id
            && let Some(team) = store.team_by_api_id(api_id)?
        {
            return Ok(Resolution {
                team,
                resolved_by: ResolvedBy::Strategy(Strategy::ApiId),
            });
        }
    }
    bail!("no free slug for team {:?} after {MAX_SLUG_ATTEMPTS} attempts", query.name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LeagueMapping;

    fn store_with_league() -> (Store, LeagueContext) {
        let store = Store::open_in_memory().unwrap();
        store.seed_leagues(&LeagueMapping::default()).unwrap();
        let league = store.league_by_slug("la-liga").unwrap().unwrap();
        (
            store,
            LeagueContext {
                league_id: league.id,
                slug: league.slug,
            },
        )
    }

    #[test]
    fn strict_cascade_skips_fuzzy_strategies() {
        let strict = TeamResolver::new(Strictness::Strict);
        assert!(!strict.cascade().contains(&Strategy::Keyword));
        assert_eq!(TeamResolver::default().cascade().last(), Some(&Strategy::Keyword));
    }

    #[test]
    fn created_slugs_are_deduplicated() {
        let (store, ctx) = store_with_league();
        let resolver = TeamResolver::default();
        let first = resolver
            .resolve(&store, &TeamQuery::named("Getafe CF"), &ctx)
            .unwrap();
        assert!(first.created());
        assert_eq!(first.team.slug, "getafe-cf");
        assert_eq!(first.team.city, "Unknown");
        assert_eq!(first.team.league_id, Some(ctx.league_id));

        // Same slug, different stored name.
        let second = create_team(&store, &TeamQuery::named("Getafe  CF"), &ctx).unwrap();
        assert_eq!(second.team.slug, "getafe-cf-1");
    }

    #[test]
    fn stripped_name_matches_exactly_before_containment() {
        let (store, ctx) = store_with_league();
        let resolver = TeamResolver::default();
        resolver
            .resolve(&store, &TeamQuery::named("Real Madrid"), &ctx)
            .unwrap();
        let hit = resolver
            .resolve(&store, &TeamQuery::named("Real Madrid CF"), &ctx)
            .unwrap();
        assert_eq!(hit.resolved_by, ResolvedBy::Strategy(Strategy::Stripped));
        assert_eq!(hit.team.name, "Real Madrid");
    }

    #[test]
    fn name_match_attaches_missing_api_id() {
        let (store, ctx) = store_with_league();
        let resolver = TeamResolver::default();
        resolver
            .resolve(&store, &TeamQuery::named("Sevilla FC"), &ctx)
            .unwrap();
        let query = TeamQuery {
            api_id: Some(559),
            ..TeamQuery::named("Sevilla FC")
        };
        let hit = resolver.resolve(&store, &query, &ctx).unwrap();
        assert_eq!(hit.resolved_by, ResolvedBy::Strategy(Strategy::Exact));
        assert_eq!(hit.team.api_id, Some(559));
        assert_eq!(store.team_by_api_id(559).unwrap().unwrap().id, hit.team.id);
    }

    #[test]
    fn distinctive_word_resolves_by_keyword() {
        let (store, ctx) = store_with_league();
        let resolver = TeamResolver::default();
        let stored = resolver
            .resolve(&store, &TeamQuery::named("Sheffield Wednesday FC"), &ctx)
            .unwrap();
        let hit = resolver
            .resolve(&store, &TeamQuery::named("The Wednesday"), &ctx)
            .unwrap();
        assert_eq!(hit.resolved_by, ResolvedBy::Strategy(Strategy::Keyword));
        assert_eq!(hit.team.id, stored.team.id);
    }

    #[test]
    fn strict_mode_creates_where_loose_finds_a_substring() {
        let (store, ctx) = store_with_league();
        let loose = TeamResolver::default();
        let stored = loose
            .resolve(&store, &TeamQuery::named("Hellas Verona FC"), &ctx)
            .unwrap();

        let hit = loose
            .resolve(&store, &TeamQuery::named("Verona"), &ctx)
            .unwrap();
        assert_eq!(hit.resolved_by, ResolvedBy::Strategy(Strategy::Stripped));
        assert_eq!(hit.team.id, stored.team.id);
        assert_eq!(store.team_count().unwrap(), 1);

        let strict = TeamResolver::new(Strictness::Strict);
        let fresh = strict
            .resolve(&store, &TeamQuery::named("Verona"), &ctx)
            .unwrap();
        assert!(fresh.created());
        assert_ne!(fresh.team.id, stored.team.id);
        assert_eq!(store.team_count().unwrap(), 2);
    }

    #[test]
    fn same_city_clubs_stay_apart() {
        let (store, ctx) = store_with_league();
        let resolver = TeamResolver::default();
        for (existing, incoming) in [
            ("FC Internazionale Milano", "AC Milan"),
            ("Club Atlético de Madrid", "Real Madrid CF"),
            ("Real Madrid CF", "Club Atlético de Madrid"),
        ] {
            let first = resolver
                .resolve(&store, &TeamQuery::named(existing), &ctx)
                .unwrap();
            let second = resolver
                .resolve(&store, &TeamQuery::named(incoming), &ctx)
                .unwrap();
            assert_ne!(first.team.id, second.team.id, "{incoming} merged into {existing}");
        }
        assert_eq!(store.team_count().unwrap(), 4);
    }

    #[test]
    fn curated_spelling_wins_over_containment() {
        let (store, ctx) = store_with_league();
        let resolver = TeamResolver::default();
        let inter = resolver
            .resolve(&store, &TeamQuery::named("FC Internazionale Milano"), &ctx)
            .unwrap();
        let milan = resolver
            .resolve(&store, &TeamQuery::named("Milan"), &ctx)
            .unwrap();
        assert!(milan.created());
        let hit = resolver
            .resolve(&store, &TeamQuery::named("AC Milan"), &ctx)
            .unwrap();
        assert_eq!(hit.resolved_by, ResolvedBy::Strategy(Strategy::Synonym));
        assert_eq!(hit.team.id, milan.team.id);
        assert_ne!(hit.team.id, inter.team.id);
    }

    #[test]
    fn empty_names_are_rejected() {
        let (store, ctx) = store_with_league();
        assert!(
            TeamResolver::default()
                .resolve(&store, &TeamQuery::named("   "), &ctx)
                .is_err()
        );
    }
}
