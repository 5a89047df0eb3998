use std::fmt::Write as _;

use crate::store::DuplicateGroup;

/// Plain-text listing of teams that look like the same club.
pub fn render_duplicates(groups: &[DuplicateGroup]) -> String {
    if groups.is_empty() {
        return "no duplicate teams found\n".to_string();
    }
    let mut out = String::new();
    let _ = writeln!(out, "{} possible duplicate group(s)", groups.len());
    for group in groups {
        let _ = writeln!(out, "\n{} ({} teams)", group.key, group.teams.len());
        for (team, league) in &group.teams {
            let api_id = team
                .api_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string());
            let _ = writeln!(
                out,
                "  #{:<5} {:<32} slug={:<28} league={:<16} api_id={}",
                team.id,
                team.name,
                team.slug,
                league.as_deref().unwrap_or("-"),
                api_id
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Team;

    fn team(id: i64, name: &str, slug: &str) -> Team {
        Team {
            id,
            name: name.to_string(),
            short_name: name.chars().take(10).collect(),
            slug: slug.to_string(),
            league_id: Some(1),
            api_id: None,
            logo_url: None,
            city: "Unknown".to_string(),
        }
    }

    #[test]
    fn empty_report_says_so() {
        assert_eq!(render_duplicates(&[]), "no duplicate teams found\n");
    }

    #[test]
    fn groups_list_every_member() {
        let groups = vec![DuplicateGroup {
            key: "arsenal".to_string(),
            teams: vec![
                (team(1, "Arsenal FC", "arsenal-fc"), Some("premier-league".to_string())),
                (team(7, "Arsenal", "arsenal"), None),
            ],
        }];
        let text = render_duplicates(&groups);
        assert!(text.starts_with("1 possible duplicate group(s)"));
        assert!(text.contains("arsenal (2 teams)"));
        assert!(text.contains("slug=arsenal-fc"));
        assert!(text.contains("league=-"));
    }
}
