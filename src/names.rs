//! Club-name helpers shared by the team resolver and the live sweeper.

/// Tokens dropped from the end of a club name ("Arsenal FC", "Genoa CFC").
const SUFFIX_TOKENS: &[&str] = &[
    "FC", "CF", "AFC", "CFC", "SC", "SV", "AC", "SK", "Club", "Calcio", "1909", "1899", "1900",
    "1846", "1848", "04", "05",
];

/// Tokens dropped from the front ("FC Barcelona", "Real Betis", "Deportivo Alavés").
const PREFIX_TOKENS: &[&str] = &[
    "FC", "CF", "AC", "AS", "ACF", "SSC", "SS", "US", "UC", "RC", "RCD", "CD", "CA", "UD", "SD",
    "SL", "SC", "VfB", "VfL", "TSG", "Club", "Real", "Deportivo",
];

/// Name variants the feed uses for the same club across endpoints. Every
/// entry of a group refers to one club.
const SYNONYM_GROUPS: &[&[&str]] = &[
    &["Athletic Club", "Athletic Bilbao", "Athletic Club de Bilbao"],
    &["Club Atlético de Madrid", "Atlético Madrid", "Atletico Madrid", "Atlético de Madrid"],
    &["FC Internazionale Milano", "Inter", "Inter Milan", "Internazionale"],
    &["Wolverhampton Wanderers FC", "Wolverhampton", "Wolves"],
    &["Brighton & Hove Albion FC", "Brighton Hove", "Brighton"],
    &["Tottenham Hotspur FC", "Tottenham", "Spurs"],
    &["Manchester United FC", "Man United", "Manchester United"],
    &["Manchester City FC", "Man City", "Manchester City"],
    &["Nottingham Forest FC", "Nottingham", "Nott'm Forest"],
    &["RCD Espanyol de Barcelona", "Espanyol"],
    &["Real Betis Balompié", "Real Betis", "Betis"],
    &["RC Celta de Vigo", "Celta Vigo", "Celta"],
    &["Deportivo Alavés", "Alavés", "Alaves"],
    &["AC Milan", "Milan"],
    &["SSC Napoli", "Napoli"],
    &["AS Roma", "Roma"],
];

/// Words long enough for the keyword heuristic but shared by too many
/// unrelated clubs to identify one.
const GENERIC_WORDS: &[&str] = &[
    "athletic", "atletico", "atlético", "sporting", "olympique", "united", "wanderers", "rovers",
    "albion", "racing", "deportivo", "calcio", "football", "club", "union", "borussia",
    "dynamo", "inter", "manchester", "madrid", "milan", "milano", "sheffield", "bristol",
];

pub const MIN_KEYWORD_LEN: usize = 5;

/// Laravel-style slug: ASCII-folded, lowercase, runs of anything else become one `-`.
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_dash = false;
    for ch in name.chars() {
        let folded = fold_char(ch);
        for c in folded.chars() {
            if c.is_ascii_alphanumeric() {
                if pending_dash && !out.is_empty() {
                    out.push('-');
                }
                pending_dash = false;
                out.push(c.to_ascii_lowercase());
            } else {
                pending_dash = true;
            }
        }
    }
    out
}

fn fold_char(ch: char) -> String {
    let s = match ch {
        'á' | 'à' | 'â' | 'ä' | 'ã' | 'å' | 'ā' => "a",
        'Á' | 'À' | 'Â' | 'Ä' | 'Ã' | 'Å' | 'Ā' => "A",
        'é' | 'è' | 'ê' | 'ë' | 'ē' | 'ę' => "e",
        'É' | 'È' | 'Ê' | 'Ë' | 'Ē' | 'Ę' => "E",
        'í' | 'ì' | 'î' | 'ï' => "i",
        'Í' | 'Ì' | 'Î' | 'Ï' => "I",
        'ó' | 'ò' | 'ô' | 'ö' | 'õ' | 'ø' | 'ō' => "o",
        'Ó' | 'Ò' | 'Ô' | 'Ö' | 'Õ' | 'Ø' | 'Ō' => "O",
        'ú' | 'ù' | 'û' | 'ü' | 'ū' => "u",
        'Ú' | 'Ù' | 'Û' | 'Ü' | 'Ū' => "U",
        'ñ' | 'ń' => "n",
        'Ñ' | 'Ń' => "N",
        'ç' | 'ć' | 'č' => "c",
        'Ç' | 'Ć' | 'Č' => "C",
        'ß' => "ss",
        'ł' => "l",
        'Ł' => "L",
        'š' | 'ś' => "s",
        'Š' | 'Ś' => "S",
        'ž' | 'ź' | 'ż' => "z",
        'Ž' | 'Ź' | 'Ż' => "Z",
        '&' => " and ",
        _ => return ch.to_string(),
    };
    s.to_string()
}

/// Short name for a newly created team: the provided one, else the name,
/// truncated to 10 characters.
pub fn short_name_for(name: &str, provided: Option<&str>) -> String {
    let base = provided
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| name.trim());
    base.chars().take(10).collect::<String>().trim_end().to_string()
}

/// Drops club-type suffix tokens only ("Real Madrid CF" -> "Real Madrid").
pub fn strip_suffixes(name: &str) -> String {
    let mut tokens: Vec<&str> = name.split_whitespace().collect();
    while tokens.len() > 1 && tokens.last().is_some_and(|t| is_token_in(t, SUFFIX_TOKENS)) {
        tokens.pop();
    }
    tokens.join(" ")
}

/// Drops club-type tokens from both ends ("Real Madrid CF" -> "Madrid").
pub fn strip_affixes(name: &str) -> String {
    let stripped = strip_suffixes(name);
    let mut tokens: Vec<&str> = stripped.split_whitespace().collect();
    while tokens.len() > 1 && is_token_in(tokens[0], PREFIX_TOKENS) {
        tokens.remove(0);
    }
    let joined = tokens.join(" ");
    strip_suffixes(&joined)
}

/// Progressively stripped variants of `name`, least aggressive first,
/// excluding `name` itself and duplicates.
pub fn stripped_variants(name: &str) -> Vec<String> {
    let original = name.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut out: Vec<String> = Vec::new();
    for candidate in [strip_suffixes(&original), strip_affixes(&original)] {
        if candidate.is_empty() || candidate == original || out.contains(&candidate) {
            continue;
        }
        out.push(candidate);
    }
    out
}

fn is_token_in(token: &str, list: &[&str]) -> bool {
    let trimmed = token.trim_matches(|c: char| c == '.' || c == ',');
    list.iter().any(|t| t.eq_ignore_ascii_case(trimmed))
}

/// Other spellings of the same club from the curated table.
pub fn synonyms_for(name: &str) -> Vec<&'static str> {
    let needle = name.trim();
    for group in SYNONYM_GROUPS {
        if group.iter().any(|entry| entry.eq_ignore_ascii_case(needle)) {
            return group
                .iter()
                .copied()
                .filter(|entry| !entry.eq_ignore_ascii_case(needle))
                .collect();
        }
    }
    Vec::new()
}

/// Distinctive words usable for a containment search, in name order.
pub fn keyword_tokens(name: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for raw in name.split(|c: char| c.is_whitespace() || c == '-' || c == '/') {
        let token = raw.trim_matches(|c: char| !c.is_alphanumeric());
        if token.chars().count() < MIN_KEYWORD_LEN {
            continue;
        }
        let lower = token.to_lowercase();
        if GENERIC_WORDS.contains(&lower.as_str()) {
            continue;
        }
        if !out.iter().any(|t| t.eq_ignore_ascii_case(token)) {
            out.push(token.to_string());
        }
    }
    out
}

/// True when every word of `fragment` is a club-type affix or a word shared by
/// unrelated clubs ("Madrid", "AC Milan"), so a containment search on it
/// would pick an arbitrary club.
pub fn is_generic_fragment(fragment: &str) -> bool {
    fragment
        .split(|c: char| c.is_whitespace() || c == '-' || c == '/')
        .map(|raw| raw.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|token| !token.is_empty())
        .all(|token| {
            GENERIC_WORDS.contains(&token.to_lowercase().as_str())
                || is_token_in(token, PREFIX_TOKENS)
                || is_token_in(token, SUFFIX_TOKENS)
        })
}

/// Case-insensitive containment in either direction. Empty names never
/// overlap, otherwise every name would contain them.
pub fn names_overlap(a: &str, b: &str) -> bool {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a.contains(&b) || b.contains(&a)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_folds_accents_and_punctuation() {
        assert_eq!(slugify("Club Atlético de Madrid"), "club-atletico-de-madrid");
        assert_eq!(slugify("Brighton & Hove Albion FC"), "brighton-and-hove-albion-fc");
        assert_eq!(slugify("  1. FC Köln "), "1-fc-koln");
        assert_eq!(slugify("Nott'm Forest"), "nott-m-forest");
    }

    #[test]
    fn strip_keeps_the_distinctive_part() {
        assert_eq!(strip_suffixes("Arsenal FC"), "Arsenal");
        assert_eq!(strip_suffixes("Real Madrid CF"), "Real Madrid");
        assert_eq!(strip_affixes("Real Madrid CF"), "Madrid");
        assert_eq!(strip_affixes("FC Barcelona"), "Barcelona");
        assert_eq!(strip_affixes("Athletic Club"), "Athletic");
        // A lone token is never stripped away entirely.
        assert_eq!(strip_affixes("Club"), "Club");
    }

    #[test]
    fn stripped_variants_are_ordered_and_distinct() {
        assert_eq!(
            stripped_variants("Real Madrid CF"),
            vec!["Real Madrid".to_string(), "Madrid".to_string()]
        );
        assert_eq!(stripped_variants("Arsenal FC"), vec!["Arsenal".to_string()]);
        assert!(stripped_variants("Chelsea").is_empty());
    }

    #[test]
    fn city_names_are_generic_fragments() {
        assert!(is_generic_fragment("Madrid"));
        assert!(is_generic_fragment("AC Milan"));
        assert!(is_generic_fragment("Madrid CF"));
        assert!(!is_generic_fragment("Real Sociedad"));
        assert!(!is_generic_fragment("Verona"));
    }

    #[test]
    fn synonyms_cover_both_directions() {
        assert!(synonyms_for("Athletic Club").contains(&"Athletic Bilbao"));
        assert!(synonyms_for("athletic bilbao").contains(&"Athletic Club"));
        assert!(synonyms_for("Arsenal").is_empty());
    }

    #[test]
    fn keyword_tokens_skip_short_and_generic_words() {
        assert_eq!(keyword_tokens("Wolverhampton Wanderers FC"), vec!["Wolverhampton"]);
        assert_eq!(keyword_tokens("Sporting Clube de Portugal"), vec!["Clube", "Portugal"]);
        assert!(keyword_tokens("AS Roma").is_empty());
    }

    #[test]
    fn overlap_is_bidirectional_and_rejects_empty() {
        assert!(names_overlap("Arsenal FC", "arsenal"));
        assert!(names_overlap("Chelsea", "Chelsea FC"));
        assert!(!names_overlap("Arsenal", "Chelsea"));
        assert!(!names_overlap("", "Chelsea"));
    }

    #[test]
    fn short_name_truncates_to_ten_chars() {
        assert_eq!(short_name_for("Wolverhampton Wanderers FC", None), "Wolverhamp");
        assert_eq!(short_name_for("Arsenal FC", Some("Arsenal")), "Arsenal");
        assert_eq!(short_name_for("Borussia Dortmund", Some("  ")), "Borussia D");
    }
}
