//! Search query building and suggestion sanitizing.

use regex::Regex;

use super::models::AutomationConfig;
use super::settings::AutomationSettings;
use crate::kernel::SearchRequest;

/// Collapse runs of whitespace and trim.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Comparison key for queries and prompts: whitespace-normalized, lowercased.
pub fn comparison_key(s: &str) -> String {
    normalize_whitespace(s).to_lowercase()
}

fn configured_location(cfg: &AutomationConfig) -> Option<&str> {
    cfg.location
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty())
}

/// Build the provider request for `query`.
///
/// ATS mode ORs the configured job boards together and puts the quoted
/// location into `q`, since board listings are not geo-indexed. Generic mode
/// passes the location to the provider and excludes aggregator sites.
/// Configured exclusion terms become `-"term"` in both modes.
pub fn build_search_request(
    cfg: &AutomationConfig,
    query: &str,
    settings: &AutomationSettings,
) -> SearchRequest {
    let mut parts = vec![normalize_whitespace(query)];
    let location = configured_location(cfg);

    let provider_location = if cfg.ats_mode {
        if let Some(location) = location {
            parts.push(format!("\"{}\"", location));
        }
        if !settings.ats_sites.is_empty() {
            let sites = settings
                .ats_sites
                .iter()
                .map(|s| format!("site:{}", s))
                .collect::<Vec<_>>()
                .join(" OR ");
            parts.push(format!("({})", sites));
        }
        None
    } else {
        parts.extend(settings.excluded_sites.iter().map(|s| format!("-site:{}", s)));
        location.map(str::to_string)
    };

    parts.extend(
        cfg.excluded_terms
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(|t| format!("-\"{}\"", t.trim_matches('"'))),
    );

    let gl = cfg
        .country
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(&settings.default_country)
        .to_lowercase();

    SearchRequest {
        q: parts
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(" "),
        gl,
        tbs: cfg.time_filter.map(|f| f.as_tbs().to_string()),
        location: provider_location,
    }
}

/// Strip the configured location from a suggested query, quoted anywhere or
/// trailing (optionally after "in"), case-insensitively. Location is added
/// back when the query is built.
pub fn sanitize_suggested_query(query: &str, cfg: &AutomationConfig) -> String {
    let Some(location) = configured_location(cfg) else {
        return normalize_whitespace(query);
    };
    let escaped = regex::escape(location);

    let mut cleaned = query.to_string();
    if let Ok(quoted) = Regex::new(&format!(r#"(?i)"\s*{}\s*""#, escaped)) {
        cleaned = quoted.replace_all(&cleaned, " ").into_owned();
    }
    if let Ok(trailing) = Regex::new(&format!(r"(?i)(^|\s+)(in\s+)?{}[\s,.]*$", escaped)) {
        cleaned = trailing.replace(&cleaned, "").into_owned();
    }

    normalize_whitespace(cleaned.replace("\"\"", " ").trim_end_matches(','))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::automation::models::TimeFilter;

    fn config() -> AutomationConfig {
        AutomationConfig::builder()
            .id(1)
            .tenant_id(1)
            .user_id(1)
            .search_query("rust engineer")
            .build()
    }

    fn settings() -> AutomationSettings {
        AutomationSettings {
            ats_sites: vec!["jobs.lever.co".into(), "boards.greenhouse.io".into()],
            excluded_sites: vec!["linkedin.com".into()],
            ..Default::default()
        }
    }

    #[test]
    fn test_sanitize_strips_quoted_location() {
        let mut cfg = config();
        cfg.location = Some("Austin".into());
        assert_eq!(
            sanitize_suggested_query("staff engineer \"Austin\"", &cfg),
            "staff engineer"
        );
        assert_eq!(
            sanitize_suggested_query("\"austin\" platform engineer", &cfg),
            "platform engineer"
        );
    }

    #[test]
    fn test_sanitize_strips_trailing_location() {
        let mut cfg = config();
        cfg.location = Some("New York".into());
        assert_eq!(
            sanitize_suggested_query("rust developer in new york", &cfg),
            "rust developer"
        );
        assert_eq!(
            sanitize_suggested_query("rust developer New York", &cfg),
            "rust developer"
        );
        // Location in the middle is left alone unless quoted.
        assert_eq!(
            sanitize_suggested_query("new york times engineer", &cfg),
            "new york times engineer"
        );
    }

    #[test]
    fn test_sanitize_without_location_only_normalizes() {
        let cfg = config();
        assert_eq!(
            sanitize_suggested_query("  rust   engineer ", &cfg),
            "rust engineer"
        );
    }

    #[test]
    fn test_build_ats_request() {
        let mut cfg = config();
        cfg.ats_mode = true;
        cfg.location = Some("Austin".into());
        cfg.excluded_terms = vec!["clearance".into(), "  ".into()];
        cfg.time_filter = Some(TimeFilter::Week);

        let req = build_search_request(&cfg, "staff  engineer", &settings());
        assert_eq!(
            req.q,
            "staff engineer \"Austin\" (site:jobs.lever.co OR site:boards.greenhouse.io) -\"clearance\""
        );
        assert_eq!(req.gl, "us");
        assert_eq!(req.tbs.as_deref(), Some("qdr:w"));
        assert_eq!(req.location, None);
    }

    #[test]
    fn test_build_generic_request() {
        let mut cfg = config();
        cfg.location = Some("Austin, TX".into());
        cfg.country = Some("CA".into());

        let req = build_search_request(&cfg, "rust engineer", &settings());
        assert_eq!(req.q, "rust engineer -site:linkedin.com");
        assert_eq!(req.gl, "ca");
        assert_eq!(req.tbs, None);
        assert_eq!(req.location.as_deref(), Some("Austin, TX"));
    }

    #[test]
    fn test_comparison_key() {
        assert_eq!(comparison_key(" Rust\n Engineer "), "rust engineer");
    }
}
