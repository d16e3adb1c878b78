//! Site pattern matching.
//!
//! Resolves a URL against the configured site patterns and returns the most
//! specific match:
//! - `domain` matches the hostname exactly or as a subdomain suffix
//! - `domain/path` additionally requires the URL path to start with `/path`
//!   and outranks any domain-only match
//!
//! Pure functions over the supplied inputs; no storage access.

use url::Url;

use crate::types::SiteConfigs;

// ============================================================================
// Specificity
// ============================================================================

/// Path-qualified patterns outrank domain-only patterns.
const SPECIFICITY_PATH: u8 = 2;
const SPECIFICITY_DOMAIN: u8 = 1;

// ============================================================================
// Matching
// ============================================================================

/// Finds the most specific configured pattern matching `hostname`/`pathname`.
///
/// Ties at equal specificity resolve by longest pattern string, then by
/// lexicographic order, so results are deterministic regardless of how the
/// configuration map iterates.
pub fn find_matching_site<'a>(
    hostname: &str,
    pathname: &str,
    site_configs: &'a SiteConfigs,
) -> Option<&'a str> {
    let mut best: Option<(&str, u8)> = None;

    for site in site_configs.keys() {
        let (domain, path) = split_pattern(site);

        let hostname_matches =
            hostname == domain || hostname.ends_with(&format!(".{domain}"));
        if !hostname_matches {
            continue;
        }

        let specificity = match path {
            Some(path) => {
                if !pathname.starts_with(&format!("/{path}")) {
                    continue;
                }
                SPECIFICITY_PATH
            }
            None => SPECIFICITY_DOMAIN,
        };

        let wins = match best {
            None => true,
            Some((current, current_specificity)) => {
                specificity > current_specificity
                    || (specificity == current_specificity
                        && (site.len() > current.len()
                            || (site.len() == current.len() && site.as_str() < current)))
            }
        };
        if wins {
            best = Some((site.as_str(), specificity));
        }
    }

    best.map(|(site, _)| site)
}

/// Resolves a full URL string against the configuration.
///
/// A URL that fails to parse matches nothing; navigation proceeds
/// unmonitored.
pub fn match_url<'a>(url: &str, site_configs: &'a SiteConfigs) -> Option<&'a str> {
    let parsed = Url::parse(url).ok()?;
    let hostname = parsed.host_str()?;
    find_matching_site(hostname, parsed.path(), site_configs)
}

/// Splits a pattern into `(domain, optional path)` on the first `/`.
fn split_pattern(site: &str) -> (&str, Option<&str>) {
    match site.split_once('/') {
        Some((domain, path)) if !path.is_empty() => (domain, Some(path)),
        Some((domain, _)) => (domain, None),
        None => (site, None),
    }
}

// ============================================================================
// Tests
// ============================================================================
