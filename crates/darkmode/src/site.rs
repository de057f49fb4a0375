//! Site identity: which host keys count as "the same site".

/// Host keys sharing one persisted record, in lookup order.
///
/// The lowercase host comes first, then each parent domain down to (but not
/// including) the final two labels. Every entry is followed by its `www.`
/// alias (added or stripped). Duplicates keep their first position.
#[must_use]
pub fn domain_candidates(hostname: &str) -> Vec<String> {
    let normalized = hostname.trim().to_ascii_lowercase();
    if normalized.is_empty() {
        return Vec::new();
    }
    let labels: Vec<&str> = normalized.split('.').filter(|label| !label.is_empty()).collect();
    let mut bases = vec![normalized.clone()];
    for start in 1..labels.len().saturating_sub(1) {
        bases.push(labels[start..].join("."));
    }

    let mut out: Vec<String> = Vec::with_capacity(bases.len() * 2);
    for base in bases {
        let alias = base
            .strip_prefix("www.")
            .map_or_else(|| format!("www.{base}"), str::to_owned);
        for candidate in [base, alias] {
            if !out.contains(&candidate) {
                out.push(candidate);
            }
        }
    }
    out
}

/// Whether `hostname` is `site` or a subdomain of it (case-insensitive).
/// Blank entries never match.
#[must_use]
pub fn host_matches_site(hostname: &str, site: &str) -> bool {
    let site = site.trim().to_ascii_lowercase();
    if site.is_empty() {
        return false;
    }
    let host = hostname.to_ascii_lowercase();
    host == site
        || host
            .strip_suffix(site.as_str())
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// Whether `hostname` matches any entry of `sites`.
#[must_use]
pub fn host_in_list<S: AsRef<str>>(hostname: &str, sites: &[S]) -> bool {
    sites
        .iter()
        .any(|site| host_matches_site(hostname, site.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_walk_parent_domains_with_aliases() {
        assert_eq!(
            domain_candidates("News.Example.co.uk"),
            vec![
                "news.example.co.uk",
                "www.news.example.co.uk",
                "example.co.uk",
                "www.example.co.uk",
                "co.uk",
                "www.co.uk",
            ]
        );
    }

    #[test]
    fn www_hosts_alias_to_their_bare_form() {
        assert_eq!(
            domain_candidates("www.example.com"),
            vec!["www.example.com", "example.com"]
        );
        assert_eq!(domain_candidates("example.com"), vec!["example.com", "www.example.com"]);
        assert_eq!(domain_candidates("localhost"), vec!["localhost", "www.localhost"]);
        assert!(domain_candidates("  ").is_empty());
    }

    #[test]
    fn site_lists_match_exact_hosts_and_subdomains() {
        assert!(host_matches_site("live.bilibili.com", "bilibili.com"));
        assert!(host_matches_site("TWITCH.tv", "twitch.tv"));
        assert!(!host_matches_site("notbilibili.com", "bilibili.com"));
        assert!(!host_matches_site("example.com", "  "));
        assert!(host_in_list("www.douyu.com", &["huya.com", "douyu.com"]));
    }
}
