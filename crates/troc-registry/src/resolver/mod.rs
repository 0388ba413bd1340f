//! Upstream candidate selection
//!
//! A proxy registry offers an upstream for a request when the request's
//! candidate key (`/<command>/<scope>/<name>`) matches at least one of the
//! upstream's include patterns and none of its exclude patterns. Candidates
//! keep the registry's declaration order.

use indexmap::IndexSet;
use troc_core::{NpmCommand, Registry};

/// Candidate key for a request, empty parts dropped:
/// `install` + `@acme` + `widget` gives `/install/@acme/widget`
pub fn candidate_key(command: NpmCommand, scope: Option<&str>, name: Option<&str>) -> String {
    let parts: Vec<&str> = [Some(command.as_str()), scope, name]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect();
    format!("/{}", parts.join("/"))
}

/// Ordered, de-duplicated upstream URLs that may serve the request
pub fn get_proxy_urls(
    registry: &Registry,
    command: NpmCommand,
    scope: Option<&str>,
    name: Option<&str>,
) -> Vec<String> {
    let key = candidate_key(command, scope, name);
    let urls: IndexSet<&str> = registry
        .proxies
        .iter()
        .filter(|proxy| proxy.accepts(&key))
        .map(|proxy| proxy.url.as_str())
        .collect();

    urls.into_iter().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use troc_core::{PathPattern, ProxyConfig};

    fn proxy(url: &str, include: &[&str], exclude: &[&str]) -> ProxyConfig {
        let compile = |patterns: &[&str]| {
            patterns
                .iter()
                .map(|p| PathPattern::new(p).unwrap())
                .collect::<Vec<_>>()
        };
        ProxyConfig::new(url, compile(include), compile(exclude))
    }

    fn registry(proxies: Vec<ProxyConfig>) -> Registry {
        Registry::new("", "/tmp/troc", proxies)
    }

    #[test]
    fn test_candidate_key() {
        assert_eq!(candidate_key(NpmCommand::Install, None, Some("left-pad")), "/install/left-pad");
        assert_eq!(
            candidate_key(NpmCommand::View, Some("@acme"), Some("widget")),
            "/view/@acme/widget"
        );
        assert_eq!(candidate_key(NpmCommand::Whoami, Some(""), None), "/whoami");
    }

    #[test]
    fn test_declaration_order() {
        let registry = registry(vec![
            proxy("https://a.example", &["/install/(.*)"], &[]),
            proxy("https://b.example", &["/(.*)"], &[]),
        ]);

        let urls = get_proxy_urls(&registry, NpmCommand::Install, Some(""), Some("left-pad"));
        assert_eq!(urls, vec!["https://a.example", "https://b.example"]);
    }

    #[test]
    fn test_duplicates_keep_first_position() {
        let registry = registry(vec![
            proxy("https://a.example", &["/view/(.*)"], &[]),
            proxy("https://b.example", &["/(.*)"], &[]),
            proxy("https://a.example/", &["/(.*)"], &[]),
        ]);

        let urls = get_proxy_urls(&registry, NpmCommand::Install, None, Some("left-pad"));
        assert_eq!(urls, vec!["https://b.example", "https://a.example"]);
    }

    #[test]
    fn test_exclude_wins() {
        let registry = registry(vec![
            proxy("https://public.example", &["/(.*)"], &["/(.*)/@internal/(.*)"]),
            proxy("https://internal.example", &["/(.*)/@internal/(.*)"], &[]),
        ]);

        assert_eq!(
            get_proxy_urls(&registry, NpmCommand::Install, Some("@internal"), Some("tools")),
            vec!["https://internal.example"]
        );
        assert_eq!(
            get_proxy_urls(&registry, NpmCommand::Install, Some("@other"), Some("tools")),
            vec!["https://public.example"]
        );
    }

    #[test]
    fn test_empty_include_never_matches() {
        let registry = registry(vec![proxy("https://a.example", &[], &[])]);
        assert!(get_proxy_urls(&registry, NpmCommand::Install, None, Some("left-pad")).is_empty());
    }

    #[test]
    fn test_local_registry_has_no_candidates() {
        let registry = registry(Vec::new());
        assert!(get_proxy_urls(&registry, NpmCommand::Publish, None, Some("left-pad")).is_empty());
    }
}
