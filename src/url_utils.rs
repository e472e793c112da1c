//! URL helpers shared by the prober and the scan session

use regex::Regex;
use std::sync::OnceLock;
use url::Url;

/// Copy of `url` with the scheme flipped between http and https.
pub fn swap_scheme(url: &Url) -> Option<Url> {
    let target = match url.scheme() {
        "http" => "https",
        "https" => "http",
        _ => return None,
    };

    let mut swapped = url.clone();
    swapped.set_scheme(target).ok()?;
    Some(swapped)
}

/// The URL as a request would see it: no fragment.
pub fn without_fragment(url: &Url) -> String {
    let mut stripped = url.clone();
    stripped.set_fragment(None);
    stripped.into()
}

/// Patterns a transport listener for `url` should match: the URL itself and
/// its http/https twin.
pub fn url_patterns(url: &Url) -> Vec<String> {
    let mut patterns = vec![without_fragment(url)];
    if let Some(swapped) = swap_scheme(url) {
        let swapped = without_fragment(&swapped);
        if !patterns.contains(&swapped) {
            patterns.push(swapped);
        }
    }
    patterns
}

fn duplicate_slashes() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([^:/])/{2,}").expect("valid regex"))
}

fn spa_patterns() -> &'static [Regex] {
    static RE: OnceLock<Vec<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        [r"/#/", r"/[#!]$", r"/[#!]/"]
            .iter()
            .map(|p| Regex::new(p).expect("valid regex"))
            .collect()
    })
}

/// Tidy a bookmark URL so equivalent entries compare equal.
///
/// Drops a trailing empty fragment, collapses repeated slashes after the
/// authority, and appends `/` to paths without an extension, query or
/// fragment. The fragment of a hash route is client-side state and is kept
/// byte for byte. Input that doesn't parse is returned as is.
pub fn cleanup_url(raw: &str) -> String {
    let Ok(parsed) = Url::parse(raw) else {
        return raw.to_string();
    };

    let mut url = raw.to_string();
    let fragment = parsed.fragment().unwrap_or("");

    if fragment.is_empty() {
        if let Some(stripped) = url.strip_suffix('#') {
            url = stripped.to_string();
        }
    }

    url = if is_spa_url(&url) {
        match url.split_once('#') {
            Some((base, route)) => {
                format!("{}#{}", duplicate_slashes().replace_all(base, "$1/"), route)
            }
            None => duplicate_slashes().replace_all(&url, "$1/").into_owned(),
        }
    } else {
        duplicate_slashes().replace_all(&url, "$1/").into_owned()
    };

    let has_query = parsed.query().is_some_and(|q| !q.is_empty());
    if !url.ends_with('/') && !parsed.path().contains('.') && fragment.is_empty() && !has_query {
        url.push('/');
    }

    url
}

/// Whether the URL looks like a client-side (hash) route.
pub fn is_spa_url(raw: &str) -> bool {
    let Ok(parsed) = Url::parse(raw) else {
        return false;
    };

    if spa_patterns().iter().any(|re| re.is_match(raw)) {
        return true;
    }

    parsed.fragment().is_some_and(|f| !f.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swap_scheme() {
        let url = Url::parse("http://example.com/").unwrap();
        assert_eq!(swap_scheme(&url).unwrap().as_str(), "https://example.com/");

        let url = Url::parse("https://example.com:8443/a?b=1").unwrap();
        assert_eq!(swap_scheme(&url).unwrap().as_str(), "http://example.com:8443/a?b=1");

        let url = Url::parse("ftp://example.com/").unwrap();
        assert!(swap_scheme(&url).is_none());
    }

    #[test]
    fn test_url_patterns() {
        let url = Url::parse("https://example.com/app#/settings").unwrap();
        assert_eq!(
            url_patterns(&url),
            vec!["https://example.com/app".to_string(), "http://example.com/app".to_string()]
        );

        let url = Url::parse("ftp://example.com/file").unwrap();
        assert_eq!(url_patterns(&url), vec!["ftp://example.com/file".to_string()]);
    }

    #[test]
    fn test_cleanup_url() {
        assert_eq!(cleanup_url("https://example.com"), "https://example.com/");
        assert_eq!(cleanup_url("https://example.com/docs#"), "https://example.com/docs/");
        assert_eq!(cleanup_url("https://example.com//a///b"), "https://example.com/a/b/");
        assert_eq!(cleanup_url("https://example.com/index.html"), "https://example.com/index.html");
        assert_eq!(cleanup_url("https://example.com/search?q=rust"), "https://example.com/search?q=rust");
        assert_eq!(cleanup_url("https://example.com/#/home"), "https://example.com/#/home");
        assert_eq!(cleanup_url("not a url"), "not a url");
    }

    #[test]
    fn test_cleanup_keeps_hash_route() {
        assert_eq!(
            cleanup_url("https://example.com//app/#/files//shared"),
            "https://example.com/app/#/files//shared"
        );
        assert_eq!(
            cleanup_url("https://example.com/#!/a//b"),
            "https://example.com/#!/a//b"
        );
        assert_eq!(cleanup_url("not a url"), "not a url");
    }

    #[test]
    fn test_is_spa_url() {
        assert!(is_spa_url("https://example.com/#/dashboard"));
        assert!(is_spa_url("https://example.com/#!/inbox"));
        assert!(is_spa_url("https://example.com/app/#"));
        assert!(is_spa_url("https://example.com/page#section"));
        assert!(!is_spa_url("https://example.com/page"));
        assert!(!is_spa_url("::garbage::"));
    }
}
