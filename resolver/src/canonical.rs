//! URL canonicalization.
//!
//! The canonical form is the sole identity for coalescing and caching: two
//! requests with the same canonical key are treated as the same unit of
//! work. Canonicalization is pure and never fails; input that does not
//! parse as a URL is returned as-is (the HTTP layer rejects invalid URLs
//! before the pipeline sees them).

use url::Url;

/// Query parameters that only identify the referral channel, never the
/// document. Dropping them merges otherwise-identical resolutions.
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "igshid", "mc_cid", "mc_eid"];

pub fn canonicalize(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(mut url) = Url::parse(trimmed) else {
        return trimmed.to_string();
    };

    // The url crate already lowercases scheme and host and strips default
    // ports during parsing.
    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    if kept.is_empty() {
        url.set_query(None);
    } else {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (key, value) in &kept {
            pairs.append_pair(key, value);
        }
        drop(pairs);
    }

    url.to_string()
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_scheme_and_host() {
        assert_eq!(
            canonicalize("HTTP://EXAMPLE.COM/Path"),
            "http://example.com/Path"
        );
    }

    #[test]
    fn strips_fragment_and_default_port() {
        assert_eq!(
            canonicalize("https://example.com:443/a#section"),
            "https://example.com/a"
        );
        assert_eq!(
            canonicalize("http://example.com:80/"),
            "http://example.com/"
        );
    }

    #[test]
    fn keeps_non_default_port() {
        assert_eq!(
            canonicalize("http://example.com:8080/"),
            "http://example.com:8080/"
        );
    }

    #[test]
    fn strips_tracking_params_keeps_the_rest() {
        assert_eq!(
            canonicalize("https://example.com/x?utm_source=tw&id=1&fbclid=abc"),
            "https://example.com/x?id=1"
        );
        assert_eq!(
            canonicalize("https://example.com/x?utm_tag=tracking-code"),
            "https://example.com/x"
        );
    }

    #[test]
    fn trims_whitespace() {
        assert_eq!(
            canonicalize("  https://example.com/  "),
            "https://example.com/"
        );
    }

    #[test]
    fn unparsable_input_is_returned_verbatim() {
        assert_eq!(canonicalize("not a url"), "not a url");
        assert_eq!(canonicalize("/relative/path"), "/relative/path");
    }

    #[test]
    fn deterministic() {
        let a = canonicalize("https://Example.com/x?utm_source=a&q=1#frag");
        let b = canonicalize(&a);
        assert_eq!(a, b);
    }
}
