//! URL canonicalization for monitored addresses.

use url::Url;

use crate::CoreError;

/// Canonical form of a monitored URL.
///
/// Forces `https`, lowercases the host, strips a leading `www.`, drops
/// default ports and fragments, and removes a trailing slash from non-root
/// paths. Inputs without a scheme are treated as `https`.
///
/// # Errors
///
/// Returns [`CoreError::InvalidUrl`] for unparsable input, non-http(s)
/// schemes, or URLs without a host.
pub fn canonicalize_url(raw: &str) -> Result<String, CoreError> {
    let invalid = |reason: &str| CoreError::InvalidUrl {
        url: raw.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(invalid("empty url"));
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let mut parsed = Url::parse(&candidate).map_err(|e| invalid(&e.to_string()))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid(&format!("unsupported scheme \"{}\"", parsed.scheme())));
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| invalid("missing host"))?
        .to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
    if host.is_empty() {
        return Err(invalid("missing host"));
    }

    let default_port = matches!(parsed.port_or_known_default(), Some(80 | 443));

    parsed
        .set_scheme("https")
        .map_err(|()| invalid("cannot switch scheme to https"))?;
    parsed
        .set_host(Some(&host))
        .map_err(|e| invalid(&e.to_string()))?;
    if default_port {
        parsed
            .set_port(None)
            .map_err(|()| invalid("cannot clear port"))?;
    }
    parsed.set_fragment(None);

    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(if path.is_empty() { "/" } else { &path });

    Ok(parsed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_scheme_www_and_trailing_slash() {
        assert_eq!(
            canonicalize_url("http://www.Example.com/Shop/").unwrap(),
            "https://example.com/Shop"
        );
    }

    #[test]
    fn bare_domain_gets_https_and_root_path() {
        assert_eq!(canonicalize_url("example.com").unwrap(), "https://example.com/");
    }

    #[test]
    fn drops_fragment_but_keeps_query() {
        assert_eq!(
            canonicalize_url("https://example.com/p?id=4#reviews").unwrap(),
            "https://example.com/p?id=4"
        );
    }

    #[test]
    fn drops_default_ports_and_keeps_custom_ones() {
        assert_eq!(
            canonicalize_url("http://example.com:80/a").unwrap(),
            "https://example.com/a"
        );
        assert_eq!(
            canonicalize_url("https://example.com:8443/a").unwrap(),
            "https://example.com:8443/a"
        );
    }

    #[test]
    fn equivalent_inputs_share_a_canonical_form() {
        let a = canonicalize_url("https://www.example.com").unwrap();
        let b = canonicalize_url("http://example.com/").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_non_http_schemes_and_garbage() {
        assert!(canonicalize_url("ftp://example.com").is_err());
        assert!(canonicalize_url("").is_err());
        assert!(canonicalize_url("https://").is_err());
    }
}
