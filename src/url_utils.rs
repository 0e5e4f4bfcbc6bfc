use url::Url;

/// Domain markers a source URL must carry to be resolved or downloaded.
pub const ACCEPTED_DOMAIN_MARKERS: &[&str] = &["youtube.com", "youtu.be"];

/// Returns `true` if `input` is a well-formed URL whose host or path contains
/// one of [`ACCEPTED_DOMAIN_MARKERS`].
///
/// Behavior:
/// - Fails closed: anything `url::Url` cannot parse is rejected
/// - Query string and fragment are not consulted, so `?next=youtube.com` does not count
/// - Pure: no network access
///
/// Empty input should be caught by the caller first and reported as a missing
/// parameter rather than an invalid URL.
pub fn is_acceptable_source(input: &str) -> bool {
    let url = match Url::parse(input.trim()) {
        Ok(u) => u,
        Err(_) => return false,
    };

    let host = url.host_str().unwrap_or("").to_ascii_lowercase();
    let path = url.path().to_ascii_lowercase();

    ACCEPTED_DOMAIN_MARKERS
        .iter()
        .any(|marker| host.contains(marker) || path.contains(marker))
}

/// Normalize a presumed http(s) URL.
///
/// Normalization rules:
/// - Only accepts absolute http/https URLs with a host
/// - Scheme and host are lowercased, default ports dropped (done by `url::Url`)
/// - Removes URL fragments (`#...`) since they are never sent upstream
pub fn normalize_http_url(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut url = Url::parse(trimmed).ok()?;

    match url.scheme() {
        "http" | "https" => {}
        _ => return None,
    }
    url.host_str()?;

    url.set_fragment(None);

    Some(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_watch_urls() {
        assert!(is_acceptable_source(
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
        ));
        assert!(is_acceptable_source("https://youtube.com/shorts/abc123"));
        assert!(is_acceptable_source("https://m.youtube.com/watch?v=abc&t=42s"));
    }

    #[test]
    fn accepts_short_link_hosts() {
        assert!(is_acceptable_source("https://youtu.be/dQw4w9WgXcQ"));
        assert!(is_acceptable_source("https://youtu.be/dQw4w9WgXcQ?si=xyz"));
    }

    #[test]
    fn host_match_is_case_insensitive() {
        assert!(is_acceptable_source("https://WWW.YOUTUBE.COM/watch?v=1"));
    }

    #[test]
    fn rejects_unparseable_input() {
        assert!(!is_acceptable_source("youtube.com/watch?v=1"));
        assert!(!is_acceptable_source("not a url"));
        assert!(!is_acceptable_source(""));
    }

    #[test]
    fn rejects_other_domains() {
        assert!(!is_acceptable_source("https://vimeo.com/12345"));
        assert!(!is_acceptable_source("https://example.com/watch?v=1"));
    }

    #[test]
    fn query_string_does_not_smuggle_a_marker() {
        assert!(!is_acceptable_source(
            "https://example.com/redirect?to=https://youtube.com"
        ));
        assert!(!is_acceptable_source("https://example.com/#youtu.be"));
    }

    #[test]
    fn normalize_strips_fragment() {
        assert_eq!(
            normalize_http_url("https://example.com/img.png#frag").as_deref(),
            Some("https://example.com/img.png")
        );
    }

    #[test]
    fn normalize_removes_default_ports() {
        assert_eq!(
            normalize_http_url("http://EXAMPLE.com:80/x").as_deref(),
            Some("http://example.com/x")
        );
        assert_eq!(
            normalize_http_url("https://example.com:443/y").as_deref(),
            Some("https://example.com/y")
        );
    }

    #[test]
    fn normalize_ignores_non_http_schemes() {
        assert_eq!(normalize_http_url("ftp://example.com/x"), None);
        assert_eq!(normalize_http_url("file:///etc/passwd"), None);
        assert_eq!(normalize_http_url("   "), None);
    }
}
