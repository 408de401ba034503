/// Join a base URL and path segments with exactly one `/` between them.
pub fn build_url(base: &str, segments: &[&str]) -> String {
    let mut url = base.trim_end_matches('/').to_string();
    for seg in segments {
        url.push('/');
        url.push_str(seg.trim_start_matches('/'));
    }
    url
}

/// Percent-encode a path segment (used for unicode emoji in reaction routes).
pub fn encode_segment(raw: &str) -> String {
    url::form_urlencoded::byte_serialize(raw.as_bytes()).collect()
}
