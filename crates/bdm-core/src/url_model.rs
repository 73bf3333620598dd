//! URL sniffing for backend resolution and output file naming.

/// Hosts handled by the extractor backend unless configured otherwise.
pub const DEFAULT_EXTRACTOR_HOSTS: &[&str] = &["youtube.com", "youtu.be"];

/// Fallback output name when the URL path has nothing usable.
const DEFAULT_FILENAME: &str = "download";

/// Linux NAME_MAX.
const NAME_MAX: usize = 255;

/// True if `raw` is an absolute http(s) URL with a host.
pub fn is_http_url(raw: &str) -> bool {
    match url::Url::parse(raw) {
        Ok(u) => matches!(u.scheme(), "http" | "https") && u.host_str().is_some(),
        Err(_) => false,
    }
}

/// True if the URL points at one of `hosts` (optionally behind `www.`) and has
/// a non-empty path, e.g. `https://www.youtube.com/watch?v=...`.
pub fn is_extractor_url<S: AsRef<str>>(raw: &str, hosts: &[S]) -> bool {
    let Ok(parsed) = url::Url::parse(raw) else {
        return false;
    };
    if !matches!(parsed.scheme(), "http" | "https") {
        return false;
    }
    let Some(host) = parsed.host_str() else {
        return false;
    };
    let host = host.strip_prefix("www.").unwrap_or(host);
    let known = hosts
        .iter()
        .any(|h| h.as_ref().eq_ignore_ascii_case(host));
    known && parsed.path().trim_matches('/').len() + parsed.query().map_or(0, str::len) > 0
}

/// Local file name for a direct download: last path segment of the URL
/// (query and fragment dropped), sanitized.
pub fn output_filename(raw: &str) -> String {
    let segment = url::Url::parse(raw).ok().and_then(|u| {
        u.path_segments()
            .and_then(|segs| segs.filter(|s| !s.is_empty()).last().map(str::to_string))
    });
    let decoded = segment.map(|s| percent_decode(&s)).unwrap_or_default();
    let name = sanitize_filename(&decoded);
    if name.is_empty() {
        DEFAULT_FILENAME.to_string()
    } else {
        name
    }
}

/// Replaces path separators, NUL and control characters with `_`, trims
/// leading dots and surrounding whitespace, and caps the byte length.
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = replaced.trim().trim_start_matches('.').trim();
    if trimmed == ".." || trimmed == "." {
        return String::new();
    }
    let mut end = trimmed.len().min(NAME_MAX);
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    trimmed[..end].to_string()
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let decoded = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(b) = decoded {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
