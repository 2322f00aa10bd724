//! Artifact address signature checks.
//!
//! An address counts as an artifact only when it is absolute and carries a
//! PDF signature: a `.pdf` path or query value, or a `blob:` URL (object URLs
//! are only recorded for PDF-typed blobs).

use url::Url;

/// MIME types treated as artifact content.
const ARTIFACT_MIME_TYPES: &[&str] = &["application/pdf", "application/x-pdf"];

/// True when a response content type denotes an artifact.
pub fn is_artifact_mime(mime_type: &str) -> bool {
    let mime = mime_type.to_ascii_lowercase();
    ARTIFACT_MIME_TYPES.iter().any(|m| mime.starts_with(m))
}

/// True when an absolute URL carries the artifact signature.
pub fn is_artifact_address(url: &Url) -> bool {
    match url.scheme() {
        "blob" => return true,
        "http" | "https" | "file" => {}
        _ => return false,
    }

    if url.path().to_ascii_lowercase().ends_with(".pdf") {
        return true;
    }

    url.query_pairs().any(|(key, value)| {
        let value = value.to_ascii_lowercase();
        value.ends_with(".pdf")
            || value.contains(".pdf?")
            || (key.eq_ignore_ascii_case("format") && value == "pdf")
    })
}

/// Resolve a possibly relative reference against `base` and keep it only if
/// it is artifact-typed.
pub fn resolve_artifact_address(base: &Url, raw: &str) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with('#') || raw.starts_with("javascript:") {
        return None;
    }
    let url = if raw.starts_with("blob:") {
        Url::parse(raw).ok()?
    } else {
        base.join(raw).ok()?
    };
    is_artifact_address(&url).then_some(url)
}

/// Resolve an address observed on the wire, accepting it when either the
/// address or the reported content type carries the signature.
pub fn resolve_observed_address(base: &Url, raw: &str, mime_type: Option<&str>) -> Option<Url> {
    if let Some(url) = resolve_artifact_address(base, raw) {
        return Some(url);
    }
    if mime_type.is_some_and(is_artifact_mime) {
        let url = base.join(raw.trim()).ok()?;
        if matches!(url.scheme(), "http" | "https") {
            return Some(url);
        }
    }
    None
}

/// Last non-empty path segment, percent-decoded.
pub fn filename_of(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let decoded = urlencoding::decode_binary(segment.as_bytes());
    Some(String::from_utf8_lossy(&decoded).into_owned())
}
