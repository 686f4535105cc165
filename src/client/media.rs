/// Turns a stored media path into an absolute URL under `base`.
///
/// Absolute `http(s)://` paths pass through untouched and an empty path
/// yields an empty string.
pub fn build_media_url(base: &str, path: &str) -> String {
    if path.is_empty() {
        return String::new();
    }
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }

    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}
