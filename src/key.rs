//! Canonicalization of user-supplied keys and URLs into store keys.
//!
//! Clients hand us keys in whatever shape they have lying around: a bare
//! name, an absolute URL copied out of the manifest, a percent-encoded
//! path, a Windows-style backslash path. Everything funnels through
//! [`normalize`] before touching the store so that one object has exactly
//! one key.

use crate::config::Config;

/// Reduce a raw key or URL to its canonical store key.
///
/// Applied in order: drop the scheme and host if the input is an absolute
/// URL, keeping only the path; strip leading slashes; percent-decode once
/// (an undecodable input is kept as-is rather than rejected); replace
/// backslashes with forward slashes; collapse runs of slashes.
///
/// The result may be empty; callers treat an empty key as a validation
/// error.
pub fn normalize(raw: &str) -> String {
    let mut key = raw.trim();
    if let Some(path) = url_path(key) {
        key = path;
    }
    let key = key.trim_start_matches('/');
    let decoded = percent_decode(key);
    let slashed = decoded.replace('\\', "/");
    let trimmed = slashed.trim_start_matches('/');

    let mut out = String::with_capacity(trimmed.len());
    let mut prev_slash = false;
    for c in trimmed.chars() {
        if c == '/' {
            if prev_slash {
                continue;
            }
            prev_slash = true;
        } else {
            prev_slash = false;
        }
        out.push(c);
    }
    out
}

/// The lowercased final `.`-delimited suffix of a key, if any.
pub fn extension(key: &str) -> Option<String> {
    let (_, ext) = key.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Whether a key names an image object: an allowed extension, and not the
/// reserved manifest key.
pub fn is_image_key(key: &str, config: &Config) -> bool {
    if key == config.manifest_key {
        return false;
    }
    match extension(key) {
        Some(ext) => config.allowed_extensions.contains(&ext),
        None => false,
    }
}

/// If `input` looks like an absolute URL, return its path (possibly empty).
fn url_path(input: &str) -> Option<&str> {
    let (scheme, rest) = input.split_once("://")?;
    if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.') {
        return None;
    }
    match rest.find('/') {
        Some(idx) => Some(&rest[idx..]),
        None => Some(""),
    }
}

/// Decode `%XX` escapes in a single pass. Any malformed escape or invalid
/// UTF-8 output leaves the whole input untouched, mirroring how a failed
/// `decodeURIComponent` falls back to the raw string.
fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let (Some(hi), Some(lo)) = (
                bytes.get(i + 1).copied().and_then(hex_value),
                bytes.get(i + 2).copied().and_then(hex_value),
            ) else {
                return input.to_string();
            };
            out.push(hi << 4 | lo);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    match String::from_utf8(out) {
        Ok(decoded) => decoded,
        Err(_) => input.to_string(),
    }
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_scheme_and_host() {
        assert_eq!(normalize("https://img.example.net/icons/app.png"), "icons/app.png");
        assert_eq!(normalize("http://img.example.net"), "");
    }

    #[test]
    fn strips_leading_slashes() {
        assert_eq!(normalize("/a.png"), "a.png");
        assert_eq!(normalize("///a.png"), "a.png");
    }

    #[test]
    fn decodes_percent_escapes_once() {
        assert_eq!(normalize("%E5%9B%BE.png"), "图.png");
        assert_eq!(normalize("folder%2Ficon.png"), "folder/icon.png");
    }

    #[test]
    fn malformed_escapes_fall_back_to_raw() {
        assert_eq!(normalize("100%.png"), "100%.png");
        assert_eq!(normalize("bad%zzescape.png"), "bad%zzescape.png");
    }

    #[test]
    fn backslashes_become_slashes() {
        assert_eq!(normalize(r"dir\sub\a.png"), "dir/sub/a.png");
        assert_eq!(normalize(r"\a.png"), "a.png");
    }

    #[test]
    fn collapses_duplicate_slashes() {
        assert_eq!(normalize("a//b///c.png"), "a/b/c.png");
    }

    #[test]
    fn idempotent() {
        for raw in [
            "https://img.example.net/icons//app.png",
            r"\\dir\a.png",
            "%E5%9B%BE.png",
            "plain.png",
            "a//b/c.webp",
            "",
        ] {
            let once = normalize(raw);
            assert_eq!(normalize(&once), once, "input: {raw:?}");
        }
    }

    #[test]
    fn extension_is_last_suffix_lowercased() {
        assert_eq!(extension("a.PNG"), Some("png".to_string()));
        assert_eq!(extension("archive.tar.gz"), Some("gz".to_string()));
        assert_eq!(extension("noext"), None);
        assert_eq!(extension("trailing."), None);
    }

    #[test]
    fn image_keys_respect_allow_list_and_manifest_key() {
        let config = Config::default();
        assert!(is_image_key("a.png", &config));
        assert!(is_image_key("dir/b.JPEG", &config));
        assert!(!is_image_key("notes.txt", &config));
        assert!(!is_image_key("icons.json", &config));
        assert!(!is_image_key("noext", &config));
    }
}
