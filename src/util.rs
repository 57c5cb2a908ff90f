use std::collections::HashSet;
use std::env;
use std::path::PathBuf;

use url::Url;

pub(crate) fn dedup_keep_order(values: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for v in values {
        if seen.insert(v.clone()) {
            out.push(v);
        }
    }
    out
}

/// Case-insensitive variant; the first spelling of a name wins.
pub(crate) fn dedup_keep_order_ci(values: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for v in values {
        if seen.insert(v.to_lowercase()) {
            out.push(v);
        }
    }
    out
}

pub(crate) fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Character names are restricted to letters, digits, spaces, apostrophes
/// and hyphens; runs of whitespace collapse to a single space.
pub(crate) fn sanitize_character_name(name: &str) -> String {
    let kept: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '\'' | '-'))
        .collect();
    collapse_whitespace(&kept)
}

/// Host of a URL, lowercased, without a leading `www.` and without a port.
/// This is the dedup key for the site list.
pub(crate) fn base_domain(url_str: &str) -> Option<String> {
    let parsed = Url::parse(url_str).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

pub(crate) fn ensure_scheme(url: &str) -> String {
    let trimmed = url.trim();
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}

/// Default record title: first line of the text, truncated.
pub(crate) fn first_line_title(text: &str, max_chars: usize) -> String {
    let line = text.lines().next().unwrap_or("").trim();
    if line.is_empty() {
        return "Untitled".to_string();
    }
    line.chars().take(max_chars).collect()
}

/// Install/data directory resolution: CLI flag, then SPLITSHELL_HOME, then
/// the directory the executable lives in, then the working directory.
pub(crate) fn resolve_install_dir(cli: Option<PathBuf>) -> PathBuf {
    if let Some(path) = cli {
        return path;
    }
    if let Ok(value) = env::var("SPLITSHELL_HOME") {
        if !value.trim().is_empty() {
            return PathBuf::from(value);
        }
    }
    if let Ok(exe) = env::current_exe() {
        if let Some(dir) = exe.parent() {
            return dir.to_path_buf();
        }
    }
    PathBuf::from(".")
}
