//! Pure extraction functions invoked by the Cache Service on every file read.
//!
//! These are the "markdown extractors" and "path normalizer" the design treats as external
//! collaborators: none of them touch the filesystem or the cache's own state, so they can be
//! tested in complete isolation from the rest of the crate.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::SystemTime;

use regex::Regex;
use std::sync::OnceLock;

use crate::model::{Frontmatter, InlineProps};

fn frontmatter_delim() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\A---\r?\n(.*?)\r?\n---\r?\n?").unwrap())
}

fn hashtag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // A leading `#` not itself preceded by a word character or another `#`, followed by a
    // tag body of word characters, `/`, or `-` (Obsidian nested-tag syntax).
    RE.get_or_init(|| Regex::new(r"(?:^|[^\w#&])#([[:alpha:]][\w/-]*)").unwrap())
}

fn inline_prop_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*([A-Za-z_][\w -]*)::\s*(.*)$").unwrap())
}

fn leading_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{4}-\d{2}-\d{2})").unwrap())
}

fn embedded_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{4}-\d{2}-\d{2})").unwrap())
}

/// Splits `content` into parsed frontmatter (if any) and the remaining body.
///
/// Returns `(frontmatter, body)`; `body` is `content` unchanged when there is no frontmatter
/// block, and the text after the closing `---` otherwise.
pub fn parse_frontmatter(content: &str) -> (Option<Frontmatter>, &str) {
    let Some(m) = frontmatter_delim().captures(content) else {
        return (None, content);
    };
    let yaml_block = m.get(1).unwrap().as_str();
    let body = &content[m.get(0).unwrap().end()..];

    let parsed: Option<Frontmatter> = serde_yaml::from_str::<serde_yaml::Value>(yaml_block)
        .ok()
        .and_then(|value| serde_json::to_value(value).ok())
        .and_then(|value| match value {
            serde_json::Value::Object(map) => Some(map.into_iter().collect()),
            _ => None,
        });
    (parsed, body)
}

/// Extracts normalized hashtags (`#tag`, lowercase, no leading `#`) from `content`.
///
/// Code spans (`` `...` ``) are excluded so that tag-like text inside inline code does not leak
/// into the tag index.
pub fn extract_hashtags(content: &str) -> BTreeSet<String> {
    let stripped = strip_code_spans(content);
    hashtag_re()
        .captures_iter(&stripped)
        .map(|c| c[1].to_lowercase())
        .collect()
}

/// Extracts tags listed in a frontmatter `tags` key, whether given as a YAML sequence or a single
/// comma-separated string.
pub fn frontmatter_tags(frontmatter: &Frontmatter) -> BTreeSet<String> {
    let Some(value) = frontmatter.get("tags") else {
        return BTreeSet::new();
    };
    match value {
        serde_json::Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.trim().trim_start_matches('#').to_lowercase())
            .filter(|s| !s.is_empty())
            .collect(),
        serde_json::Value::String(s) => s
            .split(',')
            .map(|s| s.trim().trim_start_matches('#').to_lowercase())
            .filter(|s| !s.is_empty())
            .collect(),
        _ => BTreeSet::new(),
    }
}

/// Extracts Dataview-style inline properties (`Key:: Value`), preserving file order of values.
pub fn extract_inline_props(body: &str) -> InlineProps {
    let mut props = InlineProps::new();
    for cap in inline_prop_re().captures_iter(body) {
        let key = cap[1].trim().to_string();
        let value = cap[2].trim().to_string();
        props.entry(key).or_default().push(value);
    }
    props
}

/// Derives a best-effort content timestamp: frontmatter `date`/`created`, else a leading
/// `YYYY-MM-DD` in the filename, else a `YYYY-MM-DD` in the first heading, else `mod_time`.
pub fn derive_content_time(
    frontmatter: Option<&Frontmatter>,
    file_stem: &str,
    body: &str,
    mod_time: SystemTime,
) -> SystemTime {
    if let Some(fm) = frontmatter {
        for key in ["date", "created"] {
            if let Some(s) = fm.get(key).and_then(|v| v.as_str()) {
                if let Some(t) = parse_date_str(s) {
                    return t;
                }
            }
        }
    }
    if let Some(caps) = leading_date_re().captures(file_stem) {
        if let Some(t) = parse_date_str(&caps[1]) {
            return t;
        }
    }
    if let Some(t) = first_heading_date(body) {
        return t;
    }
    mod_time
}

/// Scans the first Markdown heading line (`#`...`######`) for an embedded `YYYY-MM-DD` date.
fn first_heading_date(body: &str) -> Option<SystemTime> {
    let heading = body.lines().find(|line| line.trim_start().starts_with('#'))?;
    let caps = embedded_date_re().captures(heading)?;
    parse_date_str(&caps[1])
}

fn parse_date_str(s: &str) -> Option<SystemTime> {
    use time::macros::format_description;
    let format = format_description!("[year]-[month]-[day]");
    let date = time::Date::parse(s.get(0..10)?, &format).ok()?;
    let datetime = date.with_hms(0, 0, 0).ok()?.assume_utc();
    Some(SystemTime::from(datetime))
}

/// Normalizes an arbitrary user-supplied note name to the cache's canonical form: forward
/// slashes, no leading `./`, and an enforced `.md` suffix.
///
/// Only appropriate for names that are always notes (e.g. `Entry` lookup keys and wikilink
/// targets) — never for a path discovered from the crawl or the watcher, which may denote a
/// directory; use [`vault_relative`] for those instead.
pub fn normalize_path(path: &str) -> String {
    let mut normalized = path.replace('\\', "/");
    while let Some(stripped) = normalized.strip_prefix("./") {
        normalized = stripped.to_string();
    }
    let normalized = normalized.trim_start_matches('/').to_string();
    if normalized.ends_with(".md") {
        normalized
    } else {
        format!("{normalized}.md")
    }
}

/// Converts an absolute filesystem path to a vault-relative, forward-slash path, without forcing
/// any extension.
///
/// Used for paths discovered from the crawl or the watcher, which may denote a directory as
/// readily as a note: coercing a `.md` suffix onto a directory's relative path (as
/// [`normalize_path`] does for note names) would corrupt it as a dirty-map key or a
/// `FileIndex`/`TagIndex` prefix.
pub fn vault_relative(root: &Path, abs_path: &Path) -> String {
    let relative = abs_path.strip_prefix(root).unwrap_or(abs_path);
    let mut normalized = relative.to_string_lossy().replace('\\', "/");
    while let Some(stripped) = normalized.strip_prefix("./") {
        normalized = stripped.to_string();
    }
    normalized.trim_start_matches('/').to_string()
}

/// Strips backtick-delimited code spans so hashtag scanning ignores their contents.
fn strip_code_spans(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut in_span = false;
    for ch in content.chars() {
        if ch == '`' {
            in_span = !in_span;
            continue;
        }
        if in_span {
            out.push(' ');
        } else {
            out.push(ch);
        }
    }
    out
}
