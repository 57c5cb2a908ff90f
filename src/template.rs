use std::collections::HashMap;

use sha1::{Digest, Sha1};

use crate::types::PromptRecord;

/// Named fill values beyond the first four never participate in a render.
pub(crate) const MAX_NAMED_FILLS: usize = 4;

/// An empty quoted slot. Slots are anonymous and positional: values are
/// substituted left to right into the first remaining marker.
const EMPTY_MARKER: &str = "\"\"";

/// Stable identity of a prompt: the explicit id when one exists, otherwise
/// the hex sha1 of `title + "|" + text`. Editing the text of an id-less
/// prompt therefore changes its identity.
pub(crate) fn prompt_id(record: &PromptRecord) -> String {
    if let Some(id) = record.id.as_deref() {
        if !id.is_empty() {
            return id.to_string();
        }
    }
    let mut hasher = Sha1::new();
    hasher.update(record.title.as_bytes());
    hasher.update(b"|");
    hasher.update(record.text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Manually entered fill values, keyed by prompt identity. Process-scoped;
/// deliberately not persisted across runs. Owned by the caller and passed by
/// reference so the lifetime is explicit.
#[derive(Debug, Default)]
pub(crate) struct PlaceholderCache {
    entries: HashMap<String, Vec<String>>,
}

impl PlaceholderCache {
    pub(crate) fn values(&self, pid: &str) -> &[String] {
        self.entries.get(pid).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn append(&mut self, pid: &str, values: Vec<String>) {
        self.entries.entry(pid.to_string()).or_default().extend(values);
    }

    /// Drop the cached fills for a prompt identity. Must run before a text
    /// edit is committed: the hash-derived identity changes with the text and
    /// the old fills no longer correspond to the same slot positions.
    pub(crate) fn invalidate(&mut self, pid: &str) {
        self.entries.remove(pid);
    }
}

#[derive(Debug, PartialEq)]
pub(crate) struct Rendered {
    pub(crate) text: String,
    /// Empty markers left after all fills were applied. Interactive callers
    /// prompt the user to fill these one by one via `commit_fills`.
    pub(crate) remaining: usize,
}

pub(crate) fn count_slots(text: &str) -> usize {
    text.matches(EMPTY_MARKER).count()
}

fn replace_first_slot(text: &str, value: &str) -> String {
    if value.trim().is_empty() {
        return text.to_string();
    }
    match text.find(EMPTY_MARKER) {
        Some(i) => format!("{}\"{}\"{}", &text[..i], value, &text[i + EMPTY_MARKER.len()..]),
        None => text.to_string(),
    }
}

/// Pure re-application of the substitution algorithm; never touches the
/// cache. Named fills go first, in priority order, each consuming one slot;
/// blank fills are skipped without consuming one. Cached manual values for
/// this prompt's identity follow.
pub(crate) fn render(
    record: &PromptRecord,
    fills: &[String],
    cache: &PlaceholderCache,
    keep_names: bool,
) -> Rendered {
    let mut text = record.text.clone();
    if keep_names {
        for fill in fills.iter().take(MAX_NAMED_FILLS) {
            text = replace_first_slot(&text, fill);
        }
    }
    for value in cache.values(&prompt_id(record)) {
        text = replace_first_slot(&text, value);
    }
    let remaining = count_slots(&text);
    Rendered { text, remaining }
}

/// The explicit fill path: patch the first remaining markers with the
/// accepted values and remember them for this prompt identity, so the next
/// render applies them without re-entry.
pub(crate) fn commit_fills(
    pid: &str,
    text: &str,
    values: &[String],
    cache: &mut PlaceholderCache,
) -> String {
    let mut out = text.to_string();
    let mut applied = Vec::new();
    for value in values {
        if value.trim().is_empty() {
            continue;
        }
        if count_slots(&out) == 0 {
            break;
        }
        out = replace_first_slot(&out, value);
        applied.push(value.clone());
    }
    if !applied.is_empty() {
        cache.append(pid, applied);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt(text: &str) -> PromptRecord {
        PromptRecord {
            id: None,
            title: "Test".to_string(),
            category: "Base".to_string(),
            tags: Vec::new(),
            text: text.to_string(),
        }
    }

    #[test]
    fn fills_consume_slots_left_to_right() {
        let rec = prompt("Say \"\" to \"\"");
        let cache = PlaceholderCache::default();
        let out = render(&rec, &["Alice".to_string(), "Bob".to_string()], &cache, true);
        assert_eq!(out.text, "Say \"Alice\" to \"Bob\"");
        assert_eq!(out.remaining, 0);
    }

    #[test]
    fn keep_names_off_suppresses_all_fills() {
        let rec = prompt("Say \"\" to \"\"");
        let cache = PlaceholderCache::default();
        let out = render(&rec, &["Alice".to_string(), "Bob".to_string()], &cache, false);
        assert_eq!(out.text, "Say \"\" to \"\"");
        assert_eq!(out.remaining, 2);
    }

    #[test]
    fn blank_fill_does_not_consume_a_slot() {
        let rec = prompt("Say \"\" to \"\"");
        let cache = PlaceholderCache::default();
        let fills = vec![String::new(), "Bob".to_string()];
        let out = render(&rec, &fills, &cache, true);
        assert_eq!(out.text, "Say \"Bob\" to \"\"");
        assert_eq!(out.remaining, 1);
    }

    #[test]
    fn only_first_four_named_fills_apply() {
        let rec = prompt("\"\" \"\" \"\" \"\" \"\"");
        let cache = PlaceholderCache::default();
        let fills: Vec<String> = ["a", "b", "c", "d", "e"].iter().map(|s| s.to_string()).collect();
        let out = render(&rec, &fills, &cache, true);
        assert_eq!(out.text, "\"a\" \"b\" \"c\" \"d\" \"\"");
        assert_eq!(out.remaining, 1);
    }

    #[test]
    fn committed_fills_are_reapplied_by_identity() {
        let rec = prompt("Meet \"\" at \"\"");
        let pid = prompt_id(&rec);
        let mut cache = PlaceholderCache::default();

        let first = render(&rec, &["Alice".to_string()], &cache, true);
        assert_eq!(first.remaining, 1);
        let patched = commit_fills(&pid, &first.text, &["noon".to_string()], &mut cache);
        assert_eq!(patched, "Meet \"Alice\" at \"noon\"");

        // Same identity, no manual re-entry: the cached value still lands.
        let again = render(&rec, &["Alice".to_string()], &cache, true);
        assert_eq!(again.text, "Meet \"Alice\" at \"noon\"");
        assert_eq!(again.remaining, 0);
    }

    #[test]
    fn editing_text_changes_identity_and_drops_cache() {
        let rec = prompt("Meet \"\"");
        let pid = prompt_id(&rec);
        let mut cache = PlaceholderCache::default();
        commit_fills(&pid, &rec.text, &["Alice".to_string()], &mut cache);
        assert_eq!(cache.values(&pid), ["Alice".to_string()]);

        // Edit path: invalidate under the old identity before the text moves.
        cache.invalidate(&pid);
        let mut edited = rec.clone();
        edited.text = "Greet \"\"".to_string();
        assert_ne!(prompt_id(&edited), pid);
        let out = render(&edited, &[], &cache, true);
        assert_eq!(out.text, "Greet \"\"");
        assert_eq!(out.remaining, 1);
    }

    #[test]
    fn explicit_id_wins_over_content_hash() {
        let mut rec = prompt("\"\"");
        rec.id = Some("p42".to_string());
        assert_eq!(prompt_id(&rec), "p42");
        rec.id = None;
        assert_eq!(prompt_id(&rec).len(), 40);
    }

    #[test]
    fn preview_render_never_mutates_cache() {
        let rec = prompt("Say \"\"");
        let pid = prompt_id(&rec);
        let cache = PlaceholderCache::default();
        let _ = render(&rec, &["Alice".to_string()], &cache, true);
        assert!(cache.values(&pid).is_empty());
    }

    #[test]
    fn commit_stops_when_no_slots_remain() {
        let rec = prompt("One \"\"");
        let pid = prompt_id(&rec);
        let mut cache = PlaceholderCache::default();
        let out = commit_fills(&pid, &rec.text, &["a".to_string(), "b".to_string()], &mut cache);
        assert_eq!(out, "One \"a\"");
        assert_eq!(cache.values(&pid), ["a".to_string()]);
    }
}
