//! ListObjectsV2 projection.
//!
//! Turns one page of key-sorted rows into the hierarchical view S3 clients
//! expect: direct children as `Contents`, deeper keys folded into
//! `CommonPrefixes` at the first delimiter after the requested prefix.

use crate::models::object::Object;
use std::collections::HashSet;

/// Upper bound (and default) for `max-keys`.
pub const MAX_KEYS_LIMIT: usize = 1000;

#[derive(Clone, Debug, Default)]
pub struct ListObjectsParams {
    pub prefix: Option<String>,
    pub delimiter: Option<String>,
    pub continuation_token: Option<String>,
    pub start_after: Option<String>,
    /// Raw `max-keys` from the caller; see [`clamp_max_keys`].
    pub max_keys: Option<i64>,
}

impl ListObjectsParams {
    /// Exclusive lower bound of the scan. The continuation token wins over
    /// `start-after` when both are given.
    pub fn marker(&self) -> Option<&str> {
        self.continuation_token
            .as_deref()
            .or(self.start_after.as_deref())
            .filter(|m| !m.is_empty())
    }

    pub fn prefix(&self) -> &str {
        self.prefix.as_deref().unwrap_or("")
    }

    pub fn delimiter(&self) -> &str {
        self.delimiter.as_deref().unwrap_or("")
    }

    pub fn effective_max_keys(&self) -> usize {
        clamp_max_keys(self.max_keys)
    }
}

#[derive(Debug)]
pub struct ListObjectsResult {
    pub objects: Vec<Object>,
    pub common_prefixes: Vec<String>,
    pub is_truncated: bool,
    /// Key of the last scanned row when truncated.
    pub next_continuation_token: Option<String>,
    pub key_count: usize,
    pub max_keys: usize,
}

/// Clamp a requested page size into `[1, 1000]`; absent or non-positive
/// values mean 1000.
pub fn clamp_max_keys(requested: Option<i64>) -> usize {
    match requested {
        Some(n) if n > 0 => (n as u64).min(MAX_KEYS_LIMIT as u64) as usize,
        _ => MAX_KEYS_LIMIT,
    }
}

/// Project a scan of up to `max_keys + 1` rows into a listing page.
///
/// `rows` must be sorted ascending by key and already filtered by prefix
/// and marker.
pub fn project(mut rows: Vec<Object>, prefix: &str, delimiter: &str, max_keys: usize) -> ListObjectsResult {
    let is_truncated = rows.len() > max_keys;
    if is_truncated {
        rows.truncate(max_keys);
    }

    // The token is the last raw row, not the last surfaced entry: a page
    // that ends inside a common prefix resumes inside it.
    let next_continuation_token = if is_truncated {
        rows.last().map(|o| o.key.clone())
    } else {
        None
    };

    let (objects, common_prefixes) = if delimiter.is_empty() {
        (rows, Vec::new())
    } else {
        group_by_delimiter(rows, prefix, delimiter)
    };

    let key_count = objects.len() + common_prefixes.len();

    ListObjectsResult {
        objects,
        common_prefixes,
        is_truncated,
        next_continuation_token,
        key_count,
        max_keys,
    }
}

/// Where a key lands relative to the requested prefix and delimiter.
#[derive(Debug, PartialEq, Eq)]
enum Placement {
    /// The key equals the prefix; it is listed nowhere.
    Skip,
    /// A direct child, or a folder marker ending in the delimiter.
    Content,
    /// Folded into this common prefix.
    Prefix(String),
}

fn place(key: &str, prefix: &str, delimiter: &str) -> Placement {
    if key == prefix {
        return Placement::Skip;
    }
    let rest = key.strip_prefix(prefix).unwrap_or(key);
    match rest.find(delimiter) {
        None => Placement::Content,
        Some(idx) if idx + delimiter.len() == rest.len() => Placement::Content,
        Some(idx) => Placement::Prefix(format!("{}{}", prefix, &rest[..idx + delimiter.len()])),
    }
}

fn group_by_delimiter(rows: Vec<Object>, prefix: &str, delimiter: &str) -> (Vec<Object>, Vec<String>) {
    let placements: Vec<Placement> = rows.iter().map(|o| place(&o.key, prefix, delimiter)).collect();

    // Folder markers on the page shadow the common prefix of the same name.
    let markers: HashSet<&str> = rows
        .iter()
        .zip(&placements)
        .filter(|(o, p)| **p == Placement::Content && o.key.ends_with(delimiter))
        .map(|(o, _)| o.key.as_str())
        .collect();

    let mut seen = HashSet::new();
    let mut common_prefixes = Vec::new();
    for placement in &placements {
        if let Placement::Prefix(cp) = placement {
            if !markers.contains(cp.as_str()) && seen.insert(cp.clone()) {
                common_prefixes.push(cp.clone());
            }
        }
    }

    let objects = rows
        .into_iter()
        .zip(placements)
        .filter(|(_, p)| *p == Placement::Content)
        .map(|(o, _)| o)
        .collect();

    (objects, common_prefixes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn obj(key: &str) -> Object {
        Object {
            id: 0,
            bucket_name: "b".into(),
            key: key.into(),
            size: 0,
            content_type: "application/octet-stream".into(),
            etag: "d41d8cd98f00b204e9800998ecf8427e".into(),
            content_encoding: None,
            content_disposition: None,
            cache_control: None,
            storage_class: "STANDARD".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn rows(keys: &[&str]) -> Vec<Object> {
        keys.iter().map(|k| obj(k)).collect()
    }

    fn keys(result: &ListObjectsResult) -> Vec<&str> {
        result.objects.iter().map(|o| o.key.as_str()).collect()
    }

    #[test]
    fn max_keys_is_clamped() {
        assert_eq!(clamp_max_keys(None), 1000);
        assert_eq!(clamp_max_keys(Some(0)), 1000);
        assert_eq!(clamp_max_keys(Some(-5)), 1000);
        assert_eq!(clamp_max_keys(Some(1)), 1);
        assert_eq!(clamp_max_keys(Some(250)), 250);
        assert_eq!(clamp_max_keys(Some(5000)), 1000);
    }

    #[test]
    fn continuation_token_wins_over_start_after() {
        let params = ListObjectsParams {
            continuation_token: Some("b".into()),
            start_after: Some("a".into()),
            ..Default::default()
        };
        assert_eq!(params.marker(), Some("b"));

        let params = ListObjectsParams {
            start_after: Some("a".into()),
            ..Default::default()
        };
        assert_eq!(params.marker(), Some("a"));
    }

    #[test]
    fn flat_listing_returns_every_row() {
        let result = project(rows(&["a", "b/x", "c/"]), "", "", 1000);
        assert_eq!(keys(&result), vec!["a", "b/x", "c/"]);
        assert!(result.common_prefixes.is_empty());
        assert!(!result.is_truncated);
        assert_eq!(result.next_continuation_token, None);
        assert_eq!(result.key_count, 3);
    }

    #[test]
    fn groups_nested_keys_under_common_prefixes() {
        let result = project(rows(&["a", "b/x", "b/y", "c/"]), "", "/", 1000);
        assert_eq!(keys(&result), vec!["a", "c/"]);
        assert_eq!(result.common_prefixes, vec!["b/"]);
        assert_eq!(result.key_count, 3);
    }

    #[test]
    fn lone_folder_marker_is_content() {
        let result = project(rows(&["d/"]), "", "/", 1000);
        assert_eq!(keys(&result), vec!["d/"]);
        assert!(result.common_prefixes.is_empty());
    }

    #[test]
    fn folder_marker_shadows_its_common_prefix() {
        let result = project(rows(&["d/", "d/x", "e/y"]), "", "/", 1000);
        assert_eq!(keys(&result), vec!["d/"]);
        assert_eq!(result.common_prefixes, vec!["e/"]);
        assert_eq!(result.key_count, 2);
    }

    #[test]
    fn prefix_is_stripped_before_grouping() {
        let result = project(
            rows(&["photos/", "photos/2024/a.jpg", "photos/2024/b.jpg", "photos/2025/", "photos/cover.png"]),
            "photos/",
            "/",
            1000,
        );
        // "photos/" equals the prefix and is listed nowhere.
        assert_eq!(keys(&result), vec!["photos/2025/", "photos/cover.png"]);
        assert_eq!(result.common_prefixes, vec!["photos/2024/"]);
    }

    #[test]
    fn multi_character_delimiter() {
        let result = project(rows(&["a--b--c", "a--d", "e"]), "", "--", 1000);
        assert_eq!(keys(&result), vec!["e"]);
        assert_eq!(result.common_prefixes, vec!["a--"]);
    }

    #[test]
    fn truncation_drops_extra_row_and_sets_token() {
        let result = project(rows(&["a", "b", "c"]), "", "", 2);
        assert_eq!(keys(&result), vec!["a", "b"]);
        assert!(result.is_truncated);
        assert_eq!(result.next_continuation_token.as_deref(), Some("b"));
    }

    #[test]
    fn token_is_last_raw_row_even_when_grouped() {
        let result = project(rows(&["a/1", "a/2", "a/3"]), "", "/", 2);
        assert_eq!(result.common_prefixes, vec!["a/"]);
        assert_eq!(result.next_continuation_token.as_deref(), Some("a/2"));
        assert_eq!(result.key_count, 1);
    }
}
