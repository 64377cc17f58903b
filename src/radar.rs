//! The persisted radar collection: a single pretty-printed JSON document
//! holding the newest-first list of opportunity records.
//!
//! The document is loaded once at the start of a run, mutated in memory,
//! and written back once at the end. Writes are atomic (temp file + rename)
//! so a crashed run never leaves a truncated collection behind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Maximum number of records kept in the collection. Oldest beyond the cap
/// are dropped on merge.
pub const MAX_ITEMS: usize = 250;

/// Maximum length of a derived record id.
pub const ID_MAX_LEN: usize = 120;

/// Errors that can occur while loading or saving the radar document.
///
/// Note that a *corrupt* document is not an error: `load` recovers to an
/// empty collection (preserving the broken file aside). Only I/O and
/// serialization failures surface here, and they abort the run.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to access radar file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to serialize radar collection: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One persisted opportunity, derived from a single feed entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Derived from the source URL by `safe_id` — not a hash, collisions
    /// are possible and accepted.
    pub id: String,
    pub title: String,
    pub category: String,
    pub summary: String,
    pub opportunity_score: f64,
    pub risk_score: f64,
    pub who_is_it_for: Vec<String>,
    pub how_to_start: Vec<String>,
    pub watch_out: Vec<String>,
    pub keywords: Vec<String>,
    pub confidence: f64,
    pub date: DateTime<Utc>,
    #[serde(rename = "sourceUrl")]
    pub source_url: String,
    pub sources: Vec<String>,
}

/// The whole persisted document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Radar {
    pub title: String,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
    pub items: Vec<Record>,
}

impl Radar {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            updated_at: Utc::now(),
            items: Vec::new(),
        }
    }

    /// Ids already present in the collection, used to skip entries that
    /// were ingested on a previous run.
    pub fn seen_ids(&self) -> HashSet<String> {
        self.items.iter().map(|r| r.id.clone()).collect()
    }

    /// Prepends freshly accepted records (newest first), truncates to
    /// [`MAX_ITEMS`], and refreshes `updatedAt`.
    ///
    /// The timestamp is refreshed even when `added` is empty: it marks that
    /// the run happened at all.
    pub fn absorb(&mut self, added: Vec<Record>) {
        if !added.is_empty() {
            let mut items = added;
            items.append(&mut self.items);
            items.truncate(MAX_ITEMS);
            self.items = items;
        }
        self.updated_at = Utc::now();
    }
}

/// Derives a record id from a source URL: every character that is not
/// ASCII alphanumeric becomes `_`, truncated to [`ID_MAX_LEN`] chars.
///
/// An empty URL yields an empty id, which callers must treat as
/// "no id can be derived" and skip the entry.
pub fn safe_id(url: &str) -> String {
    url.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .take(ID_MAX_LEN)
        .collect()
}

/// Clamps a raw JSON score to [0, 10]. Non-numeric values clamp to 0.
pub fn clamp_score(raw: &Value) -> f64 {
    match raw.as_f64() {
        Some(x) if x.is_finite() => x.clamp(0.0, 10.0),
        _ => 0.0,
    }
}

/// Loads the collection from `path`.
///
/// - Missing file → fresh empty collection titled `title`.
/// - Corrupt file → fresh empty collection; the broken file is preserved
///   as `<path>.corrupt` best-effort and a warning is logged, so prior
///   history can be recovered manually.
/// - Any other I/O failure → [`StoreError::Io`] (aborts the run).
pub fn load(path: &Path, title: &str) -> Result<Radar, StoreError> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "No radar file found, starting fresh");
            return Ok(Radar::new(title));
        }
        Err(e) => return Err(StoreError::Io(e)),
    };

    match serde_json::from_str::<Radar>(&content) {
        Ok(radar) => Ok(radar),
        Err(e) => {
            let backup = corrupt_backup_path(path);
            match std::fs::copy(path, &backup) {
                Ok(_) => tracing::warn!(
                    path = %path.display(),
                    backup = %backup.display(),
                    error = %e,
                    "Radar file is corrupt; preserved it aside and starting from an empty collection"
                ),
                Err(copy_err) => tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    backup_error = %copy_err,
                    "Radar file is corrupt and could not be preserved; starting from an empty collection"
                ),
            }
            Ok(Radar::new(title))
        }
    }
}

fn corrupt_backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".corrupt");
    PathBuf::from(name)
}

/// Writes the collection to `path` as pretty-printed JSON, atomically.
///
/// Write-to-temp-then-rename ensures the destination is never left in a
/// partial state. The temp filename carries a random suffix so a stray
/// symlink cannot be planted at a predictable path.
pub fn save(radar: &Radar, path: &Path) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(radar)?;

    use std::time::{SystemTime, UNIX_EPOCH};
    let random_suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let temp_path = path.with_extension(format!("tmp.{:016x}", random_suffix));

    let mut temp_file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temp_path)?;

    if let Err(e) = temp_file
        .write_all(json.as_bytes())
        .and_then(|_| temp_file.sync_all())
    {
        let _ = std::fs::remove_file(&temp_path);
        return Err(StoreError::Io(e));
    }
    drop(temp_file);

    if let Err(e) = std::fs::rename(&temp_path, path) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(StoreError::Io(e));
    }

    Ok(())
}

/// Test fixture shared with the pipeline tests.
#[cfg(test)]
pub(crate) fn sample_record(id: &str) -> Record {
    Record {
        id: id.to_string(),
        title: "Test opportunity".to_string(),
        category: "Product Trend".to_string(),
        summary: "A long enough summary describing the opportunity in detail.".to_string(),
        opportunity_score: 7.0,
        risk_score: 3.0,
        who_is_it_for: vec!["makers".to_string()],
        how_to_start: vec!["a".to_string(), "b".to_string(), "c".to_string()],
        watch_out: vec![],
        keywords: vec!["test".to_string()],
        confidence: 0.8,
        date: Utc::now(),
        source_url: format!("https://example.com/{id}"),
        sources: vec!["Test".to_string()],
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_safe_id_replaces_non_alphanumeric() {
        assert_eq!(
            safe_id("https://example.com/a-b?c=1"),
            "https___example_com_a_b_c_1"
        );
    }

    #[test]
    fn test_safe_id_empty_input() {
        assert_eq!(safe_id(""), "");
    }

    #[test]
    fn test_safe_id_truncates_to_120() {
        let long = "x".repeat(500);
        assert_eq!(safe_id(&long).len(), ID_MAX_LEN);
    }

    #[test]
    fn test_safe_id_non_ascii_becomes_underscore() {
        assert_eq!(safe_id("日本/news"), "___news");
    }

    #[test]
    fn test_clamp_score_in_range() {
        assert_eq!(clamp_score(&json!(7.5)), 7.5);
    }

    #[test]
    fn test_clamp_score_out_of_range() {
        assert_eq!(clamp_score(&json!(-3)), 0.0);
        assert_eq!(clamp_score(&json!(42)), 10.0);
    }

    #[test]
    fn test_clamp_score_non_numeric() {
        assert_eq!(clamp_score(&json!("high")), 0.0);
        assert_eq!(clamp_score(&json!(null)), 0.0);
        assert_eq!(clamp_score(&json!([1, 2])), 0.0);
    }

    proptest! {
        #[test]
        fn prop_safe_id_is_ascii_alphanumeric_or_underscore(url in ".*") {
            let id = safe_id(&url);
            prop_assert!(id.len() <= ID_MAX_LEN);
            prop_assert!(id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
        }

        #[test]
        fn prop_clamp_score_bounds(x in proptest::num::f64::ANY) {
            let clamped = clamp_score(&json!(x));
            prop_assert!((0.0..=10.0).contains(&clamped));
        }
    }

    #[test]
    fn test_absorb_prepends_newest_first() {
        let mut radar = Radar::new("Radar");
        radar.absorb(vec![sample_record("old")]);
        radar.absorb(vec![sample_record("new")]);
        let ids: Vec<&str> = radar.items.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[test]
    fn test_absorb_truncates_to_cap() {
        let mut radar = Radar::new("Radar");
        let existing: Vec<Record> = (0..MAX_ITEMS).map(|i| sample_record(&format!("r{i}"))).collect();
        radar.absorb(existing);
        radar.absorb(vec![sample_record("newest")]);
        assert_eq!(radar.items.len(), MAX_ITEMS);
        assert_eq!(radar.items[0].id, "newest");
        // Oldest record fell off the end
        assert!(radar.items.iter().all(|r| r.id != format!("r{}", MAX_ITEMS - 1)));
    }

    #[test]
    fn test_absorb_empty_still_touches_timestamp() {
        let mut radar = Radar::new("Radar");
        let before = radar.updated_at;
        std::thread::sleep(std::time::Duration::from_millis(5));
        radar.absorb(Vec::new());
        assert!(radar.updated_at > before);
        assert!(radar.items.is_empty());
    }

    #[test]
    fn test_load_missing_file_returns_empty() {
        let path = std::env::temp_dir().join("radar_test_load_missing/radar.json");
        let radar = load(&path, "Fresh Radar").unwrap();
        assert_eq!(radar.title, "Fresh Radar");
        assert!(radar.items.is_empty());
    }

    #[test]
    fn test_load_corrupt_file_recovers_and_preserves() {
        let dir = std::env::temp_dir().join("radar_test_load_corrupt");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("radar.json");
        std::fs::write(&path, "{ not json at all").unwrap();

        let radar = load(&path, "Radar").unwrap();
        assert!(radar.items.is_empty());

        let backup = dir.join("radar.json.corrupt");
        assert!(backup.exists());
        assert_eq!(std::fs::read_to_string(&backup).unwrap(), "{ not json at all");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_save_then_load_roundtrip() {
        let dir = std::env::temp_dir().join("radar_test_roundtrip");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("radar.json");

        let mut radar = Radar::new("Radar");
        radar.absorb(vec![sample_record("a")]);
        save(&radar, &path).unwrap();

        let loaded = load(&path, "ignored").unwrap();
        assert_eq!(loaded.title, "Radar");
        assert_eq!(loaded.items, radar.items);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_save_is_pretty_printed_with_camel_case_keys() {
        let dir = std::env::temp_dir().join("radar_test_pretty");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("radar.json");

        let mut radar = Radar::new("Radar");
        radar.absorb(vec![sample_record("a")]);
        save(&radar, &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains('\n'), "expected pretty-printed output");
        assert!(content.contains("\"updatedAt\""));
        assert!(content.contains("\"sourceUrl\""));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_save_leaves_no_temp_files() {
        let dir = std::env::temp_dir().join("radar_test_no_temp");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("radar.json");

        save(&Radar::new("Radar"), &path).unwrap();

        let stray: Vec<_> = std::fs::read_dir(&dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name() != "radar.json")
            .collect();
        assert!(stray.is_empty(), "stray files left behind: {:?}", stray);

        std::fs::remove_dir_all(&dir).ok();
    }
}
