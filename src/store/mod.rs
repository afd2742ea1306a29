//! Durable, indexed registry of tracked URLs.
//!
//! The whole registry is one JSON document. Every mutation rewrites it through
//! a temporary file and an atomic rename, so a crash mid-write leaves the
//! previous consistent state on disk. A corrupt file on load yields an empty
//! registry plus a recorded load error rather than a crash.

mod entry;

pub use entry::{normalized_key, UrlEntry, UrlStatus};

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::config::types::Carrier;
use crate::error_handling::StoreError;

/// On-disk form of the registry.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    entries: Vec<UrlEntry>,
}

struct StoreState {
    entries: HashMap<String, UrlEntry>,
    load_error: Option<String>,
}

/// The URL registry.
///
/// All mutations take the single internal lock around the full
/// read-modify-write-persist sequence; queries copy a snapshot under the same
/// lock and never block each other afterwards.
pub struct UrlStore {
    path: Option<PathBuf>,
    state: Mutex<StoreState>,
}

impl UrlStore {
    /// A registry with no backing file. Used by tests and dry runs.
    pub fn in_memory() -> Self {
        UrlStore {
            path: None,
            state: Mutex::new(StoreState {
                entries: HashMap::new(),
                load_error: None,
            }),
        }
    }

    /// Opens the registry at `path`, loading any existing document.
    ///
    /// A missing file is a fresh registry. An unreadable or malformed file is
    /// logged, recorded as the load error, and treated as empty; the next
    /// successful mutation rewrites a clean document.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (entries, load_error) = match read_document(&path) {
            Ok(doc) => {
                let entries = doc
                    .entries
                    .into_iter()
                    .map(|e| (e.normalized_key.clone(), e))
                    .collect::<HashMap<_, _>>();
                debug!("loaded {} URL entries from {}", entries.len(), path.display());
                (entries, None)
            }
            Err(e) => {
                warn!("{e}; starting with an empty URL store");
                (HashMap::new(), Some(e.to_string()))
            }
        };
        UrlStore {
            path: Some(path),
            state: Mutex::new(StoreState {
                entries,
                load_error,
            }),
        }
    }

    /// The load error recorded when the backing file was unreadable or
    /// malformed at open time.
    pub fn load_error(&self) -> Option<String> {
        self.lock_state().load_error.clone()
    }

    /// Number of tracked URLs.
    pub fn len(&self) -> usize {
        self.lock_state().entries.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts `url` or merges into the existing entry with the same key.
    ///
    /// On merge, tags are unioned and a provided category replaces the old
    /// one. Returns `(created, entry)` where `created` is false for a merge.
    pub fn add(
        &self,
        url: &str,
        carrier: Carrier,
        category: Option<&str>,
        tags: &BTreeSet<String>,
    ) -> Result<(bool, UrlEntry), StoreError> {
        let key =
            normalized_key(url).ok_or_else(|| StoreError::InvalidUrl(url.to_string()))?;
        let tags: BTreeSet<String> = tags.iter().map(|t| t.to_lowercase()).collect();
        let category = category.map(|c| c.to_lowercase());

        let mut state = self.lock_state();
        let now = Utc::now();
        let (created, entry) = match state.entries.get_mut(&key) {
            Some(existing) => {
                existing.tags.extend(tags);
                if category.is_some() {
                    existing.category = category;
                }
                existing.updated_at = now;
                (false, existing.clone())
            }
            None => {
                let entry = UrlEntry {
                    url: url.to_string(),
                    normalized_key: key.clone(),
                    carrier,
                    category,
                    tags,
                    status: UrlStatus::Pending,
                    success_count: 0,
                    failure_count: 0,
                    last_error: None,
                    created_at: now,
                    updated_at: now,
                };
                state.entries.insert(key, entry.clone());
                (true, entry)
            }
        };
        self.persist(&state)?;
        Ok((created, entry))
    }

    /// Records a fetch outcome for the entry under `key`.
    ///
    /// Bumps the matching counter, sets the status, and records the error
    /// message on failure. Reports `NotFound` when no entry has the key.
    pub fn update_status(
        &self,
        key: &str,
        success: bool,
        error: Option<&str>,
    ) -> Result<UrlEntry, StoreError> {
        let mut state = self.lock_state();
        let entry = state
            .entries
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;

        if success {
            entry.success_count += 1;
            entry.status = UrlStatus::Success;
        } else {
            entry.failure_count += 1;
            entry.status = UrlStatus::Failed;
            entry.last_error = error.map(str::to_string);
        }
        entry.updated_at = Utc::now();
        let snapshot = entry.clone();
        self.persist(&state)?;
        Ok(snapshot)
    }

    /// The entry under `key`, if any.
    pub fn get(&self, key: &str) -> Option<UrlEntry> {
        self.lock_state().entries.get(key).cloned()
    }

    /// Removes and returns the entry under `key`.
    pub fn remove(&self, key: &str) -> Result<UrlEntry, StoreError> {
        let mut state = self.lock_state();
        let entry = state
            .entries
            .remove(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        self.persist(&state)?;
        Ok(entry)
    }

    /// Adds `tags` to the entry under `key`.
    pub fn add_tags(&self, key: &str, tags: &BTreeSet<String>) -> Result<UrlEntry, StoreError> {
        self.edit_tags(key, |entry_tags| {
            entry_tags.extend(tags.iter().map(|t| t.to_lowercase()));
        })
    }

    /// Removes `tags` from the entry under `key`.
    pub fn remove_tags(&self, key: &str, tags: &BTreeSet<String>) -> Result<UrlEntry, StoreError> {
        self.edit_tags(key, |entry_tags| {
            for tag in tags {
                entry_tags.remove(&tag.to_lowercase());
            }
        })
    }

    fn edit_tags(
        &self,
        key: &str,
        edit: impl FnOnce(&mut BTreeSet<String>),
    ) -> Result<UrlEntry, StoreError> {
        let mut state = self.lock_state();
        let entry = state
            .entries
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        edit(&mut entry.tags);
        entry.updated_at = Utc::now();
        let snapshot = entry.clone();
        self.persist(&state)?;
        Ok(snapshot)
    }

    /// All entries for `carrier`, oldest first.
    pub fn by_carrier(&self, carrier: Carrier) -> Vec<UrlEntry> {
        self.snapshot(|e| e.carrier == carrier)
    }

    /// All entries filed under `category` (case-insensitive), oldest first.
    pub fn by_category(&self, category: &str) -> Vec<UrlEntry> {
        let category = category.to_lowercase();
        self.snapshot(|e| e.category.as_deref() == Some(category.as_str()))
    }

    /// All entries carrying `tag` (case-insensitive), oldest first.
    pub fn by_tag(&self, tag: &str) -> Vec<UrlEntry> {
        let tag = tag.to_lowercase();
        self.snapshot(|e| e.tags.contains(&tag))
    }

    fn snapshot(&self, keep: impl Fn(&UrlEntry) -> bool) -> Vec<UrlEntry> {
        let state = self.lock_state();
        let mut entries: Vec<UrlEntry> =
            state.entries.values().filter(|e| keep(e)).cloned().collect();
        sort_by_creation(&mut entries);
        entries
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, StoreState> {
        // A poisoned lock means another thread panicked mid-mutation; the
        // in-memory map itself is still structurally sound, so keep going.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn persist(&self, state: &StoreState) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let mut entries: Vec<UrlEntry> = state.entries.values().cloned().collect();
        sort_by_creation(&mut entries);
        let doc = StoreDocument { entries };

        let json = serde_json::to_string_pretty(&doc)
            .map_err(|e| write_error(path, io::Error::other(e)))?;

        let dir = parent_dir(path);
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| write_error(path, e))?;
        tmp.write_all(json.as_bytes())
            .map_err(|e| write_error(path, e))?;
        tmp.persist(path).map_err(|e| write_error(path, e.error))?;
        Ok(())
    }
}

fn sort_by_creation(entries: &mut [UrlEntry]) {
    entries.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.normalized_key.cmp(&b.normalized_key))
    });
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn read_document(path: &Path) -> Result<StoreDocument, StoreError> {
    if !path.exists() {
        return Ok(StoreDocument::default());
    }
    let text = fs::read_to_string(path).map_err(|source| StoreError::Load {
        path: path.to_path_buf(),
        source,
    })?;
    if text.trim().is_empty() {
        return Ok(StoreDocument::default());
    }
    serde_json::from_str(&text).map_err(|source| StoreError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn write_error(path: &Path, source: io::Error) -> StoreError {
    StoreError::Write {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tags(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_add_creates_pending_entry() {
        let store = UrlStore::in_memory();
        let (created, entry) = store
            .add(
                "https://www.aetna.com/providers",
                Carrier::Aetna,
                Some("provider-portal"),
                &tags(&["high-priority"]),
            )
            .unwrap();

        assert!(created);
        assert_eq!(entry.status, UrlStatus::Pending);
        assert_eq!(entry.normalized_key, "https://www.aetna.com/providers");
        assert_eq!(entry.category.as_deref(), Some("provider-portal"));
        assert_eq!(entry.success_count, 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_add_is_idempotent_and_merges() {
        let store = UrlStore::in_memory();
        store
            .add(
                "https://www.aetna.com/providers",
                Carrier::Aetna,
                Some("provider-portal"),
                &tags(&["high-priority"]),
            )
            .unwrap();

        // Same key modulo case and trailing slash.
        let (created, entry) = store
            .add(
                "https://WWW.AETNA.COM/providers/",
                Carrier::Aetna,
                Some("documentation"),
                &tags(&["pdf"]),
            )
            .unwrap();

        assert!(!created);
        assert_eq!(store.len(), 1);
        assert_eq!(entry.tags, tags(&["high-priority", "pdf"]));
        assert_eq!(entry.category.as_deref(), Some("documentation"));
    }

    #[test]
    fn test_merge_without_category_keeps_old_one() {
        let store = UrlStore::in_memory();
        store
            .add(
                "https://www.cigna.com/providers",
                Carrier::Cigna,
                Some("claims"),
                &BTreeSet::new(),
            )
            .unwrap();
        let (_, entry) = store
            .add(
                "https://www.cigna.com/providers",
                Carrier::Cigna,
                None,
                &BTreeSet::new(),
            )
            .unwrap();
        assert_eq!(entry.category.as_deref(), Some("claims"));
    }

    #[test]
    fn test_update_status_tracks_counters_and_last_error() {
        let store = UrlStore::in_memory();
        let (_, entry) = store
            .add(
                "https://www.uhc.com/dental",
                Carrier::Uhc,
                None,
                &BTreeSet::new(),
            )
            .unwrap();

        let updated = store
            .update_status(&entry.normalized_key, false, Some("HTTP 503"))
            .unwrap();
        assert_eq!(updated.status, UrlStatus::Failed);
        assert_eq!(updated.failure_count, 1);
        assert_eq!(updated.last_error.as_deref(), Some("HTTP 503"));

        let updated = store
            .update_status(&entry.normalized_key, true, None)
            .unwrap();
        assert_eq!(updated.status, UrlStatus::Success);
        assert_eq!(updated.success_count, 1);
        assert_eq!(updated.failure_count, 1);
    }

    #[test]
    fn test_update_status_unknown_key_reports_not_found() {
        let store = UrlStore::in_memory();
        let err = store
            .update_status("https://www.aetna.com/missing", true, None)
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn test_queries_filter_and_order_by_creation() {
        let store = UrlStore::in_memory();
        store
            .add("https://www.aetna.com/a", Carrier::Aetna, Some("claims"), &BTreeSet::new())
            .unwrap();
        store
            .add("https://www.aetna.com/b", Carrier::Aetna, None, &tags(&["pdf"]))
            .unwrap();
        store
            .add("https://www.cigna.com/c", Carrier::Cigna, Some("claims"), &BTreeSet::new())
            .unwrap();

        let aetna = store.by_carrier(Carrier::Aetna);
        assert_eq!(aetna.len(), 2);
        assert!(aetna[0].created_at <= aetna[1].created_at);

        assert_eq!(store.by_category("CLAIMS").len(), 2);
        assert_eq!(store.by_tag("pdf").len(), 1);
        assert!(store.by_tag("absent").is_empty());
    }

    #[test]
    fn test_remove_and_tag_edits() {
        let store = UrlStore::in_memory();
        let (_, entry) = store
            .add(
                "https://www.metlife.com/dental",
                Carrier::Metlife,
                None,
                &tags(&["beta", "form"]),
            )
            .unwrap();

        let after = store
            .remove_tags(&entry.normalized_key, &tags(&["beta"]))
            .unwrap();
        assert_eq!(after.tags, tags(&["form"]));

        let after = store
            .add_tags(&entry.normalized_key, &tags(&["High-Priority"]))
            .unwrap();
        assert!(after.tags.contains("high-priority"));

        store.remove(&entry.normalized_key).unwrap();
        assert!(store.is_empty());
        assert!(matches!(
            store.remove(&entry.normalized_key),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_round_trip_preserves_entries_and_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("url_store.json");

        let store = UrlStore::open(&path);
        store
            .add("https://www.aetna.com/one", Carrier::Aetna, None, &tags(&["pdf"]))
            .unwrap();
        store
            .add("https://www.aetna.com/two", Carrier::Aetna, Some("forms"), &BTreeSet::new())
            .unwrap();
        store
            .update_status("https://www.aetna.com/one", true, None)
            .unwrap();
        let before: Vec<String> = store
            .by_carrier(Carrier::Aetna)
            .into_iter()
            .map(|e| e.normalized_key)
            .collect();

        let reloaded = UrlStore::open(&path);
        assert!(reloaded.load_error().is_none());
        let after: Vec<String> = reloaded
            .by_carrier(Carrier::Aetna)
            .into_iter()
            .map(|e| e.normalized_key)
            .collect();
        assert_eq!(before, after);

        let one = reloaded.get("https://www.aetna.com/one").unwrap();
        assert_eq!(one.status, UrlStatus::Success);
        assert_eq!(one.success_count, 1);
        assert_eq!(one.tags, tags(&["pdf"]));
    }

    #[test]
    fn test_corrupt_file_loads_empty_with_reported_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("url_store.json");
        fs::write(&path, "{ this is not json").unwrap();

        let store = UrlStore::open(&path);
        assert!(store.is_empty());
        let err = store.load_error().expect("load error recorded");
        assert!(err.contains("url_store.json"));

        // The store is still usable; the next write replaces the bad file.
        store
            .add("https://www.aetna.com/x", Carrier::Aetna, None, &BTreeSet::new())
            .unwrap();
        assert!(UrlStore::open(&path).load_error().is_none());
    }

    #[test]
    fn test_missing_and_empty_files_load_clean() {
        let dir = TempDir::new().unwrap();
        let missing = UrlStore::open(dir.path().join("never_written.json"));
        assert!(missing.is_empty());
        assert!(missing.load_error().is_none());

        let empty_path = dir.path().join("empty.json");
        fs::write(&empty_path, "").unwrap();
        let empty = UrlStore::open(&empty_path);
        assert!(empty.is_empty());
        assert!(empty.load_error().is_none());
    }

    #[test]
    fn test_document_shape_on_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("url_store.json");
        let store = UrlStore::open(&path);
        store
            .add(
                "https://www.aetna.com/providers",
                Carrier::Aetna,
                Some("provider-portal"),
                &tags(&["b-tag", "a-tag"]),
            )
            .unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&text).unwrap();
        let entries = doc["entries"].as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["carrier"], "aetna");
        assert_eq!(entries[0]["status"], "pending");
        // Tags serialize sorted.
        assert_eq!(entries[0]["tags"][0], "a-tag");
        assert_eq!(entries[0]["tags"][1], "b-tag");
    }

    #[test]
    fn test_invalid_url_cannot_be_added() {
        let store = UrlStore::in_memory();
        let err = store
            .add("not a url", Carrier::Aetna, None, &BTreeSet::new())
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidUrl(_)));
    }
}
