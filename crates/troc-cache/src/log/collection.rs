//! Append-only keyed collection
//!
//! Each collection is an in-memory map backed by a log file of
//! `"<json>,\n"` records. Appending a record never rewrites history; the
//! map is the fold of the log with later records winning. Deletions have
//! no log representation and are persisted by a full compaction.

use camino::{Utf8Path, Utf8PathBuf};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use troc_core::error::TrocError;

use crate::CacheResult;

/// Separator written after every serialized record
const RECORD_SEPARATOR: &str = ",\n";

/// One line of the log
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LogRecord<T> {
    id: String,
    record: T,
}

#[derive(Serialize)]
struct LogRecordRef<'a, T> {
    id: &'a str,
    record: &'a T,
}

/// The log wrapped into a single JSON document for parsing
#[derive(Deserialize)]
struct WrappedLog<T> {
    json: Vec<LogRecord<T>>,
}

/// Outcome of reading a log file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// No log on disk yet
    Missing,
    /// Every record parsed
    Clean { records: usize },
    /// The log was damaged; records before the damage were kept and the
    /// original file was copied aside
    Recovered { records: usize, dropped_bytes: usize },
}

/// Keyed records persisted as an append-only log
#[derive(Debug)]
pub struct CacheCollection<T> {
    /// Path to the log file
    path: Utf8PathBuf,
    /// In-memory fold of the log
    entries: DashMap<String, T>,
    /// Serialises every file write for this collection
    write_lock: Mutex<()>,
}

impl<T> CacheCollection<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    /// Create an empty collection backed by `path`; nothing is read until
    /// [`read_all`](Self::read_all)
    pub fn new<P: AsRef<Utf8Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            entries: DashMap::new(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Look up a record
    pub fn get(&self, id: &str) -> Option<T> {
        self.entries.get(id).map(|entry| entry.value().clone())
    }

    /// Update memory only; persist with [`write_record`](Self::write_record)
    pub fn set(&self, id: &str, record: T) -> Option<T> {
        self.entries.insert(id.to_string(), record)
    }

    /// Update memory and append one record to the log
    pub async fn write_record(&self, id: &str, record: T) -> CacheResult<()> {
        let _guard = self.write_lock.lock().await;
        self.append_locked(id, record).await
    }

    /// Read, change and append one record while holding the write lock,
    /// so concurrent updates of the same id never lose each other's changes
    pub async fn update<F>(&self, id: &str, f: F) -> CacheResult<T>
    where
        F: FnOnce(Option<T>) -> T,
    {
        let _guard = self.write_lock.lock().await;
        let record = f(self.get(id));
        self.append_locked(id, record.clone()).await?;
        Ok(record)
    }

    /// Delete from memory only; persist with [`write`](Self::write)
    pub fn remove(&self, id: &str) -> bool {
        self.entries.remove(id).is_some()
    }

    /// Delete a record and compact the log in one step
    pub async fn delete(&self, id: &str) -> CacheResult<bool> {
        let _guard = self.write_lock.lock().await;
        let removed = self.entries.remove(id).is_some();
        if removed {
            self.compact_locked().await?;
        }
        Ok(removed)
    }

    /// Rewrite the whole log from memory
    pub async fn write(&self) -> CacheResult<()> {
        let _guard = self.write_lock.lock().await;
        self.compact_locked().await
    }

    /// Replace every record and rewrite the log
    pub async fn write_all<I>(&self, records: I) -> CacheResult<()>
    where
        I: IntoIterator<Item = (String, T)>,
    {
        let _guard = self.write_lock.lock().await;
        self.entries.clear();
        for (id, record) in records {
            self.entries.insert(id, record);
        }
        self.compact_locked().await
    }

    /// Load the log into memory, replacing whatever was there.
    ///
    /// A damaged log never fails the load: records up to the first
    /// unreadable one (bad JSON or bad UTF-8) are kept, the damaged file is
    /// copied to `<file>.corrupt` and the log is compacted so later appends
    /// start on a clean line. A file that cannot be read at all is an error
    /// and leaves memory untouched.
    pub async fn read_all(&self) -> CacheResult<LoadOutcome> {
        let _guard = self.write_lock.lock().await;

        let content = match tokio::fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.entries.clear();
                return Ok(LoadOutcome::Missing);
            }
            Err(e) => return Err(TrocError::io(format!("Failed to read {}", self.path), e)),
        };

        let (records, damage) = parse_log::<T>(&content);
        self.entries.clear();
        let count = records.len();
        for record in records {
            self.entries.insert(record.id, record.record);
        }

        match damage {
            None => {
                debug!(path = %self.path, records = count, "loaded cache log");
                Ok(LoadOutcome::Clean { records: count })
            }
            Some(dropped_bytes) => {
                warn!(
                    path = %self.path,
                    records = count,
                    dropped_bytes,
                    "cache log damaged, keeping records before the damage"
                );
                self.backup_damaged().await;
                self.compact_locked().await?;
                Ok(LoadOutcome::Recovered { records: count, dropped_bytes })
            }
        }
    }

    /// Number of records in memory
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of every id
    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Caller holds `write_lock`
    async fn append_locked(&self, id: &str, record: T) -> CacheResult<()> {
        let line = encode_record(id, &record)?;
        self.ensure_parent_dir().await?;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| TrocError::io(format!("Failed to open {}", self.path), e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| TrocError::io(format!("Failed to append to {}", self.path), e))?;
        file.flush()
            .await
            .map_err(|e| TrocError::io(format!("Failed to flush {}", self.path), e))?;

        self.entries.insert(id.to_string(), record);
        Ok(())
    }

    async fn ensure_parent_dir(&self) -> CacheResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| TrocError::io(format!("Failed to create {}", parent), e))?;
        }
        Ok(())
    }

    /// Caller holds `write_lock`
    async fn compact_locked(&self) -> CacheResult<()> {
        let content = self.render()?;

        self.ensure_parent_dir().await?;
        let tmp_path = Utf8PathBuf::from(format!("{}.tmp", self.path));
        tokio::fs::write(&tmp_path, content.as_bytes())
            .await
            .map_err(|e| TrocError::io(format!("Failed to write {}", tmp_path), e))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| TrocError::io(format!("Failed to replace {}", self.path), e))?;

        debug!(path = %self.path, records = self.entries.len(), "compacted cache log");
        Ok(())
    }

    fn render(&self) -> CacheResult<String> {
        let mut content = String::new();
        for entry in self.entries.iter() {
            content.push_str(&encode_record(entry.key(), entry.value())?);
        }
        Ok(content)
    }

    async fn backup_damaged(&self) {
        let backup = format!("{}.corrupt", self.path);
        if let Err(e) = tokio::fs::copy(&self.path, &backup).await {
            warn!(path = %self.path, error = %e, "failed to back up damaged cache log");
        }
    }
}

fn encode_record<T: Serialize>(id: &str, record: &T) -> CacheResult<String> {
    let line = serde_json::to_string(&LogRecordRef { id, record })
        .map_err(|e| TrocError::json("Failed to serialize cache record", e))?;
    Ok(format!("{}{}", line, RECORD_SEPARATOR))
}

/// Parse a log. Returns the readable records and, if the log was damaged,
/// how many trailing bytes were dropped.
fn parse_log<T: DeserializeOwned>(content: &[u8]) -> (Vec<LogRecord<T>>, Option<usize>) {
    if let Ok(text) = std::str::from_utf8(content) {
        let body = text.trim_end();
        let body = body.strip_suffix(',').unwrap_or(body);
        if body.is_empty() {
            return (Vec::new(), None);
        }

        let wrapped = format!("{{\"json\":[{}]}}", body);
        if let Ok(log) = serde_json::from_str::<WrappedLog<T>>(&wrapped) {
            return (log.json, None);
        }
    }

    // Salvage record by record up to the first unreadable line
    let mut records = Vec::new();
    let mut consumed = 0;
    for line in content.split_inclusive(|byte| *byte == b'\n') {
        let Ok(text) = std::str::from_utf8(line) else {
            break;
        };
        let trimmed = text.trim();
        let trimmed = trimmed.strip_suffix(',').unwrap_or(trimmed);
        if trimmed.is_empty() {
            consumed += line.len();
            continue;
        }
        match serde_json::from_str::<LogRecord<T>>(trimmed) {
            Ok(record) => {
                records.push(record);
                consumed += line.len();
            }
            Err(_) => break,
        }
    }

    (records, Some(content.len() - consumed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        text: String,
    }

    fn note(text: &str) -> Note {
        Note { text: text.to_string() }
    }

    fn log_path(dir: &tempfile::TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().join("nested").join("notes.json")).unwrap()
    }

    #[tokio::test]
    async fn test_append_and_read_back() {
        let temp_dir = tempdir().unwrap();
        let path = log_path(&temp_dir);

        let collection = CacheCollection::new(&path);
        collection.write_record("r1", note("one")).await.unwrap();
        collection.write_record("r2", note("two")).await.unwrap();
        collection.write_record("r3", note("three")).await.unwrap();

        let fresh = CacheCollection::<Note>::new(&path);
        let outcome = fresh.read_all().await.unwrap();
        assert_eq!(outcome, LoadOutcome::Clean { records: 3 });
        assert_eq!(fresh.get("r1"), Some(note("one")));
        assert_eq!(fresh.get("r2"), Some(note("two")));
        assert_eq!(fresh.get("r3"), Some(note("three")));
    }

    #[tokio::test]
    async fn test_log_format() {
        let temp_dir = tempdir().unwrap();
        let path = log_path(&temp_dir);

        let collection = CacheCollection::new(&path);
        collection.write_record("r1", note("one")).await.unwrap();

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(content, "{\"id\":\"r1\",\"record\":{\"text\":\"one\"}},\n");
    }

    #[tokio::test]
    async fn test_later_records_win() {
        let temp_dir = tempdir().unwrap();
        let path = log_path(&temp_dir);

        let collection = CacheCollection::new(&path);
        collection.write_record("r1", note("old")).await.unwrap();
        collection.write_record("r1", note("new")).await.unwrap();

        let fresh = CacheCollection::<Note>::new(&path);
        fresh.read_all().await.unwrap();
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh.get("r1"), Some(note("new")));
    }

    #[tokio::test]
    async fn test_truncated_log_keeps_earlier_records() {
        let temp_dir = tempdir().unwrap();
        let path = log_path(&temp_dir);

        let collection = CacheCollection::new(&path);
        collection.write_record("r1", note("one")).await.unwrap();
        collection.write_record("r2", note("two")).await.unwrap();

        // Simulate a process killed mid-append
        let mut content = tokio::fs::read_to_string(&path).await.unwrap();
        content.push_str("{\"id\":\"r3\",\"rec");
        tokio::fs::write(&path, &content).await.unwrap();

        let fresh = CacheCollection::<Note>::new(&path);
        let outcome = fresh.read_all().await.unwrap();
        assert!(matches!(outcome, LoadOutcome::Recovered { records: 2, .. }));
        assert_eq!(fresh.get("r2"), Some(note("two")));
        assert_eq!(fresh.get("r3"), None);

        let backup = Utf8PathBuf::from(format!("{}.corrupt", path));
        assert!(backup.exists());

        // The compacted log accepts appends again
        fresh.write_record("r3", note("three")).await.unwrap();
        let again = CacheCollection::<Note>::new(&path);
        assert_eq!(again.read_all().await.unwrap(), LoadOutcome::Clean { records: 3 });
    }

    #[tokio::test]
    async fn test_non_utf8_tail_keeps_earlier_records() {
        let temp_dir = tempdir().unwrap();
        let path = log_path(&temp_dir);

        let collection = CacheCollection::new(&path);
        collection.write_record("old", note("one")).await.unwrap();

        let mut content = tokio::fs::read(&path).await.unwrap();
        let clean_len = content.len();
        content.extend_from_slice(b"{\"id\":\"x\xff");
        tokio::fs::write(&path, &content).await.unwrap();

        let restarted = CacheCollection::<Note>::new(&path);
        let outcome = restarted.read_all().await.unwrap();
        assert_eq!(outcome, LoadOutcome::Recovered { records: 1, dropped_bytes: content.len() - clean_len });
        assert_eq!(restarted.get("old"), Some(note("one")));

        let backup = Utf8PathBuf::from(format!("{}.corrupt", path));
        assert_eq!(tokio::fs::read(&backup).await.unwrap(), content);

        restarted.write_record("new", note("two")).await.unwrap();

        let again = CacheCollection::<Note>::new(&path);
        assert_eq!(again.read_all().await.unwrap(), LoadOutcome::Clean { records: 2 });
        assert_eq!(again.get("old"), Some(note("one")));
        assert_eq!(again.get("new"), Some(note("two")));
    }

    #[tokio::test]
    async fn test_unreadable_log_is_an_error() {
        let temp_dir = tempdir().unwrap();
        let path = log_path(&temp_dir);
        // A directory where the log should be cannot be read as a file
        tokio::fs::create_dir_all(&path).await.unwrap();

        let collection = CacheCollection::<Note>::new(&path);
        collection.set("kept", note("memory"));
        assert!(collection.read_all().await.is_err());
        assert_eq!(collection.get("kept"), Some(note("memory")));
    }

    #[tokio::test]
    async fn test_update_sees_concurrent_changes() {
        let temp_dir = tempdir().unwrap();
        let path = log_path(&temp_dir);
        let collection = std::sync::Arc::new(CacheCollection::<Note>::new(&path));

        let mut handles = Vec::new();
        for i in 0..10 {
            let collection = collection.clone();
            handles.push(tokio::spawn(async move {
                collection
                    .update("shared", |current| {
                        let mut text = current.map(|n| n.text).unwrap_or_default();
                        text.push_str(&i.to_string());
                        note(&text)
                    })
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let fresh = CacheCollection::<Note>::new(&path);
        fresh.read_all().await.unwrap();
        let text = fresh.get("shared").unwrap().text;
        assert_eq!(text.len(), 10);
        for i in 0..10 {
            assert!(text.contains(&i.to_string()));
        }
    }

    #[tokio::test]
    async fn test_garbage_log_is_empty() {
        let temp_dir = tempdir().unwrap();
        let path = log_path(&temp_dir);
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(&path, "not json at all").await.unwrap();

        let collection = CacheCollection::<Note>::new(&path);
        let outcome = collection.read_all().await.unwrap();
        assert!(matches!(outcome, LoadOutcome::Recovered { records: 0, .. }));
        assert!(collection.is_empty());
    }

    #[tokio::test]
    async fn test_missing_log() {
        let temp_dir = tempdir().unwrap();
        let collection = CacheCollection::<Note>::new(log_path(&temp_dir));
        assert_eq!(collection.read_all().await.unwrap(), LoadOutcome::Missing);
        assert!(collection.is_empty());
    }

    #[tokio::test]
    async fn test_remove_requires_rewrite() {
        let temp_dir = tempdir().unwrap();
        let path = log_path(&temp_dir);

        let collection = CacheCollection::new(&path);
        collection.write_record("r1", note("one")).await.unwrap();
        collection.write_record("r2", note("two")).await.unwrap();

        assert!(collection.remove("r1"));
        assert!(!collection.remove("r1"));

        // Not yet persisted
        let stale = CacheCollection::<Note>::new(&path);
        stale.read_all().await.unwrap();
        assert!(stale.get("r1").is_some());

        collection.write().await.unwrap();
        let fresh = CacheCollection::<Note>::new(&path);
        fresh.read_all().await.unwrap();
        assert_eq!(fresh.get("r1"), None);
        assert_eq!(fresh.get("r2"), Some(note("two")));
    }

    #[tokio::test]
    async fn test_delete_and_write_all() {
        let temp_dir = tempdir().unwrap();
        let path = log_path(&temp_dir);

        let collection = CacheCollection::new(&path);
        collection.write_record("r1", note("one")).await.unwrap();
        assert!(collection.delete("r1").await.unwrap());
        assert!(!collection.delete("r1").await.unwrap());

        collection
            .write_all(vec![("a".to_string(), note("x")), ("b".to_string(), note("y"))])
            .await
            .unwrap();

        let fresh = CacheCollection::<Note>::new(&path);
        assert_eq!(fresh.read_all().await.unwrap(), LoadOutcome::Clean { records: 2 });
        let mut keys = fresh.keys();
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_concurrent_appends() {
        let temp_dir = tempdir().unwrap();
        let path = log_path(&temp_dir);
        let collection = std::sync::Arc::new(CacheCollection::new(&path));

        let mut handles = Vec::new();
        for i in 0..20 {
            let collection = collection.clone();
            handles.push(tokio::spawn(async move {
                collection.write_record(&format!("r{}", i), note("x")).await.unwrap();
                if i % 5 == 0 {
                    collection.write().await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let fresh = CacheCollection::<Note>::new(&path);
        assert_eq!(fresh.read_all().await.unwrap(), LoadOutcome::Clean { records: 20 });
    }
}
