//! Versioned file snapshots.
//!
//! Snapshots live in a hidden directory at the workspace root that mirrors
//! each file's relative path, one `<name>.<YYYYMMDD_HHMMSS>.bak` copy per
//! snapshot. A JSON index maps every relative path to its snapshot records in
//! insertion order. The index is loaded and saved around each operation under
//! an exclusive advisory lock; nothing is cached between calls.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Component, Path, PathBuf};

use chrono::{Local, TimeZone};
use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::config::RemedyConfig;
use crate::error::{RemedyError, Result};

/// Tool name recorded for the safety snapshot taken before every restore.
pub const PRERESTORE_TOOL: &str = "prerestore";

/// Tool name recorded for snapshots requested explicitly.
pub const MANUAL_TOOL: &str = "manual_backup";

const BACKUP_SUFFIX: &str = "bak";
const LABEL_FORMAT: &str = "%Y%m%d_%H%M%S";
const LOCK_FILE: &str = ".index.lock";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One immutable snapshot of a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupRecord {
    /// Workspace-relative path of the original file; the index key.
    #[serde(skip)]
    pub relative_path: String,
    /// Absolute path of the snapshot copy.
    #[serde(rename = "path")]
    pub backup_path: PathBuf,
    /// Sortable `YYYYMMDD_HHMMSS` label, with a `_N` suffix when several
    /// snapshots of one file land in the same second.
    #[serde(rename = "timestamp")]
    pub label: String,
    /// Seconds since the Unix epoch, with sub-second precision.
    pub created: f64,
    #[serde(default = "unknown_tool")]
    pub tool: String,
}

fn unknown_tool() -> String {
    "unknown".to_string()
}

impl BackupRecord {
    /// Creation time rendered in local time.
    pub fn readable_time(&self) -> String {
        let secs = self.created.floor() as i64;
        match Local.timestamp_opt(secs, 0).single() {
            Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => self.label.clone(),
        }
    }
}

/// Relative path -> snapshot records, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackupIndex {
    entries: BTreeMap<String, Vec<BackupRecord>>,
}

impl BackupIndex {
    /// Load the index document, or an empty index when it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(RemedyError::io(path, e)),
        };
        let mut index: Self = serde_json::from_str(&raw)?;
        for (key, records) in index.entries.iter_mut() {
            for record in records.iter_mut() {
                record.relative_path = key.clone();
            }
        }
        Ok(index)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(path, json.as_bytes())
    }

    pub fn append(&mut self, record: BackupRecord) {
        self.entries
            .entry(record.relative_path.clone())
            .or_default()
            .push(record);
    }

    /// Records for one file, newest first. Ties on `created` keep the later
    /// insertion first.
    pub fn records(&self, relative_path: &str) -> Vec<BackupRecord> {
        let Some(records) = self.entries.get(relative_path) else {
            return Vec::new();
        };
        let mut indexed: Vec<(usize, &BackupRecord)> = records.iter().enumerate().collect();
        indexed.sort_by(|(ia, a), (ib, b)| b.created.total_cmp(&a.created).then(ib.cmp(ia)));
        indexed.into_iter().map(|(_, r)| r.clone()).collect()
    }
}

/// What a successful restore did.
#[derive(Debug, Clone, PartialEq)]
pub struct RestoreOutcome {
    /// The snapshot whose content now lives at the original path.
    pub restored: BackupRecord,
    /// The snapshot of the pre-restore content.
    pub safety: BackupRecord,
}

// ---------------------------------------------------------------------------
// BackupStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct BackupStore {
    workspace: PathBuf,
    backup_dir: String,
    index_file: String,
}

impl BackupStore {
    pub fn new(workspace: impl Into<PathBuf>, backup_dir: &str, index_file: &str) -> Self {
        Self {
            workspace: workspace.into(),
            backup_dir: backup_dir.to_string(),
            index_file: index_file.to_string(),
        }
    }

    pub fn from_config(cfg: &RemedyConfig) -> Self {
        Self::new(cfg.workspace.clone(), &cfg.backup_dir, &cfg.index_file)
    }

    /// Snapshot `file` and record it under `tool`.
    pub fn create(&self, file: &Path, tool: &str) -> Result<BackupRecord> {
        let root = self.root()?;
        let source = self.absolute(&root, file);
        if !source.exists() {
            return Err(RemedyError::NotFound(source));
        }
        if !source.is_file() {
            return Err(RemedyError::NotAFile(source));
        }
        let relative_path = self.relative_key(&root, &source)?;
        let backup_root = root.join(&self.backup_dir);
        fs::create_dir_all(&backup_root).map_err(|e| RemedyError::io(&backup_root, e))?;

        let _lock = IndexLock::acquire(&backup_root, true)?;
        let now = Local::now();
        let base_label = now.format(LABEL_FORMAT).to_string();
        let (label, backup_path) = free_snapshot_path(&backup_root, &relative_path, &base_label);
        if let Some(parent) = backup_path.parent() {
            fs::create_dir_all(parent).map_err(|e| RemedyError::io(parent, e))?;
        }
        fs::copy(&source, &backup_path).map_err(|e| RemedyError::io(&backup_path, e))?;

        let record = BackupRecord {
            relative_path: relative_path.clone(),
            backup_path: backup_path.clone(),
            label,
            created: now.timestamp_micros() as f64 / 1_000_000.0,
            tool: tool.to_string(),
        };

        let index_path = backup_root.join(&self.index_file);
        let persisted = BackupIndex::load(&index_path).and_then(|mut index| {
            index.append(record.clone());
            index.save(&index_path)
        });
        if let Err(e) = persisted {
            let _ = fs::remove_file(&backup_path);
            return Err(e);
        }

        tracing::info!("created backup of {relative_path} at {} ({tool})", record.label);
        Ok(record)
    }

    /// Snapshots of `file`, newest first. Empty when none were ever taken.
    pub fn list(&self, file: &Path) -> Result<Vec<BackupRecord>> {
        let root = self.root()?;
        let relative_path = self.relative_key(&root, &self.absolute(&root, file))?;
        let backup_root = root.join(&self.backup_dir);
        if !backup_root.is_dir() {
            return Ok(Vec::new());
        }
        let _lock = IndexLock::acquire(&backup_root, false)?;
        let index = BackupIndex::load(&backup_root.join(&self.index_file))?;
        Ok(index.records(&relative_path))
    }

    /// Overwrite `file` with one of its snapshots.
    ///
    /// `version` is 1-based over [`list`](Self::list) order; `None` picks the
    /// newest. The current content is always snapshotted first, before the
    /// version is validated, so a restore never loses state.
    pub fn restore(&self, file: &Path, version: Option<usize>) -> Result<RestoreOutcome> {
        let records = self.list(file)?;
        if records.is_empty() {
            return Err(RemedyError::NoBackups(file.display().to_string()));
        }

        let safety = self.create(file, PRERESTORE_TOOL)?;

        let chosen = match version {
            None => &records[0],
            Some(v) if (1..=records.len()).contains(&v) => &records[v - 1],
            Some(v) => {
                return Err(RemedyError::InvalidVersion {
                    requested: v,
                    available: records.len(),
                })
            }
        };
        if !chosen.backup_path.is_file() {
            return Err(RemedyError::MissingBackupFile(chosen.backup_path.clone()));
        }

        let root = self.root()?;
        let target = self.absolute(&root, file);
        let bytes = fs::read(&chosen.backup_path).map_err(|e| RemedyError::io(&chosen.backup_path, e))?;
        write_atomic(&target, &bytes)?;

        tracing::info!(
            "restored {} from backup {} (created by {})",
            chosen.relative_path,
            chosen.label,
            chosen.tool
        );
        Ok(RestoreOutcome {
            restored: chosen.clone(),
            safety,
        })
    }

    // -- helpers -----------------------------------------------------------

    fn root(&self) -> Result<PathBuf> {
        self.workspace
            .canonicalize()
            .map_err(|e| RemedyError::io(&self.workspace, e))
    }

    fn absolute(&self, root: &Path, file: &Path) -> PathBuf {
        let joined = if file.is_absolute() {
            file.to_path_buf()
        } else {
            root.join(file)
        };
        joined.canonicalize().unwrap_or(joined)
    }

    fn relative_key(&self, root: &Path, absolute: &Path) -> Result<String> {
        let outside = || RemedyError::OutsideWorkspace {
            path: absolute.to_path_buf(),
            workspace: root.to_path_buf(),
        };
        let relative = absolute
            .strip_prefix(root)
            .or_else(|_| absolute.strip_prefix(&self.workspace))
            .map_err(|_| outside())?;
        let mut parts = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
                Component::CurDir => {}
                _ => return Err(outside()),
            }
        }
        if parts.is_empty() || parts[0] == self.backup_dir {
            return Err(outside());
        }
        Ok(parts.join("/"))
    }
}

/// Pick `<relative>.<label>.bak`, adding `_N` to the label until unused.
fn free_snapshot_path(backup_root: &Path, relative_path: &str, base_label: &str) -> (String, PathBuf) {
    let mut label = base_label.to_string();
    let mut n = 1;
    loop {
        let path = backup_root.join(format!("{relative_path}.{label}.{BACKUP_SUFFIX}"));
        if !path.exists() {
            return (label, path);
        }
        label = format!("{base_label}_{n}");
        n += 1;
    }
}

/// Replace `path` with `bytes` via a sibling temp file and a rename, so the
/// target is either fully rewritten or left as it was.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = path.with_file_name(format!(".{file_name}.remedy-tmp"));
    fs::write(&tmp_path, bytes).map_err(|e| RemedyError::io(&tmp_path, e))?;
    if let Ok(meta) = fs::metadata(path) {
        let _ = fs::set_permissions(&tmp_path, meta.permissions());
    }
    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(RemedyError::io(path, e));
    }
    Ok(())
}

/// Advisory lock over the index document, released on drop.
struct IndexLock {
    file: File,
}

impl IndexLock {
    fn acquire(backup_root: &Path, exclusive: bool) -> Result<Self> {
        let lock_path = backup_root.join(LOCK_FILE);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| RemedyError::io(&lock_path, e))?;
        let locked = if exclusive {
            FileExt::lock_exclusive(&file)
        } else {
            FileExt::lock_shared(&file)
        };
        locked.map_err(|e| RemedyError::io(&lock_path, e))?;
        Ok(Self { file })
    }
}

impl Drop for IndexLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn store() -> (tempfile::TempDir, BackupStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = BackupStore::new(dir.path(), ".mcp_backups", "backup_index.json");
        (dir, store)
    }

    fn write(dir: &Path, rel: &str, content: &str) -> PathBuf {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn create_copies_content_and_records_index_entry() {
        let (dir, store) = store();
        let file = write(dir.path(), "pkg/node.py", "print('hi')\n");

        let record = store.create(&file, "fix_flake8").unwrap();
        assert_eq!(record.relative_path, "pkg/node.py");
        assert_eq!(record.tool, "fix_flake8");
        assert_eq!(record.label.len(), "YYYYMMDD_HHMMSS".len());
        assert!(record.backup_path.is_absolute());
        assert!(record.backup_path.starts_with(dir.path().canonicalize().unwrap().join(".mcp_backups/pkg")));
        assert_eq!(fs::read_to_string(&record.backup_path).unwrap(), "print('hi')\n");

        let raw = fs::read_to_string(dir.path().join(".mcp_backups/backup_index.json")).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let entry = &doc["pkg/node.py"][0];
        assert_eq!(entry["timestamp"], record.label.as_str());
        assert_eq!(entry["tool"], "fix_flake8");
        assert!(entry["created"].is_f64());
        assert!(entry["path"].is_string());
    }

    #[test]
    fn create_accepts_workspace_relative_paths() {
        let (dir, store) = store();
        write(dir.path(), "a.py", "x\n");
        let record = store.create(Path::new("a.py"), MANUAL_TOOL).unwrap();
        assert_eq!(record.relative_path, "a.py");
    }

    #[test]
    fn create_missing_file_is_not_found_and_appends_nothing() {
        let (dir, store) = store();
        let err = store.create(&dir.path().join("gone.py"), MANUAL_TOOL).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(store.list(&dir.path().join("gone.py")).unwrap().is_empty());
    }

    #[test]
    fn create_outside_workspace_is_rejected() {
        let (_dir, store) = store();
        let other = tempfile::tempdir().unwrap();
        let file = write(other.path(), "x.py", "x\n");
        let err = store.create(&file, MANUAL_TOOL).unwrap_err();
        assert!(matches!(err, RemedyError::OutsideWorkspace { .. }));
    }

    #[test]
    fn list_without_index_is_empty() {
        let (dir, store) = store();
        let file = write(dir.path(), "a.py", "x\n");
        assert!(store.list(&file).unwrap().is_empty());
    }

    #[test]
    fn repeated_snapshots_get_distinct_labels_newest_first() {
        let (dir, store) = store();
        let file = write(dir.path(), "a.py", "one\n");
        let first = store.create(&file, MANUAL_TOOL).unwrap();
        fs::write(&file, "two\n").unwrap();
        let second = store.create(&file, MANUAL_TOOL).unwrap();

        assert_ne!(first.label, second.label);
        assert_ne!(first.backup_path, second.backup_path);

        let listed = store.list(&file).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].backup_path, second.backup_path);
        assert_eq!(listed[1].backup_path, first.backup_path);
    }

    #[test]
    fn list_sorts_by_created_regardless_of_storage_order() {
        let (dir, store) = store();
        let file = write(dir.path(), "a.py", "x\n");
        let backup_root = dir.path().join(".mcp_backups");
        fs::create_dir_all(&backup_root).unwrap();
        fs::write(
            backup_root.join("backup_index.json"),
            r#"{"a.py": [
                {"path": "/b/2", "timestamp": "20240102_000000", "created": 200.0, "tool": "t"},
                {"path": "/b/3", "timestamp": "20240103_000000", "created": 300.0},
                {"path": "/b/1", "timestamp": "20240101_000000", "created": 100.0, "tool": "t"}
            ]}"#,
        )
        .unwrap();

        let listed = store.list(&file).unwrap();
        let created: Vec<f64> = listed.iter().map(|r| r.created).collect();
        assert_eq!(created, vec![300.0, 200.0, 100.0]);
        assert_eq!(listed[0].tool, "unknown");
        assert_eq!(listed[0].relative_path, "a.py");
    }

    #[test]
    fn restore_version_reproduces_kth_newest_content() {
        let (dir, store) = store();
        let file = write(dir.path(), "a.py", "v1\n");
        store.create(&file, MANUAL_TOOL).unwrap();
        fs::write(&file, "v2\n").unwrap();
        store.create(&file, MANUAL_TOOL).unwrap();
        fs::write(&file, "v3\n").unwrap();
        store.create(&file, MANUAL_TOOL).unwrap();
        fs::write(&file, "live\n").unwrap();

        let outcome = store.restore(&file, Some(3)).unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), "v1\n");
        assert_eq!(outcome.safety.tool, PRERESTORE_TOOL);
        assert_eq!(fs::read_to_string(&outcome.safety.backup_path).unwrap(), "live\n");
    }

    #[test]
    fn restore_defaults_to_newest_and_adds_one_snapshot() {
        let (dir, store) = store();
        let file = write(dir.path(), "a.py", "old\n");
        store.create(&file, MANUAL_TOOL).unwrap();
        fs::write(&file, "new\n").unwrap();

        store.restore(&file, None).unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), "old\n");

        let listed = store.list(&file).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].tool, PRERESTORE_TOOL);
        assert_eq!(fs::read_to_string(&listed[0].backup_path).unwrap(), "new\n");
    }

    #[test]
    fn restore_invalid_version_keeps_file_but_still_snapshots() {
        let (dir, store) = store();
        let file = write(dir.path(), "a.py", "old\n");
        store.create(&file, MANUAL_TOOL).unwrap();
        fs::write(&file, "current\n").unwrap();

        for bad in [0, 2] {
            let err = store.restore(&file, Some(bad)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidVersion);
        }
        assert_eq!(fs::read_to_string(&file).unwrap(), "current\n");
        assert_eq!(store.list(&file).unwrap().len(), 3);
    }

    #[test]
    fn restore_without_backups_fails_without_snapshot() {
        let (dir, store) = store();
        let file = write(dir.path(), "a.py", "x\n");
        let err = store.restore(&file, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoBackups);
        assert!(store.list(&file).unwrap().is_empty());
    }

    #[test]
    fn restore_with_deleted_snapshot_is_missing_backup_file() {
        let (dir, store) = store();
        let file = write(dir.path(), "a.py", "x\n");
        let record = store.create(&file, MANUAL_TOOL).unwrap();
        fs::remove_file(&record.backup_path).unwrap();

        let err = store.restore(&file, Some(1)).unwrap_err();
        assert!(matches!(err, RemedyError::MissingBackupFile(_)));
        assert_eq!(fs::read_to_string(&file).unwrap(), "x\n");
    }

    #[test]
    fn snapshots_of_backup_dir_are_refused() {
        let (dir, store) = store();
        let file = write(dir.path(), "a.py", "x\n");
        let record = store.create(&file, MANUAL_TOOL).unwrap();
        let err = store.create(&record.backup_path, MANUAL_TOOL).unwrap_err();
        assert!(matches!(err, RemedyError::OutsideWorkspace { .. }));
    }

    #[test]
    fn corrupt_index_is_reported() {
        let (dir, store) = store();
        let file = write(dir.path(), "a.py", "x\n");
        fs::create_dir_all(dir.path().join(".mcp_backups")).unwrap();
        fs::write(dir.path().join(".mcp_backups/backup_index.json"), "{broken").unwrap();
        let err = store.list(&file).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IoFailure);
    }

    #[test]
    fn write_atomic_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        fs::write(&path, "before").unwrap();
        write_atomic(&path, b"after").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "after");
        assert!(!dir.path().join(".f.txt.remedy-tmp").exists());
    }
}
