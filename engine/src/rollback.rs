//! Rollback ledger and sweep.
//!
//! Every file a run writes and every directory it creates is appended to the
//! [`TransferRecord`]. After a fatal error or a cancellation the operator is
//! asked whether to delete them; nothing is removed without a "yes".

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::confirm::Confirm;
use crate::error::{EngineError, ErrorKind};
use crate::progress::{Event, EventCategory, EventLog};

/// Append-only ledger of artifacts written during one run.
#[derive(Debug, Default)]
pub struct TransferRecord {
    files: Mutex<BTreeSet<PathBuf>>,
    directories: Mutex<BTreeSet<PathBuf>>,
}

impl TransferRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_file(&self, path: impl Into<PathBuf>) {
        if let Ok(mut files) = self.files.lock() {
            files.insert(path.into());
        }
    }

    /// Drop a file from the ledger. Used once a moved file's source is gone
    /// and the target is the only copy left.
    pub fn forget_file(&self, path: &Path) {
        if let Ok(mut files) = self.files.lock() {
            files.remove(path);
        }
    }

    pub fn record_directory(&self, path: impl Into<PathBuf>) {
        if let Ok(mut dirs) = self.directories.lock() {
            dirs.insert(path.into());
        }
    }

    pub fn files(&self) -> Vec<PathBuf> {
        self.files
            .lock()
            .map(|f| f.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn directories(&self) -> Vec<PathBuf> {
        self.directories
            .lock()
            .map(|d| d.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.files().is_empty() && self.directories().is_empty()
    }
}

/// Create every missing ancestor of `dir`, recording each one this call
/// actually created. A concurrent creator winning the race is not an error.
pub(crate) fn ensure_dir_recorded(dir: &Path, record: &TransferRecord) -> Result<(), EngineError> {
    if dir.is_dir() {
        return Ok(());
    }

    let mut missing = Vec::new();
    let mut cursor = Some(dir);
    while let Some(path) = cursor {
        if path.as_os_str().is_empty() || path.is_dir() {
            break;
        }
        missing.push(path.to_path_buf());
        cursor = path.parent();
    }

    for path in missing.into_iter().rev() {
        match fs::create_dir(&path) {
            Ok(()) => record.record_directory(path),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists && path.is_dir() => {}
            Err(err) => return Err(EngineError::from_io(&path, err)),
        }
    }
    Ok(())
}

/// What a confirmed sweep managed to remove.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollbackReport {
    pub files_removed: usize,
    pub directories_removed: usize,
    pub failures: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackOutcome {
    /// Nothing was recorded, so nothing was asked
    NothingToRemove,
    /// The operator kept the partial artifacts
    Declined,
    Swept(RollbackReport),
}

/// The question put to the operator for a failed run.
pub fn rollback_prompt(game_name: &str, err: &EngineError) -> String {
    let cause = match err.kind() {
        ErrorKind::Cancelled => "The operation was cancelled.".to_string(),
        ErrorKind::PermissionDenied => format!(
            "A file permission error happened while moving files. Running with elevated rights might help.\n\nError: {}.",
            err
        ),
        ErrorKind::FilesystemIo => format!(
            "A filesystem error happened while moving files.\n\nError: {}.",
            err
        ),
        _ => format!("An error happened while moving game files.\n\nError: {}.", err),
    };
    format!(
        "[{}] {}\n\nWould you like to remove files that were already written to the target library?",
        game_name, cause
    )
}

/// Ask whether to roll back, and sweep if the answer is yes.
pub fn offer_rollback(
    record: &TransferRecord,
    prompt: &str,
    confirm: &dyn Confirm,
    events: &dyn EventLog,
    context: &str,
) -> RollbackOutcome {
    if record.is_empty() {
        return RollbackOutcome::NothingToRemove;
    }
    if !confirm.confirm(prompt) {
        events.record(Event::info(
            EventCategory::TaskManager,
            context,
            "Rollback declined; partial files kept",
        ));
        return RollbackOutcome::Declined;
    }
    RollbackOutcome::Swept(sweep(record, events, context))
}

/// Delete every recorded file, then every recorded directory that ended up
/// empty, deepest first. Failures are logged and skipped.
pub fn sweep(record: &TransferRecord, events: &dyn EventLog, context: &str) -> RollbackReport {
    let mut report = RollbackReport::default();

    for file in record.files() {
        match remove_file_forced(&file) {
            Ok(true) => report.files_removed += 1,
            Ok(false) => {}
            Err(err) => {
                report.failures += 1;
                events.record(Event::warn(
                    EventCategory::App,
                    context,
                    format!("Failed to remove {}: {}", file.display(), err),
                ));
            }
        }
    }

    let mut dirs = record.directories();
    dirs.sort_by_key(|d| std::cmp::Reverse(d.components().count()));
    for dir in dirs {
        match fs::remove_dir(&dir) {
            Ok(()) => report.directories_removed += 1,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                // Non-empty directories hold files this run did not write.
                tracing::debug!(path = %dir.display(), error = %err, "directory kept during rollback");
            }
        }
    }

    events.record(Event::info(
        EventCategory::TaskManager,
        context,
        format!(
            "Rollback removed {} files and {} directories ({} failures)",
            report.files_removed, report.directories_removed, report.failures
        ),
    ));
    report
}

/// Remove a file, clearing the read-only attribute first. `Ok(false)` when
/// the file was already gone.
pub(crate) fn remove_file_forced(path: &Path) -> io::Result<bool> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };

    if metadata.permissions().readonly() {
        make_writable(path, metadata.permissions())?;
    }

    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

/// Give the owner write access and nothing more.
#[cfg(unix)]
fn make_writable(path: &Path, mut permissions: fs::Permissions) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    permissions.set_mode(permissions.mode() | 0o200);
    fs::set_permissions(path, permissions)
}

#[cfg(not(unix))]
fn make_writable(path: &Path, mut permissions: fs::Permissions) -> io::Result<()> {
    #[allow(clippy::permissions_set_readonly_false)]
    permissions.set_readonly(false);
    fs::set_permissions(path, permissions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confirm::FixedAnswer;
    use crate::progress::testing::RecordingLog;

    #[test]
    fn test_ensure_dir_records_only_new_directories() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let existing = dir.path().join("lib");
        fs::create_dir(&existing).expect("Failed to create dir");

        let record = TransferRecord::new();
        let target = existing.join("common/Game/bin");
        ensure_dir_recorded(&target, &record).expect("Failed to create dirs");

        assert!(target.is_dir());
        assert_eq!(
            record.directories(),
            vec![
                existing.join("common"),
                existing.join("common/Game"),
                existing.join("common/Game/bin"),
            ]
        );

        ensure_dir_recorded(&target, &record).expect("existing dir must be fine");
        assert_eq!(record.directories().len(), 3);
    }

    #[test]
    fn test_declined_rollback_keeps_files() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let file = dir.path().join("partial.bin");
        fs::write(&file, b"partial").expect("Failed to write file");

        let record = TransferRecord::new();
        record.record_file(&file);
        let log = RecordingLog::default();

        let outcome = offer_rollback(&record, "?", &FixedAnswer(false), &log, "ctx");
        assert_eq!(outcome, RollbackOutcome::Declined);
        assert!(file.exists());
    }

    #[test]
    fn test_empty_record_asks_nothing() {
        let record = TransferRecord::new();
        let log = RecordingLog::default();
        let outcome = offer_rollback(&record, "?", &FixedAnswer(true), &log, "ctx");
        assert_eq!(outcome, RollbackOutcome::NothingToRemove);
    }

    #[test]
    fn test_sweep_removes_files_and_empty_dirs_deepest_first() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let record = TransferRecord::new();
        let deep = dir.path().join("a/b/c");
        ensure_dir_recorded(&deep, &record).expect("Failed to create dirs");

        let written = deep.join("file.bin");
        fs::write(&written, b"x").expect("Failed to write file");
        record.record_file(&written);

        // A foreign file keeps its directory alive.
        let foreign = dir.path().join("a/keep.txt");
        fs::write(&foreign, b"keep").expect("Failed to write file");

        let log = RecordingLog::default();
        let outcome = offer_rollback(&record, "?", &FixedAnswer(true), &log, "ctx");

        assert_eq!(
            outcome,
            RollbackOutcome::Swept(RollbackReport {
                files_removed: 1,
                directories_removed: 2,
                failures: 0,
            })
        );
        assert!(!dir.path().join("a/b").exists());
        assert!(foreign.exists());
    }

    #[test]
    fn test_sweep_tolerates_already_missing_entries() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let record = TransferRecord::new();
        record.record_file(dir.path().join("never-written"));
        record.record_directory(dir.path().join("never-created"));

        let log = RecordingLog::default();
        let report = sweep(&record, &log, "ctx");
        assert_eq!(report, RollbackReport::default());
    }

    #[test]
    fn test_remove_file_forced_clears_readonly() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let file = dir.path().join("ro.txt");
        fs::write(&file, b"ro").expect("Failed to write file");
        let mut perms = fs::metadata(&file).unwrap().permissions();
        perms.set_readonly(true);
        fs::set_permissions(&file, perms).unwrap();

        assert!(remove_file_forced(&file).expect("Failed to remove"));
        assert!(!file.exists());
        assert!(!remove_file_forced(&file).expect("missing file is fine"));
    }

    #[cfg(unix)]
    #[test]
    fn test_make_writable_adds_owner_write_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let file = dir.path().join("ro.txt");
        fs::write(&file, b"ro").expect("Failed to write file");
        fs::set_permissions(&file, fs::Permissions::from_mode(0o444)).unwrap();

        make_writable(&file, fs::metadata(&file).unwrap().permissions()).expect("Failed to chmod");
        assert_eq!(fs::metadata(&file).unwrap().permissions().mode() & 0o777, 0o644);
    }

    #[test]
    fn test_forget_file_removes_only_that_entry() {
        let record = TransferRecord::new();
        record.record_file("/lib/a");
        record.record_file("/lib/b");
        record.forget_file(Path::new("/lib/a"));
        assert_eq!(record.files(), vec![PathBuf::from("/lib/b")]);
    }

    #[test]
    fn test_prompt_mentions_cause() {
        let prompt = rollback_prompt("Portal", &EngineError::Cancelled);
        assert!(prompt.starts_with("[Portal]"));
        assert!(prompt.contains("cancelled"));
    }
}
