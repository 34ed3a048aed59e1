//! Core data model for transfer tasks.
//!
//! This module defines the main data structures:
//! - FileDescriptor: one file of a game's file set, as seen at enumeration time
//! - TransferTask: one user-initiated operation over a game's file set
//! - TransferMode, TaskOptions, TaskSummary: what to do and what happened
//!
//! A task is shared by reference between all transfer workers, so every field
//! that changes during a run is atomic or behind a lock.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime};

use filetime::FileTime;
use uuid::Uuid;

use crate::layout::GameLayout;
use crate::strategy::Strategy;

/// A single file of a task's file set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    /// Absolute source path
    pub path: PathBuf,

    /// Byte length at enumeration time
    pub len: u64,

    /// Last-write time at enumeration time
    pub modified: SystemTime,
}

impl FileDescriptor {
    pub fn from_metadata(path: impl Into<PathBuf>, metadata: &std::fs::Metadata) -> Self {
        FileDescriptor {
            path: path.into(),
            len: metadata.len(),
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        }
    }

    /// Last-write time at filesystem precision, for "needs copy" comparisons.
    pub fn modified_filetime(&self) -> FileTime {
        FileTime::from_system_time(self.modified)
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// The operation a task performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    /// Copy files; source remains unchanged
    Copy,
    /// Copy files, deleting each source file once its copy is complete
    Move,
    /// Pack the file set into a single archive in the target library
    CompressInto,
    /// Unpack the source archive into plain files in the target library
    DecompressFrom,
}

impl std::fmt::Display for TransferMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferMode::Copy => write!(f, "Copy"),
            TransferMode::Move => write!(f, "Move"),
            TransferMode::CompressInto => write!(f, "Compress"),
            TransferMode::DecompressFrom => write!(f, "Decompress"),
        }
    }
}

impl TransferMode {
    /// Whether the game should end up as an archive in the target library.
    pub fn wants_compressed(&self, source_compressed: bool) -> bool {
        match self {
            TransferMode::CompressInto => true,
            TransferMode::DecompressFrom => false,
            TransferMode::Copy | TransferMode::Move => source_compressed,
        }
    }

    pub fn removes_source(&self) -> bool {
        matches!(self, TransferMode::Move)
    }
}

/// Which sub-groups of a game's files a task covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskOptions {
    pub include_downloads: bool,
    pub include_workshop: bool,
    /// Emit a task log line for every file handled
    pub report_file_movement: bool,
}

impl Default for TaskOptions {
    fn default() -> Self {
        TaskOptions {
            include_downloads: true,
            include_workshop: true,
            report_file_movement: false,
        }
    }
}

/// Stopwatch that accumulates running time across start/stop pairs.
#[derive(Debug, Default)]
pub struct Stopwatch {
    started: Option<Instant>,
    accumulated: Duration,
}

impl Stopwatch {
    pub fn start(&mut self) {
        if self.started.is_none() {
            self.started = Some(Instant::now());
        }
    }

    pub fn stop(&mut self) {
        if let Some(started) = self.started.take() {
            self.accumulated += started.elapsed();
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.accumulated + self.started.map(|s| s.elapsed()).unwrap_or_default()
    }
}

/// One user-initiated transfer operation.
///
/// Created by [`crate::job::create_task`], filled by
/// [`crate::job::plan_task`], and driven by [`crate::job::run_task`]. After
/// `completed` is set the task is read-only.
#[derive(Debug)]
pub struct TransferTask {
    /// Unique identifier for this task
    pub id: Uuid,

    pub mode: TransferMode,

    /// Chosen once from the source state and the mode
    pub strategy: Strategy,

    pub options: TaskOptions,

    /// The game in its source library
    pub game: GameLayout,

    /// Library folder the source paths are rewritten from
    pub source_root: PathBuf,

    /// Library folder the target paths are rewritten to
    pub target_root: PathBuf,

    /// File set resolved once by planning
    pub files: Vec<FileDescriptor>,

    pub total_file_count: usize,

    pub total_bytes: u64,

    /// Set by planning; running an unplanned task is rejected
    pub planned: bool,

    pub(crate) moved_bytes: AtomicU64,
    pub(crate) status: Mutex<String>,
    pub(crate) error: AtomicBool,
    pub(crate) active: AtomicBool,
    pub(crate) completed: AtomicBool,
    pub(crate) started: AtomicBool,
    pub(crate) elapsed: Mutex<Stopwatch>,
}

impl TransferTask {
    pub(crate) fn new(
        game: GameLayout,
        target_root: PathBuf,
        mode: TransferMode,
        options: TaskOptions,
    ) -> Self {
        let strategy = crate::strategy::select_strategy(
            game.compressed,
            mode.wants_compressed(game.compressed),
        );
        TransferTask {
            id: Uuid::new_v4(),
            mode,
            strategy,
            options,
            source_root: game.library.clone(),
            game,
            target_root,
            files: Vec::new(),
            total_file_count: 0,
            total_bytes: 0,
            planned: false,
            moved_bytes: AtomicU64::new(0),
            status: Mutex::new(String::new()),
            error: AtomicBool::new(false),
            active: AtomicBool::new(false),
            completed: AtomicBool::new(false),
            started: AtomicBool::new(false),
            elapsed: Mutex::new(Stopwatch::default()),
        }
    }

    /// The same game laid out in the target library.
    pub fn target_game(&self) -> GameLayout {
        let compressed = self.mode.wants_compressed(self.game.compressed);
        self.game.relocated(self.target_root.clone(), compressed)
    }

    /// Rewrite a source path into its target path.
    pub fn target_path_for(&self, source: &Path) -> Option<PathBuf> {
        crate::layout::rebase(source, &self.source_root, &self.target_root)
    }

    pub fn moved_bytes(&self) -> u64 {
        self.moved_bytes.load(Ordering::Acquire)
    }

    pub(crate) fn credit(&self, bytes: u64) -> u64 {
        self.moved_bytes.fetch_add(bytes, Ordering::AcqRel) + bytes
    }

    /// Percentage of `total_bytes` moved so far, in `0.0..=100.0`.
    pub fn percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return if self.is_completed() { 100.0 } else { 0.0 };
        }
        (self.moved_bytes() as f64 / self.total_bytes as f64 * 100.0).min(100.0)
    }

    pub fn status(&self) -> String {
        self.status
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    pub(crate) fn set_status(&self, text: impl Into<String>) {
        if let Ok(mut status) = self.status.lock() {
            *status = text.into();
        }
    }

    pub fn is_errored(&self) -> bool {
        self.error.load(Ordering::Acquire)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
            .lock()
            .map(|w| w.elapsed())
            .unwrap_or_default()
    }

    pub(crate) fn start_clock(&self) {
        if let Ok(mut watch) = self.elapsed.lock() {
            watch.start();
        }
    }

    pub(crate) fn stop_clock(&self) {
        if let Ok(mut watch) = self.elapsed.lock() {
            watch.stop();
        }
    }

    pub(crate) fn mark_active(&self) {
        self.active.store(true, Ordering::Release);
    }

    pub(crate) fn mark_succeeded(&self) {
        self.active.store(false, Ordering::Release);
        self.completed.store(true, Ordering::Release);
    }

    pub(crate) fn mark_failed(&self) {
        self.error.store(true, Ordering::Release);
        self.active.store(false, Ordering::Release);
        self.completed.store(true, Ordering::Release);
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSummary {
    pub strategy: Strategy,
    /// Files whose bytes were actually written
    pub files_transferred: usize,
    /// Files already present with matching length and timestamp
    pub files_skipped: usize,
    pub bytes_moved: u64,
    pub elapsed: Duration,
}

impl TaskSummary {
    /// Average throughput in MB/s (1 MB = 1024 * 1024 bytes).
    pub fn average_speed_mb(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= f64::EPSILON {
            return 0.0;
        }
        self.bytes_moved as f64 / 1024.0 / 1024.0 / secs
    }

    pub fn average_file_size(&self) -> u64 {
        let files = self.files_transferred + self.files_skipped;
        if files == 0 {
            0
        } else {
            self.bytes_moved / files as u64
        }
    }
}
