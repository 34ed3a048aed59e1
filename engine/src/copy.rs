//! Direct file-for-file transfer.
//!
//! The file set is split into two lanes by size:
//! - the large lane runs strictly one file at a time, largest first, so big
//!   sequential reads never compete for the same disk
//! - the small lane runs on a bounded worker pool, also largest first
//!
//! Both lanes run at the same time. The first lane to fail halts the other at
//! its next checkpoint.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::thread;

use filetime::FileTime;
use rayon::prelude::*;
use walkdir::WalkDir;

use crate::error::{EngineError, EngineResult};
use crate::job::Run;
use crate::model::FileDescriptor;
use crate::progress::format_bytes;
use crate::rollback::{ensure_dir_recorded, remove_file_forced};
use crate::workers::run_bounded;

/// A file set partitioned for scheduling.
#[derive(Debug)]
pub struct Lanes<'a> {
    /// At or above the threshold; processed sequentially
    pub large: Vec<&'a FileDescriptor>,
    /// Below the threshold; processed in parallel
    pub small: Vec<&'a FileDescriptor>,
}

pub fn plan_lanes(files: &[FileDescriptor], threshold: u64) -> Lanes<'_> {
    let (mut large, mut small): (Vec<_>, Vec<_>) = files.iter().partition(|f| f.len >= threshold);
    large.sort_by(|a, b| b.len.cmp(&a.len));
    small.sort_by(|a, b| b.len.cmp(&a.len));
    Lanes { large, small }
}

pub(crate) fn run_direct(run: &Run<'_>) -> EngineResult<()> {
    let lanes = plan_lanes(&run.task.files, run.config.parallel_threshold);
    tracing::debug!(
        large = lanes.large.len(),
        small = lanes.small.len(),
        "lanes planned"
    );

    let (large, small) = thread::scope(|scope| {
        let large = scope.spawn(|| run_large_lane(run, &lanes.large));
        let small = run_small_lane(run, &lanes.small);
        (large.join(), small)
    });
    let large = large.unwrap_or_else(|panic| std::panic::resume_unwind(panic));

    merge_lane_results(large, small)?;
    if run.task.mode.removes_source() {
        prune_source_dirs(run);
    }
    Ok(())
}

fn run_large_lane(run: &Run<'_>, files: &[&FileDescriptor]) -> EngineResult<()> {
    for file in files {
        transfer_file(run, file).inspect_err(|_| run.control.halt())?;
    }
    Ok(())
}

fn run_small_lane(run: &Run<'_>, files: &[&FileDescriptor]) -> EngineResult<()> {
    if files.is_empty() {
        return Ok(());
    }
    run_bounded(run.config.small_lane_parallelism, "copy", || {
        files
            .par_iter()
            .try_for_each(|file| transfer_file(run, file).inspect_err(|_| run.control.halt()))
    })
}

/// A real failure beats the cancellation it caused in the sibling lane.
fn merge_lane_results(a: EngineResult<()>, b: EngineResult<()>) -> EngineResult<()> {
    match (a, b) {
        (Ok(()), Ok(())) => Ok(()),
        (Err(err), Ok(())) | (Ok(()), Err(err)) => Err(err),
        (Err(EngineError::Cancelled), Err(err)) | (Err(err), Err(_)) => Err(err),
    }
}

fn transfer_file(run: &Run<'_>, file: &FileDescriptor) -> EngineResult<()> {
    run.control.checkpoint()?;

    let target = run
        .task
        .target_path_for(&file.path)
        .ok_or_else(|| EngineError::InvalidTask {
            reason: format!("{} is outside the source library", file.path.display()),
        })?;

    if is_up_to_date(file, &target) {
        run.credit(file.len);
        run.note_skipped();
    } else {
        if let Some(parent) = target.parent() {
            ensure_dir_recorded(parent, run.record)?;
        }
        run.set_status(format!(
            "Copying: {} ({})",
            file.file_name(),
            format_bytes(file.len)
        ));
        let output = File::create(&target).map_err(|e| EngineError::from_io(&target, e))?;
        run.record.record_file(&target);

        let input = File::open(&file.path).map_err(|e| EngineError::from_io(&file.path, e))?;
        let mut buffer = vec![0u8; run.config.block_size];
        pump(input, output, &mut buffer, |read| {
            run.credit(read as u64);
            run.control.checkpoint()
        })
        .map_err(|e| e.into_engine_error(&file.path, &target))?;

        copy_times(file, &target)?;
        run.note_transferred();
    }

    if run.task.mode.removes_source() {
        remove_source(run, file, &target);
    }

    run.file_done(&format!("File moved: {}", target.display()));
    Ok(())
}

/// Same length and same last-write time as the enumerated source.
fn is_up_to_date(file: &FileDescriptor, target: &Path) -> bool {
    match fs::metadata(target) {
        Ok(metadata) => {
            metadata.is_file()
                && metadata.len() == file.len
                && FileTime::from_last_modification_time(&metadata) == file.modified_filetime()
        }
        Err(_) => false,
    }
}

/// Carry last-write and last-access time over to the copy, plus creation
/// time where the platform lets it be set.
fn copy_times(file: &FileDescriptor, target: &Path) -> EngineResult<()> {
    let source = fs::metadata(&file.path).ok();
    let accessed = source
        .as_ref()
        .map(FileTime::from_last_access_time)
        .unwrap_or_else(|| file.modified_filetime());
    filetime::set_file_times(target, accessed, file.modified_filetime())
        .map_err(|e| EngineError::from_io(target, e))?;

    if let Some(created) = source.and_then(|m| m.created().ok()) {
        set_created(target, created)?;
    }
    Ok(())
}

#[cfg(windows)]
fn set_created(target: &Path, created: std::time::SystemTime) -> EngineResult<()> {
    use std::os::windows::fs::FileTimesExt;

    let times = fs::FileTimes::new().set_created(created);
    fs::OpenOptions::new()
        .write(true)
        .open(target)
        .and_then(|f| f.set_times(times))
        .map_err(|e| EngineError::from_io(target, e))
}

// Creation (birth) time cannot be set on Unix filesystems.
#[cfg(not(windows))]
fn set_created(_target: &Path, _created: std::time::SystemTime) -> EngineResult<()> {
    Ok(())
}

/// Delete a moved source file and any source directories it leaves empty.
/// Failures are logged; the copy already succeeded.
///
/// Once the source is gone the target is the only copy, so it leaves the
/// rollback ledger.
fn remove_source(run: &Run<'_>, file: &FileDescriptor, target: &Path) {
    if let Err(err) = remove_file_forced(&file.path) {
        run.warn(format!(
            "Failed to remove source file {}: {}",
            file.path.display(),
            err
        ));
        return;
    }
    run.record.forget_file(target);

    let keep = run.task.game.shared_dirs();
    let mut dir = file.path.parent();
    while let Some(current) = dir {
        if !current.starts_with(&run.task.source_root) || keep.iter().any(|k| k == current) {
            break;
        }
        if fs::remove_dir(current).is_err() {
            break;
        }
        dir = current.parent();
    }
}

/// Sweep up directories left empty by concurrent per-file pruning.
fn prune_source_dirs(run: &Run<'_>) {
    let game = &run.task.game;
    for root in [game.common_dir(), game.download_dir(), game.workshop_dir()] {
        let dirs = WalkDir::new(&root)
            .contents_first(true)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_dir());
        for dir in dirs {
            // Non-empty directories hold files outside the file set.
            let _ = fs::remove_dir(dir.path());
        }
    }
}

/// Which side of a stream copy failed.
#[derive(Debug)]
pub(crate) enum PumpError {
    Read(io::Error),
    Write(io::Error),
    Stopped(EngineError),
}

impl PumpError {
    pub(crate) fn into_engine_error(self, source: &Path, target: &Path) -> EngineError {
        match self {
            PumpError::Read(err) => EngineError::from_io(source, err),
            PumpError::Write(err) => EngineError::from_io(target, err),
            PumpError::Stopped(err) => err,
        }
    }
}

/// Stream `reader` into `writer` block by block, calling `after_block` with
/// the size of every block written. Returns the total bytes copied.
pub(crate) fn pump<R: Read, W: Write>(
    mut reader: R,
    mut writer: W,
    buffer: &mut [u8],
    mut after_block: impl FnMut(usize) -> EngineResult<()>,
) -> Result<u64, PumpError> {
    let mut total = 0u64;
    loop {
        let read = match reader.read(buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(PumpError::Read(err)),
        };
        writer
            .write_all(&buffer[..read])
            .map_err(PumpError::Write)?;
        total += read as u64;
        after_block(read).map_err(PumpError::Stopped)?;
    }
    writer.flush().map_err(PumpError::Write)?;
    Ok(total)
}

/// Library-relative path of `path`, as used for archive entry names.
pub(crate) fn relative_to(path: &Path, root: &Path) -> Option<PathBuf> {
    path.strip_prefix(root).ok().map(Path::to_path_buf)
}
