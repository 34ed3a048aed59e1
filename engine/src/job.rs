//! Task orchestration.
//!
//! This module provides the task lifecycle functions:
//! - Creating a task for a game and a target library
//! - Planning a task (enumerating and sizing the file set)
//! - Running a task (executing the selected strategy)
//!
//! A failed run marks the task errored and completed, then offers the
//! operator a rollback of everything the run wrote.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::archive;
use crate::config::EngineConfig;
use crate::confirm::Confirm;
use crate::copy;
use crate::enumerate::{enumerate, total_size};
use crate::error::{EngineError, EngineResult, ErrorKind};
use crate::gate::TaskControl;
use crate::layout::GameLayout;
use crate::model::{TaskOptions, TaskSummary, TransferMode, TransferTask};
use crate::progress::{format_bytes, timestamped, Event, EventCategory, EventLog, Severity, StatusSink};
use crate::rollback::{offer_rollback, rollback_prompt, RollbackOutcome, TransferRecord};
use crate::strategy::Strategy;

/// Collaborators a run talks to. All are owned by the caller.
#[derive(Clone, Copy)]
pub struct TaskContext<'a> {
    pub config: &'a EngineConfig,
    pub control: &'a TaskControl,
    pub sink: &'a dyn StatusSink,
    pub events: &'a dyn EventLog,
    pub confirm: &'a dyn Confirm,
}

/// Per-run state shared by every worker of one task.
pub(crate) struct Run<'a> {
    pub task: &'a TransferTask,
    pub config: &'a EngineConfig,
    pub control: &'a TaskControl,
    pub record: &'a TransferRecord,
    sink: &'a dyn StatusSink,
    events: &'a dyn EventLog,
    context: String,
    transferred: AtomicUsize,
    skipped: AtomicUsize,
}

impl<'a> Run<'a> {
    fn new(task: &'a TransferTask, ctx: &TaskContext<'a>, record: &'a TransferRecord) -> Self {
        Run {
            task,
            config: ctx.config,
            control: ctx.control,
            record,
            sink: ctx.sink,
            events: ctx.events,
            context: task.game.context(),
            transferred: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
        }
    }

    /// Count `bytes` as moved and push the new total to the sink.
    pub fn credit(&self, bytes: u64) {
        let moved = self.task.credit(bytes);
        self.sink
            .report(&self.task.status(), moved, self.task.total_bytes);
    }

    pub fn set_status(&self, text: String) {
        self.sink
            .report(&text, self.task.moved_bytes(), self.task.total_bytes);
        self.task.set_status(text);
    }

    pub fn note_transferred(&self) {
        self.transferred.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Per-file trace; shown in the task log only when the task asks for it.
    pub fn file_done(&self, message: &str) {
        if self.task.options.report_file_movement {
            self.log_line(message);
        }
        self.events.record(Event::new(
            EventCategory::App,
            Severity::Debug,
            self.context.clone(),
            message,
        ));
    }

    pub fn warn(&self, message: String) {
        self.events
            .record(Event::warn(EventCategory::App, self.context.clone(), message));
    }

    fn log_line(&self, text: &str) {
        self.sink
            .task_log(&timestamped(&format!("[{}] {}", self.task.game.name, text)));
    }

    fn summary(&self) -> TaskSummary {
        TaskSummary {
            strategy: self.task.strategy,
            files_transferred: self.transferred.load(Ordering::Relaxed),
            files_skipped: self.skipped.load(Ordering::Relaxed),
            bytes_moved: self.task.moved_bytes(),
            elapsed: self.task.elapsed(),
        }
    }
}

/// Create a new transfer task for `game` towards `target_library`.
///
/// Validates that the source library exists and that the target differs from
/// it. The target library may not exist yet; it is created during the run.
pub fn create_task<P: AsRef<Path>>(
    game: GameLayout,
    target_library: P,
    mode: TransferMode,
    options: TaskOptions,
) -> EngineResult<TransferTask> {
    let target = target_library.as_ref();

    match std::fs::metadata(&game.library) {
        Ok(metadata) if metadata.is_dir() => {}
        Ok(_) => {
            return Err(EngineError::InvalidTask {
                reason: format!("source library is not a directory: {}", game.library.display()),
            })
        }
        Err(e) => return Err(EngineError::from_io(&game.library, e)),
    }

    if target.as_os_str().is_empty() {
        return Err(EngineError::InvalidTask {
            reason: "target library path is empty".to_string(),
        });
    }
    if target == game.library {
        return Err(EngineError::InvalidTask {
            reason: "source and target library are the same".to_string(),
        });
    }

    Ok(TransferTask::new(game, target.to_path_buf(), mode, options))
}

/// Plan a task by enumerating and sizing its file set.
///
/// The file set is frozen here; a task whose source may have changed must be
/// planned afresh. Planning failures are terminal for the task.
pub fn plan_task(task: &mut TransferTask, config: &EngineConfig) -> EngineResult<()> {
    if task.started.load(Ordering::Acquire) || task.is_completed() {
        return Err(EngineError::InvalidTask {
            reason: "task has already run".to_string(),
        });
    }

    let planned = enumerate(
        &task.game,
        task.options.include_downloads,
        task.options.include_workshop,
    )
    .and_then(|files| {
        let total_bytes = match task.strategy {
            // Progress is credited in extracted bytes.
            Strategy::DecompressFrom => archive::extracted_size(&task.game.archive_path())?,
            _ => total_size(&files, config.size_parallelism),
        };
        Ok((files, total_bytes))
    });

    match planned {
        Ok((files, total_bytes)) => {
            task.total_file_count = files.len();
            task.total_bytes = total_bytes;
            task.files = files;
            task.planned = true;
            Ok(())
        }
        Err(err) => {
            task.mark_failed();
            Err(err)
        }
    }
}

/// Run a planned task to completion.
///
/// On failure or cancellation the task is marked errored and completed,
/// sibling workers are halted, and if anything was written the operator is
/// asked whether to remove it. The original error is returned either way.
pub fn run_task(task: &TransferTask, ctx: &TaskContext<'_>) -> EngineResult<TaskSummary> {
    run_task_recorded(task, ctx, &TransferRecord::new())
}

/// [`run_task`] writing its rollback ledger into `record`.
pub(crate) fn run_task_recorded(
    task: &TransferTask,
    ctx: &TaskContext<'_>,
    record: &TransferRecord,
) -> EngineResult<TaskSummary> {
    if !task.planned {
        return Err(EngineError::InvalidTask {
            reason: "task must be planned before it runs".to_string(),
        });
    }
    if task.started.swap(true, Ordering::AcqRel) {
        return Err(EngineError::InvalidTask {
            reason: "task has already run".to_string(),
        });
    }
    ctx.config.validate()?;

    let run = Run::new(task, ctx, record);

    task.mark_active();
    run.log_line(&format!(
        "File list populated, total files to move: {} - total size to move: {}",
        task.total_file_count,
        format_bytes(task.total_bytes)
    ));
    ctx.events.record(Event::info(
        EventCategory::TaskManager,
        run.context.clone(),
        format!(
            "{} started using {} ({} files, {})",
            task.mode,
            task.strategy,
            task.total_file_count,
            format_bytes(task.total_bytes)
        ),
    ));

    task.start_clock();
    let result = match task.strategy {
        Strategy::CompressInto => archive::compress_into(&run),
        Strategy::DecompressFrom => archive::decompress_from(&run),
        Strategy::DirectTransfer => copy::run_direct(&run),
    };
    task.stop_clock();

    match result {
        Ok(()) => {
            task.moved_bytes.store(task.total_bytes, Ordering::Release);
            task.set_status(String::new());
            task.mark_succeeded();
            ctx.sink.report("", task.total_bytes, task.total_bytes);

            let summary = run.summary();
            run.log_line(&format!(
                "Time elapsed: {:?} - Average speed: {:.3} MB/sec - Average file size: {}",
                summary.elapsed,
                summary.average_speed_mb(),
                format_bytes(summary.average_file_size())
            ));
            ctx.events.record(Event::info(
                EventCategory::TaskManager,
                run.context.clone(),
                format!(
                    "Completed: {} transferred, {} already in place",
                    summary.files_transferred, summary.files_skipped
                ),
            ));
            Ok(summary)
        }
        Err(err) => Err(fail(&run, ctx, err)),
    }
}

fn fail(run: &Run<'_>, ctx: &TaskContext<'_>, err: EngineError) -> EngineError {
    let task = run.task;
    task.mark_failed();
    ctx.control.halt();

    if err.kind() == ErrorKind::Cancelled {
        run.log_line(&format!(
            "Operation cancelled by user. Time elapsed: {:?}",
            task.elapsed()
        ));
        ctx.events.record(Event::info(
            EventCategory::TaskManager,
            run.context.clone(),
            "Operation cancelled by user",
        ));
    } else {
        run.log_line(&format!(
            "An error happened while moving game files: {}. Time elapsed: {:?}",
            err,
            task.elapsed()
        ));
        ctx.events.record(Event::error(
            EventCategory::Engine,
            run.context.clone(),
            format!("{:?}", err),
        ));
    }

    let prompt = rollback_prompt(&task.game.name, &err);
    match offer_rollback(run.record, &prompt, ctx.confirm, ctx.events, &run.context) {
        RollbackOutcome::Swept(report) => run.log_line(&format!(
            "Removed {} written files and {} created directories",
            report.files_removed, report.directories_removed
        )),
        RollbackOutcome::Declined | RollbackOutcome::NothingToRemove => {}
    }
    err
}
