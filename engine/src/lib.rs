//! # Gameshelf Engine - Game Library Transfer Library
//!
//! A headless engine that moves installed games between library folders.
//! Designed as the foundation for multiple front ends (CLI, GUI, automation).
//!
//! ## Overview
//!
//! A game lives in a library folder as an install folder, optional download
//! and workshop folders, and its manifests, or as a single compressed archive.
//! The engine:
//! - Enumerates and sizes a game's file set
//! - Copies or moves it file for file, with large files on their own lane
//! - Packs it into or unpacks it from a single archive
//! - Pauses, resumes and cancels at block granularity
//! - Offers to roll back partial writes after a failure
//! - Deletes a game from its library
//!
//! ## Basic Usage
//!
//! ```no_run
//! use engine::{
//!     create_task, plan_task, run_task, EngineConfig, FixedAnswer, GameLayout, NullSink,
//!     TaskContext, TaskControl, TaskOptions, TracingEventLog, TransferMode,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let game = GameLayout::detect("D:\\Games\\steamapps", 220, "Half-Life 2", "Half-Life 2");
//! let mut task = create_task(game, "E:\\Games\\steamapps", TransferMode::Move, TaskOptions::default())?;
//!
//! let config = EngineConfig::default();
//! plan_task(&mut task, &config)?;
//! println!("Will move {} files", task.total_file_count);
//!
//! let control = TaskControl::default();
//! let summary = run_task(
//!     &task,
//!     &TaskContext {
//!         config: &config,
//!         control: &control,
//!         sink: &NullSink,
//!         events: &TracingEventLog,
//!         confirm: &FixedAnswer(false),
//!     },
//! )?;
//! println!("{} files in {:?}", summary.files_transferred, summary.elapsed);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **model**: Task data structures (TransferTask, FileDescriptor, enums)
//! - **layout**: Where a game's files live inside a library
//! - **error**: Error types and handling
//! - **config**: Engine tunables
//! - **enumerate**: File set enumeration and sizing
//! - **strategy**: Strategy selection
//! - **copy**: Two-lane direct transfer
//! - **archive**: Compressing into and decompressing from archives
//! - **gate**: Pause/cancel checkpoints
//! - **rollback**: Write ledger and rollback sweep
//! - **confirm**: Operator yes/no questions
//! - **progress**: Status sink and event log
//! - **job**: Task orchestration (create, plan, run)
//! - **delete**: Game deletion

pub mod archive;
pub mod config;
pub mod confirm;
pub mod copy;
pub mod delete;
pub mod enumerate;
pub mod error;
pub mod gate;
pub mod job;
pub mod layout;
pub mod model;
pub mod progress;
pub mod rollback;
pub mod strategy;
mod workers;

// Re-export main types and functions
pub use config::EngineConfig;
pub use confirm::{ChannelConfirm, Confirm, ConfirmRequest, FixedAnswer};
pub use delete::{delete_game, DeleteContext, DeleteProgress};
pub use error::{EngineError, EngineResult, ErrorKind};
pub use gate::{CancellationToken, ControlHub, PauseToken, TaskControl};
pub use job::{create_task, plan_task, run_task, TaskContext};
pub use layout::GameLayout;
pub use model::{FileDescriptor, TaskOptions, TaskSummary, TransferMode, TransferTask};
pub use progress::{Event, EventCategory, EventLog, NullSink, Severity, StatusSink, TracingEventLog};
pub use rollback::{RollbackOutcome, RollbackReport, TransferRecord};
pub use strategy::{select_strategy, Strategy};
