//! Game deletion.
//!
//! Removes every file of a game from its library: the archive for a
//! compressed game, otherwise the file set, then the install, download and
//! workshop folders, then both manifests.

use std::fs;
use std::io;
use std::path::Path;

use rayon::prelude::*;

use crate::config::EngineConfig;
use crate::enumerate::enumerate;
use crate::error::EngineError;
use crate::gate::TaskControl;
use crate::layout::GameLayout;
use crate::progress::{format_bytes, Event, EventCategory, EventLog, StatusSink};
use crate::rollback::remove_file_forced;
use crate::workers::run_bounded;

/// Optional progress surface for a deletion running as a task.
#[derive(Clone, Copy)]
pub struct DeleteProgress<'a> {
    pub control: &'a TaskControl,
    pub sink: &'a dyn StatusSink,
}

/// Collaborators of [`delete_game`].
#[derive(Clone, Copy)]
pub struct DeleteContext<'a> {
    pub config: &'a EngineConfig,
    pub events: &'a dyn EventLog,
    pub progress: Option<DeleteProgress<'a>>,
}

/// Delete `game` from its library.
///
/// Returns `false` when the file set could not be enumerated or the deletion
/// was cancelled. Individual files or folders that cannot be removed are
/// logged as warnings and do not fail the deletion.
pub fn delete_game(game: &GameLayout, ctx: &DeleteContext<'_>) -> bool {
    let context = game.context();

    if game.compressed {
        let archive = game.archive_path();
        let event = match remove_file_forced(&archive) {
            Ok(_) => Event::info(
                EventCategory::Library,
                context,
                format!("Removed archive {}", archive.display()),
            ),
            Err(err) => Event::warn(
                EventCategory::Library,
                context,
                format!("Failed to remove archive {}: {}", archive.display(), err),
            ),
        };
        ctx.events.record(event);
        return true;
    }

    let files = match enumerate(game, true, true) {
        Ok(files) => files,
        Err(err) => {
            ctx.events.record(Event::error(
                EventCategory::Library,
                context,
                format!("Failed to list files for deletion: {}", err),
            ));
            return false;
        }
    };

    let removed = run_bounded(ctx.config.delete_parallelism, "delete", || {
        files.par_iter().try_for_each(|file| {
            if let Some(progress) = ctx.progress {
                progress.control.checkpoint()?;
                progress.sink.report(
                    &format!("Deleting: {} ({})", file.file_name(), format_bytes(file.len)),
                    0,
                    0,
                );
            }
            if let Err(err) = remove_file_forced(&file.path) {
                ctx.events.record(Event::warn(
                    EventCategory::App,
                    context.as_str(),
                    format!("Failed to delete {}: {}", file.path.display(), err),
                ));
            }
            Ok::<(), EngineError>(())
        })
    });

    if let Err(err) = removed {
        ctx.events.record(Event::info(
            EventCategory::Library,
            context,
            format!("Deletion stopped: {}", err),
        ));
        return false;
    }

    for dir in [game.common_dir(), game.download_dir(), game.workshop_dir()] {
        remove_tree(&dir, ctx.events, &context);
    }
    for manifest in [game.manifest_path(), game.workshop_manifest_path()] {
        if let Err(err) = remove_file_forced(&manifest) {
            ctx.events.record(Event::warn(
                EventCategory::App,
                context.as_str(),
                format!("Failed to delete {}: {}", manifest.display(), err),
            ));
        }
    }

    ctx.events.record(Event::info(
        EventCategory::Library,
        context,
        format!("Deleted {} files", files.len()),
    ));
    true
}

fn remove_tree(dir: &Path, events: &dyn EventLog, context: &str) {
    match fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => events.record(Event::warn(
            EventCategory::App,
            context,
            format!("Failed to remove folder {}: {}", dir.display(), err),
        )),
    }
}
