//! File set enumeration and sizing.
//!
//! The file set of a game is resolved once at task start:
//! - the install folder, recursively
//! - optionally the download staging folder plus the library's loose patch
//!   files for the game
//! - optionally the workshop content folder
//! - the primary manifest and the workshop manifest, when present
//!
//! A game stored as an archive collapses to that single archive file.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use rayon::prelude::*;
use walkdir::WalkDir;

use crate::error::{EngineError, EngineResult};
use crate::layout::GameLayout;
use crate::model::FileDescriptor;
use crate::workers::run_bounded;

/// Build the ordered file set for `game`.
///
/// All-or-nothing: the first walk failure aborts enumeration with
/// [`EngineError::EnumerationFailed`] and no partial list is returned.
pub fn enumerate(
    game: &GameLayout,
    include_downloads: bool,
    include_workshop: bool,
) -> EngineResult<Vec<FileDescriptor>> {
    if game.compressed {
        let archive = game.archive_path();
        let metadata = fs::metadata(&archive).map_err(|e| EngineError::EnumerationFailed {
            path: archive.clone(),
            source: e,
        })?;
        return Ok(vec![FileDescriptor::from_metadata(archive, &metadata)]);
    }

    let mut files = Vec::new();

    let common = game.common_dir();
    if common.is_dir() {
        walk_into(&common, usize::MAX, &mut files, |_| true)?;
    }

    let downloads = game.download_dir();
    if include_downloads && downloads.is_dir() {
        walk_into(&downloads, usize::MAX, &mut files, |_| true)?;
        walk_into(&game.downloads_root(), 1, &mut files, |name| {
            game.is_patch_file(name)
        })?;
    }

    let workshop = game.workshop_dir();
    if include_workshop && workshop.is_dir() {
        walk_into(&workshop, usize::MAX, &mut files, |_| true)?;
    }

    for manifest in [game.manifest_path(), game.workshop_manifest_path()] {
        if let Ok(metadata) = fs::metadata(&manifest) {
            if metadata.is_file() {
                files.push(FileDescriptor::from_metadata(manifest, &metadata));
            }
        }
    }

    tracing::debug!(
        app_id = game.app_id,
        files = files.len(),
        "enumerated game files"
    );
    Ok(files)
}

fn walk_into(
    root: &Path,
    max_depth: usize,
    files: &mut Vec<FileDescriptor>,
    keep: impl Fn(&str) -> bool,
) -> EngineResult<()> {
    let walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(max_depth)
        .follow_links(false)
        .sort_by_file_name();

    for entry in walker {
        let entry = entry.map_err(|err| walk_error(root, err))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if !keep(&entry.file_name().to_string_lossy()) {
            continue;
        }
        let metadata = entry.metadata().map_err(|err| walk_error(root, err))?;
        files.push(FileDescriptor::from_metadata(entry.into_path(), &metadata));
    }
    Ok(())
}

fn walk_error(root: &Path, err: walkdir::Error) -> EngineError {
    let path = err
        .path()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| root.to_path_buf());
    EngineError::EnumerationFailed {
        path,
        source: io::Error::from(err),
    }
}

/// Total byte size of `files`, re-read from disk with up to `parallelism`
/// workers.
///
/// A file that vanished since enumeration contributes zero bytes. Any other
/// metadata failure falls back to the enumerated length.
pub fn total_size(files: &[FileDescriptor], parallelism: usize) -> u64 {
    let total = AtomicU64::new(0);
    run_bounded(parallelism, "size", || {
        files.par_iter().for_each(|file| {
            let len = match fs::metadata(&file.path) {
                Ok(metadata) => metadata.len(),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    tracing::debug!(path = %file.path.display(), "file vanished before sizing");
                    0
                }
                Err(err) => {
                    tracing::warn!(path = %file.path.display(), error = %err, "could not stat file; using enumerated size");
                    file.len
                }
            };
            total.fetch_add(len, Ordering::Relaxed);
        });
    });
    total.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::path::PathBuf;

    fn write(path: &Path, bytes: &[u8]) {
        fs::create_dir_all(path.parent().unwrap()).expect("Failed to create parent");
        fs::write(path, bytes).expect("Failed to write file");
    }

    fn names(files: &[FileDescriptor], root: &Path) -> Vec<PathBuf> {
        files
            .iter()
            .map(|f| f.path.strip_prefix(root).unwrap().to_path_buf())
            .collect()
    }

    fn populated_library() -> (tempfile::TempDir, GameLayout) {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let game = GameLayout::new(dir.path(), 440, "TF2", "Team Fortress 2", false);
        write(&game.common_dir().join("hl2.exe"), b"exe");
        write(&game.common_dir().join("tf/maps/2fort.bsp"), b"map data");
        write(&game.download_dir().join("chunk.bin"), b"dl");
        write(&game.downloads_root().join("state_440_1.patch"), b"p");
        write(&game.downloads_root().join("state_730_1.patch"), b"other");
        write(&game.workshop_dir().join("123/item.vpk"), b"ws");
        write(&game.manifest_path(), b"acf");
        (dir, game)
    }

    #[test]
    fn test_enumerate_full_set() {
        let (dir, game) = populated_library();
        let files = enumerate(&game, true, true).expect("Failed to enumerate");

        assert_eq!(
            names(&files, dir.path()),
            vec![
                PathBuf::from("common/TF2/hl2.exe"),
                PathBuf::from("common/TF2/tf/maps/2fort.bsp"),
                PathBuf::from("downloading/TF2/chunk.bin"),
                PathBuf::from("downloading/state_440_1.patch"),
                PathBuf::from("workshop/content/440/123/item.vpk"),
                PathBuf::from("appmanifest_440.acf"),
            ]
        );
        assert_eq!(files[1].len, 8);
    }

    #[test]
    fn test_enumerate_excludes_groups_by_flag() {
        let (_dir, game) = populated_library();
        let files = enumerate(&game, false, false).expect("Failed to enumerate");
        assert_eq!(files.len(), 3);
        assert!(files.iter().all(|f| !f.path.to_string_lossy().contains("downloading")));
        assert!(files.iter().all(|f| !f.path.to_string_lossy().contains("workshop")));
    }

    #[test]
    fn test_enumerate_includes_workshop_manifest() {
        let (_dir, game) = populated_library();
        write(&game.workshop_manifest_path(), b"ws acf");
        let files = enumerate(&game, true, true).expect("Failed to enumerate");
        assert_eq!(files.last().unwrap().path, game.workshop_manifest_path());
    }

    #[test]
    fn test_compressed_game_is_single_archive() {
        let (_dir, game) = populated_library();
        write(&game.archive_path(), b"PK");
        let game = GameLayout { compressed: true, ..game };
        let files = enumerate(&game, true, true).expect("Failed to enumerate");
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, game.archive_path());
    }

    #[test]
    fn test_missing_archive_fails_enumeration() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let game = GameLayout::new(dir.path(), 1, "G", "G", true);
        let err = enumerate(&game, true, true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EnumerationFailed);
    }

    #[test]
    fn test_total_size_is_order_independent() {
        let (_dir, game) = populated_library();
        let files = enumerate(&game, true, true).expect("Failed to enumerate");
        let expected: u64 = files.iter().map(|f| f.len).sum();

        for parallelism in [1, 2, 8] {
            assert_eq!(total_size(&files, parallelism), expected);
        }
    }

    #[test]
    fn test_total_size_tolerates_vanished_file() {
        let (_dir, game) = populated_library();
        let files = enumerate(&game, true, true).expect("Failed to enumerate");
        let expected: u64 = files.iter().map(|f| f.len).sum();

        fs::remove_file(game.common_dir().join("hl2.exe")).expect("Failed to remove file");
        assert_eq!(total_size(&files, 4), expected - 3);
    }
}
