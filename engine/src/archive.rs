//! Single-file game archives.
//!
//! A compressed game is one zip file named `<app_id>.zip` in the library
//! folder. Entry names are library-relative paths with `/` separators, so
//! extracting into any library rebuilds the original tree.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Component, Path};

use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::copy::{pump, relative_to};
use crate::error::{EngineError, EngineResult};
use crate::job::Run;
use crate::progress::format_bytes;
use crate::rollback::ensure_dir_recorded;

/// Deflate at its strongest setting.
const MAX_COMPRESSION_LEVEL: i32 = 9;

/// Entry name for a library-relative path.
pub fn entry_name(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Sum of the uncompressed sizes of every file entry in `path`.
pub fn extracted_size(path: &Path) -> EngineResult<u64> {
    let mut archive = open_archive(path)?;
    let mut total = 0u64;
    for index in 0..archive.len() {
        let entry = archive
            .by_index(index)
            .map_err(|e| EngineError::from_zip(path, e))?;
        if !entry.is_dir() {
            total += entry.size();
        }
    }
    Ok(total)
}

fn open_archive(path: &Path) -> EngineResult<ZipArchive<BufReader<File>>> {
    let file = File::open(path).map_err(|e| EngineError::from_io(path, e))?;
    ZipArchive::new(BufReader::new(file)).map_err(|e| EngineError::from_zip(path, e))
}

/// Pack the task's file set into `<target library>/<app_id>.zip`.
///
/// Any archive already at that path is replaced. The archive is recorded for
/// rollback as soon as it is created, since a half-written archive is useless.
pub(crate) fn compress_into(run: &Run<'_>) -> EngineResult<()> {
    let archive_path = run.task.target_game().archive_path();
    if let Some(parent) = archive_path.parent() {
        ensure_dir_recorded(parent, run.record)?;
    }

    match fs::remove_file(&archive_path) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(EngineError::from_io(&archive_path, err)),
    }

    let file = File::create(&archive_path).map_err(|e| EngineError::from_io(&archive_path, e))?;
    run.record.record_file(&archive_path);

    let mut writer = ZipWriter::new(BufWriter::new(file));
    let mut buffer = vec![0u8; run.config.block_size];

    for descriptor in &run.task.files {
        run.control.checkpoint()?;

        let relative = relative_to(&descriptor.path, &run.task.source_root).ok_or_else(|| {
            EngineError::InvalidTask {
                reason: format!("{} is outside the source library", descriptor.path.display()),
            }
        })?;
        let name = entry_name(&relative);

        run.set_status(format!(
            "Compressing: {} ({})",
            descriptor.file_name(),
            format_bytes(descriptor.len)
        ));

        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(MAX_COMPRESSION_LEVEL))
            .large_file(descriptor.len >= u64::from(u32::MAX));
        writer
            .start_file(name.as_str(), options)
            .map_err(|e| EngineError::from_zip(&archive_path, e))?;

        let input = File::open(&descriptor.path).map_err(|e| EngineError::from_io(&descriptor.path, e))?;
        pump(input, &mut writer, &mut buffer, |_| Ok(()))
            .map_err(|e| e.into_engine_error(&descriptor.path, &archive_path))?;

        run.credit(descriptor.len);
        run.note_transferred();
        run.file_done(&format!("Compressed file: {}", name));
    }

    let mut inner = writer
        .finish()
        .map_err(|e| EngineError::from_zip(&archive_path, e))?;
    inner
        .flush()
        .map_err(|e| EngineError::from_io(&archive_path, e))?;
    Ok(())
}

/// Unpack the source archive into plain files under the target library,
/// overwriting whatever is already there.
pub(crate) fn decompress_from(run: &Run<'_>) -> EngineResult<()> {
    let archive_path = run.task.game.archive_path();
    let mut archive = open_archive(&archive_path)?;
    let mut buffer = vec![0u8; run.config.block_size];

    for index in 0..archive.len() {
        run.control.checkpoint()?;

        let entry = archive
            .by_index(index)
            .map_err(|e| EngineError::from_zip(&archive_path, e))?;
        let relative = entry
            .enclosed_name()
            .map(Path::to_path_buf)
            .ok_or_else(|| EngineError::ArchiveCorrupt {
                path: archive_path.clone(),
                source: ZipError::InvalidArchive("entry escapes the archive root"),
            })?;
        let destination = run.task.target_root.join(&relative);

        if entry.is_dir() {
            ensure_dir_recorded(&destination, run.record)?;
            continue;
        }
        if let Some(parent) = destination.parent() {
            ensure_dir_recorded(parent, run.record)?;
        }

        let size = entry.size();
        run.set_status(format!(
            "Decompressing: {} ({})",
            destination
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            format_bytes(size)
        ));

        let output = File::create(&destination).map_err(|e| EngineError::from_io(&destination, e))?;
        run.record.record_file(&destination);

        pump(entry, output, &mut buffer, |_| Ok(())).map_err(|e| match e {
            // Read failures inside an entry are bad data (CRC, truncation).
            crate::copy::PumpError::Read(err) => EngineError::ArchiveCorrupt {
                path: archive_path.clone(),
                source: ZipError::Io(err),
            },
            other => other.into_engine_error(&archive_path, &destination),
        })?;

        run.credit(size);
        run.note_transferred();
        run.file_done(&format!("Decompressed file: {}", destination.display()));
    }
    Ok(())
}
