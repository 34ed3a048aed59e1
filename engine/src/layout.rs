//! On-disk layout of a game inside a library folder.
//!
//! The library folder (`steamapps`) is the root every task rewrites paths
//! against: a source file keeps its library-relative path in the target
//! library.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameLayout {
    /// The library's `steamapps` folder
    pub library: PathBuf,

    /// Numeric game identifier
    pub app_id: u32,

    /// Folder name under `common/` and `downloading/`
    pub install_dir: String,

    /// Display name, used in status text and log context
    pub name: String,

    /// True when the game is stored as a single archive
    pub compressed: bool,
}

impl GameLayout {
    pub fn new(
        library: impl Into<PathBuf>,
        app_id: u32,
        install_dir: impl Into<String>,
        name: impl Into<String>,
        compressed: bool,
    ) -> Self {
        GameLayout {
            library: library.into(),
            app_id,
            install_dir: install_dir.into(),
            name: name.into(),
            compressed,
        }
    }

    /// Build a layout whose `compressed` flag reflects whether the archive is
    /// present right now.
    pub fn detect(
        library: impl Into<PathBuf>,
        app_id: u32,
        install_dir: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        let mut layout = Self::new(library, app_id, install_dir, name, false);
        layout.compressed = layout.archive_path().is_file();
        layout
    }

    /// The same game placed in another library.
    pub fn relocated(&self, library: impl Into<PathBuf>, compressed: bool) -> Self {
        GameLayout {
            library: library.into(),
            compressed,
            ..self.clone()
        }
    }

    pub fn common_dir(&self) -> PathBuf {
        self.library.join("common").join(&self.install_dir)
    }

    /// Shared download staging folder of the library.
    pub fn downloads_root(&self) -> PathBuf {
        self.library.join("downloading")
    }

    pub fn download_dir(&self) -> PathBuf {
        self.downloads_root().join(&self.install_dir)
    }

    pub fn workshop_root(&self) -> PathBuf {
        self.library.join("workshop")
    }

    pub fn workshop_dir(&self) -> PathBuf {
        self.workshop_root().join("content").join(self.app_id.to_string())
    }

    pub fn manifest_name(&self) -> String {
        format!("appmanifest_{}.acf", self.app_id)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.library.join(self.manifest_name())
    }

    pub fn workshop_manifest_path(&self) -> PathBuf {
        self.workshop_root()
            .join(format!("appworkshop_{}.acf", self.app_id))
    }

    pub fn archive_path(&self) -> PathBuf {
        self.library.join(format!("{}.zip", self.app_id))
    }

    /// Library folders shared by every game; never pruned when a game leaves.
    pub fn shared_dirs(&self) -> Vec<PathBuf> {
        vec![
            self.library.clone(),
            self.library.join("common"),
            self.downloads_root(),
            self.workshop_root(),
            self.workshop_root().join("content"),
        ]
    }

    /// Whether `file_name` is a loose patch file belonging to this game.
    pub fn is_patch_file(&self, file_name: &str) -> bool {
        file_name.ends_with(".patch") && file_name.contains(&self.app_id.to_string())
    }

    /// Log context in the form `[name][app_id][manifest]`.
    pub fn context(&self) -> String {
        format!("[{}][{}][{}]", self.name, self.app_id, self.manifest_name())
    }
}

/// Rewrite `path` from under `source_root` to the same relative location under
/// `target_root`. Returns `None` when `path` is not inside `source_root`.
pub fn rebase(path: &Path, source_root: &Path, target_root: &Path) -> Option<PathBuf> {
    path.strip_prefix(source_root)
        .ok()
        .map(|relative| target_root.join(relative))
}
