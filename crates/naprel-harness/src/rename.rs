//! Scoped directory renames.
//!
//! During the packaged-binary phases the framework directory and the Qt
//! toolkit directory are renamed out of the way, so that a packaged app or
//! editor silently satisfying its dynamic-linking needs from the build
//! machine's copies surfaces as a load failure instead. Every rename is
//! paired with a restore on every exit path; the `Drop` impl is the safety
//! net for panics and interruption.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

/// Suffix appended to a directory while its scope is active.
pub const RENAME_SUFFIX: &str = "-rename";

/// Environment variable pointing into a Qt toolkit installation.
pub const QT_DIR_ENV: &str = "QT_DIR";

/// One guarded rename. Inert until [`RenameScope::apply`] is called.
#[derive(Debug)]
pub struct RenameScope {
    original: PathBuf,
    renamed: PathBuf,
    active: bool,
}

impl RenameScope {
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        let renamed = PathBuf::from(format!("{}{RENAME_SUFFIX}", dir.display()));
        Self {
            original: dir,
            renamed,
            active: false,
        }
    }

    /// Whether the rename is currently applied.
    #[must_use]
    pub fn active(&self) -> bool {
        self.active
    }

    #[must_use]
    pub fn original(&self) -> &Path {
        &self.original
    }

    /// Rename the directory aside. A failure records a warning and leaves
    /// the scope inert: the enclosed phases then run without the mutation,
    /// weakening the test but never losing the directory.
    pub fn apply(&mut self, warnings: &mut Vec<String>) -> bool {
        if self.active {
            return true;
        }
        info!(dir = %self.original.display(), "renaming directory aside");
        match fs::rename(&self.original, &self.renamed) {
            Ok(()) => {
                self.active = true;
                true
            }
            Err(err) => {
                let warning = format!(
                    "Couldn't rename {} aside: {err}; hidden-dependency detection is weakened",
                    self.original.display()
                );
                warn!("{warning}");
                warnings.push(warning);
                false
            }
        }
    }

    /// Rename the directory back. Idempotent.
    pub fn restore(&mut self) {
        if !self.active {
            return;
        }
        info!(dir = %self.original.display(), "renaming directory back");
        match fs::rename(&self.renamed, &self.original) {
            Ok(()) => self.active = false,
            Err(err) => {
                // Leave `active` set so Drop retries once more.
                error!(
                    renamed = %self.renamed.display(),
                    original = %self.original.display(),
                    error = %err,
                    "couldn't restore renamed directory"
                );
            }
        }
    }
}

impl Drop for RenameScope {
    fn drop(&mut self) {
        if self.active {
            if fs::rename(&self.renamed, &self.original).is_err() {
                error!(
                    renamed = %self.renamed.display(),
                    "directory left renamed; restore it by hand"
                );
            }
            self.active = false;
        }
    }
}

/// Find the top-level Qt directory starting from the path in `QT_DIR`.
///
/// Walks upward until a directory whose basename begins with "qt"
/// (case-insensitive) is found. Returns `None` (degrading the Qt rename
/// scope to a no-op) when the variable is unset, dangling, or no such
/// ancestor exists.
#[must_use]
pub fn discover_qt_root() -> Option<PathBuf> {
    let pointer = env::var_os(QT_DIR_ENV)?;
    let start = PathBuf::from(pointer);
    if !start.exists() {
        return None;
    }
    qt_root_from(&start)
}

/// The upward walk itself, separated from the environment read.
#[must_use]
pub fn qt_root_from(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        let basename = current.file_name()?.to_string_lossy().to_lowercase();
        if basename.starts_with("qt") {
            return Some(current);
        }
        current = current.parent()?.to_path_buf();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_and_restore_round_trip() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("framework");
        fs::create_dir(&dir).unwrap();

        let mut warnings = Vec::new();
        let mut scope = RenameScope::new(dir.clone());
        assert!(scope.apply(&mut warnings));
        assert!(!dir.exists());
        assert!(root.path().join("framework-rename").exists());

        scope.restore();
        assert!(dir.exists());
        assert!(!root.path().join("framework-rename").exists());
        assert!(warnings.is_empty());
    }

    #[test]
    fn drop_restores_unclosed_scope() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("qt5");
        fs::create_dir(&dir).unwrap();

        {
            let mut warnings = Vec::new();
            let mut scope = RenameScope::new(dir.clone());
            assert!(scope.apply(&mut warnings));
            assert!(!dir.exists());
            // Scope dropped without an explicit restore.
        }
        assert!(dir.exists());
    }

    #[test]
    fn failed_apply_records_warning_and_stays_inert() {
        let root = tempfile::tempdir().unwrap();
        let missing = root.path().join("not-there");

        let mut warnings = Vec::new();
        let mut scope = RenameScope::new(missing);
        assert!(!scope.apply(&mut warnings));
        assert!(!scope.active());
        assert_eq!(warnings.len(), 1);

        // Restore after a failed apply is a no-op.
        scope.restore();
    }

    #[test]
    fn restore_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("framework");
        fs::create_dir(&dir).unwrap();

        let mut warnings = Vec::new();
        let mut scope = RenameScope::new(dir.clone());
        scope.apply(&mut warnings);
        scope.restore();
        scope.restore();
        assert!(dir.exists());
    }

    #[test]
    fn qt_root_walks_upward_case_insensitively() {
        let root = tempfile::tempdir().unwrap();
        let qt = root.path().join("Qt5.15.2");
        let nested = qt.join("gcc_64").join("lib");
        fs::create_dir_all(&nested).unwrap();

        assert_eq!(qt_root_from(&nested), Some(qt.clone()));
        assert_eq!(qt_root_from(&qt), Some(qt));
    }

    #[test]
    fn qt_root_gives_up_at_filesystem_root() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("vendor").join("lib");
        fs::create_dir_all(&nested).unwrap();
        assert_eq!(qt_root_from(&nested), None);
    }
}
