use regex::Regex;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;
use walkdir::{DirEntry, WalkDir};

use crate::error::IntegrityError;
use crate::integrity::{APP_SIGNATURE_PATH, CORE_SIGNATURE_PATH};

/// OS and desktop-environment metadata files, excluded at any depth.
const EXCLUDED_FILENAMES: &[&str] = &[
    ".DS_Store",  // macOS
    "Thumbs.db",  // Windows
    ".directory", // KDE Dolphin
    ".webapp",    // Gentoo webapp-config
];

/// Version-control metadata directories, excluded at any depth.
const VCS_DIRS: &[&str] = &[".git", ".svn", ".hg", ".bzr"];

/// Top-level folders of a core installation that hold user data, local
/// configuration, apps (signed separately) or updater leftovers.
const CORE_EXCLUDED_DIRS: &[&str] = &[
    "data",
    "themes",
    "config",
    "apps",
    "assets",
    "lost+found",
    "updater",
    "_oc_upgrade",
];

fn webapp_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\.webapp-nextcloud-(\d+\.){2}(\d+)(-r\d+)?$").expect("static regex is valid")
    })
}

/// Lists the files covered by a manifest below a root directory.
#[derive(Debug, Clone, Default)]
pub struct FileEnumerator {
    /// Directories (relative to the root, forward slashes) skipped entirely.
    excluded_dirs: BTreeSet<String>,
}

impl FileEnumerator {
    /// Enumerator for an app tree: only the fixed name-based exclusions apply.
    pub fn for_app() -> Self {
        Self::default()
    }

    /// Enumerator for a core tree rooted at `root`. `extra_dirs` (apps
    /// folders, a custom data directory) are skipped when they live inside it.
    pub fn for_core(root: &Path, extra_dirs: &[PathBuf]) -> Self {
        let mut excluded_dirs: BTreeSet<String> =
            CORE_EXCLUDED_DIRS.iter().map(|d| d.to_string()).collect();
        for dir in extra_dirs {
            let relative = dir.strip_prefix(root).ok().and_then(relative_key);
            if let Some(rel) = relative.filter(|r| !r.is_empty()) {
                excluded_dirs.insert(rel);
            }
        }
        FileEnumerator { excluded_dirs }
    }

    /// Relative paths of all covered files, sorted ascending byte-wise.
    pub fn enumerate(&self, root: &Path) -> Result<Vec<String>, IntegrityError> {
        ensure_readable_dir(root)?;

        let mut files = Vec::new();
        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !self.is_excluded_dir(root, e));

        for entry in walker {
            let entry = entry.map_err(|e| walk_error(root, e))?;
            if entry.depth() == 0 || !is_covered_file(&entry) {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if is_excluded_filename(&name) {
                continue;
            }
            let relative = relative_path(root, entry.path())?;
            if relative == APP_SIGNATURE_PATH || relative == CORE_SIGNATURE_PATH {
                continue;
            }
            files.push(relative);
        }

        files.sort();
        tracing::debug!(root = %root.display(), files = files.len(), "enumerated files");
        Ok(files)
    }

    fn is_excluded_dir(&self, root: &Path, entry: &DirEntry) -> bool {
        if !entry.file_type().is_dir() {
            return false;
        }
        let name = entry.file_name().to_string_lossy();
        if VCS_DIRS.contains(&name.as_ref()) {
            return true;
        }
        entry
            .path()
            .strip_prefix(root)
            .ok()
            .and_then(relative_key)
            .is_some_and(|rel| self.excluded_dirs.contains(&rel))
    }
}

fn is_excluded_filename(name: &str) -> bool {
    EXCLUDED_FILENAMES.contains(&name) || webapp_marker().is_match(name)
}

/// Regular files, and symlinks that resolve to regular files. Directory
/// symlinks are not traversed.
fn is_covered_file(entry: &DirEntry) -> bool {
    let file_type = entry.file_type();
    if file_type.is_file() {
        return true;
    }
    file_type.is_symlink() && fs::metadata(entry.path()).is_ok_and(|m| m.is_file())
}

fn ensure_readable_dir(root: &Path) -> Result<(), IntegrityError> {
    match fs::metadata(root) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(IntegrityError::DirectoryNotFound {
            path: root.to_path_buf(),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(IntegrityError::DirectoryNotFound {
            path: root.to_path_buf(),
        }),
        Err(e) => Err(IntegrityError::not_readable(root, e)),
    }
}

fn walk_error(root: &Path, err: walkdir::Error) -> IntegrityError {
    let path = err.path().unwrap_or(root).to_path_buf();
    let source = err
        .into_io_error()
        .unwrap_or_else(|| io::Error::other("filesystem loop detected"));
    IntegrityError::NotReadable { path, source }
}

/// `a/b/c` form of a relative path, or `None` if any component is not UTF-8.
fn relative_key(relative: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(parts.join("/"))
}

fn relative_path(root: &Path, path: &Path) -> Result<String, IntegrityError> {
    path.strip_prefix(root)
        .ok()
        .and_then(relative_key)
        .ok_or_else(|| IntegrityError::NonUtf8Path {
            path: path.to_path_buf(),
        })
}
