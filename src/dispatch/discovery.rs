//! Candidate discovery: walk the search directories in priority order and
//! collect every shared-library file.

use std::path::{Path, PathBuf};

/// Environment variable holding user-defined search directories, separated
/// with the platform-native path separator.
pub const SEARCH_PATH_ENV: &str = "ONEVPL_SEARCH_PATH";

/// Origin of a candidate; lower ranks first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SearchPriority {
    UserDefined = 0,
    Package = 1,
    Legacy = 2,
}

#[derive(Debug, Clone)]
pub struct Candidate {
    pub path: PathBuf,
    pub priority: SearchPriority,
}

fn is_shared_library(name: &str) -> bool {
    // ".so" anywhere covers versioned names like libfoo.so.2
    name.contains(".so") || name.to_ascii_lowercase().ends_with(".dll")
}

/// Collect shared-library files from one directory. A missing or unreadable
/// directory is not an error, it just contributes nothing.
pub fn search_dir(dir: &Path, priority: SearchPriority, out: &mut Vec<Candidate>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };
    let mut found: Vec<PathBuf> = entries
        .flatten()
        .filter(|e| {
            e.file_name()
                .to_str()
                .map(is_shared_library)
                .unwrap_or(false)
        })
        .filter(|e| e.path().is_file())
        .map(|e| e.path())
        .collect();
    // stable discovery order independent of readdir quirks
    found.sort();
    for path in found {
        let resolved = std::fs::canonicalize(&path).unwrap_or(path);
        out.push(Candidate {
            path: resolved,
            priority,
        });
    }
}

/// Directories from a `ONEVPL_SEARCH_PATH`-style value.
pub(crate) fn dirs_from_env_value(value: &std::ffi::OsStr) -> Vec<PathBuf> {
    std::env::split_paths(value).collect()
}

fn package_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            dirs.push(parent.to_path_buf());
        }
    }
    if let Ok(cwd) = std::env::current_dir() {
        dirs.push(cwd);
    }
    dirs
}

fn legacy_dirs() -> Vec<PathBuf> {
    if cfg!(windows) {
        Vec::new()
    } else {
        vec![
            PathBuf::from("/opt/intel/mediasdk/lib64"),
            PathBuf::from("/opt/intel/mediasdk/lib"),
        ]
    }
}

/// Build the full candidate list: user-defined directories first, then the
/// package-local ones, then the legacy locations. Discovery order is kept
/// within each priority.
pub fn build_candidate_list() -> Vec<Candidate> {
    let mut out = Vec::new();

    if let Some(value) = std::env::var_os(SEARCH_PATH_ENV) {
        for dir in dirs_from_env_value(&value) {
            search_dir(&dir, SearchPriority::UserDefined, &mut out);
        }
    }
    for dir in package_dirs() {
        search_dir(&dir, SearchPriority::Package, &mut out);
    }
    for dir in legacy_dirs() {
        search_dir(&dir, SearchPriority::Legacy, &mut out);
    }

    sort_candidates(&mut out);
    out
}

/// Order candidates by priority, preserving discovery order within one
/// priority.
pub(crate) fn sort_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by_key(|c| c.priority);
}
