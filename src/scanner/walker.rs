use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use walkdir::WalkDir;

use crate::common::errors::{ErrorCode, Result, SweepError};

/// Resolve the current user's home directory.
///
/// Order: the OS user database, then `HOME`, then `USERPROFILE`.
pub fn home_dir() -> Result<PathBuf> {
    if let Some(home) = home_from_user_db() {
        return Ok(home);
    }
    for var in ["HOME", "USERPROFILE"] {
        if let Some(value) = std::env::var_os(var) {
            if !value.is_empty() {
                return Ok(PathBuf::from(value));
            }
        }
    }
    Err(SweepError::new(
        ErrorCode::Filesystem,
        "could not determine home directory (no passwd entry, HOME or USERPROFILE)",
    ))
}

#[cfg(unix)]
fn home_from_user_db() -> Option<PathBuf> {
    // SAFETY: getuid cannot fail.
    passwd_home(unsafe { libc::getuid() }, 4096)
}

/// Largest buffer offered to `getpwuid_r` before giving up.
#[cfg(unix)]
const PASSWD_BUF_MAX: usize = 1 << 20;

/// Home directory of `uid` from the user database. The buffer starts at
/// `initial_len` bytes and doubles while the entry does not fit.
#[cfg(unix)]
fn passwd_home(uid: libc::uid_t, initial_len: usize) -> Option<PathBuf> {
    use std::ffi::{CStr, OsStr};
    use std::os::unix::ffi::OsStrExt;

    let mut len = initial_len.max(1);
    loop {
        let mut buf = vec![0 as libc::c_char; len];
        // SAFETY: passwd is plain old data; getpwuid_r fills it and points its
        // string fields into `buf`, which outlives every read below.
        let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
        let mut result: *mut libc::passwd = std::ptr::null_mut();
        let rc = unsafe { libc::getpwuid_r(uid, &mut pwd, buf.as_mut_ptr(), buf.len(), &mut result) };

        if rc == libc::ERANGE && len < PASSWD_BUF_MAX {
            len *= 2;
            continue;
        }
        if rc != 0 || result.is_null() || pwd.pw_dir.is_null() {
            return None;
        }
        let dir = unsafe { CStr::from_ptr(pwd.pw_dir) }.to_bytes();
        return (!dir.is_empty()).then(|| PathBuf::from(OsStr::from_bytes(dir)));
    }
}

#[cfg(not(unix))]
fn home_from_user_db() -> Option<PathBuf> {
    None
}

/// Recursively sum the sizes of regular files under `path`.
///
/// Any walk error yields 0; callers treat size as best-effort.
pub fn dir_size(path: &Path) -> u64 {
    let mut total = 0u64;
    for entry in WalkDir::new(path).follow_links(false) {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => return 0,
        };
        if entry.file_type().is_file() {
            match entry.metadata() {
                Ok(m) => total = total.saturating_add(m.len()),
                Err(_) => return 0,
            }
        }
    }
    total
}

/// Latest modification time of anything under `path`, or `None` on failure.
pub fn dir_mod_time(path: &Path) -> Option<SystemTime> {
    let mut latest: Option<SystemTime> = None;
    for entry in WalkDir::new(path).follow_links(false) {
        let modified = entry.ok()?.metadata().ok()?.modified().ok()?;
        if latest.map_or(true, |l| modified > l) {
            latest = Some(modified);
        }
    }
    latest
}

/// Lexically normalize a path: drop `.`, fold `..`, strip trailing separators.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// A path is excluded when any exclude entry is a path-prefix of it.
///
/// Matching is per component, so `/tmp/keep` excludes `/tmp/keep/a` but not
/// `/tmp/keeper`.
pub fn is_excluded(path: &Path, excludes: &[PathBuf]) -> bool {
    let path = normalize(path);
    excludes
        .iter()
        .any(|prefix| path.starts_with(normalize(prefix)))
}

/// Expand a leading `~` and glob patterns in paths
pub fn expand_paths(paths: &[String], home: &Path) -> Vec<PathBuf> {
    let mut expanded = Vec::new();

    for path_str in paths {
        let resolved = match path_str.strip_prefix('~') {
            Some(rest) => format!("{}{}", home.display(), rest),
            None => path_str.clone(),
        };

        if resolved.contains('*') || resolved.contains('?') || resolved.contains('[') {
            if let Ok(entries) = glob::glob(&resolved) {
                expanded.extend(entries.filter_map(|e| e.ok()));
            }
        } else {
            expanded.push(PathBuf::from(resolved));
        }
    }

    expanded
}

/// How long ago `modified` was, saturating at zero for future timestamps.
pub fn age_of(modified: SystemTime) -> std::time::Duration {
    SystemTime::now()
        .duration_since(modified)
        .unwrap_or_default()
}

/// Remove a file or directory tree.
pub fn remove_path(path: &Path) -> Result<()> {
    let meta = std::fs::symlink_metadata(path).map_err(|e| SweepError::from_io(path, e))?;
    let result = if meta.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    result.map_err(|e| SweepError::from_io(path, e))
}
