//! Path resolution — filesystem confinement to the declared working set.
//!
//! Resolution is lexical plus stat: `.`/`..` are normalised without touching
//! the filesystem, containment is checked against the working-set roots, and
//! symbolic links are refused rather than followed. On Unix the final
//! component is additionally probed with an `O_NOFOLLOW` open so the kernel
//! itself rejects link tricks; other hosts rely on the lexical walk and
//! `symlink_metadata` checks.

use std::path::{Component, Path, PathBuf};

use talon_core::{Error, Result};

/// Resolve `raw` to an absolute, normalised path confined to `working_set`.
///
/// Relative paths are anchored at the first working-set root. Fails with
/// `PathEscape` when the normalised path leaves every root (or the working
/// set is empty), and `SymlinkLoop` when any component is a symbolic link.
///
/// Resolution is idempotent: `resolve_path(resolve_path(p)) == resolve_path(p)`.
pub fn resolve_path(raw: &str, working_set: &[PathBuf]) -> Result<PathBuf> {
    if working_set.is_empty() {
        return Err(Error::PathEscape { path: raw.into() });
    }

    let input = Path::new(raw);
    let anchored: PathBuf = if input.is_absolute() {
        input.to_path_buf()
    } else {
        working_set[0].join(input)
    };

    let normalized = lexical_normalize(&anchored, raw)?;

    if !working_set.iter().any(|root| normalized.starts_with(root)) {
        return Err(Error::PathEscape { path: raw.into() });
    }

    refuse_symlinks(&normalized, raw)?;

    #[cfg(unix)]
    probe_no_follow(&normalized, raw)?;

    Ok(normalized)
}

/// Collapse `.` and `..` components without touching the filesystem.
/// Popping above the root means the caller tried to traverse out.
fn lexical_normalize(path: &Path, raw: &str) -> Result<PathBuf> {
    let mut stack: Vec<std::ffi::OsString> = Vec::new();
    let mut prefix = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(p) => prefix.push(p.as_os_str()),
            Component::RootDir => {
                prefix.push(std::path::MAIN_SEPARATOR_STR);
                stack.clear();
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if stack.pop().is_none() {
                    return Err(Error::PathEscape { path: raw.into() });
                }
            }
            Component::Normal(part) => stack.push(part.to_os_string()),
        }
    }
    let mut out = prefix;
    for part in stack {
        out.push(part);
    }
    Ok(out)
}

/// Stat every existing component; any symlink is refused. Only metadata
/// reads are performed, links are never followed.
fn refuse_symlinks(path: &Path, raw: &str) -> Result<()> {
    let mut current = PathBuf::new();
    for component in path.components() {
        current.push(component.as_os_str());
        match std::fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => {
                return Err(Error::SymlinkLoop { path: raw.into() });
            }
            // Missing components are fine (e.g. a file about to be written).
            _ => {}
        }
    }
    Ok(())
}

/// Kernel-level no-follow probe of the final component.
#[cfg(unix)]
fn probe_no_follow(path: &Path, raw: &str) -> Result<()> {
    use std::fs::OpenOptions;
    use std::os::unix::fs::OpenOptionsExt;

    match OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NOFOLLOW | libc::O_CLOEXEC)
        .open(path)
    {
        Ok(_) => Ok(()),
        Err(e) => match e.raw_os_error() {
            Some(code) if code == libc::ELOOP => Err(Error::SymlinkLoop { path: raw.into() }),
            // Directories, missing files, and permission quirks are not
            // link violations; the lexical walk already vetted them.
            _ => Ok(()),
        },
    }
}
