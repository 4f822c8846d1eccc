//! Directory Junction primitive for `MOVE_APP`-on-directory, plus the
//! copy/verify/redirect flow that uses it.
//!
//! Ported from `symlinks.py` (see `DESIGN.md`). The original shells out to
//! `mklink /J`/`rmdir`; this version creates the NTFS reparse point directly
//! via `DeviceIoControl`, which needs no subprocess and works without a
//! console attached. Non-Windows targets fall back to a directory symlink,
//! matching the original's own "stand-in for testing" behavior.

#![allow(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use crate::core::errors::{DmError, Result};

/// Outcome of [`AppMigrator::migrate_app`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    Migrated { target: PathBuf },
    DryRun { target: PathBuf },
    Skipped { reason: String },
}

/// Moves an application directory under `target_root` and leaves a junction
/// (or, off Windows, a symlink) at the original location.
pub struct AppMigrator {
    target_root: PathBuf,
}

impl AppMigrator {
    #[must_use]
    pub fn new(target_root: PathBuf) -> Self {
        Self { target_root }
    }

    /// Migrate `source` (must be an existing directory) to `target_root/<leaf>`,
    /// then redirect `source` to it via a junction/symlink.
    ///
    /// Steps, each of which can abort the migration cleanly: copy, verify by
    /// file count, remove original, create junction (rolling back to the
    /// copied data if junction creation fails).
    pub fn migrate_app(&self, source: &Path, dry_run: bool) -> Result<MigrationOutcome> {
        if !source.exists() {
            return Ok(MigrationOutcome::Skipped {
                reason: "source not found".to_string(),
            });
        }
        if !source.is_dir() {
            return Ok(MigrationOutcome::Skipped {
                reason: "source is not a directory".to_string(),
            });
        }

        let leaf = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let target = self.target_root.join(&leaf);

        if target.exists() {
            return Ok(MigrationOutcome::Skipped {
                reason: "target already exists".to_string(),
            });
        }
        if dry_run {
            return Ok(MigrationOutcome::DryRun { target });
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| DmError::io(parent, e))?;
        }
        copy_dir_recursive(source, &target)?;

        let source_count = count_files(source)?;
        let target_count = count_files(&target)?;
        if source_count != target_count {
            let _ = fs::remove_dir_all(&target);
            return Err(DmError::IntegrityFailure {
                path: source.to_path_buf(),
                details: format!(
                    "copy verification failed: source has {source_count} files, target has {target_count}"
                ),
            });
        }

        fs::remove_dir_all(source).map_err(|e| DmError::io(source, e))?;

        if let Err(err) = create_junction(source, &target) {
            // Junction creation failed — move the data back so nothing is lost.
            let _ = fs::rename(&target, source);
            return Err(err);
        }

        Ok(MigrationOutcome::Migrated { target })
    }
}

fn copy_dir_recursive(from: &Path, to: &Path) -> Result<()> {
    fs::create_dir_all(to).map_err(|e| DmError::io(to, e))?;
    for entry in fs::read_dir(from).map_err(|e| DmError::io(from, e))? {
        let entry = entry.map_err(|e| DmError::io(from, e))?;
        let dest = to.join(entry.file_name());
        let file_type = entry.file_type().map_err(|e| DmError::io(&entry.path(), e))?;
        if file_type.is_dir() {
            copy_dir_recursive(&entry.path(), &dest)?;
        } else {
            fs::copy(entry.path(), &dest).map_err(|e| DmError::io(&entry.path(), e))?;
        }
    }
    Ok(())
}

fn count_files(dir: &Path) -> Result<usize> {
    let mut count = 0usize;
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        for entry in fs::read_dir(&current).map_err(|e| DmError::io(&current, e))? {
            let entry = entry.map_err(|e| DmError::io(&current, e))?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                count += 1;
            }
        }
    }
    Ok(count)
}

/// Whether `path` is a junction (Windows) or a directory symlink (elsewhere).
#[cfg(windows)]
#[must_use]
pub fn is_redirection(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

#[cfg(not(windows))]
#[must_use]
pub fn is_redirection(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

/// Remove a junction/symlink at `path` without touching its target.
pub fn remove_junction(path: &Path) -> Result<()> {
    #[cfg(windows)]
    {
        fs::remove_dir(path).map_err(|e| DmError::io(path, e))
    }
    #[cfg(not(windows))]
    {
        fs::remove_file(path).map_err(|e| DmError::io(path, e))
    }
}

#[cfg(windows)]
fn create_junction(link: &Path, target: &Path) -> Result<()> {
    win::create_junction(link, target)
}

#[cfg(not(windows))]
fn create_junction(link: &Path, target: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, link).map_err(|e| DmError::io(link, e))?;
    Ok(())
}

#[cfg(windows)]
mod win {
    //! Raw `DeviceIoControl` plumbing for NTFS mount-point reparse points.
    //!
    //! The `REPARSE_DATA_BUFFER` layout and the `FSCTL_SET_REPARSE_POINT`/
    //! `IO_REPARSE_TAG_MOUNT_POINT` constants are documented NTFS/Windows SDK
    //! values not exposed by `windows-sys`'s high-level bindings; they're
    //! reproduced here the way every junction-creation crate in the ecosystem
    //! does it.

    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;
    use std::path::Path;

    use windows_sys::Win32::Foundation::{CloseHandle, HANDLE, INVALID_HANDLE_VALUE};
    use windows_sys::Win32::Storage::FileSystem::{
        CreateFileW, FILE_FLAG_BACKUP_SEMANTICS, FILE_FLAG_OPEN_REPARSE_POINT, FILE_SHARE_READ,
        FILE_SHARE_WRITE, GENERIC_WRITE, OPEN_EXISTING,
    };
    use windows_sys::Win32::System::IO::DeviceIoControl;

    use crate::core::errors::{DmError, Result};

    const FSCTL_SET_REPARSE_POINT: u32 = 0x0009_0016;
    const IO_REPARSE_TAG_MOUNT_POINT: u32 = 0xA000_0003;
    const MAXIMUM_REPARSE_DATA_BUFFER_SIZE: usize = 16 * 1024;

    pub(super) fn create_junction(link: &Path, target: &Path) -> Result<()> {
        std::fs::create_dir(link).map_err(|e| DmError::io(link, e))?;

        let handle = open_reparse_handle(link)?;
        let buffer = build_mount_point_buffer(target)?;

        let mut bytes_returned: u32 = 0;
        // SAFETY: `handle` is a valid, just-opened file handle with backup
        // semantics and reparse-point access; `buffer` is sized and populated
        // per the documented `REPARSE_DATA_BUFFER` mount-point layout.
        let ok = unsafe {
            DeviceIoControl(
                handle,
                FSCTL_SET_REPARSE_POINT,
                buffer.as_ptr().cast(),
                u32::try_from(buffer.len()).unwrap_or(0),
                std::ptr::null_mut(),
                0,
                &mut bytes_returned,
                std::ptr::null_mut(),
            )
        };

        // SAFETY: `handle` came from a successful `CreateFileW` above.
        unsafe {
            CloseHandle(handle);
        }

        if ok == 0 {
            let _ = std::fs::remove_dir(link);
            return Err(DmError::StorageFailure {
                path: link.to_path_buf(),
                details: format!(
                    "DeviceIoControl(FSCTL_SET_REPARSE_POINT) failed: {:?}",
                    std::io::Error::last_os_error()
                ),
            });
        }
        Ok(())
    }

    fn open_reparse_handle(path: &Path) -> Result<HANDLE> {
        let wide: Vec<u16> = OsStr::new(path)
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();
        // SAFETY: `wide` is a valid, nul-terminated UTF-16 path string; all
        // other arguments are plain values with no aliasing requirements.
        let handle = unsafe {
            CreateFileW(
                wide.as_ptr(),
                GENERIC_WRITE,
                FILE_SHARE_READ | FILE_SHARE_WRITE,
                std::ptr::null(),
                OPEN_EXISTING,
                FILE_FLAG_BACKUP_SEMANTICS | FILE_FLAG_OPEN_REPARSE_POINT,
                0,
            )
        };
        if handle == INVALID_HANDLE_VALUE {
            return Err(DmError::io(path, std::io::Error::last_os_error()));
        }
        Ok(handle)
    }

    /// Build a `REPARSE_DATA_BUFFER` for an NTFS mount point redirecting to
    /// `target`, using the Win32 `\??\` non-parsed-path prefix.
    fn build_mount_point_buffer(target: &Path) -> Result<Vec<u8>> {
        let target_str = target.to_string_lossy();
        let substitute_name: Vec<u16> = format!(r"\??\{target_str}").encode_utf16().collect();
        let print_name: Vec<u16> = target_str.encode_utf16().collect();

        let substitute_name_bytes = substitute_name.len() * 2;
        let print_name_bytes = print_name.len() * 2;
        // +2 for the mandatory trailing NUL shared by both strings' path buffer.
        let path_buffer_bytes = substitute_name_bytes + 2 + print_name_bytes + 2;
        let reparse_data_length = 8 + path_buffer_bytes;
        let total_len = 8 + reparse_data_length;

        if total_len > MAXIMUM_REPARSE_DATA_BUFFER_SIZE {
            return Err(DmError::InvalidConfig {
                details: format!("junction target path too long: {target_str}"),
            });
        }

        let mut buf = vec![0u8; total_len];
        buf[0..4].copy_from_slice(&IO_REPARSE_TAG_MOUNT_POINT.to_le_bytes());
        buf[4..6].copy_from_slice(&(reparse_data_length as u16).to_le_bytes());
        // buf[6..8] reserved, left zero.
        buf[8..10].copy_from_slice(&0u16.to_le_bytes()); // SubstituteNameOffset
        buf[10..12].copy_from_slice(&(substitute_name_bytes as u16).to_le_bytes());
        buf[12..14].copy_from_slice(&((substitute_name_bytes + 2) as u16).to_le_bytes()); // PrintNameOffset
        buf[14..16].copy_from_slice(&(print_name_bytes as u16).to_le_bytes());

        let mut offset = 16;
        for unit in &substitute_name {
            buf[offset..offset + 2].copy_from_slice(&unit.to_le_bytes());
            offset += 2;
        }
        offset += 2; // substitute name NUL terminator
        for unit in &print_name {
            buf[offset..offset + 2].copy_from_slice(&unit.to_le_bytes());
            offset += 2;
        }
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_source_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let migrator = AppMigrator::new(dir.path().join("apps"));
        let outcome = migrator
            .migrate_app(&dir.path().join("nope"), false)
            .unwrap();
        assert_eq!(
            outcome,
            MigrationOutcome::Skipped {
                reason: "source not found".to_string()
            }
        );
    }

    #[test]
    fn file_source_is_skipped_not_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("file.txt");
        fs::write(&source, b"x").unwrap();
        let migrator = AppMigrator::new(dir.path().join("apps"));
        let outcome = migrator.migrate_app(&source, false).unwrap();
        assert_eq!(
            outcome,
            MigrationOutcome::Skipped {
                reason: "source is not a directory".to_string()
            }
        );
    }

    #[test]
    fn existing_target_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("App");
        fs::create_dir_all(&source).unwrap();
        let target_root = dir.path().join("apps");
        fs::create_dir_all(target_root.join("App")).unwrap();

        let migrator = AppMigrator::new(target_root);
        let outcome = migrator.migrate_app(&source, false).unwrap();
        assert_eq!(
            outcome,
            MigrationOutcome::Skipped {
                reason: "target already exists".to_string()
            }
        );
    }

    #[test]
    fn dry_run_reports_target_without_touching_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("App");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("a.txt"), b"1").unwrap();

        let target_root = dir.path().join("apps");
        let migrator = AppMigrator::new(target_root.clone());
        let outcome = migrator.migrate_app(&source, true).unwrap();

        assert_eq!(
            outcome,
            MigrationOutcome::DryRun {
                target: target_root.join("App")
            }
        );
        assert!(source.exists());
        assert!(!target_root.exists());
    }

    #[cfg(not(windows))]
    #[test]
    fn migrates_and_leaves_a_symlink_stand_in_on_non_windows() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("App");
        fs::create_dir_all(source.join("sub")).unwrap();
        fs::write(source.join("a.txt"), b"1").unwrap();
        fs::write(source.join("sub").join("b.txt"), b"2").unwrap();

        let target_root = dir.path().join("apps");
        let migrator = AppMigrator::new(target_root.clone());
        let outcome = migrator.migrate_app(&source, false).unwrap();

        let target = target_root.join("App");
        assert_eq!(outcome, MigrationOutcome::Migrated { target: target.clone() });
        assert!(source.is_symlink());
        assert!(target.join("a.txt").exists());
        assert!(target.join("sub").join("b.txt").exists());
    }
}
