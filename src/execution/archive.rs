//! `ARCHIVE` action: zip creation under `<archive_root>/YYYY-MM/`.
//!
//! Ported from `executor.py::_execute_archive`. The original is preserved —
//! archiving never removes the source (`SPEC_FULL.md` §4.4).

use std::fs::{self, File};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::core::errors::{DmError, Result};
use crate::execution::checksum::CHUNK_SIZE;

/// Compute the archive directory for `now`, e.g. `<archive_root>/2026-07/`.
#[must_use]
pub fn archive_month_dir(archive_root: &Path, year: i32, month: u32) -> PathBuf {
    archive_root.join(format!("{year:04}-{month:02}"))
}

/// Pick a collision-free archive path for `stem` inside `dir`: `<stem>.zip`,
/// then `<stem>_1.zip`, `<stem>_2.zip`, … (`SPEC_FULL.md` §4.4).
#[must_use]
pub fn pick_archive_path(dir: &Path, stem: &str) -> PathBuf {
    let mut candidate = dir.join(format!("{stem}.zip"));
    let mut counter = 1u32;
    while candidate.exists() {
        candidate = dir.join(format!("{stem}_{counter}.zip"));
        counter += 1;
    }
    candidate
}

/// Create `archive_path`, storing `source` (file or directory) with deflate
/// compression. For a directory, every file underneath is stored with a path
/// relative to the directory's *parent*, matching the original's
/// `fp.relative_to(src.parent)`.
pub fn create_archive(source: &Path, archive_path: &Path) -> Result<()> {
    if let Some(parent) = archive_path.parent() {
        fs::create_dir_all(parent).map_err(|source_err| DmError::io(parent, source_err))?;
    }
    let file = File::create(archive_path).map_err(|source_err| DmError::io(archive_path, source_err))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    if source.is_file() {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        write_entry(&mut zip, source, &name, options)?;
    } else if source.is_dir() {
        let parent = source.parent().unwrap_or(source);
        for entry in walk_files(source)? {
            let relative = entry
                .strip_prefix(parent)
                .unwrap_or(&entry)
                .to_string_lossy()
                .replace('\\', "/");
            write_entry(&mut zip, &entry, &relative, options)?;
        }
    }

    zip.finish()
        .map_err(|e| DmError::StorageFailure {
            path: archive_path.to_path_buf(),
            details: e.to_string(),
        })?;
    Ok(())
}

fn write_entry(
    zip: &mut ZipWriter<File>,
    path: &Path,
    name: &str,
    options: SimpleFileOptions,
) -> Result<()> {
    zip.start_file(name, options).map_err(|e| DmError::StorageFailure {
        path: path.to_path_buf(),
        details: e.to_string(),
    })?;
    let file = File::open(path).map_err(|source_err| DmError::io(path, source_err))?;
    let mut reader = BufReader::with_capacity(CHUNK_SIZE, file);
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let read = reader.read(&mut buf).map_err(|source_err| DmError::io(path, source_err))?;
        if read == 0 {
            break;
        }
        zip.write_all(&buf[..read])
            .map_err(|source_err| DmError::io(path, source_err))?;
    }
    Ok(())
}

fn walk_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let entries = fs::read_dir(&current).map_err(|source_err| DmError::io(&current, source_err))?;
        for entry in entries {
            let entry = entry.map_err(|source_err| DmError::io(&current, source_err))?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                out.push(path);
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pick_archive_path_avoids_collisions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("thesis.zip"), b"x").unwrap();
        let picked = pick_archive_path(dir.path(), "thesis");
        assert_eq!(picked, dir.path().join("thesis_1.zip"));
    }

    #[test]
    fn pick_archive_path_no_collision_uses_bare_stem() {
        let dir = tempfile::tempdir().unwrap();
        let picked = pick_archive_path(dir.path(), "report");
        assert_eq!(picked, dir.path().join("report.zip"));
    }

    #[test]
    fn archives_a_single_file_and_preserves_original() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.txt");
        std::fs::write(&src, b"hello").unwrap();
        let archive_path = dir.path().join("out.zip");

        create_archive(&src, &archive_path).unwrap();

        assert!(archive_path.exists());
        assert!(src.exists(), "archiving must not remove the source");

        let file = File::open(&archive_path).unwrap();
        let mut zip = zip::ZipArchive::new(file).unwrap();
        assert_eq!(zip.len(), 1);
        let entry = zip.by_index(0).unwrap();
        assert_eq!(entry.name(), "a.txt");
    }

    #[test]
    fn archives_a_directory_with_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("project");
        std::fs::create_dir_all(src.join("sub")).unwrap();
        std::fs::write(src.join("a.txt"), b"1").unwrap();
        std::fs::write(src.join("sub").join("b.txt"), b"2").unwrap();
        let archive_path = dir.path().join("proj.zip");

        create_archive(&src, &archive_path).unwrap();

        let file = File::open(&archive_path).unwrap();
        let mut zip = zip::ZipArchive::new(file).unwrap();
        assert_eq!(zip.len(), 2);
        let names: Vec<String> = (0..zip.len())
            .map(|i| zip.by_index(i).unwrap().name().to_string())
            .collect();
        assert!(names.iter().any(|n| n.ends_with("project/a.txt")));
        assert!(names.iter().any(|n| n.ends_with("project/sub/b.txt")));
    }
}
