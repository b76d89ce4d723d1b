//! Zip archive ingestion into a flat image directory.
//!
//! Every image entry lands in the destination under its base filename. When
//! that name is taken, `_1`, `_2`, ... is inserted before the extension until
//! a free name can be created, so nothing is ever overwritten.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

use tracing::{debug, trace};
use zip::ZipArchive;

use crate::core::errors::{StorageError, StorageResult};
use crate::core::types::ImageFormat;

/// Last path component of an archive entry name.
///
/// Zips built on Windows sometimes use backslashes, so both separators count.
pub fn entry_basename(entry_name: &str) -> &str {
    entry_name
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(entry_name)
}

/// `stem.ext`, `stem_1.ext`, `stem_2.ext`, ... for `attempt` 0, 1, 2, ...
fn numbered_name(file_name: &str, attempt: usize) -> String {
    if attempt == 0 {
        return file_name.to_string();
    }
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}_{attempt}.{ext}"),
        _ => format!("{file_name}_{attempt}"),
    }
}

/// Create the first free name in the numbered sequence for `file_name`.
///
/// The existence check and the creation are one `create_new` open, so two
/// concurrent extractions can never claim the same name.
pub fn create_unique(dir: &Path, file_name: &str) -> StorageResult<(String, File)> {
    let mut attempt = 0usize;
    loop {
        let candidate = numbered_name(file_name, attempt);
        let path = dir.join(&candidate);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((candidate, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(StorageError::io(&path, e)),
        }
    }
}

/// Extract every image entry of `archive_path` into `dest_dir`.
///
/// Directories, non-image entries and macOS resource forks are skipped.
/// Returns the names written, in archive order. A failure part-way leaves
/// already-extracted files in place.
pub fn extract_images(archive_path: &Path, dest_dir: &Path) -> StorageResult<Vec<String>> {
    let file = File::open(archive_path).map_err(|e| StorageError::io(archive_path, e))?;
    let mut archive = ZipArchive::new(file)?;
    let mut added = Vec::new();

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let entry_name = entry.name().to_string();

        if entry.is_dir() || entry_name.starts_with("__MACOSX") {
            trace!("Skipping archive entry {}", entry_name);
            continue;
        }

        let base = entry_basename(&entry_name);
        if base.is_empty() || ImageFormat::from_filename(base).is_none() {
            trace!("Skipping non-image archive entry {}", entry_name);
            continue;
        }

        let (file_name, mut out) = create_unique(dest_dir, base)?;
        io::copy(&mut entry, &mut out).map_err(|e| StorageError::io(dest_dir.join(&file_name), e))?;

        debug!("Extracted {} -> {}", entry_name, file_name);
        added.push(file_name);
    }

    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, data) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_duplicate_entries_get_numbered_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let pool = dir.path().join("pool");
        std::fs::create_dir(&pool).unwrap();
        let archive = dir.path().join("pages.zip");
        write_zip(
            &archive,
            &[("ch1/a.png", b"first"), ("ch2/a.png", b"second")],
        );

        let added = extract_images(&archive, &pool).unwrap();

        assert_eq!(added, vec!["a.png".to_string(), "a_1.png".to_string()]);
        assert_eq!(std::fs::read(pool.join("a.png")).unwrap(), b"first");
        assert_eq!(std::fs::read(pool.join("a_1.png")).unwrap(), b"second");
    }

    #[test]
    fn test_existing_pool_files_are_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("p.jpg"), b"old").unwrap();
        std::fs::write(dir.path().join("p_1.jpg"), b"old").unwrap();
        let archive = dir.path().join("in.zip");
        write_zip(&archive, &[("p.jpg", b"new")]);

        let added = extract_images(&archive, dir.path()).unwrap();

        assert_eq!(added, vec!["p_2.jpg".to_string()]);
        assert_eq!(std::fs::read(dir.path().join("p.jpg")).unwrap(), b"old");
    }

    #[test]
    fn test_non_images_and_metadata_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let pool = dir.path().join("pool");
        std::fs::create_dir(&pool).unwrap();
        let archive = dir.path().join("mixed.zip");
        write_zip(
            &archive,
            &[
                ("readme.txt", b"x"),
                ("__MACOSX/._cover.png", b"x"),
                ("cover.WEBP", b"img"),
                ("scans/002.jpeg", b"img"),
            ],
        );

        let added = extract_images(&archive, &pool).unwrap();

        assert_eq!(added, vec!["cover.WEBP".to_string(), "002.jpeg".to_string()]);
    }

    #[test]
    fn test_create_unique_without_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("page"), b"keep").unwrap();

        let (name, _) = create_unique(dir.path(), "page").unwrap();
        assert_eq!(name, "page_1");
        let (name, _) = create_unique(dir.path(), "other.png").unwrap();
        assert_eq!(name, "other.png");
        assert_eq!(std::fs::read(dir.path().join("page")).unwrap(), b"keep");
    }

    #[test]
    fn test_concurrent_extractions_never_share_a_name() {
        for round in 0..50 {
            let dir = tempfile::tempdir().unwrap();
            let pool = dir.path().join("pool");
            std::fs::create_dir(&pool).unwrap();
            let first = dir.path().join("first.zip");
            let second = dir.path().join("second.zip");
            write_zip(&first, &[("a.png", b"first")]);
            write_zip(&second, &[("a.png", b"second")]);

            let barrier = std::sync::Arc::new(std::sync::Barrier::new(2));
            let handles: Vec<_> = [first, second]
                .into_iter()
                .map(|archive| {
                    let pool = pool.clone();
                    let barrier = barrier.clone();
                    std::thread::spawn(move || {
                        barrier.wait();
                        extract_images(&archive, &pool).unwrap()
                    })
                })
                .collect();
            let mut names: Vec<String> = handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect();
            names.sort();

            assert_eq!(names, vec!["a.png", "a_1.png"], "round {round}");
            let mut contents = vec![
                std::fs::read(pool.join("a.png")).unwrap(),
                std::fs::read(pool.join("a_1.png")).unwrap(),
            ];
            contents.sort();
            assert_eq!(contents, vec![b"first".to_vec(), b"second".to_vec()]);
        }
    }

    #[test]
    fn test_entry_basename_handles_both_separators() {
        assert_eq!(entry_basename("a/b/c.png"), "c.png");
        assert_eq!(entry_basename("a\\b\\c.png"), "c.png");
        assert_eq!(entry_basename("c.png"), "c.png");
    }
}
