// File pools backing the session: uploaded page images and processed crops
//
// Each pool is a flat directory addressed by filename. Clients refer to
// entries by URL ("/uploads/<name>"); only the last path segment is used.

pub mod archive;

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::core::errors::{StorageError, StorageResult};
use crate::core::types::{ClearSummary, ImageFormat, UploadKind};

/// Normalize an uploaded filename the way werkzeug's `secure_filename` does:
/// ASCII letters, digits, `.`, `_` and `-` survive, whitespace becomes `_`,
/// everything else is dropped, and leading dots/underscores are stripped.
pub fn sanitize_filename(filename: &str) -> String {
    let base = archive::entry_basename(filename);
    let mapped: String = base
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    mapped
        .trim_start_matches(|c| c == '.' || c == '_')
        .to_string()
}

/// A flat directory of named files.
#[derive(Debug, Clone)]
pub struct ImagePool {
    root: PathBuf,
    url_prefix: String,
}

impl ImagePool {
    pub fn new(root: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            url_prefix: url_prefix.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn ensure_dir(&self) -> StorageResult<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| StorageError::io(&self.root, e))
    }

    /// Public reference for an entry, e.g. `/uploads/page.png`
    pub fn url_for(&self, name: &str) -> String {
        format!("{}/{}", self.url_prefix, name)
    }

    /// Map a client reference (bare name or URL) to an entry name.
    pub fn resolve_name(reference: &str) -> StorageResult<&str> {
        let name = reference.rsplit('/').next().unwrap_or(reference);
        if name.is_empty()
            || name == "."
            || name == ".."
            || name.contains('\\')
            || name.contains('\0')
        {
            return Err(StorageError::InvalidFilename(reference.to_string()));
        }
        Ok(name)
    }

    fn path_for(&self, reference: &str) -> StorageResult<(String, PathBuf)> {
        let name = Self::resolve_name(reference)?;
        Ok((name.to_string(), self.root.join(name)))
    }

    pub async fn read(&self, reference: &str) -> StorageResult<Vec<u8>> {
        let (name, path) = self.path_for(reference)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound(name)),
            Err(e) => Err(StorageError::io(&path, e)),
        }
    }

    pub async fn write(&self, name: &str, bytes: &[u8]) -> StorageResult<PathBuf> {
        let (_, path) = self.path_for(name)?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| StorageError::io(&path, e))?;
        Ok(path)
    }

    /// Store one uploaded file. Images are written under their sanitized
    /// name; archives are unpacked into the pool and then deleted.
    ///
    /// Returns the names of the images that were added.
    pub async fn store_upload(&self, filename: &str, bytes: &[u8]) -> StorageResult<Vec<String>> {
        let name = sanitize_filename(filename);
        if name.is_empty() {
            return Err(StorageError::InvalidFilename(filename.to_string()));
        }

        match UploadKind::from_filename(&name) {
            None => Err(StorageError::UnsupportedExtension(name)),
            Some(UploadKind::Image(_)) => {
                self.write(&name, bytes).await?;
                debug!("Stored uploaded image {}", name);
                Ok(vec![name])
            }
            Some(UploadKind::Archive) => {
                let archive_path = self.write(&name, bytes).await?;
                self.ingest_archive(archive_path).await
            }
        }
    }

    /// Unpack an archive already sitting on disk into the pool, then remove it.
    pub async fn ingest_archive(&self, archive_path: PathBuf) -> StorageResult<Vec<String>> {
        let dest = self.root.clone();
        let source = archive_path.clone();
        let added = tokio::task::spawn_blocking(move || archive::extract_images(&source, &dest))
            .await
            .map_err(|e| StorageError::TaskJoinFailed(e.to_string()))??;

        tokio::fs::remove_file(&archive_path)
            .await
            .map_err(|e| StorageError::io(&archive_path, e))?;

        info!(
            "Extracted {} images from {}",
            added.len(),
            archive_path.display()
        );
        Ok(added)
    }

    /// Names of all images currently in the pool, sorted.
    pub async fn list_images(&self) -> StorageResult<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| StorageError::io(&self.root, e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io(&self.root, e))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| StorageError::io(entry.path(), e))?;
            if !file_type.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if ImageFormat::from_filename(name).is_some() {
                    names.push(name.to_string());
                }
            }
        }

        names.sort();
        Ok(names)
    }

    /// Remove every file under the pool, then any directory left empty.
    /// The pool root itself is kept.
    pub async fn clear(&self) -> StorageResult<ClearSummary> {
        let mut summary = ClearSummary::default();
        if !tokio::fs::try_exists(&self.root)
            .await
            .map_err(|e| StorageError::io(&self.root, e))?
        {
            return Ok(summary);
        }

        clear_dir(&self.root, &mut summary).await?;
        info!(
            "Cleared {}: {} files, {} directories",
            self.root.display(),
            summary.files_removed,
            summary.dirs_removed
        );
        Ok(summary)
    }
}

/// Bottom-up sweep. Boxed because async recursion needs an indirection.
fn clear_dir<'a>(
    dir: &'a Path,
    summary: &'a mut ClearSummary,
) -> futures::future::BoxFuture<'a, StorageResult<()>> {
    Box::pin(async move {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| StorageError::io(dir, e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io(dir, e))?
        {
            let path = entry.path();
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| StorageError::io(&path, e))?;

            if file_type.is_dir() {
                clear_dir(&path, summary).await?;
                let mut inner = tokio::fs::read_dir(&path)
                    .await
                    .map_err(|e| StorageError::io(&path, e))?;
                let is_empty = inner
                    .next_entry()
                    .await
                    .map_err(|e| StorageError::io(&path, e))?
                    .is_none();
                if is_empty {
                    tokio::fs::remove_dir(&path)
                        .await
                        .map_err(|e| StorageError::io(&path, e))?;
                    summary.dirs_removed += 1;
                }
            } else {
                debug!("Removing file: {}", path.display());
                tokio::fs::remove_file(&path)
                    .await
                    .map_err(|e| StorageError::io(&path, e))?;
                summary.files_removed += 1;
            }
        }

        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buf = std::io::Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buf);
            for (name, data) in entries {
                zip.start_file(*name, SimpleFileOptions::default()).unwrap();
                zip.write_all(data).unwrap();
            }
            zip.finish().unwrap();
        }
        buf.into_inner()
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("My Page 01.png"), "My_Page_01.png");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("..hidden.jpg"), "hidden.jpg");
        assert_eq!(sanitize_filename("ページ.png"), "png");
        assert_eq!(sanitize_filename("////"), "");
    }

    #[test]
    fn test_resolve_name_takes_last_segment() {
        assert_eq!(ImagePool::resolve_name("/uploads/a.png").unwrap(), "a.png");
        assert_eq!(ImagePool::resolve_name("http://host/uploads/b.jpg").unwrap(), "b.jpg");
        assert!(ImagePool::resolve_name("/uploads/").is_err());
        assert!(ImagePool::resolve_name("..").is_err());
        assert!(ImagePool::resolve_name("a\\..\\b.png").is_err());
    }

    #[tokio::test]
    async fn test_store_image_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let pool = ImagePool::new(dir.path(), "/uploads/");

        let added = pool.store_upload("page 2.PNG", b"png").await.unwrap();
        pool.store_upload("page1.jpg", b"jpg").await.unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        assert_eq!(added, vec!["page_2.PNG".to_string()]);
        assert_eq!(
            pool.list_images().await.unwrap(),
            vec!["page1.jpg".to_string(), "page_2.PNG".to_string()]
        );
        assert_eq!(pool.url_for("page1.jpg"), "/uploads/page1.jpg");
        assert_eq!(pool.read("/uploads/page1.jpg").await.unwrap(), b"jpg");
    }

    #[tokio::test]
    async fn test_store_archive_extracts_and_removes_zip() {
        let dir = tempfile::tempdir().unwrap();
        let pool = ImagePool::new(dir.path(), "/uploads");
        let bytes = zip_bytes(&[("a.png", b"1"), ("x/a.png", b"2"), ("info.txt", b"3")]);

        let added = pool.store_upload("chapter.zip", &bytes).await.unwrap();

        assert_eq!(added, vec!["a.png".to_string(), "a_1.png".to_string()]);
        assert!(!dir.path().join("chapter.zip").exists());
        assert_eq!(pool.list_images().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_store_rejects_disallowed_extension() {
        let dir = tempfile::tempdir().unwrap();
        let pool = ImagePool::new(dir.path(), "/uploads");

        let err = pool.store_upload("script.exe", b"MZ").await.unwrap_err();
        assert!(matches!(err, StorageError::UnsupportedExtension(_)));
        let err = pool.store_upload("", b"").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidFilename(_)));
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let pool = ImagePool::new(dir.path(), "/uploads");
        let err = pool.read("/uploads/ghost.png").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(name) if name == "ghost.png"));
    }

    #[tokio::test]
    async fn test_clear_removes_files_and_empty_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let pool = ImagePool::new(dir.path(), "/uploads");
        std::fs::write(dir.path().join("a.png"), b"1").unwrap();
        std::fs::create_dir_all(dir.path().join("nested/deeper")).unwrap();
        std::fs::write(dir.path().join("nested/deeper/b.png"), b"2").unwrap();

        let summary = pool.clear().await.unwrap();

        assert_eq!(summary, ClearSummary { files_removed: 2, dirs_removed: 2 });
        assert!(dir.path().exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        // Clearing an already empty pool is fine
        assert_eq!(pool.clear().await.unwrap(), ClearSummary::default());
    }

    #[tokio::test]
    async fn test_clear_missing_root_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let pool = ImagePool::new(dir.path().join("never-created"), "/uploads");
        assert_eq!(pool.clear().await.unwrap(), ClearSummary::default());
    }
}
