//! File system utils.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tokio::io::AsyncWriteExt;

pub struct FsHandler;

impl FsHandler {
    /// Create a target directory (and its parents) if it doesn't exist.
    ///
    /// Returns the directories that had to be created, deepest first, so a
    /// caller that abandons the write can remove them again.
    pub async fn create_target_directory(path: &Path) -> anyhow::Result<Vec<PathBuf>> {
        let mut created = Vec::new();
        let mut current = Some(path);
        while let Some(dir) = current {
            if dir.as_os_str().is_empty() || tokio::fs::try_exists(dir).await.unwrap_or(true) {
                break;
            }
            created.push(dir.to_path_buf());
            current = dir.parent();
        }

        tokio::fs::create_dir_all(path)
            .await
            .context(format!("Failed to create directory {}", path.display()))?;

        let metadata = tokio::fs::metadata(path)
            .await
            .context("Failed to get metadata for target directory")?;
        if metadata.permissions().readonly() {
            anyhow::bail!("Target directory {} is read-only", path.display());
        }

        tracing::trace!("Target directory ready: {}", path.display());
        Ok(created)
    }

    /// Remove directories returned by [`Self::create_target_directory`], as long as they are empty.
    pub async fn remove_empty_dirs(dirs: &[PathBuf]) {
        for dir in dirs {
            match tokio::fs::remove_dir(dir).await {
                Ok(()) => tracing::trace!(path = %dir.display(), "Directory removed"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                // Not empty: something else lives here, and in every parent.
                Err(_) => break,
            }
        }
    }

    /// Path of the hidden staging file for `dest`, unique per call.
    ///
    /// Staging files live next to their destination so the final rename never
    /// crosses a file system boundary.
    pub fn staging_path(dest: &Path) -> anyhow::Result<PathBuf> {
        Self::sibling_path(dest, "tmp")
    }

    /// Path of the hidden backup of `dest`, unique per call.
    pub fn backup_path(dest: &Path) -> anyhow::Result<PathBuf> {
        Self::sibling_path(dest, "bak")
    }

    fn sibling_path(dest: &Path, extension: &str) -> anyhow::Result<PathBuf> {
        let parent = dest
            .parent()
            .context("File path must have a parent directory")?;
        let file_name = dest
            .file_name()
            .and_then(|name| name.to_str())
            .context("File path must end in a UTF-8 file name")?;

        Ok(parent.join(format!(
            ".{file_name}.{:016x}.{extension}",
            rand::random::<u64>()
        )))
    }

    /// Hard-link the current contents of `dest` to a backup path.
    ///
    /// Returns `None` when `dest` does not exist yet. `dest` itself stays in
    /// place, so readers keep seeing it until it is replaced.
    pub async fn backup_existing(dest: &Path) -> anyhow::Result<Option<PathBuf>> {
        match tokio::fs::symlink_metadata(dest).await {
            Ok(_) => {
                let backup = Self::backup_path(dest)?;
                tokio::fs::hard_link(dest, &backup)
                    .await
                    .context(format!("Failed to back up {}", dest.display()))?;
                Ok(Some(backup))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).context(format!("Failed to inspect {}", dest.display())),
        }
    }

    /// Write `contents` to `path` and flush it to disk.
    pub async fn write_synced(path: &Path, contents: &[u8]) -> anyhow::Result<()> {
        let mut file = tokio::fs::File::create(path)
            .await
            .context(format!("Failed to create {}", path.display()))?;
        file.write_all(contents)
            .await
            .context(format!("Failed to write {}", path.display()))?;
        file.sync_all()
            .await
            .context(format!("Failed to sync {}", path.display()))?;
        Ok(())
    }

    /// Remove a file, logging instead of failing.
    pub async fn remove_quietly(path: &Path) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove temporary file");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_staging_path_is_hidden_sibling() {
        let dest = PathBuf::from("/srv/pages/json_config/config.json");

        let first = FsHandler::staging_path(&dest).unwrap();
        let second = FsHandler::staging_path(&dest).unwrap();

        assert_eq!(first.parent(), dest.parent());
        let name = first.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with(".config.json."));
        assert!(name.ends_with(".tmp"));
        assert_ne!(first, second);
    }

    #[test]
    fn test_backup_path_differs_from_staging_path() {
        let dest = PathBuf::from("/srv/pages/server/config.json");

        let backup = FsHandler::backup_path(&dest).unwrap();

        assert_eq!(backup.parent(), dest.parent());
        assert!(backup.to_str().unwrap().ends_with(".bak"));
    }

    #[tokio::test]
    async fn test_write_synced_and_remove() {
        let temp_dir = TempDir::new("flightsurety-test").expect("Failed to create temp dir");
        let nested = temp_dir.path().join("pages/server");

        let created = FsHandler::create_target_directory(&nested).await.unwrap();
        assert_eq!(created, vec![nested.clone(), temp_dir.path().join("pages")]);

        let path = nested.join("config.json");
        FsHandler::write_synced(&path, b"{}").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"{}");

        FsHandler::remove_quietly(&path).await;
        assert!(!path.exists());

        // Removing twice is not an error.
        FsHandler::remove_quietly(&path).await;

        FsHandler::remove_empty_dirs(&created).await;
        assert!(!temp_dir.path().join("pages").exists());
    }

    #[tokio::test]
    async fn test_existing_directory_is_not_reported_as_created() {
        let temp_dir = TempDir::new("flightsurety-test").expect("Failed to create temp dir");

        let created = FsHandler::create_target_directory(temp_dir.path())
            .await
            .unwrap();

        assert!(created.is_empty());
    }

    #[tokio::test]
    async fn test_remove_empty_dirs_keeps_populated_parent() {
        let temp_dir = TempDir::new("flightsurety-test").expect("Failed to create temp dir");
        let pages = temp_dir.path().join("pages");
        let created = FsHandler::create_target_directory(&pages.join("json_config"))
            .await
            .unwrap();
        std::fs::write(pages.join("index.html"), b"<html/>").unwrap();

        FsHandler::remove_empty_dirs(&created).await;

        assert!(!pages.join("json_config").exists());
        assert!(pages.join("index.html").exists());
    }

    #[tokio::test]
    async fn test_backup_existing() {
        let temp_dir = TempDir::new("flightsurety-test").expect("Failed to create temp dir");
        let dest = temp_dir.path().join("config.json");

        assert!(FsHandler::backup_existing(&dest).await.unwrap().is_none());

        std::fs::write(&dest, b"previous").unwrap();
        let backup = FsHandler::backup_existing(&dest).await.unwrap().unwrap();
        assert_eq!(std::fs::read(&backup).unwrap(), b"previous");
        assert_eq!(std::fs::read(&dest).unwrap(), b"previous");
    }
}
