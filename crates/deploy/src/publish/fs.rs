//! Directory-backed publish target.

use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;

use super::{Document, StagedWrite, TargetSink};
use crate::fs::FsHandler;

/// Publishes documents as files in a directory.
///
/// Each document is written to a hidden staging file in the same directory and
/// renamed over its destination on commit, so a reader sees either the previous
/// file or the new one, never a partial write. The previous files are
/// hard-linked aside first; if any rename fails, the ones already replaced are
/// restored and the directory ends up exactly as it was.
#[derive(Debug, Clone)]
pub struct FsSink {
    dir: PathBuf,
}

impl FsSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Write `document` next to `dest`, returning the staging path.
    async fn stage_document(dest: &Path, document: &Document) -> anyhow::Result<PathBuf> {
        let staging = FsHandler::staging_path(dest)?;
        if let Err(e) = FsHandler::write_synced(&staging, &document.contents).await {
            FsHandler::remove_quietly(&staging).await;
            return Err(e);
        }
        Ok(staging)
    }
}

/// A staging file and the destination it replaces.
#[derive(Debug)]
struct StagedFile {
    staging: PathBuf,
    dest: PathBuf,
}

/// A destination already replaced during commit, and the backup of what it held.
#[derive(Debug)]
struct Swapped<'a> {
    dest: &'a Path,
    backup: Option<PathBuf>,
}

#[derive(Debug)]
struct StagedFiles {
    files: Vec<StagedFile>,
    created_dirs: Vec<PathBuf>,
}

impl StagedFiles {
    async fn remove_all(files: &[StagedFile]) {
        for file in files {
            FsHandler::remove_quietly(&file.staging).await;
        }
    }

    /// Replace `file.dest` with its staged contents, returning the backup of the old file.
    async fn swap(file: &StagedFile) -> anyhow::Result<Option<PathBuf>> {
        let backup = FsHandler::backup_existing(&file.dest).await?;

        if let Err(e) = tokio::fs::rename(&file.staging, &file.dest).await {
            if let Some(backup) = &backup {
                FsHandler::remove_quietly(backup).await;
            }
            return Err(e).context(format!("Failed to replace {}", file.dest.display()));
        }

        Ok(backup)
    }

    /// Put back every swapped destination. Returns whether all of them were restored.
    async fn roll_back(swapped: &[Swapped<'_>]) -> bool {
        let mut restored = true;
        for swap in swapped.iter().rev() {
            let result = match &swap.backup {
                Some(backup) => tokio::fs::rename(backup, swap.dest).await,
                None => tokio::fs::remove_file(swap.dest).await,
            };
            if let Err(e) = result {
                tracing::error!(
                    path = %swap.dest.display(),
                    error = %e,
                    "Failed to restore previous document"
                );
                restored = false;
            }
        }
        restored
    }
}

#[async_trait]
impl TargetSink for FsSink {
    async fn stage(&self, documents: Vec<Document>) -> anyhow::Result<Box<dyn StagedWrite>> {
        let created_dirs = FsHandler::create_target_directory(&self.dir).await?;

        let mut files = Vec::with_capacity(documents.len());
        for document in documents {
            let dest = self.dir.join(&document.file);
            let staging = match Self::stage_document(&dest, &document).await {
                Ok(staging) => staging,
                Err(e) => {
                    StagedFiles::remove_all(&files).await;
                    FsHandler::remove_empty_dirs(&created_dirs).await;
                    return Err(e.context(format!("Failed to stage {}", document.file)));
                }
            };

            tracing::trace!(
                kind = %document.kind,
                staging = %staging.display(),
                dest = %dest.display(),
                "Document staged"
            );
            files.push(StagedFile { staging, dest });
        }

        Ok(Box::new(StagedFiles {
            files,
            created_dirs,
        }))
    }
}

#[async_trait]
impl StagedWrite for StagedFiles {
    async fn commit(self: Box<Self>) -> anyhow::Result<()> {
        let mut swapped = Vec::with_capacity(self.files.len());
        for (i, file) in self.files.iter().enumerate() {
            match StagedFiles::swap(file).await {
                Ok(backup) => swapped.push(Swapped {
                    dest: &file.dest,
                    backup,
                }),
                Err(e) => {
                    StagedFiles::remove_all(&self.files[i..]).await;
                    if !StagedFiles::roll_back(&swapped).await {
                        return Err(e.context("rollback incomplete, target holds documents from two runs"));
                    }
                    FsHandler::remove_empty_dirs(&self.created_dirs).await;
                    return Err(e);
                }
            }
        }

        for swap in &swapped {
            if let Some(backup) = &swap.backup {
                FsHandler::remove_quietly(backup).await;
            }
        }
        Ok(())
    }

    async fn discard(self: Box<Self>) {
        StagedFiles::remove_all(&self.files).await;
        FsHandler::remove_empty_dirs(&self.created_dirs).await;
    }
}
