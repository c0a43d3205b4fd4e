//! In-memory publish target, for tests and dry runs.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;

use super::{Document, StagedWrite, TargetSink};

/// Where a [`MemorySink`] should fail, if anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePoint {
    Stage,
    Commit,
}

type Files = Arc<Mutex<BTreeMap<String, Vec<u8>>>>;

/// Keeps published documents in a shared map.
///
/// Clones share the same map, so a test can hand one clone to the publisher
/// and inspect the other.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    files: Files,
    failure: Option<FailurePoint>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that fails at `point` on every publish.
    pub fn failing(point: FailurePoint) -> Self {
        Self {
            files: Files::default(),
            failure: Some(point),
        }
    }

    /// A copy of the committed files.
    pub fn files(&self) -> BTreeMap<String, Vec<u8>> {
        self.files.lock().map(|f| f.clone()).unwrap_or_default()
    }

    pub fn get(&self, file: &str) -> Option<Vec<u8>> {
        self.files.lock().ok()?.get(file).cloned()
    }
}

struct StagedDocuments {
    files: Files,
    documents: Vec<Document>,
    fail: bool,
}

#[async_trait]
impl TargetSink for MemorySink {
    async fn stage(&self, documents: Vec<Document>) -> anyhow::Result<Box<dyn StagedWrite>> {
        if self.failure == Some(FailurePoint::Stage) {
            anyhow::bail!("memory sink configured to fail while staging");
        }

        Ok(Box::new(StagedDocuments {
            files: self.files.clone(),
            documents,
            fail: self.failure == Some(FailurePoint::Commit),
        }))
    }
}

#[async_trait]
impl StagedWrite for StagedDocuments {
    async fn commit(self: Box<Self>) -> anyhow::Result<()> {
        let Self {
            files,
            documents,
            fail,
        } = *self;

        if fail {
            anyhow::bail!("memory sink configured to fail while committing");
        }

        let mut files = files
            .lock()
            .map_err(|_| anyhow::anyhow!("memory sink lock poisoned"))?;
        for document in documents {
            files.insert(document.file, document.contents.to_vec());
        }
        Ok(())
    }

    async fn discard(self: Box<Self>) {}
}
