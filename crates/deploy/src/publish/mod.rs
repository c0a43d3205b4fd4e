//! Publishing the config document and interface descriptors to every target.
//!
//! A publish runs in two phases. First every target stages its documents
//! somewhere invisible to consumers. Only when all targets have staged does
//! any of them swap the new documents into place. A staging failure therefore
//! leaves every target untouched. A commit failure leaves the targets split
//! between runs, and is reported as [`PublishFailure::Inconsistent`].

mod fs;
mod memory;

use std::{collections::HashSet, fmt, path::Path, sync::Arc};

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use sha2::{Digest, Sha256};

pub use fs::FsSink;
pub use memory::{FailurePoint, MemorySink};

use crate::{
    artifact::InterfaceDescriptor,
    config::NetworkConfig,
    error::{PublishFailure, TargetFailure},
};

/// The documents a target can receive.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum DocumentKind {
    /// The network config document.
    Config,
    /// The data contract's interface descriptor.
    DataAbi,
    /// The app contract's interface descriptor.
    AppAbi,
}

/// One document a target receives, and the file name it is stored under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSpec {
    pub kind: DocumentKind,
    pub file: String,
}

impl DocumentSpec {
    pub fn new(kind: DocumentKind, file: impl Into<String>) -> Self {
        Self {
            kind,
            file: file.into(),
        }
    }
}

/// A rendered document ready to be written.
#[derive(Debug, Clone)]
pub struct Document {
    pub kind: DocumentKind,
    pub file: String,
    pub contents: Arc<[u8]>,
}

/// Storage behind a publish target.
#[async_trait]
pub trait TargetSink: Send + Sync + fmt::Debug {
    /// Write `documents` somewhere consumers cannot see them yet.
    ///
    /// On error, nothing the sink wrote may remain visible.
    async fn stage(&self, documents: Vec<Document>) -> anyhow::Result<Box<dyn StagedWrite>>;
}

/// Documents staged by a [`TargetSink`], waiting to be swapped in or thrown away.
#[async_trait]
pub trait StagedWrite: Send {
    /// Atomically replace the target's documents with the staged ones.
    async fn commit(self: Box<Self>) -> anyhow::Result<()>;

    /// Drop the staged documents, leaving the target as it was.
    async fn discard(self: Box<Self>);
}

/// A named destination and the documents it receives.
#[derive(Debug)]
pub struct PublishTarget {
    name: String,
    documents: Vec<DocumentSpec>,
    sink: Box<dyn TargetSink>,
}

impl PublishTarget {
    pub fn new(
        name: impl Into<String>,
        documents: Vec<DocumentSpec>,
        sink: impl TargetSink + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            documents,
            sink: Box::new(sink),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn documents(&self) -> &[DocumentSpec] {
        &self.documents
    }

    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("publish target name must not be empty".to_string());
        }
        if self.documents.is_empty() {
            return Err(format!("publish target {} receives no documents", self.name));
        }

        let mut files = HashSet::new();
        for spec in &self.documents {
            if !is_plain_file_name(&spec.file) {
                return Err(format!(
                    "publish target {}: {:?} is not a plain file name",
                    self.name, spec.file
                ));
            }
            if !files.insert(spec.file.as_str()) {
                return Err(format!(
                    "publish target {} writes {} twice",
                    self.name, spec.file
                ));
            }
        }

        Ok(())
    }
}

fn is_plain_file_name(file: &str) -> bool {
    let mut components = Path::new(file).components();
    matches!(
        (components.next(), components.next()),
        (Some(std::path::Component::Normal(_)), None)
    )
}

/// The interface descriptors of both contracts.
#[derive(Debug, Clone, Copy)]
pub struct Descriptors<'a> {
    pub data: &'a InterfaceDescriptor,
    pub app: &'a InterfaceDescriptor,
}

/// A target that received the new documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedTarget {
    pub name: String,
    pub files: Vec<String>,
}

/// Outcome of a successful publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    /// Hex SHA-256 of the config document every target received.
    pub config_digest: String,
    pub targets: Vec<PublishedTarget>,
}

/// Every document of a run, rendered once so all targets get the same bytes.
struct RenderedDocuments {
    config: Arc<[u8]>,
    data_abi: Arc<[u8]>,
    app_abi: Arc<[u8]>,
}

impl RenderedDocuments {
    fn render(config: &NetworkConfig, descriptors: Descriptors<'_>) -> Result<Self, PublishFailure> {
        Ok(Self {
            config: render_pretty(DocumentKind::Config, &config.to_document())?,
            data_abi: render_pretty(DocumentKind::DataAbi, descriptors.data)?,
            app_abi: render_pretty(DocumentKind::AppAbi, descriptors.app)?,
        })
    }

    fn get(&self, kind: DocumentKind) -> Arc<[u8]> {
        match kind {
            DocumentKind::Config => self.config.clone(),
            DocumentKind::DataAbi => self.data_abi.clone(),
            DocumentKind::AppAbi => self.app_abi.clone(),
        }
    }

    fn select(&self, specs: &[DocumentSpec]) -> Vec<Document> {
        specs
            .iter()
            .map(|spec| Document {
                kind: spec.kind,
                file: spec.file.clone(),
                contents: self.get(spec.kind),
            })
            .collect()
    }
}

/// Serialize as tab-indented JSON, the layout the web and server consumers read.
fn render_pretty<T: Serialize + ?Sized>(
    kind: DocumentKind,
    value: &T,
) -> Result<Arc<[u8]>, PublishFailure> {
    let mut buf = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"\t"));
    value
        .serialize(&mut serializer)
        .map_err(|e| PublishFailure::Render {
            document: kind.to_string(),
            reason: e.to_string(),
        })?;
    Ok(buf.into())
}

/// Writes a run's documents to a fixed set of targets, all or nothing.
#[derive(Debug)]
pub struct ArtifactPublisher {
    targets: Vec<PublishTarget>,
}

impl ArtifactPublisher {
    /// Create a publisher over `targets`.
    ///
    /// Fails if there are no targets, if two share a name, or if a target's
    /// document list is unusable.
    pub fn new(targets: Vec<PublishTarget>) -> Result<Self, String> {
        if targets.is_empty() {
            return Err("at least one publish target is required".to_string());
        }

        let mut names = HashSet::new();
        for target in &targets {
            target.validate()?;
            if !names.insert(target.name.as_str()) {
                return Err(format!("duplicate publish target name {}", target.name));
            }
        }

        Ok(Self { targets })
    }

    pub fn targets(&self) -> &[PublishTarget] {
        &self.targets
    }

    /// Publish `config` and both descriptors to every target.
    pub async fn publish(
        &self,
        config: &NetworkConfig,
        descriptors: Descriptors<'_>,
    ) -> Result<PublishReport, PublishFailure> {
        let rendered = RenderedDocuments::render(config, descriptors)?;
        let config_digest = hex::encode(Sha256::digest(&rendered.config));

        tracing::info!(
            network = config.network_name(),
            targets = self.targets.len(),
            %config_digest,
            "Staging documents..."
        );

        let staged = join_all(self.targets.iter().map(|target| {
            let documents = rendered.select(&target.documents);
            async move { (target, target.sink.stage(documents).await) }
        }))
        .await;

        let mut ready = Vec::with_capacity(staged.len());
        let mut failures = Vec::new();
        for (target, result) in staged {
            match result {
                Ok(write) => ready.push((target, write)),
                Err(e) => {
                    tracing::error!(name = %target.name, error = %format!("{e:#}"), "Staging failed");
                    failures.push(TargetFailure {
                        target: target.name.clone(),
                        reason: format!("{e:#}"),
                    });
                }
            }
        }

        if !failures.is_empty() {
            join_all(ready.into_iter().map(|(_, write)| write.discard())).await;
            return Err(PublishFailure::Staging { failures });
        }

        let committed = join_all(
            ready
                .into_iter()
                .map(|(target, write)| async move { (target, write.commit().await) }),
        )
        .await;

        let mut published = Vec::with_capacity(committed.len());
        for (target, result) in committed {
            match result {
                Ok(()) => {
                    tracing::debug!(name = %target.name, "Documents committed");
                    published.push(PublishedTarget {
                        name: target.name.clone(),
                        files: target.documents.iter().map(|d| d.file.clone()).collect(),
                    });
                }
                Err(e) => {
                    tracing::error!(name = %target.name, error = %format!("{e:#}"), "Commit failed");
                    failures.push(TargetFailure {
                        target: target.name.clone(),
                        reason: format!("{e:#}"),
                    });
                }
            }
        }

        if !failures.is_empty() {
            return Err(PublishFailure::Inconsistent {
                committed: published.into_iter().map(|t| t.name).collect(),
                failures,
            });
        }

        tracing::info!(targets = published.len(), "Documents published");

        Ok(PublishReport {
            config_digest,
            targets: published,
        })
    }
}
