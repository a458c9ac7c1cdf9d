use kube::api::PropagationPolicy;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;

use crate::transform::{Disposition, Transformer};
use crate::util::{self, Error, ANNOTATION_CREATED};

mod client;
mod document;

pub use client::*;
pub use document::*;

/// Where the documents of a manifest come from.
#[derive(Clone, Debug, PartialEq)]
pub enum Source {
    /// A single file, or every manifest file in a directory.
    Path { path: PathBuf, recursive: bool },

    /// A list of URLs or file paths, loaded in order.
    Locations(Vec<String>),
}

/// Ordered collection of resource documents applied as a group.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Manifest {
    documents: Vec<Document>,
}

/// Result of applying a single document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Created,
    Updated,
    Unchanged,
}

fn is_manifest_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml") | Some("yml") | Some("json")
    )
}

fn collect_files(path: &Path, recursive: bool, files: &mut Vec<PathBuf>) -> Result<(), Error> {
    if path.is_file() {
        files.push(path.to_path_buf());
        return Ok(());
    }
    for entry in std::fs::read_dir(path)? {
        let entry = entry?.path();
        if entry.is_dir() {
            if recursive {
                collect_files(&entry, recursive, files)?;
            }
        } else if is_manifest_file(&entry) {
            files.push(entry);
        }
    }
    Ok(())
}

async fn fetch(location: &str) -> Result<String, Error> {
    if location.starts_with("http://") || location.starts_with("https://") {
        let body = reqwest::get(location)
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(body)
    } else {
        Ok(std::fs::read_to_string(location)?)
    }
}

impl Manifest {
    pub fn new(documents: Vec<Document>) -> Self {
        Manifest { documents }
    }

    /// Parses a multi-document YAML (or JSON) stream. Empty documents are skipped.
    pub fn from_yaml(yaml: &str) -> Result<Self, Error> {
        let mut documents = Vec::new();
        for de in serde_yaml::Deserializer::from_str(yaml) {
            let value = Value::deserialize(de)?;
            if value.is_null() {
                continue;
            }
            documents.push(Document::from_value(value)?);
        }
        Ok(Manifest { documents })
    }

    /// Loads every document of the source. Files of a directory are
    /// read in path order so the result is deterministic.
    pub async fn load(source: &Source) -> Result<Self, Error> {
        let mut manifest = Manifest::default();
        match source {
            Source::Path { path, recursive } => {
                let mut files = Vec::new();
                collect_files(path, *recursive, &mut files)?;
                files.sort();
                for file in files {
                    let content = std::fs::read_to_string(&file)?;
                    let parsed = Manifest::from_yaml(&content).map_err(|e| {
                        Error::ManifestError(format!("{}: {}", file.display(), e))
                    })?;
                    manifest = manifest.append(parsed);
                }
            }
            Source::Locations(locations) => {
                for location in locations {
                    let content = fetch(location).await?;
                    let parsed = Manifest::from_yaml(&content).map_err(|e| {
                        Error::ManifestError(format!("{}: {}", location, e))
                    })?;
                    manifest = manifest.append(parsed);
                }
            }
        }
        Ok(manifest)
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Returns a new manifest with every transformer applied to every
    /// document, in order. Rejected documents are dropped. The first
    /// failing transformer aborts the whole chain.
    pub fn transform(&self, transformers: &[&dyn Transformer]) -> Result<Manifest, Error> {
        let mut documents = Vec::with_capacity(self.documents.len());
        'docs: for doc in &self.documents {
            let mut doc = doc.clone();
            for transformer in transformers {
                if transformer.transform(&mut doc)? == Disposition::Reject {
                    continue 'docs;
                }
            }
            documents.push(doc);
        }
        Ok(Manifest { documents })
    }

    /// Returns the documents matching the predicate.
    pub fn filter<F>(&self, predicate: F) -> Manifest
    where
        F: Fn(&Document) -> bool,
    {
        Manifest {
            documents: self
                .documents
                .iter()
                .filter(|doc| predicate(doc))
                .cloned()
                .collect(),
        }
    }

    pub fn append(mut self, other: Manifest) -> Manifest {
        self.documents.extend(other.documents);
        self
    }

    pub fn find_deployment(&self, name: &str) -> Option<&Document> {
        self.documents
            .iter()
            .find(|doc| doc.kind() == "Deployment" && doc.name() == name)
    }

    /// Creates or updates every document, in order.
    pub async fn apply(&self, client: &dyn ManifestClient) -> Result<(), Error> {
        for doc in &self.documents {
            apply_document(client, doc).await?;
        }
        Ok(())
    }

    /// Applies the manifest. If the cluster rejects an update as invalid,
    /// every document is deleted, and recreated once it is gone.
    pub async fn apply_or_recreate(
        &self,
        client: &dyn ManifestClient,
        interval: Duration,
        timeout: Duration,
    ) -> Result<(), Error> {
        match self.apply(client).await {
            Err(e) if e.is_invalid() => {
                tracing::warn!(error = %e, "update rejected, recreating resources");
                self.recreate(client, interval, timeout).await
            }
            result => result,
        }
    }

    /// Deletes every document, waits for them to disappear and applies again.
    pub async fn recreate(
        &self,
        client: &dyn ManifestClient,
        interval: Duration,
        timeout: Duration,
    ) -> Result<(), Error> {
        self.delete(client, PropagationPolicy::Foreground).await?;
        self.wait_for_removal(client, interval, timeout).await?;
        self.apply(client).await
    }

    async fn wait_for_removal(
        &self,
        client: &dyn ManifestClient,
        interval: Duration,
        timeout: Duration,
    ) -> Result<(), Error> {
        let deadline = Instant::now() + timeout;
        loop {
            let mut remaining = None;
            for doc in &self.documents {
                if live_object(client, doc).await?.is_some() {
                    remaining = Some(doc);
                    break;
                }
            }
            let doc = match remaining {
                None => return Ok(()),
                Some(doc) => doc,
            };
            if Instant::now() >= deadline {
                return Err(Error::Timeout(format!(
                    "{} still exists after {:?}",
                    doc.describe(),
                    timeout
                )));
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// Deletes every document in reverse order. Documents that are already
    /// gone are skipped, as are namespaces the operator did not create.
    pub async fn delete(
        &self,
        client: &dyn ManifestClient,
        policy: PropagationPolicy,
    ) -> Result<(), Error> {
        for doc in self.documents.iter().rev() {
            let live = match live_object(client, doc).await? {
                Some(live) => live,
                None => continue,
            };
            if doc.kind() == "Namespace" && !live.has_true_annotation(ANNOTATION_CREATED) {
                continue;
            }
            tracing::info!("Deleting {}", doc.describe());
            match client.delete(doc, policy.clone()).await {
                Err(e) if e.is_not_found() => {}
                result => result?,
            }
        }
        Ok(())
    }
}

/// Looks up the live object, treating a not-found answer as absence.
async fn live_object(
    client: &dyn ManifestClient,
    doc: &Document,
) -> Result<Option<Document>, Error> {
    match client.get(doc).await {
        Err(e) if e.is_not_found() => Ok(None),
        result => result,
    }
}

/// Creates the document if it does not exist. Otherwise the desired
/// fields are merged onto the live object, which is only written back
/// if the merge changed anything.
pub async fn apply_document(
    client: &dyn ManifestClient,
    desired: &Document,
) -> Result<ApplyOutcome, Error> {
    let live = match client.get(desired).await? {
        Some(live) => live,
        None => {
            let mut doc = desired.clone();
            if doc.kind() == "Namespace" {
                doc.set_annotation(ANNOTATION_CREATED, "true");
            }
            tracing::info!("Creating {}", doc.describe());
            client.create(&doc).await?;
            return Ok(ApplyOutcome::Created);
        }
    };
    let mut merged = live.as_value().clone();
    util::merge(&mut merged, desired.as_value());
    let patch = json_patch::diff(live.as_value(), &merged);
    if patch.0.is_empty() {
        return Ok(ApplyOutcome::Unchanged);
    }
    tracing::info!(diff = ?patch, "Updating {}", desired.describe());
    client.update(&Document::from_value(merged)?).await?;
    Ok(ApplyOutcome::Updated)
}
