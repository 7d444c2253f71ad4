//! Entity store backed by a directory tree
//!
//! Layout: `<root>/<collection>/<id>.json` holds one entity. Numbered snapshot files
//! under `<root>/<collection>/.snapshots/` record the content hash of every document at
//! the moment a cursor was handed out; a delta is the difference between the snapshot
//! named by the cursor and the current directory listing.

use super::{AdapterError, AdapterResult, CollectionDelta, Entity, EntityAdapter};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

const DOCUMENT_EXTENSION: &str = "json";
const SNAPSHOT_DIR: &str = ".snapshots";

#[derive(Debug, Serialize, Deserialize)]
struct StoredDocument {
    uuid: Option<String>,
    modified_on: DateTime<Utc>,
    payload: Value,
}

/// Document id -> content hash, as of one cursor
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    entries: BTreeMap<String, String>,
}

pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn create_collection(&self, collection_id: &str) -> AdapterResult<()> {
        validate_name(collection_id)?;
        let dir = self.collection_dir(collection_id);
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create collection {}", dir.display()))?;
        Ok(())
    }

    fn collection_dir(&self, collection_id: &str) -> PathBuf {
        self.root.join(collection_id)
    }

    fn document_path(&self, collection_id: &str, id: &str) -> PathBuf {
        self.collection_dir(collection_id)
            .join(format!("{}.{}", id, DOCUMENT_EXTENSION))
    }

    fn snapshot_path(&self, collection_id: &str, number: u64) -> PathBuf {
        self.collection_dir(collection_id)
            .join(SNAPSHOT_DIR)
            .join(format!("{}.{}", number, DOCUMENT_EXTENSION))
    }

    async fn ensure_root(&self) -> AdapterResult<()> {
        match fs::metadata(&self.root).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(AdapterError::Unavailable(format!(
                "{} is not a directory",
                self.root.display()
            ))),
            Err(e) => Err(AdapterError::Unavailable(format!(
                "{}: {}",
                self.root.display(),
                e
            ))),
        }
    }

    async fn ensure_collection(&self, collection_id: &str) -> AdapterResult<PathBuf> {
        self.ensure_root().await?;
        validate_name(collection_id)?;
        let dir = self.collection_dir(collection_id);
        if !is_dir(&dir).await? {
            return Err(anyhow!("Collection {} does not exist", dir.display()).into());
        }
        Ok(dir)
    }

    async fn read_document(&self, path: &Path) -> AdapterResult<Option<StoredDocument>> {
        match fs::read(path).await {
            Ok(bytes) => {
                let document = serde_json::from_slice(&bytes)
                    .with_context(|| format!("Malformed document {}", path.display()))?;
                Ok(Some(document))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("Failed to read {}", path.display()))
                .into()),
        }
    }

    async fn write_document(&self, path: &Path, document: &StoredDocument) -> AdapterResult<()> {
        let bytes = serde_json::to_vec_pretty(document).context("Failed to encode document")?;
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", staging.display()))?;
        fs::rename(&staging, path)
            .await
            .with_context(|| format!("Failed to move {} into place", path.display()))?;
        Ok(())
    }

    /// Content hash of every document currently in the collection
    async fn scan(&self, dir: &Path) -> AdapterResult<BTreeMap<String, String>> {
        let mut entries = fs::read_dir(dir)
            .await
            .with_context(|| format!("Failed to list {}", dir.display()))?;
        let mut hashes = BTreeMap::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .with_context(|| format!("Failed to list {}", dir.display()))?
        {
            let path = entry.path();
            let Some(id) = document_id(&path) else {
                continue;
            };
            match fs::read(&path).await {
                Ok(bytes) => {
                    hashes.insert(id, format!("{:x}", Sha256::digest(&bytes)));
                }
                // Deleted between listing and reading; the next delta reports it.
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(anyhow::Error::new(e)
                        .context(format!("Failed to read {}", path.display()))
                        .into())
                }
            }
        }
        Ok(hashes)
    }

    async fn snapshot_numbers(&self, collection_id: &str) -> AdapterResult<Vec<u64>> {
        let dir = self.collection_dir(collection_id).join(SNAPSHOT_DIR);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("Failed to list {}", dir.display()))
                    .into())
            }
        };
        let mut numbers = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .with_context(|| format!("Failed to list {}", dir.display()))?
        {
            if let Some(number) = document_id(&entry.path()).and_then(|s| s.parse::<u64>().ok()) {
                numbers.push(number);
            }
        }
        numbers.sort_unstable();
        Ok(numbers)
    }

    async fn load_snapshot(&self, collection_id: &str, number: u64) -> AdapterResult<Option<Snapshot>> {
        let path = self.snapshot_path(collection_id, number);
        match fs::read(&path).await {
            Ok(bytes) => {
                let snapshot = serde_json::from_slice(&bytes)
                    .with_context(|| format!("Malformed snapshot {}", path.display()))?;
                Ok(Some(snapshot))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("Failed to read {}", path.display()))
                .into()),
        }
    }

    async fn store_snapshot(&self, collection_id: &str, number: u64, snapshot: &Snapshot) -> AdapterResult<()> {
        let path = self.snapshot_path(collection_id, number);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let bytes = serde_json::to_vec(snapshot).context("Failed to encode snapshot")?;
        fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Drop snapshots older than the cursor a caller just presented
    async fn prune_snapshots(&self, collection_id: &str, keep_from: u64) -> AdapterResult<()> {
        for number in self.snapshot_numbers(collection_id).await? {
            if number >= keep_from {
                break;
            }
            let path = self.snapshot_path(collection_id, number);
            if let Err(e) = fs::remove_file(&path).await {
                if e.kind() != ErrorKind::NotFound {
                    return Err(anyhow::Error::new(e)
                        .context(format!("Failed to prune {}", path.display()))
                        .into());
                }
            }
            debug!("Pruned snapshot {} of collection {}", number, collection_id);
        }
        Ok(())
    }
}

#[async_trait]
impl EntityAdapter for DirectoryStore {
    async fn probe_collection(&self, collection_id: &str) -> AdapterResult<bool> {
        self.ensure_root().await?;
        validate_name(collection_id)?;
        is_dir(&self.collection_dir(collection_id)).await
    }

    async fn fetch_entity(&self, collection_id: &str, id: &str) -> AdapterResult<Option<Entity>> {
        self.ensure_collection(collection_id).await?;
        if validate_name(id).is_err() {
            return Ok(None);
        }
        let document = self.read_document(&self.document_path(collection_id, id)).await?;
        Ok(document.map(|doc| into_entity(id.to_string(), doc)))
    }

    async fn list_entities(&self, collection_id: &str) -> AdapterResult<Vec<Entity>> {
        let dir = self.ensure_collection(collection_id).await?;
        let ids: Vec<String> = self.scan(&dir).await?.into_keys().collect();
        let mut entities = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(document) = self.read_document(&self.document_path(collection_id, &id)).await? {
                entities.push(into_entity(id, document));
            }
        }
        Ok(entities)
    }

    async fn fetch_collection_delta(
        &self,
        collection_id: &str,
        cursor: Option<&str>,
    ) -> AdapterResult<CollectionDelta> {
        let dir = self.ensure_collection(collection_id).await?;

        let requested = match cursor {
            Some(raw) => Some(
                raw.parse::<u64>()
                    .map_err(|_| AdapterError::StaleCursor(format!("malformed cursor {:?}", raw)))?,
            ),
            None => None,
        };
        let previous = match requested {
            Some(number) => self
                .load_snapshot(collection_id, number)
                .await?
                .ok_or_else(|| {
                    AdapterError::StaleCursor(format!("snapshot {} is no longer available", number))
                })?,
            None => Snapshot::default(),
        };

        let current = self.scan(&dir).await?;
        let mut delta = diff(&previous.entries, &current);

        let next = self
            .snapshot_numbers(collection_id)
            .await?
            .last()
            .map_or(1, |latest| latest + 1);
        self.store_snapshot(collection_id, next, &Snapshot { entries: current })
            .await?;
        // A fresh start abandons every earlier cursor
        self.prune_snapshots(collection_id, requested.unwrap_or(next)).await?;

        debug!(
            "Delta for {} since {:?}: +{} ~{} -{} (cursor {})",
            collection_id,
            cursor,
            delta.added.len(),
            delta.modified.len(),
            delta.deleted.len(),
            next
        );
        delta.new_cursor = next.to_string();
        Ok(delta)
    }

    async fn create_entity(&self, collection_id: &str, source: &Entity) -> AdapterResult<Entity> {
        self.ensure_collection(collection_id).await?;
        let id = Uuid::new_v4().to_string();
        let document = StoredDocument {
            uuid: source.uuid.clone(),
            modified_on: Utc::now(),
            payload: source.payload.clone(),
        };
        self.write_document(&self.document_path(collection_id, &id), &document)
            .await?;
        debug!("Created {} in {}", id, collection_id);
        Ok(into_entity(id, document))
    }

    async fn update_entity(
        &self,
        collection_id: &str,
        target_id: &str,
        source: &Entity,
    ) -> AdapterResult<Entity> {
        self.ensure_collection(collection_id).await?;
        validate_name(target_id)?;
        let path = self.document_path(collection_id, target_id);
        let existing = self.read_document(&path).await?.ok_or_else(|| {
            AdapterError::Rejected(format!("{} does not exist in {}", target_id, collection_id))
        })?;
        let document = StoredDocument {
            uuid: source.uuid.clone().or(existing.uuid),
            modified_on: Utc::now(),
            payload: source.payload.clone(),
        };
        self.write_document(&path, &document).await?;
        debug!("Updated {} in {}", target_id, collection_id);
        Ok(into_entity(target_id.to_string(), document))
    }

    async fn delete_entity(&self, collection_id: &str, target_id: &str) -> AdapterResult<bool> {
        self.ensure_collection(collection_id).await?;
        validate_name(target_id)?;
        let path = self.document_path(collection_id, target_id);
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Deleted {} from {}", target_id, collection_id);
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("Failed to delete {}", path.display()))
                .into()),
        }
    }
}

fn into_entity(id: String, document: StoredDocument) -> Entity {
    Entity {
        id,
        uuid: document.uuid,
        signature: None,
        modified_on: document.modified_on,
        payload: document.payload,
    }
}

fn document_id(path: &Path) -> Option<String> {
    if path.extension().and_then(|e| e.to_str()) != Some(DOCUMENT_EXTENSION) {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    if stem.starts_with('.') {
        return None;
    }
    Some(stem.to_string())
}

fn validate_name(name: &str) -> AdapterResult<()> {
    if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
        return Err(AdapterError::Rejected(format!("invalid name {:?}", name)));
    }
    Ok(())
}

async fn is_dir(path: &Path) -> AdapterResult<bool> {
    match fs::metadata(path).await {
        Ok(meta) => Ok(meta.is_dir()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(anyhow::Error::new(e)
            .context(format!("Failed to inspect {}", path.display()))
            .into()),
    }
}

fn diff(previous: &BTreeMap<String, String>, current: &BTreeMap<String, String>) -> CollectionDelta {
    let mut delta = CollectionDelta::default();
    for (id, hash) in current {
        match previous.get(id) {
            None => delta.added.push(id.clone()),
            Some(old) if old != hash => delta.modified.push(id.clone()),
            Some(_) => {}
        }
    }
    delta.deleted = previous
        .keys()
        .filter(|id| !current.contains_key(*id))
        .cloned()
        .collect();
    delta
}
