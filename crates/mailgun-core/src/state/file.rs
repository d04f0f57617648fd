// # File State Store
//
// Observed state kept in one JSON document next to the manifest.
//
// ## Durability
//
// - Each change is serialized to `<file>.tmp` and renamed over the file
// - The previous document is copied to `<file>.backup` before the rename
// - An unparseable document is replaced by its backup when that one parses
// - `serial` increases on every write so stale copies can be spotted by eye
//
// ## Layout
//
// ```json
// {
//   "version": "1.0",
//   "serial": 7,
//   "resources": {
//     "mailgun_route.inbound": {
//       "id": "5d9fde0fd8b861ec16cf2549",
//       "state": { "type": "mailgun_route", "attributes": { ... } },
//       "last_updated": "2025-01-09T12:00:00Z"
//     }
//   }
// }
// ```
//
// The file holds SMTP passwords in clear text; protect it like the
// manifest itself.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::Error;
use crate::traits::state_store::{StateRecord, StateStore};

const FORMAT_VERSION: &str = "1.0";

type Resources = BTreeMap<String, StateRecord>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Document {
    version: String,
    #[serde(default)]
    serial: u64,
    #[serde(default)]
    resources: Resources,
}

/// Outcome of reading one candidate file
enum Loaded {
    Missing,
    Parsed(Document),
    Unparseable(String),
}

/// JSON-file state store
///
/// Every `put` and `delete` is written through before it becomes visible to
/// `get`, so memory never holds a change the file lacks.
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
    doc: Mutex<Document>,
}

fn io_error(action: &str, path: &Path, e: impl std::fmt::Display) -> Error {
    Error::state_store(format!("{} {}: {}", action, path.display(), e))
}

impl FileStateStore {
    /// Open the state file at `path`, creating parent directories
    ///
    /// A missing file is empty state. A corrupted one falls back to the
    /// backup, and to empty state when the backup is unusable too.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty())
            && !dir.exists()
        {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| Error::config(format!("cannot create {}: {}", dir.display(), e)))?;
        }

        let document = Self::open(&path).await?;
        tracing::debug!(
            "State file {} holds {} resources (serial {})",
            path.display(),
            document.resources.len(),
            document.serial
        );

        Ok(Self {
            path,
            doc: Mutex::new(document),
        })
    }

    /// Path of the state file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn open(path: &Path) -> Result<Document, Error> {
        let reason = match Self::read(path).await? {
            Loaded::Missing => return Ok(Document::default()),
            Loaded::Parsed(doc) => return Ok(doc),
            Loaded::Unparseable(reason) => reason,
        };

        let backup = Self::sibling(path, "backup");
        tracing::warn!("State file {} is unreadable: {}", path.display(), reason);

        match Self::read(&backup).await? {
            Loaded::Parsed(doc) => {
                tracing::warn!(
                    "Using backup {} ({} resources)",
                    backup.display(),
                    doc.resources.len()
                );
                if let Err(e) = fs::copy(&backup, path).await {
                    tracing::error!("Could not copy backup over {}: {}", path.display(), e);
                }
                Ok(doc)
            }
            Loaded::Missing => {
                tracing::warn!("No backup to recover from, starting empty");
                Ok(Document::default())
            }
            Loaded::Unparseable(e) => {
                tracing::error!("Backup is unreadable as well ({}), starting empty", e);
                Ok(Document::default())
            }
        }
    }

    async fn read(path: &Path) -> Result<Loaded, Error> {
        let text = match fs::read_to_string(path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Loaded::Missing),
            Err(e) => return Err(io_error("reading", path, e)),
        };

        let doc: Document = match serde_json::from_str(&text) {
            Ok(doc) => doc,
            Err(e) => return Ok(Loaded::Unparseable(e.to_string())),
        };

        if doc.version != FORMAT_VERSION {
            tracing::warn!(
                "{} has format version {}, this build writes {}",
                path.display(),
                doc.version,
                FORMAT_VERSION
            );
        }
        Ok(Loaded::Parsed(doc))
    }

    /// Apply `change` to a copy of the document, write the copy out, and
    /// only then make it the current document
    async fn update(&self, change: impl FnOnce(&mut Resources) -> bool) -> Result<(), Error> {
        let mut current = self.doc.lock().await;

        let mut resources = current.resources.clone();
        if !change(&mut resources) {
            return Ok(());
        }

        let next = Document {
            version: FORMAT_VERSION.to_string(),
            serial: current.serial + 1,
            resources,
        };
        self.write(&next).await?;

        tracing::trace!("Wrote {} (serial {})", self.path.display(), next.serial);
        *current = next;
        Ok(())
    }

    async fn write(&self, document: &Document) -> Result<(), Error> {
        let json = serde_json::to_vec_pretty(document)
            .map_err(|e| Error::state_store(format!("serializing state: {}", e)))?;

        let tmp = Self::sibling(&self.path, "tmp");
        let mut file = fs::File::create(&tmp)
            .await
            .map_err(|e| io_error("creating", &tmp, e))?;
        file.write_all(&json)
            .await
            .map_err(|e| io_error("writing", &tmp, e))?;
        file.sync_all()
            .await
            .map_err(|e| io_error("syncing", &tmp, e))?;
        drop(file);

        if fs::try_exists(&self.path).await.unwrap_or(false) {
            let backup = Self::sibling(&self.path, "backup");
            if let Err(e) = fs::copy(&self.path, &backup).await {
                tracing::warn!("Skipping backup {}: {}", backup.display(), e);
            }
        }

        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| io_error("replacing", &self.path, e))
    }

    fn sibling(path: &Path, extension: &str) -> PathBuf {
        path.with_extension(extension)
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn get(&self, address: &str) -> Result<Option<StateRecord>, Error> {
        Ok(self.doc.lock().await.resources.get(address).cloned())
    }

    async fn put(&self, address: &str, record: &StateRecord) -> Result<(), Error> {
        self.update(|resources| {
            resources.insert(address.to_string(), record.clone());
            true
        })
        .await
    }

    async fn delete(&self, address: &str) -> Result<(), Error> {
        self.update(|resources| resources.remove(address).is_some())
            .await
    }

    async fn list(&self) -> Result<Vec<String>, Error> {
        Ok(self.doc.lock().await.resources.keys().cloned().collect())
    }

    // Nothing is buffered
    async fn flush(&self) -> Result<(), Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Region, ResourceState, WebhookKind, WebhookState};
    use tempfile::tempdir;

    const ADDRESS: &str = "mailgun_webhook.delivered";

    fn webhook(url: &str) -> StateRecord {
        StateRecord::new(ResourceState::Webhook(WebhookState {
            region: Region::Us,
            domain: "example.com".to_string(),
            kind: WebhookKind::Delivered,
            urls: [url.to_string()].into_iter().collect(),
        }))
    }

    fn urls(record: &StateRecord) -> Vec<String> {
        match &record.state {
            ResourceState::Webhook(state) => state.urls.iter().cloned().collect(),
            other => panic!("unexpected state {:?}", other),
        }
    }

    async fn serial(path: &Path) -> u64 {
        let text = fs::read_to_string(path).await.unwrap();
        serde_json::from_str::<Document>(&text).unwrap().serial
    }

    #[tokio::test]
    async fn test_reopen_sees_previous_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        let store = FileStateStore::new(&path).await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
        assert!(!path.exists(), "nothing is written until the first change");

        store.put(ADDRESS, &webhook("https://a.example.com")).await.unwrap();

        let reopened = FileStateStore::new(&path).await.unwrap();
        let record = reopened.get(ADDRESS).await.unwrap().unwrap();
        assert_eq!(record.id, "us:example.com:delivered");
        assert_eq!(urls(&record), vec!["https://a.example.com"]);
    }

    #[tokio::test]
    async fn test_serial_counts_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        let store = FileStateStore::new(&path).await.unwrap();
        store.put(ADDRESS, &webhook("https://a.example.com")).await.unwrap();
        store.put(ADDRESS, &webhook("https://b.example.com")).await.unwrap();
        assert_eq!(serial(&path).await, 2);

        // Removing an absent address writes nothing
        store.delete("mailgun_webhook.missing").await.unwrap();
        store.flush().await.unwrap();
        assert_eq!(serial(&path).await, 2);

        let reopened = FileStateStore::new(&path).await.unwrap();
        reopened.delete(ADDRESS).await.unwrap();
        assert_eq!(serial(&path).await, 3);
    }

    #[tokio::test]
    async fn test_corrupted_file_falls_back_to_backup() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        let store = FileStateStore::new(&path).await.unwrap();
        store.put(ADDRESS, &webhook("https://a.example.com")).await.unwrap();
        // The second write moves the first document into the backup
        store.put(ADDRESS, &webhook("https://b.example.com")).await.unwrap();
        assert!(path.with_extension("backup").exists());

        fs::write(&path, b"{ not json").await.unwrap();

        let recovered = FileStateStore::new(&path).await.unwrap();
        let record = recovered.get(ADDRESS).await.unwrap().unwrap();
        assert_eq!(urls(&record), vec!["https://a.example.com"]);

        // The backup was copied back over the broken file
        assert_eq!(serial(&path).await, 1);
    }

    #[tokio::test]
    async fn test_corrupted_without_backup_starts_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");
        fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        fs::write(&path, b"garbage").await.unwrap();

        let store = FileStateStore::new(&path).await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_write_leaves_state_unchanged() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let store = FileStateStore::new(&path).await.unwrap();
        store.put(ADDRESS, &webhook("https://a.example.com")).await.unwrap();

        fs::remove_dir_all(path.parent().unwrap()).await.unwrap();

        assert!(store.put("mailgun_webhook.opened", &webhook("https://b.example.com")).await.is_err());
        assert!(store.delete(ADDRESS).await.is_err());

        assert!(store.get("mailgun_webhook.opened").await.unwrap().is_none());
        assert_eq!(store.list().await.unwrap(), vec![ADDRESS.to_string()]);
    }

    #[tokio::test]
    async fn test_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("state.json");

        let store = FileStateStore::new(&path).await.unwrap();
        store.put(ADDRESS, &webhook("https://a.example.com")).await.unwrap();

        assert!(path.exists());
    }
}
