//! Audit persistence.
//!
//! The engine reads audits back from the store before every state write so
//! that a cancellation written by someone else is never lost. The file store
//! is shared by the daemon and the CLI, so writers hold an exclusive OS lock
//! on a sidecar `.lock` file for the whole read-modify-write.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};

use super::Audit;

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn get_by_uuid(&self, uuid: Uuid) -> EngineResult<Audit>;

    async fn list(&self) -> EngineResult<Vec<Audit>>;

    /// Insert or replace by uuid.
    async fn save(&self, audit: &Audit) -> EngineResult<()>;

    /// Save `audit` unless the stored copy is already CANCELLED.
    ///
    /// Returns `false` when the write was skipped.
    async fn save_unless_cancelled(&self, audit: &Audit) -> EngineResult<bool> {
        match self.get_by_uuid(audit.uuid).await {
            Ok(stored) if stored.is_cancelled() => Ok(false),
            Ok(_) | Err(EngineError::AuditNotFound(_)) => self.save(audit).await.map(|_| true),
            Err(e) => Err(e),
        }
    }
}

#[derive(Default)]
pub struct InMemoryAuditStore {
    audits: RwLock<BTreeMap<Uuid, Audit>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn get_by_uuid(&self, uuid: Uuid) -> EngineResult<Audit> {
        self.audits
            .read()
            .await
            .get(&uuid)
            .cloned()
            .ok_or(EngineError::AuditNotFound(uuid))
    }

    async fn list(&self) -> EngineResult<Vec<Audit>> {
        Ok(self.audits.read().await.values().cloned().collect())
    }

    async fn save(&self, audit: &Audit) -> EngineResult<()> {
        self.audits.write().await.insert(audit.uuid, audit.clone());
        Ok(())
    }

    async fn save_unless_cancelled(&self, audit: &Audit) -> EngineResult<bool> {
        let mut audits = self.audits.write().await;
        if audits.get(&audit.uuid).is_some_and(Audit::is_cancelled) {
            return Ok(false);
        }
        audits.insert(audit.uuid, audit.clone());
        Ok(true)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct AuditFile {
    #[serde(default)]
    audits: Vec<Audit>,
}

/// All audits in one JSON file, rewritten atomically on every save.
///
/// Safe to share between processes: every write locks `<file>.lock`.
pub struct FileAuditStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileAuditStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    async fn load(&self) -> Result<Vec<Audit>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading {}", self.path.display()))?;
        let file: AuditFile = serde_json::from_str(&content)
            .with_context(|| format!("parsing {}", self.path.display()))?;
        Ok(file.audits)
    }

    async fn persist(&self, audits: Vec<Audit>) -> Result<()> {
        let content = serde_json::to_string_pretty(&AuditFile { audits })
            .context("failed to serialize audits")?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }

        let tmp_path = self
            .path
            .with_extension(format!("json.{}.tmp", Uuid::new_v4().simple()));
        tokio::fs::write(&tmp_path, &content)
            .await
            .with_context(|| format!("writing temp file {}", tmp_path.display()))?;

        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .with_context(|| {
                format!(
                    "renaming {} to {}",
                    tmp_path.display(),
                    self.path.display()
                )
            })?;
        Ok(())
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("json.lock")
    }

    /// Block until this process holds the exclusive lock. Released on drop.
    async fn acquire_lock(&self) -> Result<File> {
        let lock_path = self.lock_path();
        if let Some(parent) = lock_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }
        let file = tokio::task::spawn_blocking(move || -> Result<File> {
            let file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&lock_path)
                .with_context(|| format!("opening lock file {}", lock_path.display()))?;
            file.lock_exclusive()
                .with_context(|| format!("locking {}", lock_path.display()))?;
            Ok(file)
        })
        .await
        .context("lock task aborted")??;
        Ok(file)
    }

    async fn upsert(&self, audit: &Audit, keep_cancelled: bool) -> EngineResult<bool> {
        let _guard = self.write_lock.lock().await;
        let _file_lock = self.acquire_lock().await.map_err(store_error)?;
        let mut audits = self.load().await.map_err(store_error)?;
        match audits.iter_mut().find(|a| a.uuid == audit.uuid) {
            Some(existing) if keep_cancelled && existing.is_cancelled() => return Ok(false),
            Some(existing) => *existing = audit.clone(),
            None => audits.push(audit.clone()),
        }
        self.persist(audits).await.map_err(store_error)?;
        Ok(true)
    }
}

fn store_error(e: anyhow::Error) -> EngineError {
    EngineError::Store(format!("{e:#}"))
}

#[async_trait]
impl AuditStore for FileAuditStore {
    async fn get_by_uuid(&self, uuid: Uuid) -> EngineResult<Audit> {
        self.load()
            .await
            .map_err(store_error)?
            .into_iter()
            .find(|a| a.uuid == uuid)
            .ok_or(EngineError::AuditNotFound(uuid))
    }

    async fn list(&self) -> EngineResult<Vec<Audit>> {
        self.load().await.map_err(store_error)
    }

    async fn save(&self, audit: &Audit) -> EngineResult<()> {
        self.upsert(audit, false).await.map(|_| ())
    }

    async fn save_unless_cancelled(&self, audit: &Audit) -> EngineResult<bool> {
        self.upsert(audit, true).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditState, AuditType};

    #[tokio::test]
    async fn memory_store_upserts() {
        let store = InMemoryAuditStore::new();
        let mut audit = Audit::new("a", AuditType::Oneshot, "dummy");
        store.save(&audit).await.unwrap();
        audit.state = AuditState::Cancelled;
        store.save(&audit).await.unwrap();

        assert_eq!(store.list().await.unwrap().len(), 1);
        assert!(store.get_by_uuid(audit.uuid).await.unwrap().is_cancelled());
        assert!(matches!(
            store.get_by_uuid(Uuid::new_v4()).await,
            Err(EngineError::AuditNotFound(_))
        ));
    }

    #[tokio::test]
    async fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("audits.json");

        let audit = Audit::new("nightly", AuditType::Continuous, "saving_energy").with_interval(600);
        {
            let store = FileAuditStore::new(path.clone());
            assert!(store.list().await.unwrap().is_empty());
            store.save(&audit).await.unwrap();
            store.save(&Audit::new("other", AuditType::Oneshot, "dummy")).await.unwrap();
        }

        let store = FileAuditStore::new(path.clone());
        let loaded = store.get_by_uuid(audit.uuid).await.unwrap();
        assert_eq!(loaded, audit);
        assert_eq!(store.list().await.unwrap().len(), 2);

        let mut left: Vec<String> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        left.sort();
        assert_eq!(left, vec!["audits.json", "audits.json.lock"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn separate_store_handles_do_not_lose_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audits.json");

        // one handle per writer, as the daemon and the CLI each open their own
        let mut tasks = Vec::new();
        for i in 0..16 {
            let store = FileAuditStore::new(path.clone());
            tasks.push(tokio::spawn(async move {
                let audit = Audit::new(format!("a{i}"), AuditType::Oneshot, "dummy");
                store.save(&audit).await.unwrap();
                audit.uuid
            }));
        }
        let mut written = Vec::new();
        for task in tasks {
            written.push(task.await.unwrap());
        }

        let stored = FileAuditStore::new(path).list().await.unwrap();
        assert_eq!(stored.len(), written.len());
        for uuid in written {
            assert!(stored.iter().any(|a| a.uuid == uuid));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancellation_from_another_handle_survives_a_late_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audits.json");
        let daemon = FileAuditStore::new(path.clone());
        let cli = FileAuditStore::new(path);

        let mut audit = Audit::new("a", AuditType::Continuous, "dummy");
        audit.state = AuditState::Ongoing;
        daemon.save(&audit).await.unwrap();

        let mut cancelled = cli.get_by_uuid(audit.uuid).await.unwrap();
        cancelled.state = AuditState::Cancelled;
        cli.save(&cancelled).await.unwrap();

        audit.state = AuditState::Succeeded;
        assert!(!daemon.save_unless_cancelled(&audit).await.unwrap());
        assert!(cli.get_by_uuid(audit.uuid).await.unwrap().is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_audits_are_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let file = FileAuditStore::new(dir.path().join("audits.json"));
        let memory = InMemoryAuditStore::new();
        let stores: [&dyn AuditStore; 2] = [&file, &memory];

        for store in stores {
            let mut audit = Audit::new("a", AuditType::Continuous, "dummy");
            assert!(store.save_unless_cancelled(&audit).await.unwrap());

            let mut cancelled = audit.clone();
            cancelled.state = AuditState::Cancelled;
            store.save(&cancelled).await.unwrap();

            audit.state = AuditState::Succeeded;
            assert!(!store.save_unless_cancelled(&audit).await.unwrap());
            assert!(store.get_by_uuid(audit.uuid).await.unwrap().is_cancelled());
        }
    }

    #[tokio::test]
    async fn corrupt_file_is_a_store_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audits.json");
        std::fs::write(&path, "not json").unwrap();
        let store = FileAuditStore::new(path);
        assert!(matches!(store.list().await, Err(EngineError::Store(_))));
    }
}
