use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::{TradeStore, WindowBatch};
use crate::{
    error::CrawlError,
    registry::ReserveRegistry,
    types::{BlockNumber, CrawlRecord, RecordKey},
};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    checkpoint: Option<BlockNumber>,
    registry: ReserveRegistry,
    records: Vec<CrawlRecord>,
}

/// Store persisting the whole crawl state as a single JSON document.
///
/// Each commit writes and syncs the new document next to the target, renames
/// it over the previous one and syncs the directory, so a crash leaves either
/// the old or the new state on disk.
///
/// Every commit rewrites the full document, making its cost proportional to
/// all records stored so far. Meant for development and small deployments.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    checkpoint: Option<BlockNumber>,
    registry: ReserveRegistry,
    records: BTreeMap<RecordKey, CrawlRecord>,
}

impl JsonFileStore {
    /// Loads the state file, starting empty if it does not exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, CrawlError> {
        let path = path.as_ref().to_path_buf();
        let snapshot = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<Snapshot>(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Snapshot::default(),
            Err(err) => return Err(err.into()),
        };
        info!(
            path = %path.display(),
            checkpoint = ?snapshot.checkpoint,
            records = snapshot.records.len(),
            reserves = snapshot.registry.len(),
            "State file loaded"
        );
        Ok(Self {
            path,
            checkpoint: snapshot.checkpoint,
            registry: snapshot.registry,
            records: snapshot
                .records
                .into_iter()
                .map(|r| (r.key(), r))
                .collect(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> impl Iterator<Item = &CrawlRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl TradeStore for JsonFileStore {
    async fn last_checkpoint(&self) -> Result<Option<BlockNumber>, CrawlError> {
        Ok(self.checkpoint)
    }

    async fn load_registry(&self) -> Result<ReserveRegistry, CrawlError> {
        Ok(self.registry.clone())
    }

    async fn commit_window(&mut self, batch: &WindowBatch) -> Result<(), CrawlError> {
        let mut records = self.records.clone();
        records.extend(batch.records.iter().map(|r| (r.key(), r.clone())));
        let snapshot = Snapshot {
            checkpoint: Some(batch.checkpoint()),
            registry: batch.registry.clone(),
            records: records.values().cloned().collect(),
        };

        let bytes = serde_json::to_vec_pretty(&snapshot)?;
        replace_durably(&self.path, &self.temp_path(), &bytes).await?;

        debug!(window = %batch.window, records = records.len(), "State file written");
        self.records = records;
        self.registry = snapshot.registry;
        self.checkpoint = snapshot.checkpoint;
        Ok(())
    }
}

/// Replaces `path` with `bytes` via `temp`, returning once both the file
/// contents and the rename are on disk.
async fn replace_durably(path: &Path, temp: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(temp).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(temp, path).await?;
    sync_parent_dir(path).await
}

#[cfg(unix)]
async fn sync_parent_dir(path: &Path) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    tokio::fs::File::open(dir).await?.sync_all().await
}

#[cfg(not(unix))]
async fn sync_parent_dir(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
