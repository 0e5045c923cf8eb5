use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use moodle_core::{FileContent, MoodleClient, MoodleError};
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard, Semaphore};

use super::archive;
use super::cache::{CacheError, LINK_CACHE_FILE, LinkCache};
use super::resolve::{ResolveError, ResourceDescriptor, resolve};
use super::transfer::{TransferClient, TransferError};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("{0}")]
    Resolve(#[from] ResolveError),
    #[error("invalid file url: {0}")]
    Locator(#[from] MoodleError),
    #[error("{0}")]
    Transfer(#[from] TransferError),
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
}

/// Extensions that are never downloaded. Stored uppercased without the dot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreList(BTreeSet<String>);

impl IgnoreList {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            extensions
                .into_iter()
                .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_uppercase())
                .filter(|ext| !ext.is_empty())
                .collect(),
        )
    }

    pub fn contains(&self, extension: &str) -> bool {
        self.0.contains(&extension.to_uppercase())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub force_download: bool,
    pub missing_download: bool,
    pub extract_archives: bool,
    pub ignored: IgnoreList,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    Exists,
    Missing,
    Ignored,
    Downloaded,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub status: SyncStatus,
    pub short_path: String,
}

impl SyncOutcome {
    pub fn failed(short_path: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            status: SyncStatus::Failed(reason.to_string()),
            short_path: short_path.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Exists,
    Missing,
    Ignored,
    Download,
}

/// Classifies one resource. `destination_exists` is only consulted when the
/// cache already holds the current version.
pub fn decide(
    descriptor: &ResourceDescriptor,
    cached: Option<i64>,
    destination_exists: impl FnOnce() -> bool,
    options: &SyncOptions,
) -> Decision {
    if !options.force_download && cached == Some(descriptor.last_modified) {
        if destination_exists() {
            return Decision::Exists;
        }
        if !options.missing_download {
            return Decision::Missing;
        }
    }
    if options.ignored.contains(&descriptor.extension) {
        return Decision::Ignored;
    }
    Decision::Download
}

pub struct SyncEngine {
    client: MoodleClient,
    transfer: TransferClient,
    prefix: PathBuf,
    cache: Arc<Mutex<LinkCache>>,
    options: SyncOptions,
    /// One lock per destination path; resources sharing a path sync one at a time.
    destinations: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl SyncEngine {
    pub fn new(
        client: MoodleClient,
        prefix: PathBuf,
        cache: LinkCache,
        options: SyncOptions,
    ) -> Self {
        Self {
            client,
            transfer: TransferClient::new(),
            prefix,
            cache: Arc::new(Mutex::new(cache)),
            options,
            destinations: Mutex::new(HashMap::new()),
        }
    }

    /// Loads `<prefix>/.link_cache` and builds an engine around it.
    pub async fn open(client: MoodleClient, prefix: PathBuf, options: SyncOptions) -> Self {
        let cache = LinkCache::load(prefix.join(LINK_CACHE_FILE)).await;
        Self::new(client, prefix, cache, options)
    }

    pub fn with_transfer(mut self, transfer: TransferClient) -> Self {
        self.transfer = transfer;
        self
    }

    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    pub fn client(&self) -> &MoodleClient {
        &self.client
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub async fn cached_version(&self, file_url: &str) -> Option<i64> {
        self.cache.lock().await.get(file_url).copied()
    }

    /// Resolves a raw API file record and syncs it. Resolution failures become
    /// a failed outcome.
    pub async fn sync_file(
        &self,
        file: &FileContent,
        course: &str,
        subfolders: &[String],
        indent: usize,
    ) -> SyncOutcome {
        match resolve(file, course, subfolders) {
            Ok(descriptor) => self.sync_resource(&descriptor, indent).await,
            Err(err) => {
                tracing::warn!(course, file = %file.filename, "cannot resolve resource: {err}");
                SyncOutcome::failed(format!("{course}/{}", file.filename), err)
            }
        }
    }

    pub async fn sync_resource(
        &self,
        descriptor: &ResourceDescriptor,
        indent: usize,
    ) -> SyncOutcome {
        let short_path = descriptor.short_path();
        let status = match self.try_sync(descriptor, &short_path, indent).await {
            Ok(status) => status,
            Err(err) => {
                tracing::warn!(path = %short_path, "download failed: {err}");
                SyncStatus::Failed(err.to_string())
            }
        };
        SyncOutcome { status, short_path }
    }

    async fn try_sync(
        &self,
        descriptor: &ResourceDescriptor,
        short_path: &str,
        indent: usize,
    ) -> Result<SyncStatus, SyncError> {
        let destination = descriptor.destination(&self.prefix);
        let _claim = self.claim_destination(&destination).await;
        let cached = self.cached_version(&descriptor.file_url).await;

        let decision = decide(descriptor, cached, || destination.exists(), &self.options);
        tracing::debug!(path = %short_path, ?cached, ?decision, "sync decision");
        match decision {
            Decision::Exists => return Ok(SyncStatus::Exists),
            Decision::Missing => return Ok(SyncStatus::Missing),
            Decision::Ignored => return Ok(SyncStatus::Ignored),
            Decision::Download => {}
        }

        let pad = " ".repeat(indent);
        println!("{pad}Downloading {short_path}");
        let url = self.client.file_url(&descriptor.file_url)?;
        self.transfer
            .download_to_path(&url, &destination, descriptor.file_size)
            .await?;
        println!("{pad}{short_path} ... DONE");

        if self.options.extract_archives && archive::is_archive(&descriptor.extension) {
            match archive::expand(&destination).await {
                Ok((dir, files)) => tracing::info!(
                    path = %short_path,
                    dir = %dir.display(),
                    files,
                    "archive expanded"
                ),
                Err(err) => tracing::warn!(path = %short_path, "archive expansion failed: {err}"),
            }
        }

        self.cache
            .lock()
            .await
            .insert(descriptor.file_url.clone(), descriptor.last_modified);
        Ok(SyncStatus::Downloaded)
    }

    async fn claim_destination(&self, destination: &Path) -> OwnedMutexGuard<()> {
        let lock = {
            let mut destinations = self.destinations.lock().await;
            Arc::clone(destinations.entry(destination.to_path_buf()).or_default())
        };
        lock.lock_owned().await
    }

    /// Syncs every descriptor on the pool. The number of resources in flight
    /// is bounded by the transfer concurrency. Outcomes come back in input order.
    pub async fn sync_all(
        self: &Arc<Self>,
        descriptors: Vec<ResourceDescriptor>,
    ) -> Vec<SyncOutcome> {
        let workers = Arc::new(Semaphore::new(self.transfer.concurrency()));
        let mut handles = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let engine = Arc::clone(self);
            let workers = Arc::clone(&workers);
            let short_path = descriptor.short_path();
            let handle = tokio::spawn(async move {
                let _permit = workers.acquire_owned().await.ok();
                engine.sync_resource(&descriptor, 0).await
            });
            handles.push((short_path, handle));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (short_path, handle) in handles {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => {
                    tracing::warn!(path = %short_path, "sync worker failed: {err}");
                    outcomes.push(SyncOutcome::failed(short_path, format!("worker failed: {err}")));
                }
            }
        }
        outcomes
    }

    /// Writes the link cache back to disk.
    pub async fn flush(&self) -> Result<(), SyncError> {
        self.cache.lock().await.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
