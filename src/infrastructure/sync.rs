use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use sha2::{Digest, Sha256};
use tokio::sync::{broadcast, mpsc, oneshot};
use walkdir::WalkDir;

use crate::domain::ports::BlobStore;
use crate::domain::RetrievalError;
use crate::infrastructure::index::MANIFEST_FILE;

const SYNC_QUEUE_DEPTH: usize = 64;
const EVENT_BUFFER: usize = 64;
const CONCURRENT_DOWNLOADS: usize = 8;

/// Outcome notifications from the push worker. Push failures surface here
/// and in the logs, never as errors on the retrieval path. The cold-start
/// pull reports through the return value of [`SyncHandle::start`] instead,
/// since it finishes before any subscriber can exist.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    PushCompleted { uploaded: usize, skipped: usize },
    PushFailed { error: String },
}

#[derive(Debug)]
pub enum PullOutcome {
    /// A local manifest already exists; the local state wins.
    Skipped,
    Pulled { files: usize },
}

enum SyncJob {
    Push,
    Flush(oneshot::Sender<()>),
}

/// Handle to the background sync worker. Cloneable; the worker stops when
/// every handle has been dropped.
#[derive(Clone)]
pub struct SyncHandle {
    jobs: mpsc::Sender<SyncJob>,
    events: broadcast::Sender<SyncEvent>,
}

impl SyncHandle {
    /// Pull the remote snapshot if the index directory is cold, then spawn
    /// the push worker. A pull failure is absorbed so the service still
    /// comes up on whatever local state exists; the outcome is handed back
    /// alongside the handle for the caller to log or act on.
    pub async fn start(
        dir: impl Into<PathBuf>,
        store: Arc<dyn BlobStore>,
        prefix: &str,
    ) -> (Self, Result<PullOutcome, RetrievalError>) {
        let dir = dir.into();
        let prefix = normalize_prefix(prefix);
        let (jobs_tx, jobs_rx) = mpsc::channel(SYNC_QUEUE_DEPTH);
        let (events_tx, _) = broadcast::channel(EVENT_BUFFER);

        let mut fingerprints = HashMap::new();
        let pull = pull_snapshot(&dir, store.as_ref(), &prefix).await;
        match &pull {
            Ok(PullOutcome::Skipped) => {
                tracing::info!("local index present, skipping snapshot pull");
            }
            Ok(PullOutcome::Pulled { files }) => {
                tracing::info!(files = *files, "pulled index snapshot");
                if *files > 0 {
                    fingerprints = seed_fingerprints(&dir).await;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "snapshot pull failed, starting from local state");
            }
        }

        let worker = SyncWorker {
            dir,
            store,
            prefix,
            fingerprints,
            jobs: jobs_rx,
            events: events_tx.clone(),
        };
        tokio::spawn(worker.run());

        let handle = Self {
            jobs: jobs_tx,
            events: events_tx,
        };
        (handle, pull)
    }

    /// Queue a push without waiting for it. A full queue already has pushes
    /// pending, so dropping this one loses nothing.
    pub fn schedule_push(&self) {
        use mpsc::error::TrySendError;

        match self.jobs.try_send(SyncJob::Push) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::debug!("sync queue full, push already pending")
            }
            Err(TrySendError::Closed(_)) => tracing::warn!("sync worker is gone, push dropped"),
        }
    }

    /// Wait until every queued push has been attempted. Push failures are
    /// reported through [`SyncEvent`], not through this return value.
    pub async fn flush(&self) -> Result<(), RetrievalError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.jobs
            .send(SyncJob::Flush(ack_tx))
            .await
            .map_err(|_| RetrievalError::internal("sync worker stopped"))?;
        ack_rx
            .await
            .map_err(|_| RetrievalError::internal("sync worker stopped"))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }
}

struct SyncWorker {
    dir: PathBuf,
    store: Arc<dyn BlobStore>,
    prefix: String,
    fingerprints: HashMap<String, [u8; 32]>,
    jobs: mpsc::Receiver<SyncJob>,
    events: broadcast::Sender<SyncEvent>,
}

impl SyncWorker {
    async fn run(mut self) {
        tracing::info!(prefix = %self.prefix, "sync worker started");

        while let Some(first) = self.jobs.recv().await {
            // Coalesce whatever has piled up into a single push pass.
            let mut jobs = vec![first];
            while let Ok(job) = self.jobs.try_recv() {
                jobs.push(job);
            }

            let mut flush_acks = Vec::new();
            for job in jobs {
                if let SyncJob::Flush(ack) = job {
                    flush_acks.push(ack);
                }
            }

            self.push_changed().await;

            for ack in flush_acks {
                let _ = ack.send(());
            }
        }

        tracing::info!("sync worker stopped");
    }

    /// Upload every index file whose content changed since the last push.
    /// Individual failures are logged and folded into one PushFailed event;
    /// unchanged files are skipped by sha256 fingerprint. The manifest goes
    /// out only on a pass where everything before it landed.
    async fn push_changed(&mut self) {
        let files = match local_files(&self.dir).await {
            Ok(files) => files,
            Err(e) => {
                tracing::warn!(error = %e, "failed to scan index directory for sync");
                let _ = self.events.send(SyncEvent::PushFailed {
                    error: e.to_string(),
                });
                return;
            }
        };

        let mut uploaded = 0;
        let mut skipped = 0;
        let mut failures = 0;
        let mut first_error: Option<String> = None;

        for (key, path) in files {
            // The manifest sorts last in the walk. If any file before it
            // failed, withhold it: a published manifest has to reference
            // segments that actually arrived. Its fingerprint stays
            // unrecorded, so the next clean pass uploads it.
            if key == MANIFEST_FILE && failures > 0 {
                tracing::warn!("withholding manifest after failed uploads");
                continue;
            }

            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(%key, error = %e, "failed to read index file");
                    failures += 1;
                    first_error.get_or_insert(e.to_string());
                    continue;
                }
            };

            let digest: [u8; 32] = Sha256::digest(&bytes).into();
            if self.fingerprints.get(&key) == Some(&digest) {
                skipped += 1;
                continue;
            }

            let remote_key = format!("{}{}", self.prefix, key);
            match self.store.put(&remote_key, bytes).await {
                Ok(()) => {
                    self.fingerprints.insert(key, digest);
                    uploaded += 1;
                }
                Err(e) => {
                    tracing::warn!(key = %remote_key, error = %e, "snapshot upload failed");
                    failures += 1;
                    first_error.get_or_insert(e.to_string());
                }
            }
        }

        if failures > 0 {
            let error = format!(
                "{failures} upload(s) failed: {}",
                first_error.unwrap_or_else(|| "unknown".into())
            );
            tracing::warn!(uploaded, skipped, failures, "snapshot push incomplete");
            let _ = self.events.send(SyncEvent::PushFailed { error });
        } else {
            tracing::debug!(uploaded, skipped, "snapshot push complete");
            let _ = self.events.send(SyncEvent::PushCompleted { uploaded, skipped });
        }
    }
}

/// Download the remote snapshot into `dir` unless a local manifest already
/// exists. Segments come down before the manifest, so an interrupted pull
/// never leaves a manifest referencing files that did not arrive.
pub async fn pull_snapshot(
    dir: &Path,
    store: &dyn BlobStore,
    prefix: &str,
) -> Result<PullOutcome, RetrievalError> {
    let prefix = normalize_prefix(prefix);

    let manifest = dir.join(MANIFEST_FILE);
    let have_local = tokio::fs::try_exists(&manifest)
        .await
        .map_err(|e| RetrievalError::internal(e.to_string()))?;
    if have_local {
        return Ok(PullOutcome::Skipped);
    }

    let keys = store
        .list(&prefix)
        .await
        .map_err(|e| RetrievalError::internal(format!("list snapshot: {e}")))?;
    if keys.is_empty() {
        return Ok(PullOutcome::Pulled { files: 0 });
    }

    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| RetrievalError::internal(e.to_string()))?;

    let (manifest_keys, segment_keys): (Vec<_>, Vec<_>) = keys
        .into_iter()
        .filter(|key| key.starts_with(&prefix))
        .partition(|key| &key[prefix.len()..] == MANIFEST_FILE);

    let mut files = 0;
    files += download_all(dir, store, &prefix, segment_keys).await;
    files += download_all(dir, store, &prefix, manifest_keys).await;

    Ok(PullOutcome::Pulled { files })
}

async fn download_all(dir: &Path, store: &dyn BlobStore, prefix: &str, keys: Vec<String>) -> usize {
    let results: Vec<_> = stream::iter(keys)
        .map(|key| async move {
            let outcome = fetch_one(dir, store, prefix, &key).await;
            (key, outcome)
        })
        .buffer_unordered(CONCURRENT_DOWNLOADS)
        .collect()
        .await;

    let mut files = 0;
    for (key, outcome) in results {
        match outcome {
            Ok(()) => files += 1,
            Err(e) => tracing::warn!(%key, error = %e, "snapshot download failed"),
        }
    }
    files
}

async fn fetch_one(
    dir: &Path,
    store: &dyn BlobStore,
    prefix: &str,
    key: &str,
) -> Result<(), RetrievalError> {
    let relative = Path::new(&key[prefix.len()..]);
    let safe = relative
        .components()
        .all(|component| matches!(component, Component::Normal(_)));
    if relative.as_os_str().is_empty() || !safe {
        return Err(RetrievalError::internal("unsafe snapshot key"));
    }

    let bytes = store
        .get(key)
        .await
        .map_err(|e| RetrievalError::internal(e.to_string()))?;

    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| RetrievalError::internal(e.to_string()))?;
    }
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| RetrievalError::internal(e.to_string()))
}

/// Relative key and absolute path of every synced file under `dir`, with
/// the manifest sorted last so pushes upload it after its segments.
async fn local_files(dir: &Path) -> Result<Vec<(String, PathBuf)>, std::io::Error> {
    let dir = dir.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let mut files = Vec::new();
        for entry in WalkDir::new(&dir).into_iter().filter_map(Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&dir) else {
                continue;
            };
            // Manifest writes go through a .tmp rename; skip in-flight temporaries.
            if relative.extension().map(|ext| ext == "tmp").unwrap_or(false) {
                continue;
            }
            let key = relative
                .components()
                .filter_map(|component| match component {
                    Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("/");
            files.push((key, entry.into_path()));
        }
        files.sort_by_key(|(key, _)| (key == MANIFEST_FILE, key.clone()));
        files
    })
    .await
    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
}

async fn seed_fingerprints(dir: &Path) -> HashMap<String, [u8; 32]> {
    let mut fingerprints = HashMap::new();
    match local_files(dir).await {
        Ok(files) => {
            for (key, path) in files {
                if let Ok(bytes) = tokio::fs::read(&path).await {
                    fingerprints.insert(key, Sha256::digest(&bytes).into());
                }
            }
        }
        Err(e) => tracing::warn!(error = %e, "failed to fingerprint pulled snapshot"),
    }
    fingerprints
}

fn normalize_prefix(prefix: &str) -> String {
    if prefix.is_empty() || prefix.ends_with('/') {
        prefix.to_string()
    } else {
        format!("{prefix}/")
    }
}
