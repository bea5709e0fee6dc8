//! Object store adapter using Apache OpenDAL.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use depot_shared::FileId;
use depot_shared::config::StorageProvider;
use futures::TryStreamExt;
use opendal::layers::TimeoutLayer;
use opendal::{Operator, services};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{Notify, futures::OwnedNotified};
use tracing::{debug, error, info};

use super::content::{md5_file, read_head, resolve_mime};
use super::fsutil::{remove_if_exists, set_mtime};
use super::{RemoteStorage, StorageAdapter};
use crate::error::{FileError, FileResult};
use crate::types::{FileMetadata, UploadedFile, now_millis};

const UPLOAD_CHUNK: usize = 256 * 1024;

/// Lifecycle of the lazily built client.
enum ClientState {
    Uninitialized,
    /// Construction in progress; waiters are woken when it settles.
    Initializing(Arc<Notify>),
    Ready(Operator),
    /// Construction failed. Never retried.
    Failed(String),
}

enum Next {
    Wait(OwnedNotified),
    Build(Arc<Notify>),
}

/// Wakes waiters once a build settles. A build abandoned mid-way resets the
/// state so the next caller starts over.
struct BuildGuard<'a> {
    state: &'a Mutex<ClientState>,
    notify: Arc<Notify>,
    settled: bool,
}

impl Drop for BuildGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if matches!(*state, ClientState::Initializing(_)) {
                *state = ClientState::Uninitialized;
            }
        }
        self.notify.notify_waiters();
    }
}

/// Stores content under `<id>` and metadata under `<id>.json` in one container.
pub struct RemoteAdapter {
    provider: Option<StorageProvider>,
    timeout: Duration,
    state: Mutex<ClientState>,
}

impl RemoteAdapter {
    /// Creates an adapter whose client is built on first use.
    #[must_use]
    pub fn new(provider: StorageProvider, request_timeout_secs: u64) -> Self {
        Self {
            provider: Some(provider),
            timeout: Duration::from_secs(request_timeout_secs),
            state: Mutex::new(ClientState::Uninitialized),
        }
    }

    /// Creates an adapter around an already built operator.
    #[must_use]
    pub fn with_operator(operator: Operator) -> Self {
        Self {
            provider: None,
            timeout: Duration::ZERO,
            state: Mutex::new(ClientState::Ready(operator)),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ClientState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the client, building it once.
    async fn operator(&self) -> FileResult<Operator> {
        self.operator_with(|| self.build()).await
    }

    async fn operator_with<F, Fut>(&self, build: F) -> FileResult<Operator>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Operator, String>>,
    {
        let mut build = Some(build);
        loop {
            let next = {
                let mut state = self.lock_state();
                match &*state {
                    ClientState::Ready(op) => return Ok(op.clone()),
                    ClientState::Failed(msg) => return Err(FileError::configuration(msg.clone())),
                    ClientState::Initializing(notify) => Next::Wait(notify.clone().notified_owned()),
                    ClientState::Uninitialized => {
                        let notify = Arc::new(Notify::new());
                        *state = ClientState::Initializing(notify.clone());
                        Next::Build(notify)
                    }
                }
            };

            match next {
                Next::Wait(notified) => notified.await,
                Next::Build(notify) => {
                    let Some(build) = build.take() else {
                        return Err(FileError::configuration("storage client build restarted"));
                    };
                    let mut guard = BuildGuard {
                        state: &self.state,
                        notify,
                        settled: false,
                    };
                    let outcome = build().await;
                    let result = {
                        let mut state = self.lock_state();
                        match outcome {
                            Ok(op) => {
                                *state = ClientState::Ready(op.clone());
                                Ok(op)
                            }
                            Err(msg) => {
                                *state = ClientState::Failed(msg.clone());
                                Err(FileError::configuration(msg))
                            }
                        }
                    };
                    guard.settled = true;
                    return result;
                }
            }
        }
    }

    async fn build(&self) -> Result<Operator, String> {
        let Some(provider) = &self.provider else {
            return Err("no remote provider configured".to_string());
        };

        let op = build_operator(provider, self.timeout).map_err(|e| {
            error!(provider = provider.name(), error = %e, "cannot build storage client");
            e
        })?;

        if let Err(e) = op.check().await {
            let msg = format!("{} storage unreachable: {e}", provider.name());
            error!(provider = provider.name(), error = %e, "storage connectivity check failed");
            return Err(msg);
        }

        info!(provider = provider.name(), "remote storage ready");
        Ok(op)
    }

    async fn write_metadata(&self, op: &Operator, meta: &FileMetadata) -> FileResult<()> {
        let json = serde_json::to_vec(meta)
            .map_err(|e| FileError::backend(None, format!("cannot encode metadata: {e}")))?;
        op.write(&metadata_key(meta.id), json).await?;
        Ok(())
    }

    async fn stream_copy(op: &Operator, from: &str, to: &str) -> FileResult<()> {
        let mut stream = op.reader(from).await?.into_bytes_stream(..).await?;
        let mut writer = op.writer(to).await?;
        while let Some(chunk) = stream.try_next().await? {
            writer.write(chunk).await?;
        }
        writer.close().await?;
        Ok(())
    }
}

fn build_operator(provider: &StorageProvider, timeout: Duration) -> Result<Operator, String> {
    let layer = TimeoutLayer::new().with_timeout(timeout);
    let op = match provider {
        StorageProvider::AzureBlob {
            account,
            access_key,
            container,
            endpoint,
        } => {
            let endpoint = endpoint
                .clone()
                .unwrap_or_else(|| format!("https://{account}.blob.core.windows.net"));
            let builder = services::Azblob::default()
                .endpoint(&endpoint)
                .account_name(account)
                .account_key(access_key)
                .container(container);
            Operator::new(builder).map_err(|e| e.to_string())?.layer(layer).finish()
        }
        StorageProvider::S3 {
            endpoint,
            bucket,
            access_key_id,
            secret_access_key,
            region,
        } => {
            let builder = services::S3::default()
                .endpoint(endpoint)
                .bucket(bucket)
                .access_key_id(access_key_id)
                .secret_access_key(secret_access_key)
                .region(region);
            Operator::new(builder).map_err(|e| e.to_string())?.layer(layer).finish()
        }
        StorageProvider::LocalFs { .. } => {
            return Err("local_fs is not a remote provider".to_string());
        }
    };
    Ok(op)
}

fn content_key(id: FileId) -> String {
    id.to_string()
}

fn metadata_key(id: FileId) -> String {
    format!("{id}.json")
}

/// Maps a backend error for `id`, keeping not-found errors keyed by id.
fn for_id(id: FileId) -> impl Fn(opendal::Error) -> FileError {
    move |e| {
        if e.kind() == opendal::ErrorKind::NotFound {
            FileError::not_found(id)
        } else {
            FileError::from(e)
        }
    }
}

#[async_trait]
impl StorageAdapter for RemoteAdapter {
    async fn exists(&self, id: FileId) -> FileResult<bool> {
        let op = self.operator().await?;
        Ok(op.exists(&metadata_key(id)).await?)
    }

    async fn get_metadata(&self, id: FileId) -> FileResult<FileMetadata> {
        let op = self.operator().await?;
        let raw = op.read(&metadata_key(id)).await.map_err(for_id(id))?;
        let meta: FileMetadata = serde_json::from_slice(&raw.to_vec())
            .map_err(|e| FileError::corrupt_metadata(id, e.to_string()))?;
        if meta.id.is_nil() {
            return Err(FileError::corrupt_metadata(id, "empty id"));
        }
        Ok(meta)
    }

    async fn upload(&self, id: FileId, file: &UploadedFile) -> FileResult<FileMetadata> {
        let op = self.operator().await?;

        let size = fs::metadata(&file.path).await?.len();
        let head = read_head(&file.path).await?;
        let meta = FileMetadata {
            id,
            original_name: file.original_name.clone(),
            mime: resolve_mime(&head, &file.declared_mime, &file.original_name),
            size,
            iat: now_millis(),
            md5: md5_file(&file.path).await?,
        };

        let mut source = fs::File::open(&file.path).await?;
        let mut writer = op.writer(&content_key(id)).await?;
        let mut buf = vec![0u8; UPLOAD_CHUNK];
        loop {
            let n = source.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            writer.write(buf[..n].to_vec()).await?;
        }
        writer.close().await?;

        self.write_metadata(&op, &meta).await?;
        debug!(file_id = %id, size, "uploaded object");
        Ok(meta)
    }

    async fn copy(&self, id: FileId, new_id: FileId) -> FileResult<FileMetadata> {
        let op = self.operator().await?;
        let source = self.get_metadata(id).await?;
        let meta = source.copied_as(new_id);

        self.write_metadata(&op, &meta).await?;

        let (from, to) = (content_key(id), content_key(new_id));
        if op.info().full_capability().copy {
            op.copy(&from, &to).await.map_err(for_id(id))?;
        } else {
            Self::stream_copy(&op, &from, &to)
                .await
                .map_err(|e| match e {
                    FileError::NotFound { .. } => FileError::not_found(id),
                    other => other,
                })?;
        }

        debug!(file_id = %id, new_id = %new_id, "copied object");
        Ok(meta)
    }

    async fn delete(&self, id: FileId) -> FileResult<()> {
        let op = self.operator().await?;
        if !op.exists(&metadata_key(id)).await? {
            return Err(FileError::not_found(id));
        }
        op.delete(&metadata_key(id)).await.map_err(for_id(id))?;
        op.delete(&content_key(id)).await.map_err(for_id(id))?;
        debug!(file_id = %id, "deleted object");
        Ok(())
    }
}

#[async_trait]
impl RemoteStorage for RemoteAdapter {
    async fn download_to(&self, id: FileId, dest: &Path) -> FileResult<()> {
        let op = self.operator().await?;
        if !op.exists(&metadata_key(id)).await? {
            return Err(FileError::not_found(id));
        }
        let meta = self.get_metadata(id).await?;

        remove_if_exists(dest).await?;
        let mut stream = op
            .reader(&content_key(id))
            .await
            .map_err(for_id(id))?
            .into_bytes_stream(..)
            .await
            .map_err(for_id(id))?;
        let mut out = fs::File::create(dest).await?;
        while let Some(chunk) = stream.try_next().await? {
            out.write_all(&chunk).await?;
        }
        out.flush().await?;
        drop(out);

        set_mtime(dest, meta.iat).await?;
        debug!(file_id = %id, path = %dest.display(), "downloaded object");
        Ok(())
    }
}
