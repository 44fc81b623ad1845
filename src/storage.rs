use async_trait::async_trait;
use aws_sdk_s3 as s3;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use s3::primitives::ByteStream;
use std::{
    collections::HashMap,
    io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};
use thiserror::Error;
use tokio::{fs, io::AsyncWriteExt};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("storage backend rejected the write: {0}")]
    Backend(String),
}

// 1. Staging
/// StagedFile
///
/// Attachment bytes that have been written to the staging area but not yet handed to the
/// durable store. The staging area is never served, so staged bytes are invisible to every
/// other request. Dropping a `StagedFile` that was not persisted removes it, which covers
/// short-circuited pipelines, oversize bodies and requests cancelled mid-stream alike.
pub struct StagedFile {
    path: PathBuf,
    file: Option<fs::File>,
    size: u64,
}

impl StagedFile {
    /// Creates an empty, uniquely named file under `root`.
    pub async fn create(root: &Path) -> io::Result<Self> {
        fs::create_dir_all(root).await?;
        let path = root.join(format!("{}.part", Uuid::new_v4()));
        let file = fs::File::create(&path).await?;
        Ok(Self {
            path,
            file: Some(file),
            size: 0,
        })
    }

    pub async fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::other("staged file already finished"))?;
        file.write_all(bytes).await?;
        self.size += bytes.len() as u64;
        Ok(())
    }

    /// Flushes and syncs the staged bytes, closing the handle.
    pub async fn finish(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.sync_all().await?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Hands ownership of the bytes over to whoever moved them; the file is no longer
    /// removed on drop.
    fn disarm(mut self) {
        self.path = PathBuf::new();
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.path.as_os_str().is_empty() {
            return;
        }
        self.file.take();
        // A single unlink on the dropping thread, even inside the runtime. The staged file
        // must be gone before the failed request's response is written.
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to discard staged attachment");
            }
        }
    }
}

/// Longest stored name accepted, in bytes. Matches the common filesystem name limit.
pub const MAX_STORED_NAME_LEN: usize = 255;

/// derive_stored_name
///
/// Turns a client-declared filename into the name the attachment is stored under: the last
/// path segment, with directory navigation and hidden-file prefixes refused. Two uploads
/// declaring the same name map to the same stored name; the later write replaces the earlier.
pub fn derive_stored_name(declared: &str) -> Option<String> {
    let name = declared
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    if name.is_empty()
        || name.len() > MAX_STORED_NAME_LEN
        || name.starts_with('.')
        || name.chars().any(char::is_control)
    {
        return None;
    }
    Some(name.to_string())
}

/// Characters escaped when a stored name is placed into a URL path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Percent-encodes a stored name for use as one URL path segment.
pub fn url_segment(name: &str) -> String {
    utf8_percent_encode(name, PATH_SEGMENT).to_string()
}

// 2. StorageService Contract
/// StorageService
///
/// Durable home for committed attachments, addressable by stable name. The real backends
/// (local disk, S3) and the in-memory mock are swapped behind this trait without touching
/// the pipeline or the handlers.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Prepares the backend at startup (creates the directory or bucket).
    async fn ensure_ready(&self) -> Result<(), StorageError>;

    /// Moves staged bytes to `name`, replacing any object already stored there.
    async fn persist(
        &self,
        staged: StagedFile,
        name: &str,
        content_type: &str,
    ) -> Result<(), StorageError>;

    /// Whether an object is currently reachable under `name`.
    async fn exists(&self, name: &str) -> bool;

    /// Where clients fetch the object stored under `name`.
    fn locate(&self, name: &str) -> String;
}

/// Prefix under which the disk store is served back to clients.
pub const ASSETS_PREFIX: &str = "/assets";

// 3. Local Disk Implementation
/// LocalDiskStorage
///
/// Stores attachments as plain files under `root`, which the router serves at `/assets`.
/// Commit is a rename from the staging area, so a stored name always points at a complete
/// file. Staging and root must share a filesystem.
#[derive(Clone)]
pub struct LocalDiskStorage {
    root: PathBuf,
}

impl LocalDiskStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl StorageService for LocalDiskStorage {
    async fn ensure_ready(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    async fn persist(
        &self,
        staged: StagedFile,
        name: &str,
        _content_type: &str,
    ) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root).await?;
        fs::rename(staged.path(), self.root.join(name)).await?;
        staged.disarm();
        Ok(())
    }

    async fn exists(&self, name: &str) -> bool {
        fs::try_exists(self.root.join(name)).await.unwrap_or(false)
    }

    fn locate(&self, name: &str) -> String {
        format!("{ASSETS_PREFIX}/{}", url_segment(name))
    }
}

// 4. S3 Implementation
/// S3StorageClient
///
/// Stores attachments as objects in an S3-compatible bucket (MinIO locally, Supabase or
/// AWS in production). The staged file is uploaded with a single `PutObject`, so an object
/// only appears once its bytes are complete.
#[derive(Clone)]
pub struct S3StorageClient {
    client: s3::Client,
    bucket_name: String,
    endpoint: String,
}

impl S3StorageClient {
    pub fn new(endpoint: &str, region: &str, access_key: &str, secret_key: &str, bucket: &str) -> Self {
        let credentials =
            s3::config::Credentials::new(access_key, secret_key, None, None, "static");

        let config = s3::Config::builder()
            .credentials_provider(credentials)
            .endpoint_url(endpoint)
            .region(s3::config::Region::new(region.to_string()))
            .behavior_version_latest()
            // Path-style addressing is required by MinIO and Supabase gateways.
            .force_path_style(true)
            .build();

        Self {
            client: s3::Client::from_conf(config),
            bucket_name: bucket.to_string(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl StorageService for S3StorageClient {
    async fn ensure_ready(&self) -> Result<(), StorageError> {
        // CreateBucket fails harmlessly when the bucket already exists.
        if let Err(e) = self.client.create_bucket().bucket(&self.bucket_name).send().await {
            tracing::debug!(error = %e, bucket = %self.bucket_name, "create_bucket skipped");
        }
        Ok(())
    }

    async fn persist(
        &self,
        staged: StagedFile,
        name: &str,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let body = ByteStream::from_path(staged.path())
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(name)
            .content_type(content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        // The staged copy is removed when `staged` drops here.
        Ok(())
    }

    async fn exists(&self, name: &str) -> bool {
        self.client
            .head_object()
            .bucket(&self.bucket_name)
            .key(name)
            .send()
            .await
            .is_ok()
    }

    fn locate(&self, name: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket_name, url_segment(name))
    }
}

// 5. The Mock Implementation (For Tests)
/// MockStorageService
///
/// In-memory store used by tests. `new_failing` makes every commit fail, which is how the
/// `storage_write_failed` path is exercised without a broken disk.
#[derive(Clone, Default)]
pub struct MockStorageService {
    /// When true, all commits return a simulated failure.
    pub should_fail: bool,
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    /// Bytes currently stored under `name`.
    pub fn object(&self, name: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn ensure_ready(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn persist(
        &self,
        staged: StagedFile,
        name: &str,
        _content_type: &str,
    ) -> Result<(), StorageError> {
        if self.should_fail {
            return Err(StorageError::Backend(
                "Mock Storage Error: Simulation requested".to_string(),
            ));
        }
        let bytes = fs::read(staged.path()).await?;
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), bytes);
        Ok(())
    }

    async fn exists(&self, name: &str) -> bool {
        self.object(name).is_some()
    }

    fn locate(&self, name: &str) -> String {
        format!("mock://{name}")
    }
}

/// StorageState
///
/// The concrete type used to share the storage service across the application state.
pub type StorageState = Arc<dyn StorageService>;
