//! Remote object download
//!
//! The raw dataset lives in an object store bucket. `GcsStore` reads it over
//! the Cloud Storage JSON API; `LocalStore` serves `file://` buckets from a
//! directory, which is what offline runs and tests use.

use hotel_core::errors::{PipelineError, Result, ResultExt, Stage};
use std::fs::File;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};
use url::Url;

/// Default Cloud Storage API endpoint
pub const GCS_API_BASE: &str = "https://storage.googleapis.com";

/// Env var holding an OAuth bearer token for private buckets
pub const TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

/// Env var overriding the API endpoint (emulators)
pub const API_BASE_ENV: &str = "GCS_API_BASE";

/// A bucket that can copy one object to a local file
pub trait ObjectStore {
    /// Download `object` to `dest`, returning the bytes written
    fn download(&self, object: &str, dest: &Path) -> Result<u64>;

    /// Human readable location, for logs
    fn describe(&self) -> String;
}

/// Pick a store from the configured bucket name
///
/// `file:///dir` maps to a [`LocalStore`]; `gs://name` and bare names map to
/// a [`GcsStore`].
pub fn store_for_bucket(bucket_name: &str) -> Result<Box<dyn ObjectStore>> {
    if bucket_name.starts_with("file://") {
        let url = Url::parse(bucket_name)
            .op(Stage::Ingestion, "resolve bucket")
            .map_err(|e| e.with_context("bucket", bucket_name))?;
        let dir = url.to_file_path().map_err(|_| {
            PipelineError::new(Stage::Ingestion, "resolve bucket", "not a local directory URL")
                .with_context("bucket", bucket_name)
        })?;
        return Ok(Box::new(LocalStore::new(dir)));
    }

    let bucket = bucket_name.strip_prefix("gs://").unwrap_or(bucket_name);
    Ok(Box::new(GcsStore::from_env(bucket)?))
}

fn download_error(err: PipelineError, object: &str, dest: &Path) -> PipelineError {
    err.with_context("object", object)
        .with_context("dest", dest.display())
}

/// Fill a temporary file next to `dest`, then rename it into place.
/// `dest` is left untouched when `fill` fails.
fn write_into_place<F>(dest: &Path, fill: F) -> Result<u64>
where
    F: FnOnce(&mut File) -> Result<u64>,
{
    let dir = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut staging = NamedTempFile::new_in(dir).op(Stage::Ingestion, "download csv file")?;
    let bytes = fill(staging.as_file_mut())?;
    staging
        .persist(dest)
        .map_err(|e| e.error)
        .op(Stage::Ingestion, "download csv file")?;
    Ok(bytes)
}

/// Cloud Storage bucket read through the JSON API
#[derive(Debug)]
pub struct GcsStore {
    client: reqwest::blocking::Client,
    base_url: Url,
    bucket: String,
    token: Option<String>,
}

impl GcsStore {
    /// Endpoint and credentials from the ambient environment
    pub fn from_env(bucket: &str) -> Result<Self> {
        let base = std::env::var(API_BASE_ENV).unwrap_or_else(|_| GCS_API_BASE.to_string());
        let token = std::env::var(TOKEN_ENV).ok().filter(|t| !t.is_empty());
        Self::new(bucket, &base, token)
    }

    pub fn new(bucket: &str, base_url: &str, token: Option<String>) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .op(Stage::Ingestion, "configure storage client")
            .map_err(|e| e.with_context("base_url", base_url))?;
        let client = reqwest::blocking::Client::builder()
            .build()
            .op(Stage::Ingestion, "configure storage client")?;
        Ok(Self {
            client,
            base_url,
            bucket: bucket.to_string(),
            token,
        })
    }

    /// Media download URL of `object`
    pub fn object_url(&self, object: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                PipelineError::new(
                    Stage::Ingestion,
                    "build object url",
                    "storage endpoint cannot carry a path",
                )
                .with_context("base_url", &self.base_url)
            })?
            .pop_if_empty()
            .extend(["storage", "v1", "b", self.bucket.as_str(), "o", object]);
        url.query_pairs_mut().append_pair("alt", "media");
        Ok(url)
    }
}

impl ObjectStore for GcsStore {
    fn download(&self, object: &str, dest: &Path) -> Result<u64> {
        let url = self.object_url(object)?;
        debug!("GET {}", url);

        let mut request = self.client.get(url.clone());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let mut response = request
            .send()
            .op(Stage::Ingestion, "download csv file")
            .map_err(|e| download_error(e, object, dest))?;

        let status = response.status();
        if !status.is_success() {
            return Err(download_error(
                PipelineError::new(
                    Stage::Ingestion,
                    "download csv file",
                    format!("storage returned HTTP {status}"),
                ),
                object,
                dest,
            ));
        }

        let bytes = write_into_place(dest, |file| {
            response.copy_to(file).op(Stage::Ingestion, "download csv file")
        })
        .map_err(|e| download_error(e, object, dest))?;
        info!("Downloaded {} bytes from gs://{}/{}", bytes, self.bucket, object);
        Ok(bytes)
    }

    fn describe(&self) -> String {
        format!("gs://{}", self.bucket)
    }
}

/// Directory standing in for a bucket
#[derive(Debug, Clone)]
pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }
}

impl ObjectStore for LocalStore {
    fn download(&self, object: &str, dest: &Path) -> Result<u64> {
        let source = self.dir.join(object);
        let bytes = write_into_place(dest, |file| {
            let mut reader = File::open(&source).op(Stage::Ingestion, "download csv file")?;
            std::io::copy(&mut reader, file).op(Stage::Ingestion, "download csv file")
        })
        .map_err(|e| download_error(e, object, dest).with_context("source", source.display()))?;
        info!("Copied {} bytes from {}", bytes, source.display());
        Ok(bytes)
    }

    fn describe(&self) -> String {
        format!("file://{}", self.dir.display())
    }
}
