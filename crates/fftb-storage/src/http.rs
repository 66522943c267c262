//! Claims addressed by (presigned) HTTP URLs.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Body, Client, StatusCode};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tracing::debug;
use url::Url;

use crate::claim::{ClaimReader, StorageClaim};
use crate::error::{StorageError, StorageResult};
use crate::transfer::{Counted, TransferCounter};

/// Claim read with `GET` and written with `PUT` against its URL.
///
/// Object storage hands these out as presigned URLs, so the holder needs no
/// credentials of its own.
#[derive(Debug, Clone)]
pub struct HttpStorageClaim {
    id: String,
    name: String,
    url: Url,
    size: u64,
    http: Client,
}

impl HttpStorageClaim {
    pub fn new(http: Client, id: impl Into<String>, url: Url, size: u64) -> Self {
        let id = id.into();

        Self {
            name: id.clone(),
            id,
            url,
            size,
            http,
        }
    }

    /// Resolve a URL by probing it with `HEAD`.
    pub async fn from_url(http: Client, url: &Url) -> StorageResult<Self> {
        let response = http.head(url.clone()).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(StorageError::missing_file(url.to_string()));
        }

        if !response.status().is_success() {
            return Err(StorageError::download_failed(format!(
                "HEAD {} returned {}",
                redact(url),
                response.status()
            )));
        }

        // HEAD bodies are empty, so read the header rather than the body size
        let size = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        Ok(Self::new(http, id_from_url(url)?, url.clone(), size))
    }
}

#[async_trait]
impl StorageClaim for HttpStorageClaim {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn url(&self) -> &Url {
        &self.url
    }

    fn size(&self) -> u64 {
        self.size
    }

    async fn write_from(&self, reader: ClaimReader, length: Option<u64>) -> StorageResult<u64> {
        let counter = TransferCounter::new();
        let stream = ReaderStream::new(Counted::new(reader, counter.clone()));

        let mut request = self.http.put(self.url.clone()).body(Body::wrap_stream(stream));
        if let Some(length) = length {
            request = request.header(CONTENT_LENGTH, length);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::upload_failed(format!(
                "PUT {} returned {}: {}",
                redact(&self.url),
                status,
                body
            )));
        }

        debug!(claim_id = %self.id, bytes = counter.get(), "Uploaded http storage claim");
        Ok(counter.get())
    }

    async fn read_to(&self, writer: &mut (dyn AsyncWrite + Send + Unpin)) -> StorageResult<u64> {
        let response = self.http.get(self.url.clone()).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(StorageError::missing_file(&self.id));
        }

        if !response.status().is_success() {
            return Err(StorageError::download_failed(format!(
                "GET {} returned {}",
                redact(&self.url),
                response.status()
            )));
        }

        let mut total = 0u64;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            writer.write_all(&chunk).await?;
            total += chunk.len() as u64;
        }
        writer.flush().await?;

        Ok(total)
    }
}

/// Last path segment of the URL, the object key for presigned URLs.
pub(crate) fn id_from_url(url: &Url) -> StorageResult<String> {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|last| !last.is_empty())
        .map(|last| last.to_string())
        .ok_or_else(|| StorageError::InvalidUrl(url.to_string()))
}

/// URL without its query string, so signatures never reach the logs.
fn redact(url: &Url) -> String {
    let mut clean = url.clone();
    clean.set_query(None);
    clean.to_string()
}
