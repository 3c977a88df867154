//! Google Drive 上传
//!
//! Small files go up as a single `multipart/related` request, larger ones
//! through a resumable session advanced chunk by chunk.

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, RANGE};
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use std::io::SeekFrom;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

use super::types::server_error;
use crate::error::{DriveError, Result};
use crate::files::File;
use crate::transfer::{ChunkOutcome, ChunkedTransfer, ProgressSink, TransferProgress};
use crate::utils::{committed_bytes, content_range};

/// Upload options / 上传选项
#[derive(Clone, Default)]
pub struct UploadOptions {
    /// Target MIME type on Drive, e.g. a Google Sheet to convert into
    pub mime_type: Option<String>,
    /// MIME type of the content; guessed from the name when absent
    pub original_mime_type: Option<String>,
    /// Replace the content of a same-named file in the parent
    pub update_existing: bool,
    /// `None`: resumable when the content is larger than one chunk
    pub resumable: Option<bool>,
    /// 进度回调
    pub progress: Option<Arc<dyn ProgressSink>>,
}

impl UploadOptions {
    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(sink);
        self
    }

    pub fn is_resumable(&self, size: u64, chunk_size: usize) -> bool {
        size > 0 && self.resumable.unwrap_or(size > chunk_size as u64)
    }
}

/// Where uploaded content lands / 上传目标
#[derive(Debug, Clone, PartialEq)]
pub enum UploadTarget {
    /// New file under `parent_id`
    Create { parent_id: String, name: String },
    /// New content for an existing file
    Update { file_id: String },
}

impl UploadTarget {
    /// Request metadata body
    pub fn metadata(&self, mime_type: Option<&str>) -> Value {
        let mut metadata = match self {
            UploadTarget::Create { parent_id, name } => serde_json::json!({
                "name": name,
                "parents": [parent_id],
            }),
            UploadTarget::Update { .. } => serde_json::json!({}),
        };
        if let Some(mime) = mime_type {
            metadata["mimeType"] = Value::String(mime.to_string());
        }
        metadata
    }
}

/// Build a `multipart/related` body (metadata part + media part) / 构造multipart请求体
/// Returns the content type header value and the body.
pub fn multipart_related_body(metadata: &Value, content_type: &str, data: &[u8]) -> (String, Bytes) {
    let boundary = format!("drive_client_{:016x}", rand::random::<u64>());
    let mut body = BytesMut::with_capacity(data.len() + 512);

    // Metadata part
    body.put_slice(format!("--{}\r\n", boundary).as_bytes());
    body.put_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.put_slice(metadata.to_string().as_bytes());
    body.put_slice(b"\r\n");

    // File part
    body.put_slice(format!("--{}\r\n", boundary).as_bytes());
    body.put_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
    body.put_slice(data);
    body.put_slice(b"\r\n");
    body.put_slice(format!("--{}--", boundary).as_bytes());

    (format!("multipart/related; boundary={}", boundary), body.freeze())
}

/// One resumable upload session / 可恢复上传会话
///
/// The session URL is pre-authorized, so chunk requests carry no token.
pub struct ResumableUpload<R> {
    client: Client,
    session_url: String,
    reader: R,
    total_size: u64,
    /// Bytes committed by the server
    offset: u64,
    chunk_size: usize,
    /// Previous chunk failed; ask the server where it stands before resending
    in_error_state: bool,
}

impl<R> ResumableUpload<R>
where
    R: AsyncRead + AsyncSeek + Unpin + Send,
{
    pub fn new(client: Client, session_url: String, reader: R, total_size: u64, chunk_size: usize) -> Self {
        Self {
            client,
            session_url,
            reader,
            total_size,
            offset: 0,
            chunk_size,
            in_error_state: false,
        }
    }

    pub fn session_url(&self) -> &str {
        &self.session_url
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    async fn advance(&mut self) -> Result<ChunkOutcome<File>> {
        if self.chunk_size == 0 {
            return Err(DriveError::Config("chunk size must not be zero".to_string()));
        }
        if self.in_error_state {
            let response = self.client
                .put(&self.session_url)
                .header(CONTENT_RANGE, content_range(0, 0, self.total_size))
                .header(CONTENT_LENGTH, 0)
                .send()
                .await?;
            if let ChunkOutcome::Complete(file) = self.interpret(response).await? {
                return Ok(ChunkOutcome::Complete(file));
            }
            tracing::debug!("resumable session resynced at offset {}", self.offset);
        }

        self.reader.seek(SeekFrom::Start(self.offset)).await?;
        let mut chunk = Vec::with_capacity(self.chunk_size.min((self.total_size - self.offset) as usize));
        (&mut self.reader)
            .take(self.chunk_size as u64)
            .read_to_end(&mut chunk)
            .await?;

        if chunk.is_empty() {
            return Err(DriveError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("content ended at {} of {} bytes", self.offset, self.total_size),
            )));
        }

        let range = content_range(self.offset, chunk.len() as u64, self.total_size);
        tracing::debug!("Google Drive分片上传: range={}", range);

        let response = self.client
            .put(&self.session_url)
            .header(CONTENT_RANGE, range)
            .body(Bytes::from(chunk))
            .send()
            .await?;

        self.interpret(response).await
    }

    /// 308 Resume Incomplete 或 200/201 表示成功
    async fn interpret(&mut self, response: Response) -> Result<ChunkOutcome<File>> {
        let status = response.status();

        if status == StatusCode::PERMANENT_REDIRECT {
            let range = response.headers()
                .get(RANGE)
                .and_then(|h| h.to_str().ok());
            self.offset = committed_bytes(range).min(self.total_size);
            return Ok(ChunkOutcome::Pending(Some(TransferProgress::new(self.offset, self.total_size))));
        }

        let body = response.text().await?;
        if status.is_success() {
            let file: File = serde_json::from_str(&body)?;
            self.offset = self.total_size;
            return Ok(ChunkOutcome::Complete(file));
        }

        Err(server_error(status.as_u16(), &body))
    }
}

#[async_trait]
impl<R> ChunkedTransfer for ResumableUpload<R>
where
    R: AsyncRead + AsyncSeek + Unpin + Send,
{
    type Output = File;

    async fn next_chunk(&mut self) -> Result<ChunkOutcome<File>> {
        let result = self.advance().await;
        self.in_error_state = result.is_err();
        result
    }
}
