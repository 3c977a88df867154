//! Google Drive 客户端
//!
//! One method per logical operation. Each issues a single files.* request,
//! except uploads through a resumable session and the lookups that page
//! through files.list.

use futures::TryStreamExt;
use reqwest::header::LOCATION;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncWrite, AsyncWriteExt};
use tokio_util::io::StreamReader;

use super::auth::{Credentials, TokenProvider};
use super::types::{files_list_fields, server_error, FilesResponse, ParentsResponse, FILE_FIELDS, MAX_PAGE_SIZE};
use super::upload::{multipart_related_body, ResumableUpload, UploadOptions, UploadTarget};
use crate::config::{ApiConfig, DriveConfig, TransferConfig};
use crate::error::{DriveError, Result};
use crate::files::{mimetypes, File};
use crate::query::{build_query, Clause};
use crate::transfer::{run_resumable_transfer, NoProgress, ProgressSink};
use crate::utils::{file_name_of, guess_mime_type};

/// Default number of results for `list_files`
pub const DEFAULT_LIST_LIMIT: usize = 100;

/// Filters for `list_files` / 文件列表过滤条件
#[derive(Debug, Clone)]
pub struct ListQuery {
    pub name_equals: Option<String>,
    pub name_contains: Option<String>,
    pub mime_type: Option<String>,
    pub parents_in: Option<String>,
    /// Maximum number of files returned
    pub limit: usize,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            name_equals: None,
            name_contains: None,
            mime_type: None,
            parents_in: None,
            limit: DEFAULT_LIST_LIMIT,
        }
    }
}

impl ListQuery {
    /// Clauses sent as `q`; trashed files are always excluded
    pub fn clauses(&self) -> Vec<Clause> {
        let mut clauses = vec![Clause::eq("trashed", false)];
        if let Some(ref name) = self.name_equals {
            clauses.push(Clause::eq("name", name));
        }
        if let Some(ref name) = self.name_contains {
            clauses.push(Clause::contains("name", name));
        }
        if let Some(ref mime) = self.mime_type {
            clauses.push(Clause::eq("mimeType", mime));
        }
        if let Some(ref parent) = self.parents_in {
            clauses.push(Clause::within("parents", parent));
        }
        clauses
    }
}

/// Metadata changes for `update_file` / 文件更新内容
#[derive(Debug, Clone, Default)]
pub struct FileUpdate {
    pub name: Option<String>,
    pub add_parents: Vec<String>,
    pub remove_parents: Vec<String>,
}

impl FileUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.add_parents.is_empty() && self.remove_parents.is_empty()
    }

    fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if !self.add_parents.is_empty() {
            params.push(("addParents", self.add_parents.join(",")));
        }
        if !self.remove_parents.is_empty() {
            params.push(("removeParents", self.remove_parents.join(",")));
        }
        params
    }
}

/// How to look up a file for `file_exists`
#[derive(Debug, Clone, Copy)]
pub enum FileLookup<'a> {
    Id(&'a str),
    Name { name: &'a str, parent_id: Option<&'a str> },
}

/// Google Drive client / Google Drive 客户端
pub struct DriveClient {
    http: Client,
    auth: TokenProvider,
    api: ApiConfig,
    transfer: TransferConfig,
    supports_all_drives: bool,
}

impl DriveClient {
    pub fn new(config: &DriveConfig, credentials: Credentials) -> Result<Self> {
        config.transfer.validate()?;
        let http = Client::new();
        Ok(Self {
            auth: TokenProvider::new(http.clone(), config.api.token_url.clone(), credentials),
            http,
            api: config.api.clone(),
            transfer: config.transfer.clone(),
            supports_all_drives: config.supports_all_drives,
        })
    }

    /// Load the credentials file named by the configuration / 从配置加载凭据
    pub fn from_config(config: &DriveConfig) -> Result<Self> {
        let credentials = Credentials::from_file(&config.get_credentials_path())?;
        Self::new(config, credentials)
    }

    pub fn supports_all_drives(&self) -> bool {
        self.supports_all_drives
    }

    fn file_url(&self, file_id: &str) -> String {
        format!("{}/files/{}", self.api.base_url, urlencoding::encode(file_id))
    }

    fn drive_params(&self) -> Vec<(&'static str, String)> {
        if self.supports_all_drives {
            vec![("supportsAllDrives", "true".to_string())]
        } else {
            Vec::new()
        }
    }

    /// 发起API请求, refreshing the token once on 401
    async fn send<F>(&self, build: F) -> Result<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let token = self.auth.access_token().await?;
        let response = build(&self.http)
            .bearer_auth(&token)
            .query(&self.drive_params())
            .send()
            .await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        // Token过期，刷新后重试
        tracing::debug!("access token rejected, refreshing");
        self.auth.invalidate().await;
        let token = self.auth.refresh().await?;
        Ok(build(&self.http)
            .bearer_auth(&token)
            .query(&self.drive_params())
            .send()
            .await?)
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(server_error(status.as_u16(), &body));
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(server_error(status.as_u16(), &body))
    }

    // ============ 查询 ============

    /// Run a files.list search, following page tokens until `limit` / 搜索文件
    pub async fn search(&self, clauses: &[Clause], limit: usize) -> Result<Vec<File>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let q = build_query(clauses);
        let fields = files_list_fields();
        let url = format!("{}/files", self.api.base_url);
        let mut all_files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page_size = (limit - all_files.len()).min(MAX_PAGE_SIZE);
            let mut params = vec![
                ("q", q.clone()),
                ("fields", fields.clone()),
                ("pageSize", page_size.to_string()),
            ];
            if self.supports_all_drives {
                params.push(("includeItemsFromAllDrives", "true".to_string()));
            }
            if let Some(ref token) = page_token {
                params.push(("pageToken", token.clone()));
            }

            let response = self.send(|c| c.get(&url).query(&params)).await?;
            let page: FilesResponse = Self::parse(response).await?;
            all_files.extend(page.files);

            page_token = page.next_page_token;
            if page_token.is_none() || all_files.len() >= limit {
                break;
            }
        }

        all_files.truncate(limit);
        tracing::debug!("files.list q={:?} -> {} files", q, all_files.len());
        Ok(all_files)
    }

    /// List non-trashed files matching the filters / 列出文件
    pub async fn list_files(&self, query: &ListQuery) -> Result<Vec<File>> {
        self.search(&query.clauses(), query.limit).await
    }

    /// Every non-trashed child of a folder / 列出子文件
    pub async fn list_children(&self, folder_id: &str) -> Result<Vec<File>> {
        let query = ListQuery {
            parents_in: Some(folder_id.to_string()),
            limit: usize::MAX,
            ..Default::default()
        };
        self.list_files(&query).await
    }

    /// 获取文件元数据
    pub async fn get_file(&self, file_id: &str) -> Result<File> {
        let url = self.file_url(file_id);
        let response = self.send(|c| c.get(&url).query(&[("fields", FILE_FIELDS)])).await?;
        Self::parse(response).await
    }

    /// Like `get_file`, but a missing file is `None`
    pub async fn find_file(&self, file_id: &str) -> Result<Option<File>> {
        match self.get_file(file_id).await {
            Ok(file) => Ok(Some(file)),
            Err(e) if e.status() == Some(404) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// The root folder (`root` is an alias id)
    pub async fn root(&self) -> Result<File> {
        self.get_file("root").await
    }

    /// First file with this exact name. Names are not unique on Drive.
    pub async fn get_file_by_name(&self, name: &str, parent_id: Option<&str>) -> Result<File> {
        let query = ListQuery {
            name_equals: Some(name.to_string()),
            parents_in: parent_id.map(str::to_string),
            limit: 1,
            ..Default::default()
        };
        self.list_files(&query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DriveError::FileNotFound(name.to_string()))
    }

    pub async fn file_exists(&self, lookup: FileLookup<'_>) -> Result<Option<File>> {
        match lookup {
            FileLookup::Id(id) => self.find_file(id).await,
            FileLookup::Name { name, parent_id } => match self.get_file_by_name(name, parent_id).await {
                Ok(file) => Ok(Some(file)),
                Err(DriveError::FileNotFound(_)) => Ok(None),
                Err(e) => Err(e),
            },
        }
    }

    /// Files and folders shared with the user / 与我共享的文件
    pub async fn files_shared_with_me(&self) -> Result<Vec<File>> {
        self.search(&[Clause::eq("sharedWithMe", true)], usize::MAX).await
    }

    /// A shared file by name; `is_directory` filters on the folder type when set
    pub async fn get_shared_file(&self, name: &str, is_directory: Option<bool>) -> Result<File> {
        self.files_shared_with_me()
            .await?
            .into_iter()
            .filter(|f| f.name == name)
            .find(|f| match is_directory {
                Some(want) => f.is_directory().unwrap_or(false) == want,
                None => true,
            })
            .ok_or_else(|| DriveError::FileNotFound(name.to_string()))
    }

    pub async fn get_shared_directory(&self, name: &str) -> Result<File> {
        self.get_shared_file(name, Some(true)).await
    }

    // ============ 修改 ============

    /// 创建文件夹
    pub async fn create_folder(&self, name: &str, parent_id: Option<&str>) -> Result<File> {
        let mut body = serde_json::json!({
            "name": name,
            "mimeType": mimetypes::GOOGLE_DRIVE_FOLDER,
        });
        if let Some(parent) = parent_id {
            body["parents"] = serde_json::json!([parent]);
        }

        let url = format!("{}/files", self.api.base_url);
        let response = self.send(|c| c.post(&url).query(&[("fields", FILE_FIELDS)]).json(&body)).await?;
        let folder: File = Self::parse(response).await?;
        tracing::info!("created folder {} ({})", folder.name, folder.id);
        Ok(folder)
    }

    /// Existing folder with this name under the parent, created when missing
    pub async fn get_or_create_folder(&self, name: &str, parent_id: Option<&str>) -> Result<File> {
        let query = ListQuery {
            name_equals: Some(name.to_string()),
            mime_type: Some(mimetypes::GOOGLE_DRIVE_FOLDER.to_string()),
            parents_in: parent_id.map(str::to_string),
            limit: 1,
            ..Default::default()
        };
        if let Some(folder) = self.list_files(&query).await?.into_iter().next() {
            return Ok(folder);
        }
        self.create_folder(name, parent_id).await
    }

    /// 删除文件
    pub async fn remove_file(&self, file_id: &str) -> Result<()> {
        let url = self.file_url(file_id);
        let response = self.send(|c| c.delete(&url)).await?;
        Self::check(response).await?;
        tracing::info!("removed {}", file_id);
        Ok(())
    }

    /// Apply metadata changes. Nothing to change means no request and `None`.
    pub async fn update_file(&self, file_id: &str, update: &FileUpdate) -> Result<Option<File>> {
        if update.is_empty() {
            return Ok(None);
        }

        let url = self.file_url(file_id);
        let mut params = update.params();
        params.push(("fields", FILE_FIELDS.to_string()));
        let body = match update.name {
            Some(ref name) => serde_json::json!({ "name": name }),
            None => serde_json::json!({}),
        };

        let response = self.send(|c| c.patch(&url).query(&params).json(&body)).await?;
        Ok(Some(Self::parse(response).await?))
    }

    /// 重命名
    pub async fn rename_file(&self, file_id: &str, name: &str) -> Result<Option<File>> {
        let update = FileUpdate {
            name: Some(name.to_string()),
            ..Default::default()
        };
        self.update_file(file_id, &update).await
    }

    /// Move into `folder_id`, detaching from every current parent / 移动
    pub async fn move_file_to_folder(&self, file_id: &str, folder_id: &str) -> Result<Option<File>> {
        let url = self.file_url(file_id);
        let response = self.send(|c| c.get(&url).query(&[("fields", "parents")])).await?;
        let current: ParentsResponse = Self::parse(response).await?;

        let update = FileUpdate {
            name: None,
            add_parents: vec![folder_id.to_string()],
            remove_parents: current.parents,
        };
        self.update_file(file_id, &update).await
    }

    // ============ 下载 ============

    /// Stream file content into `writer`; with `export_mime` a Google
    /// document is converted server-side. Returns the bytes written.
    pub async fn download<W>(&self, file_id: &str, writer: &mut W, export_mime: Option<&str>) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let response = match export_mime {
            Some(mime) => {
                let url = format!("{}/export", self.file_url(file_id));
                self.send(|c| c.get(&url).query(&[("mimeType", mime)])).await?
            }
            None => {
                let url = self.file_url(file_id);
                self.send(|c| c.get(&url).query(&[("alt", "media")])).await?
            }
        };
        let response = Self::check(response).await?;

        let stream = response.bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
        let mut reader = StreamReader::new(Box::pin(stream));
        let written = tokio::io::copy(&mut reader, writer).await?;
        writer.flush().await?;

        tracing::debug!("downloaded {} bytes of {}", written, file_id);
        Ok(written)
    }

    /// Download into a local file / 下载到本地文件
    pub async fn download_file(&self, file_id: &str, path: &Path, export_mime: Option<&str>) -> Result<u64> {
        let mut local = tokio::fs::File::create(path).await?;
        self.download(file_id, &mut local, export_mime).await
    }

    /// Export a Google Sheet (or download an Excel file) as XLSX bytes / 导出为XLSX
    pub async fn export_xlsx(&self, file_id: &str) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.download(file_id, &mut buf, Some(mimetypes::XLSX)).await?;
        Ok(buf)
    }

    // ============ 上传 ============

    /// Upload XLSX bytes, converted to a Google Sheet when `as_spreadsheet` is set
    pub async fn upload_xlsx(
        &self,
        parent_id: &str,
        name: &str,
        data: Vec<u8>,
        as_spreadsheet: bool,
        update_existing: bool,
    ) -> Result<File> {
        let options = UploadOptions {
            mime_type: as_spreadsheet.then(|| mimetypes::GOOGLE_SHEETS.to_string()),
            original_mime_type: Some(mimetypes::XLSX.to_string()),
            update_existing,
            ..Default::default()
        };
        let size = data.len() as u64;
        self.upload(parent_id, name, std::io::Cursor::new(data), size, &options).await
    }

    /// Upload `size` bytes from `reader` as `name` under `parent_id` / 上传
    pub async fn upload<R>(
        &self,
        parent_id: &str,
        name: &str,
        mut reader: R,
        size: u64,
        options: &UploadOptions,
    ) -> Result<File>
    where
        R: AsyncRead + AsyncSeek + Unpin + Send,
    {
        let content_type = options.original_mime_type
            .clone()
            .unwrap_or_else(|| guess_mime_type(name));

        let mut target = UploadTarget::Create {
            parent_id: parent_id.to_string(),
            name: name.to_string(),
        };
        if options.update_existing {
            let lookup = FileLookup::Name { name, parent_id: Some(parent_id) };
            if let Some(existing) = self.file_exists(lookup).await? {
                tracing::info!("replacing content of {} ({})", existing.name, existing.id);
                target = UploadTarget::Update { file_id: existing.id };
            }
        }
        let metadata = target.metadata(options.mime_type.as_deref());

        if !options.is_resumable(size, self.transfer.chunk_size) {
            let mut data = Vec::with_capacity(size as usize);
            reader.read_to_end(&mut data).await?;
            return self.upload_multipart(&target, &metadata, &content_type, data).await;
        }

        let session_url = self.start_session(&target, &metadata, &content_type, size).await?;
        let mut upload = ResumableUpload::new(
            self.http.clone(),
            session_url,
            reader,
            size,
            self.transfer.chunk_size,
        );
        let sink: Arc<dyn ProgressSink> = options.progress
            .clone()
            .unwrap_or_else(|| Arc::new(NoProgress));

        let file = run_resumable_transfer(&mut upload, &self.transfer.retry_policy(), sink.as_ref()).await?;
        tracing::info!("uploaded {} ({}, {} bytes)", file.name, file.id, size);
        Ok(file)
    }

    /// Upload a local file; the remote name defaults to the local one / 上传本地文件
    pub async fn upload_file(
        &self,
        parent_id: &str,
        path: &Path,
        name: Option<&str>,
        options: &UploadOptions,
    ) -> Result<File> {
        let name = match name {
            Some(n) => n.to_string(),
            None => file_name_of(path).ok_or_else(|| {
                DriveError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("no file name in {:?}", path),
                ))
            })?,
        };

        let local = tokio::fs::File::open(path).await?;
        let size = local.metadata().await?.len();
        self.upload(parent_id, &name, local, size, options).await
    }

    /// Single-request upload (uploadType=multipart)
    async fn upload_multipart(
        &self,
        target: &UploadTarget,
        metadata: &serde_json::Value,
        content_type: &str,
        data: Vec<u8>,
    ) -> Result<File> {
        let (multipart_type, body) = multipart_related_body(metadata, content_type, &data);
        let params = [("uploadType", "multipart"), ("fields", FILE_FIELDS)];

        let response = match target {
            UploadTarget::Create { .. } => {
                let url = format!("{}/files", self.api.upload_url);
                self.send(|c| {
                    c.post(&url)
                        .query(&params)
                        .header("Content-Type", multipart_type.as_str())
                        .body(body.clone())
                })
                .await?
            }
            UploadTarget::Update { file_id } => {
                let url = format!("{}/files/{}", self.api.upload_url, urlencoding::encode(file_id));
                self.send(|c| {
                    c.patch(&url)
                        .query(&params)
                        .header("Content-Type", multipart_type.as_str())
                        .body(body.clone())
                })
                .await?
            }
        };
        Self::parse(response).await
    }

    /// 创建Resumable上传会话, returning the session URL
    async fn start_session(
        &self,
        target: &UploadTarget,
        metadata: &serde_json::Value,
        content_type: &str,
        size: u64,
    ) -> Result<String> {
        let params = [("uploadType", "resumable"), ("fields", FILE_FIELDS)];
        let size = size.to_string();

        let response = match target {
            UploadTarget::Create { .. } => {
                let url = format!("{}/files", self.api.upload_url);
                self.send(|c| {
                    c.post(&url)
                        .query(&params)
                        .header("X-Upload-Content-Type", content_type)
                        .header("X-Upload-Content-Length", size.as_str())
                        .json(metadata)
                })
                .await?
            }
            UploadTarget::Update { file_id } => {
                let url = format!("{}/files/{}", self.api.upload_url, urlencoding::encode(file_id));
                self.send(|c| {
                    c.patch(&url)
                        .query(&params)
                        .header("X-Upload-Content-Type", content_type)
                        .header("X-Upload-Content-Length", size.as_str())
                        .json(metadata)
                })
                .await?
            }
        };
        let response = Self::check(response).await?;

        let location = response.headers()
            .get(LOCATION)
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| DriveError::InvalidResponse("未获取到上传URL".to_string()))?;
        tracing::info!("resumable session created for {} bytes", size);
        Ok(location.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use axum::extract::{Path as UrlPath, Query, State};
    use axum::http::{header, HeaderMap, StatusCode as AxumStatus};
    use axum::response::{IntoResponse, Response as AxumResponse};
    use axum::routing::{get, post, put};
    use axum::{Json, Router};
    use std::collections::HashMap;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-process stand-in for the Drive endpoints used by the client
    #[derive(Default)]
    struct MockDrive {
        base: String,
        tokens_issued: AtomicUsize,
        queries: Mutex<Vec<String>>,
        /// Status code forced for the n-th PUT to the session (0-based)
        fail_on: Mutex<HashMap<usize, u16>>,
        chunk_puts: AtomicUsize,
        received: Mutex<Vec<u8>>,
        multipart_bodies: Mutex<Vec<(String, Vec<u8>)>>,
    }

    type Shared = Arc<MockDrive>;

    async fn token(State(mock): State<Shared>) -> Json<serde_json::Value> {
        let n = mock.tokens_issued.fetch_add(1, Ordering::SeqCst) + 1;
        Json(serde_json::json!({ "access_token": format!("token-{}", n), "expires_in": 3600 }))
    }

    async fn list(State(mock): State<Shared>, Query(params): Query<HashMap<String, String>>) -> Json<serde_json::Value> {
        mock.queries.lock().unwrap().push(params.get("q").cloned().unwrap_or_default());
        match params.get("pageToken").map(String::as_str) {
            None => Json(serde_json::json!({
                "nextPageToken": "page-2",
                "files": [{"id": "a", "name": "a.txt", "mimeType": "text/plain"}]
            })),
            Some(_) => Json(serde_json::json!({
                "files": [{"id": "b", "name": "b", "mimeType": mimetypes::GOOGLE_DRIVE_FOLDER}]
            })),
        }
    }

    async fn get_one(
        UrlPath(id): UrlPath<String>,
        headers: HeaderMap,
        Query(params): Query<HashMap<String, String>>,
    ) -> AxumResponse {
        let auth = headers.get(header::AUTHORIZATION).and_then(|h| h.to_str().ok()).unwrap_or("");
        if id == "stale" && auth == "Bearer token-1" {
            return AxumStatus::UNAUTHORIZED.into_response();
        }
        if id == "missing" {
            let body = serde_json::json!({"error": {"code": 404, "message": "File not found: missing."}});
            return (AxumStatus::NOT_FOUND, Json(body)).into_response();
        }
        if params.get("alt").map(String::as_str) == Some("media") {
            return "hello drive".into_response();
        }
        Json(serde_json::json!({"id": id, "name": "doc.txt", "parents": ["root"]})).into_response()
    }

    async fn export(UrlPath(id): UrlPath<String>, Query(params): Query<HashMap<String, String>>) -> String {
        format!("{} as {}", id, params.get("mimeType").cloned().unwrap_or_default())
    }

    async fn start_upload(
        State(mock): State<Shared>,
        headers: HeaderMap,
        Query(params): Query<HashMap<String, String>>,
        body: Bytes,
    ) -> AxumResponse {
        if params.get("uploadType").map(String::as_str) == Some("resumable") {
            let location = format!("{}/session", mock.base);
            return (AxumStatus::OK, [(header::LOCATION, location)]).into_response();
        }
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|h| h.to_str().ok())
            .unwrap_or("")
            .to_string();
        mock.multipart_bodies.lock().unwrap().push((content_type, body.to_vec()));
        Json(serde_json::json!({"id": "small", "name": "small.txt"})).into_response()
    }

    async fn session_put(State(mock): State<Shared>, headers: HeaderMap, body: Bytes) -> AxumResponse {
        let n = mock.chunk_puts.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = mock.fail_on.lock().unwrap().remove(&n) {
            return AxumStatus::from_u16(status).unwrap().into_response();
        }

        let range = headers
            .get(header::CONTENT_RANGE)
            .and_then(|h| h.to_str().ok())
            .unwrap_or("")
            .trim_start_matches("bytes ")
            .to_string();
        let (span, total) = range.split_once('/').unwrap();
        let total: usize = total.parse().unwrap();

        let mut received = mock.received.lock().unwrap();
        if span != "*" {
            let start: usize = span.split('-').next().unwrap().parse().unwrap();
            received.truncate(start);
            received.extend_from_slice(&body);
        }

        if received.len() == total {
            return Json(serde_json::json!({"id": "big", "name": "big.bin", "size": total.to_string()})).into_response();
        }
        let mut response = AxumStatus::PERMANENT_REDIRECT.into_response();
        if !received.is_empty() {
            let value = format!("bytes=0-{}", received.len() - 1);
            response.headers_mut().insert(header::RANGE, value.parse().unwrap());
        }
        response
    }

    async fn spawn_mock(fail_on: Vec<(usize, u16)>) -> (Shared, DriveClient) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let mock = Arc::new(MockDrive {
            base: base.clone(),
            fail_on: Mutex::new(fail_on.into_iter().collect()),
            ..Default::default()
        });

        let app = Router::new()
            .route("/token", post(token))
            .route("/drive/v3/files", get(list))
            .route("/drive/v3/files/:id", get(get_one))
            .route("/drive/v3/files/:id/export", get(export))
            .route("/upload/drive/v3/files", post(start_upload))
            .route("/session", put(session_put))
            .with_state(mock.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let mut config = DriveConfig::default();
        config.api = ApiConfig {
            base_url: format!("{}/drive/v3", base),
            upload_url: format!("{}/upload/drive/v3", base),
            token_url: format!("{}/token", base),
        };
        config.transfer.chunk_size = 256 * 1024;
        let credentials = Credentials {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            refresh_token: "refresh".to_string(),
        };
        (mock, DriveClient::new(&config, credentials).unwrap())
    }

    #[test]
    fn test_list_query_clauses() {
        let query = ListQuery {
            name_equals: Some("report.pdf".to_string()),
            mime_type: Some(mimetypes::PDF.to_string()),
            parents_in: Some("folder-1".to_string()),
            ..Default::default()
        };
        assert_eq!(
            build_query(&query.clauses()),
            "trashed = false and name = 'report.pdf' and mimeType = 'application/pdf' and 'folder-1' in parents"
        );
        assert_eq!(build_query(&ListQuery::default().clauses()), "trashed = false");
    }

    #[test]
    fn test_file_update_params() {
        let update = FileUpdate {
            name: None,
            add_parents: vec!["new".to_string()],
            remove_parents: vec!["old1".to_string(), "old2".to_string()],
        };
        assert!(!update.is_empty());
        assert_eq!(
            update.params(),
            vec![("addParents", "new".to_string()), ("removeParents", "old1,old2".to_string())]
        );
        assert!(FileUpdate::default().is_empty());
    }

    #[test]
    fn test_new_rejects_unaligned_chunk_size() {
        let mut config = DriveConfig::default();
        config.transfer.chunk_size = 100_000;
        let credentials = Credentials {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            refresh_token: "refresh".to_string(),
        };
        assert!(matches!(DriveClient::new(&config, credentials), Err(DriveError::Config(_))));
    }

    #[tokio::test]
    async fn test_list_files_pages_and_query() {
        let (mock, client) = spawn_mock(vec![]).await;
        let query = ListQuery {
            name_contains: Some("rep".to_string()),
            parents_in: Some("root".to_string()),
            ..Default::default()
        };

        let files = client.list_files(&query).await.unwrap();
        let ids: Vec<&str> = files.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(files[1].is_directory(), Some(true));

        let queries = mock.queries.lock().unwrap();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0], "trashed = false and name contains 'rep' and 'root' in parents");
        assert_eq!(mock.tokens_issued.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_limit_stops_paging() {
        let (mock, client) = spawn_mock(vec![]).await;
        let file = client.get_file_by_name("a.txt", None).await.unwrap();
        assert_eq!(file.id, "a");
        assert_eq!(mock.queries.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_get_file_refreshes_token_on_401() {
        let (mock, client) = spawn_mock(vec![]).await;
        let file = client.get_file("stale").await.unwrap();
        assert_eq!(file.id, "stale");
        assert_eq!(mock.tokens_issued.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let (_mock, client) = spawn_mock(vec![]).await;
        let err = client.get_file("missing").await.unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert!(err.to_string().contains("File not found: missing."));

        assert!(client.find_file("missing").await.unwrap().is_none());
        assert!(client.file_exists(FileLookup::Id("missing")).await.unwrap().is_none());
        assert!(client.file_exists(FileLookup::Id("present")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_download() {
        let (_mock, client) = spawn_mock(vec![]).await;

        let mut buf: Vec<u8> = Vec::new();
        let written = client.download("doc", &mut buf, None).await.unwrap();
        assert_eq!(written, 11);
        assert_eq!(buf, b"hello drive");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        client.download_file("doc", &path, None).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello drive");
    }

    #[tokio::test]
    async fn test_xlsx_helpers() {
        let (mock, client) = spawn_mock(vec![]).await;

        let bytes = client.export_xlsx("sheet-1").await.unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), format!("sheet-1 as {}", mimetypes::XLSX));

        client
            .upload_xlsx("root", "budget.xlsx", b"PK fake workbook".to_vec(), true, false)
            .await
            .unwrap();
        let bodies = mock.multipart_bodies.lock().unwrap();
        let body = String::from_utf8_lossy(&bodies[0].1);
        assert!(body.contains(&format!(r#""mimeType":"{}""#, mimetypes::GOOGLE_SHEETS)));
        assert!(body.contains(&format!("Content-Type: {}\r\n\r\nPK fake workbook", mimetypes::XLSX)));
    }

    #[tokio::test]
    async fn test_small_upload_is_single_request() {
        let (mock, client) = spawn_mock(vec![]).await;
        let data = b"just a few bytes".to_vec();
        let size = data.len() as u64;

        let file = client
            .upload("root", "small.txt", Cursor::new(data), size, &UploadOptions::default())
            .await
            .unwrap();

        assert_eq!(file.id, "small");
        assert_eq!(mock.chunk_puts.load(Ordering::SeqCst), 0);
        let bodies = mock.multipart_bodies.lock().unwrap();
        assert_eq!(bodies.len(), 1);
        assert!(bodies[0].0.starts_with("multipart/related; boundary="));
        assert!(bodies[0].1.len() > size as usize);
    }

    #[tokio::test]
    async fn test_resumable_upload_recovers_from_503() {
        // second chunk fails once; the retry probes the session and resends it
        let (mock, client) = spawn_mock(vec![(1, 503)]).await;
        let data: Vec<u8> = (0..600 * 1024).map(|i| (i % 251) as u8).collect();
        let size = data.len() as u64;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = seen.clone();
            move |fraction: f64| seen.lock().unwrap().push(fraction)
        };
        let options = UploadOptions::default().with_progress(Arc::new(sink));

        let file = client
            .upload("root", "big.bin", Cursor::new(data.clone()), size, &options)
            .await
            .unwrap();

        assert_eq!(file.id, "big");
        assert_eq!(file.size, Some(size));
        assert_eq!(*mock.received.lock().unwrap(), data);
        // 3 chunks, one failed attempt and one status probe
        assert_eq!(mock.chunk_puts.load(Ordering::SeqCst), 5);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.last(), Some(&1.0));
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_resumable_upload_client_error_is_final() {
        let (mock, client) = spawn_mock(vec![(0, 400)]).await;
        let data = vec![7u8; 300 * 1024];
        let size = data.len() as u64;

        let err = client
            .upload("root", "big.bin", Cursor::new(data), size, &UploadOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(400));
        assert_eq!(mock.chunk_puts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_limit_sends_nothing() {
        let (mock, client) = spawn_mock(vec![]).await;
        let query = ListQuery { limit: 0, ..Default::default() };
        assert!(client.list_files(&query).await.unwrap().is_empty());
        assert!(mock.queries.lock().unwrap().is_empty());
    }
}
