//! Google Drive v3 客户端
//!
//! 支持 OAuth refresh_token 授权方式
//! 支持分片可恢复上传，失败后查询已提交偏移并重传
//! 支持搜索、下载、导出、重命名、移动、删除、创建文件夹等

mod auth;
mod client;
mod types;
mod upload;

pub use auth::{Credentials, TokenProvider};
pub use client::{DriveClient, FileLookup, FileUpdate, ListQuery, DEFAULT_LIST_LIMIT};
pub use types::{FILE_FIELDS, MAX_PAGE_SIZE};
pub use upload::{multipart_related_body, ResumableUpload, UploadOptions, UploadTarget};
