//! Google Drive API types / Google Drive 接口类型

use serde::Deserialize;

use crate::error::DriveError;
use crate::files::File;

// ============ 常量 ============

/// Fields requested for every file resource
pub const FILE_FIELDS: &str = "id,name,mimeType,parents,size,modifiedTime,md5Checksum,webViewLink,trashed";

/// Maximum pageSize accepted by files.list
pub const MAX_PAGE_SIZE: usize = 1000;

pub fn files_list_fields() -> String {
    format!("nextPageToken,files({})", FILE_FIELDS)
}

// ============ API响应结构 ============

/// Token刷新响应
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[allow(dead_code)]
    pub expires_in: Option<u64>,
}

/// Token错误
#[derive(Debug, Deserialize)]
pub struct TokenError {
    pub error: String,
    pub error_description: Option<String>,
}

/// API错误
#[derive(Debug, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorDetail {
    #[allow(dead_code)]
    pub code: Option<i32>,
    pub message: String,
}

/// 文件列表响应
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesResponse {
    pub next_page_token: Option<String>,
    #[serde(default)]
    pub files: Vec<File>,
}

/// files.get with `fields=parents`
#[derive(Debug, Deserialize)]
pub struct ParentsResponse {
    #[serde(default)]
    pub parents: Vec<String>,
}

/// Turn an error response body into a `Server` error / 解析错误响应
pub fn server_error(status: u16, body: &str) -> DriveError {
    let message = serde_json::from_str::<ApiError>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.chars().take(200).collect());
    DriveError::Server { status, message }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_message() {
        let body = r#"{"error":{"code":404,"message":"File not found: abc.","errors":[]}}"#;
        match server_error(404, body) {
            DriveError::Server { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "File not found: abc.");
            }
            other => panic!("unexpected error: {:?}", other),
        }

        match server_error(502, "<html>Bad Gateway</html>") {
            DriveError::Server { message, .. } => assert_eq!(message, "<html>Bad Gateway</html>"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_files_response() {
        let body = r#"{"nextPageToken":"p2","files":[{"id":"a","name":"x.txt"},{"id":"b","name":"y"}]}"#;
        let resp: FilesResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.next_page_token.as_deref(), Some("p2"));
        assert_eq!(resp.files.len(), 2);
        assert_eq!(resp.files[1].id, "b");
    }
}
