//! OAuth refresh_token 授权
//!
//! Reads an "authorized user" credentials file and exchanges its refresh
//! token for access tokens, caching the current one.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;

use super::types::{TokenError, TokenResponse};
use crate::error::{DriveError, Result};

/// 授权用户凭据
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// 客户端ID
    pub client_id: String,
    /// 客户端密钥
    pub client_secret: String,
    /// 刷新令牌
    pub refresh_token: String,
}

impl Credentials {
    /// 从JSON文件加载凭据
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DriveError::Config(format!("Failed to read credentials {:?}: {}", path, e))
        })?;
        let credentials: Credentials = serde_json::from_str(&content).map_err(|e| {
            DriveError::Config(format!("Failed to parse credentials {:?}: {}", path, e))
        })?;
        credentials.validate()?;
        Ok(credentials)
    }

    fn validate(&self) -> Result<()> {
        if self.client_id.is_empty() || self.client_secret.is_empty() {
            return Err(DriveError::Config("未配置client_id或client_secret".to_string()));
        }
        if self.refresh_token.is_empty() {
            return Err(DriveError::Config("未配置refresh_token".to_string()));
        }
        Ok(())
    }
}

/// Access token cache / 访问令牌缓存
pub struct TokenProvider {
    client: Client,
    token_url: String,
    credentials: Credentials,
    access_token: RwLock<Option<String>>,
}

impl TokenProvider {
    pub fn new(client: Client, token_url: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            client,
            token_url: token_url.into(),
            credentials,
            access_token: RwLock::new(None),
        }
    }

    /// 获取访问令牌
    pub async fn access_token(&self) -> Result<String> {
        {
            let token = self.access_token.read().await;
            if let Some(ref t) = *token {
                return Ok(t.clone());
            }
        }
        self.refresh().await
    }

    /// Drop the cached token so the next call refreshes it
    pub async fn invalidate(&self) {
        *self.access_token.write().await = None;
    }

    /// 刷新访问令牌
    pub async fn refresh(&self) -> Result<String> {
        let mut params = HashMap::new();
        params.insert("client_id", self.credentials.client_id.as_str());
        params.insert("client_secret", self.credentials.client_secret.as_str());
        params.insert("refresh_token", self.credentials.refresh_token.as_str());
        params.insert("grant_type", "refresh_token");

        let response = self.client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await?;

        if response.status().is_success() {
            let token_resp: TokenResponse = serde_json::from_str(&response.text().await?)?;
            *self.access_token.write().await = Some(token_resp.access_token.clone());
            tracing::debug!("access token refreshed");
            Ok(token_resp.access_token)
        } else {
            let status = response.status();
            let error: TokenError = response.json().await
                .unwrap_or_else(|_| TokenError {
                    error: "unknown".to_string(),
                    error_description: Some(format!("HTTP {}", status)),
                });
            Err(DriveError::Auth(format!(
                "Token刷新失败: {}",
                error.error_description.unwrap_or(error.error)
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(
            &path,
            r#"{"type":"authorized_user","client_id":"id","client_secret":"secret","refresh_token":"rt"}"#,
        )
        .unwrap();

        let credentials = Credentials::from_file(&path).unwrap();
        assert_eq!(credentials.client_id, "id");
        assert_eq!(credentials.refresh_token, "rt");
    }

    #[test]
    fn test_credentials_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert!(matches!(Credentials::from_file(&missing), Err(DriveError::Config(_))));

        let empty = dir.path().join("empty.json");
        std::fs::write(&empty, r#"{"client_id":"","client_secret":"s","refresh_token":"r"}"#).unwrap();
        assert!(matches!(Credentials::from_file(&empty), Err(DriveError::Config(_))));
    }
}
