//! Client configuration module / 客户端配置模块
//!
//! Loaded from drive.json (or the path in `DRIVE_CONFIG`).
//! Creates a default config file on first run / 首次运行时创建默认配置文件

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{DriveError, Result};
use crate::transfer::{RetryPolicy, CHUNK_ALIGNMENT, CHUNK_SIZE, NUM_RETRIES};

/// Environment variable overriding the config file path / 配置文件路径环境变量
pub const CONFIG_ENV: &str = "DRIVE_CONFIG";
/// Environment variable overriding the credentials file path / 凭据文件路径环境变量
pub const CREDENTIALS_ENV: &str = "DRIVE_CREDENTIALS";

/// Client configuration / 客户端配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DriveConfig {
    /// Credentials configuration / 凭据配置
    #[serde(default)]
    pub credentials: CredentialsConfig,
    /// API endpoints / 接口地址
    #[serde(default)]
    pub api: ApiConfig,
    /// Transfer configuration / 传输配置
    #[serde(default)]
    pub transfer: TransferConfig,
    /// Also operate on shared drives / 支持共享云端硬盘
    #[serde(default)]
    pub supports_all_drives: bool,
}

/// Credentials configuration / 凭据配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CredentialsConfig {
    /// Authorized-user JSON file (client_id, client_secret, refresh_token) / 授权用户JSON文件
    pub path: String,
}

/// API endpoints / 接口地址
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    pub base_url: String,
    pub upload_url: String,
    pub token_url: String,
}

/// Transfer configuration / 传输配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransferConfig {
    /// Bytes per resumable chunk / 分片大小(字节)
    pub chunk_size: usize,
    /// Consecutive failed chunks tolerated / 最大连续重试次数
    pub max_retries: u32,
    /// Floor for the randomized backoff (ms), 0 = none / 最小退避时间
    pub min_backoff_ms: u64,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            credentials: CredentialsConfig::default(),
            api: ApiConfig::default(),
            transfer: TransferConfig::default(),
            supports_all_drives: false,
        }
    }
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            path: "credentials.json".to_string(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.googleapis.com/drive/v3".to_string(),
            upload_url: "https://www.googleapis.com/upload/drive/v3".to_string(),
            token_url: "https://www.googleapis.com/oauth2/v4/token".to_string(),
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            max_retries: NUM_RETRIES,
            min_backoff_ms: 0,
        }
    }
}

impl TransferConfig {
    /// 校验分片大小
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.chunk_size % CHUNK_ALIGNMENT != 0 {
            return Err(DriveError::Config(format!(
                "transfer.chunk_size must be a positive multiple of {} bytes, got {}",
                CHUNK_ALIGNMENT, self.chunk_size
            )));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            min_delay: Duration::from_millis(self.min_backoff_ms),
        }
    }
}

impl DriveConfig {
    /// Credentials path, `DRIVE_CREDENTIALS` wins over the file / 获取凭据路径
    pub fn get_credentials_path(&self) -> PathBuf {
        std::env::var(CREDENTIALS_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(&self.credentials.path))
    }
}

/// Get the config file path / 获取配置文件路径
fn get_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return PathBuf::from(path);
    }
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("drive.json")
}

/// Load configuration from file, or create default if not exists / 加载配置文件，不存在则创建默认配置
pub fn load_config(path: Option<&Path>) -> Result<DriveConfig> {
    let config_path = path.map(Path::to_path_buf).unwrap_or_else(get_config_path);

    if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| DriveError::Config(format!("Failed to read config file: {}", e)))?;

        let config: DriveConfig = serde_json::from_str(&content)
            .map_err(|e| DriveError::Config(format!("Failed to parse config file: {}", e)))?;
        config.transfer.validate()?;

        tracing::info!("Loaded configuration from {:?}", config_path);
        Ok(config)
    } else {
        let config = DriveConfig::default();
        save_config(&config, &config_path)?;
        tracing::info!("Created default configuration at {:?}", config_path);
        Ok(config)
    }
}

/// Save configuration to file / 保存配置到文件
pub fn save_config(config: &DriveConfig, path: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(config)
        .map_err(|e| DriveError::Config(format!("Failed to serialize config: {}", e)))?;

    std::fs::write(path, content)
        .map_err(|e| DriveError::Config(format!("Failed to write config file: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creates_default_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drive.json");

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config, DriveConfig::default());
        assert!(path.exists());

        // second load reads the file back
        assert_eq!(load_config(Some(&path)).unwrap(), config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drive.json");
        std::fs::write(
            &path,
            r#"{"supports_all_drives": true, "transfer": {"chunk_size": 262144, "max_retries": 3, "min_backoff_ms": 250}}"#,
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert!(config.supports_all_drives);
        assert_eq!(config.api, ApiConfig::default());
        assert_eq!(config.credentials.path, "credentials.json");

        let policy = config.transfer.retry_policy();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.min_delay, Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drive.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(load_config(Some(&path)), Err(DriveError::Config(_))));
    }

    #[test]
    fn test_rejects_bad_chunk_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drive.json");

        for chunk_size in [0, 1000, 256 * 1024 + 1] {
            std::fs::write(&path, format!(r#"{{"transfer": {{"chunk_size": {}, "max_retries": 5, "min_backoff_ms": 0}}}}"#, chunk_size)).unwrap();
            assert!(matches!(load_config(Some(&path)), Err(DriveError::Config(_))), "chunk_size {}", chunk_size);
        }

        let ok = TransferConfig { chunk_size: 512 * 1024, ..Default::default() };
        assert!(ok.validate().is_ok());
        assert!(TransferConfig::default().validate().is_ok());
    }
}
