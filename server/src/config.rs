use medredact_core::{FillColor, RedactionSettings};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// 配置文件路径
pub const CONFIG_ENV: &str = "MEDREDACT_CONFIG";
pub const HOST_ENV: &str = "MEDREDACT_HOST";
pub const PORT_ENV: &str = "MEDREDACT_PORT";

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    // ============ 服务 ============
    pub host: String,
    pub port: u16,
    /// 上传文件大小上限（字节）
    pub max_upload_bytes: usize,
    /// 单个请求的处理超时
    pub processing_timeout_secs: u64,
    /// 未设置 RUST_LOG 时使用的日志过滤
    pub log_filter: String,

    // ============ 脱敏 ============
    pub fill: FillColor,
    pub redaction: RedactionSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_upload_bytes: 50 * 1024 * 1024,
            processing_timeout_secs: 120,
            log_filter: "info,tower_http=debug".to_string(),
            fill: FillColor::BLACK,
            redaction: RedactionSettings::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid port: {0}")]
    InvalidPort(String),
}

impl AppConfig {
    /// 读取配置：`MEDREDACT_CONFIG` 指向的 JSON 文件（没有则用默认值），再应用地址覆盖
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match env::var(CONFIG_ENV) {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };

        if let Ok(host) = env::var(HOST_ENV) {
            config.host = host;
        }
        if let Ok(port) = env::var(PORT_ENV) {
            config.port = port.parse().map_err(|_| ConfigError::InvalidPort(port))?;
        }
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn processing_timeout(&self) -> Duration {
        Duration::from_secs(self.processing_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.bind_addr(), "0.0.0.0:8000");
        assert_eq!(config.max_upload_bytes, 52_428_800);
        assert_eq!(config.processing_timeout(), Duration::from_secs(120));
        assert_eq!(config.fill, FillColor::BLACK);
        assert!(config.redaction.header_admin_exclusion);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: AppConfig = serde_json::from_str(
            r#"{"port": 9100, "redaction": {"detectionRange": 80, "headerAdminExclusion": false}}"#,
        )
        .unwrap();
        assert_eq!(config.port, 9100);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.redaction.detection_range, 80.0);
        assert_eq!(config.redaction.admin_context_window, 150.0);
        assert!(!config.redaction.header_admin_exclusion);
    }

    #[test]
    fn test_from_file() {
        let path = env::temp_dir().join(format!("medredact-config-{}.json", std::process::id()));
        fs::write(&path, r#"{"maxUploadBytes": 1024, "processingTimeoutSecs": 5}"#).unwrap();
        let config = AppConfig::from_file(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(config.max_upload_bytes, 1024);
        assert_eq!(config.processing_timeout(), Duration::from_secs(5));

        let missing = AppConfig::from_file(Path::new("/nonexistent/medredact.json"));
        assert!(matches!(missing, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_invalid_json_is_rejected() {
        let err = serde_json::from_str::<AppConfig>(r#"{"port": "not-a-port"}"#);
        assert!(err.is_err());
    }
}
