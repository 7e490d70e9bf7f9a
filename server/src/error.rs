//! 接口错误
//!
//! 校验错误在扫描之前返回 400/413；处理错误只返回通用信息，原因写入日志。

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use medredact_core::CoreError;
use medredact_pdf::PdfError;
use serde_json::json;
use tokio::task::JoinError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Only PDF files are supported")]
    NotPdf,
    #[error("Uploaded file is empty")]
    EmptyUpload,
    #[error("Missing multipart field 'file'")]
    MissingFile,
    #[error("File exceeds the upload size limit")]
    TooLarge,
    #[error("Invalid multipart body: {0}")]
    Multipart(String),
    #[error("处理失败: {0}")]
    Processing(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotPdf | ApiError::EmptyUpload | ApiError::MissingFile | ApiError::Multipart(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Processing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match &self {
            ApiError::Processing(cause) => {
                log::error!("[Server] 脱敏失败: {}", cause);
                "Redaction failed".to_string()
            }
            other => {
                log::warn!("[Server] 请求被拒绝: {}", other);
                other.to_string()
            }
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::TooLarge
        } else {
            ApiError::Multipart(err.body_text())
        }
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(err: MultipartRejection) -> Self {
        ApiError::Multipart(err.body_text())
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError::Processing(err.to_string())
    }
}

impl From<PdfError> for ApiError {
    fn from(err: PdfError) -> Self {
        CoreError::from(err).into()
    }
}

impl From<JoinError> for ApiError {
    fn from(err: JoinError) -> Self {
        ApiError::Processing(format!("后台任务异常: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::NotPdf.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::EmptyUpload.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::MissingFile.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::TooLarge.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(
            ApiError::Processing("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_parse_failure_maps_to_processing() {
        let err = ApiError::from(CoreError::DocumentParse("bad xref".into()));
        assert!(matches!(err, ApiError::Processing(ref cause) if cause.contains("bad xref")));
    }
}
