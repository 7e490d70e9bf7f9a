//! HTTP 接口

use crate::error::ApiError;
use crate::{AppState, SERVICE_NAME};
use axum::body::Bytes;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use medredact_core::debug::log_report;
use medredact_core::{Cancellation, DocumentSnapshot, FillColor, Redactor};
use medredact_pdf::PdfDocument;
use medredact_rules::SensitiveRuleInfo;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// 首页展示的目标章节数量
const ROOT_SECTION_PREVIEW: usize = 5;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    service: String,
    version: String,
}

#[derive(Serialize)]
pub struct SectionsResponse {
    count: usize,
    sections: Vec<String>,
    major_section_headers: Vec<String>,
}

#[derive(Serialize)]
pub struct SensitivePatternsResponse {
    count: usize,
    patterns: Vec<SensitiveRuleInfo>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RedactParams {
    #[serde(default)]
    debug: bool,
}

pub async fn root(State(state): State<AppState>) -> Json<Value> {
    let registry = state.registry();
    let preview: Vec<&String> = registry.target_sections().iter().take(ROOT_SECTION_PREVIEW).collect();
    Json(json!({
        "message": "PDF Section Redactor API",
        "version": registry.version(),
        "status": "online",
        "endpoints": {
            "redact": "/redact-pdf",
            "redact-debug": "/redact-pdf?debug=true",
            "sections": "/sections",
            "sensitive-patterns": "/sensitive-patterns",
            "health": "/health",
        },
        "approach": "Section detection + Sensitive content pattern matching",
        "target_sections": preview,
        "sensitive_patterns_count": registry.sensitive_rules().len(),
    }))
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            service: SERVICE_NAME.to_string(),
            version: state.registry().version().to_string(),
        }),
    )
}

pub async fn sections(State(state): State<AppState>) -> Json<SectionsResponse> {
    let registry = state.registry();
    Json(SectionsResponse {
        count: registry.target_sections().len(),
        sections: registry.target_sections().to_vec(),
        major_section_headers: registry.stop_boundary_keywords().to_vec(),
    })
}

pub async fn sensitive_patterns(State(state): State<AppState>) -> Json<SensitivePatternsResponse> {
    let patterns = state.registry().sensitive_rules();
    Json(SensitivePatternsResponse {
        count: patterns.len(),
        patterns,
    })
}

/// 上传的文件
struct Upload {
    filename: String,
    bytes: Bytes,
}

fn is_pdf(filename: &str, content_type: Option<&str>) -> bool {
    content_type == Some("application/pdf") || filename.to_ascii_lowercase().ends_with(".pdf")
}

/// 读取 `file` 字段，在任何扫描之前完成校验
async fn read_upload(multipart: &mut Multipart, max_bytes: usize) -> Result<Upload, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or("document.pdf").to_string();
        if !is_pdf(&filename, field.content_type()) {
            return Err(ApiError::NotPdf);
        }

        let bytes = field.bytes().await?;
        if bytes.is_empty() {
            return Err(ApiError::EmptyUpload);
        }
        if bytes.len() > max_bytes {
            return Err(ApiError::TooLarge);
        }
        return Ok(Upload { filename, bytes });
    }
    Err(ApiError::MissingFile)
}

/// 响应头里的文件名只保留可见 ASCII
fn attachment_name(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_graphic() && c != '"' && c != ';' { c } else { '_' })
        .collect();
    format!("redacted_{}", cleaned)
}

pub async fn redact_pdf(
    State(state): State<AppState>,
    Query(params): Query<RedactParams>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let mut multipart = multipart?;
    let upload = read_upload(&mut multipart, state.config.max_upload_bytes).await?;
    log::info!(
        "[Server] 收到文件: {} ({} 字节, debug={})",
        upload.filename,
        upload.bytes.len(),
        params.debug
    );

    // 超时后后台任务在下一页检查时停止
    let timeout = state.config.processing_timeout();
    let cancel = Cancellation::with_deadline(timeout);
    let redactor = state.redactor.clone().with_cancellation(cancel.clone());
    let fill = state.config.fill;
    let output = tokio::time::timeout(timeout, process(redactor, upload.bytes, fill, params.debug))
        .await
        .map_err(|_| {
            cancel.cancel();
            ApiError::Processing(format!("处理超时 ({} 秒)", state.config.processing_timeout_secs))
        })??;

    let disposition = format!("attachment; filename={}", attachment_name(&upload.filename));
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        output,
    )
        .into_response())
}

/// 解析、扫描、写入遮盖并序列化
///
/// 两个扫描在阻塞线程上并行，共享同一份只读快照；写入在文档所有者线程上串行进行。
async fn process(redactor: Redactor, bytes: Bytes, fill: FillColor, debug: bool) -> Result<Vec<u8>, ApiError> {
    let (mut document, snapshot) = {
        let redactor = redactor.clone();
        tokio::task::spawn_blocking(move || -> Result<_, ApiError> {
            let document = PdfDocument::load_mem(&bytes)?;
            let snapshot = DocumentSnapshot::capture(&document)?;
            if debug {
                log_report(&redactor.debug_report(&snapshot));
            }
            Ok((document, Arc::new(snapshot)))
        })
        .await??
    };

    let sections_task = {
        let redactor = redactor.clone();
        let snapshot = Arc::clone(&snapshot);
        tokio::task::spawn_blocking(move || redactor.scan_sections(&snapshot))
    };
    let sensitive_task = {
        let redactor = redactor.clone();
        let snapshot = Arc::clone(&snapshot);
        tokio::task::spawn_blocking(move || redactor.scan_sensitive(&snapshot))
    };
    let (sections, sensitive) = tokio::join!(sections_task, sensitive_task);
    let (sections, sensitive) = (sections??, sensitive??);

    tokio::task::spawn_blocking(move || -> Result<Vec<u8>, ApiError> {
        let plan = redactor.resolve(&snapshot, sections, sensitive)?;
        redactor.apply(&plan, &mut document, fill)?;
        let summary = plan.summary();
        log::info!(
            "[Server] 脱敏完成: 章节 {}, 敏感文本块 {}, 遮盖矩形 {}",
            summary.sections,
            summary.sensitive_blocks,
            summary.rectangles
        );
        Ok(document.to_bytes()?)
    })
    .await?
}
