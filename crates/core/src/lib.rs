//! 脱敏核心流程
//!
//! 章节边界扫描、目标章节范围扩展、敏感内容扫描与遮盖几何计算。
//! 只依赖 `Document` / `RedactionSink` 两个接口，与具体文件格式无关。

pub mod cancel;
pub mod classify;
pub mod debug;
pub mod document;
pub mod extender;
pub mod geometry;
pub mod scanner;
pub mod sensitive;

pub use cancel::Cancellation;
pub use classify::{BlockClass, Classifier};
pub use debug::DebugLine;
pub use document::{
    DocumentSnapshot, Document, FillColor, PageBlocks, PageSize, RedactionSink, Rect, TextBlock,
};
pub use geometry::{GeometryResolver, RedactionRectangle};
pub use scanner::{SectionScanner, SectionSpan};
pub use sensitive::{SensitiveMatch, SensitiveScanner};

use medredact_rules::PatternRegistry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("文档解析失败: {0}")]
    DocumentParse(String),
    #[error("页码越界: {page} (共 {count} 页)")]
    PageOutOfRange { page: usize, count: usize },
    #[error("扫描内部错误: {0}")]
    InternalScan(String),
    #[error("遮盖写入失败: {0}")]
    Apply(String),
    #[error("处理已中止")]
    Cancelled,
}

/// 扫描与遮盖参数（单位：pt）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RedactionSettings {
    /// 目标章节关闭后向下探测的距离
    pub detection_range: f32,
    /// 行政上下文回看窗口
    pub admin_context_window: f32,
    pub stop_boundary_max_len: usize,
    pub stop_boundary_min_font_size: f32,
    /// 扩展时在操作内容底部以下继续检查终止边界的距离
    pub extension_guard: f32,
    /// 扩展后的额外留白
    pub extension_padding: f32,
    pub min_sensitive_len: usize,
    pub min_header_len: usize,
    pub padding_x: f32,
    pub padding_y: f32,
    /// 行政信息区域内的标题不作为脱敏章节
    pub header_admin_exclusion: bool,
}

impl Default for RedactionSettings {
    fn default() -> Self {
        Self {
            detection_range: 100.0,
            admin_context_window: 150.0,
            stop_boundary_max_len: 100,
            stop_boundary_min_font_size: 10.0,
            extension_guard: 10.0,
            extension_padding: 5.0,
            min_sensitive_len: 3,
            min_header_len: 4,
            padding_x: 1.0,
            padding_y: 0.5,
            header_admin_exclusion: true,
        }
    }
}

/// 一次扫描得到的全部遮盖内容
#[derive(Debug, Clone, Default)]
pub struct RedactionPlan {
    pub sections: Vec<SectionSpan>,
    pub sensitive: Vec<SensitiveMatch>,
    pub rectangles: Vec<RedactionRectangle>,
}

impl RedactionPlan {
    pub fn summary(&self) -> RedactionSummary {
        RedactionSummary {
            sections: self.sections.len(),
            sensitive_blocks: self.sensitive.len(),
            rectangles: self.rectangles.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RedactionSummary {
    pub sections: usize,
    pub sensitive_blocks: usize,
    pub rectangles: usize,
}

/// 脱敏流程入口
#[derive(Debug, Clone)]
pub struct Redactor {
    registry: Arc<PatternRegistry>,
    settings: RedactionSettings,
    cancel: Cancellation,
}

impl Redactor {
    pub fn new(registry: Arc<PatternRegistry>, settings: RedactionSettings) -> Self {
        Self {
            registry,
            settings,
            cancel: Cancellation::new(),
        }
    }

    /// 使用给定的中止标志（扫描与写入逐页检查）
    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn registry(&self) -> &PatternRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &RedactionSettings {
        &self.settings
    }

    fn classifier(&self) -> Classifier<'_> {
        Classifier::new(&self.registry, &self.settings)
    }

    /// 章节边界扫描（必须按文档顺序串行）
    pub fn scan_sections(&self, snapshot: &DocumentSnapshot) -> Result<Vec<SectionSpan>> {
        SectionScanner::new(self.classifier()).scan(snapshot, &self.cancel)
    }

    /// 敏感内容扫描
    pub fn scan_sensitive(&self, snapshot: &DocumentSnapshot) -> Result<Vec<SensitiveMatch>> {
        SensitiveScanner::new(self.classifier()).scan(snapshot, &self.cancel)
    }

    /// 把章节与敏感匹配转换成遮盖矩形
    pub fn resolve(
        &self,
        snapshot: &DocumentSnapshot,
        sections: Vec<SectionSpan>,
        sensitive: Vec<SensitiveMatch>,
    ) -> Result<RedactionPlan> {
        let rectangles = GeometryResolver::new(&self.settings).resolve(snapshot, &sections, &sensitive)?;
        Ok(RedactionPlan {
            sections,
            sensitive,
            rectangles,
        })
    }

    pub fn plan(&self, snapshot: &DocumentSnapshot) -> Result<RedactionPlan> {
        let sections = self.scan_sections(snapshot)?;
        let sensitive = self.scan_sensitive(snapshot)?;
        self.resolve(snapshot, sections, sensitive)
    }

    /// 写入遮盖：逐页登记全部矩形后提交一次，页码升序
    pub fn apply<S: RedactionSink + ?Sized>(
        &self,
        plan: &RedactionPlan,
        sink: &mut S,
        fill: FillColor,
    ) -> Result<()> {
        let mut by_page: BTreeMap<usize, Vec<Rect>> = BTreeMap::new();
        for rectangle in &plan.rectangles {
            by_page.entry(rectangle.page).or_default().push(rectangle.rect);
        }

        for (page, rects) in by_page {
            self.cancel.check()?;
            for rect in rects {
                sink.add_redaction(page, rect, fill)?;
            }
            sink.commit(page)?;
            log::debug!("[Redactor] 第 {} 页遮盖已提交", page + 1);
        }
        Ok(())
    }

    /// 读取、扫描并写入同一个文档
    pub fn redact<D: Document + RedactionSink>(&self, document: &mut D, fill: FillColor) -> Result<RedactionSummary> {
        let snapshot = DocumentSnapshot::capture(document)?;
        let plan = self.plan(&snapshot)?;
        self.apply(&plan, document, fill)?;

        let summary = plan.summary();
        log::info!(
            "[Redactor] 完成: 章节 {}, 敏感文本块 {}, 遮盖矩形 {}",
            summary.sections,
            summary.sensitive_blocks,
            summary.rectangles
        );
        Ok(summary)
    }

    /// 调试报告（不影响遮盖结果）
    pub fn debug_report(&self, snapshot: &DocumentSnapshot) -> Vec<DebugLine> {
        debug::debug_report(self.classifier(), snapshot)
    }
}

/// 日志中的文本：默认打码，设置 `MEDREDACT_LOG_FULL_TEXT` 后输出开头部分
pub(crate) fn preview(text: &str) -> String {
    snippet(text, should_log_full_text())
}

fn snippet(text: &str, full: bool) -> String {
    const LIMIT: usize = 50;
    let text = text.trim();
    if !full {
        return mask_snippet(text);
    }
    if text.chars().count() <= LIMIT {
        return text.to_string();
    }
    let mut out: String = text.chars().take(LIMIT).collect();
    out.push_str("...");
    out
}

fn mask_snippet(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();

    if len <= 4 {
        "*".repeat(len)
    } else {
        let visible = 4.min(len / 3);
        let prefix: String = chars[..visible].iter().collect();
        let suffix: String = chars[len - visible..].iter().collect();
        format!("{}****{}", prefix, suffix)
    }
}

fn should_log_full_text() -> bool {
    match std::env::var("MEDREDACT_LOG_FULL_TEXT") {
        Ok(val) => {
            let val = val.to_ascii_lowercase();
            val == "1" || val == "true" || val == "yes"
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct MemoryDocument {
        pages: Vec<Vec<TextBlock>>,
        queued: Vec<(usize, Rect)>,
        committed: Vec<(usize, Vec<Rect>)>,
    }

    impl MemoryDocument {
        fn line(&mut self, page: usize, text: &str, y0: f32) {
            while self.pages.len() <= page {
                self.pages.push(Vec::new());
            }
            self.pages[page].push(TextBlock::new(page, text, Rect::new(72.0, y0, 400.0, y0 + 12.0), 12.0));
        }
    }

    impl Document for MemoryDocument {
        fn page_count(&self) -> usize {
            self.pages.len()
        }

        fn page_size(&self, page: usize) -> Result<PageSize> {
            if page >= self.pages.len() {
                return Err(CoreError::PageOutOfRange {
                    page,
                    count: self.pages.len(),
                });
            }
            Ok(PageSize { width: 612.0, height: 792.0 })
        }

        fn get_blocks(&self, page: usize) -> Result<Vec<TextBlock>> {
            Ok(self.pages[page].clone())
        }
    }

    impl RedactionSink for MemoryDocument {
        fn add_redaction(&mut self, page: usize, rect: Rect, _fill: FillColor) -> Result<()> {
            self.queued.push((page, rect));
            Ok(())
        }

        fn commit(&mut self, page: usize) -> Result<()> {
            let (mine, rest): (Vec<_>, Vec<_>) = self.queued.drain(..).partition(|(p, _)| *p == page);
            self.queued = rest;
            self.committed.push((page, mine.into_iter().map(|(_, r)| r).collect()));
            Ok(())
        }
    }

    fn redactor() -> Redactor {
        Redactor::new(
            Arc::new(PatternRegistry::builtin().unwrap()),
            RedactionSettings::default(),
        )
    }

    #[test]
    fn test_settings_deserialize_with_defaults() {
        let settings: RedactionSettings =
            serde_json::from_str(r#"{"detectionRange": 75, "headerAdminExclusion": false}"#).unwrap();
        assert_eq!(settings.detection_range, 75.0);
        assert!(!settings.header_admin_exclusion);
        assert_eq!(settings.admin_context_window, 150.0);
        assert_eq!(settings.min_header_len, 4);
    }

    #[test]
    fn test_redact_commits_each_page_once_in_order() {
        let mut doc = MemoryDocument::default();
        doc.line(0, "Past Medical History", 100.0);
        doc.line(0, "Hypertension", 120.0);
        doc.line(1, "Ongoing follow-up", 80.0);
        doc.line(1, "Allergies", 200.0);
        doc.line(2, "Reports anxiety at night", 300.0);

        let summary = redactor().redact(&mut doc, FillColor::BLACK).unwrap();
        assert_eq!(summary.sections, 1);
        assert_eq!(summary.sensitive_blocks, 1);
        assert_eq!(summary.rectangles, 3);

        let pages: Vec<usize> = doc.committed.iter().map(|(p, _)| *p).collect();
        assert_eq!(pages, vec![0, 1, 2]);
        assert!(doc.queued.is_empty());
        assert_eq!(doc.committed[0].1, vec![Rect::new(0.0, 100.0, 612.0, 792.0)]);
        assert_eq!(doc.committed[1].1, vec![Rect::new(0.0, 0.0, 612.0, 200.0)]);
    }

    #[test]
    fn test_plan_without_findings_is_empty() {
        let mut doc = MemoryDocument::default();
        doc.line(0, "Chief Complaint", 100.0);
        doc.line(0, "Left knee pain", 120.0);
        let snapshot = DocumentSnapshot::capture(&doc).unwrap();
        let plan = redactor().plan(&snapshot).unwrap();
        assert_eq!(plan.summary(), RedactionSummary { sections: 0, sensitive_blocks: 0, rectangles: 0 });
    }

    #[test]
    fn test_snippet_masks_by_default() {
        assert_eq!(snippet("Patient has HIV", false), "Pati**** HIV");
        assert_eq!(snippet("  HIV  ", false), "***");
        assert!(!snippet("Reports anxiety at night", false).contains("anxiety"));
    }

    #[test]
    fn test_snippet_full_text_truncates() {
        assert_eq!(snippet("  short  ", true), "short");
        let long = "x".repeat(80);
        assert_eq!(snippet(&long, true).chars().count(), 53);
    }

    #[test]
    fn test_cancelled_redactor_commits_nothing() {
        let mut doc = MemoryDocument::default();
        doc.line(0, "Past Medical History", 100.0);
        doc.line(0, "Hypertension", 120.0);

        let cancel = Cancellation::new();
        cancel.cancel();
        let result = redactor().with_cancellation(cancel).redact(&mut doc, FillColor::BLACK);
        assert!(matches!(result, Err(CoreError::Cancelled)));
        assert!(doc.committed.is_empty());
    }
}
