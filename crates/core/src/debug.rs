//! 调试报告：前几页文本块的识别结果

use crate::classify::Classifier;
use crate::document::DocumentSnapshot;
use crate::preview;
use crate::sensitive::SensitiveScanner;
use serde::Serialize;
use std::fmt;

const DEBUG_PAGES: usize = 3;
const DEBUG_BLOCKS_PER_PAGE: usize = 25;

/// 单个文本块的识别结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugLine {
    pub page: usize,
    /// 页内序号
    pub index: usize,
    pub y: f32,
    pub text: String,
    pub section: Option<String>,
    pub stop_boundary: bool,
    pub admin_context: bool,
    pub sensitive_patterns: usize,
}

impl fmt::Display for DebugLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:2}: y={:.1} '{}'", self.index, self.y, self.text)?;
        if let Some(section) = &self.section {
            write!(f, " [REDACT SECTION: {}]", section)?;
        }
        if self.stop_boundary {
            write!(f, " [STOP BOUNDARY]")?;
        }
        if self.admin_context {
            write!(f, " [ADMIN CONTEXT]")?;
        }
        if self.sensitive_patterns > 0 {
            write!(f, " [SENSITIVE CONTENT: {} patterns]", self.sensitive_patterns)?;
        }
        Ok(())
    }
}

pub fn debug_report(classifier: Classifier<'_>, snapshot: &DocumentSnapshot) -> Vec<DebugLine> {
    let sensitive = SensitiveScanner::new(classifier);
    let mut lines = Vec::new();

    for page in snapshot.pages().iter().take(DEBUG_PAGES) {
        for (index, block) in page.blocks.iter().take(DEBUG_BLOCKS_PER_PAGE).enumerate() {
            let text = block.trimmed();
            if text.chars().count() <= 2 {
                continue;
            }
            lines.push(DebugLine {
                page: page.index,
                index,
                y: block.top(),
                text: text.to_string(),
                section: classifier.section_header(page, block),
                stop_boundary: classifier.is_stop_boundary(block),
                admin_context: classifier.in_administrative_context(page, block.top()),
                sensitive_patterns: sensitive.labels_for(text).len(),
            });
        }
    }
    lines
}

/// 按页写入日志（文本与其他日志一样打码）
pub fn log_report(lines: &[DebugLine]) {
    let mut current_page = None;
    for line in lines {
        if current_page != Some(line.page) {
            current_page = Some(line.page);
            log::info!("[Debug] === 第 {} 页 ===", line.page + 1);
        }
        let masked = DebugLine {
            text: preview(&line.text),
            ..line.clone()
        };
        log::info!("[Debug] {}", masked);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{PageBlocks, PageSize, Rect, TextBlock};
    use crate::RedactionSettings;
    use medredact_rules::PatternRegistry;

    fn block(page: usize, text: &str, y0: f32) -> TextBlock {
        TextBlock::new(page, text, Rect::new(72.0, y0, 400.0, y0 + 12.0), 12.0)
    }

    #[test]
    fn test_report_tags_and_limits() {
        let registry = PatternRegistry::builtin().unwrap();
        let settings = RedactionSettings::default();
        let size = PageSize { width: 612.0, height: 792.0 };
        let mut pages: Vec<PageBlocks> = (0..4)
            .map(|i| PageBlocks::new(i, size, vec![block(i, "Plain text line", 10.0)]))
            .collect();
        pages[0] = PageBlocks::new(
            0,
            size,
            vec![
                block(0, "Billing", 50.0),
                block(0, "ok", 60.0),
                block(0, "Social History", 100.0),
                block(0, "Allergies", 400.0),
                block(0, "History of depression", 420.0),
            ],
        );
        let snapshot = DocumentSnapshot::from_pages(pages);
        let lines = debug_report(Classifier::new(&registry, &settings), &snapshot);

        // "ok" 被跳过，第 4 页不在报告内
        assert_eq!(lines.len(), 4 + 2);
        assert!(lines.iter().all(|l| l.page < 3));

        let social = &lines[1];
        assert_eq!(social.section, None);
        assert!(social.admin_context);
        assert_eq!(social.index, 2);

        assert_eq!(lines[2].to_string(), " 3: y=400.0 'Allergies' [STOP BOUNDARY]");
        assert_eq!(
            lines[3].to_string(),
            " 4: y=420.0 'History of depression' [SENSITIVE CONTENT: 1 patterns]"
        );
    }
}
