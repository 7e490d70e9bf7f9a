//! 文本块分类
//!
//! 每个文本块按固定优先级归入一种类型：医生记录 > 章节标题 > 终止边界 > 正文。
//! 扫描器只根据分类结果分派，优先级集中在这里便于审查和单独测试。

use crate::document::{PageBlocks, TextBlock};
use crate::{preview, RedactionSettings};
use medredact_rules::{Category, PatternRegistry};

/// 文本块分类结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockClass {
    /// 医生记录标题，必须保留，并立即结束当前章节
    ProviderNoteOverride,
    /// 需要脱敏的章节标题（标签）
    SectionHeader(String),
    /// 已知的非敏感章节标题
    StopBoundary,
    Body,
}

#[derive(Debug, Clone, Copy)]
pub struct Classifier<'a> {
    registry: &'a PatternRegistry,
    settings: &'a RedactionSettings,
}

impl<'a> Classifier<'a> {
    pub fn new(registry: &'a PatternRegistry, settings: &'a RedactionSettings) -> Self {
        Self { registry, settings }
    }

    pub fn registry(&self) -> &'a PatternRegistry {
        self.registry
    }

    pub fn settings(&self) -> &'a RedactionSettings {
        self.settings
    }

    pub fn classify(&self, page: &PageBlocks, block: &TextBlock) -> BlockClass {
        if self.is_provider_note(&block.text) {
            return BlockClass::ProviderNoteOverride;
        }
        if let Some(label) = self.section_header(page, block) {
            return BlockClass::SectionHeader(label);
        }
        if self.is_stop_boundary(block) {
            return BlockClass::StopBoundary;
        }
        BlockClass::Body
    }

    pub fn is_provider_note(&self, text: &str) -> bool {
        let text = text.trim();
        !text.is_empty() && self.registry.matches(Category::ProviderNoteOverride, text)
    }

    /// 章节标题识别，返回章节标签
    pub fn section_header(&self, page: &PageBlocks, block: &TextBlock) -> Option<String> {
        let text = block.trimmed();
        if text.chars().count() < self.settings.min_header_len {
            return None;
        }

        if self.is_provider_note(text) {
            log::debug!("[Classify] 医生记录不作为脱敏章节: '{}'", preview(text));
            return None;
        }

        if self.settings.header_admin_exclusion && self.in_administrative_context(page, block.top()) {
            log::info!("[Classify] 行政信息区域内的标题，跳过: '{}'", preview(text));
            return None;
        }

        self.registry
            .first_match(Category::SectionHeader, text)
            .map(|rule| rule.label.clone())
    }

    /// 终止边界识别（医生记录同样视为终止边界）
    ///
    /// 关键词命中后还需满足：长度 < 100，不以句号结尾，且全大写、标题格式或字号 ≥ 10，
    /// 以排除恰好以关键词开头的正文句子。
    pub fn is_stop_boundary(&self, block: &TextBlock) -> bool {
        if self.is_provider_note(&block.text) {
            return true;
        }

        let text = block.trimmed();
        if !self.registry.matches(Category::StopBoundary, text) {
            return false;
        }

        let qualifies = text.chars().count() < self.settings.stop_boundary_max_len
            && !text.ends_with('.')
            && (is_upper(text)
                || is_title_case(text)
                || block.font_size >= self.settings.stop_boundary_min_font_size);

        if qualifies {
            log::debug!("[Classify] 终止边界: '{}'", preview(text));
        }
        qualifies
    }

    /// 操作性内容（用药说明、伤口护理等）
    pub fn is_procedural(&self, text: &str) -> bool {
        self.registry.matches(Category::ProceduralContent, text)
    }

    /// `y` 上方窗口内是否出现行政类标题
    pub fn in_administrative_context(&self, page: &PageBlocks, y: f32) -> bool {
        let window = self.settings.admin_context_window;
        match page
            .blocks_in_band(y - window, y)
            .iter()
            .find(|b| self.registry.is_administrative(&b.text))
        {
            Some(context) => {
                log::debug!(
                    "[Classify] 行政上下文 '{}' 位于 y={:.1} 上方",
                    preview(&context.text),
                    y
                );
                true
            }
            None => false,
        }
    }
}

/// 至少有一个有大小写的字符，且没有小写字符
pub fn is_upper(text: &str) -> bool {
    let mut cased = false;
    for c in text.chars() {
        if c.is_lowercase() {
            return false;
        }
        if c.is_uppercase() {
            cased = true;
        }
    }
    cased
}

/// 标题格式：大写字母只跟在无大小写字符之后，小写字母只跟在有大小写字符之后
pub fn is_title_case(text: &str) -> bool {
    let mut cased = false;
    let mut previous_cased = false;
    for c in text.chars() {
        if c.is_uppercase() {
            if previous_cased {
                return false;
            }
            previous_cased = true;
            cased = true;
        } else if c.is_lowercase() {
            if !previous_cased {
                return false;
            }
            previous_cased = true;
            cased = true;
        } else {
            previous_cased = false;
        }
    }
    cased
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{PageSize, Rect};

    fn block(text: &str, y0: f32, size: f32) -> TextBlock {
        TextBlock::new(0, text, Rect::new(72.0, y0, 300.0, y0 + size), size)
    }

    fn page(blocks: Vec<TextBlock>) -> PageBlocks {
        PageBlocks::new(0, PageSize { width: 612.0, height: 792.0 }, blocks)
    }

    fn fixture() -> (PatternRegistry, RedactionSettings) {
        (PatternRegistry::builtin().unwrap(), RedactionSettings::default())
    }

    #[test]
    fn test_case_helpers() {
        assert!(is_upper("ALLERGIES"));
        assert!(is_upper("HPI: 2"));
        assert!(!is_upper("Allergies"));
        assert!(!is_upper("123"));
        assert!(is_title_case("Past Medical History"));
        assert!(is_title_case("Review Of Systems:"));
        assert!(!is_title_case("ED Provider Note"));
        assert!(!is_title_case("plan debridement"));
        assert!(!is_title_case("Assessment and plan"));
    }

    #[test]
    fn test_provider_note_wins_over_everything() {
        let (registry, settings) = fixture();
        let classifier = Classifier::new(&registry, &settings);
        let note = block("ED Provider Note", 300.0, 12.0);
        let page = page(vec![note.clone()]);
        assert_eq!(classifier.classify(&page, &note), BlockClass::ProviderNoteOverride);
        assert!(classifier.is_stop_boundary(&note));
        assert_eq!(classifier.section_header(&page, &note), None);
    }

    #[test]
    fn test_header_classification() {
        let (registry, settings) = fixture();
        let classifier = Classifier::new(&registry, &settings);
        let header = block("Past Medical History", 100.0, 12.0);
        let page = page(vec![header.clone()]);
        assert_eq!(
            classifier.classify(&page, &header),
            BlockClass::SectionHeader("Past Medical History".to_string())
        );
    }

    #[test]
    fn test_header_inside_administrative_block_is_excluded() {
        let (registry, mut settings) = fixture();
        let billing = block("Billing Information", 100.0, 12.0);
        let header = block("Medication List", 180.0, 12.0);
        let page = page(vec![billing, header.clone()]);

        let classifier = Classifier::new(&registry, &settings);
        assert_eq!(classifier.classify(&page, &header), BlockClass::Body);

        settings.header_admin_exclusion = false;
        let classifier = Classifier::new(&registry, &settings);
        assert_eq!(
            classifier.classify(&page, &header),
            BlockClass::SectionHeader("Medication List".to_string())
        );
    }

    #[test]
    fn test_stop_boundary_filters_prose() {
        let (registry, settings) = fixture();
        let classifier = Classifier::new(&registry, &settings);

        assert!(classifier.is_stop_boundary(&block("Allergies", 0.0, 9.0)));
        assert!(classifier.is_stop_boundary(&block("ASSESSMENT", 0.0, 9.0)));
        assert!(classifier.is_stop_boundary(&block("labs pending review", 0.0, 10.0)));
        // 以关键词开头的正文句子
        assert!(!classifier.is_stop_boundary(&block("Plan to follow up in two weeks.", 0.0, 12.0)));
        assert!(!classifier.is_stop_boundary(&block("plan debridement and wound care", 0.0, 9.0)));
        let long = format!("Assessment {}", "x".repeat(100));
        assert!(!classifier.is_stop_boundary(&block(&long, 0.0, 12.0)));
        assert!(!classifier.is_stop_boundary(&block("Patient denies tobacco use.", 0.0, 12.0)));
    }

    #[test]
    fn test_short_text_never_header() {
        let (registry, settings) = fixture();
        let classifier = Classifier::new(&registry, &settings);
        let meds = block("Med", 0.0, 12.0);
        let page = page(vec![meds.clone()]);
        assert_eq!(classifier.section_header(&page, &meds), None);
    }

    #[test]
    fn test_administrative_window_excludes_same_line_and_far_blocks() {
        let (registry, settings) = fixture();
        let classifier = Classifier::new(&registry, &settings);
        let page = page(vec![
            block("Insurance", 100.0, 12.0),
            block("Social History", 400.0, 12.0),
        ]);
        assert!(classifier.in_administrative_context(&page, 250.0));
        assert!(!classifier.in_administrative_context(&page, 100.0));
        assert!(!classifier.in_administrative_context(&page, 251.0));
    }
}
