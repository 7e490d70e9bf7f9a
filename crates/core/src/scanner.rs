//! 章节边界扫描
//!
//! 按文档顺序（第 0 页第一个文本块到最后一页最后一个文本块）遍历，
//! 用一个只含"当前章节"的状态对象做 fold，每一步最多产出一个已关闭的章节。
//! 章节可以跨页；任意时刻最多只有一个打开的章节。

use crate::cancel::Cancellation;
use crate::classify::{BlockClass, Classifier};
use crate::document::{DocumentSnapshot, PageBlocks, TextBlock};
use crate::extender::RangeExtender;
use crate::{preview, Result};
use serde::Serialize;

/// 已关闭的章节范围
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionSpan {
    pub label: String,
    pub start_page: usize,
    pub start_y: f32,
    pub end_page: usize,
    pub end_y: f32,
    /// 扩展前的结束位置
    pub original_end_y: f32,
}

/// 尚未关闭的章节
#[derive(Debug, Clone, PartialEq)]
pub struct OpenSection {
    pub label: String,
    pub start_page: usize,
    pub start_y: f32,
}

/// 扫描状态
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundaryState {
    pub current: Option<OpenSection>,
}

#[derive(Debug, Clone, Copy)]
pub struct SectionScanner<'a> {
    classifier: Classifier<'a>,
    extender: RangeExtender<'a>,
}

impl<'a> SectionScanner<'a> {
    pub fn new(classifier: Classifier<'a>) -> Self {
        Self {
            classifier,
            extender: RangeExtender::new(classifier),
        }
    }

    /// 扫描整个文档，返回按关闭顺序排列的章节
    /// 每页开始前检查是否已中止
    pub fn scan(&self, snapshot: &DocumentSnapshot, cancel: &Cancellation) -> Result<Vec<SectionSpan>> {
        let mut state = BoundaryState::default();
        let mut spans = Vec::new();

        for page in snapshot.pages() {
            cancel.check()?;
            state = page.blocks.iter().fold(state, |state, block| {
                let (next, closed) = self.step(state, page, block);
                spans.extend(closed);
                next
            });
        }

        spans.extend(self.finish(state, snapshot));
        log::info!("[Scanner] 共识别 {} 个脱敏章节", spans.len());
        Ok(spans)
    }

    /// 处理单个文本块
    pub fn step(
        &self,
        state: BoundaryState,
        page: &PageBlocks,
        block: &TextBlock,
    ) -> (BoundaryState, Option<SectionSpan>) {
        match self.classifier.classify(page, block) {
            BlockClass::ProviderNoteOverride => match state.current {
                Some(open) => {
                    let extended = self.extender.extend(&open.label, page, block.top());
                    let span = close(open, page.index, extended.min(block.top()), block.top());
                    log::info!(
                        "[Scanner] 医生记录 '{}' 之前结束章节 '{}' (第 {} 页)",
                        preview(&block.text),
                        span.label,
                        page.index + 1
                    );
                    (BoundaryState::default(), Some(span))
                }
                None => (state, None),
            },
            BlockClass::SectionHeader(label) => {
                let closed = state.current.map(|open| self.close_extended(open, page, block.top()));
                log::info!("[Scanner] 开始脱敏章节 '{}' (第 {} 页)", label, page.index + 1);
                let next = BoundaryState {
                    current: Some(OpenSection {
                        label,
                        start_page: page.index,
                        start_y: block.top(),
                    }),
                };
                (next, closed)
            }
            BlockClass::StopBoundary => match state.current {
                Some(open) => {
                    let span = self.close_extended(open, page, block.top());
                    log::info!(
                        "[Scanner] 章节 '{}' 在 '{}' 处结束 (第 {} 页)",
                        span.label,
                        preview(&block.text),
                        page.index + 1
                    );
                    (BoundaryState::default(), Some(span))
                }
                None => (state, None),
            },
            BlockClass::Body => (state, None),
        }
    }

    /// 文档结束时仍打开的章节在最后一页底部关闭
    pub fn finish(&self, state: BoundaryState, snapshot: &DocumentSnapshot) -> Option<SectionSpan> {
        let open = state.current?;
        let last = snapshot.pages().last()?;
        let span = self.close_extended(open, last, last.height());
        log::info!("[Scanner] 章节 '{}' 延续到文档末尾", span.label);
        Some(span)
    }

    fn close_extended(&self, open: OpenSection, page: &PageBlocks, original_end_y: f32) -> SectionSpan {
        let extended = self.extender.extend(&open.label, page, original_end_y);
        close(open, page.index, extended, original_end_y)
    }
}

fn close(open: OpenSection, end_page: usize, end_y: f32, original_end_y: f32) -> SectionSpan {
    SectionSpan {
        label: open.label,
        start_page: open.start_page,
        start_y: open.start_y,
        end_page,
        end_y,
        original_end_y,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{PageSize, Rect};
    use crate::RedactionSettings;
    use medredact_rules::PatternRegistry;

    fn block(page: usize, text: &str, y0: f32, size: f32) -> TextBlock {
        TextBlock::new(page, text, Rect::new(72.0, y0, 400.0, y0 + 12.0), size)
    }

    fn snapshot(pages: Vec<Vec<TextBlock>>) -> DocumentSnapshot {
        DocumentSnapshot::from_pages(
            pages
                .into_iter()
                .enumerate()
                .map(|(i, blocks)| PageBlocks::new(i, PageSize { width: 612.0, height: 792.0 }, blocks))
                .collect(),
        )
    }

    fn scan_with(settings: &RedactionSettings, doc: &DocumentSnapshot) -> Vec<SectionSpan> {
        let registry = PatternRegistry::builtin().unwrap();
        SectionScanner::new(Classifier::new(&registry, settings))
            .scan(doc, &Cancellation::new())
            .unwrap()
    }

    fn scan(doc: &DocumentSnapshot) -> Vec<SectionSpan> {
        scan_with(&RedactionSettings::default(), doc)
    }

    fn assert_well_formed(spans: &[SectionSpan]) {
        for span in spans {
            assert!(span.end_page >= span.start_page, "{:?}", span);
            assert!(span.end_y >= span.original_end_y, "{:?}", span);
            if span.start_page == span.end_page {
                assert!(span.end_y >= span.start_y, "{:?}", span);
            }
        }
    }

    #[test]
    fn test_header_closed_by_stop_boundary() {
        let doc = snapshot(vec![vec![
            block(0, "Past Medical History", 100.0, 12.0),
            block(0, "Patient denies tobacco use.", 120.0, 9.0),
            block(0, "Allergies", 140.0, 12.0),
        ]]);
        let spans = scan(&doc);
        assert_eq!(
            spans,
            vec![SectionSpan {
                label: "Past Medical History".to_string(),
                start_page: 0,
                start_y: 100.0,
                end_page: 0,
                end_y: 140.0,
                original_end_y: 140.0,
            }]
        );
    }

    #[test]
    fn test_provider_note_closes_before_its_top() {
        let doc = snapshot(vec![vec![
            block(0, "Past Medical History", 100.0, 12.0),
            block(0, "Patient denies tobacco use.", 120.0, 9.0),
            block(0, "ED Provider Note", 140.0, 12.0),
            block(0, "Seen for ankle sprain", 160.0, 9.0),
        ]]);
        let spans = scan(&doc);
        assert_eq!(spans.len(), 1);
        assert!(spans[0].end_y <= 140.0);
        assert_eq!(spans[0].end_page, 0);
    }

    #[test]
    fn test_provider_note_beats_pending_extension() {
        let doc = snapshot(vec![vec![
            block(0, "Current Medications", 100.0, 12.0),
            block(0, "ED Provider Note", 200.0, 12.0),
            block(0, "Metformin 500 mg by mouth BID", 220.0, 9.0),
        ]]);
        let spans = scan(&doc);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].end_y, 200.0);
    }

    #[test]
    fn test_targeted_section_extended_past_boundary_line() {
        let doc = snapshot(vec![vec![
            block(0, "Past Surgical History", 200.0, 12.0),
            block(0, "Bunionectomy 2019", 250.0, 9.0),
            block(0, "Chief Complaint", 300.0, 12.0),
            block(0, "plan debridement and wound care", 340.0, 9.0),
        ]]);
        let spans = scan(&doc);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].original_end_y, 300.0);
        assert_eq!(spans[0].end_y, 340.0 + 12.0 + 5.0);
        assert!(spans[0].end_y > 300.0);
    }

    #[test]
    fn test_new_header_closes_previous_section() {
        let doc = snapshot(vec![vec![
            block(0, "Social History", 100.0, 12.0),
            block(0, "Lives alone", 120.0, 9.0),
            block(0, "Family History", 200.0, 12.0),
            block(0, "Mother with diabetes", 220.0, 9.0),
        ]]);
        let spans = scan(&doc);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].label, "Social History");
        assert_eq!(spans[0].end_y, 200.0);
        assert_eq!(spans[1].label, "Family History");
        assert_eq!(spans[1].start_y, 200.0);
        // 文档末尾关闭
        assert_eq!(spans[1].end_y, 792.0);
    }

    #[test]
    fn test_section_spans_pages() {
        let doc = snapshot(vec![
            vec![block(0, "Medication List", 700.0, 12.0)],
            vec![block(1, "Aspirin 81", 50.0, 9.0)],
            vec![
                block(2, "Atenolol 25", 40.0, 9.0),
                block(2, "Immunizations", 90.0, 12.0),
            ],
        ]);
        let spans = scan(&doc);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].start_page, 0);
        assert_eq!(spans[0].start_y, 700.0);
        assert_eq!(spans[0].end_page, 2);
        assert_eq!(spans[0].end_y, 90.0);
        assert_well_formed(&spans);
    }

    #[test]
    fn test_open_section_closes_at_last_page_bottom() {
        let doc = snapshot(vec![
            vec![block(0, "Chief Complaint", 80.0, 12.0)],
            vec![block(1, "Problem List", 300.0, 12.0), block(1, "Hypertension", 320.0, 9.0)],
        ]);
        let spans = scan(&doc);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].end_page, 1);
        assert_eq!(spans[0].end_y, 792.0);
        assert_eq!(spans[0].original_end_y, 792.0);
    }

    #[test]
    fn test_boundaries_without_open_section_are_ignored() {
        let doc = snapshot(vec![vec![
            block(0, "Allergies", 100.0, 12.0),
            block(0, "ED Provider Note", 140.0, 12.0),
            block(0, "Assessment", 180.0, 12.0),
        ]]);
        assert!(scan(&doc).is_empty());
    }

    #[test]
    fn test_header_under_administrative_heading() {
        let doc = snapshot(vec![vec![
            block(0, "Insurance", 100.0, 12.0),
            block(0, "Medication List", 150.0, 12.0),
            block(0, "Aspirin 81", 170.0, 9.0),
        ]]);
        assert!(scan(&doc).is_empty());

        let settings = RedactionSettings {
            header_admin_exclusion: false,
            ..RedactionSettings::default()
        };
        let spans = scan_with(&settings, &doc);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].start_y, 150.0);
    }

    #[test]
    fn test_step_keeps_single_open_section() {
        let registry = PatternRegistry::builtin().unwrap();
        let settings = RedactionSettings::default();
        let scanner = SectionScanner::new(Classifier::new(&registry, &settings));
        let doc = snapshot(vec![vec![
            block(0, "Social History", 100.0, 12.0),
            block(0, "Family History", 200.0, 12.0),
        ]]);
        let page = &doc.pages()[0];

        let (state, closed) = scanner.step(BoundaryState::default(), page, &page.blocks[0]);
        assert!(closed.is_none());
        assert_eq!(state.current.as_ref().map(|s| s.label.as_str()), Some("Social History"));

        let (state, closed) = scanner.step(state, page, &page.blocks[1]);
        assert_eq!(closed.map(|s| s.label), Some("Social History".to_string()));
        assert_eq!(state.current.map(|s| s.label), Some("Family History".to_string()));
    }

    #[test]
    fn test_scan_stops_when_cancelled() {
        let registry = PatternRegistry::builtin().unwrap();
        let settings = RedactionSettings::default();
        let doc = snapshot(vec![vec![block(0, "Social History", 100.0, 12.0)]]);
        let result = SectionScanner::new(Classifier::new(&registry, &settings))
            .scan(&doc, &Cancellation::with_deadline(std::time::Duration::ZERO));
        assert!(matches!(result, Err(crate::CoreError::Cancelled)));
    }
}
