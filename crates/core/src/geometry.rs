//! 遮盖矩形计算

use crate::document::{DocumentSnapshot, PageSize, Rect};
use crate::scanner::SectionSpan;
use crate::sensitive::SensitiveMatch;
use crate::{CoreError, RedactionSettings, Result};
use serde::Serialize;

/// 单页上的一个遮盖矩形
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RedactionRectangle {
    pub page: usize,
    pub rect: Rect,
}

#[derive(Debug, Clone, Copy)]
pub struct GeometryResolver<'a> {
    settings: &'a RedactionSettings,
}

impl<'a> GeometryResolver<'a> {
    pub fn new(settings: &'a RedactionSettings) -> Self {
        Self { settings }
    }

    /// 章节在每一页上的整宽矩形
    ///
    /// 单页：`[start_y, end_y]`；首页：`[start_y, 页高]`；中间页：整页；末页：`[0, end_y]`。
    pub fn section_rects(
        &self,
        span: &SectionSpan,
        page_size: impl Fn(usize) -> Result<PageSize>,
    ) -> Result<Vec<RedactionRectangle>> {
        if span.end_page < span.start_page {
            return Err(CoreError::InternalScan(format!(
                "section '{}' ends on page {} before it starts on page {}",
                span.label, span.end_page, span.start_page
            )));
        }

        let mut rects = Vec::with_capacity(span.end_page - span.start_page + 1);
        for page in span.start_page..=span.end_page {
            let size = page_size(page)?;
            let (top, bottom) = match (page == span.start_page, page == span.end_page) {
                (true, true) => (span.start_y, span.end_y),
                (true, false) => (span.start_y, size.height),
                (false, true) => (0.0, span.end_y),
                (false, false) => (0.0, size.height),
            };
            rects.push(RedactionRectangle {
                page,
                rect: Rect::new(0.0, top, size.width, bottom),
            });
        }
        Ok(rects)
    }

    /// 敏感文本块外扩少量边距
    pub fn sensitive_rect(&self, found: &SensitiveMatch) -> RedactionRectangle {
        RedactionRectangle {
            page: found.block.page,
            rect: found.block.bbox.expand(self.settings.padding_x, self.settings.padding_y),
        }
    }

    /// 章节矩形在前，敏感矩形在后，各自保持输入顺序
    pub fn resolve(
        &self,
        snapshot: &DocumentSnapshot,
        sections: &[SectionSpan],
        sensitive: &[SensitiveMatch],
    ) -> Result<Vec<RedactionRectangle>> {
        let page_size = |page: usize| {
            snapshot
                .page(page)
                .map(|p| p.size)
                .ok_or(CoreError::PageOutOfRange {
                    page,
                    count: snapshot.page_count(),
                })
        };

        let mut rects = Vec::new();
        for span in sections {
            rects.extend(self.section_rects(span, page_size)?);
        }
        for found in sensitive {
            page_size(found.block.page)?;
            rects.push(self.sensitive_rect(found));
        }

        log::debug!("[Geometry] 生成 {} 个遮盖矩形", rects.len());
        Ok(rects)
    }
}
