//! 从页面内容流提取带位置的文本块

use crate::content::{Glyph, TextCursor, ASCENT, DESCENT};
use crate::font::{FontDecoder, PageFont};
use crate::utils::get_number;
use lopdf::content::Content;
use lopdf::Object;
use medredact_core::{Rect, TextBlock};
use std::collections::HashMap;

/// TJ 中超过该比例字号的位移视为单词间隔
const WORD_GAP_RATIO: f32 = 0.2;
/// 相邻片段合并时允许的最大水平间距（按字号比例）
const MERGE_GAP_RATIO: f32 = 1.0;

/// 一次文字显示得到的片段（页面坐标，原点左上）
#[derive(Debug, Clone)]
struct Span {
    text: String,
    x0: f32,
    x1: f32,
    baseline: f32,
    size: f32,
    flags: u32,
}

impl Span {
    fn continues(&self, next: &Span) -> bool {
        let gap = next.x0 - self.x1;
        (self.baseline - next.baseline).abs() < 0.5
            && (self.size - next.size).abs() < 0.1
            && gap > -self.size * 0.5
            && gap <= self.size * MERGE_GAP_RATIO
    }

    fn merge(&mut self, next: Span) {
        if next.x0 - self.x1 > self.size * 0.15 && !self.text.ends_with(' ') && !next.text.starts_with(' ') {
            self.text.push(' ');
        }
        self.text.push_str(&next.text);
        self.x1 = self.x1.max(next.x1);
        self.flags |= next.flags;
    }

    fn into_block(self, page: usize) -> Option<TextBlock> {
        let text = self.text.trim();
        if text.is_empty() {
            return None;
        }
        let bbox = Rect::new(
            self.x0,
            self.baseline - self.size * ASCENT,
            self.x1,
            self.baseline + self.size * DESCENT,
        );
        Some(TextBlock::new(page, text, bbox, self.size).with_flags(self.flags))
    }
}

/// 用户空间 -> 页面坐标
#[derive(Debug, Clone, Copy)]
pub struct PageFrame {
    pub llx: f32,
    pub ury: f32,
}

impl PageFrame {
    pub fn from_media_box(media_box: (f32, f32, f32, f32)) -> Self {
        Self {
            llx: media_box.0,
            ury: media_box.3,
        }
    }

    pub fn to_page(&self, x: f32, y: f32) -> (f32, f32) {
        (x - self.llx, self.ury - y)
    }
}

/// 片段构建
struct SpanBuilder<'a> {
    frame: PageFrame,
    flags: u32,
    span: Option<Span>,
    out: &'a mut Vec<Span>,
}

impl<'a> SpanBuilder<'a> {
    fn push_glyphs(&mut self, glyphs: &[Glyph]) {
        for glyph in glyphs {
            let (x0, baseline) = self.frame.to_page(glyph.x, glyph.y);
            let x1 = x0 + glyph.width;
            match &mut self.span {
                Some(span) => {
                    span.text.push_str(&glyph.text);
                    span.x1 = span.x1.max(x1);
                }
                None => {
                    self.span = Some(Span {
                        text: glyph.text.clone(),
                        x0,
                        x1,
                        baseline,
                        size: glyph.size,
                        flags: self.flags,
                    });
                }
            }
        }
    }

    fn push_space(&mut self) {
        if let Some(span) = &mut self.span {
            if !span.text.ends_with(' ') {
                span.text.push(' ');
            }
        }
    }

    fn finish(self) {
        if let Some(span) = self.span {
            self.out.push(span);
        }
    }
}

/// 提取一页的文本块
///
/// 每个文字显示操作产生一个片段，同一基线、同字号、间距很小的相邻片段合并为一个文本块。
pub fn extract_blocks(
    content_data: &[u8],
    frame: PageFrame,
    fonts: &HashMap<Vec<u8>, PageFont>,
    page: usize,
) -> Result<Vec<TextBlock>, String> {
    let content = Content::decode(content_data).map_err(|e| e.to_string())?;
    let mut cursor = TextCursor::default();
    let mut spans: Vec<Span> = Vec::new();
    let fallback = FontDecoder::default();

    for op in &content.operations {
        cursor.update(op);
        if !cursor.in_text_object() {
            continue;
        }

        let font = fonts.get(cursor.font());
        let flags = font.map_or(0, |f| f.flags);
        let decoder = font.map_or(&fallback, |f| &f.decoder);
        let mut builder = SpanBuilder {
            frame,
            flags,
            span: None,
            out: &mut spans,
        };

        match op.operator.as_str() {
            "Tj" | "'" => {
                if let Some(Object::String(bytes, _)) = op.operands.first() {
                    builder.push_glyphs(&cursor.place(bytes, decoder));
                }
            }
            "\"" => {
                if let Some(Object::String(bytes, _)) = op.operands.get(2) {
                    builder.push_glyphs(&cursor.place(bytes, decoder));
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = op.operands.first() {
                    for item in items {
                        match item {
                            Object::String(bytes, _) => builder.push_glyphs(&cursor.place(bytes, decoder)),
                            other => {
                                if let Some(amount) = get_number(other) {
                                    if -amount / 1000.0 > WORD_GAP_RATIO {
                                        builder.push_space();
                                    }
                                    cursor.adjust(amount);
                                }
                            }
                        }
                    }
                }
            }
            _ => {}
        }
        builder.finish();
    }

    let mut merged: Vec<Span> = Vec::with_capacity(spans.len());
    for span in spans {
        match merged.last_mut() {
            Some(last) if last.continues(&span) => last.merge(span),
            _ => merged.push(span),
        }
    }

    let mut blocks: Vec<TextBlock> = merged.into_iter().filter_map(|s| s.into_block(page)).collect();
    blocks.sort_by(|a, b| a.bbox.y0.total_cmp(&b.bbox.y0));
    log::debug!("[PDF] 第 {} 页提取 {} 个文本块", page + 1, blocks.len());
    Ok(blocks)
}
