//! 遮盖写入：删除区域内的文字，并绘制填充矩形

use crate::content::TextCursor;
use crate::extract::PageFrame;
use crate::font::{FontDecoder, PageFont};
use lopdf::content::{Content, Operation};
use lopdf::Object;
use medredact_core::{FillColor, Rect};
use std::collections::HashMap;

/// 待写入的遮盖区域（页面坐标）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mask {
    pub rect: Rect,
    pub fill: FillColor,
}

/// 将字符中心落在遮盖区域内的编码单元替换为空格，确保文字无法复制
fn redact_string(
    cursor: &mut TextCursor,
    bytes: &[u8],
    decoder: &FontDecoder,
    frame: PageFrame,
    masks: &[Mask],
) -> (Vec<u8>, bool) {
    let mut result = bytes.to_vec();
    let mut any_redacted = false;

    for glyph in cursor.place(bytes, decoder) {
        let (cx, cy) = glyph.center();
        let (px, py) = frame.to_page(cx, cy);
        if masks.iter().any(|m| m.rect.contains_point(px, py)) {
            // 保持字节长度不变，后续字符位置不偏移
            let end = glyph.offset + glyph.len;
            result[glyph.offset..end].copy_from_slice(&decoder.blank(glyph.len));
            any_redacted = true;
        }
    }

    (result, any_redacted)
}

/// 处理内容流，将遮盖区域内的文字替换为空格
pub fn scrub_content_stream(
    content_data: &[u8],
    frame: PageFrame,
    fonts: &HashMap<Vec<u8>, PageFont>,
    masks: &[Mask],
) -> Result<Vec<u8>, String> {
    let content = Content::decode(content_data).map_err(|e| e.to_string())?;
    let mut cursor = TextCursor::default();
    let fallback = FontDecoder::default();
    let mut new_operations: Vec<Operation> = Vec::with_capacity(content.operations.len());
    let mut scrubbed = 0usize;

    for op in content.operations {
        cursor.update(&op);
        if !cursor.in_text_object() {
            new_operations.push(op);
            continue;
        }

        let decoder = fonts.get(cursor.font()).map_or(&fallback, |f| &f.decoder);
        let operand_index = match op.operator.as_str() {
            "Tj" | "'" => Some(0),
            "\"" => Some(2),
            _ => None,
        };

        if let Some(index) = operand_index {
            match op.operands.get(index) {
                Some(Object::String(bytes, format)) => {
                    let (redacted, any_redacted) = redact_string(&mut cursor, bytes, decoder, frame, masks);
                    if any_redacted {
                        scrubbed += 1;
                        let mut operands = op.operands.clone();
                        operands[index] = Object::String(redacted, *format);
                        new_operations.push(Operation::new(&op.operator, operands));
                    } else {
                        new_operations.push(op);
                    }
                }
                _ => new_operations.push(op),
            }
            continue;
        }

        if op.operator == "TJ" {
            if let Some(Object::Array(items)) = op.operands.first() {
                let mut new_items = Vec::with_capacity(items.len());
                let mut any_redacted = false;
                for item in items {
                    match item {
                        Object::String(bytes, format) => {
                            let (redacted, redacted_this) = redact_string(&mut cursor, bytes, decoder, frame, masks);
                            any_redacted |= redacted_this;
                            new_items.push(Object::String(redacted, *format));
                        }
                        Object::Integer(n) => {
                            cursor.adjust(*n as f32);
                            new_items.push(item.clone());
                        }
                        Object::Real(n) => {
                            cursor.adjust(*n);
                            new_items.push(item.clone());
                        }
                        _ => new_items.push(item.clone()),
                    }
                }
                if any_redacted {
                    scrubbed += 1;
                    new_operations.push(Operation::new("TJ", vec![Object::Array(new_items)]));
                    continue;
                }
            }
        }
        new_operations.push(op);
    }

    log::info!("[Scrub] 删除文字的显示操作: {}", scrubbed);
    Content {
        operations: new_operations,
    }
    .encode()
    .map_err(|e| e.to_string())
}

/// 在内容流末尾绘制填充矩形
///
/// 原内容包在 `q ... Q` 中，矩形在页面默认坐标系下绘制，不受原内容 CTM 影响。
pub fn add_fill_overlay(content_data: &[u8], frame: PageFrame, masks: &[Mask]) -> Result<Vec<u8>, String> {
    let content = Content::decode(content_data).map_err(|e| e.to_string())?;
    let mut new_operations = Vec::with_capacity(content.operations.len() + masks.len() * 3 + 4);

    new_operations.push(Operation::new("q", vec![]));
    new_operations.extend(content.operations);
    new_operations.push(Operation::new("Q", vec![]));

    new_operations.push(Operation::new("q", vec![]));
    for mask in masks {
        let Rect { x0, y1, .. } = mask.rect;
        let (width, height) = (mask.rect.width(), mask.rect.height());
        let FillColor { r, g, b } = mask.fill;
        log::debug!(
            "[Overlay] 绘制遮盖: x={:.1}, y={:.1}, w={:.1}, h={:.1}",
            x0,
            mask.rect.y0,
            width,
            height
        );
        new_operations.push(Operation::new(
            "rg",
            vec![Object::Real(r), Object::Real(g), Object::Real(b)],
        ));
        // 页面坐标原点在左上，PDF 用户空间原点在左下
        new_operations.push(Operation::new(
            "re",
            vec![
                Object::Real(x0 + frame.llx),
                Object::Real(frame.ury - y1),
                Object::Real(width),
                Object::Real(height),
            ],
        ));
        new_operations.push(Operation::new("f", vec![]));
    }
    new_operations.push(Operation::new("Q", vec![]));

    Content {
        operations: new_operations,
    }
    .encode()
    .map_err(|e| e.to_string())
}
