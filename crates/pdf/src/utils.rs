use crate::font::PageFont;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use medredact_core::document::style;
use std::collections::HashMap;

/// 页面继承链的最大深度
const MAX_INHERIT_DEPTH: usize = 32;

/// 从数组对象中提取边界框坐标
fn extract_box_values(arr: &[Object]) -> Option<(f32, f32, f32, f32)> {
    let values: Vec<f32> = arr.iter().filter_map(get_number).collect();
    if values.len() == 4 {
        Some((
            values[0].min(values[2]),
            values[1].min(values[3]),
            values[0].max(values[2]),
            values[1].max(values[3]),
        ))
    } else {
        None
    }
}

/// 解引用
pub(crate) fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

pub(crate) fn resolve_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    match resolve(doc, obj)? {
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

fn page_dict(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    match doc.get_object(page_id).ok()? {
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

/// 获取页面的有效边界框（优先使用 CropBox，其次 MediaBox，再从父节点继承 MediaBox）
/// 返回 (llx, lly, urx, ury)
pub fn get_media_box(doc: &Document, page_id: ObjectId) -> (f32, f32, f32, f32) {
    let raw_box = page_dict(doc, page_id).and_then(|dict| {
        if let Some(values) = box_entry(doc, dict, b"CropBox") {
            log::debug!("[MediaBox] 使用 CropBox: {:?}", values);
            return Some(values);
        }
        if let Some(values) = box_entry(doc, dict, b"MediaBox") {
            log::debug!("[MediaBox] 使用 MediaBox: {:?}", values);
            return Some(values);
        }
        let parent = dict.get(b"Parent").ok().and_then(|p| resolve_dict(doc, p))?;
        let values = box_entry(doc, parent, b"MediaBox")?;
        log::debug!("[MediaBox] 从父页面继承 MediaBox: {:?}", values);
        Some(values)
    });

    raw_box.unwrap_or_else(|| {
        log::warn!("[MediaBox] 使用默认 Letter 尺寸");
        (0.0, 0.0, 612.0, 792.0)
    })
}

fn box_entry(doc: &Document, dict: &Dictionary, key: &[u8]) -> Option<(f32, f32, f32, f32)> {
    match resolve(doc, dict.get(key).ok()?)? {
        Object::Array(arr) => extract_box_values(arr),
        _ => None,
    }
}

/// 从 Object 获取数值
pub fn get_number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// 获取流内容（支持压缩和未压缩的流）
pub fn get_stream_content(stream: &Stream) -> Vec<u8> {
    match stream.decompressed_content() {
        Ok(data) => data,
        Err(_) => stream.content.clone(),
    }
}

/// 获取页面的内容流数据（多个内容流按顺序拼接）
pub fn get_page_content(doc: &Document, page_id: ObjectId) -> Result<Vec<u8>, String> {
    let dict = page_dict(doc, page_id).ok_or_else(|| "页面对象不是字典".to_string())?;

    let contents = match dict.get(b"Contents") {
        Ok(contents) => contents,
        // 没有内容流的空白页
        Err(_) => return Ok(Vec::new()),
    };

    match resolve(doc, contents) {
        Some(Object::Stream(stream)) => Ok(get_stream_content(stream)),
        Some(Object::Array(arr)) => {
            let mut all_content = Vec::new();
            for item in arr {
                if let Some(Object::Stream(stream)) = resolve(doc, item) {
                    all_content.extend(get_stream_content(stream));
                    all_content.push(b'\n');
                }
            }
            Ok(all_content)
        }
        _ => Err("无法获取页面内容".to_string()),
    }
}

/// 页面资源字典（沿 Parent 链继承）
fn page_resources(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut current = page_dict(doc, page_id)?;
    for _ in 0..MAX_INHERIT_DEPTH {
        if let Some(resources) = current.get(b"Resources").ok().and_then(|r| resolve_dict(doc, r)) {
            return Some(resources);
        }
        current = current.get(b"Parent").ok().and_then(|p| resolve_dict(doc, p))?;
    }
    None
}

/// 页面字体资源名 -> 字体（样式与编码）
pub fn page_fonts(doc: &Document, page_id: ObjectId) -> HashMap<Vec<u8>, PageFont> {
    let Some(fonts) = page_resources(doc, page_id)
        .and_then(|res| res.get(b"Font").ok())
        .and_then(|f| resolve_dict(doc, f))
    else {
        return HashMap::new();
    };

    fonts
        .iter()
        .filter_map(|(name, font)| {
            let dict = resolve_dict(doc, font)?;
            Some((name.clone(), PageFont::from_dict(doc, dict)))
        })
        .collect()
}

/// 根据字体名推断样式
pub fn style_flags(base_font: &str) -> u32 {
    let lower = base_font.to_ascii_lowercase();
    let mut flags = 0;
    if lower.contains("bold") || lower.contains("black") || lower.contains("heavy") {
        flags |= style::BOLD;
    }
    if lower.contains("italic") || lower.contains("oblique") {
        flags |= style::ITALIC;
    }
    if lower.contains("courier") || lower.contains("mono") {
        flags |= style::MONOSPACE;
    }
    flags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_style_flags_from_font_name() {
        assert_eq!(style_flags("Helvetica-Bold"), style::BOLD);
        assert_eq!(style_flags("Times-BoldItalic"), style::BOLD | style::ITALIC);
        assert_eq!(style_flags("Courier"), style::MONOSPACE);
        assert_eq!(style_flags("ABCDEF+Arial"), 0);
    }

    #[test]
    fn test_box_values_are_normalised() {
        let arr = vec![
            Object::Integer(612),
            Object::Integer(792),
            Object::Integer(0),
            Object::Real(0.0),
        ];
        assert_eq!(extract_box_values(&arr), Some((0.0, 0.0, 612.0, 792.0)));
    }
}
