//! 字体编码
//!
//! 按字体资源把字符串拆成编码单元并解码为 Unicode：
//! 复合字体（Type0）按 CMap 的编码宽度（通常 2 字节）拆分，
//! 有 ToUnicode 时查表，否则简单字体按单字节、带 BOM 的字符串按 UTF-16BE 处理。

use crate::utils::{get_stream_content, resolve, style_flags};
use lopdf::{Dictionary, Document, Object};
use regex::Regex;
use std::collections::HashMap;

/// bfrange 展开的最大编码数
const MAX_RANGE: u32 = 0xFFFF;

/// 字符串中的一个编码单元
#[derive(Debug, Clone, PartialEq)]
pub struct CodeUnit {
    pub text: String,
    /// 在原字符串中的字节位置
    pub offset: usize,
    pub len: usize,
}

/// 页面字体资源
#[derive(Debug, Clone, Default)]
pub struct PageFont {
    pub flags: u32,
    pub decoder: FontDecoder,
}

impl PageFont {
    pub fn from_dict(doc: &Document, font: &Dictionary) -> Self {
        let flags = match font.get(b"BaseFont") {
            Ok(Object::Name(name)) => style_flags(&String::from_utf8_lossy(name)),
            _ => 0,
        };
        Self {
            flags,
            decoder: FontDecoder::from_font(doc, font),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FontDecoder {
    /// 每个编码的字节数
    code_len: usize,
    to_unicode: HashMap<u32, String>,
}

impl Default for FontDecoder {
    fn default() -> Self {
        Self {
            code_len: 1,
            to_unicode: HashMap::new(),
        }
    }
}

impl FontDecoder {
    pub fn from_font(doc: &Document, font: &Dictionary) -> Self {
        let composite = matches!(font.get(b"Subtype"), Ok(Object::Name(name)) if name == b"Type0");
        let cmap = font
            .get(b"ToUnicode")
            .ok()
            .and_then(|obj| resolve(doc, obj))
            .and_then(|obj| match obj {
                Object::Stream(stream) => Some(String::from_utf8_lossy(&get_stream_content(stream)).into_owned()),
                _ => None,
            });

        if composite && cmap.is_none() {
            let encoding = font.get(b"Encoding").ok().and_then(|e| match e {
                Object::Name(name) => Some(String::from_utf8_lossy(name).into_owned()),
                _ => None,
            });
            log::warn!(
                "[Font] 复合字体没有 ToUnicode，文字无法解码 (Encoding={:?})",
                encoding
            );
        }
        Self::from_cmap(cmap.as_deref().unwrap_or(""), composite)
    }

    /// 由 ToUnicode CMap 文本构建；`composite` 为复合字体
    pub fn from_cmap(cmap: &str, composite: bool) -> Self {
        let code_len = if composite {
            codespace_len(cmap).unwrap_or(2)
        } else {
            1
        };
        Self {
            code_len,
            to_unicode: parse_to_unicode(cmap),
        }
    }

    /// 拆分并解码字符串
    pub fn units(&self, bytes: &[u8]) -> Vec<CodeUnit> {
        if self.code_len == 1 && self.to_unicode.is_empty() && bytes.starts_with(&[0xFE, 0xFF]) {
            return utf16_units(bytes);
        }

        bytes
            .chunks_exact(self.code_len)
            .enumerate()
            .map(|(i, chunk)| {
                let code = chunk.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32);
                let text = match self.to_unicode.get(&code) {
                    Some(text) => text.clone(),
                    None if self.code_len == 1 => (code as u8 as char).to_string(),
                    None => char::from_u32(code)
                        .unwrap_or(char::REPLACEMENT_CHARACTER)
                        .to_string(),
                };
                CodeUnit {
                    text: printable(text),
                    offset: i * self.code_len,
                    len: self.code_len,
                }
            })
            .collect()
    }

    /// 替换一个编码单元的字节：优先使用映射到空格的编码
    pub fn blank(&self, len: usize) -> Vec<u8> {
        let space = if self.to_unicode.is_empty() {
            Some(0x20)
        } else {
            self.to_unicode
                .iter()
                .filter(|(_, text)| text.as_str() == " ")
                .map(|(code, _)| *code)
                .min()
        };
        match space {
            Some(code) => (0..len).rev().map(|i| (code >> (8 * i)) as u8).collect(),
            None => vec![0; len],
        }
    }
}

/// 控制字符视为空格
fn printable(text: String) -> String {
    if text.chars().any(char::is_control) {
        text.chars().map(|c| if c.is_control() { ' ' } else { c }).collect()
    } else {
        text
    }
}

fn utf16_units(bytes: &[u8]) -> Vec<CodeUnit> {
    bytes[2..]
        .chunks_exact(2)
        .enumerate()
        .map(|(i, pair)| {
            let code = u16::from_be_bytes([pair[0], pair[1]]);
            let ch = char::from_u32(code as u32).unwrap_or(char::REPLACEMENT_CHARACTER);
            CodeUnit {
                text: printable(ch.to_string()),
                offset: 2 + i * 2,
                len: 2,
            }
        })
        .collect()
}

fn hex_bytes(hex: &str) -> Vec<u8> {
    let digits: Vec<u8> = hex
        .chars()
        .filter_map(|c| c.to_digit(16))
        .map(|d| d as u8)
        .collect();
    digits
        .chunks(2)
        .map(|pair| (pair[0] << 4) | pair.get(1).copied().unwrap_or(0))
        .collect()
}

fn hex_code(hex: &str) -> Option<u32> {
    let bytes = hex_bytes(hex);
    if bytes.is_empty() || bytes.len() > 4 {
        return None;
    }
    Some(bytes.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32))
}

/// 目标字符串为 UTF-16BE
fn hex_text(hex: &str) -> Vec<u16> {
    hex_bytes(hex)
        .chunks(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair.get(1).copied().unwrap_or(0)]))
        .collect()
}

fn utf16_string(units: &[u16]) -> String {
    char::decode_utf16(units.iter().copied())
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

fn sections<'a>(cmap: &'a str, name: &str) -> Vec<&'a str> {
    let pattern = format!(r"(?s)begin{name}(.*?)end{name}");
    match Regex::new(&pattern) {
        Ok(re) => re
            .captures_iter(cmap)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect(),
        Err(_) => Vec::new(),
    }
}

fn codespace_len(cmap: &str) -> Option<usize> {
    let hex = Regex::new(r"<([0-9A-Fa-f\s]+)>").ok()?;
    let section = sections(cmap, "codespacerange").into_iter().next()?;
    let first = hex.captures(section)?.get(1)?.as_str();
    let len = hex_bytes(first).len();
    (1..=4).contains(&len).then_some(len)
}

fn parse_to_unicode(cmap: &str) -> HashMap<u32, String> {
    let mut map = HashMap::new();
    if cmap.is_empty() {
        return map;
    }
    let (Ok(pair), Ok(range), Ok(hex)) = (
        Regex::new(r"<([0-9A-Fa-f\s]*)>\s*<([0-9A-Fa-f\s]*)>"),
        Regex::new(r"<([0-9A-Fa-f\s]+)>\s*<([0-9A-Fa-f\s]+)>\s*(?:<([0-9A-Fa-f\s]*)>|\[([^\]]*)\])"),
        Regex::new(r"<([0-9A-Fa-f\s]*)>"),
    ) else {
        return map;
    };

    for section in sections(cmap, "bfchar") {
        for caps in pair.captures_iter(section) {
            if let Some(code) = hex_code(&caps[1]) {
                map.insert(code, utf16_string(&hex_text(&caps[2])));
            }
        }
    }

    for section in sections(cmap, "bfrange") {
        for caps in range.captures_iter(section) {
            let (Some(lo), Some(hi)) = (hex_code(&caps[1]), hex_code(&caps[2])) else {
                continue;
            };
            if hi < lo || hi - lo > MAX_RANGE {
                continue;
            }
            if let Some(dst) = caps.get(3) {
                let base = hex_text(dst.as_str());
                let Some((&last, prefix)) = base.split_last() else {
                    continue;
                };
                for code in lo..=hi {
                    let mut units = prefix.to_vec();
                    units.push(last.wrapping_add((code - lo) as u16));
                    map.insert(code, utf16_string(&units));
                }
            } else if let Some(array) = caps.get(4) {
                for (code, item) in (lo..=hi).zip(hex.captures_iter(array.as_str())) {
                    map.insert(code, utf16_string(&hex_text(&item[1])));
                }
            }
        }
    }

    log::debug!("[Font] ToUnicode 映射 {} 个编码", map.len());
    map
}
