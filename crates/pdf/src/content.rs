//! 内容流文本状态跟踪
//!
//! 跟踪 `q/Q/cm`、`BT/ET`、`Tm/Td/TD/T*/TL`、`Tf`，按估算字宽逐字符定位文字。
//! 提取文本块和删除遮盖区域内的文字共用同一套定位逻辑。

use crate::font::FontDecoder;
use crate::utils::get_number;
use lopdf::content::Operation;

pub type Matrix = [f32; 6];

pub const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// 字符顶部相对基线的高度（按字号比例）
pub const ASCENT: f32 = 0.8;
/// 字符底部相对基线的深度（按字号比例）
pub const DESCENT: f32 = 0.2;

/// 先应用 `m` 再应用 `n`
pub fn multiply(m: &Matrix, n: &Matrix) -> Matrix {
    [
        m[0] * n[0] + m[1] * n[2],
        m[0] * n[1] + m[1] * n[3],
        m[2] * n[0] + m[3] * n[2],
        m[2] * n[1] + m[3] * n[3],
        m[4] * n[0] + m[5] * n[2] + n[4],
        m[4] * n[1] + m[5] * n[3] + n[5],
    ]
}

fn translate(tx: f32, ty: f32) -> Matrix {
    [1.0, 0.0, 0.0, 1.0, tx, ty]
}

/// 估算单个字符的宽度（文本空间）
fn estimate_char_width(c: char, font_size: f32) -> f32 {
    if c.is_ascii() {
        font_size * 0.55
    } else {
        font_size * 1.0
    }
}

/// 字符串中的一个编码单元
#[derive(Debug, Clone)]
pub struct Glyph {
    /// 解码后的文字，连字可能多于一个字符
    pub text: String,
    /// 在原字符串中的字节位置
    pub offset: usize,
    pub len: usize,
    /// 用户空间中的起点 x、基线 y
    pub x: f32,
    pub y: f32,
    pub width: f32,
    /// 用户空间字号
    pub size: f32,
}

impl Glyph {
    /// 字符框中心（用户空间）
    pub fn center(&self) -> (f32, f32) {
        let mid = (ASCENT - DESCENT) / 2.0;
        (self.x + self.width / 2.0, self.y + self.size * mid)
    }
}

/// 文本状态
#[derive(Debug, Clone)]
pub struct TextCursor {
    ctm: Matrix,
    stack: Vec<Matrix>,
    text_matrix: Matrix,
    line_matrix: Matrix,
    in_text_object: bool,
    font_size: f32,
    leading: f32,
    font: Vec<u8>,
}

impl Default for TextCursor {
    fn default() -> Self {
        Self {
            ctm: IDENTITY,
            stack: Vec::new(),
            text_matrix: IDENTITY,
            line_matrix: IDENTITY,
            in_text_object: false,
            font_size: 12.0,
            leading: 0.0,
            font: Vec::new(),
        }
    }
}

fn numbers<const N: usize>(op: &Operation) -> Option<[f32; N]> {
    if op.operands.len() < N {
        return None;
    }
    let mut out = [0.0; N];
    for (slot, operand) in out.iter_mut().zip(&op.operands) {
        *slot = get_number(operand)?;
    }
    Some(out)
}

impl TextCursor {
    pub fn in_text_object(&self) -> bool {
        self.in_text_object
    }

    /// 当前字体资源名
    pub fn font(&self) -> &[u8] {
        &self.font
    }

    /// 更新状态；`'` 和 `"` 在显示文字前先换行
    pub fn update(&mut self, op: &Operation) {
        match op.operator.as_str() {
            "q" => self.stack.push(self.ctm),
            "Q" => {
                if let Some(saved) = self.stack.pop() {
                    self.ctm = saved;
                }
            }
            "cm" => {
                if let Some(m) = numbers::<6>(op) {
                    self.ctm = multiply(&m, &self.ctm);
                }
            }
            "BT" => {
                self.in_text_object = true;
                self.text_matrix = IDENTITY;
                self.line_matrix = IDENTITY;
            }
            "ET" => self.in_text_object = false,
            "Tm" => {
                if let Some(m) = numbers::<6>(op) {
                    self.text_matrix = m;
                    self.line_matrix = m;
                }
            }
            "Td" => {
                if let Some([tx, ty]) = numbers::<2>(op) {
                    self.next_line(tx, ty);
                }
            }
            "TD" => {
                if let Some([tx, ty]) = numbers::<2>(op) {
                    self.leading = -ty;
                    self.next_line(tx, ty);
                }
            }
            "TL" => {
                if let Some([leading]) = numbers::<1>(op) {
                    self.leading = leading;
                }
            }
            "T*" | "'" | "\"" => self.next_line(0.0, -self.leading),
            "Tf" if op.operands.len() >= 2 => {
                if let lopdf::Object::Name(name) = &op.operands[0] {
                    self.font = name.clone();
                }
                if let Some(size) = get_number(&op.operands[1]) {
                    self.font_size = size.abs();
                }
            }
            _ => {}
        }
    }

    fn next_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = multiply(&translate(tx, ty), &self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    /// 文本空间水平位移
    fn advance(&mut self, tx: f32) {
        self.text_matrix = multiply(&translate(tx, 0.0), &self.text_matrix);
    }

    /// TJ 数组中的位移量（千分之一字号，正数向左）
    pub fn adjust(&mut self, amount: f32) {
        self.advance(-amount / 1000.0 * self.font_size);
    }

    /// 按字体编码定位字符串中的每个编码单元，并移动到字符串末尾
    pub fn place(&mut self, bytes: &[u8], decoder: &FontDecoder) -> Vec<Glyph> {
        let units = decoder.units(bytes);
        let mut glyphs = Vec::with_capacity(units.len());
        for unit in units {
            let m = multiply(&self.text_matrix, &self.ctm);
            let scale_x = m[0].hypot(m[1]);
            let scale_y = m[2].hypot(m[3]);
            let width: f32 = unit.text.chars().map(|c| estimate_char_width(c, self.font_size)).sum();
            glyphs.push(Glyph {
                text: unit.text,
                offset: unit.offset,
                len: unit.len,
                x: m[4],
                y: m[5],
                width: width * scale_x,
                size: self.font_size * scale_y,
            });
            self.advance(width);
        }
        glyphs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::Object;

    fn op(operator: &str, operands: Vec<Object>) -> Operation {
        Operation::new(operator, operands)
    }

    #[test]
    fn test_td_moves_relative_to_line_start() {
        let mut cursor = TextCursor::default();
        cursor.update(&op("BT", vec![]));
        cursor.update(&op("Tf", vec![Object::Name(b"F1".to_vec()), 10.into()]));
        cursor.update(&op("Td", vec![72.into(), 700.into()]));
        let first = cursor.place(b"AB", &FontDecoder::default());
        assert_eq!(first[0].x, 72.0);
        assert_eq!(first[1].x, 77.5);
        assert_eq!(first[0].y, 700.0);

        cursor.update(&op("Td", vec![0.into(), (-14).into()]));
        let second = cursor.place(b"C", &FontDecoder::default());
        assert_eq!(second[0].x, 72.0);
        assert_eq!(second[0].y, 686.0);
        assert_eq!(cursor.font(), b"F1");
    }

    #[test]
    fn test_cm_scales_glyphs() {
        let mut cursor = TextCursor::default();
        cursor.update(&op("cm", vec![2.into(), 0.into(), 0.into(), 2.into(), 10.into(), 20.into()]));
        cursor.update(&op("BT", vec![]));
        cursor.update(&op("Tf", vec![Object::Name(b"F1".to_vec()), 10.into()]));
        let glyphs = cursor.place(b"A", &FontDecoder::default());
        assert_eq!(glyphs[0].x, 10.0);
        assert_eq!(glyphs[0].y, 20.0);
        assert_eq!(glyphs[0].size, 20.0);
        assert_eq!(glyphs[0].width, 11.0);
    }

    #[test]
    fn test_utf16_units() {
        let mut cursor = TextCursor::default();
        let glyphs = cursor.place(&[0xFE, 0xFF, 0x00, 0x41, 0x00, 0x42], &FontDecoder::default());
        let text: String = glyphs.iter().map(|g| g.text.as_str()).collect();
        assert_eq!(text, "AB");
        assert_eq!(glyphs[1].offset, 4);
    }

    #[test]
    fn test_composite_font_glyphs() {
        let cmap = "1 begincodespacerange <0000> <FFFF> endcodespacerange\n\
                    1 beginbfchar <0001> <00660069> endbfchar";
        let decoder = FontDecoder::from_cmap(cmap, true);
        let mut cursor = TextCursor::default();
        cursor.update(&op("Tf", vec![Object::Name(b"F1".to_vec()), 10.into()]));
        let glyphs = cursor.place(&[0x00, 0x01, 0x00, 0x41], &decoder);
        assert_eq!(glyphs.len(), 2);
        assert_eq!(glyphs[0].text, "fi");
        assert_eq!(glyphs[0].width, 11.0);
        assert_eq!(glyphs[1].text, "A");
        assert_eq!(glyphs[1].x, 11.0);
        assert_eq!(glyphs[1].offset, 2);
    }
}
