//! 统一文档接口定义
//!
//! 核心流程只通过 `Document`（读取文本块）和 `RedactionSink`（写入遮盖矩形）
//! 两个 trait 与具体文件格式交互。坐标统一使用页面点（pt），原点在左上角，y 向下增长。

use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};

/// 文本样式标志位
pub mod style {
    pub const ITALIC: u32 = 1 << 1;
    pub const MONOSPACE: u32 = 1 << 3;
    pub const BOLD: u32 = 1 << 4;
}

/// 矩形区域 (x0, y0) 左上角，(x1, y1) 右下角
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    /// 向四周扩展
    pub fn expand(&self, dx: f32, dy: f32) -> Self {
        Self {
            x0: self.x0 - dx,
            y0: self.y0 - dy,
            x1: self.x1 + dx,
            y1: self.y1 + dy,
        }
    }

    pub fn contains_point(&self, x: f32, y: f32) -> bool {
        x >= self.x0 && x <= self.x1 && y >= self.y0 && y <= self.y1
    }
}

/// 页面尺寸
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

/// 填充颜色（RGB 0-1）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FillColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Default for FillColor {
    fn default() -> Self {
        Self::BLACK
    }
}

impl FillColor {
    pub const BLACK: FillColor = FillColor { r: 0.0, g: 0.0, b: 0.0 };
}

/// 带位置的文本块
///
/// 每次扫描从文档重新读取，只读，不跨扫描保留。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub text: String,
    pub bbox: Rect,
    pub font_size: f32,
    pub style_flags: u32,
    /// 页码，从 0 开始
    pub page: usize,
}

impl TextBlock {
    pub fn new(page: usize, text: impl Into<String>, bbox: Rect, font_size: f32) -> Self {
        Self {
            text: text.into(),
            bbox,
            font_size,
            style_flags: 0,
            page,
        }
    }

    pub fn with_flags(mut self, flags: u32) -> Self {
        self.style_flags = flags;
        self
    }

    pub fn top(&self) -> f32 {
        self.bbox.y0
    }

    pub fn bottom(&self) -> f32 {
        self.bbox.y1
    }

    pub fn trimmed(&self) -> &str {
        self.text.trim()
    }

    pub fn is_bold(&self) -> bool {
        self.style_flags & style::BOLD != 0
    }
}

/// 文本块来源
///
/// 所有文件处理器都必须实现此 trait。`get_blocks` 返回按顶部 y 升序排列的文本块，
/// 必须稳定且无副作用。
pub trait Document: Send + Sync {
    /// 页数
    fn page_count(&self) -> usize;

    /// 页面尺寸
    fn page_size(&self, page: usize) -> Result<PageSize>;

    /// 提取指定页的文本块
    fn get_blocks(&self, page: usize) -> Result<Vec<TextBlock>>;
}

/// 遮盖写入端
///
/// `add_redaction` 只登记，`commit` 才真正改写页面，提交后不可撤销。
/// 同一文档的写入必须串行，因此两者都要求 `&mut self`。
pub trait RedactionSink {
    fn add_redaction(&mut self, page: usize, rect: Rect, fill: FillColor) -> Result<()>;

    fn commit(&mut self, page: usize) -> Result<()>;
}

/// 单页文本块快照
#[derive(Debug, Clone, PartialEq)]
pub struct PageBlocks {
    pub index: usize,
    pub size: PageSize,
    pub blocks: Vec<TextBlock>,
}

impl PageBlocks {
    pub fn new(index: usize, size: PageSize, mut blocks: Vec<TextBlock>) -> Self {
        blocks.sort_by(|a, b| a.bbox.y0.total_cmp(&b.bbox.y0));
        Self { index, size, blocks }
    }

    pub fn height(&self) -> f32 {
        self.size.height
    }

    /// 顶部 y 落在 `[from, to)` 内的文本块
    pub fn blocks_in_band(&self, from: f32, to: f32) -> &[TextBlock] {
        let start = self.blocks.partition_point(|b| b.bbox.y0 < from);
        let end = self.blocks.partition_point(|b| b.bbox.y0 < to);
        if start >= end {
            return &[];
        }
        &self.blocks[start..end]
    }
}

/// 整个文档的只读快照，两个扫描流程共享
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentSnapshot {
    pages: Vec<PageBlocks>,
}

impl DocumentSnapshot {
    /// 从文档读取全部页面
    pub fn capture<D: Document + ?Sized>(document: &D) -> Result<Self> {
        let count = document.page_count();
        let mut pages = Vec::with_capacity(count);

        for index in 0..count {
            let size = document.page_size(index)?;
            let blocks = document.get_blocks(index)?;
            if let Some(stray) = blocks.iter().find(|b| b.page != index) {
                return Err(CoreError::InternalScan(format!(
                    "page {} returned a block tagged with page {}",
                    index, stray.page
                )));
            }
            pages.push(PageBlocks::new(index, size, blocks));
        }

        log::info!(
            "[Snapshot] 读取 {} 页, 共 {} 个文本块",
            pages.len(),
            pages.iter().map(|p| p.blocks.len()).sum::<usize>()
        );
        Ok(Self { pages })
    }

    pub fn from_pages(pages: Vec<PageBlocks>) -> Self {
        Self { pages }
    }

    pub fn pages(&self) -> &[PageBlocks] {
        &self.pages
    }

    pub fn page(&self, index: usize) -> Option<&PageBlocks> {
        self.pages.get(index)
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// 按文档顺序遍历（第 0 页第一个块开始）
    pub fn blocks(&self) -> impl Iterator<Item = (&PageBlocks, &TextBlock)> {
        self.pages
            .iter()
            .flat_map(|page| page.blocks.iter().map(move |block| (page, block)))
    }
}
