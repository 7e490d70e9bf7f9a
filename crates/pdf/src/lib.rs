//! PDF 文档处理器
//!
//! 基于 lopdf 实现 `Document`（按页提取带位置的文本块）和 `RedactionSink`
//! （删除遮盖区域内的文字并绘制填充矩形）。

mod content;
mod extract;
mod font;
mod overlay;
mod utils;

use extract::{extract_blocks, PageFrame};
use lopdf::{Dictionary, Object, ObjectId, Stream};
use medredact_core::{CoreError, FillColor, PageSize, Rect, RedactionSink, TextBlock};
use overlay::{add_fill_overlay, scrub_content_stream, Mask};
use std::collections::{BTreeMap, BTreeSet};
use utils::{get_media_box, get_page_content, page_fonts};

pub type Result<T> = std::result::Result<T, PdfError>;

#[derive(Debug, thiserror::Error)]
pub enum PdfError {
    #[error("无法加载 PDF: {0}")]
    Load(#[source] lopdf::Error),
    #[error("PDF 不包含任何页面")]
    NoPages,
    #[error("第 {page} 页内容流处理失败: {message}")]
    Content { page: usize, message: String },
    #[error("保存 PDF 失败: {0}")]
    Save(String),
}

impl From<PdfError> for CoreError {
    fn from(err: PdfError) -> Self {
        match err {
            PdfError::Load(_) | PdfError::NoPages => CoreError::DocumentParse(err.to_string()),
            PdfError::Content { .. } | PdfError::Save(_) => CoreError::Apply(err.to_string()),
        }
    }
}

/// 内存中的 PDF 文档
pub struct PdfDocument {
    doc: lopdf::Document,
    page_ids: Vec<ObjectId>,
    pending: BTreeMap<usize, Vec<Mask>>,
}

impl PdfDocument {
    pub fn load_mem(bytes: &[u8]) -> Result<Self> {
        let doc = lopdf::Document::load_mem(bytes).map_err(PdfError::Load)?;
        let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
        if page_ids.is_empty() {
            return Err(PdfError::NoPages);
        }
        log::info!("[PDF] 已加载 {} 页 ({} 字节)", page_ids.len(), bytes.len());
        Ok(Self {
            doc,
            page_ids,
            pending: BTreeMap::new(),
        })
    }

    /// 压缩并序列化
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        self.doc.compress();
        let mut out = Vec::new();
        self.doc
            .save_to(&mut out)
            .map_err(|e| PdfError::Save(e.to_string()))?;
        Ok(out)
    }

    fn page_id(&self, page: usize) -> medredact_core::Result<ObjectId> {
        self.page_ids.get(page).copied().ok_or(CoreError::PageOutOfRange {
            page,
            count: self.page_ids.len(),
        })
    }

    fn frame(&self, page_id: ObjectId) -> PageFrame {
        PageFrame::from_media_box(get_media_box(&self.doc, page_id))
    }

    fn content(&self, page: usize, page_id: ObjectId) -> Result<Vec<u8>> {
        get_page_content(&self.doc, page_id).map_err(|message| PdfError::Content { page, message })
    }

    /// 页面 Contents 引用的对象（内容流及间接数组）
    fn content_refs(&self, page_id: ObjectId) -> BTreeSet<ObjectId> {
        let mut ids = BTreeSet::new();
        let Ok(Object::Dictionary(dict)) = self.doc.get_object(page_id) else {
            return ids;
        };
        let mut pending: Vec<&Object> = dict.get(b"Contents").into_iter().collect();
        while let Some(obj) = pending.pop() {
            match obj {
                Object::Reference(id) => {
                    if ids.insert(*id) {
                        if let Ok(Object::Array(items)) = self.doc.get_object(*id) {
                            pending.extend(items.iter());
                        }
                    }
                }
                Object::Array(items) => pending.extend(items.iter()),
                _ => {}
            }
        }
        ids
    }

    fn write_page(&mut self, page: usize, masks: &[Mask]) -> Result<()> {
        let page_id = self.page_ids[page];
        let frame = self.frame(page_id);
        let content_data = self.content(page, page_id)?;
        let fonts = page_fonts(&self.doc, page_id);

        // 先删除文字，再绘制遮盖矩形
        let processed = scrub_content_stream(&content_data, frame, &fonts, masks)
            .and_then(|data| add_fill_overlay(&data, frame, masks))
            .map_err(|message| PdfError::Content { page, message })?;

        let not_dict = |e: lopdf::Error| PdfError::Content {
            page,
            message: format!("页面对象不是字典: {}", e),
        };
        self.doc.get_dictionary(page_id).map_err(not_dict)?;
        let superseded = self.content_refs(page_id);
        let stream_id = self.doc.add_object(Stream::new(Dictionary::new(), processed));
        self.doc
            .get_dictionary_mut(page_id)
            .map_err(not_dict)?
            .set("Contents", Object::Reference(stream_id));

        // 原内容流仍含未删除的文字，其他页面不再引用时一并移除
        let shared: BTreeSet<ObjectId> = self
            .page_ids
            .iter()
            .filter(|&&id| id != page_id)
            .flat_map(|&id| self.content_refs(id))
            .collect();
        let mut removed = 0;
        for id in superseded.difference(&shared) {
            if self.doc.objects.remove(id).is_some() {
                removed += 1;
            }
        }
        log::debug!("[PDF] 第 {} 页移除 {} 个旧内容对象", page + 1, removed);
        Ok(())
    }
}

impl medredact_core::Document for PdfDocument {
    fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    fn page_size(&self, page: usize) -> medredact_core::Result<PageSize> {
        let (llx, lly, urx, ury) = get_media_box(&self.doc, self.page_id(page)?);
        Ok(PageSize {
            width: urx - llx,
            height: ury - lly,
        })
    }

    fn get_blocks(&self, page: usize) -> medredact_core::Result<Vec<TextBlock>> {
        let page_id = self.page_id(page)?;
        let content_data = self
            .content(page, page_id)
            .map_err(|e| CoreError::DocumentParse(e.to_string()))?;
        let fonts = page_fonts(&self.doc, page_id);
        extract_blocks(&content_data, self.frame(page_id), &fonts, page)
            .map_err(|message| CoreError::DocumentParse(format!("第 {} 页: {}", page + 1, message)))
    }
}

impl RedactionSink for PdfDocument {
    fn add_redaction(&mut self, page: usize, rect: Rect, fill: FillColor) -> medredact_core::Result<()> {
        self.page_id(page)?;
        self.pending.entry(page).or_default().push(Mask { rect, fill });
        Ok(())
    }

    fn commit(&mut self, page: usize) -> medredact_core::Result<()> {
        self.page_id(page)?;
        let Some(masks) = self.pending.remove(&page) else {
            return Ok(());
        };
        self.write_page(page, &masks)?;
        log::info!("[PDF] 第 {} 页写入 {} 个遮盖", page + 1, masks.len());
        Ok(())
    }
}
