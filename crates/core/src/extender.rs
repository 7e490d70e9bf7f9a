//! 目标章节范围扩展
//!
//! 用药、手术史等章节后面常跟着不带标题的操作性内容（剂量、伤口护理说明）。
//! 这类章节关闭时，在关闭页向下探测一段距离，把紧随其后的操作性内容一并纳入。
//! 扩展只会让边界下移，不会跨页，也不会越过任何终止边界。

use crate::classify::Classifier;
use crate::document::PageBlocks;
use crate::preview;

#[derive(Debug, Clone, Copy)]
pub struct RangeExtender<'a> {
    classifier: Classifier<'a>,
}

impl<'a> RangeExtender<'a> {
    pub fn new(classifier: Classifier<'a>) -> Self {
        Self { classifier }
    }

    /// 计算章节 `label` 在关闭页 `page` 上的实际结束位置
    ///
    /// 返回值不小于 `original_end_y`，且不超过页面高度（除非 `original_end_y` 本身已超出）。
    pub fn extend(&self, label: &str, page: &PageBlocks, original_end_y: f32) -> f32 {
        let registry = self.classifier.registry();
        if !registry.is_targeted(label) {
            return original_end_y;
        }

        let settings = self.classifier.settings();
        let page_height = page.height();
        let window_end = (original_end_y + settings.detection_range).min(page_height);

        let mut max_bottom: Option<f32> = None;
        for block in page
            .blocks
            .iter()
            .filter(|b| b.top() >= original_end_y && b.top() <= window_end)
        {
            if self.classifier.is_procedural(&block.text) {
                log::info!(
                    "[Extender] 章节 '{}' 后发现操作内容 y={:.1}: '{}'",
                    label,
                    block.top(),
                    preview(&block.text)
                );
                max_bottom = Some(max_bottom.map_or(block.bottom(), |m: f32| m.max(block.bottom())));
            }
        }

        let Some(max_bottom) = max_bottom else {
            return original_end_y;
        };

        let guard_end = max_bottom + settings.extension_guard;
        if let Some(boundary) = page
            .blocks
            .iter()
            .filter(|b| b.top() > original_end_y && b.top() < guard_end)
            .find(|b| self.classifier.is_stop_boundary(b))
        {
            log::info!(
                "[Extender] 扩展被终止边界阻止: '{}'",
                preview(&boundary.text)
            );
            return original_end_y;
        }

        let extended = (max_bottom + settings.extension_padding)
            .min(page_height)
            .max(original_end_y);
        log::info!(
            "[Extender] 章节 '{}' 结束位置 y={:.1} -> y={:.1}",
            label,
            original_end_y,
            extended
        );
        extended
    }
}
