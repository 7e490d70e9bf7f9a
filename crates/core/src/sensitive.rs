//! 敏感内容扫描
//!
//! 与章节扫描无关，逐块检查整份文档。页与页之间没有状态，可以按页并行。
//! 位于行政信息（账单、保险、人口信息等）标题下方的命中会被丢弃。

use crate::cancel::Cancellation;
use crate::classify::Classifier;
use crate::document::{DocumentSnapshot, PageBlocks, TextBlock};
use crate::{preview, Result};
use medredact_rules::Category;
use serde::Serialize;

/// 敏感内容命中
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensitiveMatch {
    pub block: TextBlock,
    /// 所有命中规则的标签（同义规则可能重复命中）
    pub matched_labels: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct SensitiveScanner<'a> {
    classifier: Classifier<'a>,
}

impl<'a> SensitiveScanner<'a> {
    pub fn new(classifier: Classifier<'a>) -> Self {
        Self { classifier }
    }

    pub fn scan(&self, snapshot: &DocumentSnapshot, cancel: &Cancellation) -> Result<Vec<SensitiveMatch>> {
        let mut matches = Vec::new();
        for page in snapshot.pages() {
            cancel.check()?;
            matches.extend(self.scan_page(page));
        }
        log::info!("[Sensitive] 共发现 {} 个敏感文本块", matches.len());
        Ok(matches)
    }

    pub fn scan_page(&self, page: &PageBlocks) -> Vec<SensitiveMatch> {
        let mut matches = Vec::new();
        for block in &page.blocks {
            let labels = self.labels_for(&block.text);
            if labels.is_empty() {
                continue;
            }

            if self.classifier.in_administrative_context(page, block.top()) {
                log::debug!(
                    "[Sensitive] 行政信息区域内，跳过: '{}'",
                    preview(&block.text)
                );
                continue;
            }

            log::info!(
                "[Sensitive] 第 {} 页: '{}' ({} 条规则)",
                page.index + 1,
                preview(&block.text),
                labels.len()
            );
            matches.push(SensitiveMatch {
                block: block.clone(),
                matched_labels: labels,
            });
        }
        matches
    }

    /// 文本命中的敏感规则标签，过短的文本不检查
    pub fn labels_for(&self, text: &str) -> Vec<String> {
        let text = text.trim();
        if text.chars().count() < self.classifier.settings().min_sensitive_len {
            return Vec::new();
        }
        self.classifier
            .registry()
            .matching_labels(Category::SensitiveContent, text)
    }
}
