//! 规则注册表
//!
//! 进程级只读的规则表：章节标题、终止边界、医生记录保护、操作性内容、敏感内容，
//! 以及行政上下文指示词。启动时构建一次，之后只读，可在线程间共享。

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RulesError>;

#[derive(Error, Debug)]
pub enum RulesError {
    #[error("规则表解析失败: {0}")]
    Table(#[from] serde_json::Error),

    #[error("正则编译失败 [{label}]: {source}")]
    Pattern {
        label: String,
        #[source]
        source: regex::Error,
    },
}

/// 规则类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    SectionHeader,
    StopBoundary,
    ProviderNoteOverride,
    ProceduralContent,
    SensitiveContent,
}

/// 匹配锚定方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anchoring {
    /// 从去空白后的文本开头匹配（标题类规则自带 `$`，必须吃掉整行）
    StartOfLine,
    /// 文本任意位置出现即可
    Anywhere,
}

/// 单条编译后的规则
#[derive(Debug, Clone)]
pub struct PatternRule {
    pub category: Category,
    pub label: String,
    /// 规则表中的原始表达式
    pub source: String,
    /// 敏感内容分组（其他类别为空）
    pub group: Option<String>,
    pub anchoring: Anchoring,
    matcher: Regex,
}

impl PatternRule {
    pub fn new(
        category: Category,
        label: impl Into<String>,
        source: impl Into<String>,
        anchoring: Anchoring,
    ) -> Result<Self> {
        let label = label.into();
        let source = source.into();
        let anchored = match anchoring {
            Anchoring::StartOfLine => format!("(?i)^(?:{})", source),
            Anchoring::Anywhere => format!("(?im){}", source),
        };
        let matcher = Regex::new(&anchored).map_err(|source| RulesError::Pattern {
            label: label.clone(),
            source,
        })?;

        Ok(Self {
            category,
            label,
            source,
            group: None,
            anchoring,
            matcher,
        })
    }

    fn with_group(mut self, group: String) -> Self {
        self.group = Some(group);
        self
    }

    /// 对去空白后的文本做匹配
    pub fn is_match(&self, text: &str) -> bool {
        self.matcher.is_match(text.trim())
    }
}

/// 敏感规则的对外描述（用于接口展示）
#[derive(Debug, Clone, Serialize)]
pub struct SensitiveRuleInfo {
    pub label: String,
    pub group: String,
    pub pattern: String,
}

// ============================================================================
// 规则表（JSON）
// ============================================================================

#[derive(Debug, Deserialize)]
struct RuleTable {
    version: String,
    target_sections: Vec<String>,
    section_headers: Vec<LabeledPattern>,
    stop_boundaries: Vec<String>,
    provider_notes: Vec<String>,
    procedural_content: Vec<String>,
    sensitive_content: Vec<SensitivePattern>,
    targeted_sections: Vec<String>,
    administrative_indicators: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct LabeledPattern {
    label: String,
    pattern: String,
}

#[derive(Debug, Deserialize)]
struct SensitivePattern {
    label: String,
    group: String,
    pattern: String,
}

const BUILTIN_TABLE: &str = include_str!("../data/patterns.json");

/// 规则注册表
///
/// 每个类别内保持注册顺序，首个命中的规则决定标签。
#[derive(Debug, Clone)]
pub struct PatternRegistry {
    version: String,
    target_sections: Vec<String>,
    stop_keywords: Vec<String>,
    targeted_sections: Vec<String>,
    administrative_indicators: Vec<String>,
    section_headers: Vec<PatternRule>,
    stop_boundaries: Vec<PatternRule>,
    provider_notes: Vec<PatternRule>,
    procedural: Vec<PatternRule>,
    sensitive: Vec<PatternRule>,
}

impl PatternRegistry {
    /// 使用内置规则表构建
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_TABLE)
    }

    /// 从 JSON 规则表构建
    pub fn from_json(json: &str) -> Result<Self> {
        let table: RuleTable = serde_json::from_str(json)?;
        Self::compile(table)
    }

    fn compile(table: RuleTable) -> Result<Self> {
        // 每个目标章节生成两条标题规则：普通/带日期限定、带冒号
        let mut section_headers = Vec::with_capacity(table.target_sections.len() * 2 + table.section_headers.len());
        for section in &table.target_sections {
            let escaped = regex::escape(section);
            section_headers.push(PatternRule::new(
                Category::SectionHeader,
                section.as_str(),
                format!(r"{}\s*(?:\s+as\s+of\s+\d+/\d+/\d+)?$", escaped),
                Anchoring::StartOfLine,
            )?);
            section_headers.push(PatternRule::new(
                Category::SectionHeader,
                section.as_str(),
                format!(r"{}\s*:\s*$", escaped),
                Anchoring::StartOfLine,
            )?);
        }
        for extra in &table.section_headers {
            section_headers.push(PatternRule::new(
                Category::SectionHeader,
                extra.label.as_str(),
                extra.pattern.as_str(),
                Anchoring::StartOfLine,
            )?);
        }

        let mut stop_keywords: Vec<String> = Vec::with_capacity(table.stop_boundaries.len());
        for keyword in &table.stop_boundaries {
            let keyword = keyword.trim().to_lowercase();
            if !keyword.is_empty() && !stop_keywords.contains(&keyword) {
                stop_keywords.push(keyword);
            }
        }
        let stop_boundaries = stop_keywords
            .iter()
            .map(|keyword| {
                PatternRule::new(
                    Category::StopBoundary,
                    keyword.as_str(),
                    regex::escape(keyword),
                    Anchoring::StartOfLine,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        let provider_notes = table
            .provider_notes
            .iter()
            .map(|p| PatternRule::new(Category::ProviderNoteOverride, p.as_str(), p.as_str(), Anchoring::StartOfLine))
            .collect::<Result<Vec<_>>>()?;

        let procedural = table
            .procedural_content
            .iter()
            .map(|p| PatternRule::new(Category::ProceduralContent, p.as_str(), p.as_str(), Anchoring::Anywhere))
            .collect::<Result<Vec<_>>>()?;

        let sensitive = table
            .sensitive_content
            .into_iter()
            .map(|s| {
                PatternRule::new(Category::SensitiveContent, s.label, s.pattern, Anchoring::Anywhere)
                    .map(|rule| rule.with_group(s.group))
            })
            .collect::<Result<Vec<_>>>()?;

        let administrative_indicators = table
            .administrative_indicators
            .iter()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        log::info!(
            "[Rules] 规则表 v{} 已加载: 标题 {}, 边界 {}, 医生记录 {}, 操作内容 {}, 敏感 {}",
            table.version,
            section_headers.len(),
            stop_boundaries.len(),
            provider_notes.len(),
            procedural.len(),
            sensitive.len()
        );

        Ok(Self {
            version: table.version,
            target_sections: table.target_sections,
            stop_keywords,
            targeted_sections: table.targeted_sections,
            administrative_indicators,
            section_headers,
            stop_boundaries,
            provider_notes,
            procedural,
            sensitive,
        })
    }

    /// 指定类别的规则（注册顺序）
    pub fn rules(&self, category: Category) -> &[PatternRule] {
        match category {
            Category::SectionHeader => &self.section_headers,
            Category::StopBoundary => &self.stop_boundaries,
            Category::ProviderNoteOverride => &self.provider_notes,
            Category::ProceduralContent => &self.procedural,
            Category::SensitiveContent => &self.sensitive,
        }
    }

    /// 首个命中的规则
    pub fn first_match(&self, category: Category, text: &str) -> Option<&PatternRule> {
        self.rules(category).iter().find(|rule| rule.is_match(text))
    }

    pub fn matches(&self, category: Category, text: &str) -> bool {
        self.first_match(category, text).is_some()
    }

    /// 所有命中规则的标签，同义规则重复命中是预期行为
    pub fn matching_labels(&self, category: Category, text: &str) -> Vec<String> {
        self.rules(category)
            .iter()
            .filter(|rule| rule.is_match(text))
            .map(|rule| rule.label.clone())
            .collect()
    }

    /// 文本是否包含行政类指示词（账单、保险、人口信息等）
    pub fn is_administrative(&self, text: &str) -> bool {
        let lower = text.trim().to_lowercase();
        self.administrative_indicators
            .iter()
            .any(|indicator| lower.contains(indicator.as_str()))
    }

    /// 该章节关闭时是否需要做后续内容探测
    pub fn is_targeted(&self, label: &str) -> bool {
        self.targeted_sections.iter().any(|s| s == label)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn target_sections(&self) -> &[String] {
        &self.target_sections
    }

    pub fn stop_boundary_keywords(&self) -> &[String] {
        &self.stop_keywords
    }

    pub fn targeted_sections(&self) -> &[String] {
        &self.targeted_sections
    }

    pub fn administrative_indicators(&self) -> &[String] {
        &self.administrative_indicators
    }

    pub fn sensitive_rules(&self) -> Vec<SensitiveRuleInfo> {
        self.sensitive
            .iter()
            .map(|rule| SensitiveRuleInfo {
                label: rule.label.clone(),
                group: rule.group.clone().unwrap_or_default(),
                pattern: rule.source.clone(),
            })
            .collect()
    }
}
