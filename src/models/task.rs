//! 任务描述模型
//!
//! 一道题的结构化描述：题干、提交地址、答案格式和引用的链接

use serde::{Deserialize, Serialize};
use std::fmt;

/// 答案格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerFormat {
    Text,
    Number,
    Json,
    List,
}

/// 格式别名表，LLM 返回的格式描述五花八门，统一映射到四种格式
static FORMAT_ALIASES: phf::Map<&'static str, AnswerFormat> = phf::phf_map! {
    "text" => AnswerFormat::Text,
    "string" => AnswerFormat::Text,
    "str" => AnswerFormat::Text,
    "word" => AnswerFormat::Text,
    "url" => AnswerFormat::Text,
    "number" => AnswerFormat::Number,
    "numeric" => AnswerFormat::Number,
    "integer" => AnswerFormat::Number,
    "int" => AnswerFormat::Number,
    "float" => AnswerFormat::Number,
    "decimal" => AnswerFormat::Number,
    "json" => AnswerFormat::Json,
    "object" => AnswerFormat::Json,
    "dict" => AnswerFormat::Json,
    "boolean" => AnswerFormat::Json,
    "bool" => AnswerFormat::Json,
    "list" => AnswerFormat::List,
    "array" => AnswerFormat::List,
};

impl AnswerFormat {
    /// 解析格式描述，如 "integer"、"JSON object"、"number (2 decimals)"
    ///
    /// 无法识别时返回 `None`，由调用方决定默认值
    pub fn parse(raw: &str) -> Option<Self> {
        let lowered = raw.trim().to_lowercase();
        if let Some(format) = FORMAT_ALIASES.get(lowered.as_str()) {
            return Some(*format);
        }

        // 逐词查找，取第一个能识别的词
        lowered
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|word| !word.is_empty())
            .find_map(|word| FORMAT_ALIASES.get(word).copied())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerFormat::Text => "text",
            AnswerFormat::Number => "number",
            AnswerFormat::Json => "json",
            AnswerFormat::List => "list",
        }
    }
}

impl fmt::Display for AnswerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 链接类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    Webpage,
    File,
}

/// 题目引用的链接
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub url: String,
    pub kind: LinkKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_hint: Option<String>,
}

impl Link {
    pub fn webpage(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind: LinkKind::Webpage,
            mime_hint: None,
        }
    }

    pub fn file(url: impl Into<String>, mime_hint: Option<String>) -> Self {
        Self {
            url: url.into(),
            kind: LinkKind::File,
            mime_hint,
        }
    }
}

/// 任务描述
///
/// 每一步由字段提取器生成一次，创建后不再修改
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskDescriptor {
    pub question_text: String,
    pub submit_url: String,
    pub answer_format: AnswerFormat,
    /// 数字答案要求的小数位数
    pub precision: Option<u32>,
    pub referenced_links: Vec<Link>,
}
