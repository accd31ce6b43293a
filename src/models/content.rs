//! 解析后的链接内容
//!
//! 每个链接对应一个 `Resolution`：成功时携带 `ResolvedContent`，
//! 失败时是 `Unavailable` 占位，答案计算器照常消费

use crate::models::table::Table;
use crate::models::task::Link;

/// 内容类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Text,
    Table,
    BinaryUnsupported,
}

/// 内容载荷
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Table(Table),
    /// 不支持解码的二进制内容（音频、图片等），附原因
    Unsupported(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedContent {
    pub source: Link,
    pub payload: Payload,
}

impl ResolvedContent {
    pub fn text(source: Link, text: impl Into<String>) -> Self {
        Self {
            source,
            payload: Payload::Text(text.into()),
        }
    }

    pub fn table(source: Link, table: Table) -> Self {
        Self {
            source,
            payload: Payload::Table(table),
        }
    }

    pub fn unsupported(source: Link, reason: impl Into<String>) -> Self {
        Self {
            source,
            payload: Payload::Unsupported(reason.into()),
        }
    }

    pub fn kind(&self) -> ContentKind {
        match self.payload {
            Payload::Text(_) => ContentKind::Text,
            Payload::Table(_) => ContentKind::Table,
            Payload::Unsupported(_) => ContentKind::BinaryUnsupported,
        }
    }
}

/// 单个链接的解析结果
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Resolved(ResolvedContent),
    Unavailable { link: Link, reason: String },
}

impl Resolution {
    pub fn link(&self) -> &Link {
        match self {
            Resolution::Resolved(content) => &content.source,
            Resolution::Unavailable { link, .. } => link,
        }
    }

    pub fn table(&self) -> Option<&Table> {
        match self {
            Resolution::Resolved(ResolvedContent {
                payload: Payload::Table(table),
                ..
            }) => Some(table),
            _ => None,
        }
    }

    /// 内容缺失或无法解码
    pub fn is_degraded(&self) -> bool {
        match self {
            Resolution::Resolved(content) => content.kind() == ContentKind::BinaryUnsupported,
            Resolution::Unavailable { .. } => true,
        }
    }
}
