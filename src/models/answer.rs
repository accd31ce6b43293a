use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::models::task::AnswerFormat;

/// 计算出的答案，`value` 已按 `format` 规整，提交时原样序列化
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub value: JsonValue,
    pub format: AnswerFormat,
}

impl Answer {
    pub fn new(value: JsonValue, format: AnswerFormat) -> Self {
        Self { value, format }
    }
}
