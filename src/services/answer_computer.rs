//! 答案计算 - 业务能力层
//!
//! 表格聚合题直接在表格上计算；其余题目把题干和解析后的内容交给 LLM 推理，
//! 最后统一按要求的格式规整

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use crate::error::{AppResult, QuizError};
use crate::models::{Answer, AnswerFormat, Payload, Resolution, TaskDescriptor};
use crate::services::format_coercion::{coerce, fallback_value};
use crate::services::llm_gateway::LlmGateway;
use crate::services::tabular;

const SYSTEM_MESSAGE: &str = "You solve data quiz questions exactly. \
    Reply with one JSON object of the form {\"answer\": <value>} and nothing else.";

/// 提示词中每张表展示的行数
const PREVIEW_ROWS: usize = 50;

#[derive(Debug, Deserialize)]
struct ReasonedAnswer {
    #[serde(default)]
    answer: Option<JsonValue>,
}

pub struct AnswerComputer {
    gateway: Arc<LlmGateway>,
}

impl AnswerComputer {
    pub fn new(gateway: Arc<LlmGateway>) -> Self {
        Self { gateway }
    }

    pub async fn compute(
        &self,
        descriptor: &TaskDescriptor,
        resolutions: &[Resolution],
    ) -> AppResult<Answer> {
        let format = descriptor.answer_format;

        if let Some(value) = compute_tabular(descriptor, resolutions) {
            let value = coerce(value, format, descriptor.precision)?;
            info!("🧮 表格直接计算得到答案: {}", value);
            return Ok(Answer::new(value, format));
        }

        let prompt = build_prompt(descriptor, resolutions);
        debug!("推理提示词长度: {} 字符", prompt.len());
        let reply: ReasonedAnswer = self.gateway.complete(&prompt, Some(SYSTEM_MESSAGE)).await?;

        let value = match reply.answer {
            Some(value) if !value.is_null() => value,
            _ if resolutions.iter().any(Resolution::is_degraded) => {
                warn!("⚠️ 部分内容不可用且模型没有给出答案，使用兜底答案");
                fallback_value(format)
            }
            _ => {
                return Err(QuizError::format_mismatch(format, "模型没有给出答案"));
            }
        };

        let value = coerce(value, format, descriptor.precision)?;
        info!("💡 推理得到答案: {}", value);
        Ok(Answer::new(value, format))
    }
}

/// 表格聚合题的直接计算：题干能识别出聚合方式且能在某张表上定位到列
fn compute_tabular(descriptor: &TaskDescriptor, resolutions: &[Resolution]) -> Option<JsonValue> {
    if !matches!(
        descriptor.answer_format,
        AnswerFormat::Number | AnswerFormat::Text
    ) {
        return None;
    }

    resolutions
        .iter()
        .filter_map(Resolution::table)
        .find_map(|table| {
            let query = tabular::plan(&descriptor.question_text, table)?;
            debug!("表格查询: {:?}", query);
            tabular::execute(table, &query)
        })
        .and_then(|result| serde_json::Number::from_f64(result).map(JsonValue::Number))
}

fn build_prompt(descriptor: &TaskDescriptor, resolutions: &[Resolution]) -> String {
    let mut prompt = format!(
        "Question:\n{}\n\nRequired answer format: {}",
        descriptor.question_text, descriptor.answer_format
    );
    if let Some(precision) = descriptor.precision {
        prompt.push_str(&format!(" (round to {} decimal places)", precision));
    }
    prompt.push_str(format_hint(descriptor.answer_format));

    for (index, resolution) in resolutions.iter().enumerate() {
        prompt.push_str(&format!(
            "\n\n--- Source {} ({}) ---\n",
            index + 1,
            resolution.link().url
        ));
        match resolution {
            Resolution::Resolved(content) => match &content.payload {
                Payload::Text(text) => prompt.push_str(text),
                Payload::Table(table) => {
                    prompt.push_str(&table.preview(PREVIEW_ROWS));
                    let summaries = table.summaries();
                    if !summaries.is_empty() {
                        prompt.push_str("\nExact column statistics (use these, do not recompute):");
                        for s in summaries {
                            prompt.push_str(&format!(
                                "\n- {}: count={}, sum={}, mean={}, min={}, max={}",
                                s.column, s.count, s.sum, s.mean, s.min, s.max
                            ));
                        }
                    }
                }
                Payload::Unsupported(reason) => {
                    prompt.push_str(&format!("[content unsupported: {}]", reason));
                }
            },
            Resolution::Unavailable { reason, .. } => {
                prompt.push_str(&format!("[content unavailable: {}]", reason));
            }
        }
    }

    prompt.push_str(
        "\n\nIf the sources are insufficient, give your best answer anyway. \
         Return ONLY {\"answer\": <value>}.",
    );
    prompt
}

fn format_hint(format: AnswerFormat) -> &'static str {
    match format {
        AnswerFormat::Text => "\nThe answer value must be a JSON string.",
        AnswerFormat::Number => "\nThe answer value must be a JSON number, without units.",
        AnswerFormat::Json => "\nThe answer value must be a JSON object or value, not a string.",
        AnswerFormat::List => "\nThe answer value must be a JSON array.",
    }
}
