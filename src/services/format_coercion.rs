//! 答案格式规整
//!
//! 每种 `AnswerFormat` 对应一条规整规则。规则是幂等的：
//! 已经规整过的值再规整一次保持不变

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Number, Value as JsonValue};

use crate::error::{AppResult, QuizError};
use crate::models::table::parse_numeric_cell;
use crate::models::AnswerFormat;
use crate::services::tabular::round_to;

type CoercionRule = fn(JsonValue, Option<u32>) -> Result<JsonValue, String>;

/// 格式 → 规整规则
fn rule_for(format: AnswerFormat) -> CoercionRule {
    match format {
        AnswerFormat::Text => coerce_text,
        AnswerFormat::Number => coerce_number,
        AnswerFormat::Json => coerce_json,
        AnswerFormat::List => coerce_list,
    }
}

/// 把值规整为目标格式，失败时返回 `AnswerFormatMismatch`
pub fn coerce(
    value: JsonValue,
    format: AnswerFormat,
    precision: Option<u32>,
) -> AppResult<JsonValue> {
    rule_for(format)(value, precision).map_err(|detail| QuizError::format_mismatch(format, detail))
}

/// 内容缺失时的最低置信度答案
pub fn fallback_value(format: AnswerFormat) -> JsonValue {
    match format {
        AnswerFormat::Text => JsonValue::String("unknown".to_string()),
        AnswerFormat::Number => JsonValue::from(0),
        AnswerFormat::Json => JsonValue::Object(Default::default()),
        AnswerFormat::List => JsonValue::Array(Vec::new()),
    }
}

fn coerce_text(value: JsonValue, _: Option<u32>) -> Result<JsonValue, String> {
    match value {
        JsonValue::String(s) => Ok(JsonValue::String(s.trim().to_string())),
        JsonValue::Number(n) => Ok(JsonValue::String(n.to_string())),
        JsonValue::Bool(b) => Ok(JsonValue::String(b.to_string())),
        JsonValue::Null => Err("答案为空".to_string()),
        other => Ok(JsonValue::String(other.to_string())),
    }
}

fn coerce_number(value: JsonValue, precision: Option<u32>) -> Result<JsonValue, String> {
    let number = match &value {
        JsonValue::Number(n) => {
            if precision.is_none() && n.is_i64() {
                return Ok(value);
            }
            n.as_f64().ok_or_else(|| format!("无法表示的数字: {}", n))?
        }
        JsonValue::String(s) => parse_number_text(s)?,
        other => return Err(format!("不是数字: {}", other)),
    };
    number_value(number, precision)
}

/// 解析数字文本，容忍千分位和货币符号；文本中只有一个数字时也接受
fn parse_number_text(text: &str) -> Result<f64, String> {
    if let Some(n) = parse_numeric_cell(text) {
        return Ok(n);
    }

    static NUMBER: OnceLock<Option<Regex>> = OnceLock::new();
    let re = NUMBER
        .get_or_init(|| Regex::new(r"-?\d[\d,]*(?:\.\d+)?|-?\.\d+").ok())
        .as_ref()
        .ok_or("数字表达式初始化失败")?;

    let found: Vec<f64> = re
        .find_iter(text)
        .filter_map(|m| parse_numeric_cell(m.as_str()))
        .collect();
    match found.as_slice() {
        [only] => Ok(*only),
        [] => Err(format!("文本中没有数字: {}", text.trim())),
        _ => Err(format!("文本中有多个数字: {}", text.trim())),
    }
}

/// 按精度取整，整数值输出为 JSON 整数
fn number_value(number: f64, precision: Option<u32>) -> Result<JsonValue, String> {
    if !number.is_finite() {
        return Err(format!("不是有限数字: {}", number));
    }
    let rounded = match precision {
        Some(p) => round_to(number, p),
        None => number,
    };
    if rounded.fract() == 0.0 && rounded.abs() < 9.0e15 {
        return Ok(JsonValue::from(rounded as i64));
    }
    Number::from_f64(rounded)
        .map(JsonValue::Number)
        .ok_or_else(|| format!("不是有限数字: {}", rounded))
}

fn coerce_json(value: JsonValue, _: Option<u32>) -> Result<JsonValue, String> {
    match value {
        JsonValue::String(s) => parse_embedded_json(&s),
        JsonValue::Null => Err("答案为空".to_string()),
        other => Ok(other),
    }
}

fn coerce_list(value: JsonValue, _: Option<u32>) -> Result<JsonValue, String> {
    match value {
        JsonValue::Array(_) => Ok(value),
        JsonValue::String(s) => {
            let trimmed = s.trim();
            if trimmed.starts_with('[') || trimmed.starts_with("```") {
                match parse_embedded_json(trimmed)? {
                    array @ JsonValue::Array(_) => Ok(array),
                    other => Err(format!("不是列表: {}", other)),
                }
            } else if trimmed.is_empty() {
                Err("答案为空".to_string())
            } else {
                // 逗号分隔的纯文本列表
                Ok(JsonValue::Array(
                    trimmed
                        .split(',')
                        .map(|item| JsonValue::String(item.trim().to_string()))
                        .filter(|item| item.as_str().is_some_and(|s| !s.is_empty()))
                        .collect(),
                ))
            }
        }
        other => Err(format!("不是列表: {}", other)),
    }
}

fn parse_embedded_json(text: &str) -> Result<JsonValue, String> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.trim_end().trim_end_matches("```"))
        .unwrap_or(trimmed);
    serde_json::from_str(body.trim()).map_err(|e| format!("不是合法 JSON: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_is_trimmed() {
        assert_eq!(
            coerce(json!("  Paris \n"), AnswerFormat::Text, None).unwrap(),
            json!("Paris")
        );
        assert_eq!(coerce(json!(42), AnswerFormat::Text, None).unwrap(), json!("42"));
    }

    #[test]
    fn test_number_parsing_and_rounding() {
        assert_eq!(coerce(json!("4"), AnswerFormat::Number, None).unwrap(), json!(4));
        assert_eq!(coerce(json!(4.0), AnswerFormat::Number, None).unwrap(), json!(4));
        assert_eq!(
            coerce(json!("$1,234.5"), AnswerFormat::Number, None).unwrap(),
            json!(1234.5)
        );
        assert_eq!(
            coerce(json!("The answer is 12"), AnswerFormat::Number, None).unwrap(),
            json!(12)
        );
        assert_eq!(
            coerce(json!(3.14159), AnswerFormat::Number, Some(2)).unwrap(),
            json!(3.14)
        );
    }

    #[test]
    fn test_number_mismatch() {
        let err = coerce(json!("between 3 and 5"), AnswerFormat::Number, None).unwrap_err();
        assert!(matches!(
            err,
            QuizError::AnswerFormatMismatch {
                expected: AnswerFormat::Number,
                ..
            }
        ));
        assert!(coerce(json!(true), AnswerFormat::Number, None).is_err());
    }

    #[test]
    fn test_json_and_list_structures() {
        assert_eq!(
            coerce(json!("```json\n{\"a\": 1}\n```"), AnswerFormat::Json, None).unwrap(),
            json!({"a": 1})
        );
        assert!(coerce(json!("not json"), AnswerFormat::Json, None).is_err());
        assert_eq!(
            coerce(json!("[1, 2, 3]"), AnswerFormat::List, None).unwrap(),
            json!([1, 2, 3])
        );
        assert_eq!(
            coerce(json!("red, green"), AnswerFormat::List, None).unwrap(),
            json!(["red", "green"])
        );
        assert!(coerce(json!("[1, 2"), AnswerFormat::List, None).is_err());
        assert!(coerce(json!({"a": 1}), AnswerFormat::List, None).is_err());
    }

    #[test]
    fn test_coercion_is_idempotent() {
        let cases = [
            (json!("  hello "), AnswerFormat::Text, None),
            (json!("1,024.256"), AnswerFormat::Number, Some(2)),
            (json!(7), AnswerFormat::Number, None),
            (json!("{\"k\": [1, 2]}"), AnswerFormat::Json, None),
            (json!("a, b"), AnswerFormat::List, None),
        ];
        for (value, format, precision) in cases {
            let once = coerce(value, format, precision).unwrap();
            let twice = coerce(once.clone(), format, precision).unwrap();
            assert_eq!(once, twice, "{format} not idempotent");
        }
    }

    #[test]
    fn test_fallback_values_satisfy_their_format() {
        for format in [
            AnswerFormat::Text,
            AnswerFormat::Number,
            AnswerFormat::Json,
            AnswerFormat::List,
        ] {
            let value = fallback_value(format);
            assert_eq!(coerce(value.clone(), format, None).unwrap(), value);
        }
    }
}
