/// 答题服务器客户端
///
/// 每一步只提交一次答案，失败不重试（重复提交可能在服务器端产生副作用）
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use crate::error::{AppResult, ConfigError, QuizError};
use crate::models::{Answer, StepResult};

/// 提交请求体
#[derive(Debug, Serialize)]
struct SubmitPayload<'a> {
    email: &'a str,
    secret: &'a str,
    /// 正在作答的题目页面
    url: &'a str,
    answer: &'a JsonValue,
}

/// 提交响应体
///
/// 终止：`{"correct": true}` / `{"correct": false, "reason": "..."}`；
/// 继续：`{"url": "<下一题>"}`，可能同时带有 `correct` 和 `reason`
#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    correct: Option<bool>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

pub struct QuizClient {
    http: reqwest::Client,
    secret: String,
}

impl QuizClient {
    pub fn new(secret: impl Into<String>, timeout: Duration) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::ClientInit {
                component: "quiz http client",
                message: e.to_string(),
            })?;
        Ok(Self {
            http,
            secret: secret.into(),
        })
    }

    /// 提交答案并解释响应
    pub async fn submit(
        &self,
        submit_url: &str,
        email: &str,
        page_url: &str,
        answer: &Answer,
    ) -> AppResult<StepResult> {
        let payload = SubmitPayload {
            email,
            secret: &self.secret,
            url: page_url,
            answer: &answer.value,
        };
        info!("📤 提交答案到 {}: {}", submit_url, answer.value);

        let response = self
            .http
            .post(submit_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| QuizError::submission_failed(submit_url, None, e.to_string()))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            QuizError::submission_failed(submit_url, Some(status.as_u16()), e.to_string())
        })?;
        debug!("提交响应 ({}): {}", status, body);

        if !status.is_success() {
            warn!("提交接口返回 {}", status);
            return Err(QuizError::submission_failed(
                submit_url,
                Some(status.as_u16()),
                body,
            ));
        }

        let parsed: SubmitResponse = serde_json::from_str(&body).map_err(|e| {
            QuizError::submission_failed(
                submit_url,
                Some(status.as_u16()),
                format!("响应不是合法 JSON: {}", e),
            )
        })?;

        interpret_response(parsed, page_url, &answer.value).ok_or_else(|| {
            QuizError::submission_failed(
                submit_url,
                Some(status.as_u16()),
                format!("响应既没有 correct 也没有 url: {}", body),
            )
        })
    }
}

fn interpret_response(
    response: SubmitResponse,
    page_url: &str,
    answer: &JsonValue,
) -> Option<StepResult> {
    let next_url = response.url.filter(|url| !url.trim().is_empty());
    if response.correct.is_none() && next_url.is_none() {
        return None;
    }
    Some(StepResult {
        page_url: page_url.to_string(),
        answer_submitted: answer.clone(),
        correct: response.correct,
        reason: response.reason,
        next_url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(body: JsonValue) -> Option<StepResult> {
        let response: SubmitResponse = serde_json::from_value(body).unwrap();
        interpret_response(response, "https://quiz/1", &json!(4))
    }

    #[test]
    fn test_terminal_correct() {
        let result = parse(json!({"status": "completed", "correct": true})).unwrap();
        assert_eq!(result.correct, Some(true));
        assert!(result.is_terminal());
    }

    #[test]
    fn test_continuation_with_reason_keeps_next_url() {
        let result = parse(json!({
            "correct": false,
            "reason": "off by one",
            "url": "https://quiz/2"
        }))
        .unwrap();
        assert_eq!(result.next_url.as_deref(), Some("https://quiz/2"));
        assert_eq!(result.reason.as_deref(), Some("off by one"));
        assert!(!result.is_terminal());
    }

    #[test]
    fn test_empty_url_is_terminal() {
        let result = parse(json!({"correct": true, "url": ""})).unwrap();
        assert!(result.is_terminal());
    }

    #[test]
    fn test_unrecognised_body_is_rejected() {
        assert!(parse(json!({"message": "ok"})).is_none());
    }
}
