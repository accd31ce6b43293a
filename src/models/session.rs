//! 答题会话模型
//!
//! `QuizSession` 是唯一跨步骤存活的实体，其余模型都只在单步内使用

use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::time::Instant;

/// 一步的提交结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepResult {
    /// 本步作答的题目页面
    pub page_url: String,
    pub answer_submitted: JsonValue,
    pub correct: Option<bool>,
    pub reason: Option<String>,
    pub next_url: Option<String>,
}

impl StepResult {
    pub fn is_terminal(&self) -> bool {
        self.next_url.is_none()
    }
}

/// 答题会话
///
/// `step_count` 只能通过 `record` 递增；`deadline` 创建后不可修改
#[derive(Debug, Clone)]
pub struct QuizSession {
    start_url: String,
    email: String,
    step_count: usize,
    deadline: Instant,
    started_at: DateTime<Local>,
    history: Vec<StepResult>,
}

impl QuizSession {
    pub fn new(start_url: impl Into<String>, email: impl Into<String>, deadline: Instant) -> Self {
        Self {
            start_url: start_url.into(),
            email: email.into(),
            step_count: 0,
            deadline,
            started_at: Local::now(),
            history: Vec::new(),
        }
    }

    pub fn start_url(&self) -> &str {
        &self.start_url
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn step_count(&self) -> usize {
        self.step_count
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    pub fn history(&self) -> &[StepResult] {
        &self.history
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }

    /// 追加一步结果
    pub fn record(&mut self, result: StepResult) {
        self.step_count += 1;
        self.history.push(result);
    }
}

/// 非正常结束的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    RenderFailure,
    ExtractionIncomplete,
    ReasoningUnavailable,
    AnswerFormatMismatch,
    SubmissionFailure,
    Configuration,
    DeadlineExceeded,
    StepLimitExceeded,
}

/// 最终结果，序列化后即对外返回的 JSON
///
/// - `{"status":"completed","correct":true}`
/// - `{"status":"completed","correct":false,"reason":"..."}`
/// - `{"status":"incomplete","error":"deadline_exceeded","reason":"..."}`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum FinalOutcome {
    Completed {
        correct: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    Incomplete {
        error: FailureKind,
        reason: String,
    },
}

impl FinalOutcome {
    pub fn correct() -> Self {
        FinalOutcome::Completed {
            correct: true,
            reason: None,
        }
    }

    pub fn incorrect(reason: Option<String>) -> Self {
        FinalOutcome::Completed {
            correct: false,
            reason,
        }
    }

    pub fn incomplete(error: FailureKind, reason: impl Into<String>) -> Self {
        FinalOutcome::Incomplete {
            error,
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FinalOutcome::Completed { correct: true, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outcome_json_shapes() {
        assert_eq!(
            serde_json::to_value(FinalOutcome::correct()).unwrap(),
            json!({"status": "completed", "correct": true})
        );
        assert_eq!(
            serde_json::to_value(FinalOutcome::incorrect(Some("wrong format".into()))).unwrap(),
            json!({"status": "completed", "correct": false, "reason": "wrong format"})
        );
        assert_eq!(
            serde_json::to_value(FinalOutcome::incomplete(
                FailureKind::StepLimitExceeded,
                "limit"
            ))
            .unwrap(),
            json!({"status": "incomplete", "error": "step_limit_exceeded", "reason": "limit"})
        );
    }

    #[test]
    fn test_record_increments_step_count() {
        let mut session = QuizSession::new("https://q/1", "a@b.c", Instant::now());
        session.record(StepResult {
            page_url: "https://q/1".into(),
            answer_submitted: json!(1),
            correct: Some(true),
            reason: None,
            next_url: None,
        });
        assert_eq!(session.step_count(), 1);
        assert!(session.history()[0].is_terminal());
    }
}
