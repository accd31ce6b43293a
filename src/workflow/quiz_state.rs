//! 答题状态机
//!
//! `StepState` 记录"正在处理哪个会话的哪一题"。每步提交后由纯函数
//! `advance` 决定继续还是结束，步数和截止时间的限制都在这里判断

use std::fmt::Display;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::error::QuizError;
use crate::models::{FailureKind, FinalOutcome, QuizSession, StepResult};

/// 会话级限制
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_steps: usize,
    pub time_budget: Duration,
}

impl Limits {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_steps: config.max_steps,
            time_budget: Duration::from_secs(config.time_budget_secs),
        }
    }
}

/// 当前步骤状态
#[derive(Debug, Clone)]
pub struct StepState {
    pub session: QuizSession,
    pub current_url: String,
}

impl StepState {
    /// 新会话，从起始 URL 开始，截止时间固定为 `now + time_budget`
    pub fn start(start_url: &str, email: &str, limits: &Limits, now: Instant) -> Self {
        Self {
            session: QuizSession::new(start_url, email, now + limits.time_budget),
            current_url: start_url.to_string(),
        }
    }

    /// 即将执行的步骤编号（从 1 开始）
    pub fn next_step(&self) -> usize {
        self.session.step_count() + 1
    }
}

impl Display for StepState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[步骤 {}]", self.next_step())
    }
}

/// 一步之后的去向
#[derive(Debug)]
pub enum Transition {
    Continue(StepState),
    Finished {
        outcome: FinalOutcome,
        session: QuizSession,
    },
}

/// 记录一步结果并决定下一步
///
/// 响应中有下一题 URL 时优先继续（即使本题答错），除非已超时或达到步数上限
pub fn advance(state: StepState, result: StepResult, now: Instant, limits: &Limits) -> Transition {
    let StepState { mut session, .. } = state;
    let next_url = result.next_url.clone();
    let correct = result.correct;
    let reason = result.reason.clone();
    session.record(result);

    match next_url {
        Some(_) if session.is_expired(now) => Transition::Finished {
            outcome: FinalOutcome::incomplete(
                FailureKind::DeadlineExceeded,
                format!("时间预算已用完，已完成 {} 步", session.step_count()),
            ),
            session,
        },
        Some(_) if session.step_count() >= limits.max_steps => Transition::Finished {
            outcome: FinalOutcome::incomplete(
                FailureKind::StepLimitExceeded,
                format!("已达到最大步数 {}", limits.max_steps),
            ),
            session,
        },
        Some(url) => Transition::Continue(StepState {
            session,
            current_url: url,
        }),
        None if correct == Some(true) => Transition::Finished {
            outcome: FinalOutcome::correct(),
            session,
        },
        None => Transition::Finished {
            outcome: FinalOutcome::incorrect(reason),
            session,
        },
    }
}

/// 步骤内的错误终止会话
pub fn abort(state: StepState, error: &QuizError) -> Transition {
    Transition::Finished {
        outcome: FinalOutcome::incomplete(error.kind(), error.to_string()),
        session: state.session,
    }
}
