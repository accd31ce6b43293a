//! 答题流程 - 流程层
//!
//! 核心职责：驱动整个答题会话
//!
//! 每一步的顺序：
//! 1. 渲染当前题目页面
//! 2. LLM 提取任务描述
//! 3. 解析引用的链接（单个失败不影响整体）
//! 4. 计算答案（表格直接计算 / LLM 推理）
//! 5. 提交，并由状态机决定继续还是结束

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::browser::PageRenderer;
use crate::clients::QuizClient;
use crate::config::Config;
use crate::error::AppResult;
use crate::models::{FinalOutcome, QuizSession, StepResult};
use crate::services::{AnswerComputer, DataResolver, FieldExtractor, LlmGateway};
use crate::utils::logging;
use crate::workflow::quiz_state::{abort, advance, Limits, StepState, Transition};

/// 答题会话的最终报告
#[derive(Debug)]
pub struct QuizReport {
    pub outcome: FinalOutcome,
    pub session: QuizSession,
}

/// 答题流程
///
/// - 编排渲染 → 提取 → 解析 → 计算 → 提交
/// - 只依赖业务能力（services）和客户端，不关心它们的实现
/// - 任何步骤错误都转为结构化的最终结果，不向调用方抛出
pub struct QuizFlow {
    renderer: Arc<dyn PageRenderer>,
    extractor: FieldExtractor,
    resolver: DataResolver,
    computer: AnswerComputer,
    client: QuizClient,
    limits: Limits,
}

impl QuizFlow {
    pub fn new(
        config: &Config,
        renderer: Arc<dyn PageRenderer>,
        gateway: Arc<LlmGateway>,
    ) -> AppResult<Self> {
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let linked_renderer = config
            .renderer
            .render_linked_pages
            .then(|| Arc::clone(&renderer));

        Ok(Self {
            extractor: FieldExtractor::new(Arc::clone(&gateway), config.max_page_chars),
            resolver: DataResolver::new(linked_renderer, timeout, config.max_content_chars)?,
            computer: AnswerComputer::new(gateway),
            client: QuizClient::new(&config.quiz_secret, timeout)?,
            limits: Limits::from_config(config),
            renderer,
        })
    }

    /// 从起始 URL 开始答题，直到完成、出错或超出限制
    pub async fn run(&self, start_url: &str, email: &str) -> FinalOutcome {
        self.run_session(start_url, email).await.outcome
    }

    /// 与 `run` 相同，额外返回会话历史
    pub async fn run_session(&self, start_url: &str, email: &str) -> QuizReport {
        let mut state = StepState::start(start_url, email, &self.limits, Instant::now());

        loop {
            let step = state.next_step();
            logging::log_step_start(step, &state.current_url);

            let transition = match self.run_step(&state).await {
                Ok(result) => {
                    log_step_result(step, &result);
                    advance(state, result, Instant::now(), &self.limits)
                }
                Err(e) => {
                    error!("[步骤 {}] ❌ {}", step, e);
                    abort(state, &e)
                }
            };

            match transition {
                Transition::Continue(next) => state = next,
                Transition::Finished { outcome, session } => {
                    logging::print_final_stats(&session, &outcome);
                    return QuizReport { outcome, session };
                }
            }
        }
    }

    /// 执行一步：渲染 → 提取 → 解析 → 计算 → 提交
    async fn run_step(&self, state: &StepState) -> AppResult<StepResult> {
        let url = &state.current_url;

        let html = self.renderer.render(url).await?;
        info!("{} 页面渲染完成 ({} 字节)", state, html.len());

        let descriptor = self.extractor.extract(&html, url).await?;

        let resolutions = self.resolver.resolve_all(&descriptor.referenced_links).await;
        let unavailable = resolutions.iter().filter(|r| r.is_degraded()).count();
        if unavailable > 0 {
            warn!(
                "{} ⚠️ {}/{} 个链接内容不可用，继续使用其余内容",
                state,
                unavailable,
                resolutions.len()
            );
        }

        let answer = self.computer.compute(&descriptor, &resolutions).await?;

        self.client
            .submit(&descriptor.submit_url, state.session.email(), url, &answer)
            .await
    }
}

fn log_step_result(step: usize, result: &StepResult) {
    match (result.correct, &result.next_url) {
        (Some(true), _) => info!("[步骤 {}] ✅ 回答正确", step),
        (Some(false), _) => warn!(
            "[步骤 {}] ❌ 回答错误: {}",
            step,
            result.reason.as_deref().unwrap_or("(无原因)")
        ),
        (None, _) => info!("[步骤 {}] ➖ 服务器未给出判定", step),
    }
    if let Some(next) = &result.next_url {
        info!("[步骤 {}] ➡️ 下一题: {}", step, next);
    }
}
