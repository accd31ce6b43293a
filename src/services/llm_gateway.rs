//! LLM 网关 - 业务能力层
//!
//! 统一的 `complete(prompt) → 结构化结果` 接口。按顺序尝试主、备两个推理后端：
//! 超时、接口报错、空返回、返回内容无法按期望结构解析，都视为该后端失败并转向下一个。
//! 全部失败时返回一次 `ReasoningUnavailable`，不做无限重试

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::clients::{ChatProvider, LlmClient};
use crate::config::Config;
use crate::error::{AppResult, LlmError, QuizError};
use crate::utils::logging::truncate_text;

/// 后端在偏好列表中的角色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderRole {
    Primary,
    Fallback,
}

impl fmt::Display for ProviderRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderRole::Primary => f.write_str("主"),
            ProviderRole::Fallback => f.write_str("备用"),
        }
    }
}

pub struct LlmGateway {
    providers: Vec<(ProviderRole, Arc<dyn ChatProvider>)>,
    timeout: Duration,
}

impl LlmGateway {
    pub fn new(
        primary: Arc<dyn ChatProvider>,
        fallback: Option<Arc<dyn ChatProvider>>,
        timeout: Duration,
    ) -> Self {
        let mut providers = vec![(ProviderRole::Primary, primary)];
        if let Some(fallback) = fallback {
            providers.push((ProviderRole::Fallback, fallback));
        }
        Self { providers, timeout }
    }

    /// 按配置创建 OpenAI 兼容的主备客户端，备用后端没有 key 时不启用
    pub fn from_config(config: &Config) -> Self {
        let primary: Arc<dyn ChatProvider> = Arc::new(LlmClient::new(&config.primary_llm));
        let fallback = if config.fallback_llm.api_key.trim().is_empty() {
            warn!("⚠️ 未配置备用 LLM 的 API key，主后端失败时将直接放弃");
            None
        } else {
            Some(Arc::new(LlmClient::new(&config.fallback_llm)) as Arc<dyn ChatProvider>)
        };
        Self::new(
            primary,
            fallback,
            Duration::from_secs(config.llm_timeout_secs),
        )
    }

    /// 发送提示词并把返回文本解析为 `T`
    pub async fn complete<T: DeserializeOwned>(
        &self,
        prompt: &str,
        system_message: Option<&str>,
    ) -> AppResult<T> {
        let mut failures = Vec::new();

        for (role, provider) in &self.providers {
            match self.attempt::<T>(provider.as_ref(), prompt, system_message).await {
                Ok(value) => {
                    if !failures.is_empty() {
                        info!("✓ {}后端 [{}] 接管成功", role, provider.name());
                    }
                    return Ok(value);
                }
                Err(e) => {
                    warn!("{}后端失败: {}", role, e);
                    failures.push(e);
                }
            }
        }

        Err(QuizError::ReasoningUnavailable { failures })
    }

    async fn attempt<T: DeserializeOwned>(
        &self,
        provider: &dyn ChatProvider,
        prompt: &str,
        system_message: Option<&str>,
    ) -> Result<T, LlmError> {
        let raw = timeout(self.timeout, provider.chat(prompt, system_message))
            .await
            .map_err(|_| LlmError::Timeout {
                provider: provider.name().to_string(),
                secs: self.timeout.as_secs(),
            })??;

        debug!("[{}] 原始返回: {}", provider.name(), truncate_text(&raw, 300));

        parse_structured(&raw).map_err(|message| LlmError::Malformed {
            provider: provider.name().to_string(),
            message,
        })
    }
}

/// 解析 LLM 返回的 JSON：去掉 Markdown 代码块，必要时截取最外层的对象或数组
pub fn parse_structured<T: DeserializeOwned>(raw: &str) -> Result<T, String> {
    let cleaned = strip_code_fence(raw);

    let first_error = match serde_json::from_str::<T>(cleaned) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (cleaned.find(open), cleaned.rfind(close)) {
            if start < end {
                if let Ok(value) = serde_json::from_str::<T>(&cleaned[start..=end]) {
                    return Ok(value);
                }
            }
        }
    }

    Err(format!(
        "{} (原文: {})",
        first_error,
        truncate_text(raw.trim(), 120)
    ))
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // 跳过语言标记（```json）
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end().trim_end_matches("```").trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Deserialize, PartialEq)]
    struct Reply {
        answer: i64,
    }

    /// 按固定脚本返回的后端，记录被调用次数
    struct Scripted {
        name: &'static str,
        reply: Result<&'static str, ()>,
        delay: Option<Duration>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn ok(name: &'static str, reply: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                reply: Ok(reply),
                delay: None,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                reply: Err(()),
                delay: None,
                calls: AtomicUsize::new(0),
            })
        }

        fn slow(name: &'static str, reply: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                reply: Ok(reply),
                delay: Some(Duration::from_secs(5)),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ChatProvider for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        async fn chat(&self, _: &str, _: Option<&str>) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.reply
                .map(str::to_string)
                .map_err(|_| LlmError::RequestFailed {
                    provider: self.name.to_string(),
                    message: "HTTP 500".into(),
                })
        }
    }

    fn gateway(primary: Arc<Scripted>, fallback: Arc<Scripted>) -> LlmGateway {
        LlmGateway::new(
            primary,
            Some(fallback as Arc<dyn ChatProvider>),
            Duration::from_millis(200),
        )
    }

    #[tokio::test]
    async fn test_primary_success_skips_fallback() {
        let primary = Scripted::ok("primary", r#"{"answer": 1}"#);
        let fallback = Scripted::ok("fallback", r#"{"answer": 2}"#);
        let reply: Reply = gateway(primary.clone(), fallback.clone())
            .complete("q", None)
            .await
            .unwrap();
        assert_eq!(reply, Reply { answer: 1 });
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_transport_failure_falls_back() {
        let primary = Scripted::failing("primary");
        let fallback = Scripted::ok("fallback", r#"{"answer": 2}"#);
        let reply: Reply = gateway(primary, fallback).complete("q", None).await.unwrap();
        assert_eq!(reply.answer, 2);
    }

    #[tokio::test]
    async fn test_malformed_output_falls_back() {
        let primary = Scripted::ok("primary", "I think the answer is two");
        let fallback = Scripted::ok("fallback", "```json\n{\"answer\": 2}\n```");
        let reply: Reply = gateway(primary, fallback).complete("q", None).await.unwrap();
        assert_eq!(reply.answer, 2);
    }

    #[tokio::test]
    async fn test_timeout_falls_back() {
        let primary = Scripted::slow("primary", r#"{"answer": 1}"#);
        let fallback = Scripted::ok("fallback", r#"{"answer": 2}"#);
        let reply: Reply = gateway(primary, fallback).complete("q", None).await.unwrap();
        assert_eq!(reply.answer, 2);
    }

    #[tokio::test]
    async fn test_both_failing_is_reported_once() {
        let primary = Scripted::failing("primary");
        let fallback = Scripted::ok("fallback", "not json");
        let err = gateway(primary.clone(), fallback.clone())
            .complete::<Reply>("q", None)
            .await
            .unwrap_err();

        match err {
            QuizError::ReasoningUnavailable { failures } => {
                assert_eq!(failures.len(), 2);
                assert!(matches!(failures[0], LlmError::RequestFailed { .. }));
                assert!(matches!(failures[1], LlmError::Malformed { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_parse_structured_tolerates_chatter() {
        let reply: Reply =
            parse_structured("Sure! Here it is:\n{\"answer\": 7}\nHope that helps.").unwrap();
        assert_eq!(reply.answer, 7);
        assert!(parse_structured::<Reply>("no json here").is_err());
    }
}
