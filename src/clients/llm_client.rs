//! LLM API 客户端
//!
//! 封装 OpenAI 兼容的 chat completions 调用。网关只依赖 `ChatProvider`
//! 能力，测试中可以换成脚本化的实现

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::ProviderConfig;
use crate::error::LlmError;

/// 推理后端能力：发送一条提示词，返回原始文本
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// 日志和错误中显示的名称
    fn name(&self) -> &str;

    async fn chat(&self, user_message: &str, system_message: Option<&str>)
        -> Result<String, LlmError>;
}

/// OpenAI 兼容接口的 LLM 客户端（DeepSeek、AI Pipe 等）
pub struct LlmClient {
    name: String,
    client: Client<OpenAIConfig>,
    model_name: String,
}

impl LlmClient {
    pub fn new(config: &ProviderConfig) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.api_key)
            .with_api_base(&config.api_base_url);

        Self {
            name: config.name.clone(),
            client: Client::with_config(openai_config),
            model_name: config.model_name.clone(),
        }
    }

    fn request_failed(&self, message: impl ToString) -> LlmError {
        LlmError::RequestFailed {
            provider: self.name.clone(),
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl ChatProvider for LlmClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat(
        &self,
        user_message: &str,
        system_message: Option<&str>,
    ) -> Result<String, LlmError> {
        debug!("[{}] 调用 LLM API，模型: {}", self.name, self.model_name);
        debug!("[{}] 用户消息长度: {} 字符", self.name, user_message.len());

        let mut messages = Vec::new();

        if let Some(sys_msg) = system_message {
            let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(sys_msg)
                .build()
                .map_err(|e| self.request_failed(e))?;
            messages.push(ChatCompletionRequestMessage::System(system_msg));
        }

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(user_message)
            .build()
            .map_err(|e| self.request_failed(e))?;
        messages.push(ChatCompletionRequestMessage::User(user_msg));

        // 结构化输出需要稳定，温度压低
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(messages)
            .temperature(0.0)
            .max_tokens(2048u32)
            .build()
            .map_err(|e| self.request_failed(e))?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("[{}] LLM API 调用失败: {}", self.name, e);
            self.request_failed(e)
        })?;

        debug!("[{}] LLM API 调用成功", self.name);

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| LlmError::EmptyContent {
                provider: self.name.clone(),
            })?;

        Ok(content)
    }
}
