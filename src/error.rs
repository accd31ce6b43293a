use thiserror::Error;

use crate::models::{AnswerFormat, FailureKind};

/// 应用程序错误类型
///
/// 除 `LinkResolution` 外，所有错误对当前步骤都是致命的，
/// 由流程层统一转换为 `FinalOutcome::Incomplete`
#[derive(Debug, Error)]
pub enum QuizError {
    /// 页面渲染失败
    #[error("页面渲染失败 ({url}): {message}")]
    RenderFailure { url: String, message: String },

    /// 结构化提取缺少必填字段
    #[error("任务字段提取不完整，缺少: {}", .missing.join(", "))]
    ExtractionIncomplete { missing: Vec<&'static str> },

    /// 主备 LLM 均失败
    #[error("LLM 推理不可用: {}", format_failures(.failures))]
    ReasoningUnavailable { failures: Vec<LlmError> },

    /// 单个链接解析失败，只在数据解析器内部出现，会被转为占位内容
    #[error("链接解析失败 ({url}): {reason}")]
    LinkResolution { url: String, reason: String },

    /// 答案无法规整为要求的格式
    #[error("答案格式不匹配 (期望 {expected}): {detail}")]
    AnswerFormatMismatch {
        expected: AnswerFormat,
        detail: String,
    },

    /// 提交接口返回非 2xx 或无法解析的响应
    #[error("答案提交失败 ({url}, 状态码: {status:?}): {message}")]
    SubmissionFailure {
        url: String,
        status: Option<u16>,
        message: String,
    },

    /// 配置错误
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// 单个 LLM 提供方的失败
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    #[error("[{provider}] 调用超时 ({secs} 秒)")]
    Timeout { provider: String, secs: u64 },

    #[error("[{provider}] API 调用失败: {message}")]
    RequestFailed { provider: String, message: String },

    #[error("[{provider}] 返回内容为空")]
    EmptyContent { provider: String },

    /// 返回文本无法按期望的结构解析
    #[error("[{provider}] 返回内容无法解析: {message}")]
    Malformed { provider: String, message: String },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("配置项 {name} 不能为空")]
    Missing { name: &'static str },

    #[error("无法读取配置文件 {path}: {message}")]
    FileUnreadable { path: String, message: String },

    #[error("配置文件 {path} 解析失败: {message}")]
    FileInvalid { path: String, message: String },

    #[error("无法初始化 {component}: {message}")]
    ClientInit {
        component: &'static str,
        message: String,
    },
}

fn format_failures(failures: &[LlmError]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// ========== 便捷构造函数 ==========

impl QuizError {
    pub fn render_failed(url: impl Into<String>, message: impl ToString) -> Self {
        QuizError::RenderFailure {
            url: url.into(),
            message: message.to_string(),
        }
    }

    pub fn link_failed(url: impl Into<String>, reason: impl ToString) -> Self {
        QuizError::LinkResolution {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn format_mismatch(expected: AnswerFormat, detail: impl Into<String>) -> Self {
        QuizError::AnswerFormatMismatch {
            expected,
            detail: detail.into(),
        }
    }

    pub fn submission_failed(
        url: impl Into<String>,
        status: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        QuizError::SubmissionFailure {
            url: url.into(),
            status,
            message: message.into(),
        }
    }

    /// 对外结果中使用的失败类别
    pub fn kind(&self) -> FailureKind {
        match self {
            QuizError::RenderFailure { .. } => FailureKind::RenderFailure,
            QuizError::ExtractionIncomplete { .. } => FailureKind::ExtractionIncomplete,
            QuizError::ReasoningUnavailable { .. } => FailureKind::ReasoningUnavailable,
            // 链接失败不应逃出数据解析器，兜底归入提取类
            QuizError::LinkResolution { .. } => FailureKind::ExtractionIncomplete,
            QuizError::AnswerFormatMismatch { .. } => FailureKind::AnswerFormatMismatch,
            QuizError::SubmissionFailure { .. } => FailureKind::SubmissionFailure,
            QuizError::Config(_) => FailureKind::Configuration,
        }
    }
}

impl LlmError {
    pub fn provider(&self) -> &str {
        match self {
            LlmError::Timeout { provider, .. }
            | LlmError::RequestFailed { provider, .. }
            | LlmError::EmptyContent { provider }
            | LlmError::Malformed { provider, .. } => provider,
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, QuizError>;
