//! # Quiz Solver
//!
//! 自动完成多步在线测验：渲染题目页面 → 提取任务 → 获取引用数据 →
//! 计算答案 → 提交，响应给出下一题时继续，直到完成、出错或超出时间/步数限制
//!
//! ## 架构设计
//!
//! ### ① 基础设施层（Infrastructure）
//! - `browser/` - 页面渲染能力（Browserless 远程渲染 / 本地无头浏览器）
//! - `infrastructure/` - `JsExecutor`，唯一的 page owner
//!
//! ### ② 客户端层（Clients）
//! - `LlmClient` - OpenAI 兼容的 chat completions 客户端
//! - `QuizClient` - 答题服务器提交客户端
//!
//! ### ③ 业务能力层（Services）
//! - `LlmGateway` - 主备 LLM 回退
//! - `FieldExtractor` - 任务描述提取
//! - `DataResolver` - 链接内容解析
//! - `AnswerComputer` - 答案计算与格式规整
//!
//! ### ④ 流程层（Workflow）
//! - `StepState` / `advance` - 显式状态机
//! - `QuizFlow` - 答题循环

pub mod browser;
pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use browser::{build_renderer, PageRenderer};
pub use config::Config;
pub use error::{AppResult, QuizError};
pub use models::{FinalOutcome, StepResult, TaskDescriptor};
pub use services::LlmGateway;
pub use workflow::{QuizFlow, QuizReport};
