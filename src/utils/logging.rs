/// 日志工具模块
///
/// 提供日志初始化、格式化和输出的辅助函数
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::models::{FinalOutcome, QuizSession};

/// 初始化 tracing 日志
///
/// 优先使用 `RUST_LOG`，否则按 `verbose` 选择 debug 或 info
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // 测试中可能重复初始化
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(config: &Config, start_url: &str) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 自动答题模式");
    info!("🔗 起始题目: {}", start_url);
    info!("📧 邮箱: {}", config.quiz_email);
    info!(
        "⏱️ 时间预算: {} 秒 | 最多 {} 步",
        config.time_budget_secs, config.max_steps
    );
    info!(
        "🤖 LLM: {} ({}) → {} ({})",
        config.primary_llm.name,
        config.primary_llm.model_name,
        config.fallback_llm.name,
        config.fallback_llm.model_name
    );
    info!("{}", "=".repeat(60));
}

/// 记录步骤开始信息
pub fn log_step_start(step: usize, url: &str) {
    info!("\n{}", "─".repeat(60));
    info!("[步骤 {}] 📄 {}", step, url);
    info!("{}", "─".repeat(60));
}

/// 打印最终统计信息
pub fn print_final_stats(session: &QuizSession, outcome: &FinalOutcome) {
    let elapsed = chrono::Local::now() - session.started_at();
    let answered_correctly = session
        .history()
        .iter()
        .filter(|step| step.correct == Some(true))
        .count();

    info!("\n{}", "=".repeat(60));
    info!("📊 答题完成统计");
    info!("🔗 起始题目: {}", session.start_url());
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("耗时: {} 秒", elapsed.num_seconds());
    info!("{}", "=".repeat(60));
    for (index, step) in session.history().iter().enumerate() {
        let mark = match step.correct {
            Some(true) => "✅",
            Some(false) => "❌",
            None => "➖",
        };
        info!(
            "{} 第 {} 步: {} → {}{}",
            mark,
            index + 1,
            truncate_text(&step.page_url, 60),
            step.answer_submitted,
            step.reason
                .as_deref()
                .map(|r| format!(" ({})", r))
                .unwrap_or_default()
        );
    }
    info!(
        "✅ 正确: {}/{}",
        answered_correctly,
        session.step_count()
    );
    let mark = if outcome.is_success() { "🎉" } else { "🏁" };
    info!("{} 结果: {}", mark, outcome_summary(outcome));
    info!("{}", "=".repeat(60));
}

fn outcome_summary(outcome: &FinalOutcome) -> String {
    serde_json::to_string(outcome).unwrap_or_else(|_| format!("{:?}", outcome))
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
