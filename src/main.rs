use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use quiz_solver::utils::logging;
use quiz_solver::{build_renderer, Config, FinalOutcome, LlmGateway, QuizFlow};
use tracing::error;

/// 用法: quiz_solver [起始 URL]
///
/// 配置文件路径来自 `QUIZ_CONFIG`，其余配置见 `Config::with_env`
#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::var_os("QUIZ_CONFIG").map(PathBuf::from);
    let config = Config::load(config_path.as_deref()).context("加载配置失败")?;

    // 初始化日志
    logging::init(config.verbose_logging);

    config.validate().context("配置不完整")?;

    let start_url = std::env::args()
        .nth(1)
        .or_else(|| config.start_url.clone())
        .context("缺少起始题目 URL（命令行参数或 QUIZ_START_URL）")?;

    logging::log_startup(&config, &start_url);

    let outcome = match build_renderer(&config).await {
        Ok(renderer) => {
            let gateway = Arc::new(LlmGateway::from_config(&config));
            let flow = QuizFlow::new(&config, renderer, gateway)?;
            flow.run(&start_url, &config.quiz_email).await
        }
        Err(e) => {
            error!("❌ 渲染器初始化失败: {}", e);
            FinalOutcome::incomplete(e.kind(), e.to_string())
        }
    };

    println!("{}", serde_json::to_string(&outcome)?);
    Ok(())
}
