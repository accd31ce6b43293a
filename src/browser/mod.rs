pub mod browserless;
pub mod headless;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::config::Config;
use crate::error::AppResult;

pub use browserless::BrowserlessRenderer;
pub use headless::HeadlessRenderer;

/// 页面渲染能力：给定 URL，返回执行完 JavaScript 后的 HTML
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &str) -> AppResult<String>;
}

/// 配置了 Browserless token 时使用远程渲染，否则启动本地无头浏览器
pub async fn build_renderer(config: &Config) -> AppResult<Arc<dyn PageRenderer>> {
    match &config.renderer.browserless_token {
        Some(token) => {
            info!("🌐 使用 Browserless 渲染: {}", config.renderer.browserless_base_url);
            let renderer = BrowserlessRenderer::new(
                &config.renderer.browserless_base_url,
                token,
                Duration::from_secs(config.request_timeout_secs),
            )?;
            Ok(Arc::new(renderer))
        }
        None => Ok(Arc::new(HeadlessRenderer::launch(&config.renderer).await?)),
    }
}
