use std::path::Path;

use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::browser::PageRenderer;
use crate::config::RendererConfig;
use crate::error::{AppResult, QuizError};
use crate::infrastructure::JsExecutor;

/// 本地无头浏览器渲染器
///
/// 只开一个页面，渲染请求串行排队
pub struct HeadlessRenderer {
    _browser: Browser,
    executor: Mutex<JsExecutor>,
}

impl HeadlessRenderer {
    /// 启动无头浏览器并打开一个空白页面
    pub async fn launch(config: &RendererConfig) -> AppResult<Self> {
        info!("🚀 启动无头浏览器...");

        let mut builder = BrowserConfig::builder().new_headless_mode().args(vec![
            "--disable-gpu",
            "--no-sandbox",
            "--disable-dev-shm-usage",
            "--remote-debugging-port=0",
        ]);
        if let Some(executable) = &config.chrome_executable {
            debug!("使用浏览器: {}", executable);
            builder = builder.chrome_executable(Path::new(executable));
        }
        let browser_config = builder.build().map_err(|e| {
            error!("配置无头浏览器失败: {}", e);
            QuizError::render_failed("about:blank", format!("配置无头浏览器失败: {}", e))
        })?;

        let (browser, mut handler) = Browser::launch(browser_config).await.map_err(|e| {
            error!("启动无头浏览器失败: {}", e);
            QuizError::render_failed("about:blank", format!("启动无头浏览器失败: {}", e))
        })?;
        debug!("无头浏览器启动成功");

        // 在后台处理浏览器事件
        tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        // 等待浏览器状态同步
        sleep(tokio::time::Duration::from_millis(300)).await;

        let page = browser.new_page("about:blank").await.map_err(|e| {
            error!("创建页面失败: {}", e);
            QuizError::render_failed("about:blank", format!("创建页面失败: {}", e))
        })?;

        info!("✅ 无头浏览器已就绪");
        Ok(Self {
            _browser: browser,
            executor: Mutex::new(JsExecutor::new(page)),
        })
    }
}

#[async_trait]
impl PageRenderer for HeadlessRenderer {
    async fn render(&self, url: &str) -> AppResult<String> {
        let executor = self.executor.lock().await;
        executor
            .goto(url)
            .await
            .map_err(|e| QuizError::render_failed(url, e))?;
        let html = executor
            .outer_html()
            .await
            .map_err(|e| QuizError::render_failed(url, e))?;
        debug!("渲染完成 {} ({} 字节)", url, html.len());
        Ok(html)
    }
}
