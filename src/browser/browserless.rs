use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use crate::browser::PageRenderer;
use crate::error::{AppResult, ConfigError, QuizError};

/// Browserless 远程渲染器
///
/// POST `{base}/content?token=...`，请求体 `{"url": ...}`，响应即执行完 JS 的 HTML
pub struct BrowserlessRenderer {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl BrowserlessRenderer {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::ClientInit {
                component: "browserless client",
                message: e.to_string(),
            })?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }
}

#[async_trait]
impl PageRenderer for BrowserlessRenderer {
    async fn render(&self, url: &str) -> AppResult<String> {
        let endpoint = format!("{}/content", self.base_url);
        debug!("Browserless 渲染: {}", url);

        let response = self
            .http
            .post(&endpoint)
            .query(&[("token", self.token.as_str())])
            .json(&json!({ "url": url }))
            .send()
            .await
            .map_err(|e| QuizError::render_failed(url, e))?;

        let status = response.status();
        if !status.is_success() {
            warn!("Browserless 返回 {} ({})", status, url);
            return Err(QuizError::render_failed(
                url,
                format!("渲染服务返回 {}", status),
            ));
        }

        response
            .text()
            .await
            .map_err(|e| QuizError::render_failed(url, e))
    }
}
