//! 数据解析 - 业务能力层
//!
//! 每个链接独立解析为一个 `Resolution`。单个链接失败只会变成
//! `Resolution::Unavailable` 占位，不会中断当前步骤

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, info, warn};

use crate::browser::PageRenderer;
use crate::error::{AppResult, ConfigError, QuizError};
use crate::models::{Link, LinkKind, Resolution, ResolvedContent};
use crate::services::field_extractor::extension_mime;
use crate::services::tabular;
use crate::utils::logging::truncate_text;

/// html2text 的换行宽度
const TEXT_WIDTH: usize = 120;

/// 文件解码方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileType {
    Csv,
    Tsv,
    Html,
    Text,
    Pdf,
    Binary,
}

impl FileType {
    fn from_mime(mime: &str) -> Option<Self> {
        let mime = mime
            .split(';')
            .next()
            .unwrap_or(mime)
            .trim()
            .to_ascii_lowercase();
        let file_type = match mime.as_str() {
            "text/csv" | "application/csv" => FileType::Csv,
            "text/tab-separated-values" => FileType::Tsv,
            "text/html" | "application/xhtml+xml" => FileType::Html,
            "application/pdf" => FileType::Pdf,
            "application/json" | "application/xml" | "text/xml" => FileType::Text,
            m if m.starts_with("text/") => FileType::Text,
            m if m.starts_with("audio/")
                || m.starts_with("image/")
                || m.starts_with("video/")
                || m.starts_with("application/") =>
            {
                FileType::Binary
            }
            _ => return None,
        };
        Some(file_type)
    }
}

pub struct DataResolver {
    http: reqwest::Client,
    /// 设置后网页链接先经过渲染（内容由 JS 生成的页面）
    renderer: Option<Arc<dyn PageRenderer>>,
    max_content_chars: usize,
}

impl DataResolver {
    pub fn new(
        renderer: Option<Arc<dyn PageRenderer>>,
        timeout: Duration,
        max_content_chars: usize,
    ) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::ClientInit {
                component: "resolver http client",
                message: e.to_string(),
            })?;
        Ok(Self {
            http,
            renderer,
            max_content_chars,
        })
    }

    /// 并发解析全部链接，结果顺序与输入一致
    pub async fn resolve_all(&self, links: &[Link]) -> Vec<Resolution> {
        join_all(links.iter().map(|link| self.resolve(link))).await
    }

    /// 解析单个链接，失败转为 `Unavailable`
    pub async fn resolve(&self, link: &Link) -> Resolution {
        match self.try_resolve(link).await {
            Ok(content) => {
                info!("✓ 已解析 {} ({:?})", link.url, content.kind());
                Resolution::Resolved(content)
            }
            Err(e) => {
                warn!("⚠️ {}", e);
                let reason = match e {
                    QuizError::LinkResolution { reason, .. } => reason,
                    other => other.to_string(),
                };
                Resolution::Unavailable {
                    link: link.clone(),
                    reason,
                }
            }
        }
    }

    async fn try_resolve(&self, link: &Link) -> AppResult<ResolvedContent> {
        match link.kind {
            LinkKind::Webpage => self.resolve_webpage(link).await,
            LinkKind::File => self.resolve_file(link).await,
        }
    }

    async fn resolve_webpage(&self, link: &Link) -> AppResult<ResolvedContent> {
        let html = match &self.renderer {
            Some(renderer) => renderer
                .render(&link.url)
                .await
                .map_err(|e| QuizError::link_failed(&link.url, e))?,
            None => {
                let (bytes, _) = self.fetch(&link.url).await?;
                String::from_utf8_lossy(&bytes).into_owned()
            }
        };
        Ok(self.content_from_html(link, &html))
    }

    async fn resolve_file(&self, link: &Link) -> AppResult<ResolvedContent> {
        let (bytes, content_type) = self.fetch(&link.url).await?;

        let file_type = link
            .mime_hint
            .as_deref()
            .and_then(FileType::from_mime)
            .or_else(|| extension_mime(&link.url).and_then(FileType::from_mime))
            .or_else(|| content_type.as_deref().and_then(FileType::from_mime))
            .unwrap_or(FileType::Text);
        debug!("{} 按 {:?} 解码 ({} 字节)", link.url, file_type, bytes.len());

        let content = match file_type {
            FileType::Csv | FileType::Tsv => {
                let delimiter = if file_type == FileType::Tsv { b'\t' } else { b',' };
                let text = String::from_utf8_lossy(&bytes);
                let table = tabular::parse_delimited(&text, delimiter)
                    .map_err(|e| QuizError::link_failed(&link.url, e))?;
                ResolvedContent::table(link.clone(), table)
            }
            FileType::Html => self.content_from_html(link, &String::from_utf8_lossy(&bytes)),
            FileType::Text => ResolvedContent::text(
                link.clone(),
                truncate_text(&String::from_utf8_lossy(&bytes), self.max_content_chars),
            ),
            FileType::Pdf => self.content_from_pdf(link, bytes).await,
            FileType::Binary => {
                let mime = link
                    .mime_hint
                    .clone()
                    .or(content_type)
                    .unwrap_or_else(|| "unknown".to_string());
                ResolvedContent::unsupported(
                    link.clone(),
                    format!("不支持的文件类型: {}", mime),
                )
            }
        };
        Ok(content)
    }

    /// 页面中有表格时取表格；没有表格但正文是数字网格时合成 `value` 表；
    /// 否则去掉标签转为纯文本
    fn content_from_html(&self, link: &Link, html: &str) -> ResolvedContent {
        if let Some(table) = tabular::parse_html_table(html) {
            return ResolvedContent::table(link.clone(), table);
        }
        let text = html2text::from_read(html.as_bytes(), TEXT_WIDTH);
        if let Some(table) = tabular::numeric_grid_table(&text) {
            debug!("{} 没有 <table>，按数字网格合成 {} 行", link.url, table.rows.len());
            return ResolvedContent::table(link.clone(), table);
        }
        ResolvedContent::text(
            link.clone(),
            truncate_text(text.trim(), self.max_content_chars),
        )
    }

    /// PDF 文本提取在阻塞线程上执行，解析库 panic 也只影响这一个链接
    async fn content_from_pdf(&self, link: &Link, bytes: Vec<u8>) -> ResolvedContent {
        let extracted =
            tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes)).await;

        match extracted {
            Ok(Ok(text)) if !text.trim().is_empty() => ResolvedContent::text(
                link.clone(),
                truncate_text(text.trim(), self.max_content_chars),
            ),
            Ok(Ok(_)) => {
                ResolvedContent::unsupported(link.clone(), "PDF 中没有可提取的文本")
            }
            Ok(Err(e)) => {
                ResolvedContent::unsupported(link.clone(), format!("PDF 解析失败: {}", e))
            }
            Err(e) => {
                ResolvedContent::unsupported(link.clone(), format!("PDF 解析中断: {}", e))
            }
        }
    }

    async fn fetch(&self, url: &str) -> AppResult<(Vec<u8>, Option<String>)> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| QuizError::link_failed(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(QuizError::link_failed(url, format!("HTTP {}", status)));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| QuizError::link_failed(url, e))?;
        Ok((bytes.to_vec(), content_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type_from_mime() {
        assert_eq!(FileType::from_mime("text/csv; charset=utf-8"), Some(FileType::Csv));
        assert_eq!(
            FileType::from_mime("text/tab-separated-values"),
            Some(FileType::Tsv)
        );
        assert_eq!(FileType::from_mime("application/pdf"), Some(FileType::Pdf));
        assert_eq!(FileType::from_mime("text/plain"), Some(FileType::Text));
        assert_eq!(FileType::from_mime("application/json"), Some(FileType::Text));
        assert_eq!(FileType::from_mime("audio/mpeg"), Some(FileType::Binary));
        assert_eq!(FileType::from_mime("nonsense"), None);
    }

    #[test]
    fn test_html_without_table_becomes_text() {
        let resolver = DataResolver::new(None, Duration::from_secs(1), 20).unwrap();
        let content = resolver.content_from_html(
            &Link::webpage("https://x/y"),
            "<html><body><h1>Secret</h1><p>code 4821 and some more words</p></body></html>",
        );
        match content.payload {
            crate::models::Payload::Text(text) => {
                assert!(text.contains("Secret"));
                assert!(text.chars().count() <= 23);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_html_numeric_grid_becomes_table() {
        let resolver = DataResolver::new(None, Duration::from_secs(1), 200).unwrap();
        let content = resolver.content_from_html(
            &Link::webpage("https://x/grid"),
            "<html><body><div>10 20 30</div><div>40 50</div></body></html>",
        );
        match content.payload {
            crate::models::Payload::Table(table) => {
                assert_eq!(table.columns, vec!["value"]);
                assert_eq!(table.numeric_values(0).iter().sum::<f64>(), 150.0);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }
}
