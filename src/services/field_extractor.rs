//! 字段提取 - 业务能力层
//!
//! 把渲染后的题目页面交给 LLM，提取题干、提交地址、答案格式和引用链接，
//! 再把相对链接规整为绝对地址

use std::sync::Arc;

use reqwest::Url;
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::{debug, info};

use crate::error::{AppResult, QuizError};
use crate::models::{AnswerFormat, Link, LinkKind, TaskDescriptor};
use crate::services::llm_gateway::LlmGateway;
use crate::utils::logging::truncate_text;

const SYSTEM_MESSAGE: &str = "You extract structured task information from quiz web pages. \
    Reply with one JSON object only: no Markdown, no code fences, no explanations.";

/// 按扩展名识别的文件类型及对应的 MIME 提示
const FILE_EXTENSIONS: &[(&str, &str)] = &[
    ("csv", "text/csv"),
    ("tsv", "text/tab-separated-values"),
    ("txt", "text/plain"),
    ("md", "text/markdown"),
    ("json", "application/json"),
    ("xml", "application/xml"),
    ("pdf", "application/pdf"),
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("ogg", "audio/ogg"),
    ("opus", "audio/opus"),
    ("m4a", "audio/mp4"),
    ("flac", "audio/flac"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("xlsx", "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
    ("xls", "application/vnd.ms-excel"),
    ("zip", "application/zip"),
];

/// LLM 返回的提取结果
#[derive(Debug, Default, Deserialize)]
pub struct RawExtraction {
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub submit_url: Option<String>,
    #[serde(default)]
    pub answer_format: Option<String>,
    /// 可能是数字、数字字符串或 null
    #[serde(default)]
    pub precision: Option<JsonValue>,
    #[serde(default, alias = "file_urls")]
    pub links: Option<Vec<RawLink>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RawLink {
    Url(String),
    Detailed {
        url: String,
        #[serde(default)]
        kind: Option<String>,
        #[serde(default, alias = "mime_hint")]
        mime: Option<String>,
    },
}

pub struct FieldExtractor {
    gateway: Arc<LlmGateway>,
    max_page_chars: usize,
}

impl FieldExtractor {
    pub fn new(gateway: Arc<LlmGateway>, max_page_chars: usize) -> Self {
        Self {
            gateway,
            max_page_chars,
        }
    }

    /// 从渲染后的页面提取任务描述
    pub async fn extract(&self, rendered_html: &str, page_url: &str) -> AppResult<TaskDescriptor> {
        let prompt = build_prompt(rendered_html, self.max_page_chars);
        let raw: RawExtraction = self.gateway.complete(&prompt, Some(SYSTEM_MESSAGE)).await?;
        debug!("提取结果: {:?}", raw);

        let descriptor = build_descriptor(raw, rendered_html, page_url)?;
        info!(
            "📝 题目: {} | 格式: {} | 链接: {} 个",
            truncate_text(&descriptor.question_text, 80),
            descriptor.answer_format,
            descriptor.referenced_links.len()
        );
        Ok(descriptor)
    }
}

fn build_prompt(html: &str, max_chars: usize) -> String {
    let html: String = html.chars().take(max_chars).collect();
    format!(
        r#"Extract the following from this rendered HTML quiz page:
- question: the full question / instruction text the solver must answer, verbatim
- submit_url: the URL the answer must be POSTed to
- answer_format: one of "text", "number", "json", "list"
- precision: number of decimal places required for a numeric answer, or null
- links: every file or web page the question refers to (data files, pages to scrape,
  audio, PDFs), each as {{"url": "...", "kind": "file" | "webpage", "mime": "<mime type or null>"}}

Return VALID JSON ONLY with exactly these keys:
question, submit_url, answer_format, precision, links.

HTML:
{}"#,
        html
    )
}

/// 校验必填字段并规整链接，缺少题干或提交地址时返回 `ExtractionIncomplete`
pub fn build_descriptor(
    raw: RawExtraction,
    rendered_html: &str,
    page_url: &str,
) -> AppResult<TaskDescriptor> {
    let question = raw.question.map(|q| q.trim().to_string()).filter(|q| !q.is_empty());
    let submit_url = raw
        .submit_url
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty());

    let mut missing = Vec::new();
    if question.is_none() {
        missing.push("question");
    }
    if submit_url.is_none() {
        missing.push("submit_url");
    }
    let (Some(question_text), Some(submit_url)) = (question, submit_url) else {
        return Err(QuizError::ExtractionIncomplete { missing });
    };

    let base = base_url(rendered_html, page_url);
    let submit_url = absolutize(base.as_ref(), &submit_url)
        .filter(is_http)
        .map(String::from)
        .ok_or(QuizError::ExtractionIncomplete {
            missing: vec!["submit_url"],
        })?;

    let answer_format = raw
        .answer_format
        .as_deref()
        .and_then(AnswerFormat::parse)
        .unwrap_or(AnswerFormat::Text);

    let mut links: Vec<Link> = Vec::new();
    let candidates = raw
        .links
        .unwrap_or_default()
        .into_iter()
        .map(|link| match link {
            RawLink::Url(url) => (url, None, None),
            RawLink::Detailed { url, kind, mime } => (url, kind, mime),
        })
        .chain(
            page_file_links(rendered_html)
                .into_iter()
                .map(|url| (url, None, None)),
        );

    for (url, kind, mime) in candidates {
        let Some(absolute) = absolutize(base.as_ref(), url.trim()).filter(is_http) else {
            continue;
        };
        let absolute = String::from(absolute);
        if absolute == submit_url || links.iter().any(|l| l.url == absolute) {
            continue;
        }
        links.push(classify_link(absolute, kind.as_deref(), mime));
    }

    Ok(TaskDescriptor {
        question_text,
        submit_url,
        answer_format,
        precision: raw.precision.as_ref().and_then(parse_precision),
        referenced_links: links,
    })
}

/// 页面中 `<base href>` 优先，否则用页面地址
fn base_url(html: &str, page_url: &str) -> Option<Url> {
    let page = Url::parse(page_url).ok();
    let document = Html::parse_document(html);
    let declared = Selector::parse("base[href]").ok().and_then(|selector| {
        document
            .select(&selector)
            .next()
            .and_then(|base| base.value().attr("href"))
            .map(str::to_string)
    });

    match (declared, page) {
        (Some(href), Some(page)) => page.join(&href).ok().or(Some(page)),
        (Some(href), None) => Url::parse(&href).ok(),
        (None, page) => page,
    }
}

fn absolutize(base: Option<&Url>, raw: &str) -> Option<Url> {
    if raw.is_empty() {
        return None;
    }
    match base {
        Some(base) => base.join(raw).ok(),
        None => Url::parse(raw).ok(),
    }
}

fn is_http(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

/// 页面里直接指向文件的链接（`<a href>`、`<audio src>` 等），补充 LLM 可能漏掉的附件
fn page_file_links(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("a[href], audio[src], source[src], embed[src]") else {
        return Vec::new();
    };
    document
        .select(&selector)
        .filter_map(|el| el.value().attr("href").or_else(|| el.value().attr("src")))
        .filter(|href| extension_mime(href).is_some())
        .map(str::to_string)
        .collect()
}

/// 按 URL 路径的扩展名查 MIME
pub fn extension_mime(url: &str) -> Option<&'static str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let file_name = path.rsplit('/').next()?;
    let (_, ext) = file_name.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    FILE_EXTENSIONS
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, mime)| *mime)
}

fn classify_link(url: String, kind: Option<&str>, mime: Option<String>) -> Link {
    let mime = mime
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty() && m != "null");
    let inferred_mime = extension_mime(&url);

    let kind = match kind.map(|k| k.trim().to_lowercase()) {
        Some(k) if k == "file" => LinkKind::File,
        Some(k) if k == "webpage" || k == "page" || k == "web" => LinkKind::Webpage,
        _ if inferred_mime.is_some() || mime.is_some() => LinkKind::File,
        _ => LinkKind::Webpage,
    };

    match kind {
        LinkKind::File => Link::file(url, mime.or(inferred_mime.map(str::to_string))),
        LinkKind::Webpage => Link::webpage(url),
    }
}

fn parse_precision(value: &JsonValue) -> Option<u32> {
    match value {
        JsonValue::Number(n) => n.as_u64().map(|p| p.min(15) as u32),
        JsonValue::String(s) => s.trim().parse::<u32>().ok().map(|p| p.min(15)),
        _ => None,
    }
}
