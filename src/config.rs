use serde::{Deserialize, Deserializer};
use std::path::Path;

use crate::error::ConfigError;

/// 单个 LLM 提供方配置（OpenAI 兼容接口）
#[derive(Clone, Debug)]
pub struct ProviderConfig {
    /// 日志中显示的名称
    pub name: String,
    pub api_key: String,
    pub api_base_url: String,
    pub model_name: String,
}

/// 页面渲染配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// 设置后使用 Browserless 远程渲染，否则启动本地无头浏览器
    pub browserless_token: Option<String>,
    pub browserless_base_url: String,
    /// 本地 Chrome/Edge 可执行文件路径，不设置时由 chromiumoxide 自动查找
    pub chrome_executable: Option<String>,
    /// 题目引用的网页是否也经过渲染（页面内容由 JS 生成时需要）
    pub render_linked_pages: bool,
}

/// 程序配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 提交答案时使用的邮箱
    pub quiz_email: String,
    /// 提交答案时附带的密钥
    pub quiz_secret: String,
    /// 起始题目 URL（也可通过命令行参数传入）
    pub start_url: Option<String>,
    /// 最多答题步数
    pub max_steps: usize,
    /// 整个会话的时间预算（秒）
    pub time_budget_secs: u64,
    /// 普通 HTTP 请求超时（秒）
    pub request_timeout_secs: u64,
    /// 单次 LLM 调用超时（秒）
    pub llm_timeout_secs: u64,
    /// 提取提示词中 HTML 的最大字符数
    pub max_page_chars: usize,
    /// 单个链接内容的最大字符数
    pub max_content_chars: usize,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    // --- LLM 配置 ---
    // 配置文件中只写部分字段时，其余字段取各自角色的默认值
    #[serde(deserialize_with = "primary_provider")]
    pub primary_llm: ProviderConfig,
    #[serde(deserialize_with = "fallback_provider")]
    pub fallback_llm: ProviderConfig,
    // --- 渲染配置 ---
    pub renderer: RendererConfig,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: "deepseek".to_string(),
            api_key: String::new(),
            api_base_url: "https://api.deepseek.com".to_string(),
            model_name: "deepseek-chat".to_string(),
        }
    }
}

/// 配置文件中的提供方字段，未写的保持 `None`
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProviderOverrides {
    name: Option<String>,
    api_key: Option<String>,
    api_base_url: Option<String>,
    model_name: Option<String>,
}

impl ProviderOverrides {
    fn apply(self, base: ProviderConfig) -> ProviderConfig {
        ProviderConfig {
            name: self.name.unwrap_or(base.name),
            api_key: self.api_key.unwrap_or(base.api_key),
            api_base_url: self.api_base_url.unwrap_or(base.api_base_url),
            model_name: self.model_name.unwrap_or(base.model_name),
        }
    }
}

fn primary_provider<'de, D: Deserializer<'de>>(d: D) -> Result<ProviderConfig, D::Error> {
    Ok(ProviderOverrides::deserialize(d)?.apply(ProviderConfig::default()))
}

fn fallback_provider<'de, D: Deserializer<'de>>(d: D) -> Result<ProviderConfig, D::Error> {
    Ok(ProviderOverrides::deserialize(d)?.apply(ProviderConfig::default_fallback()))
}

impl ProviderConfig {
    fn default_fallback() -> Self {
        Self {
            name: "aipipe".to_string(),
            api_key: String::new(),
            api_base_url: "https://api.ai-pipe.com/v1".to_string(),
            model_name: "gpt-4o-mini".to_string(),
        }
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            browserless_token: None,
            browserless_base_url: "https://chrome.browserless.io".to_string(),
            chrome_executable: None,
            render_linked_pages: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            quiz_email: String::new(),
            quiz_secret: String::new(),
            start_url: None,
            max_steps: 20,
            time_budget_secs: 180,
            request_timeout_secs: 60,
            llm_timeout_secs: 45,
            max_page_chars: 60_000,
            max_content_chars: 8_000,
            verbose_logging: false,
            primary_llm: ProviderConfig::default(),
            fallback_llm: ProviderConfig::default_fallback(),
            renderer: RendererConfig::default(),
        }
    }
}

impl Config {
    /// 先读取 TOML 配置文件，再用环境变量覆盖
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        Ok(base.with_env())
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::FileUnreadable {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::FileInvalid { message, .. } => ConfigError::FileInvalid {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::FileInvalid {
            path: String::new(),
            message: e.to_string(),
        })
    }

    fn with_env(self) -> Self {
        let base = self;
        let primary = base.primary_llm;
        let fallback = base.fallback_llm;
        let renderer = base.renderer;
        Self {
            quiz_email: env_string("QUIZ_EMAIL").unwrap_or(base.quiz_email),
            quiz_secret: env_string("QUIZ_SECRET").unwrap_or(base.quiz_secret),
            start_url: env_string("QUIZ_START_URL").or(base.start_url),
            max_steps: env_parse("QUIZ_MAX_STEPS").unwrap_or(base.max_steps),
            time_budget_secs: env_parse("QUIZ_TIME_BUDGET_SECS")
                .unwrap_or(base.time_budget_secs),
            request_timeout_secs: env_parse("REQUEST_TIMEOUT_SECS")
                .unwrap_or(base.request_timeout_secs),
            llm_timeout_secs: env_parse("LLM_TIMEOUT_SECS").unwrap_or(base.llm_timeout_secs),
            max_page_chars: env_parse("MAX_PAGE_CHARS").unwrap_or(base.max_page_chars),
            max_content_chars: env_parse("MAX_CONTENT_CHARS").unwrap_or(base.max_content_chars),
            verbose_logging: env_parse("VERBOSE_LOGGING").unwrap_or(base.verbose_logging),
            primary_llm: ProviderConfig {
                name: env_string("PRIMARY_LLM_NAME").unwrap_or(primary.name),
                api_key: env_string("PRIMARY_LLM_API_KEY").unwrap_or(primary.api_key),
                api_base_url: env_string("PRIMARY_LLM_API_BASE_URL")
                    .unwrap_or(primary.api_base_url),
                model_name: env_string("PRIMARY_LLM_MODEL_NAME").unwrap_or(primary.model_name),
            },
            fallback_llm: ProviderConfig {
                name: env_string("FALLBACK_LLM_NAME").unwrap_or(fallback.name),
                api_key: env_string("FALLBACK_LLM_API_KEY").unwrap_or(fallback.api_key),
                api_base_url: env_string("FALLBACK_LLM_API_BASE_URL")
                    .unwrap_or(fallback.api_base_url),
                model_name: env_string("FALLBACK_LLM_MODEL_NAME")
                    .unwrap_or(fallback.model_name),
            },
            renderer: RendererConfig {
                browserless_token: env_string("BROWSERLESS_API_KEY")
                    .or(renderer.browserless_token),
                browserless_base_url: env_string("BROWSERLESS_BASE_URL")
                    .unwrap_or(renderer.browserless_base_url),
                chrome_executable: env_string("CHROME_EXECUTABLE")
                    .or(renderer.chrome_executable),
                render_linked_pages: env_parse("RENDER_LINKED_PAGES")
                    .unwrap_or(renderer.render_linked_pages),
            },
        }
    }

    /// 检查运行所需的必填项
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.quiz_email.trim().is_empty() {
            return Err(ConfigError::Missing { name: "quiz_email" });
        }
        if self.quiz_secret.trim().is_empty() {
            return Err(ConfigError::Missing { name: "quiz_secret" });
        }
        if self.primary_llm.api_key.trim().is_empty() {
            return Err(ConfigError::Missing {
                name: "primary_llm.api_key",
            });
        }
        Ok(())
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
