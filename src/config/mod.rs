pub mod schema;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::utils::PaperResult;

pub use schema::AnalysisSchema;

pub const SETTINGS_PATH: &str = "config/settings.toml";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub llm: ModelConfig,
    pub vision: ModelConfig,
    pub paths: PathsConfig,
    pub logging: LoggingConfig,
}

/// OpenAI 兼容接口的模型配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub proxy: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PathsConfig {
    /// 原始PDF所在目录
    pub pdf_dir: String,
    /// PDF转Markdown工具的输出目录
    pub parsed_dir: String,
    pub parsed_subdir: String,
    /// 分析产物输出目录
    pub output_dir: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl AppConfig {
    pub fn load() -> PaperResult<Self> {
        Self::load_from(SETTINGS_PATH)
    }

    /// 默认值 → TOML文件（可选）→ PAPERAGENT_ 前缀的环境变量，逐层覆盖
    pub fn load_from(path: impl AsRef<Path>) -> PaperResult<Self> {
        let settings = Config::builder()
            .add_source(Config::try_from(&AppConfig::default())?)
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(
                Environment::with_prefix("PAPERAGENT")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let mut config: AppConfig = settings.try_deserialize()?;
        config.vision.inherit_credentials(&config.llm);
        Ok(config)
    }

    pub fn save(&self, path: &str) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

impl ModelConfig {
    /// 检查 API key 是否已配置
    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
            && !self.api_key.contains("your-")
            && !self.api_key.contains("YOUR_")
    }

    /// 视觉模型通常与语言模型共用同一个key和地址
    fn inherit_credentials(&mut self, other: &ModelConfig) {
        if self.api_key.trim().is_empty() {
            self.api_key = other.api_key.clone();
        }
        if self.base_url.trim().is_empty() {
            self.base_url = other.base_url.clone();
        }
    }
}

impl PathsConfig {
    pub fn source_pdf(&self, paper: &str) -> PathBuf {
        Path::new(&self.pdf_dir).join(format!("{}.pdf", paper))
    }

    pub fn source_markdown(&self, paper: &str) -> PathBuf {
        Path::new(&self.parsed_dir)
            .join(paper)
            .join(&self.parsed_subdir)
            .join(format!("{}.md", paper))
    }

    pub fn output_root(&self, paper: &str) -> PathBuf {
        Path::new(&self.output_dir).join(paper)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: ModelConfig {
                api_key: "your-api-key".to_string(),
                base_url: "https://api.openai.com/v1".to_string(),
                model: "gpt-4o".to_string(),
                temperature: 0.3,
                max_tokens: None,
                timeout_secs: 180,
                max_retries: 3,
                proxy: String::new(),
            },
            vision: ModelConfig {
                api_key: String::new(),
                base_url: String::new(),
                model: "gpt-4-vision-preview".to_string(),
                temperature: 0.3,
                max_tokens: Some(1024),
                timeout_secs: 180,
                max_retries: 3,
                proxy: String::new(),
            },
            paths: PathsConfig {
                pdf_dir: "pdf_preprocess/pdf".to_string(),
                parsed_dir: "pdf_preprocess/output".to_string(),
                parsed_subdir: "auto".to_string(),
                output_dir: "output".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}
