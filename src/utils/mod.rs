pub mod logger;

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PaperError {
    #[error("配置错误: {0}")]
    Config(#[from] config::ConfigError),

    #[error("网络请求错误: {0}")]
    Network(#[from] reqwest::Error),

    #[error("PDF处理错误: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("找不到源资源文件: {}", .0.display())]
    AssetMissing(PathBuf),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("模型调用错误: {0}")]
    Llm(String),

    #[error("解析错误: {0}")]
    Parse(String),
}

pub type PaperResult<T> = Result<T, PaperError>;
