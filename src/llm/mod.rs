use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::ModelConfig;
use crate::utils::{PaperError, PaperResult};

pub mod check;

/// 重试等待的上限
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// 单次调用的选项
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChatOptions {
    /// 要求模型返回 JSON 对象
    pub json_mode: bool,
    /// 覆盖配置中的 max_tokens
    pub max_tokens: Option<u32>,
}

impl ChatOptions {
    pub fn json() -> Self {
        Self {
            json_mode: true,
            max_tokens: None,
        }
    }

    pub fn text() -> Self {
        Self::default()
    }
}

/// 对话模型的抽象，分析阶段只依赖这个 trait
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn chat(&self, messages: &[ChatMessage], options: ChatOptions) -> Result<String>;
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// 多模态消息片段
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ImageUrl {
    pub url: String,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Text(text.into()),
        }
    }

    /// 文字 + 一张图片（data URL）
    pub fn user_with_image(text: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: text.into() },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image_url.into(),
                    },
                },
            ]),
        }
    }

    /// 消息中的文字部分，图片省略
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// 把本地图片编码为 data URL，MIME 按扩展名推断，未知时按 jpeg 处理
pub fn image_data_url(path: &Path) -> PaperResult<String> {
    let bytes = std::fs::read(path)?;
    let mime = image::ImageFormat::from_path(path)
        .map(|format| format.to_mime_type())
        .unwrap_or("image/jpeg");
    Ok(format!("data:{};base64,{}", mime, STANDARD.encode(bytes)))
}

/// JSON 模式调用并解析结果
pub async fn chat_json<M: ChatModel + ?Sized>(model: &M, messages: &[ChatMessage]) -> Result<Value> {
    let reply = model.chat(messages, ChatOptions::json()).await?;
    parse_json_reply(&reply)
}

/// 兼容被 ``` 代码块包裹的 JSON
pub fn parse_json_reply(reply: &str) -> Result<Value> {
    let body = strip_code_fence(reply);
    serde_json::from_str(body)
        .map_err(|e| PaperError::Parse(format!("模型返回的不是合法JSON: {}", e)).into())
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // 跳过 ```json 这一行
    let rest = rest.find('\n').map_or("", |i| &rest[i + 1..]);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

/// OpenAI 兼容接口请求体
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// 第 attempt 次重试前的等待：500ms * 2^attempt，不超过上限
fn retry_delay(attempt: u32) -> Duration {
    let millis = 500u64.saturating_mul(2u64.saturating_pow(attempt));
    Duration::from_millis(millis).min(MAX_RETRY_DELAY)
}

pub fn chat_endpoint(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

pub struct LlmClient {
    client: reqwest::Client,
    config: ModelConfig,
    endpoint: String,
}

impl LlmClient {
    pub fn new(config: ModelConfig) -> PaperResult<Self> {
        let mut builder = reqwest::Client::builder().timeout(Duration::from_secs(config.timeout_secs));

        if !config.proxy.is_empty() {
            match reqwest::Proxy::all(&config.proxy) {
                Ok(proxy) => {
                    info!("使用代理: {}", config.proxy);
                    builder = builder.proxy(proxy);
                }
                Err(e) => {
                    warn!("代理配置无效 '{}': {}", config.proxy, e);
                }
            }
        }

        let client = builder.build()?;
        let endpoint = chat_endpoint(&config.base_url);
        Ok(Self {
            client,
            config,
            endpoint,
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn build_request<'a>(&'a self, messages: &'a [ChatMessage], options: ChatOptions) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.config.model,
            messages,
            temperature: self.config.temperature,
            max_tokens: options.max_tokens.or(self.config.max_tokens),
            response_format: options.json_mode.then_some(ResponseFormat {
                kind: "json_object",
            }),
        }
    }

    /// 带重试的调用，指数退避
    async fn call_api(&self, request: &ChatRequest<'_>) -> Result<String> {
        let attempts = self.config.max_retries.max(1);
        let mut last_error = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = retry_delay(attempt);
                info!("API 重试 ({}/{})，等待 {}ms...", attempt + 1, attempts, delay.as_millis());
                tokio::time::sleep(delay).await;
            }

            match self.do_request(request).await {
                Ok(content) => return Ok(content),
                Err(e) => {
                    warn!("API 调用失败 (尝试 {}/{}): {}", attempt + 1, attempts, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("API 调用失败")))
    }

    fn log_request(&self, messages: &[ChatMessage]) {
        let chars: usize = messages.iter().map(|m| m.text().chars().count()).sum();
        debug!("发送 {} 条消息 ({} 字) 到模型 {}", messages.len(), chars, self.model());
    }

    async fn do_request(&self, request: &ChatRequest<'_>) -> Result<String> {
        debug!("调用模型 {} @ {}", request.model, self.endpoint);
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .context("发送请求失败")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API 返回错误 {}: {}", status, body);
        }

        let chat_response: ChatResponse = response.json().await.context("解析 API 响应失败")?;

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(PaperError::Llm("模型返回空内容".to_string()).into());
        }

        Ok(content)
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn chat(&self, messages: &[ChatMessage], options: ChatOptions) -> Result<String> {
        self.log_request(messages);
        let request = self.build_request(messages, options);
        self.call_api(&request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use serde_json::json;

    #[test]
    fn code_fenced_json_is_accepted() {
        let reply = "```json\n{\"研究背景\": [\"Introduction\"]}\n```";
        assert_eq!(parse_json_reply(reply).unwrap(), json!({"研究背景": ["Introduction"]}));

        assert_eq!(parse_json_reply("  {\"a\": 1} ").unwrap(), json!({"a": 1}));
        assert_eq!(parse_json_reply("```\n[1, 2]\n```").unwrap(), json!([1, 2]));
    }

    #[test]
    fn invalid_json_reply_is_an_error() {
        let err = parse_json_reply("抱歉，我无法完成").unwrap_err();
        assert!(err.to_string().contains("JSON"));
    }

    #[test]
    fn image_message_serializes_as_content_parts() {
        let message = ChatMessage::user_with_image("看图", "data:image/png;base64,AAAA");
        let value = serde_json::to_value(&message).unwrap();

        assert_eq!(
            value,
            json!({
                "role": "user",
                "content": [
                    {"type": "text", "text": "看图"},
                    {"type": "image_url", "image_url": {"url": "data:image/png;base64,AAAA"}}
                ]
            })
        );
        assert_eq!(message.text(), "看图");
        assert_eq!(serde_json::to_value(ChatMessage::user("hi")).unwrap()["content"], "hi");
    }

    #[test]
    fn request_carries_json_mode_and_token_limit() {
        let mut config = AppConfig::default().vision;
        config.base_url = "http://localhost:8000/v1/".to_string();
        let client = LlmClient::new(config).unwrap();
        let messages = vec![ChatMessage::user("hi")];

        let json_request = serde_json::to_value(client.build_request(&messages, ChatOptions::json())).unwrap();
        assert_eq!(json_request["response_format"]["type"], "json_object");
        assert_eq!(json_request["max_tokens"], 1024);
        assert_eq!(json_request["model"], "gpt-4-vision-preview");

        let plain = ChatOptions {
            json_mode: false,
            max_tokens: Some(64),
        };
        let text_request = serde_json::to_value(client.build_request(&messages, plain)).unwrap();
        assert!(text_request.get("response_format").is_none());
        assert_eq!(text_request["max_tokens"], 64);
        assert_eq!(client.endpoint, "http://localhost:8000/v1/chat/completions");
    }

    #[test]
    fn unlimited_tokens_are_omitted() {
        let client = LlmClient::new(AppConfig::default().llm).unwrap();
        let messages = vec![ChatMessage::system("s")];
        let request = serde_json::to_value(client.build_request(&messages, ChatOptions::text())).unwrap();
        assert!(request.get("max_tokens").is_none());
        assert_eq!(client.model(), "gpt-4o");
    }

    #[test]
    fn retry_delay_doubles_and_is_capped() {
        assert_eq!(retry_delay(1), Duration::from_millis(1000));
        assert_eq!(retry_delay(2), Duration::from_millis(2000));
        assert_eq!(retry_delay(7), MAX_RETRY_DELAY);
        // 配置里给了很大的重试次数也不能溢出
        assert_eq!(retry_delay(64), MAX_RETRY_DELAY);
        assert_eq!(retry_delay(u32::MAX), MAX_RETRY_DELAY);
    }

    #[test]
    fn data_url_uses_extension_mime() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("Figure_1.png");
        std::fs::write(&png, b"abc").unwrap();
        assert_eq!(image_data_url(&png).unwrap(), "data:image/png;base64,YWJj");

        let unknown = dir.path().join("Figure_2.bin");
        std::fs::write(&unknown, b"abc").unwrap();
        assert_eq!(image_data_url(&unknown).unwrap(), "data:image/jpeg;base64,YWJj");

        assert!(image_data_url(&dir.path().join("missing.png")).is_err());
    }
}
