use anyhow::Result;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::io::Cursor;
use std::path::Path;

use super::{image_data_url, ChatMessage, ChatModel, ChatOptions};

pub const TEXT_CHECK_PROMPT: &str = "用中文说 'Hello, World!'";
pub const VISION_CHECK_PROMPT: &str = "这张图片里有什么？请用中文回答。";
const VISION_CHECK_SYSTEM: &str = "你是一个有用的助手。";

/// 没有指定测试图片时使用的 60x30 纯红 PNG
pub fn sample_image_data_url() -> Result<String> {
    let image = image::RgbImage::from_pixel(60, 30, image::Rgb([255, 0, 0]));
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, image::ImageFormat::Png)?;
    Ok(format!("data:image/png;base64,{}", STANDARD.encode(bytes.into_inner())))
}

/// 语言模型连通性检查，返回模型回复
pub async fn check_text_model<M: ChatModel + ?Sized>(model: &M) -> Result<String> {
    model
        .chat(&[ChatMessage::user(TEXT_CHECK_PROMPT)], ChatOptions::text())
        .await
}

/// 视觉模型连通性检查，发送一张图片
pub async fn check_vision_model<M: ChatModel + ?Sized>(model: &M, image: Option<&Path>) -> Result<String> {
    let url = match image {
        Some(path) => image_data_url(path)?,
        None => sample_image_data_url()?,
    };
    let messages = [
        ChatMessage::system(VISION_CHECK_SYSTEM),
        ChatMessage::user_with_image(VISION_CHECK_PROMPT, url),
    ];
    let options = ChatOptions {
        json_mode: false,
        max_tokens: Some(1024),
    };
    model.chat(&messages, options).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::testing::ScriptedModel;
    use crate::llm::{ContentPart, MessageContent};

    fn image_url(message: &ChatMessage) -> Option<String> {
        let MessageContent::Parts(parts) = &message.content else {
            return None;
        };
        parts.iter().find_map(|part| match part {
            ContentPart::ImageUrl { image_url } => Some(image_url.url.clone()),
            ContentPart::Text { .. } => None,
        })
    }

    #[test]
    fn sample_image_is_a_png() {
        let url = sample_image_data_url().unwrap();
        let encoded = url.strip_prefix("data:image/png;base64,").unwrap();
        let bytes = STANDARD.decode(encoded).unwrap();

        let decoded = image::load_from_memory_with_format(&bytes, image::ImageFormat::Png).unwrap();
        assert_eq!(decoded.to_rgb8().dimensions(), (60, 30));
    }

    #[tokio::test]
    async fn text_check_sends_plain_prompt() {
        let model = ScriptedModel::new(vec![Ok("你好，世界！")]);

        assert_eq!(check_text_model(&model).await.unwrap(), "你好，世界！");
        let calls = model.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, ChatOptions::text());
        assert_eq!(model.prompts(), vec![TEXT_CHECK_PROMPT.to_string()]);
    }

    #[tokio::test]
    async fn vision_check_attaches_given_or_sample_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Figure_1.jpg");
        std::fs::write(&path, b"abc").unwrap();
        let model = ScriptedModel::new(vec![Ok("一张图"), Ok("红色")]);

        check_vision_model(&model, Some(&path)).await.unwrap();
        assert_eq!(check_vision_model(&model, None).await.unwrap(), "红色");

        let calls = model.calls();
        assert_eq!(calls[0].1.max_tokens, Some(1024));
        assert_eq!(calls[0].0[0], ChatMessage::system(VISION_CHECK_SYSTEM));
        assert_eq!(image_url(&calls[0].0[1]).unwrap(), "data:image/jpeg;base64,YWJj");
        assert!(image_url(&calls[1].0[1]).unwrap().starts_with("data:image/png;base64,"));
        assert_eq!(model.prompts()[0], VISION_CHECK_PROMPT);
    }

    #[tokio::test]
    async fn failures_are_reported() {
        let model = ScriptedModel::new(vec![Err("401 Unauthorized")]);
        let err = check_text_model(&model).await.unwrap_err();
        assert!(err.to_string().contains("401"));

        let missing = Path::new("/nonexistent/Figure_1.jpg");
        assert!(check_vision_model(&model, Some(missing)).await.is_err());
    }
}
