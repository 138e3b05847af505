use anyhow::{Context, Result};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::{error, info, warn};

use super::{display_title, load_structured};
use crate::llm::{chat_json, ChatMessage, ChatModel};
use crate::parser::{resolve_sections, SectionMapping, SectionNode, StructuredDocument};
use crate::prompts::{render, MAPPING_SECTIONS_PROMPT, MAPPING_SYSTEM};
use crate::storage::{artifacts, PaperWorkspace};
use crate::utils::PaperError;

pub const ABSTRACT_NOT_FOUND: &str = "摘要未找到。";

static ABSTRACT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)#\s*Abstract\s*\n([\s\S]*)").expect("abstract regex"));

/// 缩进文本形式的目录，每层两个空格
pub fn format_toc(sections: &[SectionNode]) -> String {
    fn walk(sections: &[SectionNode], depth: usize, out: &mut String) {
        for section in sections {
            out.push_str(&"  ".repeat(depth));
            out.push_str("- ");
            out.push_str(&section.title);
            out.push('\n');
            walk(&section.subsections, depth + 1, out);
        }
    }

    let mut toc = String::new();
    walk(sections, 0, &mut toc);
    toc
}

/// 先在 preamble 里找 `# Abstract`，再到章节树里找名为 abstract 的章节
pub fn find_abstract(document: &StructuredDocument) -> String {
    if let Some(text) = ABSTRACT
        .captures(&document.preamble)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|text| !text.is_empty())
    {
        return text.to_string();
    }

    let resolved = resolve_sections(&["abstract"], &document.sections);
    if resolved.content.is_empty() {
        return ABSTRACT_NOT_FOUND.to_string();
    }

    // 去掉章节自带的标题行
    match resolved.content.split_once('\n') {
        Some((first, rest)) if first.starts_with('#') && !rest.trim().is_empty() => {
            rest.trim().to_string()
        }
        _ => resolved.content,
    }
}

pub async fn create_section_mapping<M: ChatModel + ?Sized>(
    document: &StructuredDocument,
    model: &M,
) -> Result<SectionMapping> {
    let abstract_text = find_abstract(document);
    let toc = format_toc(&document.sections);
    let prompt = render(MAPPING_SECTIONS_PROMPT, &[
        ("paper_title", display_title(document)),
        ("abstract", abstract_text.as_str()),
        ("toc_string", toc.as_str()),
    ]);
    let messages = [ChatMessage::system(MAPPING_SYSTEM), ChatMessage::user(prompt)];

    info!("正在调用LLM进行目录映射...");
    match chat_json(model, &messages).await? {
        Value::Object(map) => Ok(SectionMapping::from(map)),
        other => Err(PaperError::Parse(format!("章节映射应为JSON对象，实际为: {}", other)).into()),
    }
}

/// 结构分析阶段：生成并保存 section_mapping.json
pub async fn analyze_structure<M: ChatModel + ?Sized>(
    workspace: &PaperWorkspace,
    model: &M,
) -> Result<Option<SectionMapping>> {
    info!("开始分析论文结构: {}", workspace.name());
    let Some(document) = load_structured(workspace) else {
        return Ok(None);
    };

    let mapping = match create_section_mapping(&document, model).await {
        Ok(mapping) => mapping,
        Err(e) => {
            error!("未能生成章节映射: {:#}", e);
            return Ok(None);
        }
    };
    if mapping.is_empty() {
        warn!("模型返回的章节映射为空，分析中止");
        return Ok(None);
    }

    let path = workspace.section_mapping();
    artifacts::write_json(&path, &mapping)
        .with_context(|| format!("无法写入映射文件: {}", path.display()))?;
    info!("保存映射关系到 {} ({} 个分类)", path.display(), mapping.len());
    Ok(Some(mapping))
}
