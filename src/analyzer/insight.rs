use anyhow::{Context, Result};
use tracing::{error, info, warn};

use super::content::ContentAnalysis;
use super::{load_mapping, load_structured};
use crate::config::AnalysisSchema;
use crate::llm::{ChatMessage, ChatModel, ChatOptions};
use crate::parser::resolve_sections;
use crate::prompts::{render, GENERATE_FINAL_INSIGHTS_PROMPT};
use crate::storage::{artifacts, PaperWorkspace};

pub const NO_IMAGE_REPORT: &str = "无图片分析报告。";
const NO_INTRODUCTION: &str = "未能提取到引言。";
const NO_CONCLUSION: &str = "未能提取到结论。";

/// 全局洞察阶段：综合各部分分析、图表分析和引言结论原文，输出 insights.md
pub async fn analyze_insight<M: ChatModel + ?Sized>(
    workspace: &PaperWorkspace,
    model: &M,
    schema: &AnalysisSchema,
) -> Result<Option<String>> {
    info!("开始为论文 '{}' 生成全局分析", workspace.name());

    let analysis: ContentAnalysis = artifacts::read_json_or_default(&workspace.content_analysis());
    if analysis.is_empty() {
        error!("无法加载内容分析文件: {}", workspace.content_analysis().display());
        return Ok(None);
    }

    let image_report = match artifacts::read_text(&workspace.image_analysis()) {
        Ok(Some(report)) => report,
        Ok(None) => {
            warn!("找不到图片分析报告，分析将继续，但缺少图片信息");
            NO_IMAGE_REPORT.to_string()
        }
        Err(e) => {
            warn!("读取图片分析报告失败: {}", e);
            NO_IMAGE_REPORT.to_string()
        }
    };

    let (Some(document), Some(mapping)) = (load_structured(workspace), load_mapping(workspace)) else {
        error!("无法加载结构化数据或章节映射，无法提取引言和结论");
        return Ok(None);
    };

    let introduction = resolve_sections(
        mapping.titles_for(&schema.introduction_category),
        &document.sections,
    )
    .content;
    let conclusion = resolve_sections(
        mapping.titles_for(&schema.conclusion_category),
        &document.sections,
    )
    .content;
    if introduction.is_empty() {
        warn!("未能提取到引言部分的原文");
    }
    if conclusion.is_empty() {
        warn!("未能提取到结论部分的原文");
    }

    let summaries = serde_json::to_string_pretty(&analysis)?;
    let prompt = render(GENERATE_FINAL_INSIGHTS_PROMPT, &[
        ("all_summaries", summaries.as_str()),
        ("all_figures_analysis", image_report.as_str()),
        ("introduction_text", or_placeholder(&introduction, NO_INTRODUCTION)),
        ("conclusion_text", or_placeholder(&conclusion, NO_CONCLUSION)),
    ]);

    info!("正在调用大模型进行最终分析...");
    // 输出是Markdown，不用JSON模式
    let insights = match model.chat(&[ChatMessage::user(prompt)], ChatOptions::text()).await {
        Ok(text) => text,
        Err(e) => {
            error!("LLM调用失败: {:#}", e);
            return Ok(None);
        }
    };

    let path = workspace.insights();
    artifacts::write_text(&path, &insights)
        .with_context(|| format!("无法写入全局分析报告: {}", path.display()))?;
    info!("全局分析报告已生成: {}", path.display());
    Ok(Some(insights))
}

fn or_placeholder<'a>(text: &'a str, placeholder: &'a str) -> &'a str {
    if text.is_empty() {
        placeholder
    } else {
        text
    }
}
