use anyhow::{Context, Result};
use regex::Regex;
use tracing::{info, warn};

use super::{display_title, load_structured};
use crate::llm::{image_data_url, ChatMessage, ChatModel, ChatOptions};
use crate::parser::Asset;
use crate::prompts::{render, ANALYZE_FIGURE_PROMPT, FIGURE_SYSTEM};
use crate::storage::{artifacts, PaperWorkspace};

pub const NO_FIGURES: &str = "本部分不包含图表。";
pub const FIGURES_NOT_FOUND: &str = "未能从报告中找到指定图表的分析。";

/// 用视觉模型分析单张图表；失败时返回错误说明而不是中断整个阶段
pub async fn analyze_single_image<M: ChatModel + ?Sized>(
    asset: &Asset,
    workspace: &PaperWorkspace,
    model: &M,
) -> String {
    let path = workspace.asset_path(&asset.new_path);
    info!("正在分析图片: {}", path.display());

    let data_url = match image_data_url(&path) {
        Ok(url) => url,
        Err(e) => {
            warn!("无法加载图片 {}: {}", path.display(), e);
            return format!("无法加载图片: {}", path.display());
        }
    };

    let caption = if asset.caption.is_empty() { "无图注" } else { asset.caption.as_str() };
    let prompt = render(ANALYZE_FIGURE_PROMPT, &[("figure_caption", caption)]);
    let messages = [
        ChatMessage::system(FIGURE_SYSTEM),
        ChatMessage::user_with_image(prompt, data_url),
    ];

    match model.chat(&messages, ChatOptions::text()).await {
        Ok(text) => text.trim().to_string(),
        Err(e) => {
            warn!("调用视觉模型失败 ({}): {:#}", asset.id, e);
            format!("分析图片时出错: {}", e)
        }
    }
}

pub fn report_header(paper_title: &str) -> String {
    format!("# 论文《{}》图表分析报告\n\n", paper_title)
}

pub fn report_entry(asset: &Asset, analysis: &str) -> String {
    let caption = if asset.caption.is_empty() { "无" } else { asset.caption.as_str() };
    format!(
        "## {id}\n\n**原始图注:** {caption}\n\n![{id}]({path})\n\n### **模型分析结果:**\n\n{analysis}\n\n---\n\n",
        id = asset.id,
        caption = caption,
        path = asset.new_path,
        analysis = analysis,
    )
}

/// 图表分析阶段：逐张分析并写入 image_analysis.md
pub async fn analyze_images<M: ChatModel + ?Sized>(
    workspace: &PaperWorkspace,
    model: &M,
) -> Result<Option<String>> {
    info!("开始为论文 '{}' 生成图片分析报告", workspace.name());
    let Some(document) = load_structured(workspace) else {
        return Ok(None);
    };

    let assets = document.all_assets();
    if assets.is_empty() {
        info!("论文中未找到图片，无需生成报告");
        return Ok(None);
    }

    info!("发现 {} 张图片，开始逐一分析", assets.len());
    let mut report = report_header(display_title(&document));
    for (i, asset) in assets.iter().enumerate() {
        info!("正在处理图片 {}/{}", i + 1, assets.len());
        let analysis = analyze_single_image(asset, workspace, model).await;
        report.push_str(&report_entry(asset, &analysis));
    }

    let path = workspace.image_analysis();
    artifacts::write_text(&path, &report)
        .with_context(|| format!("无法写入报告文件: {}", path.display()))?;
    info!("图片分析报告已生成: {}", path.display());
    Ok(Some(report))
}

/// 从图表分析报告中取回指定图表的分析段落（`## <id>` 到下一个 `---`）
pub fn extract_figure_analyses<T: AsRef<str>>(report: &str, figure_ids: &[T]) -> String {
    if figure_ids.is_empty() {
        return NO_FIGURES.to_string();
    }

    let mut analyses = Vec::new();
    for id in figure_ids {
        let pattern = format!(r"(?is)## {}\n(.*?)\n---", regex::escape(id.as_ref()));
        let re = match Regex::new(&pattern) {
            Ok(re) => re,
            Err(e) => {
                warn!("图表ID无法构造正则 '{}': {}", id.as_ref(), e);
                continue;
            }
        };
        if let Some(section) = re.captures(report).and_then(|caps| caps.get(1)) {
            analyses.push(section.as_str().trim().to_string());
        }
    }

    if analyses.is_empty() {
        FIGURES_NOT_FOUND.to_string()
    } else {
        analyses.join("\n\n")
    }
}
