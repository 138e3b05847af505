use anyhow::Result;
use chrono::Local;
use serde_json::{Map, Value};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

use super::image::{extract_figure_analyses, NO_FIGURES};
use super::{load_mapping, load_structured};
use crate::config::AnalysisSchema;
use crate::llm::{chat_json, ChatMessage, ChatModel};
use crate::parser::resolve_sections;
use crate::prompts::{render, DEEP_ANALYZE_PROMPT, SMART_ANALYZE_SECTION_PROMPT};
use crate::storage::{artifacts, PaperWorkspace};

/// 分类 -> { 分析要点 -> 分析内容 }，键顺序即分析顺序
pub type ContentAnalysis = Map<String, Value>;

/// 模型输入输出日志，便于排查提示词问题
struct IoLog {
    path: PathBuf,
}

impl IoLog {
    fn reset(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => info!("已清空旧的日志文件: {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("无法清空日志文件 {}: {}", self.path.display(), e),
        }
    }

    fn record(&self, step: &str, section: &str, prompt: &str, response: Option<&Value>) {
        let response = match response {
            Some(value) => serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()),
            None => "NO RESPONSE OR ERROR".to_string(),
        };
        let entry = format!(
            "--- START: {step} for '{section}' @ {time} ---\n--- PROMPT SENT TO LLM: ---\n{prompt}\n\n--- RESPONSE FROM LLM: ---\n{response}\n--- END: {step} for '{section}' ---\n\n\n",
            step = step,
            section = section,
            time = Local::now().format("%Y-%m-%d %H:%M:%S"),
            prompt = prompt,
            response = response,
        );

        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(entry.as_bytes()));
        if let Err(e) = result {
            warn!("写入LLM日志失败: {}", e);
        }
    }
}

/// 两步式分析：先生成分析要点（有预设时跳过），再逐点深入分析
struct SectionAnalyzer<'a, M: ChatModel + ?Sized> {
    model: &'a M,
    schema: &'a AnalysisSchema,
    log: IoLog,
}

impl<'a, M: ChatModel + ?Sized> SectionAnalyzer<'a, M> {
    async fn analyze(&self, category: &str, content: &str, figures: &str) -> Option<Value> {
        let points = match self.schema.preset_for(category) {
            Some(points) => {
                info!("检测到 '{}' 的预设分析框架，跳过动态生成步骤", category);
                points.to_vec()
            }
            None => self.generate_points(category, content, figures).await?,
        };
        info!("'{}' 的分析要点: {:?}", category, points);

        let points_list = points
            .iter()
            .map(|p| format!("- {}", p))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = render(DEEP_ANALYZE_PROMPT, &[
            ("section_name", category),
            ("analysis_points_str", points_list.as_str()),
            ("related_figures_analysis", figures),
            ("section_content", content),
        ]);
        let response = self.ask("Step 2: Deep Analysis", category, &prompt).await?;

        match response.get("analysis_details") {
            Some(details @ Value::Object(_)) => Some(details.clone()),
            _ => {
                warn!("未能对 '{}' 进行深入分析", category);
                None
            }
        }
    }

    async fn generate_points(&self, category: &str, content: &str, figures: &str) -> Option<Vec<String>> {
        info!("为 '{}' 生成动态分析框架...", category);
        let prompt = render(SMART_ANALYZE_SECTION_PROMPT, &[
            ("section_name", category),
            ("related_figures_analysis", figures),
            ("section_content", content),
        ]);
        let response = self.ask("Step 1: Generate Framework", category, &prompt).await?;

        let points: Vec<String> = response
            .get("analysis_points")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        if points.is_empty() {
            warn!("未能为 '{}' 生成有效的分析框架，跳过此部分", category);
            return None;
        }
        Some(points)
    }

    async fn ask(&self, step: &str, category: &str, prompt: &str) -> Option<Value> {
        let messages = [ChatMessage::user(prompt)];
        match chat_json(self.model, &messages).await {
            Ok(value) => {
                self.log.record(step, category, prompt, Some(&value));
                Some(value)
            }
            Err(e) => {
                warn!("LLM调用失败 ({} / {}): {:#}", category, step, e);
                self.log.record(step, category, prompt, None);
                None
            }
        }
    }
}

/// 内容分析阶段：按映射逐个分类分析，每完成一个分类就保存，支持断点续传
pub async fn analyze_content<M: ChatModel + ?Sized>(
    workspace: &PaperWorkspace,
    model: &M,
    schema: &AnalysisSchema,
) -> Result<Option<ContentAnalysis>> {
    info!("开始对论文 '{}' 进行图文内容分析", workspace.name());
    let log = IoLog {
        path: workspace.llm_log(),
    };
    log.reset();

    let (Some(mapping), Some(document)) = (load_mapping(workspace), load_structured(workspace)) else {
        error!("无法加载章节映射或结构化数据，分析中止");
        return Ok(None);
    };

    let result_path = workspace.content_analysis();
    let mut analysis: ContentAnalysis = artifacts::read_json_or_default(&result_path);
    let image_report = match artifacts::read_text(&workspace.image_analysis()) {
        Ok(report) => report,
        Err(e) => {
            warn!("读取图片分析报告失败: {}", e);
            None
        }
    };

    let analyzer = SectionAnalyzer { model, schema, log };
    for (category, titles) in mapping.iter() {
        if analysis.contains_key(category) {
            info!("已检测到 '{}' 的分析结果，跳过", category);
            continue;
        }
        if titles.is_empty() {
            continue;
        }

        let resolved = resolve_sections(titles, &document.sections);
        if resolved.content.is_empty() {
            warn!("分类 '{}' 没有匹配到任何章节原文: {:?}", category, titles);
            continue;
        }
        debug!("'{}' 命中 {} 字, 图表 {:?}", category, resolved.content.len(), resolved.image_ids);

        let figures = match &image_report {
            Some(report) => extract_figure_analyses(report, &resolved.image_ids),
            None if resolved.image_ids.is_empty() => NO_FIGURES.to_string(),
            None => format!("警告: 找不到图片分析报告: {}", workspace.image_analysis().display()),
        };

        let Some(details) = analyzer.analyze(category, &resolved.content, &figures).await else {
            continue;
        };
        analysis.insert(category.to_string(), details);
        info!("已完成 '{}' 的分析，保存进度", category);
        if let Err(e) = artifacts::write_json(&result_path, &analysis) {
            error!("无法写入分析文件: {}", e);
        }
    }

    info!("内容分析完成: {} 个分类", analysis.len());
    Ok(Some(analysis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::image::{report_entry, report_header};
    use crate::analyzer::testing::{sample_document, workspace_with, ScriptedModel};
    use crate::parser::SectionMapping;
    use serde_json::json;

    fn write_mapping(workspace: &PaperWorkspace, entries: Vec<(&str, Vec<&str>)>) {
        let mapping = SectionMapping::new(
            entries
                .into_iter()
                .map(|(name, titles)| {
                    (name.to_string(), titles.into_iter().map(str::to_string).collect())
                })
                .collect(),
        );
        artifacts::write_json(&workspace.section_mapping(), &mapping).unwrap();
    }

    fn write_image_report(workspace: &PaperWorkspace) {
        let document = sample_document();
        let mut report = report_header("Sparse Attention Paper");
        for asset in document.all_assets() {
            report.push_str(&report_entry(asset, &format!("analysis of {}", asset.id)));
        }
        artifacts::write_text(&workspace.image_analysis(), &report).unwrap();
    }

    #[tokio::test]
    async fn preset_category_skips_step_one() {
        let (_dir, workspace) = workspace_with(&sample_document());
        write_mapping(&workspace, vec![("研究背景", vec!["Introduction", "Motivation"])]);
        write_image_report(&workspace);
        let model = ScriptedModel::new(vec![Ok(
            r#"{"analysis_details": {"研究问题": "长上下文", "研究难点": "二次复杂度", "相关工作": "稀疏注意力"}}"#,
        )]);

        let analysis = analyze_content(&workspace, &model, &AnalysisSchema::default())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(analysis["研究背景"]["研究难点"], "二次复杂度");
        let prompts = model.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("- 研究问题\n- 研究难点\n- 相关工作"));
        // 两个候选标题都命中，并带上 Figure 1 的分析
        assert!(prompts[0].contains("Transformers are slow."));
        assert!(prompts[0].contains("Long contexts matter."));
        assert!(prompts[0].contains("analysis of Figure 1"));

        let saved: ContentAnalysis = artifacts::read_json(&workspace.content_analysis())
            .unwrap()
            .unwrap();
        assert_eq!(saved, analysis);
        let log = std::fs::read_to_string(workspace.llm_log()).unwrap();
        assert!(log.contains("--- START: Step 2: Deep Analysis for '研究背景'"));
    }

    #[tokio::test]
    async fn dynamic_category_runs_both_steps_in_mapping_order() {
        let (_dir, workspace) = workspace_with(&sample_document());
        write_mapping(&workspace, vec![("研究方法", vec!["2 Method"]), ("总体结论", vec!["Conclusion"])]);
        let model = ScriptedModel::new(vec![
            Ok(r#"{"analysis_points": ["核心思想"]}"#),
            Ok(r#"{"analysis_details": {"核心思想": "稀疏"}}"#),
            Ok(r#"{"analysis_points": ["结论"]}"#),
            Ok(r#"{"analysis_details": {"结论": "有效"}}"#),
        ]);

        let analysis = analyze_content(&workspace, &model, &AnalysisSchema::default())
            .await
            .unwrap()
            .unwrap();

        let keys: Vec<&String> = analysis.keys().collect();
        assert_eq!(keys, vec!["研究方法", "总体结论"]);
        let prompts = model.prompts();
        assert_eq!(prompts.len(), 4);
        // 没有图片报告时给出提示
        assert!(prompts[0].contains("警告: 找不到图片分析报告"));
        assert!(prompts[2].contains(NO_FIGURES));
        assert!(prompts[1].contains("- 核心思想"));
    }

    #[tokio::test]
    async fn existing_results_are_resumed_and_failures_skipped() {
        let (_dir, workspace) = workspace_with(&sample_document());
        write_mapping(&workspace, vec![
            ("研究背景", vec!["Introduction"]),
            ("空分类", vec![]),
            ("无匹配", vec!["Appendix Z"]),
            ("研究方法", vec!["Method"]),
        ]);
        artifacts::write_json(&workspace.content_analysis(), &json!({"研究背景": {"研究问题": "旧结果"}}))
            .unwrap();
        std::fs::write(workspace.llm_log(), "stale").unwrap();
        let model = ScriptedModel::new(vec![Ok(r#"{"analysis_points": []}"#)]);

        let analysis = analyze_content(&workspace, &model, &AnalysisSchema::default())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(analysis.len(), 1);
        assert_eq!(analysis["研究背景"]["研究问题"], "旧结果");
        assert_eq!(model.calls().len(), 1);
        let log = std::fs::read_to_string(workspace.llm_log()).unwrap();
        assert!(!log.contains("stale"));
        assert!(log.contains("Step 1: Generate Framework for '研究方法'"));
    }

    #[tokio::test]
    async fn missing_mapping_aborts() {
        let (_dir, workspace) = workspace_with(&sample_document());
        let model = ScriptedModel::new(vec![]);

        assert!(analyze_content(&workspace, &model, &AnalysisSchema::default())
            .await
            .unwrap()
            .is_none());
        assert!(model.calls().is_empty());
    }
}
