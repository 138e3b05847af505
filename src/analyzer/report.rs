use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;
use tracing::{error, info};

use super::content::ContentAnalysis;
use super::UNKNOWN_TITLE;
use crate::parser::{SectionMapping, StructuredDocument};
use crate::storage::{artifacts, PaperWorkspace};

/// 拼装最终报告所需的全部产物
#[derive(Debug, Clone)]
pub struct ReportInputs {
    pub paper_title: String,
    pub mapping: SectionMapping,
    pub content_analysis: ContentAnalysis,
    pub image_report: String,
    pub insights: String,
}

impl ReportInputs {
    /// 任何一个产物缺失都返回 None
    pub fn load(workspace: &PaperWorkspace) -> Result<Option<Self>> {
        let Some(document) = require_json::<StructuredDocument>(&workspace.structured_data())? else {
            return Ok(None);
        };
        let Some(mapping) = require_json::<SectionMapping>(&workspace.section_mapping())? else {
            return Ok(None);
        };
        let Some(content_analysis) = require_json::<ContentAnalysis>(&workspace.content_analysis())? else {
            return Ok(None);
        };
        let Some(image_report) = require_text(&workspace.image_analysis())? else {
            return Ok(None);
        };
        let Some(insights) = require_text(&workspace.insights())? else {
            return Ok(None);
        };

        let paper_title = if document.paper_title.trim().is_empty() {
            UNKNOWN_TITLE.to_string()
        } else {
            document.paper_title
        };
        Ok(Some(Self {
            paper_title,
            mapping,
            content_analysis,
            image_report,
            insights,
        }))
    }
}

fn require_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let value = artifacts::read_json(path)
        .with_context(|| format!("加载文件失败: {}", path.display()))?;
    if value.is_none() {
        error!("缺少必要的分析文件 {}，无法生成最终报告", path.display());
    }
    Ok(value)
}

fn require_text(path: &Path) -> Result<Option<String>> {
    let text = artifacts::read_text(path)
        .with_context(|| format!("加载文件失败: {}", path.display()))?;
    if text.is_none() {
        error!("缺少必要的分析文件 {}，无法生成最终报告", path.display());
    }
    Ok(text)
}

fn detail_text(detail: &Value) -> String {
    match detail {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// 按映射顺序输出已分析的分类，再附上全局洞察与图表分析
pub fn render_report(inputs: &ReportInputs) -> String {
    let mut report = format!("# 论文分析报告：{}\n\n", inputs.paper_title);

    report.push_str("\n## 章节深度分析\n\n");
    for (category, _) in inputs.mapping.iter() {
        let Some(details) = inputs.content_analysis.get(category) else {
            continue;
        };
        report.push_str(&format!("### {}\n\n", category));
        match details {
            Value::Object(points) => {
                for (point, detail) in points {
                    report.push_str(&format!("- **{}:** {}\n", point, detail_text(detail)));
                }
            }
            other => report.push_str(&format!("{}\n", detail_text(other))),
        }
        report.push('\n');
    }
    report.push_str("\n---\n\n");

    report.push_str("## 全局洞察：核心观点总结\n\n");
    report.push_str(&inputs.insights);
    report.push_str("\n---\n\n");

    // 去掉图表报告自己的一级标题
    let image_body = inputs
        .image_report
        .split_once('\n')
        .map_or(inputs.image_report.as_str(), |(_, rest)| rest)
        .trim();
    report.push_str("## 附录：重点图表分析详情\n\n");
    report.push_str(image_body);
    report
}

/// 报告阶段：写入 Final_Report.md
pub fn generate_report(workspace: &PaperWorkspace) -> Result<Option<String>> {
    info!("开始为论文 '{}' 生成最终报告", workspace.name());
    let Some(inputs) = ReportInputs::load(workspace)? else {
        return Ok(None);
    };

    let report = render_report(&inputs);
    let path = workspace.final_report();
    artifacts::write_text(&path, &report)
        .with_context(|| format!("无法写入最终报告文件: {}", path.display()))?;
    info!("最终报告已生成: {}", path.display());
    Ok(Some(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::testing::{sample_document, workspace_with};
    use serde_json::json;

    fn inputs() -> ReportInputs {
        let mapping = SectionMapping::new(vec![
            ("研究背景".to_string(), vec!["Introduction".to_string()]),
            ("研究方法".to_string(), vec!["Method".to_string()]),
            ("总体结论".to_string(), vec!["Conclusion".to_string()]),
        ]);
        let content_analysis = json!({
            "总体结论": {"结论": "有效"},
            "研究背景": {"研究问题": "效率", "相关工作": "稀疏注意力"}
        });
        let Value::Object(content_analysis) = content_analysis else {
            unreachable!()
        };
        ReportInputs {
            paper_title: "Sparse".to_string(),
            mapping,
            content_analysis,
            image_report: "# 论文《Sparse》图表分析报告\n\n## Figure 1\n\n分析\n\n---\n\n".to_string(),
            insights: "### 核心贡献\n稀疏".to_string(),
        }
    }

    #[test]
    fn report_follows_mapping_order_and_skips_unanalysed() {
        let report = render_report(&inputs());

        let expected = "# 论文分析报告：Sparse\n\n\n## 章节深度分析\n\n\
### 研究背景\n\n- **研究问题:** 效率\n- **相关工作:** 稀疏注意力\n\n\
### 总体结论\n\n- **结论:** 有效\n\n\
\n---\n\n## 全局洞察：核心观点总结\n\n### 核心贡献\n稀疏\n---\n\n\
## 附录：重点图表分析详情\n\n## Figure 1\n\n分析\n\n---";
        assert_eq!(report, expected);
        assert!(!report.contains("### 研究方法"));
    }

    #[test]
    fn single_line_image_report_is_kept() {
        let mut inputs = inputs();
        inputs.image_report = "only line".to_string();
        assert!(render_report(&inputs).ends_with("## 附录：重点图表分析详情\n\nonly line"));
    }

    #[test]
    fn generate_writes_final_report() {
        let (_dir, workspace) = workspace_with(&sample_document());
        let inputs = inputs();
        artifacts::write_json(&workspace.section_mapping(), &inputs.mapping).unwrap();
        artifacts::write_json(&workspace.content_analysis(), &inputs.content_analysis).unwrap();
        artifacts::write_text(&workspace.image_analysis(), &inputs.image_report).unwrap();
        artifacts::write_text(&workspace.insights(), &inputs.insights).unwrap();

        let report = generate_report(&workspace).unwrap().unwrap();

        assert!(report.starts_with("# 论文分析报告：Sparse Attention Paper\n"));
        assert_eq!(artifacts::read_text(&workspace.final_report()).unwrap().unwrap(), report);
    }

    #[test]
    fn missing_artifact_means_no_report() {
        let (_dir, workspace) = workspace_with(&sample_document());
        artifacts::write_json(&workspace.section_mapping(), &inputs().mapping).unwrap();

        assert!(generate_report(&workspace).unwrap().is_none());
        assert!(!workspace.final_report().exists());
    }
}
