//! 各分析阶段使用的提示词模板，占位符形如 `{name}`。

pub const MAPPING_SYSTEM: &str =
    "你是一位顶级的科研助理，擅长快速分析计算机科学领域的学术论文结构。请严格按照要求输出JSON。";

pub const MAPPING_SECTIONS_PROMPT: &str = r#"请根据下面这篇论文的标题、摘要和目录，把论文的章节映射到一个便于精读的分析结构中。

论文标题：{paper_title}

摘要：
{abstract}

目录：
{toc_string}

要求：
1. 输出一个JSON对象，键是分析分类（例如"研究背景"、"研究方法"、"实验设计"、"实验结果"、"总体结论"），值是该分类对应的原始章节标题列表。
2. 章节标题必须原样取自上面的目录，不要改写或翻译。
3. 引言部分请归入"研究背景"，结论部分请归入"总体结论"。
4. 键的顺序即论文的阅读顺序。
5. 只输出JSON，不要添加任何解释。

示例：{"研究背景": ["1 Introduction", "2 Related Work"], "总体结论": ["6 Conclusion"]}"#;

pub const FIGURE_SYSTEM: &str = "You are a helpful assistant.";

pub const ANALYZE_FIGURE_PROMPT: &str = r#"这是一篇学术论文中的图表，原始图注如下：
{figure_caption}

请结合图注详细解读这张图表：
1. 图表展示了什么内容（坐标轴、组件、数据系列等）
2. 图表传达的核心结论
3. 它在论文论证中起到的作用

请用中文回答，条理清晰。"#;

pub const SMART_ANALYZE_SECTION_PROMPT: &str = r#"你正在精读一篇学术论文的"{section_name}"部分。

相关图表的分析：
{related_figures_analysis}

该部分原文：
{section_content}

请为这一部分设计一个分析框架：列出3到6个最值得深入分析的要点（例如"核心思想"、"关键创新"、"局限性"）。
只输出JSON，格式为 {"analysis_points": ["要点1", "要点2"]}"#;

pub const DEEP_ANALYZE_PROMPT: &str = r#"你正在精读一篇学术论文的"{section_name}"部分，请按照给定的要点逐条深入分析。

分析要点：
{analysis_points_str}

相关图表的分析：
{related_figures_analysis}

该部分原文：
{section_content}

要求：每个要点给出具体、有依据的分析，引用原文中的关键数据或论述。
只输出JSON，格式为 {"analysis_details": {"要点1": "分析内容", "要点2": "分析内容"}}"#;

pub const GENERATE_FINAL_INSIGHTS_PROMPT: &str = r#"你是一位资深审稿人。下面是对一篇论文各部分的分析结果、图表分析，以及论文引言和结论的原文。

各部分分析：
{all_summaries}

图表分析：
{all_figures_analysis}

引言原文：
{introduction_text}

结论原文：
{conclusion_text}

请以Markdown格式输出全局洞察，包含以下小节：
### 核心贡献
### 主要优点
### 不足与局限
### 值得深入思考的问题"#;

/// 单遍替换 `{name}` 占位符。
///
/// 未知的占位符原样保留，所以模板里的JSON示例不需要转义；
/// 替换进去的内容不会被再次解析。
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };

        let key = &after[..close];
        match vars.iter().find(|(name, _)| *name == key) {
            Some((_, value)) => out.push_str(value),
            None => {
                out.push('{');
                out.push_str(key);
                out.push('}');
            }
        }
        rest = &after[close + 1..];
    }

    out.push_str(rest);
    out
}
