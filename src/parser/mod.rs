pub mod assets;
pub mod hierarchy;
pub mod markdown;
pub mod outline;
pub mod resolver;
pub mod title;

pub use assets::{ContentPopulator, FsAssetStore};
pub use hierarchy::build_hierarchy;
pub use markdown::split_markdown;
pub use resolver::resolve_sections;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;
use tracing::{error, info, warn};

use crate::config::PathsConfig;
use crate::storage::{artifacts, PaperWorkspace};

/// 扁平目录项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineEntry {
    pub title: String,
    /// 1-based
    pub page: u32,
    pub indent: usize,
}

/// Markdown 中按标题切出的一块（合并前）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkdownSection {
    pub title: String,
    pub level: usize,
    /// 包含标题行在内的原文
    pub raw_content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitMarkdown {
    pub preamble: String,
    pub sections: Vec<MarkdownSection>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Figure,
    Table,
}

impl AssetKind {
    pub fn from_label(label: &str) -> Self {
        if label.eq_ignore_ascii_case("table") {
            AssetKind::Table
        } else {
            AssetKind::Figure
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetKind::Figure => write!(f, "Figure"),
            AssetKind::Table => write!(f, "Table"),
        }
    }
}

/// 章节中的图表
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// 如 "Figure 2"、"Table 1.3"
    pub id: String,
    /// 规范相对路径 images/<Type>_<number>.<ext>
    pub new_path: String,
    pub original_path: String,
    pub caption: String,
}

/// 章节树节点
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionNode {
    pub title: String,
    pub page: u32,
    pub level: usize,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub images: Vec<Asset>,
    #[serde(default)]
    pub subsections: Vec<SectionNode>,
}

impl SectionNode {
    pub fn new(title: &str, page: u32, level: usize) -> Self {
        Self {
            title: title.to_string(),
            page,
            level,
            ..Default::default()
        }
    }
}

/// 结构化论文，落盘为 structured_data.json
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredDocument {
    pub paper_title: String,
    pub preamble: String,
    pub sections: Vec<SectionNode>,
}

impl StructuredDocument {
    /// 先序收集全部图表
    pub fn all_assets(&self) -> Vec<&Asset> {
        fn collect<'a>(nodes: &'a [SectionNode], out: &mut Vec<&'a Asset>) {
            for node in nodes {
                out.extend(node.images.iter());
                collect(&node.subsections, out);
            }
        }

        let mut assets = Vec::new();
        collect(&self.sections, &mut assets);
        assets
    }
}

/// preamble 第一行去掉 '#' 作为论文标题
pub fn title_from_preamble(preamble: &str) -> String {
    preamble
        .lines()
        .next()
        .unwrap_or_default()
        .replace('#', "")
        .trim()
        .to_string()
}

/// 分析分类 -> 论文中可能对应的章节标题，键顺序即分析与报告顺序
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct SectionMapping {
    entries: Vec<(String, Vec<String>)>,
}

impl SectionMapping {
    pub fn new(entries: Vec<(String, Vec<String>)>) -> Self {
        Self { entries }
    }

    pub fn titles_for(&self, category: &str) -> &[String] {
        self.entries
            .iter()
            .find(|(name, _)| name == category)
            .map(|(_, titles)| titles.as_slice())
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(name, titles)| (name.as_str(), titles.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 模型输出不一定规整：字符串视为单个标题，其他非数组值视为空列表
impl From<Map<String, Value>> for SectionMapping {
    fn from(map: Map<String, Value>) -> Self {
        let entries = map
            .into_iter()
            .map(|(category, value)| {
                let titles = match value {
                    Value::Array(items) => items
                        .into_iter()
                        .filter_map(|item| item.as_str().map(str::to_string))
                        .collect(),
                    Value::String(title) => vec![title],
                    _ => Vec::new(),
                };
                (category, titles)
            })
            .collect();
        Self { entries }
    }
}

impl From<SectionMapping> for Map<String, Value> {
    fn from(mapping: SectionMapping) -> Self {
        mapping
            .entries
            .into_iter()
            .map(|(category, titles)| {
                let titles = titles.into_iter().map(Value::String).collect();
                (category, Value::Array(titles))
            })
            .collect()
    }
}

/// 预处理管道：PDF目录 + Markdown正文 -> 结构化论文
pub struct StructurePipeline {
    paths: PathsConfig,
}

impl StructurePipeline {
    pub fn new(paths: PathsConfig) -> Self {
        Self { paths }
    }

    /// 构建结构化数据并写入 structured_data.json
    pub fn process(&self, paper: &str, workspace: &PaperWorkspace) -> Option<StructuredDocument> {
        let document = self.build(paper, workspace)?;

        let json_path = workspace.structured_data();
        info!("保存结构化数据到 {}", json_path.display());
        if let Err(e) = artifacts::write_json(&json_path, &document) {
            error!("无法写入JSON文件: {}", e);
        }
        Some(document)
    }

    /// 缺少目录或Markdown时返回 None
    pub fn build(&self, paper: &str, workspace: &PaperWorkspace) -> Option<StructuredDocument> {
        info!("开始处理论文: {}", paper);
        let pdf_path = self.paths.source_pdf(paper);
        let md_path = self.paths.source_markdown(paper);

        // 1. 目录
        let flat_toc = outline::read_outline(&pdf_path);
        if flat_toc.is_empty() {
            warn!("未能从PDF提取目录，预处理中止");
            return None;
        }

        // 2. 层级结构
        let mut sections = build_hierarchy(&flat_toc);
        info!("构建层级目录: {} 个顶层章节", sections.len());

        // 3. Markdown
        let text = match std::fs::read_to_string(&md_path) {
            Ok(text) => text,
            Err(e) => {
                warn!("Markdown文件读取失败 '{}': {}", md_path.display(), e);
                return None;
            }
        };
        let split = split_markdown(&text);
        if split.sections.is_empty() {
            warn!("Markdown中没有可用的章节: {}", md_path.display());
            return None;
        }

        // 4. 填充正文、复制并重命名图表
        let source_dir = md_path.parent().unwrap_or_else(|| Path::new("."));
        let mut store = FsAssetStore::new(source_dir, workspace.root());
        ContentPopulator::new(&split.sections, &mut store).populate(&mut sections);

        Some(StructuredDocument {
            paper_title: title_from_preamble(&split.preamble),
            preamble: split.preamble,
            sections,
        })
    }
}
