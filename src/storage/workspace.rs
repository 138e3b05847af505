use std::path::{Path, PathBuf};

use crate::config::PathsConfig;

/// 单篇论文的输出目录，所有阶段的产物都落在这里
#[derive(Debug, Clone)]
pub struct PaperWorkspace {
    name: String,
    root: PathBuf,
}

impl PaperWorkspace {
    pub fn new(name: &str, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            root: root.into(),
        }
    }

    pub fn from_config(paths: &PathsConfig, paper: &str) -> Self {
        Self::new(paper, paths.output_root(paper))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ensure(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)
    }

    pub fn structured_data(&self) -> PathBuf {
        self.root.join("structured_data.json")
    }

    pub fn section_mapping(&self) -> PathBuf {
        self.root.join("section_mapping.json")
    }

    pub fn image_analysis(&self) -> PathBuf {
        self.root.join("image_analysis.md")
    }

    pub fn content_analysis(&self) -> PathBuf {
        self.root.join("content_analysis.json")
    }

    pub fn insights(&self) -> PathBuf {
        self.root.join("insights.md")
    }

    pub fn final_report(&self) -> PathBuf {
        self.root.join("Final_Report.md")
    }

    /// 内容分析阶段的模型输入输出日志
    pub fn llm_log(&self) -> PathBuf {
        self.root.join("llm_io_log.txt")
    }

    /// 图表的 new_path 相对输出目录
    pub fn asset_path(&self, new_path: &str) -> PathBuf {
        self.root.join(new_path)
    }
}
