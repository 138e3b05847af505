use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const SCHEMA_PATH: &str = "config/schema.toml";

/// 预设分析框架：命中的分类跳过"生成分析要点"这一步
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CategoryPreset {
    pub category: String,
    pub analysis_points: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalysisSchema {
    /// 全局洞察阶段用作"引言"的分类名
    pub introduction_category: String,
    /// 全局洞察阶段用作"结论"的分类名
    pub conclusion_category: String,
    pub presets: Vec<CategoryPreset>,
}

impl AnalysisSchema {
    pub fn load() -> Result<Self> {
        Self::load_from(PathBuf::from(SCHEMA_PATH))
    }

    pub fn load_from(config_path: impl AsRef<Path>) -> Result<Self> {
        let config_path = config_path.as_ref();

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(config_path)?;
        let schema: AnalysisSchema = toml::from_str(&content)?;
        Ok(schema)
    }

    pub fn preset_for(&self, category: &str) -> Option<&[String]> {
        self.presets
            .iter()
            .find(|p| p.category == category && !p.analysis_points.is_empty())
            .map(|p| p.analysis_points.as_slice())
    }
}

impl Default for AnalysisSchema {
    fn default() -> Self {
        Self {
            introduction_category: "研究背景".to_string(),
            conclusion_category: "总体结论".to_string(),
            presets: vec![CategoryPreset {
                category: "研究背景".to_string(),
                analysis_points: vec![
                    "研究问题".to_string(),
                    "研究难点".to_string(),
                    "相关工作".to_string(),
                ],
            }],
        }
    }
}
