pub mod content;
pub mod image;
pub mod insight;
pub mod report;
pub mod structure;

pub use content::analyze_content;
pub use image::analyze_images;
pub use insight::analyze_insight;
pub use report::generate_report;
pub use structure::analyze_structure;

use tracing::error;

use crate::parser::{SectionMapping, StructuredDocument};
use crate::storage::{artifacts, PaperWorkspace};

pub const UNKNOWN_TITLE: &str = "未知标题";

fn load_structured(workspace: &PaperWorkspace) -> Option<StructuredDocument> {
    let path = workspace.structured_data();
    match artifacts::read_json(&path) {
        Ok(Some(document)) => Some(document),
        Ok(None) => {
            error!("找不到结构化数据文件: {}", path.display());
            None
        }
        Err(e) => {
            error!("解析结构化数据失败 {}: {}", path.display(), e);
            None
        }
    }
}

/// 映射文件缺失、损坏或为空都视为不可用
fn load_mapping(workspace: &PaperWorkspace) -> Option<SectionMapping> {
    let path = workspace.section_mapping();
    match artifacts::read_json::<SectionMapping>(&path) {
        Ok(Some(mapping)) if !mapping.is_empty() => Some(mapping),
        Ok(_) => {
            error!("章节映射不存在或为空: {}", path.display());
            None
        }
        Err(e) => {
            error!("解析章节映射失败 {}: {}", path.display(), e);
            None
        }
    }
}

fn display_title(document: &StructuredDocument) -> &str {
    if document.paper_title.trim().is_empty() {
        UNKNOWN_TITLE
    } else {
        &document.paper_title
    }
}
