use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info, warn};

use super::title::{normalize_title, titles_equal};
use super::{Asset, AssetKind, MarkdownSection, SectionNode};
use crate::utils::{PaperError, PaperResult};

/// 资源在输出目录下的子目录名，同时也是改写后相对路径的前缀
pub const IMAGES_DIR: &str = "images";

/// 图片引用后紧跟一行 "Figure N:" / "Table N:" 图注
static ASSET_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"!\[.*?\]\((.*?)\)\s*\n(Figure|Table)\s*([\d\.]+):\s*(.*)")
        .expect("asset reference regex")
});

/// 资源落盘端口：填充逻辑只决定"复制什么、叫什么名字"，
/// 具体的文件操作由实现方负责，测试中可替换为内存实现。
pub trait AssetStore {
    /// 把 Markdown 中引用的 `original_path` 复制为 `images/<file_name>`
    fn materialize(&mut self, original_path: &str, file_name: &str) -> PaperResult<()>;
}

/// 基于文件系统的资源存储：源路径相对 Markdown 所在目录解析
pub struct FsAssetStore {
    source_dir: PathBuf,
    images_dir: PathBuf,
}

impl FsAssetStore {
    pub fn new(source_dir: impl Into<PathBuf>, dest_dir: impl AsRef<Path>) -> Self {
        Self {
            source_dir: source_dir.into(),
            images_dir: dest_dir.as_ref().join(IMAGES_DIR),
        }
    }
}

impl AssetStore for FsAssetStore {
    fn materialize(&mut self, original_path: &str, file_name: &str) -> PaperResult<()> {
        let source = self.source_dir.join(original_path);
        if !source.exists() {
            return Err(PaperError::AssetMissing(source));
        }

        std::fs::create_dir_all(&self.images_dir)?;
        std::fs::copy(&source, self.images_dir.join(file_name))?;
        Ok(())
    }
}

/// 填充统计，用于日志
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PopulateStats {
    pub matched_nodes: usize,
    pub unmatched_nodes: usize,
    pub assets: usize,
    pub unused_sections: usize,
}

/// 为章节树填充正文与图表资源。
///
/// 一次填充过程共享同一个"已使用"集合：每个 Markdown 章节最多被一个节点消费，
/// 标题重复时先序遍历中靠前的节点胜出。匹配总是扫描全部剩余章节，与树中位置无关。
pub struct ContentPopulator<'a, S: AssetStore> {
    sections: &'a [MarkdownSection],
    normalized: Vec<String>,
    store: &'a mut S,
    used: HashSet<usize>,
    stats: PopulateStats,
}

impl<'a, S: AssetStore> ContentPopulator<'a, S> {
    pub fn new(sections: &'a [MarkdownSection], store: &'a mut S) -> Self {
        let normalized = sections.iter().map(|s| normalize_title(&s.title)).collect();
        Self {
            sections,
            normalized,
            store,
            used: HashSet::new(),
            stats: PopulateStats::default(),
        }
    }

    pub fn populate(mut self, nodes: &mut [SectionNode]) -> PopulateStats {
        self.walk(nodes);
        self.stats.unused_sections = self.sections.len() - self.used.len();
        info!(
            "内容填充完成: 匹配 {} 个节点, 未匹配 {} 个, 资源 {} 个, 未使用的Markdown章节 {} 个",
            self.stats.matched_nodes,
            self.stats.unmatched_nodes,
            self.stats.assets,
            self.stats.unused_sections
        );
        self.stats
    }

    fn walk(&mut self, nodes: &mut [SectionNode]) {
        for node in nodes.iter_mut() {
            self.fill_node(node);
            self.walk(&mut node.subsections);
        }
    }

    fn fill_node(&mut self, node: &mut SectionNode) {
        let wanted = normalize_title(&node.title);
        let found = (0..self.sections.len())
            .find(|i| !self.used.contains(i) && titles_equal(&wanted, &self.normalized[*i]));

        let Some(index) = found else {
            debug!("目录项未找到对应的Markdown章节: {}", node.title);
            self.stats.unmatched_nodes += 1;
            return;
        };

        self.used.insert(index);
        self.stats.matched_nodes += 1;

        let sections = self.sections;
        let (content, assets) = extract_assets(&sections[index].raw_content, &mut *self.store);
        self.stats.assets += assets.len();
        node.content = content;
        node.images = assets;
    }
}

/// 扫描章节原文中的图表引用，生成资源记录、落盘，并把引用路径改写为规范路径
pub fn extract_assets<S: AssetStore + ?Sized>(raw: &str, store: &mut S) -> (String, Vec<Asset>) {
    let mut content = raw.to_string();
    let mut assets = Vec::new();

    for caps in ASSET_REF.captures_iter(raw) {
        let group = |i: usize| caps.get(i).map_or("", |m| m.as_str());
        let original_path = group(1).to_string();
        let kind = AssetKind::from_label(group(2));
        let number = group(3);
        let text = group(4).trim();

        let extension = Path::new(&original_path)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        let file_name = format!("{}_{}{}", kind, number.replace('.', "_"), extension);
        let new_path = format!("{}/{}", IMAGES_DIR, file_name);

        match store.materialize(&original_path, &file_name) {
            Ok(()) => debug!("资源已复制: {} -> {}", original_path, new_path),
            Err(PaperError::AssetMissing(source)) => {
                warn!("找不到源图片文件: {}", source.display());
            }
            Err(e) => warn!("复制文件 '{}' 失败: {}", original_path, e),
        }

        content = content.replace(
            &format!("]({})", original_path),
            &format!("]({})", new_path),
        );

        assets.push(Asset {
            id: format!("{} {}", kind, number),
            new_path,
            original_path,
            caption: format!("{} {}: {}", kind, number, text),
        });
    }

    (content, assets)
}
