use std::collections::HashSet;

use super::title::{normalize_title, titles_overlap};
use super::SectionNode;

/// 一个分析分类在章节树中对应的原文与图表
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedSection {
    pub content: String,
    /// 去重后的图表ID（保留首次出现的顺序）
    pub image_ids: Vec<String>,
}

/// 根据候选标题列表，从章节树中收集所有相关章节的原文和图表ID。
///
/// 先序遍历整棵树，节点标题与任一目标标题双向包含即命中；
/// 无论是否命中都继续进入子章节，所以祖先与后代可能同时命中，
/// 各自的正文都会被拼接。
pub fn resolve_sections<T: AsRef<str>>(target_titles: &[T], sections: &[SectionNode]) -> ResolvedSection {
    let targets: HashSet<String> = target_titles
        .iter()
        .map(|t| normalize_title(t.as_ref()))
        .filter(|t| !t.is_empty())
        .collect();

    let mut collector = Collector {
        targets,
        content: String::new(),
        image_ids: Vec::new(),
        seen_ids: HashSet::new(),
    };
    if !collector.targets.is_empty() {
        collector.visit(sections);
    }

    ResolvedSection {
        content: collector.content.trim().to_string(),
        image_ids: collector.image_ids,
    }
}

struct Collector {
    targets: HashSet<String>,
    content: String,
    image_ids: Vec<String>,
    seen_ids: HashSet<String>,
}

impl Collector {
    fn visit(&mut self, sections: &[SectionNode]) {
        for section in sections {
            let title = normalize_title(&section.title);
            if self.targets.iter().any(|target| titles_overlap(&title, target)) {
                self.content.push_str(&section.content);
                self.content.push_str("\n\n");
                for image in &section.images {
                    if self.seen_ids.insert(image.id.clone()) {
                        self.image_ids.push(image.id.clone());
                    }
                }
            }

            self.visit(&section.subsections);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Asset;

    fn section(title: &str, content: &str, image_ids: &[&str]) -> SectionNode {
        let mut node = SectionNode::new(title, 1, 1);
        node.content = content.to_string();
        node.images = image_ids
            .iter()
            .map(|id| Asset {
                id: id.to_string(),
                new_path: String::new(),
                original_path: String::new(),
                caption: String::new(),
            })
            .collect();
        node
    }

    #[test]
    fn target_contained_in_node_title_matches() {
        let tree = vec![
            section("1 Research Background and Motivation", "bg text", &[]),
            section("bg", "should not match", &[]),
        ];

        let resolved = resolve_sections(&["background"], &tree);
        assert_eq!(resolved.content, "bg text");
    }

    #[test]
    fn node_title_contained_in_target_matches() {
        let tree = vec![section("Conclusion", "the end", &["Figure 7"])];

        let resolved = resolve_sections(&["Conclusion and Future Work"], &tree);
        assert_eq!(resolved.content, "the end");
        assert_eq!(resolved.image_ids, vec!["Figure 7".to_string()]);
    }

    #[test]
    fn non_matching_root_still_yields_matching_grandchild() {
        let mut child = section("3.1 Setup", "", &[]);
        child.subsections.push(section("3.1.1 Datasets", "datasets used", &["Table 1"]));
        let mut root = section("3 Experiments", "", &[]);
        root.subsections.push(child);

        let resolved = resolve_sections(&["Datasets"], &[root]);
        assert_eq!(resolved.content, "datasets used");
        assert_eq!(resolved.image_ids, vec!["Table 1".to_string()]);
    }

    #[test]
    fn matching_ancestor_and_descendant_both_contribute() {
        let mut root = section("Method", "parent body", &["Figure 1"]);
        root.subsections.push(section("Method Details", "child body", &["Figure 1", "Figure 2"]));

        let resolved = resolve_sections(&["method"], &[root]);
        assert_eq!(resolved.content, "parent body\n\nchild body");
        assert_eq!(resolved.image_ids, vec!["Figure 1".to_string(), "Figure 2".to_string()]);
    }

    #[test]
    fn duplicate_figure_ids_are_removed() {
        let tree = vec![
            section("Results", "a", &["Figure 3"]),
            section("Results Analysis", "b", &["Figure 3"]),
        ];

        let resolved = resolve_sections(&["results"], &tree);
        assert_eq!(resolved.image_ids.len(), 1);
        let unique: HashSet<&String> = resolved.image_ids.iter().collect();
        assert_eq!(unique.len(), resolved.image_ids.len());
    }

    #[test]
    fn empty_targets_give_empty_result() {
        let tree = vec![section("Introduction", "intro", &["Figure 1"])];
        let empty: [&str; 0] = [];

        assert_eq!(resolve_sections(&empty, &tree), ResolvedSection::default());
        assert_eq!(resolve_sections(&["", "  "], &tree), ResolvedSection::default());
    }

    #[test]
    fn numbering_drift_is_tolerated() {
        let tree = vec![section("2. Related Work", "prior art", &[])];
        let resolved = resolve_sections(&["Related Work".to_string()], &tree);
        assert_eq!(resolved.content, "prior art");
    }

    #[test]
    fn empty_tree_gives_empty_result() {
        assert_eq!(resolve_sections(&["Introduction"], &[]), ResolvedSection::default());
    }

    #[test]
    fn numeric_only_titles_never_match() {
        // 只剩编号的标题归一化后为空，既不作为目标也不作为候选
        let tree = vec![section("3 Method", "method body", &["Figure 2"])];
        assert_eq!(resolve_sections(&["3."], &tree), ResolvedSection::default());

        let tree = vec![section("5", "numbered only", &["Figure 5"])];
        assert_eq!(resolve_sections(&["5 Conclusion"], &tree), ResolvedSection::default());
        assert_eq!(resolve_sections(&["5"], &tree), ResolvedSection::default());
    }
}
