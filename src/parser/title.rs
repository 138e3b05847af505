//! 标题规范化与匹配
//!
//! 目录(outline)与Markdown标题之间常有编号、标点、大小写差异，
//! 匹配前统一走 [`normalize_title`]。

/// 规范化标题："2.1. Overview" -> "overview"
///
/// 依次：转小写、去掉标点（保留字母、数字、下划线和空白）、
/// 去掉开头的编号与空白、去掉结尾空白。先去标点再剥编号，
/// 保证 `normalize_title(normalize_title(x)) == normalize_title(x)`。
pub fn normalize_title(title: &str) -> String {
    let lowered = title.to_lowercase();
    let without_punct: String = lowered
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect();

    without_punct
        .trim_start_matches(|c: char| c.is_numeric() || c.is_whitespace())
        .trim_end()
        .to_string()
}

/// 精确匹配：内容填充阶段使用
pub fn titles_equal(normalized_a: &str, normalized_b: &str) -> bool {
    normalized_a == normalized_b
}

/// 双向包含匹配：章节检索阶段使用。
///
/// 任一方是另一方的子串即视为匹配；空标题不匹配任何目标。
pub fn titles_overlap(normalized_candidate: &str, normalized_target: &str) -> bool {
    if normalized_candidate.is_empty() || normalized_target.is_empty() {
        return false;
    }
    normalized_target.contains(normalized_candidate) || normalized_candidate.contains(normalized_target)
}
