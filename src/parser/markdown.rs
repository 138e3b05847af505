use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, warn};

use super::{MarkdownSection, SplitMarkdown};

/// 以一个或多个 `#` 开头、后跟空白的行
static HEADING_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#+\s").expect("heading line regex"));

/// 章节块的首行标题
static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#+)\s+(.*)").expect("heading regex"));

/// 按 ATX 标题切分 Markdown 全文。
///
/// 切分点位于标题行之前，标题行归属于其后的章节块；
/// 第一个标题之前的文本作为 preamble。
pub fn split_markdown(text: &str) -> SplitMarkdown {
    let mut boundaries: Vec<usize> = Vec::new();
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if HEADING_LINE.is_match(line) {
            boundaries.push(offset);
        }
        offset += line.len();
    }

    let first = boundaries.first().copied().unwrap_or(text.len());
    let preamble = text[..first].trim().to_string();

    let mut sections = Vec::with_capacity(boundaries.len());
    for (i, &start) in boundaries.iter().enumerate() {
        let end = boundaries.get(i + 1).copied().unwrap_or(text.len());
        let chunk = text[start..end].trim();
        if chunk.is_empty() {
            continue;
        }

        match parse_chunk(chunk) {
            Some(section) => sections.push(section),
            None => {
                let preview: String = chunk.chars().take(50).collect();
                warn!("无法解析Markdown章节: '{}...'", preview);
            }
        }
    }

    debug!("Markdown切分完成: {} 个章节", sections.len());
    SplitMarkdown { preamble, sections }
}

fn parse_chunk(chunk: &str) -> Option<MarkdownSection> {
    let caps = HEADING.captures(chunk)?;
    let level = caps.get(1)?.as_str().len();
    let title = caps
        .get(2)?
        .as_str()
        .lines()
        .next()
        .unwrap_or_default()
        .trim()
        .to_string();

    Some(MarkdownSection {
        title,
        level,
        raw_content: chunk.to_string(),
    })
}
