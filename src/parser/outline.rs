use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{info, warn};

use super::OutlineEntry;
use crate::utils::PaperResult;

/// 防止畸形PDF中的循环引用
const MAX_OUTLINE_DEPTH: usize = 64;
const MAX_NAMED_DEST_HOPS: usize = 8;

/// PDF原生书签树中的一项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineItem {
    pub title: String,
    /// 1-based 页码；目标无法解析时为 None
    pub page: Option<u32>,
    pub children: Vec<OutlineItem>,
}

/// 从PDF提取扁平目录。文件不存在、没有书签或解析失败时返回空列表并记录日志。
pub fn read_outline(pdf_path: &Path) -> Vec<OutlineEntry> {
    if !pdf_path.exists() {
        warn!("PDF文件未找到: {}", pdf_path.display());
        return Vec::new();
    }

    match load_outline(pdf_path) {
        Ok(items) if items.is_empty() => {
            warn!("PDF '{}' 没有可提取的目录(outline)", pdf_path.display());
            Vec::new()
        }
        Ok(items) => {
            let entries = flatten_outline(&items);
            info!("从PDF提取到 {} 个目录项", entries.len());
            entries
        }
        Err(e) => {
            warn!("处理PDF时发生错误: {}", e);
            Vec::new()
        }
    }
}

pub fn load_outline(pdf_path: &Path) -> PaperResult<Vec<OutlineItem>> {
    let doc = Document::load(pdf_path)?;
    Ok(outline_items(&doc))
}

/// 沿 /Outlines -> /First，按 /First（子）与 /Next（兄弟）遍历书签树
pub fn outline_items(doc: &Document) -> Vec<OutlineItem> {
    let Some(first) = catalog(doc)
        .and_then(|cat| cat.get(b"Outlines").ok())
        .and_then(|obj| deref(doc, obj))
        .and_then(|obj| obj.as_dict().ok())
        .and_then(|outlines| outlines.get(b"First").ok())
        .and_then(|obj| obj.as_reference().ok())
    else {
        return Vec::new();
    };

    let pages: HashMap<ObjectId, u32> = doc
        .get_pages()
        .into_iter()
        .map(|(number, id)| (id, number))
        .collect();
    let mut visited = HashSet::new();
    walk_outline(doc, first, 0, &pages, &mut visited)
}

fn walk_outline(
    doc: &Document,
    first: ObjectId,
    depth: usize,
    pages: &HashMap<ObjectId, u32>,
    visited: &mut HashSet<ObjectId>,
) -> Vec<OutlineItem> {
    let mut items = Vec::new();
    if depth >= MAX_OUTLINE_DEPTH {
        return items;
    }

    let mut current = Some(first);
    while let Some(id) = current {
        if !visited.insert(id) {
            break;
        }
        let Some(node) = doc.get_object(id).ok().and_then(|obj| obj.as_dict().ok()) else {
            break;
        };

        let title = node
            .get(b"Title")
            .ok()
            .and_then(|obj| deref(doc, obj))
            .and_then(decode_text)
            .unwrap_or_default();
        let page = destination_page(doc, node, pages);
        let children = match node.get(b"First").and_then(|obj| obj.as_reference()) {
            Ok(child) => walk_outline(doc, child, depth + 1, pages, visited),
            Err(_) => Vec::new(),
        };

        items.push(OutlineItem {
            title: title.trim().to_string(),
            page,
            children,
        });

        current = node.get(b"Next").and_then(|obj| obj.as_reference()).ok();
    }

    items
}

/// 嵌套层数即缩进级别；页码无法解析的条目被跳过，但其子项照常保留
pub fn flatten_outline(items: &[OutlineItem]) -> Vec<OutlineEntry> {
    let mut entries = Vec::new();
    flatten_into(items, 0, &mut entries);
    entries
}

fn flatten_into(items: &[OutlineItem], indent: usize, entries: &mut Vec<OutlineEntry>) {
    for item in items {
        match item.page {
            Some(page) => entries.push(OutlineEntry {
                title: item.title.clone(),
                page,
                indent,
            }),
            None => warn!("因无法解析页码跳过一个目录项 '{}'", item.title),
        }
        flatten_into(&item.children, indent + 1, entries);
    }
}

/// 先看 /Dest，再看 /A 中的 GoTo 动作
fn destination_page(doc: &Document, node: &Dictionary, pages: &HashMap<ObjectId, u32>) -> Option<u32> {
    if let Ok(dest) = node.get(b"Dest") {
        if let Some(page) = resolve_dest(doc, dest, pages, 0) {
            return Some(page);
        }
    }

    let action = node.get(b"A").ok().and_then(|obj| deref(doc, obj))?.as_dict().ok()?;
    let kind = action.get(b"S").ok()?.as_name().ok()?;
    if kind != b"GoTo" {
        return None;
    }
    resolve_dest(doc, action.get(b"D").ok()?, pages, 0)
}

fn resolve_dest(doc: &Document, dest: &Object, pages: &HashMap<ObjectId, u32>, hops: usize) -> Option<u32> {
    if hops > MAX_NAMED_DEST_HOPS {
        return None;
    }

    match deref(doc, dest)? {
        // [pageRef /XYZ left top zoom] 之类的显式目标
        Object::Array(arr) => match arr.first()? {
            Object::Reference(page_id) => pages.get(page_id).copied(),
            Object::Integer(index) => u32::try_from(*index).ok().map(|i| i + 1),
            _ => None,
        },
        Object::Dictionary(dict) => resolve_dest(doc, dict.get(b"D").ok()?, pages, hops + 1),
        Object::String(bytes, _) | Object::Name(bytes) => {
            let target = lookup_named_dest(doc, bytes)?;
            resolve_dest(doc, target, pages, hops + 1)
        }
        _ => None,
    }
}

/// 旧式 /Dests 字典，或 /Names -> /Dests 名称树
fn lookup_named_dest<'a>(doc: &'a Document, name: &[u8]) -> Option<&'a Object> {
    let catalog = catalog(doc)?;

    if let Some(dests) = catalog
        .get(b"Dests")
        .ok()
        .and_then(|obj| deref(doc, obj))
        .and_then(|obj| obj.as_dict().ok())
    {
        if let Ok(found) = dests.get(name) {
            return Some(found);
        }
    }

    let tree = catalog
        .get(b"Names")
        .ok()
        .and_then(|obj| deref(doc, obj))
        .and_then(|obj| obj.as_dict().ok())?
        .get(b"Dests")
        .ok()
        .and_then(|obj| deref(doc, obj))?
        .as_dict()
        .ok()?;
    search_name_tree(doc, tree, name, 0)
}

fn search_name_tree<'a>(doc: &'a Document, node: &'a Dictionary, name: &[u8], depth: usize) -> Option<&'a Object> {
    if depth >= MAX_OUTLINE_DEPTH {
        return None;
    }

    if let Some(names) = node
        .get(b"Names")
        .ok()
        .and_then(|obj| deref(doc, obj))
        .and_then(|obj| obj.as_array().ok())
    {
        for pair in names.chunks(2) {
            if let [Object::String(key, _), value] = pair {
                if key.as_slice() == name {
                    return Some(value);
                }
            }
        }
    }

    let kids = node
        .get(b"Kids")
        .ok()
        .and_then(|obj| deref(doc, obj))
        .and_then(|obj| obj.as_array().ok())?;
    kids.iter()
        .filter_map(|kid| deref(doc, kid).and_then(|obj| obj.as_dict().ok()))
        .find_map(|kid| search_name_tree(doc, kid, name, depth + 1))
}

fn catalog(doc: &Document) -> Option<&Dictionary> {
    let root = doc.trailer.get(b"Root").ok()?;
    deref(doc, root)?.as_dict().ok()
}

fn deref<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

/// PDF文本字符串：带BOM的UTF-16BE，否则UTF-8，再否则按Latin-1
fn decode_text(obj: &Object) -> Option<String> {
    let bytes = match obj {
        Object::String(bytes, _) => bytes,
        Object::Name(name) => return Some(String::from_utf8_lossy(name).into_owned()),
        _ => return None,
    };

    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        return Some(String::from_utf16_lossy(&units));
    }

    match std::str::from_utf8(bytes) {
        Ok(s) => Some(s.to_string()),
        Err(_) => Some(bytes.iter().map(|&b| b as char).collect()),
    }
}
