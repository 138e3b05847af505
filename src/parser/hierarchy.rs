use super::{OutlineEntry, SectionNode};

/// 将扁平目录转换为嵌套章节树，缩进级别作为层级信号。
///
/// 栈中保存当前的祖先链；新条目到来时弹出所有缩进 >= 自身的节点，
/// 被弹出的节点此时才挂到其父节点（或根列表）上，因此兄弟顺序与输入一致。
/// 缩进跳级（0 -> 2）直接成为子节点，不补中间层。
pub fn build_hierarchy(entries: &[OutlineEntry]) -> Vec<SectionNode> {
    let mut roots: Vec<SectionNode> = Vec::new();
    let mut stack: Vec<(SectionNode, usize)> = Vec::new();

    for entry in entries {
        while stack.last().is_some_and(|(_, indent)| *indent >= entry.indent) {
            if let Some((node, _)) = stack.pop() {
                attach(&mut stack, &mut roots, node);
            }
        }

        let node = SectionNode::new(&entry.title, entry.page, entry.indent + 1);
        stack.push((node, entry.indent));
    }

    while let Some((node, _)) = stack.pop() {
        attach(&mut stack, &mut roots, node);
    }

    roots
}

fn attach(stack: &mut [(SectionNode, usize)], roots: &mut Vec<SectionNode>, node: SectionNode) {
    match stack.last_mut() {
        Some((parent, _)) => parent.subsections.push(node),
        None => roots.push(node),
    }
}
