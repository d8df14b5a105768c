use std::cmp::Ordering;

use crate::core::{
    clamp_to_char_boundary, node_ref, Document, Editor, ElementKind, ElementNode, Mark, Node,
    Point, Selection, TextNode,
};
use crate::ops::Path;

/// The node at `path`, or `None` when the path no longer resolves.
pub fn node_at<'a>(doc: &'a Document, path: &[usize]) -> Option<&'a Node> {
    node_ref(doc, path)
}

pub fn is_selection_collapsed(editor: &Editor) -> bool {
    editor.selection().is_some_and(Selection::is_collapsed)
}

/// True iff every text leaf intersecting the current selection carries the
/// mark. An intersection-universal check: a single unmarked leaf in the
/// range reports false, as does an empty range or no selection at all.
pub fn is_mark_active(editor: &Editor, mark: Mark) -> bool {
    universal_leaf_check(editor, &|t| t.marks.has(mark))
}

/// True iff every text leaf intersecting the current selection carries a
/// background color. Same universal semantics as [`is_mark_active`].
pub fn is_background_active(editor: &Editor) -> bool {
    universal_leaf_check(editor, &|t| t.marks.background_color.is_some())
}

fn universal_leaf_check(editor: &Editor, check: &dyn Fn(&TextNode) -> bool) -> bool {
    let Some(sel) = editor.selection() else {
        return false;
    };
    let doc = editor.doc();

    if sel.is_collapsed() {
        return match node_ref(doc, &sel.focus.path) {
            Some(Node::Text(t)) => check(t),
            _ => false,
        };
    }

    let (start, end) = unhang(doc, sel);
    let slices = leaf_slices_in_range(doc, &start, &end);
    !slices.is_empty() && slices.iter().all(|s| check(s.leaf))
}

/// True iff every position addressed by the (unhung) selection has an
/// ancestor-or-self element of `kind`.
pub fn is_block_active(editor: &Editor, kind: &ElementKind) -> bool {
    let Some(sel) = editor.selection() else {
        return false;
    };
    let doc = editor.doc();
    let (start, end) = unhang(doc, sel);

    let blocks = text_blocks_in_order(doc);
    let (Some(start_ix), Some(end_ix)) = (
        containing_block_index(&blocks, &start),
        containing_block_index(&blocks, &end),
    ) else {
        return false;
    };

    for block in &blocks[start_ix..=end_ix] {
        let found = (1..=block.path.len()).any(|depth| {
            matches!(
                node_ref(doc, &block.path[..depth]),
                Some(Node::Element(el)) if el.kind.same_kind(kind)
            )
        });
        if !found {
            return false;
        }
    }
    true
}

/// The nearest enclosing link element of the current selection.
pub fn selected_link(editor: &Editor) -> Option<(Path, &ElementNode)> {
    let sel = editor.selection()?;
    let doc = editor.doc();

    for point in [&sel.focus, &sel.anchor] {
        for depth in (1..=point.path.len()).rev() {
            if let Some(Node::Element(el)) = node_ref(doc, &point.path[..depth]) {
                if matches!(el.kind, ElementKind::Link { .. }) {
                    return Some((point.path[..depth].to_vec(), el));
                }
            }
        }
    }
    None
}

/// The first node strictly before `from` in document order that satisfies
/// `pred`, together with its path. Ancestors of `from` are not "before" it
/// and are skipped.
pub fn find_previous<'a>(
    doc: &'a Document,
    from: &[usize],
    pred: &dyn Fn(&Node, &[usize]) -> bool,
) -> Option<(Path, &'a Node)> {
    fn walk<'a>(children: &'a [Node], path: &mut Vec<usize>, out: &mut Vec<(Path, &'a Node)>) {
        for (ix, node) in children.iter().enumerate() {
            path.push(ix);
            out.push((path.clone(), node));
            if let Node::Element(el) = node {
                walk(&el.children, path, out);
            }
            path.pop();
        }
    }

    let mut all: Vec<(Path, &Node)> = Vec::new();
    walk(&doc.children, &mut Vec::new(), &mut all);

    all.into_iter()
        .rev()
        .filter(|(path, _)| path.as_slice() < from)
        .filter(|(path, _)| !(from.starts_with(path) && from.len() > path.len()))
        .find(|(path, node)| pred(node, path))
}

/// The concatenated text covered by the current selection.
pub fn selected_text(editor: &Editor) -> String {
    let Some(sel) = editor.selection() else {
        return String::new();
    };
    if sel.is_collapsed() {
        return String::new();
    }
    let (start, end) = sel.ordered();
    leaf_slices_in_range(editor.doc(), &start, &end)
        .iter()
        .map(|s| &s.leaf.text[s.start..s.end])
        .collect()
}

/// Normalizes a selection whose end sits at the very start of a following
/// block back to the end of the preceding block, so block-containment
/// checks are not fooled by a trailing empty touch. Returns the range
/// ordered by document order.
pub fn unhang(doc: &Document, selection: &Selection) -> (Point, Point) {
    let (start, mut end) = selection.ordered();
    if start == end {
        return (start, end);
    }

    let blocks = text_blocks_in_order(doc);
    loop {
        if end.offset != 0 {
            break;
        }
        let (Some(start_ix), Some(end_ix)) = (
            containing_block_index(&blocks, &start),
            containing_block_index(&blocks, &end),
        ) else {
            break;
        };
        if end_ix <= start_ix {
            break;
        }
        let end_block = &blocks[end_ix];
        let rel = &end.path[end_block.path.len()..];
        if global_offset_at(&end_block.el.children, rel, end.offset) != 0 {
            break;
        }

        let prev = &blocks[end_ix - 1];
        let len = inline_text_len(&prev.el.children);
        let (rel_path, offset) = point_at_global(&prev.el.children, len);
        let mut path = prev.path.clone();
        path.extend(rel_path);
        end = Point::new(path, offset);
        if end.cmp_document_order(&start) == Ordering::Less {
            end = start.clone();
            break;
        }
    }

    (start, end)
}

pub(crate) struct TextBlock<'a> {
    pub path: Path,
    pub el: &'a ElementNode,
}

pub(crate) fn element_is_text_block(el: &ElementNode) -> bool {
    el.kind.is_text_block()
        || (!el.kind.is_container() && el.children.iter().any(Node::is_text))
}

/// All block-level elements with inline content, in document order.
pub(crate) fn text_blocks_in_order(doc: &Document) -> Vec<TextBlock<'_>> {
    fn walk<'a>(nodes: &'a [Node], path: &mut Vec<usize>, out: &mut Vec<TextBlock<'a>>) {
        for (ix, node) in nodes.iter().enumerate() {
            let Node::Element(el) = node else {
                continue;
            };

            path.push(ix);
            if element_is_text_block(el) {
                out.push(TextBlock {
                    path: path.clone(),
                    el,
                });
            } else {
                walk(&el.children, path, out);
            }
            path.pop();
        }
    }

    let mut out = Vec::new();
    walk(&doc.children, &mut Vec::new(), &mut out);
    out
}

/// Index of the text block whose subtree contains `point`.
pub(crate) fn containing_block_index(blocks: &[TextBlock<'_>], point: &Point) -> Option<usize> {
    blocks.iter().position(|b| {
        point.path.len() > b.path.len() && point.path.starts_with(&b.path)
    })
}

/// Total text length of a block's inline content, including leaves nested
/// inside inline elements.
pub(crate) fn inline_text_len(children: &[Node]) -> usize {
    children
        .iter()
        .map(|node| match node {
            Node::Text(t) => t.text.len(),
            Node::Element(el) => inline_text_len(&el.children),
        })
        .sum()
}

/// Maps a block-relative leaf position to a global text offset within the
/// block's inline content.
pub(crate) fn global_offset_at(children: &[Node], rel_path: &[usize], offset: usize) -> usize {
    let Some((&target, rest)) = rel_path.split_first() else {
        return 0;
    };

    let mut global = 0usize;
    for (ix, node) in children.iter().enumerate() {
        if ix < target {
            global += match node {
                Node::Text(t) => t.text.len(),
                Node::Element(el) => inline_text_len(&el.children),
            };
            continue;
        }
        match node {
            Node::Text(t) => {
                global += clamp_to_char_boundary(&t.text, offset.min(t.text.len()));
            }
            Node::Element(el) => {
                if !rest.is_empty() {
                    global += global_offset_at(&el.children, rest, offset);
                }
            }
        }
        break;
    }
    global
}

fn provides_text_position(node: &Node) -> bool {
    match node {
        Node::Text(_) => true,
        Node::Element(el) => el.children.iter().any(provides_text_position),
    }
}

fn has_text_after(children: &[Node], ix: usize) -> bool {
    children[ix + 1..].iter().any(provides_text_position)
}

/// Maps a global text offset back to a block-relative leaf position. At a
/// leaf boundary the start of the following leaf is preferred, so a point
/// at the end of an inline element lands after it rather than inside.
pub(crate) fn point_at_global(children: &[Node], global: usize) -> (Vec<usize>, usize) {
    fn walk(children: &[Node], remaining: &mut usize, rel: &mut Vec<usize>) -> bool {
        for (ix, node) in children.iter().enumerate() {
            match node {
                Node::Text(t) => {
                    if *remaining < t.text.len() {
                        rel.push(ix);
                        *remaining = clamp_to_char_boundary(&t.text, *remaining);
                        return true;
                    }
                    if *remaining == t.text.len()
                        && (!has_text_after(children, ix) || matches!(children.get(ix + 1), Some(Node::Text(_))))
                    {
                        if let Some(Node::Text(_)) = children.get(ix + 1) {
                            rel.push(ix + 1);
                            *remaining = 0;
                        } else {
                            rel.push(ix);
                        }
                        return true;
                    }
                    *remaining -= t.text.len();
                }
                Node::Element(el) => {
                    let len = inline_text_len(&el.children);
                    if *remaining < len
                        || (*remaining == len && len > 0 && !has_text_after(children, ix))
                    {
                        rel.push(ix);
                        if walk(&el.children, remaining, rel) {
                            return true;
                        }
                        rel.pop();
                    }
                    *remaining = remaining.saturating_sub(len);
                }
            }
        }
        false
    }

    fn last_text_point(children: &[Node], rel: &mut Vec<usize>) -> bool {
        for (ix, node) in children.iter().enumerate().rev() {
            match node {
                Node::Text(t) => {
                    rel.push(ix);
                    rel.push(t.text.len());
                    return true;
                }
                Node::Element(el) => {
                    rel.push(ix);
                    if last_text_point(&el.children, rel) {
                        return true;
                    }
                    rel.pop();
                }
            }
        }
        false
    }

    let mut rel = Vec::new();
    let mut remaining = global;
    if walk(children, &mut remaining, &mut rel) {
        return (rel, remaining);
    }

    // Fall back to the end of the last text leaf.
    let mut rel = Vec::new();
    if last_text_point(children, &mut rel) {
        let offset = rel.pop().unwrap_or(0);
        return (rel, offset);
    }
    (vec![0], 0)
}

pub(crate) struct LeafSlice<'a> {
    pub leaf: &'a TextNode,
    pub start: usize,
    pub end: usize,
}

/// Text leaves intersected by `[start, end)`, with per-leaf byte bounds.
pub(crate) fn leaf_slices_in_range<'a>(
    doc: &'a Document,
    start: &Point,
    end: &Point,
) -> Vec<LeafSlice<'a>> {
    let blocks = text_blocks_in_order(doc);
    let (Some(start_ix), Some(end_ix)) = (
        containing_block_index(&blocks, start),
        containing_block_index(&blocks, end),
    ) else {
        return Vec::new();
    };
    if end_ix < start_ix {
        return Vec::new();
    }

    fn collect<'a>(
        children: &'a [Node],
        cursor: &mut usize,
        start_global: usize,
        end_global: usize,
        out: &mut Vec<LeafSlice<'a>>,
    ) {
        for node in children {
            match node {
                Node::Text(t) => {
                    let node_start = *cursor;
                    let node_end = node_start + t.text.len();
                    *cursor = node_end;
                    if node_start >= end_global || node_end <= start_global {
                        continue;
                    }
                    let from = clamp_to_char_boundary(
                        &t.text,
                        start_global.saturating_sub(node_start).min(t.text.len()),
                    );
                    let to = clamp_to_char_boundary(
                        &t.text,
                        end_global.saturating_sub(node_start).min(t.text.len()),
                    );
                    if from < to {
                        out.push(LeafSlice {
                            leaf: t,
                            start: from,
                            end: to,
                        });
                    }
                }
                Node::Element(el) => {
                    collect(&el.children, cursor, start_global, end_global, out);
                }
            }
        }
    }

    let mut out = Vec::new();
    for (block_ix, block) in blocks
        .iter()
        .enumerate()
        .take(end_ix + 1)
        .skip(start_ix)
    {
        let children = block.el.children.as_slice();
        let total = inline_text_len(children);
        let start_global = if block_ix == start_ix {
            global_offset_at(children, &start.path[block.path.len()..], start.offset)
        } else {
            0
        };
        let end_global = if block_ix == end_ix {
            global_offset_at(children, &end.path[block.path.len()..], end.offset)
        } else {
            total
        };
        if start_global >= end_global {
            continue;
        }
        let mut cursor = 0usize;
        collect(children, &mut cursor, start_global, end_global, &mut out);
    }
    out
}

/// All text leaves in document order.
pub(crate) fn text_leaves_in_order(doc: &Document) -> Vec<(Path, &TextNode)> {
    fn walk<'a>(children: &'a [Node], path: &mut Vec<usize>, out: &mut Vec<(Path, &'a TextNode)>) {
        for (ix, node) in children.iter().enumerate() {
            path.push(ix);
            match node {
                Node::Text(t) => out.push((path.clone(), t)),
                Node::Element(el) => walk(&el.children, path, out),
            }
            path.pop();
        }
    }

    let mut out = Vec::new();
    walk(&doc.children, &mut Vec::new(), &mut out);
    out
}
