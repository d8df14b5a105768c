use std::ops::Range;

use thiserror::Error;
use unicode_segmentation::UnicodeSegmentation;

use crate::core::{
    clamp_to_char_boundary, ApplyError, Editor, ElementKind, ElementNode, Mark, Marks, Node,
    Point, Selection, TextNode,
};
use crate::ops::{Op, Path, Transaction};
use crate::query::{
    containing_block_index, global_offset_at, inline_text_len, node_at, point_at_global,
    text_blocks_in_order, text_leaves_in_order, unhang,
};

const MAX_UNWRAP_ITERATIONS: usize = 32;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("no selection")]
    NoSelection,
    #[error("selection is not inside a text block")]
    NotInTextBlock,
    #[error("selection must be collapsed")]
    NotCollapsed,
    #[error("selection spans multiple blocks")]
    CrossBlockSelection,
    #[error("target path does not exist: {0:?}")]
    MissingTarget(Path),
    #[error("`{0}` cannot contain block children")]
    InvalidWrapper(ElementKind),
    #[error("cannot insert a mix of inline and block nodes")]
    MixedInsert,
    #[error(transparent)]
    Apply(#[from] ApplyError),
}

/// A partial update merged into the marks of matched text leaves. Fields
/// left as `None` keep the leaf's current value.
#[derive(Debug, Clone, Default)]
pub struct MarkPatch {
    pub bold: Option<bool>,
    pub italic: Option<bool>,
    pub strikethrough: Option<bool>,
    pub background_color: Option<Option<String>>,
}

impl MarkPatch {
    pub fn mark(mark: Mark, on: bool) -> Self {
        let mut patch = Self::default();
        match mark {
            Mark::Bold => patch.bold = Some(on),
            Mark::Italic => patch.italic = Some(on),
            Mark::Strikethrough => patch.strikethrough = Some(on),
        }
        patch
    }

    pub fn background(color: Option<String>) -> Self {
        Self {
            background_color: Some(color),
            ..Self::default()
        }
    }

    pub fn apply(&self, marks: &Marks) -> Marks {
        let mut next = marks.clone();
        if let Some(v) = self.bold {
            next.is_bold = v;
        }
        if let Some(v) = self.italic {
            next.is_italic = v;
        }
        if let Some(v) = self.strikethrough {
            next.is_strikethrough = v;
        }
        if let Some(v) = &self.background_color {
            next.background_color = v.clone();
        }
        next
    }
}

/// What `set_nodes` merges into matched nodes: a mark patch applies to text
/// leaves, a retype replaces an element's kind while keeping its children.
#[derive(Debug, Clone)]
pub enum Props {
    Marks(MarkPatch),
    Retype(ElementKind),
}

pub type MatchFn<'a> = &'a dyn Fn(&Node, &[usize]) -> bool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveUnit {
    /// One Unicode code point at a time; steps across an inline element's
    /// boundary without landing inside it.
    Offset,
    /// One grapheme cluster at a time.
    Character,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Start,
    End,
}

/// Merges `props` into every matched node in the current selection. With
/// `split` set, a mark patch falling inside a text leaf splits the leaf at
/// the range boundaries first so only the selected portion is touched.
pub fn set_nodes(
    editor: &mut Editor,
    props: Props,
    match_fn: Option<MatchFn<'_>>,
    split: bool,
) -> Result<(), TransformError> {
    match props {
        Props::Marks(patch) => set_marks_in_selection(editor, &patch, match_fn, split),
        Props::Retype(kind) => retype_selected_blocks(editor, kind, match_fn),
    }
}

fn set_marks_in_selection(
    editor: &mut Editor,
    patch: &MarkPatch,
    match_fn: Option<MatchFn<'_>>,
    split: bool,
) -> Result<(), TransformError> {
    let Some(sel) = editor.selection().cloned() else {
        return Ok(());
    };
    if sel.is_collapsed() {
        return Ok(());
    }

    let (ops, selection_after) = {
        let doc = editor.doc();
        let (start, end) = unhang(doc, &sel);
        let blocks = text_blocks_in_order(doc);
        let (Some(start_ix), Some(end_ix)) = (
            containing_block_index(&blocks, &start),
            containing_block_index(&blocks, &end),
        ) else {
            return Err(TransformError::NotInTextBlock);
        };

        let mut ops: Vec<Op> = Vec::new();
        let mut new_anchor = sel.anchor.clone();
        let mut new_focus = sel.focus.clone();

        for (block_ix, block) in blocks.iter().enumerate().take(end_ix + 1).skip(start_ix) {
            let children = block.el.children.as_slice();
            let total = inline_text_len(children);
            if total == 0 {
                continue;
            }
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
            let mut abs_path = block.path.clone();
            let new_children = map_marks_in_children(
                children,
                &mut cursor,
                start_global,
                end_global,
                split,
                patch,
                match_fn,
                &mut abs_path,
            );

            ops.extend(replace_children_ops(&block.path, children.len(), &new_children));

            for (old_point, new_point) in [
                (&sel.anchor, &mut new_anchor),
                (&sel.focus, &mut new_focus),
            ] {
                if old_point.path.len() > block.path.len()
                    && old_point.path.starts_with(&block.path)
                {
                    let global = global_offset_at(
                        children,
                        &old_point.path[block.path.len()..],
                        old_point.offset,
                    );
                    let (rel, offset) = point_at_global(&new_children, global);
                    let mut path = block.path.clone();
                    path.extend(rel);
                    *new_point = Point::new(path, offset);
                }
            }
        }

        (
            ops,
            Selection {
                anchor: new_anchor,
                focus: new_focus,
            },
        )
    };

    if ops.is_empty() {
        return Ok(());
    }
    editor.apply(
        Transaction::new(ops)
            .selection_after(selection_after)
            .source("transform:set_nodes"),
    )?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn map_marks_in_children(
    children: &[Node],
    cursor: &mut usize,
    start: usize,
    end: usize,
    split: bool,
    patch: &MarkPatch,
    match_fn: Option<MatchFn<'_>>,
    abs_path: &mut Vec<usize>,
) -> Vec<Node> {
    let mut out: Vec<Node> = Vec::new();

    for (ix, node) in children.iter().enumerate() {
        abs_path.push(ix);
        match node {
            Node::Element(el) => {
                let inner = map_marks_in_children(
                    &el.children,
                    cursor,
                    start,
                    end,
                    split,
                    patch,
                    match_fn,
                    abs_path,
                );
                out.push(Node::Element(ElementNode {
                    kind: el.kind.clone(),
                    children: inner,
                }));
            }
            Node::Text(t) => {
                let node_start = *cursor;
                let node_end = node_start + t.text.len();
                *cursor = node_end;

                let matched = match_fn.map_or(true, |f| f(node, abs_path));
                if !matched || node_end <= start || node_start >= end || t.text.is_empty() {
                    out.push(node.clone());
                    abs_path.pop();
                    continue;
                }

                let (sel_start, sel_end) = if split {
                    (
                        clamp_to_char_boundary(
                            &t.text,
                            start.saturating_sub(node_start).min(t.text.len()),
                        ),
                        clamp_to_char_boundary(
                            &t.text,
                            end.saturating_sub(node_start).min(t.text.len()),
                        ),
                    )
                } else {
                    (0, t.text.len())
                };

                if sel_start == 0 && sel_end == t.text.len() {
                    out.push(Node::Text(TextNode {
                        text: t.text.clone(),
                        marks: patch.apply(&t.marks),
                    }));
                    abs_path.pop();
                    continue;
                }

                let prefix = &t.text[..sel_start];
                let middle = &t.text[sel_start..sel_end];
                let suffix = &t.text[sel_end..];

                if !prefix.is_empty() {
                    out.push(Node::Text(TextNode {
                        text: prefix.to_string(),
                        marks: t.marks.clone(),
                    }));
                }
                if !middle.is_empty() {
                    out.push(Node::Text(TextNode {
                        text: middle.to_string(),
                        marks: patch.apply(&t.marks),
                    }));
                }
                if !suffix.is_empty() {
                    out.push(Node::Text(TextNode {
                        text: suffix.to_string(),
                        marks: t.marks.clone(),
                    }));
                }
            }
        }
        abs_path.pop();
    }

    if out.is_empty() {
        out.push(Node::text(""));
    }
    out
}

fn retype_selected_blocks(
    editor: &mut Editor,
    kind: ElementKind,
    match_fn: Option<MatchFn<'_>>,
) -> Result<(), TransformError> {
    let (ops, selection_after) = {
        let Some(sel) = editor.selection() else {
            return Ok(());
        };
        let doc = editor.doc();
        let (start, end) = unhang(doc, sel);
        let blocks = text_blocks_in_order(doc);
        let (Some(start_ix), Some(end_ix)) = (
            containing_block_index(&blocks, &start),
            containing_block_index(&blocks, &end),
        ) else {
            return Err(TransformError::NotInTextBlock);
        };

        let mut ops: Vec<Op> = Vec::new();
        for block in &blocks[start_ix..=end_ix] {
            if let Some(f) = match_fn {
                match node_at(doc, &block.path) {
                    Some(node) if f(node, &block.path) => {}
                    _ => continue,
                }
            }
            if block.el.kind == kind {
                continue;
            }
            ops.push(Op::SetKind {
                path: block.path.clone(),
                kind: kind.clone(),
            });
        }
        (ops, sel.clone())
    };

    if ops.is_empty() {
        return Ok(());
    }
    editor.apply(
        Transaction::new(ops)
            .selection_after(selection_after)
            .source("transform:set_nodes"),
    )?;
    Ok(())
}

/// Inserts a fresh `template` element as the parent of the content covered
/// by the current selection: inline templates wrap the selected run of
/// inline content (splitting leaves at the boundaries), block templates
/// wrap the selected blocks.
pub fn wrap_nodes(
    editor: &mut Editor,
    template: ElementKind,
    split: bool,
) -> Result<(), TransformError> {
    if editor.is_inline(&template) {
        wrap_inline(editor, template, split)
    } else {
        wrap_blocks(editor, template)
    }
}

fn wrap_inline(
    editor: &mut Editor,
    template: ElementKind,
    split: bool,
) -> Result<(), TransformError> {
    let Some(sel) = editor.selection().cloned() else {
        return Ok(());
    };
    if sel.is_collapsed() {
        return Ok(());
    }

    let (ops, selection_after) = {
        let doc = editor.doc();
        let (start, end) = unhang(doc, &sel);
        let blocks = text_blocks_in_order(doc);
        let (Some(start_ix), Some(end_ix)) = (
            containing_block_index(&blocks, &start),
            containing_block_index(&blocks, &end),
        ) else {
            return Err(TransformError::NotInTextBlock);
        };

        let mut ops: Vec<Op> = Vec::new();
        let mut selection_after: Option<Selection> = None;

        for (block_ix, block) in blocks.iter().enumerate().take(end_ix + 1).skip(start_ix) {
            let children = block.el.children.as_slice();
            let total = inline_text_len(children);
            if total == 0 {
                continue;
            }
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

            let (new_children, wrapper_ix) =
                wrap_range_in_children(children, start_global, end_global, &template, split);
            ops.extend(replace_children_ops(&block.path, children.len(), &new_children));

            if let Some(wrapper_ix) = wrapper_ix {
                if let Node::Element(wrapper) = &new_children[wrapper_ix] {
                    if let Some((mut rel, offset)) = last_leaf_rel(&wrapper.children) {
                        rel.insert(0, wrapper_ix);
                        let mut path = block.path.clone();
                        path.extend(rel);
                        selection_after =
                            Some(Selection::collapsed(Point::new(path, offset)));
                    }
                }
            }
        }

        (ops, selection_after)
    };

    if ops.is_empty() {
        return Ok(());
    }
    let mut tx = Transaction::new(ops).source("transform:wrap_nodes");
    if let Some(sel) = selection_after {
        tx = tx.selection_after(sel);
    }
    editor.apply(tx)?;
    Ok(())
}

fn wrap_range_in_children(
    children: &[Node],
    start: usize,
    end: usize,
    template: &ElementKind,
    split: bool,
) -> (Vec<Node>, Option<usize>) {
    fn flush(
        out: &mut Vec<Node>,
        wrapped: &mut Vec<Node>,
        wrapper_ix: &mut Option<usize>,
        template: &ElementKind,
    ) {
        if wrapped.is_empty() {
            return;
        }
        *wrapper_ix = Some(out.len());
        out.push(Node::Element(ElementNode {
            kind: template.clone(),
            children: std::mem::take(wrapped),
        }));
    }

    let mut out: Vec<Node> = Vec::new();
    let mut wrapped: Vec<Node> = Vec::new();
    let mut wrapper_ix: Option<usize> = None;
    let mut cursor = 0usize;

    for node in children {
        match node {
            Node::Text(t) => {
                let node_start = cursor;
                let node_end = node_start + t.text.len();
                cursor = node_end;

                if t.text.is_empty() {
                    if node_start > start && node_start < end {
                        // Absorbed by the wrap; nothing to keep.
                        continue;
                    }
                    if node_start >= end {
                        flush(&mut out, &mut wrapped, &mut wrapper_ix, template);
                    }
                    out.push(node.clone());
                    continue;
                }
                if node_end <= start || node_start >= end {
                    if node_start >= end {
                        flush(&mut out, &mut wrapped, &mut wrapper_ix, template);
                    }
                    out.push(node.clone());
                    continue;
                }

                let (sel_start, sel_end) = if split {
                    (
                        clamp_to_char_boundary(
                            &t.text,
                            start.saturating_sub(node_start).min(t.text.len()),
                        ),
                        clamp_to_char_boundary(
                            &t.text,
                            end.saturating_sub(node_start).min(t.text.len()),
                        ),
                    )
                } else {
                    (0, t.text.len())
                };

                let prefix = &t.text[..sel_start];
                let middle = &t.text[sel_start..sel_end];
                let suffix = &t.text[sel_end..];

                if !prefix.is_empty() {
                    out.push(Node::Text(TextNode {
                        text: prefix.to_string(),
                        marks: t.marks.clone(),
                    }));
                }
                if !middle.is_empty() {
                    wrapped.push(Node::Text(TextNode {
                        text: middle.to_string(),
                        marks: t.marks.clone(),
                    }));
                }
                if !suffix.is_empty() {
                    flush(&mut out, &mut wrapped, &mut wrapper_ix, template);
                    out.push(Node::Text(TextNode {
                        text: suffix.to_string(),
                        marks: t.marks.clone(),
                    }));
                }
            }
            Node::Element(el) => {
                let len = inline_text_len(&el.children);
                let node_start = cursor;
                let node_end = node_start + len;
                cursor = node_end;

                if node_end <= start || node_start >= end {
                    if node_start >= end {
                        flush(&mut out, &mut wrapped, &mut wrapper_ix, template);
                    }
                    out.push(node.clone());
                } else {
                    // A partially covered inline element is taken whole.
                    wrapped.push(node.clone());
                }
            }
        }
    }
    flush(&mut out, &mut wrapped, &mut wrapper_ix, template);

    (out, wrapper_ix)
}

fn last_leaf_rel(children: &[Node]) -> Option<(Vec<usize>, usize)> {
    for (ix, node) in children.iter().enumerate().rev() {
        match node {
            Node::Text(t) => return Some((vec![ix], t.text.len())),
            Node::Element(el) => {
                if let Some((mut rel, offset)) = last_leaf_rel(&el.children) {
                    rel.insert(0, ix);
                    return Some((rel, offset));
                }
            }
        }
    }
    None
}

struct BlockGroup {
    parent: Path,
    start_ix: usize,
    nodes: Vec<Node>,
}

fn wrap_blocks(editor: &mut Editor, template: ElementKind) -> Result<(), TransformError> {
    if !template.is_container() {
        return Err(TransformError::InvalidWrapper(template));
    }

    let (ops, selection_after) = {
        let Some(sel) = editor.selection() else {
            return Ok(());
        };
        let doc = editor.doc();
        let (start, end) = unhang(doc, sel);
        let blocks = text_blocks_in_order(doc);
        let (Some(start_ix), Some(end_ix)) = (
            containing_block_index(&blocks, &start),
            containing_block_index(&blocks, &end),
        ) else {
            return Err(TransformError::NotInTextBlock);
        };

        let mut groups: Vec<BlockGroup> = Vec::new();
        for block in &blocks[start_ix..=end_ix] {
            let (ix, parent) = block.path.split_last().expect("block path is non-empty");
            let node = Node::Element(block.el.clone());
            match groups.last_mut() {
                Some(group)
                    if group.parent == parent
                        && group.start_ix + group.nodes.len() == *ix =>
                {
                    group.nodes.push(node);
                }
                _ => groups.push(BlockGroup {
                    parent: parent.to_vec(),
                    start_ix: *ix,
                    nodes: vec![node],
                }),
            }
        }

        let mut ops: Vec<Op> = Vec::new();
        for group in groups.iter().rev() {
            for k in (group.start_ix..group.start_ix + group.nodes.len()).rev() {
                let mut path = group.parent.clone();
                path.push(k);
                ops.push(Op::RemoveNode { path });
            }
            let mut path = group.parent.clone();
            path.push(group.start_ix);
            ops.push(Op::InsertNode {
                path,
                node: Node::Element(ElementNode {
                    kind: template.clone(),
                    children: group.nodes.clone(),
                }),
            });
        }

        let selection_after = Selection {
            anchor: remap_point_into_groups(&sel.anchor, &groups),
            focus: remap_point_into_groups(&sel.focus, &groups),
        };
        (ops, selection_after)
    };

    if ops.is_empty() {
        return Ok(());
    }
    editor.apply(
        Transaction::new(ops)
            .selection_after(selection_after)
            .source("transform:wrap_nodes"),
    )?;
    Ok(())
}

fn remap_point_into_groups(point: &Point, groups: &[BlockGroup]) -> Point {
    for group in groups {
        if point.path.len() <= group.parent.len() || !point.path.starts_with(&group.parent) {
            continue;
        }
        let depth = group.parent.len();
        let ix = point.path[depth];
        if ix >= group.start_ix && ix < group.start_ix + group.nodes.len() {
            let mut path = group.parent.clone();
            path.push(group.start_ix);
            path.push(ix - group.start_ix);
            path.extend_from_slice(&point.path[depth + 1..]);
            return Point::new(path, point.offset);
        }
        if ix >= group.start_ix + group.nodes.len() {
            let mut path = point.path.clone();
            path[depth] = ix - (group.nodes.len() - 1);
            return Point::new(path, point.offset);
        }
    }
    point.clone()
}

/// Replaces every element matched among the ancestors-or-self of the
/// selection's blocks with its children spliced into the parent. Repeats
/// until nothing in the selection matches.
pub fn unwrap_nodes(editor: &mut Editor, match_fn: MatchFn<'_>) -> Result<(), TransformError> {
    for _ in 0..MAX_UNWRAP_ITERATIONS {
        let target = {
            let Some(sel) = editor.selection() else {
                return Ok(());
            };
            let doc = editor.doc();
            let (start, end) = unhang(doc, sel);
            let blocks = text_blocks_in_order(doc);
            let (Some(start_ix), Some(end_ix)) = (
                containing_block_index(&blocks, &start),
                containing_block_index(&blocks, &end),
            ) else {
                return Ok(());
            };

            let mut found: Option<Path> = None;
            'blocks: for block in &blocks[start_ix..=end_ix] {
                for depth in (1..=block.path.len()).rev() {
                    let prefix = &block.path[..depth];
                    if let Some(node) = node_at(doc, prefix) {
                        if match_fn(node, prefix) {
                            found = Some(prefix.to_vec());
                            break 'blocks;
                        }
                    }
                }
            }
            found
        };

        let Some(path) = target else {
            return Ok(());
        };
        unwrap_at(editor, &path)?;
    }
    Ok(())
}

/// Splices the element at `path` out of the tree, replacing it with its
/// children.
pub fn unwrap_at(editor: &mut Editor, path: &[usize]) -> Result<(), TransformError> {
    let (ops, selection_after) = {
        let doc = editor.doc();
        let Some(Node::Element(el)) = node_at(doc, path) else {
            return Err(TransformError::MissingTarget(path.to_vec()));
        };
        let children = el.children.clone();
        let (index, parent) = path
            .split_last()
            .ok_or_else(|| TransformError::MissingTarget(path.to_vec()))?;

        let mut ops: Vec<Op> = vec![Op::RemoveNode {
            path: path.to_vec(),
        }];
        for (k, child) in children.iter().enumerate() {
            let mut insert_path = parent.to_vec();
            insert_path.push(index + k);
            ops.push(Op::InsertNode {
                path: insert_path,
                node: child.clone(),
            });
        }

        let selection_after = editor.selection().map(|sel| Selection {
            anchor: remap_point_unwrap(&sel.anchor, path, children.len()),
            focus: remap_point_unwrap(&sel.focus, path, children.len()),
        });
        (ops, selection_after)
    };

    let mut tx = Transaction::new(ops).source("transform:unwrap_nodes");
    if let Some(sel) = selection_after {
        tx = tx.selection_after(sel);
    }
    editor.apply(tx)?;
    Ok(())
}

fn remap_point_unwrap(point: &Point, path: &[usize], child_count: usize) -> Point {
    let (index, parent) = path.split_last().expect("unwrap path is non-empty");

    if point.path.len() > path.len() && point.path.starts_with(path) {
        let child = point.path[path.len()];
        let mut new_path = parent.to_vec();
        new_path.push(index + child);
        new_path.extend_from_slice(&point.path[path.len() + 1..]);
        return Point::new(new_path, point.offset);
    }
    if point.path.len() > parent.len() && point.path.starts_with(parent) {
        let ix = point.path[parent.len()];
        if ix > *index {
            let mut new_path = point.path.clone();
            new_path[parent.len()] = ix + child_count.saturating_sub(1);
            return Point::new(new_path, point.offset);
        }
    }
    point.clone()
}

/// Inserts sibling nodes at the current collapsed point. Inline nodes are
/// spliced into the caret's leaf, block nodes become siblings of the
/// caret's block.
pub fn insert_nodes(editor: &mut Editor, nodes: Vec<Node>) -> Result<(), TransformError> {
    if nodes.is_empty() {
        return Ok(());
    }
    let Some(sel) = editor.selection().cloned() else {
        return Err(TransformError::NoSelection);
    };
    if !sel.is_collapsed() {
        return Err(TransformError::NotCollapsed);
    }

    let is_inline_node = |node: &Node| match node {
        Node::Text(_) => true,
        Node::Element(el) => editor.is_inline(&el.kind),
    };
    let all_inline = nodes.iter().all(is_inline_node);
    let all_block = nodes
        .iter()
        .all(|node| matches!(node, Node::Element(el) if !editor.is_inline(&el.kind)));
    if !all_inline && !all_block {
        return Err(TransformError::MixedInsert);
    }

    if all_inline {
        insert_inline_at_caret(editor, &sel, nodes)
    } else {
        insert_blocks_after(editor, &sel, nodes)
    }
}

fn insert_inline_at_caret(
    editor: &mut Editor,
    sel: &Selection,
    nodes: Vec<Node>,
) -> Result<(), TransformError> {
    let (ops, selection_after) = {
        let doc = editor.doc();
        let focus = &sel.focus;
        let Some(Node::Text(leaf)) = node_at(doc, &focus.path) else {
            return Err(TransformError::NotInTextBlock);
        };
        let (child_ix, parent_path) = focus
            .path
            .split_last()
            .ok_or(TransformError::NotInTextBlock)?;

        let cursor = clamp_to_char_boundary(&leaf.text, focus.offset);
        let left = &leaf.text[..cursor];
        let right = &leaf.text[cursor..];

        let mut replacement: Vec<Node> = Vec::new();
        if !left.is_empty() {
            replacement.push(Node::Text(TextNode {
                text: left.to_string(),
                marks: leaf.marks.clone(),
            }));
        }
        let last_inserted_ix = replacement.len() + nodes.len() - 1;
        replacement.extend(nodes);
        if !right.is_empty() {
            replacement.push(Node::Text(TextNode {
                text: right.to_string(),
                marks: leaf.marks.clone(),
            }));
        }

        let mut ops: Vec<Op> = vec![Op::RemoveNode {
            path: focus.path.clone(),
        }];
        for (i, node) in replacement.iter().enumerate() {
            let mut path = parent_path.to_vec();
            path.push(child_ix + i);
            ops.push(Op::InsertNode {
                path,
                node: node.clone(),
            });
        }

        // Collapse to the end of the last inserted node.
        let mut caret_path = parent_path.to_vec();
        caret_path.push(child_ix + last_inserted_ix);
        let caret = match &replacement[last_inserted_ix] {
            Node::Text(t) => Point::new(caret_path, t.text.len()),
            Node::Element(el) => match last_leaf_rel(&el.children) {
                Some((rel, offset)) => {
                    caret_path.extend(rel);
                    Point::new(caret_path, offset)
                }
                None => Point::new(caret_path, 0),
            },
        };
        (ops, Selection::collapsed(caret))
    };

    editor.apply(
        Transaction::new(ops)
            .selection_after(selection_after)
            .source("transform:insert_nodes"),
    )?;
    Ok(())
}

fn insert_blocks_after(
    editor: &mut Editor,
    sel: &Selection,
    nodes: Vec<Node>,
) -> Result<(), TransformError> {
    let (ops, selection_after) = {
        let doc = editor.doc();
        let blocks = text_blocks_in_order(doc);
        let Some(block_ix) = containing_block_index(&blocks, &sel.focus) else {
            return Err(TransformError::NotInTextBlock);
        };
        let block_path = &blocks[block_ix].path;
        let (ix, parent) = block_path.split_last().expect("block path is non-empty");

        let mut ops: Vec<Op> = Vec::new();
        for (i, node) in nodes.iter().enumerate() {
            let mut path = parent.to_vec();
            path.push(ix + 1 + i);
            ops.push(Op::InsertNode {
                path,
                node: node.clone(),
            });
        }

        let mut caret_path = parent.to_vec();
        caret_path.push(ix + nodes.len());
        let caret = match nodes.last() {
            Some(Node::Element(el)) => match last_leaf_rel(&el.children) {
                Some((rel, offset)) => {
                    caret_path.extend(rel);
                    Point::new(caret_path, offset)
                }
                None => Point::new(caret_path, 0),
            },
            _ => Point::new(caret_path, 0),
        };
        (ops, Selection::collapsed(caret))
    };

    editor.apply(
        Transaction::new(ops)
            .selection_after(selection_after)
            .source("transform:insert_nodes"),
    )?;
    Ok(())
}

/// Advances or retreats both ends of the selection by one unit.
pub fn move_caret(
    editor: &mut Editor,
    unit: MoveUnit,
    reverse: bool,
) -> Result<(), TransformError> {
    let next = {
        let Some(sel) = editor.selection() else {
            return Ok(());
        };
        let leaves = text_leaves_in_order(editor.doc());
        Selection {
            anchor: move_point(&leaves, &sel.anchor, unit, reverse),
            focus: move_point(&leaves, &sel.focus, unit, reverse),
        }
    };
    editor.set_selection(Some(next));
    Ok(())
}

fn move_point(
    leaves: &[(Path, &TextNode)],
    point: &Point,
    unit: MoveUnit,
    reverse: bool,
) -> Point {
    let Some(leaf_ix) = leaves.iter().position(|(path, _)| path == &point.path) else {
        return point.clone();
    };
    let (_, leaf) = &leaves[leaf_ix];
    let offset = clamp_to_char_boundary(&leaf.text, point.offset);

    if !reverse {
        if offset < leaf.text.len() {
            let step = match unit {
                MoveUnit::Offset => leaf.text[offset..]
                    .chars()
                    .next()
                    .map_or(0, char::len_utf8),
                MoveUnit::Character => leaf.text[offset..]
                    .graphemes(true)
                    .next()
                    .map_or(0, str::len),
            };
            return Point::new(point.path.clone(), offset + step);
        }
        match leaves.get(leaf_ix + 1) {
            Some((path, next)) => match unit {
                MoveUnit::Offset => Point::new(path.clone(), 0),
                MoveUnit::Character => {
                    let step = next.text.graphemes(true).next().map_or(0, str::len);
                    Point::new(path.clone(), step)
                }
            },
            None => point.clone(),
        }
    } else {
        if offset > 0 {
            let step = match unit {
                MoveUnit::Offset => leaf.text[..offset]
                    .chars()
                    .next_back()
                    .map_or(0, char::len_utf8),
                MoveUnit::Character => leaf.text[..offset]
                    .graphemes(true)
                    .next_back()
                    .map_or(0, str::len),
            };
            return Point::new(point.path.clone(), offset - step);
        }
        match leaf_ix.checked_sub(1).and_then(|ix| leaves.get(ix)) {
            Some((path, prev)) => match unit {
                MoveUnit::Offset => Point::new(path.clone(), prev.text.len()),
                MoveUnit::Character => {
                    let step = prev.text.graphemes(true).next_back().map_or(0, str::len);
                    Point::new(path.clone(), prev.text.len() - step)
                }
            },
            None => point.clone(),
        }
    }
}

/// Reduces the selection to a single point at its start or end.
pub fn collapse(editor: &mut Editor, edge: Edge) -> Result<(), TransformError> {
    let Some((start, end)) = editor.selection().map(Selection::ordered) else {
        return Ok(());
    };
    let point = match edge {
        Edge::Start => start,
        Edge::End => end,
    };
    editor.set_selection(Some(Selection::collapsed(point)));
    Ok(())
}

/// Inserts text at the collapsed caret. A non-collapsed within-block
/// selection is replaced by the inserted text.
pub fn insert_text(editor: &mut Editor, text: &str) -> Result<(), TransformError> {
    if text.is_empty() {
        return Ok(());
    }
    let Some(sel) = editor.selection().cloned() else {
        return Err(TransformError::NoSelection);
    };
    if !sel.is_collapsed() {
        delete_selected(editor)?;
        return insert_text(editor, text);
    }

    let (ops, selection_after) = {
        let doc = editor.doc();
        let focus = &sel.focus;
        let Some(Node::Text(leaf)) = node_at(doc, &focus.path) else {
            return Err(TransformError::NotInTextBlock);
        };
        let offset = clamp_to_char_boundary(&leaf.text, focus.offset);
        let ops = vec![Op::InsertText {
            path: focus.path.clone(),
            offset,
            text: text.to_string(),
        }];
        (
            ops,
            Selection::collapsed(Point::new(focus.path.clone(), offset + text.len())),
        )
    };

    editor.apply(
        Transaction::new(ops)
            .selection_after(selection_after)
            .source("transform:insert_text"),
    )?;
    Ok(())
}

/// Removes the content covered by the current within-block selection and
/// collapses the caret at the removal point.
pub fn delete_selected(editor: &mut Editor) -> Result<(), TransformError> {
    let Some(sel) = editor.selection().cloned() else {
        return Ok(());
    };
    if sel.is_collapsed() {
        return Ok(());
    }

    let (ops, selection_after) = {
        let doc = editor.doc();
        let (start, end) = unhang(doc, &sel);
        let blocks = text_blocks_in_order(doc);
        let (Some(start_ix), Some(end_ix)) = (
            containing_block_index(&blocks, &start),
            containing_block_index(&blocks, &end),
        ) else {
            return Err(TransformError::NotInTextBlock);
        };
        if start_ix != end_ix {
            return Err(TransformError::CrossBlockSelection);
        }

        let block = &blocks[start_ix];
        let children = block.el.children.as_slice();
        let start_global = global_offset_at(children, &start.path[block.path.len()..], start.offset);
        let end_global = global_offset_at(children, &end.path[block.path.len()..], end.offset);
        if start_global >= end_global {
            return Ok(());
        }

        let mut cursor = 0usize;
        let new_children = delete_range_in_children(children, &mut cursor, start_global, end_global);
        let ops = replace_children_ops(&block.path, children.len(), &new_children);

        let (rel, offset) = point_at_global(&new_children, start_global);
        let mut path = block.path.clone();
        path.extend(rel);
        (ops, Selection::collapsed(Point::new(path, offset)))
    };

    editor.apply(
        Transaction::new(ops)
            .selection_after(selection_after)
            .source("transform:delete_selected"),
    )?;
    Ok(())
}

fn delete_range_in_children(
    children: &[Node],
    cursor: &mut usize,
    start: usize,
    end: usize,
) -> Vec<Node> {
    let mut out: Vec<Node> = Vec::new();

    for node in children {
        match node {
            Node::Text(t) => {
                let node_start = *cursor;
                let node_end = node_start + t.text.len();
                *cursor = node_end;
                if node_end <= start || node_start >= end {
                    out.push(node.clone());
                    continue;
                }
                let from = clamp_to_char_boundary(
                    &t.text,
                    start.saturating_sub(node_start).min(t.text.len()),
                );
                let to = clamp_to_char_boundary(
                    &t.text,
                    end.saturating_sub(node_start).min(t.text.len()),
                );
                let mut text = String::with_capacity(t.text.len() - (to - from));
                text.push_str(&t.text[..from]);
                text.push_str(&t.text[to..]);
                if !text.is_empty() {
                    out.push(Node::Text(TextNode {
                        text,
                        marks: t.marks.clone(),
                    }));
                }
            }
            Node::Element(el) => {
                let len = inline_text_len(&el.children);
                let node_start = *cursor;
                let node_end = node_start + len;
                if node_end <= start || node_start >= end {
                    *cursor = node_end;
                    out.push(node.clone());
                    continue;
                }
                if node_start >= start && node_end <= end {
                    *cursor = node_end;
                    continue;
                }
                let inner = delete_range_in_children(&el.children, cursor, start, end);
                out.push(Node::Element(ElementNode {
                    kind: el.kind.clone(),
                    children: inner,
                }));
            }
        }
    }
    out
}

/// Removes one unit before the collapsed caret; at a block start, merges
/// the block into the preceding text block. A non-collapsed selection is
/// deleted instead.
pub fn delete_backward(editor: &mut Editor) -> Result<(), TransformError> {
    let Some(sel) = editor.selection().cloned() else {
        return Ok(());
    };
    if !sel.is_collapsed() {
        return delete_selected(editor);
    }

    enum Plan {
        RemoveText {
            path: Path,
            range: Range<usize>,
            caret: Point,
        },
        MergeBlocks {
            from: Path,
            from_children: Vec<Node>,
            to: Path,
            to_len: usize,
            caret: Point,
        },
        Noop,
    }

    let plan = {
        let doc = editor.doc();
        let focus = &sel.focus;
        let Some(Node::Text(leaf)) = node_at(doc, &focus.path) else {
            return Err(TransformError::NotInTextBlock);
        };
        let offset = clamp_to_char_boundary(&leaf.text, focus.offset);

        if offset > 0 {
            let step = leaf.text[..offset]
                .chars()
                .next_back()
                .map_or(0, char::len_utf8);
            Plan::RemoveText {
                path: focus.path.clone(),
                range: offset - step..offset,
                caret: Point::new(focus.path.clone(), offset - step),
            }
        } else {
            let blocks = text_blocks_in_order(doc);
            let Some(block_ix) = containing_block_index(&blocks, focus) else {
                return Err(TransformError::NotInTextBlock);
            };
            let block = &blocks[block_ix];

            let leaves = text_leaves_in_order(doc);
            let leaf_ix = leaves
                .iter()
                .position(|(path, _)| path == &focus.path)
                .ok_or(TransformError::NotInTextBlock)?;

            let prev_in_block = leaves[..leaf_ix]
                .iter()
                .rev()
                .take_while(|(path, _)| path.starts_with(&block.path))
                .find(|(_, prev)| !prev.text.is_empty());

            if let Some((prev_path, prev_leaf)) = prev_in_block {
                let len = prev_leaf.text.len();
                let step = prev_leaf.text.chars().next_back().map_or(0, char::len_utf8);
                Plan::RemoveText {
                    path: prev_path.clone(),
                    range: len - step..len,
                    caret: Point::new(prev_path.clone(), len - step),
                }
            } else if block_ix == 0 {
                Plan::Noop
            } else {
                let prev_block = &blocks[block_ix - 1];
                let caret = match last_leaf_rel(&prev_block.el.children) {
                    Some((rel, offset)) => {
                        let mut path = prev_block.path.clone();
                        path.extend(rel);
                        Point::new(path, offset)
                    }
                    None => Point::new(prev_block.path.clone(), 0),
                };
                Plan::MergeBlocks {
                    from: block.path.clone(),
                    from_children: block.el.children.clone(),
                    to: prev_block.path.clone(),
                    to_len: prev_block.el.children.len(),
                    caret,
                }
            }
        }
    };

    match plan {
        Plan::Noop => Ok(()),
        Plan::RemoveText { path, range, caret } => {
            editor.apply(
                Transaction::new(vec![Op::RemoveText { path, range }])
                    .selection_after(Selection::collapsed(caret))
                    .source("transform:delete_backward"),
            )?;
            Ok(())
        }
        Plan::MergeBlocks {
            from,
            from_children,
            to,
            to_len,
            caret,
        } => {
            let mut ops: Vec<Op> = Vec::new();
            for (k, child) in from_children.iter().enumerate() {
                let mut path = to.clone();
                path.push(to_len + k);
                ops.push(Op::InsertNode {
                    path,
                    node: child.clone(),
                });
            }
            ops.push(Op::RemoveNode { path: from });
            editor.apply(
                Transaction::new(ops)
                    .selection_after(Selection::collapsed(caret))
                    .source("transform:delete_backward"),
            )?;
            Ok(())
        }
    }
}

pub(crate) fn replace_children_ops(
    block_path: &[usize],
    old_len: usize,
    new_children: &[Node],
) -> Vec<Op> {
    let mut ops: Vec<Op> = Vec::new();
    for child_ix in (0..old_len).rev() {
        let mut path = block_path.to_vec();
        path.push(child_ix);
        ops.push(Op::RemoveNode { path });
    }
    for (child_ix, node) in new_children.iter().enumerate() {
        let mut path = block_path.to_vec();
        path.push(child_ix);
        ops.push(Op::InsertNode {
            path,
            node: node.clone(),
        });
    }
    ops
}
