use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ops::{Op, Path, Transaction};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Document {
    #[serde(default)]
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Node {
    Element(ElementNode),
    Text(TextNode),
}

impl Node {
    pub fn paragraph(text: impl Into<String>) -> Self {
        Node::element(ElementKind::Paragraph, vec![Node::text(text)])
    }

    pub fn element(kind: ElementKind, children: Vec<Node>) -> Self {
        Node::Element(ElementNode { kind, children })
    }

    pub fn text(text: impl Into<String>) -> Self {
        Node::Text(TextNode {
            text: text.into(),
            marks: Marks::default(),
        })
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Node::Text(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementNode {
    pub kind: ElementKind,
    #[serde(default)]
    pub children: Vec<Node>,
}

/// The closed set of element kinds. Structural code matches on this
/// exhaustively, so adding a kind surfaces every place that must learn
/// about it at compile time.
#[derive(
    Debug, Clone, PartialEq, Serialize, Deserialize, strum_macros::Display, strum_macros::AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ElementKind {
    Paragraph,
    Heading,
    BulletedList,
    NumberedList,
    ListItem,
    NumberedListItem { custom_number: Option<u64> },
    CodeBlock,
    CodeLine,
    Link { url: String },
}

impl ElementKind {
    pub fn numbered_list_item() -> Self {
        ElementKind::NumberedListItem {
            custom_number: None,
        }
    }

    /// Same variant, ignoring any payload (`custom_number`, `url`).
    pub fn same_kind(&self, other: &ElementKind) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    pub fn is_list_container(&self) -> bool {
        matches!(
            self,
            ElementKind::BulletedList | ElementKind::NumberedList
        )
    }

    /// Containers hold block children rather than inline content.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            ElementKind::BulletedList | ElementKind::NumberedList | ElementKind::CodeBlock
        )
    }

    /// Blocks whose children are inline content (text leaves and inline
    /// elements).
    pub fn is_text_block(&self) -> bool {
        matches!(
            self,
            ElementKind::Paragraph
                | ElementKind::Heading
                | ElementKind::ListItem
                | ElementKind::NumberedListItem { .. }
                | ElementKind::CodeLine
        )
    }

    /// The kind a block must be retyped to before it can live inside this
    /// container.
    pub fn item_kind(&self) -> Option<ElementKind> {
        match self {
            ElementKind::BulletedList => Some(ElementKind::ListItem),
            ElementKind::NumberedList => Some(ElementKind::numbered_list_item()),
            ElementKind::CodeBlock => Some(ElementKind::CodeLine),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TextNode {
    pub text: String,
    #[serde(default)]
    pub marks: Marks,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Marks {
    #[serde(default)]
    pub is_bold: bool,
    #[serde(default)]
    pub is_italic: bool,
    #[serde(default)]
    pub is_strikethrough: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display, strum_macros::AsRefStr,
)]
#[strum(serialize_all = "kebab-case")]
pub enum Mark {
    Bold,
    Italic,
    Strikethrough,
}

impl Marks {
    pub fn has(&self, mark: Mark) -> bool {
        match mark {
            Mark::Bold => self.is_bold,
            Mark::Italic => self.is_italic,
            Mark::Strikethrough => self.is_strikethrough,
        }
    }

    pub fn set(&mut self, mark: Mark, on: bool) {
        match mark {
            Mark::Bold => self.is_bold = on,
            Mark::Italic => self.is_italic = on,
            Mark::Strikethrough => self.is_strikethrough = on,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    #[serde(default)]
    pub path: Path,
    pub offset: usize,
}

impl Point {
    pub fn new(path: Path, offset: usize) -> Self {
        Self { path, offset }
    }

    pub fn cmp_document_order(&self, other: &Point) -> Ordering {
        self.path
            .cmp(&other.path)
            .then(self.offset.cmp(&other.offset))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: Point,
    pub focus: Point,
}

impl Selection {
    pub fn collapsed(point: Point) -> Self {
        Self {
            anchor: point.clone(),
            focus: point,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }

    /// Anchor and focus in document order.
    pub fn ordered(&self) -> (Point, Point) {
        let mut start = self.anchor.clone();
        let mut end = self.focus.clone();
        if end.cmp_document_order(&start) == Ordering::Less {
            std::mem::swap(&mut start, &mut end);
        }
        (start, end)
    }
}

type KindPredicate = Box<dyn Fn(&ElementKind) -> Option<bool> + Send + Sync>;

/// Overridable behavior predicates. Each question is answered by the first
/// registered predicate that returns `Some`, falling back to the built-in
/// defaults (`Link` is inline, no kind is void).
#[derive(Default)]
pub struct Behaviors {
    inline: Vec<KindPredicate>,
    void: Vec<KindPredicate>,
}

impl Behaviors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inline(
        mut self,
        pred: impl Fn(&ElementKind) -> Option<bool> + Send + Sync + 'static,
    ) -> Self {
        self.inline.push(Box::new(pred));
        self
    }

    pub fn void(
        mut self,
        pred: impl Fn(&ElementKind) -> Option<bool> + Send + Sync + 'static,
    ) -> Self {
        self.void.push(Box::new(pred));
        self
    }

    pub fn is_inline(&self, kind: &ElementKind) -> bool {
        self.inline
            .iter()
            .find_map(|pred| pred(kind))
            .unwrap_or_else(|| matches!(kind, ElementKind::Link { .. }))
    }

    pub fn is_void(&self, kind: &ElementKind) -> bool {
        self.void.iter().find_map(|pred| pred(kind)).unwrap_or(false)
    }
}

#[derive(Debug, Default)]
pub struct EditorConfig {
    pub max_normalize_iterations: usize,
}

impl EditorConfig {
    fn with_defaults(mut self) -> Self {
        if self.max_normalize_iterations == 0 {
            self.max_normalize_iterations = 100;
        }
        self
    }
}

pub trait NormalizePass: Send + Sync {
    fn id(&self) -> &'static str;
    fn run(&self, doc: &Document, behaviors: &Behaviors) -> Vec<Op>;
}

/// The document root, the current selection, and the behavior predicates
/// every structural operation consults. The editor exclusively owns its
/// tree; all mutation goes through [`Editor::apply`].
pub struct Editor {
    doc: Document,
    selection: Option<Selection>,
    behaviors: Behaviors,
    passes: Vec<Box<dyn NormalizePass>>,
    config: EditorConfig,
}

impl Editor {
    pub fn new(doc: Document, selection: Option<Selection>, behaviors: Behaviors) -> Self {
        Self::with_config(doc, selection, behaviors, EditorConfig::default())
    }

    pub fn with_config(
        doc: Document,
        selection: Option<Selection>,
        behaviors: Behaviors,
        config: EditorConfig,
    ) -> Self {
        let mut editor = Self {
            doc,
            selection,
            behaviors,
            passes: core_passes(),
            config: config.with_defaults(),
        };
        editor.normalize_in_place();
        editor
    }

    pub fn doc(&self) -> &Document {
        &self.doc
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    pub fn behaviors(&self) -> &Behaviors {
        &self.behaviors
    }

    pub fn is_inline(&self, kind: &ElementKind) -> bool {
        self.behaviors.is_inline(kind)
    }

    pub fn is_void(&self, kind: &ElementKind) -> bool {
        self.behaviors.is_void(kind)
    }

    pub fn set_selection(&mut self, selection: Option<Selection>) {
        self.selection = selection.map(|sel| normalize_selection(&self.doc, sel));
    }

    /// Applies a transaction against a scratch copy of the tree and commits
    /// only if every op (and the normalize fixpoint) succeeds. A failing
    /// transaction leaves the editor untouched.
    pub fn apply(&mut self, tx: Transaction) -> Result<(), ApplyError> {
        let mut doc = self.doc.clone();
        let mut selection = self.selection.clone();

        if let Some(source) = &tx.meta.source {
            log::debug!("applying transaction from {source} ({} ops)", tx.ops.len());
        }

        for op in tx.ops {
            apply_op_to(&mut doc, &mut selection, op)?;
        }
        if let Some(sel) = tx.selection_after {
            selection = Some(sel);
        }

        normalize_to_fixpoint(
            &mut doc,
            &mut selection,
            &self.passes,
            &self.behaviors,
            self.config.max_normalize_iterations,
        )?;

        let selection = selection.map(|sel| normalize_selection(&doc, sel));

        self.doc = doc;
        self.selection = selection;
        Ok(())
    }

    /// Runs a sequence of operations as a unit: on error the document and
    /// selection are restored to their state before the closure ran.
    pub fn transact<E>(
        &mut self,
        f: impl FnOnce(&mut Editor) -> Result<(), E>,
    ) -> Result<(), E> {
        let doc = self.doc.clone();
        let selection = self.selection.clone();
        match f(self) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.doc = doc;
                self.selection = selection;
                Err(err)
            }
        }
    }

    fn normalize_in_place(&mut self) {
        let mut doc = self.doc.clone();
        let mut selection = self.selection.clone();
        match normalize_to_fixpoint(
            &mut doc,
            &mut selection,
            &self.passes,
            &self.behaviors,
            self.config.max_normalize_iterations,
        ) {
            Ok(()) => {
                self.doc = doc;
                self.selection = selection.map(|sel| normalize_selection(&self.doc, sel));
            }
            Err(err) => {
                log::warn!("initial document failed to normalize: {err}");
            }
        }
    }
}

fn normalize_to_fixpoint(
    doc: &mut Document,
    selection: &mut Option<Selection>,
    passes: &[Box<dyn NormalizePass>],
    behaviors: &Behaviors,
    max_iterations: usize,
) -> Result<(), ApplyError> {
    for _ in 0..max_iterations {
        let mut dirty = false;
        for pass in passes {
            let ops = pass.run(doc, behaviors);
            if ops.is_empty() {
                continue;
            }
            log::debug!(
                "normalize pass `{}` repaired the tree ({} ops)",
                pass.id(),
                ops.len()
            );
            for op in ops {
                apply_op_to(doc, selection, op)?;
            }
            dirty = true;
            break;
        }
        if !dirty {
            return Ok(());
        }
    }
    Err(ApplyError::NormalizeDidNotConverge)
}

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("normalize passes did not converge")]
    NormalizeDidNotConverge,
}

impl From<PathError> for ApplyError {
    fn from(value: PathError) -> Self {
        ApplyError::InvalidPath(value.0)
    }
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct PathError(pub String);

pub(crate) fn apply_op_to(
    doc: &mut Document,
    selection: &mut Option<Selection>,
    op: Op,
) -> Result<(), ApplyError> {
    match op {
        Op::InsertText { path, offset, text } => {
            let text_node = node_text_mut(doc, &path)?;
            let offset = clamp_to_char_boundary(&text_node.text, offset);
            text_node.text.insert_str(offset, &text);
            transform_selection_insert_text(selection, &path, offset, text.len());
            Ok(())
        }
        Op::RemoveText { path, range } => {
            let text_node = node_text_mut(doc, &path)?;
            let start =
                clamp_to_char_boundary(&text_node.text, range.start.min(text_node.text.len()));
            let end = clamp_to_char_boundary(&text_node.text, range.end.min(text_node.text.len()));
            if start >= end {
                return Ok(());
            }
            text_node.text.replace_range(start..end, "");
            transform_selection_remove_text(selection, &path, start..end);
            Ok(())
        }
        Op::InsertNode { path, node } => {
            insert_node(doc, &path, node)?;
            transform_selection_insert_node(selection, &path);
            Ok(())
        }
        Op::RemoveNode { path } => {
            let removed = remove_node(doc, &path)?;
            transform_selection_remove_node(selection, &path, &removed, doc);
            Ok(())
        }
        Op::SetKind { path, kind } => {
            match node_mut(doc, &path)? {
                Node::Element(el) => el.kind = kind,
                Node::Text(_) => {
                    return Err(ApplyError::InvalidPath(
                        "SetKind target is a text leaf".into(),
                    ));
                }
            }
            Ok(())
        }
        Op::SetMarks { path, marks } => {
            let text_node = node_text_mut(doc, &path)?;
            text_node.marks = marks;
            Ok(())
        }
    }
}

pub(crate) fn clamp_to_char_boundary(s: &str, mut ix: usize) -> usize {
    ix = ix.min(s.len());
    while ix > 0 && !s.is_char_boundary(ix) {
        ix -= 1;
    }
    ix
}

fn transform_selection_insert_text(
    selection: &mut Option<Selection>,
    path: &[usize],
    offset: usize,
    len: usize,
) {
    let Some(sel) = selection else { return };
    for point in [&mut sel.anchor, &mut sel.focus] {
        // Strictly greater: a caret sitting exactly at the insertion point
        // (a merge junction) stays put; typing moves the caret explicitly
        // via `selection_after`.
        if point.path == path && point.offset > offset {
            point.offset = point.offset.saturating_add(len);
        }
    }
}

fn transform_selection_remove_text(
    selection: &mut Option<Selection>,
    path: &[usize],
    range: std::ops::Range<usize>,
) {
    let Some(sel) = selection else { return };
    let removed_len = range.end.saturating_sub(range.start);
    for point in [&mut sel.anchor, &mut sel.focus] {
        if point.path != path {
            continue;
        }
        if point.offset <= range.start {
            continue;
        }
        if point.offset >= range.end {
            point.offset = point.offset.saturating_sub(removed_len);
        } else {
            point.offset = range.start;
        }
    }
}

fn transform_selection_insert_node(selection: &mut Option<Selection>, path: &[usize]) {
    let Some(sel) = selection else { return };
    if path.is_empty() {
        return;
    }
    let (index, parent_path) = path.split_last().unwrap();

    for point in [&mut sel.anchor, &mut sel.focus] {
        if point.path.len() <= parent_path.len() {
            continue;
        }
        if !point.path.starts_with(parent_path) {
            continue;
        }
        let depth = parent_path.len();
        if point.path[depth] >= *index {
            point.path[depth] += 1;
        }
    }
}

fn transform_selection_remove_node(
    selection: &mut Option<Selection>,
    path: &[usize],
    removed: &Node,
    doc_after_remove: &Document,
) {
    if path.is_empty() {
        return;
    }
    let (index, parent_path) = path.split_last().unwrap();
    let index = *index;

    // When the removed leaf's text survives merged into its left sibling,
    // points inside it can be mapped to the merged position instead of
    // snapping to a block start.
    let merge_prefix_len = match (removed, index.checked_sub(1)) {
        (Node::Text(removed_text), Some(left_index)) => {
            let mut left_path = parent_path.to_vec();
            left_path.push(left_index);
            match node_ref(doc_after_remove, &left_path) {
                Some(Node::Text(left_text))
                    if left_text.marks == removed_text.marks
                        && left_text.text.ends_with(&removed_text.text) =>
                {
                    Some(left_text.text.len().saturating_sub(removed_text.text.len()))
                }
                _ => None,
            }
        }
        _ => None,
    };

    let Some(sel) = selection else { return };
    for point in [&mut sel.anchor, &mut sel.focus] {
        if point.path.len() <= parent_path.len() {
            continue;
        }
        if !point.path.starts_with(parent_path) {
            continue;
        }
        let depth = parent_path.len();
        let ix = point.path[depth];
        if ix > index {
            point.path[depth] = ix - 1;
            continue;
        }
        if ix < index {
            continue;
        }

        // Point was inside the removed subtree. Map it to a nearby point.
        if let (Some(prefix), Node::Text(removed_text), Some(left_index)) =
            (merge_prefix_len, removed, index.checked_sub(1))
        {
            point.path.truncate(depth + 1);
            point.path[depth] = left_index;
            point.offset = (prefix + point.offset).min(prefix + removed_text.text.len());
        } else {
            point.path.truncate(depth + 1);
            point.path[depth] = index.saturating_sub(1);
            point.offset = 0;
        }
    }
}

pub(crate) fn node_ref<'a>(doc: &'a Document, path: &[usize]) -> Option<&'a Node> {
    if path.is_empty() {
        return None;
    }

    let mut node = doc.children.get(path[0])?;
    for &ix in path.iter().skip(1) {
        node = match node {
            Node::Element(el) => el.children.get(ix)?,
            Node::Text(_) => return None,
        };
    }
    Some(node)
}

pub(crate) fn node_mut<'a>(
    doc: &'a mut Document,
    path: &[usize],
) -> Result<&'a mut Node, PathError> {
    let (first, rest) = path
        .split_first()
        .ok_or_else(|| PathError("empty path".into()))?;

    let len = doc.children.len();
    let mut node = doc
        .children
        .get_mut(*first)
        .ok_or_else(|| PathError(format!("path out of bounds at depth 0: {first} >= {len}")))?;

    for (depth, &ix) in rest.iter().enumerate() {
        node = match node {
            Node::Element(el) => {
                let len = el.children.len();
                el.children.get_mut(ix).ok_or_else(|| {
                    PathError(format!(
                        "path out of bounds at depth {}: {ix} >= {len}",
                        depth + 1
                    ))
                })?
            }
            Node::Text(_) => {
                return Err(PathError(format!("non-container node at depth {depth}")));
            }
        };
    }
    Ok(node)
}

fn node_text_mut<'a>(doc: &'a mut Document, path: &[usize]) -> Result<&'a mut TextNode, PathError> {
    match node_mut(doc, path)? {
        Node::Text(t) => Ok(t),
        _ => Err(PathError("expected text node".into())),
    }
}

fn children_mut<'a>(
    doc: &'a mut Document,
    parent_path: &[usize],
) -> Result<&'a mut Vec<Node>, PathError> {
    if parent_path.is_empty() {
        return Ok(&mut doc.children);
    }
    match node_mut(doc, parent_path)? {
        Node::Element(el) => Ok(&mut el.children),
        Node::Text(_) => Err(PathError("parent is not a container".into())),
    }
}

fn insert_node(doc: &mut Document, path: &[usize], node: Node) -> Result<(), PathError> {
    let (index, parent_path) = path
        .split_last()
        .ok_or_else(|| PathError("empty insert path".into()))?;

    let children = children_mut(doc, parent_path)?;
    if *index > children.len() {
        return Err(PathError(format!(
            "insert index out of bounds: {index} > {}",
            children.len()
        )));
    }
    children.insert(*index, node);
    Ok(())
}

fn remove_node(doc: &mut Document, path: &[usize]) -> Result<Node, PathError> {
    let (index, parent_path) = path
        .split_last()
        .ok_or_else(|| PathError("empty remove path".into()))?;

    let children = children_mut(doc, parent_path)?;
    if *index >= children.len() {
        return Err(PathError(format!(
            "remove index out of bounds: {index} >= {}",
            children.len()
        )));
    }
    Ok(children.remove(*index))
}

pub(crate) fn normalize_selection(doc: &Document, selection: Selection) -> Selection {
    let fallback = first_text_point(doc).unwrap_or(Point {
        path: vec![0],
        offset: 0,
    });

    let anchor = normalize_point_to_existing_text(doc, &selection.anchor).unwrap_or_else(|| {
        normalize_point_to_existing_text(doc, &selection.focus).unwrap_or_else(|| fallback.clone())
    });
    let focus =
        normalize_point_to_existing_text(doc, &selection.focus).unwrap_or_else(|| anchor.clone());

    Selection { anchor, focus }
}

fn first_text_point(doc: &Document) -> Option<Point> {
    fn walk(children: &[Node], path: &mut Vec<usize>) -> Option<Point> {
        for (ix, node) in children.iter().enumerate() {
            path.push(ix);
            match node {
                Node::Text(_) => {
                    let point = Point {
                        path: path.clone(),
                        offset: 0,
                    };
                    path.pop();
                    return Some(point);
                }
                Node::Element(el) => {
                    if let Some(point) = walk(&el.children, path) {
                        path.pop();
                        return Some(point);
                    }
                }
            }
            path.pop();
        }
        None
    }

    walk(&doc.children, &mut Vec::new())
}

fn normalize_point_to_existing_text(doc: &Document, point: &Point) -> Option<Point> {
    if point.path.is_empty() || doc.children.is_empty() {
        return None;
    }

    fn first_text_descendant(children: &[Node], path: &mut Vec<usize>) -> Option<Point> {
        for (ix, node) in children.iter().enumerate() {
            path.push(ix);
            match node {
                Node::Text(_) => {
                    let point = Point {
                        path: path.clone(),
                        offset: 0,
                    };
                    path.pop();
                    return Some(point);
                }
                Node::Element(el) => {
                    if let Some(point) = first_text_descendant(&el.children, path) {
                        path.pop();
                        return Some(point);
                    }
                }
            }
            path.pop();
        }
        None
    }

    let mut resolved_path: Vec<usize> = Vec::new();
    let mut children: &[Node] = &doc.children;

    for &wanted in &point.path {
        if children.is_empty() {
            break;
        }
        let ix = wanted.min(children.len() - 1);
        resolved_path.push(ix);
        match &children[ix] {
            Node::Text(t) => {
                return Some(Point {
                    path: resolved_path,
                    offset: clamp_to_char_boundary(&t.text, point.offset),
                });
            }
            Node::Element(el) => {
                children = &el.children;
            }
        }
    }

    match node_ref(doc, &resolved_path)? {
        Node::Text(t) => Some(Point {
            path: resolved_path,
            offset: clamp_to_char_boundary(&t.text, point.offset),
        }),
        Node::Element(el) => first_text_descendant(&el.children, &mut resolved_path),
    }
}

fn core_passes() -> Vec<Box<dyn NormalizePass>> {
    vec![
        Box::new(EnsureNonEmptyDocument),
        Box::new(RemoveChildlessContainers),
        Box::new(EnsureTextBlockHasLeaf),
        Box::new(RemoveEmptyTextLeaves),
        Box::new(MergeAdjacentTextLeaves),
    ]
}

struct EnsureNonEmptyDocument;

impl NormalizePass for EnsureNonEmptyDocument {
    fn id(&self) -> &'static str {
        "core.ensure_non_empty_document"
    }

    fn run(&self, doc: &Document, _behaviors: &Behaviors) -> Vec<Op> {
        if doc.children.is_empty() {
            return vec![Op::InsertNode {
                path: vec![0],
                node: Node::paragraph(""),
            }];
        }
        Vec::new()
    }
}

struct RemoveChildlessContainers;

impl NormalizePass for RemoveChildlessContainers {
    fn id(&self) -> &'static str {
        "core.remove_childless_containers"
    }

    fn run(&self, doc: &Document, behaviors: &Behaviors) -> Vec<Op> {
        let mut ops = Vec::new();

        fn walk(children: &[Node], path: &mut Vec<usize>, behaviors: &Behaviors, ops: &mut Vec<Op>) {
            for (ix, node) in children.iter().enumerate() {
                let Node::Element(el) = node else {
                    continue;
                };

                path.push(ix);
                if el.children.is_empty()
                    && !el.kind.is_text_block()
                    && !behaviors.is_void(&el.kind)
                {
                    ops.push(Op::RemoveNode { path: path.clone() });
                } else {
                    walk(&el.children, path, behaviors, ops);
                }
                path.pop();
            }
        }

        walk(&doc.children, &mut Vec::new(), behaviors, &mut ops);
        // Remove back to front so earlier paths stay valid.
        ops.reverse();
        ops
    }
}

struct EnsureTextBlockHasLeaf;

impl NormalizePass for EnsureTextBlockHasLeaf {
    fn id(&self) -> &'static str {
        "core.ensure_text_block_has_leaf"
    }

    fn run(&self, doc: &Document, behaviors: &Behaviors) -> Vec<Op> {
        let mut ops = Vec::new();

        fn walk(children: &[Node], path: &mut Vec<usize>, behaviors: &Behaviors, ops: &mut Vec<Op>) {
            for (ix, node) in children.iter().enumerate() {
                let Node::Element(el) = node else {
                    continue;
                };

                path.push(ix);
                if !behaviors.is_void(&el.kind) {
                    let has_text = el.children.iter().any(Node::is_text);
                    if el.kind.is_text_block() && !has_text {
                        let mut insert_path = path.clone();
                        insert_path.push(0);
                        ops.push(Op::InsertNode {
                            path: insert_path,
                            node: Node::text(""),
                        });
                        // Sibling indices below this element just shifted;
                        // leave deeper repairs to the next fixpoint round.
                    } else {
                        walk(&el.children, path, behaviors, ops);
                    }
                }
                path.pop();
            }
        }

        walk(&doc.children, &mut Vec::new(), behaviors, &mut ops);
        ops
    }
}

struct RemoveEmptyTextLeaves;

impl NormalizePass for RemoveEmptyTextLeaves {
    fn id(&self) -> &'static str {
        "core.remove_empty_text_leaves"
    }

    fn run(&self, doc: &Document, _behaviors: &Behaviors) -> Vec<Op> {
        let mut ops = Vec::new();

        fn walk(children: &[Node], path: &mut Vec<usize>, ops: &mut Vec<Op>) {
            for (ix, node) in children.iter().enumerate() {
                let Node::Element(el) = node else {
                    continue;
                };

                path.push(ix);
                let text_count = el.children.iter().filter(|n| n.is_text()).count();
                if text_count > 1 {
                    // Empty leaves that neither pad an inline element nor are
                    // the element's sole leaf are clutter.
                    let mut removable: Vec<usize> = Vec::new();
                    for (child_ix, child) in el.children.iter().enumerate() {
                        let Node::Text(t) = child else { continue };
                        if !t.text.is_empty() {
                            continue;
                        }
                        let pads_inline = matches!(
                            child_ix.checked_sub(1).and_then(|p| el.children.get(p)),
                            Some(Node::Element(_))
                        ) || matches!(el.children.get(child_ix + 1), Some(Node::Element(_)));
                        if !pads_inline {
                            removable.push(child_ix);
                        }
                    }
                    if removable.len() == text_count {
                        removable.remove(0);
                    }
                    for child_ix in removable {
                        let mut remove_path = path.clone();
                        remove_path.push(child_ix);
                        ops.push(Op::RemoveNode { path: remove_path });
                    }
                }
                walk(&el.children, path, ops);
                path.pop();
            }
        }

        walk(&doc.children, &mut Vec::new(), &mut ops);
        // Reverse pre-order, so removals never invalidate a later path.
        ops.reverse();
        ops
    }
}

struct MergeAdjacentTextLeaves;

impl NormalizePass for MergeAdjacentTextLeaves {
    fn id(&self) -> &'static str {
        "core.merge_adjacent_text_leaves"
    }

    // One adjacent pair per run; the fixpoint loop drains longer runs. A
    // pairwise merge keeps the removed leaf a strict suffix of its merged
    // left sibling, which is what the selection remapping relies on.
    fn run(&self, doc: &Document, _behaviors: &Behaviors) -> Vec<Op> {
        fn walk(children: &[Node], path: &mut Vec<usize>) -> Option<Vec<Op>> {
            for (ix, node) in children.iter().enumerate() {
                let Node::Element(el) = node else {
                    continue;
                };

                path.push(ix);
                for (child_ix, pair) in el.children.windows(2).enumerate() {
                    let (Node::Text(left), Node::Text(right)) = (&pair[0], &pair[1]) else {
                        continue;
                    };
                    if left.marks != right.marks {
                        continue;
                    }

                    let mut left_path = path.clone();
                    left_path.push(child_ix);
                    let mut right_path = path.clone();
                    right_path.push(child_ix + 1);

                    let mut ops = Vec::new();
                    if !right.text.is_empty() {
                        ops.push(Op::InsertText {
                            path: left_path,
                            offset: left.text.len(),
                            text: right.text.clone(),
                        });
                    }
                    ops.push(Op::RemoveNode { path: right_path });
                    path.pop();
                    return Some(ops);
                }
                if let Some(ops) = walk(&el.children, path) {
                    path.pop();
                    return Some(ops);
                }
                path.pop();
            }
            None
        }

        walk(&doc.children, &mut Vec::new()).unwrap_or_default()
    }
}
