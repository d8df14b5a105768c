use thiserror::Error;

use crate::core::{ApplyError, Editor, ElementKind, Mark, Node};
use crate::ops::{Op, Transaction};
use crate::query::{is_block_active, is_mark_active, node_at, selected_link};
use crate::transforms::{
    insert_nodes, set_nodes, unwrap_at, unwrap_nodes, wrap_nodes, MarkPatch, Props,
    TransformError,
};

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct CommandError {
    message: String,
}

impl CommandError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<TransformError> for CommandError {
    fn from(err: TransformError) -> Self {
        Self::new(err.to_string())
    }
}

impl From<ApplyError> for CommandError {
    fn from(err: ApplyError) -> Self {
        Self::new(err.to_string())
    }
}

/// Two-state flip: when the mark is active across the whole selection it is
/// removed everywhere, otherwise it is set everywhere. Toggling twice
/// restores the original leaf flags. A caret or missing selection is a
/// no-op.
pub fn toggle_mark(editor: &mut Editor, mark: Mark) -> Result<(), CommandError> {
    let Some(sel) = editor.selection() else {
        return Ok(());
    };
    if sel.is_collapsed() {
        return Ok(());
    }

    let active = is_mark_active(editor, mark);
    set_nodes(
        editor,
        Props::Marks(MarkPatch::mark(mark, !active)),
        Some(&|node, _| node.is_text()),
        true,
    )?;
    Ok(())
}

/// Unconditionally sets the background color on every leaf in the
/// selection; an empty string clears it. Overwrite semantics, not a flip:
/// colors replace each other.
pub fn set_mark_value(editor: &mut Editor, color: &str) -> Result<(), CommandError> {
    let Some(sel) = editor.selection() else {
        return Ok(());
    };
    if sel.is_collapsed() {
        return Ok(());
    }

    let value = if color.is_empty() {
        None
    } else {
        Some(color.to_string())
    };
    set_nodes(
        editor,
        Props::Marks(MarkPatch::background(value)),
        Some(&|node, _| node.is_text()),
        true,
    )?;
    Ok(())
}

/// Toggles the block structure of the selected blocks. Containers (lists,
/// code blocks) are always unwrapped before the retype and re-wrapped
/// after, so switching directly between container kinds never nests them.
pub fn toggle_block(editor: &mut Editor, kind: ElementKind) -> Result<(), CommandError> {
    if !matches!(
        kind,
        ElementKind::Heading
            | ElementKind::BulletedList
            | ElementKind::NumberedList
            | ElementKind::CodeBlock
    ) {
        return Err(CommandError::new(format!(
            "`{kind}` is not a toggleable block kind"
        )));
    }
    if editor.selection().is_none() {
        return Ok(());
    }

    let active = is_block_active(editor, &kind);
    let needs_container = kind.is_container();

    editor.transact(|editor| {
        unwrap_nodes(editor, &|node, _| {
            matches!(node, Node::Element(el) if el.kind.is_container())
        })?;

        let target = if active {
            ElementKind::Paragraph
        } else if let Some(item) = kind.item_kind() {
            item
        } else {
            kind.clone()
        };
        set_nodes(editor, Props::Retype(target), None, false)?;

        if !active && needs_container {
            wrap_nodes(editor, kind.clone(), false)?;
        }
        Ok::<(), CommandError>(())
    })
}

/// Wraps the selection in a link element. An active link is replaced, never
/// nested. On a collapsed caret a standalone link is inserted whose text is
/// the url itself. An empty url is a no-op.
pub fn wrap_link(editor: &mut Editor, url: &str) -> Result<(), CommandError> {
    if url.is_empty() {
        return Ok(());
    }
    if editor.selection().is_none() {
        return Ok(());
    }

    let url = url.to_string();
    editor.transact(move |editor| {
        if selected_link(editor).is_some() {
            unwrap_link(editor)?;
        }

        let collapsed = editor.selection().is_some_and(|sel| sel.is_collapsed());
        if collapsed {
            insert_nodes(
                editor,
                vec![Node::element(
                    ElementKind::Link { url: url.clone() },
                    vec![Node::text(url.clone())],
                )],
            )?;
        } else {
            wrap_nodes(editor, ElementKind::Link { url: url.clone() }, true)?;
        }
        Ok::<(), CommandError>(())
    })
}

/// Unwraps the nearest enclosing link; a no-op when none is active.
pub fn unwrap_link(editor: &mut Editor) -> Result<(), CommandError> {
    let Some((path, _)) = selected_link(editor) else {
        return Ok(());
    };
    unwrap_at(editor, &path)?;
    Ok(())
}

/// Sets or clears the manual number override on the numbered list item at
/// `path`.
pub fn set_custom_number(
    editor: &mut Editor,
    path: &[usize],
    number: Option<u64>,
) -> Result<(), CommandError> {
    match node_at(editor.doc(), path) {
        Some(Node::Element(el)) if matches!(el.kind, ElementKind::NumberedListItem { .. }) => {}
        Some(_) => {
            return Err(CommandError::new("target is not a numbered list item"));
        }
        None => {
            return Err(CommandError::new(format!("no node at path {path:?}")));
        }
    }

    let mut tx = Transaction::new(vec![Op::SetKind {
        path: path.to_vec(),
        kind: ElementKind::NumberedListItem {
            custom_number: number,
        },
    }])
    .source("command:set_custom_number");
    if let Some(sel) = editor.selection().cloned() {
        tx = tx.selection_after(sel);
    }
    editor.apply(tx)?;
    Ok(())
}
