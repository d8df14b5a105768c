use crate::core::{Document, ElementKind, Node};
use crate::query::{find_previous, node_at};

/// The display number of the numbered list item at `path`, or `None` when
/// the path does not address one.
///
/// An item's own override wins outright. Otherwise the nearest preceding
/// overridden item re-anchors the count, and every later plain item
/// continues from it by positional distance; with no preceding override the
/// 1-based sibling position is used. Two adjacent overridden items are each
/// terminal and ignore one another.
pub fn list_item_number(doc: &Document, path: &[usize]) -> Option<u64> {
    let Some(Node::Element(el)) = node_at(doc, path) else {
        return None;
    };
    let ElementKind::NumberedListItem { custom_number } = &el.kind else {
        return None;
    };
    if let Some(number) = custom_number {
        return Some(*number);
    }

    let positional = *path.last()? as u64 + 1;

    let previous = find_previous(doc, path, &|node, _| {
        matches!(
            node,
            Node::Element(el) if matches!(el.kind, ElementKind::NumberedListItem { custom_number: Some(_) })
        )
    });

    let Some((anchor_path, Node::Element(anchor_el))) = previous else {
        return Some(positional);
    };
    let ElementKind::NumberedListItem {
        custom_number: Some(anchor),
    } = &anchor_el.kind
    else {
        return Some(positional);
    };
    let anchor_positional = *anchor_path.last()? as u64 + 1;

    Some((anchor + positional).saturating_sub(anchor_positional))
}
