use nib_core::{
    list_item_number, set_custom_number, Behaviors, Document, Editor, ElementKind, Node, Point,
    Selection,
};
use pretty_assertions::assert_eq;

fn item(text: &str, custom_number: Option<u64>) -> Node {
    Node::element(
        ElementKind::NumberedListItem { custom_number },
        vec![Node::text(text)],
    )
}

fn numbered_list(items: Vec<Node>) -> Document {
    Document {
        children: vec![Node::element(ElementKind::NumberedList, items)],
    }
}

fn displayed_numbers(doc: &Document, count: usize) -> Vec<u64> {
    (0..count)
        .map(|ix| list_item_number(doc, &[0, ix]).expect("numbered list item"))
        .collect()
}

#[test]
fn overrides_reanchor_following_items() {
    let doc = numbered_list(vec![
        item("a", None),
        item("b", None),
        item("c", Some(7)),
        item("d", None),
        item("e", Some(13)),
        item("f", None),
    ]);

    assert_eq!(displayed_numbers(&doc, 6), vec![1, 2, 7, 8, 13, 14]);
}

#[test]
fn adjacent_overrides_are_each_terminal() {
    let doc = numbered_list(vec![
        item("a", Some(7)),
        item("b", Some(3)),
        item("c", None),
    ]);

    // Each override wins outright; the plain item continues from the
    // nearest one.
    assert_eq!(displayed_numbers(&doc, 3), vec![7, 3, 4]);
}

#[test]
fn override_on_first_item_anchors_the_rest() {
    let doc = numbered_list(vec![
        item("a", Some(5)),
        item("b", None),
        item("c", None),
    ]);

    assert_eq!(displayed_numbers(&doc, 3), vec![5, 6, 7]);
}

#[test]
fn plain_items_with_no_override_use_sibling_position() {
    let doc = numbered_list(vec![item("a", None), item("b", None)]);

    assert_eq!(displayed_numbers(&doc, 2), vec![1, 2]);
}

#[test]
fn non_items_have_no_number() {
    let doc = Document {
        children: vec![Node::paragraph("abc")],
    };

    assert_eq!(list_item_number(&doc, &[0]), None);
    assert_eq!(list_item_number(&doc, &[5]), None);
}

#[test]
fn set_custom_number_renumbers_following_items() {
    let doc = numbered_list(vec![item("a", None), item("b", None), item("c", None)]);
    let mut editor = Editor::new(
        doc,
        Some(Selection::collapsed(Point::new(vec![0, 0, 0], 0))),
        Behaviors::new(),
    );

    set_custom_number(&mut editor, &[0, 1], Some(10)).unwrap();
    assert_eq!(displayed_numbers(editor.doc(), 3), vec![1, 10, 11]);

    set_custom_number(&mut editor, &[0, 1], None).unwrap();
    assert_eq!(displayed_numbers(editor.doc(), 3), vec![1, 2, 3]);
}

#[test]
fn set_custom_number_rejects_non_items() {
    let doc = Document {
        children: vec![Node::paragraph("abc")],
    };
    let mut editor = Editor::new(doc, None, Behaviors::new());

    assert!(set_custom_number(&mut editor, &[0], Some(3)).is_err());
    assert!(set_custom_number(&mut editor, &[4], Some(3)).is_err());
}
