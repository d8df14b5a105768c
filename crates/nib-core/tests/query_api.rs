use nib_core::{
    find_previous, is_selection_collapsed, node_at, selected_text, unhang, Behaviors, Document,
    Editor, ElementKind, Marks, Node, Point, Selection, TextNode,
};
use pretty_assertions::assert_eq;

fn mixed_paragraph() -> Document {
    Document {
        children: vec![Node::element(
            ElementKind::Paragraph,
            vec![
                Node::Text(TextNode {
                    text: "ab".to_string(),
                    marks: Marks {
                        is_bold: true,
                        ..Marks::default()
                    },
                }),
                Node::text("cd"),
            ],
        )],
    }
}

#[test]
fn selected_text_concatenates_leaf_slices() {
    let editor = Editor::new(
        mixed_paragraph(),
        Some(Selection {
            anchor: Point::new(vec![0, 0], 1),
            focus: Point::new(vec![0, 1], 1),
        }),
        Behaviors::new(),
    );

    assert_eq!(selected_text(&editor), "bc");
    assert!(!is_selection_collapsed(&editor));
}

#[test]
fn selected_text_is_empty_for_a_caret() {
    let editor = Editor::new(
        mixed_paragraph(),
        Some(Selection::collapsed(Point::new(vec![0, 1], 1))),
        Behaviors::new(),
    );

    assert_eq!(selected_text(&editor), "");
    assert!(is_selection_collapsed(&editor));
}

#[test]
fn find_previous_walks_document_order_backward() {
    let doc = Document {
        children: vec![Node::element(
            ElementKind::NumberedList,
            vec![
                Node::element(
                    ElementKind::NumberedListItem {
                        custom_number: Some(5),
                    },
                    vec![Node::text("a")],
                ),
                Node::element(
                    ElementKind::NumberedListItem {
                        custom_number: None,
                    },
                    vec![Node::text("b")],
                ),
            ],
        )],
    };

    let found = find_previous(&doc, &[0, 1], &|node, _| {
        matches!(
            node,
            Node::Element(el)
                if matches!(el.kind, ElementKind::NumberedListItem { custom_number: Some(_) })
        )
    });
    let (path, _) = found.expect("an overridden item precedes [0, 1]");
    assert_eq!(path, vec![0, 0]);

    // Nothing before the first item matches; the enclosing list is an
    // ancestor, not a predecessor.
    let none = find_previous(&doc, &[0, 0], &|node, _| {
        matches!(node, Node::Element(el) if el.kind.same_kind(&ElementKind::NumberedList))
    });
    assert!(none.is_none());
}

#[test]
fn node_at_resolves_paths() {
    let doc = mixed_paragraph();

    assert!(matches!(
        node_at(&doc, &[0]),
        Some(Node::Element(el)) if el.kind == ElementKind::Paragraph
    ));
    assert!(matches!(node_at(&doc, &[0, 1]), Some(Node::Text(_))));
    assert!(node_at(&doc, &[0, 5]).is_none());
    assert!(node_at(&doc, &[3]).is_none());
}

#[test]
fn unhang_pulls_a_trailing_block_start_back() {
    let doc = Document {
        children: vec![Node::paragraph("ab"), Node::paragraph("cd")],
    };
    let editor = Editor::new(doc, None, Behaviors::new());

    let selection = Selection {
        anchor: Point::new(vec![0, 0], 1),
        focus: Point::new(vec![1, 0], 0),
    };
    let (start, end) = unhang(editor.doc(), &selection);

    assert_eq!(start, Point::new(vec![0, 0], 1));
    assert_eq!(end, Point::new(vec![0, 0], 2));
}

#[test]
fn unhang_keeps_ranges_that_reach_into_a_block() {
    let doc = Document {
        children: vec![Node::paragraph("ab"), Node::paragraph("cd")],
    };
    let editor = Editor::new(doc, None, Behaviors::new());

    let selection = Selection {
        anchor: Point::new(vec![0, 0], 1),
        focus: Point::new(vec![1, 0], 1),
    };
    let (start, end) = unhang(editor.doc(), &selection);

    assert_eq!(start, Point::new(vec![0, 0], 1));
    assert_eq!(end, Point::new(vec![1, 0], 1));
}
