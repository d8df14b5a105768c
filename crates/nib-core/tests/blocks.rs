use nib_core::{
    is_block_active, toggle_block, Behaviors, Document, Editor, ElementKind, Node, Point,
    Selection,
};
use pretty_assertions::assert_eq;

fn caret_editor(doc: Document, path: Vec<usize>, offset: usize) -> Editor {
    Editor::new(
        doc,
        Some(Selection::collapsed(Point::new(path, offset))),
        Behaviors::new(),
    )
}

fn range_editor(doc: Document, anchor: (Vec<usize>, usize), focus: (Vec<usize>, usize)) -> Editor {
    Editor::new(
        doc,
        Some(Selection {
            anchor: Point::new(anchor.0, anchor.1),
            focus: Point::new(focus.0, focus.1),
        }),
        Behaviors::new(),
    )
}

fn kinds_at_root(doc: &Document) -> Vec<ElementKind> {
    doc.children
        .iter()
        .filter_map(|n| match n {
            Node::Element(el) => Some(el.kind.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn toggle_heading_retypes_in_place() {
    let doc = Document {
        children: vec![Node::paragraph("title")],
    };
    let mut editor = caret_editor(doc, vec![0, 0], 2);

    toggle_block(&mut editor, ElementKind::Heading).unwrap();
    assert_eq!(kinds_at_root(editor.doc()), vec![ElementKind::Heading]);
    assert!(is_block_active(&editor, &ElementKind::Heading));

    toggle_block(&mut editor, ElementKind::Heading).unwrap();
    assert_eq!(editor.doc().children, vec![Node::paragraph("title")]);
    assert!(!is_block_active(&editor, &ElementKind::Heading));
}

#[test]
fn toggle_numbered_list_wraps_exactly_one_item() {
    let doc = Document {
        children: vec![Node::paragraph("abc")],
    };
    let mut editor = caret_editor(doc, vec![0, 0], 1);

    toggle_block(&mut editor, ElementKind::NumberedList).unwrap();

    assert_eq!(editor.doc().children.len(), 1);
    let Node::Element(container) = &editor.doc().children[0] else {
        panic!("expected list container");
    };
    assert_eq!(container.kind, ElementKind::NumberedList);
    assert_eq!(container.children.len(), 1);
    let Node::Element(item) = &container.children[0] else {
        panic!("expected list item");
    };
    assert_eq!(item.kind, ElementKind::numbered_list_item());
    assert!(is_block_active(&editor, &ElementKind::NumberedList));

    toggle_block(&mut editor, ElementKind::NumberedList).unwrap();
    assert_eq!(editor.doc().children, vec![Node::paragraph("abc")]);
}

#[test]
fn switching_list_kinds_never_nests_containers() {
    let doc = Document {
        children: vec![Node::paragraph("abc")],
    };
    let mut editor = caret_editor(doc, vec![0, 0], 1);

    toggle_block(&mut editor, ElementKind::BulletedList).unwrap();
    toggle_block(&mut editor, ElementKind::NumberedList).unwrap();

    assert_eq!(editor.doc().children.len(), 1);
    let Node::Element(container) = &editor.doc().children[0] else {
        panic!("expected list container");
    };
    assert_eq!(container.kind, ElementKind::NumberedList);
    for child in &container.children {
        let Node::Element(item) = child else {
            panic!("expected list item");
        };
        assert_eq!(item.kind, ElementKind::numbered_list_item());
        assert!(!item.children.iter().any(
            |n| matches!(n, Node::Element(el) if el.kind.is_container())
        ));
    }
}

#[test]
fn code_block_wraps_selected_paragraphs_as_lines() {
    let doc = Document {
        children: vec![Node::paragraph("let a = 1;"), Node::paragraph("a + 1")],
    };
    let mut editor = range_editor(doc, (vec![0, 0], 0), (vec![1, 0], 5));

    toggle_block(&mut editor, ElementKind::CodeBlock).unwrap();

    assert_eq!(editor.doc().children.len(), 1);
    let Node::Element(container) = &editor.doc().children[0] else {
        panic!("expected code block");
    };
    assert_eq!(container.kind, ElementKind::CodeBlock);
    assert_eq!(
        container
            .children
            .iter()
            .filter_map(|n| match n {
                Node::Element(el) => Some(el.kind.clone()),
                _ => None,
            })
            .collect::<Vec<_>>(),
        vec![ElementKind::CodeLine, ElementKind::CodeLine]
    );

    toggle_block(&mut editor, ElementKind::CodeBlock).unwrap();
    assert_eq!(
        editor.doc().children,
        vec![Node::paragraph("let a = 1;"), Node::paragraph("a + 1")]
    );
}

#[test]
fn is_block_active_ignores_trailing_block_start_touch() {
    let doc = Document {
        children: vec![
            Node::element(
                ElementKind::BulletedList,
                vec![Node::element(ElementKind::ListItem, vec![Node::text("a")])],
            ),
            Node::paragraph("b"),
        ],
    };
    // The range ends at the very start of the paragraph; unhanging pulls it
    // back into the list item.
    let editor = range_editor(doc, (vec![0, 0, 0], 0), (vec![1, 0], 0));

    assert!(is_block_active(&editor, &ElementKind::BulletedList));
    assert!(!is_block_active(&editor, &ElementKind::Heading));
}

#[test]
fn toggle_block_rejects_non_toggleable_kinds() {
    let doc = Document {
        children: vec![Node::paragraph("abc")],
    };
    let mut editor = caret_editor(doc, vec![0, 0], 0);

    assert!(toggle_block(&mut editor, ElementKind::ListItem).is_err());
    assert!(
        toggle_block(
            &mut editor,
            ElementKind::Link {
                url: "http://x".to_string()
            }
        )
        .is_err()
    );
}
