use nib_core::{
    delete_backward, insert_text, ApplyError, Behaviors, Document, Editor, ElementKind, Marks,
    Node, Op, Point, Selection, TextNode, Transaction,
};
use pretty_assertions::assert_eq;

fn caret_editor(doc: Document, path: Vec<usize>, offset: usize) -> Editor {
    Editor::new(
        doc,
        Some(Selection::collapsed(Point::new(path, offset))),
        Behaviors::new(),
    )
}

#[test]
fn insert_text_at_caret_moves_the_caret() {
    let doc = Document {
        children: vec![Node::paragraph("ab")],
    };
    let mut editor = caret_editor(doc, vec![0, 0], 1);

    insert_text(&mut editor, "xy").unwrap();

    assert_eq!(editor.doc().children, vec![Node::paragraph("axyb")]);
    let sel = editor.selection().unwrap();
    assert!(sel.is_collapsed());
    assert_eq!(sel.focus, Point::new(vec![0, 0], 3));
}

#[test]
fn insert_text_replaces_a_selection() {
    let doc = Document {
        children: vec![Node::paragraph("hello")],
    };
    let mut editor = Editor::new(
        doc,
        Some(Selection {
            anchor: Point::new(vec![0, 0], 1),
            focus: Point::new(vec![0, 0], 4),
        }),
        Behaviors::new(),
    );

    insert_text(&mut editor, "u").unwrap();

    assert_eq!(editor.doc().children, vec![Node::paragraph("huo")]);
    assert_eq!(editor.selection().unwrap().focus, Point::new(vec![0, 0], 2));
}

#[test]
fn delete_backward_removes_one_code_point() {
    let doc = Document {
        children: vec![Node::paragraph("aé")],
    };
    let mut editor = caret_editor(doc, vec![0, 0], "aé".len());

    delete_backward(&mut editor).unwrap();
    assert_eq!(editor.doc().children, vec![Node::paragraph("a")]);

    delete_backward(&mut editor).unwrap();
    assert_eq!(editor.doc().children, vec![Node::paragraph("")]);
}

#[test]
fn delete_backward_at_block_start_merges_into_previous_block() {
    let doc = Document {
        children: vec![Node::paragraph("a"), Node::paragraph("b")],
    };
    let mut editor = caret_editor(doc, vec![1, 0], 0);

    delete_backward(&mut editor).unwrap();

    assert_eq!(editor.doc().children, vec![Node::paragraph("ab")]);
    let sel = editor.selection().unwrap();
    assert_eq!(sel.focus, Point::new(vec![0, 0], 1));
}

#[test]
fn delete_backward_at_document_start_is_noop() {
    let doc = Document {
        children: vec![Node::paragraph("ab")],
    };
    let mut editor = caret_editor(doc, vec![0, 0], 0);

    delete_backward(&mut editor).unwrap();

    assert_eq!(editor.doc().children, vec![Node::paragraph("ab")]);
}

#[test]
fn delete_backward_reaches_into_inline_elements() {
    let doc = Document {
        children: vec![Node::element(
            ElementKind::Paragraph,
            vec![
                Node::text("a"),
                Node::element(
                    ElementKind::Link {
                        url: "http://x".to_string(),
                    },
                    vec![Node::text("xy")],
                ),
                Node::text("b"),
            ],
        )],
    };
    // Caret right after the link, at the start of the trailing leaf.
    let mut editor = caret_editor(doc, vec![0, 2], 0);

    delete_backward(&mut editor).unwrap();

    let Node::Element(paragraph) = &editor.doc().children[0] else {
        panic!("expected paragraph");
    };
    let Node::Element(link) = &paragraph.children[1] else {
        panic!("expected link");
    };
    assert_eq!(link.children, vec![Node::text("x")]);
}

#[test]
fn construction_normalizes_adjacent_equal_leaves() {
    let doc = Document {
        children: vec![Node::element(
            ElementKind::Paragraph,
            vec![Node::text("ab"), Node::text("cd")],
        )],
    };
    let editor = Editor::new(doc, None, Behaviors::new());

    assert_eq!(editor.doc().children, vec![Node::paragraph("abcd")]);
}

#[test]
fn construction_keeps_differently_marked_leaves_apart() {
    let bold = Node::Text(TextNode {
        text: "cd".to_string(),
        marks: Marks {
            is_bold: true,
            ..Marks::default()
        },
    });
    let doc = Document {
        children: vec![Node::element(
            ElementKind::Paragraph,
            vec![Node::text("ab"), bold.clone()],
        )],
    };
    let editor = Editor::new(doc, None, Behaviors::new());

    let Node::Element(paragraph) = &editor.doc().children[0] else {
        panic!("expected paragraph");
    };
    assert_eq!(paragraph.children, vec![Node::text("ab"), bold]);
}

#[test]
fn construction_repairs_childless_containers_and_empty_documents() {
    let doc = Document {
        children: vec![Node::element(ElementKind::NumberedList, Vec::new())],
    };
    let editor = Editor::new(doc, None, Behaviors::new());
    assert_eq!(editor.doc().children, vec![Node::paragraph("")]);

    let editor = Editor::new(Document::default(), None, Behaviors::new());
    assert_eq!(editor.doc().children, vec![Node::paragraph("")]);
}

#[test]
fn raw_transactions_apply_or_reject_whole() {
    let doc = Document {
        children: vec![Node::paragraph("ab")],
    };
    let mut editor = caret_editor(doc, vec![0, 0], 0);

    editor
        .apply(Transaction::new(vec![
            Op::SetKind {
                path: vec![0],
                kind: ElementKind::Heading,
            },
            Op::SetMarks {
                path: vec![0, 0],
                marks: Marks {
                    is_italic: true,
                    ..Marks::default()
                },
            },
        ]))
        .unwrap();

    let Node::Element(el) = &editor.doc().children[0] else {
        panic!("expected element");
    };
    assert_eq!(el.kind, ElementKind::Heading);
    let Node::Text(t) = &el.children[0] else {
        panic!("expected leaf");
    };
    assert!(t.marks.is_italic);

    // A transaction with a dangling path is rejected without touching the
    // tree, even though its first op was applicable.
    let before = editor.doc().clone();
    let err = editor.apply(Transaction::new(vec![
        Op::InsertText {
            path: vec![0, 0],
            offset: 0,
            text: "x".to_string(),
        },
        Op::RemoveNode { path: vec![9] },
    ]));
    assert!(matches!(err, Err(ApplyError::InvalidPath(_))));
    assert_eq!(editor.doc(), &before);
}

#[test]
fn construction_gives_text_blocks_a_leaf() {
    let doc = Document {
        children: vec![Node::element(ElementKind::Heading, Vec::new())],
    };
    let editor = Editor::new(doc, None, Behaviors::new());

    assert_eq!(
        editor.doc().children,
        vec![Node::element(ElementKind::Heading, vec![Node::text("")])]
    );
}
