use nib_core::{
    move_caret, selected_link, unwrap_link, wrap_link, Behaviors, Document, Editor, ElementKind,
    MoveUnit, Node, Point, Selection,
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

fn links_in(doc: &Document) -> Vec<(String, String)> {
    fn walk(children: &[Node], out: &mut Vec<(String, String)>) {
        for node in children {
            let Node::Element(el) = node else { continue };
            if let ElementKind::Link { url } = &el.kind {
                let text: String = el
                    .children
                    .iter()
                    .map(|n| match n {
                        Node::Text(t) => t.text.as_str(),
                        _ => "",
                    })
                    .collect();
                out.push((url.clone(), text));
            }
            walk(&el.children, out);
        }
    }

    let mut out = Vec::new();
    walk(&doc.children, &mut out);
    out
}

#[test]
fn wrap_link_at_caret_inserts_url_as_text() {
    let doc = Document {
        children: vec![Node::paragraph("")],
    };
    let mut editor = caret_editor(doc, vec![0, 0], 0);

    wrap_link(&mut editor, "http://x").unwrap();

    assert_eq!(
        links_in(editor.doc()),
        vec![("http://x".to_string(), "http://x".to_string())]
    );
    assert!(selected_link(&editor).is_some());
}

#[test]
fn unwrap_link_after_caret_insert_leaves_plain_text() {
    let doc = Document {
        children: vec![Node::paragraph("")],
    };
    let mut editor = caret_editor(doc, vec![0, 0], 0);

    wrap_link(&mut editor, "http://x").unwrap();
    unwrap_link(&mut editor).unwrap();

    assert_eq!(editor.doc().children, vec![Node::paragraph("http://x")]);
    assert!(selected_link(&editor).is_none());
}

#[test]
fn wrap_link_over_selection_splits_at_boundaries() {
    let doc = Document {
        children: vec![Node::paragraph("hello")],
    };
    let mut editor = range_editor(doc, (vec![0, 0], 1), (vec![0, 0], 4));

    wrap_link(&mut editor, "http://x").unwrap();

    let Node::Element(paragraph) = &editor.doc().children[0] else {
        panic!("expected paragraph");
    };
    assert_eq!(paragraph.children.len(), 3);
    let Node::Text(prefix) = &paragraph.children[0] else {
        panic!("expected leading text");
    };
    assert_eq!(prefix.text, "h");
    assert_eq!(
        links_in(editor.doc()),
        vec![("http://x".to_string(), "ell".to_string())]
    );
    let Node::Text(suffix) = &paragraph.children[2] else {
        panic!("expected trailing text");
    };
    assert_eq!(suffix.text, "o");

    // Collapsed at the end of the link content.
    let sel = editor.selection().unwrap();
    assert!(sel.is_collapsed());
    assert_eq!(sel.focus.path, vec![0, 1, 0]);
    assert_eq!(sel.focus.offset, 3);
}

#[test]
fn wrap_link_over_active_link_replaces_it() {
    let doc = Document {
        children: vec![Node::paragraph("hello")],
    };
    let mut editor = range_editor(doc, (vec![0, 0], 1), (vec![0, 0], 4));
    wrap_link(&mut editor, "http://x").unwrap();

    // The selection now sits inside the link; select its whole text and
    // re-link it somewhere else.
    editor.set_selection(Some(Selection {
        anchor: Point::new(vec![0, 1, 0], 0),
        focus: Point::new(vec![0, 1, 0], 3),
    }));
    wrap_link(&mut editor, "http://y").unwrap();

    assert_eq!(
        links_in(editor.doc()),
        vec![("http://y".to_string(), "ell".to_string())]
    );
}

#[test]
fn wrap_link_with_empty_url_is_noop() {
    let doc = Document {
        children: vec![Node::paragraph("hello")],
    };
    let mut editor = range_editor(doc, (vec![0, 0], 1), (vec![0, 0], 4));

    wrap_link(&mut editor, "").unwrap();

    assert_eq!(editor.doc().children, vec![Node::paragraph("hello")]);
}

#[test]
fn unwrap_link_without_active_link_is_noop() {
    let doc = Document {
        children: vec![Node::paragraph("hello")],
    };
    let mut editor = caret_editor(doc, vec![0, 0], 2);

    unwrap_link(&mut editor).unwrap();

    assert_eq!(editor.doc().children, vec![Node::paragraph("hello")]);
}

#[test]
fn offset_move_steps_across_link_boundary_without_entering_it() {
    let doc = Document {
        children: vec![Node::element(
            ElementKind::Paragraph,
            vec![
                Node::text("h"),
                Node::element(
                    ElementKind::Link {
                        url: "http://x".to_string(),
                    },
                    vec![Node::text("x")],
                ),
                Node::text("o"),
            ],
        )],
    };
    // Caret at the end of the link's text.
    let mut editor = caret_editor(doc, vec![0, 1, 0], 1);

    move_caret(&mut editor, MoveUnit::Offset, false).unwrap();

    let sel = editor.selection().unwrap();
    assert_eq!(sel.focus.path, vec![0, 2]);
    assert_eq!(sel.focus.offset, 0);
}
