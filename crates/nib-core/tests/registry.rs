use nib_core::{Behaviors, Document, Editor, Feature, FeatureRegistry, Node, Point, Selection};
use pretty_assertions::assert_eq;
use serde_json::json;

fn selected_editor() -> Editor {
    let doc = Document {
        children: vec![Node::paragraph("hello")],
    };
    Editor::new(
        doc,
        Some(Selection {
            anchor: Point::new(vec![0, 0], 0),
            focus: Point::new(vec![0, 0], 5),
        }),
        Behaviors::new(),
    )
}

#[test]
fn standard_catalogue_is_ordered() {
    let registry = FeatureRegistry::standard();
    let ids: Vec<&str> = registry.features().iter().map(|f| f.id).collect();
    assert_eq!(
        ids,
        vec![
            "bold",
            "italic",
            "strikethrough",
            "highlight",
            "link",
            "heading",
            "bulleted-list",
            "numbered-list",
            "code-block",
        ]
    );
}

#[test]
fn hotkeys_resolve_case_insensitively() {
    let registry = FeatureRegistry::standard();
    assert_eq!(registry.feature_for_hotkey("mod+b").unwrap().id, "bold");
    assert_eq!(registry.feature_for_hotkey("MOD+I").unwrap().id, "italic");
    assert!(registry.feature_for_hotkey("mod+z").is_none());
}

#[test]
fn bold_feature_toggles_and_reports_active_state() {
    let registry = FeatureRegistry::standard();
    let bold = registry.feature("bold").unwrap();
    let mut editor = selected_editor();

    assert!(!bold.is_active(&editor));
    bold.activate(&mut editor, None).unwrap();
    assert!(bold.is_active(&editor));
    bold.activate(&mut editor, None).unwrap();
    assert!(!bold.is_active(&editor));
}

#[test]
fn link_feature_requires_a_url() {
    let registry = FeatureRegistry::standard();
    let link = registry.feature("link").unwrap();
    let mut editor = selected_editor();

    assert!(link.activate(&mut editor, None).is_err());
    link.activate(&mut editor, Some(json!({ "url": "http://x" })))
        .unwrap();
    assert!(link.is_active(&editor));
}

#[test]
fn highlight_feature_defaults_its_color() {
    let registry = FeatureRegistry::standard();
    let highlight = registry.feature("highlight").unwrap();
    let mut editor = selected_editor();

    assert!(!highlight.is_active(&editor));
    highlight.activate(&mut editor, None).unwrap();
    assert!(highlight.is_active(&editor));
}

#[test]
fn block_features_stay_out_of_the_floating_toolbar() {
    let registry = FeatureRegistry::standard();
    let editor = selected_editor();

    let available: Vec<&str> = registry
        .features()
        .iter()
        .filter(|f| f.is_available_in_floating_toolbar(&editor))
        .map(|f| f.id)
        .collect();
    assert_eq!(
        available,
        vec!["bold", "italic", "strikethrough", "highlight", "link"]
    );
}

#[test]
fn duplicate_feature_ids_are_rejected() {
    let mut registry = FeatureRegistry::standard();
    let duplicate = Feature::new("bold", "Bold again", |_, _| Ok(()));
    assert!(registry.register(duplicate).is_err());
}
