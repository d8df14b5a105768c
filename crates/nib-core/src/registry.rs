use std::sync::Arc;

use serde_json::Value;

use crate::core::{Editor, ElementKind, Mark};
use crate::format::{
    set_mark_value, toggle_block, toggle_mark, wrap_link, CommandError,
};
use crate::query::{is_background_active, is_block_active, is_mark_active, selected_link};

pub const DEFAULT_HIGHLIGHT_COLOR: &str = "#fff59d";

type EditorPredicate = Arc<dyn Fn(&Editor) -> bool + Send + Sync>;
type Effect = Arc<dyn Fn(&mut Editor, Option<Value>) -> Result<(), CommandError> + Send + Sync>;

/// One named formatting action: an activation predicate, an effect, an
/// optional hotkey descriptor, and an availability predicate for the
/// floating toolbar. The presentation layer iterates the registry to build
/// its controls; the effects dispatch into the formatting operations.
#[derive(Clone)]
pub struct Feature {
    pub id: &'static str,
    pub label: &'static str,
    pub hotkey: Option<&'static str>,
    active_when: EditorPredicate,
    floating_when: EditorPredicate,
    effect: Effect,
}

impl Feature {
    pub fn new(
        id: &'static str,
        label: &'static str,
        effect: impl Fn(&mut Editor, Option<Value>) -> Result<(), CommandError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            id,
            label,
            hotkey: None,
            active_when: Arc::new(|_| false),
            floating_when: Arc::new(|_| true),
            effect: Arc::new(effect),
        }
    }

    pub fn hotkey(mut self, hotkey: &'static str) -> Self {
        self.hotkey = Some(hotkey);
        self
    }

    pub fn active(mut self, pred: impl Fn(&Editor) -> bool + Send + Sync + 'static) -> Self {
        self.active_when = Arc::new(pred);
        self
    }

    pub fn floating(mut self, pred: impl Fn(&Editor) -> bool + Send + Sync + 'static) -> Self {
        self.floating_when = Arc::new(pred);
        self
    }

    pub fn is_active(&self, editor: &Editor) -> bool {
        (self.active_when)(editor)
    }

    pub fn is_available_in_floating_toolbar(&self, editor: &Editor) -> bool {
        (self.floating_when)(editor)
    }

    pub fn activate(
        &self,
        editor: &mut Editor,
        args: Option<Value>,
    ) -> Result<(), CommandError> {
        (self.effect)(editor, args)
    }
}

/// An ordered catalogue of formatting actions.
#[derive(Clone, Default)]
pub struct FeatureRegistry {
    features: Vec<Feature>,
}

impl FeatureRegistry {
    pub fn new(features: impl IntoIterator<Item = Feature>) -> Result<Self, String> {
        let mut registry = Self::default();
        for feature in features {
            registry.register(feature)?;
        }
        Ok(registry)
    }

    /// The standard catalogue, in toolbar order.
    pub fn standard() -> Self {
        let features = vec![
            Feature::new("bold", "Bold", |editor, _args| {
                toggle_mark(editor, Mark::Bold)
            })
            .hotkey("mod+b")
            .active(|editor| is_mark_active(editor, Mark::Bold)),
            Feature::new("italic", "Italic", |editor, _args| {
                toggle_mark(editor, Mark::Italic)
            })
            .hotkey("mod+i")
            .active(|editor| is_mark_active(editor, Mark::Italic)),
            Feature::new("strikethrough", "Strikethrough", |editor, _args| {
                toggle_mark(editor, Mark::Strikethrough)
            })
            .hotkey("mod+shift+x")
            .active(|editor| is_mark_active(editor, Mark::Strikethrough)),
            Feature::new("highlight", "Highlight", |editor, args| {
                let color = args
                    .as_ref()
                    .and_then(|v| v.get("color"))
                    .and_then(|v| v.as_str())
                    .unwrap_or(DEFAULT_HIGHLIGHT_COLOR);
                set_mark_value(editor, color)
            })
            .active(is_background_active),
            Feature::new("link", "Link", |editor, args| {
                let url = args
                    .as_ref()
                    .and_then(|v| v.get("url"))
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| CommandError::new("missing args.url"))?;
                wrap_link(editor, url)
            })
            .hotkey("mod+k")
            .active(|editor| selected_link(editor).is_some()),
            Feature::new("heading", "Heading", |editor, _args| {
                toggle_block(editor, ElementKind::Heading)
            })
            .active(|editor| is_block_active(editor, &ElementKind::Heading))
            .floating(|_| false),
            Feature::new("bulleted-list", "Bulleted list", |editor, _args| {
                toggle_block(editor, ElementKind::BulletedList)
            })
            .active(|editor| is_block_active(editor, &ElementKind::BulletedList))
            .floating(|_| false),
            Feature::new("numbered-list", "Numbered list", |editor, _args| {
                toggle_block(editor, ElementKind::NumberedList)
            })
            .active(|editor| is_block_active(editor, &ElementKind::NumberedList))
            .floating(|_| false),
            Feature::new("code-block", "Code block", |editor, _args| {
                toggle_block(editor, ElementKind::CodeBlock)
            })
            .active(|editor| is_block_active(editor, &ElementKind::CodeBlock))
            .floating(|_| false),
        ];
        Self::new(features).expect("standard registry must be valid")
    }

    pub fn register(&mut self, feature: Feature) -> Result<(), String> {
        if self.features.iter().any(|f| f.id == feature.id) {
            return Err(format!("Duplicate feature id: {}", feature.id));
        }
        self.features.push(feature);
        Ok(())
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn feature(&self, id: &str) -> Option<&Feature> {
        self.features.iter().find(|f| f.id == id)
    }

    pub fn feature_for_hotkey(&self, hotkey: &str) -> Option<&Feature> {
        self.features
            .iter()
            .find(|f| f.hotkey.is_some_and(|h| h.eq_ignore_ascii_case(hotkey)))
    }
}
