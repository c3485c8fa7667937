//! Descriptive labels shown next to content.
//!
//! Labels are derived on demand and never persisted. Their order is part of
//! the contract: ascending sort order, ties keep insertion order.

use serde::Serialize;

pub const PINNED_SORT_ORDER: i32 = 100;
pub const ARCHIVED_SORT_ORDER: i32 = 200;
pub const PUBLIC_SORT_ORDER: i32 = 300;
pub const CONTENT_NAME_SORT_ORDER: i32 = 400;
pub const DEFAULT_SORT_ORDER: i32 = 1000;

/// Presentation style of a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelKind {
    Danger,
    Warning,
    Info,
    Default,
    Topic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Label {
    pub text: String,
    pub kind: LabelKind,
    pub icon: Option<String>,
    pub sort_order: i32,
}

impl Label {
    fn new(kind: LabelKind, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind,
            icon: None,
            sort_order: DEFAULT_SORT_ORDER,
        }
    }

    pub fn danger(text: impl Into<String>) -> Self {
        Self::new(LabelKind::Danger, text)
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self::new(LabelKind::Warning, text)
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::new(LabelKind::Info, text)
    }

    pub fn default_type(text: impl Into<String>) -> Self {
        Self::new(LabelKind::Default, text)
    }

    pub fn topic(name: impl Into<String>) -> Self {
        Self::new(LabelKind::Topic, name).icon("fa-star")
    }

    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn sort_order(mut self, order: i32) -> Self {
        self.sort_order = order;
        self
    }
}

/// Sort labels by ascending sort order. Stable for ties.
pub fn sort_labels(mut labels: Vec<Label>) -> Vec<Label> {
    labels.sort_by_key(|label| label.sort_order);
    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorts_ascending_and_keeps_ties_in_order() {
        let labels = vec![
            Label::topic("b"),
            Label::info("Public").sort_order(PUBLIC_SORT_ORDER),
            Label::topic("a"),
            Label::danger("Pinned").sort_order(PINNED_SORT_ORDER),
        ];

        let sorted = sort_labels(labels);
        let texts: Vec<_> = sorted.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["Pinned", "Public", "b", "a"]);
    }

    #[test]
    fn builders_set_kind_and_icon() {
        let label = Label::warning("Archived").icon("fa-archive").sort_order(ARCHIVED_SORT_ORDER);
        assert_eq!(label.kind, LabelKind::Warning);
        assert_eq!(label.icon.as_deref(), Some("fa-archive"));
        assert_eq!(label.sort_order, 200);
    }
}
