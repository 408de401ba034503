use serde::{Deserialize, Serialize};

use super::message::Emoji;

pub const ACTION_ROW: u8 = 1;
pub const BUTTON: u8 = 2;
pub const STRING_SELECT: u8 = 3;
pub const TEXT_INPUT: u8 = 4;

pub const BUTTON_PRIMARY: u8 = 1;
pub const BUTTON_SECONDARY: u8 = 2;
pub const BUTTON_SUCCESS: u8 = 3;
pub const BUTTON_DANGER: u8 = 4;

pub const TEXT_INPUT_SHORT: u8 = 1;
pub const TEXT_INPUT_PARAGRAPH: u8 = 2;

/// A message or modal component.
///
/// The API distinguishes components by an integer `type`; rather than an
/// enum per type we keep one flat struct, which also deserializes the
/// partial components echoed back in modal submissions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Component {
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<Emoji>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<SelectOption>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<Vec<Component>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectOption {
    pub label: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl SelectOption {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
            description: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl Component {
    pub fn action_row(components: Vec<Component>) -> Self {
        Self {
            kind: ACTION_ROW,
            components: Some(components),
            ..Default::default()
        }
    }

    pub fn button(style: u8, label: impl Into<String>, custom_id: impl Into<String>) -> Self {
        Self {
            kind: BUTTON,
            style: Some(style),
            label: Some(label.into()),
            custom_id: Some(custom_id.into()),
            ..Default::default()
        }
    }

    pub fn string_select(
        custom_id: impl Into<String>,
        placeholder: impl Into<String>,
        options: Vec<SelectOption>,
    ) -> Self {
        Self {
            kind: STRING_SELECT,
            custom_id: Some(custom_id.into()),
            placeholder: Some(placeholder.into()),
            options: Some(options),
            ..Default::default()
        }
    }

    pub fn text_input(
        custom_id: impl Into<String>,
        label: impl Into<String>,
        style: u8,
    ) -> Self {
        Self {
            kind: TEXT_INPUT,
            custom_id: Some(custom_id.into()),
            label: Some(label.into()),
            style: Some(style),
            required: Some(true),
            ..Default::default()
        }
    }

    pub fn with_emoji(mut self, name: &str) -> Self {
        self.emoji = Some(Emoji {
            id: None,
            name: Some(name.to_string()),
        });
        self
    }

    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_length(mut self, min: Option<u16>, max: Option<u16>) -> Self {
        self.min_length = min;
        self.max_length = max;
        self
    }

    /// Depth-first search for a component by custom id, e.g. a text input
    /// inside the action rows of a modal submission.
    pub fn find<'a>(components: &'a [Component], custom_id: &str) -> Option<&'a Component> {
        for c in components {
            if c.custom_id.as_deref() == Some(custom_id) {
                return Some(c);
            }
            if let Some(inner) = c.components.as_deref() {
                if let Some(found) = Self::find(inner, custom_id) {
                    return Some(found);
                }
            }
        }
        None
    }
}
