use serde::{Deserialize, Serialize};

/// Layouts the glasses renderer understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "layoutType", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Layout {
    TextWall {
        text: String,
    },
    DoubleTextWall {
        top_text: String,
        bottom_text: String,
    },
    ReferenceCard {
        title: String,
        text: String,
    },
}

impl Layout {
    pub fn text_wall(text: impl Into<String>) -> Self {
        Layout::TextWall { text: text.into() }
    }

    /// Empty layout used to clear a view.
    pub fn blank() -> Self {
        Layout::TextWall {
            text: String::new(),
        }
    }
}
