use std::fmt;

use serde::{Deserialize, Serialize};

/// A backend model that can serve chat replies.
///
/// The `code` is what goes on the wire as `modelProvider`; the display name is
/// only ever shown to people.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Model {
    /// Backend identifier, unique within a registry.
    pub code: String,

    /// Human-readable name for selectors and status lines.
    #[serde(rename = "displayName")]
    pub display_name: String,
}

impl Model {
    /// Create a new `Model`.
    pub fn new(code: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            display_name: display_name.into(),
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name, self.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_display() {
        let model = Model::new("deepseek", "DeepSeek");
        assert_eq!(model.to_string(), "DeepSeek (deepseek)");
    }

    #[test]
    fn model_serialization() {
        let model = Model::new("doubao", "Doubao");
        let json = serde_json::to_value(&model).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"code": "doubao", "displayName": "Doubao"})
        );
    }
}
