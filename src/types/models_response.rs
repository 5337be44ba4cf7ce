use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::Model;

/// Response of the models endpoint.
///
/// `models` is a JSON object of code to display name. Its key order is the
/// order the server wants models presented in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelsResponse {
    /// Whether the server considers the listing valid.
    #[serde(default)]
    pub success: bool,

    /// Code to display-name mapping, in server order.
    #[serde(default)]
    pub models: Map<String, Value>,

    /// Code of the model the server suggests by default.
    #[serde(
        rename = "defaultModel",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub default_model: Option<String>,
}

impl ModelsResponse {
    /// The listed models in server order.
    ///
    /// Returns `None` when any display name is not a string.
    pub fn entries(&self) -> Option<Vec<Model>> {
        self.models
            .iter()
            .map(|(code, name)| name.as_str().map(|name| Model::new(code.clone(), name)))
            .collect()
    }
}
