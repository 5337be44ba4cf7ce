//! The set of backend models a session can talk to.
//!
//! The registry is fetched once at startup. When the fetch fails for any
//! reason, a built-in set is installed instead so chat is never blocked on it.

use std::fmt;

use crate::client::Transport;
use crate::observability::REGISTRY_FALLBACKS;
use crate::types::{Model, ModelsResponse};
use crate::{Error, Result};

/// Built-in models used when the backend cannot list its own.
///
/// The first entry is the default.
pub const FALLBACK_MODELS: &[(&str, &str)] = &[
    ("qianwen", "Alibaba Qianwen"),
    ("xinghuo", "iFlytek Spark"),
    ("doubao", "Doubao"),
    ("deepseek", "DeepSeek"),
];

/// Ordered mapping of model code to display name.
///
/// Never empty, and codes are unique. Order is the order the server listed
/// the models in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRegistry {
    entries: Vec<Model>,
    default_code: String,
}

impl ModelRegistry {
    /// The built-in registry.
    pub fn fallback() -> Self {
        let entries: Vec<Model> = FALLBACK_MODELS
            .iter()
            .map(|(code, name)| Model::new(*code, *name))
            .collect();
        let default_code = entries[0].code.clone();
        Self {
            entries,
            default_code,
        }
    }

    /// Build a registry from a models payload.
    ///
    /// Fails when the payload reports failure, lists no models, or names a
    /// model with something other than a string. Duplicate codes keep their
    /// first position. The default is the server's choice when it names a
    /// listed model, and the first model otherwise.
    pub fn from_response(response: ModelsResponse) -> Result<Self> {
        if !response.success {
            return Err(Error::protocol("model listing reported failure"));
        }
        let listed = response
            .entries()
            .ok_or_else(|| Error::protocol("model listing contains a non-string name"))?;
        let mut entries: Vec<Model> = Vec::with_capacity(listed.len());
        for model in listed {
            if model.code.trim().is_empty() {
                return Err(Error::protocol("model listing contains an empty code"));
            }
            if !entries.iter().any(|m| m.code == model.code) {
                entries.push(model);
            }
        }
        let Some(first) = entries.first() else {
            return Err(Error::protocol("model listing is empty"));
        };
        let default_code = match response.default_model {
            Some(code) if entries.iter().any(|m| m.code == code) => code,
            Some(code) => {
                tracing::debug!(code = %code, "server default model is not listed; using first model");
                first.code.clone()
            }
            None => first.code.clone(),
        };
        Ok(Self {
            entries,
            default_code,
        })
    }

    /// Fetch the registry through a transport.
    ///
    /// Both outcomes carry a usable registry; the failure arm holds the
    /// built-in set and the reason the fetch was rejected.
    pub async fn load(
        transport: &dyn Transport,
    ) -> std::result::Result<RegistryLoaded, RegistryLoadFailed> {
        match transport.fetch_models().await.and_then(Self::from_response) {
            Ok(registry) => {
                tracing::info!(
                    models = registry.len(),
                    default = registry.default_code(),
                    "loaded model registry"
                );
                Ok(RegistryLoaded { registry })
            }
            Err(cause) => {
                REGISTRY_FALLBACKS.click();
                tracing::warn!(error = %cause, "model registry unavailable; using built-in models");
                Err(RegistryLoadFailed {
                    registry: Self::fallback(),
                    cause,
                })
            }
        }
    }

    /// Returns true if `code` names a model in the registry.
    pub fn contains(&self, code: &str) -> bool {
        self.get(code).is_some()
    }

    /// The model with the given code.
    pub fn get(&self, code: &str) -> Option<&Model> {
        self.entries.iter().find(|m| m.code == code)
    }

    /// Display name of the model with the given code.
    pub fn display_name(&self, code: &str) -> Option<&str> {
        self.get(code).map(|m| m.display_name.as_str())
    }

    /// Models in server order.
    pub fn iter(&self) -> impl Iterator<Item = &Model> {
        self.entries.iter()
    }

    /// Number of models. Always at least one.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Code of the model selected when the registry is installed.
    pub fn default_code(&self) -> &str {
        &self.default_code
    }

    /// The default model.
    pub fn default_model(&self) -> &Model {
        self.get(&self.default_code).unwrap_or(&self.entries[0])
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::fallback()
    }
}

/// A registry fetched from the backend.
#[derive(Debug, Clone)]
pub struct RegistryLoaded {
    /// The fetched registry.
    pub registry: ModelRegistry,
}

impl RegistryLoaded {
    /// Code of the default model.
    pub fn default_code(&self) -> &str {
        self.registry.default_code()
    }
}

/// The backend registry was unusable and the built-in set was installed.
#[derive(Debug, Clone)]
pub struct RegistryLoadFailed {
    /// The built-in registry that was installed instead.
    pub registry: ModelRegistry,
    /// Why the fetched registry was rejected.
    pub cause: Error,
}

impl RegistryLoadFailed {
    /// Code of the default model.
    pub fn default_code(&self) -> &str {
        self.registry.default_code()
    }
}

impl fmt::Display for RegistryLoadFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "model registry unavailable, using built-in models: {}",
            self.cause
        )
    }
}

impl std::error::Error for RegistryLoadFailed {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ByteStream;
    use crate::types::{ChatRequest, ConversationId};
    use async_trait::async_trait;
    use serde_json::json;

    struct ModelsOnly(Result<ModelsResponse>);

    #[async_trait]
    impl Transport for ModelsOnly {
        async fn fetch_models(&self) -> Result<ModelsResponse> {
            self.0.clone()
        }

        async fn send(&self, _: &ChatRequest) -> Result<ByteStream> {
            Err(Error::connection("unused", None))
        }

        async fn clear_conversation(&self, _: &ConversationId) -> Result<()> {
            Ok(())
        }
    }

    fn response(value: serde_json::Value) -> ModelsResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn fallback_is_usable() {
        let registry = ModelRegistry::fallback();
        assert_eq!(registry.len(), 4);
        assert_eq!(registry.default_code(), "qianwen");
        assert_eq!(registry.display_name("deepseek"), Some("DeepSeek"));
        assert_eq!(registry.default_model().display_name, "Alibaba Qianwen");
    }

    #[test]
    fn server_default_is_honoured() {
        let registry = ModelRegistry::from_response(response(json!({
            "success": true,
            "models": {"xinghuo": "iFlytek Spark", "doubao": "Doubao"},
            "defaultModel": "doubao"
        })))
        .unwrap();
        assert_eq!(registry.default_code(), "doubao");
        let codes: Vec<_> = registry.iter().map(|m| m.code.as_str()).collect();
        assert_eq!(codes, vec!["xinghuo", "doubao"]);
    }

    #[test]
    fn unknown_server_default_falls_back_to_first() {
        let registry = ModelRegistry::from_response(response(json!({
            "success": true,
            "models": {"xinghuo": "iFlytek Spark", "doubao": "Doubao"},
            "defaultModel": "gpt"
        })))
        .unwrap();
        assert_eq!(registry.default_code(), "xinghuo");
        assert!(!registry.contains("gpt"));
    }

    #[test]
    fn rejected_payloads() {
        assert!(ModelRegistry::from_response(response(json!({"success": false}))).is_err());
        assert!(
            ModelRegistry::from_response(response(json!({"success": true, "models": {}})))
                .is_err()
        );
        assert!(
            ModelRegistry::from_response(response(
                json!({"success": true, "models": {"a": null}})
            ))
            .is_err()
        );
    }

    #[test]
    fn load_success() {
        let transport = ModelsOnly(Ok(response(json!({
            "success": true,
            "models": {"deepseek": "DeepSeek"}
        }))));
        let loaded = tokio_test::block_on(ModelRegistry::load(&transport)).unwrap();
        assert_eq!(loaded.default_code(), "deepseek");
        assert_eq!(loaded.registry.len(), 1);
    }

    #[tokio::test]
    async fn load_failure_installs_fallback() {
        let transport = ModelsOnly(Ok(response(json!({"success": false}))));
        let failed = ModelRegistry::load(&transport).await.unwrap_err();
        assert_eq!(failed.registry, ModelRegistry::fallback());
        assert_eq!(failed.default_code(), "qianwen");
        assert!(failed.cause.is_protocol());

        let transport = ModelsOnly(Err(Error::transport(Some(500), "HTTP 500", None)));
        let failed = ModelRegistry::load(&transport).await.unwrap_err();
        assert_eq!(failed.cause.status_code(), Some(500));
    }
}
