//! Configuration types for the chat client.
//!
//! `ChatArgs` is what the command line says; `ChatConfig` is what the session
//! and terminal client run with once defaults and the environment are applied.

use std::time::Duration;

use arrrg_derive::CommandLine;

use crate::chat::session::DEFAULT_USER_ID;
use crate::client::{BASE_URL_ENV, DEFAULT_BASE_URL};

/// Log level used when neither `--log-level` nor `RUST_LOG` says otherwise.
pub const DEFAULT_LOG_LEVEL: &str = "warn";

/// Command-line arguments for the parley-chat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Backend base URL.
    #[arrrg(
        optional,
        "Backend base URL (default: $PARLEY_BASE_URL or http://localhost:8080/)",
        "URL"
    )]
    pub base_url: Option<String>,

    /// Model code to select once models are loaded.
    #[arrrg(optional, "Model code to use (default: server default)", "MODEL")]
    pub model: Option<String>,

    /// User id sent with every message.
    #[arrrg(optional, "User id sent with each message (default: web-user)", "USER")]
    pub user_id: Option<String>,

    /// Request timeout in seconds.
    #[arrrg(optional, "Request timeout in seconds (default: none)", "SECS")]
    pub timeout_secs: Option<u64>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,

    /// Log filter for stderr diagnostics.
    #[arrrg(optional, "Log level: error, warn, info, debug, trace (default: warn)", "LEVEL")]
    pub log_level: Option<String>,
}

/// Configuration for a chat session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    /// Base URL of the chat backend.
    pub base_url: String,

    /// Model code to select after loading; `None` keeps the server default.
    pub model: Option<String>,

    /// User id sent with every message.
    pub user_id: String,

    /// Transport timeout for each request. `None` waits indefinitely.
    pub request_timeout: Option<Duration>,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,

    /// Log filter applied when `RUST_LOG` is unset.
    pub log_level: String,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    ///
    /// Defaults:
    /// - Base URL: http://localhost:8080/
    /// - Model: server default
    /// - User id: web-user
    /// - Timeout: none
    /// - Color: enabled
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: None,
            user_id: DEFAULT_USER_ID.to_string(),
            request_timeout: None,
            use_color: true,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }

    /// Sets the backend base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the model to select.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the user id.
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }

    /// Sets the default log filter.
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    fn resolve(args: ChatArgs, env_base_url: Option<String>) -> Self {
        let defaults = ChatConfig::new();
        ChatConfig {
            base_url: args
                .base_url
                .or(env_base_url)
                .filter(|url| !url.trim().is_empty())
                .unwrap_or(defaults.base_url),
            model: args.model.filter(|m| !m.trim().is_empty()),
            user_id: args.user_id.unwrap_or(defaults.user_id),
            request_timeout: args
                .timeout_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            use_color: !args.no_color,
            log_level: args.log_level.unwrap_or(defaults.log_level),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl From<ChatArgs> for ChatConfig {
    fn from(args: ChatArgs) -> Self {
        Self::resolve(args, std::env::var(BASE_URL_ENV).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ChatConfig::new();
        assert_eq!(config.base_url, "http://localhost:8080/");
        assert!(config.model.is_none());
        assert_eq!(config.user_id, "web-user");
        assert!(config.request_timeout.is_none());
        assert!(config.use_color);
        assert_eq!(config.log_level, "warn");
    }

    #[test]
    fn config_from_args_defaults() {
        let config = ChatConfig::resolve(ChatArgs::default(), None);
        assert_eq!(config, ChatConfig::new());
    }

    #[test]
    fn config_from_args_custom() {
        let args = ChatArgs {
            base_url: Some("http://chat.internal:9000/".to_string()),
            model: Some("deepseek".to_string()),
            user_id: Some("alice".to_string()),
            timeout_secs: Some(30),
            no_color: true,
            log_level: Some("debug".to_string()),
        };
        let config = ChatConfig::resolve(args, Some("http://ignored/".to_string()));
        assert_eq!(config.base_url, "http://chat.internal:9000/");
        assert_eq!(config.model.as_deref(), Some("deepseek"));
        assert_eq!(config.user_id, "alice");
        assert_eq!(config.request_timeout, Some(Duration::from_secs(30)));
        assert!(!config.use_color);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn environment_base_url_is_a_fallback() {
        let config = ChatConfig::resolve(ChatArgs::default(), Some("http://env:1234/".to_string()));
        assert_eq!(config.base_url, "http://env:1234/");
    }

    #[test]
    fn zero_timeout_means_none() {
        let args = ChatArgs {
            timeout_secs: Some(0),
            ..ChatArgs::default()
        };
        assert!(ChatConfig::resolve(args, None).request_timeout.is_none());
    }

    #[test]
    fn config_builder_pattern() {
        let config = ChatConfig::new()
            .with_base_url("http://example.com/")
            .with_model("doubao")
            .with_user_id("bob")
            .with_request_timeout(Some(Duration::from_secs(5)))
            .without_color()
            .with_log_level("info");
        assert_eq!(config.base_url, "http://example.com/");
        assert_eq!(config.model.as_deref(), Some("doubao"));
        assert_eq!(config.user_id, "bob");
        assert_eq!(config.request_timeout, Some(Duration::from_secs(5)));
        assert!(!config.use_color);
        assert_eq!(config.log_level, "info");
    }
}
