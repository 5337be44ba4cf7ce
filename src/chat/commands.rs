//! Slash command parsing for the chat client.
//!
//! Input starting with `/` controls the session and is never sent to the
//! backend.

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Start a new conversation.
    Clear,

    /// Switch to the model with this code.
    Model(String),

    /// List the available models.
    Models,

    /// Show the session status.
    Status,

    /// Show exchange counters.
    Stats,

    /// Display help information.
    Help,

    /// Exit the chat client.
    Quit,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for slash commands.
///
/// Returns `Some(ChatCommand)` if the input is a command,
/// or `None` if it should be sent as a message.
///
/// # Examples
///
/// ```
/// # use parley::chat::parse_command;
/// assert!(parse_command("/quit").is_some());
/// assert!(parse_command("/model deepseek").is_some());
/// assert!(parse_command("Hello there").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let mut parts = rest.splitn(2, char::is_whitespace);
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(str::trim).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "clear" | "new" => ChatCommand::Clear,
        "model" => match argument {
            Some(code) if code.contains(char::is_whitespace) => {
                ChatCommand::Invalid("/model takes a single model code".to_string())
            }
            Some(code) => ChatCommand::Model(code.to_string()),
            None => ChatCommand::Invalid("/model requires a model code".to_string()),
        },
        "models" => ChatCommand::Models,
        "status" => ChatCommand::Status,
        "stats" => ChatCommand::Stats,
        "help" | "?" => ChatCommand::Help,
        "quit" | "exit" | "q" => ChatCommand::Quit,
        "" => ChatCommand::Invalid("empty command; try /help".to_string()),
        other => ChatCommand::Invalid(format!("unknown command /{other}; try /help")),
    };

    Some(result)
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /models                List available models
  /model <code>          Switch model (e.g., /model deepseek)
  /clear                 Start a new conversation
  /status                Show session status
  /stats                 Show exchange statistics
  /help                  Show this help message
  /quit                  Exit the chat

Press Ctrl+C while a reply is streaming to stop it."#
}
