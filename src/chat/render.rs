//! Output rendering for the chat client.
//!
//! [`EventPrinter`] turns the session's event stream into incremental
//! terminal output through a [`Renderer`]. Content events carry the whole
//! reply each time; the printer tracks what it already wrote and only prints
//! the new tail, or reprints when the reply was replaced outright.

use std::io::{self, Stdout, Write};

use crate::events::ChatEvent;
use crate::types::{Message, MessageId};
use crate::utils::time::clock_label;

/// ANSI escape code for dim text (used for notices and footers).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code for bold text (used for the reply header).
const ANSI_BOLD: &str = "\x1b[1m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for cyan text (used for model names).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// Trait for rendering chat output.
pub trait Renderer: Send {
    /// Called when an assistant reply opens, before any content.
    fn start_response(&mut self, model_code: &str);

    /// Print a chunk of reply text.
    fn print_text(&mut self, text: &str);

    /// Print a reply that replaced what was shown so far.
    fn print_replacement(&mut self, text: &str);

    /// Print an error message.
    fn print_error(&mut self, error: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);

    /// Called when a reply is complete; `footer` is a short status line.
    fn finish_response(&mut self, footer: &str);

    /// Called when the reply was stopped by the user.
    fn print_interrupted(&mut self);
}

/// Plain text renderer with optional ANSI styling.
pub struct PlainTextRenderer {
    stdout: Stdout,
    use_color: bool,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self {
            stdout: io::stdout(),
            use_color,
        }
    }

    /// Flushes stdout to ensure immediate display of streamed content.
    fn flush(&mut self) {
        let _ = self.stdout.flush();
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for PlainTextRenderer {
    fn start_response(&mut self, model_code: &str) {
        if self.use_color {
            print!("{ANSI_BOLD}{ANSI_CYAN}[{model_code}]{ANSI_RESET} ");
        } else {
            print!("[{model_code}] ");
        }
        self.flush();
    }

    fn print_text(&mut self, text: &str) {
        print!("{text}");
        self.flush();
    }

    fn print_replacement(&mut self, text: &str) {
        if self.use_color {
            print!("\n{ANSI_DIM}{text}{ANSI_RESET}");
        } else {
            print!("\n{text}");
        }
        self.flush();
    }

    fn print_error(&mut self, error: &str) {
        if self.use_color {
            eprintln!("\n{ANSI_RED}Error: {error}{ANSI_RESET}");
        } else {
            eprintln!("\nError: {error}");
        }
    }

    fn print_info(&mut self, info: &str) {
        println!("{info}");
    }

    fn finish_response(&mut self, footer: &str) {
        if self.use_color {
            println!("\n{ANSI_DIM}{footer}{ANSI_RESET}");
        } else {
            println!("\n{footer}");
        }
        self.flush();
    }

    fn print_interrupted(&mut self) {
        println!("\n[stopped]");
        self.flush();
    }
}

/// What has been written for the reply currently on screen.
#[derive(Debug)]
struct OpenReply {
    id: MessageId,
    printed: String,
}

/// Renders session events through a [`Renderer`].
pub struct EventPrinter<R: Renderer> {
    renderer: R,
    open: Option<OpenReply>,
}

impl<R: Renderer> EventPrinter<R> {
    /// Creates a printer writing through `renderer`.
    pub fn new(renderer: R) -> Self {
        Self {
            renderer,
            open: None,
        }
    }

    /// The underlying renderer.
    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    /// Render one event.
    pub fn handle(&mut self, event: &ChatEvent) {
        match event {
            ChatEvent::ModelsLoaded {
                registry,
                default_code,
            } => {
                let name = registry.display_name(default_code).unwrap_or(default_code);
                self.renderer.print_info(&format!(
                    "{} models available; using {name} ({default_code})",
                    registry.len()
                ));
            }
            ChatEvent::ModelChanged {
                old_code,
                new_code,
                new_name,
            } => {
                self.renderer
                    .print_info(&format!("Switched model: {old_code} -> {new_name} ({new_code})"));
            }
            ChatEvent::MessageAdded { message } => {
                if message.is_assistant() {
                    self.open = Some(OpenReply {
                        id: message.id.clone(),
                        printed: String::new(),
                    });
                    self.renderer
                        .start_response(message.model_code.as_deref().unwrap_or("assistant"));
                }
            }
            ChatEvent::ContentUpdated { message } => self.update(message),
            ChatEvent::StreamComplete { message, .. } => {
                self.update(message);
                self.open = None;
                self.renderer.finish_response(&clock_label(message.created_at));
            }
            ChatEvent::StreamStopped => {
                self.open = None;
                self.renderer.print_interrupted();
            }
            ChatEvent::ConversationCleared => {
                self.open = None;
                self.renderer.print_info("Conversation cleared.");
            }
            ChatEvent::Error { message } => {
                self.open = None;
                self.renderer.print_error(message);
            }
        }
    }

    fn update(&mut self, message: &Message) {
        let Some(open) = self.open.as_mut() else {
            return;
        };
        if open.id != message.id {
            return;
        }
        if let Some(tail) = message.content.strip_prefix(open.printed.as_str()) {
            if !tail.is_empty() {
                self.renderer.print_text(tail);
            }
        } else {
            self.renderer.print_replacement(&message.content);
        }
        open.printed.clone_from(&message.content);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ModelRegistry;
    use time::macros::datetime;

    #[derive(Default)]
    struct Recording(Vec<String>);

    impl Renderer for Recording {
        fn start_response(&mut self, model_code: &str) {
            self.0.push(format!("start:{model_code}"));
        }
        fn print_text(&mut self, text: &str) {
            self.0.push(format!("text:{text}"));
        }
        fn print_replacement(&mut self, text: &str) {
            self.0.push(format!("replace:{text}"));
        }
        fn print_error(&mut self, error: &str) {
            self.0.push(format!("error:{error}"));
        }
        fn print_info(&mut self, info: &str) {
            self.0.push(format!("info:{info}"));
        }
        fn finish_response(&mut self, footer: &str) {
            self.0.push(format!("finish:{footer}"));
        }
        fn print_interrupted(&mut self) {
            self.0.push("stopped".to_string());
        }
    }

    fn reply(content: &str) -> Message {
        let mut message = Message::assistant(
            MessageId::new("a1"),
            "qianwen",
            datetime!(2025-01-01 09:30 UTC),
        );
        message.content = content.to_string();
        message
    }

    #[test]
    fn renderer_default_has_color() {
        let renderer = PlainTextRenderer::new();
        assert!(renderer.use_color);
        assert!(!PlainTextRenderer::with_color(false).use_color);
    }

    #[test]
    fn prints_only_new_text() {
        let mut printer = EventPrinter::new(Recording::default());
        printer.handle(&ChatEvent::MessageAdded { message: reply("") });
        printer.handle(&ChatEvent::ContentUpdated {
            message: reply("Hel"),
        });
        printer.handle(&ChatEvent::ContentUpdated {
            message: reply("Hello"),
        });
        printer.handle(&ChatEvent::StreamComplete {
            message: reply("Hello"),
            conversation_id: None,
        });
        assert_eq!(
            printer.renderer_mut().0,
            vec!["start:qianwen", "text:Hel", "text:lo", "finish:09:30"]
        );
    }

    #[test]
    fn replaced_reply_is_reprinted() {
        let mut printer = EventPrinter::new(Recording::default());
        printer.handle(&ChatEvent::MessageAdded { message: reply("") });
        printer.handle(&ChatEvent::ContentUpdated {
            message: reply("partial"),
        });
        printer.handle(&ChatEvent::ContentUpdated {
            message: reply("An error occurred"),
        });
        printer.handle(&ChatEvent::Error {
            message: "Protocol error: boom".to_string(),
        });
        assert_eq!(
            printer.renderer_mut().0,
            vec![
                "start:qianwen",
                "text:partial",
                "replace:An error occurred",
                "error:Protocol error: boom"
            ]
        );
    }

    #[test]
    fn lifecycle_notices() {
        let mut printer = EventPrinter::new(Recording::default());
        printer.handle(&ChatEvent::ModelsLoaded {
            registry: ModelRegistry::fallback(),
            default_code: "qianwen".to_string(),
        });
        printer.handle(&ChatEvent::StreamStopped);
        printer.handle(&ChatEvent::ConversationCleared);
        assert_eq!(
            printer.renderer_mut().0,
            vec![
                "info:4 models available; using Alibaba Qianwen (qianwen)",
                "stopped",
                "info:Conversation cleared."
            ]
        );
    }
}
