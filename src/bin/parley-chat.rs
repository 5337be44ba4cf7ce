//! Interactive terminal client for a streaming chat backend.
//!
//! # Usage
//!
//! ```bash
//! # Talk to a local backend
//! parley-chat
//!
//! # Pick the backend and model
//! parley-chat --base-url http://chat.example.com/ --model deepseek
//!
//! # Disable colors (useful for piping output)
//! parley-chat --no-color
//! ```
//!
//! Type `/help` for commands. Ctrl+C while a reply streams stops it.

use std::sync::Arc;

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing_subscriber::{EnvFilter, fmt};

use parley::chat::{
    ChatArgs, ChatCommand, ChatConfig, ChatSession, EventPrinter, PlainTextRenderer, Renderer,
    help_text, parse_command,
};
use parley::{EventReceiver, SendOutcome};

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

/// Main entry point for the parley-chat application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (args, _) = ChatArgs::from_command_line_relaxed("parley-chat [OPTIONS]");
    let config = ChatConfig::from(args);
    init_logging(&config.log_level);

    let session = Arc::new(ChatSession::connect(&config)?);
    let mut events = session.subscribe();
    let mut printer = EventPrinter::new(PlainTextRenderer::with_color(config.use_color));
    let mut rl = DefaultEditor::new()?;

    let stopper = Arc::clone(&session);
    ctrlc::set_handler(move || {
        stopper.stop_streaming();
    })?;

    println!("Parley Chat ({})", config.base_url);
    if let Err(failed) = session.load_models().await {
        printer.renderer_mut().print_error(&failed.to_string());
    }
    // A rejected model arrives as an error event and is printed by `drain`.
    if let Some(model) = config.model.as_deref()
        && let Err(err) = session.set_current_model(model)
    {
        tracing::debug!(model = %model, error = %err, "keeping the default model");
    }
    drain(&mut events, &mut printer);
    println!("Type /help for commands, /quit to exit\n");

    loop {
        let readline = rl.readline("You: ");

        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                if let Some(cmd) = parse_command(line) {
                    match cmd {
                        ChatCommand::Quit => {
                            println!("Goodbye!");
                            break;
                        }
                        ChatCommand::Clear => {
                            if let Err(err) = session.clear_conversation().await {
                                printer.renderer_mut().print_error(&err.to_string());
                            }
                        }
                        ChatCommand::Help => {
                            for line in help_text().lines() {
                                println!("    {}", line);
                            }
                        }
                        ChatCommand::Model(code) => {
                            let _ = session.set_current_model(&code);
                        }
                        ChatCommand::Models => print_models(&session),
                        ChatCommand::Status => print_status(&session),
                        ChatCommand::Stats => print_stats(&session),
                        ChatCommand::Invalid(message) => {
                            printer.renderer_mut().print_error(&message);
                        }
                    }
                    drain(&mut events, &mut printer);
                    continue;
                }

                let send = session.send_message(line);
                tokio::pin!(send);
                let result = loop {
                    tokio::select! {
                        result = &mut send => break result,
                        Some(event) = events.recv() => printer.handle(&event),
                    }
                };
                drain(&mut events, &mut printer);
                match result {
                    Ok(SendOutcome::Completed(_)) | Ok(SendOutcome::Stopped) => {}
                    // Exchange failures were already rendered from the error event.
                    Err(err) if err.is_transport_failure() || err.is_protocol() => {}
                    Err(err) => printer.renderer_mut().print_error(&err.to_string()),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                printer
                    .renderer_mut()
                    .print_error(&format!("Input error: {}", err));
                break;
            }
        }
    }

    Ok(())
}

fn drain<R: Renderer>(events: &mut EventReceiver, printer: &mut EventPrinter<R>) {
    while let Ok(event) = events.try_recv() {
        printer.handle(&event);
    }
}

fn print_models(session: &ChatSession) {
    let current = session.current_model().map(|m| m.code);
    println!("    Available models:");
    for model in session.models() {
        let marker = if current.as_deref() == Some(model.code.as_str()) {
            "*"
        } else {
            " "
        };
        println!("     {marker} {:<12} {}", model.code, model.display_name);
    }
}

fn print_status(session: &ChatSession) {
    let status = session.status();
    println!("    Session Status:");
    println!("      Ready: {}", if status.ready { "yes" } else { "no" });
    println!("      State: {}", status.state);
    match status.current_model {
        Some(model) => println!("      Model: {model}"),
        None => println!("      Model: (not loaded)"),
    }
    match status.conversation_id {
        Some(id) => println!("      Conversation: {id}"),
        None => println!("      Conversation: (new)"),
    }
    println!("      Messages: {}", status.message_count);
    println!("      User: {}", session.user_id());
}

fn print_stats(session: &ChatSession) {
    let stats = session.stats();
    println!("    Session Statistics:");
    println!("      Completed: {}", stats.completed);
    println!("      Failed: {}", stats.failed);
    println!("      Stopped: {}", stats.stopped);
    match stats.last_completion {
        Some(meta) => {
            if let Some(tokens) = meta.total_tokens {
                println!("      Last reply tokens: {tokens}");
            }
            if let Some(ms) = meta.response_time_ms {
                println!("      Last reply time: {ms} ms");
            }
            if let Some(status) = meta.status {
                println!("      Last reply status: {status}");
            }
        }
        None => println!("      Last reply: (none)"),
    }
}
