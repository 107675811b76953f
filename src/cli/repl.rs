//! Line-oriented interactive chat.
//!
//! Replies stream to stdout. Notices from the client print to stderr as
//! they arrive, so connection changes show up between prompts.

use std::collections::BTreeSet;
use std::error::Error;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::warn;

use crate::core::chat_stream::StreamEvent;
use crate::core::client::ChatClient;
use crate::core::config::data::path_display;
use crate::core::config::Config;
use crate::core::error::ChatError;
use crate::core::state::{ClientEvent, NoticeLevel};
use crate::utils::logging::LoggingState;

#[derive(Debug, PartialEq, Eq)]
pub enum Input<'a> {
    Empty,
    Message(&'a str),
    New,
    Download,
    Tools(Option<&'a str>),
    Sources(Option<&'a str>),
    Model(Option<&'a str>),
    Help,
    Quit,
    Unknown(&'a str),
}

pub fn parse_input(line: &str) -> Input<'_> {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Input::Message(line);
    };

    let (name, rest) = match command.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, Some(rest.trim()).filter(|rest| !rest.is_empty())),
        None => (command, None),
    };
    match name {
        "new" => Input::New,
        "download" => Input::Download,
        "tools" => Input::Tools(rest),
        "sources" => Input::Sources(rest),
        "model" => Input::Model(rest),
        "help" => Input::Help,
        "quit" | "exit" => Input::Quit,
        _ => Input::Unknown(name),
    }
}

fn notice_prefix(level: NoticeLevel) -> &'static str {
    match level {
        NoticeLevel::Info => "ℹ️ ",
        NoticeLevel::Success => "✅",
        NoticeLevel::Warning => "⚠️ ",
        NoticeLevel::Error => "❌",
    }
}

async fn report_events(mut events: mpsc::UnboundedReceiver<ClientEvent>) {
    while let Some(event) = events.recv().await {
        if let ClientEvent::Notice { level, text } = event {
            eprintln!("{} {text}", notice_prefix(level));
        }
    }
}

fn print_help() {
    println!("Commands:");
    println!("  /new              Start a new chat with a fresh session");
    println!("  /download         Save the server transcript to the current directory");
    println!("  /tools [NAME]     List tools, or toggle NAME for the next message");
    println!("  /sources [NAME]   List data sources, or toggle NAME");
    println!("  /model [NAME]     Show or change the model");
    println!("  /quit             Leave the chat");
}

fn print_toggleable<'a>(
    kind: &str,
    available: impl Iterator<Item = &'a str>,
    selected: &BTreeSet<String>,
) {
    let mut any = false;
    for name in available {
        any = true;
        let mark = if selected.contains(name) { "[x]" } else { "[ ]" };
        println!("  {mark} {name}");
    }
    if !any {
        println!("No {kind} available.");
    }
}

async fn stream_reply(chat: &ChatClient, text: &str) -> Result<(), Box<dyn Error>> {
    let mut stream = match chat.send(text).await {
        Ok(stream) => stream,
        Err(err @ (ChatError::EmptyMessage | ChatError::Busy)) => {
            eprintln!("❌ {err}");
            return Ok(());
        }
        // Session failures are already reported as notices.
        Err(_) => return Ok(()),
    };

    while let Some(event) = stream.next().await {
        match event {
            StreamEvent::ContentDelta(content) => {
                print!("{content}");
                io::stdout().flush()?;
            }
            StreamEvent::ToolSelected(tool) => eprintln!("🛠️  Tool selected: {tool}"),
            StreamEvent::DataSourceSelected(source) => {
                eprintln!("📚 Data source selected: {source}")
            }
            StreamEvent::Done => println!(),
            // Already reported as a notice.
            StreamEvent::Error(_) => println!(),
        }
    }
    Ok(())
}

pub async fn run_repl(config: &Config, log_file: Option<PathBuf>) -> Result<(), Box<dyn Error>> {
    let mut logging = LoggingState::new(log_file)?;
    let (mut chat, events) = ChatClient::new(config)?;
    let reporter = tokio::spawn(report_events(events));

    let ready = chat.start().await;
    let app_name = ready
        .catalog
        .app
        .as_ref()
        .and_then(|app| app.app_name.as_deref())
        .unwrap_or("Galaxy Chat");
    println!("💬 {app_name} at {}", config.base_url());
    if let Some(model) = chat.selection().model {
        println!("🤖 Model: {model}");
    }
    if logging.is_active() {
        println!("📝 Logging: {}", logging.get_status_string());
    }
    println!("Type /help for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };

        match parse_input(&line) {
            Input::Empty => continue,
            Input::Quit => break,
            Input::Help => print_help(),
            Input::Message(text) => stream_reply(&chat, text).await?,
            Input::New => {
                if let Ok(session_id) = chat.new_chat().await {
                    println!("Session {session_id}");
                }
            }
            Input::Download => match chat.download_transcript(Path::new(".")).await {
                Ok(path) => println!("💾 Saved transcript to {}", path_display(&path)),
                Err(err) => eprintln!("❌ {err}"),
            },
            Input::Tools(None) => {
                let catalog = chat.catalog();
                print_toggleable(
                    "tools",
                    catalog.tools.iter().map(|tool| tool.name.as_str()),
                    &chat.selection().tools,
                );
            }
            Input::Tools(Some(name)) => {
                let state = if chat.toggle_tool(name) { "enabled" } else { "disabled" };
                println!("Tool {name} {state}");
            }
            Input::Sources(None) => {
                let catalog = chat.catalog();
                print_toggleable(
                    "data sources",
                    catalog.data_sources.iter().map(|source| source.name.as_str()),
                    &chat.selection().data_sources,
                );
            }
            Input::Sources(Some(name)) => {
                let state = if chat.toggle_data_source(name) { "enabled" } else { "disabled" };
                println!("Data source {name} {state}");
            }
            Input::Model(None) => match chat.selection().model {
                Some(model) => println!("🤖 Model: {model}"),
                None => println!("🤖 Model: server default"),
            },
            Input::Model(Some(name)) => {
                chat.select_model(Some(name.to_string()));
                println!("🤖 Model: {name}");
            }
            Input::Unknown(name) => eprintln!("Unknown command: /{name} (try /help)"),
        }

        if let Err(err) = logging.log_finalized(&chat.state().transcript_snapshot()) {
            warn!(error = %err, "Failed to write transcript log");
        }
    }

    chat.shutdown().await;
    reporter.abort();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_a_message() {
        assert_eq!(parse_input("  hello there \n"), Input::Message("hello there"));
        assert_eq!(parse_input("   "), Input::Empty);
    }

    #[test]
    fn slash_commands_parse_with_optional_argument() {
        assert_eq!(parse_input("/new"), Input::New);
        assert_eq!(parse_input("/download"), Input::Download);
        assert_eq!(parse_input("/tools"), Input::Tools(None));
        assert_eq!(parse_input("/tools   calculator "), Input::Tools(Some("calculator")));
        assert_eq!(parse_input("/sources history"), Input::Sources(Some("history")));
        assert_eq!(parse_input("/model gpt-4o"), Input::Model(Some("gpt-4o")));
        assert_eq!(parse_input("/exit"), Input::Quit);
        assert_eq!(parse_input("/quit"), Input::Quit);
        assert_eq!(parse_input("/frobnicate now"), Input::Unknown("frobnicate"));
    }
}
