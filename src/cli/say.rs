//! Non-interactive "say" command

use std::error::Error;
use std::io::{self, Write};

use futures_util::StreamExt;

use crate::core::chat_stream::StreamEvent;
use crate::core::client::ChatClient;
use crate::core::config::Config;

pub async fn run_say(config: &Config, prompt: Vec<String>) -> Result<(), Box<dyn Error>> {
    let prompt = prompt.join(" ");
    if prompt.trim().is_empty() {
        eprintln!("Usage: galaxy-chat say <prompt>");
        std::process::exit(1);
    }

    let (mut chat, _events) = ChatClient::new(config)?;
    let mut stream = chat.send(&prompt).await?;

    let mut failure = None;
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
            StreamEvent::Error(err) => failure = Some(err),
        }
    }
    chat.shutdown().await;

    if let Some(err) = failure {
        eprintln!("\n\n❌ Error: {err}");
        std::process::exit(1);
    }
    Ok(())
}
