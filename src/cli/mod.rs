//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the appropriate commands.

pub mod catalog_list;
pub mod repl;
pub mod say;
pub mod settings;

use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::cli::catalog_list::{list_data_sources, list_models, list_tools};
use crate::cli::repl::run_repl;
use crate::cli::say::run_say;
use crate::cli::settings::{run_set, run_unset};
use crate::core::config::Config;
use crate::utils::logging::init_tracing;

#[derive(Parser)]
#[command(name = "galaxy-chat")]
#[command(version)]
#[command(about = "A terminal client for Galaxy Chat backends")]
#[command(
    long_about = "galaxy-chat talks to a Galaxy Chat backend: it creates a session, streams \
replies as they are generated, and listens on the realtime channel for status updates.\n\n\
Configuration:\n\
  Settings are read from config.toml in the platform config directory.\n\
  Command-line flags override the file.\n\n\
Environment Variables:\n\
  RUST_LOG          Diagnostic filter for stderr output (defaults to warn)\n\n\
Chat commands:\n\
  /new              Start a new chat with a fresh session\n\
  /download         Save the server transcript to the current directory\n\
  /tools [NAME]     List tools, or toggle NAME for the next message\n\
  /sources [NAME]   List data sources, or toggle NAME\n\
  /model [NAME]     Show or change the model\n\
  /quit             Leave the chat\n\n\
Settings:\n\
  galaxy-chat set                      Show the saved configuration\n\
  galaxy-chat set default-model NAME   Save a default (see `set` for keys)\n\
  galaxy-chat unset default-model      Clear a saved value"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Backend base URL, e.g. http://127.0.0.1:8000
    #[arg(short = 'u', long, global = true, value_name = "URL")]
    pub base_url: Option<String>,

    /// Model to request replies from
    #[arg(short = 'm', long, global = true, value_name = "MODEL")]
    pub model: Option<String>,

    /// Tool to enable; repeat for more
    #[arg(short = 't', long = "tool", global = true, value_name = "TOOL")]
    pub tools: Vec<String>,

    /// Data source to enable; repeat for more
    #[arg(short = 'd', long = "data-source", global = true, value_name = "SOURCE")]
    pub data_sources: Vec<String>,

    /// Enable logging to specified file
    #[arg(short = 'l', long, global = true)]
    pub log: Option<PathBuf>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// List the models offered by the backend
    Models,
    /// List the tools offered by the backend
    Tools,
    /// List the data sources offered by the backend
    DataSources,
    /// Send one message and print the streamed reply
    Say {
        /// Message to send (can be multiple words)
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        prompt: Vec<String>,
    },
    /// Start the interactive chat (default)
    Chat,
    /// Set configuration values; without a key, show the current ones
    Set {
        /// Configuration key to set
        key: Option<String>,
        /// Value to set; lists accept several words or commas
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        value: Vec<String>,
    },
    /// Unset configuration values
    Unset {
        /// Configuration key to unset
        key: String,
    },
}

impl Args {
    /// Layer command-line overrides onto the loaded config.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(base_url) = &self.base_url {
            config.base_url = Some(base_url.clone());
        }
        if let Some(model) = &self.model {
            config.default_model = Some(model.clone());
        }
        if !self.tools.is_empty() {
            config.default_tools = self.tools.clone();
        }
        if !self.data_sources.is_empty() {
            config.default_data_sources = self.data_sources.clone();
        }
    }
}

pub fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let mut args = Args::parse();
    let mut config = Config::load()?;
    args.apply_to(&mut config);

    match args.command.take().unwrap_or(Commands::Chat) {
        Commands::Models => list_models(&config).await,
        Commands::Tools => list_tools(&config).await,
        Commands::DataSources => list_data_sources(&config).await,
        Commands::Say { prompt } => run_say(&config, prompt).await,
        Commands::Chat => run_repl(&config, args.log).await,
        Commands::Set { key, value } => run_set(key, value),
        Commands::Unset { key } => run_unset(key),
    }
}
