use crate::core::message::{Message, MessageId, Role};
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Install the stderr diagnostics subscriber. `RUST_LOG` overrides the
/// default `warn` filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Plain-text transcript log. Each message is appended once, after it has
/// been finalized.
pub struct LoggingState {
    file_path: Option<PathBuf>,
    logged: HashSet<MessageId>,
}

impl LoggingState {
    pub fn new(log_file: Option<PathBuf>) -> Result<Self, Box<dyn std::error::Error>> {
        let mut logging = LoggingState {
            file_path: None,
            logged: HashSet::new(),
        };
        if let Some(path) = log_file {
            logging.set_log_file(path)?;
        }
        Ok(logging)
    }

    pub fn set_log_file(&mut self, path: PathBuf) -> Result<String, Box<dyn std::error::Error>> {
        // Test if we can create/write to the file
        test_file_access(&path)?;

        let status = format!("Logging enabled to: {}", path.display());
        self.file_path = Some(path);
        Ok(status)
    }

    pub fn is_active(&self) -> bool {
        self.file_path.is_some()
    }

    pub fn get_status_string(&self) -> String {
        match &self.file_path {
            None => "disabled".to_string(),
            Some(path) => format!("active ({})", file_name(path)),
        }
    }

    /// Append every finalized message of `messages` that has not been
    /// written yet. Returns how many were written.
    pub fn log_finalized(&mut self, messages: &[Message]) -> Result<usize, Box<dyn std::error::Error>> {
        let Some(path) = self.file_path.as_ref() else {
            return Ok(0);
        };

        let pending: Vec<&Message> = messages
            .iter()
            .filter(|message| message.finalized && !self.logged.contains(&message.id))
            .collect();
        if pending.is_empty() {
            return Ok(0);
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = BufWriter::with_capacity(64 * 1024, file);
        let mut written = 0;
        for message in pending {
            self.logged.insert(message.id);
            let content = match message.role {
                Role::User => format!("You: {}", message.content),
                Role::Assistant if message.content.is_empty() => continue,
                Role::Assistant => message.content.clone(),
                Role::System => format!("## {}", message.content),
            };
            for line in content.lines() {
                writeln!(writer, "{line}")?;
            }
            // Empty line between messages
            writeln!(writer)?;
            written += 1;
        }

        writer.flush()?;
        Ok(written)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .into_owned()
}

fn test_file_access(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.flush()?;
    Ok(())
}
