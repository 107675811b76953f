//! Application entry point for front-ends.
//!
//! [`ChatClient`] owns the shared [`AppState`] and hands it to each component
//! it builds. Front-ends drive it through its methods and consume
//! [`ClientEvent`]s from the receiver returned at construction.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::api::catalog::{Catalog, CatalogClient};
use crate::core::chat_stream::{MessageDispatcher, ResponseStream};
use crate::core::config::Config;
use crate::core::error::ChatError;
use crate::core::realtime::{RealtimeChannel, RealtimeHandle, RealtimeSettings};
use crate::core::session::SessionClient;
use crate::core::state::{AppState, CapabilitySelection, ClientEvent, ConnectionState, NoticeLevel};

/// Outcome of [`ChatClient::start`].
#[derive(Debug, Clone)]
pub struct Readiness {
    pub catalog: Catalog,
    /// Result of the first realtime connection attempt.
    pub connection: ConnectionState,
}

pub struct ChatClient {
    state: Arc<AppState>,
    catalog_client: CatalogClient,
    sessions: Arc<SessionClient>,
    dispatcher: MessageDispatcher,
    realtime: Option<RealtimeChannel>,
    handle: Option<RealtimeHandle>,
    catalog: Catalog,
}

impl ChatClient {
    pub fn new(config: &Config) -> Result<(Self, mpsc::UnboundedReceiver<ClientEvent>), ChatError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self::with_http_client(config, client))
    }

    pub fn with_http_client(
        config: &Config,
        client: reqwest::Client,
    ) -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (state, events) = AppState::new();
        state.update_selection(|selection| {
            selection.model = config.default_model.clone();
            selection.tools.extend(config.default_tools.iter().cloned());
            selection
                .data_sources
                .extend(config.default_data_sources.iter().cloned());
        });

        let base_url = config.base_url().to_string();
        let endpoints = config.endpoints.clone();
        let (announcer, outbound) = mpsc::unbounded_channel();

        let sessions = Arc::new(
            SessionClient::new(
                client.clone(),
                base_url.clone(),
                endpoints.clone(),
                Arc::clone(&state),
            )
            .with_announcer(announcer),
        );
        let dispatcher = MessageDispatcher::new(
            client.clone(),
            base_url.clone(),
            endpoints.clone(),
            Arc::clone(&state),
            Arc::clone(&sessions),
        );
        let catalog_client = CatalogClient::new(client, base_url, endpoints);
        let realtime = RealtimeChannel::new(
            RealtimeSettings::from_config(config),
            Arc::clone(&state),
            Arc::clone(&sessions),
            outbound,
        );

        let chat = Self {
            state,
            catalog_client,
            sessions,
            dispatcher,
            realtime: Some(realtime),
            handle: None,
            catalog: Catalog::default(),
        };
        (chat, events)
    }

    /// Load the catalog and open the realtime channel concurrently.
    ///
    /// Resolves once the catalog is loaded and the first connection attempt
    /// has settled. Catalog failures are reported as notices and leave the
    /// affected lists empty.
    pub async fn start(&mut self) -> Readiness {
        let mut handle = match self.realtime.take() {
            Some(channel) => Some(channel.spawn()),
            None => self.handle.take(),
        };

        let (catalog, connection) = tokio::join!(
            load_catalog(&self.catalog_client, &self.state),
            async {
                match handle.as_mut() {
                    Some(handle) => handle.first_attempt().await,
                    None => ConnectionState::Closed,
                }
            },
        );
        self.handle = handle;

        if let Some(first) = catalog.models.first() {
            let adopted = self.state.update_selection(|selection| {
                if selection.model.is_some() {
                    return false;
                }
                selection.model = Some(first.name.clone());
                true
            });
            if adopted {
                debug!(model = %first.name, "Using first listed model");
            }
        }

        info!(
            models = catalog.models.len(),
            tools = catalog.tools.len(),
            data_sources = catalog.data_sources.len(),
            connection = connection.as_str(),
            "Client ready"
        );
        self.catalog = catalog.clone();
        Readiness {
            catalog,
            connection,
        }
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn session_id(&self) -> Option<String> {
        self.sessions.current()
    }

    pub fn connection(&self) -> ConnectionState {
        match &self.handle {
            Some(handle) => handle.status(),
            None if self.realtime.is_some() => ConnectionState::Connecting,
            None => ConnectionState::Closed,
        }
    }

    pub fn selection(&self) -> CapabilitySelection {
        self.state.selection()
    }

    pub fn select_model(&self, model: Option<String>) {
        self.state.update_selection(|selection| selection.model = model);
    }

    pub fn toggle_tool(&self, name: &str) -> bool {
        self.state
            .update_selection(|selection| selection.toggle_tool(name))
    }

    pub fn toggle_data_source(&self, name: &str) -> bool {
        self.state
            .update_selection(|selection| selection.toggle_data_source(name))
    }

    pub async fn send(&self, content: &str) -> Result<ResponseStream, ChatError> {
        self.dispatcher.send(content).await
    }

    /// Clear the transcript and acquire a fresh session.
    pub async fn new_chat(&self) -> Result<String, ChatError> {
        let result = self.sessions.new_chat().await;
        match &result {
            Ok(_) => self.state.notify(NoticeLevel::Success, "Started a new chat"),
            Err(err) => self
                .state
                .notify(NoticeLevel::Error, format!("Could not start a new chat: {err}")),
        }
        result
    }

    pub async fn download_transcript(&self, dir: &Path) -> Result<PathBuf, ChatError> {
        self.sessions.download_transcript(dir).await
    }

    /// Close the realtime channel. Safe to call more than once.
    pub async fn shutdown(&mut self) {
        self.realtime = None;
        if let Some(mut handle) = self.handle.take() {
            handle.shutdown().await;
        }
    }
}

async fn load_catalog(client: &CatalogClient, state: &AppState) -> Catalog {
    let (app, theme, models, tools, data_sources) = tokio::join!(
        client.app_config(),
        client.theme(),
        client.models(),
        client.tools(),
        client.data_sources(),
    );

    Catalog {
        app: degrade(state, "app config", app).flatten(),
        theme: degrade(state, "theme", theme).flatten(),
        models: degrade(state, "models", models).unwrap_or_default(),
        tools: degrade(state, "tools", tools).unwrap_or_default(),
        data_sources: degrade(state, "data sources", data_sources).unwrap_or_default(),
    }
}

fn degrade<T>(state: &AppState, what: &str, result: Result<T, ChatError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(catalog = what, error = %err, "Catalog request failed");
            state.notify(NoticeLevel::Warning, format!("Failed to load {what}: {err}"));
            None
        }
    }
}
