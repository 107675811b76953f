//! Wire payloads exchanged with the chat backend.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod catalog;

#[derive(Deserialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
}

#[derive(Serialize, Debug, PartialEq)]
pub struct SendMessageRequest {
    pub content: String,
    pub llm_name: Option<String>,
    pub selected_tools: Vec<String>,
    pub selected_data_sources: Vec<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// `/llms` answers with a bare array; older backends wrap it in `{llms: [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
pub enum ModelsResponse {
    List(Vec<ModelInfo>),
    Wrapped { llms: Vec<ModelInfo> },
}

impl ModelsResponse {
    pub fn into_models(self) -> Vec<ModelInfo> {
        match self {
            ModelsResponse::List(models) | ModelsResponse::Wrapped { llms: models } => models,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ToolInfo {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Deserialize)]
pub struct ToolsResponse {
    pub tools: Vec<ToolInfo>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct DataSourceInfo {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Deserialize)]
pub struct DataSourcesResponse {
    pub data_sources: Vec<DataSourceInfo>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub app_name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// Theme metadata; color keys vary between backend versions.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ThemeConfig {
    pub app_name: Option<String>,
    #[serde(flatten)]
    pub colors: BTreeMap<String, Value>,
}

/// Frames the client may send over the realtime channel.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    SessionInit { session_id: String },
}

/// Frames pushed by the server over the realtime channel.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    SessionId {
        session_id: String,
    },
    Status {
        #[serde(default)]
        status: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },
    Thinking {
        #[serde(default)]
        message: Option<String>,
    },
    ToolCall {
        #[serde(default)]
        tool_name: Option<String>,
        #[serde(default)]
        arguments: Option<Value>,
    },
    Error {
        #[serde(default)]
        message: Option<String>,
    },
    MessageStart,
    MessageChunk {
        #[serde(default)]
        content: Option<String>,
    },
    MessageComplete {
        #[serde(default)]
        content: Option<String>,
    },
    #[serde(other)]
    Unknown,
}
