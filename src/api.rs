use serde::{Deserialize, Serialize};

use crate::state::WireMessage;

/// Body of a `generate` call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateParams {
    pub messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl GenerateParams {
    pub fn new(messages: Vec<WireMessage>) -> Self {
        Self {
            messages,
            model: None,
            temperature: None,
            max_tokens: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// Successful `generate` response
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Generation {
    pub content: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub usage: Usage,
    #[serde(default)]
    pub finish_reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Successful `models` response
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModelList {
    pub models: Vec<ModelInfo>,
    #[serde(default)]
    pub provider: String,
}

/// Successful `test` response
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConnectionTest {
    pub message: String,
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub model: String,
}

#[derive(Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
}
