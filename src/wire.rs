//! Envelope shapes and their binary encoding. `serde` derives on these
//! structs are the single source of truth for wire shape — there is no
//! separate hand-written validation pass that could drift from them.

use serde::{Deserialize, Serialize};

pub const REQUEST_RECEIVE_WINDOW: usize = 8 * 1024;
pub const RESULT_RECEIVE_WINDOW: usize = 4 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub callback: Option<String>,
    #[serde(default)]
    pub model_id: Option<u64>,
    #[serde(default)]
    pub ranked: Option<bool>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub priority: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AckEnvelope {
    pub id: String,
    pub status: &'static str,
}

impl AckEnvelope {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: "accepted",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub id: String,
    pub error: &'static str,
    pub code: u16,
}

impl ErrorEnvelope {
    pub fn new(id: impl Into<String>, token: crate::error::ErrorToken) -> Self {
        Self {
            id: id.into(),
            error: token.as_str(),
            code: token.code(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResultEnvelope {
    pub id: String,
    pub model_id: u64,
    pub tool_id: &'static str,
    pub tool_input_json: String,
    pub priority: &'static str,
}

pub const CHAT_TOOL_ID: &str = "__chat__";

/// Encode any serializable envelope as a self-describing MessagePack map.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, rmp_serde::encode::Error> {
    rmp_serde::to_vec_named(value)
}

/// Decode bytes as a self-describing MessagePack map.
pub fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, rmp_serde::decode::Error> {
    rmp_serde::from_slice(bytes)
}
