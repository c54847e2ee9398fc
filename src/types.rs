use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::tools::FunctionDeclaration;

/// Fully-formed request. The provider just sends it.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub model: String,
    pub system_instruction: Option<String>,
    pub tools: Vec<FunctionDeclaration>,
    /// Transcript contents in Gemini shape (`{role, parts}`), oldest first.
    pub contents: Vec<Value>,
    pub generation_config: GenerationConfig,
}

/// What came back from the model.
#[derive(Debug, Clone)]
pub struct GenerateResponse {
    /// The candidate content exactly as returned, kept for the transcript.
    pub content: Value,
    pub text: String,
    pub calls: Vec<FunctionCall>,
    pub finish_reason: Option<String>,
    pub usage: Usage,
}

impl GenerateResponse {
    /// A plain-text model reply.
    pub fn text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            content: json!({ "role": "model", "parts": [{ "text": text }] }),
            text,
            calls: Vec::new(),
            finish_reason: Some("STOP".into()),
            usage: Usage::default(),
        }
    }

    /// A model reply requesting the given function calls.
    pub fn calls(calls: Vec<FunctionCall>) -> Self {
        let parts: Vec<Value> = calls
            .iter()
            .map(|c| json!({ "functionCall": c }))
            .collect();
        Self {
            content: json!({ "role": "model", "parts": parts }),
            text: String::new(),
            calls,
            finish_reason: Some("STOP".into()),
            usage: Usage::default(),
        }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }

    /// Collapse into the outcome the resolution loop acts on. Any requested
    /// call wins over text that came along with it.
    pub fn into_turn(self) -> TurnResult {
        if self.calls.is_empty() {
            TurnResult::Text(self.text)
        } else {
            TurnResult::Calls(self.calls)
        }
    }
}

/// A function invocation requested by the model. Arguments are untrusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl FunctionCall {
    /// Build a call from a JSON value. Anything but an object becomes an
    /// empty argument map.
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        let args = match args {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            name: name.into(),
            args,
        }
    }
}

/// The result of one function call, fed back to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionResponse {
    pub name: String,
    pub response: Value,
    #[serde(skip)]
    pub is_error: bool,
}

/// Payload substituted for any call that could not be executed.
pub const FUNCTION_FAILED: &str = "Function execution failed";

impl FunctionResponse {
    pub fn ok(name: impl Into<String>, response: Value) -> Self {
        // The API only accepts an object here.
        let response = match response {
            Value::Object(_) => response,
            other => json!({ "result": other }),
        };
        Self {
            name: name.into(),
            response,
            is_error: false,
        }
    }

    pub fn failed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            response: json!({ "error": FUNCTION_FAILED }),
            is_error: true,
        }
    }
}

/// Input to a single turn.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnInput {
    Text(String),
    FunctionResponses(Vec<FunctionResponse>),
}

/// Outcome of a single turn.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnResult {
    Text(String),
    Calls(Vec<FunctionCall>),
}

/// Sampling parameters sent with every turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: u32,
    pub max_output_tokens: u32,
    pub response_mime_type: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            top_p: 0.95,
            top_k: 40,
            max_output_tokens: 8192,
            response_mime_type: "text/plain".into(),
        }
    }
}

/// Caller-supplied values laid over [`GenerationConfig::default`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationOverrides {
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub top_k: Option<u32>,
    pub max_output_tokens: Option<u32>,
    pub response_mime_type: Option<String>,
}

impl GenerationOverrides {
    pub fn apply(&self, mut base: GenerationConfig) -> GenerationConfig {
        if let Some(t) = self.temperature {
            base.temperature = t;
        }
        if let Some(p) = self.top_p {
            base.top_p = p;
        }
        if let Some(k) = self.top_k {
            base.top_k = k;
        }
        if let Some(max) = self.max_output_tokens {
            base.max_output_tokens = max;
        }
        if let Some(ref mime) = self.response_mime_type {
            base.response_mime_type = mime.clone();
        }
        base
    }
}

/// Token usage for one or more turns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub candidate_tokens: u32,
}

impl Usage {
    pub fn accumulate(&mut self, other: &Usage) {
        self.prompt_tokens = self.prompt_tokens.saturating_add(other.prompt_tokens);
        self.candidate_tokens = self
            .candidate_tokens
            .saturating_add(other.candidate_tokens);
    }
}
