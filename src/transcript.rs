use serde_json::{json, Value};

use crate::types::TurnInput;

/// Conversation history in the provider's `{role, parts}` shape, resent in
/// full with every turn.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    contents: Vec<Value>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// The `user` content a turn input becomes.
    pub fn content_for(input: &TurnInput) -> Value {
        match input {
            TurnInput::Text(text) => json!({ "role": "user", "parts": [{ "text": text }] }),
            TurnInput::FunctionResponses(responses) => {
                let parts: Vec<Value> = responses
                    .iter()
                    .map(|r| json!({ "functionResponse": r }))
                    .collect();
                json!({ "role": "user", "parts": parts })
            }
        }
    }

    /// A model content that can be resent. The API rejects contents with no
    /// parts, so an empty reply is recorded as a single empty text part.
    pub fn model_content(content: Value) -> Value {
        let has_parts = content["parts"]
            .as_array()
            .is_some_and(|parts| !parts.is_empty());
        if has_parts {
            let mut content = content;
            if content.get("role").is_none() {
                content["role"] = json!("model");
            }
            content
        } else {
            json!({ "role": "model", "parts": [{ "text": "" }] })
        }
    }

    pub fn push(&mut self, content: Value) {
        self.contents.push(content);
    }

    /// Drop everything recorded after `len` entries.
    pub fn truncate(&mut self, len: usize) {
        self.contents.truncate(len);
    }

    pub fn contents(&self) -> &[Value] {
        &self.contents
    }

    pub fn len(&self) -> usize {
        self.contents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }
}
