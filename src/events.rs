use serde_json::{Map, Value};

/// Events emitted while a message is processed, for UI display.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    TurnStart { turn: usize },
    FunctionCall { name: String, args: Map<String, Value> },
    FunctionResult { name: String, response: Value, is_error: bool },
    Text { content: String },
    Finished { turns: usize },
}
