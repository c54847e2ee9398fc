pub mod client;
pub mod error;
pub mod events;
pub mod inference;
pub mod tools;
pub mod transcript;
pub mod types;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub use client::SessionClient;
pub use error::{ChatError, ConfigurationError, InferenceError, ToolError};
pub use events::ChatEvent;
pub use inference::{GeminiProvider, InferenceProvider};
pub use tools::{
    AsyncFnHandler, FnHandler, FunctionDeclaration, FunctionParameters, PropertySchema,
    SchemaType, ToolHandler, ToolRegistry, ToolSpec,
};
pub use transcript::Transcript;
pub use types::{
    FunctionCall, FunctionResponse, GenerateRequest, GenerateResponse, GenerationConfig,
    GenerationOverrides, TurnInput, TurnResult, Usage, FUNCTION_FAILED,
};

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp";

/// Session configuration.
pub struct ChatConfig {
    pub api_key: String,
    pub tools: ToolRegistry,
    pub model: String,
    pub system_instruction: Option<String>,
    pub generation: GenerationOverrides,
    /// Upper bound on provider turns spent on a single message.
    pub max_turns: usize,
    /// Endpoint override for [`ChatSession::new`].
    pub base_url: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            tools: ToolRegistry::new(),
            model: DEFAULT_MODEL.into(),
            system_instruction: None,
            generation: GenerationOverrides::default(),
            max_turns: 20,
            base_url: None,
        }
    }
}

impl ChatConfig {
    pub fn new(api_key: impl Into<String>, tools: ToolRegistry) -> Self {
        Self {
            api_key: api_key.into(),
            tools,
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_system_instruction(mut self, system: impl Into<String>) -> Self {
        self.system_instruction = Some(system.into());
        self
    }

    pub fn with_generation(mut self, generation: GenerationOverrides) -> Self {
        self.generation = generation;
        self
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigurationError::MissingCredential);
        }
        self.tools.validate()?;
        if self.max_turns == 0 {
            return Err(ConfigurationError::ZeroTurnLimit);
        }
        Ok(())
    }
}

/// A conversation with the model. Function calls the model makes are
/// resolved against the registered tools until it answers in text.
pub struct ChatSession {
    client: SessionClient,
    tools: ToolRegistry,
    max_turns: usize,
}

impl ChatSession {
    /// Connect to Gemini with the configured key.
    pub fn new(config: ChatConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let mut provider = GeminiProvider::new(config.api_key.clone());
        if let Some(ref url) = config.base_url {
            provider = provider.with_base_url(url);
        }
        Ok(Self::build(provider, config))
    }

    /// Same as [`ChatSession::new`] with a caller-supplied provider.
    /// Nothing touches the provider if validation fails.
    pub fn with_provider(
        provider: impl InferenceProvider + 'static,
        config: ChatConfig,
    ) -> Result<Self, ConfigurationError> {
        config.validate()?;
        Ok(Self::build(provider, config))
    }

    fn build(provider: impl InferenceProvider + 'static, config: ChatConfig) -> Self {
        let generation = config.generation.apply(GenerationConfig::default());
        let mut client = SessionClient::new(
            provider,
            config.model,
            config.tools.declarations(),
            generation,
        );
        if let Some(system) = config.system_instruction {
            client = client.with_system_instruction(system);
        }
        info!(
            model = client.model(),
            tools = config.tools.len(),
            "chat session ready"
        );
        Self {
            client,
            tools: config.tools,
            max_turns: config.max_turns,
        }
    }

    /// Send a message and return the model's final text answer.
    pub async fn send_message(&mut self, message: &str) -> Result<String, ChatError> {
        self.send(message, None, None).await
    }

    /// Let the model open the conversation.
    pub async fn initial_message(&mut self) -> Result<String, ChatError> {
        self.send_message(" ").await
    }

    /// Send a message, reporting progress on `tx`.
    pub async fn send_message_streaming(
        &mut self,
        message: &str,
        tx: mpsc::Sender<ChatEvent>,
    ) -> Result<String, ChatError> {
        self.send(message, None, Some(tx)).await
    }

    /// Send a message that can be abandoned through `cancel`.
    pub async fn send_message_with_cancel(
        &mut self,
        message: &str,
        cancel: CancellationToken,
    ) -> Result<String, ChatError> {
        self.send(message, Some(cancel), None).await
    }

    pub fn usage(&self) -> &Usage {
        self.client.usage()
    }

    pub fn transcript(&self) -> &Transcript {
        self.client.transcript()
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Turn boundary: whatever fails inside is logged here and the
    /// transcript is restored to where the message started.
    async fn send(
        &mut self,
        message: &str,
        cancel: Option<CancellationToken>,
        tx: Option<mpsc::Sender<ChatEvent>>,
    ) -> Result<String, ChatError> {
        let mark = self.client.transcript().len();
        match self.run_loop(message, cancel, tx).await {
            Ok(text) => Ok(text),
            Err(e) => {
                error!(error = ?e, "failed to process message");
                self.client.rollback(mark);
                Err(e)
            }
        }
    }

    async fn run_loop(
        &mut self,
        message: &str,
        cancel: Option<CancellationToken>,
        tx: Option<mpsc::Sender<ChatEvent>>,
    ) -> Result<String, ChatError> {
        let mut input = TurnInput::Text(message.to_string());

        for turn in 0..self.max_turns {
            if let Some(ref cancel) = cancel {
                if cancel.is_cancelled() {
                    info!(turn, "chat cancelled");
                    return Err(ChatError::Cancelled);
                }
            }

            emit(&tx, ChatEvent::TurnStart { turn }).await;
            info!(turn, "chat turn");

            let advance = self.client.advance(input);
            let result = if let Some(ref cancel) = cancel {
                tokio::select! {
                    result = advance => result?,
                    _ = cancel.cancelled() => {
                        info!(turn, "chat cancelled during inference");
                        return Err(ChatError::Cancelled);
                    }
                }
            } else {
                advance.await?
            };

            match result {
                TurnResult::Text(text) => {
                    emit(
                        &tx,
                        ChatEvent::Text {
                            content: text.clone(),
                        },
                    )
                    .await;
                    emit(&tx, ChatEvent::Finished { turns: turn + 1 }).await;
                    info!(turns = turn + 1, "chat finished");
                    return Ok(text);
                }
                TurnResult::Calls(calls) => {
                    info!(turn, calls = calls.len(), "resolving function calls");
                    for call in &calls {
                        emit(
                            &tx,
                            ChatEvent::FunctionCall {
                                name: call.name.clone(),
                                args: call.args.clone(),
                            },
                        )
                        .await;
                    }

                    let resolve = self.tools.resolve_all(&calls);
                    let responses = if let Some(ref cancel) = cancel {
                        tokio::select! {
                            responses = resolve => responses,
                            _ = cancel.cancelled() => {
                                info!(turn, "chat cancelled during function calls");
                                return Err(ChatError::Cancelled);
                            }
                        }
                    } else {
                        resolve.await
                    };

                    for r in &responses {
                        emit(
                            &tx,
                            ChatEvent::FunctionResult {
                                name: r.name.clone(),
                                response: r.response.clone(),
                                is_error: r.is_error,
                            },
                        )
                        .await;
                    }

                    input = TurnInput::FunctionResponses(responses);
                }
            }
        }

        warn!(max_turns = self.max_turns, "chat hit max turns limit");
        Err(ChatError::TurnLimit(self.max_turns))
    }
}

async fn emit(tx: &Option<mpsc::Sender<ChatEvent>>, event: ChatEvent) {
    if let Some(tx) = tx {
        let _ = tx.send(event).await;
    }
}
