use tracing::debug;

use crate::error::InferenceError;
use crate::inference::InferenceProvider;
use crate::tools::FunctionDeclaration;
use crate::transcript::Transcript;
use crate::types::{GenerateRequest, GenerationConfig, TurnInput, TurnResult, Usage};

/// One persistent chat context: the provider plus everything sent with each
/// turn. The only thing in the crate that talks to the provider.
pub struct SessionClient {
    provider: Box<dyn InferenceProvider>,
    model: String,
    system_instruction: Option<String>,
    tools: Vec<FunctionDeclaration>,
    generation: GenerationConfig,
    transcript: Transcript,
    usage: Usage,
}

impl SessionClient {
    pub fn new(
        provider: impl InferenceProvider + 'static,
        model: impl Into<String>,
        tools: Vec<FunctionDeclaration>,
        generation: GenerationConfig,
    ) -> Self {
        Self {
            provider: Box::new(provider),
            model: model.into(),
            system_instruction: None,
            tools,
            generation,
            transcript: Transcript::new(),
            usage: Usage::default(),
        }
    }

    pub fn with_system_instruction(mut self, system: impl Into<String>) -> Self {
        self.system_instruction = Some(system.into());
        self
    }

    /// Send one turn. The transcript only grows when the provider answers;
    /// a failed turn leaves it as it was.
    pub async fn advance(&mut self, input: TurnInput) -> Result<TurnResult, InferenceError> {
        let pending = Transcript::content_for(&input);
        let request = self.build_request(pending.clone());

        debug!(
            model = %self.model,
            history = self.transcript.len(),
            "advancing chat"
        );

        let response = self.provider.generate(request).await?;

        self.usage.accumulate(&response.usage);
        self.transcript.push(pending);
        self.transcript
            .push(Transcript::model_content(response.content.clone()));

        Ok(response.into_turn())
    }

    fn build_request(&self, pending: serde_json::Value) -> GenerateRequest {
        let mut contents = self.transcript.contents().to_vec();
        contents.push(pending);
        GenerateRequest {
            model: self.model.clone(),
            system_instruction: self.system_instruction.clone(),
            tools: self.tools.clone(),
            contents,
            generation_config: self.generation.clone(),
        }
    }

    pub(crate) fn rollback(&mut self, len: usize) {
        self.transcript.truncate(len);
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn usage(&self) -> &Usage {
        &self.usage
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}
