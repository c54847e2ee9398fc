pub mod gemini;

use async_trait::async_trait;

use crate::error::InferenceError;
use crate::types::{GenerateRequest, GenerateResponse};

/// Pure model API call. No state, no history. Request in, response out.
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, InferenceError>;
}

/// Blanket impl so `Box<dyn InferenceProvider>` can be passed directly to
/// `ChatSession::with_provider()`.
#[async_trait]
impl InferenceProvider for Box<dyn InferenceProvider> {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, InferenceError> {
        (**self).generate(request).await
    }
}

pub use gemini::GeminiProvider;
