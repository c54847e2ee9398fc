use std::future::Future;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::schema::{FunctionDeclaration, FunctionParameters};
use crate::error::ToolError;

/// A tool's execution handler. Consumers implement this for each tool.
///
/// `args` is whatever the model sent; validate it yourself.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: &Map<String, Value>) -> Result<Value, ToolError>;
}

/// Wraps a synchronous closure.
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F> ToolHandler for FnHandler<F>
where
    F: Fn(&Map<String, Value>) -> Result<Value, ToolError> + Send + Sync,
{
    async fn call(&self, args: &Map<String, Value>) -> Result<Value, ToolError> {
        (self.0)(args)
    }
}

/// Wraps a closure returning a future. The closure gets its own copy of the
/// arguments so the future can be `'static`.
pub struct AsyncFnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> ToolHandler for AsyncFnHandler<F>
where
    F: Fn(Map<String, Value>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
{
    async fn call(&self, args: &Map<String, Value>) -> Result<Value, ToolError> {
        (self.0)(args.clone()).await
    }
}

/// A tool definition: declaration for the model + handler for execution.
pub struct ToolSpec {
    pub declaration: FunctionDeclaration,
    pub(crate) handler: Box<dyn ToolHandler>,
}

impl ToolSpec {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        handler: impl ToolHandler + 'static,
    ) -> Self {
        Self {
            declaration: FunctionDeclaration {
                name: name.into(),
                description: description.into(),
                parameters: None,
            },
            handler: Box::new(handler),
        }
    }

    pub fn with_parameters(mut self, parameters: FunctionParameters) -> Self {
        self.declaration.parameters = Some(parameters);
        self
    }

    pub fn name(&self) -> &str {
        &self.declaration.name
    }
}

impl std::fmt::Debug for ToolSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSpec")
            .field("declaration", &self.declaration)
            .finish_non_exhaustive()
    }
}
