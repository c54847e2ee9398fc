use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures::future::join_all;
use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, warn};

use super::registry::ToolRegistry;
use crate::error::ToolError;
use crate::types::{FunctionCall, FunctionResponse};

impl ToolRegistry {
    /// Resolve every call of a turn concurrently. The output lines up with
    /// `calls` index for index, whatever order the handlers finish in.
    pub(crate) async fn resolve_all(&self, calls: &[FunctionCall]) -> Vec<FunctionResponse> {
        join_all(calls.iter().map(|call| self.resolve(call))).await
    }

    /// Resolve one call. Never fails: any error becomes the sentinel payload.
    pub(crate) async fn resolve(&self, call: &FunctionCall) -> FunctionResponse {
        match self.execute(call).await {
            Ok(response) => {
                debug!(tool = %call.name, "function call succeeded");
                FunctionResponse::ok(&call.name, response)
            }
            Err(e) => {
                warn!(tool = %call.name, error = %e, "function execution failed");
                FunctionResponse::failed(&call.name)
            }
        }
    }

    async fn execute(&self, call: &FunctionCall) -> Result<Value, ToolError> {
        let handler = self
            .handler(&call.name)
            .ok_or_else(|| ToolError::UnknownTool(call.name.clone()))?;

        AssertUnwindSafe(handler.call(&call.args))
            .catch_unwind()
            .await
            .map_err(|panic| ToolError::Panicked(panic_message(panic.as_ref())))?
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}
