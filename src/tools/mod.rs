mod dispatch;
pub mod handler;
pub mod registry;
pub mod schema;

pub use handler::{AsyncFnHandler, FnHandler, ToolHandler, ToolSpec};
pub use registry::ToolRegistry;
pub use schema::{FunctionDeclaration, FunctionParameters, PropertySchema, SchemaType};
