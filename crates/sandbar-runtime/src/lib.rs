pub mod context;
pub mod error;
pub mod registry;
pub mod result;
pub mod schema;
pub mod tool;

pub use context::ToolContext;
pub use error::ToolError;
pub use registry::ToolRegistry;
pub use result::{ToolContent, ToolResult};
pub use schema::{ParamKind, ParamSpec, ToolDescriptor};
pub use tool::Tool;

/// Initialize structured JSON logging on stderr.
/// Stdout is reserved for protocol traffic.
pub fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    fmt()
        .json()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env())
        .init();
}
