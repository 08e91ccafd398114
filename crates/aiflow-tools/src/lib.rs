pub mod auth;
pub mod registry;
pub mod request;
pub mod runner;
pub mod transport;

pub use auth::{build_auth_headers, DEFAULT_API_KEY_HEADER};
pub use registry::ToolRegistry;
pub use request::{build_http_request, ToolInvocation};
pub use runner::{ToolRunner, TOOLS_KEY};
pub use transport::ReqwestTransport;
