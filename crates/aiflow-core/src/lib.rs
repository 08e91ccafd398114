pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod project;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use context::FlowContext;
pub use error::{AiflowError, Result};
pub use event::EventBus;
pub use project::*;
pub use types::*;
