pub mod types;
pub mod traits;
pub mod streaming;
pub mod config;
pub mod openai;

pub use traits::{ChatClient, ChatRequest, ChatResponse, ChatOptions, TokenUsage, EventStream};
pub use streaming::StreamEvent;
pub use config::{ClientFactory, OpenAIClientFactory, OpenAIConfig};
pub use openai::OpenAIClient;
pub use types::{Message, Role};
