pub mod anthropic;
pub mod availability;
pub mod claude_cli;
pub mod classifier;
pub mod models;
pub mod ollama;
pub mod openai;
pub mod registry;
pub mod smart_router;
pub mod traits;
pub mod usage;
pub(crate) mod framing;
pub mod util;

// Re-exports for convenience.
pub use classifier::{QueryClassification, QueryClassifier};
pub use registry::ProviderRegistry;
pub use smart_router::{RoutingDecision, SmartRouter};
pub use traits::{ChatReply, ChatRequest, LlmProvider, LlmResponse};
pub use usage::{UsageLog, UsageRecord};
