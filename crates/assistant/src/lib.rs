pub mod cli;
pub mod prompt;
pub mod tools;
pub mod turn;

pub use prompt::SystemPrompt;
pub use tools::{ToolHandler, ToolTable};
pub use turn::{Assistant, TurnEvent, TurnOutcome};
