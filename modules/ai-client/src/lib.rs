pub mod error;
pub mod openai;
pub mod util;

pub use error::{AiError, Result};
pub use openai::{AssistantReply, OpenAi, StructuredOutput};
