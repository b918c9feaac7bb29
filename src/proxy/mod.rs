//! Chat streaming proxy (§4.6): the gateway's central request-plane component.

pub mod chat;
pub mod sse_protocol;
pub mod translate;

pub use chat::{handle_chat_completions, ChatCompletionRequest};
