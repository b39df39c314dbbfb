//! Core logic of the chat: the conversation state, generation settings and
//! the adapter turning them into model requests.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

pub mod conversation;
mod error;
mod model_client;
mod session;
pub mod settings;

pub use error::Error;
pub use model_client::{ModelClient, TextStream, build_request, collapse_turns};
pub use session::{ChatSession, PendingTurn, SettingOutcome};
