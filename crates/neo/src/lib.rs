//! An out-of-the-box chat front end for models hosted on Bedrock.
//!
//! The crate includes a CLI tool for chatting in the terminal. And you can
//! also use it as a library to bring a chat session into your own host apps.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

pub mod commands;
pub mod config;
mod session;

pub use session::{Session, SessionBuilder};

/// Re-exports of [`neo_core`] crate.
pub mod core {
    pub use neo_core::*;
}
