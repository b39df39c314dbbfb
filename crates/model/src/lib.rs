//! An abstraction layer for the inference providers.
//!
//! This crate establishes the protocol the chat core speaks when it asks
//! a hosted model for a reply, so that the core never depends on one
//! particular provider's transport.
//!
//! The shapes here follow the Converse family of APIs: a request is a
//! list of role-tagged text messages plus a system prompt and sampling
//! parameters, and a reply is either one complete message or a stream of
//! text deltas.
//!
//! Types in this crate don't define any behavior, instead they are the
//! constraints that the implementors should adhere to.

#![deny(missing_docs)]

mod error;
mod provider;
mod reply;
mod request;
mod response;

pub use error::*;
pub use provider::*;
pub use reply::*;
pub use request::*;
pub use response::*;
