//! An abstraction layer for tool-calling model backends.
//!
//! This crate establishes an unified protocol between the orchestrator and
//! the backends it drives: the conversation types that travel in both
//! directions, the traits a backend implements, and the decoder for the
//! server-sent-event frames that streamed responses are made of.
//!
//! Types in this crate don't define any orchestration behavior, they are
//! the constraints that the implementors should adhere to.

#![deny(missing_docs)]

mod error;
mod message;
mod provider;
mod request;
mod response;
pub mod sse;

pub use error::*;
pub use message::*;
pub use provider::*;
pub use request::*;
pub use response::*;
