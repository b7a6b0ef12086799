//! An out-of-the-box assistant that drives a host application through
//! tools and nested agents.
//!
//! The crate includes a CLI tool for using in the terminal. And you can also
//! use it as a library, by implementing the [`host`] traits for your own
//! application and opening a [`Session`] on it.

#![deny(missing_docs)]

#[allow(unused_imports)]
#[macro_use]
extern crate tracing;

pub mod agents;
pub mod host;
mod session;
pub mod tools;

pub use session::{Session, SessionBuilder};

/// Re-exports of [`relay_core`] crate.
pub mod core {
    pub use relay_core::*;
}
