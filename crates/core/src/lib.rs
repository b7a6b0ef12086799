//! Core logic including the turn loop, capabilities, lifecycle events and
//! execution traces.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

pub mod capability;
mod context;
mod error;
pub mod events;
mod model_client;
mod orchestrator;
mod registry;
pub mod trace;

pub use capability::{Agent, Capability, CapabilityKind, Tool, ToolError, ToolOutput, ToolResult};
pub use context::{AgentOptions, ExecutionContext};
pub use error::Error;
pub use events::{Event, EventBus, EventKind, EventSink};
pub use orchestrator::{DEFAULT_MAX_TURNS, RunOptions, RunOutcome, Runner};
pub use registry::{Registry, ResolvedCapability};
pub use trace::{Trace, TraceId, TraceStore};
pub use tokio_util::sync::CancellationToken;
