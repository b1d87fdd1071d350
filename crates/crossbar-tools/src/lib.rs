//! The deterministic tool bus.
//!
//! Tools are small, policy-gated operations invoked over HTTP. Every
//! invocation is fingerprinted (canonical JSON of the arguments, hashed
//! with the tool name), assigned a unique replay ID, executed, and logged —
//! so any past call can be looked up and re-derived from its record.

pub mod builtin;
pub mod bus;
pub mod canonical;
pub mod error;
pub mod log;
pub mod record;

pub use bus::{Tool, ToolBus, ToolDescriptor, ToolOutcome, ToolPolicy};
pub use canonical::{canonical_string, canonicalize, new_replay_id, request_hash};
pub use error::ToolBusError;
pub use log::InvocationLog;
pub use record::{InvocationOutcome, InvocationRecord};
