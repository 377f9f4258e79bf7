//! In-process message transport.
//!
//! Stands in for a message bus: named endpoints, mutator-aware sessions for
//! sending, and a dead-letter channel for messages the pipeline rejects.

pub mod local;

pub use local::{DeadLetter, LocalTransport, MessageSession, TransportError};
