//! Broker plumbing.
//!
//! - `message` - Message type and the `Reader`/`Writer` traits
//! - `eval` - Evaluator platform events
//! - `tracker` - Payload-tracker audit events
//! - `memory` - In-process reader and writer

pub mod eval;
pub mod memory;
pub mod message;
pub mod tracker;

pub use eval::*;
pub use memory::{MemoryFeed, MemoryReader, MemoryWriter};
pub use message::*;
pub use tracker::*;
