//! Storage module.
//!
//! Records written by the ingestion pipeline, the `SystemStore` seam and
//! an in-process implementation enforcing the same unique constraints.

pub mod memory;
pub mod models;
pub mod store;

pub use memory::MemoryStore;
pub use models::*;
pub use store::*;
