//! Hostsync Core - host lifecycle ingestion and recalculation dispatch
//!
//! This crate keeps a relational record of every host in a fleet current
//! from inventory lifecycle events and emits the downstream work that drives
//! vulnerability evaluation. The implementation prioritizes:
//!
//! 1. **Idempotence** - Every store write is an upsert; replays are harmless
//! 2. **Logging** - Every decision point logged with message context
//! 3. **Throughput** - Evaluation requests are batched per account
//!
//! ## Architecture
//!
//! The crate is organized into modules:
//! - `listener` - Consumer loop, handlers and the event buffer
//! - `accounts` - Organization to account id resolution
//! - `recalc` - Fan-in queue for explicit re-evaluation requests
//! - `mqueue` - Broker seams and outbound message formats
//! - `event` - Inbound message model and routing
//! - `storage` - Records and the store seam
//! - `nevra` - Package identifier parsing and ordering
//! - `config` - Environment configuration
//! - `logging` - Structured logging with message context

pub mod accounts;
pub mod config;
pub mod error;
pub mod event;
pub mod listener;
pub mod logging;
pub mod mqueue;
pub mod nevra;
pub mod recalc;
pub mod storage;

pub use accounts::AccountResolver;
pub use config::ListenerConfig;
pub use error::{ListenerError, Result};
pub use listener::{Listener, ListenerCounters};
pub use nevra::{Nevra, NevraError};
pub use recalc::RecalcQueue;
pub use storage::{MemoryStore, SystemStore};
