//! Inbound event model.
//!
//! - `kind` - Dispatch on the message `type` field
//! - `host` - Typed host lifecycle message
//! - `identity` - Base64 identity header decoding

pub mod host;
pub mod identity;
pub mod kind;

pub use host::*;
pub use identity::*;
pub use kind::*;
