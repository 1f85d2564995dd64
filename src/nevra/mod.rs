//! Package version model.
//!
//! Parses RPM package identifiers (`name-[epoch:]version-release.arch`)
//! and orders them the way update-applicability decisions need:
//! epoch, then version, then release (RPM segment comparison), then name.

pub mod compare;
pub mod parse;

pub use compare::*;
pub use parse::*;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NevraError {
    #[error("unable to parse nevra: {0:?}")]
    Parse(String),

    #[error("invalid epoch {epoch:?} in nevra {nevra:?}")]
    Epoch { nevra: String, epoch: String },
}
