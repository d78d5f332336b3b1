//! Shared types for Queen

pub mod error;

pub use error::{QueenError, Result};
