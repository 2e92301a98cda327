//! Pure request-classification types and rules.

pub mod error;
pub mod format;
pub mod path;
