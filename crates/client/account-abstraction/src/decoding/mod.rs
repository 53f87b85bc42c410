//! Best-effort decoding of traced call payloads
//!
//! Traced calls carry raw input, return and revert bytes. This module maps
//! them back to the known validation interfaces where it can, and falls back
//! to the raw bytes where it cannot. Decoding never fails validation.

mod registry;
mod types;

pub use registry::SelectorRegistry;
pub use types::{DecodedField, DecodedPayload};
