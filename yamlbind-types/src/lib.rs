//! # yamlbind-types
//!
//! Schema model and error codes shared by the yamlbind engine and its front ends.
//!
//! A [`Schema`] is plain data: it describes how a value is laid out in client
//! memory (byte offsets and widths) and how that value maps onto YAML. Schemas
//! derive serde traits so they can live in TOML or JSON files next to the
//! documents they describe.

mod error;
pub mod schema;

pub use error::{strerror, Error, Result};
pub use schema::{BitDef, CountField, Field, Flags, Kind, Schema, StrVal};

/// Width in bytes of a stored pointer handle in client memory.
pub const POINTER_SIZE: u32 = 8;

/// Sequence or string maximum meaning "no limit".
pub const UNLIMITED: u32 = u32::MAX;
