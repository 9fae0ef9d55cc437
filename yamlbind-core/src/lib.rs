//! # yamlbind-core
//!
//! Schema-driven YAML engine. Loads YAML documents into client memory laid out
//! exactly as a [`Schema`] describes, saves such memory back to YAML, and
//! frees everything a load allocated.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use yamlbind_core::{free, load_data, save_data, Config, Field, Heap, Schema, UNLIMITED};
//!
//! // struct { u32 id; char *name; }
//! let schema = Schema::mapping(16, vec![
//!     Field::new("id", 0, Schema::uint(4)),
//!     Field::new("name", 8, Schema::string(0, UNLIMITED)),
//! ])
//! .pointer();
//!
//! let config = Config::default();
//! let mut heap = Heap::new();
//! let loaded = load_data(b"id: 7\nname: kick\n", &config, &mut heap, &schema)?;
//! let text = save_data(&config, &heap, &schema, loaded.data, loaded.seq_count)?;
//! free(&config, &mut heap, &schema, loaded.data, loaded.seq_count);
//! ```
//!
//! ## Module Overview
//!
//! - [`memory`]: `Ptr`/`Addr` handles, the `Allocator` facade and typed accessors
//! - [`heap`]: default `Heap` allocator with allocation statistics
//! - [`event`]: normalized YAML events, the parser-backed `Reader` and the `Emitter`
//! - [`load`]: `load_data()` / `load_file()` state machine
//! - [`save`]: `save_data()` / `save_file()` state machine
//! - [`free`]: `free()` schema-directed release
//! - [`config`]: runtime `Config` and TOML `Settings` (embedded + user override)

/// `log::log!` gated by an engine-side level filter.
macro_rules! log_at {
    ($filter:expr, $level:expr, $($arg:tt)+) => {{
        let level: ::log::Level = $level;
        if level <= $filter {
            ::log::log!(level, $($arg)+);
        }
    }};
}

mod anchor;
pub mod config;
pub mod event;
pub mod free;
pub mod heap;
pub mod load;
pub mod memory;
pub mod save;
mod util;

pub use config::{Config, ConfigFlags, Settings};
pub use free::free;
pub use heap::{Heap, HeapStats};
pub use load::{load_data, load_file, Loaded};
pub use memory::{Addr, Allocator, Memory, Ptr};
pub use save::{save_data, save_file};
pub use yamlbind_types::*;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
