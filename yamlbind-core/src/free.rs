//! Schema-directed release of loaded values.
//!
//! Walks the same schema a load used and releases every block reachable
//! through pointer values, children before parents. Variable sequences are
//! walked up to their recorded count and fixed sequences up to their fixed
//! count. Null pointers and unreadable slots are skipped, so a partially
//! built value from a failed load is released just as completely as a
//! finished one.

use log::Level;
use yamlbind_types::{Kind, Schema};

use crate::config::Config;
use crate::memory::{Addr, Allocator, Memory, Ptr};

/// Release `data` and everything it owns. `seq_count` is the entry count of
/// a variable sequence root and is ignored otherwise.
pub fn free<A: Allocator + ?Sized>(
    config: &Config,
    alloc: &mut A,
    schema: &Schema,
    data: Ptr,
    seq_count: Option<u32>,
) {
    if data.is_null() {
        return;
    }
    log_at!(config.log_level, Level::Debug, "Free {} ({})", data, schema.kind.name());
    let mut walker = Walker { config, alloc };
    walker.pointee(schema, data, u64::from(seq_count.unwrap_or(0)));
}

struct Walker<'a, A: ?Sized> {
    config: &'a Config,
    alloc: &'a mut A,
}

impl<A: Allocator + ?Sized> Walker<'_, A> {
    fn pointee(&mut self, schema: &Schema, block: Ptr, count: u64) {
        self.contents(schema, Addr::new(block), count);
        log_at!(self.config.log_level, Level::Debug, "Freeing {}", block);
        self.alloc.release(block);
    }

    /// Value stored at `at`, either inline or behind a pointer.
    fn value(&mut self, schema: &Schema, at: Addr, count: u64) {
        if !schema.is_pointer() {
            self.contents(schema, at, count);
            return;
        }
        match self.alloc.read_ptr(at) {
            Ok(ptr) if ptr.is_null() => {}
            Ok(ptr) => self.pointee(schema, ptr, count),
            Err(err) => log_at!(
                self.config.log_level,
                Level::Warn,
                "Skipping unreadable pointer at {}: {}",
                at,
                err
            ),
        }
    }

    fn contents(&mut self, schema: &Schema, at: Addr, count: u64) {
        match &schema.kind {
            Kind::Mapping { fields } => {
                for field in fields {
                    let count = match (&field.value.kind, field.count) {
                        (Kind::Sequence { .. }, Some(count)) => {
                            let slot = at.add(count.offset as usize);
                            self.alloc
                                .read_uint(slot, u32::from(count.size))
                                .unwrap_or(0)
                        }
                        (Kind::SequenceFixed { max, .. }, _) => u64::from(*max),
                        _ => 0,
                    };
                    self.value(&field.value, at.add(field.offset as usize), count);
                }
            }
            Kind::Sequence { entry, .. } | Kind::SequenceFixed { entry, .. } => {
                let count = match &schema.kind {
                    Kind::SequenceFixed { max, .. } => u64::from(*max),
                    _ => count,
                };
                if !holds_pointers(entry) {
                    return;
                }
                let stride = schema.stride() as usize;
                let entry_count = match &entry.kind {
                    Kind::SequenceFixed { max, .. } => u64::from(*max),
                    _ => 0,
                };
                for i in 0..count as usize {
                    self.value(entry, at.add(stride * i), entry_count);
                }
            }
            _ => {}
        }
    }
}

fn holds_pointers(schema: &Schema) -> bool {
    if schema.is_pointer() {
        return true;
    }
    match &schema.kind {
        Kind::Mapping { fields } => fields.iter().any(|field| holds_pointers(&field.value)),
        Kind::Sequence { entry, .. } | Kind::SequenceFixed { entry, .. } => holds_pointers(entry),
        _ => false,
    }
}
