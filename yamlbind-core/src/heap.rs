use yamlbind_types::{Error, Result};

use crate::memory::{Allocator, Ptr};

/// Running totals kept by [`Heap`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Blocks created, including resizes of a null pointer.
    pub allocations: usize,
    pub resizes: usize,
    pub releases: usize,
    pub live_blocks: usize,
    pub live_bytes: usize,
}

/// Default allocator: a slab of byte blocks with slot reuse.
#[derive(Debug, Default)]
pub struct Heap {
    slots: Vec<Option<Vec<u8>>>,
    free_slots: Vec<usize>,
    stats: HeapStats,
    limit: Option<usize>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Heap that refuses to hold more than `bytes` live bytes.
    pub fn with_limit(bytes: usize) -> Self {
        Self {
            limit: Some(bytes),
            ..Self::default()
        }
    }

    pub fn stats(&self) -> HeapStats {
        self.stats
    }

    fn slot(ptr: Ptr) -> Option<usize> {
        if ptr.is_null() {
            None
        } else {
            usize::try_from(ptr.to_raw() - 1).ok()
        }
    }

    fn reserve(&self, extra: usize) -> Result<()> {
        match self.limit {
            Some(limit) if self.stats.live_bytes.saturating_add(extra) > limit => {
                log::debug!("heap limit {} reached (live {}, wanted {})", limit, self.stats.live_bytes, extra);
                Err(Error::Oom)
            }
            _ => Ok(()),
        }
    }
}

impl Allocator for Heap {
    fn allocate(&mut self, size: usize) -> Result<Ptr> {
        self.reserve(size)?;
        let mut block = Vec::new();
        grow_zeroed(&mut block, size)?;
        let index = match self.free_slots.pop() {
            Some(index) => {
                self.slots[index] = Some(block);
                index
            }
            None => {
                self.slots.push(Some(block));
                self.slots.len() - 1
            }
        };
        self.stats.allocations += 1;
        self.stats.live_blocks += 1;
        self.stats.live_bytes += size;
        Ok(Ptr::from_raw(index as u64 + 1))
    }

    fn resize(&mut self, ptr: Ptr, size: usize) -> Result<Ptr> {
        if ptr.is_null() {
            return self.allocate(size);
        }
        let old = self.block(ptr)?.len();
        if size > old {
            self.reserve(size - old)?;
        }
        let block = self.block_vec(ptr)?;
        if size > old {
            grow_zeroed(block, size)?;
        } else {
            block.truncate(size);
        }
        self.stats.resizes += 1;
        self.stats.live_bytes = self.stats.live_bytes + size - old;
        Ok(ptr)
    }

    fn release(&mut self, ptr: Ptr) {
        let Some(index) = Self::slot(ptr) else {
            return;
        };
        match self.slots.get_mut(index).and_then(Option::take) {
            Some(block) => {
                self.free_slots.push(index);
                self.stats.releases += 1;
                self.stats.live_blocks -= 1;
                self.stats.live_bytes -= block.len();
            }
            None => log::warn!("release of unknown block {}", ptr),
        }
    }

    fn block(&self, ptr: Ptr) -> Result<&[u8]> {
        Self::slot(ptr)
            .and_then(|index| self.slots.get(index))
            .and_then(Option::as_deref)
            .ok_or(Error::Internal)
    }

    fn block_mut(&mut self, ptr: Ptr) -> Result<&mut [u8]> {
        self.block_vec(ptr).map(Vec::as_mut_slice)
    }
}

impl Heap {
    fn block_vec(&mut self, ptr: Ptr) -> Result<&mut Vec<u8>> {
        Self::slot(ptr)
            .and_then(|index| self.slots.get_mut(index))
            .and_then(Option::as_mut)
            .ok_or(Error::Internal)
    }
}

/// Zero-fill `block` up to `size` bytes, reporting allocation failure
/// instead of aborting.
fn grow_zeroed(block: &mut Vec<u8>, size: usize) -> Result<()> {
    if let Err(err) = block.try_reserve_exact(size - block.len()) {
        log::debug!("allocation of {} bytes failed: {}", size, err);
        return Err(Error::Oom);
    }
    block.resize(size, 0);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_and_release_balance() {
        let mut heap = Heap::new();
        let a = heap.allocate(4).unwrap();
        let b = heap.allocate(8).unwrap();
        assert_ne!(a, b);
        assert!(!a.is_null());
        assert_eq!(heap.stats().live_bytes, 12);

        heap.release(a);
        heap.release(b);
        let stats = heap.stats();
        assert_eq!(stats.allocations, 2);
        assert_eq!(stats.releases, 2);
        assert_eq!(stats.live_blocks, 0);
        assert_eq!(stats.live_bytes, 0);
    }

    #[test]
    fn slots_are_reused() {
        let mut heap = Heap::new();
        let a = heap.allocate(1).unwrap();
        heap.release(a);
        let b = heap.allocate(1).unwrap();
        assert_eq!(a, b);
        assert_eq!(heap.block(b).unwrap(), &[0]);
    }

    #[test]
    fn resize_keeps_content_and_zero_fills() {
        let mut heap = Heap::new();
        let p = heap.resize(Ptr::NULL, 2).unwrap();
        heap.block_mut(p).unwrap().copy_from_slice(&[7, 9]);
        let p = heap.resize(p, 4).unwrap();
        assert_eq!(heap.block(p).unwrap(), &[7, 9, 0, 0]);
        assert_eq!(heap.stats().allocations, 1);
        assert_eq!(heap.stats().resizes, 1);
    }

    #[test]
    fn limit_reports_oom() {
        let mut heap = Heap::with_limit(10);
        let p = heap.allocate(8).unwrap();
        assert_eq!(heap.allocate(4), Err(Error::Oom));
        assert_eq!(heap.resize(p, 16), Err(Error::Oom));
        // failed resize leaves the block alone
        assert_eq!(heap.block(p).unwrap().len(), 8);
        assert!(heap.resize(p, 10).is_ok());
    }

    #[test]
    fn unsatisfiable_request_is_oom() {
        let mut heap = Heap::new();
        assert_eq!(heap.allocate(usize::MAX), Err(Error::Oom));
        let p = heap.allocate(3).unwrap();
        assert_eq!(heap.resize(p, usize::MAX), Err(Error::Oom));
        assert_eq!(heap.block(p).unwrap(), &[0, 0, 0]);
        let stats = heap.stats();
        assert_eq!(stats.allocations, 1);
        assert_eq!(stats.live_bytes, 3);
    }

    #[test]
    fn release_of_null_or_stale_pointer_is_ignored() {
        let mut heap = Heap::new();
        heap.release(Ptr::NULL);
        let p = heap.allocate(1).unwrap();
        heap.release(p);
        heap.release(p);
        assert_eq!(heap.stats().releases, 1);
        assert!(heap.block(p).is_err());
    }
}
