//! Client memory.
//!
//! Everything the engine reads or writes lives in blocks owned by an
//! [`Allocator`]. A block is named by a [`Ptr`] handle and a location inside
//! it by an [`Addr`]. Handles are stored in client memory as 8-byte native
//! endian integers, so a structure can point at another structure exactly as
//! a schema with the pointer flag describes.

use std::fmt;

use yamlbind_types::{Error, Result, POINTER_SIZE};

/// Handle to an allocated block. Zero is the null pointer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ptr(u64);

const _: () = assert!(std::mem::size_of::<Ptr>() <= POINTER_SIZE as usize);

impl Ptr {
    pub const NULL: Ptr = Ptr(0);

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn to_raw(self) -> u64 {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Ptr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A byte position inside a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Addr {
    pub block: Ptr,
    pub offset: usize,
}

impl Addr {
    pub fn new(block: Ptr) -> Self {
        Self { block, offset: 0 }
    }

    pub fn add(self, bytes: usize) -> Self {
        Self {
            block: self.block,
            offset: self.offset + bytes,
        }
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}", self.block, self.offset)
    }
}

/// Allocation facade used for every block the engine creates.
pub trait Allocator {
    /// New zero-filled block of `size` bytes.
    fn allocate(&mut self, size: usize) -> Result<Ptr>;

    /// Grow or shrink `ptr` to `size` bytes, keeping its contents and
    /// zero-filling any growth. A null `ptr` allocates. On failure the
    /// original block is left untouched.
    fn resize(&mut self, ptr: Ptr, size: usize) -> Result<Ptr>;

    fn release(&mut self, ptr: Ptr);

    fn block(&self, ptr: Ptr) -> Result<&[u8]>;

    fn block_mut(&mut self, ptr: Ptr) -> Result<&mut [u8]>;
}

fn check_width(size: u32) -> Result<usize> {
    if size == 0 || size > 8 {
        return Err(Error::InvalidDataSize);
    }
    Ok(size as usize)
}

/// Typed accessors over any [`Allocator`].
pub trait Memory: Allocator {
    fn bytes(&self, addr: Addr, len: usize) -> Result<&[u8]> {
        let block = self.block(addr.block)?;
        let end = addr.offset.checked_add(len).ok_or(Error::Internal)?;
        block.get(addr.offset..end).ok_or(Error::Internal)
    }

    fn bytes_mut(&mut self, addr: Addr, len: usize) -> Result<&mut [u8]> {
        let block = self.block_mut(addr.block)?;
        let end = addr.offset.checked_add(len).ok_or(Error::Internal)?;
        block.get_mut(addr.offset..end).ok_or(Error::Internal)
    }

    /// Zero-extended read of a 1 to 8 byte value.
    fn read_uint(&self, addr: Addr, size: u32) -> Result<u64> {
        let width = check_width(size)?;
        let src = self.bytes(addr, width)?;
        let mut buf = [0u8; 8];
        if cfg!(target_endian = "little") {
            buf[..width].copy_from_slice(src);
        } else {
            buf[8 - width..].copy_from_slice(src);
        }
        Ok(u64::from_ne_bytes(buf))
    }

    /// Sign-extended read of a 1 to 8 byte value.
    fn read_int(&self, addr: Addr, size: u32) -> Result<i64> {
        let raw = self.read_uint(addr, size)?;
        let shift = 64 - size * 8;
        Ok(((raw << shift) as i64) >> shift)
    }

    /// Store the low `size` bytes of `value`.
    fn write_uint(&mut self, addr: Addr, size: u32, value: u64) -> Result<()> {
        let width = check_width(size)?;
        let buf = value.to_ne_bytes();
        let src = if cfg!(target_endian = "little") {
            &buf[..width]
        } else {
            &buf[8 - width..]
        };
        self.bytes_mut(addr, width)?.copy_from_slice(src);
        Ok(())
    }

    fn read_ptr(&self, addr: Addr) -> Result<Ptr> {
        self.read_uint(addr, POINTER_SIZE).map(Ptr::from_raw)
    }

    fn write_ptr(&mut self, addr: Addr, ptr: Ptr) -> Result<()> {
        self.write_uint(addr, POINTER_SIZE, ptr.to_raw())
    }

    fn write_bytes(&mut self, addr: Addr, bytes: &[u8]) -> Result<()> {
        self.bytes_mut(addr, bytes.len())?.copy_from_slice(bytes);
        Ok(())
    }

    /// NUL-terminated UTF-8 string starting at `addr`.
    fn read_str(&self, addr: Addr) -> Result<&str> {
        let block = self.block(addr.block)?;
        let tail = block.get(addr.offset..).ok_or(Error::Internal)?;
        let len = tail.iter().position(|&b| b == 0).ok_or(Error::Internal)?;
        std::str::from_utf8(&tail[..len]).map_err(|_| Error::InvalidValue)
    }

    fn read_f32(&self, addr: Addr) -> Result<f32> {
        self.read_uint(addr, 4).map(|bits| f32::from_bits(bits as u32))
    }

    fn read_f64(&self, addr: Addr) -> Result<f64> {
        self.read_uint(addr, 8).map(f64::from_bits)
    }

    fn write_f32(&mut self, addr: Addr, value: f32) -> Result<()> {
        self.write_uint(addr, 4, u64::from(value.to_bits()))
    }

    fn write_f64(&mut self, addr: Addr, value: f64) -> Result<()> {
        self.write_uint(addr, 8, value.to_bits())
    }
}

impl<A: Allocator + ?Sized> Memory for A {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::Heap;

    #[test]
    fn sign_extension() {
        let mut heap = Heap::new();
        let block = heap.allocate(8).unwrap();
        let at = Addr::new(block);

        heap.write_uint(at, 1, 0xff).unwrap();
        assert_eq!(heap.read_int(at, 1).unwrap(), -1);
        assert_eq!(heap.read_uint(at, 1).unwrap(), 0xff);

        heap.write_uint(at, 3, (-70_000i64) as u64).unwrap();
        assert_eq!(heap.read_int(at, 3).unwrap(), -70_000);

        heap.write_uint(at, 8, i64::MIN as u64).unwrap();
        assert_eq!(heap.read_int(at, 8).unwrap(), i64::MIN);
    }

    #[test]
    fn width_is_checked() {
        let mut heap = Heap::new();
        let at = Addr::new(heap.allocate(16).unwrap());
        assert_eq!(heap.read_uint(at, 0), Err(Error::InvalidDataSize));
        assert_eq!(heap.write_uint(at, 9, 1), Err(Error::InvalidDataSize));
    }

    #[test]
    fn out_of_bounds_is_internal() {
        let mut heap = Heap::new();
        let at = Addr::new(heap.allocate(4).unwrap());
        assert_eq!(heap.read_uint(at.add(2), 4), Err(Error::Internal));
        assert_eq!(heap.write_ptr(at, Ptr::from_raw(3)), Err(Error::Internal));
        assert_eq!(heap.read_uint(Addr::new(Ptr::NULL), 1), Err(Error::Internal));
    }

    #[test]
    fn pointer_and_string_round_trip() {
        let mut heap = Heap::new();
        let parent = Addr::new(heap.allocate(16).unwrap());
        let child = heap.allocate(6).unwrap();
        heap.write_bytes(Addr::new(child), b"hello\0").unwrap();
        heap.write_ptr(parent.add(8), child).unwrap();

        let read = heap.read_ptr(parent.add(8)).unwrap();
        assert_eq!(read, child);
        assert_eq!(heap.read_str(Addr::new(read)).unwrap(), "hello");
        assert!(heap.read_ptr(parent).unwrap().is_null());
    }

    #[test]
    fn floats() {
        let mut heap = Heap::new();
        let at = Addr::new(heap.allocate(12).unwrap());
        heap.write_f32(at, 1.5).unwrap();
        heap.write_f64(at.add(4), -2.25).unwrap();
        assert_eq!(heap.read_f32(at).unwrap(), 1.5);
        assert_eq!(heap.read_f64(at.add(4)).unwrap(), -2.25);
    }
}
