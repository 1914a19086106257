//! Block arena backing object instances
//!
//! Every instance, and every dynamic array's element storage, lives in its
//! own zeroed block. Released blocks stop resolving immediately, which is
//! how destroyed objects show up to the staleness scan.

use super::{Address, MemoryError, MemoryReader, MemoryWriter};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// First address handed out; keeps zero and low addresses unmapped
const ARENA_BASE: Address = 0x1_0000;

/// Block alignment and the unmapped gap left between blocks
const BLOCK_ALIGN: usize = 0x10;

/// Arena block storage
#[derive(Default)]
struct Blocks {
    /// Live blocks keyed by their start address
    blocks: BTreeMap<Address, Vec<u8>>,
    /// Next free address
    next: Address,
}

impl Blocks {
    fn block_containing(&self, address: Address) -> Option<(Address, &Vec<u8>)> {
        let (&base, data) = self.blocks.range(..=address).next_back()?;
        (address < base + data.len()).then_some((base, data))
    }

    fn read(&self, address: Address, size: usize) -> Option<Vec<u8>> {
        let (base, data) = self.block_containing(address)?;
        let offset = address - base;
        let end = offset.checked_add(size)?;

        data.get(offset..end).map(<[u8]>::to_vec)
    }

    fn write(&mut self, address: Address, bytes: &[u8]) -> Result<(), MemoryError> {
        let fail = |reason: &str| MemoryError::WriteFailed {
            address,
            size: bytes.len(),
            reason: reason.to_string(),
        };

        let (&base, data) = self
            .blocks
            .range_mut(..=address)
            .next_back()
            .ok_or_else(|| fail("Address not mapped"))?;

        let offset = address - base;
        let end = offset
            .checked_add(bytes.len())
            .filter(|&end| end <= data.len())
            .ok_or_else(|| fail("Write crosses block boundary"))?;

        data[offset..end].copy_from_slice(bytes);
        Ok(())
    }

    fn allocate(&mut self, size: usize) -> Address {
        if self.next == 0 {
            self.next = ARENA_BASE;
        }

        let address = self.next;
        self.blocks.insert(address, vec![0u8; size]);

        // Keep a gap so one-past-the-end never lands in the next block
        let span = size.max(1) + BLOCK_ALIGN;
        self.next = (address + span + BLOCK_ALIGN - 1) & !(BLOCK_ALIGN - 1);
        address
    }
}

/// Shared, growable object memory
///
/// Clones share the same storage, so a host can keep mutating instances
/// while a tree holds a handle to them.
#[derive(Clone, Default)]
pub struct MemoryArena {
    inner: Arc<RwLock<Blocks>>,
}

impl MemoryArena {
    /// Create an empty arena
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live blocks
    pub fn block_count(&self) -> usize {
        self.inner.read().blocks.len()
    }

    /// Size of the live block starting at `address`
    pub fn block_size(&self, address: Address) -> Option<usize> {
        self.inner.read().blocks.get(&address).map(Vec::len)
    }
}

impl MemoryReader for MemoryArena {
    fn read_bytes(&self, address: Address, size: usize) -> Result<Vec<u8>, MemoryError> {
        self.inner
            .read()
            .read(address, size)
            .ok_or(MemoryError::ReadFailed {
                address,
                size,
                reason: "Address not found in arena".to_string(),
            })
    }

    fn is_valid_address(&self, address: Address) -> bool {
        address != 0 && self.inner.read().block_containing(address).is_some()
    }
}

impl MemoryWriter for MemoryArena {
    fn write_bytes(&self, address: Address, data: &[u8]) -> Result<(), MemoryError> {
        self.inner.write().write(address, data)
    }

    fn allocate(&self, size: usize) -> Address {
        self.inner.write().allocate(size)
    }

    fn release(&self, address: Address) -> Result<(), MemoryError> {
        self.inner
            .write()
            .blocks
            .remove(&address)
            .map(|_| ())
            .ok_or(MemoryError::InvalidAddress(address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_read_write() {
        let arena = MemoryArena::new();
        let block = arena.allocate(5);

        arena.write_bytes(block, &[0x01, 0x02, 0x03, 0x04, 0x05]).unwrap();

        let result = arena.read_bytes(block, 5).unwrap();
        assert_eq!(result, vec![0x01, 0x02, 0x03, 0x04, 0x05]);

        // Reading from the middle
        let result = arena.read_bytes(block + 2, 2).unwrap();
        assert_eq!(result, vec![0x03, 0x04]);
    }

    #[test]
    fn test_arena_write_value() {
        let arena = MemoryArena::new();
        let block = arena.allocate(16);

        let test_value: u64 = 0x1234567890ABCDEF;
        arena.write(block + 8, &test_value).unwrap();

        let result: u64 = arena.read(block + 8).unwrap();
        assert_eq!(result, test_value);
    }

    #[test]
    fn test_arena_rejects_cross_block_access() {
        let arena = MemoryArena::new();
        let block = arena.allocate(4);
        let _next = arena.allocate(4);

        assert!(arena.read_bytes(block + 2, 4).is_err());
        assert!(arena.write_bytes(block + 2, &[0; 4]).is_err());
    }

    #[test]
    fn test_is_valid_address() {
        let arena = MemoryArena::new();
        let block = arena.allocate(3);

        assert!(arena.is_valid_address(block));
        assert!(arena.is_valid_address(block + 2));
        assert!(!arena.is_valid_address(block + 3));
        assert!(!arena.is_valid_address(0));
    }

    #[test]
    fn test_release_unmaps_block() {
        let arena = MemoryArena::new();
        let block = arena.allocate(8);
        assert_eq!(arena.block_size(block), Some(8));

        arena.release(block).unwrap();

        assert!(!arena.is_valid_address(block));
        assert!(arena.read_bytes(block, 1).is_err());
        assert!(matches!(arena.release(block), Err(MemoryError::InvalidAddress(_))));
        assert_eq!(arena.block_count(), 0);
    }
}
