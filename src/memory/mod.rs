//! Object memory access layer
//!
//! This module provides the safe accessor abstraction every address in the
//! inspector is resolved through:
//! - Raw and typed reads of bound instance memory
//! - Writes and block allocation for value edits and array resizing
//! - Address and range validation
//!
//! Addresses are plain integers into an address space owned by the host.
//! Nothing here dereferences a pointer; an unreadable address is a
//! [`MemoryError`], never a fault.

use std::fmt;

mod arena;
pub use arena::MemoryArena;

/// Address into host-owned object memory
pub type Address = usize;

/// Memory access errors
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// Failed to read memory at address
    #[error("Memory read failed at 0x{address:X} (size: {size}): {reason}")]
    ReadFailed {
        /// Address of the read
        address: Address,
        /// Number of bytes requested
        size: usize,
        /// Why the read failed
        reason: String,
    },

    /// Failed to write memory at address
    #[error("Memory write failed at 0x{address:X} (size: {size}): {reason}")]
    WriteFailed {
        /// Address of the write
        address: Address,
        /// Number of bytes written
        size: usize,
        /// Why the write failed
        reason: String,
    },

    /// Address does not start a live block
    #[error("Invalid memory address: 0x{0:X}")]
    InvalidAddress(Address),
}

/// In-memory layout of a dynamic array header
///
/// Matches the host's script array: a data pointer followed by the element
/// count and the allocated capacity.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ArrayHeader {
    /// Address of the first element, zero when nothing is allocated
    pub data: u64,
    /// Number of live elements
    pub num: i32,
    /// Number of allocated elements
    pub max: i32,
}

impl ArrayHeader {
    /// Size of the header in bytes
    pub const SIZE: usize = std::mem::size_of::<ArrayHeader>();

    /// Element count, clamped at zero
    #[inline]
    pub fn len(&self) -> usize {
        self.num.max(0) as usize
    }

    /// Whether the array has no live elements
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num <= 0
    }

    /// Address of the element data, if any is allocated
    #[inline]
    pub fn data_address(&self) -> Option<Address> {
        (self.data != 0).then_some(self.data as Address)
    }
}

/// Core trait for reading bound object memory
///
/// This trait abstracts the host's object storage, allowing the tree to
/// work with any implementation.
pub trait MemoryReader: Send + Sync {
    /// Read raw bytes from memory
    ///
    /// # Arguments
    /// * `address` - Address to read from
    /// * `size` - Number of bytes to read
    ///
    /// # Returns
    /// Vector of bytes read from memory
    fn read_bytes(&self, address: Address, size: usize) -> Result<Vec<u8>, MemoryError>;

    /// Read a POD (Plain Old Data) type from memory
    fn read<T: bytemuck::Pod>(&self, address: Address) -> Result<T, MemoryError>
    where
        Self: Sized,
    {
        let size = std::mem::size_of::<T>();
        let bytes = self.read_bytes(address, size)?;

        if bytes.len() != size {
            return Err(MemoryError::ReadFailed {
                address,
                size,
                reason: format!("Expected {} bytes, got {}", size, bytes.len()),
            });
        }

        Ok(bytemuck::pod_read_unaligned(&bytes))
    }

    /// Read a dynamic array header
    fn read_array_header(&self, address: Address) -> Result<ArrayHeader, MemoryError>
    where
        Self: Sized,
    {
        self.read::<ArrayHeader>(address)
    }

    /// Read an object pointer, `None` when null
    fn read_pointer(&self, address: Address) -> Result<Option<Address>, MemoryError>
    where
        Self: Sized,
    {
        let raw = self.read::<u64>(address)?;
        Ok((raw != 0).then_some(raw as Address))
    }

    /// Check if an address is valid (readable)
    fn is_valid_address(&self, address: Address) -> bool;

    /// Check if a memory range is valid
    fn is_valid_range(&self, address: Address, size: usize) -> bool {
        if size == 0 {
            return self.is_valid_address(address);
        }

        match address.checked_add(size - 1) {
            Some(last) => self.is_valid_address(address) && self.is_valid_address(last),
            None => false,
        }
    }
}

/// Mutating access to bound object memory
pub trait MemoryWriter: MemoryReader {
    /// Write raw bytes to memory; the range must lie inside one live block
    fn write_bytes(&self, address: Address, data: &[u8]) -> Result<(), MemoryError>;

    /// Write a POD type to memory
    fn write<T: bytemuck::Pod>(&self, address: Address, value: &T) -> Result<(), MemoryError>
    where
        Self: Sized,
    {
        self.write_bytes(address, bytemuck::bytes_of(value))
    }

    /// Allocate a zeroed block and return its start address
    fn allocate(&self, size: usize) -> Address;

    /// Release a block previously returned by [`MemoryWriter::allocate`]
    fn release(&self, address: Address) -> Result<(), MemoryError>;
}

/// Resize the dynamic array whose header lives at `header_address`
///
/// Existing elements up to the new length are kept, new elements are
/// zeroed, and the old element block is released.
pub fn resize_array<M: MemoryWriter>(
    memory: &M,
    header_address: Address,
    len: usize,
    element_size: usize,
) -> Result<ArrayHeader, MemoryError> {
    let old = memory.read_array_header(header_address)?;
    let keep = old.len().min(len) * element_size;

    let data = if len == 0 {
        0
    } else {
        let block = memory.allocate(len * element_size);
        if let (Some(source), true) = (old.data_address(), keep > 0) {
            let bytes = memory.read_bytes(source, keep)?;
            memory.write_bytes(block, &bytes)?;
        }
        block as u64
    };

    if let Some(source) = old.data_address() {
        memory.release(source)?;
    }

    let header = ArrayHeader {
        data,
        num: len as i32,
        max: len as i32,
    };
    memory.write(header_address, &header)?;
    Ok(header)
}

impl fmt::Debug for dyn MemoryReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryReader").finish_non_exhaustive()
    }
}
