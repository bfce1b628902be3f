//! # Target
//!
//! Resolved addresses and the bounded ranges that patchers are allowed to write to

use std::ops::Range;
use std::ptr::NonNull;

/// Runtime address of a resolved export. Never null.
///
/// This is a lookup result, not an owning reference: it stays valid only while the module it was resolved from is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetAddress(NonNull<u8>);
impl TargetAddress {
    /// Wraps a raw address, rejecting null
    pub fn new(ptr: *const u8) -> Option<Self> {
        NonNull::new(ptr as *mut u8).map(Self)
    }
    /// Raw pointer to the first byte
    pub fn as_ptr(&self) -> *mut u8 {
        self.0.as_ptr()
    }
    /// Address as an integer, for logs and range bookkeeping
    pub fn as_usize(&self) -> usize {
        self.0.as_ptr() as usize
    }
    /// Pairs the address with an explicit length
    pub fn span(self, len: usize) -> PatchTarget {
        PatchTarget { address: self, len }
    }
}

/// An address plus the number of bytes a patcher may touch there
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchTarget {
    /// First byte of the range
    address: TargetAddress,
    /// Writable length of the range
    len: usize,
}
impl PatchTarget {
    /// Start of the range
    pub fn address(&self) -> TargetAddress {
        self.address
    }
    /// Raw pointer to the first byte
    pub fn as_ptr(&self) -> *mut u8 {
        self.address.as_ptr()
    }
    /// Number of bytes in the range
    pub fn len(&self) -> usize {
        self.len
    }
    /// Whether the range is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
    /// `[start, start + len)` as integers
    pub fn as_range(&self) -> Range<usize> {
        let start = self.address.as_usize();
        start..start.saturating_add(self.len)
    }
}

#[cfg(test)]
mod tests {
    use std::ptr;

    use super::TargetAddress;

    #[test]
    /// Null never becomes a target
    fn test_null() {
        assert!(TargetAddress::new(ptr::null()).is_none());
    }

    #[test]
    fn test_span() {
        let data = [0u8; 16];
        let target = TargetAddress::new(data.as_ptr()).unwrap().span(12);
        let start = data.as_ptr() as usize;

        assert_eq!(target.len(), 12);
        assert_eq!(target.as_range(), start..start + 12);
        assert_eq!(target.address().as_usize(), start);
    }
}
