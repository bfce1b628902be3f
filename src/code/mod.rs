//! # Code
//!
//! Hand-assembled instruction sequences and the buffer type used to carry them into a patcher

use std::borrow::Cow;

use crate::error::PatchError;

pub mod arm64;
pub mod x64;

/// Immutable, non-empty sequence of replacement bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchBuffer {
    /// Replacement bytes, borrowed when embedded at build time
    bytes: Cow<'static, [u8]>,
}
impl PatchBuffer {
    /// Creates a buffer from owned bytes
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, PatchError> {
        Self::from_cow(Cow::Owned(bytes.into()))
    }
    /// Creates a buffer over a constant without copying it
    pub fn from_static(bytes: &'static [u8]) -> Result<Self, PatchError> {
        Self::from_cow(Cow::Borrowed(bytes))
    }
    /// Shared constructor enforcing non-emptiness
    fn from_cow(bytes: Cow<'static, [u8]>) -> Result<Self, PatchError> {
        if bytes.is_empty() {
            return Err(PatchError::InvalidArgument("patch buffer is empty"));
        }
        Ok(Self { bytes })
    }
    /// The replacement bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
    /// Number of bytes that will be written
    pub fn len(&self) -> usize {
        self.bytes.len()
    }
    /// Always `false`; kept for API symmetry with slices
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Generates a "return `value`" sequence for the architecture this crate was built for
#[cfg(target_arch = "x86_64")]
pub fn return_constant(value: u32) -> [u8; x64::RETURN_CONSTANT_LEN] {
    x64::return_constant(value)
}

/// Generates a "return `value`" sequence for the architecture this crate was built for
#[cfg(target_arch = "aarch64")]
pub fn return_constant(value: u32) -> [u8; arm64::RETURN_CONSTANT_LEN] {
    arm64::return_constant(value)
}

/// Makes freshly written code visible to instruction fetch.
///
/// x86 keeps its instruction cache coherent, so this is a no-op there.
///
/// # Safety
///
/// `[ptr, ptr + len)` must be mapped
#[cfg(target_arch = "aarch64")]
pub unsafe fn flush_instruction_cache(ptr: *const u8, len: usize) {
    use std::arch::asm;

    if len == 0 {
        return;
    }
    let ctr: u64;
    asm!("mrs {}, ctr_el0", out(reg) ctr, options(nomem, nostack));
    let dline = 4usize << ((ctr >> 16) & 0xf);
    let iline = 4usize << (ctr & 0xf);
    let start = ptr as usize;
    let end = start + len;

    let mut line = start & !(dline - 1);
    while line < end {
        asm!("dc cvau, {}", in(reg) line, options(nostack));
        line += dline;
    }
    asm!("dsb ish", options(nostack));

    let mut line = start & !(iline - 1);
    while line < end {
        asm!("ic ivau, {}", in(reg) line, options(nostack));
        line += iline;
    }
    asm!("dsb ish", "isb", options(nostack));
}

/// Makes freshly written code visible to instruction fetch.
///
/// x86 keeps its instruction cache coherent, so this is a no-op there.
///
/// # Safety
///
/// `[ptr, ptr + len)` must be mapped
#[cfg(not(target_arch = "aarch64"))]
pub unsafe fn flush_instruction_cache(_ptr: *const u8, _len: usize) {}

#[cfg(test)]
mod tests {
    use super::PatchBuffer;
    use crate::error::PatchError;

    /// Build-time constant
    static STUB: [u8; 3] = [0x90, 0x90, 0xc3];

    #[test]
    fn test_empty_rejected() {
        assert!(matches!(
            PatchBuffer::new(Vec::new()),
            Err(PatchError::InvalidArgument(_))
        ));
        assert!(PatchBuffer::from_static(&[]).is_err());
    }

    #[test]
    fn test_from_static() {
        let buffer = PatchBuffer::from_static(&STUB).unwrap();
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.as_bytes().as_ptr(), STUB.as_ptr());
    }
}
