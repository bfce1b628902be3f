//! # Patcher
//!
//! This module covers patchers, which are used to overwrite locations in memory.
//! Patches are permanent: nothing here saves the original bytes or reverts them.

use crate::error::ProtectionRestoreWarning;
use crate::target::PatchTarget;

pub mod byte;
pub mod mem;

/// Writes a patch into a bounded target
///
/// # Safety
///
/// Patchers are inherently unsafe. The implementor must never write outside `target`,
/// and must report exactly how many bytes it wrote.
pub unsafe trait Patcher {
    /// Error type that can occur when patching
    type Error;

    /// Patches a given location.
    ///
    /// # Safety
    ///
    /// This function is intended to be used on arbitrary memory addresses, but `target` must be valid for the supplied patcher
    unsafe fn patch(&self, target: PatchTarget, patch: &[u8]) -> Result<PatchOutcome, Self::Error>;
}

/// Result of a successful write
#[derive(Debug)]
pub struct PatchOutcome {
    /// Number of bytes written at the target
    pub written: usize,
    /// Set when the write went through but memory protections could not be put back
    pub restore_warning: Option<ProtectionRestoreWarning>,
}
impl PatchOutcome {
    /// A write of `written` bytes with nothing else to report
    pub fn written(written: usize) -> Self {
        Self {
            written,
            restore_warning: None,
        }
    }
}
