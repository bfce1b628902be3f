//! This module contains a patcher which adjusts memory permissions to patch read-only code

use log::warn;
use region::Protection;
use thiserror::Error;

use super::{PatchOutcome, Patcher};
use crate::code::flush_instruction_cache;
use crate::error::{HostError, ProtectionRestoreWarning};
use crate::host::MemoryProtector;
use crate::target::PatchTarget;

/// Errors when using permission patching
#[derive(Debug, Error)]
pub enum PermissionError<E> {
    /// Error when relaxing memory protections. Nothing was written.
    #[error("Error setting memory protections")]
    ProtectionError(#[source] HostError),
    /// Custom error type from the underlying patcher. Protections were restored (or a restore was attempted).
    #[error("{0}")]
    CustomError(E),
}

/// This struct wraps patchers to allow them to write to memory that's normally unwritable.
/// It achieves this result by changing the memory permissions of the target memory, triggering the patch, and then reverting the permissions.
///
/// The revert is attempted exactly once after every successful relax, whether or not the write succeeded.
/// A failed revert does not undo the write; it is logged and returned as [`PatchOutcome::restore_warning`].
///
/// # Safety
///
/// `PermissionWrapper` relies on the length of the target to determine how many pages to change write permissions,
/// pairing `PermissionWrapper` with a patcher that writes outside the target is undefined behavior.
pub struct PermissionWrapper<P: Patcher, M: MemoryProtector> {
    /// Underlying patcher.
    patcher: P,
    /// Protection control for the target range
    protector: M,
    /// Protection requested while writing
    protection: Protection,
}
impl<P: Patcher, M: MemoryProtector> PermissionWrapper<P, M> {
    /// Creates a new PermissionWrapper which relaxes targets to read-write-execute while writing
    pub fn new(patcher: P, protector: M) -> Self {
        Self {
            patcher,
            protector,
            protection: Protection::READ_WRITE_EXECUTE,
        }
    }
    /// Overrides the protection requested while writing
    pub fn with_protection(mut self, protection: Protection) -> Self {
        self.protection = protection;
        self
    }
    /// Protection requested while writing
    pub fn protection(&self) -> Protection {
        self.protection
    }
    /// The wrapped patcher
    pub fn patcher(&self) -> &P {
        &self.patcher
    }
    /// The protection control in use
    pub fn protector(&self) -> &M {
        &self.protector
    }
}

unsafe impl<P, M> Patcher for PermissionWrapper<P, M>
where
    P: Patcher,
    M: MemoryProtector,
{
    type Error = PermissionError<P::Error>;

    unsafe fn patch(&self, target: PatchTarget, patch: &[u8]) -> Result<PatchOutcome, Self::Error> {
        let token = self
            .protector
            .relax(target.as_ptr(), target.len(), self.protection)
            .map_err(PermissionError::ProtectionError)?;

        let result = self.patcher.patch(target, patch);
        if let Ok(outcome) = &result {
            flush_instruction_cache(target.as_ptr(), outcome.written);
        }

        let restore_warning = self.protector.restore(token).err().map(|source| {
            let warning = ProtectionRestoreWarning {
                address: target.address().as_usize(),
                len: target.len(),
                source,
            };
            warn!("{warning}: {}", warning.source);
            warning
        });

        let mut outcome = result.map_err(PermissionError::CustomError)?;
        if outcome.restore_warning.is_none() {
            outcome.restore_warning = restore_warning;
        }
        Ok(outcome)
    }
}
