//! This module contains a byte patcher

use std::ptr;

use thiserror::Error;

use super::{PatchOutcome, Patcher};
use crate::target::PatchTarget;

/// Errors when copying bytes into a target
#[derive(Debug, Error)]
pub enum ByteError {
    /// The patch does not fit the target range
    #[error("patch of {len} bytes does not fit a {capacity}-byte target")]
    Overflow {
        /// Patch length
        len: usize,
        /// Target length
        capacity: usize,
    },
}

/// Patcher for patching memory locations with byte arrays.
/// This patcher only fails when the patch is larger than the target.
#[derive(Debug, Default, Clone, Copy)]
pub struct BytePatcher;
impl BytePatcher {
    /// Creates a new [`BytePatcher`]
    pub fn new() -> Self {
        Self::default()
    }
}
unsafe impl Patcher for BytePatcher {
    type Error = ByteError;

    unsafe fn patch(&self, target: PatchTarget, patch: &[u8]) -> Result<PatchOutcome, Self::Error> {
        if patch.len() > target.len() {
            return Err(ByteError::Overflow {
                len: patch.len(),
                capacity: target.len(),
            });
        }

        // Safety: caller must ensure that `target` is writable for its full length, which covers the patch
        ptr::copy_nonoverlapping(patch.as_ptr(), target.as_ptr(), patch.len());

        Ok(PatchOutcome::written(patch.len()))
    }
}
