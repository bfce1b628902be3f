//! # Applicator
//!
//! Resolves an exported function and overwrites its entry bytes, keeping protections intact

use log::{debug, info, trace};
use region::Protection;

use crate::code::PatchBuffer;
use crate::error::{HostError, PatchError, ProtectionRestoreWarning};
use crate::host::{MemoryProtector, ModuleLoader, RegionProtector, SystemHost};
use crate::lock::RangeLock;
use crate::patcher::byte::BytePatcher;
use crate::patcher::mem::{PermissionError, PermissionWrapper};
use crate::patcher::Patcher;
use crate::target::TargetAddress;

/// Progress of a single [`PatchApplicator::apply_patch`] call.
///
/// Successful calls end in [`PatchReport::state`]; failed ones report where they stopped through [`PatchError::failed_after`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchState {
    /// Nothing resolved yet
    Unresolved,
    /// Module handle obtained
    ModuleResolved,
    /// Export address obtained
    SymbolResolved,
    /// Target range is writable
    ProtectionRelaxed,
    /// Patch bytes are in place
    Written,
    /// Original protections are back (or a restore warning was raised)
    ProtectionRestored,
    /// A step failed; the call is over
    Failed,
}

/// Tunables for [`PatchApplicator`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchOptions {
    /// Usable bytes at the function entry, if known
    prologue_len: Option<usize>,
    /// Protection requested while writing
    protection: Protection,
    /// Whether to take a [`RangeLock`] around the write
    serialize: bool,
}
impl Default for PatchOptions {
    fn default() -> Self {
        Self {
            prologue_len: None,
            protection: Protection::READ_WRITE_EXECUTE,
            serialize: true,
        }
    }
}
impl PatchOptions {
    /// Default options: unchecked length, read-write-execute while writing, serialized
    pub fn new() -> Self {
        Self::default()
    }
    /// Rejects patches longer than `len` bytes before touching memory
    pub fn prologue_len(mut self, len: usize) -> Self {
        self.prologue_len = Some(len);
        self
    }
    /// Protection requested while writing.
    ///
    /// Leaving out execute is only safe when no other thread can be running code on the same pages.
    pub fn protection(mut self, protection: Protection) -> Self {
        self.protection = protection;
        self
    }
    /// Whether concurrent patches touching the same pages are serialized
    pub fn serialize(mut self, serialize: bool) -> Self {
        self.serialize = serialize;
        self
    }
}

/// What a successful [`PatchApplicator::apply_patch`] did
#[derive(Debug)]
pub struct PatchReport {
    /// Module the symbol was resolved in
    pub module: String,
    /// Patched export
    pub symbol: String,
    /// Address the patch was written to
    pub address: TargetAddress,
    /// Bytes written, always the patch length
    pub bytes_written: usize,
    /// Set when the original protection could not be restored. The patch is still in place.
    pub restore_warning: Option<ProtectionRestoreWarning>,
    /// Final state of the call, always [`PatchState::ProtectionRestored`]
    pub state: PatchState,
}

/// Overwrites the entry of a named export with caller-supplied machine code
pub struct PatchApplicator<L, M, P = BytePatcher>
where
    L: ModuleLoader,
    M: MemoryProtector,
    P: Patcher,
{
    /// Module and symbol resolution
    loader: L,
    /// Protection-managing writer
    writer: PermissionWrapper<P, M>,
    /// Tunables
    options: PatchOptions,
}

impl PatchApplicator<SystemHost, RegionProtector> {
    /// Applicator backed by the platform loader and `region`
    pub fn system() -> Self {
        Self::new(SystemHost::new(), RegionProtector::new(), BytePatcher::new())
    }
}

impl<L, M, P> PatchApplicator<L, M, P>
where
    L: ModuleLoader,
    M: MemoryProtector,
    P: Patcher,
    P::Error: std::error::Error + Send + Sync + 'static,
{
    /// Creates an applicator from its host capabilities and the patcher doing the copy
    pub fn new(loader: L, protector: M, patcher: P) -> Self {
        Self::with_options(loader, protector, patcher, PatchOptions::default())
    }

    /// Creates an applicator with non-default [`PatchOptions`]
    pub fn with_options(loader: L, protector: M, patcher: P, options: PatchOptions) -> Self {
        Self {
            loader,
            writer: PermissionWrapper::new(patcher, protector).with_protection(options.protection),
            options,
        }
    }

    /// Options in effect
    pub fn options(&self) -> &PatchOptions {
        &self.options
    }

    /// Module and symbol resolution in use
    pub fn loader(&self) -> &L {
        &self.loader
    }

    /// Protection control in use
    pub fn protector(&self) -> &M {
        self.writer.protector()
    }

    /// Patcher doing the copy
    pub fn patcher(&self) -> &P {
        self.writer.patcher()
    }

    /// Resolves `symbol` in `module` and overwrites its first `patch.len()` bytes with `patch`.
    ///
    /// The memory protection of the target is relaxed for the write and restored afterwards.
    /// The patch lasts until the process exits; there is no undo.
    ///
    /// # Safety
    ///
    /// - `patch` must fit in the function's prologue. Without [`PatchOptions::prologue_len`] this is not checked,
    ///   and a longer patch corrupts whatever follows the prologue.
    /// - No thread may be executing the target bytes while they are written.
    /// - With [`PatchOptions::serialize`] turned off, the caller must make sure no other patch touching the same pages runs concurrently.
    ///   Protections change page by page, so even disjoint functions sharing a page conflict.
    pub unsafe fn apply_patch(
        &self,
        module: &str,
        symbol: &str,
        patch: &PatchBuffer,
    ) -> Result<PatchReport, PatchError> {
        let mut state = PatchState::Unresolved;
        let result = self.run(module, symbol, patch, &mut state);
        if let Err(e) = &result {
            debug_assert_eq!(state, e.failed_after());
            advance(&mut state, PatchState::Failed);
            debug!("patching `{symbol}` in `{module}` failed: {e}");
        }
        result
    }

    /// Body of [`PatchApplicator::apply_patch`], recording progress in `state`
    unsafe fn run(
        &self,
        module: &str,
        symbol: &str,
        patch: &PatchBuffer,
        state: &mut PatchState,
    ) -> Result<PatchReport, PatchError> {
        if module.is_empty() {
            return Err(PatchError::InvalidArgument("module name is empty"));
        }
        if symbol.is_empty() {
            return Err(PatchError::InvalidArgument("symbol name is empty"));
        }
        if let Some(capacity) = self.options.prologue_len {
            if patch.len() > capacity {
                return Err(PatchError::PatchTooLarge {
                    len: patch.len(),
                    capacity,
                });
            }
        }

        let handle = self
            .loader
            .load(module)
            .map_err(|source| PatchError::ModuleResolution {
                module: module.to_owned(),
                source,
            })?;
        advance(state, PatchState::ModuleResolved);

        let address = self
            .loader
            .resolve(handle, symbol)
            .and_then(|ptr| TargetAddress::new(ptr).ok_or(HostError::NullAddress))
            .map_err(|source| PatchError::SymbolResolution {
                module: module.to_owned(),
                symbol: symbol.to_owned(),
                source,
            })?;
        advance(state, PatchState::SymbolResolved);
        debug!("`{symbol}` in `{module}` is at {:#x}", address.as_usize());

        let target = address.span(patch.len());
        let _lock = self
            .options
            .serialize
            .then(|| RangeLock::acquire(target.as_range()));

        let outcome = self
            .writer
            .patch(target, patch.as_bytes())
            .map_err(|e| match e {
                PermissionError::ProtectionError(source) => PatchError::ProtectionChange {
                    address: address.as_usize(),
                    len: patch.len(),
                    source,
                },
                PermissionError::CustomError(e) => {
                    advance(state, PatchState::ProtectionRelaxed);
                    PatchError::Write(Box::new(e))
                }
            })?;
        // The wrapper restores before returning, so both transitions are observed together
        advance(state, PatchState::ProtectionRelaxed);
        advance(state, PatchState::Written);
        if outcome.written != patch.len() {
            return Err(PatchError::LengthMismatch {
                expected: patch.len(),
                written: outcome.written,
            });
        }
        advance(state, PatchState::ProtectionRestored);

        info!(
            "patched {} bytes of `{symbol}` in `{module}` at {:#x}",
            outcome.written,
            address.as_usize()
        );
        Ok(PatchReport {
            module: module.to_owned(),
            symbol: symbol.to_owned(),
            address,
            bytes_written: outcome.written,
            restore_warning: outcome.restore_warning,
            state: *state,
        })
    }
}

/// Moves `state` to `next`, tracing the transition
fn advance(state: &mut PatchState, next: PatchState) {
    trace!("{state:?} -> {next:?}");
    *state = next;
}
