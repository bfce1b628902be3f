//! # Errors
//!
//! Error types surfaced by the patch applicator and the host capabilities it consumes

use thiserror::Error;

use crate::applicator::PatchState;

/// Errors raised by host capabilities (module loader, symbol resolver, protection control)
#[derive(Debug, Error)]
pub enum HostError {
    /// Error from the dynamic loader
    #[error("{0}")]
    Library(#[from] libloading::Error),
    /// Error when querying or setting memory protections
    #[error("Error setting memory protections")]
    Protection(#[from] region::Error),
    /// The symbol exists but resolves to a null address
    #[error("symbol resolved to a null address")]
    NullAddress,
    /// The module handle does not belong to this loader
    #[error("unknown module handle {0}")]
    UnknownHandle(usize),
    /// Free-form failure, mostly used by test doubles
    #[error("{0}")]
    Message(String),
}

/// Terminal failures of [`PatchApplicator::apply_patch`](crate::PatchApplicator::apply_patch)
#[derive(Debug, Error)]
pub enum PatchError {
    /// An input was rejected before touching the host
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// The module could not be located or loaded
    #[error("unable to load module `{module}`")]
    ModuleResolution {
        /// Module name as passed by the caller
        module: String,
        /// Loader failure
        #[source]
        source: HostError,
    },
    /// The export does not exist, or resolved to null
    #[error("unable to resolve `{symbol}` in `{module}`")]
    SymbolResolution {
        /// Module name as passed by the caller
        module: String,
        /// Symbol name as passed by the caller
        symbol: String,
        /// Resolver failure
        #[source]
        source: HostError,
    },
    /// The host refused to make the target writable
    #[error("unable to change protection of {len} bytes at {address:#x}")]
    ProtectionChange {
        /// Start of the target range
        address: usize,
        /// Length of the target range
        len: usize,
        /// Protection failure
        #[source]
        source: HostError,
    },
    /// The patch is longer than the declared prologue
    #[error("patch of {len} bytes exceeds the {capacity}-byte prologue")]
    PatchTooLarge {
        /// Patch length
        len: usize,
        /// Declared prologue length
        capacity: usize,
    },
    /// The copy itself failed
    #[error("unable to write patch")]
    Write(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
    /// The copy reported a byte count other than the patch length
    #[error("wrote {written} bytes, expected exactly {expected}")]
    LengthMismatch {
        /// Patch length
        expected: usize,
        /// Bytes the patcher reported as written
        written: usize,
    },
}

impl PatchError {
    /// Last state the failed call reached before moving to [`PatchState::Failed`]
    pub fn failed_after(&self) -> PatchState {
        match self {
            Self::InvalidArgument(_) | Self::PatchTooLarge { .. } | Self::ModuleResolution { .. } => {
                PatchState::Unresolved
            }
            Self::SymbolResolution { .. } => PatchState::ModuleResolved,
            Self::ProtectionChange { .. } => PatchState::SymbolResolved,
            Self::Write(_) => PatchState::ProtectionRelaxed,
            Self::LengthMismatch { .. } => PatchState::Written,
        }
    }
}

/// Non-fatal: the patch is in place, but the original protection could not be put back
#[derive(Debug, Error)]
#[error("unable to restore protection of {len} bytes at {address:#x}")]
pub struct ProtectionRestoreWarning {
    /// Start of the target range
    pub address: usize,
    /// Length of the target range
    pub len: usize,
    /// Protection failure
    #[source]
    pub source: HostError,
}
