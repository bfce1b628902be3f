#![warn(clippy::missing_docs_in_private_items)]
#![warn(rustdoc::missing_crate_level_docs)]
#![doc = include_str!("../README.md")]

pub mod applicator;
pub mod code;
pub mod error;
pub mod host;
pub mod lock;
pub mod patcher;
pub mod target;

pub use applicator::{PatchApplicator, PatchOptions, PatchReport, PatchState};
pub use code::PatchBuffer;
pub use error::{HostError, PatchError, ProtectionRestoreWarning};
pub use target::{PatchTarget, TargetAddress};
