//! # Host
//!
//! This module covers the operating-system capabilities the applicator consumes:
//! loading modules, resolving exports and changing memory protections.
//! Each is a trait so that tests can swap the process-global facilities for doubles.

use std::ops::Range;

use region::Protection;

use crate::error::HostError;

pub mod protect;
pub mod system;

pub use protect::RegionProtector;
pub use system::SystemHost;

/// Opaque reference to a loaded module. Only meaningful to the loader that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleHandle(usize);
impl ModuleHandle {
    /// Wraps a loader-specific identifier
    pub fn new(id: usize) -> Self {
        Self(id)
    }
    /// Loader-specific identifier
    pub fn id(&self) -> usize {
        self.0
    }
}

/// Module and symbol resolution
pub trait ModuleLoader {
    /// Loads (or finds the already loaded) module called `name`
    fn load(&self, name: &str) -> Result<ModuleHandle, HostError>;
    /// Resolves the runtime address of the export `symbol` in `module`.
    ///
    /// May return null; callers treat that as a resolution failure.
    fn resolve(&self, module: ModuleHandle, symbol: &str) -> Result<*const u8, HostError>;
}

/// Memory-protection control
pub trait MemoryProtector {
    /// Sets `protection` on `[address, address + len)`, returning the previous state
    ///
    /// # Safety
    ///
    /// Relaxing protection on memory that Rust tracks as immutable is undefined behavior if it is then written to.
    unsafe fn relax(
        &self,
        address: *const u8,
        len: usize,
        protection: Protection,
    ) -> Result<ProtectionToken, HostError>;
    /// Puts back the state captured by [`MemoryProtector::relax`]
    ///
    /// # Safety
    ///
    /// `token` must come from this protector, and the range must still be mapped
    unsafe fn restore(&self, token: ProtectionToken) -> Result<(), HostError>;
}

/// Prior protection of every region overlapping a relaxed range.
///
/// Deliberately not `Clone`: it is consumed by [`MemoryProtector::restore`].
#[derive(Debug, PartialEq, Eq)]
pub struct ProtectionToken {
    /// Range that was relaxed
    range: Range<usize>,
    /// `(region range, protection before relaxing)` for each overlapping region
    regions: Vec<(Range<usize>, Protection)>,
}
impl ProtectionToken {
    /// Creates a token for `range` from the captured region states
    pub fn new(range: Range<usize>, regions: Vec<(Range<usize>, Protection)>) -> Self {
        Self { range, regions }
    }
    /// Range that was relaxed
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }
    /// Captured region states, clipped to [`ProtectionToken::range`]
    pub fn regions(&self) -> impl Iterator<Item = (Range<usize>, Protection)> + '_ {
        let range = &self.range;
        self.regions.iter().filter_map(move |(region, protection)| {
            let start = region.start.max(range.start);
            let end = region.end.min(range.end);
            (start < end).then_some((start..end, *protection))
        })
    }
}

#[cfg(test)]
mod tests {
    use region::Protection;

    use super::ProtectionToken;

    #[test]
    /// Regions are clipped to the relaxed range, and disjoint ones are skipped
    fn test_token_regions() {
        let token = ProtectionToken::new(
            0x1010..0x2010,
            vec![
                (0x0000..0x1000, Protection::READ),
                (0x1000..0x2000, Protection::READ_EXECUTE),
                (0x2000..0x3000, Protection::READ),
            ],
        );
        let regions: Vec<_> = token.regions().collect();
        assert_eq!(
            regions,
            [
                (0x1010..0x2000, Protection::READ_EXECUTE),
                (0x2000..0x2010, Protection::READ)
            ]
        );
    }
}
