//! Memory-protection control backed by the `region` crate

use log::debug;
use region::Protection;

use super::{MemoryProtector, ProtectionToken};
use crate::error::HostError;

/// Changes protections of the current process with `mprotect`/`VirtualProtect`
#[derive(Debug, Default, Clone, Copy)]
pub struct RegionProtector;
impl RegionProtector {
    /// Creates a new [`RegionProtector`]
    pub fn new() -> Self {
        Self
    }
}

impl MemoryProtector for RegionProtector {
    unsafe fn relax(
        &self,
        address: *const u8,
        len: usize,
        protection: Protection,
    ) -> Result<ProtectionToken, HostError> {
        // Capture every region first: a range straddling a page boundary can span differently protected pages
        let regions = region::query_range(address, len)?
            .map(|region| region.map(|r| (r.as_range(), r.protection())))
            .collect::<Result<Vec<_>, _>>()?;
        region::protect(address, len, protection)?;

        let start = address as usize;
        debug!(
            "relaxed {len} bytes at {start:#x} to {protection:?} ({} regions captured)",
            regions.len()
        );
        Ok(ProtectionToken::new(start..start + len, regions))
    }

    unsafe fn restore(&self, token: ProtectionToken) -> Result<(), HostError> {
        // Keep going after a failure so as much as possible is put back, then report the first error
        let mut first_error = None;
        for (range, protection) in token.regions() {
            if let Err(e) = region::protect(range.start as *const u8, range.len(), protection) {
                first_error.get_or_insert(e);
            } else {
                debug!("restored {range:#x?} to {protection:?}");
            }
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::slice;

    use region::Protection;

    use super::RegionProtector;
    use crate::host::MemoryProtector;

    #[test]
    /// Tests to ensure permissions are changed and then put back
    fn test_relax_restore() {
        let mut alloc = region::alloc(region::page::size(), Protection::READ).unwrap();
        let ptr = alloc.as_mut_ptr::<u8>();
        let protector = RegionProtector::new();

        // sanity check
        let before = region::query(ptr).unwrap().protection();
        assert_eq!(before, Protection::READ);

        let token = unsafe { protector.relax(ptr, 4, Protection::READ_WRITE).unwrap() };
        assert_eq!(
            region::query(ptr).unwrap().protection(),
            Protection::READ_WRITE
        );

        // the memory is writable now
        unsafe { slice::from_raw_parts_mut(ptr, 4).copy_from_slice(&[1, 2, 3, 4]) };

        unsafe { protector.restore(token).unwrap() };
        assert_eq!(region::query(ptr).unwrap().protection(), before);
        assert_eq!(unsafe { slice::from_raw_parts(ptr, 4) }, [1, 2, 3, 4]);
    }

    #[test]
    /// A range crossing into a differently protected page is restored page by page
    fn test_straddle() {
        let page = region::page::size();
        let mut alloc = region::alloc(page * 2, Protection::READ).unwrap();
        let base = alloc.as_mut_ptr::<u8>();
        unsafe {
            region::protect(base.add(page), page, Protection::READ_EXECUTE).unwrap();
        }
        let protector = RegionProtector::new();

        let target = unsafe { base.add(page - 6) };
        let token = unsafe {
            protector
                .relax(target, 12, Protection::READ_WRITE_EXECUTE)
                .unwrap()
        };
        assert_eq!(token.regions().count(), 2);

        unsafe { protector.restore(token).unwrap() };
        assert_eq!(region::query(base).unwrap().protection(), Protection::READ);
        assert_eq!(
            region::query(unsafe { base.add(page) }).unwrap().protection(),
            Protection::READ_EXECUTE
        );
    }
}
