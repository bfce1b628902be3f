//! # Lock
//!
//! Process-wide serialization of patches by address range

use lazy_static::lazy_static;
use log::trace;
use std::ops::Range;
use std::sync::{Condvar, Mutex, PoisonError};

lazy_static! {
    /// Ranges currently being patched, and a condvar signalled whenever one is released
    static ref IN_FLIGHT: (Mutex<Vec<Range<usize>>>, Condvar) = (Mutex::new(Vec::new()), Condvar::new());
}

/// Whether two half-open ranges share at least one address
fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}

/// Whole pages spanned by `range`
fn page_span(range: &Range<usize>) -> Range<usize> {
    let start = region::page::floor(range.start as *const u8) as usize;
    let end = region::page::ceil(range.end as *const u8) as usize;
    start..end
}

/// Exclusive claim on the pages covering an address range. Released on drop.
///
/// Protection changes apply to whole pages, so the claim is widened to page boundaries:
/// two patches touching the same page never interleave, even when their byte ranges are disjoint.
/// Ranges on different pages do not contend.
#[derive(Debug)]
pub struct RangeLock {
    /// Claimed range
    range: Range<usize>,
}
impl RangeLock {
    /// Blocks until the pages covering `range` are free, then claims them
    pub fn acquire(range: Range<usize>) -> Self {
        let range = page_span(&range);
        let (lock, released) = &*IN_FLIGHT;
        let mut held = lock.lock().unwrap_or_else(PoisonError::into_inner);
        while held.iter().any(|r| overlaps(r, &range)) {
            trace!("waiting for {range:#x?}");
            held = released
                .wait(held)
                .unwrap_or_else(PoisonError::into_inner);
        }
        held.push(range.clone());
        Self { range }
    }
    /// Claimed range, page-aligned
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }
}
impl Drop for RangeLock {
    fn drop(&mut self) {
        let (lock, released) = &*IN_FLIGHT;
        let mut held = lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(i) = held.iter().position(|r| *r == self.range) {
            held.swap_remove(i);
        }
        released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::{overlaps, RangeLock};

    #[test]
    fn test_overlaps() {
        assert!(overlaps(&(0..10), &(5..15)));
        assert!(overlaps(&(5..15), &(0..10)));
        assert!(!overlaps(&(0..10), &(10..20)));
        assert!(!overlaps(&(0..0), &(0..10)));
    }

    #[test]
    /// Ranges on different pages can be held together
    fn test_disjoint_pages() {
        let page = region::page::size();
        let base = page * 0x100;
        let a = RangeLock::acquire(base..base + 0x10);
        let b = RangeLock::acquire(base + page..base + page + 0x10);
        assert_eq!(a.range(), base..base + page);
        assert_eq!(b.range(), base + page..base + 2 * page);
    }

    #[test]
    /// Disjoint bytes on one page still contend
    fn test_same_page_blocks() {
        let page = region::page::size();
        let base = page * 0x200;
        let first = RangeLock::acquire(base + 0x10..base + 0x1c);
        let acquired = Arc::new(AtomicBool::new(false));

        let waiter = {
            let acquired = Arc::clone(&acquired);
            thread::spawn(move || {
                let _second = RangeLock::acquire(base + 0x40..base + 0x4c);
                acquired.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!acquired.load(Ordering::SeqCst));

        drop(first);
        waiter.join().unwrap();
        assert!(acquired.load(Ordering::SeqCst));
    }

    #[test]
    /// A second claim on an overlapping range waits for the first to be released
    fn test_overlap_blocks() {
        let base = region::page::size() * 0x300;
        let first = RangeLock::acquire(base..base + 0x10);
        let acquired = Arc::new(AtomicBool::new(false));

        let waiter = {
            let acquired = Arc::clone(&acquired);
            thread::spawn(move || {
                let _second = RangeLock::acquire(base + 0x8..base + 0x18);
                acquired.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!acquired.load(Ordering::SeqCst));

        drop(first);
        waiter.join().unwrap();
        assert!(acquired.load(Ordering::SeqCst));
    }
}
