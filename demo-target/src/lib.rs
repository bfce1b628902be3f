//! Demo library whose only export is rewritten by the `prologue-patch` binary

use std::hint::black_box;

/// Returns 42.
///
/// `black_box` keeps the body longer than the 12 bytes the patch overwrites.
#[no_mangle]
#[inline(never)]
pub extern "C" fn demo_answer() -> u32 {
    black_box(40u32).wrapping_add(black_box(2))
}
