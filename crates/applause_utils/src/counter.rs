//! A forever rising, global counter.
//! Useful if you want to generate tokens from a source that will never repeat
//! (bus subscriptions, timer handles, and so on).

use std::sync::atomic::{AtomicU64, Ordering};

static COUNTER: AtomicU64 = AtomicU64::new(1);

/// Returns next value from the counter.
///
/// ## Panics
/// Panics if an overflow is ever reached. With an unsigned 64-bit integer, it
/// can be considered unlikely.
pub fn next() -> u64 {
    let result = COUNTER.fetch_add(1, Ordering::SeqCst);
    if result == u64::MAX {
        panic!("How did we get here?");
    }
    result
}
