//! Hardware contract violations
//!
//! The agent only writes to the CQ after checking room, so a rejected
//! access means driver and hardware disagree about queue state. Nothing
//! past that point can be trusted in a crypto path; the operation halts.

use te_core::{te_err, HwError};

/// Log and halt. Panics by default; aborts with `abort-on-fatal`.
#[cold]
#[inline(never)]
pub fn hw_fatal(tag: &str, what: &str, err: HwError) -> ! {
    te_err!("{}: fatal: {} failed ({})", tag, what, err);
    #[cfg(feature = "abort-on-fatal")]
    std::process::abort();
    #[cfg(not(feature = "abort-on-fatal"))]
    panic!("{}: hardware contract violation in {}: {}", tag, what, err);
}

/// Unwrap an HWA result or halt
pub(crate) trait OrFatal<T> {
    fn or_fatal(self, tag: &str, what: &str) -> T;
}

impl<T> OrFatal<T> for Result<T, HwError> {
    #[inline]
    fn or_fatal(self, tag: &str, what: &str) -> T {
        match self {
            Ok(v) => v,
            Err(e) => hw_fatal(tag, what, e),
        }
    }
}
