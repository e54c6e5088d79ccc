//! Error types for the TrustEngine core

use core::fmt;

/// Result type for driver operations
pub type TeResult<T> = Result<T, TeError>;

/// Result type for raw HWA accessors
pub type HwResult<T> = Result<T, HwError>;

/// Recoverable driver errors
///
/// Every variant is reported before any state is mutated. Hardware
/// contract violations are not represented here: they are fatal and
/// never returned to a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeError {
    /// Null/empty buffer, zero length, out-of-range slot id, or a
    /// source list too short for the requested range
    BadParams,

    /// Requested length exceeds the data available
    BadInputLen,

    /// Allocation failed (slot pool or cloned entry array)
    NoMem,

    /// Item not present (e.g. cancel after draining started)
    NoData,

    /// Bounded resource is full (event booking)
    Busy,

    /// Operation not allowed in the current session state
    BadState,

    /// Hardware completed the command with a non-zero status
    Engine(u32),
}

impl TeError {
    /// Numeric driver code, as reported across the driver boundary
    pub const fn code(&self) -> u32 {
        match self {
            TeError::BadParams => 0xFFFF_0006,
            TeError::BadState => 0xFFFF_0007,
            TeError::NoData => 0xFFFF_000B,
            TeError::NoMem => 0xFFFF_000C,
            TeError::Busy => 0xFFFF_000D,
            TeError::BadInputLen => 0xFFFF_0012,
            TeError::Engine(_) => 0xFFFF_0100,
        }
    }
}

impl fmt::Display for TeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TeError::BadParams => write!(f, "bad parameters"),
            TeError::BadInputLen => write!(f, "bad input length"),
            TeError::NoMem => write!(f, "out of memory"),
            TeError::NoData => write!(f, "no data"),
            TeError::Busy => write!(f, "resource busy"),
            TeError::BadState => write!(f, "bad state"),
            TeError::Engine(st) => write!(f, "engine status {:#010x}", st),
        }
    }
}

impl std::error::Error for TeError {}

/// Non-success status from an HWA register accessor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HwError(pub i32);

impl fmt::Display for HwError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hwa status {}", self.0)
    }
}

impl std::error::Error for HwError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(format!("{}", TeError::BadParams), "bad parameters");
        assert_eq!(format!("{}", TeError::Engine(0x12)), "engine status 0x00000012");
        assert_eq!(format!("{}", HwError(-5)), "hwa status -5");
    }

    #[test]
    fn test_error_codes_distinct() {
        let all = [
            TeError::BadParams,
            TeError::BadInputLen,
            TeError::NoMem,
            TeError::NoData,
            TeError::Busy,
            TeError::BadState,
            TeError::Engine(1),
        ];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a.code(), b.code(), "{} and {} share a code", a, b);
            }
        }
    }
}
