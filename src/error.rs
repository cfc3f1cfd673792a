use core::fmt;

use crate::storage::Handle;

/// Errors reported by the containers in this crate.
///
/// Every operation that returns one of these has left the container exactly
/// as it was before the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The reserved key `0` was used as a real key.
    NullKey,
    /// Doubling the slot array would overflow `usize`.
    CapacityOverflow,
    /// No value is stored under this handle.
    InvalidHandle(Handle),
    /// The handle counter reached `u64::MAX`.
    HandlesExhausted,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NullKey => f.write_str("key 0 is reserved for empty slots"),
            Error::CapacityOverflow => f.write_str("hash table capacity overflow"),
            Error::InvalidHandle(handle) => write!(f, "no value stored for handle {handle}"),
            Error::HandlesExhausted => f.write_str("handle counter exhausted"),
        }
    }
}

impl core::error::Error for Error {}

#[cfg(test)]
mod tests {
    use alloc::string::ToString;

    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            Error::NullKey.to_string(),
            "key 0 is reserved for empty slots"
        );
        assert_eq!(
            Error::InvalidHandle(Handle::from_raw(7)).to_string(),
            "no value stored for handle #7"
        );
    }
}
