//! Transaction vocabulary for the register-access fabric.
//!
//! Completion travels as a status word through
//! [`MemoryMaster::done_transaction`](super::MemoryMaster::done_transaction),
//! never as an [`Error`](crate::Error): a failed register access is a normal
//! outcome of the fabric, not a fault of the caller.

/// Access type of a register transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessType {
    /// Read `size` bytes.
    Read,
    /// Write `size` bytes and await completion.
    Write,
    /// Write `size` bytes, fire-and-forget: no completion is required
    /// before the master moves on.
    Post,
    /// Read back after a prior write for comparison.
    Verify,
}

impl AccessType {
    /// True for the data directions where the slave pulls payload from the
    /// master (`Write` and `Post`).
    pub fn is_write(self) -> bool {
        matches!(self, AccessType::Write | AccessType::Post)
    }
}

/// Completion status codes.
pub mod status {
    /// Transaction completed.
    pub const OK: u32 = 0;
    /// The slave-side wait elapsed.
    pub const TIMEOUT: u32 = 1;
    /// Read-back after write did not match.
    pub const VERIFY_ERROR: u32 = 2;
    /// No mapping covers the addressed range.
    pub const ADDRESS_ERROR: u32 = 3;
    /// Bus-level timeout reported by hardware.
    pub const BUS_TIMEOUT: u32 = 4;
    /// Bus-level failure reported by hardware.
    pub const BUS_FAIL: u32 = 5;
    /// The access type is not supported by this slave.
    pub const UNSUPPORTED: u32 = 6;
    /// Size is not a multiple of the minimum access or exceeds the maximum.
    pub const SIZE_ERROR: u32 = 7;

    /// Human-readable name for a status code.
    pub fn name(code: u32) -> &'static str {
        match code {
            OK => "ok",
            TIMEOUT => "timeout",
            VERIFY_ERROR => "verify error",
            ADDRESS_ERROR => "address error",
            BUS_TIMEOUT => "bus timeout",
            BUS_FAIL => "bus failure",
            UNSUPPORTED => "unsupported access",
            SIZE_ERROR => "size error",
            _ => "unknown status",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_directions() {
        assert!(AccessType::Write.is_write());
        assert!(AccessType::Post.is_write());
        assert!(!AccessType::Read.is_write());
        assert!(!AccessType::Verify.is_write());
    }

    #[test]
    fn test_status_names() {
        assert_eq!(status::name(status::OK), "ok");
        assert_eq!(status::name(status::ADDRESS_ERROR), "address error");
        assert_eq!(status::name(999), "unknown status");
    }
}
