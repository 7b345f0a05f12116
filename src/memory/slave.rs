//! Memory slave: responder endpoint of the register-transaction graph.

use std::sync::Arc;

use crate::memory::{status, AccessType, MemoryMaster};

/// Responder endpoint of the register-transaction graph.
///
/// A slave declares its access granularity and executes transactions,
/// pulling write payload from and pushing read payload to the originating
/// master's back-channel. `done_transaction` must be called exactly once
/// per request, after all data movement for that request.
pub trait MemorySlave: Send + Sync {
    /// Smallest legal access in bytes; transaction sizes must be a
    /// multiple of this.
    fn min_access(&self) -> u32;

    /// Largest legal access in bytes.
    fn max_access(&self) -> u32;

    /// Base address this endpoint occupies in the composed address space.
    /// Hubs OR their offset into this on the way up.
    fn address(&self) -> u64 {
        0
    }

    /// Execute a transaction. `master` is the back-channel for payload and
    /// completion.
    fn do_transaction(
        &self,
        id: u32,
        master: &Arc<dyn MemoryMaster>,
        address: u64,
        size: u32,
        access: AccessType,
    );
}

/// Declared access bounds plus the shared size check backends use before
/// touching hardware.
#[derive(Debug, Clone, Copy)]
pub struct AccessBounds {
    pub min_access: u32,
    pub max_access: u32,
}

impl AccessBounds {
    pub fn new(min_access: u32, max_access: u32) -> Self {
        AccessBounds {
            min_access,
            max_access,
        }
    }

    /// Validate a transaction size against the bounds. Returns the status
    /// code to complete with on violation.
    pub fn check_size(&self, size: u32) -> Option<u32> {
        if size == 0 || size % self.min_access != 0 || size > self.max_access {
            Some(status::SIZE_ERROR)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_check() {
        let bounds = AccessBounds::new(4, 0x1000);
        assert_eq!(bounds.check_size(4), None);
        assert_eq!(bounds.check_size(64), None);
        assert_eq!(bounds.check_size(0), Some(status::SIZE_ERROR));
        assert_eq!(bounds.check_size(6), Some(status::SIZE_ERROR));
        assert_eq!(bounds.check_size(0x1004), Some(status::SIZE_ERROR));
    }
}
