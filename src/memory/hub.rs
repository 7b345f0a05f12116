//! Hub: an address-translating forwarder.
//!
//! A hub sits between masters and a downstream slave, OR-ing its offset
//! into every transaction address on the way down. The offset is a
//! bit-aligned page address, not an additive displacement, which is why
//! composition uses bitwise OR: stacked hubs each contribute disjoint
//! address bits. Access-bound and address queries compose through the
//! stack, so a master above any number of hubs sees the backend's true
//! bounds and its fully-composed base address.

use std::sync::Arc;

use crate::memory::{AccessType, MemoryMaster, MemorySlave};

/// Address-translating forwarder; both a memory master and a memory slave.
///
/// Stateless apart from the offset and the downstream link; hubs may be
/// freely interposed and stacked.
pub struct Hub {
    offset: u64,
    downstream: Arc<dyn MemorySlave>,
}

impl Hub {
    /// Create a hub applying `offset` above `downstream`.
    pub fn new(offset: u64, downstream: Arc<dyn MemorySlave>) -> Self {
        Hub { offset, downstream }
    }

    /// The offset OR'd into forwarded addresses.
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

impl MemorySlave for Hub {
    fn min_access(&self) -> u32 {
        self.downstream.min_access()
    }

    fn max_access(&self) -> u32 {
        self.downstream.max_access()
    }

    fn address(&self) -> u64 {
        self.downstream.address() | self.offset
    }

    fn do_transaction(
        &self,
        id: u32,
        master: &Arc<dyn MemoryMaster>,
        address: u64,
        size: u32,
        access: AccessType,
    ) {
        self.downstream
            .do_transaction(id, master, self.offset | address, size, access);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Records the one transaction it sees.
    struct Probe {
        seen: Mutex<Option<(u32, u64, u32, AccessType)>>,
    }

    impl Probe {
        fn new() -> Arc<Self> {
            Arc::new(Probe {
                seen: Mutex::new(None),
            })
        }
    }

    impl MemorySlave for Probe {
        fn min_access(&self) -> u32 {
            4
        }
        fn max_access(&self) -> u32 {
            0x1000
        }
        fn address(&self) -> u64 {
            0
        }
        fn do_transaction(
            &self,
            id: u32,
            master: &Arc<dyn MemoryMaster>,
            address: u64,
            size: u32,
            access: AccessType,
        ) {
            *self.seen.lock() = Some((id, address, size, access));
            master.done_transaction(id, 0);
        }
    }

    struct NullMaster;
    impl MemoryMaster for NullMaster {
        fn done_transaction(&self, _id: u32, _status: u32) {}
        fn set_transaction_data(&self, _id: u32, _offset: usize, _data: &[u8]) {}
        fn get_transaction_data(&self, _id: u32, _offset: usize, _data: &mut [u8]) {}
    }

    #[test]
    fn test_offset_is_ored_into_address() {
        let probe = Probe::new();
        let hub = Hub::new(0x4000_0000, probe.clone());

        let master: Arc<dyn MemoryMaster> = Arc::new(NullMaster);
        hub.do_transaction(9, &master, 0x124, 4, AccessType::Read);

        let seen = probe.seen.lock().unwrap();
        assert_eq!(seen.0, 9);
        assert_eq!(seen.1, 0x4000_0124);
        assert_eq!(seen.2, 4);
        assert_eq!(seen.3, AccessType::Read);
    }

    #[test]
    fn test_stacked_hubs_compose() {
        let probe = Probe::new();
        let low = Arc::new(Hub::new(0x4000_0000, probe.clone()));
        let high = Hub::new(0x0001_0000, low);

        let master: Arc<dyn MemoryMaster> = Arc::new(NullMaster);
        high.do_transaction(1, &master, 0x8, 4, AccessType::Write);

        let seen = probe.seen.lock().unwrap();
        assert_eq!(seen.1, 0x4001_0008);
        assert_eq!(high.address(), 0x4001_0000);
    }

    #[test]
    fn test_bounds_forwarded_from_backend() {
        let probe = Probe::new();
        let hub = Hub::new(0x100, probe);
        assert_eq!(hub.min_access(), 4);
        assert_eq!(hub.max_access(), 0x1000);
    }
}
