//! Memory master: requester endpoint of the register-transaction graph.
//!
//! The split between the [`MemoryMaster`] back-channel trait and the
//! concrete blocking [`Master`] mirrors the stream side: slaves only ever
//! see the back-channel, through which they pull write payload, push read
//! payload and finally complete the transaction. The ordering contract is
//! data first, `done_transaction` last; data arriving after completion is
//! dropped with a warning.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex, RwLock};

use crate::error::{Error, Result};
use crate::host::ScopedRelease;
use crate::memory::{status, AccessType, MemorySlave};

/// Back-channel every memory slave uses to move payload and complete a
/// transaction. Offsets and slice lengths are in bytes; slices arrive in
/// multiples of the slave's declared access width.
pub trait MemoryMaster: Send + Sync {
    /// Complete transaction `id` with a status code (0 = ok). Called
    /// exactly once per request, after all data movement.
    fn done_transaction(&self, id: u32, status: u32);

    /// Push read payload into the master's transaction buffer.
    fn set_transaction_data(&self, id: u32, offset: usize, data: &[u8]);

    /// Pull write payload from the master's transaction buffer.
    fn get_transaction_data(&self, id: u32, offset: usize, data: &mut [u8]);
}

/// One in-flight transaction.
struct Pending {
    data: Vec<u8>,
    status: Option<u32>,
    /// True when a caller blocks on completion; unwaited transactions
    /// (posts) are retired by `done_transaction` itself.
    waited: bool,
}

/// Shared transaction table. This is what slaves talk back to; it lives in
/// an `Arc` so a transaction can outlive the blocking call that spawned it
/// (a timed-out slave may still answer late, harmlessly).
struct MasterCore {
    pending: Mutex<HashMap<u32, Pending>>,
    cond: Condvar,
}

impl MemoryMaster for MasterCore {
    fn done_transaction(&self, id: u32, status: u32) {
        let mut pending = self.pending.lock();
        match pending.get_mut(&id) {
            Some(tran) if tran.waited => {
                tran.status = Some(status);
                self.cond.notify_all();
            }
            Some(_) => {
                // Fire-and-forget: nobody will come back for it.
                pending.remove(&id);
            }
            None => {
                tracing::warn!(id, status, "completion for unknown transaction");
            }
        }
    }

    fn set_transaction_data(&self, id: u32, offset: usize, data: &[u8]) {
        let mut pending = self.pending.lock();
        match pending.get_mut(&id) {
            Some(tran) if tran.status.is_none() => {
                let end = offset + data.len();
                if end <= tran.data.len() {
                    tran.data[offset..end].copy_from_slice(data);
                } else {
                    tracing::warn!(id, offset, len = data.len(), "read payload out of range");
                }
            }
            Some(_) => {
                // Data after completion violates the ordering contract.
                tracing::warn!(id, offset, "data push after completion dropped");
            }
            None => {
                tracing::warn!(id, offset, "data push for unknown transaction");
            }
        }
    }

    fn get_transaction_data(&self, id: u32, offset: usize, data: &mut [u8]) {
        let pending = self.pending.lock();
        match pending.get(&id) {
            Some(tran) => {
                let end = offset + data.len();
                if end <= tran.data.len() {
                    data.copy_from_slice(&tran.data[offset..end]);
                } else {
                    tracing::warn!(id, offset, len = data.len(), "write payload out of range");
                }
            }
            None => {
                tracing::warn!(id, offset, "data pull for unknown transaction");
            }
        }
    }
}

/// Blocking requester endpoint.
///
/// Issues transactions to an attached slave graph and waits for
/// completion. A nonzero completion status surfaces as
/// [`Error::Return`] carrying the status code; an elapsed wait as
/// [`Error::Timeout`].
pub struct Master {
    core: Arc<MasterCore>,
    slave: RwLock<Option<Arc<dyn MemorySlave>>>,
    next_id: AtomicU32,
    timeout: Mutex<Duration>,
}

impl Master {
    /// Create a master with the default 1 s completion timeout.
    pub fn new() -> Self {
        Master {
            core: Arc::new(MasterCore {
                pending: Mutex::new(HashMap::new()),
                cond: Condvar::new(),
            }),
            slave: RwLock::new(None),
            next_id: AtomicU32::new(1),
            timeout: Mutex::new(Duration::from_secs(1)),
        }
    }

    /// Attach the downstream slave (a hub or a backend).
    pub fn set_slave(&self, slave: Arc<dyn MemorySlave>) {
        *self.slave.write() = Some(slave);
    }

    /// Set the completion timeout.
    pub fn set_timeout(&self, timeout: Duration) {
        *self.timeout.lock() = timeout;
    }

    fn slave(&self, src: &'static str) -> Result<Arc<dyn MemorySlave>> {
        self.slave
            .read()
            .clone()
            .ok_or_else(|| Error::general(src, "no slave attached"))
    }

    /// Minimum access granularity of the attached graph.
    pub fn min_access(&self) -> Result<u32> {
        Ok(self.slave("Master::min_access")?.min_access())
    }

    /// Maximum access size of the attached graph.
    pub fn max_access(&self) -> Result<u32> {
        Ok(self.slave("Master::max_access")?.max_access())
    }

    /// Composed base address of the attached graph.
    pub fn address(&self) -> Result<u64> {
        Ok(self.slave("Master::address")?.address())
    }

    /// Blocking register read.
    pub fn read(&self, address: u64, data: &mut [u8]) -> Result<()> {
        self.transfer("Master::read", address, data, AccessType::Read)
    }

    /// Blocking read-back verify (reads into `data` like [`read`](Master::read);
    /// comparison against the expected image is the caller's).
    pub fn verify(&self, address: u64, data: &mut [u8]) -> Result<()> {
        self.transfer("Master::verify", address, data, AccessType::Verify)
    }

    /// Blocking register write.
    pub fn write(&self, address: u64, data: &[u8]) -> Result<()> {
        let slave = self.slave("Master::write")?;
        let id = self.begin(data.to_vec(), true);
        slave.do_transaction(id, &self.back_channel(), address, data.len() as u32, AccessType::Write);
        self.finish("Master::write", id).map(|_| ())
    }

    /// Fire-and-forget register write. Returns as soon as the transaction
    /// is issued; no completion is awaited.
    pub fn post(&self, address: u64, data: &[u8]) -> Result<()> {
        let slave = self.slave("Master::post")?;
        let id = self.begin(data.to_vec(), false);
        slave.do_transaction(id, &self.back_channel(), address, data.len() as u32, AccessType::Post);
        Ok(())
    }

    /// The back-channel slaves answer on.
    pub fn back_channel(&self) -> Arc<dyn MemoryMaster> {
        self.core.clone() as Arc<dyn MemoryMaster>
    }

    fn begin(&self, data: Vec<u8>, waited: bool) -> u32 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.core.pending.lock().insert(
            id,
            Pending {
                data,
                status: None,
                waited,
            },
        );
        id
    }

    fn transfer(
        &self,
        src: &'static str,
        address: u64,
        data: &mut [u8],
        access: AccessType,
    ) -> Result<()> {
        let slave = self.slave(src)?;
        let id = self.begin(vec![0u8; data.len()], true);
        slave.do_transaction(id, &self.back_channel(), address, data.len() as u32, access);
        let result = self.finish(src, id)?;
        data.copy_from_slice(&result);
        Ok(())
    }

    /// Wait for completion of `id`, retire the entry and hand back its
    /// payload buffer.
    fn finish(&self, src: &'static str, id: u32) -> Result<Vec<u8>> {
        let _yield = ScopedRelease::new();
        let timeout = *self.timeout.lock();
        let mut pending = self.core.pending.lock();

        let deadline = std::time::Instant::now() + timeout;
        while pending.get(&id).map_or(false, |t| t.status.is_none()) {
            if self
                .core
                .cond
                .wait_until(&mut pending, deadline)
                .timed_out()
            {
                pending.remove(&id);
                return Err(Error::timeout(src, timeout.as_micros() as u64));
            }
        }

        let tran = pending
            .remove(&id)
            .ok_or_else(|| Error::general(src, "transaction vanished during wait"))?;

        match tran.status {
            Some(status::OK) => Ok(tran.data),
            Some(code) => Err(Error::ret(src, status::name(code), code as i64)),
            None => Err(Error::general(src, "transaction completed without status")),
        }
    }
}

impl Default for Master {
    fn default() -> Self {
        Self::new()
    }
}
