//! Scoped host-runtime yield.
//!
//! When daqwire is embedded under a host language runtime that gates worker
//! threads behind a global lock, that lock must be released for the duration
//! of any blocking call, or the pipeline deadlocks against host callbacks.
//! [`ScopedRelease`] is the RAII marker for such a region. In a pure-Rust
//! build there is no host lock and the guard is a no-op.
//!
//! Acquisition sites (kept in sync with the implementation):
//! - pool lock paths (`Pool::alloc_buffer`, `Pool::ret_buffer`)
//! - device readiness waits and transmits in `DmaStream`
//! - the memory-map window lock in `MappedMemory`
//! - the transaction-completion wait in `memory::Master`

/// Marker guard for a region where the host-runtime lock is released.
///
/// Construct at the top of a blocking region; the lock is reacquired when
/// the guard drops. Without a host runtime both edges are no-ops.
#[must_use = "the release lasts only while the guard is alive"]
pub struct ScopedRelease {
    _priv: (),
}

impl ScopedRelease {
    /// Release the host lock (if any) until the guard drops.
    pub fn new() -> Self {
        ScopedRelease { _priv: () }
    }
}

impl Default for ScopedRelease {
    fn default() -> Self {
        Self::new()
    }
}
