//! Pool: issuer and reclaimer of buffers.
//!
//! A pool hands out [`Buffer`]s backed by heap regions and takes the regions
//! back when the buffers drop. With [`Pool::en_buffer_pool`] it recycles
//! regions of one fixed size through a bounded free stack instead of
//! releasing them to the allocator, which keeps a steady-state pipeline free
//! of per-frame allocations.
//!
//! The pool is a cheap-clone handle over shared state; buffers keep the
//! state alive through their owner `Arc`, so a pool may be dropped while its
//! buffers are still in flight.
//!
//! Device adapters build on the same accounting: they wrap kernel-pinned
//! regions with [`Pool::create_buffer`] and route the drop path through
//! their own [`BufferReturn`] so indices go back to the driver.

use std::sync::Arc;

use bytes::BytesMut;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::host::ScopedRelease;
use crate::stream::buffer::{Buffer, BufferReturn, Storage};
use crate::stream::Frame;

/// Issues buffers and reclaims their regions.
///
/// Clones share the same state (and the same counters).
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

pub(crate) struct PoolInner {
    state: Mutex<PoolState>,
}

struct PoolState {
    /// Next 24-bit buffer id, wraps at 2^24.
    alloc_meta: u32,
    /// Bytes currently out with live buffers.
    alloc_bytes: usize,
    /// Buffers currently live.
    alloc_count: usize,
    /// Head room applied to future allocations.
    head_room: usize,
    /// Recycling region size; 0 disables recycling.
    fixed_size: usize,
    /// Recycling stack depth limit.
    max_count: usize,
    /// Free stack of fixed-size regions (LIFO).
    queue: Vec<BytesMut>,
}

impl Pool {
    /// Create a pool with no recycling and no head room.
    pub fn new() -> Self {
        Pool {
            inner: Arc::new(PoolInner {
                state: Mutex::new(PoolState {
                    alloc_meta: 0,
                    alloc_bytes: 0,
                    alloc_count: 0,
                    head_room: 0,
                    fixed_size: 0,
                    max_count: 0,
                    queue: Vec::new(),
                }),
            }),
        }
    }

    /// Bytes currently out with live buffers.
    pub fn alloc_bytes(&self) -> usize {
        self.inner.state.lock().alloc_bytes
    }

    /// Buffers currently live.
    pub fn alloc_count(&self) -> usize {
        self.inner.state.lock().alloc_count
    }

    /// Head room applied to future allocations.
    pub fn head_room(&self) -> usize {
        self.inner.state.lock().head_room
    }

    /// Reserve a header prefix in every buffer allocated from now on.
    /// Existing buffers are unaffected; each buffer's head room is fixed at
    /// creation.
    pub fn set_head_room(&self, head_room: usize) {
        self.inner.state.lock().head_room = head_room;
    }

    /// Enable fixed-size recycling: returned regions of exactly `size`
    /// bytes are kept on a free stack up to `count` deep and reused before
    /// the allocator is asked again.
    ///
    /// May be called at most once; a second call fails.
    pub fn en_buffer_pool(&self, size: usize, count: usize) -> Result<()> {
        let mut state = self.inner.state.lock();
        if state.fixed_size != 0 {
            return Err(Error::general(
                "Pool::en_buffer_pool",
                "fixed-size recycling can only be enabled once",
            ));
        }
        state.fixed_size = size;
        state.max_count = count;
        Ok(())
    }

    /// Accept a frame request. Called from a master needing `size` bytes of
    /// capacity.
    ///
    /// Buffers are allocated until the frame's capacity reaches `size`: one
    /// buffer of `size` bytes when `max_buf` is zero, otherwise buffers of
    /// `max_buf` bytes. The `zero_copy` flag is a hint for device-backed
    /// pools; this pool ignores it.
    pub fn accept_req(&self, size: usize, _zero_copy: bool, max_buf: usize) -> Result<Frame> {
        let mut frame = Frame::new();
        let buf_size = if max_buf == 0 { size } else { max_buf };

        let mut total = 0;
        while total < size {
            frame.append_buffer(self.alloc_buffer(buf_size, Some(&mut total))?);
        }
        Ok(frame)
    }

    /// Allocate one buffer of up to `size` bytes.
    ///
    /// With recycling enabled the region size is the fixed size regardless
    /// of `size`. A queued region is reused when present; otherwise a fresh
    /// region is allocated. `total`, when passed, accumulates the usable
    /// payload capacity for `accept_req` loops.
    ///
    /// Normally reached through [`Pool::accept_req`]; exposed for adapters
    /// that fill buffers directly.
    pub fn alloc_buffer(&self, size: usize, total: Option<&mut usize>) -> Result<Buffer> {
        let _yield = ScopedRelease::new();
        let mut state = self.inner.state.lock();

        let alloc = if state.fixed_size > 0 {
            state.fixed_size
        } else {
            size
        };

        let region = match state.queue.pop() {
            // Recycled regions keep their full length; contents are stale.
            Some(region) => region,
            None => {
                if alloc == 0 {
                    return Err(Error::allocation("Pool::alloc_buffer", 0));
                }
                let mut region = BytesMut::with_capacity(alloc);
                region.resize(alloc, 0);
                region
            }
        };

        let meta = state.alloc_meta;
        state.alloc_meta = (state.alloc_meta + 1) & 0x00FF_FFFF;
        state.alloc_bytes += alloc;
        state.alloc_count += 1;

        let head_room = state.head_room.min(alloc);
        drop(state);

        if let Some(total) = total {
            *total += alloc - head_room;
        }

        Ok(Buffer::new(
            self.inner.clone(),
            Storage::Pooled(region),
            meta,
            alloc,
            head_room,
        ))
    }

    /// Wrap externally owned storage (a kernel-pinned DMA region) in a
    /// buffer counted against this pool. The drop path goes through `owner`,
    /// not the pool, so adapters can return device indices.
    pub fn create_buffer(
        &self,
        owner: Arc<dyn BufferReturn>,
        storage: Storage,
        meta: u32,
        raw_size: usize,
    ) -> Buffer {
        let head_room = {
            let mut state = self.inner.state.lock();
            state.alloc_bytes += raw_size;
            state.alloc_count += 1;
            state.head_room.min(raw_size)
        };
        Buffer::new(owner, storage, meta, raw_size, head_room)
    }

    /// Route a return into the pool's recycling path on behalf of an
    /// adapter that owns the drop path but received plain pooled storage.
    pub(crate) fn ret_storage(&self, storage: Option<Storage>, meta: u32, raw_size: usize) {
        self.inner.ret_buffer(storage, meta, raw_size);
    }

    /// Drop the accounting for a buffer whose storage went elsewhere (a
    /// device index return). Adapters call this from their return path.
    pub fn dec_counter(&self, raw_size: usize) {
        let mut state = self.inner.state.lock();
        state.alloc_bytes = state.alloc_bytes.saturating_sub(raw_size);
        state.alloc_count = state.alloc_count.saturating_sub(1);
    }
}

impl Default for Pool {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferReturn for PoolInner {
    /// Buffer drop path. Must not fail: anomalies are logged and swallowed.
    fn ret_buffer(&self, storage: Option<Storage>, _meta: u32, raw_size: usize) {
        let _yield = ScopedRelease::new();
        let mut state = self.state.lock();

        match storage {
            Some(Storage::Pooled(region)) => {
                if raw_size == state.fixed_size && state.queue.len() < state.max_count {
                    state.queue.push(region);
                }
                // else: region drops here, back to the allocator
            }
            Some(Storage::Device(_)) => {
                // Device storage must be routed through its adapter; a pool
                // cannot return an index.
                tracing::warn!(raw_size, "device buffer returned to plain pool");
            }
            None => {}
        }

        state.alloc_bytes = state.alloc_bytes.saturating_sub(raw_size);
        state.alloc_count = state.alloc_count.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_track_live_buffers() {
        let pool = Pool::new();
        assert_eq!(pool.alloc_count(), 0);
        assert_eq!(pool.alloc_bytes(), 0);

        let a = pool.alloc_buffer(100, None).unwrap();
        let b = pool.alloc_buffer(50, None).unwrap();
        assert_eq!(pool.alloc_count(), 2);
        assert_eq!(pool.alloc_bytes(), 150);

        drop(a);
        assert_eq!(pool.alloc_count(), 1);
        assert_eq!(pool.alloc_bytes(), 50);

        drop(b);
        assert_eq!(pool.alloc_count(), 0);
        assert_eq!(pool.alloc_bytes(), 0);
    }

    #[test]
    fn test_meta_ids_unique_and_wrapping() {
        let pool = Pool::new();
        let a = pool.alloc_buffer(8, None).unwrap();
        let b = pool.alloc_buffer(8, None).unwrap();
        assert_ne!(a.meta(), b.meta());
        assert_eq!(a.meta(), 0);
        assert_eq!(b.meta(), 1);
    }

    #[test]
    fn test_accept_req_single_buffer() {
        let pool = Pool::new();
        let frame = pool.accept_req(1000, false, 0).unwrap();
        assert_eq!(frame.count(), 1);
        assert_eq!(frame.available(), 1000);
    }

    #[test]
    fn test_accept_req_split_by_max_buf() {
        let pool = Pool::new();
        let frame = pool.accept_req(1000, false, 256).unwrap();
        assert_eq!(frame.count(), 4);
        assert!(frame.available() >= 1000);
    }

    #[test]
    fn test_en_buffer_pool_twice_fails() {
        let pool = Pool::new();
        pool.en_buffer_pool(1024, 4).unwrap();
        assert!(pool.en_buffer_pool(1024, 4).is_err());
    }

    #[test]
    fn test_recycling_scenario() {
        // en_buffer_pool(1024, 2); alloc a, b, c; drop all; alloc d, e.
        // The free stack holds the first two returns (a then b); c's
        // return finds the stack full and releases its region.
        let pool = Pool::new();
        pool.en_buffer_pool(1024, 2).unwrap();

        let a = pool.alloc_buffer(1024, None).unwrap();
        let b = pool.alloc_buffer(1024, None).unwrap();
        let c = pool.alloc_buffer(1024, None).unwrap();

        let a_ptr = a.raw_data().as_ptr() as usize;
        let b_ptr = b.raw_data().as_ptr() as usize;

        drop(a); // queued
        drop(b); // queued
        drop(c); // queue full, released

        let d = pool.alloc_buffer(1024, None).unwrap();
        let e = pool.alloc_buffer(1024, None).unwrap();

        // LIFO: d gets b's region, e gets a's region.
        assert_eq!(d.raw_data().as_ptr() as usize, b_ptr);
        assert_eq!(e.raw_data().as_ptr() as usize, a_ptr);

        assert_eq!(pool.alloc_count(), 2);
        assert_eq!(pool.alloc_bytes(), 2048);
    }

    #[test]
    fn test_fixed_size_overrides_request() {
        let pool = Pool::new();
        pool.en_buffer_pool(512, 4).unwrap();
        let buff = pool.alloc_buffer(100, None).unwrap();
        assert_eq!(buff.raw_size(), 512);
    }

    #[test]
    fn test_recycled_region_keeps_full_length() {
        let pool = Pool::new();
        pool.en_buffer_pool(256, 1).unwrap();

        let first = pool.alloc_buffer(256, None).unwrap();
        drop(first);

        let mut second = pool.alloc_buffer(256, None).unwrap();
        assert_eq!(second.raw_size(), 256);
        // The whole region must be addressable after recycling.
        second.payload_data_mut()[255] = 0x42;
        second.set_payload(256).unwrap();
    }

    #[test]
    fn test_accept_req_counts_usable_capacity_with_head_room() {
        let pool = Pool::new();
        pool.set_head_room(16);

        // 64-byte regions carry 48 usable bytes each; 100 bytes of
        // capacity need three of them.
        let frame = pool.accept_req(100, false, 64).unwrap();
        assert_eq!(frame.count(), 3);
        assert!(frame.available() >= 100);
    }

    #[test]
    fn test_pool_survives_buffer_outliving_handle() {
        let pool = Pool::new();
        let buff = pool.alloc_buffer(32, None).unwrap();
        drop(pool);
        // The owner Arc keeps the shared state alive; dropping the buffer
        // must not crash.
        drop(buff);
    }

    #[test]
    fn test_zero_size_allocation_rejected() {
        let pool = Pool::new();
        assert!(pool.alloc_buffer(0, None).is_err());
    }
}
