//! Buffer: one contiguous byte region with head room and a payload cursor.
//!
//! Buffers never allocate their own storage. A [`Pool`](super::Pool) hands
//! out either a recycled heap region (`BytesMut`) or, for zero-copy device
//! adapters, a raw pointer into a kernel-pinned DMA table. On drop the
//! buffer notifies its issuing pool exactly once with
//! `(storage, meta, raw_size)` so the region can be recycled or, for device
//! buffers, the index returned to the driver.
//!
//! # Meta word
//!
//! The 32-bit meta word encodes ownership and identity:
//!
//! ```text
//! ┌─────┬─────┬──────────┬──────────────────┐
//! │ b31 │ b30 │ b24..b29 │ b0..b23          │
//! │ ZC  │ SUR │ reserved │ pool/driver id   │
//! └─────┴─────┴──────────┴──────────────────┘
//! ```
//!
//! - bit 31 (`META_ZERO_COPY`): the region is kernel-pinned; bits 0-23 hold
//!   the driver buffer index.
//! - bit 30 (`META_SURRENDERED`): the index has already been handed to the
//!   device by a transmit and must not be returned again.
//!
//! The encoding is fixed so mixed in-flight buffers allocated by different
//! adapters can be drained by any of them.

use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

use bytes::BytesMut;

use crate::error::{Error, Result};

/// Bit 31: region is kernel-pinned, identified by the index in bits 0-23.
pub const META_ZERO_COPY: u32 = 0x8000_0000;
/// Bit 30: index already surrendered to the device by a transmit.
pub const META_SURRENDERED: u32 = 0x4000_0000;
/// Bits 0-23: pool- or driver-assigned buffer id.
pub const META_ID_MASK: u32 = 0x00FF_FFFF;

/// Backing storage of a buffer.
///
/// `Pooled` regions are owned and travel back to the pool's recycling queue.
/// `Device` regions are windows into a kernel-pinned DMA table owned by the
/// driver; only the index (in the meta word) travels back.
pub enum Storage {
    Pooled(BytesMut),
    Device(NonNull<u8>),
}

/// Receiver of buffer storage on drop.
///
/// Implemented by `Pool` for heap regions and by DMA adapters, which route
/// device indices back to the driver instead. Held by every live buffer as
/// an `Arc`, which keeps the issuer alive until its last buffer is dropped.
pub trait BufferReturn: Send + Sync {
    fn ret_buffer(&self, storage: Option<Storage>, meta: u32, raw_size: usize);
}

/// One contiguous byte region with reserved head room and a payload cursor.
///
/// Offsets in the payload API are relative to the end of the head room. The
/// head room is fixed at creation; protocol layers that prepend headers
/// write into it through [`raw_data_mut`](Buffer::raw_data_mut).
///
/// Buffers are not thread safe; ownership moves between threads only inside
/// the [`Frame`](super::Frame) that contains them.
pub struct Buffer {
    /// Taken on drop so the owner is notified exactly once.
    storage: Option<Storage>,
    raw_size: usize,
    head_room: usize,
    payload: usize,
    flags: u32,
    error: u32,
    meta: u32,
    owner: Arc<dyn BufferReturn>,
}

// SAFETY: `Storage::Device` pointers reference kernel-pinned DMA regions
// that stay mapped for the lifetime of the issuing adapter, and the adapter
// is kept alive by the `owner` Arc. The buffer has exclusive access to its
// region (single ownership, no aliasing), so moving it between threads is
// sound.
unsafe impl Send for Buffer {}

impl Buffer {
    /// Wrap storage handed out by a pool or adapter. Crate-internal;
    /// construction goes through `Pool`.
    pub(crate) fn new(
        owner: Arc<dyn BufferReturn>,
        storage: Storage,
        meta: u32,
        raw_size: usize,
        head_room: usize,
    ) -> Self {
        debug_assert!(head_room <= raw_size);
        Buffer {
            storage: Some(storage),
            raw_size,
            head_room,
            payload: 0,
            flags: 0,
            error: 0,
            meta,
            owner,
        }
    }

    /// Full region including head room.
    pub fn raw_data(&self) -> &[u8] {
        match self.storage.as_ref().expect("storage present until drop") {
            Storage::Pooled(region) => &region[..self.raw_size],
            // SAFETY: the device region is `raw_size` bytes, mapped for the
            // adapter lifetime (see the Send impl note).
            Storage::Device(ptr) => unsafe {
                std::slice::from_raw_parts(ptr.as_ptr(), self.raw_size)
            },
        }
    }

    /// Full region including head room, mutable.
    pub fn raw_data_mut(&mut self) -> &mut [u8] {
        let raw_size = self.raw_size;
        match self.storage.as_mut().expect("storage present until drop") {
            Storage::Pooled(region) => &mut region[..raw_size],
            // SAFETY: as above; &mut self guarantees exclusive access.
            Storage::Device(ptr) => unsafe {
                std::slice::from_raw_parts_mut(ptr.as_ptr(), raw_size)
            },
        }
    }

    /// Payload area: the region past the head room, up to capacity.
    pub fn payload_data(&self) -> &[u8] {
        &self.raw_data()[self.head_room..]
    }

    /// Payload area, mutable.
    pub fn payload_data_mut(&mut self) -> &mut [u8] {
        let head = self.head_room;
        &mut self.raw_data_mut()[head..]
    }

    /// Bytes currently used in payload space.
    pub fn payload(&self) -> usize {
        self.payload
    }

    /// Set the used payload length.
    ///
    /// Fails with a Boundary error past `raw_size - head_room`.
    pub fn set_payload(&mut self, size: usize) -> Result<()> {
        let limit = self.raw_size - self.head_room;
        if size > limit {
            return Err(Error::boundary("Buffer::set_payload", size, limit));
        }
        self.payload = size;
        Ok(())
    }

    /// Capacity of the full region including head room.
    pub fn raw_size(&self) -> usize {
        self.raw_size
    }

    /// Reserved prefix for protocol headers. Immutable after creation.
    pub fn head_room(&self) -> usize {
        self.head_room
    }

    /// Payload capacity still unused: `raw_size - head_room - payload`.
    pub fn available(&self) -> usize {
        self.raw_size - self.head_room - self.payload
    }

    /// Per-buffer sideband flags (link user fields and the like).
    pub fn flags(&self) -> u32 {
        self.flags
    }

    /// Set the per-buffer sideband flags.
    pub fn set_flags(&mut self, flags: u32) {
        self.flags = flags;
    }

    /// Per-buffer error word.
    pub fn error(&self) -> u32 {
        self.error
    }

    /// Set the per-buffer error word.
    pub fn set_error(&mut self, error: u32) {
        self.error = error;
    }

    /// Meta word (see module docs for the bit layout).
    pub fn meta(&self) -> u32 {
        self.meta
    }

    /// Replace the meta word. Adapters use this to mark a zero-copy buffer
    /// surrendered after a transmit-by-index.
    pub fn set_meta(&mut self, meta: u32) {
        self.meta = meta;
    }

    /// True when the region is kernel-pinned (meta bit 31).
    pub fn is_zero_copy(&self) -> bool {
        self.meta & META_ZERO_COPY != 0
    }

    /// True when the index is already with the device (meta bit 30). A
    /// surrendered buffer must not be touched by user code.
    pub fn is_surrendered(&self) -> bool {
        self.meta & META_SURRENDERED != 0
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("raw_size", &self.raw_size)
            .field("head_room", &self.head_room)
            .field("payload", &self.payload)
            .field("error", &self.error)
            .field("meta", &format_args!("{:#010x}", self.meta))
            .finish()
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        // Exactly one notification: storage is taken, never re-set.
        let storage = self.storage.take();
        self.owner.ret_buffer(storage, self.meta, self.raw_size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::Pool;

    #[test]
    fn test_payload_accounting() {
        let pool = Pool::new();
        let mut buff = pool.alloc_buffer(128, None).unwrap();

        assert_eq!(buff.raw_size(), 128);
        assert_eq!(buff.head_room(), 0);
        assert_eq!(buff.payload(), 0);
        assert_eq!(buff.available(), 128);

        buff.set_payload(100).unwrap();
        assert_eq!(buff.payload(), 100);
        assert_eq!(buff.available(), 28);
    }

    #[test]
    fn test_set_payload_past_capacity_rejected() {
        let pool = Pool::new();
        let mut buff = pool.alloc_buffer(64, None).unwrap();
        assert!(buff.set_payload(65).is_err());
        // state unchanged on failure
        assert_eq!(buff.payload(), 0);
    }

    #[test]
    fn test_head_room_subtracts_from_payload_space() {
        let pool = Pool::new();
        pool.set_head_room(16);
        let mut buff = pool.alloc_buffer(64, None).unwrap();

        assert_eq!(buff.head_room(), 16);
        assert_eq!(buff.available(), 48);
        assert_eq!(buff.payload_data().len(), 48);
        assert!(buff.set_payload(49).is_err());
        buff.set_payload(48).unwrap();
    }

    #[test]
    fn test_payload_data_offset_by_head_room() {
        let pool = Pool::new();
        pool.set_head_room(4);
        let mut buff = pool.alloc_buffer(16, None).unwrap();

        buff.payload_data_mut()[0] = 0xAB;
        assert_eq!(buff.raw_data()[4], 0xAB);
        assert_eq!(buff.raw_data()[0], 0);
    }

    #[test]
    fn test_flags_roundtrip() {
        let pool = Pool::new();
        let mut buff = pool.alloc_buffer(8, None).unwrap();
        assert_eq!(buff.flags(), 0);
        buff.set_flags(0x0201);
        assert_eq!(buff.flags(), 0x0201);
    }

    #[test]
    fn test_meta_bits() {
        let pool = Pool::new();
        let mut buff = pool.alloc_buffer(8, None).unwrap();

        assert!(!buff.is_zero_copy());
        assert!(!buff.is_surrendered());

        buff.set_meta(META_ZERO_COPY | 7);
        assert!(buff.is_zero_copy());
        assert!(!buff.is_surrendered());
        assert_eq!(buff.meta() & META_ID_MASK, 7);

        buff.set_meta(buff.meta() | META_SURRENDERED);
        assert!(buff.is_surrendered());
    }
}
