//! Stream consumer side.
//!
//! A [`FrameSlave`] accepts frames pushed by an upstream master and serves
//! the inverted control path: masters *request* frames from their primary
//! slave before filling them, which is what lets a device-backed slave hand
//! out kernel-pinned buffers for end-to-end zero copy.
//!
//! [`Receiver`] is the terminal slave: it counts frames and bytes and can
//! hex-dump leading payload bytes for debugging. Protocol layers implement
//! [`FrameSlave`] themselves and usually delegate `accept_req` to an owned
//! [`Pool`].

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Result;
use crate::stream::{Frame, Pool};

/// Consumer endpoint of the stream graph.
///
/// `accept_frame` receives a frame by mutable reference: the producer hands
/// over logical ownership for the duration of the call, one slave at a
/// time. Fan-out consumers (a frame broadcast to several slaves) must treat
/// the frame as read-only.
pub trait FrameSlave: Send + Sync {
    /// Serve a frame request from an upstream master. `zero_copy` is a
    /// hint; implementations without pinned memory ignore it.
    fn accept_req(&self, size: usize, zero_copy: bool, max_buf: usize) -> Result<Frame>;

    /// Accept a frame pushed by an upstream master. Device-backed slaves
    /// surface transmit failures (timeout, link write) here.
    fn accept_frame(&self, frame: &mut Frame) -> Result<()>;
}

/// Counting terminal slave.
///
/// Tracks frames and bytes received; with a debug limit set, logs a hex
/// dump of each frame's leading bytes.
pub struct Receiver {
    pool: Pool,
    frame_count: AtomicU64,
    byte_count: AtomicU64,
    debug: usize,
}

impl Receiver {
    /// Create a receiver with no debug dump.
    pub fn new() -> Self {
        Receiver {
            pool: Pool::new(),
            frame_count: AtomicU64::new(0),
            byte_count: AtomicU64::new(0),
            debug: 0,
        }
    }

    /// Create a receiver that logs up to `debug` leading payload bytes of
    /// every frame.
    pub fn with_debug(debug: usize) -> Self {
        Receiver {
            debug,
            ..Receiver::new()
        }
    }

    /// Frames received so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_count.load(Ordering::Relaxed)
    }

    /// Payload bytes received so far.
    pub fn byte_count(&self) -> u64 {
        self.byte_count.load(Ordering::Relaxed)
    }

    /// The pool backing `accept_req`.
    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

impl Default for Receiver {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSlave for Receiver {
    fn accept_req(&self, size: usize, zero_copy: bool, max_buf: usize) -> Result<Frame> {
        self.pool.accept_req(size, zero_copy, max_buf)
    }

    fn accept_frame(&self, frame: &mut Frame) -> Result<()> {
        self.frame_count.fetch_add(1, Ordering::Relaxed);
        self.byte_count
            .fetch_add(frame.payload() as u64, Ordering::Relaxed);

        if self.debug > 0 {
            let take = self.debug.min(frame.payload());
            let mut head = vec![0u8; take];
            if frame.read(0, &mut head).is_ok() {
                tracing::debug!(
                    payload = frame.payload(),
                    error = frame.error(),
                    data = ?head,
                    "frame received"
                );
            }
        }
        Ok(())
    }
}
