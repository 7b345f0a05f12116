//! Stream producer side.
//!
//! A [`Master`] pushes frames to any number of attached slaves and requests
//! empty frames from its *primary* slave (the first attached) so that a
//! device-backed consumer can supply zero-copy buffers. With no slave
//! attached, requests fall back to a local pool.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::Result;
use crate::stream::{Frame, FrameSlave, Pool};

/// Producer endpoint of the stream graph.
pub struct Master {
    slaves: RwLock<Vec<Arc<dyn FrameSlave>>>,
    /// Serves requests when no slave is attached.
    default_pool: Pool,
}

impl Master {
    /// Create a master with no attached slaves.
    pub fn new() -> Self {
        Master {
            slaves: RwLock::new(Vec::new()),
            default_pool: Pool::new(),
        }
    }

    /// Attach a slave. The first slave attached becomes the primary and
    /// serves frame requests; every attached slave receives frames.
    pub fn add_slave(&self, slave: Arc<dyn FrameSlave>) {
        self.slaves.write().push(slave);
    }

    /// Number of attached slaves.
    pub fn slave_count(&self) -> usize {
        self.slaves.read().len()
    }

    /// Request an empty frame with at least `size` bytes of capacity.
    ///
    /// Forwarded to the primary slave; with no slave attached, served from
    /// the master's local pool. `zero_copy` hints that kernel-pinned
    /// buffers are acceptable; `max_buf` caps individual buffer sizes
    /// (0 = single buffer).
    pub fn req_frame(&self, size: usize, zero_copy: bool, max_buf: usize) -> Result<Frame> {
        let primary = self.slaves.read().first().cloned();
        match primary {
            Some(slave) => slave.accept_req(size, zero_copy, max_buf),
            None => self.default_pool.accept_req(size, zero_copy, max_buf),
        }
    }

    /// Push a frame to every attached slave, in attach order.
    ///
    /// Slaves run on the caller's thread, one after another; a frame shared
    /// across several slaves must not be mutated by any of them. Within one
    /// producer-consumer path, frames arrive in `send_frame` call order.
    /// The first slave failure aborts the broadcast and propagates.
    pub fn send_frame(&self, frame: &mut Frame) -> Result<()> {
        let slaves = self.slaves.read().clone();
        for slave in &slaves {
            slave.accept_frame(frame)?;
        }
        Ok(())
    }
}

impl Default for Master {
    fn default() -> Self {
        Self::new()
    }
}
