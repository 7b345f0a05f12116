//! DMA device adapter: binds a [`DmaBackend`] to the stream graph.
//!
//! The adapter is both endpoints at once. As a slave it serves frame
//! requests with kernel-pinned buffers (zero-copy allocate) and transmits
//! accepted frames by index; as a master it runs a background receive
//! worker that assembles incoming buffers into frames and pushes them
//! downstream.
//!
//! ```text
//!                   ┌────────────── DmaStream ──────────────┐
//!   wire ──ingress──▶ receive worker ── send_frame ──▶ slaves
//!   wire ◀──egress─── accept_frame  ◀── upstream master
//!                     accept_req (zero-copy alloc) ◀──┘
//! ```
//!
//! Buffer ownership across the device boundary is tracked in the meta
//! word: bit 31 marks a kernel-pinned region, bit 30 marks an index the
//! device already owns after a transmit. The drop path returns un-
//! surrendered indices to the driver; everything else is plain pool
//! recycling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hardware::backend::{Direction, DmaBackend, DmaTable};
use crate::host::ScopedRelease;
use crate::stream::{
    BufferReturn, Frame, FrameSlave, Master, Pool, Storage, META_ID_MASK, META_SURRENDERED,
    META_ZERO_COPY,
};

/// Poll interval of the receive worker; bounds cancellation latency.
const RX_POLL: Duration = Duration::from_micros(100);

/// Poll interval for transmit waits when the timeout is disabled.
const TX_POLL: Duration = Duration::from_millis(10);

/// Per-adapter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DmaConfig {
    /// Transmit/allocate wait bound in microseconds; zero disables the
    /// bound and waits retry on a fixed short poll.
    pub timeout_us: u64,
    /// Allow kernel-pinned buffers when the driver exposes a table.
    pub zero_copy: bool,
    /// Receive buffer size for the copy path (no driver table).
    pub rx_buffer_size: usize,
}

impl Default for DmaConfig {
    fn default() -> Self {
        DmaConfig {
            timeout_us: 1_000_000,
            zero_copy: true,
            rx_buffer_size: 65536,
        }
    }
}

impl DmaConfig {
    /// Load a configuration from JSON.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| Error::general("DmaConfig::from_json", e.to_string()))
    }
}

/// Receive metadata recovered from raw wire flags.
#[derive(Debug, Clone, Copy)]
pub struct RxMeta {
    /// Frame flags word to publish downstream.
    pub flags: u32,
    /// Error bits derived from the wire flags.
    pub error: u32,
    /// Continuation: more buffers follow in this frame.
    pub cont: bool,
}

/// Protocol-specific flag packing for one link type.
///
/// Each physical link (AXI stream, PGP lane, ...) encodes per-buffer
/// sideband data differently; the engine stays generic over this.
pub trait LinkLayer: Send + Sync + 'static {
    /// Pack the frame flags word and continuation bit into wire flags for
    /// one outgoing buffer.
    fn tx_flags(&self, frame_flags: u32, cont: bool) -> u32;

    /// Unpack raw wire flags from one received buffer.
    fn rx_split(&self, raw: u32) -> RxMeta;
}

/// State shared between the adapter handle, its worker thread and every
/// live zero-copy buffer (which hold it as their return path).
struct Shared {
    backend: Arc<dyn DmaBackend>,
    link: Box<dyn LinkLayer>,
    dest: u32,
    table: Option<DmaTable>,
    pool: Pool,
    master: Master,
    config: Mutex<DmaConfig>,
    stop: AtomicBool,
    /// First worker failure; surfaced on the next user call.
    fault: Mutex<Option<Error>>,
}

/// DMA device adapter. See the module docs.
pub struct DmaStream {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DmaStream {
    /// Bind a backend to the stream graph and start the receive worker.
    ///
    /// Fails (and starts nothing) when the driver version handshake or the
    /// destination subscription is rejected.
    pub fn open(
        backend: Arc<dyn DmaBackend>,
        link: Box<dyn LinkLayer>,
        dest: u32,
        config: DmaConfig,
    ) -> Result<Self> {
        backend.check_version()?;
        backend.set_mask(dest)?;

        let table = backend.map_dma();

        let shared = Arc::new(Shared {
            backend,
            link,
            dest,
            table,
            pool: Pool::new(),
            master: Master::new(),
            config: Mutex::new(config),
            stop: AtomicBool::new(false),
            fault: Mutex::new(None),
        });

        let worker_shared = shared.clone();
        let worker = std::thread::Builder::new()
            .name("daqwire-dma-rx".into())
            .spawn(move || worker_shared.run_rx())
            .map_err(|e| Error::general("DmaStream::open", e.to_string()))?;

        Ok(DmaStream {
            shared,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Attach a downstream consumer for received frames.
    pub fn add_slave(&self, slave: Arc<dyn FrameSlave>) {
        self.shared.master.add_slave(slave);
    }

    /// Set the transmit/allocate wait bound in microseconds (zero
    /// disables).
    pub fn set_timeout(&self, timeout_us: u64) {
        self.shared.config.lock().timeout_us = timeout_us;
    }

    /// Enable or disable zero-copy buffering, on both the allocate and the
    /// receive path. With it off the adapter behaves as if the driver had
    /// exposed no buffer table.
    pub fn set_zero_copy(&self, enable: bool) {
        self.shared.config.lock().zero_copy = enable;
    }

    /// True when the driver exposed a pinned buffer table.
    pub fn has_table(&self) -> bool {
        self.shared.table.is_some()
    }

    /// Pool accounting for buffers issued by this adapter.
    pub fn pool(&self) -> &Pool {
        &self.shared.pool
    }
}

impl FrameSlave for DmaStream {
    /// Serve a frame request, preferring kernel-pinned buffers.
    ///
    /// Falls back to the software pool when the driver exposed no table,
    /// the caller declined zero-copy, or the adapter has it disabled.
    fn accept_req(&self, size: usize, zero_copy: bool, max_buf: usize) -> Result<Frame> {
        self.shared.check_fault("DmaStream::accept_req")?;
        let config = self.shared.config.lock().clone();

        let table = match &self.shared.table {
            Some(table) if zero_copy && config.zero_copy => table,
            _ => return self.shared.pool.accept_req(size, false, max_buf),
        };

        let _yield = ScopedRelease::new();
        let mut frame = Frame::new();
        let mut alloc = 0;

        while alloc < size {
            // The readiness wait can fire while another descriptor wins
            // the buffer lock; get_index failure loops back to the wait.
            let index = loop {
                if !self.shared.wait_write(&config, "DmaStream::accept_req")? {
                    continue;
                }
                if let Some(index) = self.shared.backend.get_index() {
                    break index;
                }
            };

            let ptr = table.get(index).ok_or_else(|| {
                Error::general(
                    "DmaStream::accept_req",
                    format!("driver returned index {index} outside its table"),
                )
            })?;

            let buff = self.shared.pool.create_buffer(
                self.shared.clone(),
                Storage::Device(ptr),
                META_ZERO_COPY | (index & META_ID_MASK),
                table.buf_size(),
            );
            alloc += table.buf_size();
            frame.append_buffer(buff);
        }

        Ok(frame)
    }

    /// Transmit a frame, buffer by buffer.
    ///
    /// Zero-copy buffers go out by index and are marked surrendered so the
    /// drop path will not return them; re-accepting a surrendered buffer
    /// is a no-op. Software buffers go out through the copy path with a
    /// readiness-wait retry loop.
    fn accept_frame(&self, frame: &mut Frame) -> Result<()> {
        self.shared.check_fault("DmaStream::accept_frame")?;
        let config = self.shared.config.lock().clone();
        let _yield = ScopedRelease::new();

        let count = frame.count();
        let frame_flags = frame.flags();

        for x in 0..count {
            // Continuation is set on every buffer except the last.
            let cont = x + 1 != count;
            let flags = self.shared.link.tx_flags(frame_flags, cont);

            let buff = frame.buffer_mut(x).expect("index within count");
            let meta = buff.meta();

            if meta & META_ZERO_COPY != 0 {
                if meta & META_SURRENDERED != 0 {
                    continue;
                }
                let payload = buff.payload();
                self.shared
                    .backend
                    .write_index(meta & META_ID_MASK, payload, flags, self.shared.dest)
                    .map_err(|e| {
                        Error::general(
                            "DmaStream::accept_frame",
                            format!("link write failed: {e}"),
                        )
                    })?;
                // Device owns the index now; drop must not return it.
                buff.set_meta(meta | META_SURRENDERED);
            } else {
                loop {
                    if !self.shared.wait_write(&config, "DmaStream::accept_frame")? {
                        continue;
                    }
                    let payload = buff.payload();
                    let written = self.shared.backend.write(
                        &buff.payload_data()[..payload],
                        flags,
                        self.shared.dest,
                    )?;
                    if written > 0 {
                        break;
                    }
                    // Device declined after a ready signal; wait again.
                }
            }
        }

        Ok(())
    }
}

impl Shared {
    /// One bounded write-readiness wait. `Ok(true)` = ready, `Ok(false)` =
    /// poll expired with the time bound disabled (caller retries).
    fn wait_write(&self, config: &DmaConfig, src: &'static str) -> Result<bool> {
        let timeout = if config.timeout_us > 0 {
            Duration::from_micros(config.timeout_us)
        } else {
            TX_POLL
        };

        if self.backend.wait(Direction::Write, timeout) {
            Ok(true)
        } else if config.timeout_us > 0 {
            Err(Error::timeout(src, config.timeout_us))
        } else {
            Ok(false)
        }
    }

    fn check_fault(&self, src: &'static str) -> Result<()> {
        let fault = self.fault.lock();
        match fault.as_ref() {
            Some(error) => Err(Error::general(
                src,
                format!("receive worker failed: {error}"),
            )),
            None => Ok(()),
        }
    }

    /// Receive worker body. Cooperatively cancellable: the stop flag is
    /// polled between iterations and the device wait is bounded by
    /// `RX_POLL`, never interrupted by signals.
    fn run_rx(self: Arc<Self>) {
        let mut frame = Frame::new();

        loop {
            if self.stop.load(Ordering::Acquire) {
                break;
            }
            if !self.backend.wait(Direction::Read, RX_POLL) {
                continue;
            }
            if let Err(error) = Shared::rx_one(&self, &mut frame) {
                tracing::error!(%error, "receive worker failed");
                *self.fault.lock() = Some(error);
                break;
            }
        }
    }

    /// Service one read-ready indication: pull a buffer, grow the partial
    /// frame, dispatch it downstream once the continuation run ends.
    /// Takes the owning `Arc` because received zero-copy buffers clone it
    /// as their return path.
    fn rx_one(this: &Arc<Shared>, frame: &mut Frame) -> Result<()> {
        let (zero_copy, rx_size) = {
            let config = this.config.lock();
            (config.zero_copy, config.rx_buffer_size)
        };

        // The table alone is not enough: zero-copy receive also requires
        // the runtime enable, same as the allocate path.
        let (mut buff, raw_flags, rx_error) = match &this.table {
            // Zero-copy path: wrap the filled table region.
            Some(table) if zero_copy => {
                let rx = match this.backend.read_index() {
                    Some(rx) => rx,
                    None => return Ok(()), // spurious readiness
                };
                let ptr = table.get(rx.index).ok_or_else(|| {
                    Error::general(
                        "DmaStream::rx",
                        format!("driver returned index {} outside its table", rx.index),
                    )
                })?;
                let mut buff = this.pool.create_buffer(
                    this.clone(),
                    Storage::Device(ptr),
                    META_ZERO_COPY | (rx.index & META_ID_MASK),
                    table.buf_size(),
                );
                buff.set_payload(rx.size)?;
                (buff, rx.flags, rx.error)
            }
            // Copy path: read into a pool buffer.
            _ => {
                let mut buff = this.pool.alloc_buffer(rx_size, None)?;
                let rx = match this.backend.read(buff.payload_data_mut())? {
                    Some(rx) => rx,
                    None => return Ok(()),
                };
                buff.set_payload(rx.size)?;
                (buff, rx.flags, rx.error)
            }
        };

        let meta = this.link.rx_split(raw_flags);
        let error = meta.error | rx_error;

        buff.set_error(error);
        frame.set_error(frame.error() | error);
        frame.set_flags(meta.flags);
        frame.append_buffer(buff);

        // The run of continuation-flagged buffers ends here: publish the
        // assembled frame and start a fresh one.
        if !meta.cont {
            let mut out = std::mem::take(frame);
            this.master.send_frame(&mut out)?;
        }

        Ok(())
    }
}

impl BufferReturn for Shared {
    /// Drop path for buffers issued by this adapter. Must not fail.
    fn ret_buffer(&self, storage: Option<Storage>, meta: u32, raw_size: usize) {
        if meta & META_ZERO_COPY != 0 {
            // Return the index unless the device already owns it (bit 30)
            // or the device is gone.
            if meta & META_SURRENDERED == 0 && self.backend.is_open() {
                self.backend.ret_index(meta & META_ID_MASK);
            }
            self.pool.dec_counter(raw_size);
        } else {
            self.pool.ret_storage(storage, meta, raw_size);
        }
    }
}

impl Drop for DmaStream {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::Release);
        if let Some(worker) = self.worker.lock().take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = DmaConfig::default();
        assert_eq!(config.timeout_us, 1_000_000);
        assert!(config.zero_copy);
    }

    #[test]
    fn test_config_from_json() {
        let config = DmaConfig::from_json(r#"{"timeout_us": 5000, "zero_copy": false}"#).unwrap();
        assert_eq!(config.timeout_us, 5000);
        assert!(!config.zero_copy);
        // omitted fields take defaults
        assert_eq!(config.rx_buffer_size, 65536);
    }

    #[test]
    fn test_config_rejects_malformed_json() {
        assert!(DmaConfig::from_json("{timeout}").is_err());
    }
}
