//! # daqwire
//!
//! Data-acquisition middleware for detector readout: a zero-copy frame
//! pipeline between hardware DMA drivers and user software, plus the
//! register-access fabric used to configure the hardware underneath it.
//!
//! ## Architecture
//!
//! - **Stream graph** ([`stream`]): producers push [`stream::Frame`]s of
//!   pooled [`stream::Buffer`]s downstream; consumers serve frame
//!   *requests* upstream so device-backed endpoints can supply
//!   kernel-pinned memory before a frame is filled.
//! - **DMA adapters** ([`hardware`]): one engine over an abstract
//!   descriptor backend, transmitting by buffer index and assembling
//!   received buffers into frames on a background worker.
//! - **Memory fabric** ([`memory`]): blocking register masters, address-
//!   translating hubs and an `mmap` window backend.
//! - **RSSI segments** ([`rssi`]): the wire codec for the reliable-
//!   datagram headers that ride the stream.
//!
//! ## Example
//!
//! ```ignore
//! use daqwire::hardware::{AxiStream, AxiStreamConfig};
//! use daqwire::stream::Receiver;
//! use std::sync::Arc;
//!
//! let adapter = AxiStream::open(backend, 0, AxiStreamConfig::default())?;
//! let sink = Arc::new(Receiver::new());
//! adapter.add_slave(sink.clone());
//! // frames received on destination 0 now arrive at `sink`
//! ```

pub mod error;
pub mod hardware;
pub mod host;
pub mod memory;
pub mod rssi;
pub mod stream;
pub mod version;

pub use error::{Error, Result};
