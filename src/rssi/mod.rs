//! RSSI: reliable-datagram protocol segments.
//!
//! Only the segment wire format lives in this crate; the connection state
//! machine (retransmission, ack pacing, null keep-alive) belongs to the
//! controller built on top of it.

mod header;

pub use header::{Header, HEADER_SIZE, SYN_SIZE};
