//! Streaming substrate: buffers, pools, frames and the producer/consumer
//! graph.
//!
//! Data flows producer → consumer as [`Frame`]s, each an ordered sequence
//! of [`Buffer`]s issued by a [`Pool`]. Control flows the other way:
//! consumers serve frame *requests* so a device-backed endpoint can hand
//! out kernel-pinned memory before the producer fills it, making the whole
//! path zero-copy.
//!
//! ```text
//!            req_frame ─────────────────────▶ accept_req
//!   Master ◀───────────────── Frame ────────  Slave (primary)
//!            send_frame ────────────────────▶ accept_frame (all)
//! ```

mod buffer;
mod frame;
mod master;
mod pool;
mod slave;

pub use buffer::{Buffer, BufferReturn, Storage, META_ID_MASK, META_SURRENDERED, META_ZERO_COPY};
pub use frame::{Frame, ReadCursor, WriteCursor};
pub use master::Master;
pub use pool::Pool;
pub use slave::{FrameSlave, Receiver};
