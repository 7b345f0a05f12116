//! PGP link flavor of the DMA adapter.
//!
//! A PGP card multiplexes four virtual channels per lane; the driver
//! destination is `lane * 4 + vc`. Large frames span several buffers on
//! the wire, chained by the continuation bit: every buffer carries
//! `cont = 1` except the last, which carries `cont = 0` and closes the
//! frame on both directions.

use std::sync::Arc;

use crate::error::Result;
use crate::hardware::backend::DmaBackend;
use crate::hardware::dma::{DmaConfig, DmaStream, LinkLayer, RxMeta};

/// Continuation bit in the PGP wire flags.
const PGP_CONT: u32 = 0x1;

/// PGP flag packing: only the continuation bit travels.
pub struct PgpFlags;

impl LinkLayer for PgpFlags {
    fn tx_flags(&self, _frame_flags: u32, cont: bool) -> u32 {
        if cont {
            PGP_CONT
        } else {
            0
        }
    }

    fn rx_split(&self, raw: u32) -> RxMeta {
        RxMeta {
            flags: raw,
            error: 0,
            cont: raw & PGP_CONT != 0,
        }
    }
}

/// PGP card channel.
pub struct Pgp;

impl Pgp {
    /// Driver destination for a lane/virtual-channel pair.
    pub fn dest(lane: u32, vc: u32) -> u32 {
        lane * 4 + vc
    }

    /// Open a PGP channel on `lane`/`vc`.
    pub fn open(
        backend: Arc<dyn DmaBackend>,
        lane: u32,
        vc: u32,
        config: DmaConfig,
    ) -> Result<DmaStream> {
        DmaStream::open(backend, Box::new(PgpFlags), Self::dest(lane, vc), config)
    }
}
