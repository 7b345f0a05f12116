//! AXI-stream link flavor of the DMA adapter.
//!
//! AXI-stream sideband travels in the first-user and last-user fields:
//! fuser in bits 0-7 of the frame flags word, luser in bits 8-15. With SSI
//! enabled the SOF bit is forced into fuser on transmit, and an EOFE
//! indication in luser bit 0 on receive marks the buffer in error.
//!
//! Every wire frame on this link is a single buffer, so the continuation
//! bit is never set.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::hardware::backend::DmaBackend;
use crate::hardware::dma::{DmaConfig, DmaStream, LinkLayer, RxMeta};

/// SSI start-of-frame bit in the first-user field.
const SSI_SOF: u32 = 0x2;
/// SSI end-of-frame-error bit in the last-user field.
const SSI_EOFE: u32 = 0x1;

/// AXI-stream flag packing: `fuser | luser << 8 | cont << 16` on the wire.
pub struct SsiFlags {
    enable_ssi: bool,
}

impl SsiFlags {
    pub fn new(enable_ssi: bool) -> Self {
        SsiFlags { enable_ssi }
    }
}

impl LinkLayer for SsiFlags {
    fn tx_flags(&self, frame_flags: u32, _cont: bool) -> u32 {
        let mut fuser = frame_flags & 0xFF;
        let luser = (frame_flags >> 8) & 0xFF;
        if self.enable_ssi {
            fuser |= SSI_SOF;
        }
        fuser | (luser << 8)
    }

    fn rx_split(&self, raw: u32) -> RxMeta {
        let fuser = raw & 0xFF;
        let luser = (raw >> 8) & 0xFF;

        let error = if self.enable_ssi && (luser & SSI_EOFE) != 0 {
            1
        } else {
            0
        };

        RxMeta {
            flags: fuser | (luser << 8),
            error,
            cont: false,
        }
    }
}

/// AXI-stream adapter configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AxiStreamConfig {
    /// Interpret SSI semantics in the user fields (SOF on transmit, EOFE
    /// as a receive error).
    pub enable_ssi: bool,
    /// Engine configuration.
    pub dma: DmaConfig,
}

/// AXI-stream DMA channel.
pub struct AxiStream;

impl AxiStream {
    /// Open an AXI-stream channel on destination `dest`.
    pub fn open(
        backend: Arc<dyn DmaBackend>,
        dest: u32,
        config: AxiStreamConfig,
    ) -> Result<DmaStream> {
        DmaStream::open(
            backend,
            Box::new(SsiFlags::new(config.enable_ssi)),
            dest,
            config.dma,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tx_packs_user_fields() {
        let link = SsiFlags::new(false);
        let flags = link.tx_flags(0xBBAA, false);
        assert_eq!(flags & 0xFF, 0xAA);
        assert_eq!((flags >> 8) & 0xFF, 0xBB);
    }

    #[test]
    fn test_ssi_forces_sof() {
        let link = SsiFlags::new(true);
        let flags = link.tx_flags(0, false);
        assert_eq!(flags & SSI_SOF, SSI_SOF);
    }

    #[test]
    fn test_rx_eofe_maps_to_error_under_ssi() {
        let ssi = SsiFlags::new(true);
        let plain = SsiFlags::new(false);

        let raw = SSI_EOFE << 8; // luser bit 0
        assert_eq!(ssi.rx_split(raw).error, 1);
        assert_eq!(plain.rx_split(raw).error, 0);
    }

    #[test]
    fn test_rx_never_continues() {
        let link = SsiFlags::new(true);
        assert!(!link.rx_split(0x1_FFFF).cont);
    }
}
