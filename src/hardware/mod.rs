//! Hardware adapters: DMA devices bound to the stream graph.
//!
//! One engine ([`DmaStream`]) drives every descriptor-based DMA driver
//! through the abstract [`DmaBackend`] interface; link flavors
//! ([`AxiStream`], [`Pgp`]) contribute only their flag packing and
//! destination mapping.

mod axis;
mod backend;
mod dma;
mod pgp;

pub use axis::{AxiStream, AxiStreamConfig, SsiFlags};
pub use backend::{Direction, DmaBackend, DmaTable, RxCopy, RxEntry};
pub use dma::{DmaConfig, DmaStream, LinkLayer, RxMeta};
pub use pgp::{Pgp, PgpFlags};
