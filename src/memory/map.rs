//! Mapped-memory backend: a memory slave over `mmap`ed register windows.
//!
//! Windows are mapped read/write shared from a `/dev/mem`-style device and
//! addressed by their physical base. Transactions are executed in 4-byte
//! strides against the mapped pointers; a range no window covers completes
//! with `ADDRESS_ERROR`.
//!
//! Windows are only ever added, never removed, so a pointer resolved under
//! the window lock stays valid until the backend drops.

use std::ffi::CString;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::host::ScopedRelease;
use crate::memory::{status, AccessBounds, AccessType, MemoryMaster, MemorySlave};

/// Access stride and minimum granularity of mapped windows.
const WORD: usize = 4;

struct Window {
    base: u64,
    size: usize,
    ptr: *mut u8,
}

/// Memory slave backed by `mmap`ed register windows.
pub struct MappedMemory {
    /// Device descriptor; -1 for a loopback instance without a device.
    fd: i32,
    bounds: AccessBounds,
    windows: Mutex<Vec<Window>>,
}

// SAFETY: the window pointers reference mappings owned by this value and
// unmapped only in Drop; all mutation of the window list is behind the
// mutex. Concurrent 4-byte accesses through the pointers mirror the
// concurrent-DMA semantics of the underlying registers.
unsafe impl Send for MappedMemory {}
unsafe impl Sync for MappedMemory {}

impl MappedMemory {
    /// Open `/dev/mem` for physical register windows.
    pub fn open() -> Result<Self> {
        Self::open_path("/dev/mem")
    }

    /// Open a specific memory device.
    pub fn open_path(path: &str) -> Result<Self> {
        let cpath = CString::new(path)
            .map_err(|_| Error::open("MappedMemory::open_path", path))?;

        // SAFETY: cpath is a valid NUL-terminated string.
        let fd = unsafe { libc::open(cpath.as_ptr(), libc::O_RDWR | libc::O_SYNC) };
        if fd < 0 {
            return Err(Error::open("MappedMemory::open_path", path));
        }

        Ok(MappedMemory {
            fd,
            bounds: AccessBounds::new(WORD as u32, 0xFFFF_FFFF),
            windows: Mutex::new(Vec::new()),
        })
    }

    /// Create a backend with no device. Only anonymous windows
    /// ([`add_ram_map`](MappedMemory::add_ram_map)) can be added; useful
    /// for loopback testing of the fabric above it.
    pub fn anonymous() -> Self {
        MappedMemory {
            fd: -1,
            bounds: AccessBounds::new(WORD as u32, 0xFFFF_FFFF),
            windows: Mutex::new(Vec::new()),
        }
    }

    /// Map `[base, base+size)` from the device, read/write shared.
    ///
    /// Mapping failures are logged and the window is not added; the
    /// transaction path reports `ADDRESS_ERROR` for uncovered ranges.
    pub fn add_map(&self, base: u64, size: usize) {
        let _yield = ScopedRelease::new();
        let mut windows = self.windows.lock();

        if self.fd < 0 {
            tracing::warn!(base = format_args!("{base:#x}"), "no device open, map not added");
            return;
        }

        // SAFETY: fd is a valid open descriptor; length and protection are
        // well-formed. The mapping is recorded and unmapped in Drop.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                self.fd,
                base as libc::off_t,
            )
        };

        if ptr == libc::MAP_FAILED {
            tracing::error!(
                base = format_args!("{base:#x}"),
                size,
                "failed to map register window"
            );
            return;
        }

        tracing::info!(
            base = format_args!("{base:#x}"),
            size,
            "mapped register window"
        );
        windows.push(Window {
            base,
            size,
            ptr: ptr as *mut u8,
        });
    }

    /// Add an anonymous RAM-backed window at a virtual `base`. Behaves like
    /// a device window for every fabric operation; intended for loopback
    /// tests of hubs and masters.
    pub fn add_ram_map(&self, base: u64, size: usize) {
        let mut windows = self.windows.lock();

        // SAFETY: anonymous private mapping, no fd involved.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            tracing::error!(base = format_args!("{base:#x}"), size, "failed to map RAM window");
            return;
        }

        windows.push(Window {
            base,
            size,
            ptr: ptr as *mut u8,
        });
    }

    /// Resolve `[address, address+size)` to a pointer inside the unique
    /// covering window.
    fn find_space(&self, address: u64, size: usize) -> Option<*mut u8> {
        let windows = self.windows.lock();
        for window in windows.iter() {
            if address >= window.base
                && (address - window.base) as usize + size <= window.size
            {
                let offset = (address - window.base) as usize;
                // SAFETY: offset+size is within the window mapping.
                return Some(unsafe { window.ptr.add(offset) });
            }
        }
        tracing::debug!(
            address = format_args!("{address:#x}"),
            size,
            "no window covers range"
        );
        None
    }
}

impl MemorySlave for MappedMemory {
    fn min_access(&self) -> u32 {
        self.bounds.min_access
    }

    fn max_access(&self) -> u32 {
        self.bounds.max_access
    }

    fn do_transaction(
        &self,
        id: u32,
        master: &Arc<dyn MemoryMaster>,
        address: u64,
        size: u32,
        access: AccessType,
    ) {
        if let Some(code) = self.bounds.check_size(size) {
            master.done_transaction(id, code);
            return;
        }

        let ptr = match self.find_space(address, size as usize) {
            Some(ptr) => ptr,
            None => {
                master.done_transaction(id, status::ADDRESS_ERROR);
                return;
            }
        };

        let mut word = [0u8; WORD];
        let mut count = 0usize;
        while count < size as usize {
            if access.is_write() {
                master.get_transaction_data(id, count, &mut word);
                // SAFETY: ptr+count+WORD stays inside the covering window
                // (checked in find_space); windows are never unmapped while
                // the backend is alive.
                unsafe {
                    std::ptr::copy_nonoverlapping(word.as_ptr(), ptr.add(count), WORD);
                }
            } else {
                // SAFETY: as above.
                unsafe {
                    std::ptr::copy_nonoverlapping(ptr.add(count), word.as_mut_ptr(), WORD);
                }
                master.set_transaction_data(id, count, &word);
            }
            count += WORD;
        }

        master.done_transaction(id, status::OK);
    }
}

impl Drop for MappedMemory {
    fn drop(&mut self) {
        let windows = self.windows.get_mut();
        for window in windows.drain(..) {
            // SAFETY: each window was produced by a successful mmap of
            // exactly `size` bytes.
            unsafe {
                libc::munmap(window.ptr as *mut libc::c_void, window.size);
            }
        }
        if self.fd >= 0 {
            // SAFETY: fd was opened by us and not closed elsewhere.
            unsafe {
                libc::close(self.fd);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Master;

    fn loopback(base: u64, size: usize) -> (Master, Arc<MappedMemory>) {
        let backend = Arc::new(MappedMemory::anonymous());
        backend.add_ram_map(base, size);
        let master = Master::new();
        master.set_slave(backend.clone());
        (master, backend)
    }

    #[test]
    fn test_write_read_through_window() {
        let (master, _backend) = loopback(0x4001_0000, 0x1000);

        master
            .write(0x4001_0000, &[0xDE, 0xAD, 0xBE, 0xEF])
            .unwrap();
        let mut out = [0u8; 4];
        master.read(0x4001_0000, &mut out).unwrap();
        assert_eq!(out, [0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn test_multi_word_transaction() {
        let (master, _backend) = loopback(0, 0x100);
        let image: Vec<u8> = (0u8..32).collect();
        master.write(0x40, &image).unwrap();

        let mut out = vec![0u8; 32];
        master.read(0x40, &mut out).unwrap();
        assert_eq!(out, image);
    }

    #[test]
    fn test_range_past_window_end_is_address_error() {
        let (master, _backend) = loopback(0x1000, 0x100);

        let mut out = [0u8; 8];
        // Last word starts inside but the range runs past the end.
        let err = master.read(0x10FC, &mut out).unwrap_err();
        match err {
            Error::Return { code, .. } => assert_eq!(code, status::ADDRESS_ERROR as i64),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_unmapped_address_is_address_error() {
        let (master, _backend) = loopback(0x1000, 0x100);
        let mut out = [0u8; 4];
        let err = master.read(0, &mut out).unwrap_err();
        assert!(matches!(err, Error::Return { code, .. } if code == status::ADDRESS_ERROR as i64));
    }

    #[test]
    fn test_unaligned_size_is_size_error() {
        let (master, _backend) = loopback(0, 0x100);
        let err = master.write(0, &[0u8; 6]).unwrap_err();
        assert!(matches!(err, Error::Return { code, .. } if code == status::SIZE_ERROR as i64));
    }

    #[test]
    fn test_bounds() {
        let backend = MappedMemory::anonymous();
        assert_eq!(backend.min_access(), 4);
        assert_eq!(backend.max_access(), 0xFFFF_FFFF);
    }

    #[test]
    fn test_add_map_without_device_is_rejected() {
        let backend = Arc::new(MappedMemory::anonymous());
        backend.add_map(0x1000, 0x100);

        let master = Master::new();
        master.set_slave(backend);
        let mut out = [0u8; 4];
        // No window was added, so the range is uncovered.
        assert!(master.read(0x1000, &mut out).is_err());
    }

    #[test]
    fn test_two_windows_resolve_independently() {
        let backend = Arc::new(MappedMemory::anonymous());
        backend.add_ram_map(0x1000, 0x100);
        backend.add_ram_map(0x8000, 0x100);

        let master = Master::new();
        master.set_slave(backend);

        master.write(0x1000, &[1, 1, 1, 1]).unwrap();
        master.write(0x8000, &[2, 2, 2, 2]).unwrap();

        let mut a = [0u8; 4];
        let mut b = [0u8; 4];
        master.read(0x1000, &mut a).unwrap();
        master.read(0x8000, &mut b).unwrap();
        assert_eq!(a, [1; 4]);
        assert_eq!(b, [2; 4]);
    }
}
