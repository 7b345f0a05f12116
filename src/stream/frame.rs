//! Frame: an ordered sequence of buffers forming one logical message.
//!
//! A frame is addressable as a single byte array spanning the payload areas
//! of its buffers. Random-offset [`read`](Frame::read) and
//! [`write`](Frame::write) handle the common case; the cursor API
//! ([`write_cursor`](Frame::write_cursor), [`read_cursor`](Frame::read_cursor))
//! exposes the underlying contiguous windows so scatter/gather consumers
//! (wire codecs, device adapters) can move data without an intermediate
//! copy.
//!
//! A frame owns its buffers exclusively. It is assumed only one thread
//! interacts with a frame at a time; producers hand frames downstream and
//! give up access.

use crate::error::{Error, Result};
use crate::stream::Buffer;

/// Ordered sequence of buffers with frame-level flags and error words.
#[derive(Default)]
pub struct Frame {
    buffers: Vec<Buffer>,
    flags: u32,
    error: u32,
}

impl Frame {
    /// Create an empty frame.
    pub fn new() -> Self {
        Frame {
            buffers: Vec::new(),
            flags: 0,
            error: 0,
        }
    }

    /// Add a buffer to the end of the frame.
    pub fn append_buffer(&mut self, buffer: Buffer) {
        self.buffers.push(buffer);
    }

    /// Append all of `other`'s buffers, emptying it. `other`'s error bits
    /// are merged.
    pub fn append_frame(&mut self, other: &mut Frame) {
        self.error |= other.error;
        self.buffers.append(&mut other.buffers);
    }

    /// Remove all buffers, returning their regions to the issuing pools.
    pub fn clear(&mut self) {
        self.buffers.clear();
    }

    /// Number of buffers.
    pub fn count(&self) -> usize {
        self.buffers.len()
    }

    /// True when the frame holds no buffers.
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Buffer at `index`.
    pub fn buffer(&self, index: usize) -> Option<&Buffer> {
        self.buffers.get(index)
    }

    /// Buffer at `index`, mutable.
    pub fn buffer_mut(&mut self, index: usize) -> Option<&mut Buffer> {
        self.buffers.get_mut(index)
    }

    /// Iterate the buffers in order.
    pub fn buffers(&self) -> impl Iterator<Item = &Buffer> {
        self.buffers.iter()
    }

    /// Iterate the buffers in order, mutable.
    pub fn buffers_mut(&mut self) -> impl Iterator<Item = &mut Buffer> {
        self.buffers.iter_mut()
    }

    /// Unused payload capacity across all buffers.
    pub fn available(&self) -> usize {
        self.buffers.iter().map(Buffer::available).sum()
    }

    /// Total payload bytes across all buffers.
    pub fn payload(&self) -> usize {
        self.buffers.iter().map(Buffer::payload).sum()
    }

    /// Interface-specific flags word.
    pub fn flags(&self) -> u32 {
        self.flags
    }

    /// Set the flags word.
    pub fn set_flags(&mut self, flags: u32) {
        self.flags = flags;
    }

    /// Error word: frame-level bits OR'd with every buffer's error word.
    pub fn error(&self) -> u32 {
        self.buffers
            .iter()
            .fold(self.error, |acc, b| acc | b.error())
    }

    /// Set frame-level error bits.
    pub fn set_error(&mut self, error: u32) {
        self.error = error;
    }

    /// Read `dst.len()` bytes starting at payload offset `offset`.
    ///
    /// Fails with a Boundary error when the range extends past the current
    /// payload.
    pub fn read(&self, offset: usize, dst: &mut [u8]) -> Result<()> {
        let payload = self.payload();
        let end = offset + dst.len();
        if end > payload {
            return Err(Error::boundary("Frame::read", end, payload));
        }
        if dst.is_empty() {
            return Ok(());
        }

        let mut cursor = ReadCursor::start(self, offset, dst.len());
        let mut done = 0;
        loop {
            let window = cursor.window();
            let take = window.len();
            dst[done..done + take].copy_from_slice(window);
            done += take;
            if !cursor.next() {
                break;
            }
        }
        Ok(())
    }

    /// Write `src` starting at payload offset `offset`, growing per-buffer
    /// payloads as needed.
    ///
    /// Fails with a Boundary error when the range extends past the total
    /// capacity (`available + payload`).
    pub fn write(&mut self, offset: usize, src: &[u8]) -> Result<()> {
        if src.is_empty() {
            let capacity = self.available() + self.payload();
            if offset > capacity {
                return Err(Error::boundary("Frame::write", offset, capacity));
            }
            return Ok(());
        }
        let mut cursor = self.write_cursor(offset, src.len())?;
        let mut done = 0;
        loop {
            let window = cursor.window();
            let put = window.len();
            window.copy_from_slice(&src[done..done + put]);
            done += put;
            if !cursor.next() {
                break;
            }
        }
        Ok(())
    }

    /// Start an iterative write of `total` bytes at payload offset
    /// `offset`. See [`WriteCursor`].
    pub fn write_cursor(&mut self, offset: usize, total: usize) -> Result<WriteCursor<'_>> {
        let capacity = self.available() + self.payload();
        let end = offset + total;
        if end > capacity {
            return Err(Error::boundary("Frame::write_cursor", end, capacity));
        }
        Ok(WriteCursor::start(self, offset, total))
    }

    /// Start an iterative read of `total` bytes at payload offset `offset`.
    /// See [`ReadCursor`].
    pub fn read_cursor(&self, offset: usize, total: usize) -> Result<ReadCursor<'_>> {
        let payload = self.payload();
        let end = offset + total;
        if end > payload {
            return Err(Error::boundary("Frame::read_cursor", end, payload));
        }
        Ok(ReadCursor::start(self, offset, total))
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("count", &self.count())
            .field("payload", &self.payload())
            .field("available", &self.available())
            .field("flags", &format_args!("{:#010x}", self.flags))
            .field("error", &format_args!("{:#010x}", self.error()))
            .finish()
    }
}

/// Iterative scatter write over a frame.
///
/// Each step exposes one contiguous window into a single buffer. The caller
/// fills up to the window, optionally reports a short write with
/// [`completed`](WriteCursor::completed), then advances with
/// [`next`](WriteCursor::next), which returns `false` once the transaction
/// total has been consumed. Buffer payload lengths grow as windows are
/// consumed.
pub struct WriteCursor<'a> {
    frame: &'a mut Frame,
    /// Current buffer index.
    index: usize,
    /// Position within the current buffer's payload area.
    pos: usize,
    /// Bytes left in the transaction.
    remaining: usize,
    /// Size of the current window.
    window: usize,
    /// Short-write override for the current window.
    completed: Option<usize>,
}

impl<'a> WriteCursor<'a> {
    fn start(frame: &'a mut Frame, offset: usize, total: usize) -> Self {
        // Map the frame-level offset onto (buffer, position) over payload
        // capacities.
        let mut index = 0;
        let mut pos = offset;
        while index < frame.count() {
            let cap = {
                let b = &frame.buffers[index];
                b.raw_size() - b.head_room()
            };
            if pos < cap || (pos == cap && total == 0) {
                break;
            }
            pos -= cap;
            index += 1;
        }

        let mut cursor = WriteCursor {
            frame,
            index,
            pos,
            remaining: total,
            window: 0,
            completed: None,
        };
        cursor.window = cursor.window_size();
        cursor
    }

    fn window_size(&self) -> usize {
        match self.frame.buffers.get(self.index) {
            Some(b) => {
                let cap = b.raw_size() - b.head_room();
                (cap - self.pos).min(self.remaining)
            }
            None => 0,
        }
    }

    /// The current contiguous window.
    pub fn window(&mut self) -> &mut [u8] {
        let pos = self.pos;
        let window = self.window;
        let buffer = &mut self.frame.buffers[self.index];
        &mut buffer.payload_data_mut()[pos..pos + window]
    }

    /// Size of the current window in bytes.
    pub fn size(&self) -> usize {
        self.window
    }

    /// Bytes remaining in the transaction, including the current window.
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Report that only `value` bytes of the current window were written.
    /// Values at or past the window size are ignored (the full window
    /// counts as consumed).
    pub fn completed(&mut self, value: usize) {
        if value < self.window {
            self.completed = Some(value);
        }
    }

    /// Commit the current window and advance. Returns `false` when the
    /// transaction total has been consumed or no buffers remain.
    pub fn next(&mut self) -> bool {
        let done = self.completed.take().unwrap_or(self.window);
        let end = self.pos + done;

        // Grow the buffer payload to cover what was written.
        if let Some(buffer) = self.frame.buffers.get_mut(self.index) {
            if end > buffer.payload() {
                // window() kept end within capacity
                let _ = buffer.set_payload(end);
            }
        }

        self.remaining -= done;
        self.pos = end;
        if self.remaining == 0 {
            return false;
        }

        // A full window rolls over to the next buffer; a short write stays
        // put so the caller can continue mid-buffer.
        if done == self.window {
            if let Some(buffer) = self.frame.buffers.get(self.index) {
                let cap = buffer.raw_size() - buffer.head_room();
                if self.pos == cap {
                    self.index += 1;
                    self.pos = 0;
                }
            }
        }

        // Skip buffers that contribute no window (all head room).
        while self.index < self.frame.count() {
            self.window = self.window_size();
            if self.window > 0 {
                return true;
            }
            self.index += 1;
            self.pos = 0;
        }
        false
    }
}

/// Iterative scatter read over a frame. The read-side twin of
/// [`WriteCursor`]; windows are bounded by each buffer's payload rather
/// than its capacity.
pub struct ReadCursor<'a> {
    frame: &'a Frame,
    index: usize,
    pos: usize,
    remaining: usize,
    window: usize,
    completed: Option<usize>,
}

impl<'a> ReadCursor<'a> {
    fn start(frame: &'a Frame, offset: usize, total: usize) -> Self {
        let mut index = 0;
        let mut pos = offset;
        while index < frame.count() {
            let len = frame.buffers[index].payload();
            if pos < len || (pos == len && total == 0) {
                break;
            }
            pos -= len;
            index += 1;
        }

        let mut cursor = ReadCursor {
            frame,
            index,
            pos,
            remaining: total,
            window: 0,
            completed: None,
        };
        cursor.window = cursor.window_size();
        cursor
    }

    fn window_size(&self) -> usize {
        match self.frame.buffers.get(self.index) {
            Some(b) => (b.payload() - self.pos).min(self.remaining),
            None => 0,
        }
    }

    /// The current contiguous window.
    pub fn window(&self) -> &[u8] {
        let buffer = &self.frame.buffers[self.index];
        &buffer.payload_data()[self.pos..self.pos + self.window]
    }

    /// Size of the current window in bytes.
    pub fn size(&self) -> usize {
        self.window
    }

    /// Bytes remaining in the transaction, including the current window.
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Report that only `value` bytes of the current window were consumed.
    pub fn completed(&mut self, value: usize) {
        if value < self.window {
            self.completed = Some(value);
        }
    }

    /// Advance past the current window. Returns `false` when the
    /// transaction total has been consumed or no buffers remain.
    pub fn next(&mut self) -> bool {
        let done = self.completed.take().unwrap_or(self.window);
        self.remaining -= done;
        self.pos += done;
        if self.remaining == 0 {
            return false;
        }

        if done == self.window {
            if self.pos == self.frame.buffers[self.index].payload() {
                self.index += 1;
                self.pos = 0;
            }
        }

        // Skip buffers carrying no payload.
        while self.index < self.frame.count() {
            self.window = self.window_size();
            if self.window > 0 {
                return true;
            }
            self.index += 1;
            self.pos = 0;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::Pool;

    fn frame_with_buffers(pool: &Pool, sizes: &[usize]) -> Frame {
        let mut frame = Frame::new();
        for &size in sizes {
            frame.append_buffer(pool.alloc_buffer(size, None).unwrap());
        }
        frame
    }

    #[test]
    fn test_payload_accounting_across_buffers() {
        let pool = Pool::new();
        let mut frame = frame_with_buffers(&pool, &[100, 100, 100]);

        assert_eq!(frame.count(), 3);
        assert_eq!(frame.available(), 300);
        assert_eq!(frame.payload(), 0);

        frame.buffer_mut(0).unwrap().set_payload(100).unwrap();
        frame.buffer_mut(1).unwrap().set_payload(40).unwrap();
        assert_eq!(frame.payload(), 140);
        assert_eq!(frame.available(), 160);
    }

    #[test]
    fn test_scatter_write_then_read_roundtrip() {
        let pool = Pool::new();
        let mut frame = frame_with_buffers(&pool, &[100, 100, 100]);

        let src: Vec<u8> = (0..250).map(|i| (i % 251) as u8).collect();
        frame.write(0, &src).unwrap();
        assert_eq!(frame.payload(), 250);

        let mut dst = vec![0u8; 250];
        frame.read(0, &mut dst).unwrap();
        assert_eq!(dst, src);
    }

    #[test]
    fn test_write_spans_buffer_boundary() {
        let pool = Pool::new();
        let mut frame = frame_with_buffers(&pool, &[4, 4]);

        frame.write(2, &[9, 9, 9, 9]).unwrap();
        assert_eq!(frame.buffer(0).unwrap().payload(), 4);
        assert_eq!(frame.buffer(1).unwrap().payload(), 2);
    }

    #[test]
    fn test_write_past_capacity_rejected() {
        let pool = Pool::new();
        let mut frame = frame_with_buffers(&pool, &[16]);
        let err = frame.write(10, &[0u8; 7]).unwrap_err();
        match err {
            Error::Boundary { pos, limit, .. } => {
                assert_eq!(pos, 17);
                assert_eq!(limit, 16);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_read_past_payload_rejected() {
        let pool = Pool::new();
        let mut frame = frame_with_buffers(&pool, &[16]);
        frame.write(0, &[1, 2, 3, 4]).unwrap();

        let mut dst = [0u8; 5];
        assert!(frame.read(0, &mut dst).is_err());
        let mut dst = [0u8; 4];
        frame.read(0, &mut dst).unwrap();
    }

    #[test]
    fn test_read_at_offset() {
        let pool = Pool::new();
        let mut frame = frame_with_buffers(&pool, &[8, 8]);
        let src: Vec<u8> = (0..12).collect();
        frame.write(0, &src).unwrap();

        let mut dst = [0u8; 6];
        frame.read(5, &mut dst).unwrap();
        assert_eq!(&dst, &src[5..11]);
    }

    #[test]
    fn test_append_frame_moves_buffers() {
        let pool = Pool::new();
        let mut a = frame_with_buffers(&pool, &[10, 10]);
        let mut b = frame_with_buffers(&pool, &[10]);

        a.write(0, &[1u8; 20]).unwrap();
        b.write(0, &[2u8; 10]).unwrap();
        b.set_error(0x4);

        let before = a.payload() + b.payload();
        a.append_frame(&mut b);

        assert_eq!(a.payload(), before);
        assert_eq!(a.count(), 3);
        assert_eq!(b.count(), 0);
        assert_eq!(b.payload(), 0);
        assert_eq!(a.error() & 0x4, 0x4);
    }

    #[test]
    fn test_error_word_is_or_of_buffer_errors() {
        let pool = Pool::new();
        let mut frame = frame_with_buffers(&pool, &[8, 8]);
        frame.buffer_mut(0).unwrap().set_error(0x1);
        frame.buffer_mut(1).unwrap().set_error(0x8);
        frame.set_error(0x100);
        assert_eq!(frame.error(), 0x109);
    }

    #[test]
    fn test_write_cursor_windows_follow_buffers() {
        let pool = Pool::new();
        let mut frame = frame_with_buffers(&pool, &[100, 100, 100]);

        let mut sizes = Vec::new();
        let mut cursor = frame.write_cursor(0, 250).unwrap();
        loop {
            sizes.push(cursor.size());
            let len = cursor.window().len();
            cursor.window().copy_from_slice(&vec![0xAA; len]);
            if !cursor.next() {
                break;
            }
        }
        assert_eq!(sizes, vec![100, 100, 50]);
        assert_eq!(frame.payload(), 250);
    }

    #[test]
    fn test_write_cursor_short_completion_stays_in_buffer() {
        let pool = Pool::new();
        let mut frame = frame_with_buffers(&pool, &[100]);

        let mut cursor = frame.write_cursor(0, 60).unwrap();
        assert_eq!(cursor.size(), 60);
        cursor.window()[..20].copy_from_slice(&[1u8; 20]);
        cursor.completed(20);
        assert!(cursor.next());
        // Still in the same buffer, window resumes after the short write.
        assert_eq!(cursor.size(), 40);
        assert_eq!(cursor.remaining(), 40);
    }

    #[test]
    fn test_read_cursor_roundtrip() {
        let pool = Pool::new();
        let mut frame = frame_with_buffers(&pool, &[7, 9]);
        let src: Vec<u8> = (0..16).collect();
        frame.write(0, &src).unwrap();

        let mut out = Vec::new();
        let mut cursor = frame.read_cursor(0, 16).unwrap();
        loop {
            out.extend_from_slice(cursor.window());
            if !cursor.next() {
                break;
            }
        }
        assert_eq!(out, src);
    }

    #[test]
    fn test_clear_releases_buffers() {
        let pool = Pool::new();
        let mut frame = frame_with_buffers(&pool, &[32, 32]);
        assert_eq!(pool.alloc_count(), 2);
        frame.clear();
        assert_eq!(frame.count(), 0);
        assert_eq!(pool.alloc_count(), 0);
    }
}
