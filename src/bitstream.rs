//! Compressed-data buffer shared between the application and the pipelines.
//!
//! The application owns the buffer. The decoder consumes from `data_offset`,
//! the encoder appends after `data_offset + data_length`. `compact` moves the
//! unread window to the front so the application can refill the tail.

use crate::param::CodecId;
use crate::status::{VplError, VplResult};

#[derive(Debug)]
pub struct Bitstream {
    data: Vec<u8>,
    data_offset: usize,
    data_length: usize,
    pub codec_id: Option<CodecId>,
    pub time_stamp: u64,
}

impl Bitstream {
    /// Create a buffer with the given capacity (`max_length`).
    pub fn with_capacity(max_length: usize) -> Bitstream {
        Bitstream {
            data: vec![0; max_length],
            data_offset: 0,
            data_length: 0,
            codec_id: None,
            time_stamp: 0,
        }
    }

    pub fn max_length(&self) -> usize {
        self.data.len()
    }

    pub fn data_offset(&self) -> usize {
        self.data_offset
    }

    pub fn data_length(&self) -> usize {
        self.data_length
    }

    /// The unread window.
    pub fn unread(&self) -> &[u8] {
        &self.data[self.data_offset..self.data_offset + self.data_length]
    }

    /// Append bytes after the unread window. Fails with `NotEnoughBuffer`
    /// when they do not fit; the buffer is left unchanged in that case.
    pub fn append(&mut self, bytes: &[u8]) -> VplResult<()> {
        let end = self.data_offset + self.data_length;
        if bytes.len() > self.max_length() - end {
            return Err(VplError::NotEnoughBuffer);
        }
        self.data[end..end + bytes.len()].copy_from_slice(bytes);
        self.data_length += bytes.len();
        Ok(())
    }

    /// Advance the read cursor past `n` consumed bytes.
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.data_length);
        self.data_offset += n;
        self.data_length -= n;
    }

    /// Drain the whole unread window, returning it as an owned vector.
    pub fn take_unread(&mut self) -> Vec<u8> {
        let out = self.unread().to_vec();
        self.data_offset = 0;
        self.data_length = 0;
        out
    }

    /// Move any unread bytes to the start of the buffer and zero the offset,
    /// making room at the tail for the next refill.
    pub fn compact(&mut self) {
        if self.data_offset == 0 {
            return;
        }
        self.data
            .copy_within(self.data_offset..self.data_offset + self.data_length, 0);
        self.data_offset = 0;
    }

    /// Free bytes available for `append` without compacting.
    pub fn spare(&self) -> usize {
        self.max_length() - self.data_offset - self.data_length
    }
}
