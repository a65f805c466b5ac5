use crate::error::Error;

/// MSB-first bit writer over big-endian 32-bit words. Used as the output
/// stage of every encoder in the crate.
///
/// Writes accumulate in a 64-bit buffer; whenever 32 or more bits are
/// pending, one word is emitted. Words are serialized big-endian
/// regardless of host byte order, so compressed blocks are portable
/// across machines. The word capacity is fixed at construction; a write
/// that would overflow it returns `Err(CapacityExceeded)` instead of
/// growing.
#[derive(Debug)]
pub struct BitWriter {
    words: Vec<u32>,
    capacity_words: usize,
    /// Pending bits, left-aligned.
    buffer: u64,
    /// Number of valid bits in `buffer`.
    pending: u32,
    /// Total bits written so far, excluding flush padding.
    bit_count: usize,
}

impl BitWriter {
    /// Creates a writer with room for `capacity_bytes` of packed output.
    ///
    /// The actual limit is rounded up to a whole number of words plus one
    /// spare, so a writer can always flush its final partial word.
    pub fn new(capacity_bytes: usize) -> Self {
        let capacity_words = capacity_bytes / 4 + 1;
        Self {
            words: Vec::with_capacity(capacity_words),
            capacity_words,
            buffer: 0,
            pending: 0,
            bit_count: 0,
        }
    }

    /// Appends the low `len` bits of `content`, MSB-first. `len` must be
    /// at most 32; `len == 0` is a no-op.
    pub fn write(&mut self, content: u64, len: u32) -> Result<(), Error> {
        debug_assert!(len <= 32);
        if len == 0 {
            return Ok(());
        }
        self.ensure(len)?;
        let content = content << (64 - len);
        self.buffer |= content >> self.pending;
        self.pending += len;
        if self.pending >= 32 {
            self.words.push((self.buffer >> 32) as u32);
            self.buffer <<= 32;
            self.pending -= 32;
        }
        self.bit_count += len as usize;
        Ok(())
    }

    /// Appends the low `len` bits of `content` for `len` up to 64,
    /// splitting into two word-sized writes when needed.
    pub fn write_long(&mut self, content: u64, len: u32) -> Result<(), Error> {
        debug_assert!(len <= 64);
        if len > 32 {
            self.write(content >> (len - 32), 32)?;
            self.write(content, len - 32)
        } else {
            self.write(content, len)
        }
    }

    /// Appends a single bit.
    #[inline]
    pub fn write_bit(&mut self, bit: bool) -> Result<(), Error> {
        self.write(bit as u64, 1)
    }

    /// Emits any partial trailing word, zero-padded. Idempotent once the
    /// pending buffer is empty; call after the last write.
    pub fn flush(&mut self) {
        if self.pending > 0 {
            self.words.push((self.buffer >> 32) as u32);
            self.buffer = 0;
            self.pending = 0;
        }
    }

    /// Total bits written so far. Flush padding is not counted.
    #[inline]
    pub fn len_bits(&self) -> usize {
        self.bit_count
    }

    /// Serializes the first `byte_len` bytes of the word buffer,
    /// big-endian. Call only after `flush()`; `byte_len` must not exceed
    /// the flushed word buffer.
    pub fn bytes(&self, byte_len: usize) -> Vec<u8> {
        debug_assert!(self.pending == 0, "bytes() before flush()");
        debug_assert!(byte_len <= self.words.len() * 4);
        let mut out = Vec::with_capacity(byte_len);
        for word in &self.words {
            if out.len() >= byte_len {
                break;
            }
            out.extend_from_slice(&word.to_be_bytes());
        }
        out.truncate(byte_len);
        out
    }

    fn ensure(&self, len: u32) -> Result<(), Error> {
        let needed_bits = self.bit_count + len as usize;
        let capacity_bits = self.capacity_words * 32;
        if needed_bits > capacity_bits {
            return Err(Error::CapacityExceeded {
                needed_bits,
                capacity_bits,
            });
        }
        Ok(())
    }
}

/// MSB-first bit reader over big-endian 32-bit words.
///
/// Maintains a 64-bit lookahead refilled one word at a time. Reads past
/// the end of input yield zero bits; termination is the caller's to
/// detect (a sentinel value or a known value count), with
/// [`remaining_bits`] available to fail fast on truncated streams.
///
/// [`remaining_bits`]: BitReader::remaining_bits
#[derive(Debug)]
pub struct BitReader<'a> {
    bytes: &'a [u8],
    total_words: usize,
    /// Index of the next word to load into the lookahead.
    cursor: usize,
    /// Lookahead bits, left-aligned.
    buffer: u64,
    /// Number of valid bits in `buffer`; between 32 and 64 outside of
    /// `forward`, with 64 doubling as the exhausted marker.
    available: u32,
    /// Bits consumed so far, including any virtual zero tail.
    consumed: usize,
}

impl<'a> BitReader<'a> {
    /// Creates a reader over packed bytes. A trailing partial word is
    /// zero-padded; empty input behaves as an all-zero stream.
    pub fn new(bytes: &'a [u8]) -> Self {
        let total_words = (bytes.len() + 3) / 4;
        let mut reader = Self {
            bytes,
            total_words,
            cursor: 1,
            buffer: 0,
            available: 32,
            consumed: 0,
        };
        reader.buffer = (reader.word(0) as u64) << 32;
        reader
    }

    /// Returns the next `len` bits (1..=32) without consuming them.
    #[inline]
    pub fn peek(&self, len: u32) -> u64 {
        debug_assert!(len >= 1 && len <= 32);
        self.buffer >> (64 - len)
    }

    /// Consumes `len` bits (at most 32) and refills the lookahead.
    pub fn forward(&mut self, len: u32) {
        debug_assert!(len <= 32);
        self.consumed += len as usize;
        self.available -= len;
        self.buffer <<= len;
        if self.available < 32 {
            if self.cursor < self.total_words {
                self.buffer |= (self.word(self.cursor) as u64) << (32 - self.available);
                self.available += 32;
                self.cursor += 1;
            } else {
                // Input exhausted; the lookahead continues as zeros.
                self.available = 64;
            }
        }
    }

    /// Reads `len` bits (up to 32) as an unsigned integer.
    pub fn read_int(&mut self, len: u32) -> u32 {
        if len == 0 {
            return 0;
        }
        let value = self.peek(len);
        self.forward(len);
        value as u32
    }

    /// Reads `len` bits (up to 64) as an unsigned integer.
    pub fn read_long(&mut self, len: u32) -> u64 {
        debug_assert!(len <= 64);
        if len == 0 {
            return 0;
        }
        if len > 32 {
            let mut value = self.peek(32);
            self.forward(32);
            value <<= len - 32;
            value |= self.peek(len - 32);
            self.forward(len - 32);
            value
        } else {
            let value = self.peek(len);
            self.forward(len);
            value
        }
    }

    /// Reads a single bit.
    #[inline]
    pub fn read_bit(&mut self) -> bool {
        self.read_int(1) == 1
    }

    /// Bits of real input not yet consumed. Zero means every further read
    /// comes from the virtual zero tail.
    #[inline]
    pub fn remaining_bits(&self) -> usize {
        (self.bytes.len() * 8).saturating_sub(self.consumed)
    }

    fn word(&self, index: usize) -> u32 {
        if index >= self.total_words {
            return 0;
        }
        let start = index * 4;
        let end = (start + 4).min(self.bytes.len());
        let mut raw = [0u8; 4];
        raw[..end - start].copy_from_slice(&self.bytes[start..end]);
        u32::from_be_bytes(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_produces_big_endian_words() {
        let mut writer = BitWriter::new(16);
        writer.write(0x0102_0304, 32).unwrap();
        writer.flush();
        assert_eq!(writer.bytes(4), vec![0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_write_packs_msb_first() {
        let mut writer = BitWriter::new(16);
        writer.write_bit(true).unwrap();
        writer.write_bit(false).unwrap();
        writer.write_bit(true).unwrap();
        writer.flush();
        // 101 followed by zero padding.
        assert_eq!(writer.len_bits(), 3);
        assert_eq!(writer.bytes(1), vec![0b1010_0000]);
    }

    #[test]
    fn test_write_spans_word_boundary() {
        let mut writer = BitWriter::new(16);
        writer.write(0xABCD, 16).unwrap();
        writer.write(0x1234_5678 >> 16, 16).unwrap();
        writer.write(0x5678, 16).unwrap();
        writer.flush();
        assert_eq!(writer.len_bits(), 48);
        assert_eq!(writer.bytes(6), vec![0xAB, 0xCD, 0x12, 0x34, 0x56, 0x78]);
    }

    #[test]
    fn test_write_long_full_width() {
        let mut writer = BitWriter::new(16);
        writer.write_long(0xDEAD_BEEF_CAFE_F00D, 64).unwrap();
        writer.flush();
        let bytes = writer.bytes(8);
        let mut reader = BitReader::new(&bytes);
        assert_eq!(reader.read_long(64), 0xDEAD_BEEF_CAFE_F00D);
    }

    #[test]
    fn test_write_masks_high_bits() {
        let mut writer = BitWriter::new(16);
        writer.write(0xFFFF_FFFF, 4).unwrap();
        writer.flush();
        assert_eq!(writer.bytes(1), vec![0xF0]);
    }

    #[test]
    fn test_roundtrip_mixed_widths() {
        let mut writer = BitWriter::new(64);
        writer.write_bit(true).unwrap();
        writer.write(0b10110, 5).unwrap();
        writer.write(0x7FF, 11).unwrap();
        writer.write_long(0x0123_4567_89AB_CDEF, 61).unwrap();
        writer.write(0, 2).unwrap();
        writer.write(3, 2).unwrap();
        writer.flush();

        let bytes = writer.bytes((writer.len_bits() + 7) / 8);
        let mut reader = BitReader::new(&bytes);
        assert!(reader.read_bit());
        assert_eq!(reader.read_int(5), 0b10110);
        assert_eq!(reader.read_int(11), 0x7FF);
        assert_eq!(reader.read_long(61), 0x0123_4567_89AB_CDEF & ((1u64 << 61) - 1));
        assert_eq!(reader.read_int(2), 0);
        assert_eq!(reader.read_int(2), 3);
    }

    #[test]
    fn test_peek_does_not_consume() {
        let mut writer = BitWriter::new(16);
        writer.write(0b1100, 4).unwrap();
        writer.flush();
        let bytes = writer.bytes(1);
        let mut reader = BitReader::new(&bytes);
        assert_eq!(reader.peek(4), 0b1100);
        assert_eq!(reader.peek(4), 0b1100);
        assert_eq!(reader.read_int(4), 0b1100);
    }

    #[test]
    fn test_reads_past_end_yield_zeros() {
        let mut writer = BitWriter::new(8);
        writer.write(0xFF, 8).unwrap();
        writer.flush();
        let bytes = writer.bytes(1);
        let mut reader = BitReader::new(&bytes);
        assert_eq!(reader.read_int(8), 0xFF);
        assert_eq!(reader.remaining_bits(), 0);
        assert_eq!(reader.read_long(64), 0);
        assert_eq!(reader.read_int(32), 0);
        assert!(!reader.read_bit());
    }

    #[test]
    fn test_empty_input_reads_as_zeros() {
        let mut reader = BitReader::new(&[]);
        assert_eq!(reader.remaining_bits(), 0);
        assert_eq!(reader.read_long(64), 0);
    }

    #[test]
    fn test_remaining_bits_tracks_consumption() {
        let mut writer = BitWriter::new(16);
        writer.write_long(0, 40).unwrap();
        writer.flush();
        let bytes = writer.bytes(5);
        let mut reader = BitReader::new(&bytes);
        assert_eq!(reader.remaining_bits(), 40);
        reader.forward(7);
        assert_eq!(reader.remaining_bits(), 33);
        assert_eq!(reader.read_long(33), 0);
        assert_eq!(reader.remaining_bits(), 0);
    }

    #[test]
    fn test_capacity_exceeded() {
        // 4 bytes rounds up to one word plus the spare, 64 bits of room.
        let mut writer = BitWriter::new(4);
        writer.write_long(0, 64).unwrap();
        let err = writer.write_bit(false).unwrap_err();
        assert_eq!(
            err,
            Error::CapacityExceeded {
                needed_bits: 65,
                capacity_bits: 64,
            }
        );
        // The failed write left the stream untouched.
        assert_eq!(writer.len_bits(), 64);
    }

    #[test]
    fn test_flush_is_idempotent() {
        let mut writer = BitWriter::new(16);
        writer.write(0b101, 3).unwrap();
        writer.flush();
        writer.flush();
        assert_eq!(writer.bytes(1), vec![0b1010_0000]);
    }
}
