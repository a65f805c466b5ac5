use crate::bitstream::{BitReader, BitWriter};
use crate::error::Error;
use crate::CompressedBlock;

/// Default ring history size. Both sides of a stream must agree on the
/// history size; 128 matches the published Chimp128 configuration.
pub const DEFAULT_HISTORY: usize = 128;

/// Upper bound on the configurable history size. Keeps the far-match
/// header within a single 32-bit stream write and the hash index at a
/// sane allocation.
pub const MAX_HISTORY: usize = 65536;

/// Rounds a raw leading-zero count down to its bucket representative.
/// Shared by the 64-bit and 32-bit codecs (a 32-bit count indexes the
/// low half).
pub(crate) const LEADING_ROUND: [u32; 64] = [
    0, 0, 0, 0, 0, 0, 0, 0, 8, 8, 8, 8, 12, 12, 12, 12, //
    16, 16, 18, 18, 20, 20, 22, 22, 24, 24, 24, 24, 24, 24, 24, 24, //
    24, 24, 24, 24, 24, 24, 24, 24, 24, 24, 24, 24, 24, 24, 24, 24, //
    24, 24, 24, 24, 24, 24, 24, 24, 24, 24, 24, 24, 24, 24, 24, 24,
];

/// Maps a raw leading-zero count to its 3-bit bucket index.
pub(crate) const LEADING_REPRESENTATION: [u32; 64] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, //
    3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 7, 7, 7, 7, 7, 7, //
    7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, //
    7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7,
];

/// Inverse of `LEADING_REPRESENTATION`: bucket index back to the
/// representative leading-zero count.
pub(crate) const LEADING_DECODE: [u32; 8] = [0, 8, 12, 16, 18, 20, 22, 24];

pub(crate) fn validate_history(w: usize) -> Result<(), Error> {
    if !w.is_power_of_two() || w < 2 || w > MAX_HISTORY {
        return Err(Error::UsageError(
            "history size must be a power of two between 2 and 65536",
        ));
    }
    Ok(())
}

/// The Chimp compressor for 64-bit values: XOR-delta with a bounded
/// ring history.
///
/// A direct-mapped index keyed on each value's low bits proposes a
/// recent history slot to XOR against. The candidate is taken when its
/// XOR clears more than `threshold` trailing bits (a *far match*, which
/// also covers exact repeats of any live slot); otherwise the codec
/// falls back to the immediately previous value with Gorilla-style
/// window signaling. The decoder maintains the same ring, so matches
/// are encoded by ring position alone.
///
/// The stream is terminated by a quiet-NaN sentinel written by
/// `close()`; both sides must agree on the history size.
///
/// # Example
/// ```
/// use floatpack::{ChimpDecoder, ChimpEncoder};
///
/// let mut encoder = ChimpEncoder::new(4);
/// for v in [20.5, 20.5, 21.0, 20.5] {
///     encoder.add_value(v).unwrap();
/// }
/// encoder.close().unwrap();
///
/// let block = encoder.into_compressed().unwrap();
/// let values = ChimpDecoder::decode(&block.bytes).unwrap();
/// assert_eq!(values, vec![20.5, 20.5, 21.0, 20.5]);
/// ```
#[derive(Debug)]
pub struct ChimpEncoder {
    writer: BitWriter,
    ring: Vec<u64>,
    /// Key (low bits of a value) to the logical index of its most recent
    /// insertion. Entries may be stale; liveness is checked against the
    /// current logical index.
    indices: Vec<u64>,
    w: usize,
    log2w: u32,
    threshold: u32,
    key_mask: usize,
    flag_zero_size: u32,
    flag_one_size: u32,
    /// Logical index of the most recent insertion.
    index: u64,
    /// Ring position of the most recent insertion.
    current: usize,
    /// Rounded leading-zero count of the last signaled window; 65 when
    /// the next changed value must signal a fresh window.
    stored_lead: u32,
    count: usize,
    first: bool,
    closed: bool,
}

impl ChimpEncoder {
    /// Creates an encoder sized for `capacity` values with the default
    /// history of [`DEFAULT_HISTORY`] values.
    pub fn new(capacity: usize) -> Self {
        Self::with_params(capacity, DEFAULT_HISTORY)
    }

    /// Creates an encoder with an explicit history size, which must be a
    /// power of two in `2..=`[`MAX_HISTORY`].
    pub fn with_history(capacity: usize, w: usize) -> Result<Self, Error> {
        validate_history(w)?;
        Ok(Self::with_params(capacity, w))
    }

    fn with_params(capacity: usize, w: usize) -> Self {
        let log2w = w.trailing_zeros();
        let threshold = 6 + log2w;
        Self {
            // Worst case is 69 bits per value plus the literal first
            // value and the terminator.
            writer: BitWriter::new(capacity * 9 + 24),
            ring: vec![0; w],
            indices: vec![0; 1 << (threshold + 1)],
            w,
            log2w,
            threshold,
            key_mask: (1 << (threshold + 1)) - 1,
            flag_zero_size: log2w + 2,
            flag_one_size: log2w + 11,
            index: 0,
            current: 0,
            stored_lead: 65,
            count: 0,
            first: true,
            closed: false,
        }
    }

    /// Appends one value to the stream.
    ///
    /// NaN is rejected with `DomainError` since its bit pattern
    /// terminates the stream.
    pub fn add_value(&mut self, value: f64) -> Result<(), Error> {
        if self.closed {
            return Err(Error::UsageError("add_value after close"));
        }
        if value.is_nan() {
            return Err(Error::DomainError("NaN is reserved for the stream terminator"));
        }
        self.push_bits(value.to_bits())?;
        self.count += 1;
        Ok(())
    }

    /// Writes the NaN terminator and flushes the stream. Idempotent.
    pub fn close(&mut self) -> Result<(), Error> {
        if self.closed {
            return Ok(());
        }
        self.push_bits(f64::NAN.to_bits())?;
        self.writer.flush();
        self.closed = true;
        Ok(())
    }

    /// Number of values encoded so far (the terminator is not counted).
    pub fn count(&self) -> usize {
        self.count
    }

    /// Total bits written so far, excluding flush padding.
    pub fn size_bits(&self) -> usize {
        self.writer.len_bits()
    }

    /// Consumes the encoder and returns the packed block.
    ///
    /// Returns `UsageError` if the stream was not closed.
    pub fn into_compressed(self) -> Result<CompressedBlock, Error> {
        if !self.closed {
            return Err(Error::UsageError("into_compressed before close"));
        }
        let size_bits = self.writer.len_bits();
        let bytes = self.writer.bytes((size_bits + 7) / 8);
        Ok(CompressedBlock {
            bytes,
            size_bits,
            count: self.count,
        })
    }

    fn push_bits(&mut self, bits: u64) -> Result<(), Error> {
        if self.first {
            self.first = false;
            self.ring[0] = bits;
            self.writer.write_long(bits, 64)?;
            self.indices[(bits as usize) & self.key_mask] = 0;
            return Ok(());
        }

        let key = (bits as usize) & self.key_mask;
        let candidate = self.indices[key];
        let (previous_index, xored, trailing) = if self.index - candidate < self.w as u64 {
            // The candidate slot still holds the value that was indexed.
            let position = candidate as usize % self.w;
            let temp_xor = bits ^ self.ring[position];
            let trailing = temp_xor.trailing_zeros();
            if trailing > self.threshold {
                (position, temp_xor, trailing)
            } else {
                let position = self.index as usize % self.w;
                (position, self.ring[position] ^ bits, trailing)
            }
        } else {
            let position = self.index as usize % self.w;
            (position, self.ring[position] ^ bits, 0)
        };

        if xored == 0 {
            // Exact repeat of a live slot; the flag and position share
            // one field, the two flag bits being zero.
            self.writer.write(previous_index as u64, self.flag_zero_size)?;
            self.stored_lead = 65;
        } else {
            let lead = LEADING_ROUND[xored.leading_zeros() as usize];
            if trailing > self.threshold {
                // Far match: flag `01`, ring position, leading bucket and
                // significant count packed into one header.
                let sig = 64 - lead - trailing;
                let header = (512 * (self.w + previous_index)) as u64
                    + 64 * LEADING_REPRESENTATION[lead as usize] as u64
                    + sig as u64;
                self.writer.write(header, self.flag_one_size)?;
                self.writer.write_long(xored >> trailing, sig)?;
                self.stored_lead = 65;
            } else if lead == self.stored_lead {
                self.writer.write(2, 2)?;
                self.writer.write_long(xored, 64 - lead)?;
            } else {
                self.stored_lead = lead;
                self.writer
                    .write((24 + LEADING_REPRESENTATION[lead as usize]) as u64, 5)?;
                self.writer.write_long(xored, 64 - lead)?;
            }
        }

        self.current = (self.current + 1) % self.w;
        self.ring[self.current] = bits;
        self.index += 1;
        self.indices[key] = self.index;
        Ok(())
    }
}

/// Lazily decodes a Chimp stream, yielding one value per iteration until
/// the NaN terminator (which is not yielded) or an error.
///
/// Must be constructed with the same history size the encoder used.
#[derive(Debug)]
pub struct ChimpDecoder<'a> {
    reader: BitReader<'a>,
    ring: Vec<u64>,
    w: usize,
    log2w: u32,
    /// Width of the far-match header after the 2-bit flag.
    initial_fill: u32,
    stored_lead: u32,
    prev_bits: u64,
    current: usize,
    first: bool,
    done: bool,
}

impl<'a> ChimpDecoder<'a> {
    /// Creates a decoder over a packed Chimp stream encoded with the
    /// default history size.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self::with_params(bytes, DEFAULT_HISTORY)
    }

    /// Creates a decoder for a stream encoded with history size `w`.
    pub fn with_history(bytes: &'a [u8], w: usize) -> Result<Self, Error> {
        validate_history(w)?;
        Ok(Self::with_params(bytes, w))
    }

    fn with_params(bytes: &'a [u8], w: usize) -> Self {
        let log2w = w.trailing_zeros();
        Self {
            reader: BitReader::new(bytes),
            ring: vec![0; w],
            w,
            log2w,
            initial_fill: log2w + 9,
            stored_lead: 0,
            prev_bits: 0,
            current: 0,
            first: true,
            done: false,
        }
    }

    /// Decodes an entire default-history stream into a vector.
    pub fn decode(bytes: &[u8]) -> Result<Vec<f64>, Error> {
        ChimpDecoder::new(bytes).collect()
    }

    /// Decodes an entire stream encoded with history size `w`.
    pub fn decode_with_history(bytes: &[u8], w: usize) -> Result<Vec<f64>, Error> {
        ChimpDecoder::with_history(bytes, w)?.collect()
    }

    fn next_value(&mut self) -> Result<f64, Error> {
        if self.reader.remaining_bits() == 0 {
            return Err(Error::CorruptStream("stream ended before the terminator"));
        }
        if self.first {
            self.first = false;
            let bits = self.reader.read_long(64);
            self.prev_bits = bits;
            self.ring[0] = bits;
            return Ok(f64::from_bits(bits));
        }

        let bits = match self.reader.read_int(2) {
            3 => {
                self.stored_lead = LEADING_DECODE[self.reader.read_int(3) as usize];
                self.reader.read_long(64 - self.stored_lead) ^ self.prev_bits
            }
            2 => self.reader.read_long(64 - self.stored_lead) ^ self.prev_bits,
            1 => {
                let header = self.reader.read_int(self.initial_fill);
                let position = (header >> 9) as usize;
                let lead = LEADING_DECODE[(header >> 6) as usize & 0x7];
                let sig = match header & 0x3F {
                    0 => 64,
                    s => s,
                };
                if lead + sig > 64 {
                    return Err(Error::CorruptStream("far-match header exceeds the value width"));
                }
                let trail = 64 - sig - lead;
                (self.reader.read_long(sig) << trail) ^ self.ring[position]
            }
            _ => {
                let position = self.reader.read_int(self.log2w) as usize;
                self.ring[position]
            }
        };

        self.current = (self.current + 1) % self.w;
        self.ring[self.current] = bits;
        self.prev_bits = bits;
        Ok(f64::from_bits(bits))
    }
}

impl<'a> Iterator for ChimpDecoder<'a> {
    type Item = Result<f64, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_value() {
            Ok(value) if value.is_nan() => {
                self.done = true;
                None
            }
            Ok(value) => Some(Ok(value)),
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(values: &[f64]) -> Vec<f64> {
        let mut encoder = ChimpEncoder::new(values.len());
        for &v in values {
            encoder.add_value(v).unwrap();
        }
        encoder.close().unwrap();
        let block = encoder.into_compressed().unwrap();
        assert_eq!(block.count, values.len());
        ChimpDecoder::decode(&block.bytes).unwrap()
    }

    #[test]
    fn test_roundtrip_basic() {
        let values = [20.5, 20.5, 21.0, 20.75, 20.5, 19.0];
        assert_eq!(roundtrip(&values), values);
    }

    #[test]
    fn test_roundtrip_special_values() {
        let values = [0.0, -0.0, f64::INFINITY, f64::NEG_INFINITY, 1e-308, -1e300];
        let decoded = roundtrip(&values);
        for (d, v) in decoded.iter().zip(values.iter()) {
            assert_eq!(d.to_bits(), v.to_bits());
        }
    }

    #[test]
    fn test_repeat_of_live_slot_uses_short_code() {
        // With W = 128 the zero-flag code is log2(128) + 2 = 9 bits.
        let x = 42.375f64;
        let mut encoder = ChimpEncoder::new(8);
        encoder.add_value(x).unwrap();
        for i in 0..5u64 {
            // Distinct low bits keep the fillers out of x's index entry.
            let filler = x.to_bits() ^ ((i + 1) << 40) ^ (i + 1);
            encoder.add_value(f64::from_bits(filler)).unwrap();
        }
        let before = encoder.size_bits();
        encoder.add_value(x).unwrap();
        assert_eq!(encoder.size_bits() - before, 9);
    }

    #[test]
    fn test_stale_candidate_falls_back_to_previous() {
        // One value, then enough distinct-key fillers to push its index
        // entry more than W steps behind. Re-adding the value must take
        // the previous-value window path, not a history match.
        let w = 128;
        let x = 1.5f64;
        let mut encoder = ChimpEncoder::with_history(256, w).unwrap();
        encoder.add_value(x).unwrap();
        for i in 0..(w as u64 + 2) {
            encoder.add_value(f64::from_bits(x.to_bits() | (i + 1))).unwrap();
        }
        let before = encoder.size_bits();
        encoder.add_value(x).unwrap();
        // Fallback XOR clears only high bits: same-window flag (2 bits)
        // plus 64 - 24 payload bits.
        assert_eq!(encoder.size_bits() - before, 2 + 40);

        encoder.close().unwrap();
        let block = encoder.into_compressed().unwrap();
        let decoded = ChimpDecoder::decode(&block.bytes).unwrap();
        assert_eq!(decoded.len(), w + 4);
        assert_eq!(decoded[0], x);
        assert_eq!(*decoded.last().unwrap(), x);
    }

    #[test]
    fn test_custom_history_roundtrip() {
        let values: Vec<f64> = (0..40).map(|i| (i % 7) as f64 * 0.25).collect();
        let mut encoder = ChimpEncoder::with_history(values.len(), 16).unwrap();
        for &v in &values {
            encoder.add_value(v).unwrap();
        }
        encoder.close().unwrap();
        let block = encoder.into_compressed().unwrap();
        let decoded = ChimpDecoder::decode_with_history(&block.bytes, 16).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn test_invalid_history_rejected() {
        assert!(matches!(
            ChimpEncoder::with_history(8, 100),
            Err(Error::UsageError(_))
        ));
        assert!(matches!(
            ChimpEncoder::with_history(8, 1),
            Err(Error::UsageError(_))
        ));
        assert!(matches!(
            ChimpDecoder::with_history(&[], MAX_HISTORY * 2),
            Err(Error::UsageError(_))
        ));
    }

    #[test]
    fn test_nan_input_rejected() {
        let mut encoder = ChimpEncoder::new(4);
        assert!(matches!(encoder.add_value(f64::NAN), Err(Error::DomainError(_))));
    }

    #[test]
    fn test_truncated_stream_detected() {
        let mut encoder = ChimpEncoder::new(4);
        for v in [3.0, 3.5, 4.0] {
            encoder.add_value(v).unwrap();
        }
        encoder.close().unwrap();
        let block = encoder.into_compressed().unwrap();
        let truncated = &block.bytes[..6];
        let result: Result<Vec<f64>, Error> = ChimpDecoder::decode(truncated);
        assert!(matches!(result, Err(Error::CorruptStream(_))));
    }
}
