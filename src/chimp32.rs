use crate::bitstream::{BitReader, BitWriter};
use crate::chimp::{
    validate_history, DEFAULT_HISTORY, LEADING_DECODE, LEADING_REPRESENTATION, LEADING_ROUND,
};
use crate::error::Error;
use crate::CompressedBlock;

/// The Chimp compressor for 32-bit values.
///
/// Same ring-history scheme as [`ChimpEncoder`](crate::ChimpEncoder)
/// with the widths scaled down: a 5-bit significant-count field, a
/// far-match threshold of `5 + log2(W)` and a 32-bit literal first
/// value. Unlike the 64-bit codec it recomputes the trailing-zero count
/// after falling back to the previous value.
///
/// # Example
/// ```
/// use floatpack::{Chimp32Decoder, Chimp32Encoder};
///
/// let mut encoder = Chimp32Encoder::new(3);
/// for v in [9.5f32, 9.5, 10.25] {
///     encoder.add_value(v).unwrap();
/// }
/// encoder.close().unwrap();
///
/// let block = encoder.into_compressed().unwrap();
/// let values = Chimp32Decoder::decode(&block.bytes).unwrap();
/// assert_eq!(values, vec![9.5, 9.5, 10.25]);
/// ```
#[derive(Debug)]
pub struct Chimp32Encoder {
    writer: BitWriter,
    ring: Vec<u32>,
    indices: Vec<u64>,
    w: usize,
    log2w: u32,
    threshold: u32,
    key_mask: usize,
    flag_zero_size: u32,
    flag_one_size: u32,
    index: u64,
    current: usize,
    /// 33 when the next changed value must signal a fresh window.
    stored_lead: u32,
    count: usize,
    first: bool,
    closed: bool,
}

impl Chimp32Encoder {
    /// Creates an encoder sized for `capacity` values with the default
    /// history of [`DEFAULT_HISTORY`] values.
    pub fn new(capacity: usize) -> Self {
        Self::with_params(capacity, DEFAULT_HISTORY)
    }

    /// Creates an encoder with an explicit history size, which must be a
    /// power of two in `2..=`[`MAX_HISTORY`](crate::MAX_HISTORY).
    pub fn with_history(capacity: usize, w: usize) -> Result<Self, Error> {
        validate_history(w)?;
        Ok(Self::with_params(capacity, w))
    }

    fn with_params(capacity: usize, w: usize) -> Self {
        let log2w = w.trailing_zeros();
        let threshold = 5 + log2w;
        Self {
            // Worst case is 37 bits per value plus the literal first
            // value and the terminator.
            writer: BitWriter::new(capacity * 5 + 16),
            ring: vec![0; w],
            indices: vec![0; 1 << (threshold + 1)],
            w,
            log2w,
            threshold,
            key_mask: (1 << (threshold + 1)) - 1,
            flag_zero_size: log2w + 2,
            flag_one_size: log2w + 10,
            index: 0,
            current: 0,
            stored_lead: 33,
            count: 0,
            first: true,
            closed: false,
        }
    }

    /// Appends one value to the stream.
    pub fn add_value(&mut self, value: f32) -> Result<(), Error> {
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
        self.push_bits(f32::NAN.to_bits())?;
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

    fn push_bits(&mut self, bits: u32) -> Result<(), Error> {
        if self.first {
            self.first = false;
            self.ring[0] = bits;
            self.writer.write(bits as u64, 32)?;
            self.indices[(bits as usize) & self.key_mask] = 0;
            return Ok(());
        }

        let key = (bits as usize) & self.key_mask;
        let candidate = self.indices[key];
        let (previous_index, xored, trailing) = if self.index - candidate < self.w as u64 {
            let position = candidate as usize % self.w;
            let temp_xor = bits ^ self.ring[position];
            let trailing = temp_xor.trailing_zeros();
            if trailing > self.threshold {
                (position, temp_xor, trailing)
            } else {
                let position = self.index as usize % self.w;
                let xored = self.ring[position] ^ bits;
                (position, xored, xored.trailing_zeros())
            }
        } else {
            let position = self.index as usize % self.w;
            let xored = self.ring[position] ^ bits;
            (position, xored, xored.trailing_zeros())
        };

        if xored == 0 {
            self.writer.write(previous_index as u64, self.flag_zero_size)?;
            self.stored_lead = 33;
        } else {
            let lead = LEADING_ROUND[xored.leading_zeros() as usize];
            if trailing > self.threshold {
                let sig = 32 - lead - trailing;
                let header = (256 * (self.w + previous_index)) as u64
                    + 32 * LEADING_REPRESENTATION[lead as usize] as u64
                    + sig as u64;
                self.writer.write(header, self.flag_one_size)?;
                self.writer.write((xored >> trailing) as u64, sig)?;
                self.stored_lead = 33;
            } else if lead == self.stored_lead {
                self.writer.write(2, 2)?;
                self.writer.write(xored as u64, 32 - lead)?;
            } else {
                self.stored_lead = lead;
                self.writer
                    .write((24 + LEADING_REPRESENTATION[lead as usize]) as u64, 5)?;
                self.writer.write(xored as u64, 32 - lead)?;
            }
        }

        self.current = (self.current + 1) % self.w;
        self.ring[self.current] = bits;
        self.index += 1;
        self.indices[key] = self.index;
        Ok(())
    }
}

/// Lazily decodes a 32-bit Chimp stream until the NaN terminator or an
/// error. Must be constructed with the encoder's history size.
#[derive(Debug)]
pub struct Chimp32Decoder<'a> {
    reader: BitReader<'a>,
    ring: Vec<u32>,
    w: usize,
    log2w: u32,
    initial_fill: u32,
    stored_lead: u32,
    prev_bits: u32,
    current: usize,
    first: bool,
    done: bool,
}

impl<'a> Chimp32Decoder<'a> {
    /// Creates a decoder over a stream encoded with the default history.
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
            initial_fill: log2w + 8,
            stored_lead: 0,
            prev_bits: 0,
            current: 0,
            first: true,
            done: false,
        }
    }

    /// Decodes an entire default-history stream into a vector.
    pub fn decode(bytes: &[u8]) -> Result<Vec<f32>, Error> {
        Chimp32Decoder::new(bytes).collect()
    }

    /// Decodes an entire stream encoded with history size `w`.
    pub fn decode_with_history(bytes: &[u8], w: usize) -> Result<Vec<f32>, Error> {
        Chimp32Decoder::with_history(bytes, w)?.collect()
    }

    fn next_value(&mut self) -> Result<f32, Error> {
        if self.reader.remaining_bits() == 0 {
            return Err(Error::CorruptStream("stream ended before the terminator"));
        }
        if self.first {
            self.first = false;
            let bits = self.reader.read_int(32);
            self.prev_bits = bits;
            self.ring[0] = bits;
            return Ok(f32::from_bits(bits));
        }

        let bits = match self.reader.read_int(2) {
            3 => {
                self.stored_lead = LEADING_DECODE[self.reader.read_int(3) as usize];
                self.reader.read_int(32 - self.stored_lead) ^ self.prev_bits
            }
            2 => self.reader.read_int(32 - self.stored_lead) ^ self.prev_bits,
            1 => {
                let header = self.reader.read_int(self.initial_fill);
                let position = (header >> 8) as usize;
                let lead = LEADING_DECODE[(header >> 5) as usize & 0x7];
                let sig = match header & 0x1F {
                    0 => 32,
                    s => s,
                };
                if lead + sig > 32 {
                    return Err(Error::CorruptStream("far-match header exceeds the value width"));
                }
                let trail = 32 - sig - lead;
                (self.reader.read_int(sig) << trail) ^ self.ring[position]
            }
            _ => {
                let position = self.reader.read_int(self.log2w) as usize;
                self.ring[position]
            }
        };

        self.current = (self.current + 1) % self.w;
        self.ring[self.current] = bits;
        self.prev_bits = bits;
        Ok(f32::from_bits(bits))
    }
}

impl<'a> Iterator for Chimp32Decoder<'a> {
    type Item = Result<f32, Error>;

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
