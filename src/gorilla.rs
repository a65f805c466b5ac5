use crate::bitstream::{BitReader, BitWriter};
use crate::error::Error;
use crate::CompressedBlock;

/// The Gorilla value compressor: XOR against the immediately previous
/// value with a cached leading/trailing zero window.
///
/// Each value after the first is XORed with its predecessor. An identical
/// value costs one bit. A changed value either reuses the previously
/// signaled zero-run window (when its own zero runs fit inside it) or
/// signals a new window with a 5-bit leading-zero count and a 6-bit
/// significant-bit count.
///
/// The stream is terminated by a quiet-NaN sentinel written by `close()`,
/// so NaN itself is not encodable.
///
/// # Example
/// ```
/// use floatpack::{GorillaDecoder, GorillaEncoder};
///
/// let mut encoder = GorillaEncoder::new(3);
/// encoder.add_value(12.0).unwrap();
/// encoder.add_value(12.5).unwrap();
/// encoder.add_value(13.0).unwrap();
/// encoder.close().unwrap();
///
/// let block = encoder.into_compressed().unwrap();
/// let values = GorillaDecoder::decode(&block.bytes).unwrap();
/// assert_eq!(values, vec![12.0, 12.5, 13.0]);
/// ```
#[derive(Debug)]
pub struct GorillaEncoder {
    writer: BitWriter,
    prev_bits: u64,
    /// Leading-zero count of the last signaled window; `u32::MAX` until
    /// the first new-window header has been written.
    cached_lead: u32,
    cached_trail: u32,
    count: usize,
    first: bool,
    closed: bool,
}

impl GorillaEncoder {
    /// Creates an encoder sized for `capacity` values.
    ///
    /// The output buffer is sized for the worst case (every value taking
    /// the full new-window encoding) plus the terminator, so a block that
    /// stays within `capacity` values never sees `CapacityExceeded`.
    pub fn new(capacity: usize) -> Self {
        Self {
            writer: BitWriter::new(2 * capacity * 8 + 16),
            prev_bits: 0,
            cached_lead: u32::MAX,
            cached_trail: 0,
            count: 0,
            first: true,
            closed: false,
        }
    }

    /// Appends one value to the stream.
    ///
    /// Values must be pushed in their original order. NaN is rejected
    /// with `DomainError` since its bit pattern terminates the stream;
    /// every other value, including infinities and negative zero,
    /// round-trips bit-exactly.
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
            self.writer.write_long(bits, 64)?;
            self.prev_bits = bits;
            return Ok(());
        }

        let xored = self.prev_bits ^ bits;
        if xored == 0 {
            self.writer.write_bit(false)?;
        } else {
            self.writer.write_bit(true)?;
            // The 5-bit header field caps the signaled leading count at 31;
            // the window merely starts earlier than the actual zero run.
            let lead = xored.leading_zeros().min(31);
            let trail = xored.trailing_zeros();

            if lead >= self.cached_lead && trail >= self.cached_trail {
                self.writer.write_bit(false)?;
                let sig = 64 - self.cached_lead - self.cached_trail;
                self.writer.write_long(xored >> self.cached_trail, sig)?;
            } else {
                self.cached_lead = lead;
                self.cached_trail = trail;
                let sig = 64 - lead - trail;
                // 64 significant bits are signaled as 0.
                let sig_field = if sig == 64 { 0 } else { sig };
                self.writer.write_bit(true)?;
                self.writer.write(lead as u64, 5)?;
                self.writer.write(sig_field as u64, 6)?;
                self.writer.write_long(xored >> trail, sig)?;
            }
        }
        self.prev_bits = bits;
        Ok(())
    }
}

/// Lazily decodes a Gorilla stream, yielding one value per iteration
/// until the NaN terminator (which is not yielded) or an error.
///
/// # Example
/// ```
/// use floatpack::{GorillaDecoder, GorillaEncoder};
///
/// let mut encoder = GorillaEncoder::new(2);
/// encoder.add_value(1.5).unwrap();
/// encoder.add_value(1.5).unwrap();
/// encoder.close().unwrap();
/// let block = encoder.into_compressed().unwrap();
///
/// let mut total = 0.0;
/// for value in GorillaDecoder::new(&block.bytes) {
///     total += value.unwrap();
/// }
/// assert_eq!(total, 3.0);
/// ```
#[derive(Debug)]
pub struct GorillaDecoder<'a> {
    reader: BitReader<'a>,
    prev_bits: u64,
    lead: u32,
    trail: u32,
    first: bool,
    done: bool,
}

impl<'a> GorillaDecoder<'a> {
    /// Creates a decoder over a packed Gorilla stream.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            reader: BitReader::new(bytes),
            prev_bits: 0,
            lead: u32::MAX,
            trail: 0,
            first: true,
            done: false,
        }
    }

    /// Decodes an entire stream into a vector.
    pub fn decode(bytes: &[u8]) -> Result<Vec<f64>, Error> {
        GorillaDecoder::new(bytes).collect()
    }

    fn next_value(&mut self) -> Result<f64, Error> {
        if self.reader.remaining_bits() == 0 {
            return Err(Error::CorruptStream("stream ended before the terminator"));
        }
        if self.first {
            self.first = false;
            let bits = self.reader.read_long(64);
            self.prev_bits = bits;
            return Ok(f64::from_bits(bits));
        }

        if !self.reader.read_bit() {
            // Identical to the previous value.
            return Ok(f64::from_bits(self.prev_bits));
        }
        if self.reader.read_bit() {
            self.lead = self.reader.read_int(5);
            let sig = self.reader.read_int(6);
            let sig = if sig == 0 { 64 } else { sig };
            if self.lead + sig > 64 {
                return Err(Error::CorruptStream("window header exceeds the value width"));
            }
            self.trail = 64 - sig - self.lead;
        } else if self.lead == u32::MAX {
            return Err(Error::CorruptStream("window reuse before any window header"));
        }
        let sig = 64 - self.lead - self.trail;
        let bits = (self.reader.read_long(sig) << self.trail) ^ self.prev_bits;
        self.prev_bits = bits;
        Ok(f64::from_bits(bits))
    }
}

impl<'a> Iterator for GorillaDecoder<'a> {
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
