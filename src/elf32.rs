use crate::bitstream::{BitReader, BitWriter};
use crate::decimal::{alpha_and_beta_star32, f_alpha, pow10_neg_32, round_up32, sp32};
use crate::error::Error;
use crate::CompressedBlock;

const BETA_UNSET: u32 = u32::MAX;

/// Rounds a raw 32-bit leading-zero count down to its bucket
/// representative.
const LEADING_ROUND_32: [u32; 32] = [
    0, 0, 0, 0, 0, 0, 6, 6, 6, 6, 10, 10, 12, 12, 14, 14, //
    16, 16, 18, 18, 20, 20, 20, 20, 20, 20, 20, 20, 20, 20, 20, 20,
];

/// Maps a raw 32-bit leading-zero count to its 3-bit bucket index.
const LEADING_REPRESENTATION_32: [u32; 32] = [
    0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 3, 3, 4, 4, //
    5, 5, 6, 6, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7,
];

/// Bucket index back to the representative leading-zero count.
const LEADING_DECODE_32: [u32; 8] = [0, 6, 10, 12, 14, 16, 18, 20];

/// True when the decoder can map an erased value back to a decimal;
/// values that fail are stored bit-exact instead.
fn erasure_recoverable32(erased: u32, beta_star: u32) -> bool {
    let v = f32::from_bits(erased);
    if v == 0.0 {
        return false;
    }
    let sp_prime = sp32(v.abs());
    if beta_star == 0 {
        sp_prime < 0
    } else {
        (0..=38).contains(&(beta_star as i64 - sp_prime as i64 - 1))
    }
}

/// The Elf compressor for 32-bit values: mantissa erasure in front of an
/// XOR stage, with the field widths scaled to single precision. The
/// digit count field is three bits, so values needing more than seven
/// significant digits are stored bit-exact.
///
/// # Example
/// ```
/// use floatpack::{Elf32Decoder, Elf32Encoder};
///
/// let mut encoder = Elf32Encoder::new(3);
/// for v in [3.17f32, 3.23, 3.35] {
///     encoder.add_value(v).unwrap();
/// }
/// encoder.close().unwrap();
///
/// let block = encoder.into_compressed().unwrap();
/// let values = Elf32Decoder::decode(&block.bytes).unwrap();
/// assert_eq!(values, vec![3.17, 3.23, 3.35]);
/// ```
#[derive(Debug)]
pub struct Elf32Encoder {
    writer: BitWriter,
    alpha_cap: Option<u32>,
    last_beta_star: u32,
    stored_bits: u32,
    stored_lead: u32,
    stored_trail: u32,
    first: bool,
    count: usize,
    closed: bool,
}

impl Elf32Encoder {
    /// Creates a lossless encoder sized for `capacity` values.
    pub fn new(capacity: usize) -> Self {
        Self::with_params(capacity, None)
    }

    /// Creates an encoder that keeps every decoded value within
    /// `epsilon` of its original. `epsilon` must be positive and finite.
    pub fn with_error_bound(capacity: usize, epsilon: f32) -> Result<Self, Error> {
        if !epsilon.is_finite() || epsilon <= 0.0 {
            return Err(Error::UsageError("error bound must be positive and finite"));
        }
        let cap = (-(epsilon as f64).log10()).ceil();
        let alpha_cap = if cap < 0.0 { 0 } else { cap as u32 };
        Ok(Self::with_params(capacity, Some(alpha_cap)))
    }

    fn with_params(capacity: usize, alpha_cap: Option<u32>) -> Self {
        Self {
            // Worst case is 46 bits per value plus the literal first
            // value, the terminator and the count word.
            writer: BitWriter::new(capacity * 6 + 16),
            alpha_cap,
            last_beta_star: BETA_UNSET,
            stored_bits: 0,
            stored_lead: u32::MAX,
            stored_trail: u32::MAX,
            first: true,
            count: 0,
            closed: false,
        }
    }

    /// Appends one value to the stream.
    pub fn add_value(&mut self, value: f32) -> Result<(), Error> {
        if self.closed {
            return Err(Error::UsageError("add_value after close"));
        }
        if value.is_nan() {
            return Err(Error::DomainError("NaN has no decimal representation"));
        }
        let bits = value.to_bits();
        if value == 0.0 || !value.is_finite() {
            self.writer.write(2, 2)?;
            self.xor_push(bits)?;
        } else {
            self.push_finite(value, bits)?;
        }
        self.count += 1;
        Ok(())
    }

    /// Writes the end-of-stream marker and flushes. Idempotent.
    pub fn close(&mut self) -> Result<(), Error> {
        if self.closed {
            return Ok(());
        }
        self.writer.write(2, 2)?;
        self.writer.flush();
        self.closed = true;
        Ok(())
    }

    /// Number of values encoded so far.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Total bits in the packed block so far, count word included.
    pub fn size_bits(&self) -> usize {
        32 + self.writer.len_bits()
    }

    /// Consumes the encoder and returns the packed block: the big-endian
    /// count word followed by the bit stream, padded to a whole word.
    pub fn into_compressed(self) -> Result<CompressedBlock, Error> {
        if !self.closed {
            return Err(Error::UsageError("into_compressed before close"));
        }
        let size_bits = 32 + self.writer.len_bits();
        let byte_len = (size_bits + 31) / 32 * 4;
        let mut bytes = Vec::with_capacity(byte_len);
        bytes.extend_from_slice(&(self.count as u32).to_be_bytes());
        bytes.extend_from_slice(&self.writer.bytes(byte_len - 4));
        Ok(CompressedBlock {
            bytes,
            size_bits,
            count: self.count,
        })
    }

    fn push_finite(&mut self, value: f32, bits: u32) -> Result<(), Error> {
        let (alpha, beta_star) = self.plan(value);
        if alpha >= 0 && beta_star <= 7 {
            let exponent = ((bits >> 23) & 0xFF) as i32;
            let g_alpha = f_alpha(alpha as u32) as i32 + exponent - 127;
            let erase_bits = 23 - g_alpha;
            if (4..=23).contains(&erase_bits) {
                let mask = u32::MAX << erase_bits;
                let delta = !mask & bits;
                if delta != 0 && erasure_recoverable32(mask & bits, beta_star) {
                    if beta_star == self.last_beta_star {
                        self.writer.write_bit(false)?;
                    } else {
                        self.writer.write((beta_star | 0x18) as u64, 5)?;
                        self.last_beta_star = beta_star;
                    }
                    return self.xor_push(mask & bits);
                }
            }
        }
        self.writer.write(2, 2)?;
        self.xor_push(bits)
    }

    fn plan(&self, value: f32) -> (i32, u32) {
        let (alpha, beta_star) = alpha_and_beta_star32(value, self.last_beta_star);
        match self.alpha_cap {
            Some(cap) if beta_star != 0 => {
                let sp_v = beta_star as i32 - alpha - 1;
                let capped = (sp_v + 1 + cap as i32).min(beta_star as i32).max(1);
                (capped - sp_v - 1, capped as u32)
            }
            _ => (alpha, beta_star),
        }
    }

    fn xor_push(&mut self, bits: u32) -> Result<(), Error> {
        if self.first {
            self.first = false;
            self.stored_bits = bits;
            let trail = bits.trailing_zeros();
            self.writer.write(trail as u64, 6)?;
            if bits != 0 && trail < 31 {
                self.writer.write((bits >> (trail + 1)) as u64, 31 - trail)?;
            }
            return Ok(());
        }

        let xored = self.stored_bits ^ bits;
        if xored == 0 {
            self.writer.write(1, 2)?;
        } else {
            let lead = LEADING_ROUND_32[xored.leading_zeros() as usize];
            let trail = xored.trailing_zeros();
            if lead == self.stored_lead && trail >= self.stored_trail {
                let center = 32 - self.stored_lead - self.stored_trail;
                if center > 30 {
                    self.writer.write(0, 2)?;
                    self.writer.write((xored >> self.stored_trail) as u64, center)?;
                } else {
                    self.writer
                        .write((xored >> self.stored_trail) as u64, 2 + center)?;
                }
            } else {
                self.stored_lead = lead;
                self.stored_trail = trail;
                let center = 32 - lead - trail;
                if center <= 8 {
                    let header = (((0x2 << 3) | LEADING_REPRESENTATION_32[lead as usize]) << 3)
                        | (center & 0x7);
                    self.writer.write(header as u64, 8)?;
                } else {
                    let header = (((0x3 << 3) | LEADING_REPRESENTATION_32[lead as usize]) << 5)
                        | (center & 0x1F);
                    self.writer.write(header as u64, 10)?;
                }
                self.writer.write(((xored >> trail) >> 1) as u64, center - 1)?;
            }
        }
        self.stored_bits = bits;
        Ok(())
    }
}

/// Lazily decodes a 32-bit Elf stream, yielding the number of values
/// its count word declares.
#[derive(Debug)]
pub struct Elf32Decoder<'a> {
    reader: BitReader<'a>,
    count: usize,
    yielded: usize,
    last_beta_star: u32,
    stored_bits: u32,
    stored_lead: u32,
    stored_trail: u32,
    first: bool,
    done: bool,
}

impl<'a> Elf32Decoder<'a> {
    /// Creates a decoder over a packed block.
    pub fn new(bytes: &'a [u8]) -> Result<Self, Error> {
        if bytes.len() < 4 {
            return Err(Error::CorruptStream("missing the leading count word"));
        }
        let count = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        Ok(Self {
            reader: BitReader::new(&bytes[4..]),
            count,
            yielded: 0,
            last_beta_star: BETA_UNSET,
            stored_bits: 0,
            stored_lead: u32::MAX,
            stored_trail: u32::MAX,
            first: true,
            done: false,
        })
    }

    /// Decodes an entire block into a vector.
    pub fn decode(bytes: &[u8]) -> Result<Vec<f32>, Error> {
        Elf32Decoder::new(bytes)?.collect()
    }

    /// Number of values the count word declares.
    pub fn count(&self) -> usize {
        self.count
    }

    fn next_value(&mut self) -> Result<f32, Error> {
        if self.reader.remaining_bits() == 0 {
            return Err(Error::CorruptStream("stream ended before the declared count"));
        }
        if !self.reader.read_bit() {
            self.recover()
        } else if !self.reader.read_bit() {
            Ok(f32::from_bits(self.xor_next()?))
        } else {
            self.last_beta_star = self.reader.read_int(3);
            self.recover()
        }
    }

    fn recover(&mut self) -> Result<f32, Error> {
        let v_prime = f32::from_bits(self.xor_next()?);
        if v_prime == 0.0 || !v_prime.is_finite() {
            return Err(Error::CorruptStream("erased value cannot be recovered"));
        }
        let sp_prime = sp32(v_prime.abs());
        if self.last_beta_star == 0 {
            if sp_prime >= 0 {
                return Err(Error::CorruptStream("recovered power of ten out of range"));
            }
            let magnitude = pow10_neg_32((-sp_prime - 1) as u32);
            Ok(if v_prime < 0.0 { -magnitude } else { magnitude })
        } else {
            let alpha = self.last_beta_star as i64 - sp_prime as i64 - 1;
            if !(0..=38).contains(&alpha) {
                return Err(Error::CorruptStream("decimal recovery exponent out of range"));
            }
            Ok(round_up32(v_prime, alpha as u32))
        }
    }

    fn xor_next(&mut self) -> Result<u32, Error> {
        if self.first {
            self.first = false;
            let trail = self.reader.read_int(6);
            let bits = if trail < 32 {
                let payload = self.reader.read_int(31 - trail);
                ((payload << 1) | 1) << trail
            } else {
                0
            };
            self.stored_bits = bits;
            return Ok(bits);
        }

        match self.reader.read_int(2) {
            3 => {
                let header = self.reader.read_int(8);
                let lead = LEADING_DECODE_32[(header >> 5) as usize & 0x7];
                let center = match header & 0x1F {
                    0 => 32,
                    c => c,
                };
                self.apply_window(lead, center)
            }
            2 => {
                let header = self.reader.read_int(6);
                let lead = LEADING_DECODE_32[(header >> 3) as usize & 0x7];
                let center = match header & 0x7 {
                    0 => 8,
                    c => c,
                };
                self.apply_window(lead, center)
            }
            1 => Ok(self.stored_bits),
            _ => {
                if self.stored_lead == u32::MAX {
                    return Err(Error::CorruptStream("window reuse before any window header"));
                }
                let center = 32 - self.stored_lead - self.stored_trail;
                let bits = (self.reader.read_int(center) << self.stored_trail) ^ self.stored_bits;
                self.stored_bits = bits;
                Ok(bits)
            }
        }
    }

    fn apply_window(&mut self, lead: u32, center: u32) -> Result<u32, Error> {
        if lead + center > 32 {
            return Err(Error::CorruptStream("window header exceeds the value width"));
        }
        let trail = 32 - lead - center;
        self.stored_lead = lead;
        self.stored_trail = trail;
        let payload = self.reader.read_int(center - 1);
        let bits = (((payload << 1) | 1) << trail) ^ self.stored_bits;
        self.stored_bits = bits;
        Ok(bits)
    }
}

impl<'a> Iterator for Elf32Decoder<'a> {
    type Item = Result<f32, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.yielded == self.count {
            return None;
        }
        match self.next_value() {
            Ok(value) => {
                self.yielded += 1;
                Some(Ok(value))
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
