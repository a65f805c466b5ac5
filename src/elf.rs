use crate::bitstream::{BitReader, BitWriter};
use crate::chimp::{LEADING_DECODE, LEADING_REPRESENTATION, LEADING_ROUND};
use crate::decimal::{alpha_and_beta_star, f_alpha, pow10_neg, round_up, sp, MAX_DIGITS_F64};
use crate::error::Error;
use crate::CompressedBlock;

/// `last_beta_star` marker for "no digit count signaled yet".
const BETA_UNSET: u32 = u32::MAX;

/// True when the decoder can map an erased value back to a decimal: a
/// nonzero magnitude and a recovery exponent inside the range
/// [`round_up`] can scale. Mirrors the acceptance checks in
/// [`ElfDecoder`]; values that fail are stored bit-exact instead.
fn erasure_recoverable(erased: u64, beta_star: u32) -> bool {
    let v = f64::from_bits(erased);
    if v == 0.0 {
        return false;
    }
    let sp_prime = sp(v.abs());
    if beta_star == 0 {
        sp_prime < 0
    } else {
        (0..=308).contains(&(beta_star as i64 - sp_prime as i64 - 1))
    }
}

/// The Elf compressor for 64-bit values: mantissa erasure in front of an
/// XOR stage.
///
/// Each value's trailing mantissa bits that carry no decimal
/// information are cleared before XOR compression, which shortens the
/// XOR tails considerably for data that originated as decimals. The
/// erased bits are recovered on decode from the value's significant
/// digit count (`beta_star`), which is signaled inline and cached
/// across values. Values that would not survive recovery, among them
/// zeros, infinities and values needing the full seventeen digits, are
/// stored bit-exact instead, so the default mode is lossless.
///
/// [`with_error_bound`](ElfEncoder::with_error_bound) trades precision
/// for size: digit counts are capped so that every decoded value is
/// within the given bound of its original.
///
/// The packed block starts with a big-endian count word; decoding is
/// driven by that count rather than a terminator.
///
/// # Example
/// ```
/// use floatpack::{ElfDecoder, ElfEncoder};
///
/// let mut encoder = ElfEncoder::new(4);
/// for v in [3.17, 3.23, 3.23, 3.35] {
///     encoder.add_value(v).unwrap();
/// }
/// encoder.close().unwrap();
///
/// let block = encoder.into_compressed().unwrap();
/// let values = ElfDecoder::decode(&block.bytes).unwrap();
/// assert_eq!(values, vec![3.17, 3.23, 3.23, 3.35]);
/// ```
#[derive(Debug)]
pub struct ElfEncoder {
    writer: BitWriter,
    /// Digit count cap from the error bound; `None` is lossless.
    alpha_cap: Option<u32>,
    last_beta_star: u32,
    stored_bits: u64,
    stored_lead: u32,
    stored_trail: u32,
    first: bool,
    count: usize,
    closed: bool,
}

impl ElfEncoder {
    /// Creates a lossless encoder sized for `capacity` values.
    pub fn new(capacity: usize) -> Self {
        Self::with_params(capacity, None)
    }

    /// Creates an encoder that keeps every decoded value within
    /// `epsilon` of its original. `epsilon` must be positive and finite.
    pub fn with_error_bound(capacity: usize, epsilon: f64) -> Result<Self, Error> {
        if !epsilon.is_finite() || epsilon <= 0.0 {
            return Err(Error::UsageError("error bound must be positive and finite"));
        }
        let cap = (-epsilon.log10()).ceil();
        let alpha_cap = if cap < 0.0 { 0 } else { cap as u32 };
        Ok(Self::with_params(capacity, Some(alpha_cap)))
    }

    fn with_params(capacity: usize, alpha_cap: Option<u32>) -> Self {
        Self {
            // Worst case is 80 bits per value plus the literal first
            // value, the terminator and the count word.
            writer: BitWriter::new(capacity * 10 + 16),
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
    pub fn add_value(&mut self, value: f64) -> Result<(), Error> {
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

    fn push_finite(&mut self, value: f64, bits: u64) -> Result<(), Error> {
        let (alpha, beta_star) = self.plan(value);
        // Erasure asks for a nonnegative decimal exponent and a digit
        // count that fits the 4-bit field. The erased span must also be
        // worth the signaling overhead and still recoverable on decode.
        if alpha >= 0 && beta_star <= 15 {
            let exponent = ((bits >> 52) & 0x7FF) as i32;
            let g_alpha = f_alpha(alpha as u32) as i32 + exponent - 1023;
            let erase_bits = 52 - g_alpha;
            if (5..=52).contains(&erase_bits) {
                let mask = u64::MAX << erase_bits;
                let delta = !mask & bits;
                if delta != 0 && erasure_recoverable(mask & bits, beta_star) {
                    if beta_star == self.last_beta_star {
                        self.writer.write_bit(false)?;
                    } else {
                        self.writer.write((beta_star | 0x30) as u64, 6)?;
                        self.last_beta_star = beta_star;
                    }
                    return self.xor_push(mask & bits);
                }
            }
        }
        self.writer.write(2, 2)?;
        self.xor_push(bits)
    }

    /// Digit plan for one value, with the error-bound cap applied.
    fn plan(&self, value: f64) -> (i32, u32) {
        let (alpha, beta_star) = alpha_and_beta_star(value, self.last_beta_star, MAX_DIGITS_F64);
        match self.alpha_cap {
            Some(cap) if beta_star != 0 => {
                let sp_v = beta_star as i32 - alpha - 1;
                let capped = (sp_v + 1 + cap as i32).min(beta_star as i32).max(1);
                (capped - sp_v - 1, capped as u32)
            }
            _ => (alpha, beta_star),
        }
    }

    fn xor_push(&mut self, bits: u64) -> Result<(), Error> {
        if self.first {
            self.first = false;
            self.stored_bits = bits;
            let trail = bits.trailing_zeros();
            self.writer.write(trail as u64, 7)?;
            if bits != 0 && trail < 63 {
                // The lowest set bit is implied by the trailing count.
                self.writer.write_long(bits >> (trail + 1), 63 - trail)?;
            }
            return Ok(());
        }

        let xored = self.stored_bits ^ bits;
        if xored == 0 {
            self.writer.write(1, 2)?;
        } else {
            let lead = LEADING_ROUND[xored.leading_zeros() as usize];
            let trail = xored.trailing_zeros();
            if lead == self.stored_lead && trail >= self.stored_trail {
                let center = 64 - self.stored_lead - self.stored_trail;
                if center > 62 {
                    self.writer.write(0, 2)?;
                    self.writer.write_long(xored >> self.stored_trail, center)?;
                } else {
                    // Flag `00` and payload fit one write.
                    self.writer.write_long(xored >> self.stored_trail, 2 + center)?;
                }
            } else {
                self.stored_lead = lead;
                self.stored_trail = trail;
                let center = 64 - lead - trail;
                if center <= 16 {
                    let header =
                        (((0x2 << 3) | LEADING_REPRESENTATION[lead as usize]) << 4) | (center & 0xF);
                    self.writer.write(header as u64, 9)?;
                } else {
                    let header = (((0x3 << 3) | LEADING_REPRESENTATION[lead as usize]) << 6)
                        | (center & 0x3F);
                    self.writer.write(header as u64, 11)?;
                }
                self.writer.write_long((xored >> trail) >> 1, center - 1)?;
            }
        }
        self.stored_bits = bits;
        Ok(())
    }
}

/// Lazily decodes an Elf stream, yielding the number of values its
/// count word declares.
#[derive(Debug)]
pub struct ElfDecoder<'a> {
    reader: BitReader<'a>,
    count: usize,
    yielded: usize,
    last_beta_star: u32,
    stored_bits: u64,
    stored_lead: u32,
    stored_trail: u32,
    first: bool,
    done: bool,
}

impl<'a> ElfDecoder<'a> {
    /// Creates a decoder over a packed Elf block.
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
    pub fn decode(bytes: &[u8]) -> Result<Vec<f64>, Error> {
        ElfDecoder::new(bytes)?.collect()
    }

    /// Number of values the count word declares.
    pub fn count(&self) -> usize {
        self.count
    }

    fn next_value(&mut self) -> Result<f64, Error> {
        if self.reader.remaining_bits() == 0 {
            return Err(Error::CorruptStream("stream ended before the declared count"));
        }
        if !self.reader.read_bit() {
            self.recover()
        } else if !self.reader.read_bit() {
            Ok(f64::from_bits(self.xor_next()?))
        } else {
            self.last_beta_star = self.reader.read_int(4);
            self.recover()
        }
    }

    /// Undoes the erasure: rounds the truncated value back up to
    /// `last_beta_star` significant digits.
    fn recover(&mut self) -> Result<f64, Error> {
        let v_prime = f64::from_bits(self.xor_next()?);
        if v_prime == 0.0 || !v_prime.is_finite() {
            return Err(Error::CorruptStream("erased value cannot be recovered"));
        }
        let sp_prime = sp(v_prime.abs());
        if self.last_beta_star == 0 {
            // Exact negative power of ten; erasure pushed it just below
            // its magnitude boundary.
            if sp_prime >= 0 {
                return Err(Error::CorruptStream("recovered power of ten out of range"));
            }
            let magnitude = pow10_neg((-sp_prime - 1) as u32);
            Ok(if v_prime < 0.0 { -magnitude } else { magnitude })
        } else {
            let alpha = self.last_beta_star as i64 - sp_prime as i64 - 1;
            if !(0..=308).contains(&alpha) {
                return Err(Error::CorruptStream("decimal recovery exponent out of range"));
            }
            Ok(round_up(v_prime, alpha as u32))
        }
    }

    fn xor_next(&mut self) -> Result<u64, Error> {
        if self.first {
            self.first = false;
            let trail = self.reader.read_int(7);
            let bits = if trail < 64 {
                let payload = self.reader.read_long(63 - trail);
                ((payload << 1) | 1) << trail
            } else {
                0
            };
            self.stored_bits = bits;
            return Ok(bits);
        }

        match self.reader.read_int(2) {
            3 => {
                let header = self.reader.read_int(9);
                let lead = LEADING_DECODE[(header >> 6) as usize & 0x7];
                let center = match header & 0x3F {
                    0 => 64,
                    c => c,
                };
                self.apply_window(lead, center)
            }
            2 => {
                let header = self.reader.read_int(7);
                let lead = LEADING_DECODE[(header >> 4) as usize & 0x7];
                let center = match header & 0xF {
                    0 => 16,
                    c => c,
                };
                self.apply_window(lead, center)
            }
            1 => Ok(self.stored_bits),
            _ => {
                if self.stored_lead == u32::MAX {
                    return Err(Error::CorruptStream("window reuse before any window header"));
                }
                let center = 64 - self.stored_lead - self.stored_trail;
                let bits = (self.reader.read_long(center) << self.stored_trail) ^ self.stored_bits;
                self.stored_bits = bits;
                Ok(bits)
            }
        }
    }

    fn apply_window(&mut self, lead: u32, center: u32) -> Result<u64, Error> {
        if lead + center > 64 {
            return Err(Error::CorruptStream("window header exceeds the value width"));
        }
        let trail = 64 - lead - center;
        self.stored_lead = lead;
        self.stored_trail = trail;
        let payload = self.reader.read_long(center - 1);
        let bits = (((payload << 1) | 1) << trail) ^ self.stored_bits;
        self.stored_bits = bits;
        Ok(bits)
    }
}

impl<'a> Iterator for ElfDecoder<'a> {
    type Item = Result<f64, Error>;

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
