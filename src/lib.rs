//! # Floatpack
//!
//! Streaming compression for IEEE 754 floating-point series, implementing the
//! XOR-based codec family from the time-series literature:
//!
//! - **Gorilla** (VLDB 2015) XORs each value against its predecessor and
//!   stores only the changed bits, inside a leading/trailing zero window that
//!   is reused across consecutive values.
//! - **Chimp** (PVLDB 2022) replaces the single predecessor with a ring of
//!   recent values and picks, in constant time, the candidate whose XOR has a
//!   long run of trailing zeros.
//! - **Elf** (PVLDB 2023) erases mantissa bits that are redundant for the
//!   value's decimal precision before the XOR stage, and restores them on
//!   decompression by rounding back up. An optional absolute error bound
//!   trades further precision for space.
//!
//! `Chimp32` and `Elf32` are the single-precision variants. All codecs share
//! the same word-aligned big-endian bit stream, exposed as [`BitWriter`] and
//! [`BitReader`].
//!
//! ## Example
//!
//! ```rust
//! use floatpack::{ElfDecoder, ElfEncoder};
//!
//! // Compress
//! let mut encoder = ElfEncoder::new(3);
//! encoder.add_value(15.62).unwrap();
//! encoder.add_value(15.63).unwrap();
//! encoder.add_value(15.71).unwrap();
//! encoder.close().unwrap();
//!
//! let block = encoder.into_compressed().unwrap();
//! println!("Compressed {} values into {} bytes", block.count, block.bytes.len());
//!
//! // Decompress
//! let values = ElfDecoder::decode(&block.bytes).unwrap();
//! assert_eq!(values, vec![15.62, 15.63, 15.71]);
//! ```
//!
//! ## Lazy iteration
//!
//! Every decoder is an iterator, so large blocks can be consumed without
//! allocating the full output:
//!
//! ```rust
//! # use floatpack::{ElfDecoder, ElfEncoder};
//! # let mut encoder = ElfEncoder::new(2);
//! # encoder.add_value(15.62).unwrap();
//! # encoder.add_value(15.63).unwrap();
//! # encoder.close().unwrap();
//! # let block = encoder.into_compressed().unwrap();
//! for result in ElfDecoder::new(&block.bytes).unwrap() {
//!     println!("{}", result.unwrap());
//! }
//! ```

pub mod bitstream;
pub mod chimp;
pub mod chimp32;
mod decimal;
pub mod elf;
pub mod elf32;
pub mod error;
pub mod gorilla;

// Re-export primary types at the crate root.
pub use bitstream::{BitReader, BitWriter};
pub use chimp::{ChimpDecoder, ChimpEncoder, DEFAULT_HISTORY, MAX_HISTORY};
pub use chimp32::{Chimp32Decoder, Chimp32Encoder};
pub use elf::{ElfDecoder, ElfEncoder};
pub use elf32::{Elf32Decoder, Elf32Encoder};
pub use error::Error;
pub use gorilla::{GorillaDecoder, GorillaEncoder};

/// A compressed block of encoded values.
#[derive(Debug, Clone)]
pub struct CompressedBlock {
    /// The compressed byte data.
    pub bytes: Vec<u8>,
    /// Total number of valid bits in `bytes`.
    pub size_bits: usize,
    /// Number of values in this block.
    pub count: usize,
}
