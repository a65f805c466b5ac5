/// Errors reported by the encoders and decoders in this crate.
///
/// Every error is local to the codec instance that produced it. Codec state
/// is cumulative, so nothing is retried internally: an encoder that reported
/// an error can still be drained with `into_compressed()` where documented,
/// but no further values may be added, and a decoder that reported an error
/// yields nothing further.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A write would overflow the stream capacity fixed at construction.
    ///
    /// Capacity is sized from the constructor's value-count hint; hitting
    /// this error means more (or less compressible) data was pushed than
    /// the hint allowed for.
    #[error("stream capacity exceeded: {needed_bits} bits needed, {capacity_bits} available")]
    CapacityExceeded {
        needed_bits: usize,
        capacity_bits: usize,
    },

    /// The compressed stream is malformed: a control code outside the
    /// codec's alphabet, a truncated stream, or a recovery state that
    /// cannot correspond to any encoder output.
    ///
    /// Predictor state is unrecoverable once desynchronized, so partial
    /// output preceding the failure point should be discarded.
    #[error("corrupt stream: {0}")]
    CorruptStream(&'static str),

    /// The caller violated the encode lifecycle: adding values after
    /// `close()`, extracting output before `close()`, or constructing a
    /// codec with invalid parameters.
    #[error("usage error: {0}")]
    UsageError(&'static str),

    /// A value outside the codec's numeric domain was supplied, e.g. NaN
    /// where the bit pattern is reserved for the stream terminator.
    #[error("domain error: {0}")]
    DomainError(&'static str),
}
