use thiserror::Error;

/// Error type for the low-level BER codec.
///
/// Every variant corresponds to a wire-format violation named in the BER
/// error taxonomy: a truncated header, an unmatched EOC, a tag or length
/// that overflows the target platform's integer width, or primitive content
/// that runs past the end of the buffer.
#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum BerError {
    /// Fewer than two bytes remained where a TL header was expected.
    #[error("TL header too small: need at least 2 bytes, have {available}")]
    TlTooSmall { available: usize },

    /// An EOC (`00 00`) was read with no matching indefinite opener on the
    /// frame stack.
    #[error("unexpected EOC with no open indefinite frame")]
    UnexpectedEoc,

    /// A long-form tag number exceeded the 5 payload byte / 32-bit cap.
    #[error("tag number encoding exceeds 5 payload bytes")]
    TagTooLong,

    /// A long-form length declared more bytes than `usize` can hold, or a
    /// definite frame would be overshot by the current unit.
    #[error("length overflow: {0}")]
    LengthOverflow(String),

    /// A primitive's declared length runs past the end of the buffer.
    #[error("content overflow: need {needed} bytes, have {available}")]
    ContentOverflow { needed: usize, available: usize },

    /// A textual class name did not match one of UNIVERSAL/APPLICATION/
    /// CONTEXT_SPECIFIC/PRIVATE.
    #[error("invalid tag class: {0}")]
    InvalidClass(String),

    /// A textual shape name did not match PRIMITIVE/CONSTRUCTED.
    #[error("invalid shape: {0}")]
    InvalidShape(String),

    /// Decoding an integer whose encoded width exceeds the target type.
    #[error("integer overflow decoding into target width")]
    IntegerOverflow,

    /// `write` was asked to emit more bytes than the destination buffer has
    /// remaining.
    #[error("buffer overflow: need {needed} bytes, have {available}")]
    BufferOverflow { needed: usize, available: usize },

    /// BCD or hex-escape content was malformed for the requested decode.
    #[error("malformed content: {0}")]
    MalformedContent(String),
}

pub type BerResult<T> = Result<T, BerError>;
