use std::io;

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("io: {0}")]
    Io(#[from] io::Error),

    /// A variable-length field had no marker bit, a declared size is smaller
    /// than its own header or an impossible width, or a read of unknown
    /// extent exceeds the allocation cap.
    #[error("malformed length at offset {offset:#x}")]
    MalformedLength { offset: u64 },

    #[error("unexpected end of stream at offset {offset:#x}")]
    UnexpectedEndOfStream { offset: u64 },

    #[error("element at offset {offset:#x} declared {declared} bytes but {consumed} were consumed")]
    InconsistentAccounting {
        offset: u64,
        declared: u64,
        consumed: u64,
    },

    #[error("element nesting at offset {offset:#x} exceeds {depth} levels")]
    NestingTooDeep { offset: u64, depth: usize },

    #[error("unknown-size scope at offset {offset:#x} has no stop identifiers")]
    UnknownSizeWithoutStopSet { offset: u64 },

    #[error("invalid signature: {0}")]
    InvalidSignature(&'static str),

    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl DecodeError {
    /// Converts an I/O error raised at `offset`, keeping truncation distinct
    /// from other I/O failures.
    pub fn from_io(err: io::Error, offset: u64) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            DecodeError::UnexpectedEndOfStream { offset }
        } else {
            DecodeError::Io(err)
        }
    }

    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, DecodeError::UnexpectedEndOfStream { .. })
    }
}

pub type Result<T> = std::result::Result<T, DecodeError>;
