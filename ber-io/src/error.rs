use thiserror::Error;

#[derive(Error, Debug)]
pub enum IoError {
    #[error("BER error: {0}")]
    Ber(#[from] ber_core::BerError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unexpected end of file: needed {needed} more bytes")]
    UnexpectedEof { needed: usize },
}

pub type IoResult<T> = Result<T, IoError>;
