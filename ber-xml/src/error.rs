use thiserror::Error;

#[derive(Error, Debug)]
pub enum XmlError {
    #[error("BER error: {0}")]
    Ber(#[from] ber_core::BerError),

    #[error("I/O error: {0}")]
    Io(#[from] ber_io::IoError),

    #[error("malformed path: {0}")]
    Path(String),

    #[error("XML syntax error: {0}")]
    Syntax(String),

    #[error("unknown element name '{0}' with no explicit tag attribute")]
    UnknownName(String),

    #[error("unbalanced close tag '{0}'")]
    UnbalancedClose(String),

    #[error("primitive element '{0}' cannot have child elements")]
    PrimitiveWithChildren(String),

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}

pub type XmlResult<T> = Result<T, XmlError>;
