use thiserror::Error;

/// A request that cannot be parsed. The connection is dropped without a response.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("request headers exceed {0} bytes")]
    HeadersTooLarge(usize),

    #[error("request body of {length} bytes exceeds {limit}")]
    BodyTooLarge { length: usize, limit: usize },

    /// The peer closed the connection before sending a complete header block.
    #[error("connection closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A refused request, answered with a plain-text status.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("Not Found")]
    NotFound,

    #[error("Forbidden")]
    Forbidden,

    #[error("Method Not Allowed")]
    MethodNotAllowed,

    #[error("Read error")]
    Read,
}

impl ApiError {
    pub fn status(&self) -> u16 {
        match self {
            ApiError::NotFound => 404,
            ApiError::Forbidden => 403,
            ApiError::MethodNotAllowed => 405,
            ApiError::Read => 500,
        }
    }
}
