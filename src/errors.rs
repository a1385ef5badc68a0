use thiserror::Error;

/// Status code the store uses to reject a query whose result payload would be too large.
pub const PAYLOAD_TOO_LARGE: u16 = 413;

#[derive(Debug, Error)]
pub enum GraphQueryError {
    #[error("invalid plan: {0}")]
    InvalidPlan(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("store error {code}: {message}")]
    Store { code: u16, message: String },
    #[error("query error: {0}")]
    Query(String),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl GraphQueryError {
    pub fn invalid_plan<T: Into<String>>(msg: T) -> Self {
        GraphQueryError::InvalidPlan(msg.into())
    }

    pub fn configuration<T: Into<String>>(msg: T) -> Self {
        GraphQueryError::Configuration(msg.into())
    }

    pub fn internal<T: Into<String>>(msg: T) -> Self {
        GraphQueryError::Internal(msg.into())
    }

    pub fn store<T: Into<String>>(code: u16, msg: T) -> Self {
        GraphQueryError::Store {
            code,
            message: msg.into(),
        }
    }

    pub fn oversized<T: Into<String>>(msg: T) -> Self {
        Self::store(PAYLOAD_TOO_LARGE, msg)
    }

    pub fn query<T: Into<String>>(msg: T) -> Self {
        GraphQueryError::Query(msg.into())
    }

    pub fn connection<T: Into<String>>(msg: T) -> Self {
        GraphQueryError::Connection(msg.into())
    }

    pub fn invalid_input<T: Into<String>>(msg: T) -> Self {
        GraphQueryError::InvalidInput(msg.into())
    }

    /// True when the store rejected the request only because of its size.
    pub fn is_oversized(&self) -> bool {
        matches!(self, GraphQueryError::Store { code, .. } if *code == PAYLOAD_TOO_LARGE)
    }

    pub fn code(&self) -> Option<u16> {
        match self {
            GraphQueryError::Store { code, .. } => Some(*code),
            _ => None,
        }
    }
}
