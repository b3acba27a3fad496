//! Gateway error taxonomy.

use perp_core::ErrorKind;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// Credential or signature failure. Fatal at startup.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Order rejected for lack of margin.
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    /// Generic placement/cancel failure.
    #[error("Order error: {0}")]
    Order(String),

    /// Timeout or connectivity failure. Retried on the next scheduled cycle only.
    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Auth(_) => ErrorKind::Auth,
            Self::InsufficientFunds(_) => ErrorKind::InsufficientFunds,
            Self::Order(_) => ErrorKind::Order,
            Self::TransientNetwork(_) => ErrorKind::TransientNetwork,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
        }
    }

    /// Errors that must stop a loop from starting.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientNetwork(_))
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() || e.is_request() {
            Self::TransientNetwork(e.to_string())
        } else if e.is_decode() {
            Self::InvalidRequest(format!("Failed to decode response: {e}"))
        } else {
            match e.status() {
                Some(status) if status.as_u16() == 401 || status.as_u16() == 403 => {
                    Self::Auth(e.to_string())
                }
                Some(status) if status.is_server_error() || status.as_u16() == 429 => {
                    Self::TransientNetwork(e.to_string())
                }
                _ => Self::InvalidRequest(e.to_string()),
            }
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
