use thiserror::Error;

/// Failure reported by, or while talking to, an external service
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("{service} unavailable: {message}")]
    Unavailable {
        service: &'static str,
        message: String,
    },
    #[error("{service} has no record {id}")]
    NotFound { service: &'static str, id: String },
    #[error("{service} returned unexpected data: {message}")]
    UnexpectedResponse {
        service: &'static str,
        message: String,
    },
}

impl ServiceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ServiceError::NotFound { .. })
    }
}

impl ServiceError {
    pub(crate) fn from_http(service: &'static str, err: reqwest::Error) -> Self {
        if err.is_decode() {
            ServiceError::UnexpectedResponse {
                service,
                message: err.to_string(),
            }
        } else {
            ServiceError::Unavailable {
                service,
                message: err.to_string(),
            }
        }
    }
}
