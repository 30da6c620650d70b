use thiserror::Error;

use crate::domain::order::OrderRejection;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    OrderRejected(#[from] OrderRejection),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("storage busy: {0}")]
    Busy(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

/// What an outer surface (HTTP, CLI) reports. Every variant carries the
/// correlation id of the turn or request that failed.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "That request could not be handled. Please check it and try again.",
            Self::ServiceUnavailable { .. } => {
                "The bookstore is busy right now. Please try again in a moment."
            }
            Self::Internal { .. } => "Something went wrong on our side.",
        }
    }

    pub fn message(&self) -> &str {
        let (Self::BadRequest { message, .. }
        | Self::ServiceUnavailable { message, .. }
        | Self::Internal { message, .. }) = self;
        message
    }

    pub fn correlation_id(&self) -> &str {
        let (Self::BadRequest { correlation_id, .. }
        | Self::ServiceUnavailable { correlation_id, .. }
        | Self::Internal { correlation_id, .. }) = self;
        correlation_id
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        match self {
            Self::Domain(error) => {
                InterfaceError::BadRequest { message: error.to_string(), correlation_id }
            }
            Self::Persistence(message) | Self::Busy(message) | Self::Integration(message) => {
                InterfaceError::ServiceUnavailable { message, correlation_id }
            }
            Self::Configuration(message) => InterfaceError::Internal { message, correlation_id },
        }
    }
}
