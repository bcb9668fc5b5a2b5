//! Error taxonomy shared by every escrow crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EscrowError {
    #[error("Escrow not found: {0}")]
    EscrowNotFound(String),

    #[error("OrderItem not found: {0}")]
    OrderItemNotFound(String),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("ListingItem not found: {0}")]
    ListingNotFound(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Role or state mismatch detected while driving the protocol.
    #[error("{0}")]
    ProtocolViolation(String),

    #[error("Data integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse classification used by callers that must not match on messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    NotImplemented,
    ProtocolViolation,
    IntegrityViolation,
    Collaborator,
}

impl EscrowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EscrowError::EscrowNotFound(_)
            | EscrowError::OrderItemNotFound(_)
            | EscrowError::OrderNotFound(_)
            | EscrowError::ListingNotFound(_) => ErrorKind::NotFound,
            EscrowError::NotImplemented(_) => ErrorKind::NotImplemented,
            EscrowError::ProtocolViolation(_) => ErrorKind::ProtocolViolation,
            EscrowError::IntegrityViolation(_) => ErrorKind::IntegrityViolation,
            EscrowError::Rpc(_)
            | EscrowError::Transport(_)
            | EscrowError::Storage(_)
            | EscrowError::Serialization(_)
            | EscrowError::Config(_) => ErrorKind::Collaborator,
        }
    }

    pub fn is_protocol_violation(&self) -> bool {
        self.kind() == ErrorKind::ProtocolViolation
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        EscrowError::ProtocolViolation(msg.into())
    }
}

impl From<serde_json::Error> for EscrowError {
    fn from(e: serde_json::Error) -> Self {
        EscrowError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EscrowError>;
