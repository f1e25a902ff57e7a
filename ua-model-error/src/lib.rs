use anyhow::Error as AnyhowError;
use config::ConfigError;
use std::{error::Error as StdError, io::Error as IoError};
use thiserror::Error;
use tokio::task::JoinError;

pub type ModelResult<T, E = ModelError> = anyhow::Result<T, E>;

/// Errors raised while building or operating the address space.
///
/// `ConfigurationFatal` marks a corrupted information model (a broken
/// construction invariant). Everything else is an ordinary error that a
/// caller may report and continue from.
#[derive(Error, Debug, Default)]
pub enum ModelError {
    #[error("service unavailable")]
    #[default]
    ServiceUnavailable,
    /// A construction invariant of the shipped information model was violated.
    #[error("Configuration fatal: {0}")]
    ConfigurationFatal(String),
    #[error("Node already exists: {0}")]
    NodeIdExists(String),
    #[error("Node not found: {0}")]
    NodeNotFound(String),
    #[error("Invalid reference: {0}")]
    InvalidReference(String),
    /// A declaration names a type definition no constructor is registered for.
    #[error("Unresolved type definition {type_definition} in namespace {namespace}")]
    UnresolvedType {
        namespace: u16,
        type_definition: String,
    },
    #[error("Namespace not registered: {0}")]
    NamespaceNotFound(String),
    #[error("Access denied: {0}")]
    AccessDenied(String),
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),
    #[error("{0}")]
    JoinError(#[from] JoinError),
    #[error("{0}")]
    StdError(#[from] Box<dyn StdError + Send + Sync>),
    #[error("{0}")]
    IoError(#[from] IoError),
    #[error("{0}")]
    Msg(String),
    #[error("{0}")]
    Anyhow(#[from] AnyhowError),
    #[error("{0}")]
    ConfigError(#[from] ConfigError),
    #[error("Initialization error: {0}")]
    InitializationError(String),
    #[error("Shutdown error: {0}")]
    ShutdownError(String),
    #[error("Invalid state error: {0}")]
    InvalidStateError(String),
}

impl ModelError {
    /// Whether this error signals a corrupted information model rather than
    /// a recoverable condition.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ModelError::ConfigurationFatal(_) | ModelError::UnresolvedType { .. }
        )
    }

    /// Escalate a construction error into `ConfigurationFatal`, keeping the
    /// original message as context. Errors that are already fatal pass through.
    pub fn into_fatal(self, context: impl AsRef<str>) -> Self {
        if self.is_fatal() {
            return self;
        }
        ModelError::ConfigurationFatal(format!("{}: {}", context.as_ref(), self))
    }
}

impl From<()> for ModelError {
    #[inline]
    fn from(_: ()) -> Self {
        Self::default()
    }
}

impl From<String> for ModelError {
    #[inline]
    fn from(msg: String) -> Self {
        Self::Msg(msg)
    }
}

impl From<&str> for ModelError {
    #[inline]
    fn from(msg: &str) -> Self {
        Self::Msg(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_fatal_keeps_context() {
        let err = ModelError::NodeIdExists("ns=1;s=Boiler1".into()).into_fatal("add child");
        assert!(err.is_fatal());
        assert_eq!(
            err.to_string(),
            "Configuration fatal: add child: Node already exists: ns=1;s=Boiler1"
        );
    }

    #[test]
    fn test_fatal_is_not_rewrapped() {
        let err = ModelError::ConfigurationFatal("missing EURange".into()).into_fatal("outer");
        assert_eq!(err.to_string(), "Configuration fatal: missing EURange");
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(!ModelError::from("boom").is_fatal());
        assert!(!ModelError::NodeNotFound("x".into()).is_fatal());
    }

    #[test]
    fn test_unresolved_type_stays_distinguishable() {
        let err = ModelError::UnresolvedType {
            namespace: 2,
            type_definition: "ns=2;i=1099".into(),
        }
        .into_fatal("create object");
        assert!(matches!(err, ModelError::UnresolvedType { namespace: 2, .. }));
    }
}
