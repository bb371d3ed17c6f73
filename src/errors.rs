use crate::models::ResourceKind;
use crate::resolver::Action;
use uuid::Uuid;

pub type AccessResult<T> = Result<T, AccessError>;

/// Failure reading one of the backing stores. The resolver never lets this
/// escape as anything other than a denial; it exists as a separate type so
/// operators can tell "not allowed" apart from "authorization is broken".
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("database error")]
    Database(#[from] sqlx::Error),
    #[error("store lock poisoned: {0}")]
    Poisoned(String),
    #[error("duplicate row: {0}")]
    Duplicate(String),
    #[error("store invariant violated: {0}")]
    Corrupt(String),
}

#[derive(thiserror::Error, Debug)]
#[error("resolver error: {source}")]
pub struct ResolverError {
    #[from]
    pub source: StoreError,
}

#[derive(thiserror::Error, Debug)]
pub enum AccessError {
    #[error("denied: actor {actor} may not {action:?} {resource:?}")]
    Denied {
        actor: Uuid,
        action: Action,
        resource: ResourceKind,
    },
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid grantee: {0}")]
    InvalidGrantee(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("store error")]
    Store(#[from] StoreError),
}

impl AccessError {
    pub fn denied(actor: Uuid, action: Action, resource: ResourceKind) -> Self {
        Self::Denied {
            actor,
            action,
            resource,
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn invalid_grantee(message: impl Into<String>) -> Self {
        Self::InvalidGrantee(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Denied { .. })
    }
}
