//! Enforcement boundary. Every read or write of a protected record goes
//! through [`Enforcer::guard`]; every list read narrows its query with
//! [`Enforcer::scope`] before touching storage.

use std::future::Future;
use std::sync::Arc;

use uuid::Uuid;

use crate::errors::{AccessError, AccessResult};
use crate::models::{Resource, ResourceKind};
use crate::resolver::{Action, Predicate, Resolver};

#[derive(Clone)]
pub struct Enforcer {
    resolver: Arc<Resolver>,
}

impl Enforcer {
    pub fn new(resolver: Arc<Resolver>) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Evaluate and fail with `Denied` unless the action is allowed.
    ///
    /// A resolver failure is logged at error level, distinguishable from a
    /// legitimate denial, and then denied anyway: authorization fails closed
    /// and is never retried into a possibly-stale allow.
    pub async fn check(
        &self,
        actor_id: Uuid,
        action: Action,
        resource: &Resource,
    ) -> AccessResult<()> {
        let decision = match self.resolver.evaluate(actor_id, action, resource).await {
            Ok(decision) => decision,
            Err(err) => {
                tracing::error!(
                    actor_id = %actor_id,
                    action = ?action,
                    resource = ?resource.kind(),
                    error = %err,
                    "resolver failure, denying"
                );
                return Err(AccessError::denied(actor_id, action, resource.kind()));
            }
        };

        if decision.is_allow() {
            Ok(())
        } else {
            Err(AccessError::denied(actor_id, action, resource.kind()))
        }
    }

    /// Run `proceed` only if the action is allowed. On a denial the closure
    /// is never invoked, so the underlying storage operation cannot happen.
    pub async fn guard<T, F, Fut>(
        &self,
        actor_id: Uuid,
        action: Action,
        resource: &Resource,
        proceed: F,
    ) -> AccessResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AccessResult<T>>,
    {
        self.check(actor_id, action, resource).await?;
        proceed().await
    }

    /// The predicate to narrow a list query with. Rows are filtered at the
    /// source, never after materialization, so a caller cannot infer the
    /// existence of rows it may not see.
    pub async fn scope(&self, actor_id: Uuid, kind: ResourceKind) -> AccessResult<Predicate> {
        match self.resolver.enumerate(actor_id, kind).await {
            Ok(predicate) => Ok(predicate),
            Err(err) => {
                tracing::error!(
                    actor_id = %actor_id,
                    resource = ?kind,
                    error = %err,
                    "resolver failure while scoping list, denying"
                );
                Err(AccessError::denied(actor_id, Action::Read, kind))
            }
        }
    }
}
