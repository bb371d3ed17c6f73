//! Store contracts for the four access-control tables plus the protected
//! time-entry rows. Two backends: [`MemStore`] for tests and embedding,
//! [`SqliteStore`] over a `sqlx` pool.
//!
//! These are the resolver's only dependencies, and they never call back into
//! it. List reads take the resolver's [`Predicate`] and apply it at the
//! source, so a denied row is never materialized.

mod mem;
mod sqlite;

pub use mem::MemStore;
pub use sqlite::SqliteStore;

use std::collections::BTreeSet;

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::StoreError;
use crate::models::{Actor, GlobalRole, Grant, Membership, Project, ProjectRole, TimeEntry};
use crate::resolver::Predicate;

pub type StoreResult<T> = Result<T, StoreError>;

/// Global roles and active flags. Leaf store; role changes are gated by the
/// caller and deliberately do not cascade into the grant table.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn actor(&self, actor_id: Uuid) -> StoreResult<Option<Actor>>;
    async fn get_role(&self, actor_id: Uuid) -> StoreResult<Option<GlobalRole>>;
    async fn is_active(&self, actor_id: Uuid) -> StoreResult<bool>;
    async fn insert_actor(&self, actor: Actor) -> StoreResult<()>;
    async fn set_global_role(&self, actor_id: Uuid, role: GlobalRole) -> StoreResult<()>;
    async fn set_active(&self, actor_id: Uuid, active: bool) -> StoreResult<()>;
    async fn list_actors(&self, predicate: &Predicate) -> StoreResult<Vec<Actor>>;
}

/// Per-(project, user) role assignments. The pair is unique; inserting a
/// second row for it fails with [`StoreError::Duplicate`].
#[async_trait]
pub trait MembershipRegistry: Send + Sync {
    async fn membership(&self, membership_id: Uuid) -> StoreResult<Option<Membership>>;
    async fn membership_of(&self, project_id: Uuid, user_id: Uuid)
        -> StoreResult<Option<Membership>>;
    async fn members_of(&self, project_id: Uuid) -> StoreResult<Vec<Membership>>;
    async fn memberships_of(&self, user_id: Uuid) -> StoreResult<Vec<Membership>>;
    async fn insert_membership(&self, membership: Membership) -> StoreResult<()>;
    async fn set_membership_role(&self, membership_id: Uuid, role: ProjectRole) -> StoreResult<()>;
    async fn set_membership_flags(
        &self,
        membership_id: Uuid,
        can_edit_project: bool,
        can_view_reports: bool,
    ) -> StoreResult<()>;
    async fn remove_membership(&self, membership_id: Uuid) -> StoreResult<()>;
}

/// Admin-issued capability delegations, unique per (manager, project).
/// Removal is idempotent: removing an id that is not there is Ok.
#[async_trait]
pub trait GrantTable: Send + Sync {
    async fn grant(&self, grant_id: Uuid) -> StoreResult<Option<Grant>>;
    async fn grant_of(&self, manager_id: Uuid, project_id: Uuid) -> StoreResult<Option<Grant>>;
    async fn grants_for(&self, manager_id: Uuid) -> StoreResult<Vec<Grant>>;
    async fn grants_on(&self, project_id: Uuid) -> StoreResult<Vec<Grant>>;
    async fn insert_grant(&self, grant: Grant) -> StoreResult<()>;
    async fn remove_grant(&self, grant_id: Uuid) -> StoreResult<()>;
}

#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn project(&self, project_id: Uuid) -> StoreResult<Option<Project>>;
    /// Insert the project and its creator's Owner membership as one atomic
    /// mutation. The project must never be visible without the membership.
    async fn create_project_with_owner(
        &self,
        project: Project,
        owner: Membership,
    ) -> StoreResult<()>;
    async fn remove_project(&self, project_id: Uuid) -> StoreResult<()>;
    async fn list_projects(&self, predicate: &Predicate) -> StoreResult<Vec<Project>>;
}

/// The read-only entry lookups the resolver needs for profile visibility.
/// Split out so the resolver's fourth dependency cannot mutate anything.
#[async_trait]
pub trait EntryIndex: Send + Sync {
    async fn project_ids_with_entries_by(&self, owner_id: Uuid) -> StoreResult<BTreeSet<Uuid>>;
    async fn owners_with_entries_in(
        &self,
        project_ids: &BTreeSet<Uuid>,
    ) -> StoreResult<BTreeSet<Uuid>>;
}

#[async_trait]
pub trait EntryStore: EntryIndex {
    async fn entry(&self, entry_id: Uuid) -> StoreResult<Option<TimeEntry>>;
    async fn insert_entry(&self, entry: TimeEntry) -> StoreResult<()>;
    async fn update_entry(&self, entry: TimeEntry) -> StoreResult<()>;
    async fn set_entry_owner(&self, entry_id: Uuid, owner_id: Uuid) -> StoreResult<()>;
    async fn remove_entry(&self, entry_id: Uuid) -> StoreResult<()>;
    async fn list_entries(&self, predicate: &Predicate) -> StoreResult<Vec<TimeEntry>>;
}

/// Everything the access-control service needs from one backend.
pub trait AccessStore:
    IdentityStore + MembershipRegistry + GrantTable + ProjectStore + EntryStore
{
}

impl<T> AccessStore for T where
    T: IdentityStore + MembershipRegistry + GrantTable + ProjectStore + EntryStore
{
}
