//! The gated write paths. These are the only operations that mutate the
//! access-control entities themselves (memberships, grants, global roles),
//! plus the guarded CRUD the surrounding application uses for protected
//! records. Every path consults the resolver before touching storage and
//! emits an audit event after a successful mutation.

use std::sync::Arc;

use uuid::Uuid;

use crate::enforce::Enforcer;
use crate::errors::{AccessError, AccessResult, StoreError};
use crate::events::{log_activity, log_activity_with_previous, EventBus};
use crate::models::{
    Actor, GlobalRole, Grant, GrantCapabilities, Membership, Project, ProjectRole, Resource,
    ResourceKind, TimeEntry,
};
use crate::resolver::{Action, Resolver};
use crate::store::AccessStore;

pub struct AccessControl<S> {
    store: Arc<S>,
    enforcer: Enforcer,
    events: EventBus,
}

impl<S: AccessStore + 'static> AccessControl<S> {
    pub fn new(store: Arc<S>, events: EventBus) -> Self {
        let resolver = Arc::new(Resolver::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
        ));
        Self {
            store,
            enforcer: Enforcer::new(resolver),
            events,
        }
    }

    pub fn enforcer(&self) -> &Enforcer {
        &self.enforcer
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    // ------------------------------------------------------------------
    // Actors / profiles
    // ------------------------------------------------------------------

    /// Account provisioning. Unrestricted by design; the caller is the
    /// registration flow, not another actor.
    pub async fn register_actor(
        &self,
        name: impl Into<String>,
        role: GlobalRole,
    ) -> AccessResult<Actor> {
        let actor = Actor::new(name, role);
        self.store
            .insert_actor(actor.clone())
            .await
            .map_err(|e| conflict_on_duplicate(e, "actor already exists"))?;
        log_activity(&self.events, "created", None, &actor);
        Ok(actor)
    }

    /// Change a global role. Admin only: the role field of a profile is a
    /// privileged write even on one's own account. Existing grants are left
    /// untouched; the resolver re-checks the role on every evaluation.
    pub async fn set_global_role(
        &self,
        actor_id: Uuid,
        target_id: Uuid,
        role: GlobalRole,
    ) -> AccessResult<Actor> {
        let previous = self.require_actor(target_id).await?;
        self.enforcer
            .check(actor_id, Action::WritePrivileged, &Resource::profile_role(target_id))
            .await?;

        self.store.set_global_role(target_id, role).await?;
        let updated = self.require_actor(target_id).await?;
        log_activity_with_previous(&self.events, "updated", Some(actor_id), &updated, Some(&previous));
        Ok(updated)
    }

    /// Activate or deactivate an account. Gated like a role change.
    pub async fn set_active(
        &self,
        actor_id: Uuid,
        target_id: Uuid,
        active: bool,
    ) -> AccessResult<Actor> {
        let previous = self.require_actor(target_id).await?;
        self.enforcer
            .check(actor_id, Action::WritePrivileged, &Resource::profile_role(target_id))
            .await?;

        self.store.set_active(target_id, active).await?;
        let updated = self.require_actor(target_id).await?;
        log_activity_with_previous(&self.events, "updated", Some(actor_id), &updated, Some(&previous));
        Ok(updated)
    }

    pub async fn read_profile(&self, actor_id: Uuid, subject_id: Uuid) -> AccessResult<Actor> {
        let subject = self.require_actor(subject_id).await?;
        self.enforcer
            .guard(actor_id, Action::Read, &Resource::profile(subject_id), move || {
                std::future::ready(Ok(subject))
            })
            .await
    }

    pub async fn list_profiles(&self, actor_id: Uuid) -> AccessResult<Vec<Actor>> {
        let predicate = self.enforcer.scope(actor_id, ResourceKind::Profile).await?;
        Ok(self.store.list_actors(&predicate).await?)
    }

    // ------------------------------------------------------------------
    // Projects
    // ------------------------------------------------------------------

    /// Any active actor may create a project; the creator's Owner membership
    /// is inserted in the same atomic mutation.
    pub async fn create_project(
        &self,
        actor_id: Uuid,
        name: impl Into<String>,
    ) -> AccessResult<Project> {
        let actor = self.require_actor(actor_id).await?;
        if !actor.active {
            return Err(AccessError::denied(actor_id, Action::Write, ResourceKind::Project));
        }

        let project = Project::new(name, actor_id);
        let owner = Membership::owner_of(project.id, actor_id);
        self.store
            .create_project_with_owner(project.clone(), owner.clone())
            .await
            .map_err(|e| conflict_on_duplicate(e, "project already exists"))?;

        log_activity(&self.events, "created", Some(actor_id), &project);
        log_activity(&self.events, "created", Some(actor_id), &owner);
        Ok(project)
    }

    /// Deletion is restricted to an active Admin or the creator, which is
    /// deliberately tighter than ordinary project Write.
    pub async fn delete_project(&self, actor_id: Uuid, project_id: Uuid) -> AccessResult<()> {
        let project = self.require_project(project_id).await?;

        let allowed = project.created_by == actor_id || self.is_active_admin(actor_id).await?;
        if !allowed {
            return Err(AccessError::denied(
                actor_id,
                Action::WritePrivileged,
                ResourceKind::Project,
            ));
        }

        self.store.remove_project(project_id).await?;
        log_activity(&self.events, "deleted", Some(actor_id), &project);
        Ok(())
    }

    pub async fn read_project(&self, actor_id: Uuid, project_id: Uuid) -> AccessResult<Project> {
        let project = self.require_project(project_id).await?;
        let resource = Resource::from(&project);
        self.enforcer
            .guard(actor_id, Action::Read, &resource, move || {
                std::future::ready(Ok(project))
            })
            .await
    }

    pub async fn list_projects(&self, actor_id: Uuid) -> AccessResult<Vec<Project>> {
        let predicate = self.enforcer.scope(actor_id, ResourceKind::Project).await?;
        Ok(self.store.list_projects(&predicate).await?)
    }

    // ------------------------------------------------------------------
    // Memberships
    // ------------------------------------------------------------------

    pub async fn add_member(
        &self,
        actor_id: Uuid,
        project_id: Uuid,
        user_id: Uuid,
        role: ProjectRole,
    ) -> AccessResult<Membership> {
        let project = self.require_project(project_id).await?;
        self.require_actor(user_id).await?;
        self.enforcer
            .check(actor_id, Action::Write, &Resource::from(&project))
            .await?;

        if self.store.membership_of(project_id, user_id).await?.is_some() {
            return Err(AccessError::conflict("membership already exists"));
        }

        let membership = Membership::new(project_id, user_id, role);
        self.store
            .insert_membership(membership.clone())
            .await
            .map_err(|e| conflict_on_duplicate(e, "membership already exists"))?;

        log_activity(&self.events, "created", Some(actor_id), &membership);
        Ok(membership)
    }

    pub async fn set_member_role(
        &self,
        actor_id: Uuid,
        membership_id: Uuid,
        role: ProjectRole,
    ) -> AccessResult<Membership> {
        let previous = self.require_membership(membership_id).await?;
        let project = self.require_project(previous.project_id).await?;
        self.enforcer
            .check(actor_id, Action::Write, &Resource::from(&project))
            .await?;

        if previous.role == ProjectRole::Owner && role != ProjectRole::Owner {
            self.ensure_not_last_owner(previous.project_id).await?;
        }

        self.store.set_membership_role(membership_id, role).await?;
        let updated = self.require_membership(membership_id).await?;
        log_activity_with_previous(&self.events, "updated", Some(actor_id), &updated, Some(&previous));
        Ok(updated)
    }

    pub async fn set_member_flags(
        &self,
        actor_id: Uuid,
        membership_id: Uuid,
        can_edit_project: bool,
        can_view_reports: bool,
    ) -> AccessResult<Membership> {
        let previous = self.require_membership(membership_id).await?;
        let project = self.require_project(previous.project_id).await?;
        self.enforcer
            .check(actor_id, Action::Write, &Resource::from(&project))
            .await?;

        self.store
            .set_membership_flags(membership_id, can_edit_project, can_view_reports)
            .await?;
        let updated = self.require_membership(membership_id).await?;
        log_activity_with_previous(&self.events, "updated", Some(actor_id), &updated, Some(&previous));
        Ok(updated)
    }

    /// Admin, Owner/Manager member, or the member removing themself. A
    /// project never loses its last Owner this way; delete the project
    /// instead.
    pub async fn remove_member(&self, actor_id: Uuid, membership_id: Uuid) -> AccessResult<()> {
        let membership = self.require_membership(membership_id).await?;

        if membership.user_id != actor_id {
            let project = self.require_project(membership.project_id).await?;
            self.enforcer
                .check(actor_id, Action::Write, &Resource::from(&project))
                .await?;
        }

        if membership.role == ProjectRole::Owner {
            self.ensure_not_last_owner(membership.project_id).await?;
        }

        self.store.remove_membership(membership_id).await?;
        log_activity(&self.events, "removed", Some(actor_id), &membership);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Grants
    // ------------------------------------------------------------------

    /// Issue a capability delegation. The issuer must be an active Admin and
    /// the grantee must *currently* hold the Manager global role; both checks
    /// go straight to the identity store, never through memberships, so
    /// grant authorization cannot recurse.
    pub async fn issue_grant(
        &self,
        admin_id: Uuid,
        manager_id: Uuid,
        project_id: Uuid,
        capabilities: GrantCapabilities,
    ) -> AccessResult<Grant> {
        if !self.is_active_admin(admin_id).await? {
            return Err(AccessError::denied(
                admin_id,
                Action::WritePrivileged,
                ResourceKind::Project,
            ));
        }

        match self.store.get_role(manager_id).await? {
            Some(GlobalRole::Manager) => {}
            _ => {
                return Err(AccessError::invalid_grantee(
                    "grantee must currently hold the manager role",
                ))
            }
        }

        self.require_project(project_id).await?;

        if self.store.grant_of(manager_id, project_id).await?.is_some() {
            return Err(AccessError::conflict("grant already exists for this manager and project"));
        }

        let grant = Grant::new(manager_id, project_id, capabilities, admin_id);
        self.store
            .insert_grant(grant.clone())
            .await
            .map_err(|e| conflict_on_duplicate(e, "grant already exists for this manager and project"))?;

        log_activity(&self.events, "issued", Some(admin_id), &grant);
        Ok(grant)
    }

    /// Admin only. Revoking a grant that does not exist is a no-op.
    pub async fn revoke_grant(&self, actor_id: Uuid, grant_id: Uuid) -> AccessResult<()> {
        if !self.is_active_admin(actor_id).await? {
            return Err(AccessError::denied(
                actor_id,
                Action::WritePrivileged,
                ResourceKind::Project,
            ));
        }

        let Some(grant) = self.store.grant(grant_id).await? else {
            return Ok(());
        };

        self.store.remove_grant(grant_id).await?;
        log_activity(&self.events, "revoked", Some(actor_id), &grant);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Time entries
    // ------------------------------------------------------------------

    pub async fn record_entry(&self, actor_id: Uuid, entry: TimeEntry) -> AccessResult<TimeEntry> {
        self.require_project(entry.project_id).await?;
        let resource = Resource::from(&entry);
        self.enforcer.check(actor_id, Action::Write, &resource).await?;

        self.store
            .insert_entry(entry.clone())
            .await
            .map_err(|e| conflict_on_duplicate(e, "entry already exists"))?;
        log_activity(&self.events, "created", Some(actor_id), &entry);
        Ok(entry)
    }

    pub async fn update_entry(
        &self,
        actor_id: Uuid,
        entry_id: Uuid,
        minutes: i64,
        note: Option<String>,
    ) -> AccessResult<TimeEntry> {
        let previous = self.require_entry(entry_id).await?;
        let resource = Resource::from(&previous);
        self.enforcer.check(actor_id, Action::Write, &resource).await?;

        let updated = TimeEntry {
            minutes,
            note,
            ..previous.clone()
        };
        self.store.update_entry(updated.clone()).await?;
        log_activity_with_previous(&self.events, "updated", Some(actor_id), &updated, Some(&previous));
        Ok(updated)
    }

    pub async fn delete_entry(&self, actor_id: Uuid, entry_id: Uuid) -> AccessResult<()> {
        let entry = self.require_entry(entry_id).await?;
        let resource = Resource::from(&entry);
        self.enforcer.check(actor_id, Action::Write, &resource).await?;

        self.store.remove_entry(entry_id).await?;
        log_activity(&self.events, "deleted", Some(actor_id), &entry);
        Ok(())
    }

    /// Ownership reassignment. Admin or an Owner/Manager membership on the
    /// entry's project; the owner themself cannot hand their entry away.
    pub async fn reassign_entry(
        &self,
        actor_id: Uuid,
        entry_id: Uuid,
        new_owner: Uuid,
    ) -> AccessResult<TimeEntry> {
        let previous = self.require_entry(entry_id).await?;
        self.require_actor(new_owner).await?;
        let resource = Resource::from(&previous);
        self.enforcer
            .check(actor_id, Action::WritePrivileged, &resource)
            .await?;

        self.store.set_entry_owner(entry_id, new_owner).await?;
        let updated = self.require_entry(entry_id).await?;
        log_activity_with_previous(&self.events, "reassigned", Some(actor_id), &updated, Some(&previous));
        Ok(updated)
    }

    pub async fn read_entry(&self, actor_id: Uuid, entry_id: Uuid) -> AccessResult<TimeEntry> {
        let entry = self.require_entry(entry_id).await?;
        let resource = Resource::from(&entry);
        self.enforcer
            .guard(actor_id, Action::Read, &resource, move || {
                std::future::ready(Ok(entry))
            })
            .await
    }

    pub async fn list_entries(&self, actor_id: Uuid) -> AccessResult<Vec<TimeEntry>> {
        let predicate = self.enforcer.scope(actor_id, ResourceKind::TimeEntry).await?;
        Ok(self.store.list_entries(&predicate).await?)
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    async fn require_actor(&self, actor_id: Uuid) -> AccessResult<Actor> {
        self.store
            .actor(actor_id)
            .await?
            .ok_or_else(|| AccessError::not_found(format!("actor {actor_id}")))
    }

    async fn require_project(&self, project_id: Uuid) -> AccessResult<Project> {
        self.store
            .project(project_id)
            .await?
            .ok_or_else(|| AccessError::not_found(format!("project {project_id}")))
    }

    async fn require_membership(&self, membership_id: Uuid) -> AccessResult<Membership> {
        self.store
            .membership(membership_id)
            .await?
            .ok_or_else(|| AccessError::not_found(format!("membership {membership_id}")))
    }

    async fn require_entry(&self, entry_id: Uuid) -> AccessResult<TimeEntry> {
        self.store
            .entry(entry_id)
            .await?
            .ok_or_else(|| AccessError::not_found(format!("entry {entry_id}")))
    }

    async fn is_active_admin(&self, actor_id: Uuid) -> AccessResult<bool> {
        Ok(self
            .store
            .actor(actor_id)
            .await?
            .map(|a| a.active && a.global_role == GlobalRole::Admin)
            .unwrap_or(false))
    }

    async fn ensure_not_last_owner(&self, project_id: Uuid) -> AccessResult<()> {
        let owners = self
            .store
            .members_of(project_id)
            .await?
            .into_iter()
            .filter(|m| m.role == ProjectRole::Owner)
            .count();
        if owners <= 1 {
            return Err(AccessError::conflict("a project must keep at least one owner"));
        }
        Ok(())
    }
}

fn conflict_on_duplicate(err: StoreError, message: &str) -> AccessError {
    match err {
        StoreError::Duplicate(_) => AccessError::conflict(message),
        other => AccessError::Store(other),
    }
}
