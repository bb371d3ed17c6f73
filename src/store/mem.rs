use std::collections::{BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{
    EntryIndex, EntryStore, GrantTable, IdentityStore, MembershipRegistry, ProjectStore,
    StoreResult,
};
use crate::errors::StoreError;
use crate::models::{Actor, GlobalRole, Grant, Membership, Project, ProjectRole, Resource, TimeEntry};
use crate::resolver::Predicate;

/// A thread-safe, in-memory backend for all five store contracts.
#[derive(Default)]
pub struct MemStore {
    actors: RwLock<HashMap<Uuid, Actor>>,
    projects: RwLock<HashMap<Uuid, Project>>,
    memberships: RwLock<HashMap<Uuid, Membership>>,
    grants: RwLock<HashMap<Uuid, Grant>>,
    entries: RwLock<HashMap<Uuid, TimeEntry>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn read<T>(lock: &RwLock<T>) -> StoreResult<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|e| StoreError::Poisoned(format!("failed to acquire read lock: {e}")))
}

fn write<T>(lock: &RwLock<T>) -> StoreResult<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|e| StoreError::Poisoned(format!("failed to acquire write lock: {e}")))
}

#[async_trait]
impl IdentityStore for MemStore {
    async fn actor(&self, actor_id: Uuid) -> StoreResult<Option<Actor>> {
        Ok(read(&self.actors)?.get(&actor_id).cloned())
    }

    async fn get_role(&self, actor_id: Uuid) -> StoreResult<Option<GlobalRole>> {
        Ok(read(&self.actors)?.get(&actor_id).map(|a| a.global_role))
    }

    async fn is_active(&self, actor_id: Uuid) -> StoreResult<bool> {
        Ok(read(&self.actors)?
            .get(&actor_id)
            .map(|a| a.active)
            .unwrap_or(false))
    }

    async fn insert_actor(&self, actor: Actor) -> StoreResult<()> {
        let mut actors = write(&self.actors)?;
        if actors.contains_key(&actor.id) {
            return Err(StoreError::Duplicate(format!("actor {}", actor.id)));
        }
        actors.insert(actor.id, actor);
        Ok(())
    }

    async fn set_global_role(&self, actor_id: Uuid, role: GlobalRole) -> StoreResult<()> {
        let mut actors = write(&self.actors)?;
        let actor = actors
            .get_mut(&actor_id)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown actor {actor_id}")))?;
        actor.global_role = role;
        actor.updated_at = Utc::now();
        Ok(())
    }

    async fn set_active(&self, actor_id: Uuid, active: bool) -> StoreResult<()> {
        let mut actors = write(&self.actors)?;
        let actor = actors
            .get_mut(&actor_id)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown actor {actor_id}")))?;
        actor.active = active;
        actor.updated_at = Utc::now();
        Ok(())
    }

    async fn list_actors(&self, predicate: &Predicate) -> StoreResult<Vec<Actor>> {
        let actors = read(&self.actors)?;
        let mut visible: Vec<Actor> = actors
            .values()
            .filter(|a| predicate.matches(&Resource::profile(a.id)))
            .cloned()
            .collect();
        visible.sort_by_key(|a| a.created_at);
        Ok(visible)
    }
}

#[async_trait]
impl MembershipRegistry for MemStore {
    async fn membership(&self, membership_id: Uuid) -> StoreResult<Option<Membership>> {
        Ok(read(&self.memberships)?.get(&membership_id).cloned())
    }

    async fn membership_of(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> StoreResult<Option<Membership>> {
        Ok(read(&self.memberships)?
            .values()
            .find(|m| m.project_id == project_id && m.user_id == user_id)
            .cloned())
    }

    async fn members_of(&self, project_id: Uuid) -> StoreResult<Vec<Membership>> {
        Ok(read(&self.memberships)?
            .values()
            .filter(|m| m.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn memberships_of(&self, user_id: Uuid) -> StoreResult<Vec<Membership>> {
        Ok(read(&self.memberships)?
            .values()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn insert_membership(&self, membership: Membership) -> StoreResult<()> {
        let mut memberships = write(&self.memberships)?;
        if memberships
            .values()
            .any(|m| m.project_id == membership.project_id && m.user_id == membership.user_id)
        {
            return Err(StoreError::Duplicate(format!(
                "membership for ({}, {})",
                membership.project_id, membership.user_id
            )));
        }
        memberships.insert(membership.id, membership);
        Ok(())
    }

    async fn set_membership_role(&self, membership_id: Uuid, role: ProjectRole) -> StoreResult<()> {
        let mut memberships = write(&self.memberships)?;
        let membership = memberships
            .get_mut(&membership_id)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown membership {membership_id}")))?;
        membership.role = role;
        membership.updated_at = Utc::now();
        Ok(())
    }

    async fn set_membership_flags(
        &self,
        membership_id: Uuid,
        can_edit_project: bool,
        can_view_reports: bool,
    ) -> StoreResult<()> {
        let mut memberships = write(&self.memberships)?;
        let membership = memberships
            .get_mut(&membership_id)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown membership {membership_id}")))?;
        membership.can_edit_project = can_edit_project;
        membership.can_view_reports = can_view_reports;
        membership.updated_at = Utc::now();
        Ok(())
    }

    async fn remove_membership(&self, membership_id: Uuid) -> StoreResult<()> {
        write(&self.memberships)?.remove(&membership_id);
        Ok(())
    }
}

#[async_trait]
impl GrantTable for MemStore {
    async fn grant(&self, grant_id: Uuid) -> StoreResult<Option<Grant>> {
        Ok(read(&self.grants)?.get(&grant_id).cloned())
    }

    async fn grant_of(&self, manager_id: Uuid, project_id: Uuid) -> StoreResult<Option<Grant>> {
        Ok(read(&self.grants)?
            .values()
            .find(|g| g.manager_id == manager_id && g.project_id == project_id)
            .cloned())
    }

    async fn grants_for(&self, manager_id: Uuid) -> StoreResult<Vec<Grant>> {
        Ok(read(&self.grants)?
            .values()
            .filter(|g| g.manager_id == manager_id)
            .cloned()
            .collect())
    }

    async fn grants_on(&self, project_id: Uuid) -> StoreResult<Vec<Grant>> {
        Ok(read(&self.grants)?
            .values()
            .filter(|g| g.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn insert_grant(&self, grant: Grant) -> StoreResult<()> {
        let mut grants = write(&self.grants)?;
        if grants
            .values()
            .any(|g| g.manager_id == grant.manager_id && g.project_id == grant.project_id)
        {
            return Err(StoreError::Duplicate(format!(
                "grant for ({}, {})",
                grant.manager_id, grant.project_id
            )));
        }
        grants.insert(grant.id, grant);
        Ok(())
    }

    async fn remove_grant(&self, grant_id: Uuid) -> StoreResult<()> {
        // Idempotent: removing an absent grant is not an error.
        write(&self.grants)?.remove(&grant_id);
        Ok(())
    }
}

#[async_trait]
impl ProjectStore for MemStore {
    async fn project(&self, project_id: Uuid) -> StoreResult<Option<Project>> {
        Ok(read(&self.projects)?.get(&project_id).cloned())
    }

    async fn create_project_with_owner(
        &self,
        project: Project,
        owner: Membership,
    ) -> StoreResult<()> {
        // Lock order: projects then memberships, everywhere. Holding both
        // write guards makes the pair of inserts atomic to readers.
        let mut projects = write(&self.projects)?;
        let mut memberships = write(&self.memberships)?;

        if projects.contains_key(&project.id) {
            return Err(StoreError::Duplicate(format!("project {}", project.id)));
        }
        projects.insert(project.id, project);
        memberships.insert(owner.id, owner);
        Ok(())
    }

    async fn remove_project(&self, project_id: Uuid) -> StoreResult<()> {
        let mut projects = write(&self.projects)?;
        let mut memberships = write(&self.memberships)?;
        projects.remove(&project_id);
        memberships.retain(|_, m| m.project_id != project_id);
        Ok(())
    }

    async fn list_projects(&self, predicate: &Predicate) -> StoreResult<Vec<Project>> {
        let projects = read(&self.projects)?;
        let mut visible: Vec<Project> = projects
            .values()
            .filter(|p| predicate.matches(&Resource::from(*p)))
            .cloned()
            .collect();
        visible.sort_by_key(|p| p.created_at);
        Ok(visible)
    }
}

#[async_trait]
impl EntryIndex for MemStore {
    async fn project_ids_with_entries_by(&self, owner_id: Uuid) -> StoreResult<BTreeSet<Uuid>> {
        Ok(read(&self.entries)?
            .values()
            .filter(|e| e.owner_id == owner_id)
            .map(|e| e.project_id)
            .collect())
    }

    async fn owners_with_entries_in(
        &self,
        project_ids: &BTreeSet<Uuid>,
    ) -> StoreResult<BTreeSet<Uuid>> {
        Ok(read(&self.entries)?
            .values()
            .filter(|e| project_ids.contains(&e.project_id))
            .map(|e| e.owner_id)
            .collect())
    }
}

#[async_trait]
impl EntryStore for MemStore {
    async fn entry(&self, entry_id: Uuid) -> StoreResult<Option<TimeEntry>> {
        Ok(read(&self.entries)?.get(&entry_id).cloned())
    }

    async fn insert_entry(&self, entry: TimeEntry) -> StoreResult<()> {
        let mut entries = write(&self.entries)?;
        if entries.contains_key(&entry.id) {
            return Err(StoreError::Duplicate(format!("entry {}", entry.id)));
        }
        entries.insert(entry.id, entry);
        Ok(())
    }

    async fn update_entry(&self, entry: TimeEntry) -> StoreResult<()> {
        let mut entries = write(&self.entries)?;
        let existing = entries
            .get_mut(&entry.id)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown entry {}", entry.id)))?;
        *existing = TimeEntry {
            updated_at: Utc::now(),
            ..entry
        };
        Ok(())
    }

    async fn set_entry_owner(&self, entry_id: Uuid, owner_id: Uuid) -> StoreResult<()> {
        let mut entries = write(&self.entries)?;
        let entry = entries
            .get_mut(&entry_id)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown entry {entry_id}")))?;
        entry.owner_id = owner_id;
        entry.updated_at = Utc::now();
        Ok(())
    }

    async fn remove_entry(&self, entry_id: Uuid) -> StoreResult<()> {
        write(&self.entries)?.remove(&entry_id);
        Ok(())
    }

    async fn list_entries(&self, predicate: &Predicate) -> StoreResult<Vec<TimeEntry>> {
        let entries = read(&self.entries)?;
        let mut visible: Vec<TimeEntry> = entries
            .values()
            .filter(|e| predicate.matches(&Resource::from(*e)))
            .cloned()
            .collect();
        visible.sort_by_key(|e| e.created_at);
        Ok(visible)
    }
}
