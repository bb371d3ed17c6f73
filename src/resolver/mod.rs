//! Visibility resolver.
//!
//! A pure decision function over the identity, membership and grant stores:
//! `evaluate` answers "may this actor do this to this record", `enumerate`
//! answers "which rows may this actor list" as a [`Predicate`]. Both are
//! built from the same scope helpers so they cannot drift apart.
//!
//! The resolver only ever calls *downward* into the stores; nothing below it
//! calls back in. Store failures surface as [`ResolverError`] and are turned
//! into denials at the enforcement boundary, never into an allow.

mod predicate;
mod rules;

pub use predicate::Predicate;
pub use rules::Rule;

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ResolverError;
use crate::models::{GlobalRole, GrantCapabilities, Resource, ResourceKind};
use crate::store::{EntryIndex, GrantTable, IdentityStore, MembershipRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Read,
    /// Ordinary field edits, including an owner editing their own record.
    Write,
    /// Privileged mutations: global role changes, entry ownership
    /// reassignment. Never granted by self-access or a delegated grant.
    WritePrivileged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allow(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// The actor facts rules 2-4 share, read from the identity store exactly
/// once per evaluation.
#[derive(Debug, Clone, Copy)]
struct Snapshot {
    role: GlobalRole,
    active: bool,
}

impl Snapshot {
    fn is_admin(&self) -> bool {
        self.active && self.role == GlobalRole::Admin
    }

    fn is_manager(&self) -> bool {
        self.active && self.role == GlobalRole::Manager
    }
}

pub struct Resolver {
    identity: Arc<dyn IdentityStore>,
    memberships: Arc<dyn MembershipRegistry>,
    grants: Arc<dyn GrantTable>,
    entries: Arc<dyn EntryIndex>,
}

impl Resolver {
    pub fn new(
        identity: Arc<dyn IdentityStore>,
        memberships: Arc<dyn MembershipRegistry>,
        grants: Arc<dyn GrantTable>,
        entries: Arc<dyn EntryIndex>,
    ) -> Self {
        Self {
            identity,
            memberships,
            grants,
            entries,
        }
    }

    /// Decide whether `actor_id` may perform `action` on `resource`.
    ///
    /// Walks [`Rule::ORDER`]; the first rule that produces a decision wins.
    pub async fn evaluate(
        &self,
        actor_id: Uuid,
        action: Action,
        resource: &Resource,
    ) -> Result<Decision, ResolverError> {
        let mut snapshot: Option<Option<Snapshot>> = None;

        for rule in Rule::ORDER {
            if let Some(decision) = self
                .apply(rule, actor_id, action, resource, &mut snapshot)
                .await?
            {
                tracing::debug!(
                    actor_id = %actor_id,
                    action = ?action,
                    resource = ?resource.kind(),
                    rule = rule.as_str(),
                    decision = ?decision,
                    "access decision"
                );
                return Ok(decision);
            }
        }

        // DefaultDeny always decides; this is unreachable but stays closed.
        Ok(Decision::Deny)
    }

    /// Build the list-scoping predicate for `kind`, logically equal to the
    /// set of rows `evaluate(actor, Read, row)` would allow.
    pub async fn enumerate(
        &self,
        actor_id: Uuid,
        kind: ResourceKind,
    ) -> Result<Predicate, ResolverError> {
        let snapshot = self.snapshot(actor_id).await?;

        if matches!(snapshot, Some(s) if s.is_admin()) {
            return Ok(Predicate::All);
        }

        let predicate = match kind {
            ResourceKind::TimeEntry => Predicate::OwnerOrProjects {
                owner_id: actor_id,
                project_ids: self.entry_scope(actor_id, snapshot).await?,
            },
            ResourceKind::Project => Predicate::CreatorOrProjects {
                creator_id: actor_id,
                project_ids: self.project_scope(actor_id, snapshot).await?,
            },
            ResourceKind::Profile => {
                let mut subjects = BTreeSet::from([actor_id]);
                if matches!(snapshot, Some(s) if s.is_manager()) {
                    let scope = self.entry_scope(actor_id, snapshot).await?;
                    subjects.extend(self.entries.owners_with_entries_in(&scope).await?);
                }
                Predicate::Subjects(subjects)
            }
        };

        Ok(predicate)
    }

    async fn apply(
        &self,
        rule: Rule,
        actor_id: Uuid,
        action: Action,
        resource: &Resource,
        snapshot: &mut Option<Option<Snapshot>>,
    ) -> Result<Option<Decision>, ResolverError> {
        match rule {
            // Rule 1 runs before any store access, so a self read can never
            // re-enter role or membership evaluation.
            Rule::SelfAccess => Ok(rules::self_access(actor_id, action, resource)),
            Rule::AdminOverride => {
                let snap = self.cached_snapshot(snapshot, actor_id).await?;
                Ok(matches!(snap, Some(s) if s.is_admin()).then_some(Decision::Allow))
            }
            Rule::Membership => {
                let snap = self.cached_snapshot(snapshot, actor_id).await?;
                self.membership_rule(actor_id, action, resource, snap).await
            }
            Rule::Grant => {
                let snap = self.cached_snapshot(snapshot, actor_id).await?;
                self.grant_rule(actor_id, action, resource, snap).await
            }
            Rule::DefaultDeny => Ok(Some(Decision::Deny)),
        }
    }

    /// Rule 3. Project-scoped access through a membership row; profile
    /// visibility for managers over the people whose entries they can see.
    async fn membership_rule(
        &self,
        actor_id: Uuid,
        action: Action,
        resource: &Resource,
        snapshot: Option<Snapshot>,
    ) -> Result<Option<Decision>, ResolverError> {
        let Some(snap) = snapshot else {
            return Ok(None);
        };
        if !snap.active {
            return Ok(None);
        }

        let allowed = match resource {
            Resource::Project { id, .. } => {
                match self.memberships.membership_of(*id, actor_id).await? {
                    Some(m) => match action {
                        Action::Read => true,
                        Action::Write => m.role.manages_project() || m.can_edit_project,
                        Action::WritePrivileged => m.role.manages_project(),
                    },
                    None => false,
                }
            }
            Resource::TimeEntry { project_id, .. } => {
                match self.memberships.membership_of(*project_id, actor_id).await? {
                    Some(m) => match action {
                        Action::Read => true,
                        // Members and viewers only self-write, which rule 1
                        // has already settled by the time we get here.
                        Action::Write | Action::WritePrivileged => m.role.manages_project(),
                    },
                    None => false,
                }
            }
            Resource::Profile { subject_id, .. } => {
                if action != Action::Read || !snap.is_manager() {
                    false
                } else {
                    let mine = self.membership_project_ids(actor_id).await?;
                    self.subject_has_entries_in(*subject_id, &mine).await?
                }
            }
        };

        Ok(allowed.then_some(Decision::Allow))
    }

    /// Rule 4. Delegated grants. The Manager role is re-checked here at
    /// evaluation time rather than trusted from grant state, so a grant
    /// issued to a since-demoted manager is inert.
    async fn grant_rule(
        &self,
        actor_id: Uuid,
        action: Action,
        resource: &Resource,
        snapshot: Option<Snapshot>,
    ) -> Result<Option<Decision>, ResolverError> {
        if !matches!(snapshot, Some(s) if s.is_manager()) {
            return Ok(None);
        }

        let allowed = match resource {
            Resource::TimeEntry { project_id, .. } => {
                match self.grants.grant_of(actor_id, *project_id).await? {
                    Some(g) => match action {
                        Action::Read => g.capabilities.can_view_entries,
                        Action::Write => g.capabilities.can_edit_entries,
                        Action::WritePrivileged => false,
                    },
                    None => false,
                }
            }
            Resource::Project { id, .. } => {
                match self.grants.grant_of(actor_id, *id).await? {
                    Some(g) => match action {
                        // Holding any capability on a project implies seeing
                        // the project record itself.
                        Action::Read => g.capabilities.any(),
                        Action::Write => g.capabilities.can_edit_project,
                        Action::WritePrivileged => false,
                    },
                    None => false,
                }
            }
            Resource::Profile { subject_id, .. } => {
                if action != Action::Read {
                    false
                } else {
                    let granted = self
                        .granted_project_ids(actor_id, |caps| caps.can_view_entries)
                        .await?;
                    self.subject_has_entries_in(*subject_id, &granted).await?
                }
            }
        };

        Ok(allowed.then_some(Decision::Allow))
    }

    async fn cached_snapshot(
        &self,
        cache: &mut Option<Option<Snapshot>>,
        actor_id: Uuid,
    ) -> Result<Option<Snapshot>, ResolverError> {
        if let Some(snap) = cache {
            return Ok(*snap);
        }
        let snap = self.snapshot(actor_id).await?;
        *cache = Some(snap);
        Ok(snap)
    }

    async fn snapshot(&self, actor_id: Uuid) -> Result<Option<Snapshot>, ResolverError> {
        let actor = self.identity.actor(actor_id).await?;
        Ok(actor.map(|a| Snapshot {
            role: a.global_role,
            active: a.active,
        }))
    }

    /// Projects whose time entries the actor may enumerate: any membership,
    /// plus `can_view_entries` grants while the actor is an active Manager.
    async fn entry_scope(
        &self,
        actor_id: Uuid,
        snapshot: Option<Snapshot>,
    ) -> Result<BTreeSet<Uuid>, ResolverError> {
        let Some(snap) = snapshot else {
            return Ok(BTreeSet::new());
        };
        if !snap.active {
            return Ok(BTreeSet::new());
        }

        let mut scope = self.membership_project_ids(actor_id).await?;
        if snap.is_manager() {
            scope.extend(
                self.granted_project_ids(actor_id, |caps| caps.can_view_entries)
                    .await?,
            );
        }
        Ok(scope)
    }

    /// Projects whose records the actor may enumerate: any membership, plus
    /// any-capability grants while the actor is an active Manager.
    async fn project_scope(
        &self,
        actor_id: Uuid,
        snapshot: Option<Snapshot>,
    ) -> Result<BTreeSet<Uuid>, ResolverError> {
        let Some(snap) = snapshot else {
            return Ok(BTreeSet::new());
        };
        if !snap.active {
            return Ok(BTreeSet::new());
        }

        let mut scope = self.membership_project_ids(actor_id).await?;
        if snap.is_manager() {
            scope.extend(
                self.granted_project_ids(actor_id, GrantCapabilities::any)
                    .await?,
            );
        }
        Ok(scope)
    }

    async fn membership_project_ids(&self, actor_id: Uuid) -> Result<BTreeSet<Uuid>, ResolverError> {
        let memberships = self.memberships.memberships_of(actor_id).await?;
        Ok(memberships.into_iter().map(|m| m.project_id).collect())
    }

    async fn granted_project_ids(
        &self,
        actor_id: Uuid,
        capability: impl Fn(&GrantCapabilities) -> bool,
    ) -> Result<BTreeSet<Uuid>, ResolverError> {
        let grants = self.grants.grants_for(actor_id).await?;
        Ok(grants
            .into_iter()
            .filter(|g| capability(&g.capabilities))
            .map(|g| g.project_id)
            .collect())
    }

    async fn subject_has_entries_in(
        &self,
        subject_id: Uuid,
        project_ids: &BTreeSet<Uuid>,
    ) -> Result<bool, ResolverError> {
        if project_ids.is_empty() {
            return Ok(false);
        }
        let theirs = self.entries.project_ids_with_entries_by(subject_id).await?;
        Ok(theirs.iter().any(|p| project_ids.contains(p)))
    }
}
