use std::sync::Arc;

use uuid::Uuid;
use worklog_authz::models::{
    Actor, GlobalRole, Grant, GrantCapabilities, Membership, Project, ProjectRole, Resource,
    TimeEntry,
};
use worklog_authz::resolver::{Action, Decision};
use worklog_authz::store::{
    EntryStore, GrantTable, IdentityStore, MembershipRegistry, MemStore, ProjectStore,
};
use worklog_authz::Resolver;

fn resolver(store: &Arc<MemStore>) -> Resolver {
    Resolver::new(store.clone(), store.clone(), store.clone(), store.clone())
}

async fn seed_actor(store: &MemStore, role: GlobalRole, active: bool) -> anyhow::Result<Actor> {
    let mut actor = Actor::new("someone", role);
    actor.active = active;
    store.insert_actor(actor.clone()).await?;
    Ok(actor)
}

async fn seed_project(store: &MemStore, creator: Uuid) -> anyhow::Result<Project> {
    let project = Project::new("alpha", creator);
    let owner = Membership::owner_of(project.id, creator);
    store
        .create_project_with_owner(project.clone(), owner)
        .await?;
    Ok(project)
}

async fn allow(
    resolver: &Resolver,
    actor: Uuid,
    action: Action,
    resource: &Resource,
) -> anyhow::Result<bool> {
    let decision = resolver.evaluate(actor, action, resource).await?;
    Ok(decision == Decision::Allow)
}

#[tokio::test]
async fn owner_reads_and_writes_own_entry_but_cannot_reassign() -> anyhow::Result<()> {
    let store = Arc::new(MemStore::new());
    let owner = seed_actor(&store, GlobalRole::Member, true).await?;
    let project = seed_project(&store, owner.id).await?;
    let entry = TimeEntry::new(owner.id, project.id, 90);
    store.insert_entry(entry.clone()).await?;

    let resolver = resolver(&store);
    let resource = Resource::from(&entry);

    assert!(allow(&resolver, owner.id, Action::Read, &resource).await?);
    assert!(allow(&resolver, owner.id, Action::Write, &resource).await?);
    // Ownership reassignment is privileged; owning the entry is not enough.
    // The owner here is also project Owner, which does qualify, so use a
    // plain member's entry in another project to isolate self-access.
    let member = seed_actor(&store, GlobalRole::Member, true).await?;
    let other_project = seed_project(&store, owner.id).await?;
    store
        .insert_membership(Membership::new(other_project.id, member.id, ProjectRole::Member))
        .await?;
    let theirs = TimeEntry::new(member.id, other_project.id, 30);
    store.insert_entry(theirs.clone()).await?;

    let theirs_resource = Resource::from(&theirs);
    assert!(allow(&resolver, member.id, Action::Write, &theirs_resource).await?);
    assert!(!allow(&resolver, member.id, Action::WritePrivileged, &theirs_resource).await?);
    Ok(())
}

#[tokio::test]
async fn self_access_survives_deactivation() -> anyhow::Result<()> {
    let store = Arc::new(MemStore::new());
    let owner = seed_actor(&store, GlobalRole::Member, true).await?;
    let project = seed_project(&store, owner.id).await?;
    let entry = TimeEntry::new(owner.id, project.id, 45);
    store.insert_entry(entry.clone()).await?;
    store.set_active(owner.id, false).await?;

    let resolver = resolver(&store);

    // Rule 1 never consults the identity store, so an inactive actor keeps
    // access to their own rows.
    assert!(allow(&resolver, owner.id, Action::Read, &Resource::from(&entry)).await?);
    assert!(allow(&resolver, owner.id, Action::Write, &Resource::profile(owner.id)).await?);
    Ok(())
}

#[tokio::test]
async fn inactive_actor_loses_role_and_membership_access() -> anyhow::Result<()> {
    let store = Arc::new(MemStore::new());
    let admin = seed_actor(&store, GlobalRole::Admin, false).await?;
    let creator = seed_actor(&store, GlobalRole::Member, true).await?;
    let project = seed_project(&store, creator.id).await?;
    let entry = TimeEntry::new(creator.id, project.id, 10);
    store.insert_entry(entry.clone()).await?;

    let resolver = resolver(&store);
    let resource = Resource::from(&entry);

    // An inactive admin is not an admin for evaluation purposes.
    assert!(!allow(&resolver, admin.id, Action::Read, &resource).await?);

    store.set_active(creator.id, false).await?;
    let project_resource = Resource::from(&project);
    // Membership access gone, but the creator still self-reads the project.
    assert!(allow(&resolver, creator.id, Action::Read, &project_resource).await?);
    Ok(())
}

#[tokio::test]
async fn admin_overrides_everything_including_privileged_writes() -> anyhow::Result<()> {
    let store = Arc::new(MemStore::new());
    let admin = seed_actor(&store, GlobalRole::Admin, true).await?;
    let owner = seed_actor(&store, GlobalRole::Member, true).await?;
    let project = seed_project(&store, owner.id).await?;
    let entry = TimeEntry::new(owner.id, project.id, 60);
    store.insert_entry(entry.clone()).await?;

    let resolver = resolver(&store);
    let resource = Resource::from(&entry);

    assert!(allow(&resolver, admin.id, Action::Read, &resource).await?);
    assert!(allow(&resolver, admin.id, Action::Write, &resource).await?);
    assert!(allow(&resolver, admin.id, Action::WritePrivileged, &resource).await?);
    assert!(allow(&resolver, admin.id, Action::WritePrivileged, &Resource::profile_role(owner.id)).await?);
    Ok(())
}

#[tokio::test]
async fn nobody_writes_their_own_role_field() -> anyhow::Result<()> {
    let store = Arc::new(MemStore::new());
    let manager = seed_actor(&store, GlobalRole::Manager, true).await?;

    let resolver = resolver(&store);

    assert!(allow(&resolver, manager.id, Action::Write, &Resource::profile(manager.id)).await?);
    assert!(
        !allow(
            &resolver,
            manager.id,
            Action::WritePrivileged,
            &Resource::profile_role(manager.id)
        )
        .await?
    );
    Ok(())
}

#[tokio::test]
async fn membership_grants_read_to_every_role_but_writes_to_managers() -> anyhow::Result<()> {
    let store = Arc::new(MemStore::new());
    let owner = seed_actor(&store, GlobalRole::Member, true).await?;
    let viewer = seed_actor(&store, GlobalRole::Member, true).await?;
    let manager = seed_actor(&store, GlobalRole::Member, true).await?;
    let project = seed_project(&store, owner.id).await?;
    store
        .insert_membership(Membership::new(project.id, viewer.id, ProjectRole::Viewer))
        .await?;
    store
        .insert_membership(Membership::new(project.id, manager.id, ProjectRole::Manager))
        .await?;

    let entry = TimeEntry::new(owner.id, project.id, 120);
    store.insert_entry(entry.clone()).await?;

    let resolver = resolver(&store);
    let resource = Resource::from(&entry);

    assert!(allow(&resolver, viewer.id, Action::Read, &resource).await?);
    assert!(!allow(&resolver, viewer.id, Action::Write, &resource).await?);

    assert!(allow(&resolver, manager.id, Action::Write, &resource).await?);
    assert!(allow(&resolver, manager.id, Action::WritePrivileged, &resource).await?);
    Ok(())
}

#[tokio::test]
async fn can_edit_project_flag_extends_project_writes_only() -> anyhow::Result<()> {
    let store = Arc::new(MemStore::new());
    let owner = seed_actor(&store, GlobalRole::Member, true).await?;
    let member = seed_actor(&store, GlobalRole::Member, true).await?;
    let project = seed_project(&store, owner.id).await?;
    let mut membership = Membership::new(project.id, member.id, ProjectRole::Member);
    membership.can_edit_project = true;
    store.insert_membership(membership.clone()).await?;

    let entry = TimeEntry::new(owner.id, project.id, 20);
    store.insert_entry(entry.clone()).await?;

    let resolver = resolver(&store);

    assert!(allow(&resolver, member.id, Action::Write, &Resource::from(&project)).await?);
    assert!(!allow(&resolver, member.id, Action::WritePrivileged, &Resource::from(&project)).await?);
    // The flag says nothing about other people's entries.
    assert!(!allow(&resolver, member.id, Action::Write, &Resource::from(&entry)).await?);
    Ok(())
}

#[tokio::test]
async fn grants_follow_their_capabilities_and_never_go_privileged() -> anyhow::Result<()> {
    let store = Arc::new(MemStore::new());
    let admin = seed_actor(&store, GlobalRole::Admin, true).await?;
    let owner = seed_actor(&store, GlobalRole::Member, true).await?;
    let viewer_mgr = seed_actor(&store, GlobalRole::Manager, true).await?;
    let editor_mgr = seed_actor(&store, GlobalRole::Manager, true).await?;
    let project = seed_project(&store, owner.id).await?;
    let entry = TimeEntry::new(owner.id, project.id, 75);
    store.insert_entry(entry.clone()).await?;

    store
        .insert_grant(Grant::new(
            viewer_mgr.id,
            project.id,
            GrantCapabilities::view_entries(),
            admin.id,
        ))
        .await?;
    store
        .insert_grant(Grant::new(
            editor_mgr.id,
            project.id,
            GrantCapabilities::edit_entries(),
            admin.id,
        ))
        .await?;

    let resolver = resolver(&store);
    let resource = Resource::from(&entry);

    assert!(allow(&resolver, viewer_mgr.id, Action::Read, &resource).await?);
    assert!(!allow(&resolver, viewer_mgr.id, Action::Write, &resource).await?);

    assert!(allow(&resolver, editor_mgr.id, Action::Write, &resource).await?);
    assert!(!allow(&resolver, editor_mgr.id, Action::WritePrivileged, &resource).await?);

    // Any capability at all makes the project record itself readable.
    assert!(allow(&resolver, viewer_mgr.id, Action::Read, &Resource::from(&project)).await?);
    assert!(!allow(&resolver, viewer_mgr.id, Action::Write, &Resource::from(&project)).await?);
    Ok(())
}

#[tokio::test]
async fn stale_grant_is_inert_until_role_restored() -> anyhow::Result<()> {
    let store = Arc::new(MemStore::new());
    let admin = seed_actor(&store, GlobalRole::Admin, true).await?;
    let owner = seed_actor(&store, GlobalRole::Member, true).await?;
    let manager = seed_actor(&store, GlobalRole::Manager, true).await?;
    let project = seed_project(&store, owner.id).await?;
    let entry = TimeEntry::new(owner.id, project.id, 15);
    store.insert_entry(entry.clone()).await?;

    store
        .insert_grant(Grant::new(
            manager.id,
            project.id,
            GrantCapabilities::view_entries(),
            admin.id,
        ))
        .await?;

    let resolver = resolver(&store);
    let resource = Resource::from(&entry);

    assert!(allow(&resolver, manager.id, Action::Read, &resource).await?);

    // Demotion leaves the grant row in place but the resolver re-checks the
    // role at evaluation time.
    store.set_global_role(manager.id, GlobalRole::Member).await?;
    assert!(!allow(&resolver, manager.id, Action::Read, &resource).await?);

    store.set_global_role(manager.id, GlobalRole::Manager).await?;
    assert!(allow(&resolver, manager.id, Action::Read, &resource).await?);
    Ok(())
}

#[tokio::test]
async fn manager_sees_profiles_of_people_with_entries_in_scope() -> anyhow::Result<()> {
    let store = Arc::new(MemStore::new());
    let admin = seed_actor(&store, GlobalRole::Admin, true).await?;
    let owner = seed_actor(&store, GlobalRole::Member, true).await?;
    let idle = seed_actor(&store, GlobalRole::Member, true).await?;
    let manager = seed_actor(&store, GlobalRole::Manager, true).await?;
    let project = seed_project(&store, owner.id).await?;
    store
        .insert_membership(Membership::new(project.id, idle.id, ProjectRole::Member))
        .await?;
    store
        .insert_entry(TimeEntry::new(owner.id, project.id, 50))
        .await?;

    store
        .insert_grant(Grant::new(
            manager.id,
            project.id,
            GrantCapabilities::view_entries(),
            admin.id,
        ))
        .await?;

    let resolver = resolver(&store);

    // Visible: owner logged time in a project the manager can view.
    assert!(allow(&resolver, manager.id, Action::Read, &Resource::profile(owner.id)).await?);
    // Not visible: a member of the same project with no entries.
    assert!(!allow(&resolver, manager.id, Action::Read, &Resource::profile(idle.id)).await?);
    // Profile visibility is read-only.
    assert!(!allow(&resolver, manager.id, Action::Write, &Resource::profile(owner.id)).await?);
    Ok(())
}

#[tokio::test]
async fn unknown_actor_hits_default_deny() -> anyhow::Result<()> {
    let store = Arc::new(MemStore::new());
    let owner = seed_actor(&store, GlobalRole::Member, true).await?;
    let project = seed_project(&store, owner.id).await?;
    let entry = TimeEntry::new(owner.id, project.id, 5);
    store.insert_entry(entry.clone()).await?;

    let resolver = resolver(&store);
    let stranger = Uuid::new_v4();

    assert!(!allow(&resolver, stranger, Action::Read, &Resource::from(&entry)).await?);
    assert!(!allow(&resolver, stranger, Action::Read, &Resource::from(&project)).await?);
    assert!(!allow(&resolver, stranger, Action::Read, &Resource::profile(owner.id)).await?);
    Ok(())
}
