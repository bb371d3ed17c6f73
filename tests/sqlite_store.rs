use std::sync::Arc;

use sqlx::SqlitePool;
use tempfile::TempDir;
use uuid::Uuid;
use worklog_authz::errors::{AccessError, StoreError};
use worklog_authz::events::init_event_bus;
use worklog_authz::models::{
    Actor, GlobalRole, Grant, GrantCapabilities, Membership, Project, ProjectRole, TimeEntry,
};
use worklog_authz::store::{
    EntryStore, GrantTable, IdentityStore, MembershipRegistry, ProjectStore, SqliteStore,
};
use worklog_authz::{AccessControl, Predicate};

async fn open_store() -> anyhow::Result<(TempDir, SqliteStore)> {
    let dir = TempDir::new()?;
    let db_path = dir.path().join("authz.sqlite");
    let _ = std::fs::File::create(&db_path)?;
    let pool = SqlitePool::connect(&format!("sqlite://{}", db_path.display())).await?;
    let store = SqliteStore::new(pool);
    store.ensure_schema().await?;
    Ok((dir, store))
}

#[tokio::test]
async fn actors_round_trip_with_role_and_active_flag() -> anyhow::Result<()> {
    let (_dir, store) = open_store().await?;

    let actor = Actor::new("alice", GlobalRole::Manager);
    store.insert_actor(actor.clone()).await?;

    let loaded = store
        .actor(actor.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("missing actor"))?;
    assert_eq!(loaded.name, "alice");
    assert_eq!(loaded.global_role, GlobalRole::Manager);
    assert!(loaded.active);

    store.set_global_role(actor.id, GlobalRole::Member).await?;
    store.set_active(actor.id, false).await?;
    assert_eq!(store.get_role(actor.id).await?, Some(GlobalRole::Member));
    assert!(!store.is_active(actor.id).await?);
    Ok(())
}

#[tokio::test]
async fn project_creation_is_atomic_with_the_owner_membership() -> anyhow::Result<()> {
    let (_dir, store) = open_store().await?;

    let alice = Actor::new("alice", GlobalRole::Member);
    store.insert_actor(alice.clone()).await?;

    let project = Project::new("roadmap", alice.id);
    let owner = Membership::owner_of(project.id, alice.id);
    store
        .create_project_with_owner(project.clone(), owner.clone())
        .await?;

    let loaded = store
        .membership_of(project.id, alice.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("missing owner membership"))?;
    assert_eq!(loaded.role, ProjectRole::Owner);

    // Deleting the project takes its roster with it.
    store.remove_project(project.id).await?;
    assert!(store.project(project.id).await?.is_none());
    assert!(store.membership_of(project.id, alice.id).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn unique_pairs_surface_as_duplicate_errors() -> anyhow::Result<()> {
    let (_dir, store) = open_store().await?;

    let alice = Actor::new("alice", GlobalRole::Member);
    let bob = Actor::new("bob", GlobalRole::Manager);
    store.insert_actor(alice.clone()).await?;
    store.insert_actor(bob.clone()).await?;

    let project = Project::new("roadmap", alice.id);
    store
        .create_project_with_owner(project.clone(), Membership::owner_of(project.id, alice.id))
        .await?;

    let err = store
        .insert_membership(Membership::new(project.id, alice.id, ProjectRole::Viewer))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Duplicate(_)));

    store
        .insert_grant(Grant::new(
            bob.id,
            project.id,
            GrantCapabilities::view_entries(),
            alice.id,
        ))
        .await?;
    let err = store
        .insert_grant(Grant::new(
            bob.id,
            project.id,
            GrantCapabilities::edit_entries(),
            alice.id,
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Duplicate(_)));
    Ok(())
}

#[tokio::test]
async fn predicate_filtering_happens_in_the_query() -> anyhow::Result<()> {
    let (_dir, store) = open_store().await?;

    let alice = Actor::new("alice", GlobalRole::Member);
    let bob = Actor::new("bob", GlobalRole::Member);
    store.insert_actor(alice.clone()).await?;
    store.insert_actor(bob.clone()).await?;

    let visible = Project::new("mine", alice.id);
    let hidden = Project::new("theirs", bob.id);
    store
        .create_project_with_owner(visible.clone(), Membership::owner_of(visible.id, alice.id))
        .await?;
    store
        .create_project_with_owner(hidden.clone(), Membership::owner_of(hidden.id, bob.id))
        .await?;

    store
        .insert_entry(TimeEntry::new(alice.id, visible.id, 30))
        .await?;
    store
        .insert_entry(TimeEntry::new(bob.id, hidden.id, 45))
        .await?;

    let projects = store
        .list_projects(&Predicate::CreatorOrProjects {
            creator_id: alice.id,
            project_ids: [visible.id].into(),
        })
        .await?;
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0].id, visible.id);

    let entries = store
        .list_entries(&Predicate::OwnerOrProjects {
            owner_id: alice.id,
            project_ids: [visible.id].into(),
        })
        .await?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].owner_id, alice.id);

    // Nothing matches nothing.
    assert!(store.list_entries(&Predicate::Nothing).await?.is_empty());
    assert!(store.list_projects(&Predicate::Nothing).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn entry_updates_and_reassignment_persist() -> anyhow::Result<()> {
    let (_dir, store) = open_store().await?;

    let alice = Actor::new("alice", GlobalRole::Member);
    let bob = Actor::new("bob", GlobalRole::Member);
    store.insert_actor(alice.clone()).await?;
    store.insert_actor(bob.clone()).await?;
    let project = Project::new("roadmap", alice.id);
    store
        .create_project_with_owner(project.clone(), Membership::owner_of(project.id, alice.id))
        .await?;

    let entry = TimeEntry::new(alice.id, project.id, 60).with_note("draft");
    store.insert_entry(entry.clone()).await?;

    let mut changed = entry.clone();
    changed.minutes = 90;
    changed.note = Some("final".into());
    store.update_entry(changed).await?;

    store.set_entry_owner(entry.id, bob.id).await?;

    let loaded = store
        .entry(entry.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("missing entry"))?;
    assert_eq!(loaded.minutes, 90);
    assert_eq!(loaded.note.as_deref(), Some("final"));
    assert_eq!(loaded.owner_id, bob.id);
    Ok(())
}

#[tokio::test]
async fn the_whole_service_runs_on_sqlite() -> anyhow::Result<()> {
    let (_dir, store) = open_store().await?;
    let (bus, _rx) = init_event_bus();
    let svc = AccessControl::new(Arc::new(store), bus);

    let admin = svc.register_actor("root", GlobalRole::Admin).await?;
    let manager = svc.register_actor("meg", GlobalRole::Manager).await?;
    let owner = svc.register_actor("olive", GlobalRole::Member).await?;

    let project = svc.create_project(owner.id, "billing").await?;
    let entry = svc
        .record_entry(owner.id, TimeEntry::new(owner.id, project.id, 120))
        .await?;

    // Pre-grant: denied. Post-grant: visible. Post-revoke: denied again.
    assert!(svc.read_entry(manager.id, entry.id).await.unwrap_err().is_denied());

    let grant = svc
        .issue_grant(
            admin.id,
            manager.id,
            project.id,
            GrantCapabilities::view_entries(),
        )
        .await?;
    assert!(svc.read_entry(manager.id, entry.id).await.is_ok());
    assert_eq!(svc.list_entries(manager.id).await?.len(), 1);

    svc.revoke_grant(admin.id, grant.id).await?;
    assert!(svc.read_entry(manager.id, entry.id).await.unwrap_err().is_denied());

    // Unknown rows come back as NotFound, not Denied.
    let err = svc.read_entry(owner.id, Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, AccessError::NotFound(_)));
    Ok(())
}
