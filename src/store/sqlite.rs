use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{
    EntryIndex, EntryStore, GrantTable, IdentityStore, MembershipRegistry, ProjectStore,
    StoreResult,
};
use crate::errors::StoreError;
use crate::models::{
    Actor, GlobalRole, Grant, GrantCapabilities, Membership, Project, ProjectRole, TimeEntry,
};
use crate::resolver::Predicate;

/// SQLite backend for all five store contracts. Ids are stored as TEXT and
/// parsed on read; the unique pair constraints live in the schema.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Install the schema. Safe to call repeatedly.
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS actors (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                global_role TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS projects (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                created_by TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS memberships (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                role TEXT NOT NULL,
                can_edit_project INTEGER NOT NULL DEFAULT 0,
                can_view_reports INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (project_id, user_id)
            )",
            "CREATE TABLE IF NOT EXISTS grants (
                id TEXT PRIMARY KEY,
                manager_id TEXT NOT NULL,
                project_id TEXT NOT NULL,
                can_view_entries INTEGER NOT NULL DEFAULT 0,
                can_edit_entries INTEGER NOT NULL DEFAULT 0,
                can_view_reports INTEGER NOT NULL DEFAULT 0,
                can_edit_project INTEGER NOT NULL DEFAULT 0,
                granted_by TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (manager_id, project_id)
            )",
            "CREATE TABLE IF NOT EXISTS time_entries (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                project_id TEXT NOT NULL,
                minutes INTEGER NOT NULL,
                note TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        ];

        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

fn parse_id(value: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(value).map_err(|e| StoreError::Corrupt(format!("bad uuid {value:?}: {e}")))
}

fn in_placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn row_actor(row: &SqliteRow) -> StoreResult<Actor> {
    let role: String = row.try_get("global_role")?;
    Ok(Actor {
        id: parse_id(&row.try_get::<String, _>("id")?)?,
        name: row.try_get("name")?,
        global_role: GlobalRole::parse(&role)
            .ok_or_else(|| StoreError::Corrupt(format!("bad global role {role:?}")))?,
        active: row.try_get("active")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

fn row_project(row: &SqliteRow) -> StoreResult<Project> {
    Ok(Project {
        id: parse_id(&row.try_get::<String, _>("id")?)?,
        name: row.try_get("name")?,
        created_by: parse_id(&row.try_get::<String, _>("created_by")?)?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

fn row_membership(row: &SqliteRow) -> StoreResult<Membership> {
    let role: String = row.try_get("role")?;
    Ok(Membership {
        id: parse_id(&row.try_get::<String, _>("id")?)?,
        project_id: parse_id(&row.try_get::<String, _>("project_id")?)?,
        user_id: parse_id(&row.try_get::<String, _>("user_id")?)?,
        role: ProjectRole::parse(&role)
            .ok_or_else(|| StoreError::Corrupt(format!("bad project role {role:?}")))?,
        can_edit_project: row.try_get("can_edit_project")?,
        can_view_reports: row.try_get("can_view_reports")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

fn row_grant(row: &SqliteRow) -> StoreResult<Grant> {
    Ok(Grant {
        id: parse_id(&row.try_get::<String, _>("id")?)?,
        manager_id: parse_id(&row.try_get::<String, _>("manager_id")?)?,
        project_id: parse_id(&row.try_get::<String, _>("project_id")?)?,
        capabilities: GrantCapabilities {
            can_view_entries: row.try_get("can_view_entries")?,
            can_edit_entries: row.try_get("can_edit_entries")?,
            can_view_reports: row.try_get("can_view_reports")?,
            can_edit_project: row.try_get("can_edit_project")?,
        },
        granted_by: parse_id(&row.try_get::<String, _>("granted_by")?)?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

fn row_entry(row: &SqliteRow) -> StoreResult<TimeEntry> {
    Ok(TimeEntry {
        id: parse_id(&row.try_get::<String, _>("id")?)?,
        owner_id: parse_id(&row.try_get::<String, _>("owner_id")?)?,
        project_id: parse_id(&row.try_get::<String, _>("project_id")?)?,
        minutes: row.try_get("minutes")?,
        note: row.try_get("note")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

#[async_trait]
impl IdentityStore for SqliteStore {
    async fn actor(&self, actor_id: Uuid) -> StoreResult<Option<Actor>> {
        let row = sqlx::query("SELECT * FROM actors WHERE id = ?")
            .bind(actor_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_actor).transpose()
    }

    async fn get_role(&self, actor_id: Uuid) -> StoreResult<Option<GlobalRole>> {
        Ok(self.actor(actor_id).await?.map(|a| a.global_role))
    }

    async fn is_active(&self, actor_id: Uuid) -> StoreResult<bool> {
        Ok(self.actor(actor_id).await?.map(|a| a.active).unwrap_or(false))
    }

    async fn insert_actor(&self, actor: Actor) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO actors (id, name, global_role, active, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(actor.id.to_string())
        .bind(&actor.name)
        .bind(actor.global_role.as_str())
        .bind(actor.active)
        .bind(actor.created_at)
        .bind(actor.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_global_role(&self, actor_id: Uuid, role: GlobalRole) -> StoreResult<()> {
        sqlx::query("UPDATE actors SET global_role = ?, updated_at = ? WHERE id = ?")
            .bind(role.as_str())
            .bind(Utc::now())
            .bind(actor_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_active(&self, actor_id: Uuid, active: bool) -> StoreResult<()> {
        sqlx::query("UPDATE actors SET active = ?, updated_at = ? WHERE id = ?")
            .bind(active)
            .bind(Utc::now())
            .bind(actor_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_actors(&self, predicate: &Predicate) -> StoreResult<Vec<Actor>> {
        let rows = match predicate {
            Predicate::All => {
                sqlx::query("SELECT * FROM actors ORDER BY created_at")
                    .fetch_all(&self.pool)
                    .await?
            }
            Predicate::Subjects(ids) if !ids.is_empty() => {
                let sql = format!(
                    "SELECT * FROM actors WHERE id IN ({}) ORDER BY created_at",
                    in_placeholders(ids.len())
                );
                let mut query = sqlx::query(&sql);
                for id in ids {
                    query = query.bind(id.to_string());
                }
                query.fetch_all(&self.pool).await?
            }
            _ => Vec::new(),
        };
        rows.iter().map(row_actor).collect()
    }
}

#[async_trait]
impl MembershipRegistry for SqliteStore {
    async fn membership(&self, membership_id: Uuid) -> StoreResult<Option<Membership>> {
        let row = sqlx::query("SELECT * FROM memberships WHERE id = ?")
            .bind(membership_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_membership).transpose()
    }

    async fn membership_of(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> StoreResult<Option<Membership>> {
        let row = sqlx::query("SELECT * FROM memberships WHERE project_id = ? AND user_id = ?")
            .bind(project_id.to_string())
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_membership).transpose()
    }

    async fn members_of(&self, project_id: Uuid) -> StoreResult<Vec<Membership>> {
        let rows = sqlx::query("SELECT * FROM memberships WHERE project_id = ?")
            .bind(project_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_membership).collect()
    }

    async fn memberships_of(&self, user_id: Uuid) -> StoreResult<Vec<Membership>> {
        let rows = sqlx::query("SELECT * FROM memberships WHERE user_id = ?")
            .bind(user_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_membership).collect()
    }

    async fn insert_membership(&self, membership: Membership) -> StoreResult<()> {
        if self
            .membership_of(membership.project_id, membership.user_id)
            .await?
            .is_some()
        {
            return Err(StoreError::Duplicate(format!(
                "membership for ({}, {})",
                membership.project_id, membership.user_id
            )));
        }

        sqlx::query(
            "INSERT INTO memberships
             (id, project_id, user_id, role, can_edit_project, can_view_reports, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(membership.id.to_string())
        .bind(membership.project_id.to_string())
        .bind(membership.user_id.to_string())
        .bind(membership.role.as_str())
        .bind(membership.can_edit_project)
        .bind(membership.can_view_reports)
        .bind(membership.created_at)
        .bind(membership.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_membership_role(&self, membership_id: Uuid, role: ProjectRole) -> StoreResult<()> {
        sqlx::query("UPDATE memberships SET role = ?, updated_at = ? WHERE id = ?")
            .bind(role.as_str())
            .bind(Utc::now())
            .bind(membership_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_membership_flags(
        &self,
        membership_id: Uuid,
        can_edit_project: bool,
        can_view_reports: bool,
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE memberships SET can_edit_project = ?, can_view_reports = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(can_edit_project)
        .bind(can_view_reports)
        .bind(Utc::now())
        .bind(membership_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_membership(&self, membership_id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM memberships WHERE id = ?")
            .bind(membership_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl GrantTable for SqliteStore {
    async fn grant(&self, grant_id: Uuid) -> StoreResult<Option<Grant>> {
        let row = sqlx::query("SELECT * FROM grants WHERE id = ?")
            .bind(grant_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_grant).transpose()
    }

    async fn grant_of(&self, manager_id: Uuid, project_id: Uuid) -> StoreResult<Option<Grant>> {
        let row = sqlx::query("SELECT * FROM grants WHERE manager_id = ? AND project_id = ?")
            .bind(manager_id.to_string())
            .bind(project_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_grant).transpose()
    }

    async fn grants_for(&self, manager_id: Uuid) -> StoreResult<Vec<Grant>> {
        let rows = sqlx::query("SELECT * FROM grants WHERE manager_id = ?")
            .bind(manager_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_grant).collect()
    }

    async fn grants_on(&self, project_id: Uuid) -> StoreResult<Vec<Grant>> {
        let rows = sqlx::query("SELECT * FROM grants WHERE project_id = ?")
            .bind(project_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_grant).collect()
    }

    async fn insert_grant(&self, grant: Grant) -> StoreResult<()> {
        if self.grant_of(grant.manager_id, grant.project_id).await?.is_some() {
            return Err(StoreError::Duplicate(format!(
                "grant for ({}, {})",
                grant.manager_id, grant.project_id
            )));
        }

        sqlx::query(
            "INSERT INTO grants
             (id, manager_id, project_id, can_view_entries, can_edit_entries,
              can_view_reports, can_edit_project, granted_by, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(grant.id.to_string())
        .bind(grant.manager_id.to_string())
        .bind(grant.project_id.to_string())
        .bind(grant.capabilities.can_view_entries)
        .bind(grant.capabilities.can_edit_entries)
        .bind(grant.capabilities.can_view_reports)
        .bind(grant.capabilities.can_edit_project)
        .bind(grant.granted_by.to_string())
        .bind(grant.created_at)
        .bind(grant.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_grant(&self, grant_id: Uuid) -> StoreResult<()> {
        // Idempotent: zero affected rows is fine.
        sqlx::query("DELETE FROM grants WHERE id = ?")
            .bind(grant_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ProjectStore for SqliteStore {
    async fn project(&self, project_id: Uuid) -> StoreResult<Option<Project>> {
        let row = sqlx::query("SELECT * FROM projects WHERE id = ?")
            .bind(project_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_project).transpose()
    }

    async fn create_project_with_owner(
        &self,
        project: Project,
        owner: Membership,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO projects (id, name, created_by, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(project.id.to_string())
        .bind(&project.name)
        .bind(project.created_by.to_string())
        .bind(project.created_at)
        .bind(project.updated_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO memberships
             (id, project_id, user_id, role, can_edit_project, can_view_reports, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(owner.id.to_string())
        .bind(owner.project_id.to_string())
        .bind(owner.user_id.to_string())
        .bind(owner.role.as_str())
        .bind(owner.can_edit_project)
        .bind(owner.can_view_reports)
        .bind(owner.created_at)
        .bind(owner.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn remove_project(&self, project_id: Uuid) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM memberships WHERE project_id = ?")
            .bind(project_id.to_string())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM projects WHERE id = ?")
            .bind(project_id.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_projects(&self, predicate: &Predicate) -> StoreResult<Vec<Project>> {
        let rows = match predicate {
            Predicate::All => {
                sqlx::query("SELECT * FROM projects ORDER BY created_at")
                    .fetch_all(&self.pool)
                    .await?
            }
            Predicate::CreatorOrProjects {
                creator_id,
                project_ids,
            } => {
                let sql = if project_ids.is_empty() {
                    "SELECT * FROM projects WHERE created_by = ? ORDER BY created_at".to_string()
                } else {
                    format!(
                        "SELECT * FROM projects WHERE created_by = ? OR id IN ({}) ORDER BY created_at",
                        in_placeholders(project_ids.len())
                    )
                };
                let mut query = sqlx::query(&sql).bind(creator_id.to_string());
                for id in project_ids {
                    query = query.bind(id.to_string());
                }
                query.fetch_all(&self.pool).await?
            }
            _ => Vec::new(),
        };
        rows.iter().map(row_project).collect()
    }
}

#[async_trait]
impl EntryIndex for SqliteStore {
    async fn project_ids_with_entries_by(&self, owner_id: Uuid) -> StoreResult<BTreeSet<Uuid>> {
        let rows = sqlx::query("SELECT DISTINCT project_id FROM time_entries WHERE owner_id = ?")
            .bind(owner_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|r| parse_id(&r.try_get::<String, _>("project_id")?))
            .collect()
    }

    async fn owners_with_entries_in(
        &self,
        project_ids: &BTreeSet<Uuid>,
    ) -> StoreResult<BTreeSet<Uuid>> {
        if project_ids.is_empty() {
            return Ok(BTreeSet::new());
        }
        let sql = format!(
            "SELECT DISTINCT owner_id FROM time_entries WHERE project_id IN ({})",
            in_placeholders(project_ids.len())
        );
        let mut query = sqlx::query(&sql);
        for id in project_ids {
            query = query.bind(id.to_string());
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter()
            .map(|r| parse_id(&r.try_get::<String, _>("owner_id")?))
            .collect()
    }
}

#[async_trait]
impl EntryStore for SqliteStore {
    async fn entry(&self, entry_id: Uuid) -> StoreResult<Option<TimeEntry>> {
        let row = sqlx::query("SELECT * FROM time_entries WHERE id = ?")
            .bind(entry_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_entry).transpose()
    }

    async fn insert_entry(&self, entry: TimeEntry) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO time_entries (id, owner_id, project_id, minutes, note, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.id.to_string())
        .bind(entry.owner_id.to_string())
        .bind(entry.project_id.to_string())
        .bind(entry.minutes)
        .bind(&entry.note)
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_entry(&self, entry: TimeEntry) -> StoreResult<()> {
        sqlx::query("UPDATE time_entries SET minutes = ?, note = ?, updated_at = ? WHERE id = ?")
            .bind(entry.minutes)
            .bind(&entry.note)
            .bind(Utc::now())
            .bind(entry.id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_entry_owner(&self, entry_id: Uuid, owner_id: Uuid) -> StoreResult<()> {
        sqlx::query("UPDATE time_entries SET owner_id = ?, updated_at = ? WHERE id = ?")
            .bind(owner_id.to_string())
            .bind(Utc::now())
            .bind(entry_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn remove_entry(&self, entry_id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM time_entries WHERE id = ?")
            .bind(entry_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_entries(&self, predicate: &Predicate) -> StoreResult<Vec<TimeEntry>> {
        let rows = match predicate {
            Predicate::All => {
                sqlx::query("SELECT * FROM time_entries ORDER BY created_at")
                    .fetch_all(&self.pool)
                    .await?
            }
            Predicate::OwnerOrProjects {
                owner_id,
                project_ids,
            } => {
                let sql = if project_ids.is_empty() {
                    "SELECT * FROM time_entries WHERE owner_id = ? ORDER BY created_at".to_string()
                } else {
                    format!(
                        "SELECT * FROM time_entries WHERE owner_id = ? OR project_id IN ({}) ORDER BY created_at",
                        in_placeholders(project_ids.len())
                    )
                };
                let mut query = sqlx::query(&sql).bind(owner_id.to_string());
                for id in project_ids {
                    query = query.bind(id.to_string());
                }
                query.fetch_all(&self.pool).await?
            }
            _ => Vec::new(),
        };
        rows.iter().map(row_entry).collect()
    }
}
