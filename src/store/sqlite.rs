//! `SQLite`-backed plan store

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{OptionalExtension, Row, params};

use super::{Identity, PlanStore, require};
use crate::budget::{Expense, Plan, PlanDraft, PlanId, SharingInfo};
use crate::db::{DbConn, DbPool};
use crate::{Error, Result};

const PLAN_COLUMNS: &str = "id, name, income, expenses, plan_text, notes, created_at, sharing";

/// Plan repository backed by the shared connection pool
#[derive(Clone)]
pub struct SqlitePlanStore {
    pool: DbPool,
}

impl SqlitePlanStore {
    /// Create a new plan store
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<DbConn> {
        self.pool
            .get()
            .map_err(|e| Error::Persistence(e.to_string()))
    }
}

impl PlanStore for SqlitePlanStore {
    fn list(&self, identity: Option<&Identity>) -> Result<Vec<Plan>> {
        let identity = require(identity)?;
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {PLAN_COLUMNS} FROM plans WHERE user_id = ?1
             ORDER BY created_at DESC, rowid DESC"
        ))?;

        let plans = stmt
            .query_map([identity.user_id()], row_to_plan)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(plans)
    }

    fn get(&self, identity: Option<&Identity>, id: &PlanId) -> Result<Option<Plan>> {
        let identity = require(identity)?;
        let conn = self.conn()?;

        let plan = conn
            .query_row(
                &format!("SELECT {PLAN_COLUMNS} FROM plans WHERE id = ?1 AND user_id = ?2"),
                [id.as_str(), identity.user_id()],
                row_to_plan,
            )
            .optional()?;

        Ok(plan)
    }

    fn create(&self, identity: Option<&Identity>, draft: PlanDraft) -> Result<Plan> {
        let identity = require(identity)?;
        let conn = self.conn()?;
        let plan = Plan::create(draft);
        let created_at = format_datetime(&plan.created_at);

        conn.execute(
            "INSERT INTO plans (id, user_id, name, income, expenses, plan_text, notes, created_at, updated_at, sharing)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8, ?9)",
            params![
                plan.id.as_str(),
                identity.user_id(),
                plan.name,
                plan.income,
                serde_json::to_string(&plan.expenses)?,
                plan.plan_text,
                plan.notes,
                created_at,
                plan.sharing.as_ref().map(serde_json::to_string).transpose()?,
            ],
        )
        .map_err(|e| Error::Persistence(e.to_string()))?;

        tracing::info!(plan_id = %plan.id, user_id = identity.user_id(), "plan created");
        Ok(plan)
    }

    fn update(&self, identity: Option<&Identity>, id: &PlanId, draft: PlanDraft) -> Result<Plan> {
        let identity = require(identity)?;
        let mut plan = self
            .get(Some(identity), id)?
            .ok_or_else(|| Error::NotFound(format!("plan {id}")))?;
        plan.replace(draft);

        let conn = self.conn()?;
        let now = format_datetime(&Utc::now());
        conn.execute(
            "UPDATE plans SET name = ?1, income = ?2, expenses = ?3, plan_text = ?4, notes = ?5,
                              sharing = ?6, updated_at = ?7
             WHERE id = ?8 AND user_id = ?9",
            params![
                plan.name,
                plan.income,
                serde_json::to_string(&plan.expenses)?,
                plan.plan_text,
                plan.notes,
                plan.sharing.as_ref().map(serde_json::to_string).transpose()?,
                now,
                id.as_str(),
                identity.user_id(),
            ],
        )
        .map_err(|e| Error::Persistence(e.to_string()))?;

        tracing::info!(plan_id = %id, user_id = identity.user_id(), "plan updated");
        Ok(plan)
    }

    fn delete(&self, identity: Option<&Identity>, id: &PlanId) -> Result<()> {
        let identity = require(identity)?;
        let conn = self.conn()?;

        let removed = conn
            .execute(
                "DELETE FROM plans WHERE id = ?1 AND user_id = ?2",
                [id.as_str(), identity.user_id()],
            )
            .map_err(|e| Error::Persistence(e.to_string()))?;

        tracing::debug!(plan_id = %id, removed, "plan delete");
        Ok(())
    }
}

fn row_to_plan(row: &Row<'_>) -> rusqlite::Result<Plan> {
    let id: String = row.get(0)?;
    let expenses: String = row.get(3)?;
    let created_at: String = row.get(6)?;
    let sharing: Option<String> = row.get(7)?;

    let expenses: Vec<Expense> = serde_json::from_str(&expenses).map_err(|e| conversion_error(3, e))?;
    let sharing: Option<SharingInfo> = sharing
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| conversion_error(7, e))?;

    Ok(Plan::from_parts(
        PlanId::from(id),
        parse_datetime(&created_at).map_err(|e| conversion_error(6, e))?,
        PlanDraft {
            name: row.get(1)?,
            income: row.get(2)?,
            expenses,
            plan_text: row.get(4)?,
            notes: row.get(5)?,
            sharing,
        },
    ))
}

fn conversion_error<E>(column: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory;
    use crate::store::contract;

    fn setup() -> SqlitePlanStore {
        SqlitePlanStore::new(init_memory().unwrap())
    }

    #[test]
    fn test_create_then_list() {
        contract::create_then_list(&setup());
    }

    #[test]
    fn test_update_replaces_one() {
        contract::update_replaces_one(&setup());
    }

    #[test]
    fn test_delete_removes_one() {
        contract::delete_removes_one(&setup());
    }

    #[test]
    fn test_scoped_per_user() {
        contract::scoped_per_user(&setup());
    }

    #[test]
    fn test_rejects_anonymous() {
        contract::rejects_anonymous(&setup());
    }

    fn corrupt(store: &SqlitePlanStore, column: &str, value: &str) -> Identity {
        let owner = Identity::new("owner").unwrap();
        let plan = store
            .create(
                Some(&owner),
                PlanDraft {
                    name: "Damaged".to_string(),
                    ..PlanDraft::default()
                },
            )
            .unwrap();
        store
            .conn()
            .unwrap()
            .execute(
                &format!("UPDATE plans SET {column} = ?1 WHERE id = ?2"),
                [value, plan.id.as_str()],
            )
            .unwrap();
        owner
    }

    #[test]
    fn test_unreadable_timestamp_is_an_error() {
        let store = setup();
        let owner = corrupt(&store, "created_at", "garbage");
        assert!(matches!(store.list(Some(&owner)), Err(Error::Sqlite(_))));
    }

    #[test]
    fn test_unreadable_expenses_is_an_error() {
        let store = setup();
        let owner = corrupt(&store, "expenses", "{not json");
        assert!(matches!(store.list(Some(&owner)), Err(Error::Sqlite(_))));
    }

    #[test]
    fn test_unreadable_sharing_is_an_error() {
        let store = setup();
        let owner = corrupt(&store, "sharing", "not json");
        assert!(matches!(store.list(Some(&owner)), Err(Error::Sqlite(_))));
    }

    #[test]
    fn test_sharing_round_trip() {
        let store = setup();
        let owner = Identity::new("owner").unwrap();
        let plan = store
            .create(
                Some(&owner),
                PlanDraft {
                    name: "Household".to_string(),
                    sharing: Some(SharingInfo {
                        owner_id: "owner".to_string(),
                        collaborators: vec!["partner".to_string()],
                        is_shared: true,
                    }),
                    ..PlanDraft::default()
                },
            )
            .unwrap();

        let loaded = store.get(Some(&owner), &plan.id).unwrap().unwrap();
        assert_eq!(loaded.sharing, plan.sharing);
    }
}
