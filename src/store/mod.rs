//! Per-user plan persistence
//!
//! Every operation is scoped to an authenticated [`Identity`]. Calling
//! without one fails with [`Error::Unauthenticated`] before any storage is
//! touched. There is no concurrency control: the last writer wins.

mod file;
mod sqlite;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::budget::{Plan, PlanDraft, PlanId};
use crate::config::{Config, StorageBackend};
use crate::db::{self, DbPool};
use crate::{Error, Result};

pub use file::FilePlanStore;
pub use sqlite::SqlitePlanStore;

/// Opaque identity handed over by the external identity provider
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    user_id: String,
}

impl Identity {
    /// Wrap a provider-issued user identifier
    ///
    /// # Errors
    ///
    /// Returns `Error::Unauthenticated` for an empty identifier
    pub fn new(user_id: impl Into<String>) -> Result<Self> {
        let user_id = user_id.into();
        if user_id.trim().is_empty() {
            return Err(Error::Unauthenticated);
        }
        Ok(Self { user_id })
    }

    /// The opaque user identifier
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

/// Resolve an optional identity or fail immediately
///
/// # Errors
///
/// Returns `Error::Unauthenticated` when no identity is present
pub fn require(identity: Option<&Identity>) -> Result<&Identity> {
    identity.ok_or(Error::Unauthenticated)
}

/// Open the configured backend
///
/// The pool is returned for `SQLite` so callers can health-check it.
///
/// # Errors
///
/// Returns error if the data directory or database cannot be opened
pub fn open(config: &Config) -> Result<(Arc<dyn PlanStore>, Option<DbPool>)> {
    config.ensure_data_dir()?;
    match config.storage {
        StorageBackend::Sqlite => {
            let pool = db::init(config.database_path())?;
            Ok((Arc::new(SqlitePlanStore::new(pool.clone())), Some(pool)))
        }
        StorageBackend::File => {
            let store = FilePlanStore::new(config.data_dir.join("plans"))?;
            Ok((Arc::new(store), None))
        }
    }
}

/// CRUD over a user's collection of plans
pub trait PlanStore: Send + Sync {
    /// List all plans for the user, newest first
    ///
    /// # Errors
    ///
    /// Returns error if unauthenticated or the backend fails
    fn list(&self, identity: Option<&Identity>) -> Result<Vec<Plan>>;

    /// Fetch one plan
    ///
    /// # Errors
    ///
    /// Returns error if unauthenticated or the backend fails
    fn get(&self, identity: Option<&Identity>, id: &PlanId) -> Result<Option<Plan>>;

    /// Store a new plan, assigning identifier and creation timestamp
    ///
    /// # Errors
    ///
    /// Returns error if unauthenticated or the backend fails
    fn create(&self, identity: Option<&Identity>, draft: PlanDraft) -> Result<Plan>;

    /// Replace every user-controlled field of an existing plan
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the plan does not exist for this user
    fn update(&self, identity: Option<&Identity>, id: &PlanId, draft: PlanDraft) -> Result<Plan>;

    /// Delete a plan; deleting an absent plan is a no-op
    ///
    /// # Errors
    ///
    /// Returns error if unauthenticated or the backend fails
    fn delete(&self, identity: Option<&Identity>, id: &PlanId) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod contract {
    //! Behaviour every `PlanStore` backend must share

    use chrono::Utc;

    use super::*;
    use crate::budget::Expense;

    fn draft(name: &str) -> PlanDraft {
        PlanDraft {
            name: name.to_string(),
            income: "5000".to_string(),
            expenses: vec![Expense::new("Rent", "1200"), Expense::new("Groceries", "400")],
            plan_text: "Spend less on takeout.".to_string(),
            notes: String::new(),
            sharing: None,
        }
    }

    pub fn create_then_list(store: &dyn PlanStore) {
        let alice = Identity::new("alice").unwrap();
        let before = Utc::now();

        let first = store.create(Some(&alice), draft("March")).unwrap();
        let second = store.create(Some(&alice), draft("April")).unwrap();

        assert_ne!(first.id, second.id);
        assert!(first.created_at >= before - chrono::Duration::seconds(1));
        assert!(first.created_at <= Utc::now());

        let plans = store.list(Some(&alice)).unwrap();
        assert_eq!(plans.len(), 2);
        assert!(plans.iter().any(|p| p.id == first.id && p.name == "March"));
        assert_eq!(plans.iter().find(|p| p.id == second.id).unwrap().expenses.len(), 2);
    }

    pub fn update_replaces_one(store: &dyn PlanStore) {
        let alice = Identity::new("alice").unwrap();
        let kept = store.create(Some(&alice), draft("Keep")).unwrap();
        let edited = store.create(Some(&alice), draft("Edit")).unwrap();

        let mut replacement = draft("Edited");
        replacement.income = "6000".to_string();
        replacement.expenses.truncate(1);
        let updated = store.update(Some(&alice), &edited.id, replacement).unwrap();

        assert_eq!(updated.id, edited.id);
        assert_eq!(updated.created_at, edited.created_at);

        let reloaded = store.get(Some(&alice), &edited.id).unwrap().unwrap();
        assert_eq!(reloaded.name, "Edited");
        assert_eq!(reloaded.income, "6000");
        assert_eq!(reloaded.expenses.len(), 1);
        assert_eq!(reloaded.created_at, edited.created_at);

        assert_eq!(store.get(Some(&alice), &kept.id).unwrap().unwrap(), kept);

        let missing = store.update(Some(&alice), &PlanId::new(), draft("Nope"));
        assert!(matches!(missing, Err(Error::NotFound(_))));
    }

    pub fn delete_removes_one(store: &dyn PlanStore) {
        let alice = Identity::new("alice").unwrap();
        let a = store.create(Some(&alice), draft("A")).unwrap();
        let b = store.create(Some(&alice), draft("B")).unwrap();

        store.delete(Some(&alice), &a.id).unwrap();
        let remaining = store.list(Some(&alice)).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, b.id);

        // Absent id is a no-op
        store.delete(Some(&alice), &a.id).unwrap();
        assert_eq!(store.list(Some(&alice)).unwrap().len(), 1);
    }

    pub fn scoped_per_user(store: &dyn PlanStore) {
        let alice = Identity::new("alice").unwrap();
        let bob = Identity::new("bob").unwrap();
        let plan = store.create(Some(&alice), draft("Private")).unwrap();

        assert!(store.list(Some(&bob)).unwrap().is_empty());
        assert!(store.get(Some(&bob), &plan.id).unwrap().is_none());
        assert!(matches!(
            store.update(Some(&bob), &plan.id, draft("Hijack")),
            Err(Error::NotFound(_))
        ));
        store.delete(Some(&bob), &plan.id).unwrap();
        assert_eq!(store.list(Some(&alice)).unwrap().len(), 1);
    }

    pub fn rejects_anonymous(store: &dyn PlanStore) {
        assert!(matches!(store.list(None), Err(Error::Unauthenticated)));
        assert!(matches!(store.create(None, draft("x")), Err(Error::Unauthenticated)));
        assert!(matches!(
            store.update(None, &PlanId::new(), draft("x")),
            Err(Error::Unauthenticated)
        ));
        assert!(matches!(store.delete(None, &PlanId::new()), Err(Error::Unauthenticated)));
        assert!(matches!(store.get(None, &PlanId::new()), Err(Error::Unauthenticated)));
    }
}
