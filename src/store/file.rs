//! Per-user JSON file plan store
//!
//! Each user's collection lives in `<root>/<encoded user id>.json`. This is
//! the thin local shim used when no database is wanted.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{Identity, PlanStore, require};
use crate::budget::{Plan, PlanDraft, PlanId};
use crate::{Error, Result};

/// Plan store keeping one JSON document per user
pub struct FilePlanStore {
    root: PathBuf,
    // Serializes read-modify-write cycles within this process
    lock: Mutex<()>,
}

impl FilePlanStore {
    /// Create a store rooted at `root`, creating the directory if needed
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        tracing::debug!(path = %root.display(), "file plan store ready");
        Ok(Self {
            root,
            lock: Mutex::new(()),
        })
    }

    fn path_for(&self, identity: &Identity) -> PathBuf {
        let encoded: String =
            url::form_urlencoded::byte_serialize(identity.user_id().as_bytes()).collect();
        self.root.join(format!("{encoded}.json"))
    }

    fn read(path: &Path) -> Result<Vec<Plan>> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(Error::Persistence(format!("{}: {e}", path.display()))),
        }
    }

    fn write(path: &Path, plans: &[Plan]) -> Result<()> {
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(plans)?)
            .map_err(|e| Error::Persistence(format!("{}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, path)
            .map_err(|e| Error::Persistence(format!("{}: {e}", path.display())))?;
        Ok(())
    }

    fn modify<T>(
        &self,
        identity: &Identity,
        f: impl FnOnce(&mut Vec<Plan>) -> Result<T>,
    ) -> Result<T> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| Error::Persistence("plan store lock poisoned".to_string()))?;
        let path = self.path_for(identity);
        let mut plans = Self::read(&path)?;
        let out = f(&mut plans)?;
        Self::write(&path, &plans)?;
        Ok(out)
    }
}

impl PlanStore for FilePlanStore {
    fn list(&self, identity: Option<&Identity>) -> Result<Vec<Plan>> {
        let identity = require(identity)?;
        let mut plans = Self::read(&self.path_for(identity))?;
        // Stored in insertion order
        plans.reverse();
        Ok(plans)
    }

    fn get(&self, identity: Option<&Identity>, id: &PlanId) -> Result<Option<Plan>> {
        let identity = require(identity)?;
        Ok(Self::read(&self.path_for(identity))?
            .into_iter()
            .find(|p| &p.id == id))
    }

    fn create(&self, identity: Option<&Identity>, draft: PlanDraft) -> Result<Plan> {
        let identity = require(identity)?;
        let plan = Plan::create(draft);
        self.modify(identity, |plans| {
            plans.push(plan.clone());
            Ok(())
        })?;
        tracing::info!(plan_id = %plan.id, user_id = identity.user_id(), "plan created");
        Ok(plan)
    }

    fn update(&self, identity: Option<&Identity>, id: &PlanId, draft: PlanDraft) -> Result<Plan> {
        let identity = require(identity)?;
        let plan = self.modify(identity, |plans| {
            let plan = plans
                .iter_mut()
                .find(|p| &p.id == id)
                .ok_or_else(|| Error::NotFound(format!("plan {id}")))?;
            plan.replace(draft);
            Ok(plan.clone())
        })?;
        tracing::info!(plan_id = %id, user_id = identity.user_id(), "plan updated");
        Ok(plan)
    }

    fn delete(&self, identity: Option<&Identity>, id: &PlanId) -> Result<()> {
        let identity = require(identity)?;
        self.modify(identity, |plans| {
            plans.retain(|p| &p.id != id);
            Ok(())
        })
    }
}
