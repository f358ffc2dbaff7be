//! Budget data model
//!
//! Plans are snapshots of a user's income, expenses and notes together with
//! the generated narrative. Amounts are kept as the strings the user typed
//! (or dictated) until a plan is validated for generation.

pub mod form;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

pub use form::{InputTarget, PlanForm};

/// Opaque, immutable plan identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanId(String);

impl PlanId {
    /// Generate a fresh identifier
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the identifier as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PlanId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlanId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PlanId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A single expense line as entered in the form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    #[serde(default = "new_expense_id")]
    pub id: String,
    pub category: String,
    /// Decimal string, parsed on validation
    pub amount: String,
}

fn new_expense_id() -> String {
    Uuid::new_v4().to_string()
}

impl Expense {
    /// Create an expense with a fresh identifier
    #[must_use]
    pub fn new(category: impl Into<String>, amount: impl Into<String>) -> Self {
        Self {
            id: new_expense_id(),
            category: category.into(),
            amount: amount.into(),
        }
    }

    /// Create an empty expense row
    #[must_use]
    pub fn blank() -> Self {
        Self::new("", "")
    }
}

/// Optional sharing metadata carried on a plan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharingInfo {
    pub owner_id: String,
    #[serde(default)]
    pub collaborators: Vec<String>,
    #[serde(default)]
    pub is_shared: bool,
}

/// Everything about a plan that the user controls
///
/// Stores assign the identifier and creation timestamp; updates replace all
/// of these fields at once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanDraft {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub income: String,
    #[serde(default)]
    pub expenses: Vec<Expense>,
    #[serde(default)]
    pub plan_text: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sharing: Option<SharingInfo>,
}

/// A saved budget plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub name: String,
    pub income: String,
    pub expenses: Vec<Expense>,
    pub plan_text: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sharing: Option<SharingInfo>,
}

impl Plan {
    /// Build a new plan from a draft, assigning identifier and timestamp
    ///
    /// The timestamp is truncated to microseconds so it survives storage
    /// round-trips unchanged.
    #[must_use]
    pub fn create(draft: PlanDraft) -> Self {
        Self::from_parts(PlanId::new(), Utc::now().trunc_subsecs(6), draft)
    }

    /// Assemble a plan from stored parts
    #[must_use]
    pub fn from_parts(id: PlanId, created_at: DateTime<Utc>, draft: PlanDraft) -> Self {
        Self {
            id,
            name: draft.name,
            income: draft.income,
            expenses: draft.expenses,
            plan_text: draft.plan_text,
            notes: draft.notes,
            created_at,
            sharing: draft.sharing,
        }
    }

    /// Replace every user-controlled field, keeping id and timestamp
    pub fn replace(&mut self, draft: PlanDraft) {
        let id = self.id.clone();
        let created_at = self.created_at;
        *self = Self::from_parts(id, created_at, draft);
    }

    /// Extract the user-controlled fields
    #[must_use]
    pub fn to_draft(&self) -> PlanDraft {
        PlanDraft {
            name: self.name.clone(),
            income: self.income.clone(),
            expenses: self.expenses.clone(),
            plan_text: self.plan_text.clone(),
            notes: self.notes.clone(),
            sharing: self.sharing.clone(),
        }
    }
}

/// Validated expense line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseLine {
    pub category: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
}

/// Validated numeric view of a plan form, ready for generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetInput {
    #[serde(with = "rust_decimal::serde::float")]
    pub income: Decimal,
    pub expenses: Vec<ExpenseLine>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl BudgetInput {
    /// Sum of all expense amounts, `None` if it does not fit a `Decimal`
    #[must_use]
    pub fn checked_total(&self) -> Option<Decimal> {
        self.expenses
            .iter()
            .try_fold(Decimal::ZERO, |sum, e| sum.checked_add(e.amount))
    }

    /// Sum of all expense amounts, saturating at `Decimal::MAX`
    #[must_use]
    pub fn total_expenses(&self) -> Decimal {
        self.expenses
            .iter()
            .fold(Decimal::ZERO, |sum, e| sum.saturating_add(e.amount))
    }

    /// Income left after expenses (negative when overspent)
    #[must_use]
    pub fn remaining(&self) -> Decimal {
        self.income.saturating_sub(self.total_expenses())
    }
}

/// Parse a user-entered money amount
///
/// Accepts an optional leading `$` and `,` thousands separators. Negative
/// amounts are rejected.
///
/// # Errors
///
/// Returns `Error::Validation` if the value is empty, not a number, or negative
pub fn parse_amount(field: &str, raw: &str) -> Result<Decimal> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches('$')
        .chars()
        .filter(|c| *c != ',')
        .collect();

    if cleaned.is_empty() {
        return Err(Error::Validation(format!("{field} is required")));
    }

    let value = Decimal::from_str(&cleaned)
        .map_err(|_| Error::Validation(format!("{field} must be a number, got \"{raw}\"")))?;

    if value.is_sign_negative() && !value.is_zero() {
        return Err(Error::Validation(format!("{field} cannot be negative")));
    }

    Ok(value)
}
