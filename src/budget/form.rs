//! In-progress plan form and speech input targets

use serde::{Deserialize, Serialize};

use super::{BudgetInput, Expense, ExpenseLine, Plan, PlanDraft, parse_amount};
use crate::{Error, Result};

/// Form field that should receive the next recognized transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputTarget {
    Income,
    ExpenseCategory(String),
    ExpenseAmount(String),
    Notes,
}

impl InputTarget {
    /// Whether the field only accepts numbers
    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        matches!(self, Self::Income | Self::ExpenseAmount(_))
    }
}

/// Target kind without the expense identifier, as used by the HTTP API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Income,
    ExpenseCategory,
    ExpenseAmount,
    Notes,
}

impl TargetKind {
    /// Whether the field only accepts numbers
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(self, Self::Income | Self::ExpenseAmount)
    }
}

/// Normalize a transcript for a field
///
/// Numeric fields keep ASCII digits and the first decimal point; a transcript
/// without digits yields an empty string. Text fields are trimmed.
#[must_use]
pub fn normalize_transcript(transcript: &str, numeric: bool) -> String {
    if !numeric {
        return transcript.trim().to_string();
    }

    let mut seen_point = false;
    let value: String = transcript
        .chars()
        .filter(|c| {
            if c.is_ascii_digit() {
                true
            } else if *c == '.' && !seen_point {
                seen_point = true;
                true
            } else {
                false
            }
        })
        .collect();

    if value.chars().any(|c| c.is_ascii_digit()) {
        value.trim_end_matches('.').to_string()
    } else {
        String::new()
    }
}

/// Editable state of the planner form
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub income: String,
    #[serde(default)]
    pub expenses: Vec<Expense>,
    #[serde(default)]
    pub notes: String,
}

impl PlanForm {
    /// Create an empty form with one blank expense row
    #[must_use]
    pub fn new() -> Self {
        Self {
            expenses: vec![Expense::blank()],
            ..Self::default()
        }
    }

    /// Populate a form from a saved plan for editing
    #[must_use]
    pub fn from_plan(plan: &Plan) -> Self {
        Self {
            name: plan.name.clone(),
            income: plan.income.clone(),
            expenses: plan.expenses.clone(),
            notes: plan.notes.clone(),
        }
    }

    /// Append a blank expense row and return its identifier
    pub fn add_expense(&mut self) -> String {
        let expense = Expense::blank();
        let id = expense.id.clone();
        self.expenses.push(expense);
        id
    }

    /// Remove an expense row; returns false if it did not exist
    pub fn remove_expense(&mut self, id: &str) -> bool {
        let before = self.expenses.len();
        self.expenses.retain(|e| e.id != id);
        self.expenses.len() != before
    }

    /// Look up an expense row by identifier
    #[must_use]
    pub fn expense(&self, id: &str) -> Option<&Expense> {
        self.expenses.iter().find(|e| e.id == id)
    }

    /// Current value of a field, `None` if the target expense is gone
    #[must_use]
    pub fn value(&self, target: &InputTarget) -> Option<String> {
        match target {
            InputTarget::Income => Some(self.income.clone()),
            InputTarget::Notes => Some(self.notes.clone()),
            InputTarget::ExpenseCategory(id) => self.expense(id).map(|e| e.category.clone()),
            InputTarget::ExpenseAmount(id) => self.expense(id).map(|e| e.amount.clone()),
        }
    }

    fn expense_mut(&mut self, id: &str) -> Result<&mut Expense> {
        self.expenses
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| Error::NotFound(format!("expense {id}")))
    }

    /// Set a field to a value verbatim
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the target expense no longer exists
    pub fn set(&mut self, target: &InputTarget, value: String) -> Result<()> {
        match target {
            InputTarget::Income => self.income = value,
            InputTarget::Notes => self.notes = value,
            InputTarget::ExpenseCategory(id) => self.expense_mut(id)?.category = value,
            InputTarget::ExpenseAmount(id) => self.expense_mut(id)?.amount = value,
        }
        Ok(())
    }

    /// Route a recognized transcript into the target field
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the target expense no longer exists
    pub fn apply_transcript(&mut self, target: &InputTarget, transcript: &str) -> Result<()> {
        let value = normalize_transcript(transcript, target.is_numeric());
        self.set(target, value)
    }

    /// Validate every field and produce numeric input for generation
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` naming the first missing or malformed field
    pub fn validate(&self) -> Result<BudgetInput> {
        let income = parse_amount("income", &self.income)?;

        if self.expenses.is_empty() {
            return Err(Error::Validation("at least one expense is required".to_string()));
        }

        let expenses = self
            .expenses
            .iter()
            .enumerate()
            .map(|(i, e)| {
                let category = e.category.trim();
                if category.is_empty() {
                    return Err(Error::Validation(format!(
                        "expense {} needs a category",
                        i + 1
                    )));
                }
                let amount = parse_amount(&format!("amount for {category}"), &e.amount)?;
                Ok(ExpenseLine {
                    category: category.to_string(),
                    amount,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let notes = self.notes.trim();
        let input = BudgetInput {
            income,
            expenses,
            notes: (!notes.is_empty()).then(|| notes.to_string()),
        };

        if input.checked_total().is_none() {
            return Err(Error::Validation("expenses total is too large".to_string()));
        }
        Ok(input)
    }

    /// Combine the form with generated text into a storable draft
    #[must_use]
    pub fn to_draft(&self, plan_text: &str) -> PlanDraft {
        let name = if self.name.trim().is_empty() {
            format!("Budget plan {}", chrono::Local::now().format("%Y-%m-%d"))
        } else {
            self.name.trim().to_string()
        };

        PlanDraft {
            name,
            income: self.income.clone(),
            expenses: self.expenses.clone(),
            plan_text: plan_text.to_string(),
            notes: self.notes.clone(),
            sharing: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    fn filled_form() -> PlanForm {
        PlanForm {
            name: "March".to_string(),
            income: "5000".to_string(),
            expenses: vec![Expense::new("Rent", "1200"), Expense::new("Groceries", "400")],
            notes: String::new(),
        }
    }

    #[test]
    fn test_normalize_numeric() {
        assert_eq!(normalize_transcript("two hundred dollars", true), "");
        assert_eq!(normalize_transcript("about 1,200 dollars", true), "1200");
        assert_eq!(normalize_transcript("$45.50.", true), "45.50");
        assert_eq!(normalize_transcript("  rent  ", false), "rent");
    }

    #[test]
    fn test_transcript_updates_only_target_expense() {
        let mut form = filled_form();
        let rent_id = form.expenses[0].id.clone();
        let groceries = form.expenses[1].clone();

        form.apply_transcript(&InputTarget::ExpenseAmount(rent_id.clone()), "1350 dollars")
            .unwrap();

        let rent = form.expense(&rent_id).unwrap();
        assert_eq!(rent.amount, "1350");
        assert_eq!(rent.category, "Rent");
        assert_eq!(form.expenses[1], groceries);
        assert_eq!(form.income, "5000");
    }

    #[test]
    fn test_transcript_without_digits_clears_amount() {
        let mut form = filled_form();
        let id = form.expenses[1].id.clone();
        form.apply_transcript(&InputTarget::ExpenseAmount(id.clone()), "four hundred")
            .unwrap();
        assert_eq!(form.expense(&id).unwrap().amount, "");
    }

    #[test]
    fn test_transcript_for_missing_expense() {
        let mut form = filled_form();
        let err = form
            .apply_transcript(&InputTarget::ExpenseCategory("gone".to_string()), "Travel")
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_validate() {
        let input = filled_form().validate().unwrap();
        assert_eq!(input.income, Decimal::from(5000));
        assert_eq!(input.expenses.len(), 2);
        assert_eq!(input.expenses[0].category, "Rent");
        assert!(input.notes.is_none());
    }

    #[test]
    fn test_validate_reports_missing_fields() {
        let mut form = filled_form();
        form.income.clear();
        assert!(matches!(form.validate(), Err(Error::Validation(_))));

        let mut form = filled_form();
        form.expenses[0].category = "  ".to_string();
        assert!(matches!(form.validate(), Err(Error::Validation(_))));

        let mut form = filled_form();
        form.expenses.clear();
        assert!(matches!(form.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_overflowing_total() {
        let mut form = filled_form();
        form.expenses = vec![
            Expense::new("Rent", "79228162514264337593543950335"),
            Expense::new("Tax", "79228162514264337593543950335"),
        ];

        let err = form.validate().unwrap_err();
        assert!(matches!(err, Error::Validation(msg) if msg.contains("too large")));
    }

    #[test]
    fn test_add_remove_expense() {
        let mut form = PlanForm::new();
        assert_eq!(form.expenses.len(), 1);
        let id = form.add_expense();
        assert_eq!(form.expenses.len(), 2);
        assert!(form.remove_expense(&id));
        assert!(!form.remove_expense(&id));
    }
}
