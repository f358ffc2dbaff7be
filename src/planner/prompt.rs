//! Prompt construction for budget plan generation

use std::fmt::Write as _;

use crate::budget::BudgetInput;

/// System instruction shared by every provider
pub const SYSTEM_PROMPT: &str = "You are a friendly personal finance assistant. \
Write in plain prose without markdown headings or tables.";

/// Build the user prompt for a validated budget
#[must_use]
pub fn build_prompt(input: &BudgetInput, max_words: usize) -> String {
    let mut prompt = String::new();

    let _ = writeln!(
        prompt,
        "Create a short monthly budget plan in at most {max_words} words."
    );
    let _ = writeln!(prompt, "Monthly income: ${:.2}", input.income);
    let _ = writeln!(prompt, "Expenses:");
    for expense in &input.expenses {
        let _ = writeln!(prompt, "- {}: ${:.2}", expense.category, expense.amount);
    }
    let _ = writeln!(prompt, "Total expenses: ${:.2}", input.total_expenses());
    let _ = writeln!(prompt, "Remaining after expenses: ${:.2}", input.remaining());

    if let Some(notes) = &input.notes {
        let _ = writeln!(prompt, "Additional notes from the user: {notes}");
    }

    prompt.push_str(
        "Summarize income versus expenses, give practical recommendations, \
         and finish with exactly one savings tip.",
    );
    prompt
}

/// Cap text at `max_words` words, preserving line breaks within the kept part
#[must_use]
pub fn limit_words(text: &str, max_words: usize) -> String {
    let text = text.trim();
    let mut count = 0;
    let mut end = text.len();
    let mut in_word = false;

    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            in_word = false;
        } else if !in_word {
            in_word = true;
            count += 1;
            if count > max_words {
                end = i;
                break;
            }
        }
    }

    text[..end].trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::budget::ExpenseLine;

    fn sample() -> BudgetInput {
        BudgetInput {
            income: Decimal::from(5000),
            expenses: vec![
                ExpenseLine { category: "Rent".to_string(), amount: Decimal::from(1200) },
                ExpenseLine { category: "Groceries".to_string(), amount: Decimal::from(400) },
            ],
            notes: None,
        }
    }

    #[test]
    fn test_prompt_mentions_figures() {
        let prompt = build_prompt(&sample(), 150);
        assert!(prompt.contains("at most 150 words"));
        assert!(prompt.contains("Monthly income: $5000.00"));
        assert!(prompt.contains("- Rent: $1200.00"));
        assert!(prompt.contains("Total expenses: $1600.00"));
        assert!(prompt.contains("Remaining after expenses: $3400.00"));
        assert!(!prompt.contains("notes"));
    }

    #[test]
    fn test_prompt_includes_notes() {
        let mut input = sample();
        input.notes = Some("Saving for a car".to_string());
        assert!(build_prompt(&input, 100).contains("Saving for a car"));
    }

    #[test]
    fn test_prompt_with_unvalidated_huge_amounts() {
        let mut input = sample();
        input.expenses[0].amount = Decimal::MAX;
        input.expenses[1].amount = Decimal::MAX;

        let prompt = build_prompt(&input, 150);
        assert!(prompt.contains("Total expenses: $79228162514264337593543950335"));
    }

    #[test]
    fn test_limit_words() {
        assert_eq!(limit_words("one two three", 5), "one two three");
        assert_eq!(limit_words("one two\nthree four", 3), "one two\nthree");
        assert_eq!(limit_words("  padded  ", 3), "padded");
        assert_eq!(limit_words("", 3), "");
    }
}
