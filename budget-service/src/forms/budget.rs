use super::{parse_amount, parse_optional_id, FormErrors};
use crate::models::BudgetInput;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BudgetForm {
    /// `YYYY-MM` as sent by `<input type="month">`.
    pub month: String,
    /// Empty for the overall budget.
    pub category_id: String,
    pub amount: String,
}

/// Parses `YYYY-MM` (or a full date) into the first day of that month.
pub fn parse_month(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(&format!("{raw}-01"), "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()
        .map(crate::services::aggregation::month_start)
}

impl BudgetForm {
    pub fn into_input(&self) -> Result<BudgetInput, FormErrors> {
        let mut errors = FormErrors::new();

        let month = parse_month(&self.month);
        if month.is_none() {
            errors.add("month", "Choose a month.");
        }

        let amount = parse_amount(&self.amount, "amount", &mut errors);
        if amount == Some(Decimal::ZERO) {
            errors.add("amount", "Budget must be greater than zero.");
        }

        let category_id = parse_optional_id(&self.category_id, "category_id", &mut errors);

        match (month, amount, category_id) {
            (Some(month), Some(amount), Some(category_id)) if errors.is_empty() => {
                Ok(BudgetInput {
                    month,
                    category_id,
                    amount,
                })
            }
            _ => Err(errors),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_is_normalized_to_first_day() {
        let form = BudgetForm {
            month: "2026-10".to_string(),
            category_id: String::new(),
            amount: "500".to_string(),
        };
        let input = form.into_input().unwrap();
        assert_eq!(input.month, NaiveDate::from_ymd_opt(2026, 10, 1).unwrap());
        assert!(input.category_id.is_none());

        assert_eq!(
            parse_month("2026-02-17"),
            NaiveDate::from_ymd_opt(2026, 2, 1)
        );
    }

    #[test]
    fn zero_budget_is_rejected() {
        let form = BudgetForm {
            month: "2026-10".to_string(),
            category_id: String::new(),
            amount: "0".to_string(),
        };
        assert_eq!(
            form.into_input().unwrap_err().message("amount"),
            "Budget must be greater than zero."
        );
    }
}
