use super::{parse_amount, parse_date, parse_optional_id, FormErrors};
use crate::models::{Entry, EntryInput, EntryType};
use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
pub struct EntryForm {
    #[validate(length(min = 1, max = 100, message = "Title must be between 1 and 100 characters."))]
    pub title: String,
    pub amount: String,
    pub entry_date: String,
    pub entry_type: String,
    pub category_id: String,
    #[validate(length(max = 1000, message = "Notes must be at most 1000 characters."))]
    pub notes: String,
}

impl EntryForm {
    /// Prefills the edit form from a stored entry.
    pub fn from_entry(entry: &Entry) -> Self {
        Self {
            title: entry.title.clone(),
            amount: entry.amount.to_string(),
            entry_date: entry.entry_date.format("%Y-%m-%d").to_string(),
            entry_type: entry.entry_type.clone(),
            category_id: entry
                .category_id
                .map(|id| id.to_string())
                .unwrap_or_default(),
            notes: entry.notes.clone(),
        }
    }

    pub fn into_input(&self) -> Result<EntryInput, FormErrors> {
        let mut errors = match self.validate() {
            Ok(()) => FormErrors::new(),
            Err(e) => FormErrors::from(e),
        };

        let title = self.title.trim().to_string();
        if title.is_empty() && !errors.has("title") {
            errors.add("title", "Enter a title.");
        }

        let amount = parse_amount(&self.amount, "amount", &mut errors);
        let entry_date = parse_date(&self.entry_date, "entry_date", &mut errors);
        let entry_type = EntryType::parse(&self.entry_type);
        if entry_type.is_none() {
            errors.add("entry_type", "Choose income or expense.");
        }
        let category_id = parse_optional_id(&self.category_id, "category_id", &mut errors);

        match (amount, entry_date, entry_type, category_id) {
            (Some(amount), Some(entry_date), Some(entry_type), Some(category_id))
                if errors.is_empty() =>
            {
                Ok(EntryInput {
                    title,
                    amount,
                    entry_date,
                    entry_type,
                    category_id,
                    notes: self.notes.trim().to_string(),
                })
            }
            _ => Err(errors),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> EntryForm {
        EntryForm {
            title: "  Groceries ".to_string(),
            amount: "42.10".to_string(),
            entry_date: "2026-10-01".to_string(),
            entry_type: "EX".to_string(),
            category_id: String::new(),
            notes: String::new(),
        }
    }

    #[test]
    fn valid_form_parses() {
        let input = valid().into_input().unwrap();
        assert_eq!(input.title, "Groceries");
        assert_eq!(input.entry_type, EntryType::Expense);
        assert_eq!(input.amount.to_string(), "42.10");
        assert!(input.category_id.is_none());
    }

    #[test]
    fn collects_every_field_error() {
        let form = EntryForm {
            title: "   ".to_string(),
            amount: "-5".to_string(),
            entry_date: "yesterday".to_string(),
            entry_type: "transfer".to_string(),
            category_id: "not-a-uuid".to_string(),
            notes: String::new(),
        };

        let errors = form.into_input().unwrap_err();
        for field in ["title", "amount", "entry_date", "entry_type", "category_id"] {
            assert!(errors.has(field), "missing error for {field}");
        }
    }

    #[test]
    fn rejects_long_title() {
        let form = EntryForm {
            title: "x".repeat(101),
            ..valid()
        };
        assert!(form.into_input().unwrap_err().has("title"));
    }
}
