//! HTML form payloads and their validation.
//!
//! Forms arrive as plain strings so that malformed input is reported next to the offending
//! field rather than rejected by the extractor. Each form runs its `validator` rules first and
//! then `into_input` parses into the typed input the database layer expects.

pub mod account;
pub mod budget;
pub mod category;
pub mod entry;

pub use account::{
    ForgotPasswordForm, LoginForm, PasswordChangeForm, RegisterForm, ResetPasswordForm,
};
pub use budget::BudgetForm;
pub use category::CategoryForm;
pub use entry::EntryForm;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::str::FromStr;
use uuid::Uuid;
use validator::ValidationErrors;

/// Largest value a NUMERIC(12, 2) column holds.
const MAX_AMOUNT: &str = "9999999999.99";

/// Messages keyed by field name.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FormErrors(BTreeMap<String, Vec<String>>);

impl FormErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// First message for `field`, or an empty string for templates.
    pub fn message(&self, field: &str) -> &str {
        self.0
            .get(field)
            .and_then(|m| m.first())
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.0.iter()
    }

    pub fn merge(&mut self, other: FormErrors) {
        for (field, messages) in other.0 {
            self.0.entry(field).or_default().extend(messages);
        }
    }

    /// 422 with `{"errors": {field: [messages]}}` for JSON endpoints.
    pub fn json_response(&self) -> Response {
        (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(serde_json::json!({ "errors": self })),
        )
            .into_response()
    }
}

impl From<ValidationErrors> for FormErrors {
    fn from(errors: ValidationErrors) -> Self {
        let mut form_errors = FormErrors::new();
        for (field, field_errors) in errors.field_errors() {
            for error in field_errors.iter() {
                let message = error
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Invalid value ({})", error.code));
                form_errors.add(&field.to_string(), message);
            }
        }
        form_errors
    }
}

/// Parses a money amount: non-negative, at most two decimal places, within column range.
pub(crate) fn parse_amount(raw: &str, field: &str, errors: &mut FormErrors) -> Option<Decimal> {
    let raw = raw.trim();
    if raw.is_empty() {
        errors.add(field, "Enter an amount.");
        return None;
    }

    let amount = match Decimal::from_str(raw) {
        Ok(amount) => amount,
        Err(_) => {
            errors.add(field, "Enter a valid number.");
            return None;
        }
    };

    if amount.is_sign_negative() && !amount.is_zero() {
        errors.add(field, "Amount cannot be negative.");
        return None;
    }
    if amount.normalize().scale() > 2 {
        errors.add(field, "Use at most two decimal places.");
        return None;
    }
    if amount > Decimal::from_str(MAX_AMOUNT).unwrap_or(Decimal::MAX) {
        errors.add(field, "Amount is too large.");
        return None;
    }

    Some(amount.round_dp(2))
}

/// Parses an ISO `YYYY-MM-DD` date.
pub(crate) fn parse_date(raw: &str, field: &str, errors: &mut FormErrors) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        errors.add(field, "Enter a date.");
        return None;
    }
    match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(_) => {
            errors.add(field, "Enter a valid date (YYYY-MM-DD).");
            None
        }
    }
}

/// Empty means "no category"; anything else must be a UUID.
pub(crate) fn parse_optional_id(
    raw: &str,
    field: &str,
    errors: &mut FormErrors,
) -> Option<Option<Uuid>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Some(None);
    }
    match Uuid::parse_str(raw) {
        Ok(id) => Some(Some(id)),
        Err(_) => {
            errors.add(field, "Select a valid category.");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_rules() {
        let mut errors = FormErrors::new();
        assert_eq!(
            parse_amount("12.5", "amount", &mut errors),
            Some(Decimal::from_str("12.50").unwrap())
        );
        assert_eq!(parse_amount("0", "amount", &mut errors), Some(Decimal::ZERO));
        assert!(errors.is_empty());

        assert_eq!(parse_amount("-1", "amount", &mut errors), None);
        assert_eq!(errors.message("amount"), "Amount cannot be negative.");

        let mut errors = FormErrors::new();
        assert_eq!(parse_amount("1.234", "amount", &mut errors), None);
        assert_eq!(errors.message("amount"), "Use at most two decimal places.");

        let mut errors = FormErrors::new();
        assert_eq!(parse_amount("ten", "amount", &mut errors), None);
        assert!(errors.has("amount"));
    }

    #[test]
    fn trailing_zeros_do_not_count_as_decimals() {
        let mut errors = FormErrors::new();
        assert!(parse_amount("3.1000", "amount", &mut errors).is_some());
        assert!(errors.is_empty());
    }

    #[test]
    fn date_rules() {
        let mut errors = FormErrors::new();
        assert!(parse_date("2026-10-16", "from", &mut errors).is_some());
        assert!(parse_date("16/10/2026", "to", &mut errors).is_none());
        assert!(errors.has("to"));
        assert!(!errors.has("from"));
    }

    #[test]
    fn errors_serialize_as_field_map() {
        let mut errors = FormErrors::new();
        errors.add("min", "bad");
        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(json, serde_json::json!({ "min": ["bad"] }));
    }
}
