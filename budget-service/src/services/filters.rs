//! Entry filters shared by the entries table, the report and the CSV export.

use crate::forms::{parse_amount, parse_date, FormErrors};
use crate::models::EntryType;
use crate::services::sorting::{SortDirection, SortState, SummarySort};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Rows per page of the entries table.
pub const PAGE_SIZE: u32 = 25;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Raw query parameters. Every field is an optional string so malformed values become
/// field errors instead of extractor rejections.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct EntryFilterParams {
    pub from: Option<String>,
    pub to: Option<String>,
    pub q: Option<String>,
    pub category: Option<String>,
    pub category_id: Option<String>,
    pub min: Option<String>,
    pub max: Option<String>,
    #[serde(rename = "type")]
    pub entry_type: Option<String>,
    pub sort: Option<String>,
    pub dir: Option<String>,
    pub page: Option<String>,
}

/// Parsed filter. `None` fields do not constrain the result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub title_contains: Option<String>,
    pub category_contains: Option<String>,
    pub category_id: Option<Uuid>,
    pub min: Option<Decimal>,
    pub max: Option<Decimal>,
    pub entry_type: Option<EntryType>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl EntryFilterParams {
    pub fn parse(&self) -> Result<EntryFilter, FormErrors> {
        let mut errors = FormErrors::new();

        let from = present(&self.from).and_then(|v| parse_date(v, "from", &mut errors));
        let to = present(&self.to).and_then(|v| parse_date(v, "to", &mut errors));
        let min = present(&self.min).and_then(|v| parse_amount(v, "min", &mut errors));
        let max = present(&self.max).and_then(|v| parse_amount(v, "max", &mut errors));

        let entry_type = match present(&self.entry_type) {
            Some(v) if v.eq_ignore_ascii_case("all") => None,
            Some(v) => {
                let parsed = EntryType::parse(v);
                if parsed.is_none() {
                    errors.add("type", "Choose income or expense.");
                }
                parsed
            }
            None => None,
        };

        let category_id = match present(&self.category_id) {
            Some(v) => match Uuid::parse_str(v) {
                Ok(id) => Some(id),
                Err(_) => {
                    errors.add("category_id", "Select a valid category.");
                    None
                }
            },
            None => None,
        };

        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                errors.add("to", "End date must be on or after the start date.");
            }
        }
        if let (Some(min), Some(max)) = (min, max) {
            if min > max {
                errors.add("max", "Maximum must be greater than or equal to minimum.");
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(EntryFilter {
            from,
            to,
            title_contains: present(&self.q).map(str::to_string),
            category_contains: present(&self.category).map(str::to_string),
            category_id,
            min,
            max,
            entry_type,
        })
    }

    pub fn sort_state(&self) -> SortState {
        SortState::from_params(present(&self.sort), present(&self.dir))
    }

    pub fn summary_sort(&self) -> (SummarySort, SortDirection) {
        (
            SummarySort::parse(present(&self.sort)),
            SortDirection::parse(present(&self.dir)),
        )
    }

    /// 1-based page; anything unparsable is page 1.
    pub fn page(&self) -> u32 {
        present(&self.page)
            .and_then(|p| p.parse::<u32>().ok())
            .filter(|p| *p >= 1)
            .unwrap_or(1)
    }

    /// Query string carrying the filters with a different sort and page, for header and
    /// pager links.
    pub fn query_with(&self, sort: &str, dir: &str, page: u32) -> String {
        let mut pairs: Vec<(&str, &str)> = Vec::new();
        let fields = [
            ("from", &self.from),
            ("to", &self.to),
            ("q", &self.q),
            ("category", &self.category),
            ("category_id", &self.category_id),
            ("min", &self.min),
            ("max", &self.max),
            ("type", &self.entry_type),
        ];
        for (name, value) in fields {
            if let Some(v) = present(value) {
                pairs.push((name, v));
            }
        }
        let page = page.to_string();
        pairs.push(("sort", sort));
        pairs.push(("dir", dir));
        pairs.push(("page", &page));

        pairs
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// `%value%` with LIKE metacharacters escaped so user text matches literally.
pub fn like_pattern(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 2);
    escaped.push('%');
    for ch in value.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

/// One page of results.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

impl<T> Page<T> {
    pub fn pages(&self) -> u32 {
        if self.total <= 0 {
            return 1;
        }
        let per_page = i64::from(self.per_page.max(1));
        ((self.total + per_page - 1) / per_page) as u32
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.pages()
    }
}

pub fn clamp_page_size(per_page: u32) -> u32 {
    per_page.min(MAX_PAGE_SIZE).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn params() -> EntryFilterParams {
        EntryFilterParams::default()
    }

    #[test]
    fn empty_params_mean_no_constraints() {
        let filter = params().parse().unwrap();
        assert_eq!(filter, EntryFilter::default());
    }

    #[test]
    fn parses_all_constraints() {
        let p = EntryFilterParams {
            from: Some("2026-01-01".into()),
            to: Some("2026-01-31".into()),
            q: Some(" rent ".into()),
            category: Some("Fo".into()),
            min: Some("10".into()),
            max: Some("99.99".into()),
            entry_type: Some("EX".into()),
            ..params()
        };

        let filter = p.parse().unwrap();
        assert_eq!(filter.title_contains.as_deref(), Some("rent"));
        assert_eq!(filter.category_contains.as_deref(), Some("Fo"));
        assert_eq!(filter.min, Some(Decimal::from_str("10").unwrap()));
        assert_eq!(filter.max, Some(Decimal::from_str("99.99").unwrap()));
        assert_eq!(filter.entry_type, Some(EntryType::Expense));
    }

    #[test]
    fn inverted_ranges_are_rejected_not_clamped() {
        let p = EntryFilterParams {
            from: Some("2026-02-01".into()),
            to: Some("2026-01-01".into()),
            min: Some("50".into()),
            max: Some("10".into()),
            ..params()
        };

        let errors = p.parse().unwrap_err();
        assert!(errors.has("to"));
        assert!(errors.has("max"));
    }

    #[test]
    fn malformed_values_are_field_errors() {
        let p = EntryFilterParams {
            from: Some("yesterday".into()),
            min: Some("abc".into()),
            entry_type: Some("refund".into()),
            ..params()
        };

        let errors = p.parse().unwrap_err();
        assert!(errors.has("from"));
        assert!(errors.has("min"));
        assert!(errors.has("type"));
    }

    #[test]
    fn like_metacharacters_are_escaped() {
        assert_eq!(like_pattern("50%_off\\"), "%50\\%\\_off\\\\%");
    }

    #[test]
    fn page_defaults_to_one() {
        let p = EntryFilterParams {
            page: Some("0".into()),
            ..params()
        };
        assert_eq!(p.page(), 1);
        assert_eq!(
            EntryFilterParams {
                page: Some("3".into()),
                ..params()
            }
            .page(),
            3
        );
    }

    #[test]
    fn page_count_rounds_up() {
        let page: Page<()> = Page {
            items: vec![],
            total: 51,
            page: 1,
            per_page: 25,
        };
        assert_eq!(page.pages(), 3);
        assert!(page.has_next());
        assert!(!page.has_prev());
        assert_eq!(clamp_page_size(1000), MAX_PAGE_SIZE);
    }

    #[test]
    fn query_string_keeps_filters() {
        let p = EntryFilterParams {
            q: Some("coffee & tea".into()),
            ..params()
        };
        assert_eq!(
            p.query_with("amount", "desc", 2),
            "q=coffee%20%26%20tea&sort=amount&dir=desc&page=2"
        );
    }

    #[test]
    fn query_string_encodes_utf8_and_reserved_characters() {
        let p = EntryFilterParams {
            q: Some("café=50%".into()),
            category: Some("Food/Drink".into()),
            ..params()
        };
        assert_eq!(
            p.query_with("date", "asc", 1),
            "q=caf%C3%A9%3D50%25&category=Food%2FDrink&sort=date&dir=asc&page=1"
        );
    }
}
