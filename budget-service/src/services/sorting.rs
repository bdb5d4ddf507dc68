//! Column sorting for the entries table and the category summary.

use crate::services::aggregation::CategorySummary;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }

    pub fn parse(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if v == "desc" => Self::Desc,
            _ => Self::Asc,
        }
    }

    pub fn flipped(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }

    fn sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    fn apply(&self, ordering: Ordering) -> Ordering {
        match self {
            Self::Asc => ordering,
            Self::Desc => ordering.reverse(),
        }
    }
}

/// Sortable columns of the entries table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortColumn {
    #[default]
    Date,
    Title,
    Category,
    Amount,
    Type,
}

impl SortColumn {
    pub const ALL: [SortColumn; 5] = [
        SortColumn::Date,
        SortColumn::Title,
        SortColumn::Category,
        SortColumn::Amount,
        SortColumn::Type,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Date => "date",
            Self::Title => "title",
            Self::Category => "category",
            Self::Amount => "amount",
            Self::Type => "type",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Date => "Date",
            Self::Title => "Title",
            Self::Category => "Category",
            Self::Amount => "Amount",
            Self::Type => "Type",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(value.trim()))
    }

    fn sql_expr(&self) -> &'static str {
        match self {
            Self::Date => "e.entry_date",
            Self::Title => "lower(e.title)",
            Self::Category => "lower(COALESCE(c.name, ''))",
            Self::Amount => "e.amount",
            Self::Type => "e.entry_type",
        }
    }
}

/// Current sort of the entries table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SortState {
    pub column: SortColumn,
    pub direction: SortDirection,
}

impl SortState {
    /// Unknown columns fall back to date ascending.
    pub fn from_params(sort: Option<&str>, dir: Option<&str>) -> Self {
        match sort.and_then(SortColumn::parse) {
            Some(column) => Self {
                column,
                direction: SortDirection::parse(dir),
            },
            None => Self::default(),
        }
    }

    /// State after clicking `column`: the same column flips direction, a new column
    /// starts ascending.
    pub fn toggled(&self, column: SortColumn) -> Self {
        if self.column == column {
            Self {
                column,
                direction: self.direction.flipped(),
            }
        } else {
            Self {
                column,
                direction: SortDirection::Asc,
            }
        }
    }

    /// `ORDER BY` body built only from fixed column expressions. Ties fall back to creation
    /// time and id so paging is deterministic.
    pub fn order_by_sql(&self) -> String {
        let dir = self.direction.sql();
        format!(
            "{} {dir}, e.created_utc {dir}, e.entry_id {dir}",
            self.column.sql_expr()
        )
    }

    /// Arrow shown next to a column header.
    pub fn indicator(&self, column: SortColumn) -> &'static str {
        if self.column != column {
            ""
        } else if self.direction == SortDirection::Asc {
            "▲"
        } else {
            "▼"
        }
    }
}

/// Sortable columns of the category summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SummarySort {
    #[default]
    Name,
    Income,
    Expenses,
    Net,
}

impl SummarySort {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Income => "income",
            Self::Expenses => "expenses",
            Self::Net => "net",
        }
    }

    pub fn parse(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("income") => Self::Income,
            Some("expenses") | Some("expense") => Self::Expenses,
            Some("net") => Self::Net,
            _ => Self::Name,
        }
    }
}

/// Stable sort of summary rows. Ties are always broken by name ascending, whatever the
/// direction of the primary column.
pub fn sort_summaries(rows: &mut [CategorySummary], column: SummarySort, direction: SortDirection) {
    let by_name = |a: &CategorySummary, b: &CategorySummary| {
        a.name.to_lowercase().cmp(&b.name.to_lowercase())
    };

    rows.sort_by(|a, b| {
        let primary = match column {
            SummarySort::Name => by_name(a, b),
            SummarySort::Income => a.income.cmp(&b.income),
            SummarySort::Expenses => a.expense.cmp(&b.expense),
            SummarySort::Net => a.net().cmp(&b.net()),
        };
        direction.apply(primary).then_with(|| by_name(a, b))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn row(name: &str, income: &str, expense: &str) -> CategorySummary {
        CategorySummary {
            category_id: None,
            name: name.to_string(),
            income: Decimal::from_str(income).unwrap(),
            expense: Decimal::from_str(expense).unwrap(),
            count: 1,
        }
    }

    #[test]
    fn toggling_same_column_flips_direction() {
        let state = SortState::from_params(Some("amount"), Some("asc"));
        let toggled = state.toggled(SortColumn::Amount);
        assert_eq!(toggled.direction, SortDirection::Desc);
        assert_eq!(toggled.toggled(SortColumn::Amount).direction, SortDirection::Asc);
    }

    #[test]
    fn new_column_resets_to_ascending() {
        let state = SortState::from_params(Some("amount"), Some("desc"));
        let toggled = state.toggled(SortColumn::Title);
        assert_eq!(toggled.column, SortColumn::Title);
        assert_eq!(toggled.direction, SortDirection::Asc);
    }

    #[test]
    fn unknown_column_falls_back_to_date() {
        let state = SortState::from_params(Some("amount; DROP TABLE entries"), Some("desc"));
        assert_eq!(state, SortState::default());
        assert!(state.order_by_sql().starts_with("e.entry_date ASC"));
    }

    #[test]
    fn expenses_descending_breaks_ties_by_name() {
        let mut rows = vec![
            row("Transport", "0", "50"),
            row("Food", "0", "120"),
            row("Bills", "0", "50"),
            row("Other", "0", "10"),
        ];

        sort_summaries(&mut rows, SummarySort::Expenses, SortDirection::Desc);

        let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Food", "Bills", "Transport", "Other"]);
    }

    #[test]
    fn net_ascending() {
        let mut rows = vec![row("A", "100", "0"), row("B", "0", "30"), row("C", "10", "10")];

        sort_summaries(&mut rows, SummarySort::Net, SortDirection::Asc);

        let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["B", "C", "A"]);
    }
}
