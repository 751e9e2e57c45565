use std::fmt;
use std::path::Path;

use chrono::NaiveDate;

use crate::domain::DateFormat;
use crate::error::ReconcileError;
use crate::table::Table;

/// High-water mark of a ledger: the newest known record date.
///
/// `Absent` means there is nothing to be incremental against (no ledger, or a
/// ledger without a single parsable date). It is not an "oldest date" and
/// callers branch on it to choose between a full merge and a delta merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Currency {
    Absent,
    Known(NaiveDate),
}

impl Currency {
    pub fn from_dates<I>(dates: I) -> Self
    where
        I: IntoIterator<Item = Option<NaiveDate>>,
    {
        dates
            .into_iter()
            .flatten()
            .max()
            .map(Currency::Known)
            .unwrap_or(Currency::Absent)
    }

    pub fn is_absent(self) -> bool {
        matches!(self, Currency::Absent)
    }

    /// Whether a record dated `date` belongs to the delta after this currency.
    /// Everything is new against `Absent`; unknown dates are never new against
    /// a known currency.
    pub fn admits(self, date: Option<NaiveDate>) -> bool {
        match (self, date) {
            (Currency::Absent, _) => true,
            (Currency::Known(_), None) => false,
            (Currency::Known(current), Some(date)) => date > current,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Currency::Absent => write!(f, "absent"),
            Currency::Known(date) => write!(f, "{}", date.format("%Y-%m-%d")),
        }
    }
}

pub fn currency_of(
    path: &Path,
    column: &str,
    format: DateFormat,
) -> Result<Currency, ReconcileError> {
    if !path.is_file() {
        return Ok(Currency::Absent);
    }
    let table = Table::read(path)?;
    Ok(currency_of_table(&table, column, format))
}

pub fn currency_of_table(table: &Table, column: &str, format: DateFormat) -> Currency {
    let Some(index) = table.column_index(column) else {
        return Currency::Absent;
    };
    Currency::from_dates(table.rows().iter().map(|row| format.parse(&row[index])))
}
