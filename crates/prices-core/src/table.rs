//! The single-column price table returned by a cached fetch.
//!
//! A [`PriceTable`] is an ordered list of [`PricePoint`]s, one per trading
//! day. Dates are strictly increasing and never repeat; a price is `None`
//! when the source had no value for that day.

use chrono::{Datelike, NaiveDate};
use polars::prelude::*;

use crate::error::{DataError, Result};

/// Name of the date column in provider frames and price frames.
pub const DATE_COLUMN: &str = "date";

/// Name of the adjusted close column in provider OHLCV frames.
pub const ADJUSTED_CLOSE_COLUMN: &str = "adjusted_close";

/// Name of the single value column of a [`PriceTable`] frame.
pub const PRICE_COLUMN: &str = "price";

/// Days between 0001-01-01 (CE) and the Unix epoch; polars dates count from the epoch.
const EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// One row of a [`PriceTable`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PricePoint {
    /// Trading day.
    pub date: NaiveDate,
    /// Split/dividend adjusted close, `None` if the source had no value.
    pub price: Option<f64>,
}

impl PricePoint {
    /// Creates a new price point.
    #[must_use]
    pub const fn new(date: NaiveDate, price: Option<f64>) -> Self {
        Self { date, price }
    }
}

/// Date-indexed adjusted close prices.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PriceTable {
    rows: Vec<PricePoint>,
}

impl PriceTable {
    /// Creates an empty table.
    #[must_use]
    pub const fn new() -> Self {
        Self { rows: Vec::new() }
    }

    /// Builds a table from points in any order.
    ///
    /// Rows are sorted by date and only the first row for a given date is kept.
    /// `NaN` prices are stored as missing.
    #[must_use]
    pub fn from_points(points: impl IntoIterator<Item = PricePoint>) -> Self {
        let mut rows: Vec<PricePoint> = points
            .into_iter()
            .map(|p| PricePoint::new(p.date, p.price.filter(|v| !v.is_nan())))
            .collect();
        rows.sort_by_key(|p| p.date);
        rows.dedup_by_key(|p| p.date);
        Self { rows }
    }

    /// Reshapes a provider OHLCV frame into a price table.
    ///
    /// Keeps the `date` and `adjusted_close` columns, renames the latter to
    /// `price` and drops everything else.
    ///
    /// # Errors
    /// Returns [`DataError::Parse`] if either column is missing or has an
    /// unusable type.
    pub fn from_ohlcv(frame: &DataFrame) -> Result<Self> {
        let mut selected = frame.select([DATE_COLUMN, ADJUSTED_CLOSE_COLUMN])?;
        selected.rename(ADJUSTED_CLOSE_COLUMN, PRICE_COLUMN.into())?;
        Self::from_dataframe(&selected)
    }

    /// Reads a two-column `date`/`price` frame.
    ///
    /// # Errors
    /// Returns [`DataError::Parse`] if the frame has other columns, is missing
    /// one of the two, or contains a null date.
    pub fn from_dataframe(frame: &DataFrame) -> Result<Self> {
        if frame.width() != 2 {
            return Err(DataError::Parse(format!(
                "Expected columns [{DATE_COLUMN}, {PRICE_COLUMN}], got {:?}",
                frame.get_column_names()
            )));
        }

        let days = frame.column(DATE_COLUMN)?.cast(&DataType::Int32)?;
        let prices = frame.column(PRICE_COLUMN)?.cast(&DataType::Float64)?;

        let points = days
            .i32()?
            .into_iter()
            .zip(prices.f64()?.into_iter())
            .map(|(day, price)| {
                let day = day.ok_or_else(|| DataError::Parse("Null date in price frame".into()))?;
                Ok(PricePoint::new(date_from_epoch_days(day)?, price))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::from_points(points))
    }

    /// Converts the table to a polars frame with `date` (Date) and `price` (Float64) columns.
    ///
    /// # Errors
    /// Returns [`DataError::Parse`] if polars rejects the columns.
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let days: Vec<i32> = self.rows.iter().map(|p| epoch_days(p.date)).collect();
        let prices: Vec<Option<f64>> = self.rows.iter().map(|p| p.price).collect();

        let date_col = Column::new(DATE_COLUMN.into(), days).cast(&DataType::Date)?;
        let frame = DataFrame::new(vec![date_col, Column::new(PRICE_COLUMN.into(), prices)])?;
        Ok(frame)
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns an iterator over the rows in date order.
    pub fn iter(&self) -> impl Iterator<Item = &PricePoint> {
        self.rows.iter()
    }

    /// Returns the price for a given date, if that date is in the table.
    #[must_use]
    pub fn get(&self, date: NaiveDate) -> Option<Option<f64>> {
        self.rows
            .binary_search_by_key(&date, |p| p.date)
            .ok()
            .map(|i| self.rows[i].price)
    }

    /// Returns the first and last dates covered, if any.
    #[must_use]
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        Some((self.rows.first()?.date, self.rows.last()?.date))
    }

    /// Consumes the table and returns the underlying rows.
    #[must_use]
    pub fn into_inner(self) -> Vec<PricePoint> {
        self.rows
    }
}

impl FromIterator<PricePoint> for PriceTable {
    fn from_iter<I: IntoIterator<Item = PricePoint>>(iter: I) -> Self {
        Self::from_points(iter)
    }
}

impl IntoIterator for PriceTable {
    type Item = PricePoint;
    type IntoIter = std::vec::IntoIter<PricePoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

/// Days since the Unix epoch, the physical representation of a polars `Date`.
#[must_use]
pub fn epoch_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - EPOCH_DAYS_FROM_CE
}

/// Inverse of [`epoch_days`].
///
/// # Errors
/// Returns [`DataError::Parse`] if the day count is out of chrono's range.
pub fn date_from_epoch_days(days: i32) -> Result<NaiveDate> {
    days.checked_add(EPOCH_DAYS_FROM_CE)
        .and_then(NaiveDate::from_num_days_from_ce_opt)
        .ok_or_else(|| DataError::Parse(format!("Date out of range: {days} days")))
}
