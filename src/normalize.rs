use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::AnalysisWindow;
use crate::error::EngineError;
use crate::models::{
    CanonicalRecord, Month, RawRow, RawTable, Region, Variable, Year, COL_DATE, COL_MAX_TEMP,
    COL_MIN_TEMP, COL_MONTH, COL_REGION, COL_YEAR,
};

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y"];

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizeOptions {
    pub window: AnalysisWindow,
    pub decimal_comma: bool,
    pub missing_sentinels: Vec<f64>,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        NormalizeOptions {
            window: AnalysisWindow::default(),
            decimal_comma: true,
            missing_sentinels: vec![-9999.0],
        }
    }
}

/// Drop counters accumulated while normalizing; nothing here is raised.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizeStats {
    pub rows_read: usize,
    pub rows_kept: usize,
    pub dropped_bad_period: usize,
    pub dropped_out_of_window: usize,
    pub dropped_blank_region: usize,
    pub malformed_values: usize,
    pub missing_values: usize,
}

impl NormalizeStats {
    pub fn rows_dropped(&self) -> usize {
        self.dropped_bad_period + self.dropped_out_of_window + self.dropped_blank_region
    }
}

#[derive(Debug, Clone)]
pub struct Normalized {
    pub records: Vec<CanonicalRecord>,
    pub stats: NormalizeStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PeriodSource {
    YearMonth,
    Date,
}

/// Input columns needed to produce `variables`, without duplicates.
pub fn required_columns(variables: &[Variable]) -> Vec<&'static str> {
    let mut columns: Vec<&'static str> = Vec::new();
    for variable in variables {
        for column in variable.source_columns() {
            if !columns.contains(column) {
                columns.push(*column);
            }
        }
    }
    columns
}

/// Validates `table` against the columns `variables` need and converts every
/// usable row into a [`CanonicalRecord`].
///
/// A required column absent from the whole table is a [`EngineError::Schema`].
/// Rows with an unusable period, a blank region, or a year outside the window
/// are dropped and counted. Malformed, blank, sentinel, and non-finite cells
/// leave that variable absent on the record.
pub fn normalize(
    table: &RawTable,
    variables: &[Variable],
    options: &NormalizeOptions,
) -> Result<Normalized, EngineError> {
    if !table.has_column(COL_REGION) {
        return Err(EngineError::schema(COL_REGION));
    }

    let period_source = if table.has_column(COL_YEAR) && table.has_column(COL_MONTH) {
        PeriodSource::YearMonth
    } else if table.has_column(COL_DATE) {
        PeriodSource::Date
    } else if table.has_column(COL_YEAR) {
        return Err(EngineError::schema(COL_MONTH));
    } else {
        return Err(EngineError::schema(COL_YEAR));
    };

    let columns = required_columns(variables);
    if let Some(missing) = columns.iter().find(|c| !table.has_column(c)) {
        return Err(EngineError::schema(*missing));
    }

    let mut stats = NormalizeStats {
        rows_read: table.rows.len(),
        ..NormalizeStats::default()
    };
    let mut records = Vec::with_capacity(table.rows.len());

    for row in &table.rows {
        let Some(region) = row.get(COL_REGION).and_then(|raw| Region::parse(raw)) else {
            stats.dropped_blank_region += 1;
            continue;
        };

        let Some((year, month)) = row_period(row, period_source) else {
            stats.dropped_bad_period += 1;
            continue;
        };

        if !options.window.contains(year) {
            stats.dropped_out_of_window += 1;
            continue;
        }

        let mut cells: BTreeMap<&str, Option<f64>> = BTreeMap::new();
        for column in &columns {
            let value = match parse_cell(row, column, options) {
                Ok(Some(value)) => Some(value),
                Ok(None) => {
                    stats.missing_values += 1;
                    None
                }
                Err(err) => {
                    debug!(%region, year, month = month.number(), "{err}");
                    stats.malformed_values += 1;
                    None
                }
            };
            cells.insert(*column, value);
        }

        let values = variables
            .iter()
            .filter_map(|variable| derive_value(*variable, &cells).map(|v| (*variable, v)))
            .collect();

        records.push(CanonicalRecord {
            region,
            year,
            month,
            values,
        });
        stats.rows_kept += 1;
    }

    debug!(
        rows_read = stats.rows_read,
        rows_kept = stats.rows_kept,
        missing_values = stats.missing_values,
        "normalized observation table"
    );
    if stats.rows_dropped() > 0 || stats.malformed_values > 0 {
        warn!(
            dropped_bad_period = stats.dropped_bad_period,
            dropped_out_of_window = stats.dropped_out_of_window,
            dropped_blank_region = stats.dropped_blank_region,
            malformed_values = stats.malformed_values,
            "dropped unusable rows or values during normalization"
        );
    }

    Ok(Normalized { records, stats })
}

fn row_period(row: &RawRow, source: PeriodSource) -> Option<(Year, Month)> {
    match source {
        PeriodSource::YearMonth => {
            let year = parse_integer(row.get(COL_YEAR)?)?;
            let month = parse_integer(row.get(COL_MONTH)?)?;
            let year = Year::try_from(year).ok()?;
            let month = Month::new(u32::try_from(month).ok()?)?;
            Some((year, month))
        }
        PeriodSource::Date => {
            let date = parse_date(row.get(COL_DATE)?)?;
            Some((date.year(), Month::new(date.month())?))
        }
    }
}

/// Accepts `2021` as well as spreadsheet-style `2021.0`.
fn parse_integer(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if let Ok(value) = trimmed.parse::<i64>() {
        return Some(value);
    }
    let value = trimmed.parse::<f64>().ok()?;
    if value.is_finite() && value.fract() == 0.0 {
        Some(value as i64)
    } else {
        None
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    // Hourly sources append a time of day after the date.
    let day = raw.split_whitespace().next()?;
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(day, format).ok())
}

fn parse_cell(
    row: &RawRow,
    column: &str,
    options: &NormalizeOptions,
) -> Result<Option<f64>, EngineError> {
    let Some(raw) = row.get(column) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let text = if options.decimal_comma && !trimmed.contains('.') {
        trimmed.replacen(',', ".", 1)
    } else {
        trimmed.to_string()
    };
    let value = text.parse::<f64>().map_err(|_| EngineError::MalformedValue {
        column: column.to_string(),
        raw: raw.clone(),
    })?;

    if !value.is_finite() || options.missing_sentinels.contains(&value) {
        return Ok(None);
    }
    Ok(Some(value))
}

fn derive_value(variable: Variable, cells: &BTreeMap<&str, Option<f64>>) -> Option<f64> {
    match variable {
        Variable::MeanTemperature => {
            let max = (*cells.get(COL_MAX_TEMP)?)?;
            let min = (*cells.get(COL_MIN_TEMP)?)?;
            Some((max + min) / 2.0)
        }
        other => {
            let column = other.source_columns().first()?;
            *cells.get(column)?
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{COL_DEW_POINT, COL_PRECIPITATION};
    use approx::assert_relative_eq;

    fn table(columns: &[&str], rows: &[&[&str]]) -> RawTable {
        RawTable {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: rows
                .iter()
                .map(|cells| {
                    columns
                        .iter()
                        .zip(cells.iter())
                        .map(|(c, v)| (c.to_string(), v.to_string()))
                        .collect()
                })
                .collect(),
        }
    }

    #[test]
    fn missing_variable_column_is_a_schema_error() {
        let input = table(&[COL_REGION, COL_YEAR, COL_MONTH], &[&["SE", "2021", "1"]]);
        let err = normalize(&input, &[Variable::Precipitation], &NormalizeOptions::default())
            .unwrap_err();
        assert_eq!(err, EngineError::schema(COL_PRECIPITATION));
    }

    #[test]
    fn missing_period_columns_is_a_schema_error() {
        let input = table(&[COL_REGION, COL_YEAR, COL_DEW_POINT], &[]);
        let err =
            normalize(&input, &[Variable::DewPoint], &NormalizeOptions::default()).unwrap_err();
        assert_eq!(err, EngineError::schema(COL_MONTH));
    }

    #[test]
    fn region_case_and_whitespace_collapse() {
        let input = table(
            &[COL_REGION, COL_YEAR, COL_MONTH, COL_DEW_POINT],
            &[&["SE", "2021", "1", "10"], &["se ", "2021", "1", "12"]],
        );
        let out = normalize(&input, &[Variable::DewPoint], &NormalizeOptions::default()).unwrap();
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.records[0].region, out.records[1].region);
        assert_eq!(out.records[1].region.as_str(), "SE");
    }

    #[test]
    fn unparseable_period_rows_are_dropped_and_counted() {
        let input = table(
            &[COL_REGION, COL_YEAR, COL_MONTH, COL_DEW_POINT],
            &[
                &["N", "20x1", "1", "10"],
                &["N", "2021", "13", "10"],
                &["N", "2021.0", "2", "10"],
                &["", "2021", "2", "10"],
                &["N", "2019", "2", "10"],
            ],
        );
        let out = normalize(&input, &[Variable::DewPoint], &NormalizeOptions::default()).unwrap();
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.stats.rows_read, 5);
        assert_eq!(out.stats.dropped_bad_period, 2);
        assert_eq!(out.stats.dropped_blank_region, 1);
        assert_eq!(out.stats.dropped_out_of_window, 1);
        assert_eq!(out.records[0].year, 2021);
    }

    #[test]
    fn malformed_sentinel_and_blank_values_leave_variable_absent() {
        let input = table(
            &[COL_REGION, COL_YEAR, COL_MONTH, COL_PRECIPITATION],
            &[
                &["S", "2022", "3", "abc"],
                &["S", "2022", "3", "-9999"],
                &["S", "2022", "3", ""],
                &["S", "2022", "3", "NaN"],
                &["S", "2022", "3", "1,5"],
            ],
        );
        let out =
            normalize(&input, &[Variable::Precipitation], &NormalizeOptions::default()).unwrap();
        assert_eq!(out.records.len(), 5);
        assert_eq!(out.stats.malformed_values, 1);
        assert_eq!(out.stats.missing_values, 3);
        let present: Vec<f64> = out
            .records
            .iter()
            .filter_map(|r| r.values.get(&Variable::Precipitation).copied())
            .collect();
        assert_eq!(present, vec![1.5]);
    }

    #[test]
    fn mean_temperature_needs_both_sources() {
        let input = table(
            &[COL_REGION, COL_YEAR, COL_MONTH, COL_MAX_TEMP, COL_MIN_TEMP],
            &[&["CO", "2020", "5", "30", "20"], &["CO", "2020", "5", "31", ""]],
        );
        let out = normalize(
            &input,
            &[Variable::MeanTemperature, Variable::MaxTemperature],
            &NormalizeOptions::default(),
        )
        .unwrap();
        assert_relative_eq!(out.records[0].values[&Variable::MeanTemperature], 25.0);
        assert!(!out.records[1].values.contains_key(&Variable::MeanTemperature));
        assert_relative_eq!(out.records[1].values[&Variable::MaxTemperature], 31.0);
        // MaxTemp is shared by both variables but only counted once.
        assert_eq!(out.stats.missing_values, 1);
    }

    #[test]
    fn period_can_come_from_a_date_column() {
        let input = table(
            &[COL_REGION, COL_DATE, COL_DEW_POINT],
            &[
                &["NE", "2023-07-14", "18"],
                &["NE", "2023/08/01 1200 UTC", "19"],
                &["NE", "01/09/2023", "20"],
                &["NE", "yesterday", "21"],
            ],
        );
        let out = normalize(&input, &[Variable::DewPoint], &NormalizeOptions::default()).unwrap();
        let months: Vec<u8> = out.records.iter().map(|r| r.month.number()).collect();
        assert_eq!(months, vec![7, 8, 9]);
        assert_eq!(out.stats.dropped_bad_period, 1);
    }

    #[test]
    fn required_columns_are_deduplicated() {
        let columns = required_columns(&[
            Variable::MaxTemperature,
            Variable::MeanTemperature,
            Variable::MinTemperature,
        ]);
        assert_eq!(columns, vec![COL_MAX_TEMP, COL_MIN_TEMP]);
    }
}
