use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// Logical column names of the canonical input table.
pub const COL_REGION: &str = "Region";
pub const COL_YEAR: &str = "Year";
pub const COL_MONTH: &str = "Month";
pub const COL_DATE: &str = "Date";
pub const COL_MAX_TEMP: &str = "MaxTemp";
pub const COL_MIN_TEMP: &str = "MinTemp";
pub const COL_DEW_POINT: &str = "DewPoint";
pub const COL_PRECIPITATION: &str = "Precipitation";
pub const COL_RADIATION: &str = "GlobalRadiation";

pub type Year = i32;

/// Region code, trimmed and uppercased so `"se "` and `"SE"` share a bucket.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Region(String);

impl Region {
    /// Returns `None` for a blank code.
    pub fn parse(raw: &str) -> Option<Region> {
        let code = raw.trim().to_uppercase();
        if code.is_empty() {
            None
        } else {
            Some(Region(code))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Region {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Region::parse(s).ok_or_else(|| "region code must not be blank".to_string())
    }
}

/// Calendar month, always within 1..=12.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Month(u8);

impl Month {
    pub fn new(value: u32) -> Option<Month> {
        if (1..=12).contains(&value) {
            Some(Month(value as u8))
        } else {
            None
        }
    }

    pub fn number(self) -> u8 {
        self.0
    }

    pub fn all() -> impl Iterator<Item = Month> {
        (1..=12).map(Month)
    }

    pub fn abbreviation(self) -> &'static str {
        const NAMES: [&str; 12] = [
            "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
        ];
        NAMES[usize::from(self.0) - 1]
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

impl FromStr for Month {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u32>()
            .ok()
            .and_then(Month::new)
            .ok_or_else(|| format!("month must be between 1 and 12, got {s:?}"))
    }
}

/// A measured or derived meteorological variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variable {
    MaxTemperature,
    MinTemperature,
    MeanTemperature,
    DewPoint,
    Precipitation,
    GlobalRadiation,
}

impl Variable {
    pub const ALL: [Variable; 6] = [
        Variable::MaxTemperature,
        Variable::MinTemperature,
        Variable::MeanTemperature,
        Variable::DewPoint,
        Variable::Precipitation,
        Variable::GlobalRadiation,
    ];

    /// Input columns the variable is read or derived from.
    pub fn source_columns(self) -> &'static [&'static str] {
        match self {
            Variable::MaxTemperature => &[COL_MAX_TEMP],
            Variable::MinTemperature => &[COL_MIN_TEMP],
            Variable::MeanTemperature => &[COL_MAX_TEMP, COL_MIN_TEMP],
            Variable::DewPoint => &[COL_DEW_POINT],
            Variable::Precipitation => &[COL_PRECIPITATION],
            Variable::GlobalRadiation => &[COL_RADIATION],
        }
    }

    pub fn is_temperature_like(self) -> bool {
        matches!(
            self,
            Variable::MaxTemperature
                | Variable::MinTemperature
                | Variable::MeanTemperature
                | Variable::DewPoint
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            Variable::MaxTemperature => "max_temperature",
            Variable::MinTemperature => "min_temperature",
            Variable::MeanTemperature => "mean_temperature",
            Variable::DewPoint => "dew_point",
            Variable::Precipitation => "precipitation",
            Variable::GlobalRadiation => "global_radiation",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Variable::Precipitation => "mm",
            Variable::GlobalRadiation => "kJ/m²",
            _ => "°C",
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Variable {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('-', "_");
        Variable::ALL
            .into_iter()
            .find(|v| v.name() == wanted)
            .ok_or_else(|| {
                let names: Vec<&str> = Variable::ALL.iter().map(|v| v.name()).collect();
                format!("unknown variable {s:?}, expected one of {}", names.join(", "))
            })
    }
}

pub type RawRow = BTreeMap<String, String>;

/// Raw tabular input as supplied by the loading collaborator.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl RawTable {
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRecord {
    pub region: Region,
    pub year: Year,
    pub month: Month,
    pub values: BTreeMap<Variable, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionalMonthlyMean {
    pub region: Region,
    pub year: Year,
    pub month: Month,
    pub variable: Variable,
    pub mean: f64,
    pub sample_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoricalBaseline {
    pub region: Region,
    pub month: Month,
    pub variable: Variable,
    pub baseline_mean: f64,
    pub years_used: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearlyDeviationScore {
    pub region: Region,
    pub variable: Variable,
    pub year: Year,
    pub mean_absolute_deviation: f64,
    pub comparable_months: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyAnomaly {
    pub region: Region,
    pub variable: Variable,
    pub year: Year,
    pub month: Month,
    pub value: f64,
    pub baseline: f64,
    pub anomaly: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendClass {
    Increasing,
    Decreasing,
    Stable,
}

impl fmt::Display for TrendClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrendClass::Increasing => write!(f, "increasing"),
            TrendClass::Decreasing => write!(f, "decreasing"),
            TrendClass::Stable => write!(f, "stable"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendResult {
    pub region: Region,
    pub variable: Variable,
    pub slope_per_year: f64,
    pub intercept: f64,
    pub classification: TrendClass,
    /// Threshold the slope was classified against.
    pub threshold: f64,
    pub points: usize,
    /// Absent for an exact two-point line or a constant series.
    pub r_squared: Option<f64>,
}

impl TrendResult {
    pub fn predict(&self, year: Year) -> f64 {
        self.slope_per_year * f64::from(year) + self.intercept
    }
}

/// One (region, year, month) cell of the monthly table, used for extremes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservationRef {
    pub region: Region,
    pub year: Year,
    pub month: Month,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionExtreme {
    pub region: Region,
    pub value: f64,
}

/// Shape of a region's seasonal cycle, from its all-year monthly means.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeasonalProfile {
    pub region: Region,
    pub months_covered: usize,
    pub amplitude: f64,
    pub variability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtremeSummary {
    pub variable: Variable,
    pub global_max: ObservationRef,
    pub global_min: ObservationRef,
    pub max_amplitude: Option<RegionExtreme>,
    pub max_variability: Option<RegionExtreme>,
}

/// Optional region/year/month filter chosen by a presentation shell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub region: Option<Region>,
    pub year: Option<Year>,
    pub month: Option<Month>,
}

impl Selection {
    pub fn all() -> Selection {
        Selection::default()
    }

    pub fn matches(&self, region: &Region, year: Year, month: Month) -> bool {
        self.region.as_ref().map_or(true, |r| r == region)
            && self.year.map_or(true, |y| y == year)
            && self.month.map_or(true, |m| m == month)
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(region) = &self.region {
            parts.push(format!("region {region}"));
        }
        if let Some(year) = self.year {
            parts.push(format!("year {year}"));
        }
        if let Some(month) = self.month {
            parts.push(format!("month {month}"));
        }
        if parts.is_empty() {
            write!(f, "all data")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_codes_are_trimmed_and_uppercased() {
        assert_eq!(Region::parse("se "), Region::parse("SE"));
        assert_eq!(Region::parse("  n").unwrap().as_str(), "N");
        assert!(Region::parse("   ").is_none());
    }

    #[test]
    fn month_rejects_out_of_range() {
        assert!(Month::new(0).is_none());
        assert!(Month::new(13).is_none());
        assert_eq!(Month::new(7).unwrap().number(), 7);
        assert_eq!(Month::all().count(), 12);
    }

    #[test]
    fn variable_parses_from_cli_names() {
        assert_eq!("precipitation".parse::<Variable>(), Ok(Variable::Precipitation));
        assert_eq!("Mean-Temperature".parse::<Variable>(), Ok(Variable::MeanTemperature));
        assert!("humidity".parse::<Variable>().is_err());
    }

    #[test]
    fn selection_matches_only_requested_fields() {
        let se = Region::parse("SE").unwrap();
        let july = Month::new(7).unwrap();
        let selection = Selection {
            region: Some(se.clone()),
            year: None,
            month: Some(july),
        };
        assert!(selection.matches(&se, 2021, july));
        assert!(!selection.matches(&se, 2021, Month::new(8).unwrap()));
        assert!(!selection.matches(&Region::parse("S").unwrap(), 2021, july));
        assert!(Selection::all().matches(&se, 1999, july));
    }
}
