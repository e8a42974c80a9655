use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::path::Path;

use anyhow::{bail, ensure, Context};
use serde::Deserialize;

use crate::models::{Variable, Year};
use crate::normalize::NormalizeOptions;

/// Engine settings, read from an optional TOML file.
///
/// ```toml
/// [window]
/// start_year = 2020
/// end_year = 2025
///
/// [trend]
/// temperature_threshold = 0.05
/// default_threshold = 0.1
///
/// [trend.overrides]
/// precipitation = 0.2
///
/// [loader]
/// delimiter = ";"
/// missing_sentinels = [-9999.0]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub window: AnalysisWindow,
    pub baseline: BaselineConfig,
    pub trend: TrendConfig,
    pub loader: LoaderConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisWindow {
    pub start_year: Year,
    pub end_year: Year,
}

impl Default for AnalysisWindow {
    fn default() -> Self {
        AnalysisWindow {
            start_year: 2020,
            end_year: 2025,
        }
    }
}

impl AnalysisWindow {
    pub fn contains(&self, year: Year) -> bool {
        (self.start_year..=self.end_year).contains(&year)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BaselineConfig {
    pub reference_start: Option<Year>,
    pub reference_end: Option<Year>,
}

impl BaselineConfig {
    /// Years allowed to contribute to baselines; `None` means every year.
    pub fn reference_period(&self) -> Option<RangeInclusive<Year>> {
        match (self.reference_start, self.reference_end) {
            (None, None) => None,
            (start, end) => Some(start.unwrap_or(Year::MIN)..=end.unwrap_or(Year::MAX)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrendConfig {
    /// Slope threshold (units/year) for temperature-like variables.
    pub temperature_threshold: f64,
    /// Slope threshold for every other variable.
    pub default_threshold: f64,
    /// Per-variable thresholds keyed by variable name.
    pub overrides: BTreeMap<String, f64>,
}

impl Default for TrendConfig {
    fn default() -> Self {
        TrendConfig {
            temperature_threshold: 0.05,
            default_threshold: 0.1,
            overrides: BTreeMap::new(),
        }
    }
}

impl TrendConfig {
    pub fn threshold_for(&self, variable: Variable) -> f64 {
        if let Some(value) = self.overrides.get(variable.name()) {
            return *value;
        }
        if variable.is_temperature_like() {
            self.temperature_threshold
        } else {
            self.default_threshold
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoaderConfig {
    pub delimiter: char,
    /// Accept `12,5` as `12.5`.
    pub decimal_comma: bool,
    /// Values the source uses to mean "not measured".
    pub missing_sentinels: Vec<f64>,
    /// Raw header → logical column name, applied after the built-in aliases.
    pub column_aliases: BTreeMap<String, String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        LoaderConfig {
            delimiter: ',',
            decimal_comma: true,
            missing_sentinels: vec![-9999.0],
            column_aliases: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: EngineConfig = toml::from_str(&text)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.window.start_year <= self.window.end_year,
            "window.start_year ({}) is after window.end_year ({})",
            self.window.start_year,
            self.window.end_year
        );

        if let (Some(start), Some(end)) =
            (self.baseline.reference_start, self.baseline.reference_end)
        {
            ensure!(
                start <= end,
                "baseline.reference_start ({start}) is after baseline.reference_end ({end})"
            );
        }

        let thresholds = [
            ("trend.temperature_threshold", self.trend.temperature_threshold),
            ("trend.default_threshold", self.trend.default_threshold),
        ];
        for (name, value) in thresholds {
            ensure!(
                value.is_finite() && value >= 0.0,
                "{name} must be a finite non-negative number, got {value}"
            );
        }

        for (name, value) in &self.trend.overrides {
            if name.parse::<Variable>().is_err() {
                bail!("trend.overrides has unknown variable {name:?}");
            }
            ensure!(
                value.is_finite() && *value >= 0.0,
                "trend.overrides.{name} must be a finite non-negative number, got {value}"
            );
        }

        ensure!(
            self.loader.delimiter.is_ascii(),
            "loader.delimiter must be a single ASCII character"
        );

        Ok(())
    }

    pub fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions {
            window: self.window,
            decimal_comma: self.loader.decimal_comma,
            missing_sentinels: self.loader.missing_sentinels.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployed_thresholds() {
        let config = EngineConfig::default();
        assert_eq!(config.window.start_year, 2020);
        assert_eq!(config.window.end_year, 2025);
        assert_eq!(config.trend.threshold_for(Variable::MaxTemperature), 0.05);
        assert_eq!(config.trend.threshold_for(Variable::Precipitation), 0.1);
        assert!(config.baseline.reference_period().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_partial_toml_with_overrides() {
        let text = r#"
            [window]
            start_year = 2015

            [trend.overrides]
            precipitation = 0.25

            [loader]
            delimiter = ";"
        "#;
        let config: EngineConfig = toml::from_str(text).unwrap();
        config.validate().unwrap();
        assert_eq!(config.window.start_year, 2015);
        assert_eq!(config.window.end_year, 2025);
        assert_eq!(config.trend.threshold_for(Variable::Precipitation), 0.25);
        assert_eq!(config.trend.threshold_for(Variable::GlobalRadiation), 0.1);
        assert_eq!(config.loader.delimiter, ';');
    }

    #[test]
    fn rejects_inverted_window() {
        let text = "[window]\nstart_year = 2025\nend_year = 2020\n";
        let config: EngineConfig = toml::from_str(text).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unknown_override_variable() {
        let text = "[trend.overrides]\nhumidity = 0.3\n";
        let config: EngineConfig = toml::from_str(text).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("humidity"));
    }

    #[test]
    fn open_ended_reference_period() {
        let baseline = BaselineConfig {
            reference_start: Some(2021),
            reference_end: None,
        };
        let period = baseline.reference_period().unwrap();
        assert!(period.contains(&2021));
        assert!(period.contains(&2030));
        assert!(!period.contains(&2020));
    }
}
