use std::fmt::Write;

use serde::Serialize;

use crate::error::EngineError;
use crate::models::{
    ExtremeSummary, HistoricalBaseline, Region, RegionalMonthlyMean, SeasonalProfile,
    TrendResult, Year, YearlyDeviationScore,
};
use crate::normalize::NormalizeStats;
use crate::pipeline::{RegionAnalysis, VariableAnalysis};

pub fn build_report(analysis: &VariableAnalysis, stats: &NormalizeStats) -> String {
    let variable = analysis.variable;
    let unit = variable.unit();
    let mut output = String::new();

    let _ = writeln!(output, "# Regional Climate Report: {}", variable);
    let _ = writeln!(
        output,
        "Generated for {} ({} regions, years {})",
        analysis.selection,
        analysis.regions.len(),
        year_span(&analysis.table.years())
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Data Quality");
    let _ = writeln!(
        output,
        "- {} of {} rows used; {} dropped (bad period {}, outside window {}, blank region {})",
        stats.rows_kept,
        stats.rows_read,
        stats.rows_dropped(),
        stats.dropped_bad_period,
        stats.dropped_out_of_window,
        stats.dropped_blank_region
    );
    let _ = writeln!(
        output,
        "- {} malformed and {} missing values",
        stats.malformed_values, stats.missing_values
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Historical Baseline");
    output.push_str(&format_baselines(analysis.baselines.iter(), unit));

    let _ = writeln!(output);
    let _ = writeln!(output, "## Most Atypical Years");
    for region in &analysis.regions {
        match region.most_atypical() {
            Some(score) => {
                let _ = writeln!(
                    output,
                    "- {}: {} (mean deviation {:.2} {} over {} months)",
                    region.region,
                    score.year,
                    score.mean_absolute_deviation,
                    unit,
                    score.comparable_months
                );
            }
            None => {
                let _ = writeln!(output, "- {}: no comparable months", region.region);
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Trends");
    for region in &analysis.regions {
        let _ = writeln!(output, "- {}", format_trend_line(&region.region, &region.trend, unit));
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Seasonal Extremes");
    match &analysis.extremes {
        Ok(summary) => output.push_str(&format_extremes(summary, unit)),
        Err(err) => {
            let _ = writeln!(output, "No extremes: {}", err);
        }
    }

    output
}

pub fn format_monthly_means<'a>(
    cells: impl Iterator<Item = &'a RegionalMonthlyMean>,
    unit: &str,
) -> String {
    let mut output = String::new();
    let mut empty = true;
    for cell in cells {
        empty = false;
        let _ = writeln!(
            output,
            "- {} {}-{}: {:.2} {} ({} samples)",
            cell.region, cell.year, cell.month, cell.mean, unit, cell.sample_count
        );
    }
    if empty {
        let _ = writeln!(output, "No monthly data for this selection.");
    }
    output
}

pub fn format_baselines<'a>(
    baselines: impl Iterator<Item = &'a HistoricalBaseline>,
    unit: &str,
) -> String {
    let mut output = String::new();
    let mut current: Option<&Region> = None;
    for baseline in baselines {
        if current != Some(&baseline.region) {
            let _ = writeln!(output, "### {}", baseline.region);
            current = Some(&baseline.region);
        }
        let _ = writeln!(
            output,
            "- {}: {:.2} {} ({} years)",
            baseline.month.abbreviation(),
            baseline.baseline_mean,
            unit,
            baseline.years_used
        );
    }
    if current.is_none() {
        let _ = writeln!(output, "No baseline could be computed for this selection.");
    }
    output
}

pub fn format_ranking(region: &RegionAnalysis, limit: usize, unit: &str) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "Region {} by atypicality:", region.region);
    if region.ranking.is_empty() {
        let _ = writeln!(output, "- no year has months comparable to the baseline");
        return output;
    }
    for (rank, score) in region.ranking.iter().take(limit).enumerate() {
        let _ = writeln!(
            output,
            "{}. {} mean deviation {:.2} {} across {} months",
            rank + 1,
            score.year,
            score.mean_absolute_deviation,
            unit,
            score.comparable_months
        );
    }
    output
}

pub fn format_trend_line(
    region: &Region,
    trend: &Result<TrendResult, EngineError>,
    unit: &str,
) -> String {
    match trend {
        Ok(trend) => format!(
            "{}: {} ({:+.3} {}/year over {} years, threshold {})",
            region, trend.classification, trend.slope_per_year, unit, trend.points, trend.threshold
        ),
        Err(err) => format!("{}: trend undetermined ({})", region, err),
    }
}

pub fn format_extremes(summary: &ExtremeSummary, unit: &str) -> String {
    let mut output = String::new();
    let _ = writeln!(
        output,
        "- Highest: {:.2} {} in {} ({}-{})",
        summary.global_max.value,
        unit,
        summary.global_max.region,
        summary.global_max.year,
        summary.global_max.month
    );
    let _ = writeln!(
        output,
        "- Lowest: {:.2} {} in {} ({}-{})",
        summary.global_min.value,
        unit,
        summary.global_min.region,
        summary.global_min.year,
        summary.global_min.month
    );
    match &summary.max_amplitude {
        Some(extreme) => {
            let _ = writeln!(
                output,
                "- Widest seasonal amplitude: {} ({:.2} {})",
                extreme.region, extreme.value, unit
            );
        }
        None => {
            let _ = writeln!(output, "- Widest seasonal amplitude: not enough months");
        }
    }
    match &summary.max_variability {
        Some(extreme) => {
            let _ = writeln!(
                output,
                "- Highest monthly variability: {} (std dev {:.2} {})",
                extreme.region, extreme.value, unit
            );
        }
        None => {
            let _ = writeln!(output, "- Highest monthly variability: not enough months");
        }
    }
    output
}

fn year_span(years: &[Year]) -> String {
    match (years.first(), years.last()) {
        (Some(first), Some(last)) if first != last => format!("{first}-{last}"),
        (Some(only), _) => only.to_string(),
        _ => "none".to_string(),
    }
}

#[derive(Serialize)]
struct AnalysisJson<'a> {
    variable: &'a str,
    selection: String,
    normalization: &'a NormalizeStats,
    monthly_means: Vec<&'a RegionalMonthlyMean>,
    baselines: Vec<&'a HistoricalBaseline>,
    regions: Vec<RegionJson<'a>>,
    seasonal_profiles: &'a [SeasonalProfile],
    extremes: Option<&'a ExtremeSummary>,
    extremes_unavailable: Option<String>,
}

#[derive(Serialize)]
struct RegionJson<'a> {
    region: &'a Region,
    ranking: &'a [YearlyDeviationScore],
    most_atypical_year: Option<Year>,
    trend: Option<&'a TrendResult>,
    trend_unavailable: Option<String>,
}

pub fn build_json(analysis: &VariableAnalysis, stats: &NormalizeStats) -> serde_json::Result<String> {
    let regions = analysis
        .regions
        .iter()
        .map(|region| RegionJson {
            region: &region.region,
            ranking: &region.ranking,
            most_atypical_year: region.most_atypical().map(|score| score.year),
            trend: region.trend.as_ref().ok(),
            trend_unavailable: region.trend.as_ref().err().map(|err| err.to_string()),
        })
        .collect();

    let document = AnalysisJson {
        variable: analysis.variable.name(),
        selection: analysis.selection.to_string(),
        normalization: stats,
        monthly_means: analysis.table.iter().collect(),
        baselines: analysis.baselines.iter().collect(),
        regions,
        seasonal_profiles: &analysis.profiles,
        extremes: analysis.extremes.as_ref().ok(),
        extremes_unavailable: analysis.extremes.as_ref().err().map(|err| err.to_string()),
    };
    serde_json::to_string_pretty(&document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::models::{RawTable, Selection, Variable, COL_MONTH, COL_REGION, COL_YEAR};
    use crate::normalize::NormalizeOptions;
    use crate::pipeline::{analyze_variable, Snapshot};

    fn snapshot() -> Snapshot {
        let columns = [COL_REGION, COL_YEAR, COL_MONTH, "MaxTemp"];
        let rows = [
            ["N", "2020", "1", "30"],
            ["N", "2020", "2", "31"],
            ["N", "2021", "1", "33"],
            ["N", "2021", "2", "34"],
            ["S", "2021", "7", "12"],
        ];
        let table = RawTable {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: rows
                .iter()
                .map(|row| {
                    columns
                        .iter()
                        .zip(row.iter())
                        .map(|(c, v)| (c.to_string(), v.to_string()))
                        .collect()
                })
                .collect(),
        };
        Snapshot::from_table(&table, &[Variable::MaxTemperature], &NormalizeOptions::default())
            .unwrap()
    }

    #[test]
    fn report_lists_atypical_years_and_undetermined_trends() {
        let snapshot = snapshot();
        let analysis = analyze_variable(
            &snapshot,
            Variable::MaxTemperature,
            &Selection::all(),
            &EngineConfig::default(),
        )
        .unwrap();
        let report = build_report(&analysis, snapshot.stats());

        assert!(report.contains("# Regional Climate Report: max_temperature"));
        assert!(report.contains("years 2020-2021"));
        assert!(report.contains("- 5 of 5 rows used; 0 dropped"));
        assert!(report.contains("- N: 2020 (mean deviation 1.50 °C over 2 months)"));
        assert!(report.contains("- N: increasing"));
        assert!(report.contains("- S: trend undetermined"));
        assert!(report.contains("Widest seasonal amplitude: N"));
    }

    #[test]
    fn json_reports_missing_trend_explicitly() {
        let snapshot = snapshot();
        let analysis = analyze_variable(
            &snapshot,
            Variable::MaxTemperature,
            &Selection::all(),
            &EngineConfig::default(),
        )
        .unwrap();
        let json = build_json(&analysis, snapshot.stats()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["variable"], "max_temperature");
        let regions = value["regions"].as_array().unwrap();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0]["trend"]["classification"], "increasing");
        assert!(regions[1]["trend"].is_null());
        assert!(regions[1]["trend_unavailable"]
            .as_str()
            .unwrap()
            .contains("insufficient data"));
        assert_eq!(value["monthly_means"].as_array().unwrap().len(), 5);
    }

    #[test]
    fn empty_baselines_say_so() {
        let text = format_baselines(std::iter::empty(), "mm");
        assert_eq!(text, "No baseline could be computed for this selection.\n");
    }

    #[test]
    fn year_span_handles_single_and_empty() {
        assert_eq!(year_span(&[2021]), "2021");
        assert_eq!(year_span(&[]), "none");
        assert_eq!(year_span(&[2020, 2022]), "2020-2022");
    }
}
