use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::aggregate::MonthlyTable;
use crate::baseline::BaselineTable;
use crate::models::{MonthlyAnomaly, Region, Year, YearlyDeviationScore};

/// Scores every year of `region` by its mean absolute deviation from the
/// baseline, most atypical first.
///
/// Only months with both a yearly value and a baseline count, and the sum is
/// divided by that count rather than by 12. Years with no comparable month
/// are left out. Equal scores are ordered by ascending year.
pub fn rank_years(
    table: &MonthlyTable,
    baselines: &BaselineTable,
    region: &Region,
) -> Vec<YearlyDeviationScore> {
    let per_year = table
        .for_region(region)
        .filter_map(|cell| {
            baselines
                .get(region, cell.month)
                .map(|baseline| (cell.year, (cell.mean - baseline.baseline_mean).abs()))
        })
        .fold(
            BTreeMap::<Year, (f64, usize)>::new(),
            |mut acc, (year, deviation)| {
                let entry = acc.entry(year).or_insert((0.0, 0));
                entry.0 += deviation;
                entry.1 += 1;
                acc
            },
        );

    let mut scores: Vec<YearlyDeviationScore> = per_year
        .into_iter()
        .map(|(year, (sum, months))| YearlyDeviationScore {
            region: region.clone(),
            variable: table.variable(),
            year,
            mean_absolute_deviation: sum / months as f64,
            comparable_months: months,
        })
        .collect();

    scores.sort_by(atypicality_order);
    scores
}

/// The highest-scoring year; ties go to the earliest year.
pub fn most_atypical(scores: &[YearlyDeviationScore]) -> Option<&YearlyDeviationScore> {
    scores.iter().min_by(|a, b| atypicality_order(a, b))
}

fn atypicality_order(a: &YearlyDeviationScore, b: &YearlyDeviationScore) -> Ordering {
    b.mean_absolute_deviation
        .total_cmp(&a.mean_absolute_deviation)
        .then(a.year.cmp(&b.year))
}

/// Signed departure from baseline for each comparable month of one year.
pub fn monthly_anomalies(
    table: &MonthlyTable,
    baselines: &BaselineTable,
    region: &Region,
    year: Year,
) -> Vec<MonthlyAnomaly> {
    table
        .for_region(region)
        .filter(|cell| cell.year == year)
        .filter_map(|cell| {
            let baseline = baselines.get(region, cell.month)?;
            Some(MonthlyAnomaly {
                region: region.clone(),
                variable: table.variable(),
                year,
                month: cell.month,
                value: cell.mean,
                baseline: baseline.baseline_mean,
                anomaly: cell.mean - baseline.baseline_mean,
            })
        })
        .collect()
}
