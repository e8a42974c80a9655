use std::collections::BTreeMap;

use tracing::debug;

use crate::aggregate::MonthlyTable;
use crate::baseline::compute_baselines;
use crate::error::EngineError;
use crate::models::{
    ExtremeSummary, ObservationRef, Region, RegionExtreme, RegionalMonthlyMean, SeasonalProfile,
    Selection,
};

/// A region needs this many distinct calendar months to have a seasonal cycle.
pub const MIN_SEASONAL_MONTHS: usize = 2;

/// Seasonal amplitude and variability for every region with enough months.
///
/// Both are computed from the region's all-year monthly means (one value per
/// calendar month, averaged over years first). Amplitude is max − min;
/// variability is the population standard deviation of those means.
pub fn seasonal_profiles(table: &MonthlyTable) -> Vec<SeasonalProfile> {
    let baselines = compute_baselines(table);
    let by_region = baselines.iter().fold(
        BTreeMap::<&Region, Vec<f64>>::new(),
        |mut acc, baseline| {
            acc.entry(&baseline.region)
                .or_default()
                .push(baseline.baseline_mean);
            acc
        },
    );

    by_region
        .into_iter()
        .filter_map(|(region, monthly)| {
            if monthly.len() < MIN_SEASONAL_MONTHS {
                debug!(%region, months = monthly.len(), "too few months for a seasonal profile");
                return None;
            }
            let max = monthly.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let min = monthly.iter().copied().fold(f64::INFINITY, f64::min);
            Some(SeasonalProfile {
                region: region.clone(),
                months_covered: monthly.len(),
                amplitude: max - min,
                variability: population_std_dev(&monthly),
            })
        })
        .collect()
}

/// Finds the global extremes of `table` restricted to `selection`, plus the
/// regions with the widest seasonal amplitude and highest variability.
///
/// `selection` narrows only the global max/min search. The seasonal winners
/// always come from every year in `table`, matching [`seasonal_profiles`].
/// Returns [`EngineError::NoData`] when the selection matches no cell.
/// Ties go to the first cell in (region, year, month) order, and to the
/// first region in code order.
pub fn locate_extremes(
    table: &MonthlyTable,
    selection: &Selection,
) -> Result<ExtremeSummary, EngineError> {
    let filtered = table.filter(selection);
    let mut cells = filtered.iter();
    let Some(first) = cells.next() else {
        return Err(EngineError::NoData {
            selection: format!("{} {}", table.variable(), selection),
        });
    };

    let (max_cell, min_cell) = cells.fold((first, first), |(max, min), cell| {
        let max = if cell.mean > max.mean { cell } else { max };
        let min = if cell.mean < min.mean { cell } else { min };
        (max, min)
    });

    let profiles = seasonal_profiles(table);
    let max_amplitude = leading_region(&profiles, |p| p.amplitude);
    let max_variability = leading_region(&profiles, |p| p.variability);

    Ok(ExtremeSummary {
        variable: table.variable(),
        global_max: observation(max_cell),
        global_min: observation(min_cell),
        max_amplitude,
        max_variability,
    })
}

fn leading_region(
    profiles: &[SeasonalProfile],
    metric: impl Fn(&SeasonalProfile) -> f64,
) -> Option<RegionExtreme> {
    profiles
        .iter()
        .fold(None::<&SeasonalProfile>, |best, profile| match best {
            Some(current) if metric(profile) <= metric(current) => Some(current),
            _ => Some(profile),
        })
        .map(|profile| RegionExtreme {
            region: profile.region.clone(),
            value: metric(profile),
        })
}

fn observation(cell: &RegionalMonthlyMean) -> ObservationRef {
    ObservationRef {
        region: cell.region.clone(),
        year: cell.year,
        month: cell.month,
        value: cell.mean,
    }
}

fn population_std_dev(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Month, Variable, Year};
    use approx::assert_relative_eq;

    fn cell(region: &str, year: Year, month: u32, mean: f64) -> RegionalMonthlyMean {
        RegionalMonthlyMean {
            region: Region::parse(region).unwrap(),
            year,
            month: Month::new(month).unwrap(),
            variable: Variable::MaxTemperature,
            mean,
            sample_count: 1,
        }
    }

    fn table(cells: Vec<RegionalMonthlyMean>) -> MonthlyTable {
        MonthlyTable::from_means(Variable::MaxTemperature, cells)
    }

    #[test]
    fn picks_region_with_largest_seasonal_amplitude() {
        let mut cells = Vec::new();
        for month in 1..=12 {
            cells.push(cell("A", 2020, month, 10.0));
            let b = if month % 2 == 1 { 0.0 } else { 20.0 };
            cells.push(cell("B", 2020, month, b));
        }
        let summary = locate_extremes(&table(cells), &Selection::all()).unwrap();
        let amplitude = summary.max_amplitude.unwrap();
        assert_eq!(amplitude.region.as_str(), "B");
        assert_relative_eq!(amplitude.value, 20.0);
        let variability = summary.max_variability.unwrap();
        assert_eq!(variability.region.as_str(), "B");
        assert_relative_eq!(variability.value, 10.0);
    }

    #[test]
    fn amplitude_uses_all_year_means_not_single_years() {
        // One noisy year each way; averaged over years the cycle is flat.
        let cells = vec![
            cell("N", 2020, 1, 20.0),
            cell("N", 2021, 1, 30.0),
            cell("N", 2020, 2, 30.0),
            cell("N", 2021, 2, 20.0),
        ];
        let profiles = seasonal_profiles(&table(cells));
        assert_eq!(profiles.len(), 1);
        assert_relative_eq!(profiles[0].amplitude, 0.0);
    }

    #[test]
    fn global_extremes_tie_break_in_key_order() {
        let cells = vec![
            cell("S", 2020, 1, 5.0),
            cell("N", 2021, 3, 40.0),
            cell("N", 2020, 7, 40.0),
            cell("CO", 2022, 2, -1.0),
            cell("SE", 2020, 2, -1.0),
        ];
        let summary = locate_extremes(&table(cells), &Selection::all()).unwrap();
        assert_eq!(summary.global_max.region.as_str(), "N");
        assert_eq!(summary.global_max.year, 2020);
        assert_eq!(summary.global_min.region.as_str(), "CO");
        assert_relative_eq!(summary.global_min.value, -1.0);
    }

    #[test]
    fn single_month_regions_are_excluded_from_seasonal_comparison() {
        let cells = vec![
            cell("N", 2020, 1, 0.0),
            cell("N", 2021, 1, 100.0),
            cell("S", 2020, 1, 10.0),
            cell("S", 2020, 2, 12.0),
        ];
        let summary = locate_extremes(&table(cells), &Selection::all()).unwrap();
        assert_eq!(summary.max_amplitude.unwrap().region.as_str(), "S");
        assert_eq!(summary.global_max.value, 100.0);
    }

    #[test]
    fn no_seasonal_winner_when_every_region_has_one_month() {
        let cells = vec![cell("N", 2020, 1, 3.0), cell("S", 2021, 1, 4.0)];
        let summary = locate_extremes(&table(cells), &Selection::all()).unwrap();
        assert!(summary.max_amplitude.is_none());
        assert!(summary.max_variability.is_none());
    }

    #[test]
    fn month_filter_keeps_seasonal_winner_from_all_months() {
        let cells = vec![cell("N", 2020, 1, 3.0), cell("N", 2020, 2, 4.0)];
        let selection = Selection {
            month: Some(Month::new(2).unwrap()),
            ..Selection::default()
        };
        let summary = locate_extremes(&table(cells), &selection).unwrap();
        assert_eq!(summary.global_min.value, 4.0);
        let amplitude = summary.max_amplitude.unwrap();
        assert_eq!(amplitude.region.as_str(), "N");
        assert_relative_eq!(amplitude.value, 1.0);
        assert_relative_eq!(summary.max_variability.unwrap().value, 0.5);
    }

    #[test]
    fn year_filter_does_not_change_seasonal_winner() {
        // A is flat in 2020 and swings wildly in 2021; B keeps a 30-degree cycle.
        let table = table(vec![
            cell("A", 2020, 1, 10.0),
            cell("A", 2020, 2, 10.0),
            cell("A", 2021, 1, 0.0),
            cell("A", 2021, 2, 40.0),
            cell("B", 2020, 1, 0.0),
            cell("B", 2020, 2, 30.0),
            cell("B", 2021, 1, 0.0),
            cell("B", 2021, 2, 30.0),
        ]);
        let selection = Selection {
            year: Some(2021),
            ..Selection::default()
        };
        let summary = locate_extremes(&table, &selection).unwrap();

        assert_eq!(summary.global_max.region.as_str(), "A");
        assert_eq!(summary.global_max.year, 2021);
        assert_relative_eq!(summary.global_max.value, 40.0);

        let amplitude = summary.max_amplitude.as_ref().unwrap();
        assert_eq!(amplitude.region.as_str(), "B");
        assert_relative_eq!(amplitude.value, 30.0);

        let unfiltered = locate_extremes(&table, &Selection::all()).unwrap();
        assert_eq!(summary.max_amplitude, unfiltered.max_amplitude);
        assert_eq!(summary.max_variability, unfiltered.max_variability);
    }

    #[test]
    fn empty_selection_is_no_data() {
        let cells = vec![cell("N", 2020, 1, 3.0)];
        let selection = Selection {
            year: Some(2024),
            ..Selection::default()
        };
        let err = locate_extremes(&table(cells), &selection).unwrap_err();
        assert!(matches!(err, EngineError::NoData { .. }));
    }
}
