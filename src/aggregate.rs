use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::models::{CanonicalRecord, Month, Region, RegionalMonthlyMean, Selection, Variable, Year};

type RegionCells = BTreeMap<(Year, Month), RegionalMonthlyMean>;

/// Regional-monthly means for a single variable, keyed by region and then
/// (year, month).
///
/// A missing key means "no data". It is never filled with zero. Regions
/// without any cell have no entry.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyTable {
    variable: Variable,
    cells: BTreeMap<Region, RegionCells>,
}

/// Groups `records` by (region, year, month) and averages the finite values of
/// `variable` with equal weight.
///
/// Each group's values are sorted before summing, so the result is
/// bit-identical for any ordering of `records`.
pub fn aggregate(records: &[CanonicalRecord], variable: Variable) -> MonthlyTable {
    let groups = records.iter().fold(
        BTreeMap::<(&Region, Year, Month), Vec<f64>>::new(),
        |mut groups, record| {
            if let Some(value) = record.values.get(&variable).filter(|v| v.is_finite()) {
                groups
                    .entry((&record.region, record.year, record.month))
                    .or_default()
                    .push(*value);
            }
            groups
        },
    );

    let means = groups.into_iter().map(|((region, year, month), mut values)| {
        values.sort_by(f64::total_cmp);
        RegionalMonthlyMean {
            region: region.clone(),
            year,
            month,
            variable,
            mean: values.iter().sum::<f64>() / values.len() as f64,
            sample_count: values.len(),
        }
    });
    let table = MonthlyTable::collect(variable, means);

    debug!(%variable, cells = table.len(), records = records.len(), "aggregated monthly means");
    table
}

impl MonthlyTable {
    /// Builds a table from precomputed means; entries for other variables are ignored.
    pub fn from_means(
        variable: Variable,
        means: impl IntoIterator<Item = RegionalMonthlyMean>,
    ) -> MonthlyTable {
        let means = means
            .into_iter()
            .filter(|m| m.variable == variable && m.mean.is_finite() && m.sample_count > 0);
        MonthlyTable::collect(variable, means)
    }

    fn collect(
        variable: Variable,
        means: impl IntoIterator<Item = RegionalMonthlyMean>,
    ) -> MonthlyTable {
        let cells = means.into_iter().fold(
            BTreeMap::<Region, RegionCells>::new(),
            |mut cells, mean| {
                cells
                    .entry(mean.region.clone())
                    .or_default()
                    .insert((mean.year, mean.month), mean);
                cells
            },
        );
        MonthlyTable { variable, cells }
    }

    pub fn variable(&self) -> Variable {
        self.variable
    }

    pub fn len(&self) -> usize {
        self.cells.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn get(&self, region: &Region, year: Year, month: Month) -> Option<&RegionalMonthlyMean> {
        self.cells.get(region)?.get(&(year, month))
    }

    /// Cells in (region, year, month) order.
    pub fn iter(&self) -> impl Iterator<Item = &RegionalMonthlyMean> {
        self.cells.values().flat_map(BTreeMap::values)
    }

    /// A region's cells in (year, month) order.
    pub fn for_region<'a>(
        &'a self,
        region: &Region,
    ) -> impl Iterator<Item = &'a RegionalMonthlyMean> + 'a {
        self.cells.get(region).into_iter().flat_map(BTreeMap::values)
    }

    pub fn regions(&self) -> Vec<Region> {
        self.cells.keys().cloned().collect()
    }

    pub fn years(&self) -> Vec<Year> {
        let years: BTreeSet<Year> = self.iter().map(|cell| cell.year).collect();
        years.into_iter().collect()
    }

    pub fn filter(&self, selection: &Selection) -> MonthlyTable {
        let means = self
            .iter()
            .filter(|cell| selection.matches(&cell.region, cell.year, cell.month))
            .cloned();
        MonthlyTable::collect(self.variable, means)
    }

    /// Per-year mean of a region's monthly means. Months without data are
    /// left out of that year's mean.
    pub fn annual_means(&self, region: &Region) -> BTreeMap<Year, f64> {
        let by_year = self
            .for_region(region)
            .fold(BTreeMap::<Year, (f64, usize)>::new(), |mut acc, cell| {
                let entry = acc.entry(cell.year).or_insert((0.0, 0));
                entry.0 += cell.mean;
                entry.1 += 1;
                acc
            });

        by_year
            .into_iter()
            .map(|(year, (sum, count))| (year, sum / count as f64))
            .collect()
    }
}
